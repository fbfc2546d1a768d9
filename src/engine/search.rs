// ==========================================
// 武器改装最优配置求解 - 最优配置搜索
// ==========================================
// 输入: 已构建的候选树 + 求解属性 + 初始排除集 + 可选的无冲突缓存
// 输出: 求解属性总和最优（后坐力最小 / 人机最大）且不含互斥物品的配置
// ==========================================
// 算法: 带备忘的递归回溯
// - 逐个处理待决槽位: 留空,或选择一个未被排除的候选
// - 选中物品后,其子槽位追加到待决列表末尾,其冲突物品并入排除集
// - 子树无冲突的候选与其余槽位互不影响,单独求解后合并
// - 备忘键: (待决槽位列表, 排除集),两者先映射为编号,只在首次出现时复制
// 平局: 不替换当前最优;求解属性相同且次要属性更好时才替换
// 红线: 迭代顺序完全由建树时的候选排序决定,同样的输入产生同样的输出
// ==========================================

use crate::cache::{CacheEntry, ConflictFreeCache};
use crate::domain::build::{BuildResult, BuildSelection};
use crate::domain::types::BuildType;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::tree::{CandidateTree, ItemIdx, SlotIdx};
use std::borrow::Borrow;
use std::collections::{BTreeSet, HashMap};
use std::hash::Hash;
use tracing::instrument;

/// 解析求解属性名称（未知名称属于配置错误,不重试）
pub fn parse_focused_stat(name: &str) -> EngineResult<BuildType> {
    name.parse::<BuildType>()
        .map_err(EngineError::InvalidConfiguration)
}

/// 单次搜索的统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SearchStats {
    pub nodes_visited: u64,
    pub memo_hits: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

#[derive(Debug)]
pub struct SearchOutcome {
    pub result: BuildResult,
    pub stats: SearchStats,
}

/// 子问题的解: 已选物品的数值和 + 按决策顺序的选择
#[derive(Debug, Clone, Default)]
struct Partial {
    recoil: i64,
    ergonomics: i64,
    selections: Vec<BuildSelection>,
}

impl Partial {
    /// 当前槽位的选择放在最前
    fn prepend(selection: BuildSelection, recoil: i64, ergonomics: i64, tail: Vec<&Partial>) -> Self {
        let mut partial = Partial {
            recoil,
            ergonomics,
            selections: vec![selection],
        };
        for part in tail {
            partial.recoil += part.recoil;
            partial.ergonomics += part.ergonomics;
            partial.selections.extend(part.selections.iter().cloned());
        }
        partial
    }
}

/// 同一次搜索内求解属性固定,不入键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct MemoKey {
    remaining: usize,
    excluded: usize,
}

/// 值 → 稠密编号
#[derive(Debug)]
struct Interner<T> {
    ids: HashMap<T, usize>,
}

impl<T: Hash + Eq> Interner<T> {
    fn new() -> Self {
        Self { ids: HashMap::new() }
    }

    fn intern<Q>(&mut self, value: &Q) -> usize
    where
        T: Borrow<Q>,
        Q: Hash + Eq + ToOwned<Owned = T> + ?Sized,
    {
        if let Some(&id) = self.ids.get(value) {
            return id;
        }
        let id = self.ids.len();
        self.ids.insert(value.to_owned(), id);
        id
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.ids.len()
    }
}

// ==========================================
// OptimalBuildSearch - 单次搜索上下文
// ==========================================
struct OptimalBuildSearch<'a> {
    tree: &'a CandidateTree,
    stat: BuildType,
    cache: Option<&'a dyn ConflictFreeCache>,
    memo: HashMap<MemoKey, Partial>,
    slot_lists: Interner<Vec<SlotIdx>>,
    exclusion_sets: Interner<BTreeSet<String>>,
    stats: SearchStats,
}

/// 搜索最优配置
///
/// 缓存只在默认约束（无忽略槽位、无强制排除）且树未被深度截断时参与,
/// 其它情况下传入的缓存被忽略。
///
/// 初始排除集不能包含建树时用来剔除兄弟候选的物品;
/// 需要排除这类物品时应放进约束的排除列表重新建树。
///
/// # 返回
/// - Ok(SearchOutcome): 最优配置 + 统计
/// - Err(InvalidConfiguration): 初始排除集与剔除依据冲突
/// - Err(Cache): 缓存读写失败
#[instrument(skip(tree, initial_exclusions, cache), fields(
    weapon_id = %tree.item(tree.root()).id,
    stat = %stat
))]
pub fn search(
    tree: &CandidateTree,
    stat: BuildType,
    initial_exclusions: &BTreeSet<String>,
    cache: Option<&dyn ConflictFreeCache>,
) -> EngineResult<SearchOutcome> {
    let rivals = tree.pruning_rival_item_ids();
    let blocked: Vec<&str> = initial_exclusions
        .iter()
        .map(String::as_str)
        .filter(|id| rivals.contains(id))
        .collect();
    if !blocked.is_empty() {
        return Err(EngineError::InvalidConfiguration(format!(
            "初始排除集包含剔除候选所依据的物品: {},请改用约束中的排除物品重新建树",
            blocked.join(",")
        )));
    }

    let cache_usable = tree.constraints().is_default_profile() && !tree.is_truncated();
    let mut ctx = OptimalBuildSearch {
        tree,
        stat,
        cache: if cache_usable { cache } else { None },
        memo: HashMap::new(),
        slot_lists: Interner::new(),
        exclusion_sets: Interner::new(),
        stats: SearchStats::default(),
    };

    let root = tree.item(tree.root());
    let best = ctx.solve(&root.slots, initial_exclusions)?;

    let result = BuildResult {
        item_id: root.id.clone(),
        item_name: root.name.clone(),
        build_type: stat,
        recoil_sum: root.recoil_modifier + best.recoil,
        ergonomics_sum: root.ergonomics_modifier + best.ergonomics,
        selections: best.selections,
    };

    tracing::info!(
        "最优配置搜索完成: weapon_id={}, stat={}, recoil_sum={}, ergonomics_sum={}, nodes={}, memo_hits={}, cache_hits={}",
        result.item_id,
        stat,
        result.recoil_sum,
        result.ergonomics_sum,
        ctx.stats.nodes_visited,
        ctx.stats.memo_hits,
        ctx.stats.cache_hits
    );

    Ok(SearchOutcome {
        result,
        stats: ctx.stats,
    })
}

impl<'a> OptimalBuildSearch<'a> {
    /// candidate 是否严格优于 incumbent
    fn improves(&self, candidate: &Partial, incumbent: &Partial) -> bool {
        let focused = |p: &Partial| self.stat.pick(p.recoil, p.ergonomics);
        let secondary_stat = self.stat.secondary();
        let secondary = |p: &Partial| secondary_stat.pick(p.recoil, p.ergonomics);

        if self.stat.is_better(focused(candidate), focused(incumbent)) {
            return true;
        }
        focused(candidate) == focused(incumbent)
            && secondary_stat.is_better(secondary(candidate), secondary(incumbent))
    }

    fn selection(&self, slot: SlotIdx, item: Option<ItemIdx>) -> BuildSelection {
        let slot_node = self.tree.slot(slot);
        let chosen = item.map(|i| self.tree.item(i));
        BuildSelection {
            parent_item_id: self.tree.item(slot_node.parent_item).id.clone(),
            slot_id: slot_node.id.clone(),
            slot_name: slot_node.name.clone(),
            item_id: chosen.map(|n| n.id.clone()),
            item_name: chosen.map(|n| n.name.clone()),
        }
    }

    /// 决定 remaining 中所有槽位
    fn solve(&mut self, remaining: &[SlotIdx], excluded: &BTreeSet<String>) -> EngineResult<Partial> {
        let Some((&slot, rest)) = remaining.split_first() else {
            return Ok(Partial::default());
        };

        let key = MemoKey {
            remaining: self.slot_lists.intern(remaining),
            excluded: self.exclusion_sets.intern(excluded),
        };
        if let Some(hit) = self.memo.get(&key) {
            self.stats.memo_hits += 1;
            return Ok(hit.clone());
        }
        self.stats.nodes_visited += 1;

        // 留空
        let skipped = self.solve(rest, excluded)?;
        let mut best = Partial::prepend(self.selection(slot, None), 0, 0, vec![&skipped]);

        let tree = self.tree;
        for &candidate in &tree.slot(slot).candidates {
            if excluded.contains(&tree.item(candidate).id) {
                continue;
            }
            let option = self.choose(slot, candidate, rest, excluded)?;
            if self.improves(&option, &best) {
                best = option;
            }
        }

        self.memo.insert(key, best.clone());
        Ok(best)
    }

    /// 在 slot 中选中 candidate 后的最优延续
    fn choose(
        &mut self,
        slot: SlotIdx,
        candidate: ItemIdx,
        rest: &[SlotIdx],
        excluded: &BTreeSet<String>,
    ) -> EngineResult<Partial> {
        let tree = self.tree;
        let node = tree.item(candidate);
        let own = self.selection(slot, Some(candidate));

        if node.subtree_conflict_free {
            let subtree = self.solve_subtree(candidate, excluded)?;
            let tail = self.solve(rest, excluded)?;
            return Ok(Partial::prepend(own, 0, 0, vec![&subtree, &tail]));
        }

        let mut next_excluded = excluded.clone();
        next_excluded.extend(tree.conflicts().conflicts_of(&node.id).cloned());
        let mut work = rest.to_vec();
        work.extend(node.slots.iter().copied());

        let tail = self.solve(&work, &next_excluded)?;
        Ok(Partial::prepend(
            own,
            node.recoil_modifier,
            node.ergonomics_modifier,
            vec![&tail],
        ))
    }

    /// 无冲突子树的最优解（含物品自身数值,不含自身的选择记录）
    fn solve_subtree(&mut self, item: ItemIdx, excluded: &BTreeSet<String>) -> EngineResult<Partial> {
        let tree = self.tree;
        let node = tree.item(item);
        let disjoint = tree
            .subtree_item_ids(item)
            .iter()
            .all(|id| !excluded.contains(*id));

        let cache = match self.cache {
            Some(cache) if disjoint => cache,
            _ => return self.solve_with_own(item, excluded),
        };

        let cached = cache
            .get(&node.id, self.stat, tree.constraints())
            .map_err(EngineError::Cache)?;
        if let Some(entry) = cached {
            if entry.chosen_item_ids().all(|id| !excluded.contains(id)) {
                self.stats.cache_hits += 1;
                return Ok(Partial {
                    recoil: entry.recoil_sum,
                    ergonomics: entry.ergonomics_sum,
                    selections: entry.selections,
                });
            }
            tracing::debug!("缓存条目与排除集冲突,重新计算: item_id={}", node.id);
        }
        self.stats.cache_misses += 1;

        let computed = self.solve_with_own(item, &BTreeSet::new())?;
        cache
            .set(
                tree.constraints(),
                &CacheEntry {
                    item_id: node.id.clone(),
                    build_type: self.stat,
                    recoil_sum: computed.recoil,
                    ergonomics_sum: computed.ergonomics,
                    selections: computed.selections.clone(),
                },
            )
            .map_err(EngineError::Cache)?;
        Ok(computed)
    }

    fn solve_with_own(&mut self, item: ItemIdx, excluded: &BTreeSet<String>) -> EngineResult<Partial> {
        let node = self.tree.item(item);
        let slots = node.slots.clone();
        let (recoil, ergonomics) = (node.recoil_modifier, node.ergonomics_modifier);
        let mut partial = self.solve(&slots, excluded)?;
        partial.recoil += recoil;
        partial.ergonomics += ergonomics;
        Ok(partial)
    }
}

#[cfg(test)]
mod tests;

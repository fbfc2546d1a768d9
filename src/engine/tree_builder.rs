// ==========================================
// 武器改装最优配置求解 - 候选树构建引擎
// ==========================================
// 输入: 武器 ID + 求解属性 + 求解约束
// 输出: 已填充的候选树（含对称冲突表、区间、排序、剔除结果）
// ==========================================
// 流程:
// 1) 递归展开槽位与允许物品
//    - 强制排除 / 商人等级不满足 → 丢弃
//    - 祖先链上已有相同 (物品, 槽位) → 丢弃并记录诊断
// 2) 冲突登记表对称化
// 3) 自底向上计算区间 + 子树是否无冲突
// 4) 按求解属性的最好值排序候选
// 5) 剔除被无冲突兄弟完全支配的候选
// ==========================================

use crate::domain::constraints::EvaluationConstraints;
use crate::domain::types::{BuildType, ItemKind};
use crate::engine::conflict::ConflictRegistry;
use crate::engine::error::{EngineError, EngineResult};
use crate::engine::tree::{CandidateTree, ItemIdx, ItemNode, SlotIdx, SlotNode, StatBounds};
use crate::repository::data_provider::DataProvider;
use std::cmp::Ordering;
use std::collections::BTreeSet;
use tracing::instrument;

/// 默认最大展开深度
pub const DEFAULT_MAX_TREE_DEPTH: u32 = 32;

// ==========================================
// CandidateTreeBuilder - 候选树构建引擎
// ==========================================
pub struct CandidateTreeBuilder<'a> {
    provider: &'a dyn DataProvider,
    max_depth: u32,
}

impl<'a> CandidateTreeBuilder<'a> {
    pub fn new(provider: &'a dyn DataProvider) -> Self {
        Self {
            provider,
            max_depth: DEFAULT_MAX_TREE_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: u32) -> Self {
        self.max_depth = max_depth;
        self
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 构建候选树
    ///
    /// # 返回
    /// - Ok(CandidateTree): 完成排序与剔除的候选树
    /// - Err(NotFound): 武器不存在
    /// - Err(InvalidConfiguration): 约束不合法
    /// - Err(TreeConstruction): 数据提供方故障（附出错物品 ID）
    #[instrument(skip(self, constraints), fields(
        weapon_id = %weapon_id,
        build_type = %build_type,
        max_depth = self.max_depth
    ))]
    pub fn build(
        &self,
        weapon_id: &str,
        build_type: BuildType,
        constraints: &EvaluationConstraints,
    ) -> EngineResult<CandidateTree> {
        constraints
            .validate()
            .map_err(EngineError::InvalidConfiguration)?;

        let weapon = self
            .provider
            .get_weapon(weapon_id)
            .map_err(|e| EngineError::from_provider(weapon_id, e))?;

        let mut tree = CandidateTree::new(build_type, constraints.clone(), self.max_depth);
        let root = tree.push_item(ItemNode {
            id: weapon.id,
            name: weapon.name,
            kind: ItemKind::Weapon,
            recoil_modifier: weapon.recoil_modifier,
            ergonomics_modifier: weapon.ergonomics_modifier,
            conflicting_item_ids: BTreeSet::new(),
            slots: Vec::new(),
            parent_slot: None,
            bounds: StatBounds::default(),
            subtree_conflict_free: true,
        });

        let mut registry = ConflictRegistry::new();
        self.populate(&mut tree, &mut registry, root, 0)?;
        tree.conflicts = registry.into_symmetric();

        refresh_annotations(&mut tree, root);
        sort_candidates(&mut tree, build_type);
        let pruned = prune_useless_candidates(&mut tree);
        if pruned > 0 {
            refresh_annotations(&mut tree, root);
        }

        tracing::info!(
            "候选树构建完成: weapon_id={}, items={}, height={}, conflict_edges={}, pruned={}, truncated={}",
            weapon_id,
            tree.attached_item_count(),
            tree.height(),
            tree.conflicts.edge_count(),
            pruned,
            tree.truncated
        );

        Ok(tree)
    }

    /// 递归填充物品的槽位
    fn populate(
        &self,
        tree: &mut CandidateTree,
        registry: &mut ConflictRegistry,
        item: ItemIdx,
        depth: u32,
    ) -> EngineResult<()> {
        let item_id = tree.item(item).id.clone();
        let slots = self
            .provider
            .get_slots(&item_id)
            .map_err(|e| EngineError::from_provider(&item_id, e))?;

        if slots.is_empty() {
            return Ok(());
        }
        if depth >= self.max_depth {
            tree.truncated = true;
            tracing::debug!("达到最大展开深度,停止展开: item_id={}, depth={}", item_id, depth);
            return Ok(());
        }

        for slot in slots {
            if tree.constraints.is_slot_ignored(&slot.slot_name) {
                tracing::debug!("忽略槽位: item_id={}, slot={}", item_id, slot.slot_name);
                continue;
            }

            let slot_idx = tree.push_slot(SlotNode {
                id: slot.slot_id.clone(),
                name: slot.slot_name.clone(),
                parent_item: item,
                candidates: Vec::new(),
                bounds: StatBounds::default(),
                cycle_excluded_item_ids: Vec::new(),
                pruned_item_ids: Vec::new(),
            });

            let allowed = self
                .provider
                .get_allowed_items(&slot.slot_id)
                .map_err(|e| EngineError::from_provider(&item_id, e))?;

            for candidate in allowed {
                if let Some(child) =
                    self.try_attach(tree, registry, slot_idx, &candidate.item_id, &candidate.item_name)?
                {
                    self.populate(tree, registry, child, depth + 1)?;
                }
            }
        }

        Ok(())
    }

    /// 过滤并挂载单个候选,返回新节点（被过滤时返回 None）
    fn try_attach(
        &self,
        tree: &mut CandidateTree,
        registry: &mut ConflictRegistry,
        slot: SlotIdx,
        candidate_id: &str,
        candidate_name: &str,
    ) -> EngineResult<Option<ItemIdx>> {
        if tree.constraints.is_item_excluded(candidate_id) {
            return Ok(None);
        }

        let offers = self
            .provider
            .get_trader_offers(candidate_id)
            .map_err(|e| EngineError::from_provider(candidate_id, e))?;
        if !tree.constraints.trader_levels.can_purchase(&offers) {
            return Ok(None);
        }

        if tree.creates_cycle(slot, candidate_id) {
            tracing::debug!(
                "循环防护剔除: item_id={}, slot_id={}",
                candidate_id,
                tree.slot(slot).id
            );
            tree.slot_mut(slot)
                .cycle_excluded_item_ids
                .push(candidate_id.to_string());
            return Ok(None);
        }

        let props = self
            .provider
            .get_attachment_properties(candidate_id)
            .map_err(|e| EngineError::from_provider(candidate_id, e))?;

        registry.add_candidate_item(candidate_id);
        if !props.conflicting_item_ids.is_empty() {
            registry.add_item_conflicts(candidate_id, props.conflicting_item_ids.iter().cloned());
        }

        let child = tree.push_item(ItemNode {
            id: candidate_id.to_string(),
            name: candidate_name.to_string(),
            kind: ItemKind::WeaponMod,
            recoil_modifier: props.recoil_modifier,
            ergonomics_modifier: props.ergonomics_modifier,
            conflicting_item_ids: props.conflicting_item_ids.into_iter().collect(),
            slots: Vec::new(),
            parent_slot: Some(slot),
            bounds: StatBounds::default(),
            subtree_conflict_free: true,
        });
        tree.slot_mut(slot).candidates.push(child);
        Ok(Some(child))
    }
}

// ==========================================
// 构建后处理
// ==========================================

/// 自底向上刷新区间与子树无冲突标记
fn refresh_annotations(tree: &mut CandidateTree, item: ItemIdx) -> (StatBounds, bool) {
    let node = tree.item(item);
    let mut bounds = StatBounds::point(node.recoil_modifier, node.ergonomics_modifier);
    let mut conflict_free = !tree.conflicts.has_live_conflict(&node.id);

    for slot in node.slots.clone() {
        // 空槽位贡献 0
        let mut slot_bounds = StatBounds::point(0, 0);
        for candidate in tree.slot(slot).candidates.clone() {
            let (child_bounds, child_free) = refresh_annotations(tree, candidate);
            slot_bounds = slot_bounds.union(&child_bounds);
            conflict_free &= child_free;
        }
        tree.slot_mut(slot).bounds = slot_bounds;
        bounds = bounds.add(&slot_bounds);
    }

    let node = tree.item_mut(item);
    node.bounds = bounds;
    node.subtree_conflict_free = conflict_free;
    (bounds, conflict_free)
}

/// 候选排序: 按求解属性的可达最好值,其次本身数值,最后按 ID 固定顺序
fn candidate_order(tree: &CandidateTree, build_type: BuildType, a: ItemIdx, b: ItemIdx) -> Ordering {
    let (na, nb) = (tree.item(a), tree.item(b));
    let by_best = na.bounds.best(build_type).cmp(&nb.bounds.best(build_type));
    let by_own = build_type
        .pick(na.recoil_modifier, na.ergonomics_modifier)
        .cmp(&build_type.pick(nb.recoil_modifier, nb.ergonomics_modifier));
    let directed = match build_type {
        BuildType::Recoil => by_best.then(by_own),
        BuildType::Ergonomics => by_best.reverse().then(by_own.reverse()),
    };
    directed.then_with(|| na.id.cmp(&nb.id))
}

fn sort_candidates(tree: &mut CandidateTree, build_type: BuildType) {
    for i in 0..tree.slot_count() {
        let slot = SlotIdx(i);
        let mut candidates = tree.slot(slot).candidates.clone();
        candidates.sort_by(|a, b| candidate_order(tree, build_type, *a, *b));
        tree.slot_mut(slot).candidates = candidates;
    }
}

/// 剔除无用候选: 存在子树无冲突的兄弟,其最优选择一定不劣于该候选的任何选择
///
/// 子树无冲突的兄弟不会给其余槽位带来排除,因此替换后整体不会变差。
/// 前提是搜索时该兄弟子树内的物品都可选（见 `search` 对初始排除集的检查）。
/// 完全持平的候选只保留排序靠前的一个。返回剔除数量。
fn prune_useless_candidates(tree: &mut CandidateTree) -> usize {
    let stat = tree.build_type();
    let mut total = 0;
    for i in 0..tree.slot_count() {
        let slot = SlotIdx(i);
        let candidates = tree.slot(slot).candidates.clone();
        let mut kept = Vec::with_capacity(candidates.len());
        let mut pruned_ids = Vec::new();

        for (j, &candidate) in candidates.iter().enumerate() {
            let target = tree.item(candidate);
            let outranked = candidates.iter().enumerate().any(|(k, &other)| {
                if k == j {
                    return false;
                }
                let rival = tree.item(other);
                rival.subtree_conflict_free && rival.bounds.outranks(&target.bounds, stat, k < j)
            });
            if outranked {
                pruned_ids.push(target.id.clone());
            } else {
                kept.push(candidate);
            }
        }

        if !pruned_ids.is_empty() {
            total += pruned_ids.len();
            let node = tree.slot_mut(slot);
            node.candidates = kept;
            node.pruned_item_ids.extend(pruned_ids);
        }
    }
    total
}

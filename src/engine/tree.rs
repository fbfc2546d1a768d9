// ==========================================
// 武器改装最优配置求解 - 候选树（arena 存储）
// ==========================================
// 所有权: 物品拥有槽位,槽位拥有候选物品,严格树形
// 反向引用: parent_slot / parent_item 只是下标,只用于祖先链检查,不参与生命周期与遍历顺序
// 红线: 同一祖先链上不得出现重复的 (物品, 槽位) 组合
// ==========================================

use crate::domain::constraints::EvaluationConstraints;
use crate::domain::types::{BuildType, ItemKind};
use crate::engine::conflict::ConflictMap;
use std::collections::BTreeSet;

/// 物品节点下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemIdx(pub(crate) usize);

/// 槽位节点下标
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotIdx(pub(crate) usize);

// ==========================================
// StatBounds - 可达属性区间
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatBounds {
    pub min_recoil: i64,
    pub max_recoil: i64,
    pub min_ergonomics: i64,
    pub max_ergonomics: i64,
}

impl StatBounds {
    /// 单点区间
    pub fn point(recoil: i64, ergonomics: i64) -> Self {
        Self {
            min_recoil: recoil,
            max_recoil: recoil,
            min_ergonomics: ergonomics,
            max_ergonomics: ergonomics,
        }
    }

    /// 逐分量相加
    pub fn add(&self, other: &StatBounds) -> Self {
        Self {
            min_recoil: self.min_recoil + other.min_recoil,
            max_recoil: self.max_recoil + other.max_recoil,
            min_ergonomics: self.min_ergonomics + other.min_ergonomics,
            max_ergonomics: self.max_ergonomics + other.max_ergonomics,
        }
    }

    /// 区间并
    pub fn union(&self, other: &StatBounds) -> Self {
        Self {
            min_recoil: self.min_recoil.min(other.min_recoil),
            max_recoil: self.max_recoil.max(other.max_recoil),
            min_ergonomics: self.min_ergonomics.min(other.min_ergonomics),
            max_ergonomics: self.max_ergonomics.max(other.max_ergonomics),
        }
    }

    /// 该属性方向上的最好值
    pub fn best(&self, stat: BuildType) -> i64 {
        match stat {
            BuildType::Recoil => self.min_recoil,
            BuildType::Ergonomics => self.max_ergonomics,
        }
    }

    /// 该属性方向上的最差值
    pub fn worst(&self, stat: BuildType) -> i64 {
        match stat {
            BuildType::Recoil => self.max_recoil,
            BuildType::Ergonomics => self.min_ergonomics,
        }
    }

    /// self 的最优选择是否一定不劣于 other 的任何选择（按求解属性,其次按次要属性）
    ///
    /// - 求解属性的最好值严格更好
    /// - 或持平,且 self 次要属性的最差值仍优于 other 次要属性的最好值
    /// - 完全持平时只有排序在前的一方（self_first）胜出
    pub fn outranks(&self, other: &StatBounds, stat: BuildType, self_first: bool) -> bool {
        let (ours, theirs) = (self.best(stat), other.best(stat));
        if stat.is_better(ours, theirs) {
            return true;
        }
        if ours != theirs {
            return false;
        }
        let secondary = stat.secondary();
        let (our_worst, their_best) = (self.worst(secondary), other.best(secondary));
        secondary.is_better(our_worst, their_best) || (our_worst == their_best && self_first)
    }
}

// ==========================================
// 节点定义
// ==========================================

/// 物品节点（武器或配件）
#[derive(Debug, Clone)]
pub struct ItemNode {
    pub id: String,
    pub name: String,
    pub kind: ItemKind,
    pub recoil_modifier: i64,
    pub ergonomics_modifier: i64,
    /// 源数据声明的冲突
    pub conflicting_item_ids: BTreeSet<String>,
    /// 拥有的槽位（按目录顺序）
    pub slots: Vec<SlotIdx>,
    /// 所在槽位（树根为 None）
    pub parent_slot: Option<SlotIdx>,
    /// 子树内所有选择下的可达区间（忽略冲突）
    pub bounds: StatBounds,
    /// 子树内没有任何物品参与冲突
    pub subtree_conflict_free: bool,
}

/// 槽位节点
#[derive(Debug, Clone)]
pub struct SlotNode {
    pub id: String,
    pub name: String,
    pub parent_item: ItemIdx,
    /// 候选物品（构建完成后按求解属性排序）
    pub candidates: Vec<ItemIdx>,
    /// 候选区间并上空槽位
    pub bounds: StatBounds,
    /// 因循环防护被剔除的物品 ID（诊断用）
    pub cycle_excluded_item_ids: Vec<String>,
    /// 被兄弟候选完全支配而剔除的物品 ID（诊断用）
    pub pruned_item_ids: Vec<String>,
}

// ==========================================
// CandidateTree - 候选树
// ==========================================
#[derive(Debug, Clone)]
pub struct CandidateTree {
    items: Vec<ItemNode>,
    slots: Vec<SlotNode>,
    pub(crate) conflicts: ConflictMap,
    pub(crate) build_type: BuildType,
    pub(crate) constraints: EvaluationConstraints,
    pub(crate) max_depth: u32,
    pub(crate) truncated: bool,
}

impl CandidateTree {
    pub(crate) fn new(
        build_type: BuildType,
        constraints: EvaluationConstraints,
        max_depth: u32,
    ) -> Self {
        Self {
            items: Vec::new(),
            slots: Vec::new(),
            conflicts: ConflictMap::default(),
            build_type,
            constraints,
            max_depth,
            truncated: false,
        }
    }

    /// 树根（武器）
    pub fn root(&self) -> ItemIdx {
        ItemIdx(0)
    }

    pub fn item(&self, idx: ItemIdx) -> &ItemNode {
        &self.items[idx.0]
    }

    pub fn slot(&self, idx: SlotIdx) -> &SlotNode {
        &self.slots[idx.0]
    }

    pub(crate) fn item_mut(&mut self, idx: ItemIdx) -> &mut ItemNode {
        &mut self.items[idx.0]
    }

    pub(crate) fn slot_mut(&mut self, idx: SlotIdx) -> &mut SlotNode {
        &mut self.slots[idx.0]
    }

    pub fn conflicts(&self) -> &ConflictMap {
        &self.conflicts
    }

    pub fn build_type(&self) -> BuildType {
        self.build_type
    }

    pub fn constraints(&self) -> &EvaluationConstraints {
        &self.constraints
    }

    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    /// 是否因深度上限而未完全展开
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// arena 中的槽位总数（含已被剔除子树下的槽位）
    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }

    pub(crate) fn push_item(&mut self, node: ItemNode) -> ItemIdx {
        self.items.push(node);
        ItemIdx(self.items.len() - 1)
    }

    pub(crate) fn push_slot(&mut self, node: SlotNode) -> SlotIdx {
        let parent = node.parent_item;
        self.slots.push(node);
        let idx = SlotIdx(self.slots.len() - 1);
        self.items[parent.0].slots.push(idx);
        idx
    }

    /// 物品到树根的距离（树根为 0）
    pub fn depth(&self, idx: ItemIdx) -> u32 {
        let mut depth = 0;
        let mut current = self.item(idx);
        while let Some(slot) = current.parent_slot {
            depth += 1;
            current = self.item(self.slot(slot).parent_item);
        }
        depth
    }

    /// 把 item_id 放入 slot 是否会在祖先链上重现相同的 (物品, 槽位) 组合
    pub fn creates_cycle(&self, slot: SlotIdx, item_id: &str) -> bool {
        let slot_id = &self.slot(slot).id;
        let mut current = self.item(self.slot(slot).parent_item);
        while let Some(parent_slot) = current.parent_slot {
            let parent_slot_node = self.slot(parent_slot);
            if current.id == item_id && &parent_slot_node.id == slot_id {
                return true;
            }
            current = self.item(parent_slot_node.parent_item);
        }
        false
    }

    /// 子树内（含自身）仍在树上的物品 ID
    pub fn subtree_item_ids(&self, idx: ItemIdx) -> Vec<&str> {
        let mut ids = Vec::new();
        let mut stack = vec![idx];
        while let Some(current) = stack.pop() {
            let node = self.item(current);
            ids.push(node.id.as_str());
            for slot in &node.slots {
                stack.extend(self.slot(*slot).candidates.iter().copied());
            }
        }
        ids
    }

    /// 曾使兄弟候选被剔除的子树内的物品 ID
    ///
    /// 这些物品在搜索时必须可选,否则剔除结论不再成立。
    pub fn pruning_rival_item_ids(&self) -> BTreeSet<&str> {
        let mut ids = BTreeSet::new();
        let mut stack = vec![self.root()];
        while let Some(current) = stack.pop() {
            for slot in &self.item(current).slots {
                let node = self.slot(*slot);
                if !node.pruned_item_ids.is_empty() {
                    for candidate in &node.candidates {
                        if self.item(*candidate).subtree_conflict_free {
                            ids.extend(self.subtree_item_ids(*candidate));
                        }
                    }
                }
                stack.extend(node.candidates.iter().copied());
            }
        }
        ids
    }

    /// 仍挂在树上的物品数量（含树根）
    pub fn attached_item_count(&self) -> usize {
        self.subtree_item_ids(self.root()).len()
    }

    /// 子树高度（只有树根时为 0）
    pub fn height(&self) -> u32 {
        fn walk(tree: &CandidateTree, idx: ItemIdx) -> u32 {
            tree.item(idx)
                .slots
                .iter()
                .flat_map(|s| tree.slot(*s).candidates.iter())
                .map(|c| 1 + walk(tree, *c))
                .max()
                .unwrap_or(0)
        }
        walk(self, self.root())
    }
}

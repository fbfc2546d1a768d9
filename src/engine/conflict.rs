// ==========================================
// 武器改装最优配置求解 - 冲突登记表
// ==========================================
// 职责: 构建候选树时收集物品间互斥关系
// 规则:
// - 只增不减,随所属候选树一起丢弃
// - 交给搜索前必须对称化: 源数据中 A→B 单向声明也视为 A↔B
// ==========================================

use std::collections::{BTreeMap, BTreeSet};

// ==========================================
// ConflictRegistry - 构建期登记表
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct ConflictRegistry {
    conflicts: BTreeMap<String, BTreeSet<String>>,
    candidate_items: BTreeSet<String>,
}

impl ConflictRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 合并某物品声明的冲突
    pub fn add_item_conflicts<I, S>(&mut self, item_id: &str, conflicts: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entry = self.conflicts.entry(item_id.to_string()).or_default();
        for other in conflicts {
            let other = other.into();
            if other != item_id {
                entry.insert(other);
            }
        }
        if entry.is_empty() {
            self.conflicts.remove(item_id);
        }
    }

    /// 登记候选池成员
    pub fn add_candidate_item(&mut self, item_id: &str) {
        self.candidate_items.insert(item_id.to_string());
    }

    pub fn candidate_items(&self) -> &BTreeSet<String> {
        &self.candidate_items
    }

    /// 对称化并冻结
    pub fn into_symmetric(self) -> ConflictMap {
        let mut edges = self.conflicts.clone();
        for (item_id, others) in &self.conflicts {
            for other in others {
                edges
                    .entry(other.clone())
                    .or_default()
                    .insert(item_id.clone());
            }
        }
        ConflictMap {
            edges,
            candidate_items: self.candidate_items,
        }
    }
}

// ==========================================
// ConflictMap - 对称冲突表（搜索期只读）
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConflictMap {
    edges: BTreeMap<String, BTreeSet<String>>,
    candidate_items: BTreeSet<String>,
}

impl ConflictMap {
    /// 与 item_id 互斥的物品
    pub fn conflicts_of(&self, item_id: &str) -> impl Iterator<Item = &String> + '_ {
        self.edges.get(item_id).into_iter().flatten()
    }

    pub fn conflicts(&self, a: &str, b: &str) -> bool {
        self.edges
            .get(a)
            .map(|others| others.contains(b))
            .unwrap_or(false)
    }

    /// 是否与候选池中的某个物品互斥（池外物品无法被选中,不算）
    pub fn has_live_conflict(&self, item_id: &str) -> bool {
        self.conflicts_of(item_id)
            .any(|other| self.candidate_items.contains(other))
    }

    pub fn is_symmetric(&self) -> bool {
        self.edges
            .iter()
            .all(|(a, others)| others.iter().all(|b| self.conflicts(b, a)))
    }

    /// 冲突边数量（对称边计两次）
    pub fn edge_count(&self) -> usize {
        self.edges.values().map(|s| s.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_one_directional_conflict_becomes_symmetric() {
        let mut registry = ConflictRegistry::new();
        registry.add_item_conflicts("stock_big", ["grip_integrated"]);
        registry.add_candidate_item("stock_big");
        registry.add_candidate_item("grip_integrated");

        let map = registry.into_symmetric();
        assert!(map.conflicts("stock_big", "grip_integrated"));
        assert!(map.conflicts("grip_integrated", "stock_big"));
        assert!(map.is_symmetric());
        assert_eq!(map.edge_count(), 2);
    }

    #[test]
    fn test_self_conflict_ignored_and_union() {
        let mut registry = ConflictRegistry::new();
        registry.add_item_conflicts("a", ["a"]);
        registry.add_item_conflicts("b", ["c"]);
        registry.add_item_conflicts("b", ["d", "c"]);

        let map = registry.into_symmetric();
        assert!(!map.conflicts("a", "a"));
        assert_eq!(map.conflicts_of("b").count(), 2);
    }

    #[test]
    fn test_live_conflict_requires_candidate_pool_member() {
        let mut registry = ConflictRegistry::new();
        registry.add_item_conflicts("a", ["ghost"]);
        registry.add_item_conflicts("b", ["c"]);
        registry.add_candidate_item("a");
        registry.add_candidate_item("b");
        registry.add_candidate_item("c");

        let map = registry.into_symmetric();
        assert!(!map.has_live_conflict("a"));
        assert!(map.has_live_conflict("b"));
        assert!(map.has_live_conflict("c"));
    }
}

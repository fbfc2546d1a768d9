// ==========================================
// 武器改装最优配置求解 - 最优配置结果
// ==========================================
// 生命周期: 每次搜索新建 → 完成后持久化 → 被新约束/新数据版本的结果取代（不原地修改）
// ==========================================

use crate::domain::constraints::EvaluationConstraints;
use crate::domain::types::{BuildStatus, BuildType};
use serde::{Deserialize, Serialize};

/// 单个槽位的选择（item 为 None 表示留空）
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildSelection {
    /// 槽位所属物品（武器或上级配件）
    pub parent_item_id: String,
    pub slot_id: String,
    pub slot_name: String,
    pub item_id: Option<String>,
    pub item_name: Option<String>,
}

/// 搜索得到的配置（不含持久化元数据）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    pub item_id: String,
    pub item_name: String,
    pub build_type: BuildType,
    /// 武器本体 + 全部已选配件的后坐力之和
    pub recoil_sum: i64,
    /// 武器本体 + 全部已选配件的人机工效之和
    pub ergonomics_sum: i64,
    pub selections: Vec<BuildSelection>,
}

impl BuildResult {
    /// 求解属性对应的总和
    pub fn focused_sum(&self) -> i64 {
        self.build_type.pick(self.recoil_sum, self.ergonomics_sum)
    }

    /// 已选配件 ID（按决策顺序）
    pub fn chosen_item_ids(&self) -> Vec<&str> {
        self.selections
            .iter()
            .filter_map(|s| s.item_id.as_deref())
            .collect()
    }
}

/// 持久化的最优配置记录
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimalBuild {
    pub build_id: String,
    pub item_id: String,
    pub build_type: BuildType,
    /// 求解时的目录数据版本
    pub data_version: String,
    pub constraints: EvaluationConstraints,
    pub status: BuildStatus,
    pub result: Option<BuildResult>,
    pub error_message: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// 子树缓存记录（按数据版本与评估深度区分）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtreeCacheEntry {
    pub item_id: String,
    pub build_type: BuildType,
    pub constraints: EvaluationConstraints,
    pub data_version: String,
    pub evaluated_depth: u32,
    pub result: BuildResult,
}

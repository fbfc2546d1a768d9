// ==========================================
// 武器改装最优配置求解 - 队列任务
// ==========================================
// 所有权: 创建后归队列所有,被 worker 认领后以最优配置记录为准
// ==========================================

use crate::domain::constraints::EvaluationConstraints;
use crate::domain::types::{BuildType, JobStatus};
use serde::{Deserialize, Serialize};

/// 队列任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// 任务 ID
    pub job_id: String,
    /// 目标武器 ID
    pub item_id: String,
    /// 求解属性
    pub build_type: BuildType,
    /// 求解约束（商人等级元组等）
    pub constraints: EvaluationConstraints,
    /// 优先级（越大越先）
    pub priority: i64,
    /// 任务状态
    pub status: JobStatus,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
    pub error_message: Option<String>,
}

/// 队列统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueStats {
    pub queued_count: u32,
    pub processing_count: u32,
    pub completed_count: u32,
    pub failed_count: u32,
}

// ==========================================
// 武器改装最优配置求解 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、约束
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod build;
pub mod catalog;
pub mod constraints;
pub mod queue;
pub mod types;

// 重导出核心类型
pub use build::{BuildResult, BuildSelection, OptimalBuild, SubtreeCacheEntry};
pub use catalog::{
    AllowedItemRecord, AttachmentProperties, CatalogItem, SlotRecord, TraderOffer, WeaponRecord,
};
pub use constraints::{EvaluationConstraints, TraderLevels};
pub use queue::{QueueEntry, QueueStats};
pub use types::{BuildStatus, BuildType, ItemKind, JobStatus, Trader};

// ==========================================
// 武器改装最优配置求解 - 核心库
// ==========================================
// 技术栈: Rust + SQLite + tokio
// 系统定位: 离线批量求解服务（队列驱动）
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 候选树与搜索
pub mod engine;

// 缓存层 - 无冲突子树缓存
pub mod cache;

// 服务层 - 队列任务调度
pub mod services;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{BuildStatus, BuildType, ItemKind, JobStatus, Trader};

// 领域实体
pub use domain::{
    BuildResult, BuildSelection, EvaluationConstraints, OptimalBuild, QueueEntry, QueueStats,
    TraderLevels,
};

// 引擎
pub use engine::{search, CandidateTree, CandidateTreeBuilder, EngineError, SearchOutcome};

// 缓存
pub use cache::{create_cache, CacheBackend, ConflictFreeCache};

// 服务
pub use services::{BatchSweep, EvaluationService, JobOutcome, WorkerPool, WorkerPoolHandle};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "武器改装最优配置求解";

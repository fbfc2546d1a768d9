// ==========================================
// 武器改装最优配置求解 - 服务层
// ==========================================
// 职责: 串联仓储与引擎,驱动队列任务的完整生命周期
// - evaluation_service: 单个任务的求解与持久化
// - worker_pool: 轮询认领 + 并发 worker
// - batch_sweep: 批量入队
// ==========================================

pub mod batch_sweep;
pub mod evaluation_service;
pub mod worker_pool;

pub use batch_sweep::BatchSweep;
pub use evaluation_service::{EvaluationError, EvaluationService, JobOutcome};
pub use worker_pool::{WorkerPool, WorkerPoolHandle, WorkerPoolSettings, WorkerPoolStats};

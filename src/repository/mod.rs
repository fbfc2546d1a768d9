// ==========================================
// 武器改装最优配置求解 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod catalog_repo;
pub mod data_provider;
pub mod error;
pub mod optimal_build_repo;
pub mod queue_repo;
pub mod subtree_cache_repo;

// 重导出核心仓储
pub use catalog_repo::CatalogRepository;
pub use data_provider::{DataProvider, SqliteDataProvider};
pub use error::{RepositoryError, RepositoryResult};
pub use optimal_build_repo::OptimalBuildRepository;
pub use queue_repo::EvaluationQueueRepository;
pub use subtree_cache_repo::SubtreeCacheRepository;

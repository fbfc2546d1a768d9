// ==========================================
// 武器改装最优配置求解 - 单任务求解服务
// ==========================================
// 职责: 把一个已认领的队列任务走完整条流水线
// 流程:
// 1) 幂等检查: 当前数据版本已有完成的最优配置 → 直接标记任务完成,不重新计算
// 2) 登记进行中的最优配置记录
// 3) 子树缓存（数据版本一致且评估深度足够）命中则直接使用
// 4) 否则: 构建候选树 → 搜索 → 写回子树缓存
// 5) 写入最优配置 → 标记任务完成
// 失败: 任何一步出错都把最优配置记录（若已创建）与任务标记为 FAILED,
//       服务本身不向上抛出,worker 继续处理下一个任务
// ==========================================

use crate::cache::ConflictFreeCache;
use crate::config::{OptimizerConfig, DEFAULT_DATA_VERSION};
use crate::db::SharedConnection;
use crate::domain::build::{BuildResult, SubtreeCacheEntry};
use crate::domain::constraints::EvaluationConstraints;
use crate::domain::queue::QueueEntry;
use crate::domain::types::BuildType;
use crate::engine::error::EngineError;
use crate::engine::search::{search, SearchStats};
use crate::engine::tree_builder::{CandidateTreeBuilder, DEFAULT_MAX_TREE_DEPTH};
use crate::repository::data_provider::{DataProvider, SqliteDataProvider};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::optimal_build_repo::OptimalBuildRepository;
use crate::repository::queue_repo::EvaluationQueueRepository;
use crate::repository::subtree_cache_repo::SubtreeCacheRepository;
use std::collections::BTreeSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::instrument;

/// 求解流水线错误（引擎错误或持久化错误）
#[derive(Error, Debug)]
pub enum EvaluationError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// 单个任务的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// 已存在完成的最优配置,任务直接完成
    AlreadyCompleted { build_id: String },
    /// 求解完成并持久化
    Completed {
        build_id: String,
        recoil_sum: i64,
        ergonomics_sum: i64,
        from_subtree_cache: bool,
    },
    /// 求解失败,任务与最优配置记录均已标记 FAILED
    Failed { error_message: String },
}

/// 求解结果 + 来源
struct Evaluation {
    result: BuildResult,
    from_subtree_cache: bool,
}

// ==========================================
// EvaluationService - 求解服务
// ==========================================
pub struct EvaluationService {
    provider: Arc<dyn DataProvider>,
    queue_repo: EvaluationQueueRepository,
    build_repo: OptimalBuildRepository,
    subtree_repo: SubtreeCacheRepository,
    cache: Arc<dyn ConflictFreeCache>,
    max_tree_depth: u32,
    data_version: String,
}

impl EvaluationService {
    /// 从共享连接创建（数据提供方使用 SQLite 目录表）
    pub fn from_connection(conn: SharedConnection, cache: Arc<dyn ConflictFreeCache>) -> Self {
        let provider: Arc<dyn DataProvider> = Arc::new(SqliteDataProvider::from_connection(conn.clone()));
        Self::with_provider(conn, provider, cache)
    }

    /// 按运行配置创建（最大深度 + 数据版本）
    ///
    /// cache 应由 create_cache 以同一数据版本创建
    pub fn from_config(
        conn: SharedConnection,
        cache: Arc<dyn ConflictFreeCache>,
        config: &OptimizerConfig,
    ) -> Self {
        Self::from_connection(conn, cache)
            .with_max_tree_depth(config.max_tree_depth)
            .with_data_version(config.data_version.clone())
    }

    /// 使用外部数据提供方创建
    pub fn with_provider(
        conn: SharedConnection,
        provider: Arc<dyn DataProvider>,
        cache: Arc<dyn ConflictFreeCache>,
    ) -> Self {
        Self {
            provider,
            queue_repo: EvaluationQueueRepository::from_connection(conn.clone()),
            build_repo: OptimalBuildRepository::from_connection(conn.clone()),
            subtree_repo: SubtreeCacheRepository::from_connection(conn),
            cache,
            max_tree_depth: DEFAULT_MAX_TREE_DEPTH,
            data_version: DEFAULT_DATA_VERSION.to_string(),
        }
    }

    pub fn with_max_tree_depth(mut self, max_tree_depth: u32) -> Self {
        self.max_tree_depth = max_tree_depth;
        self
    }

    pub fn with_data_version(mut self, data_version: impl Into<String>) -> Self {
        self.data_version = data_version.into();
        self
    }

    pub fn data_version(&self) -> &str {
        &self.data_version
    }

    // ==========================================
    // 核心方法
    // ==========================================

    /// 处理一个已认领（PROCESSING）的任务
    ///
    /// # 返回
    /// - Ok(JobOutcome): 任务已进入终态（含 Failed）
    /// - Err: 连失败状态都无法写回（数据库不可用等）
    #[instrument(skip(self, job), fields(job_id = %job.job_id, item_id = %job.item_id, build_type = %job.build_type))]
    pub fn process_job(&self, job: &QueueEntry) -> RepositoryResult<JobOutcome> {
        tracing::info!("开始处理求解任务: job_id={}", job.job_id);

        let mut build_id: Option<String> = None;
        match self.run_pipeline(job, &mut build_id) {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                let error_message = err.to_string();
                tracing::error!(
                    "求解任务失败: job_id={}, item_id={}, error={}",
                    job.job_id,
                    job.item_id,
                    error_message
                );
                if let Some(build_id) = &build_id {
                    self.build_repo.mark_failed(build_id, &error_message)?;
                }
                self.queue_repo.set_failed(&job.job_id, &error_message)?;
                Ok(JobOutcome::Failed { error_message })
            }
        }
    }

    fn run_pipeline(
        &self,
        job: &QueueEntry,
        build_id_slot: &mut Option<String>,
    ) -> Result<JobOutcome, EvaluationError> {
        if let Some(existing) = self.build_repo.get_completed(
            &job.item_id,
            job.build_type,
            &job.constraints,
            &self.data_version,
        )? {
            self.queue_repo.set_completed(&job.job_id)?;
            tracing::info!(
                "已存在完成的最优配置,跳过求解: job_id={}, build_id={}",
                job.job_id,
                existing.build_id
            );
            return Ok(JobOutcome::AlreadyCompleted {
                build_id: existing.build_id,
            });
        }

        let build_id = self.build_repo.mark_processing(
            &job.item_id,
            job.build_type,
            &job.constraints,
            &self.data_version,
        )?;
        *build_id_slot = Some(build_id);

        let evaluation = self.evaluate_with_subtree_cache(&job.item_id, job.build_type, &job.constraints)?;
        let build_id = self.build_repo.upsert_completed(
            &job.constraints,
            &self.data_version,
            &evaluation.result,
        )?;
        self.queue_repo.set_completed(&job.job_id)?;

        tracing::info!(
            "求解任务完成: job_id={}, build_id={}, recoil_sum={}, ergonomics_sum={}, from_subtree_cache={}",
            job.job_id,
            build_id,
            evaluation.result.recoil_sum,
            evaluation.result.ergonomics_sum,
            evaluation.from_subtree_cache
        );

        Ok(JobOutcome::Completed {
            build_id,
            recoil_sum: evaluation.result.recoil_sum,
            ergonomics_sum: evaluation.result.ergonomics_sum,
            from_subtree_cache: evaluation.from_subtree_cache,
        })
    }

    /// 先查子树缓存,未命中时完整求解并写回
    fn evaluate_with_subtree_cache(
        &self,
        item_id: &str,
        build_type: BuildType,
        constraints: &EvaluationConstraints,
    ) -> Result<Evaluation, EvaluationError> {
        if let Some(entry) = self.subtree_repo.get(
            item_id,
            build_type,
            constraints,
            &self.data_version,
            self.max_tree_depth,
        )? {
            tracing::debug!(
                "子树缓存命中: item_id={}, data_version={}, evaluated_depth={}",
                item_id,
                entry.data_version,
                entry.evaluated_depth
            );
            return Ok(Evaluation {
                result: entry.result,
                from_subtree_cache: true,
            });
        }

        let (result, _stats) = self.evaluate(item_id, build_type, constraints)?;
        self.subtree_repo.upsert(&SubtreeCacheEntry {
            item_id: item_id.to_string(),
            build_type,
            constraints: constraints.clone(),
            data_version: self.data_version.clone(),
            evaluated_depth: self.max_tree_depth,
            result: result.clone(),
        })?;

        Ok(Evaluation {
            result,
            from_subtree_cache: false,
        })
    }

    /// 构建候选树并搜索（不读写队列与结果表）
    ///
    /// 无冲突缓存的数据版本与服务不一致时不使用缓存
    pub fn evaluate(
        &self,
        item_id: &str,
        build_type: BuildType,
        constraints: &EvaluationConstraints,
    ) -> Result<(BuildResult, SearchStats), EngineError> {
        let tree = CandidateTreeBuilder::new(self.provider.as_ref())
            .with_max_depth(self.max_tree_depth)
            .build(item_id, build_type, constraints)?;
        let outcome = search(&tree, build_type, &BTreeSet::new(), self.versioned_cache())?;
        Ok((outcome.result, outcome.stats))
    }

    fn versioned_cache(&self) -> Option<&dyn ConflictFreeCache> {
        if self.cache.data_version() == self.data_version {
            return Some(self.cache.as_ref());
        }
        tracing::warn!(
            "无冲突缓存数据版本不一致,本次求解不使用缓存: cache={}, service={}",
            self.cache.data_version(),
            self.data_version
        );
        None
    }
}

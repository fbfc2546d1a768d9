// ==========================================
// 武器改装最优配置求解 - 服务主入口
// ==========================================
// 启动流程: 日志 → 数据库 → 运行配置 → 缓存 → 求解服务 → worker 池
// Ctrl+C 后停止认领并等待进行中的任务完成
// ==========================================

use anyhow::Context;
use std::sync::Arc;
use weapon_build_optimizer::config::{ConfigManager, OptimizerConfig};
use weapon_build_optimizer::db::{get_default_db_path, open_shared_connection};
use weapon_build_optimizer::repository::{EvaluationQueueRepository, SubtreeCacheRepository};
use weapon_build_optimizer::services::{EvaluationService, WorkerPool, WorkerPoolSettings};
use weapon_build_optimizer::cache::SqliteConflictFreeCache;
use weapon_build_optimizer::{create_cache, logging, CacheBackend};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    match std::env::var("WEAPON_BUILD_OPTIMIZER_LOG_FORMAT").as_deref() {
        Ok("json") => logging::init_json(),
        _ => logging::init(),
    }

    tracing::info!("==================================================");
    tracing::info!("{}", weapon_build_optimizer::APP_NAME);
    tracing::info!("系统版本: {}", weapon_build_optimizer::VERSION);
    tracing::info!("==================================================");

    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);
    let conn = open_shared_connection(&db_path)
        .with_context(|| format!("无法打开数据库: {}", db_path))?;

    let config_manager = ConfigManager::from_connection(conn.clone()).context("无法初始化配置管理器")?;
    let config = OptimizerConfig::load(&config_manager).context("运行配置不合法")?;

    // 旧数据版本的缓存不会再命中
    let purged = SubtreeCacheRepository::from_connection(conn.clone())
        .purge_other_versions(&config.data_version)
        .context("清理子树缓存失败")?;
    if purged > 0 {
        tracing::info!("已清理旧版本子树缓存: {} 条", purged);
    }

    if config.cache_backend == CacheBackend::Sqlite {
        let purged = SqliteConflictFreeCache::from_connection(conn.clone())
            .with_data_version(config.data_version.clone())
            .purge_other_versions()
            .context("清理无冲突缓存失败")?;
        if purged > 0 {
            tracing::info!("已清理旧版本无冲突缓存: {} 条", purged);
        }
    }

    let cache = create_cache(config.cache_backend, conn.clone(), &config.data_version);
    let service = Arc::new(EvaluationService::from_config(conn.clone(), cache, &config));
    let queue_repo = EvaluationQueueRepository::from_connection(conn);

    let pool = WorkerPool::start(service, queue_repo, WorkerPoolSettings::from_config(&config));

    tokio::signal::ctrl_c().await.context("无法监听退出信号")?;
    tracing::info!("收到退出信号,等待进行中的任务完成...");
    let stats = pool.shutdown().await;
    tracing::info!(
        "服务已退出: completed={}, failed={}",
        stats.completed,
        stats.failed
    );

    Ok(())
}

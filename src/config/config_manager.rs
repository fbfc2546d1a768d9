// ==========================================
// 武器改装最优配置求解 - 配置管理器
// ==========================================
// 职责: 配置读取、覆写、快照
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::db::SharedConnection;
use crate::repository::error::{RepositoryError, RepositoryResult};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::MutexGuard;

/// 全局配置作用域
pub const GLOBAL_SCOPE: &str = "global";

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: SharedConnection,
}

impl ConfigManager {
    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: SharedConnection) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            crate::db::configure_sqlite_connection(&guard)?;
        }
        Ok(Self { conn })
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 读取 global scope 的配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.get_conn()?;
        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
                params![GLOBAL_SCOPE, key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 读取配置值，带默认值
    pub fn get_config_or_default(&self, key: &str, default: &str) -> RepositoryResult<String> {
        Ok(self
            .get_global_config_value(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    /// 写入 global scope 的配置值（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO config_kv (scope_id, key, value, updated_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            ON CONFLICT(scope_id, key) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
            params![GLOBAL_SCOPE, key, value],
        )?;
        tracing::info!("配置已更新: {}={}", key, value);
        Ok(())
    }

    /// 获取所有 global 配置的快照（JSON 格式,按键排序）
    ///
    /// # 用途
    /// - 启动时记录生效配置
    pub fn get_config_snapshot(&self) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = ?1 ORDER BY key")?;
        let rows = stmt.query_map(params![GLOBAL_SCOPE], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut config_map = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }
        Ok(serde_json::to_string(&config_map)?)
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // worker 池
    pub const WORKER_PARALLELISM_FACTOR: &str = "worker.parallelism_factor";
    pub const WORKER_POLL_INTERVAL_MS: &str = "worker.poll_interval_ms";
    pub const WORKER_CHANNEL_CAPACITY: &str = "worker.channel_capacity";

    // 求解
    pub const EVALUATION_MAX_TREE_DEPTH: &str = "evaluation.max_tree_depth";

    // 目录数据版本（重新导入后更换,子树缓存随之失效）
    pub const CATALOG_DATA_VERSION: &str = "catalog.data_version";

    // 无冲突缓存后端: memory | sqlite
    pub const CACHE_BACKEND: &str = "cache.backend";
}

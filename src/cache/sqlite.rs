// ==========================================
// 武器改装最优配置求解 - SQLite 无冲突缓存
// ==========================================
// 表: conflict_free_cache
// 唯一约束 (item_id, build_type, trader_key, data_version) 保证按键查询走索引,
// 并发写同一键时后写者胜
// 读写只触及本实例数据版本的行,启动时清理其它版本
// 命中时同时返回两个属性的总和
// ==========================================

use crate::cache::{CacheCounters, CacheEntry, CacheStats, ConflictFreeCache};
use crate::config::DEFAULT_DATA_VERSION;
use crate::db::SharedConnection;
use crate::domain::build::BuildSelection;
use crate::domain::constraints::EvaluationConstraints;
use crate::domain::types::BuildType;
use crate::repository::error::{column_parse_error, RepositoryError, RepositoryResult};
use crate::repository::queue_repo::now_timestamp;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::MutexGuard;

pub struct SqliteConflictFreeCache {
    conn: SharedConnection,
    counters: CacheCounters,
    data_version: String,
}

impl SqliteConflictFreeCache {
    /// 从已有连接创建（默认数据版本）
    pub fn from_connection(conn: SharedConnection) -> Self {
        Self {
            conn,
            counters: CacheCounters::default(),
            data_version: DEFAULT_DATA_VERSION.to_string(),
        }
    }

    pub fn with_data_version(mut self, data_version: impl Into<String>) -> Self {
        self.data_version = data_version.into();
        self
    }

    /// 删除非本实例数据版本的条目,返回删除行数
    pub fn purge_other_versions(&self) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let deleted = conn.execute(
            "DELETE FROM conflict_free_cache WHERE data_version <> ?1",
            params![self.data_version],
        )?;
        Ok(deleted)
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }
}

impl ConflictFreeCache for SqliteConflictFreeCache {
    fn get(
        &self,
        item_id: &str,
        build_type: BuildType,
        constraints: &EvaluationConstraints,
    ) -> RepositoryResult<Option<CacheEntry>> {
        let conn = self.get_conn()?;
        let entry = conn
            .query_row(
                r#"
                SELECT recoil_sum, ergonomics_sum, selections_json
                FROM conflict_free_cache
                WHERE item_id = ?1 AND build_type = ?2 AND trader_key = ?3
                  AND data_version = ?4
                "#,
                params![
                    item_id,
                    build_type.as_str(),
                    constraints.trader_levels.cache_key(),
                    self.data_version,
                ],
                |row| {
                    let json: String = row.get(2)?;
                    let selections: Vec<BuildSelection> = serde_json::from_str(&json)
                        .map_err(|e| column_parse_error(2, e.to_string()))?;
                    Ok(CacheEntry {
                        item_id: item_id.to_string(),
                        build_type,
                        recoil_sum: row.get(0)?,
                        ergonomics_sum: row.get(1)?,
                        selections,
                    })
                },
            )
            .optional()?;
        self.counters.record_lookup(entry.is_some());
        Ok(entry)
    }

    fn set(&self, constraints: &EvaluationConstraints, entry: &CacheEntry) -> RepositoryResult<()> {
        let selections_json = serde_json::to_string(&entry.selections)?;
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO conflict_free_cache (
                item_id, build_type, trader_key, data_version,
                recoil_sum, ergonomics_sum, selections_json, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(item_id, build_type, trader_key, data_version) DO UPDATE SET
                recoil_sum = excluded.recoil_sum,
                ergonomics_sum = excluded.ergonomics_sum,
                selections_json = excluded.selections_json,
                updated_at = excluded.updated_at
            "#,
            params![
                entry.item_id,
                entry.build_type.as_str(),
                constraints.trader_levels.cache_key(),
                self.data_version,
                entry.recoil_sum,
                entry.ergonomics_sum,
                selections_json,
                now_timestamp(),
            ],
        )?;
        self.counters.record_write();
        Ok(())
    }

    fn clear(&self) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let deleted = conn.execute("DELETE FROM conflict_free_cache", [])?;
        tracing::info!("无冲突缓存已清空: deleted={}", deleted);
        Ok(())
    }

    fn data_version(&self) -> &str {
        &self.data_version
    }

    fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }
}

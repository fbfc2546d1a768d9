// ==========================================
// 武器改装最优配置求解 - 子树缓存仓储
// ==========================================
// 职责: subtree_cache 表读写
// 命中条件: 数据版本完全一致 且 evaluated_depth >= 查询所需深度
// 说明: 目录重新导入会更换 data_version,旧缓存自然失效
// 写入: 同键只保留评估深度更深（或相同）的结果,较浅的写入被忽略
// ==========================================

use crate::db::SharedConnection;
use crate::domain::build::{BuildResult, SubtreeCacheEntry};
use crate::domain::constraints::EvaluationConstraints;
use crate::domain::types::BuildType;
use crate::repository::error::{column_parse_error, RepositoryError, RepositoryResult};
use crate::repository::queue_repo::now_timestamp;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::MutexGuard;

// ==========================================
// SubtreeCacheRepository - 子树缓存仓储
// ==========================================
pub struct SubtreeCacheRepository {
    conn: SharedConnection,
}

impl SubtreeCacheRepository {
    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: SharedConnection) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 查询可用的子树缓存
    pub fn get(
        &self,
        item_id: &str,
        build_type: BuildType,
        constraints: &EvaluationConstraints,
        data_version: &str,
        required_depth: u32,
    ) -> RepositoryResult<Option<SubtreeCacheEntry>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT evaluated_depth, result_json
                FROM subtree_cache
                WHERE item_id = ?1 AND build_type = ?2
                  AND constraints_key = ?3 AND data_version = ?4
                  AND evaluated_depth >= ?5
                "#,
                params![
                    item_id,
                    build_type.as_str(),
                    constraints.cache_key(),
                    data_version,
                    required_depth,
                ],
                |row| {
                    let depth: u32 = row.get(0)?;
                    let json: String = row.get(1)?;
                    let result: BuildResult = serde_json::from_str(&json)
                        .map_err(|e| column_parse_error(1, e.to_string()))?;
                    Ok((depth, result))
                },
            )
            .optional()?;

        Ok(row.map(|(evaluated_depth, result)| SubtreeCacheEntry {
            item_id: item_id.to_string(),
            build_type,
            constraints: constraints.clone(),
            data_version: data_version.to_string(),
            evaluated_depth,
            result,
        }))
    }

    /// 插入或更新子树缓存（已有更深的条目时不覆盖）
    pub fn upsert(&self, entry: &SubtreeCacheEntry) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO subtree_cache (
                item_id, build_type, constraints_key, data_version,
                evaluated_depth, constraints_json, result_json, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            ON CONFLICT(item_id, build_type, constraints_key, data_version) DO UPDATE SET
                evaluated_depth = excluded.evaluated_depth,
                result_json = excluded.result_json,
                updated_at = excluded.updated_at
            WHERE excluded.evaluated_depth >= subtree_cache.evaluated_depth
            "#,
            params![
                entry.item_id,
                entry.build_type.as_str(),
                entry.constraints.cache_key(),
                entry.data_version,
                entry.evaluated_depth,
                serde_json::to_string(&entry.constraints)?,
                serde_json::to_string(&entry.result)?,
                now_timestamp(),
            ],
        )?;
        Ok(())
    }

    /// 删除非当前数据版本的缓存,返回删除行数
    pub fn purge_other_versions(&self, data_version: &str) -> RepositoryResult<usize> {
        let conn = self.get_conn()?;
        let deleted = conn.execute(
            "DELETE FROM subtree_cache WHERE data_version <> ?1",
            params![data_version],
        )?;
        Ok(deleted)
    }
}

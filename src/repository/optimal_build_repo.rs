// ==========================================
// 武器改装最优配置求解 - 最优配置仓储
// ==========================================
// 职责: optimal_build 表读写
// 唯一键: (item_id, build_type, constraints_key, data_version),并发 upsert 以最后写入者为准
// 目录重新导入（数据版本变化）后同一请求写入新行,旧版本结果保留
// ==========================================

use crate::db::SharedConnection;
use crate::domain::build::{BuildResult, OptimalBuild};
use crate::domain::constraints::EvaluationConstraints;
use crate::domain::types::{BuildStatus, BuildType};
use crate::repository::error::{column_parse_error, RepositoryError, RepositoryResult};
use crate::repository::queue_repo::now_timestamp;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::MutexGuard;
use uuid::Uuid;

fn map_build_row(row: &Row<'_>) -> rusqlite::Result<OptimalBuild> {
    let build_type_str: String = row.get(2)?;
    let build_type = build_type_str
        .parse::<BuildType>()
        .map_err(|e| column_parse_error(2, e))?;
    let constraints_json: String = row.get(4)?;
    let constraints: EvaluationConstraints = serde_json::from_str(&constraints_json)
        .map_err(|e| column_parse_error(4, e.to_string()))?;
    let status_str: String = row.get(5)?;
    let status = status_str
        .parse::<BuildStatus>()
        .map_err(|e| column_parse_error(5, e))?;
    let result_json: Option<String> = row.get(6)?;
    let result = match result_json {
        Some(json) => Some(
            serde_json::from_str::<BuildResult>(&json)
                .map_err(|e| column_parse_error(6, e.to_string()))?,
        ),
        None => None,
    };

    Ok(OptimalBuild {
        build_id: row.get(0)?,
        item_id: row.get(1)?,
        build_type,
        data_version: row.get(3)?,
        constraints,
        status,
        result,
        error_message: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

// ==========================================
// OptimalBuildRepository - 最优配置仓储
// ==========================================
pub struct OptimalBuildRepository {
    conn: SharedConnection,
}

impl OptimalBuildRepository {
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

    /// 查询 (item, build_type, constraints, data_version) 对应的记录（任意状态）
    pub fn find(
        &self,
        item_id: &str,
        build_type: BuildType,
        constraints: &EvaluationConstraints,
        data_version: &str,
    ) -> RepositoryResult<Option<OptimalBuild>> {
        let conn = self.get_conn()?;
        let build = conn
            .query_row(
                r#"
                SELECT build_id, item_id, build_type, data_version, constraints_json,
                       status, result_json, error_message, created_at, updated_at
                FROM optimal_build
                WHERE item_id = ?1 AND build_type = ?2 AND constraints_key = ?3
                  AND data_version = ?4
                "#,
                params![
                    item_id,
                    build_type.as_str(),
                    constraints.cache_key(),
                    data_version
                ],
                map_build_row,
            )
            .optional()?;
        Ok(build)
    }

    /// 查询当前数据版本下已完成的记录（幂等恢复检查使用）
    pub fn get_completed(
        &self,
        item_id: &str,
        build_type: BuildType,
        constraints: &EvaluationConstraints,
        data_version: &str,
    ) -> RepositoryResult<Option<OptimalBuild>> {
        Ok(self
            .find(item_id, build_type, constraints, data_version)?
            .filter(|b| b.status == BuildStatus::Completed))
    }

    /// 登记进行中的记录,返回 build_id（已存在时复用原 build_id）
    pub fn mark_processing(
        &self,
        item_id: &str,
        build_type: BuildType,
        constraints: &EvaluationConstraints,
        data_version: &str,
    ) -> RepositoryResult<String> {
        self.upsert(
            item_id,
            build_type,
            constraints,
            data_version,
            BuildStatus::Processing,
            None,
        )
    }

    /// 写入已完成的最优配置
    pub fn upsert_completed(
        &self,
        constraints: &EvaluationConstraints,
        data_version: &str,
        result: &BuildResult,
    ) -> RepositoryResult<String> {
        let result_json = serde_json::to_string(result)?;
        self.upsert(
            &result.item_id,
            result.build_type,
            constraints,
            data_version,
            BuildStatus::Completed,
            Some(result_json),
        )
    }

    /// 标记失败（附错误信息）
    pub fn mark_failed(&self, build_id: &str, error_message: &str) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let updated = conn.execute(
            r#"
            UPDATE optimal_build
            SET status = 'FAILED', error_message = ?2, updated_at = ?3
            WHERE build_id = ?1
            "#,
            params![build_id, error_message, now_timestamp()],
        )?;
        if updated == 0 {
            return Err(RepositoryError::not_found("optimal_build", build_id));
        }
        Ok(())
    }

    fn upsert(
        &self,
        item_id: &str,
        build_type: BuildType,
        constraints: &EvaluationConstraints,
        data_version: &str,
        status: BuildStatus,
        result_json: Option<String>,
    ) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        let now = now_timestamp();
        let constraints_key = constraints.cache_key();
        conn.execute(
            r#"
            INSERT INTO optimal_build (
                build_id, item_id, build_type, constraints_key, data_version,
                constraints_json, status, result_json, error_message, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9, ?9)
            ON CONFLICT(item_id, build_type, constraints_key, data_version) DO UPDATE SET
                status = excluded.status,
                result_json = excluded.result_json,
                error_message = NULL,
                updated_at = excluded.updated_at
            "#,
            params![
                Uuid::new_v4().to_string(),
                item_id,
                build_type.as_str(),
                constraints_key,
                data_version,
                serde_json::to_string(constraints)?,
                status.as_str(),
                result_json,
                now,
            ],
        )?;

        let build_id: String = conn.query_row(
            r#"
            SELECT build_id FROM optimal_build
            WHERE item_id = ?1 AND build_type = ?2 AND constraints_key = ?3
              AND data_version = ?4
            "#,
            params![item_id, build_type.as_str(), constraints_key, data_version],
            |row| row.get(0),
        )?;
        Ok(build_id)
    }
}

// ==========================================
// 武器改装最优配置求解 - 求解队列仓储
// ==========================================
// 职责: evaluation_queue 表的入队 / 认领 / 状态迁移
// 状态机: QUEUED → PROCESSING → {COMPLETED | FAILED},终态不可迁出
// 认领: IMMEDIATE 事务内 select + 条件 update,多个 worker 不会重复认领同一任务
// ==========================================

use crate::db::SharedConnection;
use crate::domain::constraints::EvaluationConstraints;
use crate::domain::queue::{QueueEntry, QueueStats};
use crate::domain::types::{BuildType, JobStatus};
use crate::repository::error::{column_parse_error, RepositoryError, RepositoryResult};
use chrono::{SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, TransactionBehavior};
use std::sync::MutexGuard;
use uuid::Uuid;

const QUEUE_COLUMNS: &str = r#"
    job_id, item_id, build_type, constraints_json, priority, status,
    created_at, started_at, completed_at, error_message
"#;

/// 定宽时间戳（保证字符串排序即时间排序）
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn map_queue_row(row: &Row<'_>) -> rusqlite::Result<QueueEntry> {
    let build_type_str: String = row.get(2)?;
    let build_type = build_type_str
        .parse::<BuildType>()
        .map_err(|e| column_parse_error(2, e))?;
    let constraints_json: String = row.get(3)?;
    let constraints: EvaluationConstraints = serde_json::from_str(&constraints_json)
        .map_err(|e| column_parse_error(3, e.to_string()))?;
    let status_str: String = row.get(5)?;
    let status = status_str
        .parse::<JobStatus>()
        .map_err(|e| column_parse_error(5, e))?;

    Ok(QueueEntry {
        job_id: row.get(0)?,
        item_id: row.get(1)?,
        build_type,
        constraints,
        priority: row.get(4)?,
        status,
        created_at: row.get(6)?,
        started_at: row.get(7)?,
        completed_at: row.get(8)?,
        error_message: row.get(9)?,
    })
}

// ==========================================
// EvaluationQueueRepository - 求解队列仓储
// ==========================================
pub struct EvaluationQueueRepository {
    conn: SharedConnection,
}

impl EvaluationQueueRepository {
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

    /// 提交求解任务到队列
    ///
    /// # 返回
    /// - Ok(job_id): 新任务 ID
    /// - Err(ValidationError): 约束不合法（商人等级越界等）
    pub fn enqueue(
        &self,
        item_id: &str,
        build_type: BuildType,
        constraints: &EvaluationConstraints,
        priority: i64,
    ) -> RepositoryResult<String> {
        constraints
            .validate()
            .map_err(RepositoryError::ValidationError)?;
        if item_id.trim().is_empty() {
            return Err(RepositoryError::FieldValueError {
                field: "item_id".to_string(),
                message: "不能为空".to_string(),
            });
        }

        let job_id = Uuid::new_v4().to_string();
        let constraints_json = serde_json::to_string(constraints)?;

        let conn = self.get_conn()?;
        conn.execute(
            r#"
            INSERT INTO evaluation_queue (
                job_id, item_id, build_type, constraints_json, priority, status, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                job_id,
                item_id,
                build_type.as_str(),
                constraints_json,
                priority,
                JobStatus::Queued.as_str(),
                now_timestamp(),
            ],
        )?;

        tracing::info!(
            "求解任务已加入队列: job_id={}, item_id={}, build_type={}, priority={}",
            job_id,
            item_id,
            build_type,
            priority
        );

        Ok(job_id)
    }

    /// 认领下一个任务（优先级降序,同优先级按创建时间升序）
    ///
    /// 认领成功的任务在返回前已经是 PROCESSING,并记录了 started_at
    pub fn claim_next_job(&self) -> RepositoryResult<Option<QueueEntry>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let candidate = tx
            .query_row(
                &format!(
                    r#"
                    SELECT {}
                    FROM evaluation_queue
                    WHERE status = 'QUEUED'
                    ORDER BY priority DESC, created_at ASC, rowid ASC
                    LIMIT 1
                    "#,
                    QUEUE_COLUMNS
                ),
                [],
                map_queue_row,
            )
            .optional()?;

        let Some(mut entry) = candidate else {
            tx.commit()?;
            return Ok(None);
        };

        let started_at = now_timestamp();
        let updated = tx.execute(
            r#"
            UPDATE evaluation_queue
            SET status = 'PROCESSING', started_at = ?1
            WHERE job_id = ?2 AND status = 'QUEUED'
            "#,
            params![started_at, entry.job_id],
        )?;
        tx.commit()?;

        if updated == 0 {
            // 已被其他连接抢先认领
            return Ok(None);
        }

        entry.status = JobStatus::Processing;
        entry.started_at = Some(started_at);
        tracing::debug!("任务已认领: job_id={}", entry.job_id);
        Ok(Some(entry))
    }

    /// QUEUED → PROCESSING
    pub fn set_processing(&self, job_id: &str) -> RepositoryResult<()> {
        self.transition(
            job_id,
            JobStatus::Processing,
            "UPDATE evaluation_queue SET status = 'PROCESSING', started_at = ?2 WHERE job_id = ?1 AND status = 'QUEUED'",
            None,
        )
    }

    /// {QUEUED | PROCESSING} → COMPLETED
    pub fn set_completed(&self, job_id: &str) -> RepositoryResult<()> {
        self.transition(
            job_id,
            JobStatus::Completed,
            "UPDATE evaluation_queue SET status = 'COMPLETED', completed_at = ?2 WHERE job_id = ?1 AND status IN ('QUEUED', 'PROCESSING')",
            None,
        )
    }

    /// {QUEUED | PROCESSING} → FAILED（附错误信息）
    pub fn set_failed(&self, job_id: &str, error_message: &str) -> RepositoryResult<()> {
        self.transition(
            job_id,
            JobStatus::Failed,
            "UPDATE evaluation_queue SET status = 'FAILED', completed_at = ?2, error_message = ?3 WHERE job_id = ?1 AND status IN ('QUEUED', 'PROCESSING')",
            Some(error_message),
        )
    }

    fn transition(
        &self,
        job_id: &str,
        to: JobStatus,
        sql: &str,
        error_message: Option<&str>,
    ) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        let now = now_timestamp();
        let updated = match error_message {
            Some(msg) => conn.execute(sql, params![job_id, now, msg])?,
            None => conn.execute(sql, params![job_id, now])?,
        };
        if updated > 0 {
            return Ok(());
        }

        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM evaluation_queue WHERE job_id = ?1",
                params![job_id],
                |row| row.get(0),
            )
            .optional()?;

        match current {
            None => Err(RepositoryError::not_found("evaluation_queue", job_id)),
            Some(from) => Err(RepositoryError::InvalidStateTransition {
                job_id: job_id.to_string(),
                from,
                to: to.as_str().to_string(),
            }),
        }
    }

    /// 查询单个任务
    pub fn get_job(&self, job_id: &str) -> RepositoryResult<Option<QueueEntry>> {
        let conn = self.get_conn()?;
        let entry = conn
            .query_row(
                &format!("SELECT {} FROM evaluation_queue WHERE job_id = ?1", QUEUE_COLUMNS),
                params![job_id],
                map_queue_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// 获取队列统计信息
    pub fn queue_stats(&self) -> RepositoryResult<QueueStats> {
        let conn = self.get_conn()?;
        let mut stmt =
            conn.prepare("SELECT status, COUNT(*) FROM evaluation_queue GROUP BY status")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;

        let mut stats = QueueStats::default();
        for row in rows {
            let (status, count) = row?;
            let count = count as u32;
            match status.parse::<JobStatus>() {
                Ok(JobStatus::Queued) => stats.queued_count = count,
                Ok(JobStatus::Processing) => stats.processing_count = count,
                Ok(JobStatus::Completed) => stats.completed_count = count,
                Ok(JobStatus::Failed) => stats.failed_count = count,
                Err(e) => tracing::warn!("忽略未知队列状态: {}", e),
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::open_in_memory_shared;
    use crate::domain::constraints::TraderLevels;

    fn repo() -> EvaluationQueueRepository {
        EvaluationQueueRepository::from_connection(open_in_memory_shared().unwrap())
    }

    fn constraints() -> EvaluationConstraints {
        EvaluationConstraints::new(TraderLevels::uniform(4))
    }

    #[test]
    fn test_claim_respects_priority_then_age() {
        let queue = repo();
        let low = queue.enqueue("w1", BuildType::Recoil, &constraints(), 10).unwrap();
        let mid = queue.enqueue("w2", BuildType::Recoil, &constraints(), 50).unwrap();
        let high = queue.enqueue("w3", BuildType::Recoil, &constraints(), 100).unwrap();
        let mid_later = queue.enqueue("w4", BuildType::Recoil, &constraints(), 50).unwrap();

        let order: Vec<String> = std::iter::from_fn(|| queue.claim_next_job().unwrap())
            .map(|e| e.job_id)
            .collect();
        assert_eq!(order, vec![high, mid, mid_later, low]);
    }

    #[test]
    fn test_claim_marks_processing() {
        let queue = repo();
        let job_id = queue.enqueue("w1", BuildType::Ergonomics, &constraints(), 0).unwrap();

        let claimed = queue.claim_next_job().unwrap().unwrap();
        assert_eq!(claimed.status, JobStatus::Processing);
        assert!(claimed.started_at.is_some());

        let stored = queue.get_job(&job_id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Processing);
        assert_eq!(stored.constraints, constraints());
        assert!(queue.claim_next_job().unwrap().is_none());
    }

    #[test]
    fn test_terminal_states_are_final() {
        let queue = repo();
        let job_id = queue.enqueue("w1", BuildType::Recoil, &constraints(), 0).unwrap();
        queue.claim_next_job().unwrap();
        queue.set_failed(&job_id, "boom").unwrap();

        let err = queue.set_completed(&job_id).unwrap_err();
        assert!(matches!(err, RepositoryError::InvalidStateTransition { .. }));

        let stored = queue.get_job(&job_id).unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Failed);
        assert_eq!(stored.error_message.as_deref(), Some("boom"));
    }

    #[test]
    fn test_unknown_job_is_not_found() {
        let queue = repo();
        assert!(matches!(
            queue.set_completed("missing"),
            Err(RepositoryError::NotFound { .. })
        ));
    }

    #[test]
    fn test_enqueue_rejects_invalid_constraints() {
        let queue = repo();
        let bad = EvaluationConstraints::new(TraderLevels::uniform(9));
        assert!(matches!(
            queue.enqueue("w1", BuildType::Recoil, &bad, 0),
            Err(RepositoryError::ValidationError(_))
        ));
    }

    #[test]
    fn test_queue_stats() {
        let queue = repo();
        let a = queue.enqueue("w1", BuildType::Recoil, &constraints(), 0).unwrap();
        queue.enqueue("w2", BuildType::Recoil, &constraints(), 0).unwrap();
        queue.enqueue("w3", BuildType::Recoil, &constraints(), 0).unwrap();
        queue.claim_next_job().unwrap();
        queue.set_completed(&a).unwrap();
        queue.claim_next_job().unwrap();

        let stats = queue.queue_stats().unwrap();
        assert_eq!(stats.queued_count, 1);
        assert_eq!(stats.processing_count, 1);
        assert_eq!(stats.completed_count, 1);
        assert_eq!(stats.failed_count, 0);
    }
}

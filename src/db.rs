// ==========================================
// 武器改装最优配置求解 - SQLite 连接初始化
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为
// - 统一 busy_timeout，减少多 worker 并发写入时的偶发 busy 错误
// - 幂等建表（目录 / 队列 / 结果 / 缓存）
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
///
/// - 1: 初始表结构
/// - 2: optimal_build / conflict_free_cache 唯一键加入 data_version
pub const CURRENT_SCHEMA_VERSION: i64 = 2;

/// 共享连接类型（与各仓储共用）
pub type SharedConnection = Arc<Mutex<Connection>>;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    Ok(conn)
}

/// 打开连接、建表并包装为共享连接
pub fn open_shared_connection(db_path: &str) -> rusqlite::Result<SharedConnection> {
    let conn = open_sqlite_connection(db_path)?;
    ensure_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 内存库（测试与一次性求解）
pub fn open_in_memory_shared() -> rusqlite::Result<SharedConnection> {
    let conn = Connection::open_in_memory()?;
    configure_sqlite_connection(&conn)?;
    ensure_schema(&conn)?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// 幂等建表
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    migrate_derived_tables(conn)?;
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS config_kv (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (datetime('now')),
            PRIMARY KEY (scope_id, key)
        );

        -- ===== 目录数据（由外部导入器维护） =====
        CREATE TABLE IF NOT EXISTS item (
            item_id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            kind TEXT NOT NULL,
            recoil_modifier INTEGER NOT NULL DEFAULT 0,
            ergonomics_modifier INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS item_slot (
            slot_id TEXT PRIMARY KEY,
            item_id TEXT NOT NULL REFERENCES item(item_id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            position INTEGER NOT NULL DEFAULT 0
        );

        CREATE INDEX IF NOT EXISTS idx_item_slot_item
          ON item_slot(item_id, position);

        CREATE TABLE IF NOT EXISTS slot_allowed_item (
            slot_id TEXT NOT NULL REFERENCES item_slot(slot_id) ON DELETE CASCADE,
            item_id TEXT NOT NULL REFERENCES item(item_id) ON DELETE CASCADE,
            position INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (slot_id, item_id)
        );

        CREATE TABLE IF NOT EXISTS item_conflict (
            item_id TEXT NOT NULL,
            conflicting_item_id TEXT NOT NULL,
            PRIMARY KEY (item_id, conflicting_item_id)
        );

        CREATE TABLE IF NOT EXISTS trader_offer (
            item_id TEXT NOT NULL,
            trader TEXT NOT NULL,
            min_level INTEGER NOT NULL,
            price INTEGER NOT NULL DEFAULT 0,
            PRIMARY KEY (item_id, trader, min_level)
        );

        -- ===== 求解队列 =====
        CREATE TABLE IF NOT EXISTS evaluation_queue (
            job_id TEXT PRIMARY KEY,
            item_id TEXT NOT NULL,
            build_type TEXT NOT NULL,
            constraints_json TEXT NOT NULL,
            priority INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'QUEUED',
            created_at TEXT NOT NULL,
            started_at TEXT,
            completed_at TEXT,
            error_message TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_evaluation_queue_claim
          ON evaluation_queue(status, priority DESC, created_at ASC);

        -- ===== 最优配置结果 =====
        CREATE TABLE IF NOT EXISTS optimal_build (
            build_id TEXT PRIMARY KEY,
            item_id TEXT NOT NULL,
            build_type TEXT NOT NULL,
            constraints_key TEXT NOT NULL,
            data_version TEXT NOT NULL,
            constraints_json TEXT NOT NULL,
            status TEXT NOT NULL,
            result_json TEXT,
            error_message TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (item_id, build_type, constraints_key, data_version)
        );

        -- ===== 无冲突缓存（单物品孤立最优） =====
        CREATE TABLE IF NOT EXISTS conflict_free_cache (
            item_id TEXT NOT NULL,
            build_type TEXT NOT NULL,
            trader_key TEXT NOT NULL,
            data_version TEXT NOT NULL,
            recoil_sum INTEGER NOT NULL,
            ergonomics_sum INTEGER NOT NULL,
            selections_json TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (item_id, build_type, trader_key, data_version)
        );

        -- ===== 子树缓存（按数据版本） =====
        CREATE TABLE IF NOT EXISTS subtree_cache (
            item_id TEXT NOT NULL,
            build_type TEXT NOT NULL,
            constraints_key TEXT NOT NULL,
            data_version TEXT NOT NULL,
            evaluated_depth INTEGER NOT NULL,
            constraints_json TEXT NOT NULL,
            result_json TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (item_id, build_type, constraints_key, data_version)
        );
        "#,
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [CURRENT_SCHEMA_VERSION],
    )?;

    Ok(())
}

/// 旧版本库升级: 结果表与无冲突缓存都可以重算,直接删表后按新结构重建
fn migrate_derived_tables(conn: &Connection) -> rusqlite::Result<()> {
    match read_schema_version(conn)? {
        Some(version) if version < 2 => {
            tracing::warn!(
                "schema_version={} 过旧,重建 optimal_build 与 conflict_free_cache",
                version
            );
            conn.execute_batch(
                r#"
                DROP TABLE IF EXISTS optimal_build;
                DROP TABLE IF EXISTS conflict_free_cache;
                "#,
            )
        }
        _ => Ok(()),
    }
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 数据库路径环境变量
pub const DB_PATH_ENV: &str = "WEAPON_BUILD_OPTIMIZER_DB_PATH";

/// 默认数据库路径
///
/// 优先使用环境变量 WEAPON_BUILD_OPTIMIZER_DB_PATH,否则放在用户数据目录下
pub fn get_default_db_path() -> String {
    if let Ok(path) = std::env::var(DB_PATH_ENV) {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./weapon_build_optimizer.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("weapon-build-optimizer");
        // 目录创建失败时退回当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("weapon_build_optimizer.db");
        }
    }

    path.to_string_lossy().to_string()
}

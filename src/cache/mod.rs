// ==========================================
// 武器改装最优配置求解 - 无冲突缓存层
// ==========================================
// 职责: 缓存单个物品在孤立状态下的最优子结果
// 键: 物品 ID + 求解属性 + 商人等级元组（按商人固定顺序序列化,与插入顺序无关）
// 数据版本: 每个缓存实例只服务一个目录数据版本,目录重新导入后旧条目不可见
// 红线: 条目不考虑兄弟槽位引入的冲突,是否可用由搜索根据当前排除集判断
// ==========================================
// 两种后端:
// - memory: 进程内 RwLock<HashMap>
// - sqlite: conflict_free_cache 表,唯一约束（含 data_version）保证并发 upsert 后写者胜
// ==========================================

pub mod memory;
pub mod sqlite;

use crate::db::SharedConnection;
use crate::domain::build::BuildSelection;
use crate::domain::constraints::{EvaluationConstraints, TraderLevels};
use crate::domain::types::BuildType;
use crate::repository::error::RepositoryResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub use memory::MemoryConflictFreeCache;
pub use sqlite::SqliteConflictFreeCache;

/// 单个物品的无冲突最优子结果
///
/// 两个总和都包含物品本身的数值,selections 是其子树内的选择
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub item_id: String,
    pub build_type: BuildType,
    pub recoil_sum: i64,
    pub ergonomics_sum: i64,
    pub selections: Vec<BuildSelection>,
}

impl CacheEntry {
    /// 子树内被选中的物品 ID
    pub fn chosen_item_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.selections.iter().filter_map(|s| s.item_id.as_deref())
    }
}

/// 缓存访问统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
}

// ==========================================
// ConflictFreeCache - 缓存接口
// ==========================================
pub trait ConflictFreeCache: Send + Sync {
    /// 查询（只使用约束中的商人等级元组）
    fn get(
        &self,
        item_id: &str,
        build_type: BuildType,
        constraints: &EvaluationConstraints,
    ) -> RepositoryResult<Option<CacheEntry>>;

    /// 写入（同键覆盖）
    fn set(&self, constraints: &EvaluationConstraints, entry: &CacheEntry) -> RepositoryResult<()>;

    /// 清空全部条目
    fn clear(&self) -> RepositoryResult<()>;

    /// 条目所属的目录数据版本
    fn data_version(&self) -> &str;

    fn stats(&self) -> CacheStats;
}

/// 确定性缓存键: "item_id|stat|Prapor=4,Mechanic=3"
pub fn cache_key(item_id: &str, build_type: BuildType, trader_levels: &TraderLevels) -> String {
    format!("{}|{}|{}", item_id, build_type, trader_levels.cache_key())
}

/// 命中/未命中/写入计数器（两种后端共用）
#[derive(Debug, Default)]
pub(crate) struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
}

impl CacheCounters {
    pub(crate) fn record_lookup(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
        }
    }
}

// ==========================================
// 后端选择
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    Memory,
    Sqlite,
}

impl CacheBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheBackend::Memory => "memory",
            CacheBackend::Sqlite => "sqlite",
        }
    }
}

impl fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(CacheBackend::Memory),
            "sqlite" => Ok(CacheBackend::Sqlite),
            other => Err(format!("未知的缓存后端: {}", other)),
        }
    }
}

/// 按配置创建缓存实例（由 worker 池持有并注入搜索）
pub fn create_cache(
    backend: CacheBackend,
    conn: SharedConnection,
    data_version: &str,
) -> Arc<dyn ConflictFreeCache> {
    match backend {
        CacheBackend::Memory => {
            Arc::new(MemoryConflictFreeCache::new().with_data_version(data_version))
        }
        CacheBackend::Sqlite => Arc::new(
            SqliteConflictFreeCache::from_connection(conn).with_data_version(data_version),
        ),
    }
}

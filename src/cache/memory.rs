// ==========================================
// 武器改装最优配置求解 - 进程内无冲突缓存
// ==========================================
// 生命周期: 与持有它的 worker 池相同,进程退出即丢弃
// 数据版本: 实例级,换版本需要新建实例
// ==========================================

use crate::cache::{cache_key, CacheCounters, CacheEntry, CacheStats, ConflictFreeCache};
use crate::config::DEFAULT_DATA_VERSION;
use crate::domain::constraints::EvaluationConstraints;
use crate::domain::types::BuildType;
use crate::repository::error::{RepositoryError, RepositoryResult};
use std::collections::HashMap;
use std::sync::RwLock;

#[derive(Debug)]
pub struct MemoryConflictFreeCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    counters: CacheCounters,
    data_version: String,
}

impl Default for MemoryConflictFreeCache {
    fn default() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            counters: CacheCounters::default(),
            data_version: DEFAULT_DATA_VERSION.to_string(),
        }
    }
}

impl MemoryConflictFreeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data_version(mut self, data_version: impl Into<String>) -> Self {
        self.data_version = data_version.into();
        self
    }

    pub fn len(&self) -> usize {
        self.entries.read().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ConflictFreeCache for MemoryConflictFreeCache {
    fn get(
        &self,
        item_id: &str,
        build_type: BuildType,
        constraints: &EvaluationConstraints,
    ) -> RepositoryResult<Option<CacheEntry>> {
        let key = cache_key(item_id, build_type, &constraints.trader_levels);
        let entries = self
            .entries
            .read()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let entry = entries.get(&key).cloned();
        self.counters.record_lookup(entry.is_some());
        Ok(entry)
    }

    fn set(&self, constraints: &EvaluationConstraints, entry: &CacheEntry) -> RepositoryResult<()> {
        let key = cache_key(&entry.item_id, entry.build_type, &constraints.trader_levels);
        let mut entries = self
            .entries
            .write()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        entries.insert(key, entry.clone());
        self.counters.record_write();
        Ok(())
    }

    fn clear(&self) -> RepositoryResult<()> {
        self.entries
            .write()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?
            .clear();
        Ok(())
    }

    fn data_version(&self) -> &str {
        &self.data_version
    }

    fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }
}

// ==========================================
// 武器改装最优配置求解 - 运行配置快照
// ==========================================
// 职责: 从 config_kv 读取并校验 worker 池 / 求解 / 缓存配置
// 取值: 缺失的键使用默认值,格式错误或越界直接报错（不回退默认值）
// ==========================================

use crate::cache::CacheBackend;
use crate::config::config_manager::{config_keys, ConfigManager};
use crate::engine::tree_builder::DEFAULT_MAX_TREE_DEPTH;
use crate::repository::error::RepositoryError;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_PARALLELISM_FACTOR: f64 = 1.0;
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;
pub const DEFAULT_DATA_VERSION: &str = "0";

/// 配置加载错误
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置读取失败: {0}")]
    Storage(#[from] RepositoryError),

    #[error("配置值无效 ({key}={value}): {message}")]
    InvalidValue {
        key: String,
        value: String,
        message: String,
    },
}

// ==========================================
// OptimizerConfig - 运行配置
// ==========================================
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    /// 并行度系数: worker 数 = max(1, round(CPU 并行度 × 系数))
    pub parallelism_factor: f64,
    /// 队列为空或领取失败时的休眠间隔
    pub poll_interval: Duration,
    /// 有界任务通道容量（None 表示与 worker 数相同）
    pub channel_capacity: Option<usize>,
    /// 候选树最大展开深度（同时记作子树缓存的评估深度）
    pub max_tree_depth: u32,
    /// 目录数据版本标记
    pub data_version: String,
    pub cache_backend: CacheBackend,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            parallelism_factor: DEFAULT_PARALLELISM_FACTOR,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            channel_capacity: None,
            max_tree_depth: DEFAULT_MAX_TREE_DEPTH,
            data_version: DEFAULT_DATA_VERSION.to_string(),
            cache_backend: CacheBackend::Sqlite,
        }
    }
}

impl OptimizerConfig {
    /// 从 config_kv 加载并校验
    pub fn load(manager: &ConfigManager) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let config = Self {
            parallelism_factor: read_parsed(
                manager,
                config_keys::WORKER_PARALLELISM_FACTOR,
                defaults.parallelism_factor,
            )?,
            poll_interval: Duration::from_millis(read_parsed(
                manager,
                config_keys::WORKER_POLL_INTERVAL_MS,
                DEFAULT_POLL_INTERVAL_MS,
            )?),
            channel_capacity: match manager.get_global_config_value(config_keys::WORKER_CHANNEL_CAPACITY)? {
                Some(raw) => Some(parse_value(config_keys::WORKER_CHANNEL_CAPACITY, &raw)?),
                None => None,
            },
            max_tree_depth: read_parsed(
                manager,
                config_keys::EVALUATION_MAX_TREE_DEPTH,
                defaults.max_tree_depth,
            )?,
            data_version: manager
                .get_config_or_default(config_keys::CATALOG_DATA_VERSION, DEFAULT_DATA_VERSION)?,
            cache_backend: read_parsed(
                manager,
                config_keys::CACHE_BACKEND,
                defaults.cache_backend,
            )?,
        };

        config.validate()?;
        tracing::info!(
            "运行配置已加载: factor={}, poll_interval_ms={}, max_tree_depth={}, data_version={}, cache_backend={}",
            config.parallelism_factor,
            config.poll_interval.as_millis(),
            config.max_tree_depth,
            config.data_version,
            config.cache_backend
        );
        Ok(config)
    }

    /// 校验取值范围
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.parallelism_factor.is_finite() || self.parallelism_factor <= 0.0 {
            return Err(invalid(
                config_keys::WORKER_PARALLELISM_FACTOR,
                &self.parallelism_factor.to_string(),
                "必须为正数",
            ));
        }
        if self.poll_interval.is_zero() {
            return Err(invalid(config_keys::WORKER_POLL_INTERVAL_MS, "0", "必须大于 0"));
        }
        if self.channel_capacity == Some(0) {
            return Err(invalid(config_keys::WORKER_CHANNEL_CAPACITY, "0", "必须大于 0"));
        }
        if self.max_tree_depth == 0 {
            return Err(invalid(config_keys::EVALUATION_MAX_TREE_DEPTH, "0", "必须大于 0"));
        }
        if self.data_version.trim().is_empty() {
            return Err(invalid(config_keys::CATALOG_DATA_VERSION, "", "不能为空"));
        }
        Ok(())
    }

    /// worker 数量（按给定的 CPU 并行度计算）
    pub fn worker_count_for(&self, available_parallelism: usize) -> usize {
        let scaled = (available_parallelism as f64 * self.parallelism_factor).round();
        (scaled as usize).max(1)
    }

    /// worker 数量（按本机 CPU 并行度计算）
    pub fn worker_count(&self) -> usize {
        let cpus = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        self.worker_count_for(cpus)
    }

    /// 任务通道容量
    pub fn effective_channel_capacity(&self, worker_count: usize) -> usize {
        self.channel_capacity.unwrap_or(worker_count).max(1)
    }
}

fn invalid(key: &str, value: &str, message: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        message: message.to_string(),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| invalid(key, raw, &e.to_string()))
}

fn read_parsed<T>(manager: &ConfigManager, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: ToString,
{
    match manager.get_global_config_value(key)? {
        Some(raw) => parse_value(key, &raw),
        None => Ok(default),
    }
}

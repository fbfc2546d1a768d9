// ==========================================
// 武器改装最优配置求解 - 配置层
// ==========================================
// 职责: 系统配置管理
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod optimizer_config;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use optimizer_config::{ConfigError, OptimizerConfig, DEFAULT_DATA_VERSION};

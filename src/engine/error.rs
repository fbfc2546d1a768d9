// ==========================================
// 武器改装最优配置求解 - 引擎层错误类型
// ==========================================
// 分类:
// - NotFound: 武器/物品/槽位不存在,仅中止本次求解
// - InvalidConfiguration: 未知求解属性或约束不合法,属于编程错误,不重试
// - TreeConstruction / Cache: 数据提供方或持久化 I/O 故障,标记任务失败但不影响 worker
// 循环防护剔除不是错误,只记录在槽位诊断信息里
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 引擎层错误类型
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("配置错误: {0}")]
    InvalidConfiguration(String),

    #[error("候选树构建失败 (item_id={item_id}): {source}")]
    TreeConstruction {
        item_id: String,
        #[source]
        source: RepositoryError,
    },

    #[error("缓存访问失败: {0}")]
    Cache(#[source] RepositoryError),
}

impl EngineError {
    /// 数据提供方错误 → 树构建错误（NotFound 单独归类）
    pub fn from_provider(item_id: &str, err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound { entity, id } => EngineError::NotFound { entity, id },
            other => EngineError::TreeConstruction {
                item_id: item_id.to_string(),
                source: other,
            },
        }
    }

    /// 是否属于基础设施瞬时故障（重新入队可能成功）
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            EngineError::TreeConstruction { .. } | EngineError::Cache(_)
        )
    }
}

/// Result 类型别名
pub type EngineResult<T> = Result<T, EngineError>;

// ==========================================
// 武器改装最优配置求解 - 引擎层
// ==========================================
// 职责: 候选树构建、冲突登记、最优配置搜索
// 红线: Engine 不拼 SQL,只通过 DataProvider / ConflictFreeCache 访问外部数据
// ==========================================
// 每个任务独立构建并搜索自己的候选树,树与备忘表从不跨 worker 共享
// ==========================================

pub mod conflict;
pub mod error;
pub mod search;
pub mod tree;
pub mod tree_builder;

#[cfg(test)]
pub(crate) mod test_fixture;

// 重导出核心引擎
pub use conflict::{ConflictMap, ConflictRegistry};
pub use error::{EngineError, EngineResult};
pub use search::{parse_focused_stat, search, SearchOutcome, SearchStats};
pub use tree::{CandidateTree, ItemIdx, ItemNode, SlotIdx, SlotNode, StatBounds};
pub use tree_builder::{CandidateTreeBuilder, DEFAULT_MAX_TREE_DEPTH};

//! Nectar - 虚拟人格日程规划引擎
//!
//! 把不可靠的自由文本 LLM 输出，变成经过校验、时间连续、去重且持久化的
//! 日历式日程，并在存储前面挂一层有界缓存。
//!
//! 模块划分：
//! - **config**: 引擎配置加载（TOML + 环境变量）
//! - **core**: 错误分类、数据模型、时间工具、参数校验
//! - **store**: SQLite 目标存储与 LRU/TTL 查询缓存
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Mock）
//! - **planner**: 上下文、提示词/Schema、解析、校验、评分、多轮编排、自动调度
//! - **plugin**: 宿主接入面（命令面板、对话注入钩子）

pub mod config;
pub mod core;
pub mod llm;
pub mod observability;
pub mod planner;
pub mod plugin;
pub mod store;

pub use crate::config::{load_config, PlanningConfig};
pub use crate::core::{
    ActivityType, Goal, GoalDraft, GoalStatus, LlmError, PlanningError, Priority, TimeWindow,
};
pub use crate::planner::{
    AutoScheduler, GenerationOrchestrator, GenerationOutcome, GenerationRequest, GoalManager,
};

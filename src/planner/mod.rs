//! 规划层：上下文装配、提示词/Schema、解析、语义校验、质量评分、多轮编排、
//! 目标管理与每日自动调度

pub mod auto;
pub mod context;
pub mod generator;
pub mod goals;
pub mod parser;
pub mod prompt;
pub mod schema;
pub mod scorer;
pub mod validator;

pub use auto::{next_trigger_after, AutoScheduler};
pub use context::{ContextLoader, GenerationContext};
pub use generator::{GenerationOrchestrator, GenerationOutcome, GenerationRequest};
pub use goals::{ActivityNow, ActivityRef, GoalManager};

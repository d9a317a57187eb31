//! 核心层：错误分类、数据模型、时间工具、参数校验

pub mod error;
pub mod models;
pub mod time;
pub mod validate;

pub use error::{LlmError, PlanningError};
pub use models::{ActivityType, Goal, GoalDraft, GoalStatus, Priority, TimeWindow};
pub use time::TimezoneManager;

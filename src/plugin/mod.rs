//! 宿主接入面：命令面板与对话注入钩子（均为薄壳，核心逻辑在 planner）

pub mod commands;
pub mod inject;

pub use commands::{CommandHandler, PlanningCommand};
pub use inject::ScheduleInjector;

//! 对话注入钩子
//!
//! 给定时间戳，产出「这会儿在做什么」的短语，供宿主拼进回复生成的人设上下文；
//! 当前无活动时返回 None。时间由调用方传入，便于确定性测试。

use std::sync::Arc;

use chrono::NaiveDateTime;

use crate::planner::goals::GoalManager;

/// 日程注入器
pub struct ScheduleInjector {
    manager: Arc<GoalManager>,
    enabled: bool,
}

impl ScheduleInjector {
    pub fn new(manager: Arc<GoalManager>, enabled: bool) -> Self {
        Self { manager, enabled }
    }

    /// 生成注入片段；禁用、查询失败或当前无活动时返回 None
    pub fn snippet(&self, chat_id: &str, now: NaiveDateTime) -> Option<String> {
        if !self.enabled {
            return None;
        }
        let activity = match self.manager.current_activity(chat_id, now) {
            Ok(a) => a,
            Err(e) => {
                tracing::debug!("Schedule injection query failed: {}", e);
                return None;
            }
        };
        let current = activity.current?;

        let mut text = format!("（这会儿正{}）", current.description);
        if let Some(next) = activity.next {
            text = format!(
                "（这会儿正{}，{} 之后打算{}）",
                current.description, next.start, next.name
            );
        }
        Some(text)
    }
}

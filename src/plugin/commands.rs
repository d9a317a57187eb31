//! 命令面板（薄壳）
//!
//! 把 "/plan …" 文本解析为命令并在 GoalManager 上执行，返回可直接发回聊天的
//! 文本。自然语言解析、权限校验在宿主框架一侧。

use std::sync::Arc;

use chrono::NaiveDate;

use crate::core::error::PlanningError;
use crate::planner::goals::GoalManager;

/// 规划命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanningCommand {
    /// 今日日程一览
    Status,
    /// 详细列表（带 id 引用）
    List,
    /// 清空今日日程
    Clear,
    /// 按 id 前缀删除单条
    Delete(String),
    Help,
}

impl PlanningCommand {
    /// 解析 "/plan xxx" / "/规划 xxx"；不认识的子命令回落 Help
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text
            .strip_prefix("/plan")
            .or_else(|| text.strip_prefix("/规划"))?;
        let mut parts = rest.split_whitespace();
        let cmd = match parts.next() {
            None | Some("help") => PlanningCommand::Help,
            Some("status") => PlanningCommand::Status,
            Some("list") => PlanningCommand::List,
            Some("clear") => PlanningCommand::Clear,
            Some("delete") => match parts.next() {
                Some(reference) => PlanningCommand::Delete(reference.to_string()),
                None => PlanningCommand::Help,
            },
            Some(_) => PlanningCommand::Help,
        };
        Some(cmd)
    }
}

/// 命令执行器
pub struct CommandHandler {
    manager: Arc<GoalManager>,
    chat_id: String,
}

impl CommandHandler {
    pub fn new(manager: Arc<GoalManager>, chat_id: impl Into<String>) -> Self {
        Self {
            manager,
            chat_id: chat_id.into(),
        }
    }

    /// 执行命令；day 由调用方传入（无隐藏时钟）
    pub fn execute(&self, cmd: &PlanningCommand, day: NaiveDate) -> Result<String, PlanningError> {
        match cmd {
            PlanningCommand::Status => self.manager.schedule_summary(&self.chat_id, day),
            PlanningCommand::List => self.manager.schedule_listing(&self.chat_id, day),
            PlanningCommand::Clear => {
                let n = self.manager.clear_day(&self.chat_id, day)?;
                Ok(format!("已清空 {} 的日程（{} 项）", day, n))
            }
            PlanningCommand::Delete(reference) => {
                if self.manager.delete_goal(reference)? {
                    Ok(format!("已删除日程 {}", reference))
                } else {
                    Ok(format!("没有找到日程 {}", reference))
                }
            }
            PlanningCommand::Help => Ok([
                "规划命令：",
                "/plan status       今日日程一览",
                "/plan list         日程明细（带引用）",
                "/plan clear        清空今日日程",
                "/plan delete <引用> 删除单条日程",
                "/plan help         显示本帮助",
            ]
            .join("\n")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{CacheSection, CleanupSection};
    use crate::core::models::{ActivityType, GoalDraft, Priority};
    use crate::store::GoalStore;

    fn handler() -> CommandHandler {
        let manager = Arc::new(GoalManager::new(
            Arc::new(GoalStore::open_in_memory().unwrap()),
            &CacheSection::default(),
            &CleanupSection::default(),
        ));
        CommandHandler::new(manager, "global")
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 6).unwrap()
    }

    fn seed(h: &CommandHandler) {
        let drafts = vec![GoalDraft {
            name: "早餐".to_string(),
            description: "一段足够长度的活动描述文字".to_string(),
            activity_type: ActivityType::Meal,
            priority: Priority::High,
            start_min: 480,
            end_min: 510,
        }];
        h.manager.apply_drafts("global", day(), &drafts, false).unwrap();
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(PlanningCommand::parse("/plan status"), Some(PlanningCommand::Status));
        assert_eq!(PlanningCommand::parse("/规划 list"), Some(PlanningCommand::List));
        assert_eq!(
            PlanningCommand::parse("/plan delete abcd1234"),
            Some(PlanningCommand::Delete("abcd1234".to_string()))
        );
        assert_eq!(PlanningCommand::parse("/plan"), Some(PlanningCommand::Help));
        assert_eq!(PlanningCommand::parse("/plan 不认识"), Some(PlanningCommand::Help));
        assert_eq!(PlanningCommand::parse("/plan delete"), Some(PlanningCommand::Help));
        assert_eq!(PlanningCommand::parse("随便聊聊"), None);
    }

    #[test]
    fn test_status_and_clear() {
        let h = handler();
        seed(&h);
        let status = h.execute(&PlanningCommand::Status, day()).unwrap();
        assert!(status.contains("早餐"));

        let cleared = h.execute(&PlanningCommand::Clear, day()).unwrap();
        assert!(cleared.contains("1 项"));
        let status = h.execute(&PlanningCommand::Status, day()).unwrap();
        assert!(status.contains("还没有日程安排"));
    }

    #[test]
    fn test_delete_by_reference() {
        let h = handler();
        seed(&h);
        let listing = h.execute(&PlanningCommand::List, day()).unwrap();
        // 明细第二行形如 "[abcd1234] 08:00-08:30 早餐 ..."
        let reference = listing
            .lines()
            .nth(1)
            .and_then(|l| l.strip_prefix('['))
            .and_then(|l| l.split(']').next())
            .unwrap()
            .to_string();
        let out = h.execute(&PlanningCommand::Delete(reference), day()).unwrap();
        assert!(out.contains("已删除"));
        assert!(h
            .execute(&PlanningCommand::Status, day())
            .unwrap()
            .contains("还没有日程安排"));
    }

    #[test]
    fn test_help_lists_surface() {
        let h = handler();
        let help = h.execute(&PlanningCommand::Help, day()).unwrap();
        for cmd in ["status", "list", "clear", "delete"] {
            assert!(help.contains(cmd));
        }
    }
}

//! 生成上下文装配
//!
//! 把人设、偏好、清洗后的风格指令、昨日日程摘要与当天已有条目打包成不可变
//! 上下文，供提示词构建与评分使用。人设缺失视为致命（本次生成不重试）。

use chrono::{Duration, NaiveDate};

use crate::config::{PlanningConfig, PreferencesSection};
use crate::core::error::PlanningError;
use crate::core::models::Goal;
use crate::core::time::{format_minutes, is_weekend, weekday_name};
use crate::planner::goals::GoalManager;

/// 昨日摘要最多列出的活动数
const MAX_YESTERDAY_ACTIVITIES: usize = 10;

/// 一次生成的不可变上下文
#[derive(Debug, Clone)]
pub struct GenerationContext {
    pub day: NaiveDate,
    pub weekday: &'static str,
    pub is_weekend: bool,
    pub bot_name: String,
    pub personality: String,
    pub interest: String,
    pub reply_style: String,
    pub preferences: PreferencesSection,
    /// 已清洗的自定义风格指令（空串表示未配置）
    pub custom_prompt: String,
    pub yesterday_summary: String,
    /// 目标日已存在的条目；force_regenerate 时为空（视为从零生成）
    pub existing: Vec<Goal>,
}

/// 上下文加载器
pub struct ContextLoader<'a> {
    config: &'a PlanningConfig,
    goals: &'a GoalManager,
}

impl<'a> ContextLoader<'a> {
    pub fn new(config: &'a PlanningConfig, goals: &'a GoalManager) -> Self {
        Self { config, goals }
    }

    pub fn load(
        &self,
        chat_id: &str,
        day: NaiveDate,
        force_regenerate: bool,
    ) -> Result<GenerationContext, PlanningError> {
        let persona = &self.config.persona;
        if persona.personality.trim().is_empty() {
            return Err(PlanningError::ContextUnavailable(
                "persona.personality is empty".to_string(),
            ));
        }

        let existing = if force_regenerate {
            Vec::new()
        } else {
            self.goals.goals_for_day(chat_id, day)?
        };

        Ok(GenerationContext {
            day,
            weekday: weekday_name(day),
            is_weekend: is_weekend(day),
            bot_name: persona.bot_name.clone(),
            personality: persona.personality.clone(),
            interest: persona.interest.clone(),
            reply_style: persona.reply_style.clone(),
            preferences: self.config.preferences.clone(),
            custom_prompt: self.config.sanitized_custom_prompt(),
            yesterday_summary: self.load_yesterday_summary(chat_id, day),
            existing,
        })
    }

    /// 昨日日程摘要；读不到时退化为默认文案，绝不因此失败
    fn load_yesterday_summary(&self, chat_id: &str, day: NaiveDate) -> String {
        let yesterday = day - Duration::days(1);
        match self.goals.goals_for_day(chat_id, yesterday) {
            Ok(goals) if !goals.is_empty() => {
                let lines: Vec<String> = goals
                    .iter()
                    .take(MAX_YESTERDAY_ACTIVITIES)
                    .map(|g| {
                        format!(
                            "{} {}: {}",
                            format_minutes(g.time_window.start_min),
                            g.name,
                            g.description
                        )
                    })
                    .collect();
                format!("昨天我的日程:\n{}", lines.join("\n"))
            }
            Ok(_) => "昨天没有记录具体日程，就是普通的一天".to_string(),
            Err(e) => {
                tracing::warn!("Failed to load yesterday schedule: {}", e);
                "昨天的事情记不太清了".to_string()
            }
        }
    }
}

//! 核心数据模型：日程目标（Goal）、候选草稿（GoalDraft）、时间窗口与各枚举
//!
//! GoalDraft 是解析层产出的严格中间表示（未分配 id/状态）；Goal 是持久化实体。
//! 同一天内 (name, time_window) 为去重键。

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::error::PlanningError;
use crate::core::time::{format_minutes, MINUTES_PER_DAY};

/// 活动类型（封闭枚举，serde 名即存储/LLM 线上名）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityType {
    DailyRoutine,
    Meal,
    Study,
    Entertainment,
    SocialMaintenance,
    Exercise,
    LearnTopic,
    Rest,
    FreeTime,
    Custom,
}

impl ActivityType {
    /// 全部合法线上名（按 schema 顺序）
    pub const ALL: [ActivityType; 10] = [
        ActivityType::DailyRoutine,
        ActivityType::Meal,
        ActivityType::Study,
        ActivityType::Entertainment,
        ActivityType::SocialMaintenance,
        ActivityType::Exercise,
        ActivityType::LearnTopic,
        ActivityType::Rest,
        ActivityType::FreeTime,
        ActivityType::Custom,
    ];

    pub fn as_wire(&self) -> &'static str {
        match self {
            ActivityType::DailyRoutine => "daily_routine",
            ActivityType::Meal => "meal",
            ActivityType::Study => "study",
            ActivityType::Entertainment => "entertainment",
            ActivityType::SocialMaintenance => "social_maintenance",
            ActivityType::Exercise => "exercise",
            ActivityType::LearnTopic => "learn_topic",
            ActivityType::Rest => "rest",
            ActivityType::FreeTime => "free_time",
            ActivityType::Custom => "custom",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_wire() == s)
    }
}

/// 优先级（重叠展示时的平手裁决）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_wire(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "high" => Some(Priority::High),
            "medium" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

/// 目标状态：pending → active → completed，完成前任意时刻可 cancelled；不允许回退
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl GoalStatus {
    pub fn as_wire(&self) -> &'static str {
        match self {
            GoalStatus::Pending => "pending",
            GoalStatus::Active => "active",
            GoalStatus::Completed => "completed",
            GoalStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_wire(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(GoalStatus::Pending),
            "active" => Some(GoalStatus::Active),
            "completed" => Some(GoalStatus::Completed),
            "cancelled" => Some(GoalStatus::Cancelled),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            GoalStatus::Pending => 0,
            GoalStatus::Active => 1,
            GoalStatus::Completed => 2,
            GoalStatus::Cancelled => 3,
        }
    }

    /// 状态单向推进：严格向前，或从 pending/active 转 cancelled
    pub fn can_transition_to(&self, next: GoalStatus) -> bool {
        match next {
            GoalStatus::Cancelled => matches!(self, GoalStatus::Pending | GoalStatus::Active),
            _ => !matches!(self, GoalStatus::Cancelled) && next.rank() > self.rank(),
        }
    }
}

/// 同日时间窗口：[start_min, end_min)，分钟数，start < end，end <= 1440
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_min: u16,
    pub end_min: u16,
}

impl TimeWindow {
    pub fn new(start_min: u16, end_min: u16) -> Result<Self, PlanningError> {
        if start_min >= end_min || end_min > MINUTES_PER_DAY {
            return Err(PlanningError::InvalidParameters(format!(
                "invalid time window [{}, {})",
                start_min, end_min
            )));
        }
        Ok(Self { start_min, end_min })
    }

    pub fn duration_min(&self) -> u16 {
        self.end_min - self.start_min
    }

    /// 某时刻（分钟数）是否落在窗口内
    pub fn contains(&self, minute: u16) -> bool {
        self.start_min <= minute && minute < self.end_min
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start_min < other.end_min && other.start_min < self.end_min
    }
}

impl std::fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}-{}",
            format_minutes(self.start_min),
            format_minutes(self.end_min)
        )
    }
}

/// 解析层的候选草稿：时间窗口未经校验（交由语义校验器），不携带 id/状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoalDraft {
    pub name: String,
    pub description: String,
    pub activity_type: ActivityType,
    pub priority: Priority,
    pub start_min: u16,
    pub end_min: u16,
}

impl GoalDraft {
    /// 去重键 (name, time_window)
    pub fn dedup_key(&self) -> (String, u16, u16) {
        (self.name.clone(), self.start_min, self.end_min)
    }
}

/// 持久化日程目标
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Goal {
    pub id: Uuid,
    pub chat_id: String,
    pub name: String,
    pub description: String,
    pub activity_type: ActivityType,
    pub priority: Priority,
    pub time_window: TimeWindow,
    pub status: GoalStatus,
    pub day: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl Goal {
    /// 草稿落地为目标：窗口须已通过语义校验
    pub fn from_draft(
        draft: &GoalDraft,
        chat_id: &str,
        day: NaiveDate,
    ) -> Result<Self, PlanningError> {
        Ok(Self {
            id: Uuid::new_v4(),
            chat_id: chat_id.to_string(),
            name: draft.name.clone(),
            description: draft.description.clone(),
            activity_type: draft.activity_type,
            priority: draft.priority,
            time_window: TimeWindow::new(draft.start_min, draft.end_min)?,
            status: GoalStatus::Pending,
            day,
            created_at: Utc::now(),
        })
    }

    pub fn dedup_key(&self) -> (String, u16, u16) {
        (
            self.name.clone(),
            self.time_window.start_min,
            self.time_window.end_min,
        )
    }
}

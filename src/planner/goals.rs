//! 目标管理器：存储 + 缓存的写穿服务层
//!
//! 所有写路径在返回前完成缓存失效（先落库、再失效、再可见），防止陈旧读；
//! 缓存键按 chat 前缀组织：`day:{chat}:{date}` 与 `active:{chat}:{date}:{bucket}`。

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::config::{CacheSection, CleanupSection};
use crate::core::error::PlanningError;
use crate::core::models::{Goal, GoalDraft, GoalStatus};
use crate::core::time::format_minutes;
use crate::store::{GoalStore, LruCache};

/// 注入查询的时间桶宽度（分钟）：同一桶内的查询命中同一缓存键
const ACTIVE_BUCKET_MINUTES: u32 = 5;

/// 「现在在干嘛」查询结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityNow {
    /// 当前时间窗口内的活动
    pub current: Option<ActivityRef>,
    /// 下一个将开始的活动
    pub next: Option<ActivityRef>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityRef {
    pub name: String,
    pub description: String,
    /// 开始时刻 HH:MM
    pub start: String,
}

/// 目标管理器
pub struct GoalManager {
    store: Arc<GoalStore>,
    cache: LruCache,
    cleanup_days: u32,
}

impl GoalManager {
    pub fn new(store: Arc<GoalStore>, cache: &CacheSection, cleanup: &CleanupSection) -> Self {
        Self {
            store,
            cache: LruCache::new(cache.max_size, Duration::from_secs(cache.ttl_secs)),
            cleanup_days: cleanup.old_goals_days,
        }
    }

    fn day_key(chat_id: &str, day: NaiveDate) -> String {
        format!("day:{}:{}", chat_id, day)
    }

    /// 某天全部条目（经缓存），按开始时间升序
    pub fn goals_for_day(&self, chat_id: &str, day: NaiveDate) -> Result<Vec<Goal>, PlanningError> {
        let key = Self::day_key(chat_id, day);
        if let Some(value) = self.cache.get(&key) {
            if let Ok(goals) = serde_json::from_value::<Vec<Goal>>(value) {
                return Ok(goals);
            }
        }
        let goals = self.store.query_day(chat_id, day, None)?;
        if let Ok(value) = serde_json::to_value(&goals) {
            self.cache.put(&key, value);
        }
        Ok(goals)
    }

    pub fn count_day(&self, chat_id: &str, day: NaiveDate) -> Result<usize, PlanningError> {
        Ok(self.goals_for_day(chat_id, day)?.len())
    }

    /// 批量落地草稿（编排器 Accepted 路径）
    ///
    /// force=false：去重键已存在的草稿被丢弃；force=true：当天旧条目整体被接管。
    /// 写入为单事务，完成后再做缓存失效。
    pub fn apply_drafts(
        &self,
        chat_id: &str,
        day: NaiveDate,
        drafts: &[GoalDraft],
        force_regenerate: bool,
    ) -> Result<Vec<Goal>, PlanningError> {
        let accepted: Vec<&GoalDraft> = if force_regenerate {
            let removed = self.store.delete_day(chat_id, day)?;
            if removed > 0 {
                tracing::info!("Superseded {} goals for {} (force_regenerate)", removed, day);
            }
            drafts.iter().collect()
        } else {
            let existing = self.store.dedup_keys(chat_id, day)?;
            let (kept, dropped): (Vec<&GoalDraft>, Vec<&GoalDraft>) = drafts
                .iter()
                .partition(|d| !existing.contains(&d.dedup_key()));
            if !dropped.is_empty() {
                tracing::debug!("Dropped {} duplicate drafts for {}", dropped.len(), day);
            }
            kept
        };

        let goals: Vec<Goal> = accepted
            .iter()
            .map(|d| Goal::from_draft(d, chat_id, day))
            .collect::<Result<_, _>>()?;
        self.store.put_many(&goals)?;
        self.invalidate_chat(chat_id);
        tracing::info!("Applied {} goals for {} ({})", goals.len(), day, chat_id);
        Ok(goals)
    }

    /// 状态推进（回退被存储层拒绝）
    pub fn update_status(&self, id: uuid::Uuid, next: GoalStatus) -> Result<bool, PlanningError> {
        let chat_id = self.store.get(id)?.map(|g| g.chat_id);
        let updated = self.store.update_status(id, next)?;
        if updated {
            match chat_id {
                Some(chat) => self.invalidate_chat(&chat),
                None => self.cache.clear(),
            }
        }
        Ok(updated)
    }

    /// 清空某天（命令面板的 clear），返回删除数
    pub fn clear_day(&self, chat_id: &str, day: NaiveDate) -> Result<usize, PlanningError> {
        let n = self.store.delete_day(chat_id, day)?;
        self.invalidate_chat(chat_id);
        Ok(n)
    }

    /// 按 id 前缀删除单条（命令面板的 delete <ref>）
    pub fn delete_goal(&self, id_prefix: &str) -> Result<bool, PlanningError> {
        let deleted = self.store.delete_by_id_prefix(id_prefix)?;
        if deleted {
            // 不知道归属 chat，整体失效
            self.cache.clear();
        }
        Ok(deleted)
    }

    /// 维护扫描：过期条目推进为 completed + 保留期清理；返回 (推进数, 删除数)
    pub fn run_maintenance(&self, today: NaiveDate) -> Result<(usize, usize), PlanningError> {
        let promoted = self.store.complete_overdue(today)?;
        let cutoff = today - chrono::Duration::days(self.cleanup_days as i64);
        let deleted = self
            .store
            .delete_before(cutoff, &[GoalStatus::Completed, GoalStatus::Cancelled])?;
        if promoted > 0 || deleted > 0 {
            self.cache.clear();
            tracing::info!(
                "Maintenance: promoted {} overdue, deleted {} old goals",
                promoted,
                deleted
            );
        }
        Ok((promoted, deleted))
    }

    /// 注入查询：给定时刻，当前活动与下一个活动（5 分钟桶缓存）
    ///
    /// 时间由调用方传入，无隐藏时钟依赖。
    pub fn current_activity(
        &self,
        chat_id: &str,
        now: NaiveDateTime,
    ) -> Result<ActivityNow, PlanningError> {
        let minute = (now.hour() * 60 + now.minute()) as u16;
        let bucket = minute as u32 / ACTIVE_BUCKET_MINUTES;
        let key = format!("active:{}:{}:{}", chat_id, now.date(), bucket);
        if let Some(value) = self.cache.get(&key) {
            if let Ok(hit) = serde_json::from_value::<ActivityNow>(value) {
                return Ok(hit);
            }
        }

        let goals = self.goals_for_day(chat_id, now.date())?;
        let live: Vec<&Goal> = goals
            .iter()
            .filter(|g| matches!(g.status, GoalStatus::Pending | GoalStatus::Active))
            .collect();

        let to_ref = |g: &Goal| ActivityRef {
            name: g.name.clone(),
            description: g.description.clone(),
            start: format_minutes(g.time_window.start_min),
        };
        let result = ActivityNow {
            current: live
                .iter()
                .find(|g| g.time_window.contains(minute))
                .map(|g| to_ref(g)),
            next: live
                .iter()
                .find(|g| g.time_window.start_min > minute)
                .map(|g| to_ref(g)),
        };
        if let Ok(value) = serde_json::to_value(&result) {
            self.cache.put(&key, value);
        }
        Ok(result)
    }

    /// 文本版日程总览（status 命令）
    pub fn schedule_summary(&self, chat_id: &str, day: NaiveDate) -> Result<String, PlanningError> {
        let goals = self.goals_for_day(chat_id, day)?;
        if goals.is_empty() {
            return Ok(format!("{} 还没有日程安排", day));
        }
        let mut lines = vec![format!("{} 的日程（{} 项）", day, goals.len())];
        for (idx, g) in goals.iter().enumerate() {
            let marker = match g.status {
                GoalStatus::Pending => "待办",
                GoalStatus::Active => "进行中",
                GoalStatus::Completed => "已完成",
                GoalStatus::Cancelled => "已取消",
            };
            lines.push(format!(
                "{}. {} {} [{}]",
                idx + 1,
                g.time_window,
                g.name,
                marker
            ));
            lines.push(format!("   {}", g.description));
        }
        Ok(lines.join("\n"))
    }

    /// 详细列表（list 命令），带 id 引用便于 delete
    pub fn schedule_listing(&self, chat_id: &str, day: NaiveDate) -> Result<String, PlanningError> {
        let goals = self.goals_for_day(chat_id, day)?;
        if goals.is_empty() {
            return Ok(format!("{} 还没有日程安排", day));
        }
        let mut lines = vec![format!("{} 的日程明细", day)];
        for g in &goals {
            lines.push(format!(
                "[{}] {} {} ({}/{}) {}",
                &g.id.to_string()[..8],
                g.time_window,
                g.name,
                g.activity_type.as_wire(),
                g.priority.as_wire(),
                g.status.as_wire()
            ));
        }
        Ok(lines.join("\n"))
    }

    /// 缓存命中统计（观测用）
    pub fn cache_stats(&self) -> (u64, u64) {
        self.cache.stats()
    }

    fn invalidate_chat(&self, chat_id: &str) {
        self.cache.invalidate(&format!("day:{}:", chat_id));
        self.cache.invalidate(&format!("active:{}:", chat_id));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::{ActivityType, Priority};

    fn draft(name: &str, start: u16, end: u16) -> GoalDraft {
        GoalDraft {
            name: name.to_string(),
            description: "一段足够长度的活动描述文字".to_string(),
            activity_type: ActivityType::DailyRoutine,
            priority: Priority::Medium,
            start_min: start,
            end_min: end,
        }
    }

    fn manager() -> GoalManager {
        GoalManager::new(
            Arc::new(GoalStore::open_in_memory().unwrap()),
            &CacheSection::default(),
            &CleanupSection::default(),
        )
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 6).unwrap()
    }

    #[test]
    fn test_apply_then_query_roundtrip() {
        let m = manager();
        let drafts = vec![draft("早餐", 480, 510), draft("学习", 510, 720)];
        let created = m.apply_drafts("global", day(), &drafts, false).unwrap();
        assert_eq!(created.len(), 2);
        let got = m.goals_for_day("global", day()).unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].name, "早餐");
    }

    #[test]
    fn test_dedup_drops_existing_pairs() {
        let m = manager();
        m.apply_drafts("global", day(), &[draft("早餐", 480, 510)], false)
            .unwrap();
        // 同键重复 + 一条新项
        let created = m
            .apply_drafts(
                "global",
                day(),
                &[draft("早餐", 480, 510), draft("午餐", 720, 750)],
                false,
            )
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].name, "午餐");
        assert_eq!(m.goals_for_day("global", day()).unwrap().len(), 2);
    }

    #[test]
    fn test_force_regenerate_supersedes_day() {
        let m = manager();
        m.apply_drafts("global", day(), &[draft("旧安排", 480, 510)], false)
            .unwrap();
        let created = m
            .apply_drafts("global", day(), &[draft("新安排", 600, 660)], true)
            .unwrap();
        assert_eq!(created.len(), 1);
        let got = m.goals_for_day("global", day()).unwrap();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].name, "新安排");
    }

    #[test]
    fn test_write_invalidates_cached_read() {
        let m = manager();
        // 先缓存空结果
        assert!(m.goals_for_day("global", day()).unwrap().is_empty());
        m.apply_drafts("global", day(), &[draft("早餐", 480, 510)], false)
            .unwrap();
        // 失效后读到新状态（而不是缓存的空集）
        assert_eq!(m.goals_for_day("global", day()).unwrap().len(), 1);
    }

    #[test]
    fn test_current_activity_with_explicit_now() {
        let m = manager();
        m.apply_drafts(
            "global",
            day(),
            &[draft("早餐", 480, 510), draft("学习", 510, 720)],
            false,
        )
        .unwrap();
        let now = day().and_hms_opt(8, 10, 0).unwrap();
        let res = m.current_activity("global", now).unwrap();
        assert_eq!(res.current.as_ref().unwrap().name, "早餐");
        assert_eq!(res.next.as_ref().unwrap().name, "学习");

        // 无安排时刻
        let late = day().and_hms_opt(23, 0, 0).unwrap();
        let res = m.current_activity("global", late).unwrap();
        assert!(res.current.is_none());
        assert!(res.next.is_none());
    }

    #[test]
    fn test_current_activity_ignores_cancelled() {
        let m = manager();
        let created = m
            .apply_drafts("global", day(), &[draft("早餐", 480, 510)], false)
            .unwrap();
        m.update_status(created[0].id, GoalStatus::Cancelled).unwrap();
        let now = day().and_hms_opt(8, 10, 0).unwrap();
        let res = m.current_activity("global", now).unwrap();
        assert!(res.current.is_none());
    }

    #[test]
    fn test_maintenance_promotes_and_cleans() {
        let m = manager();
        let yesterday = day() - chrono::Duration::days(1);
        let ancient = day() - chrono::Duration::days(31);
        m.apply_drafts("global", yesterday, &[draft("昨日活动", 480, 510)], false)
            .unwrap();
        let old = m
            .apply_drafts("global", ancient, &[draft("远古活动", 480, 510)], false)
            .unwrap();
        m.update_status(old[0].id, GoalStatus::Completed).unwrap();

        let (promoted, deleted) = m.run_maintenance(day()).unwrap();
        assert_eq!(promoted, 1);
        assert_eq!(deleted, 1);
        assert!(m.goals_for_day("global", ancient).unwrap().is_empty());
        assert_eq!(
            m.goals_for_day("global", yesterday).unwrap()[0].status,
            GoalStatus::Completed
        );
    }

    #[test]
    fn test_summary_and_listing() {
        let m = manager();
        m.apply_drafts("global", day(), &[draft("早餐", 480, 510)], false)
            .unwrap();
        let summary = m.schedule_summary("global", day()).unwrap();
        assert!(summary.contains("早餐"));
        assert!(summary.contains("08:00-08:30"));
        let listing = m.schedule_listing("global", day()).unwrap();
        assert!(listing.contains("daily_routine"));
        assert!(m.schedule_summary("global", day() + chrono::Duration::days(1))
            .unwrap()
            .contains("还没有日程安排"));
    }
}

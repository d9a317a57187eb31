//! 目标存储：SQLite（WAL 模式）
//!
//! 单连接 + Mutex 实现单写者纪律：写操作串行化，批量写入走事务（全有或全无）。
//! 常用查询走 (chat_id, day[, status]) 索引；状态变更强制单向推进。

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::core::error::PlanningError;
use crate::core::models::{ActivityType, Goal, GoalStatus, Priority, TimeWindow};

const SCHEMA_VERSION: i64 = 1;

/// SQLite 目标存储
pub struct GoalStore {
    conn: Mutex<Connection>,
}

/// 行的原始形态，类型转换延迟到锁外
struct RawGoal {
    id: String,
    chat_id: String,
    name: String,
    description: String,
    activity_type: String,
    priority: String,
    start_min: u16,
    end_min: u16,
    status: String,
    day: String,
    created_at: String,
}

impl RawGoal {
    fn into_goal(self) -> Result<Goal, PlanningError> {
        let field = |what: &str, v: String| {
            PlanningError::Store(format!("corrupt {} in goals row: {}", what, v))
        };
        Ok(Goal {
            id: Uuid::parse_str(&self.id).map_err(|_| field("goal_id", self.id.clone()))?,
            chat_id: self.chat_id,
            name: self.name,
            description: self.description,
            activity_type: ActivityType::from_wire(&self.activity_type)
                .ok_or_else(|| field("activity_type", self.activity_type.clone()))?,
            priority: Priority::from_wire(&self.priority)
                .ok_or_else(|| field("priority", self.priority.clone()))?,
            time_window: TimeWindow::new(self.start_min, self.end_min)?,
            status: GoalStatus::from_wire(&self.status)
                .ok_or_else(|| field("status", self.status.clone()))?,
            day: NaiveDate::parse_from_str(&self.day, "%Y-%m-%d")
                .map_err(|_| field("day", self.day.clone()))?,
            created_at: DateTime::parse_from_rfc3339(&self.created_at)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| field("created_at", self.created_at.clone()))?,
        })
    }
}

const SELECT_COLS: &str = "goal_id, chat_id, name, description, activity_type, priority, \
     start_min, end_min, status, day, created_at";

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawGoal> {
    Ok(RawGoal {
        id: row.get(0)?,
        chat_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        activity_type: row.get(4)?,
        priority: row.get(5)?,
        start_min: row.get(6)?,
        end_min: row.get(7)?,
        status: row.get(8)?,
        day: row.get(9)?,
        created_at: row.get(10)?,
    })
}

impl GoalStore {
    /// 打开数据库文件（父目录不存在时创建）
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PlanningError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PlanningError::Store(format!("create db dir: {}", e)))?;
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        tracing::info!("GoalStore opened at {}", path.display());
        Ok(store)
    }

    /// 内存数据库（测试用）
    pub fn open_in_memory() -> Result<Self, PlanningError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), PlanningError> {
        let conn = self.conn.lock().unwrap();
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS goals (
                goal_id TEXT PRIMARY KEY,
                chat_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                activity_type TEXT NOT NULL,
                priority TEXT NOT NULL,
                start_min INTEGER NOT NULL,
                end_min INTEGER NOT NULL,
                status TEXT NOT NULL DEFAULT 'pending',
                day TEXT NOT NULL,
                created_at TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_goals_chat_day ON goals(chat_id, day);
            CREATE INDEX IF NOT EXISTS idx_goals_chat_day_status ON goals(chat_id, day, status);
            CREATE INDEX IF NOT EXISTS idx_goals_status ON goals(status);
            CREATE TABLE IF NOT EXISTS metadata (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );",
        )?;
        conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )?;
        Ok(())
    }

    /// 批量插入（单事务，全有或全无）
    pub fn put_many(&self, goals: &[Goal]) -> Result<(), PlanningError> {
        if goals.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO goals (goal_id, chat_id, name, description, activity_type, \
                 priority, start_min, end_min, status, day, created_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            )?;
            for g in goals {
                stmt.execute(params![
                    g.id.to_string(),
                    g.chat_id,
                    g.name,
                    g.description,
                    g.activity_type.as_wire(),
                    g.priority.as_wire(),
                    g.time_window.start_min,
                    g.time_window.end_min,
                    g.status.as_wire(),
                    g.day.format("%Y-%m-%d").to_string(),
                    g.created_at.to_rfc3339(),
                ])?;
            }
        }
        tx.commit()?;
        tracing::debug!("Inserted {} goals", goals.len());
        Ok(())
    }

    /// 单日查询，按开始时间升序
    pub fn query_day(
        &self,
        chat_id: &str,
        day: NaiveDate,
        status: Option<GoalStatus>,
    ) -> Result<Vec<Goal>, PlanningError> {
        self.query_range(chat_id, day, day, status)
    }

    /// 日期范围查询（含两端），按 (day, start_min) 升序
    pub fn query_range(
        &self,
        chat_id: &str,
        from_day: NaiveDate,
        to_day: NaiveDate,
        status: Option<GoalStatus>,
    ) -> Result<Vec<Goal>, PlanningError> {
        let conn = self.conn.lock().unwrap();
        let mut sql = format!(
            "SELECT {} FROM goals WHERE chat_id = ?1 AND day >= ?2 AND day <= ?3",
            SELECT_COLS
        );
        if status.is_some() {
            sql.push_str(" AND status = ?4");
        }
        sql.push_str(" ORDER BY day, start_min");

        let from = from_day.format("%Y-%m-%d").to_string();
        let to = to_day.format("%Y-%m-%d").to_string();

        let mut stmt = conn.prepare(&sql)?;
        let raws: Vec<RawGoal> = match status {
            Some(s) => stmt
                .query_map(params![chat_id, from, to, s.as_wire()], row_to_raw)?
                .collect::<rusqlite::Result<_>>()?,
            None => stmt
                .query_map(params![chat_id, from, to], row_to_raw)?
                .collect::<rusqlite::Result<_>>()?,
        };
        raws.into_iter().map(RawGoal::into_goal).collect()
    }

    pub fn get(&self, id: Uuid) -> Result<Option<Goal>, PlanningError> {
        let conn = self.conn.lock().unwrap();
        let sql = format!("SELECT {} FROM goals WHERE goal_id = ?1", SELECT_COLS);
        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query_map(params![id.to_string()], row_to_raw)?;
        match rows.next() {
            Some(raw) => Ok(Some(raw?.into_goal()?)),
            None => Ok(None),
        }
    }

    pub fn count_day(&self, chat_id: &str, day: NaiveDate) -> Result<usize, PlanningError> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM goals WHERE chat_id = ?1 AND day = ?2",
            params![chat_id, day.format("%Y-%m-%d").to_string()],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    /// 状态推进；回退转换被拒绝，目标不存在时返回 false
    pub fn update_status(&self, id: Uuid, next: GoalStatus) -> Result<bool, PlanningError> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        let current: Option<String> = {
            let mut stmt = tx.prepare("SELECT status FROM goals WHERE goal_id = ?1")?;
            let mut rows = stmt.query_map(params![id.to_string()], |row| row.get(0))?;
            match rows.next() {
                Some(s) => Some(s?),
                None => None,
            }
        };
        let Some(current) = current else {
            return Ok(false);
        };
        let current = GoalStatus::from_wire(&current)
            .ok_or_else(|| PlanningError::Store(format!("corrupt status: {}", current)))?;
        if !current.can_transition_to(next) {
            return Err(PlanningError::InvalidParameters(format!(
                "status transition {} -> {} not allowed",
                current.as_wire(),
                next.as_wire()
            )));
        }
        tx.execute(
            "UPDATE goals SET status = ?1 WHERE goal_id = ?2",
            params![next.as_wire(), id.to_string()],
        )?;
        tx.commit()?;
        tracing::debug!("Goal {} status {} -> {}", id, current.as_wire(), next.as_wire());
        Ok(true)
    }

    /// 删除某天全部条目（force_regenerate 的接管路径），返回删除数
    pub fn delete_day(&self, chat_id: &str, day: NaiveDate) -> Result<usize, PlanningError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "DELETE FROM goals WHERE chat_id = ?1 AND day = ?2",
            params![chat_id, day.format("%Y-%m-%d").to_string()],
        )?;
        Ok(n)
    }

    /// 按 id 前缀删除单条；前缀命中多条时拒绝（要求调用方给出更长引用）
    pub fn delete_by_id_prefix(&self, prefix: &str) -> Result<bool, PlanningError> {
        if prefix.len() < 4 {
            return Err(PlanningError::InvalidParameters(
                "goal reference too short (min 4 chars)".to_string(),
            ));
        }
        let conn = self.conn.lock().unwrap();
        let pattern = format!("{}%", prefix);
        let matches: i64 = conn.query_row(
            "SELECT COUNT(*) FROM goals WHERE goal_id LIKE ?1",
            params![pattern],
            |row| row.get(0),
        )?;
        if matches > 1 {
            return Err(PlanningError::InvalidParameters(format!(
                "goal reference '{}' is ambiguous ({} matches)",
                prefix, matches
            )));
        }
        let n = conn.execute("DELETE FROM goals WHERE goal_id LIKE ?1", params![pattern])?;
        Ok(n > 0)
    }

    /// 保留期清理：删除指定状态中 day 早于 cutoff 的条目，返回删除数
    pub fn delete_before(
        &self,
        cutoff: NaiveDate,
        statuses: &[GoalStatus],
    ) -> Result<usize, PlanningError> {
        if statuses.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().unwrap();
        let placeholders = statuses
            .iter()
            .enumerate()
            .map(|(i, _)| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "DELETE FROM goals WHERE day < ?1 AND status IN ({})",
            placeholders
        );
        let mut values: Vec<Box<dyn rusqlite::ToSql>> =
            vec![Box::new(cutoff.format("%Y-%m-%d").to_string())];
        for s in statuses {
            values.push(Box::new(s.as_wire().to_string()));
        }
        let n = conn.execute(&sql, rusqlite::params_from_iter(values.iter().map(|v| v.as_ref())))?;
        if n > 0 {
            tracing::info!("Deleted {} goals before {}", n, cutoff);
        }
        Ok(n)
    }

    /// 将早于 before_day 且仍为 pending/active 的条目推进为 completed，返回影响数
    pub fn complete_overdue(&self, before_day: NaiveDate) -> Result<usize, PlanningError> {
        let conn = self.conn.lock().unwrap();
        let n = conn.execute(
            "UPDATE goals SET status = 'completed' \
             WHERE day < ?1 AND status IN ('pending', 'active')",
            params![before_day.format("%Y-%m-%d").to_string()],
        )?;
        if n > 0 {
            tracing::debug!("Promoted {} overdue goals to completed", n);
        }
        Ok(n)
    }

    /// 某天已存在的去重键集合
    pub fn dedup_keys(
        &self,
        chat_id: &str,
        day: NaiveDate,
    ) -> Result<HashSet<(String, u16, u16)>, PlanningError> {
        Ok(self
            .query_day(chat_id, day, None)?
            .into_iter()
            .map(|g| g.dedup_key())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::GoalDraft;

    fn draft(name: &str, start: u16, end: u16) -> GoalDraft {
        GoalDraft {
            name: name.to_string(),
            description: format!("{}的描述文本足够长了", name),
            activity_type: ActivityType::DailyRoutine,
            priority: Priority::Medium,
            start_min: start,
            end_min: end,
        }
    }

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 6).unwrap()
    }

    fn store_with(goals: &[Goal]) -> GoalStore {
        let store = GoalStore::open_in_memory().unwrap();
        store.put_many(goals).unwrap();
        store
    }

    fn make_goals(specs: &[(&str, u16, u16)]) -> Vec<Goal> {
        specs
            .iter()
            .map(|(n, s, e)| Goal::from_draft(&draft(n, *s, *e), "global", day()).unwrap())
            .collect()
    }

    #[test]
    fn test_put_many_and_query_ordered_by_start() {
        let goals = make_goals(&[("晚餐", 1080, 1110), ("早餐", 480, 510), ("午餐", 720, 750)]);
        let store = store_with(&goals);
        let got = store.query_day("global", day(), None).unwrap();
        let names: Vec<&str> = got.iter().map(|g| g.name.as_str()).collect();
        assert_eq!(names, vec!["早餐", "午餐", "晚餐"]);
    }

    #[test]
    fn test_query_day_status_filter() {
        let goals = make_goals(&[("早餐", 480, 510), ("午餐", 720, 750)]);
        let store = store_with(&goals);
        store
            .update_status(goals[0].id, GoalStatus::Completed)
            .unwrap();
        let pending = store
            .query_day("global", day(), Some(GoalStatus::Pending))
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].name, "午餐");
    }

    #[test]
    fn test_update_status_rejects_backward() {
        let goals = make_goals(&[("早餐", 480, 510)]);
        let store = store_with(&goals);
        let id = goals[0].id;
        assert!(store.update_status(id, GoalStatus::Active).unwrap());
        assert!(store.update_status(id, GoalStatus::Completed).unwrap());
        // completed 不可回退也不可取消
        assert!(store.update_status(id, GoalStatus::Pending).is_err());
        assert!(store.update_status(id, GoalStatus::Cancelled).is_err());
        // 不存在的目标
        assert!(!store.update_status(Uuid::new_v4(), GoalStatus::Active).unwrap());
    }

    #[test]
    fn test_delete_before_retention_boundary() {
        let today = day();
        let old_day = today - chrono::Duration::days(31);
        let recent_day = today - chrono::Duration::days(29);
        let mut old = Goal::from_draft(&draft("旧活动", 480, 510), "global", old_day).unwrap();
        old.status = GoalStatus::Completed;
        let mut recent =
            Goal::from_draft(&draft("近活动", 480, 510), "global", recent_day).unwrap();
        recent.status = GoalStatus::Completed;
        let store = store_with(&[old, recent]);

        let cutoff = today - chrono::Duration::days(30);
        let n = store
            .delete_before(cutoff, &[GoalStatus::Completed, GoalStatus::Cancelled])
            .unwrap();
        assert_eq!(n, 1);
        assert_eq!(store.query_day("global", recent_day, None).unwrap().len(), 1);
        assert!(store.query_day("global", old_day, None).unwrap().is_empty());
    }

    #[test]
    fn test_complete_overdue_promotes_only_stale() {
        let today = day();
        let yesterday = today - chrono::Duration::days(1);
        let stale = Goal::from_draft(&draft("昨日活动", 480, 510), "global", yesterday).unwrap();
        let fresh = Goal::from_draft(&draft("今日活动", 480, 510), "global", today).unwrap();
        let store = store_with(&[stale.clone(), fresh.clone()]);

        let n = store.complete_overdue(today).unwrap();
        assert_eq!(n, 1);
        assert_eq!(
            store.get(stale.id).unwrap().unwrap().status,
            GoalStatus::Completed
        );
        assert_eq!(
            store.get(fresh.id).unwrap().unwrap().status,
            GoalStatus::Pending
        );
    }

    #[test]
    fn test_delete_day_supersede() {
        let goals = make_goals(&[("早餐", 480, 510), ("午餐", 720, 750)]);
        let store = store_with(&goals);
        assert_eq!(store.delete_day("global", day()).unwrap(), 2);
        assert_eq!(store.count_day("global", day()).unwrap(), 0);
    }

    #[test]
    fn test_delete_by_id_prefix() {
        let goals = make_goals(&[("早餐", 480, 510)]);
        let store = store_with(&goals);
        let prefix = &goals[0].id.to_string()[..8];
        assert!(store.delete_by_id_prefix(prefix).unwrap());
        assert!(!store.delete_by_id_prefix(prefix).unwrap());
        assert!(store.delete_by_id_prefix("ab").is_err());
    }

    #[test]
    fn test_dedup_keys() {
        let goals = make_goals(&[("早餐", 480, 510)]);
        let store = store_with(&goals);
        let keys = store.dedup_keys("global", day()).unwrap();
        assert!(keys.contains(&("早餐".to_string(), 480, 510)));
        assert_eq!(keys.len(), 1);
    }
}

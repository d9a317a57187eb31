//! 时间工具：HH:MM 与分钟数互转、星期名、时区管理
//!
//! 所有日程时间以「从午夜起的分钟数」表示（0-1440）；时区按配置的 IANA 名称解析，
//! 解析失败时降级为系统本地时区。

use chrono::{Datelike, NaiveDate, NaiveDateTime, Utc};
use chrono_tz::Tz;

/// 一天的分钟数
pub const MINUTES_PER_DAY: u16 = 1440;

/// 星期名称（中文）
pub const WEEKDAY_NAMES: [&str; 7] = ["周一", "周二", "周三", "周四", "周五", "周六", "周日"];

/// 解析 "HH:MM" 为从午夜起的分钟数；格式非法时返回 None
pub fn parse_hhmm(s: &str) -> Option<u16> {
    let (h, m) = s.trim().split_once(':')?;
    let hour: u16 = h.trim().parse().ok()?;
    let minute: u16 = m.trim().parse().ok()?;
    if hour > 23 || minute > 59 {
        return None;
    }
    Some(hour * 60 + minute)
}

/// 分钟数格式化为 "HH:MM"（1440 显示为 24:00，用于当天末尾）
pub fn format_minutes(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// 取某日期的星期名
pub fn weekday_name(day: NaiveDate) -> &'static str {
    WEEKDAY_NAMES[day.weekday().num_days_from_monday() as usize]
}

/// 是否周末
pub fn is_weekend(day: NaiveDate) -> bool {
    day.weekday().num_days_from_monday() >= 5
}

/// 时区管理器：集中处理配置时区，避免各模块各自解析
///
/// 解析失败降级为系统本地时区（与配置名无关的行为差异只记一次 warn）。
#[derive(Debug, Clone)]
pub struct TimezoneManager {
    name: String,
    tz: Option<Tz>,
}

impl TimezoneManager {
    pub fn new(timezone: &str) -> Self {
        let tz = timezone.parse::<Tz>().ok();
        if tz.is_none() {
            tracing::warn!("Unknown timezone '{}', falling back to system local", timezone);
        }
        Self {
            name: timezone.to_string(),
            tz,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 配置时区下的当前本地时间（naive，后续计算均基于此）
    pub fn now(&self) -> NaiveDateTime {
        match self.tz {
            Some(tz) => Utc::now().with_timezone(&tz).naive_local(),
            None => chrono::Local::now().naive_local(),
        }
    }

    /// 配置时区下的今天日期
    pub fn today(&self) -> NaiveDate {
        self.now().date()
    }
}

impl Default for TimezoneManager {
    fn default() -> Self {
        Self::new("Asia/Shanghai")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("09:30"), Some(570));
        assert_eq!(parse_hhmm("00:00"), Some(0));
        assert_eq!(parse_hhmm("23:59"), Some(1439));
        assert_eq!(parse_hhmm(" 7:05 "), Some(425));
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("12:60"), None);
        assert_eq!(parse_hhmm("0930"), None);
        assert_eq!(parse_hhmm("invalid"), None);
    }

    #[test]
    fn test_format_minutes() {
        assert_eq!(format_minutes(570), "09:30");
        assert_eq!(format_minutes(0), "00:00");
        assert_eq!(format_minutes(1439), "23:59");
        assert_eq!(format_minutes(1440), "24:00");
    }

    #[test]
    fn test_weekday_name() {
        // 2026-08-03 是周一
        let monday = NaiveDate::from_ymd_opt(2026, 8, 3).unwrap();
        assert_eq!(weekday_name(monday), "周一");
        assert!(!is_weekend(monday));
        let sunday = NaiveDate::from_ymd_opt(2026, 8, 9).unwrap();
        assert_eq!(weekday_name(sunday), "周日");
        assert!(is_weekend(sunday));
    }

    #[test]
    fn test_timezone_fallback() {
        let tz = TimezoneManager::new("Not/AZone");
        assert_eq!(tz.name(), "Not/AZone");
        // 降级后仍可取时间
        let _ = tz.now();
    }

    #[test]
    fn test_timezone_known() {
        let tz = TimezoneManager::new("Asia/Shanghai");
        let _ = tz.today();
    }
}

//! 日程语义校验器
//!
//! 无状态纯函数：(候选列表, 配置) -> 违规描述列表（人类可读，作为下一轮反馈）。
//! 重叠按违规上报，不做静默截断——截断是漂移的来源，修正交给重新生成。

use crate::config::ScheduleSection;
use crate::core::models::{ActivityType, GoalDraft};
use crate::core::time::{format_minutes, MINUTES_PER_DAY};

/// 常识时间锚点：(活动类型, 名称关键词, 合理的开始小时区间列表)
const REASONABLE_HOURS: &[(ActivityType, &str, &[(u16, u16)])] = &[
    (ActivityType::Meal, "早餐", &[(6, 9)]),
    (ActivityType::Meal, "早饭", &[(6, 9)]),
    (ActivityType::Meal, "午餐", &[(11, 14)]),
    (ActivityType::Meal, "午饭", &[(11, 14)]),
    (ActivityType::Meal, "晚餐", &[(17, 20)]),
    (ActivityType::Meal, "晚饭", &[(17, 20)]),
    (ActivityType::DailyRoutine, "睡觉", &[(22, 24), (0, 6)]),
    (ActivityType::DailyRoutine, "睡前", &[(21, 24), (0, 2)]),
    (ActivityType::DailyRoutine, "起床", &[(6, 10)]),
    (ActivityType::Study, "上课", &[(8, 18)]),
    (ActivityType::Exercise, "运动", &[(6, 9), (17, 22)]),
    (ActivityType::Exercise, "健身", &[(6, 9), (17, 22)]),
    (ActivityType::SocialMaintenance, "夜聊", &[(20, 24)]),
];

/// 校验候选集；返回空列表即通过
pub fn validate(drafts: &[GoalDraft], cfg: &ScheduleSection) -> Vec<String> {
    let mut violations = Vec::new();

    for (idx, d) in drafts.iter().enumerate() {
        check_window(idx, d, &mut violations);
        check_fields(idx, d, cfg, &mut violations);
        check_reasonable_hours(idx, d, &mut violations);
    }
    check_duplicates(drafts, &mut violations);

    // 按开始时间排序后检查重叠与空档
    let mut sorted: Vec<&GoalDraft> = drafts.iter().collect();
    sorted.sort_by_key(|d| d.start_min);
    check_overlaps(&sorted, &mut violations);
    check_gaps(&sorted, cfg.gap_threshold_minutes, &mut violations);

    violations
}

fn check_window(idx: usize, d: &GoalDraft, out: &mut Vec<String>) {
    if d.start_min >= d.end_min {
        out.push(format!(
            "第{}项 ({}): 时间窗口无效，开始 {} 不早于结束 {}",
            idx + 1,
            d.name,
            format_minutes(d.start_min),
            format_minutes(d.end_min.min(MINUTES_PER_DAY))
        ));
    } else if d.end_min > MINUTES_PER_DAY {
        out.push(format!(
            "第{}项 ({}): 结束时间超出当天（{} + 时长越过 24:00）",
            idx + 1,
            d.name,
            format_minutes(d.start_min)
        ));
    }
}

fn check_fields(idx: usize, d: &GoalDraft, cfg: &ScheduleSection, out: &mut Vec<String>) {
    let len = d.description.chars().count();
    if len < cfg.min_description_length || len > cfg.max_description_length {
        out.push(format!(
            "第{}项 ({}): 描述长度 {} 字，要求 {}-{} 字",
            idx + 1,
            d.name,
            len,
            cfg.min_description_length,
            cfg.max_description_length
        ));
    }
    let name_len = d.name.chars().count();
    if !(2..=20).contains(&name_len) {
        out.push(format!(
            "第{}项 ({}): 名称长度 {} 字，要求 2-20 字",
            idx + 1,
            d.name,
            name_len
        ));
    }
}

/// 常识性时间检查：早餐不该在半夜之类
fn check_reasonable_hours(idx: usize, d: &GoalDraft, out: &mut Vec<String>) {
    let hour = d.start_min / 60;
    for (activity, keyword, ranges) in REASONABLE_HOURS {
        if d.activity_type == *activity && d.name.contains(keyword) {
            let ok = ranges.iter().any(|(lo, hi)| (*lo..*hi).contains(&hour));
            if !ok {
                let hint = ranges
                    .iter()
                    .map(|(lo, hi)| format!("{:02}:00-{:02}:00", lo, hi))
                    .collect::<Vec<_>>()
                    .join(" 或 ");
                out.push(format!(
                    "第{}项 ({}): {}时间不合理（{}），建议 {}",
                    idx + 1,
                    d.name,
                    keyword,
                    format_minutes(d.start_min),
                    hint
                ));
            }
            return;
        }
    }
}

fn check_duplicates(drafts: &[GoalDraft], out: &mut Vec<String>) {
    let mut seen = std::collections::HashSet::new();
    for d in drafts {
        if !seen.insert(d.dedup_key()) {
            out.push(format!(
                "重复条目: {} @ {}-{}",
                d.name,
                format_minutes(d.start_min),
                format_minutes(d.end_min.min(MINUTES_PER_DAY))
            ));
        }
    }
}

fn check_overlaps(sorted: &[&GoalDraft], out: &mut Vec<String>) {
    for pair in sorted.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        if next.start_min < prev.end_min {
            out.push(format!(
                "时间重叠: {} ({}-{}) 与 {} ({}-{})",
                prev.name,
                format_minutes(prev.start_min),
                format_minutes(prev.end_min.min(MINUTES_PER_DAY)),
                next.name,
                format_minutes(next.start_min),
                format_minutes(next.end_min.min(MINUTES_PER_DAY))
            ));
        }
    }
}

fn check_gaps(sorted: &[&GoalDraft], threshold: u16, out: &mut Vec<String>) {
    for pair in sorted.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        if next.start_min >= prev.end_min {
            let gap = next.start_min - prev.end_min;
            if gap >= threshold {
                out.push(format!(
                    "时间空档: {}-{}（{} 分钟，{} 之后无安排）",
                    format_minutes(prev.end_min),
                    format_minutes(next.start_min),
                    gap,
                    prev.name
                ));
            }
        }
    }
}

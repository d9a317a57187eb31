//! 日程质量评分器
//!
//! 纯函数：(候选列表, 违规数, 上下文, 配置) -> [0,1] 分数。
//! 维度：活动数量、描述长度、时段覆盖、类型多样性、偏好锚点覆盖、风格指令贴合；
//! 违规按条扣分（有上限）。分数达到 quality_threshold 即接受。

use crate::config::ScheduleSection;
use crate::core::models::GoalDraft;
use crate::planner::context::GenerationContext;

/// 基础分
const W_BASE: f32 = 0.30;
/// 活动数量权重
const W_COUNT: f32 = 0.15;
/// 描述长度权重
const W_DESCRIPTION: f32 = 0.10;
/// 时段覆盖权重
const W_COVERAGE: f32 = 0.15;
/// 类型多样性权重
const W_VARIETY: f32 = 0.15;
/// 偏好锚点权重
const W_ANCHORS: f32 = 0.10;
/// 风格指令权重
const W_STYLE: f32 = 0.05;
/// 每条违规扣分 / 扣分上限
const WARNING_PENALTY: f32 = 0.05;
const MAX_WARNING_PENALTY: f32 = 0.30;

/// 期望覆盖的主时段：7:00-23:00，共 16 小时
const EXPECTED_HOURS: std::ops::Range<u16> = 7..23;
/// 多样性满分所需的类型数
const VARIETY_TARGET: usize = 5;

/// 计算质量分数
pub fn score(
    drafts: &[GoalDraft],
    violations: &[String],
    ctx: &GenerationContext,
    cfg: &ScheduleSection,
) -> f32 {
    if drafts.is_empty() {
        return 0.0;
    }

    let mut total = W_BASE;
    total += score_activity_count(drafts.len(), cfg) * W_COUNT;
    total += score_description_length(drafts, cfg) * W_DESCRIPTION;
    total += score_time_coverage(drafts) * W_COVERAGE;
    total += score_variety(drafts) * W_VARIETY;
    total += score_anchor_coverage(drafts, ctx) * W_ANCHORS;
    total += score_style_adherence(drafts, ctx) * W_STYLE;

    let penalty = (violations.len() as f32 * WARNING_PENALTY).min(MAX_WARNING_PENALTY);
    let final_score = (total - penalty).clamp(0.0, 1.0);
    tracing::debug!(
        "Quality score {:.2} ({} items, {} violations)",
        final_score,
        drafts.len(),
        violations.len()
    );
    final_score
}

/// 阈值未达标时给出可反馈的短板说明（折入下一轮提示词）
pub fn shortfalls(
    drafts: &[GoalDraft],
    ctx: &GenerationContext,
    cfg: &ScheduleSection,
) -> Vec<String> {
    let mut out = Vec::new();
    if score_activity_count(drafts.len(), cfg) < 1.0 {
        out.push(format!(
            "活动数量 {} 不在要求的 {}-{} 个范围内",
            drafts.len(),
            cfg.min_activities,
            cfg.max_activities
        ));
    }
    if score_description_length(drafts, cfg) < 1.0 {
        out.push(format!(
            "活动描述偏短，请写到 {} 字左右的自然叙述",
            (cfg.min_description_length + cfg.max_description_length) / 2
        ));
    }
    if score_time_coverage(drafts) < 1.0 {
        out.push("白天主时段（7:00-23:00）没有被完整覆盖".to_string());
    }
    if score_variety(drafts) < 1.0 {
        out.push("活动类型过于单一，请混合作息/学习/娱乐/运动/社交等".to_string());
    }
    if score_anchor_coverage(drafts, ctx) < 1.0 {
        out.push("偏好设定的作息/用餐时间点没有对应安排".to_string());
    }
    if score_style_adherence(drafts, ctx) < 1.0 {
        out.push("日程内容没有体现自定义要求".to_string());
    }
    out
}

fn score_activity_count(count: usize, cfg: &ScheduleSection) -> f32 {
    if (cfg.min_activities..=cfg.max_activities).contains(&count) {
        1.0
    } else if count + 2 >= cfg.min_activities && count <= cfg.max_activities + 2 {
        0.5
    } else {
        0.0
    }
}

fn score_description_length(drafts: &[GoalDraft], cfg: &ScheduleSection) -> f32 {
    let target = (cfg.min_description_length + cfg.max_description_length) / 2;
    let total: usize = drafts.iter().map(|d| d.description.chars().count()).sum();
    let avg = total / drafts.len();
    if avg >= target {
        1.0
    } else if avg >= cfg.min_description_length {
        0.5
    } else {
        0.0
    }
}

/// 主时段覆盖率：某小时只要被任一窗口触及即算覆盖
fn score_time_coverage(drafts: &[GoalDraft]) -> f32 {
    let covered = EXPECTED_HOURS
        .filter(|h| {
            let (lo, hi) = (h * 60, h * 60 + 60);
            drafts.iter().any(|d| d.start_min < hi && lo < d.end_min)
        })
        .count();
    (covered as f32 / EXPECTED_HOURS.len() as f32).min(1.0)
}

fn score_variety(drafts: &[GoalDraft]) -> f32 {
    let distinct: std::collections::HashSet<_> =
        drafts.iter().map(|d| d.activity_type).collect();
    (distinct.len() as f32 / VARIETY_TARGET as f32).min(1.0)
}

/// 偏好锚点覆盖：每个声明的时间点须落在某个活动窗口内；未声明任何锚点时不扣分
fn score_anchor_coverage(drafts: &[GoalDraft], ctx: &GenerationContext) -> f32 {
    let anchors = ctx.preferences.anchors();
    if anchors.is_empty() {
        return 1.0;
    }
    let hit = anchors
        .iter()
        .filter(|(_, minute)| {
            drafts
                .iter()
                .any(|d| d.start_min <= *minute && *minute < d.end_min)
        })
        .count();
    hit as f32 / anchors.len() as f32
}

/// 风格指令贴合：关键词（≥2 字的指令词）在名称/描述中出现的比例；未配置时不扣分
fn score_style_adherence(drafts: &[GoalDraft], ctx: &GenerationContext) -> f32 {
    let keywords: Vec<&str> = ctx
        .custom_prompt
        .split(|c: char| c.is_whitespace() || c.is_ascii_punctuation() || "，。！？、：；".contains(c))
        .filter(|w| w.chars().count() >= 2)
        .collect();
    if keywords.is_empty() {
        return 1.0;
    }
    let hit = keywords
        .iter()
        .filter(|kw| {
            drafts
                .iter()
                .any(|d| d.name.contains(*kw) || d.description.contains(*kw))
        })
        .count();
    hit as f32 / keywords.len() as f32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PlanningConfig, PreferencesSection};
    use crate::core::models::{ActivityType, Priority};
    use crate::planner::context::GenerationContext;

    fn draft(name: &str, ty: ActivityType, start: u16, end: u16) -> GoalDraft {
        GoalDraft {
            name: name.to_string(),
            description: "这是一段长度相当充分的活动描述文字，写得挺自然的，足够详细了".to_string(),
            activity_type: ty,
            priority: Priority::Medium,
            start_min: start,
            end_min: end,
        }
    }

    fn ctx_with(custom_prompt: &str, prefs: PreferencesSection) -> GenerationContext {
        GenerationContext {
            day: chrono::NaiveDate::from_ymd_opt(2026, 8, 6).unwrap(),
            weekday: "周四",
            is_weekend: false,
            bot_name: "小蜜".to_string(),
            personality: "是一个女大学生".to_string(),
            interest: String::new(),
            reply_style: String::new(),
            preferences: prefs,
            custom_prompt: custom_prompt.to_string(),
            yesterday_summary: String::new(),
            existing: Vec::new(),
        }
    }

    /// 覆盖全天、类型多样的满配日程
    fn full_day() -> Vec<GoalDraft> {
        vec![
            draft("睡觉", ActivityType::DailyRoutine, 0, 450),
            draft("起床", ActivityType::DailyRoutine, 450, 480),
            draft("早餐", ActivityType::Meal, 480, 510),
            draft("上午学习", ActivityType::Study, 510, 720),
            draft("午餐", ActivityType::Meal, 720, 750),
            draft("午休", ActivityType::Rest, 750, 780),
            draft("下午学习", ActivityType::Study, 780, 900),
            draft("兴趣活动", ActivityType::LearnTopic, 900, 1020),
            draft("运动", ActivityType::Exercise, 1020, 1080),
            draft("晚餐", ActivityType::Meal, 1080, 1110),
            draft("娱乐", ActivityType::Entertainment, 1110, 1290),
            draft("夜聊", ActivityType::SocialMaintenance, 1290, 1350),
            draft("睡前准备", ActivityType::DailyRoutine, 1350, 1440),
        ]
    }

    #[test]
    fn test_full_day_scores_above_threshold() {
        let cfg = PlanningConfig::default();
        let ctx = ctx_with("", PreferencesSection::default());
        let s = score(&full_day(), &[], &ctx, &cfg.schedule);
        assert!(s >= cfg.schedule.quality_threshold, "score {}", s);
    }

    #[test]
    fn test_empty_scores_zero() {
        let cfg = PlanningConfig::default();
        let ctx = ctx_with("", PreferencesSection::default());
        assert_eq!(score(&[], &[], &ctx, &cfg.schedule), 0.0);
    }

    #[test]
    fn test_violations_lower_score() {
        let cfg = PlanningConfig::default();
        let ctx = ctx_with("", PreferencesSection::default());
        let clean = score(&full_day(), &[], &ctx, &cfg.schedule);
        let warnings: Vec<String> = (0..3).map(|i| format!("violation {}", i)).collect();
        let dirty = score(&full_day(), &warnings, &ctx, &cfg.schedule);
        assert!(dirty < clean);
        assert!((clean - dirty - 0.15).abs() < 1e-6);
    }

    #[test]
    fn test_monotony_penalized() {
        let cfg = PlanningConfig::default();
        let ctx = ctx_with("", PreferencesSection::default());
        // 全是学习，无多样性
        let monotone: Vec<GoalDraft> = (0..10)
            .map(|i| draft("学习", ActivityType::Study, i * 100, i * 100 + 100))
            .collect();
        let s_mono = score(&monotone, &[], &ctx, &cfg.schedule);
        let s_full = score(&full_day(), &[], &ctx, &cfg.schedule);
        assert!(s_mono < s_full);
    }

    #[test]
    fn test_anchor_coverage() {
        let prefs = PreferencesSection {
            breakfast_time: Some("08:00".to_string()),
            dinner_time: Some("18:10".to_string()),
            ..Default::default()
        };
        let ctx = ctx_with("", prefs);
        // full_day 的早餐窗口 480-510 覆盖 08:00，晚餐 1080-1110 覆盖 18:10
        assert_eq!(score_anchor_coverage(&full_day(), &ctx), 1.0);

        let prefs_missed = PreferencesSection {
            breakfast_time: Some("05:00".to_string()),
            ..Default::default()
        };
        let ctx2 = ctx_with("", prefs_missed);
        // 05:00 落在睡觉窗口 0-450 内，其实会命中——换个完全无覆盖的点
        assert_eq!(score_anchor_coverage(&full_day()[2..3].to_vec(), &ctx2), 0.0);
    }

    #[test]
    fn test_style_adherence_keyword_hit() {
        let cfg = PlanningConfig::default();
        let ctx = ctx_with("今天要有 运动 安排", PreferencesSection::default());
        let s_with = score(&full_day(), &[], &ctx, &cfg.schedule);
        let no_sport: Vec<GoalDraft> = full_day()
            .into_iter()
            .filter(|d| d.name != "运动")
            .collect();
        let s_without = score(&no_sport, &[], &ctx, &cfg.schedule);
        assert!(s_with > s_without);
    }

    #[test]
    fn test_shortfalls_name_the_gaps() {
        let cfg = PlanningConfig::default();
        let ctx = ctx_with("", PreferencesSection::default());
        let few = vec![draft("学习", ActivityType::Study, 480, 600)];
        let reasons = shortfalls(&few, &ctx, &cfg.schedule);
        assert!(reasons.iter().any(|r| r.contains("活动数量")));
        assert!(reasons.iter().any(|r| r.contains("类型过于单一")));
    }
}

//! 提示词构建
//!
//! 纯函数：上下文 + 配置 + Schema -> 提示词文本。重试轮在末尾追加上一轮的
//! 问题清单（最多 5 条），让模型针对性修正。心情/活力用日期确定性种子，
//! 同一天多次生成保持一致，跨天自然变化。

use serde_json::Value;

use crate::config::ScheduleSection;
use crate::planner::context::GenerationContext;

/// 心情/活力种子取模数
const MOOD_SEED_MODULO: u32 = 100;
/// 重试反馈最多列出的问题数
const MAX_FEEDBACK_ITEMS: usize = 5;

/// 日期字符串的确定性种子（同日稳定）
fn date_seed(text: &str) -> u32 {
    text.bytes()
        .fold(0u32, |acc, b| acc.wrapping_mul(31).wrapping_add(b as u32))
        % MOOD_SEED_MODULO
}

/// 构建首轮提示词
pub fn build_schedule_prompt(
    ctx: &GenerationContext,
    cfg: &ScheduleSection,
    schema: &Value,
) -> String {
    let date_str = ctx.day.format("%Y-%m-%d").to_string();
    let mood = date_seed(&date_str);
    let energy = date_seed(&format!("{}energy", date_str));

    let mut prompt = format!(
        "你是{}，{}\n\n今天是{} {}{}\n昨天: {}\n状态: 心情{}/100，活力{}/100\n",
        ctx.bot_name,
        ctx.personality,
        date_str,
        ctx.weekday,
        if ctx.is_weekend { "（周末）" } else { "" },
        if ctx.yesterday_summary.is_empty() {
            "昨天普通的一天"
        } else {
            &ctx.yesterday_summary
        },
        mood,
        energy,
    );

    if !ctx.custom_prompt.is_empty() {
        prompt.push_str(&format!("\n【特殊要求】\n{}\n", ctx.custom_prompt));
    }

    prompt.push_str(&format!(
        "\n【任务】生成今天的详细日程JSON：\n\
         核心要求：日程必须全天无缝衔接，不允许任何时间空档！\n\
         - 每个活动的结束时间 = 下一个活动的开始时间\n\
         - 计算公式：结束时间 = time_slot + duration_hours\n\n\
         1. {}-{}个活动，完整覆盖全天（00:00-24:00，无缝衔接）\n\
         2. 每个description {}-{}字，用自然叙述风格（像日记）\n\
         3. 体现人设：{}\n\
         4. 兴趣相关：{}\n\
         5. 表达风格：{}\n",
        cfg.min_activities,
        cfg.max_activities,
        cfg.min_description_length,
        cfg.max_description_length,
        truncate_chars(&ctx.personality, 50),
        if ctx.interest.is_empty() {
            "日常生活"
        } else {
            &ctx.interest
        },
        if ctx.reply_style.is_empty() {
            "自然随意"
        } else {
            &ctx.reply_style
        },
    ));

    if !ctx.custom_prompt.is_empty() {
        prompt.push_str("6. 优先满足上述【特殊要求】的内容\n");
    }

    let anchors = ctx.preferences.anchors();
    if !anchors.is_empty() {
        prompt.push_str("\n【作息偏好】\n");
        for (name, minute) in &anchors {
            prompt.push_str(&format!(
                "  {}: {}\n",
                name,
                crate::core::time::format_minutes(*minute)
            ));
        }
    }
    if !ctx.preferences.favorite_activities.is_empty() {
        prompt.push_str(&format!(
            "喜欢: {}\n",
            ctx.preferences.favorite_activities.join(", ")
        ));
    }

    prompt.push_str(
        "\n【活动类型】\n\
         daily_routine(作息)|meal(吃饭)|study(学习)|entertainment(娱乐)|\
         social_maintenance(社交)|exercise(运动)|learn_topic(兴趣)|rest(休息)|\
         free_time(自由)|custom(其他)\n\
         \n【JSON格式示例】（完整展示全天无缝衔接）\n\
         {\n  \"schedule_items\": [\n\
             {\"name\":\"睡觉\",\"description\":\"蜷在被窝里睡得很香很香的样子\",\"goal_type\":\"daily_routine\",\"priority\":\"high\",\"time_slot\":\"00:00\",\"duration_hours\":7.5},\n\
             {\"name\":\"起床洗漱\",\"description\":\"迷迷糊糊爬起来刷牙洗脸清醒下\",\"goal_type\":\"daily_routine\",\"priority\":\"medium\",\"time_slot\":\"07:30\",\"duration_hours\":0.5},\n\
             {\"name\":\"早餐\",\"description\":\"简单吃了点东西填饱肚子再出门\",\"goal_type\":\"meal\",\"priority\":\"high\",\"time_slot\":\"08:00\",\"duration_hours\":0.5},\n\
             {\"name\":\"上午学习\",\"description\":\"认真看书学习新知识状态还不错\",\"goal_type\":\"study\",\"priority\":\"high\",\"time_slot\":\"08:30\",\"duration_hours\":3.5},\n\
             {\"name\":\"午餐\",\"description\":\"吃了喜欢的菜心情一下子变好了\",\"goal_type\":\"meal\",\"priority\":\"high\",\"time_slot\":\"12:00\",\"duration_hours\":0.5}\n\
           ]\n}\n\
         （示例仅截取前5项，实际要覆盖到24:00）\n\
         \n注意示例的衔接方式：\n\
         - 睡觉 00:00 + 7.5h = 07:30 → 起床洗漱 07:30 无缝\n\
         - 起床洗漱 07:30 + 0.5h = 08:00 → 早餐 08:00 无缝\n\
         - 以此类推，每个活动结束时间 = 下个活动开始时间，最后回到 24:00\n\
         \nduration_hours 是活动持续时长（小时），不是重复间隔！\n",
    );

    prompt.push_str(&format!(
        "\n【时间合理性要求】\n\
         1. 无缝覆盖全天：每个活动结束时间 = 下个活动开始时间（不允许任何空档）\n\
         2. 关键活动时间必须合理：早餐6-9点、午餐11-14点、晚餐17-20点、睡觉从22点后开始\n\
         3. 下午和晚间的大时段要细分成多个活动，单个活动不要超过3小时\n\
         \n【要求】\n\
         - 严格JSON格式，无注释\n\
         - time_slot按时间递增（HH:MM格式）\n\
         - description简洁自然，{}-{}字\n\
         - 体现{}特色（{}）\n\
         - 符合心情{}和活力{}\n",
        cfg.min_description_length,
        cfg.max_description_length,
        ctx.weekday,
        if ctx.is_weekend { "周末睡懒觉" } else { "工作日早起" },
        mood,
        energy,
    ));

    prompt.push_str(&format!(
        "\n【Schema要求】\n\
         - {}-{}个活动（必须）\n\
         - 必填：name(2-20字), description({}-{}字), time_slot, goal_type, priority\n\
         - priority: high/medium/low\n\
         - duration_hours: 0.25-12（活动持续时长，小时）\n\nSchema: {}\n",
        cfg.min_activities,
        cfg.max_activities,
        cfg.min_description_length,
        cfg.max_description_length,
        schema["properties"]["schedule_items"],
    ));

    prompt
}

/// 构建重试轮提示词（附带上一轮反馈）
pub fn build_retry_prompt(
    ctx: &GenerationContext,
    cfg: &ScheduleSection,
    schema: &Value,
    previous_issues: &[String],
) -> String {
    let mut prompt = build_schedule_prompt(ctx, cfg, schema);
    prompt.push_str("\n\n**上一次生成存在以下问题，请改进：**\n\n");
    for (idx, issue) in previous_issues.iter().take(MAX_FEEDBACK_ITEMS).enumerate() {
        prompt.push_str(&format!("{}. {}\n", idx + 1, issue));
    }
    prompt.push_str("\n**请重新生成一个更合理的日程，特别注意以上问题！**\n");
    prompt
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{PlanningConfig, PreferencesSection};
    use crate::planner::schema::build_schema;

    fn ctx() -> GenerationContext {
        GenerationContext {
            day: chrono::NaiveDate::from_ymd_opt(2026, 8, 6).unwrap(),
            weekday: "周四",
            is_weekend: false,
            bot_name: "小蜜".to_string(),
            personality: "是一个爱睡懒觉的女大学生".to_string(),
            interest: "画画".to_string(),
            reply_style: "随意".to_string(),
            preferences: PreferencesSection {
                breakfast_time: Some("08:00".to_string()),
                ..Default::default()
            },
            custom_prompt: String::new(),
            yesterday_summary: "昨天普通的一天".to_string(),
            existing: Vec::new(),
        }
    }

    #[test]
    fn test_prompt_embeds_required_sections() {
        let cfg = PlanningConfig::default();
        let schema = build_schema(&cfg.schedule);
        let prompt = build_schedule_prompt(&ctx(), &cfg.schedule, &schema);

        assert!(prompt.contains("2026-08-06"));
        assert!(prompt.contains("周四"));
        assert!(prompt.contains("8-15个活动"));
        assert!(prompt.contains("无缝衔接"));
        assert!(prompt.contains("duration_hours"));
        assert!(prompt.contains("早餐: 08:00"));
        assert!(prompt.contains("Schema:"));
        // 零空档的算例展示
        assert!(prompt.contains("00:00 + 7.5h = 07:30"));
    }

    #[test]
    fn test_prompt_deterministic_for_same_day() {
        let cfg = PlanningConfig::default();
        let schema = build_schema(&cfg.schedule);
        let a = build_schedule_prompt(&ctx(), &cfg.schedule, &schema);
        let b = build_schedule_prompt(&ctx(), &cfg.schedule, &schema);
        assert_eq!(a, b);
    }

    #[test]
    fn test_custom_prompt_section_present_when_configured() {
        let cfg = PlanningConfig::default();
        let schema = build_schema(&cfg.schedule);
        let mut c = ctx();
        c.custom_prompt = "今天想多画画".to_string();
        let prompt = build_schedule_prompt(&c, &cfg.schedule, &schema);
        assert!(prompt.contains("【特殊要求】"));
        assert!(prompt.contains("今天想多画画"));
        assert!(prompt.contains("优先满足上述【特殊要求】"));
    }

    #[test]
    fn test_retry_prompt_carries_feedback_capped_at_five() {
        let cfg = PlanningConfig::default();
        let schema = build_schema(&cfg.schedule);
        let issues: Vec<String> = (0..8).map(|i| format!("问题{}", i)).collect();
        let prompt = build_retry_prompt(&ctx(), &cfg.schedule, &schema, &issues);
        assert!(prompt.contains("上一次生成存在以下问题"));
        assert!(prompt.contains("问题0"));
        assert!(prompt.contains("问题4"));
        assert!(!prompt.contains("问题5"));
    }

    #[test]
    fn test_retry_prompt_carries_gap_feedback() {
        let cfg = PlanningConfig::default();
        let schema = build_schema(&cfg.schedule);
        let issues = vec!["时间空档: 16:30-18:00（90 分钟）".to_string()];
        let prompt = build_retry_prompt(&ctx(), &cfg.schedule, &schema, &issues);
        assert!(prompt.contains("16:30-18:00"));
    }
}

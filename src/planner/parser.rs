//! LLM 响应解析：原始文本 -> 候选草稿列表
//!
//! 容错：Markdown 围栏、围绕 JSON 的闲聊文本、字符串值内未转义的控制字符、键名大小写。
//! 严格：缺必填字段、时间不可解析、条目数远超上限（> 2x max）一律 MalformedResponse，
//! 由编排层决定是否进入下一轮，绝不静默丢项。

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::config::ScheduleSection;
use crate::core::error::PlanningError;
use crate::core::models::{ActivityType, GoalDraft, Priority};
use crate::core::time::parse_hhmm;

/// duration_hours 合法区间（小时），越界时回落为 1 小时
const MIN_DURATION_HOURS: f64 = 0.25;
const MAX_DURATION_HOURS: f64 = 12.0;
const DEFAULT_DURATION_HOURS: f64 = 1.0;

/// 匹配 JSON 双引号字符串（用于控制字符修复）
fn json_string_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""[^"]*""#).unwrap())
}

/// 去掉 Markdown 代码围栏
fn strip_markdown_fences(response: &str) -> &str {
    let mut s = response.trim();
    if let Some(rest) = s.strip_prefix("```json") {
        s = rest.trim_start();
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest.trim_start();
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest.trim_end();
    }
    s.trim()
}

/// 截取最外层 JSON 对象（容忍 JSON 前后的闲聊文本）
fn extract_json_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    if end <= start {
        return None;
    }
    Some(&s[start..=end])
}

/// 转义字符串值内部裸露的控制字符（LLM 常见毛病，导致 JSON 解析失败）
///
/// 已含反斜杠的字符串保守跳过，避免二次转义。
fn escape_control_chars(text: &str) -> String {
    json_string_re()
        .replace_all(text, |caps: &regex::Captures<'_>| {
            let inner = &caps[0];
            if inner.contains('\\') {
                return inner.to_string();
            }
            inner
                .replace('\n', "\\n")
                .replace('\r', "\\r")
                .replace('\t', "\\t")
                .replace('\u{8}', "\\b")
                .replace('\u{c}', "\\f")
        })
        .into_owned()
}

/// 对象键名统一转小写（容忍 "Name"/"TIME_SLOT" 之类的大小写偏差）
fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (k, v) in map {
                out.insert(k.to_lowercase(), lowercase_keys(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.into_iter().map(lowercase_keys).collect()),
        other => other,
    }
}

/// 一站式解析：原始响应 -> Vec<GoalDraft>
pub fn parse_schedule_response(
    response: &str,
    cfg: &ScheduleSection,
) -> Result<Vec<GoalDraft>, PlanningError> {
    let cleaned = strip_markdown_fences(response);
    let json_text = extract_json_object(cleaned).ok_or_else(|| {
        PlanningError::MalformedResponse("response contains no JSON object".to_string())
    })?;

    let value: Value = match serde_json::from_str(json_text) {
        Ok(v) => v,
        // 先修复控制字符再试一次
        Err(_) => serde_json::from_str(&escape_control_chars(json_text)).map_err(|e| {
            let head: String = json_text.chars().take(200).collect();
            tracing::debug!("JSON parse failed, head: {}", head);
            PlanningError::MalformedResponse(format!("invalid JSON: {}", e))
        })?,
    };
    let value = lowercase_keys(value);

    let items = value
        .get("schedule_items")
        .ok_or_else(|| {
            PlanningError::MalformedResponse("missing 'schedule_items' field".to_string())
        })?
        .as_array()
        .ok_or_else(|| {
            PlanningError::MalformedResponse("'schedule_items' is not an array".to_string())
        })?;

    if items.is_empty() {
        return Err(PlanningError::MalformedResponse(
            "'schedule_items' is empty".to_string(),
        ));
    }
    // 硬上限：条目数离谱直接判废，避免把跑偏的输出喂进校验
    let ceiling = cfg.max_activities * 2;
    if items.len() > ceiling {
        return Err(PlanningError::MalformedResponse(format!(
            "{} items far exceeds max {} (ceiling {})",
            items.len(),
            cfg.max_activities,
            ceiling
        )));
    }

    let mut drafts = Vec::with_capacity(items.len());
    for (idx, item) in items.iter().enumerate() {
        drafts.push(parse_item(idx, item)?);
    }
    tracing::debug!("Parsed {} schedule drafts", drafts.len());
    Ok(drafts)
}

fn parse_item(idx: usize, item: &Value) -> Result<GoalDraft, PlanningError> {
    let obj = item.as_object().ok_or_else(|| {
        PlanningError::MalformedResponse(format!("item {} is not an object", idx + 1))
    })?;

    let str_field = |key: &str| -> Option<&str> { obj.get(key).and_then(|v| v.as_str()) };

    let name = str_field("name")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| {
            PlanningError::MalformedResponse(format!("item {} missing 'name'", idx + 1))
        })?;

    let goal_type = str_field("goal_type")
        .or_else(|| str_field("activity_type"))
        .ok_or_else(|| {
            PlanningError::MalformedResponse(format!("item {} missing 'goal_type'", idx + 1))
        })?;
    // 非标准类型归为 custom（宽松），而不是废掉整轮
    let activity_type = ActivityType::from_wire(goal_type).unwrap_or_else(|| {
        tracing::debug!("item {}: unknown goal_type '{}', using custom", idx + 1, goal_type);
        ActivityType::Custom
    });

    let time_slot = str_field("time_slot").ok_or_else(|| {
        PlanningError::MalformedResponse(format!("item {} missing 'time_slot'", idx + 1))
    })?;
    let start_min = parse_hhmm(time_slot).ok_or_else(|| {
        PlanningError::MalformedResponse(format!(
            "item {} has unparseable time_slot '{}'",
            idx + 1,
            time_slot
        ))
    })?;

    let duration_hours = match obj.get("duration_hours") {
        Some(v) => {
            let d = v.as_f64().ok_or_else(|| {
                PlanningError::MalformedResponse(format!(
                    "item {} has non-numeric duration_hours",
                    idx + 1
                ))
            })?;
            if (MIN_DURATION_HOURS..=MAX_DURATION_HOURS).contains(&d) {
                d
            } else {
                DEFAULT_DURATION_HOURS
            }
        }
        None => DEFAULT_DURATION_HOURS,
    };
    let end_min = start_min.saturating_add((duration_hours * 60.0).round() as u16);

    // description 缺失时以 name 兜底；priority 非法时回落 medium
    let description = str_field("description")
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(name)
        .to_string();
    let priority = str_field("priority")
        .and_then(Priority::from_wire)
        .unwrap_or(Priority::Medium);

    Ok(GoalDraft {
        name: name.to_string(),
        description,
        activity_type,
        priority,
        start_min,
        end_min,
    })
}

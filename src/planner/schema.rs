//! 结构化输出 Schema 构建
//!
//! 由配置动态生成 JSON Schema（数量/长度窗口来自配置），拼入提示词约束 LLM 输出。

use serde_json::{json, Value};

use crate::config::ScheduleSection;
use crate::core::models::ActivityType;

/// 构建日程项的 JSON Schema
pub fn build_schema(cfg: &ScheduleSection) -> Value {
    let goal_types: Vec<&str> = ActivityType::ALL.iter().map(|t| t.as_wire()).collect();
    json!({
        "type": "object",
        "required": ["schedule_items"],
        "properties": {
            "schedule_items": {
                "type": "array",
                "minItems": cfg.min_activities,
                "maxItems": cfg.max_activities,
                "items": {
                    "type": "object",
                    "required": ["name", "description", "time_slot", "goal_type", "priority"],
                    "properties": {
                        "name": {
                            "type": "string",
                            "minLength": 2,
                            "maxLength": 20,
                            "description": "活动名称"
                        },
                        "description": {
                            "type": "string",
                            "minLength": cfg.min_description_length,
                            "maxLength": cfg.max_description_length,
                            "description": format!(
                                "活动描述（叙述风格，{}-{}字）",
                                cfg.min_description_length, cfg.max_description_length
                            )
                        },
                        "time_slot": {
                            "type": "string",
                            "pattern": "^([01]?[0-9]|2[0-3]):[0-5][0-9]$",
                            "description": "开始时间点，HH:MM格式（如09:30）"
                        },
                        "goal_type": {
                            "type": "string",
                            "enum": goal_types,
                            "description": "活动类型"
                        },
                        "priority": {
                            "type": "string",
                            "enum": ["high", "medium", "low"],
                            "description": "优先级"
                        },
                        "duration_hours": {
                            "type": "number",
                            "minimum": 0.25,
                            "maximum": 12,
                            "description": "活动持续时长（小时）"
                        }
                    }
                }
            }
        }
    })
}

//! 参数校验与输入清洗
//!
//! 自定义风格指令会被拼入提示词，必须先剔除控制序列与注入痕迹；
//! 不符合要求时拒绝并报告（不做静默截断）。

use crate::core::error::PlanningError;
use crate::core::time::MINUTES_PER_DAY;

/// 自定义提示词最大长度（字符）
pub const MAX_CUSTOM_PROMPT_CHARS: usize = 500;

/// 校验分钟制时间窗口的取值范围与先后关系
pub fn validate_time_window(start_min: u16, end_min: u16) -> Result<(), PlanningError> {
    if end_min > MINUTES_PER_DAY {
        return Err(PlanningError::InvalidParameters(format!(
            "time window end {} exceeds {} minutes",
            end_min, MINUTES_PER_DAY
        )));
    }
    if start_min >= end_min {
        return Err(PlanningError::InvalidParameters(format!(
            "time window start {} must be before end {}",
            start_min, end_min
        )));
    }
    Ok(())
}

/// 清洗自定义风格指令
///
/// 拒绝条件：含控制字符（换行除外）、含 Markdown 代码围栏、超长。
/// 通过时返回 trim 后的文本；空串视为「未配置」。
pub fn sanitize_custom_prompt(raw: &str) -> Result<String, PlanningError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(String::new());
    }
    if trimmed.chars().count() > MAX_CUSTOM_PROMPT_CHARS {
        return Err(PlanningError::InvalidParameters(format!(
            "custom_prompt too long ({} chars, max {})",
            trimmed.chars().count(),
            MAX_CUSTOM_PROMPT_CHARS
        )));
    }
    if trimmed.chars().any(|c| c.is_control() && c != '\n') {
        return Err(PlanningError::InvalidParameters(
            "custom_prompt contains control characters".to_string(),
        ));
    }
    if trimmed.contains("```") {
        return Err(PlanningError::InvalidParameters(
            "custom_prompt contains markdown fence".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

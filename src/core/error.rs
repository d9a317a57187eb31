//! 规划引擎错误类型
//!
//! 按可恢复性分类：Timeout 轮内有限重试；Quota/RateLimited 不重试、立即失败；
//! MalformedResponse / ValidationFailed 触发下一轮生成（轮次预算内）；其余为调用级致命错误。

use thiserror::Error;

/// LLM 调用错误（外部协作方，视为不可信）
#[derive(Error, Debug, Clone)]
pub enum LlmError {
    #[error("LLM request timed out after {0}s")]
    Timeout(u64),

    /// 配额超限：重试没有成功的可能，立即放弃
    #[error("LLM quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("LLM rate limited: {0}")]
    RateLimited(String),

    #[error("LLM API error: {0}")]
    Api(String),
}

impl LlmError {
    /// 是否属于不应重试的致命类别（配额/限流）
    pub fn is_fatal(&self) -> bool {
        matches!(self, LlmError::QuotaExceeded(_) | LlmError::RateLimited(_))
    }
}

/// 日程生成与持久化过程中可能出现的错误
#[derive(Error, Debug)]
pub enum PlanningError {
    /// 人设数据缺失，本次生成直接失败（不重试）
    #[error("Persona context unavailable: {0}")]
    ContextUnavailable(String),

    #[error(transparent)]
    Llm(#[from] LlmError),

    /// LLM 响应结构不合格（缺字段、时间不可解析、数量远超上限等）
    #[error("Malformed LLM response: {0}")]
    MalformedResponse(String),

    /// 语义校验未通过，violations 作为反馈数据带入下一轮提示词
    #[error("Schedule validation failed: {}", .0.join("; "))]
    ValidationFailed(Vec<String>),

    #[error("Store operation failed: {0}")]
    Store(String),

    /// 输入清洗/参数校验拒绝（报告而非静默截断）
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// 同一天已有生成任务在途（按天互斥）
    #[error("Generation already in progress for {0}")]
    GenerationInProgress(chrono::NaiveDate),

    /// 所有轮次均未解析出有效日程
    #[error("Schedule generation failed after {rounds} round(s): {reason}")]
    GenerationFailed { rounds: u32, reason: String },

    #[error("Config error: {0}")]
    Config(String),

    #[error("Cancelled")]
    Cancelled,
}

impl From<rusqlite::Error> for PlanningError {
    fn from(e: rusqlite::Error) -> Self {
        PlanningError::Store(e.to_string())
    }
}

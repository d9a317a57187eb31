//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock）实现 LlmClient。结构化输出的 Schema 约束
//! 由提示词构建层拼入 prompt；客户端只负责一问一答。

use async_trait::async_trait;

use crate::core::error::LlmError;

/// LLM 客户端 trait：单次完成
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// 非流式完成，返回原始文本（可能带 Markdown 围栏等噪声）
    async fn complete(&self, prompt: &str) -> Result<String, LlmError>;
}

//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Mock）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::{MockLlmClient, ScriptedLlmClient, SAMPLE_SCHEDULE_JSON};
pub use openai::OpenAiClient;
pub use traits::LlmClient;

//! LLM 层：远程生成能力抽象、失败分类、重试编排、输出 Schema 与实现（Gemini / Mock）

pub mod classifier;
pub mod gemini;
pub mod mock;
pub mod retry;
pub mod schema;
pub mod traits;

pub use classifier::{classify, FailureClass};
pub use gemini::{GeminiClient, ModelTable, DEFAULT_VOICE, GEMINI_BASE_URL};
pub use mock::MockGenerativeClient;
pub use retry::{with_retry, with_retry_notify, RetryConfig, RetryNotice};
pub use traits::{
    GenerateRequest, GenerateResponse, GenerativeClient, InlineData, LlmError, ModelTier,
    Operation, OutputFormat, Turn, UsageMetadata,
};

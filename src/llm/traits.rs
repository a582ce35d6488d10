//! 远程生成能力抽象
//!
//! 所有后端（Gemini / Mock）实现 GenerativeClient：一次请求对应一次响应（文本、结构化 JSON 或音频）。
//! 请求只描述「要什么」（操作类型、模型档位、上下文、输出格式），具体模型名由后端决定。

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::progress::Role;

/// 请求来源的调用点
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Theory,
    PracticeTask,
    BatchedEvaluation,
    RoleplayTurn,
    Speech,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Theory => "theory",
            Operation::PracticeTask => "practice_task",
            Operation::BatchedEvaluation => "batched_evaluation",
            Operation::RoleplayTurn => "roleplay_turn",
            Operation::Speech => "speech",
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 模型档位：后端按档位映射到具体模型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ModelTier {
    /// 内容生成（理论、练习题）
    Creation,
    /// 轻量评估
    Evaluation,
    /// 高能力模型（Beta 任务、角色扮演）
    Complex,
    /// 语音合成
    Speech,
}

/// 单轮上下文
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Turn {
    pub role: Role,
    pub text: String,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

/// 期望的输出形态
#[derive(Clone, Debug, PartialEq)]
pub enum OutputFormat {
    /// 自由文本（Markdown）
    Text,
    /// 严格 JSON，附带 JSON Schema 描述
    Json { schema: serde_json::Value },
    /// 单声道 PCM 音频，使用预置音色
    Audio { voice: String },
}

/// 发往远程能力的请求
#[derive(Clone, Debug)]
pub struct GenerateRequest {
    pub operation: Operation,
    pub tier: ModelTier,
    pub system_instruction: Option<String>,
    pub contents: Vec<Turn>,
    pub output: OutputFormat,
}

/// Token 使用统计（单次请求）
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageMetadata {
    #[serde(default)]
    pub prompt_token_count: u64,
    #[serde(default)]
    pub candidates_token_count: u64,
    #[serde(default)]
    pub total_token_count: u64,
}

/// 内联二进制数据（音频）
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InlineData {
    pub mime_type: String,
    /// base64 编码
    pub data: String,
}

/// 远程能力的响应：主载荷 + 可选用量
#[derive(Clone, Debug, Default)]
pub struct GenerateResponse {
    pub text: Option<String>,
    pub inline_data: Option<InlineData>,
    pub usage: Option<UsageMetadata>,
}

impl GenerateResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_usage(mut self, total_tokens: u64) -> Self {
        self.usage = Some(UsageMetadata {
            prompt_token_count: 0,
            candidates_token_count: total_tokens,
            total_token_count: total_tokens,
        });
        self
    }
}

/// 远程调用失败（保留状态码与原始消息，供 classifier 判定）
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LlmError {
    #[error("API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Response decode error: {0}")]
    Decode(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

impl LlmError {
    pub fn status(&self) -> Option<u16> {
        match self {
            LlmError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// 远程生成能力：非流式，一次请求一次响应
#[async_trait]
pub trait GenerativeClient: Send + Sync {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError>;
}

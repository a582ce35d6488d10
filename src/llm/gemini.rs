//! Gemini REST 客户端
//!
//! 通过 reqwest 调用 `models/{model}:generateContent`：
//! - 文本：contents + 可选 systemInstruction
//! - 结构化：responseMimeType = application/json + responseJsonSchema
//! - 语音：responseModalities = [AUDIO] + 预置音色

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::llm::{
    GenerateRequest, GenerateResponse, GenerativeClient, InlineData, LlmError, ModelTier,
    OutputFormat, UsageMetadata,
};
use crate::progress::Role;

/// Gemini API 常量
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const CREATION_MODEL: &str = "gemini-3-flash-preview";
pub const EVALUATION_MODEL: &str = "gemini-flash-lite-latest";
pub const COMPLEX_MODEL: &str = "gemini-3-pro-preview";
pub const SPEECH_MODEL: &str = "gemini-2.5-flash-preview-tts";
pub const DEFAULT_VOICE: &str = "Kore";

/// 档位到模型名的映射
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelTable {
    pub creation: String,
    pub evaluation: String,
    pub complex: String,
    pub speech: String,
}

impl Default for ModelTable {
    fn default() -> Self {
        Self {
            creation: CREATION_MODEL.to_string(),
            evaluation: EVALUATION_MODEL.to_string(),
            complex: COMPLEX_MODEL.to_string(),
            speech: SPEECH_MODEL.to_string(),
        }
    }
}

impl ModelTable {
    pub fn model_for(&self, tier: ModelTier) -> &str {
        match tier {
            ModelTier::Creation => &self.creation,
            ModelTier::Evaluation => &self.evaluation,
            ModelTier::Complex => &self.complex,
            ModelTier::Speech => &self.speech,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<GeminiInlineData>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    #[serde(default)]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PrebuiltVoiceConfig {
    voice_name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VoiceConfig {
    prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SpeechConfig {
    voice_config: VoiceConfig,
}

#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_json_schema: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_modalities: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequestBody {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiResponseBody {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
    usage_metadata: Option<UsageMetadata>,
}

fn text_part(text: &str) -> GeminiPart {
    GeminiPart {
        text: Some(text.to_string()),
        inline_data: None,
    }
}

/// 将 GenerateRequest 转为 Gemini 请求体
fn to_request_body(request: &GenerateRequest) -> GeminiRequestBody {
    let contents = request
        .contents
        .iter()
        .map(|turn| GeminiContent {
            role: Some(
                match turn.role {
                    Role::User => "user",
                    Role::Model => "model",
                }
                .to_string(),
            ),
            parts: vec![text_part(&turn.text)],
        })
        .collect();

    let system_instruction = request.system_instruction.as_deref().map(|s| GeminiContent {
        role: None,
        parts: vec![text_part(s)],
    });

    let generation_config = match &request.output {
        OutputFormat::Text => None,
        OutputFormat::Json { schema } => Some(GenerationConfig {
            response_mime_type: Some("application/json".to_string()),
            response_json_schema: Some(schema.clone()),
            ..GenerationConfig::default()
        }),
        OutputFormat::Audio { voice } => Some(GenerationConfig {
            response_modalities: Some(vec!["AUDIO".to_string()]),
            speech_config: Some(SpeechConfig {
                voice_config: VoiceConfig {
                    prebuilt_voice_config: PrebuiltVoiceConfig {
                        voice_name: voice.clone(),
                    },
                },
            }),
            ..GenerationConfig::default()
        }),
    };

    GeminiRequestBody {
        contents,
        system_instruction,
        generation_config,
    }
}

/// 取首个候选的文本（多段拼接）与首个内联数据
fn from_response_body(body: GeminiResponseBody) -> GenerateResponse {
    let parts = body
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content)
        .map(|c| c.parts)
        .unwrap_or_default();

    let mut text: Option<String> = None;
    let mut inline_data = None;
    for part in parts {
        if let Some(t) = part.text {
            text.get_or_insert_with(String::new).push_str(&t);
        }
        if inline_data.is_none() {
            inline_data = part.inline_data.map(|d| InlineData {
                mime_type: d.mime_type,
                data: d.data,
            });
        }
    }

    GenerateResponse {
        text,
        inline_data,
        usage: body.usage_metadata,
    }
}

/// Gemini 客户端：持有 HTTP client、API Key 与档位映射
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    models: ModelTable,
}

impl GeminiClient {
    pub fn new(
        base_url: Option<&str>,
        api_key: &str,
        models: ModelTable,
        request_timeout: Option<Duration>,
    ) -> Result<Self, LlmError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder
            .build()
            .map_err(|e| LlmError::InvalidRequest(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url
                .unwrap_or(GEMINI_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            api_key: api_key.to_string(),
            models,
        })
    }

    fn endpoint(&self, tier: ModelTier) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url,
            self.models.model_for(tier)
        )
    }
}

#[async_trait]
impl GenerativeClient for GeminiClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let body = to_request_body(request);
        tracing::debug!(
            operation = %request.operation,
            model = self.models.model_for(request.tier),
            "Dispatching generateContent"
        );

        let resp = self
            .http
            .post(self.endpoint(request.tier))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body: GeminiResponseBody = resp
            .json()
            .await
            .map_err(|e| LlmError::Decode(e.to_string()))?;

        Ok(from_response_body(body))
    }
}

//! Mock 生成客户端（用于测试与离线演示，无需 API）
//!
//! 先按顺序消费预置脚本（成功响应或失败）；脚本耗尽后按操作类型返回固定样例。
//! 所有请求都会被记录，便于断言「是否发生了网络调用」。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::llm::{GenerateRequest, GenerateResponse, GenerativeClient, LlmError, Operation};

/// Mock 客户端：脚本化响应 + 请求记录
#[derive(Debug, Default)]
pub struct MockGenerativeClient {
    script: Mutex<VecDeque<Result<GenerateResponse, LlmError>>>,
    requests: Mutex<Vec<GenerateRequest>>,
    calls: AtomicUsize,
}

impl MockGenerativeClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以给定脚本创建
    pub fn scripted(
        script: impl IntoIterator<Item = Result<GenerateResponse, LlmError>>,
    ) -> Self {
        Self {
            script: Mutex::new(script.into_iter().collect()),
            ..Self::default()
        }
    }

    /// 累计 generate 调用次数
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// 已收到的请求（按顺序）
    pub fn requests(&self) -> Vec<GenerateRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    fn lock_script(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<GenerateResponse, LlmError>>> {
        self.script.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn canned(request: &GenerateRequest, call: usize) -> Result<GenerateResponse, LlmError> {
        let response = match request.operation {
            Operation::Theory => GenerateResponse::text(
                "## Lección\n\nEl español es una lengua de ritmo silábico.",
            ),
            Operation::PracticeTask => GenerateResponse::text(
                serde_json::json!({
                    "id": format!("mock_{call}"),
                    "type": "SENTENCE_CONSTRUCTION",
                    "instruction": "Usa \"mercado\" y \"comprar\" en una frase.",
                    "context": "De compras el sábado.",
                    "targetGrammar": "Presente de indicativo",
                    "targetVocabulary": ["mercado", "comprar"]
                })
                .to_string(),
            ),
            Operation::RoleplayTurn => GenerateResponse::text(
                serde_json::json!({
                    "reply": "¡Claro! ¿Qué le gustaría probar hoy?",
                    "keywords": [{"word": "probar", "explanation": "to try / to taste"}]
                })
                .to_string(),
            ),
            Operation::Speech => GenerateResponse::default(),
            Operation::BatchedEvaluation => {
                return Err(LlmError::InvalidRequest(
                    "mock client has no scripted evaluation".to_string(),
                ))
            }
        };
        Ok(response)
    }
}

#[async_trait]
impl GenerativeClient for MockGenerativeClient {
    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse, LlmError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let scripted = self.lock_script().pop_front();
        match scripted {
            Some(result) => result,
            None => Self::canned(request, call),
        }
    }
}

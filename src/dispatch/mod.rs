//! 请求调度：把调用方意图变成远程请求，并把结果与账本、缓存、进度对账
//!
//! 每次调用走同一个状态机：入口检查账本锁 → 构造请求 → 经重试编排调用远程能力 →
//! 成功则以单个事件（含扣费）更新根记录；配额失败标记账本耗尽；其它失败只返回连接错误。
//! 理论内容命中缓存时完全绕过账本与网络。

pub mod annotations;
pub mod request;

use std::sync::Arc;

use chrono::Utc;
use rand::seq::SliceRandom;

use crate::config::AppConfig;
use crate::core::{DispatchError, DispatchPhase, PhaseTracker, SessionError};
use crate::curriculum::{find_scenario, find_unit, seed_tasks};
use crate::llm::{
    classify, with_retry_notify, FailureClass, GenerativeClient, LlmError, Operation,
    RetryConfig, UsageMetadata, DEFAULT_VOICE,
};
use crate::progress::{
    BatchedEvaluation, ConversationThread, Difficulty, EvaluationItem, PracticeSession,
    PracticeTask, ProgressEvent, ProgressStore, RoleplayReply,
};

pub use request::{EvaluationContext, PcmAudio, RequestKind, ResponsePayload};

/// 远程端未返回用量时按操作扣减的估算值
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CostTable {
    pub theory: u64,
    pub practice_task: u64,
    pub evaluation: u64,
    pub roleplay: u64,
    pub speech: u64,
}

impl Default for CostTable {
    fn default() -> Self {
        Self {
            theory: 500,
            practice_task: 400,
            evaluation: 3000,
            roleplay: 1000,
            speech: 0,
        }
    }
}

impl CostTable {
    pub fn fallback_for(&self, operation: Operation) -> u64 {
        match operation {
            Operation::Theory => self.theory,
            Operation::PracticeTask => self.practice_task,
            Operation::BatchedEvaluation => self.evaluation,
            Operation::RoleplayTurn => self.roleplay,
            Operation::Speech => self.speech,
        }
    }

    /// 以远程端报告的总量为准；缺失或为 0 时使用估算值
    pub fn charge(&self, operation: Operation, usage: Option<&UsageMetadata>) -> u64 {
        usage
            .map(|u| u.total_token_count)
            .filter(|total| *total > 0)
            .unwrap_or_else(|| self.fallback_for(operation))
    }
}

/// 一次成功调度的结果
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched<T> {
    pub data: T,
    pub usage: Option<UsageMetadata>,
    /// 实际从账本扣减的 Token 数
    pub tokens_charged: u64,
    /// 理论内容命中缓存（未发起请求、未扣费）
    pub cache_hit: bool,
}

impl<T> Dispatched<T> {
    fn cached(data: T) -> Self {
        Self {
            data,
            usage: None,
            tokens_charged: 0,
            cache_hit: true,
        }
    }
}

/// 远程调用成功后的原始结果
struct Completed {
    payload: ResponsePayload,
    usage: Option<UsageMetadata>,
    tokens: u64,
}

/// 调度器：共享远程客户端与进度存储
pub struct Dispatcher {
    client: Arc<dyn GenerativeClient>,
    store: Arc<ProgressStore>,
    retry: RetryConfig,
    costs: CostTable,
    session_size: usize,
    voice: String,
}

impl Dispatcher {
    pub fn new(client: Arc<dyn GenerativeClient>, store: Arc<ProgressStore>) -> Self {
        Self {
            client,
            store,
            retry: RetryConfig::default(),
            costs: CostTable::default(),
            session_size: 5,
            voice: DEFAULT_VOICE.to_string(),
        }
    }

    pub fn from_config(
        config: &AppConfig,
        client: Arc<dyn GenerativeClient>,
        store: Arc<ProgressStore>,
    ) -> Self {
        Self::new(client, store)
            .with_retry(config.retry.retry_config())
            .with_costs(config.costs.cost_table())
            .with_session_size(config.practice.session_size)
            .with_voice(config.llm.voice.clone())
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_costs(mut self, costs: CostTable) -> Self {
        self.costs = costs;
        self
    }

    pub fn with_session_size(mut self, session_size: usize) -> Self {
        self.session_size = session_size;
        self
    }

    pub fn with_voice(mut self, voice: impl Into<String>) -> Self {
        self.voice = voice.into();
        self
    }

    pub fn store(&self) -> &Arc<ProgressStore> {
        &self.store
    }

    /// 理论内容：缓存命中直接返回（即使账本已锁定）；否则调度并写入缓存
    pub async fn get_theory(
        &self,
        level: Difficulty,
        unit_id: &str,
    ) -> Result<Dispatched<String>, DispatchError> {
        if let Some(content) = self.store.snapshot().cache.get(unit_id) {
            tracing::debug!(unit = unit_id, "Theory cache hit");
            return Ok(Dispatched::cached(content.to_string()));
        }

        let unit = find_unit(unit_id)
            .ok_or_else(|| DispatchError::InvalidInput(format!("unknown unit: {unit_id}")))?;
        let done = self.dispatch(RequestKind::Theory { level, unit: *unit }).await?;
        let ResponsePayload::Theory(content) = done.payload else {
            return Err(unexpected_payload(Operation::Theory));
        };

        self.store
            .apply(ProgressEvent::TheoryGenerated {
                level,
                unit_id: unit_id.to_string(),
                content: content.clone(),
                tokens: done.tokens,
                at: Utc::now(),
            })
            .await;
        Ok(Dispatched {
            data: content,
            usage: done.usage,
            tokens_charged: done.tokens,
            cache_hit: false,
        })
    }

    /// 生成一道练习题
    pub async fn get_practice_task(
        &self,
        level: Difficulty,
        beta: bool,
    ) -> Result<Dispatched<PracticeTask>, DispatchError> {
        let done = self.dispatch(RequestKind::PracticeTask { level, beta }).await?;
        let ResponsePayload::PracticeTask(task) = done.payload else {
            return Err(unexpected_payload(Operation::PracticeTask));
        };

        self.store
            .apply(ProgressEvent::PracticeTaskGenerated {
                tokens: done.tokens,
            })
            .await;
        Ok(Dispatched {
            data: task,
            usage: done.usage,
            tokens_charged: done.tokens,
            cache_hit: false,
        })
    }

    /// 组建练习会话：先取打乱后的种子题，不足部分远程生成；账本锁定或生成失败时提前结束
    pub async fn start_practice_session(
        &self,
        level: Difficulty,
        beta: bool,
    ) -> Result<PracticeSession, DispatchError> {
        if self.session_size == 0 {
            return Err(DispatchError::InvalidInput(
                "session size must be positive".to_string(),
            ));
        }

        let mut tasks = seed_tasks(level, beta);
        tasks.shuffle(&mut rand::thread_rng());
        tasks.truncate(self.session_size);

        while tasks.len() < self.session_size {
            match self.get_practice_task(level, beta).await {
                Ok(done) => tasks.push(done.data),
                Err(e) if !tasks.is_empty() => {
                    tracing::warn!(error = %e, have = tasks.len(), "Stopping task generation early");
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        Ok(PracticeSession::new(tasks))
    }

    /// 批量评估 N 对（题目，作答），返回 N 条记录与一段总评
    pub async fn evaluate_batch(
        &self,
        items: Vec<EvaluationItem>,
        context: EvaluationContext,
    ) -> Result<Dispatched<BatchedEvaluation>, DispatchError> {
        if items.is_empty() {
            return Err(DispatchError::InvalidInput(
                "nothing to evaluate".to_string(),
            ));
        }
        if let Some(index) = items.iter().position(|i| i.user_input.trim().is_empty()) {
            return Err(SessionError::IncompleteInput { index }.into());
        }
        let tasks: Vec<PracticeTask> = items.iter().map(|i| i.task.clone()).collect();
        let done = self
            .dispatch(RequestKind::BatchedEvaluation { items, context })
            .await?;
        let ResponsePayload::BatchedEvaluation(evaluation) = done.payload else {
            return Err(unexpected_payload(Operation::BatchedEvaluation));
        };

        self.store
            .apply(ProgressEvent::BatchEvaluated {
                level: context.level,
                tasks,
                evaluation: evaluation.clone(),
                tokens: done.tokens,
                at: Utc::now(),
            })
            .await;
        Ok(Dispatched {
            data: evaluation,
            usage: done.usage,
            tokens_charged: done.tokens,
            cache_hit: false,
        })
    }

    /// 评估整个会话并把结果挂到会话上（之后输入不可再改）
    pub async fn evaluate_session(
        &self,
        session: &mut PracticeSession,
    ) -> Result<Dispatched<BatchedEvaluation>, DispatchError> {
        let items = session.items()?;
        let snapshot = self.store.snapshot();
        let context = EvaluationContext {
            level: snapshot.current_level,
            beta: snapshot.active_beta(),
        };
        let done = self.evaluate_batch(items, context).await?;
        session.attach_evaluation(done.data.clone())?;
        Ok(done)
    }

    /// 角色扮演：线程最后一条必须是用户消息，之前的全部消息作为上下文
    pub async fn get_roleplay_reply(
        &self,
        thread: &ConversationThread,
        level: Difficulty,
        scenario_id: &str,
    ) -> Result<Dispatched<RoleplayReply>, DispatchError> {
        let scenario = find_scenario(scenario_id).ok_or_else(|| {
            DispatchError::InvalidInput(format!("unknown scenario: {scenario_id}"))
        })?;
        let (history, latest) = thread.split_latest_user().ok_or_else(|| {
            DispatchError::InvalidInput("thread must end with a user message".to_string())
        })?;

        let done = self
            .dispatch(RequestKind::RoleplayTurn {
                history: history.to_vec(),
                latest: latest.content.clone(),
                level,
                scenario: *scenario,
            })
            .await?;
        let ResponsePayload::RoleplayTurn(reply) = done.payload else {
            return Err(unexpected_payload(Operation::RoleplayTurn));
        };

        self.store
            .apply(ProgressEvent::RoleplayTurnCompleted {
                level,
                tokens: done.tokens,
                at: Utc::now(),
            })
            .await;
        Ok(Dispatched {
            data: reply,
            usage: done.usage,
            tokens_charged: done.tokens,
            cache_hit: false,
        })
    }

    /// 追加用户消息并取回复；成功时回复追加到线程末尾
    pub async fn send_roleplay_message(
        &self,
        thread: &mut ConversationThread,
        level: Difficulty,
        scenario_id: &str,
        text: &str,
    ) -> Result<Dispatched<RoleplayReply>, DispatchError> {
        if text.trim().is_empty() {
            return Err(DispatchError::InvalidInput("empty message".to_string()));
        }
        thread.push_user(text.trim());
        let done = self.get_roleplay_reply(thread, level, scenario_id).await?;
        thread.push_reply(done.data.clone());
        Ok(done)
    }

    /// 语音合成：配额失败降级为无音频（账本仍标记耗尽），不向调用方报错
    pub async fn synthesize_speech(
        &self,
        text: &str,
    ) -> Result<Dispatched<Option<PcmAudio>>, DispatchError> {
        if text.trim().is_empty() {
            return Err(DispatchError::InvalidInput("empty speech text".to_string()));
        }
        let kind = RequestKind::Speech {
            text: text.to_string(),
            voice: self.voice.clone(),
        };
        let done = match self.dispatch(kind).await {
            Ok(done) => done,
            Err(DispatchError::QuotaExceeded(reason)) => {
                tracing::warn!(%reason, "Speech degraded to silence");
                return Ok(Dispatched {
                    data: None,
                    usage: None,
                    tokens_charged: 0,
                    cache_hit: false,
                });
            }
            Err(e) => return Err(e),
        };
        let ResponsePayload::Speech(audio) = done.payload else {
            return Err(unexpected_payload(Operation::Speech));
        };

        self.store
            .apply(ProgressEvent::SpeechSynthesized {
                tokens: done.tokens,
            })
            .await;
        Ok(Dispatched {
            data: audio,
            usage: done.usage,
            tokens_charged: done.tokens,
            cache_hit: false,
        })
    }

    /// 共享状态机：锁检查 → 调度（含重试）→ 分类失败
    async fn dispatch(&self, kind: RequestKind) -> Result<Completed, DispatchError> {
        let operation = kind.operation();
        let mut phases = PhaseTracker::new(operation.as_str());

        if self.store.snapshot().usage.is_locked() {
            phases.advance(DispatchPhase::Locked);
            tracing::info!(operation = %operation, "Ledger locked, request refused locally");
            return Err(DispatchError::Locked);
        }

        let request = kind.build();
        tracing::info!(operation = %operation, tier = ?request.tier, "Dispatching request");
        phases.advance(DispatchPhase::Dispatching);

        let client = &self.client;
        let request = &request;
        let kind = &kind;
        let result = with_retry_notify(
            &self.retry,
            || async move {
                let response = client.generate(request).await?;
                let payload = kind.decode(&response)?;
                Ok::<_, LlmError>((payload, response.usage))
            },
            |_notice| {
                phases.advance(DispatchPhase::RetryWait);
                phases.advance(DispatchPhase::Dispatching);
            },
        )
        .await;

        match result {
            Ok((payload, usage)) => {
                phases.advance(DispatchPhase::Succeeded);
                let tokens = self.costs.charge(operation, usage.as_ref());
                tracing::info!(
                    operation = %operation,
                    tokens,
                    attempts = phases.attempts(),
                    "Request succeeded"
                );
                Ok(Completed {
                    payload,
                    usage,
                    tokens,
                })
            }
            Err(err) => {
                let class = classify(&err);
                if class == FailureClass::QuotaExceeded {
                    phases.advance(DispatchPhase::QuotaFailed);
                    tracing::warn!(operation = %operation, error = %err, "Quota exhausted, locking ledger");
                    self.store.apply(ProgressEvent::QuotaExhausted).await;
                } else {
                    phases.advance(DispatchPhase::Fatal);
                    tracing::warn!(
                        operation = %operation,
                        class = %class,
                        attempts = phases.attempts(),
                        error = %err,
                        "Request failed"
                    );
                }
                Err(DispatchError::from_failure(class, &err))
            }
        }
    }
}

fn unexpected_payload(operation: Operation) -> DispatchError {
    DispatchError::Connectivity(format!("unexpected payload for {operation}"))
}

//! 调度编排集成测试：账本、重试、缓存与批量评估的端到端行为

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use alba::dispatch::EvaluationContext;
    use alba::llm::{GenerateResponse, InlineData, LlmError, MockGenerativeClient, RetryConfig};
    use alba::progress::{
        Difficulty, EvaluationItem, ExerciseType, PracticeTask, ProgressEvent, QuotaPolicy,
        UserProgress,
    };
    use alba::{DispatchError, Dispatcher, ProgressStore};
    use chrono::{Duration, Utc};
    use serde_json::json;

    fn dispatcher(mock: &Arc<MockGenerativeClient>, progress: UserProgress) -> Dispatcher {
        let store = Arc::new(ProgressStore::in_memory(progress));
        Dispatcher::new(mock.clone(), store).with_retry(RetryConfig::immediate(3))
    }

    fn fresh() -> UserProgress {
        UserProgress::new(Utc::now(), &QuotaPolicy::default())
    }

    fn quota_error() -> LlmError {
        LlmError::Api {
            status: 429,
            message: "Resource has been exhausted (e.g. check quota).".to_string(),
        }
    }

    fn items(n: usize) -> Vec<EvaluationItem> {
        (0..n)
            .map(|i| EvaluationItem {
                task: PracticeTask {
                    id: format!("task_{i}"),
                    kind: ExerciseType::GuidedTranslation,
                    instruction: format!("Translate sentence {i}"),
                    context: "Travel".to_string(),
                    target_grammar: Some("Pretérito indefinido".to_string()),
                    target_vocabulary: vec!["viajar".to_string()],
                    sample_response: None,
                    is_beta_only: false,
                },
                user_input: format!("Ayer viajé {i}"),
            })
            .collect()
    }

    fn evaluation_body(n: usize) -> String {
        let evaluations: Vec<_> = (0..n)
            .map(|i| {
                json!({
                    "status": if i % 2 == 0 { "CORRECT" } else { "INCORRECT" },
                    "score": 6,
                    "feedback": format!("Item {i}: revisa el pretérito."),
                    "intentValidation": "Intent clear.",
                    "suggestedCorrection": format!("Ayer viajé a Lima {i}."),
                    "modelComparison": null,
                    "retryHint": null,
                    "pedagogicalReport": {
                        "grammarAccuracy": "good",
                        "vocabularyUsage": "adequate",
                        "coherence": "high"
                    },
                    "keywords": [
                        {"word": "viajé", "explanation": "I travelled"},
                        {"word": "ayer", "explanation": "yesterday"},
                        {"word": "nunca", "explanation": "never"}
                    ]
                })
            })
            .collect();
        json!({"evaluations": evaluations, "overallSummary": "Buen progreso."}).to_string()
    }

    fn context() -> EvaluationContext {
        EvaluationContext {
            level: Difficulty::Intermediate,
            beta: None,
        }
    }

    #[tokio::test]
    async fn test_theory_debit_then_quota_lock_then_local_rejection() {
        let mock = Arc::new(MockGenerativeClient::scripted([
            Ok(GenerateResponse::text("## Pretérito").with_usage(500)),
            Err(quota_error()),
        ]));
        let d = dispatcher(&mock, fresh());

        d.get_theory(Difficulty::Intermediate, "i_past").await.unwrap();
        let usage = d.store().snapshot().usage;
        assert_eq!(usage.tokens_remaining, 14_500);
        assert!(!usage.is_quota_exceeded);

        let err = d
            .get_practice_task(Difficulty::Intermediate, false)
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::QuotaExceeded(_)));
        assert_eq!(mock.call_count(), 2);
        let usage = d.store().snapshot().usage;
        assert_eq!(usage.tokens_remaining, 0);
        assert!(usage.is_quota_exceeded);

        let err = d
            .get_roleplay_reply(
                &{
                    let mut t = alba::progress::ConversationThread::new();
                    t.push_user("Hola");
                    t
                },
                Difficulty::Intermediate,
                "art",
            )
            .await
            .unwrap_err();
        assert_eq!(err, DispatchError::Locked);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_quota_failure_is_never_retried() {
        let mock = Arc::new(MockGenerativeClient::scripted([Err(LlmError::Transport(
            "RESOURCE_EXHAUSTED".to_string(),
        ))]));
        let d = dispatcher(&mock, fresh());
        let err = d.get_practice_task(Difficulty::Easy, false).await.unwrap_err();
        assert!(matches!(err, DispatchError::QuotaExceeded(_)));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_transient_retries_surface_connectivity() {
        let mock = Arc::new(MockGenerativeClient::scripted(
            (0..4).map(|_| Err(LlmError::Api {
                status: 500,
                message: "Rpc failed".to_string(),
            })),
        ));
        let d = dispatcher(&mock, fresh());
        let err = d.get_theory(Difficulty::Easy, "e_alphabet").await.unwrap_err();
        assert!(matches!(err, DispatchError::Connectivity(_)));
        assert_eq!(mock.call_count(), 4);
        let snap = d.store().snapshot();
        assert_eq!(snap.usage.tokens_remaining, 15_000);
        assert!(!snap.usage.is_quota_exceeded);
        assert!(snap.cache.is_empty());
    }

    #[tokio::test]
    async fn test_batched_evaluation_aligns_five_records() {
        let mock = Arc::new(MockGenerativeClient::scripted([Ok(GenerateResponse::text(
            evaluation_body(5),
        ))]));
        let d = dispatcher(&mock, fresh());

        let done = d.evaluate_batch(items(5), context()).await.unwrap();
        assert_eq!(done.data.evaluations.len(), 5);
        assert_eq!(done.tokens_charged, 3000);
        for (i, record) in done.data.evaluations.iter().enumerate() {
            assert!(record.feedback.starts_with(&format!("Item {i}:")));
            let words: Vec<_> = record.keywords.iter().map(|k| k.word.as_str()).collect();
            assert_eq!(words, vec!["viajé", "ayer"]);
        }

        let snap = d.store().snapshot();
        assert_eq!(snap.usage.tokens_remaining, 12_000);
        assert_eq!(snap.level_data.intermediate.score, 30);
        assert_eq!(snap.flagged_topics, vec!["Pretérito indefinido"]);
        assert_eq!(snap.evaluation_history.len(), 5);
    }

    #[tokio::test]
    async fn test_batched_evaluation_count_mismatch_is_fatal() {
        let mock = Arc::new(MockGenerativeClient::scripted([Ok(GenerateResponse::text(
            evaluation_body(4),
        ))]));
        let d = dispatcher(&mock, fresh());

        let err = d.evaluate_batch(items(5), context()).await.unwrap_err();
        assert!(matches!(err, DispatchError::Connectivity(_)));
        assert_eq!(mock.call_count(), 1);
        let snap = d.store().snapshot();
        assert_eq!(snap.usage.tokens_remaining, 15_000);
        assert!(!snap.usage.is_quota_exceeded);
        assert_eq!(snap.level_data.intermediate.score, 0);
    }

    #[tokio::test]
    async fn test_cache_hit_is_served_while_locked() {
        let mock = Arc::new(MockGenerativeClient::new());
        let progress = fresh()
            .apply(ProgressEvent::TheoryGenerated {
                level: Difficulty::Easy,
                unit_id: "u1".to_string(),
                content: "text".to_string(),
                tokens: 0,
                at: Utc::now(),
            })
            .apply(ProgressEvent::QuotaExhausted);
        let d = dispatcher(&mock, progress);

        let done = d.get_theory(Difficulty::Easy, "u1").await.unwrap();
        assert_eq!(done.data, "text");
        assert!(done.cache_hit);
        assert_eq!(done.tokens_charged, 0);
        assert_eq!(mock.call_count(), 0);
        assert!(d.store().snapshot().usage.is_locked());
    }

    #[tokio::test]
    async fn test_speech_quota_failure_degrades_to_silence() {
        let mock = Arc::new(MockGenerativeClient::scripted([Err(quota_error())]));
        let d = dispatcher(&mock, fresh());

        let done = d.synthesize_speech("Hola, ¿qué tal?").await.unwrap();
        assert!(done.data.is_none());
        assert!(d.store().snapshot().usage.is_locked());

        let err = d.synthesize_speech("Otra vez").await.unwrap_err();
        assert_eq!(err, DispatchError::Locked);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_speech_returns_pcm_and_debits_reported_usage() {
        use base64::Engine;
        let pcm: Vec<u8> = [0i16, 1000, -1000, 32767]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let response = GenerateResponse {
            inline_data: Some(InlineData {
                mime_type: "audio/L16;codec=pcm;rate=24000".to_string(),
                data: base64::engine::general_purpose::STANDARD.encode(pcm),
            }),
            ..GenerateResponse::default()
        }
        .with_usage(120);
        let mock = Arc::new(MockGenerativeClient::scripted([Ok(response)]));
        let d = dispatcher(&mock, fresh());

        let done = d.synthesize_speech("Hola").await.unwrap();
        let audio = done.data.unwrap();
        assert_eq!(audio.samples, vec![0, 1000, -1000, 32767]);
        assert_eq!(done.tokens_charged, 120);
        assert_eq!(d.store().snapshot().usage.tokens_remaining, 14_880);
    }

    #[tokio::test]
    async fn test_persisted_state_survives_restart_and_resets_after_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("alba_state.json");
        let policy = QuotaPolicy::default();
        let start = Utc::now();

        {
            let store = Arc::new(ProgressStore::open(&path, policy, start).await);
            let mock = Arc::new(MockGenerativeClient::scripted([Ok(
                GenerateResponse::text("## Fonética").with_usage(700),
            )]));
            let d = Dispatcher::new(mock, store).with_retry(RetryConfig::immediate(0));
            d.get_theory(Difficulty::Easy, "e_alphabet").await.unwrap();
        }

        let reopened = ProgressStore::open(&path, policy, start + Duration::hours(1)).await;
        let snap = reopened.snapshot();
        assert_eq!(snap.usage.tokens_remaining, 14_300);
        assert_eq!(snap.cache.get("e_alphabet"), Some("## Fonética"));
        assert_eq!(snap.level_data.easy.score, 10);
        drop(reopened);

        let next_day = ProgressStore::open(&path, policy, start + Duration::hours(25)).await;
        let snap = next_day.snapshot();
        assert_eq!(snap.usage.tokens_remaining, 15_000);
        assert_eq!(snap.cache.get("e_alphabet"), Some("## Fonética"));
    }
}

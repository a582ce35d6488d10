//! Alba 命令行入口
//!
//! 初始化日志、加载配置与持久化进度（加载时执行 24 小时重置检查），有 API Key 时使用 Gemini，
//! 否则使用离线 Mock；执行一条命令后输出结果与剩余额度。
//!
//! 用法：
//!   alba status
//!   alba theory <unit-id>
//!   alba practice
//!   alba speak <text>
//!   alba roleplay <scenario-id> <message>

use std::sync::Arc;

use anyhow::Context;
use chrono::Utc;

use alba::config::{load_config, AppConfig};
use alba::curriculum::{find_scenario, find_unit, CURRICULUM, SCENARIOS};
use alba::llm::{GeminiClient, GenerativeClient, MockGenerativeClient};
use alba::progress::{ConversationThread, ProgressEvent, ProgressStore, QuotaPolicy};
use alba::{DispatchError, Dispatcher};

const USAGE: &str = "usage: alba <status | theory <unit-id> | practice | speak <text> | roleplay <scenario-id> <message>>";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    alba::observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Invalid configuration, using defaults");
        AppConfig::default()
    });
    let policy = cfg.quota.policy();

    let store = Arc::new(ProgressStore::open(&cfg.app.state_path, policy, Utc::now()).await);
    let client = build_client(&cfg)?;
    let dispatcher = Dispatcher::from_config(&cfg, client, store.clone());

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("status");

    let outcome = match command {
        "status" => {
            print_status(&store, &policy);
            return Ok(());
        }
        "theory" => {
            let unit_id = args.get(1).context(USAGE)?;
            let unit = find_unit(unit_id)
                .with_context(|| format!("unknown unit '{unit_id}'; try one of {}", unit_ids()))?;
            dispatcher.get_theory(unit.level, unit_id).await.map(|done| {
                if done.cache_hit {
                    println!("(cached)");
                }
                println!("{}", done.data);
            })
        }
        "practice" => {
            let snapshot = store.snapshot();
            dispatcher
                .start_practice_session(snapshot.current_level, snapshot.is_beta_enabled)
                .await
                .map(|session| {
                    for (i, task) in session.tasks().iter().enumerate() {
                        println!("{}. [{:?}] {} ({})", i + 1, task.kind, task.instruction, task.context);
                    }
                })
        }
        "speak" => {
            let text = args[1..].join(" ");
            dispatcher.synthesize_speech(&text).await.map(|done| match done.data {
                Some(audio) => println!(
                    "{} samples @ {} Hz ({:.1}s)",
                    audio.samples.len(),
                    audio.sample_rate,
                    audio.duration().as_secs_f64()
                ),
                None => println!("(no audio)"),
            })
        }
        "roleplay" => {
            let scenario_id = args.get(1).context(USAGE)?;
            let scenario = find_scenario(scenario_id).with_context(|| {
                format!("unknown scenario '{scenario_id}'; try one of {}", scenario_ids())
            })?;
            let message = args.get(2..).map(|rest| rest.join(" ")).unwrap_or_default();
            let mut thread = ConversationThread::with_greeting(scenario.title);
            let level = store.snapshot().current_level;
            dispatcher
                .send_roleplay_message(&mut thread, level, scenario_id, &message)
                .await
                .map(|done| {
                    for m in thread.messages() {
                        println!("{:?}: {}", m.role, m.content);
                    }
                    for k in &done.data.keywords {
                        println!("  * {}: {}", k.word, k.explanation);
                    }
                })
        }
        other => anyhow::bail!("unknown command '{other}'\n{USAGE}"),
    };

    if outcome.is_ok() {
        let id = match command {
            "practice" => None,
            _ => args.get(1).cloned(),
        };
        if command != "speak" {
            store
                .apply(ProgressEvent::SessionVisited {
                    view: command.to_string(),
                    id,
                    at: Utc::now(),
                })
                .await;
        }
    }

    match outcome {
        Ok(()) => {}
        Err(DispatchError::Locked) | Err(DispatchError::QuotaExceeded(_)) => {
            eprintln!("IA quota saturated. Wait for replenishment.");
        }
        Err(e) => eprintln!("{e}"),
    }
    print_status(&store, &policy);
    Ok(())
}

fn build_client(cfg: &AppConfig) -> anyhow::Result<Arc<dyn GenerativeClient>> {
    match cfg.llm.resolve_api_key() {
        Some(key) => {
            let client = GeminiClient::new(
                cfg.llm.base_url.as_deref(),
                &key,
                cfg.llm.model_table(),
                cfg.llm.request_timeout(),
            )
            .context("Failed to build Gemini client")?;
            Ok(Arc::new(client))
        }
        None => {
            tracing::warn!("No API key configured, using offline mock client");
            Ok(Arc::new(MockGenerativeClient::new()))
        }
    }
}

fn print_status(store: &ProgressStore, policy: &QuotaPolicy) {
    let p = store.snapshot();
    let until_reset = p.usage.time_until_reset(policy, Utc::now());
    println!(
        "level: {} | tokens: {}/{} ({:.0}%){} | reset in {}h{:02}m",
        p.current_level.label(),
        p.usage.tokens_remaining,
        policy.daily_cap,
        p.usage.remaining_fraction(policy) * 100.0,
        if p.usage.is_locked() { " LOCKED" } else { "" },
        until_reset.num_hours(),
        until_reset.num_minutes() % 60,
    );
    let level = p.level_data.get(p.current_level);
    println!(
        "score: {} | lessons: {} | conversations: {} | cached units: {}",
        level.score,
        level.completed_lessons.len(),
        level.conversations,
        p.cache.len()
    );
    if let Some(last) = &p.last_session {
        println!(
            "last visit: {} {} ({})",
            last.view,
            last.id.as_deref().unwrap_or(""),
            last.timestamp.format("%Y-%m-%d %H:%M")
        );
    }
    if let Some(topic) = p.flagged_topics.last() {
        println!("focus on: {topic}");
    }
}

fn unit_ids() -> String {
    CURRICULUM.iter().map(|u| u.id).collect::<Vec<_>>().join(", ")
}

fn scenario_ids() -> String {
    SCENARIOS.iter().map(|s| s.id).collect::<Vec<_>>().join(", ")
}

//! 重试编排：有界指数退避
//!
//! 仅瞬时故障会被重试；配额耗尽与致命错误立即返回。所有调用点共用这一套策略。

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use super::classifier::{classify, FailureClass};
use super::LlmError;

/// 重试参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryConfig {
    /// 首次失败之后最多再尝试的次数
    pub max_retries: u32,
    /// 首次退避时长，之后每次翻倍
    pub initial_delay: Duration,
    /// 均匀随机抖动上限
    pub max_jitter: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            max_jitter: Duration::from_millis(200),
        }
    }
}

impl RetryConfig {
    /// 无延迟配置（测试与离线演示用）
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            initial_delay: Duration::ZERO,
            max_jitter: Duration::ZERO,
        }
    }
}

/// 一次计划中的重试
#[derive(Debug, Clone)]
pub struct RetryNotice {
    /// 刚刚失败的是第几次尝试（从 1 开始）
    pub attempt: u32,
    /// 本次等待时长（含抖动）
    pub delay: Duration,
    pub error: LlmError,
}

/// 以默认观察者执行带重试的操作
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, operation: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    with_retry_notify(config, operation, |_| {}).await
}

/// 执行 operation；瞬时失败且仍有重试额度时等待 `delay + jitter` 后重试，delay 每次翻倍。
/// 每次进入等待前调用 `notify`。
pub async fn with_retry_notify<T, F, Fut, N>(
    config: &RetryConfig,
    mut operation: F,
    mut notify: N,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
    N: FnMut(&RetryNotice),
{
    let mut attempt: u32 = 0;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        let class = classify(&err);
        let retries_used = attempt - 1;
        if class != FailureClass::Transient || retries_used >= config.max_retries {
            tracing::debug!(attempt, class = %class, error = %err, "Giving up");
            return Err(err);
        }

        let wait = delay + jitter(config.max_jitter);
        tracing::warn!(
            attempt,
            delay_ms = wait.as_millis() as u64,
            error = %err,
            "Transient failure, backing off"
        );
        notify(&RetryNotice {
            attempt,
            delay: wait,
            error: err,
        });

        tokio::time::sleep(wait).await;
        delay = delay.saturating_mul(2);
    }
}

fn jitter(max: Duration) -> Duration {
    let max_ms = max.as_millis() as u64;
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

//! 用量账本：每日 Token 预算、上次重置时间、配额耗尽标志
//!
//! 所有操作都是纯变换（消费 self 返回新账本），不做 I/O；持久化由调用方负责。

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// 每日 Token 上限
pub const DAILY_TOKEN_CAP: u64 = 15_000;

/// 重置窗口（小时）
pub const RESET_WINDOW_HOURS: i64 = 24;

/// 配额策略：上限与重置窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaPolicy {
    pub daily_cap: u64,
    pub reset_window: Duration,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        Self {
            daily_cap: DAILY_TOKEN_CAP,
            reset_window: Duration::hours(RESET_WINDOW_HOURS),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UsageLedger {
    pub tokens_remaining: u64,
    pub last_reset: DateTime<Utc>,
    pub is_quota_exceeded: bool,
}

impl UsageLedger {
    /// 满额新账本
    pub fn fresh(policy: &QuotaPolicy, now: DateTime<Utc>) -> Self {
        Self {
            tokens_remaining: policy.daily_cap,
            last_reset: now,
            is_quota_exceeded: false,
        }
    }

    /// 距上次重置超过窗口时返回满额新账本，否则原样返回。只在加载时调用一次。
    pub fn check_and_reset(self, policy: &QuotaPolicy, now: DateTime<Utc>) -> Self {
        if now - self.last_reset > policy.reset_window {
            tracing::info!(last_reset = %self.last_reset, "Daily quota window elapsed, resetting ledger");
            Self::fresh(policy, now)
        } else {
            self
        }
    }

    /// 扣减，下限为 0；不会设置耗尽标志
    pub fn debit(self, amount: u64) -> Self {
        Self {
            tokens_remaining: self.tokens_remaining.saturating_sub(amount),
            ..self
        }
    }

    /// 远程端报告配额耗尽
    pub fn mark_exhausted(self) -> Self {
        Self {
            tokens_remaining: 0,
            is_quota_exceeded: true,
            ..self
        }
    }

    pub fn is_locked(&self) -> bool {
        self.is_quota_exceeded || self.tokens_remaining == 0
    }

    /// 剩余比例（0.0 - 1.0），锁定时为 0
    pub fn remaining_fraction(&self, policy: &QuotaPolicy) -> f64 {
        if self.is_locked() || policy.daily_cap == 0 {
            return 0.0;
        }
        (self.tokens_remaining as f64 / policy.daily_cap as f64).min(1.0)
    }

    /// 距下次重置的时长
    pub fn time_until_reset(&self, policy: &QuotaPolicy, now: DateTime<Utc>) -> Duration {
        let next = self.last_reset + policy.reset_window;
        (next - now).max(Duration::zero())
    }
}

//! 单次调度的阶段状态机
//!
//! `Idle → Locked`（入口处账本已锁定，终态）
//! `Idle → Dispatching → {Succeeded, RetryWait → Dispatching, QuotaFailed, Fatal}`
//!
//! PhaseTracker 只记录合法转移；非法转移被拒绝并记录日志，用于测试与诊断。

use serde::Serialize;

/// 调度阶段
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchPhase {
    Idle,
    Locked,
    Dispatching,
    RetryWait,
    Succeeded,
    QuotaFailed,
    Fatal,
}

impl DispatchPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DispatchPhase::Locked
                | DispatchPhase::Succeeded
                | DispatchPhase::QuotaFailed
                | DispatchPhase::Fatal
        )
    }

    pub fn can_transition_to(&self, next: DispatchPhase) -> bool {
        use DispatchPhase::*;
        matches!(
            (self, next),
            (Idle, Locked)
                | (Idle, Dispatching)
                | (Dispatching, Succeeded)
                | (Dispatching, RetryWait)
                | (Dispatching, QuotaFailed)
                | (Dispatching, Fatal)
                | (RetryWait, Dispatching)
        )
    }
}

/// 单次调用的阶段轨迹
#[derive(Clone, Debug)]
pub struct PhaseTracker {
    operation: &'static str,
    history: Vec<DispatchPhase>,
}

impl PhaseTracker {
    pub fn new(operation: &'static str) -> Self {
        Self {
            operation,
            history: vec![DispatchPhase::Idle],
        }
    }

    pub fn current(&self) -> DispatchPhase {
        self.history
            .last()
            .copied()
            .unwrap_or(DispatchPhase::Idle)
    }

    /// 尝试转移；非法转移返回 false 且状态不变
    pub fn advance(&mut self, next: DispatchPhase) -> bool {
        let current = self.current();
        if !current.can_transition_to(next) {
            tracing::warn!(
                operation = self.operation,
                from = ?current,
                to = ?next,
                "Illegal dispatch phase transition"
            );
            return false;
        }
        tracing::trace!(operation = self.operation, from = ?current, to = ?next, "Dispatch phase");
        self.history.push(next);
        true
    }

    pub fn history(&self) -> &[DispatchPhase] {
        &self.history
    }

    /// 进入 Dispatching 的次数（即远程尝试次数）
    pub fn attempts(&self) -> usize {
        self.history
            .iter()
            .filter(|p| **p == DispatchPhase::Dispatching)
            .count()
    }
}

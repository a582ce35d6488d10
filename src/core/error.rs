//! 调度层错误类型
//!
//! 远程失败经 classifier 分类后在这里收敛为调用方可见的三种结果：
//! 配额饱和（需要改变账本状态）、通用连接失败（不触碰账本）、本地锁定（未发起网络请求）。

use thiserror::Error;

use crate::llm::{FailureClass, LlmError};

/// 调用方可见的调度失败
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// 账本已锁定，请求在本地被拒绝
    #[error("Daily quota locked; no request was sent")]
    Locked,

    /// 远程端报告配额耗尽，账本已标记为耗尽
    #[error("Quota saturated: {0}")]
    QuotaExceeded(String),

    /// 致命错误或瞬时错误重试耗尽
    #[error("Connectivity failure: {0}")]
    Connectivity(String),

    /// 调用方提供的上下文无效（未知单元、空会话等）
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl DispatchError {
    /// 将已分类的远程失败转换为调用方错误
    pub fn from_failure(class: FailureClass, err: &LlmError) -> Self {
        match class {
            FailureClass::QuotaExceeded => DispatchError::QuotaExceeded(err.to_string()),
            FailureClass::Transient | FailureClass::Fatal => {
                DispatchError::Connectivity(err.to_string())
            }
        }
    }

    pub fn is_quota(&self) -> bool {
        matches!(self, DispatchError::Locked | DispatchError::QuotaExceeded(_))
    }
}

/// 练习会话不变量被破坏
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Input index {index} out of range (session has {len} tasks)")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("Session already evaluated; inputs are frozen")]
    AlreadyEvaluated,

    #[error("Input {index} is empty")]
    IncompleteInput { index: usize },

    #[error("Session has no tasks")]
    Empty,

    #[error("Expected {expected} evaluations, got {actual}")]
    CountMismatch { expected: usize, actual: usize },
}

impl From<SessionError> for DispatchError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::CountMismatch { .. } => DispatchError::Connectivity(err.to_string()),
            other => DispatchError::InvalidInput(other.to_string()),
        }
    }
}

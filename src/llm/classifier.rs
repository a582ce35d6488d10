//! 失败分类器
//!
//! 将任意远程失败归为三类：配额耗尽 / 瞬时故障 / 致命错误。纯函数，无副作用。

use super::LlmError;

/// 失败类别
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureClass {
    /// 配额耗尽：直到重置前都不会成功
    QuotaExceeded,
    /// 基础设施瞬时故障：可退避重试
    Transient,
    /// 请求或响应本身有问题：不重试，也不算配额事件
    Fatal,
}

impl std::fmt::Display for FailureClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QuotaExceeded => write!(f, "QuotaExceeded"),
            Self::Transient => write!(f, "Transient"),
            Self::Fatal => write!(f, "Fatal"),
        }
    }
}

const QUOTA_KEYWORDS: [&str; 4] = ["quota", "429", "resource_exhausted", "limit"];

const TRANSIENT_KEYWORDS: [&str; 6] = [
    "500",
    "rpc failed",
    "xhr error",
    "error sending request",
    "connection reset",
    "unavailable",
];

/// 判定失败类别
///
/// 顺序：429 状态码 > 解码/请求错误 > 配额词表 > 5xx 或传输错误 > 其它
pub fn classify(error: &LlmError) -> FailureClass {
    if error.status() == Some(429) {
        return FailureClass::QuotaExceeded;
    }

    if matches!(error, LlmError::Decode(_) | LlmError::InvalidRequest(_)) {
        return FailureClass::Fatal;
    }

    let message = error.to_string().to_lowercase();

    if contains_quota_keywords(&message) {
        return FailureClass::QuotaExceeded;
    }

    if matches!(error.status(), Some(s) if s >= 500) || matches!(error, LlmError::Transport(_)) {
        return FailureClass::Transient;
    }

    if contains_transient_keywords(&message) {
        return FailureClass::Transient;
    }

    FailureClass::Fatal
}

fn contains_quota_keywords(message: &str) -> bool {
    QUOTA_KEYWORDS.iter().any(|k| message.contains(k))
}

fn contains_transient_keywords(message: &str) -> bool {
    TRANSIENT_KEYWORDS.iter().any(|k| message.contains(k))
}

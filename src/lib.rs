//! Alba - 配额感知的 AI 语言辅导编排层
//!
//! 模块划分：
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 调度错误与单次调度状态机
//! - **curriculum**: 静态课程单元、角色扮演场景与练习种子题
//! - **dispatch**: 理论 / 练习题 / 批量评估 / 角色扮演 / 语音五类请求的调度
//! - **llm**: 远程生成能力抽象、失败分类、重试编排与实现（Gemini / Mock）
//! - **observability**: 日志初始化
//! - **progress**: 用量账本、生成缓存、学习进度与持久化根记录

pub mod config;
pub mod core;
pub mod curriculum;
pub mod dispatch;
pub mod llm;
pub mod observability;
pub mod progress;

pub use crate::core::{DispatchError, SessionError};
pub use dispatch::{Dispatched, Dispatcher};
pub use progress::{ProgressStore, UserProgress};

//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `ALBA__*` 覆盖（双下划线表示嵌套，如 `ALBA__QUOTA__DAILY_TOKEN_CAP=20000`）。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::dispatch::CostTable;
use crate::llm::gemini::{COMPLEX_MODEL, CREATION_MODEL, EVALUATION_MODEL, SPEECH_MODEL};
use crate::llm::{ModelTable, RetryConfig, DEFAULT_VOICE};
use crate::progress::{QuotaPolicy, DAILY_TOKEN_CAP, RESET_WINDOW_HOURS};

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub quota: QuotaSection,
    pub retry: RetrySection,
    pub costs: CostsSection,
    pub practice: PracticeSection,
}

/// [app] 段：持久化文件位置
#[derive(Debug, Clone, Deserialize)]
pub struct AppSection {
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
        }
    }
}

fn default_state_path() -> PathBuf {
    PathBuf::from("alba_state.json")
}

/// [llm] 段：端点、密钥、各档位模型与超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    pub base_url: Option<String>,
    /// 未设置时依次读取环境变量 GEMINI_API_KEY、API_KEY
    pub api_key: Option<String>,
    #[serde(default = "default_creation_model")]
    pub creation_model: String,
    #[serde(default = "default_evaluation_model")]
    pub evaluation_model: String,
    #[serde(default = "default_complex_model")]
    pub complex_model: String,
    #[serde(default = "default_speech_model")]
    pub speech_model: String,
    #[serde(default = "default_voice")]
    pub voice: String,
    #[serde(default)]
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key: None,
            creation_model: default_creation_model(),
            evaluation_model: default_evaluation_model(),
            complex_model: default_complex_model(),
            speech_model: default_speech_model(),
            voice: default_voice(),
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

fn default_creation_model() -> String {
    CREATION_MODEL.to_string()
}

fn default_evaluation_model() -> String {
    EVALUATION_MODEL.to_string()
}

fn default_complex_model() -> String {
    COMPLEX_MODEL.to_string()
}

fn default_speech_model() -> String {
    SPEECH_MODEL.to_string()
}

fn default_voice() -> String {
    DEFAULT_VOICE.to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct LlmTimeoutsSection {
    /// 单次请求超时（秒），0 表示不设超时，失败只由远程端报告
    #[serde(default = "default_request_timeout")]
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self {
            request: default_request_timeout(),
        }
    }
}

fn default_request_timeout() -> u64 {
    0
}

impl LlmSection {
    /// 配置中的密钥优先，其次 GEMINI_API_KEY、API_KEY；空字符串视为未设置
    pub fn resolve_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("GEMINI_API_KEY").ok())
            .or_else(|| std::env::var("API_KEY").ok())
            .filter(|k| !k.trim().is_empty())
    }

    pub fn model_table(&self) -> ModelTable {
        ModelTable {
            creation: self.creation_model.clone(),
            evaluation: self.evaluation_model.clone(),
            complex: self.complex_model.clone(),
            speech: self.speech_model.clone(),
        }
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.timeouts.request > 0).then(|| Duration::from_secs(self.timeouts.request))
    }
}

/// [quota] 段：每日上限与重置窗口
#[derive(Debug, Clone, Deserialize)]
pub struct QuotaSection {
    #[serde(default = "default_daily_token_cap")]
    pub daily_token_cap: u64,
    #[serde(default = "default_reset_window_hours")]
    pub reset_window_hours: i64,
}

impl Default for QuotaSection {
    fn default() -> Self {
        Self {
            daily_token_cap: default_daily_token_cap(),
            reset_window_hours: default_reset_window_hours(),
        }
    }
}

fn default_daily_token_cap() -> u64 {
    DAILY_TOKEN_CAP
}

fn default_reset_window_hours() -> i64 {
    RESET_WINDOW_HOURS
}

impl QuotaSection {
    /// 窗口小时数超出范围时退回默认窗口
    pub fn policy(&self) -> QuotaPolicy {
        let hours = self.reset_window_hours.max(1);
        let reset_window = chrono::Duration::try_hours(hours).unwrap_or_else(|| {
            tracing::warn!(hours, "Reset window out of range, using default");
            QuotaPolicy::default().reset_window
        });
        QuotaPolicy {
            daily_cap: self.daily_token_cap,
            reset_window,
        }
    }
}

/// [retry] 段：瞬时失败的重试次数与退避
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySection {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_jitter_ms")]
    pub max_jitter_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_jitter_ms: default_max_jitter_ms(),
        }
    }
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_max_jitter_ms() -> u64 {
    200
}

impl RetrySection {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_jitter: Duration::from_millis(self.max_jitter_ms),
        }
    }
}

/// [costs] 段：远程端未返回用量时按操作扣减的估算值
#[derive(Debug, Clone, Deserialize)]
pub struct CostsSection {
    #[serde(default = "default_theory_cost")]
    pub theory: u64,
    #[serde(default = "default_practice_task_cost")]
    pub practice_task: u64,
    #[serde(default = "default_evaluation_cost")]
    pub evaluation: u64,
    #[serde(default = "default_roleplay_cost")]
    pub roleplay: u64,
    #[serde(default)]
    pub speech: u64,
}

impl Default for CostsSection {
    fn default() -> Self {
        Self {
            theory: default_theory_cost(),
            practice_task: default_practice_task_cost(),
            evaluation: default_evaluation_cost(),
            roleplay: default_roleplay_cost(),
            speech: 0,
        }
    }
}

fn default_theory_cost() -> u64 {
    500
}

fn default_practice_task_cost() -> u64 {
    400
}

fn default_evaluation_cost() -> u64 {
    3000
}

fn default_roleplay_cost() -> u64 {
    1000
}

impl CostsSection {
    pub fn cost_table(&self) -> CostTable {
        CostTable {
            theory: self.theory,
            practice_task: self.practice_task,
            evaluation: self.evaluation,
            roleplay: self.roleplay,
            speech: self.speech,
        }
    }
}

/// [practice] 段
#[derive(Debug, Clone, Deserialize)]
pub struct PracticeSection {
    /// 每次练习会话的题目数
    #[serde(default = "default_session_size")]
    pub session_size: usize,
}

impl Default for PracticeSection {
    fn default() -> Self {
        Self {
            session_size: default_session_size(),
        }
    }
}

fn default_session_size() -> usize {
    5
}

/// 从 config 目录加载配置，环境变量 ALBA__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 ALBA__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("ALBA")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.quota.daily_token_cap, 15_000);
        assert_eq!(cfg.quota.policy(), QuotaPolicy::default());
        assert_eq!(cfg.retry.retry_config(), RetryConfig::default());
        assert_eq!(cfg.costs.cost_table(), CostTable::default());
        assert_eq!(cfg.practice.session_size, 5);
        assert_eq!(cfg.llm.voice, "Kore");
        assert_eq!(cfg.llm.model_table(), ModelTable::default());
    }

    #[test]
    fn test_load_explicit_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(
            &path,
            "[quota]\ndaily_token_cap = 20000\n\n[costs]\nroleplay = 750\n\n[llm]\nvoice = \"Puck\"\n",
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.quota.daily_token_cap, 20_000);
        assert_eq!(cfg.quota.reset_window_hours, 24);
        assert_eq!(cfg.costs.roleplay, 750);
        assert_eq!(cfg.costs.theory, 500);
        assert_eq!(cfg.llm.voice, "Puck");
        assert_eq!(cfg.llm.creation_model, CREATION_MODEL);
    }

    #[test]
    fn test_request_timeout_is_opt_in() {
        let mut section = LlmSection::default();
        assert_eq!(section.request_timeout(), None);
        section.timeouts.request = 30;
        assert_eq!(section.request_timeout(), Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_out_of_range_reset_window_falls_back() {
        let section = QuotaSection {
            daily_token_cap: 15_000,
            reset_window_hours: i64::MAX,
        };
        assert_eq!(section.policy().reset_window, QuotaPolicy::default().reset_window);

        let section = QuotaSection {
            daily_token_cap: 15_000,
            reset_window_hours: -5,
        };
        assert_eq!(section.policy().reset_window, chrono::Duration::hours(1));
    }

    #[test]
    fn test_blank_api_key_is_ignored() {
        let section = LlmSection {
            api_key: Some("  ".to_string()),
            ..LlmSection::default()
        };
        if std::env::var("GEMINI_API_KEY").is_err() && std::env::var("API_KEY").is_err() {
            assert!(section.resolve_api_key().is_none());
        }
    }
}

//! 根记录 UserProgress 与状态转移
//!
//! 所有修改都表达为 `apply(self, event) -> Self` 的纯变换：读取最新记录，返回完整新记录，
//! 不存在对并发读者可见的部分修改。一次成功调度只产生一个事件（内含扣费），保证账本单次变更。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::progress::{
    BatchedEvaluation, Difficulty, EvaluationResult, EvaluationStatus, GenerationCache, LevelData,
    PracticeTask, QuotaPolicy, UsageLedger,
};

/// 评估历史保留条数
pub const EVALUATION_HISTORY_LIMIT: usize = 50;

/// 理论单元首次完成奖励
pub const THEORY_COMPLETION_POINTS: u64 = 10;

/// 每轮角色扮演奖励
pub const ROLEPLAY_TURN_POINTS: u64 = 2;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CorrectionType {
    #[default]
    Semantic,
    Structural,
}

impl std::fmt::Display for CorrectionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CorrectionType::Semantic => f.write_str("semantic"),
            CorrectionType::Structural => f.write_str("structural"),
        }
    }
}

/// Beta 评估参数（各项 0-100）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BetaSettings {
    pub tolerance: u8,
    pub feedback_depth: u8,
    pub rigor: u8,
    pub correction_type: CorrectionType,
}

impl Default for BetaSettings {
    fn default() -> Self {
        Self {
            tolerance: 50,
            feedback_depth: 50,
            rigor: 50,
            correction_type: CorrectionType::Semantic,
        }
    }
}

impl BetaSettings {
    /// 各项截断到 0-100
    pub fn clamped(self) -> Self {
        Self {
            tolerance: self.tolerance.min(100),
            feedback_depth: self.feedback_depth.min(100),
            rigor: self.rigor.min(100),
            ..self
        }
    }
}

/// 上次访问的位置
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastSession {
    pub view: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// 持久化根记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    pub current_level: Difficulty,
    #[serde(default)]
    pub is_beta_enabled: bool,
    #[serde(default)]
    pub beta_settings: BetaSettings,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_session: Option<LastSession>,
    pub level_data: LevelData,
    #[serde(default, rename = "theoryCache")]
    pub cache: GenerationCache,
    #[serde(default)]
    pub flagged_topics: Vec<String>,
    pub usage: UsageLedger,
    #[serde(default, rename = "betaHistory")]
    pub evaluation_history: Vec<EvaluationResult>,
}

/// 根记录上的状态事件
#[derive(Clone, Debug, PartialEq)]
pub enum ProgressEvent {
    /// 加载时的 24 小时窗口检查
    LedgerChecked { now: DateTime<Utc>, policy: QuotaPolicy },
    /// 强制重置为满额
    LedgerReset { now: DateTime<Utc>, policy: QuotaPolicy },
    /// 远程端报告配额耗尽
    QuotaExhausted,
    TheoryGenerated {
        level: Difficulty,
        unit_id: String,
        content: String,
        tokens: u64,
        at: DateTime<Utc>,
    },
    PracticeTaskGenerated { tokens: u64 },
    BatchEvaluated {
        level: Difficulty,
        tasks: Vec<PracticeTask>,
        evaluation: BatchedEvaluation,
        tokens: u64,
        at: DateTime<Utc>,
    },
    RoleplayTurnCompleted {
        level: Difficulty,
        tokens: u64,
        at: DateTime<Utc>,
    },
    SpeechSynthesized { tokens: u64 },
    LevelSelected(Difficulty),
    BetaSettingsChanged {
        enabled: bool,
        settings: BetaSettings,
    },
    SessionVisited {
        view: String,
        id: Option<String>,
        at: DateTime<Utc>,
    },
}

impl UserProgress {
    /// 满额账本、空缓存、零进度
    pub fn new(now: DateTime<Utc>, policy: &QuotaPolicy) -> Self {
        Self {
            current_level: Difficulty::default(),
            is_beta_enabled: false,
            beta_settings: BetaSettings::default(),
            last_session: None,
            level_data: LevelData::new(now),
            cache: GenerationCache::new(),
            flagged_topics: Vec::new(),
            usage: UsageLedger::fresh(policy, now),
            evaluation_history: Vec::new(),
        }
    }

    /// 当前档位的 Beta 设置（未启用时为 None）
    pub fn active_beta(&self) -> Option<BetaSettings> {
        self.is_beta_enabled.then_some(self.beta_settings)
    }

    pub fn apply(self, event: ProgressEvent) -> Self {
        match event {
            ProgressEvent::LedgerChecked { now, policy } => Self {
                usage: self.usage.check_and_reset(&policy, now),
                ..self
            },
            ProgressEvent::LedgerReset { now, policy } => Self {
                usage: UsageLedger::fresh(&policy, now),
                ..self
            },
            ProgressEvent::QuotaExhausted => Self {
                usage: self.usage.mark_exhausted(),
                ..self
            },
            ProgressEvent::TheoryGenerated {
                level,
                unit_id,
                content,
                tokens,
                at,
            } => {
                let first_time = !self.level_data.get(level).has_completed(&unit_id);
                let level_data = self.level_data.update(level, |p| {
                    let p = p.complete_lesson(unit_id.clone()).touch(at);
                    if first_time {
                        p.add_score(THEORY_COMPLETION_POINTS)
                    } else {
                        p
                    }
                });
                Self {
                    cache: self.cache.put(unit_id, content),
                    level_data,
                    usage: self.usage.debit(tokens),
                    ..self
                }
            }
            ProgressEvent::PracticeTaskGenerated { tokens }
            | ProgressEvent::SpeechSynthesized { tokens } => Self {
                usage: self.usage.debit(tokens),
                ..self
            },
            ProgressEvent::BatchEvaluated {
                level,
                tasks,
                evaluation,
                tokens,
                at,
            } => {
                let points = evaluation.total_score();
                let lesson_id = format!("Session_{}", at.timestamp_millis());
                let level_data = self.level_data.update(level, |p| {
                    p.add_score(points).complete_lesson(lesson_id).touch(at)
                });

                let mut flagged_topics = self.flagged_topics;
                let incorrect = tasks
                    .iter()
                    .zip(&evaluation.evaluations)
                    .filter(|(_, record)| record.status == EvaluationStatus::Incorrect)
                    .filter_map(|(task, _)| task.target_grammar.clone());
                for topic in incorrect {
                    if !flagged_topics.contains(&topic) {
                        flagged_topics.push(topic);
                    }
                }

                let mut evaluation_history = self.evaluation_history;
                evaluation_history.extend(
                    evaluation
                        .evaluations
                        .into_iter()
                        .map(|record| EvaluationResult { timestamp: at, record }),
                );
                let overflow = evaluation_history
                    .len()
                    .saturating_sub(EVALUATION_HISTORY_LIMIT);
                evaluation_history.drain(..overflow);

                Self {
                    level_data,
                    flagged_topics,
                    evaluation_history,
                    usage: self.usage.debit(tokens),
                    ..self
                }
            }
            ProgressEvent::RoleplayTurnCompleted { level, tokens, at } => Self {
                level_data: self.level_data.update(level, |p| {
                    p.record_conversation()
                        .add_score(ROLEPLAY_TURN_POINTS)
                        .touch(at)
                }),
                usage: self.usage.debit(tokens),
                ..self
            },
            ProgressEvent::LevelSelected(level) => Self {
                current_level: level,
                ..self
            },
            ProgressEvent::BetaSettingsChanged { enabled, settings } => Self {
                is_beta_enabled: enabled,
                beta_settings: settings.clamped(),
                ..self
            },
            ProgressEvent::SessionVisited { view, id, at } => Self {
                last_session: Some(LastSession {
                    view,
                    id,
                    timestamp: at,
                }),
                ..self
            },
        }
    }
}

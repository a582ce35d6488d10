//! 练习会话：任务、用户输入与批量评估结果
//!
//! 输入按下标与任务对齐；只有全部输入非空时才能请求评估，评估结果存在后输入不可再改。

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::core::SessionError;
use crate::progress::KeywordMetadata;

/// 练习题型
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExerciseType {
    DirectInstruction,
    ContextualCompletion,
    GuidedTranslation,
    SentenceConstruction,
    Reformulation,
    ErrorCorrection,
    Justification,
    FreeProduction,
    AdaptiveDiagnostic,
    ComparativeReformulation,
}

/// 练习题（种子题与生成题共用）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeTask {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ExerciseType,
    pub instruction: String,
    pub context: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_grammar: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub target_vocabulary: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_response: Option<String>,
    #[serde(default)]
    pub is_beta_only: bool,
}

/// 远程生成的练习题（严格 Schema：所有字段必填）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TaskPayload {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ExerciseType,
    pub instruction: String,
    pub context: String,
    pub target_grammar: String,
    pub target_vocabulary: Vec<String>,
}

impl From<TaskPayload> for PracticeTask {
    fn from(p: TaskPayload) -> Self {
        Self {
            id: p.id,
            kind: p.kind,
            instruction: p.instruction,
            context: p.context,
            target_grammar: Some(p.target_grammar),
            target_vocabulary: p.target_vocabulary,
            sample_response: None,
            is_beta_only: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EvaluationStatus {
    Correct,
    Improvable,
    Incorrect,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PedagogicalReport {
    pub grammar_accuracy: String,
    pub vocabulary_usage: String,
    pub coherence: String,
}

/// 单条评估记录（远程端输出）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationRecord {
    pub status: EvaluationStatus,
    pub score: f64,
    pub feedback: String,
    pub intent_validation: String,
    pub suggested_correction: Option<String>,
    pub model_comparison: Option<String>,
    pub retry_hint: Option<String>,
    pub pedagogical_report: PedagogicalReport,
    pub keywords: Vec<KeywordMetadata>,
}

/// 批量评估：N 条记录 + 一段总评
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BatchedEvaluation {
    pub evaluations: Vec<EvaluationRecord>,
    pub overall_summary: String,
}

impl BatchedEvaluation {
    /// 记录分数之和（负分按 0 计，四舍五入）
    pub fn total_score(&self) -> u64 {
        let sum: f64 = self.evaluations.iter().map(|e| e.score.max(0.0)).sum();
        sum.round() as u64
    }
}

/// 持久化的评估历史条目
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub record: EvaluationRecord,
}

/// 待评估的（任务，用户输入）对
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationItem {
    pub task: PracticeTask,
    pub user_input: String,
}

/// 一次练习会话
#[derive(Clone, Debug, PartialEq)]
pub struct PracticeSession {
    tasks: Vec<PracticeTask>,
    inputs: Vec<String>,
    evaluation: Option<BatchedEvaluation>,
}

impl PracticeSession {
    pub fn new(tasks: Vec<PracticeTask>) -> Self {
        let inputs = vec![String::new(); tasks.len()];
        Self {
            tasks,
            inputs,
            evaluation: None,
        }
    }

    pub fn tasks(&self) -> &[PracticeTask] {
        &self.tasks
    }

    pub fn inputs(&self) -> &[String] {
        &self.inputs
    }

    pub fn evaluation(&self) -> Option<&BatchedEvaluation> {
        self.evaluation.as_ref()
    }

    pub fn set_input(&mut self, index: usize, text: impl Into<String>) -> Result<(), SessionError> {
        if self.evaluation.is_some() {
            return Err(SessionError::AlreadyEvaluated);
        }
        let len = self.inputs.len();
        let slot = self
            .inputs
            .get_mut(index)
            .ok_or(SessionError::IndexOutOfRange { index, len })?;
        *slot = text.into();
        Ok(())
    }

    /// 组装评估请求；要求全部输入非空且尚未评估
    pub fn items(&self) -> Result<Vec<EvaluationItem>, SessionError> {
        if self.evaluation.is_some() {
            return Err(SessionError::AlreadyEvaluated);
        }
        if self.tasks.is_empty() {
            return Err(SessionError::Empty);
        }
        if let Some(index) = self.inputs.iter().position(|i| i.trim().is_empty()) {
            return Err(SessionError::IncompleteInput { index });
        }
        Ok(self
            .tasks
            .iter()
            .zip(&self.inputs)
            .map(|(task, input)| EvaluationItem {
                task: task.clone(),
                user_input: input.clone(),
            })
            .collect())
    }

    /// 挂上评估结果；条数必须与任务数一致
    pub fn attach_evaluation(&mut self, evaluation: BatchedEvaluation) -> Result<(), SessionError> {
        if self.evaluation.is_some() {
            return Err(SessionError::AlreadyEvaluated);
        }
        if evaluation.evaluations.len() != self.tasks.len() {
            return Err(SessionError::CountMismatch {
                expected: self.tasks.len(),
                actual: evaluation.evaluations.len(),
            });
        }
        self.evaluation = Some(evaluation);
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;

    #[test]
    fn test_items_require_every_input() {
        let mut session = PracticeSession::new(vec![task("a"), task("b")]);
        session.set_input(0, "Ayer fui a la casa.").unwrap();
        assert_eq!(
            session.items(),
            Err(SessionError::IncompleteInput { index: 1 })
        );
        session.set_input(1, "   ").unwrap();
        assert_eq!(
            session.items(),
            Err(SessionError::IncompleteInput { index: 1 })
        );
        session.set_input(1, "Ayer fui.").unwrap();
        let items = session.items().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].user_input, "Ayer fui.");
    }

    #[test]
    fn test_inputs_frozen_after_evaluation() {
        let mut session = PracticeSession::new(vec![task("a")]);
        session.set_input(0, "hola").unwrap();
        session.attach_evaluation(evaluation(1)).unwrap();
        assert_eq!(
            session.set_input(0, "adiós"),
            Err(SessionError::AlreadyEvaluated)
        );
        assert_eq!(session.items(), Err(SessionError::AlreadyEvaluated));
        assert_eq!(session.inputs()[0], "hola");
    }

    #[test]
    fn test_attach_rejects_count_mismatch() {
        let mut session = PracticeSession::new(vec![task("a"), task("b")]);
        assert_eq!(
            session.attach_evaluation(evaluation(1)),
            Err(SessionError::CountMismatch {
                expected: 2,
                actual: 1
            })
        );
        assert!(session.evaluation().is_none());
    }

    #[test]
    fn test_set_input_out_of_range() {
        let mut session = PracticeSession::new(vec![task("a")]);
        assert_eq!(
            session.set_input(3, "x"),
            Err(SessionError::IndexOutOfRange { index: 3, len: 1 })
        );
    }

    #[test]
    fn test_total_score_ignores_negative_scores() {
        let eval = BatchedEvaluation {
            evaluations: vec![
                record(EvaluationStatus::Correct, 9.6),
                record(EvaluationStatus::Incorrect, -2.0),
                record(EvaluationStatus::Improvable, 5.0),
            ],
            overall_summary: String::new(),
        };
        assert_eq!(eval.total_score(), 15);
    }

    #[test]
    fn test_seed_task_deserializes_without_optional_fields() {
        let json = r#"{"id":"seed_e1","type":"DIRECT_INSTRUCTION","instruction":"Say hi","context":"Neighbor"}"#;
        let task: PracticeTask = serde_json::from_str(json).unwrap();
        assert_eq!(task.kind, ExerciseType::DirectInstruction);
        assert!(task.target_grammar.is_none());
        assert!(!task.is_beta_only);
    }
}

//! 请求种类（标签联合）：每种请求有自己的载荷构造与响应解码
//!
//! 构造是确定性的：相同上下文总是得到相同的 GenerateRequest。解码失败（JSON 不合法、
//! 评估条数不一致、音频损坏）一律返回 `LlmError::Decode`，由 classifier 判定为致命错误。

use base64::Engine;

use crate::curriculum::{CurricularUnit, Scenario};
use crate::dispatch::annotations::retain_anchored;
use crate::llm::schema::{batched_evaluation_schema, roleplay_reply_schema, task_schema};
use crate::llm::{
    GenerateRequest, GenerateResponse, LlmError, ModelTier, Operation, OutputFormat, Turn,
};
use crate::progress::{
    BatchedEvaluation, BetaSettings, Difficulty, EvaluationItem, Message, PracticeTask,
    RoleplayReply, TaskPayload,
};

/// 语音输出采样率
pub const SPEECH_SAMPLE_RATE: u32 = 24_000;

/// 评估上下文：用户档位 + 启用时的 Beta 参数
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EvaluationContext {
    pub level: Difficulty,
    pub beta: Option<BetaSettings>,
}

/// 解码后的单声道 16 位 PCM
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PcmAudio {
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl PcmAudio {
    /// 解码 base64 小端 16 位 PCM
    pub fn from_base64(data: &str) -> Result<Self, LlmError> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(data.trim())
            .map_err(|e| LlmError::Decode(format!("invalid base64 audio: {e}")))?;
        if bytes.len() % 2 != 0 {
            return Err(LlmError::Decode(format!(
                "PCM payload has odd length {}",
                bytes.len()
            )));
        }
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        Ok(Self {
            sample_rate: SPEECH_SAMPLE_RATE,
            channels: 1,
            samples,
        })
    }

    pub fn duration(&self) -> std::time::Duration {
        if self.sample_rate == 0 || self.channels == 0 {
            return std::time::Duration::ZERO;
        }
        let frames = self.samples.len() as f64 / self.channels as f64;
        std::time::Duration::from_secs_f64(frames / self.sample_rate as f64)
    }
}

/// 一次调度请求
#[derive(Clone, Debug)]
pub enum RequestKind {
    Theory {
        level: Difficulty,
        unit: CurricularUnit,
    },
    PracticeTask {
        level: Difficulty,
        beta: bool,
    },
    BatchedEvaluation {
        items: Vec<EvaluationItem>,
        context: EvaluationContext,
    },
    RoleplayTurn {
        /// 最新用户输入之前的全部历史
        history: Vec<Message>,
        latest: String,
        level: Difficulty,
        scenario: Scenario,
    },
    Speech {
        text: String,
        voice: String,
    },
}

/// 各请求种类的解码结果
#[derive(Clone, Debug, PartialEq)]
pub enum ResponsePayload {
    Theory(String),
    PracticeTask(PracticeTask),
    BatchedEvaluation(BatchedEvaluation),
    RoleplayTurn(RoleplayReply),
    /// 响应中没有音频时为 None
    Speech(Option<PcmAudio>),
}

impl RequestKind {
    pub fn operation(&self) -> Operation {
        match self {
            RequestKind::Theory { .. } => Operation::Theory,
            RequestKind::PracticeTask { .. } => Operation::PracticeTask,
            RequestKind::BatchedEvaluation { .. } => Operation::BatchedEvaluation,
            RequestKind::RoleplayTurn { .. } => Operation::RoleplayTurn,
            RequestKind::Speech { .. } => Operation::Speech,
        }
    }

    pub fn tier(&self) -> ModelTier {
        match self {
            RequestKind::Theory { .. } => ModelTier::Creation,
            RequestKind::PracticeTask { beta: true, .. } => ModelTier::Complex,
            RequestKind::PracticeTask { beta: false, .. } => ModelTier::Creation,
            RequestKind::BatchedEvaluation { context, .. } => match context.beta {
                Some(_) => ModelTier::Complex,
                None => ModelTier::Evaluation,
            },
            RequestKind::RoleplayTurn { .. } => ModelTier::Complex,
            RequestKind::Speech { .. } => ModelTier::Speech,
        }
    }

    /// 构造远程请求
    pub fn build(&self) -> GenerateRequest {
        let (system_instruction, contents, output) = match self {
            RequestKind::Theory { level, unit } => (
                None,
                vec![Turn::user(theory_prompt(*level, unit))],
                OutputFormat::Text,
            ),
            RequestKind::PracticeTask { level, beta } => {
                let modifier = if *beta { " Advanced production tasks." } else { "" };
                (
                    None,
                    vec![Turn::user(format!(
                        "Generate a Spanish practice task for level {level}.{modifier} JSON format."
                    ))],
                    OutputFormat::Json {
                        schema: task_schema(),
                    },
                )
            }
            RequestKind::BatchedEvaluation { items, context } => (
                None,
                vec![Turn::user(evaluation_prompt(items, context))],
                OutputFormat::Json {
                    schema: batched_evaluation_schema(),
                },
            ),
            RequestKind::RoleplayTurn {
                history,
                latest,
                level,
                scenario,
            } => {
                let mut contents: Vec<Turn> = history
                    .iter()
                    .map(|m| Turn {
                        role: m.role,
                        text: m.content.clone(),
                    })
                    .collect();
                contents.push(Turn::user(latest.clone()));
                (
                    Some(format!(
                        "Native Spanish roleplay: {} ({}). Level: {level}.",
                        scenario.title, scenario.description
                    )),
                    contents,
                    OutputFormat::Json {
                        schema: roleplay_reply_schema(),
                    },
                )
            }
            RequestKind::Speech { text, voice } => (
                None,
                vec![Turn::user(format!("Read: {text}"))],
                OutputFormat::Audio {
                    voice: voice.clone(),
                },
            ),
        };

        GenerateRequest {
            operation: self.operation(),
            tier: self.tier(),
            system_instruction,
            contents,
            output,
        }
    }

    /// 按请求种类解码响应
    pub fn decode(&self, response: &GenerateResponse) -> Result<ResponsePayload, LlmError> {
        match self {
            RequestKind::Theory { .. } => {
                let text = response.text.as_deref().map(str::trim).unwrap_or_default();
                if text.is_empty() {
                    return Err(LlmError::Decode("empty theory content".to_string()));
                }
                Ok(ResponsePayload::Theory(text.to_string()))
            }
            RequestKind::PracticeTask { .. } => {
                let payload: TaskPayload = decode_json(response)?;
                Ok(ResponsePayload::PracticeTask(payload.into()))
            }
            RequestKind::BatchedEvaluation { items, .. } => {
                let mut evaluation: BatchedEvaluation = decode_json(response)?;
                if evaluation.evaluations.len() != items.len() {
                    return Err(LlmError::Decode(format!(
                        "expected {} evaluations, got {}",
                        items.len(),
                        evaluation.evaluations.len()
                    )));
                }
                // 注释只对照修正句渲染；没有修正句时不保留任何关键词
                for record in &mut evaluation.evaluations {
                    let keywords = std::mem::take(&mut record.keywords);
                    record.keywords = match record.suggested_correction.as_deref() {
                        Some(corrected) => retain_anchored(keywords, &[corrected]),
                        None => Vec::new(),
                    };
                }
                Ok(ResponsePayload::BatchedEvaluation(evaluation))
            }
            RequestKind::RoleplayTurn { .. } => {
                let reply: RoleplayReply = decode_json(response)?;
                if reply.reply.trim().is_empty() {
                    return Err(LlmError::Decode("empty roleplay reply".to_string()));
                }
                let keywords = retain_anchored(reply.keywords, &[reply.reply.as_str()]);
                Ok(ResponsePayload::RoleplayTurn(RoleplayReply {
                    reply: reply.reply,
                    keywords,
                }))
            }
            RequestKind::Speech { .. } => {
                let audio = response
                    .inline_data
                    .as_ref()
                    .map(|inline| PcmAudio::from_base64(&inline.data))
                    .transpose()?;
                Ok(ResponsePayload::Speech(audio))
            }
        }
    }
}

fn decode_json<T: serde::de::DeserializeOwned>(response: &GenerateResponse) -> Result<T, LlmError> {
    let text = response
        .text
        .as_deref()
        .ok_or_else(|| LlmError::Decode("response has no text part".to_string()))?;
    serde_json::from_str(strip_code_fence(text.trim()))
        .map_err(|e| LlmError::Decode(format!("invalid JSON payload: {e}")))
}

/// 去掉模型偶尔包裹的 ```json 代码块
fn strip_code_fence(text: &str) -> &str {
    text.strip_prefix("```json")
        .or_else(|| text.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(text)
}

fn theory_prompt(level: Difficulty, unit: &CurricularUnit) -> String {
    format!(
        "Explain \"{}\" in \"{}\". Level: {level}. Objective: {} Grammar focus: {}. Vocabulary focus: {}. Markdown format.",
        unit.topic,
        unit.title,
        unit.objective,
        unit.grammar_focus.join(", "),
        unit.vocabulary_focus.join(", "),
    )
}

fn evaluation_prompt(items: &[EvaluationItem], context: &EvaluationContext) -> String {
    let mut prompt = format!(
        "Evaluate the following {} Spanish language exercises.\nUser Level: {}.\n",
        items.len(),
        context.level
    );
    if let Some(beta) = &context.beta {
        prompt.push_str(&format!(
            "AI BEHAVIOR CONTROLS (BETA):\n\
             - Error Tolerance: {}/100\n\
             - Feedback Depth: {}/100\n\
             - Grammatical Rigor: {}/100\n\
             - Correction Style: Focus on {}.\n",
            beta.tolerance, beta.feedback_depth, beta.rigor, beta.correction_type
        ));
    }
    prompt.push_str("Exercises:\n");
    for (i, item) in items.iter().enumerate() {
        prompt.push_str(&format!(
            "{}. [{}] Instruction: {} | Context: {}",
            i + 1,
            item.task.id,
            item.task.instruction,
            item.task.context
        ));
        if let Some(grammar) = &item.task.target_grammar {
            prompt.push_str(&format!(" | Target grammar: {grammar}"));
        }
        prompt.push_str(&format!(" | Answer: {}\n", item.user_input));
    }
    prompt.push_str(&format!(
        "Return JSON with exactly {} evaluations in the same order, plus an overallSummary.",
        items.len()
    ));
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::curriculum::{find_scenario, find_unit};
    use crate::llm::InlineData;
    use crate::progress::practice::fixtures::{evaluation, task};
    use crate::progress::Role;

    fn items(n: usize) -> Vec<EvaluationItem> {
        (0..n)
            .map(|i| EvaluationItem {
                task: task(&format!("t{i}")),
                user_input: format!("respuesta {i}"),
            })
            .collect()
    }

    fn eval_kind(n: usize, beta: Option<BetaSettings>) -> RequestKind {
        RequestKind::BatchedEvaluation {
            items: items(n),
            context: EvaluationContext {
                level: Difficulty::Intermediate,
                beta,
            },
        }
    }

    #[test]
    fn test_tier_selection() {
        assert_eq!(
            RequestKind::PracticeTask {
                level: Difficulty::Easy,
                beta: true
            }
            .tier(),
            ModelTier::Complex
        );
        assert_eq!(eval_kind(1, None).tier(), ModelTier::Evaluation);
        assert_eq!(
            eval_kind(1, Some(BetaSettings::default())).tier(),
            ModelTier::Complex
        );
    }

    #[test]
    fn test_evaluation_prompt_lists_items_and_beta_controls() {
        let request = eval_kind(2, Some(BetaSettings::default())).build();
        let prompt = &request.contents[0].text;
        assert!(prompt.contains("following 2 Spanish"));
        assert!(prompt.contains("respuesta 1"));
        assert!(prompt.contains("Grammatical Rigor: 50/100"));
        assert!(prompt.contains("Focus on semantic"));
        assert!(matches!(request.output, OutputFormat::Json { .. }));
    }

    #[test]
    fn test_roleplay_build_orders_history_then_latest() {
        let kind = RequestKind::RoleplayTurn {
            history: vec![
                Message::model("Hola. Bienvenido a Wine Pairing.", Vec::new()),
                Message::user("Un tinto, por favor."),
                Message::model("¿Crianza o reserva?", Vec::new()),
            ],
            latest: "Reserva.".to_string(),
            level: Difficulty::Complex,
            scenario: *find_scenario("culinary").unwrap(),
        };
        let request = kind.build();
        let texts: Vec<_> = request.contents.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts.len(), 4);
        assert_eq!(texts[3], "Reserva.");
        assert_eq!(request.contents[3].role, Role::User);
        assert_eq!(request.contents[2].role, Role::Model);
        assert!(request
            .system_instruction
            .as_deref()
            .unwrap()
            .contains("Wine Pairing"));
    }

    #[test]
    fn test_build_is_deterministic() {
        let kind = RequestKind::Theory {
            level: Difficulty::Easy,
            unit: *find_unit("e_alphabet").unwrap(),
        };
        let a = kind.build();
        let b = kind.build();
        assert_eq!(a.contents, b.contents);
        assert!(a.contents[0].text.contains("Stress & Sound"));
    }

    #[test]
    fn test_evaluation_count_mismatch_is_decode_error() {
        let body = serde_json::to_string(&evaluation(4)).unwrap();
        let err = eval_kind(5, None)
            .decode(&GenerateResponse::text(body))
            .unwrap_err();
        assert!(matches!(err, LlmError::Decode(_)));
    }

    #[test]
    fn test_evaluation_keywords_are_anchored() {
        let mut eval = evaluation(1);
        eval.evaluations[0].keywords = vec![
            crate::progress::KeywordMetadata {
                word: "ayer".into(),
                explanation: "yesterday".into(),
            },
            crate::progress::KeywordMetadata {
                word: "mañana".into(),
                explanation: "tomorrow".into(),
            },
        ];
        let body = serde_json::to_string(&eval).unwrap();
        let payload = eval_kind(1, None).decode(&GenerateResponse::text(body)).unwrap();
        let ResponsePayload::BatchedEvaluation(decoded) = payload else {
            panic!("expected evaluation payload");
        };
        let words: Vec<_> = decoded.evaluations[0]
            .keywords
            .iter()
            .map(|k| k.word.as_str())
            .collect();
        assert_eq!(words, vec!["ayer"]);
    }

    fn decoded_keywords(eval: BatchedEvaluation) -> Vec<String> {
        let body = serde_json::to_string(&eval).unwrap();
        let payload = eval_kind(1, None).decode(&GenerateResponse::text(body)).unwrap();
        let ResponsePayload::BatchedEvaluation(decoded) = payload else {
            panic!("expected evaluation payload");
        };
        decoded.evaluations[0]
            .keywords
            .iter()
            .map(|k| k.word.clone())
            .collect()
    }

    #[test]
    fn test_evaluation_keywords_ignore_feedback_text() {
        let mut eval = evaluation(1);
        eval.evaluations[0].feedback = "Revisa el verbo conjugado.".to_string();
        eval.evaluations[0].model_comparison = Some("Compara con: conjugado.".to_string());
        eval.evaluations[0].keywords = vec![
            crate::progress::KeywordMetadata {
                word: "conjugado".into(),
                explanation: "conjugated".into(),
            },
            crate::progress::KeywordMetadata {
                word: "fui".into(),
                explanation: "I went".into(),
            },
        ];
        assert_eq!(decoded_keywords(eval), vec!["fui"]);
    }

    #[test]
    fn test_evaluation_keywords_dropped_without_correction() {
        let mut eval = evaluation(1);
        eval.evaluations[0].suggested_correction = None;
        eval.evaluations[0].feedback = "Buen intento, fui correcto.".to_string();
        eval.evaluations[0].keywords = vec![crate::progress::KeywordMetadata {
            word: "fui".into(),
            explanation: "I went".into(),
        }];
        assert!(decoded_keywords(eval).is_empty());
    }

    #[test]
    fn test_task_decode_accepts_code_fence() {
        let body = "```json\n{\"id\":\"t9\",\"type\":\"REFORMULATION\",\"instruction\":\"i\",\"context\":\"c\",\"targetGrammar\":\"Pretérito\",\"targetVocabulary\":[\"ayer\"]}\n```";
        let payload = RequestKind::PracticeTask {
            level: Difficulty::Intermediate,
            beta: false,
        }
        .decode(&GenerateResponse::text(body))
        .unwrap();
        let ResponsePayload::PracticeTask(task) = payload else {
            panic!("expected task payload");
        };
        assert_eq!(task.id, "t9");
        assert_eq!(task.target_grammar.as_deref(), Some("Pretérito"));
    }

    #[test]
    fn test_empty_theory_is_decode_error() {
        let kind = RequestKind::Theory {
            level: Difficulty::Easy,
            unit: *find_unit("e_alphabet").unwrap(),
        };
        assert!(kind.decode(&GenerateResponse::text("   ")).is_err());
        assert!(kind.decode(&GenerateResponse::default()).is_err());
    }

    #[test]
    fn test_speech_decodes_pcm() {
        let kind = RequestKind::Speech {
            text: "Hola".into(),
            voice: "Kore".into(),
        };
        let pcm: Vec<u8> = [1i16, -2, 300]
            .iter()
            .flat_map(|s| s.to_le_bytes())
            .collect();
        let response = GenerateResponse {
            inline_data: Some(InlineData {
                mime_type: "audio/L16;rate=24000".into(),
                data: base64::engine::general_purpose::STANDARD.encode(pcm),
            }),
            ..GenerateResponse::default()
        };
        let ResponsePayload::Speech(Some(audio)) = kind.decode(&response).unwrap() else {
            panic!("expected audio");
        };
        assert_eq!(audio.samples, vec![1, -2, 300]);
        assert_eq!(audio.sample_rate, 24_000);
        assert_eq!(audio.channels, 1);

        assert_eq!(
            kind.decode(&GenerateResponse::default()).unwrap(),
            ResponsePayload::Speech(None)
        );
    }
}

//! 静态课程：各档位的课程单元、角色扮演场景与练习种子题

use crate::progress::{Difficulty, ExerciseType, PracticeTask};

/// Beta 模式下的延伸阅读
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BetaInsights {
    pub linguistic_deep_dive: &'static str,
    pub cultural_note: &'static str,
}

/// 课程单元（理论内容的缓存键即 `id`）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurricularUnit {
    pub id: &'static str,
    pub level: Difficulty,
    pub title: &'static str,
    pub topic: &'static str,
    pub description: &'static str,
    pub objective: &'static str,
    pub grammar_focus: &'static [&'static str],
    pub vocabulary_focus: &'static [&'static str],
    pub beta_insights: Option<BetaInsights>,
}

/// 角色扮演场景
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scenario {
    pub id: &'static str,
    pub title: &'static str,
    pub description: &'static str,
}

pub static CURRICULUM: &[CurricularUnit] = &[
    CurricularUnit {
        id: "e_alphabet",
        level: Difficulty::Easy,
        title: "Phonetic Core",
        topic: "Stress & Sound",
        description: "The sonic foundation of the language.",
        objective: "Master unique phonemes (ñ, r) and initial stress patterns.",
        grammar_focus: &["Phonetics", "Rules of Accentuation"],
        vocabulary_focus: &["ABC", "Cognates"],
        beta_insights: Some(BetaInsights {
            linguistic_deep_dive: "Spanish is a syllable-timed language, unlike English which is stress-timed.",
            cultural_note: "The tilde on the 'ñ' is a medieval abbreviation for a double 'nn'.",
        }),
    },
    CurricularUnit {
        id: "i_past",
        level: Difficulty::Intermediate,
        title: "Narrative Past",
        topic: "Preterite Architecture",
        description: "Encoding events in time.",
        objective: "Differentiate between completed and ongoing actions with precision.",
        grammar_focus: &["Preterite vs Imperfect"],
        vocabulary_focus: &["Time markers", "Travel"],
        beta_insights: Some(BetaInsights {
            linguistic_deep_dive: "The distinction depends on how the speaker frames the event, not just the nature of the event itself.",
            cultural_note: "Regional preferences for 'he ido' vs 'fui' vary significantly across the Spanish-speaking world.",
        }),
    },
    CurricularUnit {
        id: "c_subjunctive",
        level: Difficulty::Complex,
        title: "Subjective Moods",
        topic: "Subjunctive Realities",
        description: "Managing uncertainty and desire.",
        objective: "Navigate abstract clauses with 90%+ grammatical accuracy.",
        grammar_focus: &["Present Subjunctive", "Mood selection"],
        vocabulary_focus: &["Hypotheses", "Politics"],
        beta_insights: Some(BetaInsights {
            linguistic_deep_dive: "The Subjunctive marks the boundary between objective reality and the speaker's internal processing.",
            cultural_note: "Mastering the subjunctive is often considered the 'gateway' to native-level social integration.",
        }),
    },
];

pub static SCENARIOS: &[Scenario] = &[
    Scenario {
        id: "art",
        title: "Gallery Opening",
        description: "Discussing contemporary aesthetics.",
    },
    Scenario {
        id: "tech",
        title: "Tech Strategy",
        description: "Innovation and digital transformation.",
    },
    Scenario {
        id: "culinary",
        title: "Wine Pairing",
        description: "Ordering and critiquing a menu.",
    },
];

struct Seed {
    id: &'static str,
    level: Difficulty,
    kind: ExerciseType,
    instruction: &'static str,
    context: &'static str,
    beta_only: bool,
}

static SEED_BANK: &[Seed] = &[
    Seed {
        id: "seed_e1",
        level: Difficulty::Easy,
        kind: ExerciseType::DirectInstruction,
        instruction: "Say \"Hello, how are you?\"",
        context: "Meeting a neighbor.",
        beta_only: false,
    },
    Seed {
        id: "seed_e2",
        level: Difficulty::Easy,
        kind: ExerciseType::SentenceConstruction,
        instruction: "Use \"manzana\" and \"roja\".",
        context: "Describing fruit.",
        beta_only: false,
    },
    Seed {
        id: "seed_e3",
        level: Difficulty::Easy,
        kind: ExerciseType::ContextualCompletion,
        instruction: "Complete: \"Yo ____ de Guatemala.\"",
        context: "Introducing yourself.",
        beta_only: false,
    },
    Seed {
        id: "seed_i1",
        level: Difficulty::Intermediate,
        kind: ExerciseType::Reformulation,
        instruction: "Change to preterite: \"Yo estudio español.\"",
        context: "Talking about last year.",
        beta_only: false,
    },
    Seed {
        id: "seed_i2",
        level: Difficulty::Intermediate,
        kind: ExerciseType::ErrorCorrection,
        instruction: "Fix: \"Mañana yo fui a la casa.\"",
        context: "Past tense error.",
        beta_only: false,
    },
    Seed {
        id: "seed_c1",
        level: Difficulty::Complex,
        kind: ExerciseType::FreeProduction,
        instruction: "Discuss cultural identity using the subjunctive.",
        context: "Formal presentation.",
        beta_only: false,
    },
    Seed {
        id: "seed_beta_c1",
        level: Difficulty::Complex,
        kind: ExerciseType::ComparativeReformulation,
        instruction: "Elevate this phrase: \"Espero que vengas pronto.\"",
        context: "Formal letter.",
        beta_only: true,
    },
];

pub fn find_unit(id: &str) -> Option<&'static CurricularUnit> {
    CURRICULUM.iter().find(|u| u.id == id)
}

pub fn units_for(level: Difficulty) -> impl Iterator<Item = &'static CurricularUnit> {
    CURRICULUM.iter().filter(move |u| u.level == level)
}

pub fn find_scenario(id: &str) -> Option<&'static Scenario> {
    SCENARIOS.iter().find(|s| s.id == id)
}

/// 指定档位的种子题；`include_beta` 为 false 时排除 Beta 专属题
pub fn seed_tasks(level: Difficulty, include_beta: bool) -> Vec<PracticeTask> {
    SEED_BANK
        .iter()
        .filter(|s| s.level == level && (include_beta || !s.beta_only))
        .map(|s| PracticeTask {
            id: s.id.to_string(),
            kind: s.kind,
            instruction: s.instruction.to_string(),
            context: s.context.to_string(),
            target_grammar: None,
            target_vocabulary: Vec::new(),
            sample_response: None,
            is_beta_only: s.beta_only,
        })
        .collect()
}

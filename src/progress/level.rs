//! 难度档位与每档学习进度

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 难度档位
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Intermediate,
    Complex,
}

impl Difficulty {
    pub fn all() -> [Difficulty; 3] {
        [Difficulty::Easy, Difficulty::Intermediate, Difficulty::Complex]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Intermediate => "intermediate",
            Difficulty::Complex => "complex",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Fundamental",
            Difficulty::Intermediate => "Conversational",
            Difficulty::Complex => "Advanced",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "intermediate" => Ok(Difficulty::Intermediate),
            "complex" => Ok(Difficulty::Complex),
            other => Err(format!("unknown difficulty: {other}")),
        }
    }
}

/// 单档进度：分数只增不减，已完成课程 ID 为有序集合
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelProgress {
    #[serde(default)]
    pub completed_lessons: Vec<String>,
    #[serde(default)]
    pub score: u64,
    #[serde(default)]
    pub conversations: u64,
    pub last_active: DateTime<Utc>,
}

impl LevelProgress {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            completed_lessons: Vec::new(),
            score: 0,
            conversations: 0,
            last_active: now,
        }
    }

    pub fn has_completed(&self, lesson_id: &str) -> bool {
        self.completed_lessons.iter().any(|l| l == lesson_id)
    }

    /// 幂等插入；重复 ID 不改变集合
    pub fn complete_lesson(mut self, lesson_id: impl Into<String>) -> Self {
        let id = lesson_id.into();
        if !self.has_completed(&id) {
            self.completed_lessons.push(id);
        }
        self
    }

    pub fn add_score(mut self, points: u64) -> Self {
        self.score = self.score.saturating_add(points);
        self
    }

    pub fn record_conversation(mut self) -> Self {
        self.conversations = self.conversations.saturating_add(1);
        self
    }

    pub fn touch(mut self, now: DateTime<Utc>) -> Self {
        self.last_active = now;
        self
    }
}

/// 三档进度（持久化为 `{"easy": .., "intermediate": .., "complex": ..}`）
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LevelData {
    pub easy: LevelProgress,
    pub intermediate: LevelProgress,
    pub complex: LevelProgress,
}

impl LevelData {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            easy: LevelProgress::new(now),
            intermediate: LevelProgress::new(now),
            complex: LevelProgress::new(now),
        }
    }

    pub fn get(&self, level: Difficulty) -> &LevelProgress {
        match level {
            Difficulty::Easy => &self.easy,
            Difficulty::Intermediate => &self.intermediate,
            Difficulty::Complex => &self.complex,
        }
    }

    /// 用 f 变换指定档位，返回新 LevelData
    pub fn update(mut self, level: Difficulty, f: impl FnOnce(LevelProgress) -> LevelProgress) -> Self {
        let slot = match level {
            Difficulty::Easy => &mut self.easy,
            Difficulty::Intermediate => &mut self.intermediate,
            Difficulty::Complex => &mut self.complex,
        };
        let current = slot.clone();
        *slot = f(current);
        self
    }
}

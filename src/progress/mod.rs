//! 学习进度：用量账本、生成缓存、各档位进度、会话实体与持久化根记录

pub mod cache;
pub mod conversation;
pub mod ledger;
pub mod level;
pub mod practice;
pub mod record;
pub mod store;

pub use cache::GenerationCache;
pub use conversation::{ConversationThread, KeywordMetadata, Message, Role, RoleplayReply};
pub use ledger::{QuotaPolicy, UsageLedger, DAILY_TOKEN_CAP, RESET_WINDOW_HOURS};
pub use level::{Difficulty, LevelData, LevelProgress};
pub use practice::{
    BatchedEvaluation, EvaluationItem, EvaluationRecord, EvaluationResult, EvaluationStatus,
    ExerciseType, PedagogicalReport, PracticeSession, PracticeTask, TaskPayload,
};
pub use record::{
    BetaSettings, CorrectionType, LastSession, ProgressEvent, UserProgress,
    EVALUATION_HISTORY_LIMIT,
};
pub use store::{load_state, save_state, ProgressStore};

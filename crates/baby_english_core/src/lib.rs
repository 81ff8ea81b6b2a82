pub mod domain;
pub mod error;
pub mod evaluator;
pub mod ports;
pub mod progression;
pub mod turn;
pub mod vocabulary;

pub use domain::{
    AgeCategory, AgeLevel, Message, Mission, Role, ScoreEvent, Session, SessionExport,
    SessionSummary, TurnRecord, User, VocabularyCategory, VocabularyTier,
};
pub use error::{CoreError, CoreResult};
pub use evaluator::{evaluate, Evaluation, EvaluationPolicy};
pub use ports::{
    ChatCompletion, ChatCompletionService, DatabaseService, PortError, PortResult, UserStore,
    VocabularyStore,
};
pub use progression::{LevelChange, ProgressionTracker, ProgressionWarning, ScoreUpdate};
pub use turn::{ChatTurn, TurnOutcome};
pub use vocabulary::{Vocabulary, VocabularyCache, VocabularyResolver};

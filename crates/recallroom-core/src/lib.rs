//! # Recallroom Core Library
//!
//! This library provides the scheduling logic behind the Recallroom study
//! tool: deciding when each piece of knowledge should be reviewed next, how
//! urgently, and in what order. All operations are available through the
//! standalone `recallroom` CLI, which is a thin layer over this crate.
//!
//! ## Architecture
//!
//! - **Cards**: SM-2 scheduling for flip-cards, theme interleaving, draft
//!   validation and a fixed-offset study plan
//! - **Memory**: a concept-level learner model with strength, confidence and
//!   forgetting-curve signals, plus the due list, path planner and analytics
//!   that read it
//! - **Storage**: SQLite and JSON learner profile stores, the card table and
//!   TOML configuration
//! - **Engine**: load/mutate/save services with per-learner locking
//!
//! ## Key Components
//!
//! - [`CardScheduler`]: SM-2 review updates
//! - [`ContextualMemory`]: interaction recording and sessions
//! - [`MemoryEngine`]: learner operations over a [`ProfileStore`]
//! - [`Config`]: application configuration management

pub mod cards;
pub mod engine;
pub mod error;
pub mod memory;
pub mod storage;

pub use cards::{
    interleave_by_theme, Card, CardDraft, CardKind, CardScheduler, CardValidator, ReviewQuality,
    Sm2Config, StudyPlanner,
};
pub use engine::{CardDeck, ImportReport, MemoryEngine, PreferenceUpdate};
pub use error::{ConfigError, CoreError, StorageError, ValidationError};
pub use memory::{
    AnalyticsAggregator, AnalyticsOutcome, ConceptMemory, ContextualMemory, DueConcept,
    DueConceptSelector, Interaction, KnowledgeState, LearningPath, LearningPathPlanner,
    LearningPhase, LearningSession, MemoryModelConfig, SessionType, UserLearningProfile,
};
pub use storage::{
    CardDb, Config, JsonProfileStore, MemoryProfileStore, ProfileStore, SqliteProfileStore,
    StorageBackend,
};

//! Concept-level learner memory.
//!
//! A [`UserLearningProfile`] owns one [`ConceptMemory`] per concept the
//! learner has interacted with. Every interaction recomputes the memory's
//! strength signals, its knowledge state and learning phase, and the time of
//! the next review. The read-side components ([`DueConceptSelector`],
//! [`LearningPathPlanner`], [`AnalyticsAggregator`]) never mutate a profile.

mod analytics;
mod due;
mod manager;
mod model;
mod path;

pub use analytics::{
    AnalyticsAggregator, AnalyticsConfig, AnalyticsOutcome, AnalyticsSummary, ConceptSummary,
    LearningAnalytics, LearningPatterns, NoData, PerformanceTotals, Recommendations,
};
pub use due::{DueConcept, DueConceptSelector, DueWeights};
pub use manager::ContextualMemory;
pub use model::{
    KnowledgeThresholds, MemoryModelConfig, PhaseTable, StateThreshold, MAX_SCHEDULE_DAYS,
};
pub use path::{ConceptPlan, DroppedEdge, LearningPath, LearningPathPlanner, PlannerConfig, SessionPlan};

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Current version of the persisted profile document.
pub const PROFILE_SCHEMA_VERSION: u32 = 1;

/// Coarse mastery classification of a concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum KnowledgeState {
    /// Never practiced.
    #[default]
    Unknown,
    Learning,
    Practiced,
    Mastered,
    Expert,
}

impl KnowledgeState {
    pub fn as_str(self) -> &'static str {
        match self {
            KnowledgeState::Unknown => "unknown",
            KnowledgeState::Learning => "learning",
            KnowledgeState::Practiced => "practiced",
            KnowledgeState::Mastered => "mastered",
            KnowledgeState::Expert => "expert",
        }
    }

    /// Mastered or better.
    pub fn is_mastered(self) -> bool {
        matches!(self, KnowledgeState::Mastered | KnowledgeState::Expert)
    }
}

impl fmt::Display for KnowledgeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage in the acquisition-to-transfer lifecycle of a concept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LearningPhase {
    /// First exposures.
    #[default]
    Acquisition,
    /// Practice and strengthening.
    Consolidation,
    /// Long-term memory.
    Retention,
    /// Application in new contexts.
    Transfer,
}

impl LearningPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            LearningPhase::Acquisition => "acquisition",
            LearningPhase::Consolidation => "consolidation",
            LearningPhase::Retention => "retention",
            LearningPhase::Transfer => "transfer",
        }
    }
}

impl fmt::Display for LearningPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Memory trace of one concept for one learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConceptMemory {
    pub concept_id: String,
    pub concept_name: String,
    pub knowledge_state: KnowledgeState,
    pub learning_phase: LearningPhase,

    /// 0.0 to 1.0
    pub memory_strength: f64,
    /// Blend of self-reported confidence and outcomes, 0.0 to 1.0
    pub confidence_level: f64,
    /// Personal forgetting speed.
    pub decay_rate: f64,
    /// Personal difficulty multiplier.
    pub difficulty_adjustment: f64,

    pub first_exposure: DateTime<Utc>,
    pub last_review: DateTime<Utc>,
    pub next_review: DateTime<Utc>,

    pub review_count: u32,
    pub correct_answers: u32,
    pub total_attempts: u32,
    /// Exponential moving average, seconds.
    pub average_response_time: f64,

    pub prerequisites: Vec<String>,
    pub dependents: Vec<String>,

    pub learning_contexts: Vec<String>,
    pub associated_materials: Vec<String>,
}

impl Default for ConceptMemory {
    fn default() -> Self {
        let epoch = DateTime::<Utc>::UNIX_EPOCH;
        Self {
            concept_id: String::new(),
            concept_name: String::new(),
            knowledge_state: KnowledgeState::Unknown,
            learning_phase: LearningPhase::Acquisition,
            memory_strength: 0.1,
            confidence_level: 0.5,
            decay_rate: 0.1,
            difficulty_adjustment: 1.0,
            first_exposure: epoch,
            last_review: epoch,
            next_review: epoch,
            review_count: 0,
            correct_answers: 0,
            total_attempts: 0,
            average_response_time: 0.0,
            prerequisites: Vec::new(),
            dependents: Vec::new(),
            learning_contexts: Vec::new(),
            associated_materials: Vec::new(),
        }
    }
}

impl ConceptMemory {
    /// Fraction of attempts answered correctly; 0 before any attempt.
    pub fn accuracy_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            return 0.0;
        }
        self.correct_answers as f64 / self.total_attempts as f64
    }

    /// `false` for entries that only carry graph or material data.
    pub fn is_studied(&self) -> bool {
        self.total_attempts > 0
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.next_review <= now
    }

    /// Whole days past `next_review`, never negative.
    pub fn days_overdue(&self, now: DateTime<Utc>) -> i64 {
        (now - self.next_review).num_days().max(0)
    }

    pub fn time_since_last_review(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_review
    }

    /// Force every field back into its documented range.
    ///
    /// Used after loading data that may have been written by older or
    /// foreign code.
    pub fn sanitize(&mut self, model: &MemoryModelConfig) {
        fn clamp(v: f64, lo: f64, hi: f64, fallback: f64) -> f64 {
            if v.is_finite() {
                v.clamp(lo, hi)
            } else {
                fallback
            }
        }

        self.memory_strength = clamp(self.memory_strength, 0.0, 1.0, model.initial_strength);
        self.confidence_level = clamp(self.confidence_level, 0.0, 1.0, 0.5);
        self.decay_rate = clamp(
            self.decay_rate,
            model.decay_min,
            model.decay_max,
            model.initial_decay_rate,
        );
        self.difficulty_adjustment = clamp(
            self.difficulty_adjustment,
            model.difficulty_min,
            model.difficulty_max,
            model.initial_difficulty,
        );
        if !self.average_response_time.is_finite() || self.average_response_time < 0.0 {
            self.average_response_time = 0.0;
        }
        if self.correct_answers > self.total_attempts {
            self.total_attempts = self.correct_answers;
        }
        if self.last_review < self.first_exposure {
            self.last_review = self.first_exposure;
        }
        if self.next_review < self.last_review {
            self.next_review = self.last_review;
        }
        if self.concept_name.is_empty() {
            self.concept_name = self.concept_id.clone();
        }
    }
}

/// Kind of study session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionType {
    #[default]
    Study,
    Review,
    Assessment,
}

impl std::str::FromStr for SessionType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "study" => Ok(SessionType::Study),
            "review" => Ok(SessionType::Review),
            "assessment" => Ok(SessionType::Assessment),
            other => Err(ValidationError::invalid(
                "session_type",
                format!("unknown session type '{other}'"),
            )),
        }
    }
}

/// Outcome totals of a finished session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceSummary {
    pub attempts: u32,
    pub correct: u32,
    pub accuracy: f64,
    pub average_response_time: f64,
    pub average_confidence: f64,
}

/// Immutable record of a finished study session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningSession {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: DateTime<Utc>,
    #[serde(default)]
    pub concepts_studied: Vec<String>,
    #[serde(default)]
    pub session_type: SessionType,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    #[serde(default)]
    pub performance_summary: PerformanceSummary,
}

impl LearningSession {
    pub fn duration(&self) -> Duration {
        self.end_time - self.start_time
    }
}

/// A session that has been started but not yet closed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveSession {
    pub session_id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub session_type: SessionType,
    #[serde(default)]
    pub learning_objectives: Vec<String>,
    #[serde(default)]
    pub concepts_studied: Vec<String>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub correct: u32,
    #[serde(default)]
    pub total_response_time: f64,
    #[serde(default)]
    pub total_confidence: f64,
}

impl ActiveSession {
    pub fn start(session_type: SessionType, objectives: Vec<String>, now: DateTime<Utc>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            start_time: now,
            session_type,
            learning_objectives: objectives,
            concepts_studied: Vec::new(),
            attempts: 0,
            correct: 0,
            total_response_time: 0.0,
            total_confidence: 0.0,
        }
    }

    pub(crate) fn observe(&mut self, interaction: &Interaction) {
        if !self.concepts_studied.contains(&interaction.concept_id) {
            self.concepts_studied.push(interaction.concept_id.clone());
        }
        self.attempts += 1;
        if interaction.is_correct {
            self.correct += 1;
        }
        self.total_response_time += interaction.response_time;
        self.total_confidence += interaction.confidence;
    }

    /// Freeze the session into a history record.
    pub fn finish(self, now: DateTime<Utc>) -> LearningSession {
        let n = self.attempts.max(1) as f64;
        let performance_summary = PerformanceSummary {
            attempts: self.attempts,
            correct: self.correct,
            accuracy: if self.attempts == 0 { 0.0 } else { self.correct as f64 / n },
            average_response_time: if self.attempts == 0 { 0.0 } else { self.total_response_time / n },
            average_confidence: if self.attempts == 0 { 0.0 } else { self.total_confidence / n },
        };
        LearningSession {
            session_id: self.session_id,
            start_time: self.start_time,
            end_time: now.max(self.start_time),
            concepts_studied: self.concepts_studied,
            session_type: self.session_type,
            learning_objectives: self.learning_objectives,
            performance_summary,
        }
    }
}

/// Everything the engine knows about one learner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserLearningProfile {
    pub schema_version: u32,
    pub user_id: String,
    /// Optimistic concurrency token, bumped by every successful save.
    pub revision: u64,

    /// Minutes.
    pub optimal_session_length: u32,
    pub preferred_review_time: String,
    pub learning_style_preferences: Vec<String>,
    pub peak_performance_times: Vec<String>,

    /// Session capacity used by the path planner, 0.0 to 1.0.
    pub current_cognitive_load: f64,
    pub learning_velocity: f64,
    pub retention_strength: f64,

    pub concept_memories: BTreeMap<String, ConceptMemory>,
    pub learning_history: Vec<LearningSession>,
    pub active_session: Option<ActiveSession>,

    pub learning_goals: Vec<String>,
    pub motivation_factors: BTreeMap<String, f64>,
}

impl Default for UserLearningProfile {
    fn default() -> Self {
        Self {
            schema_version: PROFILE_SCHEMA_VERSION,
            user_id: String::new(),
            revision: 0,
            optimal_session_length: 25,
            preferred_review_time: "evening".to_string(),
            learning_style_preferences: vec!["visual".to_string()],
            peak_performance_times: vec!["morning".to_string()],
            current_cognitive_load: 0.5,
            learning_velocity: 1.0,
            retention_strength: 1.0,
            concept_memories: BTreeMap::new(),
            learning_history: Vec::new(),
            active_session: None,
            learning_goals: Vec::new(),
            motivation_factors: BTreeMap::from([
                ("intrinsic".to_string(), 0.7),
                ("achievement".to_string(), 0.8),
                ("social".to_string(), 0.5),
            ]),
        }
    }
}

impl UserLearningProfile {
    /// Fresh profile for a learner with no history.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    pub fn concept(&self, concept_id: &str) -> Option<&ConceptMemory> {
        self.concept_memories.get(concept_id)
    }

    pub fn is_empty(&self) -> bool {
        self.concept_memories.is_empty()
    }

    /// Clamp personalization settings and every concept memory into range.
    pub fn sanitize(&mut self, model: &MemoryModelConfig) {
        if !self.current_cognitive_load.is_finite() {
            self.current_cognitive_load = 0.5;
        }
        self.current_cognitive_load = self.current_cognitive_load.clamp(0.0, 1.0);
        if self.optimal_session_length == 0 {
            self.optimal_session_length = 25;
        }
        for (id, memory) in self.concept_memories.iter_mut() {
            if memory.concept_id != *id {
                memory.concept_id = id.clone();
            }
            memory.sanitize(model);
        }
    }
}

/// A single answered question about a concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub concept_id: String,
    pub concept_name: String,
    pub is_correct: bool,
    /// Seconds.
    pub response_time: f64,
    /// Self-reported, 0.0 to 1.0.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    #[serde(default)]
    pub context: String,
}

fn default_confidence() -> f64 {
    0.5
}

impl Interaction {
    pub fn new(concept_id: impl Into<String>, concept_name: impl Into<String>, is_correct: bool) -> Self {
        Self {
            concept_id: concept_id.into(),
            concept_name: concept_name.into(),
            is_correct,
            response_time: 0.0,
            confidence: default_confidence(),
            context: String::new(),
        }
    }

    pub fn with_response_time(mut self, seconds: f64) -> Self {
        self.response_time = seconds;
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence;
        self
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = context.into();
        self
    }

    /// Reject input the memory model is not defined for.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.concept_id.trim().is_empty() {
            return Err(ValidationError::invalid("concept_id", "must not be empty"));
        }
        if !self.confidence.is_finite() || !(0.0..=1.0).contains(&self.confidence) {
            return Err(ValidationError::OutOfRange {
                field: "confidence".into(),
                value: self.confidence,
                min: 0.0,
                max: 1.0,
            });
        }
        if !self.response_time.is_finite() || self.response_time < 0.0 {
            return Err(ValidationError::invalid(
                "response_time",
                format!("must be a non-negative number of seconds, got {}", self.response_time),
            ));
        }
        Ok(())
    }
}

//! Tunable constants and the pure update rules of the memory model.
//!
//! Every number the model uses lives in [`MemoryModelConfig`] so it can be
//! inspected and overridden from the config file. The defaults are the
//! values the scheduler has always shipped with; none of them were fitted
//! against learner data.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{ConceptMemory, KnowledgeState, LearningPhase};
use crate::error::ValidationError;

/// One value per learning phase.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PhaseTable {
    pub acquisition: f64,
    pub consolidation: f64,
    pub retention: f64,
    pub transfer: f64,
}

impl PhaseTable {
    pub fn get(&self, phase: LearningPhase) -> f64 {
        match phase {
            LearningPhase::Acquisition => self.acquisition,
            LearningPhase::Consolidation => self.consolidation,
            LearningPhase::Retention => self.retention,
            LearningPhase::Transfer => self.transfer,
        }
    }
}

/// Minimum accuracy, strength and attempt count for a knowledge state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateThreshold {
    pub min_accuracy: f64,
    pub min_strength: f64,
    pub min_attempts: u32,
}

impl StateThreshold {
    fn admits(&self, accuracy: f64, strength: f64, attempts: u32) -> bool {
        accuracy >= self.min_accuracy && strength >= self.min_strength && attempts >= self.min_attempts
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KnowledgeThresholds {
    /// Below this many attempts a concept is always `Learning`.
    pub min_attempts: u32,
    pub expert: StateThreshold,
    pub mastered: StateThreshold,
    pub practiced: StateThreshold,
}

impl Default for KnowledgeThresholds {
    fn default() -> Self {
        Self {
            min_attempts: 3,
            expert: StateThreshold {
                min_accuracy: 0.9,
                min_strength: 0.8,
                min_attempts: 10,
            },
            mastered: StateThreshold {
                min_accuracy: 0.8,
                min_strength: 0.7,
                min_attempts: 5,
            },
            practiced: StateThreshold {
                min_accuracy: 0.6,
                min_strength: 0.5,
                min_attempts: 0,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryModelConfig {
    // cold start
    pub initial_strength: f64,
    pub initial_decay_rate: f64,
    pub initial_difficulty: f64,

    /// Smoothing factor of the response-time moving average.
    pub response_time_alpha: f64,

    pub strength_gain: f64,
    pub strength_penalty: f64,

    pub confidence_alpha: f64,
    pub confidence_penalty: f64,
    pub confidence_floor: f64,

    pub decay_shrink: f64,
    pub decay_growth: f64,
    pub decay_min: f64,
    pub decay_max: f64,

    /// Responses slower than `ratio * average` raise the difficulty.
    pub slow_response_ratio: f64,
    /// Responses faster than `ratio * average` lower the difficulty.
    pub fast_response_ratio: f64,
    pub difficulty_growth: f64,
    pub difficulty_shrink: f64,
    pub difficulty_min: f64,
    pub difficulty_max: f64,

    pub base_interval_days: f64,
    pub strength_interval_bonus: f64,
    pub interval_growth: f64,
    pub failed_interval_days: f64,
    pub min_interval_days: f64,
    pub max_interval_days: f64,

    /// Reviews up to this count stay in acquisition.
    pub acquisition_max_reviews: u32,
    /// Days after first exposure that count as consolidation.
    pub consolidation_days: i64,

    pub phase_interval: PhaseTable,
    pub thresholds: KnowledgeThresholds,
}

impl Default for MemoryModelConfig {
    fn default() -> Self {
        Self {
            initial_strength: 0.1,
            initial_decay_rate: 0.1,
            initial_difficulty: 1.0,
            response_time_alpha: 0.3,
            strength_gain: 0.2,
            strength_penalty: 0.15,
            confidence_alpha: 0.3,
            confidence_penalty: 0.2,
            confidence_floor: 0.1,
            decay_shrink: 0.95,
            decay_growth: 1.1,
            decay_min: 0.01,
            decay_max: 0.5,
            slow_response_ratio: 1.5,
            fast_response_ratio: 0.7,
            difficulty_growth: 1.1,
            difficulty_shrink: 0.95,
            difficulty_min: 0.5,
            difficulty_max: 2.0,
            base_interval_days: 1.0,
            strength_interval_bonus: 2.0,
            interval_growth: 1.3,
            failed_interval_days: 0.5,
            min_interval_days: 0.1,
            max_interval_days: 365.0,
            acquisition_max_reviews: 2,
            consolidation_days: 7,
            phase_interval: PhaseTable {
                acquisition: 0.5,
                consolidation: 1.0,
                retention: 1.5,
                transfer: 2.0,
            },
            thresholds: KnowledgeThresholds::default(),
        }
    }
}

impl MemoryModelConfig {
    pub(crate) fn smooth_response_time(&self, average: f64, sample: f64) -> f64 {
        let a = self.response_time_alpha;
        a * sample + (1.0 - a) * average
    }

    /// Diminishing gains on success; confident misses cost more.
    pub(crate) fn next_strength(&self, strength: f64, is_correct: bool, confidence: f64) -> f64 {
        let next = if is_correct {
            strength + self.strength_gain * (1.0 - strength) * confidence
        } else {
            strength - self.strength_penalty * confidence
        };
        next.clamp(0.0, 1.0)
    }

    /// Recomputed from accumulated stats on every call.
    pub fn classify_knowledge(&self, memory: &ConceptMemory) -> KnowledgeState {
        let t = &self.thresholds;
        let accuracy = memory.accuracy_rate();
        let strength = memory.memory_strength;
        let attempts = memory.total_attempts;

        if attempts < t.min_attempts {
            KnowledgeState::Learning
        } else if t.expert.admits(accuracy, strength, attempts) {
            KnowledgeState::Expert
        } else if t.mastered.admits(accuracy, strength, attempts) {
            KnowledgeState::Mastered
        } else if t.practiced.admits(accuracy, strength, attempts) {
            KnowledgeState::Practiced
        } else {
            KnowledgeState::Learning
        }
    }

    pub fn classify_phase(&self, memory: &ConceptMemory, now: DateTime<Utc>) -> LearningPhase {
        let days_since_first = (now - memory.first_exposure).num_days();

        if memory.review_count <= self.acquisition_max_reviews {
            LearningPhase::Acquisition
        } else if days_since_first <= self.consolidation_days {
            LearningPhase::Consolidation
        } else if memory.knowledge_state.is_mastered() {
            LearningPhase::Transfer
        } else {
            LearningPhase::Retention
        }
    }

    /// Days until the next review, already clamped.
    pub fn review_interval_days(&self, memory: &ConceptMemory, is_correct: bool) -> f64 {
        let interval = if is_correct {
            let strength = 1.0 + self.strength_interval_bonus * memory.memory_strength;
            let accuracy = 1.0 + memory.accuracy_rate();
            let phase = self.phase_interval.get(memory.learning_phase);
            let difficulty = 1.0 / memory.difficulty_adjustment.max(f64::EPSILON);
            let growth = self.interval_growth.powi(memory.review_count.min(i32::MAX as u32) as i32);
            self.base_interval_days * strength * accuracy * phase * difficulty * growth
        } else {
            self.base_interval_days * self.failed_interval_days
        };

        if interval.is_finite() {
            interval.clamp(self.min_interval_days, self.max_interval_days)
        } else {
            self.max_interval_days
        }
    }

    pub(crate) fn next_confidence(&self, current: f64, reported: f64, is_correct: bool) -> f64 {
        let next = if is_correct {
            self.confidence_alpha * reported + (1.0 - self.confidence_alpha) * current
        } else {
            (current - self.confidence_penalty * reported).max(self.confidence_floor)
        };
        next.clamp(0.0, 1.0)
    }

    /// Update decay rate and difficulty from one outcome.
    pub(crate) fn adapt_forgetting_curve(
        &self,
        memory: &mut ConceptMemory,
        is_correct: bool,
        response_time: f64,
    ) {
        memory.decay_rate = if is_correct {
            (memory.decay_rate * self.decay_shrink).max(self.decay_min)
        } else {
            (memory.decay_rate * self.decay_growth).min(self.decay_max)
        }
        .clamp(self.decay_min, self.decay_max);

        let average = memory.average_response_time;
        if response_time > average * self.slow_response_ratio {
            memory.difficulty_adjustment =
                (memory.difficulty_adjustment * self.difficulty_growth).min(self.difficulty_max);
        } else if response_time < average * self.fast_response_ratio {
            memory.difficulty_adjustment =
                (memory.difficulty_adjustment * self.difficulty_shrink).max(self.difficulty_min);
        }
        memory.difficulty_adjustment = memory
            .difficulty_adjustment
            .clamp(self.difficulty_min, self.difficulty_max);
    }
}

/// Longest interval, in days, the model will ever schedule.
pub const MAX_SCHEDULE_DAYS: f64 = 36_500.0;

/// Convert fractional days into a duration with millisecond precision.
pub(crate) fn days_to_duration(days: f64) -> Duration {
    Duration::milliseconds((days * 86_400_000.0).round() as i64)
}

/// `now` plus `days`, or an error when the result is not a representable
/// timestamp.
pub(crate) fn schedule_after(now: DateTime<Utc>, days: f64) -> Result<DateTime<Utc>, ValidationError> {
    let unrepresentable = || {
        ValidationError::invalid("next_review", format!("{days} days after {now} is out of range"))
    };
    if !days.is_finite() || days.abs() > MAX_SCHEDULE_DAYS {
        return Err(unrepresentable());
    }
    now.checked_add_signed(days_to_duration(days))
        .ok_or_else(unrepresentable)
}

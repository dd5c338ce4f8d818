//! Ranking of concepts whose review time has passed.
//!
//! Priority mixes three signals:
//! - how overdue the concept is (capped)
//! - how weak the memory is
//! - how early in its lifecycle the concept sits

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConceptMemory, KnowledgeState, LearningPhase, PhaseTable, UserLearningProfile};

/// Weights of the due-concept priority score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DueWeights {
    pub overdue_weight: f64,
    pub weakness_weight: f64,
    pub phase_weight: f64,
    /// Overdue days beyond this add nothing.
    pub max_overdue_days: f64,
    /// Batch size when the caller does not ask for one.
    pub default_max_count: usize,
    pub phase_weights: PhaseTable,
}

impl Default for DueWeights {
    fn default() -> Self {
        Self {
            overdue_weight: 0.3,
            weakness_weight: 0.4,
            phase_weight: 0.3,
            max_overdue_days: 10.0,
            default_max_count: 10,
            phase_weights: PhaseTable {
                acquisition: 1.0,
                consolidation: 0.8,
                retention: 0.6,
                transfer: 0.4,
            },
        }
    }
}

/// One row of the due list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DueConcept {
    pub concept_id: String,
    pub concept_name: String,
    pub knowledge_state: KnowledgeState,
    pub learning_phase: LearningPhase,
    pub memory_strength: f64,
    pub confidence_level: f64,
    pub accuracy_rate: f64,
    pub days_overdue: i64,
    pub review_count: u32,
    pub priority: f64,
}

pub struct DueConceptSelector {
    weights: DueWeights,
}

impl Default for DueConceptSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl DueConceptSelector {
    pub fn new() -> Self {
        Self {
            weights: DueWeights::default(),
        }
    }

    pub fn with_weights(weights: DueWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &DueWeights {
        &self.weights
    }

    /// Priority of a concept that is due at `now`.
    pub fn priority(&self, memory: &ConceptMemory, now: DateTime<Utc>) -> f64 {
        let w = &self.weights;
        let overdue = (memory.days_overdue(now) as f64).min(w.max_overdue_days);
        overdue * w.overdue_weight
            + (1.0 - memory.memory_strength) * w.weakness_weight
            + w.phase_weights.get(memory.learning_phase) * w.phase_weight
    }

    /// Due concepts, most urgent first, at most `max_count` of them.
    ///
    /// `None` uses the configured default batch size. Equal scores are
    /// ordered by concept id.
    pub fn select(
        &self,
        profile: &UserLearningProfile,
        max_count: Option<usize>,
        now: DateTime<Utc>,
    ) -> Vec<DueConcept> {
        let limit = max_count.unwrap_or(self.weights.default_max_count);
        let mut due: Vec<DueConcept> = profile
            .concept_memories
            .values()
            .filter(|m| m.is_studied() && m.is_due(now))
            .map(|m| DueConcept {
                concept_id: m.concept_id.clone(),
                concept_name: m.concept_name.clone(),
                knowledge_state: m.knowledge_state,
                learning_phase: m.learning_phase,
                memory_strength: m.memory_strength,
                confidence_level: m.confidence_level,
                accuracy_rate: m.accuracy_rate(),
                days_overdue: m.days_overdue(now),
                review_count: m.review_count,
                priority: self.priority(m, now),
            })
            .collect();

        due.sort_by(|a, b| {
            b.priority
                .total_cmp(&a.priority)
                .then_with(|| a.concept_id.cmp(&b.concept_id))
        });
        due.truncate(limit);
        due
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;

    fn memory(id: &str, strength: f64, phase: LearningPhase, next_review: DateTime<Utc>) -> ConceptMemory {
        ConceptMemory {
            concept_id: id.into(),
            concept_name: id.to_uppercase(),
            memory_strength: strength,
            learning_phase: phase,
            next_review,
            total_attempts: 1,
            ..ConceptMemory::default()
        }
    }

    fn profile_with(memories: Vec<ConceptMemory>) -> UserLearningProfile {
        let mut p = UserLearningProfile::new("u");
        for m in memories {
            p.concept_memories.insert(m.concept_id.clone(), m);
        }
        p
    }

    #[test]
    fn priority_formula() {
        let now = Utc::now();
        let m = memory("a", 0.25, LearningPhase::Retention, now - Duration::days(3));
        let score = DueConceptSelector::new().priority(&m, now);
        assert!((score - (3.0 * 0.3 + 0.75 * 0.4 + 0.6 * 0.3)).abs() < 1e-12);
    }

    #[test]
    fn overdue_contribution_is_capped() {
        let now = Utc::now();
        let selector = DueConceptSelector::new();
        let ten = memory("a", 0.5, LearningPhase::Transfer, now - Duration::days(10));
        let forty = memory("b", 0.5, LearningPhase::Transfer, now - Duration::days(40));
        assert_eq!(selector.priority(&ten, now), selector.priority(&forty, now));
    }

    #[test]
    fn future_reviews_are_excluded() {
        let now = Utc::now();
        let p = profile_with(vec![
            memory("due", 0.5, LearningPhase::Acquisition, now),
            memory("later", 0.0, LearningPhase::Acquisition, now + Duration::seconds(1)),
        ]);
        let due = DueConceptSelector::new().select(&p, None, now);
        let ids: Vec<_> = due.iter().map(|d| d.concept_id.as_str()).collect();
        assert_eq!(ids, vec!["due"]);
        assert_eq!(due[0].concept_name, "DUE");
    }

    #[test]
    fn sorted_by_priority_then_id() {
        let now = Utc::now();
        let p = profile_with(vec![
            memory("b", 0.5, LearningPhase::Retention, now),
            memory("a", 0.5, LearningPhase::Retention, now),
            memory("weak", 0.0, LearningPhase::Retention, now),
            memory("old", 0.9, LearningPhase::Transfer, now - Duration::days(5)),
        ]);
        let due = DueConceptSelector::new().select(&p, Some(3), now);
        let ids: Vec<_> = due.iter().map(|d| d.concept_id.as_str()).collect();
        assert_eq!(ids, vec!["old", "weak", "a"]);
    }

    #[test]
    fn unstudied_concepts_are_never_due() {
        let now = Utc::now();
        let mut linked = memory("linked", 0.1, LearningPhase::Acquisition, now - Duration::days(2));
        linked.total_attempts = 0;
        let p = profile_with(vec![linked, memory("seen", 0.5, LearningPhase::Acquisition, now)]);
        let due = DueConceptSelector::new().select(&p, None, now);
        let ids: Vec<_> = due.iter().map(|d| d.concept_id.as_str()).collect();
        assert_eq!(ids, vec!["seen"]);
    }

    #[test]
    fn empty_profile_yields_empty_list() {
        let p = UserLearningProfile::new("u");
        assert!(DueConceptSelector::new().select(&p, Some(5), Utc::now()).is_empty());
    }

    proptest! {
        #[test]
        fn never_returns_future_concepts(
            offsets in prop::collection::vec((-2_000_000i64..2_000_000, 0.0f64..=1.0), 0..40),
            limit in 0usize..50,
        ) {
            let now = Utc::now();
            let memories = offsets
                .iter()
                .enumerate()
                .map(|(i, (secs, s))| {
                    memory(&format!("c{i}"), *s, LearningPhase::Consolidation, now + Duration::seconds(*secs))
                })
                .collect();
            let p = profile_with(memories);
            let due = DueConceptSelector::new().select(&p, Some(limit), now);
            prop_assert!(due.len() <= limit);
            for d in &due {
                prop_assert!(p.concept(&d.concept_id).unwrap().next_review <= now);
            }
            prop_assert!(due.windows(2).all(|w| w[0].priority >= w[1].priority));
        }
    }
}

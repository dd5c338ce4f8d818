//! Learner-level reporting over concept memories.
//!
//! The report covers:
//! - overall accuracy, average strength and mastery velocity
//! - how concepts are spread over knowledge states
//! - the weakest and strongest concepts
//! - the learner's stated study patterns

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ConceptMemory, KnowledgeState, UserLearningProfile};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    /// Maximum length of the weak and strong concept lists.
    pub report_limit: usize,
    /// Concepts below this strength are weak.
    pub weak_strength: f64,
    /// Concepts below this accuracy are weak.
    pub weak_accuracy: f64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            report_limit: 5,
            weak_strength: 0.5,
            weak_accuracy: 0.6,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalyticsSummary {
    pub total_concepts: usize,
    pub overall_accuracy: f64,
    pub average_memory_strength: f64,
    /// Concepts at mastered or above per day since the first session.
    pub learning_velocity: f64,
    pub total_study_sessions: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceTotals {
    pub total_attempts: u64,
    pub correct_answers: u64,
    pub accuracy_percentage: f64,
}

/// A concept as it appears in the weak or strong list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptSummary {
    pub concept_id: String,
    pub concept_name: String,
    pub memory_strength: f64,
    pub accuracy: f64,
    pub knowledge_state: KnowledgeState,
    pub days_since_review: i64,
}

impl ConceptSummary {
    fn of(memory: &ConceptMemory, now: DateTime<Utc>) -> Self {
        Self {
            concept_id: memory.concept_id.clone(),
            concept_name: memory.concept_name.clone(),
            memory_strength: memory.memory_strength,
            accuracy: memory.accuracy_rate(),
            knowledge_state: memory.knowledge_state,
            days_since_review: memory.time_since_last_review(now).num_days(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendations {
    /// Weakest first.
    pub weak_areas: Vec<ConceptSummary>,
    /// Strongest first.
    pub strong_areas: Vec<ConceptSummary>,
    pub due_for_review: usize,
    /// Minutes.
    pub suggested_session_length: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningPatterns {
    pub preferred_times: Vec<String>,
    pub learning_styles: Vec<String>,
    pub attention_span: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningAnalytics {
    pub user_id: String,
    pub summary: AnalyticsSummary,
    pub knowledge_distribution: BTreeMap<KnowledgeState, u32>,
    pub performance: PerformanceTotals,
    pub recommendations: Recommendations,
    pub learning_patterns: LearningPatterns,
}

/// Marker result for a learner without concept memories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoData {
    pub error: String,
}

impl Default for NoData {
    fn default() -> Self {
        Self {
            error: "no data".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalyticsOutcome {
    Report(Box<LearningAnalytics>),
    NoData(NoData),
}

impl AnalyticsOutcome {
    pub fn report(&self) -> Option<&LearningAnalytics> {
        match self {
            AnalyticsOutcome::Report(report) => Some(report),
            AnalyticsOutcome::NoData(_) => None,
        }
    }
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

pub struct AnalyticsAggregator {
    config: AnalyticsConfig,
}

impl Default for AnalyticsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyticsAggregator {
    pub fn new() -> Self {
        Self {
            config: AnalyticsConfig::default(),
        }
    }

    pub fn with_config(config: AnalyticsConfig) -> Self {
        Self { config }
    }

    fn is_weak(&self, memory: &ConceptMemory) -> bool {
        memory.memory_strength < self.config.weak_strength
            || memory.accuracy_rate() < self.config.weak_accuracy
    }

    /// Mastered concepts per active day, 0 without any finished session.
    fn velocity(profile: &UserLearningProfile, mastered: usize, now: DateTime<Utc>) -> f64 {
        let Some(first_start) = profile.learning_history.iter().map(|s| s.start_time).min() else {
            return 0.0;
        };
        let days_active = (now - first_start).num_days().max(1);
        mastered as f64 / days_active as f64
    }

    pub fn generate(&self, profile: &UserLearningProfile, now: DateTime<Utc>) -> AnalyticsOutcome {
        let memories: Vec<&ConceptMemory> = profile
            .concept_memories
            .values()
            .filter(|m| m.is_studied())
            .collect();
        if memories.is_empty() {
            return AnalyticsOutcome::NoData(NoData::default());
        }

        let mut distribution: BTreeMap<KnowledgeState, u32> = BTreeMap::new();
        for m in &memories {
            *distribution.entry(m.knowledge_state).or_insert(0) += 1;
        }

        let total_attempts: u64 = memories.iter().map(|m| u64::from(m.total_attempts)).sum();
        let total_correct: u64 = memories.iter().map(|m| u64::from(m.correct_answers)).sum();
        let overall_accuracy = total_correct as f64 / total_attempts.max(1) as f64;

        let mastered = memories
            .iter()
            .filter(|m| m.knowledge_state.is_mastered())
            .count();
        let velocity = Self::velocity(profile, mastered, now);
        let average_strength =
            memories.iter().map(|m| m.memory_strength).sum::<f64>() / memories.len() as f64;

        let mut weak: Vec<ConceptSummary> = memories
            .iter()
            .filter(|m| self.is_weak(m))
            .map(|m| ConceptSummary::of(m, now))
            .collect();
        weak.sort_by(|a, b| a.memory_strength.total_cmp(&b.memory_strength));
        weak.truncate(self.config.report_limit);

        let mut strong: Vec<ConceptSummary> = memories
            .iter()
            .filter(|m| m.knowledge_state.is_mastered())
            .map(|m| ConceptSummary::of(m, now))
            .collect();
        strong.sort_by(|a, b| b.memory_strength.total_cmp(&a.memory_strength));
        strong.truncate(self.config.report_limit);

        let due_for_review = memories.iter().filter(|m| m.is_due(now)).count();

        AnalyticsOutcome::Report(Box::new(LearningAnalytics {
            user_id: profile.user_id.clone(),
            summary: AnalyticsSummary {
                total_concepts: memories.len(),
                overall_accuracy: round_to(overall_accuracy, 3),
                average_memory_strength: round_to(average_strength, 3),
                learning_velocity: round_to(velocity, 3),
                total_study_sessions: profile.learning_history.len(),
            },
            knowledge_distribution: distribution,
            performance: PerformanceTotals {
                total_attempts,
                correct_answers: total_correct,
                accuracy_percentage: round_to(overall_accuracy * 100.0, 1),
            },
            recommendations: Recommendations {
                weak_areas: weak,
                strong_areas: strong,
                due_for_review,
                suggested_session_length: profile.optimal_session_length,
            },
            learning_patterns: LearningPatterns {
                preferred_times: profile.peak_performance_times.clone(),
                learning_styles: profile.learning_style_preferences.clone(),
                attention_span: profile.optimal_session_length,
            },
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{LearningSession, SessionType};
    use chrono::Duration;

    fn memory(id: &str, attempts: u32, correct: u32, strength: f64, state: KnowledgeState) -> ConceptMemory {
        let now = Utc::now();
        ConceptMemory {
            concept_id: id.into(),
            concept_name: id.into(),
            total_attempts: attempts,
            correct_answers: correct,
            memory_strength: strength,
            knowledge_state: state,
            last_review: now,
            next_review: now + Duration::days(1),
            ..ConceptMemory::default()
        }
    }

    fn profile(memories: Vec<ConceptMemory>) -> UserLearningProfile {
        let mut p = UserLearningProfile::new("u");
        for m in memories {
            p.concept_memories.insert(m.concept_id.clone(), m);
        }
        p
    }

    #[test]
    fn empty_profile_reports_no_data() {
        let outcome = AnalyticsAggregator::new().generate(&UserLearningProfile::new("u"), Utc::now());
        assert_eq!(outcome, AnalyticsOutcome::NoData(NoData::default()));
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            serde_json::json!({"error": "no data"})
        );
    }

    #[test]
    fn totals_and_distribution() {
        let p = profile(vec![
            memory("a", 10, 9, 0.9, KnowledgeState::Expert),
            memory("b", 5, 2, 0.3, KnowledgeState::Learning),
            memory("c", 5, 4, 0.75, KnowledgeState::Mastered),
        ]);
        let outcome = AnalyticsAggregator::new().generate(&p, Utc::now());
        let report = outcome.report().unwrap();

        assert_eq!(report.summary.total_concepts, 3);
        assert_eq!(report.performance.total_attempts, 20);
        assert_eq!(report.performance.correct_answers, 15);
        assert_eq!(report.summary.overall_accuracy, 0.75);
        assert_eq!(report.performance.accuracy_percentage, 75.0);
        assert_eq!(report.summary.average_memory_strength, 0.65);
        assert_eq!(report.knowledge_distribution[&KnowledgeState::Expert], 1);
        assert!(!report.knowledge_distribution.contains_key(&KnowledgeState::Practiced));
        assert_eq!(report.summary.learning_velocity, 0.0);
        assert_eq!(report.recommendations.due_for_review, 0);
        assert_eq!(report.recommendations.suggested_session_length, 25);
    }

    #[test]
    fn weak_and_strong_lists_are_ordered() {
        let p = profile(vec![
            memory("low-acc", 10, 5, 0.8, KnowledgeState::Practiced),
            memory("weakest", 3, 3, 0.1, KnowledgeState::Learning),
            memory("expert", 10, 10, 0.95, KnowledgeState::Expert),
            memory("mastered", 6, 5, 0.72, KnowledgeState::Mastered),
        ]);
        let report = AnalyticsAggregator::new().generate(&p, Utc::now());
        let report = report.report().unwrap();
        let weak: Vec<_> = report.recommendations.weak_areas.iter().map(|c| c.concept_id.as_str()).collect();
        let strong: Vec<_> = report.recommendations.strong_areas.iter().map(|c| c.concept_id.as_str()).collect();
        assert_eq!(weak, vec!["weakest", "low-acc"]);
        assert_eq!(strong, vec!["expert", "mastered"]);
    }

    #[test]
    fn unstudied_concepts_are_left_out() {
        let mut linked = memory("linked", 0, 0, 0.1, KnowledgeState::Unknown);
        linked.next_review = Utc::now() - Duration::days(1);

        let only_linked = profile(vec![linked.clone()]);
        let outcome = AnalyticsAggregator::new().generate(&only_linked, Utc::now());
        assert_eq!(outcome, AnalyticsOutcome::NoData(NoData::default()));

        let mixed = profile(vec![linked, memory("a", 10, 9, 0.9, KnowledgeState::Expert)]);
        let outcome = AnalyticsAggregator::new().generate(&mixed, Utc::now());
        let report = outcome.report().unwrap();
        assert_eq!(report.summary.total_concepts, 1);
        assert_eq!(report.summary.average_memory_strength, 0.9);
        assert!(report.recommendations.weak_areas.is_empty());
        assert_eq!(report.recommendations.due_for_review, 0);
        assert!(!report.knowledge_distribution.contains_key(&KnowledgeState::Unknown));
    }

    #[test]
    fn lists_are_capped() {
        let p = profile(
            (0..8)
                .map(|i| memory(&format!("w{i}"), 1, 0, 0.1, KnowledgeState::Learning))
                .collect(),
        );
        let aggregator = AnalyticsAggregator::with_config(AnalyticsConfig {
            report_limit: 3,
            ..AnalyticsConfig::default()
        });
        let outcome = aggregator.generate(&p, Utc::now());
        assert_eq!(outcome.report().unwrap().recommendations.weak_areas.len(), 3);
    }

    #[test]
    fn velocity_counts_days_since_first_session() {
        let now = Utc::now();
        let mut p = profile(vec![
            memory("a", 10, 10, 0.9, KnowledgeState::Expert),
            memory("b", 6, 6, 0.8, KnowledgeState::Mastered),
        ]);
        p.learning_history.push(LearningSession {
            session_id: "s".into(),
            start_time: now - Duration::days(4),
            end_time: now - Duration::days(4) + Duration::minutes(30),
            concepts_studied: vec![],
            session_type: SessionType::Study,
            learning_objectives: vec![],
            performance_summary: Default::default(),
        });
        let outcome = AnalyticsAggregator::new().generate(&p, now);
        assert_eq!(outcome.report().unwrap().summary.learning_velocity, 0.5);
    }
}

//! Write-side of the memory model: recording interactions and sessions.

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::model::schedule_after;
use super::{
    ActiveSession, ConceptMemory, Interaction, KnowledgeState, LearningPhase, LearningSession,
    MemoryModelConfig, SessionType, UserLearningProfile,
};
use crate::error::ValidationError;

/// Applies interactions to a learner profile.
#[derive(Debug, Clone, Default)]
pub struct ContextualMemory {
    model: MemoryModelConfig,
}

impl ContextualMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(model: MemoryModelConfig) -> Self {
        Self { model }
    }

    pub fn model(&self) -> &MemoryModelConfig {
        &self.model
    }

    fn cold_start(
        &self,
        interaction: &Interaction,
        now: DateTime<Utc>,
    ) -> Result<ConceptMemory, ValidationError> {
        Ok(ConceptMemory {
            concept_id: interaction.concept_id.clone(),
            concept_name: if interaction.concept_name.is_empty() {
                interaction.concept_id.clone()
            } else {
                interaction.concept_name.clone()
            },
            knowledge_state: KnowledgeState::Learning,
            learning_phase: LearningPhase::Acquisition,
            memory_strength: self.model.initial_strength,
            confidence_level: interaction.confidence,
            decay_rate: self.model.initial_decay_rate,
            difficulty_adjustment: self.model.initial_difficulty,
            first_exposure: now,
            last_review: now,
            next_review: schedule_after(now, self.model.base_interval_days)?,
            average_response_time: interaction.response_time,
            ..ConceptMemory::default()
        })
    }

    /// Cold start for a concept that so far only carried graph or material
    /// links. The links survive; everything else starts fresh.
    fn first_study(
        &self,
        linked: &ConceptMemory,
        interaction: &Interaction,
        now: DateTime<Utc>,
    ) -> Result<ConceptMemory, ValidationError> {
        let mut memory = self.cold_start(interaction, now)?;
        memory.prerequisites = linked.prerequisites.clone();
        memory.dependents = linked.dependents.clone();
        memory.learning_contexts = linked.learning_contexts.clone();
        memory.associated_materials = linked.associated_materials.clone();
        Ok(memory)
    }

    /// Fold one answered question into the learner's memory of a concept.
    ///
    /// Unknown concepts are created on the spot. Returns a copy of the
    /// updated memory.
    pub fn record_interaction(
        &self,
        profile: &mut UserLearningProfile,
        interaction: &Interaction,
        now: DateTime<Utc>,
    ) -> Result<ConceptMemory, ValidationError> {
        interaction.validate()?;
        let model = &self.model;

        let mut memory = match profile.concept_memories.get(&interaction.concept_id) {
            Some(existing) if existing.is_studied() => existing.clone(),
            Some(linked) => self.first_study(linked, interaction, now)?,
            None => self.cold_start(interaction, now)?,
        };
        let memory = &mut memory;
        // Timestamps never move backwards even if the caller's clock does.
        let now = now.max(memory.last_review);
        let is_correct = interaction.is_correct;

        memory.total_attempts = memory.total_attempts.saturating_add(1);
        if is_correct {
            memory.correct_answers = memory.correct_answers.saturating_add(1);
        }
        memory.average_response_time =
            model.smooth_response_time(memory.average_response_time, interaction.response_time);

        memory.memory_strength =
            model.next_strength(memory.memory_strength, is_correct, interaction.confidence);
        memory.knowledge_state = model.classify_knowledge(memory);
        memory.learning_phase = model.classify_phase(memory, now);

        let interval_days = model.review_interval_days(memory, is_correct);
        memory.next_review = schedule_after(now, interval_days)?;
        memory.last_review = now;
        memory.review_count = memory.review_count.saturating_add(1);

        memory.confidence_level =
            model.next_confidence(memory.confidence_level, interaction.confidence, is_correct);

        let context = interaction.context.trim();
        if !context.is_empty() && !memory.learning_contexts.iter().any(|c| c == context) {
            memory.learning_contexts.push(context.to_string());
        }

        model.adapt_forgetting_curve(memory, is_correct, interaction.response_time);

        debug!(
            concept = %memory.concept_id,
            correct = is_correct,
            strength = memory.memory_strength,
            state = %memory.knowledge_state,
            phase = %memory.learning_phase,
            interval_days,
            "recorded interaction"
        );

        let updated = memory.clone();
        profile
            .concept_memories
            .insert(updated.concept_id.clone(), updated.clone());
        if let Some(session) = profile.active_session.as_mut() {
            session.observe(interaction);
        }
        Ok(updated)
    }

    /// Declare that `prerequisite` must be learned before `concept_id`.
    ///
    /// Both memories are created if missing so the edge survives even before
    /// the learner has seen either concept. Returns `false` if the edge
    /// already existed.
    pub fn link_prerequisite(
        &self,
        profile: &mut UserLearningProfile,
        concept_id: &str,
        prerequisite: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, ValidationError> {
        if concept_id.trim().is_empty() || prerequisite.trim().is_empty() {
            return Err(ValidationError::invalid("concept_id", "must not be empty"));
        }
        if concept_id == prerequisite {
            return Err(ValidationError::invalid(
                "prerequisite",
                "a concept cannot be its own prerequisite",
            ));
        }

        let added = {
            let memory = self.placeholder(profile, concept_id, now);
            if memory.prerequisites.iter().any(|p| p == prerequisite) {
                false
            } else {
                memory.prerequisites.push(prerequisite.to_string());
                true
            }
        };
        let prereq = self.placeholder(profile, prerequisite, now);
        if !prereq.dependents.iter().any(|d| d == concept_id) {
            prereq.dependents.push(concept_id.to_string());
        }
        Ok(added)
    }

    /// Record a source material for a concept. Returns `false` if already known.
    pub fn associate_material(
        &self,
        profile: &mut UserLearningProfile,
        concept_id: &str,
        material: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, ValidationError> {
        if concept_id.trim().is_empty() {
            return Err(ValidationError::invalid("concept_id", "must not be empty"));
        }
        let material = material.trim();
        if material.is_empty() {
            return Err(ValidationError::invalid("material", "must not be empty"));
        }
        let memory = self.placeholder(profile, concept_id, now);
        if memory.associated_materials.iter().any(|m| m == material) {
            return Ok(false);
        }
        memory.associated_materials.push(material.to_string());
        Ok(true)
    }

    /// Memory entry for graph/provenance data on a concept with no attempts.
    fn placeholder<'p>(
        &self,
        profile: &'p mut UserLearningProfile,
        concept_id: &str,
        now: DateTime<Utc>,
    ) -> &'p mut ConceptMemory {
        profile
            .concept_memories
            .entry(concept_id.to_string())
            .or_insert_with(|| ConceptMemory {
                concept_id: concept_id.to_string(),
                concept_name: concept_id.to_string(),
                knowledge_state: KnowledgeState::Unknown,
                memory_strength: self.model.initial_strength,
                decay_rate: self.model.initial_decay_rate,
                difficulty_adjustment: self.model.initial_difficulty,
                first_exposure: now,
                last_review: now,
                next_review: now,
                ..ConceptMemory::default()
            })
    }

    /// Open a session; an already open one is closed first and returned.
    pub fn start_session(
        &self,
        profile: &mut UserLearningProfile,
        session_type: SessionType,
        objectives: Vec<String>,
        now: DateTime<Utc>,
    ) -> Option<LearningSession> {
        let closed = self.end_session(profile, now);
        let session = ActiveSession::start(session_type, objectives, now);
        info!(user = %profile.user_id, session = %session.session_id, "session started");
        profile.active_session = Some(session);
        closed
    }

    /// Close the open session, if any, and append it to the history.
    pub fn end_session(
        &self,
        profile: &mut UserLearningProfile,
        now: DateTime<Utc>,
    ) -> Option<LearningSession> {
        let active = profile.active_session.take()?;
        let record = active.finish(now);
        info!(
            user = %profile.user_id,
            session = %record.session_id,
            attempts = record.performance_summary.attempts,
            "session ended"
        );
        profile.learning_history.push(record.clone());
        Some(record)
    }
}

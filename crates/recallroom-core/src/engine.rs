//! Services tying the pure scheduling code to storage.
//!
//! [`MemoryEngine`] runs every learner operation as one unit of work:
//! lock the learner, load the profile, apply the change, save. [`CardDeck`]
//! does the same for flip-cards stored in a [`CardDb`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cards::{
    interleave_by_theme, Card, CardDraft, CardScheduler, CardValidator, PlanEntry, Rejection,
    ReviewQuality, StudyPlanner,
};
use crate::error::{CoreError, Result, StorageError, ValidationError};
use crate::memory::{
    ActiveSession, AnalyticsAggregator, AnalyticsOutcome, ConceptMemory, ContextualMemory,
    DueConcept, DueConceptSelector, Interaction, LearningPath, LearningPathPlanner,
    LearningSession, SessionType, UserLearningProfile,
};
use crate::storage::{CardDb, Config, ProfileStore};

/// Partial update of a learner's personal settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreferenceUpdate {
    pub optimal_session_length: Option<u32>,
    pub preferred_review_time: Option<String>,
    pub learning_style_preferences: Option<Vec<String>>,
    pub peak_performance_times: Option<Vec<String>>,
    pub current_cognitive_load: Option<f64>,
    pub learning_goals: Option<Vec<String>>,
}

impl PreferenceUpdate {
    fn apply(self, profile: &mut UserLearningProfile) -> std::result::Result<(), ValidationError> {
        if let Some(minutes) = self.optimal_session_length {
            if minutes == 0 {
                return Err(ValidationError::invalid("optimal_session_length", "must be positive"));
            }
            profile.optimal_session_length = minutes;
        }
        if let Some(load) = self.current_cognitive_load {
            if !load.is_finite() || !(0.0..=1.0).contains(&load) {
                return Err(ValidationError::OutOfRange {
                    field: "current_cognitive_load".into(),
                    value: load,
                    min: 0.0,
                    max: 1.0,
                });
            }
            profile.current_cognitive_load = load;
        }
        if let Some(time) = self.preferred_review_time {
            profile.preferred_review_time = time;
        }
        if let Some(styles) = self.learning_style_preferences {
            profile.learning_style_preferences = styles;
        }
        if let Some(times) = self.peak_performance_times {
            profile.peak_performance_times = times;
        }
        if let Some(goals) = self.learning_goals {
            profile.learning_goals = goals;
        }
        Ok(())
    }
}

/// Learner-facing operations over a [`ProfileStore`].
pub struct MemoryEngine<S: ProfileStore> {
    store: S,
    memory: ContextualMemory,
    due: DueConceptSelector,
    planner: LearningPathPlanner,
    analytics: AnalyticsAggregator,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl<S: ProfileStore> MemoryEngine<S> {
    /// Engine with default model constants.
    pub fn new(store: S) -> Self {
        Self::from_config(store, &Config::default())
    }

    pub fn from_config(store: S, config: &Config) -> Self {
        Self {
            store,
            memory: ContextualMemory::with_config(config.memory.clone()),
            due: DueConceptSelector::with_weights(config.due.clone()),
            planner: LearningPathPlanner::with_config(config.planner.clone()),
            analytics: AnalyticsAggregator::with_config(config.analytics.clone()),
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn learner_lock(&self, user_id: &str) -> Result<Arc<Mutex<()>>> {
        if user_id.trim().is_empty() {
            return Err(ValidationError::invalid("user_id", "must not be empty").into());
        }
        let mut locks = self.locks.lock().map_err(|_| StorageError::Locked)?;
        Ok(locks.entry(user_id.to_string()).or_default().clone())
    }

    /// Drop the learner's lock entry once nobody else holds it.
    fn release(&self, user_id: &str) {
        if let Ok(mut locks) = self.locks.lock() {
            if locks.get(user_id).is_some_and(|l| Arc::strong_count(l) == 1) {
                locks.remove(user_id);
            }
        }
    }

    /// Run `f` while holding the learner's lock.
    fn exclusive<T>(&self, user_id: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let lock = self.learner_lock(user_id)?;
        let out = match lock.lock() {
            Ok(_guard) => f(),
            Err(_) => Err(StorageError::Locked.into()),
        };
        drop(lock);
        self.release(user_id);
        out
    }

    /// Lock, load, mutate and save one learner's profile.
    ///
    /// Nothing is written when `f` fails or leaves the profile unchanged.
    fn mutate<T>(
        &self,
        user_id: &str,
        f: impl FnOnce(&ContextualMemory, &mut UserLearningProfile) -> Result<T>,
    ) -> Result<T> {
        self.exclusive(user_id, || {
            let mut profile = self.store.load(user_id)?;
            let before = profile.clone();
            let out = f(&self.memory, &mut profile)?;
            if profile != before {
                self.store.save(&mut profile)?;
            }
            Ok(out)
        })
    }

    fn read<T>(&self, user_id: &str, f: impl FnOnce(&UserLearningProfile) -> T) -> Result<T> {
        self.exclusive(user_id, || {
            let profile = self.store.load(user_id)?;
            Ok(f(&profile))
        })
    }

    #[cfg(test)]
    fn tracked_learners(&self) -> usize {
        self.locks.lock().map(|locks| locks.len()).unwrap_or(0)
    }

    pub fn record_interaction(
        &self,
        user_id: &str,
        interaction: &Interaction,
        now: DateTime<Utc>,
    ) -> Result<ConceptMemory> {
        self.mutate(user_id, |memory, profile| {
            Ok(memory.record_interaction(profile, interaction, now)?)
        })
    }

    /// Due concepts ranked by urgency. `None` uses the configured batch size.
    pub fn due_concepts(
        &self,
        user_id: &str,
        max_count: Option<usize>,
        now: DateTime<Utc>,
    ) -> Result<Vec<DueConcept>> {
        self.read(user_id, |profile| self.due.select(profile, max_count, now))
    }

    pub fn optimize_path(&self, user_id: &str, target_concepts: &[String]) -> Result<LearningPath> {
        if target_concepts.iter().all(|t| t.trim().is_empty()) {
            return Err(ValidationError::EmptyCollection("target_concepts".into()).into());
        }
        self.read(user_id, |profile| self.planner.optimize(profile, target_concepts))
    }

    pub fn analytics(&self, user_id: &str, now: DateTime<Utc>) -> Result<AnalyticsOutcome> {
        self.read(user_id, |profile| self.analytics.generate(profile, now))
    }

    pub fn link_prerequisite(
        &self,
        user_id: &str,
        concept_id: &str,
        prerequisite: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.mutate(user_id, |memory, profile| {
            Ok(memory.link_prerequisite(profile, concept_id, prerequisite, now)?)
        })
    }

    pub fn associate_material(
        &self,
        user_id: &str,
        concept_id: &str,
        material: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.mutate(user_id, |memory, profile| {
            Ok(memory.associate_material(profile, concept_id, material, now)?)
        })
    }

    /// Open a session. A session that was still open is closed and returned
    /// alongside the new one.
    pub fn start_session(
        &self,
        user_id: &str,
        session_type: SessionType,
        objectives: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<(ActiveSession, Option<LearningSession>)> {
        self.mutate(user_id, |memory, profile| {
            let closed = memory.start_session(profile, session_type, objectives, now);
            let active = profile
                .active_session
                .clone()
                .ok_or_else(|| ValidationError::invalid("session", "failed to open"))?;
            Ok((active, closed))
        })
    }

    pub fn end_session(&self, user_id: &str, now: DateTime<Utc>) -> Result<Option<LearningSession>> {
        self.mutate(user_id, |memory, profile| Ok(memory.end_session(profile, now)))
    }

    pub fn profile(&self, user_id: &str) -> Result<UserLearningProfile> {
        self.read(user_id, UserLearningProfile::clone)
    }

    pub fn update_preferences(
        &self,
        user_id: &str,
        update: PreferenceUpdate,
    ) -> Result<UserLearningProfile> {
        self.mutate(user_id, |_, profile| {
            update.apply(profile)?;
            info!(user = user_id, "preferences updated");
            Ok(profile.clone())
        })
    }
}

/// Outcome of importing generated card drafts.
#[derive(Debug, Clone, Default)]
pub struct ImportReport {
    pub imported: Vec<Card>,
    pub rejected: Vec<Rejection>,
}

/// Flip-card operations over a [`CardDb`].
pub struct CardDeck {
    db: CardDb,
    scheduler: CardScheduler,
    planner: StudyPlanner,
}

impl CardDeck {
    pub fn new(db: CardDb) -> Self {
        Self::from_config(db, &Config::default())
    }

    pub fn from_config(db: CardDb, config: &Config) -> Self {
        Self {
            db,
            scheduler: CardScheduler::with_config(config.cards.clone()),
            planner: config.study_plan.clone(),
        }
    }

    pub fn db(&self) -> &CardDb {
        &self.db
    }

    /// A card due `today` with this deck's initial ease; not yet stored.
    pub fn new_card(&self, front: impl Into<String>, back: impl Into<String>, today: NaiveDate) -> Card {
        self.scheduler.new_card(front, back, today)
    }

    pub fn add(&self, card: Card) -> Result<Card> {
        if card.front.trim().is_empty() || card.back.trim().is_empty() {
            return Err(ValidationError::invalid("card", "front and back must not be empty").into());
        }
        self.db.insert(&card)?;
        Ok(card)
    }

    /// Validate drafts against each other and the stored deck, then store
    /// the accepted ones in one transaction.
    pub fn import(&self, drafts: Vec<CardDraft>, today: NaiveDate) -> Result<ImportReport> {
        let existing = self.db.list()?;
        let mut validator = CardValidator::with_existing(&existing);
        let outcome = validator.validate_batch(drafts);

        let cards: Vec<Card> = outcome
            .accepted
            .into_iter()
            .map(|draft| draft.into_card(&self.scheduler, today))
            .collect();
        self.db.insert_many(&cards)?;
        info!(imported = cards.len(), rejected = outcome.rejected.len(), "cards imported");
        Ok(ImportReport {
            imported: cards,
            rejected: outcome.rejected,
        })
    }

    /// Due cards, optionally reordered so themes alternate.
    pub fn due(&self, today: NaiveDate, interleave: bool) -> Result<Vec<Card>> {
        let due = self.db.list_due(today)?;
        Ok(if interleave { interleave_by_theme(due) } else { due })
    }

    /// Apply a review to a stored card and persist the new schedule.
    pub fn review(&self, card_id: &str, quality: ReviewQuality, today: NaiveDate) -> Result<Card> {
        let card = self
            .db
            .get(card_id)?
            .ok_or_else(|| CoreError::CardNotFound(card_id.to_string()))?;
        let updated = self.scheduler.update_review(&card, quality, today);
        self.db.update_schedule(&updated)?;
        debug!(card = card_id, quality = quality.value(), interval = updated.interval, "card reviewed");
        Ok(updated)
    }

    pub fn plan(&self, start: NaiveDate) -> Result<Vec<PlanEntry>> {
        let cards = self.db.list()?;
        Ok(self.planner.generate(&cards, start))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cards::CardKind;
    use crate::storage::MemoryProfileStore;

    fn engine() -> MemoryEngine<MemoryProfileStore> {
        MemoryEngine::new(MemoryProfileStore::new())
    }

    #[test]
    fn record_persists_and_bumps_revision() {
        let engine = engine();
        let now = Utc::now();
        engine
            .record_interaction("ana", &Interaction::new("c", "C", true), now)
            .unwrap();
        engine
            .record_interaction("ana", &Interaction::new("c", "C", false), now)
            .unwrap();

        let profile = engine.profile("ana").unwrap();
        assert_eq!(profile.revision, 2);
        assert_eq!(profile.concept("c").unwrap().total_attempts, 2);
    }

    #[test]
    fn learner_locks_are_released_after_use() {
        let engine = engine();
        let now = Utc::now();
        let ix = Interaction::new("c", "C", true);
        for user in ["ana", "bo", "cy"] {
            engine.record_interaction(user, &ix, now).unwrap();
            engine.profile(user).unwrap();
        }
        let bad = Interaction::new("c", "C", true).with_confidence(2.0);
        assert!(engine.record_interaction("dee", &bad, now).is_err());
        assert_eq!(engine.tracked_learners(), 0);

        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| engine.record_interaction("ana", &ix, now).unwrap());
            }
        });
        assert_eq!(engine.tracked_learners(), 0);
        assert_eq!(engine.profile("ana").unwrap().concept("c").unwrap().total_attempts, 5);
    }

    #[test]
    fn failed_operations_do_not_write() {
        let engine = engine();
        let bad = Interaction::new("c", "C", true).with_confidence(-0.1);
        let err = engine.record_interaction("ana", &bad, Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(engine.store().list_users().unwrap().is_empty());
    }

    #[test]
    fn reads_and_no_ops_do_not_write() {
        let engine = engine();
        let now = Utc::now();
        engine.due_concepts("ana", None, now).unwrap();
        engine.end_session("ana", now).unwrap();
        assert_eq!(engine.profile("ana").unwrap().revision, 0);
    }

    #[test]
    fn empty_user_is_rejected() {
        assert!(engine().profile(" ").is_err());
    }

    #[test]
    fn empty_targets_are_rejected() {
        let err = engine().optimize_path("ana", &[]).unwrap_err();
        assert!(matches!(err, CoreError::Validation(ValidationError::EmptyCollection(_))));
    }

    #[test]
    fn session_lifecycle() {
        let engine = engine();
        let now = Utc::now();
        let (active, closed) = engine
            .start_session("ana", SessionType::Review, vec!["loops".into()], now)
            .unwrap();
        assert!(closed.is_none());
        engine
            .record_interaction("ana", &Interaction::new("loops", "Loops", true), now)
            .unwrap();
        let record = engine.end_session("ana", now).unwrap().unwrap();
        assert_eq!(record.session_id, active.session_id);
        assert_eq!(record.concepts_studied, vec!["loops"]);
        assert_eq!(engine.profile("ana").unwrap().learning_history.len(), 1);
    }

    #[test]
    fn preferences_are_validated() {
        let engine = engine();
        let updated = engine
            .update_preferences(
                "ana",
                PreferenceUpdate {
                    current_cognitive_load: Some(0.9),
                    learning_goals: Some(vec!["rust".into()]),
                    ..PreferenceUpdate::default()
                },
            )
            .unwrap();
        assert_eq!(updated.current_cognitive_load, 0.9);

        let err = engine.update_preferences(
            "ana",
            PreferenceUpdate {
                current_cognitive_load: Some(1.5),
                ..PreferenceUpdate::default()
            },
        );
        assert!(err.is_err());
        assert_eq!(engine.profile("ana").unwrap().current_cognitive_load, 0.9);
    }

    #[test]
    fn deck_review_and_missing_card() {
        let deck = CardDeck::new(CardDb::open_memory().unwrap());
        let today = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        let card = deck.add(Card::new("Q", "A", today)).unwrap();

        let q = ReviewQuality::new(4).unwrap();
        let reviewed = deck.review(&card.id, q, today).unwrap();
        assert_eq!(reviewed.interval, 1);
        assert!(deck.due(today, false).unwrap().is_empty());

        assert!(matches!(
            deck.review("missing", q, today),
            Err(CoreError::CardNotFound(_))
        ));
    }

    #[test]
    fn deck_import_dedupes_against_stored_cards() {
        let deck = CardDeck::new(CardDb::open_memory().unwrap());
        let today = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();
        deck.add(Card::new("Q1", "A1", today)).unwrap();

        let draft = |front: &str, back: &str| CardDraft {
            front: front.into(),
            kind: CardKind::QuestionAnswer { back: back.into() },
            theme: Some("T".into()),
            level: 1,
        };
        let report = deck
            .import(vec![draft("Q1", "A1"), draft("Q2", "A2")], today)
            .unwrap();
        assert_eq!(report.imported.len(), 1);
        assert_eq!(report.rejected.len(), 1);
        assert_eq!(deck.db().count().unwrap(), 2);
    }

    #[test]
    fn deck_cards_start_at_configured_ease() {
        let mut config = Config::default();
        config.cards.initial_ease = 2.0;
        let deck = CardDeck::from_config(CardDb::open_memory().unwrap(), &config);
        let today = NaiveDate::from_ymd_opt(2025, 5, 1).unwrap();

        let added = deck.add(deck.new_card("Q1", "A1", today)).unwrap();
        assert_eq!(added.ease_factor, 2.0);

        let draft = CardDraft {
            front: "Q2".into(),
            kind: CardKind::QuestionAnswer { back: "A2".into() },
            theme: None,
            level: 1,
        };
        let report = deck.import(vec![draft], today).unwrap();
        assert_eq!(report.imported[0].ease_factor, 2.0);

        let stored = deck.db().get(&report.imported[0].id).unwrap().unwrap();
        assert_eq!(stored.ease_factor, 2.0);
    }
}

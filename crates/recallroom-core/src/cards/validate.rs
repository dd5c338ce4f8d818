//! Validation of candidate cards before they enter a deck.
//!
//! Drafts come from an external content generator. Each one is checked for
//! shape and size, then deduplicated against a seen-set owned by the
//! [`CardValidator`] instance, so two batches never share state unless the
//! caller passes the same validator.

use std::collections::HashSet;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use unicode_normalization::UnicodeNormalization;

use super::{Card, CardScheduler};
use crate::error::ValidationError;

pub const MAX_FRONT_CHARS: usize = 200;
pub const MAX_BACK_CHARS: usize = 420;
pub const MAX_SENTENCE_WORDS: usize = 18;
const CLOZE_GAP: &str = "____";

fn default_level() -> u32 {
    1
}

/// Shape-specific part of a draft.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CardKind {
    QuestionAnswer { back: String },
    MultipleChoice { options: Vec<String>, answer: String },
    TrueFalse { answer: bool },
    Cloze { answer: String },
    ShortAnswer { answer: String },
}

/// A candidate card as produced by a content generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardDraft {
    pub front: String,
    #[serde(flatten)]
    pub kind: CardKind,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default = "default_level")]
    pub level: u32,
}

impl CardDraft {
    /// The text shown on the back of the resulting card.
    pub fn answer_text(&self) -> String {
        match &self.kind {
            CardKind::QuestionAnswer { back } => back.clone(),
            CardKind::MultipleChoice { answer, .. }
            | CardKind::Cloze { answer }
            | CardKind::ShortAnswer { answer } => answer.clone(),
            CardKind::TrueFalse { answer } => answer.to_string(),
        }
    }

    pub fn into_card(self, scheduler: &CardScheduler, today: NaiveDate) -> Card {
        let back = self.answer_text();
        let mut card = scheduler.new_card(self.front, back, today).with_level(self.level);
        card.theme = self.theme;
        card
    }
}

/// A draft that failed validation, by position in the submitted batch.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub index: usize,
    pub reason: ValidationError,
}

#[derive(Debug, Clone, Default)]
pub struct BatchOutcome {
    pub accepted: Vec<CardDraft>,
    pub rejected: Vec<Rejection>,
}

fn words_per_sentence(text: &str) -> impl Iterator<Item = usize> + '_ {
    text.split(|c: char| matches!(c, '.' | '!' | '?'))
        .filter(|s| !s.trim().is_empty())
        .map(|s| s.split_whitespace().count())
}

/// Lowercased, with accents stripped and anything outside ASCII dropped.
fn normalize_answer(text: &str) -> String {
    text.nfd()
        .filter(char::is_ascii)
        .collect::<String>()
        .trim()
        .to_lowercase()
}

/// Content hash used for duplicate detection.
pub fn dedupe_key(front: &str, back: &str) -> String {
    let base = format!("{front}|{back}").trim().to_lowercase();
    hex::encode(Sha256::digest(base.as_bytes()))
}

/// Validates drafts and remembers which ones it has already accepted.
#[derive(Debug, Clone, Default)]
pub struct CardValidator {
    seen: HashSet<String>,
}

impl CardValidator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the seen-set from cards already stored in a deck.
    pub fn with_existing<'a>(cards: impl IntoIterator<Item = &'a Card>) -> Self {
        let seen = cards
            .into_iter()
            .map(|c| dedupe_key(&c.front, &c.back))
            .collect();
        Self { seen }
    }

    pub fn seen_count(&self) -> usize {
        self.seen.len()
    }

    fn check_front(front: &str) -> Result<(), ValidationError> {
        if front.trim().is_empty() {
            return Err(ValidationError::invalid("front", "must not be empty"));
        }
        if front.chars().count() > MAX_FRONT_CHARS {
            return Err(ValidationError::invalid(
                "front",
                format!("longer than {MAX_FRONT_CHARS} characters"),
            ));
        }
        if words_per_sentence(front).any(|n| n > MAX_SENTENCE_WORDS) {
            return Err(ValidationError::invalid(
                "front",
                format!("sentence longer than {MAX_SENTENCE_WORDS} words"),
            ));
        }
        Ok(())
    }

    fn check_kind(draft: &CardDraft) -> Result<(), ValidationError> {
        match &draft.kind {
            CardKind::QuestionAnswer { back } => {
                if back.trim().is_empty() || back.chars().count() > MAX_BACK_CHARS {
                    return Err(ValidationError::invalid(
                        "back",
                        format!("must be 1..={MAX_BACK_CHARS} characters"),
                    ));
                }
            }
            CardKind::MultipleChoice { options, answer } => {
                let distinct: HashSet<&String> = options.iter().collect();
                let hits = options.iter().filter(|o| *o == answer).count();
                if options.len() != 4 || distinct.len() != 4 || hits != 1 {
                    return Err(ValidationError::invalid(
                        "options",
                        "expected 4 distinct options containing the answer once",
                    ));
                }
            }
            CardKind::TrueFalse { .. } => {}
            CardKind::Cloze { answer } => {
                if draft.front.matches(CLOZE_GAP).count() != 1 {
                    return Err(ValidationError::invalid(
                        "front",
                        format!("cloze needs exactly one '{CLOZE_GAP}' gap"),
                    ));
                }
                if normalize_answer(answer).is_empty() {
                    return Err(ValidationError::invalid("answer", "cloze answer is empty"));
                }
            }
            CardKind::ShortAnswer { answer } => {
                if answer.trim().is_empty() {
                    return Err(ValidationError::invalid("answer", "must not be empty"));
                }
            }
        }
        Ok(())
    }

    /// Validate one draft and record it as seen on success.
    pub fn validate(&mut self, draft: &CardDraft) -> Result<(), ValidationError> {
        Self::check_front(&draft.front)?;
        Self::check_kind(draft)?;

        let answer = match &draft.kind {
            CardKind::Cloze { answer } => normalize_answer(answer),
            _ => draft.answer_text(),
        };
        let key = dedupe_key(&draft.front, &answer);
        if !self.seen.insert(key) {
            return Err(ValidationError::Duplicate("card".into()));
        }
        Ok(())
    }

    /// Split a batch into accepted drafts and rejections.
    pub fn validate_batch(&mut self, drafts: Vec<CardDraft>) -> BatchOutcome {
        let mut outcome = BatchOutcome::default();
        for (index, draft) in drafts.into_iter().enumerate() {
            match self.validate(&draft) {
                Ok(()) => outcome.accepted.push(draft),
                Err(reason) => outcome.rejected.push(Rejection { index, reason }),
            }
        }
        outcome
    }
}

//! SM-2 scheduling for simple flip-cards.
//!
//! Quality ratings (0-5):
//! - 0-2: failed recall, the card starts over
//! - 3: correct with serious difficulty
//! - 4: correct after hesitation
//! - 5: perfect response
//!
//! The scheduler is a pure function over card state: it never touches
//! storage and takes `today` from the caller.

mod interleave;
mod plan;
mod validate;

pub use interleave::{interleave_by_theme, Themed, DEFAULT_THEME};
pub use plan::{PlanEntry, StudyPlanner};
pub use validate::{dedupe_key, BatchOutcome, CardDraft, CardKind, CardValidator, Rejection};

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// A review quality score, guaranteed to be within 0..=5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ReviewQuality(u8);

impl ReviewQuality {
    pub const MAX: u8 = 5;

    /// Validate a raw quality score.
    pub fn new(value: u8) -> Result<Self, ValidationError> {
        if value > Self::MAX {
            return Err(ValidationError::OutOfRange {
                field: "quality".into(),
                value: value as f64,
                min: 0.0,
                max: Self::MAX as f64,
            });
        }
        Ok(Self(value))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for ReviewQuality {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        let raw = u8::try_from(value).map_err(|_| ValidationError::OutOfRange {
            field: "quality".into(),
            value: value as f64,
            min: 0.0,
            max: Self::MAX as f64,
        })?;
        Self::new(raw)
    }
}

/// Tunable SM-2 constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Sm2Config {
    pub initial_ease: f64,
    pub min_ease: f64,
    pub max_ease: f64,
    /// Qualities below this reset the card.
    pub pass_threshold: u8,
    /// Interval after the second consecutive successful review.
    pub second_interval: u32,
    /// Upper bound on any interval so dates stay representable.
    pub max_interval_days: u32,
}

impl Default for Sm2Config {
    fn default() -> Self {
        Self {
            initial_ease: 2.5,
            min_ease: 1.3,
            max_ease: 2.8,
            pass_threshold: 3,
            second_interval: 6,
            max_interval_days: 36_500,
        }
    }
}

fn default_level() -> u32 {
    1
}

/// A flip-card and its scheduling state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub front: String,
    pub back: String,
    #[serde(default)]
    pub theme: Option<String>,
    #[serde(default = "default_level")]
    pub level: u32,
    pub ease_factor: f64,
    /// Days until the next review.
    pub interval: u32,
    pub repetitions: u32,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub last_reviewed: Option<NaiveDate>,
}

impl Card {
    /// Create a card due today with default scheduling state.
    pub fn new(front: impl Into<String>, back: impl Into<String>, today: NaiveDate) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            front: front.into(),
            back: back.into(),
            theme: None,
            level: default_level(),
            ease_factor: Sm2Config::default().initial_ease,
            interval: 1,
            repetitions: 0,
            due_date: today,
            last_reviewed: None,
        }
    }

    pub fn with_theme(mut self, theme: impl Into<String>) -> Self {
        self.theme = Some(theme.into());
        self
    }

    pub fn with_level(mut self, level: u32) -> Self {
        self.level = level;
        self
    }

    pub fn is_due(&self, today: NaiveDate) -> bool {
        self.due_date <= today
    }
}

/// SM-2 scheduler for flip-cards.
#[derive(Debug, Clone, Default)]
pub struct CardScheduler {
    config: Sm2Config,
}

impl CardScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: Sm2Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Sm2Config {
        &self.config
    }

    /// A fresh card starting at the configured ease.
    pub fn new_card(&self, front: impl Into<String>, back: impl Into<String>, today: NaiveDate) -> Card {
        let mut card = Card::new(front, back, today);
        card.ease_factor = self.config.initial_ease;
        card
    }

    /// Apply one review and return the updated card.
    pub fn update_review(&self, card: &Card, quality: ReviewQuality, today: NaiveDate) -> Card {
        let cfg = &self.config;
        let q = quality.value();
        let mut next = card.clone();

        if q < cfg.pass_threshold {
            next.repetitions = 0;
            next.interval = 1;
        } else {
            next.repetitions = card.repetitions.saturating_add(1);
            next.interval = match next.repetitions {
                1 => 1,
                2 => cfg.second_interval,
                _ => {
                    let grown = (card.interval.max(1) as f64 * card.ease_factor).round();
                    grown.clamp(1.0, cfg.max_interval_days as f64) as u32
                }
            };

            let miss = (5 - q) as f64;
            let ease = card.ease_factor + (0.1 - miss * (0.08 + miss * 0.02));
            next.ease_factor = ease.clamp(cfg.min_ease, cfg.max_ease);
        }

        next.interval = next.interval.clamp(1, cfg.max_interval_days.max(1));
        next.due_date = today
            .checked_add_days(Days::new(next.interval as u64))
            .unwrap_or(NaiveDate::MAX);
        next.last_reviewed = Some(today);
        next
    }

    /// Cards due on or before `today`, in input order.
    pub fn due_cards<'a>(&self, cards: &'a [Card], today: NaiveDate) -> Vec<&'a Card> {
        cards.iter().filter(|c| c.is_due(today)).collect()
    }
}

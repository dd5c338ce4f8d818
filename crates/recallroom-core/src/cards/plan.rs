//! Fixed-offset study plan for a freshly imported deck.
//!
//! Cards are spread over a study cycle, theme by theme and easiest level
//! first, and every study day is followed by review days at fixed offsets.

use std::collections::{BTreeMap, HashMap};

use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use super::interleave::DEFAULT_THEME;
use super::Card;

/// One scheduled study or review of a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub card_id: String,
    pub date: NaiveDate,
    pub theme: String,
    pub level: u32,
    /// `false` for the first study of the card.
    pub review: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StudyPlanner {
    /// Day offsets after the study day; 0 is the study itself.
    pub review_offsets: Vec<u32>,
    pub cycle_days: u32,
}

impl Default for StudyPlanner {
    fn default() -> Self {
        Self {
            review_offsets: vec![0, 2, 5],
            cycle_days: 7,
        }
    }
}

impl StudyPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the plan, sorted by date.
    pub fn generate(&self, cards: &[Card], start: NaiveDate) -> Vec<PlanEntry> {
        let mut order: Vec<String> = Vec::new();
        let mut grouped: HashMap<String, BTreeMap<u32, Vec<&Card>>> = HashMap::new();
        for card in cards {
            let theme = card
                .theme
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(DEFAULT_THEME)
                .to_string();
            if !grouped.contains_key(&theme) {
                order.push(theme.clone());
            }
            grouped
                .entry(theme)
                .or_default()
                .entry(card.level)
                .or_default()
                .push(card);
        }

        let cycle = self.cycle_days.max(1) as u64;
        let mut plan = Vec::with_capacity(cards.len() * self.review_offsets.len());
        let mut idx: u64 = 0;
        for theme in &order {
            let Some(levels) = grouped.get(theme) else {
                continue;
            };
            for (level, bucket) in levels {
                for card in bucket {
                    let base_day = start + Days::new(idx % cycle);
                    for &offset in &self.review_offsets {
                        plan.push(PlanEntry {
                            card_id: card.id.clone(),
                            date: base_day + Days::new(offset as u64),
                            theme: theme.clone(),
                            level: *level,
                            review: offset != 0,
                        });
                    }
                    idx += 1;
                }
            }
        }

        plan.sort_by_key(|e| e.date);
        plan
    }
}

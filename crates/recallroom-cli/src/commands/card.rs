//! Flip-card commands for CLI.

use std::path::PathBuf;

use clap::Subcommand;
use recallroom_core::{CardDraft, ReviewQuality};
use serde_json::json;

use super::{open_deck, parse_date, print_json, CmdResult};

#[derive(Subcommand)]
pub enum CardAction {
    /// Add a single card, due today
    Add {
        /// Prompt side
        front: String,
        /// Answer side
        back: String,
        /// Theme used for interleaving and planning
        #[arg(long)]
        theme: Option<String>,
        /// Difficulty level (default: 1)
        #[arg(long, default_value = "1")]
        level: u32,
    },
    /// Import generated card drafts from a JSON array
    Import {
        /// Path to the JSON file
        file: PathBuf,
    },
    /// List every card
    List,
    /// Cards due on a date
    Due {
        /// Date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
        /// Alternate themes in the output
        #[arg(long)]
        interleave: bool,
    },
    /// Record a review with SM-2 quality 0-5
    Review {
        /// Card ID
        id: String,
        /// Recall quality, 0 (blackout) to 5 (perfect)
        quality: u8,
        /// Review date (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        date: Option<String>,
    },
    /// Fixed-offset study plan for the whole deck
    Plan {
        /// First study day (YYYY-MM-DD, defaults to today)
        #[arg(long)]
        start: Option<String>,
    },
}

pub fn run(action: CardAction) -> CmdResult {
    let deck = open_deck()?;

    match action {
        CardAction::Add {
            front,
            back,
            theme,
            level,
        } => {
            let mut card = deck.new_card(front, back, parse_date(None)?).with_level(level);
            card.theme = theme;
            let card = deck.add(card)?;
            print_json(&card)?;
        }
        CardAction::Import { file } => {
            let content = std::fs::read_to_string(&file)
                .map_err(|e| format!("{}: {e}", file.display()))?;
            let drafts: Vec<CardDraft> = serde_json::from_str(&content)?;
            let report = deck.import(drafts, parse_date(None)?)?;
            let rejected: Vec<_> = report
                .rejected
                .iter()
                .map(|r| json!({ "index": r.index, "reason": r.reason.to_string() }))
                .collect();
            print_json(&json!({ "imported": report.imported, "rejected": rejected }))?;
        }
        CardAction::List => {
            print_json(&deck.db().list()?)?;
        }
        CardAction::Due { date, interleave } => {
            let today = parse_date(date.as_deref())?;
            print_json(&deck.due(today, interleave)?)?;
        }
        CardAction::Review { id, quality, date } => {
            let quality = ReviewQuality::new(quality)?;
            let card = deck.review(&id, quality, parse_date(date.as_deref())?)?;
            print_json(&card)?;
        }
        CardAction::Plan { start } => {
            print_json(&deck.plan(parse_date(start.as_deref())?)?)?;
        }
    }
    Ok(())
}

//! Learner profile commands for CLI.

use std::path::PathBuf;

use clap::Subcommand;
use recallroom_core::storage::import_legacy_profiles;
use recallroom_core::{PreferenceUpdate, ProfileStore};
use serde_json::json;

use super::{print_json, split_list, CmdResult, Context};

#[derive(Subcommand)]
pub enum ProfileAction {
    /// Print the whole learner profile
    Show,
    /// List stored learners
    List,
    /// Update personal preferences
    Set {
        /// Preferred session length in minutes
        #[arg(long)]
        session_length: Option<u32>,
        /// Preferred review time of day (e.g. "morning")
        #[arg(long)]
        review_time: Option<String>,
        /// Comma-separated learning styles
        #[arg(long)]
        styles: Option<String>,
        /// Comma-separated peak performance times
        #[arg(long)]
        peak_times: Option<String>,
        /// Current cognitive load, 0.0 to 1.0
        #[arg(long)]
        load: Option<f64>,
        /// Comma-separated learning goals
        #[arg(long)]
        goals: Option<String>,
    },
    /// Import learners from a legacy JSON database
    ImportLegacy {
        /// Path to the legacy file
        file: PathBuf,
    },
}

pub fn run(user: Option<String>, action: ProfileAction) -> CmdResult {
    let ctx = Context::load(user)?;

    match action {
        ProfileAction::Show => {
            let engine = ctx.engine()?;
            print_json(&engine.profile(&ctx.user)?)?;
        }
        ProfileAction::List => {
            print_json(&ctx.store()?.list_users()?)?;
        }
        ProfileAction::Set {
            session_length,
            review_time,
            styles,
            peak_times,
            load,
            goals,
        } => {
            let update = PreferenceUpdate {
                optimal_session_length: session_length,
                preferred_review_time: review_time,
                learning_style_preferences: styles.as_deref().map(split_list),
                peak_performance_times: peak_times.as_deref().map(split_list),
                current_cognitive_load: load,
                learning_goals: goals.as_deref().map(split_list),
            };
            let engine = ctx.engine()?;
            print_json(&engine.update_preferences(&ctx.user, update)?)?;
        }
        ProfileAction::ImportLegacy { file } => {
            let store = ctx.store()?;
            let imported = import_legacy_profiles(store.as_ref(), &file, &ctx.config.memory)?;
            print_json(&json!({ "imported": imported }))?;
        }
    }
    Ok(())
}

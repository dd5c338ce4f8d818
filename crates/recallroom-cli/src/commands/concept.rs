//! Concept memory commands for CLI.

use clap::Subcommand;
use recallroom_core::Interaction;
use serde_json::json;

use super::{parse_time, print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum ConceptAction {
    /// Record one answer for a concept
    Record {
        /// Concept ID
        concept_id: String,
        /// Display name (defaults to the ID)
        #[arg(long)]
        name: Option<String>,
        /// The answer was wrong
        #[arg(long)]
        wrong: bool,
        /// Response time in seconds
        #[arg(long)]
        response_time: Option<f64>,
        /// Self-reported confidence, 0.0 to 1.0
        #[arg(long)]
        confidence: Option<f64>,
        /// Where the concept was met
        #[arg(long)]
        context: Option<String>,
        /// Interaction time (RFC 3339, defaults to now)
        #[arg(long)]
        at: Option<String>,
    },
    /// Concepts due for review, most urgent first
    Due {
        /// Maximum number of concepts (defaults to the config value)
        #[arg(long)]
        limit: Option<usize>,
        /// Reference time (RFC 3339, defaults to now)
        #[arg(long)]
        at: Option<String>,
    },
    /// Prerequisite-ordered study sessions for target concepts
    Path {
        /// Target concept IDs
        #[arg(required = true)]
        targets: Vec<String>,
    },
    /// Declare that a concept depends on another
    Link {
        /// Dependent concept ID
        concept_id: String,
        /// Prerequisite concept ID
        prerequisite: String,
    },
    /// Attach a study material reference to a concept
    Material {
        /// Concept ID
        concept_id: String,
        /// Material reference (path, URL or title)
        material: String,
    },
}

pub fn run(user: Option<String>, action: ConceptAction) -> CmdResult {
    let ctx = Context::load(user)?;
    let engine = ctx.engine()?;

    match action {
        ConceptAction::Record {
            concept_id,
            name,
            wrong,
            response_time,
            confidence,
            context,
            at,
        } => {
            let name = name.unwrap_or_else(|| concept_id.clone());
            let mut interaction = Interaction::new(concept_id, name, !wrong);
            if let Some(seconds) = response_time {
                interaction = interaction.with_response_time(seconds);
            }
            if let Some(c) = confidence {
                interaction = interaction.with_confidence(c);
            }
            if let Some(c) = context {
                interaction = interaction.with_context(c);
            }
            let memory = engine.record_interaction(&ctx.user, &interaction, parse_time(at.as_deref())?)?;
            print_json(&memory)?;
        }
        ConceptAction::Due { limit, at } => {
            let due = engine.due_concepts(&ctx.user, limit, parse_time(at.as_deref())?)?;
            print_json(&due)?;
        }
        ConceptAction::Path { targets } => {
            print_json(&engine.optimize_path(&ctx.user, &targets)?)?;
        }
        ConceptAction::Link {
            concept_id,
            prerequisite,
        } => {
            let added = engine.link_prerequisite(&ctx.user, &concept_id, &prerequisite, parse_time(None)?)?;
            print_json(&json!({ "concept_id": concept_id, "prerequisite": prerequisite, "added": added }))?;
        }
        ConceptAction::Material {
            concept_id,
            material,
        } => {
            let added = engine.associate_material(&ctx.user, &concept_id, &material, parse_time(None)?)?;
            print_json(&json!({ "concept_id": concept_id, "material": material, "added": added }))?;
        }
    }
    Ok(())
}

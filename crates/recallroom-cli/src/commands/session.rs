//! Study session commands for CLI.

use clap::Subcommand;
use recallroom_core::SessionType;
use serde_json::json;

use super::{parse_time, print_json, CmdResult, Context};

#[derive(Subcommand)]
pub enum SessionAction {
    /// Open a session; recorded interactions fold into it
    Start {
        /// Session type: study, review or assessment
        #[arg(long = "type", default_value = "study")]
        session_type: String,
        /// Session objective (repeatable)
        #[arg(long = "objective")]
        objectives: Vec<String>,
    },
    /// Close the open session and add it to the history
    End,
}

pub fn run(user: Option<String>, action: SessionAction) -> CmdResult {
    let ctx = Context::load(user)?;
    let engine = ctx.engine()?;
    let now = parse_time(None)?;

    match action {
        SessionAction::Start {
            session_type,
            objectives,
        } => {
            let session_type: SessionType = session_type.parse()?;
            let (active, closed) = engine.start_session(&ctx.user, session_type, objectives, now)?;
            print_json(&json!({ "active": active, "closed": closed }))?;
        }
        SessionAction::End => match engine.end_session(&ctx.user, now)? {
            Some(session) => print_json(&session)?,
            None => {
                eprintln!("no open session");
                print_json(&serde_json::Value::Null)?;
            }
        },
    }
    Ok(())
}

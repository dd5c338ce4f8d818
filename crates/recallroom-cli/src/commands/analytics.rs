//! Learning analytics command for CLI.

use super::{parse_time, print_json, CmdResult, Context};

pub fn run(user: Option<String>, at: Option<String>) -> CmdResult {
    let ctx = Context::load(user)?;
    let engine = ctx.engine()?;
    let outcome = engine.analytics(&ctx.user, parse_time(at.as_deref())?)?;
    print_json(&outcome)
}

//! Subcommand implementations.
//!
//! Every command prints JSON on stdout; diagnostics go to stderr.

pub mod analytics;
pub mod card;
pub mod concept;
pub mod config;
pub mod profile;
pub mod session;

use std::error::Error;

use chrono::{DateTime, NaiveDate, Utc};
use recallroom_core::storage::data_dir;
use recallroom_core::{
    CardDb, CardDeck, Config, JsonProfileStore, MemoryEngine, ProfileStore, SqliteProfileStore,
    StorageBackend,
};
use serde::Serialize;
use tracing::debug;

pub type CmdResult = Result<(), Box<dyn Error>>;

/// Engine over whichever profile backend the config selects.
pub type Engine = MemoryEngine<Box<dyn ProfileStore>>;

/// Loaded configuration plus the learner a command acts on.
pub struct Context {
    pub config: Config,
    pub user: String,
}

impl Context {
    pub fn load(user: Option<String>) -> Result<Self, Box<dyn Error>> {
        let config = Config::load()?;
        let user = user
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| config.default_user.clone());
        debug!(user = %user, backend = ?config.storage.backend, "command context loaded");
        Ok(Self { config, user })
    }

    pub fn store(&self) -> Result<Box<dyn ProfileStore>, Box<dyn Error>> {
        let model = self.config.memory.clone();
        let store: Box<dyn ProfileStore> = match self.config.storage.backend {
            StorageBackend::Sqlite => Box::new(SqliteProfileStore::open(model)?),
            StorageBackend::Json => Box::new(JsonProfileStore::new(data_dir()?, model)),
        };
        Ok(store)
    }

    pub fn engine(&self) -> Result<Engine, Box<dyn Error>> {
        Ok(MemoryEngine::from_config(self.store()?, &self.config))
    }
}

pub fn open_deck() -> Result<CardDeck, Box<dyn Error>> {
    let config = Config::load()?;
    Ok(CardDeck::from_config(CardDb::open()?, &config))
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> CmdResult {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Parse an RFC 3339 timestamp, defaulting to now.
pub fn parse_time(raw: Option<&str>) -> Result<DateTime<Utc>, Box<dyn Error>> {
    match raw {
        Some(s) => Ok(DateTime::parse_from_rfc3339(s)
            .map_err(|e| format!("invalid time '{s}': {e}"))?
            .with_timezone(&Utc)),
        None => Ok(Utc::now()),
    }
}

/// Parse a `YYYY-MM-DD` date, defaulting to today (UTC).
pub fn parse_date(raw: Option<&str>) -> Result<NaiveDate, Box<dyn Error>> {
    match raw {
        Some(s) => Ok(NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|e| format!("invalid date '{s}': {e}"))?),
        None => Ok(Utc::now().date_naive()),
    }
}

/// Split a comma-separated list, dropping empty items.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_trims_and_drops_empty() {
        assert_eq!(split_list(" a, b ,,c "), vec!["a", "b", "c"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn dates_and_times_parse() {
        let d = parse_date(Some("2025-03-09")).unwrap();
        assert_eq!(d, NaiveDate::from_ymd_opt(2025, 3, 9).unwrap());
        assert!(parse_date(Some("03/09/2025")).is_err());

        let t = parse_time(Some("2025-03-09T10:00:00+02:00")).unwrap();
        assert_eq!(t.to_rfc3339(), "2025-03-09T08:00:00+00:00");
        assert!(parse_time(Some("yesterday")).is_err());
    }
}

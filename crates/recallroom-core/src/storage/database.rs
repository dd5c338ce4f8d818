//! SQLite storage for flip-cards.
//!
//! Cards live in the `cards` table of `<data dir>/recallroom.db`, next to the
//! learner profiles. Dates are stored as ISO `YYYY-MM-DD` strings so they
//! compare correctly as text.

use std::path::Path;
use std::time::Duration;

use chrono::{NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::data_dir;
use super::migrations::migrate;
use crate::cards::Card;
use crate::error::StorageError;

const DATE_FORMAT: &str = "%Y-%m-%d";

/// SQLite database for card storage.
pub struct CardDb {
    conn: Connection,
}

fn parse_date(raw: &str, column: usize) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(column, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn card_from_row(row: &Row<'_>) -> rusqlite::Result<Card> {
    let due: String = row.get(8)?;
    let last: Option<String> = row.get(9)?;
    Ok(Card {
        id: row.get(0)?,
        front: row.get(1)?,
        back: row.get(2)?,
        theme: row.get(3)?,
        level: row.get(4)?,
        ease_factor: row.get(5)?,
        interval: row.get(6)?,
        repetitions: row.get(7)?,
        due_date: parse_date(&due, 8)?,
        last_reviewed: last.as_deref().map(|d| parse_date(d, 9)).transpose()?,
    })
}

const CARD_COLUMNS: &str =
    "id, front, back, theme, level, ease_factor, interval_days, repetitions, due_date, last_reviewed";

impl CardDb {
    /// Get a reference to the underlying SQLite connection.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Open the database at `<data dir>/recallroom.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    pub fn open() -> crate::error::Result<Self> {
        let path = data_dir()?.join("recallroom.db");
        Ok(Self::open_at(&path)?)
    }

    pub fn open_at(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::with_connection(conn)
    }

    /// Open an in-memory database (for tests).
    pub fn open_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|source| StorageError::OpenFailed {
            path: ":memory:".into(),
            source,
        })?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        migrate(&conn).map_err(|e| StorageError::MigrationFailed(e.to_string()))?;
        Ok(Self { conn })
    }

    fn insert_with(conn: &Connection, card: &Card) -> rusqlite::Result<()> {
        conn.execute(
            "INSERT INTO cards (id, front, back, theme, level, ease_factor, interval_days,
                                repetitions, due_date, last_reviewed, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                card.id,
                card.front,
                card.back,
                card.theme,
                card.level,
                card.ease_factor,
                card.interval,
                card.repetitions,
                card.due_date.format(DATE_FORMAT).to_string(),
                card.last_reviewed.map(|d| d.format(DATE_FORMAT).to_string()),
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn insert(&self, card: &Card) -> Result<(), StorageError> {
        Self::insert_with(&self.conn, card)?;
        debug!(card = %card.id, "card inserted");
        Ok(())
    }

    /// Insert all cards or none of them.
    pub fn insert_many(&self, cards: &[Card]) -> Result<usize, StorageError> {
        let tx = self.conn.unchecked_transaction()?;
        for card in cards {
            Self::insert_with(&tx, card)?;
        }
        tx.commit()?;
        Ok(cards.len())
    }

    pub fn get(&self, id: &str) -> Result<Option<Card>, StorageError> {
        let card = self
            .conn
            .query_row(
                &format!("SELECT {CARD_COLUMNS} FROM cards WHERE id = ?1"),
                params![id],
                card_from_row,
            )
            .optional()?;
        Ok(card)
    }

    /// Every card, oldest first.
    pub fn list(&self) -> Result<Vec<Card>, StorageError> {
        let mut stmt = self
            .conn
            .prepare(&format!("SELECT {CARD_COLUMNS} FROM cards ORDER BY created_at, id"))?;
        let cards = stmt
            .query_map([], card_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cards)
    }

    /// Cards with `due_date <= today`, in insertion order.
    pub fn list_due(&self, today: NaiveDate) -> Result<Vec<Card>, StorageError> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {CARD_COLUMNS} FROM cards WHERE due_date <= ?1 ORDER BY created_at, id"
        ))?;
        let cards = stmt
            .query_map(params![today.format(DATE_FORMAT).to_string()], card_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(cards)
    }

    /// Store a card's new scheduling state. Returns `false` if the card does
    /// not exist.
    pub fn update_schedule(&self, card: &Card) -> Result<bool, StorageError> {
        let changed = self.conn.execute(
            "UPDATE cards
             SET ease_factor = ?2, interval_days = ?3, repetitions = ?4,
                 due_date = ?5, last_reviewed = ?6
             WHERE id = ?1",
            params![
                card.id,
                card.ease_factor,
                card.interval,
                card.repetitions,
                card.due_date.format(DATE_FORMAT).to_string(),
                card.last_reviewed.map(|d| d.format(DATE_FORMAT).to_string()),
            ],
        )?;
        Ok(changed == 1)
    }

    pub fn count(&self) -> Result<u64, StorageError> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cards", [], |row| row.get(0))?;
        Ok(u64::try_from(n).unwrap_or(0))
    }
}

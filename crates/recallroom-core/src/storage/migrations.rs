//! Schema migrations for recallroom.
//!
//! Two kinds of data are versioned:
//! - the SQLite schema, tracked in the `schema_version` table and applied
//!   automatically when a database is opened
//! - the JSON learner profile document, tracked by its `schema_version`
//!   field and upgraded on every load

use chrono::{DateTime, NaiveDateTime};
use rusqlite::{Connection, Result as SqliteResult};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::memory::{
    ConceptMemory, LearningSession, MemoryModelConfig, UserLearningProfile, PROFILE_SCHEMA_VERSION,
};

/// Current SQLite schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Apply all pending migrations to bring the database to the current schema version.
///
/// # Errors
/// Returns an error if migration fails.
pub fn migrate(conn: &Connection) -> SqliteResult<()> {
    create_schema_version_table(conn)?;

    let current_version = get_schema_version(conn);
    if current_version < 1 {
        migrate_v1(conn)?;
    }
    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

fn create_schema_version_table(conn: &Connection) -> SqliteResult<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );",
    )
}

/// Returns 0 if no version is set (initial database).
pub fn get_schema_version(conn: &Connection) -> i32 {
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, Option<i32>>(0)
    })
    .unwrap_or_else(|e| {
        warn!(error = %e, "failed to read schema_version");
        None
    })
    .unwrap_or(0)
}

fn set_schema_version(conn: &Connection, version: i32) -> SqliteResult<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute("INSERT INTO schema_version (version) VALUES (?1)", [version])?;
    Ok(())
}

/// Migration v1: flip-card table.
fn migrate_v1(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS cards (
            id            TEXT PRIMARY KEY,
            front         TEXT NOT NULL,
            back          TEXT NOT NULL,
            theme         TEXT,
            level         INTEGER NOT NULL DEFAULT 1,
            ease_factor   REAL NOT NULL,
            interval_days INTEGER NOT NULL,
            repetitions   INTEGER NOT NULL DEFAULT 0,
            due_date      TEXT NOT NULL,
            last_reviewed TEXT,
            created_at    TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_cards_due_date ON cards(due_date);",
    )?;
    set_schema_version(&tx, 1)?;
    tx.commit()
}

/// Migration v2: learner profiles stored as versioned JSON documents.
fn migrate_v2(conn: &Connection) -> SqliteResult<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS learner_profiles (
            user_id        TEXT PRIMARY KEY,
            revision       INTEGER NOT NULL,
            schema_version INTEGER NOT NULL,
            document       TEXT NOT NULL,
            updated_at     TEXT NOT NULL
        );",
    )?;
    set_schema_version(&tx, 2)?;
    tx.commit()
}

/// Decode `value` as `T`, salvaging what can be salvaged.
///
/// When the whole value does not decode, each field is merged into the
/// default value one at a time and kept only if the result still decodes.
/// Unknown fields are ignored.
pub fn decode_lenient<T>(value: Value, what: &str) -> T
where
    T: DeserializeOwned + Serialize + Default,
{
    let err = match serde_json::from_value::<T>(value.clone()) {
        Ok(decoded) => return decoded,
        Err(e) => e,
    };
    debug!(what, error = %err, "falling back to field-by-field decoding");

    let Value::Object(fields) = value else {
        warn!(what, "expected an object, using defaults");
        return T::default();
    };
    let mut merged = match serde_json::to_value(T::default()) {
        Ok(Value::Object(map)) => map,
        _ => return T::default(),
    };

    for (key, field) in fields {
        if !merged.contains_key(&key) {
            continue;
        }
        let previous = merged.insert(key.clone(), field);
        if serde_json::from_value::<T>(Value::Object(merged.clone())).is_err() {
            warn!(what, field = %key, "unreadable field replaced by its default");
            if let Some(previous) = previous {
                merged.insert(key, previous);
            }
        }
    }

    serde_json::from_value(Value::Object(merged)).unwrap_or_default()
}

/// Parse a timestamp written with or without an offset; naive ones are UTC.
fn normalize_timestamp(value: &mut Value) {
    let Value::String(raw) = value else {
        return;
    };
    if DateTime::parse_from_rfc3339(raw).is_ok() {
        return;
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        *value = Value::String(naive.and_utc().to_rfc3339());
    }
}

/// Rewrite a version 0 document in place.
///
/// Version 0 documents carry naive ISO timestamps and may have sessions
/// without an end time.
fn upgrade_v0(doc: &mut Map<String, Value>) {
    if let Some(Value::Object(memories)) = doc.get_mut("concept_memories") {
        for memory in memories.values_mut() {
            if let Value::Object(fields) = memory {
                for key in ["first_exposure", "last_review", "next_review"] {
                    if let Some(ts) = fields.get_mut(key) {
                        normalize_timestamp(ts);
                    }
                }
            }
        }
    }

    if let Some(Value::Array(sessions)) = doc.get_mut("learning_history") {
        for session in sessions.iter_mut() {
            let Value::Object(fields) = session else {
                continue;
            };
            for key in ["start_time", "end_time"] {
                if let Some(ts) = fields.get_mut(key) {
                    normalize_timestamp(ts);
                }
            }
            let open_ended = matches!(fields.get("end_time"), None | Some(Value::Null));
            if open_ended {
                if let Some(start) = fields.get("start_time").cloned() {
                    fields.insert("end_time".to_string(), start);
                }
            }
        }
    }
}

/// Turn a stored profile document of any known version into a current,
/// sanitized profile. Never fails; unreadable parts fall back to defaults.
pub fn migrate_profile_document(
    value: Value,
    user_id: &str,
    model: &MemoryModelConfig,
) -> UserLearningProfile {
    let Value::Object(mut doc) = value else {
        warn!(user = user_id, "profile document is not an object, starting fresh");
        return UserLearningProfile::new(user_id);
    };

    let version = doc
        .get("schema_version")
        .and_then(Value::as_u64)
        .unwrap_or(0);
    if version < 1 {
        debug!(user = user_id, "upgrading profile document from version 0");
        upgrade_v0(&mut doc);
    } else if version > u64::from(PROFILE_SCHEMA_VERSION) {
        warn!(user = user_id, version, "profile written by a newer version, reading known fields");
    }

    let memories = doc.remove("concept_memories");
    let history = doc.remove("learning_history");

    let mut profile: UserLearningProfile = decode_lenient(Value::Object(doc), "profile");

    if let Some(Value::Object(memories)) = memories {
        for (concept_id, raw) in memories {
            if !raw.is_object() {
                warn!(user = user_id, concept = %concept_id, "dropping unreadable concept memory");
                continue;
            }
            let memory: ConceptMemory = decode_lenient(raw, "concept memory");
            profile.concept_memories.insert(concept_id, memory);
        }
    }

    if let Some(Value::Array(sessions)) = history {
        for raw in sessions {
            match serde_json::from_value::<LearningSession>(raw) {
                Ok(session) => profile.learning_history.push(session),
                Err(e) => warn!(user = user_id, error = %e, "dropping unreadable session record"),
            }
        }
    }

    profile.schema_version = PROFILE_SCHEMA_VERSION;
    profile.user_id = user_id.to_string();
    profile.sanitize(model);
    profile
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{KnowledgeState, LearningPhase};
    use serde_json::json;

    #[test]
    fn migrate_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        migrate(&conn).unwrap();
        migrate(&conn).unwrap();
        assert_eq!(get_schema_version(&conn), SCHEMA_VERSION);

        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name IN ('cards', 'learner_profiles')",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(tables, 2);
    }

    #[test]
    fn lenient_decoding_keeps_good_fields() {
        let doc = json!({
            "user_id": "ana",
            "optimal_session_length": "forty",
            "current_cognitive_load": 0.8,
            "learning_goals": ["rust"],
            "surprise": true
        });
        let profile: UserLearningProfile = decode_lenient(doc, "profile");
        assert_eq!(profile.user_id, "ana");
        assert_eq!(profile.optimal_session_length, 25);
        assert_eq!(profile.current_cognitive_load, 0.8);
        assert_eq!(profile.learning_goals, vec!["rust"]);
    }

    #[test]
    fn legacy_document_is_upgraded() {
        let doc = json!({
            "user_id": "legacy",
            "optimal_session_length": 30,
            "attention_span_pattern": {},
            "concept_memories": {
                "loops": {
                    "concept_id": "loops",
                    "concept_name": "Loops",
                    "knowledge_state": "practiced",
                    "learning_phase": "consolidation",
                    "memory_strength": 0.6,
                    "confidence_level": 0.7,
                    "first_exposure": "2024-03-01T10:00:00.123456",
                    "last_review": "2024-03-02T10:00:00",
                    "next_review": "2024-03-04T10:00:00",
                    "review_count": 4,
                    "correct_answers": 3,
                    "total_attempts": 4,
                    "average_response_time": 6.5,
                    "decay_rate": 0.09,
                    "difficulty_adjustment": 1.0,
                    "prerequisites": [],
                    "dependents": [],
                    "learning_contexts": ["quiz"],
                    "associated_materials": []
                },
                "broken": 42
            },
            "learning_history": [
                {
                    "session_id": "s1",
                    "start_time": "2024-03-01T09:00:00",
                    "end_time": null,
                    "concepts_studied": ["loops"],
                    "performance_summary": {},
                    "learning_objectives": [],
                    "session_type": "study"
                }
            ]
        });

        let profile = migrate_profile_document(doc, "legacy", &MemoryModelConfig::default());
        assert_eq!(profile.schema_version, PROFILE_SCHEMA_VERSION);
        assert_eq!(profile.optimal_session_length, 30);
        assert_eq!(profile.concept_memories.len(), 1);

        let loops = profile.concept("loops").unwrap();
        assert_eq!(loops.knowledge_state, KnowledgeState::Practiced);
        assert_eq!(loops.learning_phase, LearningPhase::Consolidation);
        assert_eq!(loops.last_review.to_rfc3339(), "2024-03-02T10:00:00+00:00");

        let session = &profile.learning_history[0];
        assert_eq!(session.end_time, session.start_time);
    }

    #[test]
    fn bad_memory_fields_fall_back_and_are_clamped() {
        let doc = json!({
            "schema_version": 1,
            "concept_memories": {
                "c": {
                    "concept_id": "c",
                    "memory_strength": 7.5,
                    "knowledge_state": "legendary",
                    "total_attempts": 2,
                    "correct_answers": 1
                }
            }
        });
        let profile = migrate_profile_document(doc, "u", &MemoryModelConfig::default());
        let c = profile.concept("c").unwrap();
        assert_eq!(c.memory_strength, 1.0);
        assert_eq!(c.knowledge_state, KnowledgeState::Unknown);
        assert_eq!(c.total_attempts, 2);
        assert_eq!(c.concept_name, "c");
        assert_eq!(profile.user_id, "u");
    }

    #[test]
    fn non_object_document_starts_fresh() {
        let profile = migrate_profile_document(json!([1, 2, 3]), "u", &MemoryModelConfig::default());
        assert_eq!(profile, UserLearningProfile::new("u"));
    }
}

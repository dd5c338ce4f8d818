//! Persistence of learner profiles.
//!
//! Every store follows the same contract: loading an unknown learner yields
//! a fresh profile, and saving succeeds only if the stored revision still
//! matches the one the profile was loaded with. A successful save bumps
//! `profile.revision`.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tracing::{info, warn};

use super::data_dir;
use super::migrations::{migrate, migrate_profile_document};
use crate::error::StorageError;
use crate::memory::{MemoryModelConfig, UserLearningProfile};

/// Load/save contract for learner profiles.
pub trait ProfileStore: Send + Sync {
    /// Load a learner's profile, or a fresh one if none is stored.
    fn load(&self, user_id: &str) -> Result<UserLearningProfile, StorageError>;

    /// Persist a profile loaded from this store.
    ///
    /// Fails with [`StorageError::RevisionConflict`] if someone else saved
    /// the same learner in between.
    fn save(&self, profile: &mut UserLearningProfile) -> Result<(), StorageError>;

    /// Ids of every stored learner, sorted.
    fn list_users(&self) -> Result<Vec<String>, StorageError>;
}

impl<T: ProfileStore + ?Sized> ProfileStore for Box<T> {
    fn load(&self, user_id: &str) -> Result<UserLearningProfile, StorageError> {
        (**self).load(user_id)
    }

    fn save(&self, profile: &mut UserLearningProfile) -> Result<(), StorageError> {
        (**self).save(profile)
    }

    fn list_users(&self) -> Result<Vec<String>, StorageError> {
        (**self).list_users()
    }
}

fn check_revision(user_id: &str, expected: u64, found: u64) -> Result<(), StorageError> {
    if expected == found {
        return Ok(());
    }
    warn!(user = user_id, expected, found, "profile revision conflict");
    Err(StorageError::RevisionConflict {
        user_id: user_id.to_string(),
        expected,
        found,
    })
}

fn parse_document(raw: &str, user_id: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|e| {
        warn!(user = user_id, error = %e, "stored profile is not valid JSON, starting fresh");
        Value::Null
    })
}

/// SQLite-backed store sharing the application database.
pub struct SqliteProfileStore {
    conn: Mutex<Connection>,
    model: MemoryModelConfig,
}

impl SqliteProfileStore {
    /// Open the store at `<data dir>/recallroom.db`.
    pub fn open(model: MemoryModelConfig) -> crate::error::Result<Self> {
        let path = data_dir()?.join("recallroom.db");
        Ok(Self::open_at(&path, model)?)
    }

    pub fn open_at(path: &Path, model: MemoryModelConfig) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        conn.busy_timeout(Duration::from_secs(5))?;
        Self::with_connection(conn, model)
    }

    /// In-memory store, for tests and embedding.
    pub fn open_memory(model: MemoryModelConfig) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory().map_err(|source| StorageError::OpenFailed {
            path: PathBuf::from(":memory:"),
            source,
        })?;
        Self::with_connection(conn, model)
    }

    fn with_connection(conn: Connection, model: MemoryModelConfig) -> Result<Self, StorageError> {
        migrate(&conn).map_err(|e| StorageError::MigrationFailed(e.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            model,
        })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StorageError> {
        self.conn.lock().map_err(|_| StorageError::Locked)
    }
}

impl ProfileStore for SqliteProfileStore {
    fn load(&self, user_id: &str) -> Result<UserLearningProfile, StorageError> {
        let conn = self.conn()?;
        let row: Option<(i64, String)> = conn
            .query_row(
                "SELECT revision, document FROM learner_profiles WHERE user_id = ?1",
                params![user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((revision, document)) = row else {
            return Ok(UserLearningProfile::new(user_id));
        };
        let mut profile =
            migrate_profile_document(parse_document(&document, user_id), user_id, &self.model);
        profile.revision = u64::try_from(revision).unwrap_or(0);
        Ok(profile)
    }

    fn save(&self, profile: &mut UserLearningProfile) -> Result<(), StorageError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let found: Option<i64> = tx
            .query_row(
                "SELECT revision FROM learner_profiles WHERE user_id = ?1",
                params![profile.user_id],
                |row| row.get(0),
            )
            .optional()?;
        let found = found.map_or(0, |r| u64::try_from(r).unwrap_or(0));
        check_revision(&profile.user_id, profile.revision, found)?;

        let next = profile.revision + 1;
        let mut stored = profile.clone();
        stored.revision = next;
        let document = serde_json::to_string(&stored)?;
        tx.execute(
            "INSERT INTO learner_profiles (user_id, revision, schema_version, document, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(user_id) DO UPDATE SET
                revision = excluded.revision,
                schema_version = excluded.schema_version,
                document = excluded.document,
                updated_at = excluded.updated_at",
            params![
                stored.user_id,
                i64::try_from(next).unwrap_or(i64::MAX),
                stored.schema_version,
                document,
                Utc::now().to_rfc3339(),
            ],
        )?;
        tx.commit()?;

        profile.revision = next;
        info!(user = %profile.user_id, revision = next, "profile saved");
        Ok(())
    }

    fn list_users(&self) -> Result<Vec<String>, StorageError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT user_id FROM learner_profiles ORDER BY user_id")?;
        let users = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }
}

/// One pretty-printed JSON document per learner under `<dir>/profiles/`.
pub struct JsonProfileStore {
    dir: PathBuf,
    model: MemoryModelConfig,
}

impl JsonProfileStore {
    pub fn new(dir: impl Into<PathBuf>, model: MemoryModelConfig) -> Self {
        Self {
            dir: dir.into().join("profiles"),
            model,
        }
    }

    /// File name for a learner; characters outside `[A-Za-z0-9-]` are
    /// hex-escaped so any id maps to one safe, distinct name.
    fn file_stem(user_id: &str) -> String {
        let mut stem = String::with_capacity(user_id.len());
        for c in user_id.chars() {
            if c.is_ascii_alphanumeric() || c == '-' {
                stem.push(c);
            } else {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    stem.push_str(&format!("_{byte:02x}"));
                }
            }
        }
        stem
    }

    fn path_for(&self, user_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", Self::file_stem(user_id)))
    }

    fn read(&self, path: &Path) -> Result<Option<String>, StorageError> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StorageError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }
}

impl ProfileStore for JsonProfileStore {
    fn load(&self, user_id: &str) -> Result<UserLearningProfile, StorageError> {
        let Some(content) = self.read(&self.path_for(user_id))? else {
            return Ok(UserLearningProfile::new(user_id));
        };
        let value = parse_document(&content, user_id);
        let revision = value.get("revision").and_then(Value::as_u64).unwrap_or(0);
        let mut profile = migrate_profile_document(value, user_id, &self.model);
        profile.revision = revision;
        Ok(profile)
    }

    fn save(&self, profile: &mut UserLearningProfile) -> Result<(), StorageError> {
        let io_err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| StorageError::Io { path, source }
        };

        std::fs::create_dir_all(&self.dir).map_err(io_err(&self.dir))?;
        let path = self.path_for(&profile.user_id);
        let found = self
            .read(&path)?
            .and_then(|content| serde_json::from_str::<Value>(&content).ok())
            .and_then(|v| v.get("revision").and_then(Value::as_u64))
            .unwrap_or(0);
        check_revision(&profile.user_id, profile.revision, found)?;

        let next = profile.revision + 1;
        let mut stored = profile.clone();
        stored.revision = next;
        let content = serde_json::to_string_pretty(&stored)?;

        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(io_err(&tmp))?;
        std::fs::rename(&tmp, &path).map_err(io_err(&path))?;

        profile.revision = next;
        info!(user = %profile.user_id, revision = next, path = %path.display(), "profile saved");
        Ok(())
    }

    fn list_users(&self) -> Result<Vec<String>, StorageError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(StorageError::Io {
                    path: self.dir.clone(),
                    source,
                })
            }
        };

        let mut users = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|source| StorageError::Io {
                path: self.dir.clone(),
                source,
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(content) = self.read(&path)? else {
                continue;
            };
            if let Some(user) = serde_json::from_str::<Value>(&content)
                .ok()
                .and_then(|v| v.get("user_id").and_then(Value::as_str).map(str::to_string))
            {
                users.push(user);
            }
        }
        users.sort();
        Ok(users)
    }
}

/// In-process store for tests and embedding.
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: Mutex<HashMap<String, UserLearningProfile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProfileStore for MemoryProfileStore {
    fn load(&self, user_id: &str) -> Result<UserLearningProfile, StorageError> {
        let profiles = self.profiles.lock().map_err(|_| StorageError::Locked)?;
        Ok(profiles
            .get(user_id)
            .cloned()
            .unwrap_or_else(|| UserLearningProfile::new(user_id)))
    }

    fn save(&self, profile: &mut UserLearningProfile) -> Result<(), StorageError> {
        let mut profiles = self.profiles.lock().map_err(|_| StorageError::Locked)?;
        let found = profiles.get(&profile.user_id).map_or(0, |p| p.revision);
        check_revision(&profile.user_id, profile.revision, found)?;
        profile.revision += 1;
        profiles.insert(profile.user_id.clone(), profile.clone());
        Ok(())
    }

    fn list_users(&self) -> Result<Vec<String>, StorageError> {
        let profiles = self.profiles.lock().map_err(|_| StorageError::Locked)?;
        let mut users: Vec<String> = profiles.keys().cloned().collect();
        users.sort();
        Ok(users)
    }
}

/// Import profiles from a legacy single-file database.
///
/// The file is a JSON object whose `user_profiles` member maps learner ids
/// to version 0 profile documents. Learners already present in `store` are
/// skipped. Returns the ids that were imported.
pub fn import_legacy_profiles(
    store: &dyn ProfileStore,
    path: &Path,
    model: &MemoryModelConfig,
) -> Result<Vec<String>, StorageError> {
    let content = std::fs::read_to_string(path).map_err(|source| StorageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let root: Value = serde_json::from_str(&content)?;
    let Some(Value::Object(profiles)) = root.get("user_profiles").cloned() else {
        warn!(path = %path.display(), "no user_profiles in legacy database");
        return Ok(Vec::new());
    };

    let existing = store.list_users()?;
    let mut imported = Vec::new();
    for (user_id, document) in profiles {
        if existing.contains(&user_id) {
            info!(user = %user_id, "already stored, skipping legacy profile");
            continue;
        }
        let mut profile = migrate_profile_document(document, &user_id, model);
        profile.revision = 0;
        store.save(&mut profile)?;
        imported.push(user_id);
    }
    Ok(imported)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::ConceptMemory;

    fn with_concept(mut profile: UserLearningProfile, id: &str) -> UserLearningProfile {
        profile.concept_memories.insert(
            id.to_string(),
            ConceptMemory {
                concept_id: id.into(),
                concept_name: id.into(),
                ..ConceptMemory::default()
            },
        );
        profile
    }

    fn exercise(store: &dyn ProfileStore) {
        let fresh = store.load("ana").unwrap();
        assert_eq!(fresh.revision, 0);
        assert!(fresh.is_empty());

        let mut first = with_concept(fresh.clone(), "loops");
        store.save(&mut first).unwrap();
        assert_eq!(first.revision, 1);

        let loaded = store.load("ana").unwrap();
        assert_eq!(loaded.revision, 1);
        assert!(loaded.concept("loops").is_some());

        // a writer still holding revision 0 must not clobber the save
        let mut stale = with_concept(fresh, "closures");
        assert!(matches!(
            store.save(&mut stale),
            Err(StorageError::RevisionConflict { expected: 0, found: 1, .. })
        ));

        let mut second = store.load("ana").unwrap();
        store.save(&mut second).unwrap();
        assert_eq!(store.load("ana").unwrap().revision, 2);
        assert_eq!(store.list_users().unwrap(), vec!["ana"]);
    }

    #[test]
    fn sqlite_store_contract() {
        let store = SqliteProfileStore::open_memory(MemoryModelConfig::default()).unwrap();
        exercise(&store);
    }

    #[test]
    fn json_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonProfileStore::new(dir.path(), MemoryModelConfig::default());
        exercise(&store);
    }

    #[test]
    fn memory_store_contract() {
        exercise(&MemoryProfileStore::new());
    }

    #[test]
    fn file_stems_are_safe_and_distinct() {
        assert_eq!(JsonProfileStore::file_stem("ana-1"), "ana-1");
        assert_eq!(JsonProfileStore::file_stem("../etc"), "_2e_2e_2fetc");
        assert_ne!(JsonProfileStore::file_stem("a_b"), JsonProfileStore::file_stem("a b"));
    }

    #[test]
    fn legacy_import_skips_existing_learners() {
        let dir = tempfile::tempdir().unwrap();
        let legacy = dir.path().join("db.json");
        std::fs::write(
            &legacy,
            r#"{"user_profiles": {
                "old": {"user_id": "old", "concept_memories": {}, "learning_history": []},
                "kept": {"user_id": "kept", "optimal_session_length": 50}
            }}"#,
        )
        .unwrap();

        let store = MemoryProfileStore::new();
        let mut kept = UserLearningProfile::new("kept");
        store.save(&mut kept).unwrap();

        let imported = import_legacy_profiles(&store, &legacy, &MemoryModelConfig::default()).unwrap();
        assert_eq!(imported, vec!["old"]);
        assert_eq!(store.load("kept").unwrap().optimal_session_length, 25);
        assert_eq!(store.list_users().unwrap(), vec!["kept", "old"]);
    }
}

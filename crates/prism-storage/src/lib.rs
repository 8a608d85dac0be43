use chrono::Utc;
use prism_core::schema::{
    LEGACY_SCHEMA_VERSION, MESSAGES_TABLE, OBSERVATIONS_TABLE, PROFILE_SECTIONS_TABLE,
    SESSIONS_TABLE, TARGET_SCHEMA_VERSION,
};
use prism_core::{
    ChatIntent, IdSource, MessageRef, MessageRole, ObservationCategory, ObservationStatus,
    ProfileTags, RandomIds, StableId, StableIdError,
};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

pub mod backfill;
pub mod ddl;
pub mod evolution;
pub mod probe;
pub mod progress;
pub mod relink;
pub mod seed;

pub use backfill::{BackfillOptions, BackfillReport, DEFAULT_BATCH_SIZE};
pub use ddl::DdlOutcome;
pub use evolution::{EvolutionConfig, EvolutionReport, MigrationError, MigrationStep, StepReport};
pub use progress::{EvolutionProgress, IdentifierProgress};
pub use relink::RelinkReport;
pub use seed::SeedReport;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid sql identifier {0:?}")]
    InvalidIdentifier(String),
    #[error("stable id error: {0}")]
    Identifier(#[from] StableIdError),
    #[error("structural change on {table} failed ({statement}): {source}")]
    StructuralChange {
        table: String,
        statement: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("backfill of {table}.{column} failed after {committed} committed rows: {source}")]
    BackfillWrite {
        table: String,
        column: String,
        committed: u64,
        #[source]
        source: rusqlite::Error,
    },
    #[error(
        "cannot enforce uniqueness on {table}.{column}: {unset} rows unset, {duplicated} rows duplicated"
    )]
    PreconditionViolation {
        table: String,
        column: String,
        unset: u64,
        duplicated: u64,
    },
    #[error("unsupported schema version {found}, max supported {supported}")]
    UnsupportedSchemaVersion { found: i64, supported: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub id: i64,
    pub session_uuid: StableId,
    pub thread_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    pub id: i64,
    pub session_id: i64,
    pub msg_uuid: StableId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewObservation {
    pub user_id: i64,
    pub source: Option<StableId>,
    pub category: ObservationCategory,
    pub fact_content: String,
    pub confidence: u8,
    pub is_potential_signal: bool,
}

/// An observation's source message, resolved through whichever reference the row carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceMessage {
    pub reference: MessageRef,
    pub message_id: i64,
    pub msg_uuid: Option<StableId>,
}

pub struct ProfileStore {
    conn: Connection,
}

impl ProfileStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    /// Adopts an already opened connection and brings it up to the baseline layout.
    pub fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch("PRAGMA busy_timeout = 5000;")?;
        let store = Self { conn };
        store.migrate()?;
        Ok(store)
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        schema_version(&self.conn)
    }

    /// Creates the legacy tables when missing. Stores written by the pipeline already have them,
    /// so this only records the baseline version there.
    pub fn migrate(&self) -> Result<(), StorageError> {
        let current = self.schema_version()?;
        if current > TARGET_SCHEMA_VERSION {
            return Err(StorageError::UnsupportedSchemaVersion {
                found: current,
                supported: TARGET_SCHEMA_VERSION,
            });
        }

        if current < LEGACY_SCHEMA_VERSION {
            let sql = include_str!("../migrations/0001_profile_schema.sql");
            self.conn.execute_batch(sql)?;
            self.conn
                .execute_batch(&format!("PRAGMA user_version = {LEGACY_SCHEMA_VERSION}"))?;
            info!(version = LEGACY_SCHEMA_VERSION, "baseline schema ready");
        }

        Ok(())
    }

    pub fn evolve(&self, config: &EvolutionConfig) -> Result<EvolutionReport, MigrationError> {
        evolution::evolve(&self.conn, config, &mut RandomIds)
    }

    pub fn evolve_with(
        &self,
        config: &EvolutionConfig,
        ids: &mut dyn IdSource,
    ) -> Result<EvolutionReport, MigrationError> {
        evolution::evolve(&self.conn, config, ids)
    }

    pub fn progress(&self) -> Result<EvolutionProgress, StorageError> {
        progress::progress(&self.conn)
    }

    pub fn seed_defaults(&self) -> Result<SeedReport, StorageError> {
        seed::seed_defaults(&self.conn, &mut RandomIds)
    }

    pub fn table_exists(&self, table_name: &str) -> Result<bool, StorageError> {
        probe::has_table(&self.conn, table_name)
    }

    pub fn create_session(
        &self,
        user_id: i64,
        intent: ChatIntent,
        title: &str,
    ) -> Result<SessionRecord, StorageError> {
        let session_uuid = StableId::generate()?;
        let thread_id = Uuid::new_v4().to_string();
        self.conn.execute(
            &format!(
                "
                INSERT INTO {SESSIONS_TABLE}
                    (user_id, session_uuid, thread_id, intent, title, context_data, updated_at)
                VALUES (?1, ?2, ?3, ?4, ?5, '{{}}', ?6)
                "
            ),
            params![
                user_id,
                session_uuid.as_str(),
                thread_id,
                intent.as_str(),
                title,
                db_timestamp(),
            ],
        )?;

        Ok(SessionRecord {
            id: self.conn.last_insert_rowid(),
            session_uuid,
            thread_id,
        })
    }

    pub fn append_message(
        &self,
        session_id: i64,
        role: MessageRole,
        content: &str,
    ) -> Result<MessageRecord, StorageError> {
        let msg_uuid = StableId::generate()?;
        self.conn.execute(
            &format!(
                "
                INSERT INTO {MESSAGES_TABLE} (session_id, msg_uuid, role, content, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "
            ),
            params![session_id, msg_uuid.as_str(), role.as_str(), content, db_timestamp()],
        )?;

        Ok(MessageRecord {
            id: self.conn.last_insert_rowid(),
            session_id,
            msg_uuid,
        })
    }

    /// Writes only the identifier-based source reference; the legacy column stays NULL.
    pub fn record_observation(&self, observation: &NewObservation) -> Result<i64, StorageError> {
        let now = db_timestamp();
        self.conn.execute(
            &format!(
                "
                INSERT INTO {OBSERVATIONS_TABLE} (
                    user_id,
                    source_msg_uuid,
                    category,
                    fact_content,
                    confidence,
                    is_potential_signal,
                    status,
                    created_at,
                    updated_at
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
                "
            ),
            params![
                observation.user_id,
                observation.source.as_ref().map(StableId::as_str),
                observation.category.as_str(),
                observation.fact_content,
                i64::from(observation.confidence.min(100)),
                observation.is_potential_signal,
                ObservationStatus::Pending.as_str(),
                now,
            ],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Prefers `source_msg_uuid` and falls back to `source_message_id`. `None` when the row has
    /// no reference or the referenced message is gone.
    pub fn observation_source(
        &self,
        observation_id: i64,
    ) -> Result<Option<SourceMessage>, StorageError> {
        let columns: Option<(Option<String>, Option<i64>)> = self
            .conn
            .query_row(
                &format!(
                    "SELECT source_msg_uuid, source_message_id FROM {OBSERVATIONS_TABLE} WHERE id = ?1"
                ),
                [observation_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        let Some((stable, legacy)) = columns else {
            return Ok(None);
        };
        let Some(reference) = MessageRef::from_columns(stable, legacy) else {
            return Ok(None);
        };

        let message: Option<(i64, Option<String>)> = match &reference {
            MessageRef::Stable(msg_uuid) => self
                .conn
                .query_row(
                    &format!("SELECT id, msg_uuid FROM {MESSAGES_TABLE} WHERE msg_uuid = ?1"),
                    [msg_uuid.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?,
            MessageRef::Legacy(message_id) => self
                .conn
                .query_row(
                    &format!("SELECT id, msg_uuid FROM {MESSAGES_TABLE} WHERE id = ?1"),
                    [message_id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?,
        };

        Ok(message.map(|(message_id, msg_uuid)| SourceMessage {
            reference,
            message_id,
            msg_uuid: msg_uuid.map(StableId::from_stored),
        }))
    }

    pub fn set_section_tags(&self, section_id: i64, tags: &ProfileTags) -> Result<bool, StorageError> {
        let tags_json = tags
            .to_json()
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        let changes = self.conn.execute(
            &format!(
                "UPDATE {PROFILE_SECTIONS_TABLE} SET tags = ?1, updated_at = ?2 WHERE id = ?3"
            ),
            params![tags_json, db_timestamp(), section_id],
        )?;
        Ok(changes > 0)
    }

    /// `None` when the section does not exist or has never been tagged.
    pub fn section_tags(&self, section_id: i64) -> Result<Option<ProfileTags>, StorageError> {
        let raw: Option<Option<String>> = self
            .conn
            .query_row(
                &format!("SELECT tags FROM {PROFILE_SECTIONS_TABLE} WHERE id = ?1"),
                [section_id],
                |row| row.get(0),
            )
            .optional()?;

        raw.flatten()
            .map(|raw| {
                ProfileTags::from_json(&raw)
                    .map_err(|err| StorageError::Serialization(err.to_string()))
            })
            .transpose()
    }
}

pub fn schema_version(conn: &Connection) -> Result<i64, StorageError> {
    Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?)
}

/// Quotes a table, column or index name after checking it is a plain identifier.
pub(crate) fn quote_ident(name: &str) -> Result<String, StorageError> {
    let valid = name
        .chars()
        .next()
        .is_some_and(|first| first.is_ascii_alphabetic() || first == '_')
        && name
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
    if !valid {
        return Err(StorageError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{name}\""))
}

/// Timestamp layout used by the rows the pipeline writes.
pub(crate) fn db_timestamp() -> String {
    Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string()
}

use crate::{db_timestamp, StorageError};
use prism_core::schema::{PROFILE_SECTIONS_TABLE, SESSIONS_TABLE, USERS_TABLE};
use prism_core::{ChatIntent, IdSource, ProfileSectionKey};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

pub const DEFAULT_USERNAME: &str = "me";
pub const DEFAULT_SESSION_TITLE: &str = "Welcome to your career advisor";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub user_id: i64,
    pub user_created: bool,
    pub sections_created: usize,
    pub session_id: i64,
    pub session_created: bool,
}

/// Ensures the single local user, its empty profile sections and a first onboarding session.
///
/// Needs the evolved schema: the session is written with its stable identifier.
pub fn seed_defaults(conn: &Connection, ids: &mut dyn IdSource) -> Result<SeedReport, StorageError> {
    let tx = conn.unchecked_transaction()?;
    let (user_id, user_created) = ensure_default_user(&tx)?;
    let sections_created = ensure_profile_sections(&tx, user_id)?;
    let (session_id, session_created) = ensure_first_session(&tx, user_id, ids)?;
    tx.commit()?;

    let report = SeedReport {
        user_id,
        user_created,
        sections_created,
        session_id,
        session_created,
    };
    if report.user_created || report.sections_created > 0 || report.session_created {
        info!(
            user_id,
            sections_created,
            session_id,
            "seeded default profile data"
        );
    } else {
        debug!(user_id, "default profile data already present");
    }
    Ok(report)
}

fn ensure_default_user(conn: &Connection) -> Result<(i64, bool), StorageError> {
    let existing: Option<i64> = conn
        .query_row(
            &format!("SELECT id FROM {USERS_TABLE} WHERE username = ?1"),
            [DEFAULT_USERNAME],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(user_id) = existing {
        return Ok((user_id, false));
    }

    let basic_info = serde_json::json!({ "name": "Default User", "city": "Beijing" });
    conn.execute(
        &format!(
            "INSERT INTO {USERS_TABLE} (username, basic_info, created_at) VALUES (?1, ?2, ?3)"
        ),
        params![DEFAULT_USERNAME, basic_info.to_string(), db_timestamp()],
    )?;
    Ok((conn.last_insert_rowid(), true))
}

fn ensure_profile_sections(conn: &Connection, user_id: i64) -> Result<usize, StorageError> {
    let mut created = 0;
    let now = db_timestamp();
    for key in ProfileSectionKey::ALL {
        created += conn.execute(
            &format!(
                "
                INSERT OR IGNORE INTO {PROFILE_SECTIONS_TABLE} (user_id, section_key, content, updated_at)
                VALUES (?1, ?2, '{{}}', ?3)
                "
            ),
            params![user_id, key.as_str(), now],
        )?;
    }
    Ok(created)
}

fn ensure_first_session(
    conn: &Connection,
    user_id: i64,
    ids: &mut dyn IdSource,
) -> Result<(i64, bool), StorageError> {
    let existing: Option<i64> = conn
        .query_row(
            &format!("SELECT id FROM {SESSIONS_TABLE} WHERE user_id = ?1 ORDER BY id LIMIT 1"),
            [user_id],
            |row| row.get(0),
        )
        .optional()?;
    if let Some(session_id) = existing {
        return Ok((session_id, false));
    }

    let session_uuid = ids.next_id()?;
    let context = serde_json::json!({ "initialized": true });
    conn.execute(
        &format!(
            "
            INSERT INTO {SESSIONS_TABLE}
                (user_id, session_uuid, thread_id, intent, title, context_data, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "
        ),
        params![
            user_id,
            session_uuid.as_str(),
            Uuid::new_v4().to_string(),
            ChatIntent::Onboarding.as_str(),
            DEFAULT_SESSION_TITLE,
            context.to_string(),
            db_timestamp(),
        ],
    )?;
    Ok((conn.last_insert_rowid(), true))
}

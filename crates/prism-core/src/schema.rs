//! Table, column and index names that the evolution engine and the producers agree on.

/// `PRAGMA user_version` of the layout the producing pipeline created.
pub const LEGACY_SCHEMA_VERSION: i64 = 1;
/// `PRAGMA user_version` once stable identifiers are enforced.
pub const TARGET_SCHEMA_VERSION: i64 = 2;

pub const USERS_TABLE: &str = "users";
pub const SESSIONS_TABLE: &str = "chat_sessions";
pub const MESSAGES_TABLE: &str = "chat_messages";
pub const OBSERVATIONS_TABLE: &str = "raw_observations";
pub const PROFILE_SECTIONS_TABLE: &str = "profile_sections";

/// A nullable stable-identifier column next to a table's internal sequence number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IdentifierColumn {
    pub table: &'static str,
    pub seq_column: &'static str,
    pub id_column: &'static str,
    pub unique_index: &'static str,
}

pub const SESSION_STABLE_ID: IdentifierColumn = IdentifierColumn {
    table: SESSIONS_TABLE,
    seq_column: "id",
    id_column: "session_uuid",
    unique_index: "ix_chat_sessions_session_uuid",
};

pub const MESSAGE_STABLE_ID: IdentifierColumn = IdentifierColumn {
    table: MESSAGES_TABLE,
    seq_column: "id",
    id_column: "msg_uuid",
    unique_index: "ix_chat_messages_msg_uuid",
};

/// Parents before children.
pub const BACKFILL_ORDER: [IdentifierColumn; 2] = [SESSION_STABLE_ID, MESSAGE_STABLE_ID];

/// A child reference held as a parent sequence number, mirrored into a stable-identifier column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceLink {
    pub child_table: &'static str,
    pub child_ref_column: &'static str,
    pub parent_table: &'static str,
    pub parent_seq_column: &'static str,
    pub parent_id_column: &'static str,
    pub new_ref_column: &'static str,
    pub lookup_index: &'static str,
}

pub const OBSERVATION_SOURCE_LINK: ReferenceLink = ReferenceLink {
    child_table: OBSERVATIONS_TABLE,
    child_ref_column: "source_message_id",
    parent_table: MESSAGE_STABLE_ID.table,
    parent_seq_column: MESSAGE_STABLE_ID.seq_column,
    parent_id_column: MESSAGE_STABLE_ID.id_column,
    new_ref_column: "source_msg_uuid",
    lookup_index: "ix_raw_observations_source_msg_uuid",
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddedColumn {
    pub table: &'static str,
    pub column: &'static str,
    pub sql_type: &'static str,
}

pub const PROFILE_TAGS_COLUMN: AddedColumn = AddedColumn {
    table: PROFILE_SECTIONS_TABLE,
    column: "tags",
    sql_type: "TEXT",
};

pub const ADDED_COLUMNS: [AddedColumn; 4] = [
    AddedColumn {
        table: SESSION_STABLE_ID.table,
        column: SESSION_STABLE_ID.id_column,
        sql_type: "TEXT",
    },
    AddedColumn {
        table: MESSAGE_STABLE_ID.table,
        column: MESSAGE_STABLE_ID.id_column,
        sql_type: "TEXT",
    },
    AddedColumn {
        table: OBSERVATION_SOURCE_LINK.child_table,
        column: OBSERVATION_SOURCE_LINK.new_ref_column,
        sql_type: "TEXT",
    },
    PROFILE_TAGS_COLUMN,
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_identifier_and_reference_column_is_added() {
        for target in BACKFILL_ORDER {
            assert!(ADDED_COLUMNS
                .iter()
                .any(|added| added.table == target.table && added.column == target.id_column));
        }
        assert!(ADDED_COLUMNS.iter().any(|added| {
            added.table == OBSERVATION_SOURCE_LINK.child_table
                && added.column == OBSERVATION_SOURCE_LINK.new_ref_column
        }));
    }

    #[test]
    fn observation_link_points_at_message_identifiers() {
        assert_eq!(OBSERVATION_SOURCE_LINK.parent_table, MESSAGES_TABLE);
        assert_eq!(OBSERVATION_SOURCE_LINK.parent_id_column, "msg_uuid");
        assert_eq!(BACKFILL_ORDER[0], SESSION_STABLE_ID);
    }
}

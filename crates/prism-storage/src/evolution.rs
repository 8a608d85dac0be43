use crate::backfill::{backfill_identifiers, BackfillOptions};
use crate::ddl::{ensure_column, ensure_index, ensure_unique_index};
use crate::relink::relink;
use crate::{schema_version, StorageError};
use prism_core::schema::{
    IdentifierColumn, ADDED_COLUMNS, MESSAGE_STABLE_ID, OBSERVATION_SOURCE_LINK,
    SESSION_STABLE_ID, TARGET_SCHEMA_VERSION,
};
use prism_core::IdSource;
use rusqlite::Connection;
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{info, info_span, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationStep {
    StructuralChanges,
    BackfillSessions,
    BackfillMessages,
    RelinkObservations,
    FinalizeIndexes,
}

impl MigrationStep {
    pub const ALL: [MigrationStep; 5] = [
        MigrationStep::StructuralChanges,
        MigrationStep::BackfillSessions,
        MigrationStep::BackfillMessages,
        MigrationStep::RelinkObservations,
        MigrationStep::FinalizeIndexes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MigrationStep::StructuralChanges => "structural_changes",
            MigrationStep::BackfillSessions => "backfill_sessions",
            MigrationStep::BackfillMessages => "backfill_messages",
            MigrationStep::RelinkObservations => "relink_observations",
            MigrationStep::FinalizeIndexes => "finalize_indexes",
        }
    }
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("migration step `{step}` failed: {source}")]
pub struct MigrationError {
    pub step: MigrationStep,
    #[source]
    pub source: StorageError,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvolutionConfig {
    pub backfill: BackfillOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub step: MigrationStep,
    pub ddl_applied: u32,
    pub rows_updated: u64,
    pub remaining: u64,
}

impl StepReport {
    fn new(step: MigrationStep) -> Self {
        Self {
            step,
            ddl_applied: 0,
            rows_updated: 0,
            remaining: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EvolutionReport {
    pub schema_version: i64,
    pub steps: Vec<StepReport>,
    /// Set when a throttled backfill left rows for the next invocation.
    pub stopped_after: Option<MigrationStep>,
}

impl EvolutionReport {
    pub fn ddl_applied(&self) -> u32 {
        self.steps.iter().map(|step| step.ddl_applied).sum()
    }

    pub fn rows_updated(&self) -> u64 {
        self.steps.iter().map(|step| step.rows_updated).sum()
    }

    pub fn is_noop(&self) -> bool {
        self.ddl_applied() == 0 && self.rows_updated() == 0
    }

    pub fn is_complete(&self) -> bool {
        self.stopped_after.is_none() && self.schema_version >= TARGET_SCHEMA_VERSION
    }

    pub fn step(&self, step: MigrationStep) -> Option<&StepReport> {
        self.steps.iter().find(|report| report.step == step)
    }
}

/// Advances the store to the target schema. Every step checks its own precondition, so the
/// whole sequence can be re-run after an interruption at any point.
pub fn evolve(
    conn: &Connection,
    config: &EvolutionConfig,
    ids: &mut dyn IdSource,
) -> Result<EvolutionReport, MigrationError> {
    let mut report = EvolutionReport {
        schema_version: 0,
        steps: Vec::with_capacity(MigrationStep::ALL.len()),
        stopped_after: None,
    };

    for step in MigrationStep::ALL {
        let _span = info_span!("migration_step", step = step.as_str()).entered();
        let outcome = match step {
            MigrationStep::StructuralChanges => structural_changes(conn),
            MigrationStep::BackfillSessions => {
                backfill_step(conn, step, &SESSION_STABLE_ID, config, ids)
            }
            MigrationStep::BackfillMessages => {
                backfill_step(conn, step, &MESSAGE_STABLE_ID, config, ids)
            }
            MigrationStep::RelinkObservations => relink_observations(conn),
            MigrationStep::FinalizeIndexes => finalize_indexes(conn),
        };
        let step_report = outcome.map_err(|source| MigrationError { step, source })?;
        info!(
            ddl_applied = step_report.ddl_applied,
            rows_updated = step_report.rows_updated,
            remaining = step_report.remaining,
            "migration step complete"
        );

        let throttled = matches!(
            step,
            MigrationStep::BackfillSessions | MigrationStep::BackfillMessages
        ) && step_report.remaining > 0;
        report.steps.push(step_report);

        if throttled {
            warn!(
                step = step.as_str(),
                "backfill stopped early; run the migration again to resume"
            );
            report.stopped_after = Some(step);
            break;
        }
    }

    let last_step = report
        .steps
        .last()
        .map_or(MigrationStep::StructuralChanges, |last| last.step);
    report.schema_version = schema_version(conn).map_err(|source| MigrationError {
        step: last_step,
        source,
    })?;
    Ok(report)
}

fn structural_changes(conn: &Connection) -> Result<StepReport, StorageError> {
    let found = schema_version(conn)?;
    if found > TARGET_SCHEMA_VERSION {
        return Err(StorageError::UnsupportedSchemaVersion {
            found,
            supported: TARGET_SCHEMA_VERSION,
        });
    }

    let mut report = StepReport::new(MigrationStep::StructuralChanges);
    for added in ADDED_COLUMNS {
        if ensure_column(conn, added.table, added.column, added.sql_type)?.applied() {
            report.ddl_applied += 1;
        }
    }

    let link = OBSERVATION_SOURCE_LINK;
    if ensure_index(conn, link.child_table, link.new_ref_column, link.lookup_index)?.applied() {
        report.ddl_applied += 1;
    }
    Ok(report)
}

fn backfill_step(
    conn: &Connection,
    step: MigrationStep,
    target: &IdentifierColumn,
    config: &EvolutionConfig,
    ids: &mut dyn IdSource,
) -> Result<StepReport, StorageError> {
    let backfill = backfill_identifiers(conn, target, &config.backfill, ids)?;
    Ok(StepReport {
        step,
        ddl_applied: 0,
        rows_updated: backfill.rows_updated,
        remaining: backfill.remaining,
    })
}

fn relink_observations(conn: &Connection) -> Result<StepReport, StorageError> {
    let relinked = relink(conn, &OBSERVATION_SOURCE_LINK)?;
    Ok(StepReport {
        step: MigrationStep::RelinkObservations,
        ddl_applied: 0,
        rows_updated: relinked.relinked,
        remaining: relinked.unresolved,
    })
}

fn finalize_indexes(conn: &Connection) -> Result<StepReport, StorageError> {
    let mut report = StepReport::new(MigrationStep::FinalizeIndexes);
    for target in [SESSION_STABLE_ID, MESSAGE_STABLE_ID] {
        if ensure_unique_index(conn, target.table, target.id_column, target.unique_index)?
            .applied()
        {
            report.ddl_applied += 1;
        }
    }

    if schema_version(conn)? < TARGET_SCHEMA_VERSION {
        conn.execute_batch(&format!("PRAGMA user_version = {TARGET_SCHEMA_VERSION}"))?;
        info!(version = TARGET_SCHEMA_VERSION, "recorded schema version");
    }
    Ok(report)
}

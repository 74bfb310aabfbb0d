//! SQLite database layer

use std::path::Path;

use chrono::{DateTime, Utc};
use parking_lot::{Mutex, MutexGuard};
use rusqlite::types::Type;
use rusqlite::{Connection, ErrorCode as SqliteErrorCode, OptionalExtension, Row, params};
use tracing::debug;
use uuid::Uuid;

use crate::core::model::{
    Assignment, Event, Experiment, ExperimentStatus, ExperimentWithVariants, NewExperiment,
    Properties, Variant,
};
use crate::error::{LabError, Result};
use crate::storage::{EventFilter, ExperimentStore, format_timestamp, migrations, now_micros, to_micros};

const EXPERIMENT_COLUMNS: &str = "id, name, description, status, start_time, end_time,
     primary_metric_name, target_duration_days, target_confidence, updated_at";

/// SQLite-backed experiment store.
///
/// One connection, serialized behind a mutex. Assignment uniqueness comes
/// from the (experiment_id, user_id) primary key.
pub struct Database {
    conn: Mutex<Connection>,
    schema_version: u32,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("schema_version", &self.schema_version)
            .finish_non_exhaustive()
    }
}

impl Database {
    /// Open database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        Self::configure_pragmas(&conn)?;
        let schema_version = migrations::run_migrations(&conn)?;
        debug!(path = %path.display(), schema_version, "database opened");

        Ok(Self {
            conn: Mutex::new(conn),
            schema_version,
        })
    }

    /// Private in-memory database, mostly for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let schema_version = migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            schema_version,
        })
    }

    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    #[must_use]
    pub const fn schema_version(&self) -> u32 {
        self.schema_version
    }

    pub fn integrity_check(&self) -> Result<bool> {
        let result: String = self
            .conn()
            .query_row("PRAGMA integrity_check;", [], |row| row.get(0))?;
        Ok(result == "ok")
    }

    fn configure_pragmas(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;",
        )?;
        Ok(())
    }

    fn experiment_by_id(conn: &Connection, experiment_id: &str) -> Result<Option<Experiment>> {
        let sql = format!("SELECT {EXPERIMENT_COLUMNS} FROM experiments WHERE id = ?");
        Ok(conn
            .query_row(&sql, [experiment_id], experiment_from_row)
            .optional()?)
    }

    fn variants_for(conn: &Connection, experiment_id: &str) -> Result<Vec<Variant>> {
        let mut stmt = conn.prepare(
            "SELECT id, experiment_id, name, traffic_allocation_percent, is_control,
                    configuration_json
             FROM variants WHERE experiment_id = ? ORDER BY name, id",
        )?;
        let rows = stmt.query_map([experiment_id], variant_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }
}

impl ExperimentStore for Database {
    fn get_assignment(&self, experiment_id: &str, user_id: &str) -> Result<Option<Assignment>> {
        let conn = self.conn();
        Ok(conn
            .query_row(
                "SELECT experiment_id, user_id, variant_id, assigned_at
                 FROM assignments WHERE experiment_id = ? AND user_id = ?",
                params![experiment_id, user_id],
                assignment_from_row,
            )
            .optional()?)
    }

    fn get_assignments_for_experiment(&self, experiment_id: &str) -> Result<Vec<Assignment>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT experiment_id, user_id, variant_id, assigned_at
             FROM assignments WHERE experiment_id = ? ORDER BY assigned_at, user_id",
        )?;
        let rows = stmt.query_map([experiment_id], assignment_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn create_assignment(
        &self,
        experiment_id: &str,
        user_id: &str,
        variant_id: &str,
    ) -> Result<Assignment> {
        let assignment = Assignment {
            experiment_id: experiment_id.to_string(),
            user_id: user_id.to_string(),
            variant_id: variant_id.to_string(),
            assigned_at: now_micros(),
        };

        let conn = self.conn();
        conn.execute(
            "INSERT INTO assignments (experiment_id, user_id, variant_id, assigned_at)
             VALUES (?, ?, ?, ?)",
            params![
                assignment.experiment_id,
                assignment.user_id,
                assignment.variant_id,
                format_timestamp(assignment.assigned_at)
            ],
        )
        .map_err(|err| {
            conflict_or(
                err,
                format!("user {user_id} is already assigned in experiment {experiment_id}"),
            )
        })?;

        Ok(assignment)
    }

    fn get_experiment_with_variants(
        &self,
        experiment_id: &str,
    ) -> Result<Option<ExperimentWithVariants>> {
        let conn = self.conn();
        let Some(experiment) = Self::experiment_by_id(&conn, experiment_id)? else {
            return Ok(None);
        };
        let variants = Self::variants_for(&conn, experiment_id)?;
        Ok(Some(ExperimentWithVariants {
            experiment,
            variants,
        }))
    }

    fn get_events_for_experiment(
        &self,
        experiment_id: &str,
        filter: &EventFilter,
    ) -> Result<Vec<Event>> {
        let mut sql = "SELECT id, user_id, event_type, timestamp, experiment_id, properties_json
                       FROM events WHERE experiment_id = ?"
            .to_string();
        let mut args = vec![experiment_id.to_string()];

        if let Some(event_type) = &filter.event_type {
            sql.push_str(" AND event_type = ?");
            args.push(event_type.clone());
        }
        if let Some(start) = filter.start_time {
            sql.push_str(" AND timestamp >= ?");
            args.push(format_timestamp(start));
        }
        if let Some(end) = filter.end_time {
            sql.push_str(" AND timestamp <= ?");
            args.push(format_timestamp(end));
        }
        sql.push_str(" ORDER BY timestamp, id");

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(rusqlite::params_from_iter(args.iter()), event_from_row)?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn create_experiment(&self, new: &NewExperiment) -> Result<ExperimentWithVariants> {
        let now = now_micros();
        let experiment = Experiment {
            id: Uuid::new_v4().to_string(),
            name: new.name.clone(),
            description: new.description.clone(),
            status: new.status,
            start_time: new.start_time.map_or(now, to_micros),
            end_time: new.end_time.map(to_micros),
            primary_metric_name: new.primary_metric_name.clone(),
            target_duration_days: new.target_duration_days,
            target_confidence: new.target_confidence,
            updated_at: now,
        };
        let variants: Vec<Variant> = new
            .variants
            .iter()
            .map(|v| Variant {
                id: Uuid::new_v4().to_string(),
                experiment_id: experiment.id.clone(),
                name: v.name.clone(),
                traffic_allocation_percent: v.traffic_allocation_percent,
                is_control: v.is_control,
                configuration: v.configuration.clone(),
            })
            .collect();

        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO experiments (
                id, name, description, status, start_time, end_time,
                primary_metric_name, target_duration_days, target_confidence, updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            params![
                experiment.id,
                experiment.name,
                experiment.description,
                experiment.status.as_str(),
                format_timestamp(experiment.start_time),
                experiment.end_time.map(format_timestamp),
                experiment.primary_metric_name,
                experiment.target_duration_days,
                experiment.target_confidence,
                format_timestamp(experiment.updated_at),
            ],
        )
        .map_err(|err| conflict_or(err, format!("experiment name already exists: {}", new.name)))?;

        for variant in &variants {
            let configuration = variant
                .configuration
                .as_ref()
                .map(serde_json::to_string)
                .transpose()?;
            tx.execute(
                "INSERT INTO variants (
                    id, experiment_id, name, traffic_allocation_percent, is_control,
                    configuration_json
                 ) VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    variant.id,
                    variant.experiment_id,
                    variant.name,
                    variant.traffic_allocation_percent,
                    variant.is_control,
                    configuration,
                ],
            )
            .map_err(|err| conflict_or(err, format!("duplicate variant name: {}", variant.name)))?;
        }
        tx.commit()?;

        debug!(experiment_id = %experiment.id, variants = variants.len(), "experiment created");
        let mut variants = variants;
        variants.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
        Ok(ExperimentWithVariants {
            experiment,
            variants,
        })
    }

    fn list_experiments(&self, limit: usize, offset: usize) -> Result<Vec<Experiment>> {
        let sql = format!(
            "SELECT {EXPERIMENT_COLUMNS} FROM experiments
             ORDER BY start_time DESC, name ASC LIMIT ? OFFSET ?"
        );
        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![sql_count(limit), sql_count(offset)],
            experiment_from_row,
        )?;
        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    fn update_experiment_status(
        &self,
        experiment_id: &str,
        status: ExperimentStatus,
    ) -> Result<Experiment> {
        let conn = self.conn();
        let changed = conn.execute(
            "UPDATE experiments SET status = ?, updated_at = ? WHERE id = ?",
            params![status.as_str(), format_timestamp(now_micros()), experiment_id],
        )?;
        if changed == 0 {
            return Err(LabError::NotFound(format!(
                "experiment not found: {experiment_id}"
            )));
        }
        Self::experiment_by_id(&conn, experiment_id)?.ok_or_else(|| {
            LabError::StorageUnavailable(format!("experiment {experiment_id} vanished after update"))
        })
    }

    fn insert_event(&self, event: &Event) -> Result<()> {
        let properties = serde_json::to_string(&event.properties)?;
        self.conn().execute(
            "INSERT INTO events (id, user_id, event_type, timestamp, experiment_id, properties_json)
             VALUES (?, ?, ?, ?, ?, ?)",
            params![
                event.id,
                event.user_id,
                event.event_type,
                format_timestamp(event.timestamp),
                event.experiment_id,
                properties,
            ],
        )?;
        Ok(())
    }
}

fn sql_count(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// Map a uniqueness violation to [`LabError::Conflict`]; anything else stays a
/// database error.
fn conflict_or(err: rusqlite::Error, message: String) -> LabError {
    if err.sqlite_error_code() == Some(SqliteErrorCode::ConstraintViolation) {
        LabError::Conflict(message)
    } else {
        LabError::Database(err)
    }
}

fn conversion_error(
    idx: usize,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| conversion_error(idx, err))
}

fn optional_timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(idx)?;
    raw.map(|value| {
        DateTime::parse_from_rfc3339(&value)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|err| conversion_error(idx, err))
    })
    .transpose()
}

fn experiment_from_row(row: &Row<'_>) -> rusqlite::Result<Experiment> {
    let status: String = row.get(3)?;
    Ok(Experiment {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        status: status.parse().map_err(|err| conversion_error(3, err))?,
        start_time: timestamp_at(row, 4)?,
        end_time: optional_timestamp_at(row, 5)?,
        primary_metric_name: row.get(6)?,
        target_duration_days: row.get(7)?,
        target_confidence: row.get(8)?,
        updated_at: timestamp_at(row, 9)?,
    })
}

fn variant_from_row(row: &Row<'_>) -> rusqlite::Result<Variant> {
    let configuration: Option<String> = row.get(5)?;
    Ok(Variant {
        id: row.get(0)?,
        experiment_id: row.get(1)?,
        name: row.get(2)?,
        traffic_allocation_percent: row.get(3)?,
        is_control: row.get(4)?,
        configuration: configuration
            .map(|raw| serde_json::from_str(&raw))
            .transpose()
            .map_err(|err| conversion_error(5, err))?,
    })
}

fn assignment_from_row(row: &Row<'_>) -> rusqlite::Result<Assignment> {
    Ok(Assignment {
        experiment_id: row.get(0)?,
        user_id: row.get(1)?,
        variant_id: row.get(2)?,
        assigned_at: timestamp_at(row, 3)?,
    })
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let properties: String = row.get(5)?;
    let properties: Properties =
        serde_json::from_str(&properties).map_err(|err| conversion_error(5, err))?;
    Ok(Event {
        id: row.get(0)?,
        user_id: row.get(1)?,
        event_type: row.get(2)?,
        timestamp: timestamp_at(row, 3)?,
        experiment_id: row.get(4)?,
        properties,
    })
}

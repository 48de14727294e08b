//! Embedded analytical store backend.
//!
//! A single SQLite file holds both warehouse tables. The engine is not safe
//! for concurrent multi-process writers, so one connection is held for the
//! lifetime of the client behind a mutex and the orchestrator serializes
//! all loads. Tables are provisioned on open if absent.

use std::path::Path;
use std::sync::Mutex;

use log::{debug, info};
use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::error::WarehouseError;
use crate::ingest::{EpochRecord, SleepStage};
use crate::warehouse::WarehouseClient;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS SLEEP_EPOCHS (
    SUBJECT_ID     INTEGER NOT NULL,
    EPOCH_IDX      INTEGER NOT NULL,
    STAGE          TEXT    NOT NULL,
    DELTA_POWER    REAL,
    THETA_POWER    REAL,
    ALPHA_POWER    REAL,
    SIGMA_POWER    REAL,
    BETA_POWER     REAL,
    LOAD_TIMESTAMP TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
CREATE INDEX IF NOT EXISTS IDX_SLEEP_EPOCHS_SUBJECT ON SLEEP_EPOCHS (SUBJECT_ID);

CREATE TABLE IF NOT EXISTS INGESTION_ERRORS (
    ERROR_ID      TEXT PRIMARY KEY,
    SUBJECT_ID    INTEGER NOT NULL,
    ERROR_TYPE    TEXT    NOT NULL,
    ERROR_MESSAGE TEXT    NOT NULL,
    STACK_TRACE   TEXT,
    OCCURRED_AT   TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
);
";

/// SQLite implementation of the warehouse client for local persistence
pub struct EmbeddedWarehouse {
    conn: Mutex<Connection>,
}

impl EmbeddedWarehouse {
    /// Open (or create) the database file and provision the schema
    pub fn open(db_path: &Path) -> Result<Self, WarehouseError> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| {
                    WarehouseError::ConnectionFailed {
                        details: format!("cannot create {:?}: {}", parent, err),
                    }
                })?;
            }
        }

        let conn = Connection::open(db_path).map_err(|err| WarehouseError::ConnectionFailed {
            details: err.to_string(),
        })?;
        conn.execute_batch(SCHEMA_SQL)
            .map_err(|err| WarehouseError::SchemaSetupFailed {
                details: err.to_string(),
            })?;

        info!("[Warehouse] Embedded store ready at {:?}", db_path);
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Per-subject row counts in SLEEP_EPOCHS, ordered by subject id
    pub fn epoch_counts(&self) -> Result<Vec<(u32, u64)>, WarehouseError> {
        let conn = self.conn.lock().expect("warehouse connection poisoned");
        let mut stmt = conn.prepare(
            "SELECT SUBJECT_ID, COUNT(*) FROM SLEEP_EPOCHS GROUP BY SUBJECT_ID ORDER BY SUBJECT_ID",
        )?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, u32>(0)?, row.get::<_, u64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// All persisted epochs for one subject, ordered by epoch index
    pub fn fetch_epochs(&self, subject_id: u32) -> Result<Vec<EpochRecord>, WarehouseError> {
        let conn = self.conn.lock().expect("warehouse connection poisoned");
        let mut stmt = conn.prepare(
            "SELECT SUBJECT_ID, EPOCH_IDX, STAGE, DELTA_POWER, THETA_POWER,
                    ALPHA_POWER, SIGMA_POWER, BETA_POWER
             FROM SLEEP_EPOCHS WHERE SUBJECT_ID = ?1 ORDER BY EPOCH_IDX",
        )?;
        let rows = stmt
            .query_map(params![subject_id], |row| {
                let stage: String = row.get(2)?;
                Ok(EpochRecord {
                    subject_id: row.get(0)?,
                    epoch_idx: row.get(1)?,
                    stage: SleepStage::from_wire(&stage).unwrap_or(SleepStage::Nan),
                    delta_power: row.get(3)?,
                    theta_power: row.get(4)?,
                    alpha_power: row.get(5)?,
                    sigma_power: row.get(6)?,
                    beta_power: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Error-log rows as (subject_id, error_type, error_message)
    pub fn error_rows(&self) -> Result<Vec<(u32, String, String)>, WarehouseError> {
        let conn = self.conn.lock().expect("warehouse connection poisoned");
        let mut stmt = conn.prepare(
            "SELECT SUBJECT_ID, ERROR_TYPE, ERROR_MESSAGE FROM INGESTION_ERRORS
             ORDER BY OCCURRED_AT, ERROR_ID",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get::<_, u32>(0)?, row.get(1)?, row.get(2)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

impl WarehouseClient for EmbeddedWarehouse {
    fn load_epochs(
        &self,
        rows: &[EpochRecord],
        subject_id: u32,
        overwrite: bool,
    ) -> Result<(), WarehouseError> {
        let mut conn = self.conn.lock().expect("warehouse connection poisoned");
        let tx = conn.transaction()?;

        if overwrite {
            let deleted = tx.execute(
                "DELETE FROM SLEEP_EPOCHS WHERE SUBJECT_ID = ?1",
                params![subject_id],
            )?;
            if deleted > 0 {
                debug!(
                    "[Warehouse] Replaced {} existing rows for subject {}",
                    deleted, subject_id
                );
            }
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO SLEEP_EPOCHS (
                    SUBJECT_ID, EPOCH_IDX, STAGE, DELTA_POWER, THETA_POWER,
                    ALPHA_POWER, SIGMA_POWER, BETA_POWER
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            )?;
            for row in rows {
                stmt.execute(params![
                    row.subject_id,
                    row.epoch_idx,
                    row.stage.as_str(),
                    row.delta_power,
                    row.theta_power,
                    row.alpha_power,
                    row.sigma_power,
                    row.beta_power,
                ])?;
            }
        }

        tx.commit()?;
        Ok(())
    }

    fn log_ingestion_error(
        &self,
        subject_id: u32,
        error_type: &str,
        error_message: &str,
        stack_trace: Option<&str>,
    ) -> Result<(), WarehouseError> {
        let conn = self.conn.lock().expect("warehouse connection poisoned");
        conn.execute(
            "INSERT INTO INGESTION_ERRORS (
                ERROR_ID, SUBJECT_ID, ERROR_TYPE, ERROR_MESSAGE, STACK_TRACE
             ) VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                Uuid::new_v4().to_string(),
                subject_id,
                error_type,
                error_message,
                stack_trace,
            ],
        )
        .map_err(|err| WarehouseError::ErrorLogFailed {
            details: err.to_string(),
        })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_rows(subject_id: u32, count: u32) -> Vec<EpochRecord> {
        (0..count)
            .map(|epoch_idx| EpochRecord {
                subject_id,
                epoch_idx,
                stage: SleepStage::N2,
                delta_power: 10.5,
                theta_power: 5.2,
                alpha_power: 2.1,
                sigma_power: 1.5,
                beta_power: -0.8,
            })
            .collect()
    }

    fn open_temp() -> (tempfile::TempDir, EmbeddedWarehouse) {
        let dir = tempfile::tempdir().unwrap();
        let store = EmbeddedWarehouse::open(&dir.path().join("test.db")).unwrap();
        (dir, store)
    }

    #[test]
    fn tables_are_provisioned_on_open() {
        let (_dir, store) = open_temp();
        assert!(store.epoch_counts().unwrap().is_empty());
        assert!(store.error_rows().unwrap().is_empty());
    }

    #[test]
    fn load_is_idempotent_per_subject() {
        let (_dir, store) = open_temp();
        let rows = sample_rows(1, 5);

        store.load_epochs(&rows, 1, true).unwrap();
        store.load_epochs(&rows, 1, true).unwrap();

        assert_eq!(store.epoch_counts().unwrap(), vec![(1, 5)]);
        let persisted = store.fetch_epochs(1).unwrap();
        assert_eq!(persisted, rows);
    }

    #[test]
    fn additive_mode_appends_subsequent_batches() {
        let (_dir, store) = open_temp();
        let first = sample_rows(2, 3);
        let second: Vec<EpochRecord> = sample_rows(2, 5)
            .into_iter()
            .skip(3)
            .collect();

        // First batch clears, subsequent batches append
        store.load_epochs(&first, 2, true).unwrap();
        store.load_epochs(&second, 2, false).unwrap();
        assert_eq!(store.epoch_counts().unwrap(), vec![(2, 5)]);

        // A re-run starting with overwrite leaves exactly one copy
        store.load_epochs(&first, 2, true).unwrap();
        store.load_epochs(&second, 2, false).unwrap();
        assert_eq!(store.epoch_counts().unwrap(), vec![(2, 5)]);

        let indices: Vec<u32> = store
            .fetch_epochs(2)
            .unwrap()
            .iter()
            .map(|r| r.epoch_idx)
            .collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn overwrite_leaves_other_subjects_alone() {
        let (_dir, store) = open_temp();
        store.load_epochs(&sample_rows(1, 4), 1, true).unwrap();
        store.load_epochs(&sample_rows(2, 6), 2, true).unwrap();
        store.load_epochs(&sample_rows(1, 2), 1, true).unwrap();
        assert_eq!(store.epoch_counts().unwrap(), vec![(1, 2), (2, 6)]);
    }

    #[test]
    fn error_log_is_append_only() {
        let (_dir, store) = open_temp();
        store
            .log_ingestion_error(3, "ExtractionFailed", "corrupt EDF header", Some("trace"))
            .unwrap();
        store
            .log_ingestion_error(3, "ExtractionFailed", "second attempt", None)
            .unwrap();

        let rows = store.error_rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].0, 3);
        assert_eq!(rows[0].1, "ExtractionFailed");
    }

    #[test]
    fn stage_labels_roundtrip_through_storage() {
        let (_dir, store) = open_temp();
        let mut rows = sample_rows(4, 2);
        rows[0].stage = SleepStage::Rem;
        rows[1].stage = SleepStage::Nan;
        store.load_epochs(&rows, 4, true).unwrap();

        let persisted = store.fetch_epochs(4).unwrap();
        assert_eq!(persisted[0].stage, SleepStage::Rem);
        assert_eq!(persisted[1].stage, SleepStage::Nan);
    }
}

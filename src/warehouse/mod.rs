// Warehouse client capability interface
//
// Two operations, implemented identically in contract by every backend:
// loading a subject's epoch rows (idempotent replace at subject
// granularity, additive within one multi-batch run) and appending to the
// ingestion error log. Backends are swapped by configuration through an
// explicit factory, never by runtime type inspection.
//
// All methods are synchronous; the orchestrator invokes them from blocking
// worker threads and serializes every load, so backends never see
// concurrent writers.

mod embedded;
mod remote;

pub use embedded::EmbeddedWarehouse;
pub use remote::RemoteWarehouse;

use std::sync::Arc;

use crate::config::{PipelineConfig, WarehouseKind};
use crate::error::WarehouseError;
use crate::ingest::EpochRecord;

/// Blueprint every warehouse backend must follow
pub trait WarehouseClient: Send + Sync {
    /// Persist a run of epoch rows for one subject.
    ///
    /// With `overwrite` set, any existing rows for `subject_id` are deleted
    /// first so repeated runs never duplicate data; the orchestrator sets
    /// it on the first batch of a subject and clears it for the rest.
    fn load_epochs(
        &self,
        rows: &[EpochRecord],
        subject_id: u32,
        overwrite: bool,
    ) -> Result<(), WarehouseError>;

    /// Append one row to the ingestion error log.
    ///
    /// Append-only; rows are never mutated or deleted. Callers treat a
    /// failure here as best-effort and keep going.
    fn log_ingestion_error(
        &self,
        subject_id: u32,
        error_type: &str,
        error_message: &str,
        stack_trace: Option<&str>,
    ) -> Result<(), WarehouseError>;
}

/// Construct the configured backend.
///
/// The only fatal error in the whole pipeline: if the warehouse cannot be
/// initialized there is nowhere to put results or error rows.
pub fn create_client(config: &PipelineConfig) -> Result<Arc<dyn WarehouseClient>, WarehouseError> {
    match config.warehouse {
        WarehouseKind::Embedded => {
            let client = EmbeddedWarehouse::open(&config.db_path)?;
            Ok(Arc::new(client))
        }
        WarehouseKind::Remote => {
            let base_url = config.remote_url.clone().ok_or_else(|| {
                WarehouseError::ConnectionFailed {
                    details: "remote warehouse selected but remote_url is not configured"
                        .to_string(),
                }
            })?;
            let client = RemoteWarehouse::new(base_url, config.remote_token.clone())?;
            Ok(Arc::new(client))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_builds_embedded_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = PipelineConfig::default();
        config.warehouse = WarehouseKind::Embedded;
        config.db_path = dir.path().join("factory.db");
        assert!(create_client(&config).is_ok());
    }

    #[test]
    fn factory_requires_url_for_remote_backend() {
        let mut config = PipelineConfig::default();
        config.warehouse = WarehouseKind::Remote;
        config.remote_url = None;
        assert!(create_client(&config).is_err());
    }
}

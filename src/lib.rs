// Sleep ETL Core - EEG sleep-stage feature pipeline
// Batch extraction, validation, and idempotent warehouse loading

// Module declarations
pub mod analysis;
pub mod config;
pub mod error;
pub mod ingest;
pub mod pipeline;
pub mod signal;
pub mod validate;
pub mod warehouse;

// Re-exports for convenience
pub use config::{PipelineConfig, WarehouseKind};
pub use error::{ErrorCode, SubjectError};
pub use ingest::{Batch, EpochRecord, SleepStage};
pub use pipeline::{IngestionPipeline, RunSummary};
pub use validate::{SchemaValidator, ValidationProfile};
pub use warehouse::{create_client, EmbeddedWarehouse, RemoteWarehouse, WarehouseClient};

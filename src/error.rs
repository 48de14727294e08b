// Error types for the sleep ETL pipeline
//
// This module defines custom error types for signal extraction, validation,
// and warehouse operations, providing structured error handling with error
// codes suitable for the ingestion error log.

use std::fmt;

use log::error;

/// Error codes for structured error reporting
///
/// This trait provides a standard way to get error codes and messages
/// from custom error types, enabling consistent error handling across
/// the pipeline and the persisted error log.
pub trait ErrorCode {
    /// Get the numeric error code
    fn code(&self) -> i32;

    /// Get the human-readable error message
    fn message(&self) -> String;
}

/// Signal-source errors raised by the upstream EDF/PSD collaborator
///
/// These cover opening a recording, reading annotations, segmenting the
/// signal into epochs, and computing power spectral densities.
///
/// Error code ranges: 1001-1004
#[derive(Debug, Clone, PartialEq)]
pub enum SignalError {
    /// Failed to open the PSG recording file
    OpenFailed { path: String, reason: String },

    /// Failed to read the hypnogram annotation file
    AnnotationFailed { path: String, reason: String },

    /// Annotations could not be segmented into fixed-duration epochs
    SegmentationFailed { reason: String },

    /// PSD computation failed for an epoch slice
    PsdFailed { reason: String },
}

impl ErrorCode for SignalError {
    fn code(&self) -> i32 {
        match self {
            SignalError::OpenFailed { .. } => 1001,
            SignalError::AnnotationFailed { .. } => 1002,
            SignalError::SegmentationFailed { .. } => 1003,
            SignalError::PsdFailed { .. } => 1004,
        }
    }

    fn message(&self) -> String {
        match self {
            SignalError::OpenFailed { path, reason } => {
                format!("Failed to open recording {}: {}", path, reason)
            }
            SignalError::AnnotationFailed { path, reason } => {
                format!("Failed to read annotations {}: {}", path, reason)
            }
            SignalError::SegmentationFailed { reason } => {
                format!("Failed to segment annotations into epochs: {}", reason)
            }
            SignalError::PsdFailed { reason } => {
                format!("PSD computation failed: {}", reason)
            }
        }
    }
}

impl fmt::Display for SignalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignalError (code {}): {}", self.code(), self.message())
    }
}

impl std::error::Error for SignalError {}

/// A single schema violation found while validating a batch
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaViolation {
    pub subject_id: u32,
    pub epoch_idx: u32,
    pub field: &'static str,
    pub reason: String,
}

impl fmt::Display for SchemaViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "subject {} epoch {} field {}: {}",
            self.subject_id, self.epoch_idx, self.field, self.reason
        )
    }
}

/// All schema violations found in one batch
///
/// Validation is lazy: every row in the batch is checked and every violation
/// collected before this error is raised, so a single bad row does not hide
/// the others.
///
/// Error code: 2001
#[derive(Debug, Clone, PartialEq)]
pub struct SchemaViolations {
    pub violations: Vec<SchemaViolation>,
}

impl ErrorCode for SchemaViolations {
    fn code(&self) -> i32 {
        2001
    }

    fn message(&self) -> String {
        let shown: Vec<String> = self
            .violations
            .iter()
            .take(5)
            .map(|v| v.to_string())
            .collect();
        let suffix = if self.violations.len() > 5 {
            format!(" (+{} more)", self.violations.len() - 5)
        } else {
            String::new()
        };
        format!(
            "{} schema violation(s): {}{}",
            self.violations.len(),
            shown.join("; "),
            suffix
        )
    }
}

impl fmt::Display for SchemaViolations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "SchemaViolations (code {}): {}",
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for SchemaViolations {}

/// Warehouse backend errors
///
/// These cover connection setup, schema provisioning, and batch writes for
/// both the embedded store and the remote warehouse.
///
/// Error code ranges: 3001-3005
#[derive(Debug)]
pub enum WarehouseError {
    /// Could not open or connect to the backend
    ConnectionFailed { details: String },

    /// Table provisioning failed
    SchemaSetupFailed { details: String },

    /// Writing a batch of epoch rows failed
    WriteFailed { details: String },

    /// Writing an error-log row failed
    ErrorLogFailed { details: String },

    /// Remote warehouse returned a non-success HTTP status
    HttpStatus { status: u16, body: String },
}

impl ErrorCode for WarehouseError {
    fn code(&self) -> i32 {
        match self {
            WarehouseError::ConnectionFailed { .. } => 3001,
            WarehouseError::SchemaSetupFailed { .. } => 3002,
            WarehouseError::WriteFailed { .. } => 3003,
            WarehouseError::ErrorLogFailed { .. } => 3004,
            WarehouseError::HttpStatus { .. } => 3005,
        }
    }

    fn message(&self) -> String {
        match self {
            WarehouseError::ConnectionFailed { details } => {
                format!("Warehouse connection failed: {}", details)
            }
            WarehouseError::SchemaSetupFailed { details } => {
                format!("Warehouse schema setup failed: {}", details)
            }
            WarehouseError::WriteFailed { details } => {
                format!("Warehouse write failed: {}", details)
            }
            WarehouseError::ErrorLogFailed { details } => {
                format!("Error-log write failed: {}", details)
            }
            WarehouseError::HttpStatus { status, body } => {
                format!("Remote warehouse returned HTTP {}: {}", status, body)
            }
        }
    }
}

impl fmt::Display for WarehouseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "WarehouseError (code {}): {}",
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for WarehouseError {}

impl From<rusqlite::Error> for WarehouseError {
    fn from(err: rusqlite::Error) -> Self {
        WarehouseError::WriteFailed {
            details: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for WarehouseError {
    fn from(err: reqwest::Error) -> Self {
        WarehouseError::WriteFailed {
            details: err.to_string(),
        }
    }
}

/// Terminal per-subject failure classification
///
/// Exactly one of these is produced when a subject's pipeline short-circuits.
/// The `error_type` string is what gets persisted to INGESTION_ERRORS.
#[derive(Debug)]
pub enum SubjectError {
    /// The source yielded no files or zero epochs for the subject.
    /// A legitimate empty result, recorded but not treated as a defect.
    NoData { details: String },

    /// I/O or signal-processing failure during extraction
    ExtractionFailed { details: String },

    /// One or more rows violated the data contract
    Schema(SchemaViolations),

    /// Backend write failure during load
    LoadFailed(WarehouseError),

    /// Unexpected failure in the orchestration loop itself
    CoordinationFailed { details: String },
}

impl SubjectError {
    /// Error-type label persisted to the ingestion error log
    pub fn error_type(&self) -> &'static str {
        match self {
            SubjectError::NoData { .. } => "NoData",
            SubjectError::ExtractionFailed { .. } => "ExtractionFailed",
            SubjectError::Schema(_) => "SchemaErrors",
            SubjectError::LoadFailed(_) => "LoadFailed",
            SubjectError::CoordinationFailed { .. } => "CriticalCoordinationFailure",
        }
    }

    /// Whether the failure is plausibly transient and worth a retry.
    /// Only extraction failures qualify; the rest are deterministic.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SubjectError::ExtractionFailed { .. })
    }
}

impl ErrorCode for SubjectError {
    fn code(&self) -> i32 {
        match self {
            SubjectError::NoData { .. } => 4001,
            SubjectError::ExtractionFailed { .. } => 4002,
            SubjectError::Schema(e) => e.code(),
            SubjectError::LoadFailed(e) => e.code(),
            SubjectError::CoordinationFailed { .. } => 4005,
        }
    }

    fn message(&self) -> String {
        match self {
            SubjectError::NoData { details } => format!("No data: {}", details),
            SubjectError::ExtractionFailed { details } => {
                format!("Extraction failed: {}", details)
            }
            SubjectError::Schema(e) => e.message(),
            SubjectError::LoadFailed(e) => e.message(),
            SubjectError::CoordinationFailed { details } => {
                format!("Coordination failure: {}", details)
            }
        }
    }
}

impl fmt::Display for SubjectError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} (code {}): {}",
            self.error_type(),
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for SubjectError {}

impl From<SignalError> for SubjectError {
    fn from(err: SignalError) -> Self {
        SubjectError::ExtractionFailed {
            details: err.message(),
        }
    }
}

impl From<SchemaViolations> for SubjectError {
    fn from(err: SchemaViolations) -> Self {
        SubjectError::Schema(err)
    }
}

impl From<WarehouseError> for SubjectError {
    fn from(err: WarehouseError) -> Self {
        SubjectError::LoadFailed(err)
    }
}

/// Log a subject-level failure with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_subject_error(subject_id: u32, err: &SubjectError) {
    error!(
        "Subject {} failed: type={}, code={}, message={}",
        subject_id,
        err.error_type(),
        err.code(),
        err.message()
    );
}

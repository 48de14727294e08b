//! Declarative data-quality contract checked against every extracted batch
//! before staging.
//!
//! Validation is lazy: every row is checked and every violation collected
//! before an error is returned, so one bad row cannot hide the rest.
//!
//! Two profiles exist because the contract drifted across pipeline
//! revisions. `Permissive` is canonical: dB values are legitimately negative
//! for low-power epochs, so only non-finite values (NaN/Inf) indicate a real
//! computation failure, and the full 7-symbol stage set (including MOVE and
//! NAN) is accepted. `Strict` reproduces the older contract: the 5-symbol
//! clinical stage set and non-negative power only.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{SchemaViolation, SchemaViolations};
use crate::ingest::{Batch, EpochRecord};

/// Which revision of the data contract to enforce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ValidationProfile {
    /// 7-symbol stage set, negative dB allowed, NaN/Inf rejected (canonical)
    Permissive,
    /// 5-symbol clinical stage set, power must be finite and non-negative
    Strict,
}

impl Default for ValidationProfile {
    fn default() -> Self {
        ValidationProfile::Permissive
    }
}

impl fmt::Display for ValidationProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationProfile::Permissive => write!(f, "permissive"),
            ValidationProfile::Strict => write!(f, "strict"),
        }
    }
}

impl FromStr for ValidationProfile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "permissive" => Ok(ValidationProfile::Permissive),
            "strict" => Ok(ValidationProfile::Strict),
            other => Err(format!("unknown validation profile: {}", other)),
        }
    }
}

/// Batch validator enforcing the selected profile
#[derive(Debug, Clone, Copy)]
pub struct SchemaValidator {
    profile: ValidationProfile,
}

impl SchemaValidator {
    pub fn new(profile: ValidationProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> ValidationProfile {
        self.profile
    }

    /// Check every row of a batch, collecting all violations.
    ///
    /// Returns `Ok(())` when the batch satisfies the contract; otherwise
    /// the full violation list.
    pub fn validate(&self, batch: &Batch) -> Result<(), SchemaViolations> {
        let mut violations = Vec::new();
        for record in batch.records() {
            self.check_record(record, &mut violations);
        }
        if violations.is_empty() {
            Ok(())
        } else {
            Err(SchemaViolations { violations })
        }
    }

    fn check_record(&self, record: &EpochRecord, violations: &mut Vec<SchemaViolation>) {
        if self.profile == ValidationProfile::Strict && !record.stage.is_clinical() {
            violations.push(SchemaViolation {
                subject_id: record.subject_id,
                epoch_idx: record.epoch_idx,
                field: "stage",
                reason: format!(
                    "stage {} outside the clinical set (W, N1, N2, N3, REM)",
                    record.stage.as_str()
                ),
            });
        }

        for (field, value) in record.powers() {
            if !value.is_finite() {
                violations.push(SchemaViolation {
                    subject_id: record.subject_id,
                    epoch_idx: record.epoch_idx,
                    field,
                    reason: format!("value {} is not finite", value),
                });
            } else if self.profile == ValidationProfile::Strict && value < 0.0 {
                violations.push(SchemaViolation {
                    subject_id: record.subject_id,
                    epoch_idx: record.epoch_idx,
                    field,
                    reason: format!("value {} is negative", value),
                });
            }
        }
    }
}

// Data structures for the ingestion pipeline
//
// EpochRecord is the atomic unit: one 30-second epoch of one subject's
// recording with its stage label and five band-power features. Batch is the
// unit of streaming, validation, and staging.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// The 7-symbol sleep stage vocabulary
///
/// W (wake), N1/N2/N3 (sleep depths), REM, MOVE (movement artifact),
/// NAN (unscored). Serialized with the uppercase wire labels used by the
/// warehouse STAGE column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SleepStage {
    W,
    N1,
    N2,
    N3,
    #[serde(rename = "REM")]
    Rem,
    #[serde(rename = "MOVE")]
    Move,
    #[serde(rename = "NAN")]
    Nan,
}

/// Annotation label to stage mapping for Sleep-EDF hypnograms.
/// Stages 3 and 4 are merged into N3 per current AASM scoring.
static STAGE_LABELS: Lazy<HashMap<&'static str, SleepStage>> = Lazy::new(|| {
    HashMap::from([
        ("Sleep stage W", SleepStage::W),
        ("Sleep stage 1", SleepStage::N1),
        ("Sleep stage 2", SleepStage::N2),
        ("Sleep stage 3", SleepStage::N3),
        ("Sleep stage 4", SleepStage::N3),
        ("Sleep stage R", SleepStage::Rem),
        ("Movement time", SleepStage::Move),
        ("Sleep stage ?", SleepStage::Nan),
    ])
});

impl SleepStage {
    /// Warehouse wire label
    pub fn as_str(&self) -> &'static str {
        match self {
            SleepStage::W => "W",
            SleepStage::N1 => "N1",
            SleepStage::N2 => "N2",
            SleepStage::N3 => "N3",
            SleepStage::Rem => "REM",
            SleepStage::Move => "MOVE",
            SleepStage::Nan => "NAN",
        }
    }

    /// Normalize an annotation label; unknown labels map to NAN
    pub fn from_annotation_label(label: &str) -> Self {
        STAGE_LABELS.get(label).copied().unwrap_or(SleepStage::Nan)
    }

    /// Whether the stage belongs to the strict 5-symbol clinical set
    pub fn is_clinical(&self) -> bool {
        !matches!(self, SleepStage::Move | SleepStage::Nan)
    }

    /// Parse a warehouse wire label back into the enum
    pub fn from_wire(label: &str) -> Option<Self> {
        match label {
            "W" => Some(SleepStage::W),
            "N1" => Some(SleepStage::N1),
            "N2" => Some(SleepStage::N2),
            "N3" => Some(SleepStage::N3),
            "REM" => Some(SleepStage::Rem),
            "MOVE" => Some(SleepStage::Move),
            "NAN" => Some(SleepStage::Nan),
            _ => None,
        }
    }
}

/// One scored epoch with its spectral features (dB, may be negative)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub subject_id: u32,
    pub epoch_idx: u32,
    pub stage: SleepStage,
    pub delta_power: f64,
    pub theta_power: f64,
    pub alpha_power: f64,
    pub sigma_power: f64,
    pub beta_power: f64,
}

impl EpochRecord {
    /// The five power fields in band order
    pub fn powers(&self) -> [(&'static str, f64); 5] {
        [
            ("delta_power", self.delta_power),
            ("theta_power", self.theta_power),
            ("alpha_power", self.alpha_power),
            ("sigma_power", self.sigma_power),
            ("beta_power", self.beta_power),
        ]
    }
}

/// An ordered, bounded-size run of contiguous epoch records.
///
/// Owned transiently by the streamer, validated once, then staged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Batch {
    records: Vec<EpochRecord>,
}

impl Batch {
    pub fn new(records: Vec<EpochRecord>) -> Self {
        Self { records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[EpochRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<EpochRecord> {
        self.records
    }

    /// First epoch index, if the batch is non-empty
    pub fn first_epoch_idx(&self) -> Option<u32> {
        self.records.first().map(|r| r.epoch_idx)
    }

    /// Last epoch index, if the batch is non-empty
    pub fn last_epoch_idx(&self) -> Option<u32> {
        self.records.last().map(|r| r.epoch_idx)
    }
}

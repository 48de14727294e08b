//! Upstream signal-processing collaborator interface.
//!
//! EDF parsing and Welch-method spectral estimation are external concerns;
//! this module only pins down the capability surface the pipeline consumes:
//! open a recording, read stage annotations, segment into fixed-duration
//! epochs, and compute per-epoch power spectral densities. A deterministic
//! synthetic implementation lives in [`synthetic`] for tests and demo runs.

use std::collections::HashMap;
use std::ops::Range;
use std::path::{Path, PathBuf};

use once_cell::sync::Lazy;

use crate::error::SignalError;

pub mod synthetic;

pub use synthetic::SyntheticSource;

/// Canonical channel schema for Sleep-EDF PSG montages.
///
/// Downstream band-power logic filters channels by the "EEG" substring, so
/// raw montage labels are normalized to these names right after open.
pub static CANONICAL_CHANNELS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("EEG Fpz-Cz", "EEG"),
        ("EEG Pz-Oz", "EEG2"),
        ("EOG horizontal", "EOG"),
        ("EMG submental", "EMG"),
    ])
});

/// One stage annotation from a hypnogram file
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotationEvent {
    pub onset_secs: f64,
    pub duration_secs: f64,
    pub label: String,
}

/// Result of segmenting annotations into fixed-duration epochs:
/// one integer event code per epoch plus the code-to-label table
/// needed to map codes back to textual stage labels.
#[derive(Debug, Clone)]
pub struct Segmentation {
    pub epoch_codes: Vec<u32>,
    pub code_to_label: HashMap<u32, String>,
}

impl Segmentation {
    /// Total number of 30-second epochs in the recording
    pub fn total_epochs(&self) -> usize {
        self.epoch_codes.len()
    }
}

/// Per-epoch power spectral density estimates, indexed (epoch, channel, freq).
///
/// Stored as one flat buffer; `value(e, c, f)` does the index arithmetic.
#[derive(Debug, Clone)]
pub struct PsdTensor {
    data: Vec<f64>,
    n_epochs: usize,
    n_channels: usize,
    n_freqs: usize,
}

impl PsdTensor {
    /// Build a tensor from a flat row-major buffer.
    ///
    /// # Panics
    /// Panics if the buffer length does not match the dimensions; the
    /// producing side controls both, so a mismatch is a programming error.
    pub fn new(data: Vec<f64>, n_epochs: usize, n_channels: usize, n_freqs: usize) -> Self {
        assert_eq!(
            data.len(),
            n_epochs * n_channels * n_freqs,
            "PSD buffer length does not match dimensions"
        );
        Self {
            data,
            n_epochs,
            n_channels,
            n_freqs,
        }
    }

    pub fn n_epochs(&self) -> usize {
        self.n_epochs
    }

    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    pub fn n_freqs(&self) -> usize {
        self.n_freqs
    }

    /// Power density at (epoch, channel, frequency bin)
    #[inline]
    pub fn value(&self, epoch: usize, channel: usize, freq: usize) -> f64 {
        self.data[(epoch * self.n_channels + channel) * self.n_freqs + freq]
    }
}

/// Handle to one opened PSG recording
pub trait SignalRecording {
    /// Channel labels after any renaming
    fn channel_names(&self) -> &[String];

    /// Sampling rate in Hz
    fn sample_rate(&self) -> f64;

    /// Rename channels to the canonical schema; entries for absent
    /// channels are ignored.
    fn rename_channels(&mut self, mapping: &HashMap<&'static str, &'static str>);

    /// Segment annotations into fixed-duration epochs, one event label
    /// per epoch.
    fn segment(
        &mut self,
        events: &[AnnotationEvent],
        epoch_duration_secs: f64,
    ) -> Result<Segmentation, SignalError>;

    /// Compute PSD for a contiguous slice of epochs over [fmin, fmax].
    /// Only the slice is materialized; returns the tensor plus the
    /// frequency axis (uniform grid).
    fn compute_psd(
        &mut self,
        epochs: Range<usize>,
        fmin: f64,
        fmax: f64,
    ) -> Result<(PsdTensor, Vec<f64>), SignalError>;
}

/// The external signal library, treated as an opaque capability
pub trait SignalSource {
    type Recording: SignalRecording;

    /// Open a PSG recording lazily (metadata only, no sample data)
    fn open(&self, psg_path: &Path) -> Result<Self::Recording, SignalError>;

    /// Read hypnogram stage annotations
    fn read_annotations(&self, hypno_path: &Path) -> Result<Vec<AnnotationEvent>, SignalError>;
}

/// Raw file pair for one subject
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectFiles {
    pub subject_id: u32,
    pub psg_path: PathBuf,
    pub hypno_path: PathBuf,
}

/// Source-data availability, resolved before any parallel work starts.
///
/// Download/fetch mechanics live behind this trait; the orchestrator only
/// needs every subject's file pair ensured up front so extraction workers
/// never contend on downloads.
pub trait DataRepository {
    /// Ensure raw data for the given subjects is locally available and
    /// return the file pairs that exist. Subjects with no files are simply
    /// absent from the result (the orchestrator classifies them as NoData).
    fn ensure_available(&self, subjects: &[u32]) -> Result<Vec<SubjectFiles>, SignalError>;
}

/// Repository over an already-populated local directory.
///
/// Expects `subject_<id>-PSG.edf` / `subject_<id>-Hypnogram.edf` pairs.
pub struct LocalDataRepository {
    data_dir: PathBuf,
}

impl LocalDataRepository {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }
}

impl DataRepository for LocalDataRepository {
    fn ensure_available(&self, subjects: &[u32]) -> Result<Vec<SubjectFiles>, SignalError> {
        let mut available = Vec::new();
        for &subject_id in subjects {
            let psg_path = self.data_dir.join(format!("subject_{}-PSG.edf", subject_id));
            let hypno_path = self
                .data_dir
                .join(format!("subject_{}-Hypnogram.edf", subject_id));
            if psg_path.is_file() && hypno_path.is_file() {
                available.push(SubjectFiles {
                    subject_id,
                    psg_path,
                    hypno_path,
                });
            } else {
                log::warn!(
                    "[Repository] No recording files for subject {} under {:?}",
                    subject_id,
                    self.data_dir
                );
            }
        }
        Ok(available)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn psd_tensor_indexing() {
        // 2 epochs, 2 channels, 3 freqs
        let data: Vec<f64> = (0..12).map(|v| v as f64).collect();
        let psd = PsdTensor::new(data, 2, 2, 3);
        assert_eq!(psd.value(0, 0, 0), 0.0);
        assert_eq!(psd.value(0, 1, 2), 5.0);
        assert_eq!(psd.value(1, 0, 1), 7.0);
        assert_eq!(psd.value(1, 1, 2), 11.0);
    }

    #[test]
    #[should_panic]
    fn psd_tensor_rejects_mismatched_buffer() {
        let _ = PsdTensor::new(vec![0.0; 5], 2, 2, 3);
    }

    #[test]
    fn canonical_channel_map_covers_sleep_edf_montage() {
        assert_eq!(CANONICAL_CHANNELS.get("EEG Fpz-Cz"), Some(&"EEG"));
        assert_eq!(CANONICAL_CHANNELS.get("EEG Pz-Oz"), Some(&"EEG2"));
        assert_eq!(CANONICAL_CHANNELS.get("EOG horizontal"), Some(&"EOG"));
        assert_eq!(CANONICAL_CHANNELS.get("EMG submental"), Some(&"EMG"));
    }

    #[test]
    fn local_repository_skips_missing_subjects() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("subject_1-PSG.edf"), b"x").unwrap();
        std::fs::write(dir.path().join("subject_1-Hypnogram.edf"), b"x").unwrap();
        // Subject 2 has only a PSG file, subject 3 nothing
        std::fs::write(dir.path().join("subject_2-PSG.edf"), b"x").unwrap();

        let repo = LocalDataRepository::new(dir.path());
        let files = repo.ensure_available(&[1, 2, 3]).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].subject_id, 1);
    }
}

// Batch feature streamer
//
// Bridges the external signal library and the warehouse pipeline while
// bounding peak memory to O(batch_size): only one batch's epoch slice is
// ever materialized. The stream is finite, single-pass, and ordered by
// increasing epoch_idx; any per-subject failure surfaces as an Err item
// and fuses the iterator. Retrying and logging are the caller's job.

mod types;

pub use types::{Batch, EpochRecord, SleepStage};

use std::path::Path;

use log::debug;

use crate::analysis::BandPowerExtractor;
use crate::error::SignalError;
use crate::signal::{Segmentation, SignalRecording, SignalSource, CANONICAL_CHANNELS};

/// PSD frequency range in Hz, spanning the full band table
const PSD_FMIN: f64 = 0.5;
const PSD_FMAX: f64 = 30.0;

/// Open a subject's recording and return a lazy batch stream.
///
/// Performs the per-open work up front: channel normalization, annotation
/// loading, 30-second segmentation, and total epoch count. Epoch samples
/// are not touched until the stream is consumed.
pub fn stream_batches<S: SignalSource>(
    source: &S,
    subject_id: u32,
    psg_path: &Path,
    hypno_path: &Path,
    batch_size: usize,
    epoch_duration_secs: f64,
) -> Result<BatchStream<S::Recording>, SignalError> {
    let mut recording = source.open(psg_path)?;
    recording.rename_channels(&CANONICAL_CHANNELS);

    let events = source.read_annotations(hypno_path)?;
    let segmentation = recording.segment(&events, epoch_duration_secs)?;

    debug!(
        "Subject {}: {} epochs across channels {:?}",
        subject_id,
        segmentation.total_epochs(),
        recording.channel_names()
    );

    let extractor = BandPowerExtractor::new(recording.channel_names());

    Ok(BatchStream {
        recording,
        segmentation,
        extractor,
        subject_id,
        batch_size: batch_size.max(1),
        next_epoch: 0,
        fused: false,
    })
}

/// Lazy sequence of contiguous epoch batches for one subject.
///
/// Not restartable: consuming it drives the underlying recording forward.
pub struct BatchStream<R: SignalRecording> {
    recording: R,
    segmentation: Segmentation,
    extractor: BandPowerExtractor,
    subject_id: u32,
    batch_size: usize,
    next_epoch: usize,
    fused: bool,
}

impl<R: SignalRecording> BatchStream<R> {
    /// Total epoch count computed at open time
    pub fn total_epochs(&self) -> usize {
        self.segmentation.total_epochs()
    }

    fn next_batch(&mut self) -> Result<Batch, SignalError> {
        let start = self.next_epoch;
        let end = (start + self.batch_size).min(self.total_epochs());

        // Materialize only this slice's PSD
        let (psd, freqs) = self.recording.compute_psd(start..end, PSD_FMIN, PSD_FMAX)?;
        let powers = self.extractor.extract(&psd, &freqs);

        let mut records = Vec::with_capacity(end - start);
        for offset in 0..(end - start) {
            let code = self.segmentation.epoch_codes[start + offset];
            let stage = self
                .segmentation
                .code_to_label
                .get(&code)
                .map(|label| SleepStage::from_annotation_label(label))
                .unwrap_or(SleepStage::Nan);

            records.push(EpochRecord {
                subject_id: self.subject_id,
                epoch_idx: (start + offset) as u32,
                stage,
                delta_power: powers.delta[offset],
                theta_power: powers.theta[offset],
                alpha_power: powers.alpha[offset],
                sigma_power: powers.sigma[offset],
                beta_power: powers.beta[offset],
            });
        }

        self.next_epoch = end;
        Ok(Batch::new(records))
    }
}

impl<R: SignalRecording> Iterator for BatchStream<R> {
    type Item = Result<Batch, SignalError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.fused || self.next_epoch >= self.total_epochs() {
            return None;
        }
        match self.next_batch() {
            Ok(batch) => Some(Ok(batch)),
            Err(err) => {
                self.fused = true;
                Some(Err(err))
            }
        }
    }
}

#[cfg(test)]
mod tests;

// BandPowerExtractor - spectral sleep-stage feature extraction
//
// This module turns per-epoch PSD estimates into the five scalar features
// used for sleep staging analytics (delta/theta/alpha/sigma/beta power, dB).
//
// Module organization:
// - bands: pure band-power integration over a PSD tensor
// - mod.rs: coordinator (BandPowerExtractor) and the fixed band table
//
// The band set is fixed; see BANDS. Channel selection keys on the "EEG"
// substring of canonical channel names, with a fall-back to all channels.

mod bands;

pub use bands::{band_power_db, select_channels, POWER_FLOOR, UNIT_SCALE};

use crate::signal::PsdTensor;

/// Substring filter selecting EEG channels from a canonical montage
pub const EEG_CHANNEL_FILTER: &str = "EEG";

/// A named frequency band with inclusive edges in Hz
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrequencyBand {
    pub name: &'static str,
    pub fmin: f64,
    pub fmax: f64,
}

/// The five classical EEG bands used for sleep staging
pub const BANDS: [FrequencyBand; 5] = [
    FrequencyBand {
        name: "delta",
        fmin: 0.5,
        fmax: 4.0,
    },
    FrequencyBand {
        name: "theta",
        fmin: 4.0,
        fmax: 8.0,
    },
    FrequencyBand {
        name: "alpha",
        fmin: 8.0,
        fmax: 12.0,
    },
    FrequencyBand {
        name: "sigma",
        fmin: 12.0,
        fmax: 16.0,
    },
    FrequencyBand {
        name: "beta",
        fmin: 16.0,
        fmax: 30.0,
    },
];

/// Per-epoch band powers for one batch, one Vec per band
#[derive(Debug, Clone)]
pub struct BandPowerSet {
    pub delta: Vec<f64>,
    pub theta: Vec<f64>,
    pub alpha: Vec<f64>,
    pub sigma: Vec<f64>,
    pub beta: Vec<f64>,
}

/// BandPowerExtractor coordinates band-power computation for a recording
///
/// The EEG channel subset is resolved once from the channel names and then
/// reused for every batch of the recording.
pub struct BandPowerExtractor {
    eeg_channels: Vec<usize>,
}

impl BandPowerExtractor {
    /// Create an extractor for a recording's (canonical) channel names
    pub fn new(channel_names: &[String]) -> Self {
        Self {
            eeg_channels: select_channels(channel_names, EEG_CHANNEL_FILTER),
        }
    }

    /// Channel indices the extractor averages over
    pub fn channels(&self) -> &[usize] {
        &self.eeg_channels
    }

    /// Compute all five band powers for a PSD batch
    pub fn extract(&self, psd: &PsdTensor, freqs: &[f64]) -> BandPowerSet {
        let mut powers: Vec<Vec<f64>> = BANDS
            .iter()
            .map(|band| band_power_db(psd, freqs, &self.eeg_channels, band.fmin, band.fmax))
            .collect();

        // Drain in reverse so each pop matches its band
        let beta = powers.pop().unwrap_or_default();
        let sigma = powers.pop().unwrap_or_default();
        let alpha = powers.pop().unwrap_or_default();
        let theta = powers.pop().unwrap_or_default();
        let delta = powers.pop().unwrap_or_default();

        BandPowerSet {
            delta,
            theta,
            alpha,
            sigma,
            beta,
        }
    }
}

#[cfg(test)]
mod tests;

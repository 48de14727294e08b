// Band power - Frequency-domain power integration over PSD estimates
//
// This module converts per-epoch power spectral densities into scalar band
// powers in decibels. All functions here are pure: they touch no I/O and no
// shared state, which keeps them testable independently of signal sources.

use crate::signal::PsdTensor;

/// Unit conversion from V^2 to uV^2 before the dB transform
pub const UNIT_SCALE: f64 = 1e12;

/// Floor applied to integrated power so log10 never sees zero
pub const POWER_FLOOR: f64 = 1e-10;

/// Select channel indices whose name contains `filter`.
///
/// Falls back to every channel when nothing matches, so a recording with a
/// non-standard montage still produces features instead of failing.
pub fn select_channels(channel_names: &[String], filter: &str) -> Vec<usize> {
    let matching: Vec<usize> = channel_names
        .iter()
        .enumerate()
        .filter(|(_, name)| name.contains(filter))
        .map(|(i, _)| i)
        .collect();

    if matching.is_empty() {
        (0..channel_names.len()).collect()
    } else {
        matching
    }
}

/// Compute band power in dB for every epoch of a PSD tensor.
///
/// Steps: select frequency bins with `fmin <= f <= fmax` (inclusive),
/// integrate density over the selected bins with `sum * resolution`
/// (resolution taken from the spacing of the first two bins, assuming a
/// uniform grid), scale V^2 -> uV^2, floor at [`POWER_FLOOR`], convert with
/// `10 * log10`, then average across the selected channels.
///
/// # Arguments
/// * `psd` - PSD tensor indexed (epoch, channel, frequency)
/// * `freqs` - Frequency axis parallel to the tensor's frequency dimension
/// * `channels` - Channel indices to average over (see [`select_channels`])
/// * `fmin`, `fmax` - Band edges in Hz, inclusive
///
/// # Returns
/// One dB value per epoch
pub fn band_power_db(
    psd: &PsdTensor,
    freqs: &[f64],
    channels: &[usize],
    fmin: f64,
    fmax: f64,
) -> Vec<f64> {
    // Zero selected channels would make the mean undefined; average over
    // the whole tensor instead, matching the channel-name fallback.
    let all_channels: Vec<usize>;
    let channels = if channels.is_empty() {
        all_channels = (0..psd.n_channels()).collect();
        &all_channels
    } else {
        channels
    };

    let bin_indices: Vec<usize> = freqs
        .iter()
        .enumerate()
        .filter(|(_, &f)| f >= fmin && f <= fmax)
        .map(|(i, _)| i)
        .collect();

    let freq_res = if freqs.len() >= 2 {
        freqs[1] - freqs[0]
    } else {
        1.0
    };

    let mut result = Vec::with_capacity(psd.n_epochs());
    for epoch in 0..psd.n_epochs() {
        let mut db_sum = 0.0;
        for &channel in channels {
            let density_sum: f64 = bin_indices
                .iter()
                .map(|&bin| psd.value(epoch, channel, bin))
                .sum();
            let power = (density_sum * freq_res * UNIT_SCALE).max(POWER_FLOOR);
            db_sum += 10.0 * power.log10();
        }
        result.push(db_sum / channels.len() as f64);
    }

    result
}

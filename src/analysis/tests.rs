use super::*;
use crate::signal::PsdTensor;

fn uniform_freqs(fmin: f64, fmax: f64, step: f64) -> Vec<f64> {
    let n = ((fmax - fmin) / step).round() as usize + 1;
    (0..n).map(|i| fmin + i as f64 * step).collect()
}

#[test]
fn zero_psd_floors_at_epsilon_never_nan() {
    let freqs = uniform_freqs(0.5, 30.0, 0.25);
    let psd = PsdTensor::new(vec![0.0; 2 * 3 * freqs.len()], 2, 3, freqs.len());

    // The floor applies after integration and unit scaling, so all-zero
    // input lands exactly on 10*log10(POWER_FLOOR) = -100 dB
    let expected = 10.0 * POWER_FLOOR.log10();

    for band in BANDS {
        let powers = band_power_db(&psd, &freqs, &[0, 1, 2], band.fmin, band.fmax);
        assert_eq!(powers.len(), 2);
        for p in powers {
            assert!(p.is_finite(), "band {} produced non-finite power", band.name);
            assert!((p - expected).abs() < 1e-9);
        }
    }
}

#[test]
fn band_power_integrates_constant_density() {
    // Constant density d over the delta band: power = d * n_bins * res * 1e12
    let freqs = uniform_freqs(0.5, 30.0, 0.25);
    let density = 2e-12;
    let psd = PsdTensor::new(vec![density; freqs.len()], 1, 1, freqs.len());

    let n_bins = freqs.iter().filter(|&&f| (0.5..=4.0).contains(&f)).count();
    let expected_power = density * n_bins as f64 * 0.25 * UNIT_SCALE;
    let expected_db = 10.0 * expected_power.log10();

    let powers = band_power_db(&psd, &freqs, &[0], 0.5, 4.0);
    assert!((powers[0] - expected_db).abs() < 1e-9);
}

#[test]
fn bin_selection_is_inclusive_on_both_edges() {
    let freqs = vec![3.0, 4.0, 5.0, 8.0, 9.0];
    // Density 1.0 everywhere; band [4, 8] must pick exactly bins 4, 5, 8
    let psd = PsdTensor::new(vec![1.0; freqs.len()], 1, 1, freqs.len());
    let powers = band_power_db(&psd, &freqs, &[0], 4.0, 8.0);

    let expected_power = 3.0 * 1.0 * UNIT_SCALE; // 3 bins, res 1.0
    assert!((powers[0] - 10.0 * expected_power.log10()).abs() < 1e-9);
}

#[test]
fn channel_selection_filters_on_substring() {
    let names: Vec<String> = ["EEG", "EEG2", "EOG", "EMG"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    assert_eq!(select_channels(&names, "EEG"), vec![0, 1]);
}

#[test]
fn channel_selection_falls_back_to_all_channels() {
    let names: Vec<String> = ["ECG", "Resp nasal"].iter().map(|s| s.to_string()).collect();
    assert_eq!(select_channels(&names, "EEG"), vec![0, 1]);
}

#[test]
fn extractor_fallback_averages_all_channels_without_raising() {
    // No channel name contains "EEG": the extractor must still produce
    // finite values by averaging across everything available
    let names: Vec<String> = ["ECG", "Resp nasal"].iter().map(|s| s.to_string()).collect();
    let freqs = uniform_freqs(0.5, 30.0, 0.25);
    let psd = PsdTensor::new(vec![1e-12; 3 * 2 * freqs.len()], 3, 2, freqs.len());

    let extractor = BandPowerExtractor::new(&names);
    assert_eq!(extractor.channels(), &[0, 1]);

    let set = extractor.extract(&psd, &freqs);
    for values in [&set.delta, &set.theta, &set.alpha, &set.sigma, &set.beta] {
        assert_eq!(values.len(), 3);
        assert!(values.iter().all(|v| v.is_finite()));
    }
}

#[test]
fn channel_average_is_mean_of_per_channel_db() {
    let freqs = vec![1.0, 2.0, 3.0];
    // Channel 0 density 1e-12, channel 1 density 4e-12 across all bins
    let mut data = Vec::new();
    data.extend(std::iter::repeat(1e-12).take(3));
    data.extend(std::iter::repeat(4e-12).take(3));
    let psd = PsdTensor::new(data, 1, 2, 3);

    let db0 = band_power_db(&psd, &freqs, &[0], 1.0, 3.0)[0];
    let db1 = band_power_db(&psd, &freqs, &[1], 1.0, 3.0)[0];
    let both = band_power_db(&psd, &freqs, &[0, 1], 1.0, 3.0)[0];
    assert!((both - (db0 + db1) / 2.0).abs() < 1e-9);
}

#[test]
fn band_table_covers_half_to_thirty_hz() {
    assert_eq!(BANDS[0].name, "delta");
    assert_eq!(BANDS[0].fmin, 0.5);
    assert_eq!(BANDS[4].name, "beta");
    assert_eq!(BANDS[4].fmax, 30.0);
    for pair in BANDS.windows(2) {
        assert_eq!(pair[0].fmax, pair[1].fmin);
    }
}

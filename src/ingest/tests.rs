use std::path::Path;

use super::*;
use crate::signal::SyntheticSource;

fn collect_batches(epochs: usize, batch_size: usize) -> Vec<Batch> {
    let source = SyntheticSource::new(epochs);
    let stream = stream_batches(
        &source,
        7,
        Path::new("synthetic/subject_7-PSG.edf"),
        Path::new("synthetic/subject_7-Hypnogram.edf"),
        batch_size,
        30.0,
    )
    .unwrap();
    stream.map(|b| b.unwrap()).collect()
}

#[test]
fn batch_boundaries_are_exact() {
    // 250 epochs at batch size 100 must yield [100, 100, 50]
    let batches = collect_batches(250, 100);
    let sizes: Vec<usize> = batches.iter().map(|b| b.len()).collect();
    assert_eq!(sizes, vec![100, 100, 50]);
}

#[test]
fn epoch_indices_are_contiguous_across_batches() {
    let batches = collect_batches(250, 100);
    let indices: Vec<u32> = batches
        .iter()
        .flat_map(|b| b.records().iter().map(|r| r.epoch_idx))
        .collect();
    let expected: Vec<u32> = (0..250).collect();
    assert_eq!(indices, expected);
}

#[test]
fn single_batch_when_total_below_batch_size() {
    let batches = collect_batches(42, 100);
    assert_eq!(batches.len(), 1);
    assert_eq!(batches[0].len(), 42);
    assert_eq!(batches[0].first_epoch_idx(), Some(0));
    assert_eq!(batches[0].last_epoch_idx(), Some(41));
}

#[test]
fn zero_epochs_yields_empty_stream() {
    let source = SyntheticSource::new(0);
    let mut stream = stream_batches(
        &source,
        1,
        Path::new("synthetic/subject_1-PSG.edf"),
        Path::new("synthetic/subject_1-Hypnogram.edf"),
        100,
        30.0,
    )
    .unwrap();
    assert_eq!(stream.total_epochs(), 0);
    assert!(stream.next().is_none());
}

#[test]
fn records_carry_subject_and_finite_powers() {
    let batches = collect_batches(16, 8);
    for record in batches.iter().flat_map(|b| b.records()) {
        assert_eq!(record.subject_id, 7);
        for (field, value) in record.powers() {
            assert!(value.is_finite(), "{} not finite", field);
        }
    }
}

#[test]
fn unknown_annotation_labels_become_nan_stage() {
    let source = SyntheticSource::new(10).with_unknown_label_every(5);
    let stream = stream_batches(
        &source,
        3,
        Path::new("synthetic/subject_3-PSG.edf"),
        Path::new("synthetic/subject_3-Hypnogram.edf"),
        10,
        30.0,
    )
    .unwrap();
    let batches: Vec<Batch> = stream.map(|b| b.unwrap()).collect();
    let records = batches[0].records();
    assert_eq!(records[4].stage, SleepStage::Nan);
    assert_eq!(records[9].stage, SleepStage::Nan);
    assert_ne!(records[0].stage, SleepStage::Nan);
}

#[test]
fn open_failure_surfaces_before_streaming() {
    let source = SyntheticSource::new(10).with_open_failure("subject_2");
    let result = stream_batches(
        &source,
        2,
        Path::new("synthetic/subject_2-PSG.edf"),
        Path::new("synthetic/subject_2-Hypnogram.edf"),
        10,
        30.0,
    );
    assert!(result.is_err());
}

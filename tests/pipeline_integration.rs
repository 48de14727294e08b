// End-to-end ingestion test: synthetic extraction -> validation -> embedded
// store, asserting on what actually got persisted.

use std::sync::Arc;

use sleep_etl::signal::SyntheticSource;
use sleep_etl::{EmbeddedWarehouse, IngestionPipeline, PipelineConfig, SleepStage};

#[tokio::test]
async fn full_run_persists_ordered_contiguous_epochs() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = PipelineConfig::default();
    config.starting_subject = 1;
    config.ending_subject = 1;
    config.batch_size = 100;
    config.worker_count = 2;
    config.retry_backoff_secs = 0;
    config.db_path = dir.path().join("sleep.db");
    config.staging_dir = dir.path().join("staging");

    let store = Arc::new(EmbeddedWarehouse::open(&config.db_path).unwrap());
    let source = Arc::new(SyntheticSource::new(250));

    let pipeline = IngestionPipeline::new(config, source.clone(), store.clone());
    let summary = pipeline.run(&*source).await;

    assert_eq!(summary.loaded_subjects(), vec![1]);
    assert_eq!(summary.total_epochs(), 250);

    let rows = store.fetch_epochs(1).unwrap();
    assert_eq!(rows.len(), 250);

    // Contiguous 0..249 with no gaps or repeats across batch boundaries
    for (expected_idx, row) in rows.iter().enumerate() {
        assert_eq!(row.epoch_idx, expected_idx as u32);
        assert_eq!(row.subject_id, 1);
        assert!(row.delta_power.is_finite());
        assert!(row.beta_power.is_finite());
    }

    // The synthetic hypnogram cycle starts awake
    assert_eq!(rows[0].stage, SleepStage::W);

    // No error rows for a clean run
    assert!(store.error_rows().unwrap().is_empty());
}

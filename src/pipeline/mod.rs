//! Ingestion orchestrator.
//!
//! Coordinates the per-subject pipeline: ensure raw data availability up
//! front, run extraction+validation for all subjects concurrently on a
//! bounded blocking pool, then drain results and perform loads strictly
//! sequentially in subject-id order. The serial load phase is deliberate:
//! the embedded store is a single-process file-backed engine without safe
//! concurrent multi-writer semantics, and both backends are treated
//! uniformly for correctness by construction.
//!
//! A single subject's failure never aborts the run; it is classified,
//! written to the ingestion error log, and the loop moves on.

mod staging;

pub use staging::{read_part, StagedSubject, SubjectStaging};

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use log::{info, warn};
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::config::PipelineConfig;
use crate::error::{log_subject_error, ErrorCode, SubjectError};
use crate::ingest::stream_batches;
use crate::signal::{DataRepository, SignalSource, SubjectFiles};
use crate::validate::SchemaValidator;
use crate::warehouse::WarehouseClient;

/// Where in the per-subject state machine a failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelinePhase {
    Extracting,
    Validating,
    Loading,
    Coordinating,
}

/// Terminal state of one subject after a run
#[derive(Debug)]
pub enum SubjectStatus {
    Loaded {
        epochs: u64,
    },
    Skipped {
        phase: PipelinePhase,
        error_type: &'static str,
        message: String,
    },
}

/// Per-run report: one terminal status per subject, in subject-id order
#[derive(Debug, Default)]
pub struct RunSummary {
    pub outcomes: Vec<(u32, SubjectStatus)>,
}

impl RunSummary {
    pub fn loaded_subjects(&self) -> Vec<u32> {
        self.outcomes
            .iter()
            .filter(|(_, s)| matches!(s, SubjectStatus::Loaded { .. }))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn skipped_subjects(&self) -> Vec<u32> {
        self.outcomes
            .iter()
            .filter(|(_, s)| matches!(s, SubjectStatus::Skipped { .. }))
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn total_epochs(&self) -> u64 {
        self.outcomes
            .iter()
            .map(|(_, s)| match s {
                SubjectStatus::Loaded { epochs } => *epochs,
                SubjectStatus::Skipped { .. } => 0,
            })
            .sum()
    }

    fn record(&mut self, subject_id: u32, status: SubjectStatus) {
        self.outcomes.push((subject_id, status));
    }

    /// Log the user-visible end-of-run report
    pub fn log(&self) {
        info!(
            "Pipeline finished: {} subject(s) loaded, {} skipped, {} epochs persisted",
            self.loaded_subjects().len(),
            self.skipped_subjects().len(),
            self.total_epochs()
        );
        for (subject_id, status) in &self.outcomes {
            if let SubjectStatus::Skipped {
                phase,
                error_type,
                message,
            } = status
            {
                warn!(
                    "Subject {} skipped during {:?}: {} ({})",
                    subject_id, phase, error_type, message
                );
            }
        }
    }
}

/// The batch ingestion pipeline
pub struct IngestionPipeline<S> {
    config: PipelineConfig,
    source: Arc<S>,
    client: Arc<dyn WarehouseClient>,
}

impl<S> IngestionPipeline<S>
where
    S: SignalSource + Send + Sync + 'static,
{
    pub fn new(config: PipelineConfig, source: Arc<S>, client: Arc<dyn WarehouseClient>) -> Self {
        Self {
            config,
            source,
            client,
        }
    }

    /// Run the full ingestion for the configured subject range.
    ///
    /// Subjects are extracted concurrently (bounded by `worker_count`) and
    /// loaded one at a time in range order, waiting on each extraction in
    /// sequence even when tasks complete out of order.
    pub async fn run<R: DataRepository>(&self, repository: &R) -> RunSummary {
        let subjects = self.config.subjects();
        let mut summary = RunSummary::default();
        if subjects.is_empty() {
            info!("No subjects in configured range; nothing to do");
            return summary;
        }

        info!(
            "Starting ingestion: subjects {:?}, batch_size={}, workers={}, backend={}",
            subjects, self.config.batch_size, self.config.worker_count, self.config.warehouse
        );

        // Ensure raw data for every subject before any parallel work, so
        // extraction workers never contend on downloads.
        let available: HashMap<u32, SubjectFiles> = match repository.ensure_available(&subjects) {
            Ok(files) => files.into_iter().map(|f| (f.subject_id, f)).collect(),
            Err(err) => {
                log::error!("Data availability check failed: {}", err);
                HashMap::new()
            }
        };

        // Phase 1: extraction + validation, concurrent and bounded.
        let semaphore = Arc::new(Semaphore::new(self.config.worker_count.max(1)));
        let mut tasks: Vec<(u32, Option<JoinHandle<Result<StagedSubject, SubjectError>>>)> =
            Vec::with_capacity(subjects.len());
        for &subject_id in &subjects {
            match available.get(&subject_id) {
                Some(files) => {
                    let handle = self.spawn_extraction(files.clone(), semaphore.clone());
                    tasks.push((subject_id, Some(handle)));
                }
                None => tasks.push((subject_id, None)),
            }
        }

        // Phase 2: strictly sequential loads in subject-id order.
        for (subject_id, task) in tasks {
            let status = self.drain_subject(subject_id, task).await;
            summary.record(subject_id, status);
        }

        summary.log();
        summary
    }

    fn spawn_extraction(
        &self,
        files: SubjectFiles,
        semaphore: Arc<Semaphore>,
    ) -> JoinHandle<Result<StagedSubject, SubjectError>> {
        let source = self.source.clone();
        let config = self.config.clone();
        let retries = self.config.extract_retries;
        let backoff = Duration::from_secs(self.config.retry_backoff_secs);

        tokio::spawn(async move {
            let _permit = semaphore
                .acquire_owned()
                .await
                .expect("worker semaphore closed");

            let subject_id = files.subject_id;
            let mut attempt = 0u32;
            loop {
                let source = source.clone();
                let task_files = files.clone();
                let config = config.clone();
                let result = tokio::task::spawn_blocking(move || {
                    extract_subject(&*source, &task_files, &config)
                })
                .await;

                match result {
                    Ok(Ok(staged)) => return Ok(staged),
                    Ok(Err(err)) if err.is_retryable() && attempt < retries => {
                        attempt += 1;
                        warn!(
                            "Subject {} extraction attempt {} failed, retrying in {:?}: {}",
                            subject_id, attempt, backoff, err
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    Ok(Err(err)) => return Err(err),
                    Err(join_err) => {
                        return Err(SubjectError::CoordinationFailed {
                            details: format!("extraction task aborted: {}", join_err),
                        })
                    }
                }
            }
        })
    }

    /// Wait for one subject's extraction, then load it; classify and log
    /// any failure. Nothing here can abort the overall run.
    async fn drain_subject(
        &self,
        subject_id: u32,
        task: Option<JoinHandle<Result<StagedSubject, SubjectError>>>,
    ) -> SubjectStatus {
        let extraction = match task {
            None => Err(SubjectError::NoData {
                details: "no recording files found".to_string(),
            }),
            Some(handle) => match handle.await {
                Ok(result) => result,
                Err(join_err) => Err(SubjectError::CoordinationFailed {
                    details: format!("extraction task panicked: {}", join_err),
                }),
            },
        };

        let staged = match extraction {
            Ok(staged) => staged,
            Err(err) => return self.skip(subject_id, err),
        };

        info!(
            "Subject {}: loading {} batch(es), {} epochs",
            subject_id, staged.parts, staged.epochs
        );

        let client = self.client.clone();
        let staged_for_load = staged.clone();
        let load_result =
            tokio::task::spawn_blocking(move || load_staged(client.as_ref(), &staged_for_load))
                .await;

        match load_result {
            Ok(Ok(())) => {
                staged.cleanup();
                info!("Subject {}: loaded", subject_id);
                SubjectStatus::Loaded {
                    epochs: staged.epochs,
                }
            }
            Ok(Err(err)) => self.skip(subject_id, err),
            Err(join_err) => self.skip(
                subject_id,
                SubjectError::CoordinationFailed {
                    details: format!("load task panicked: {}", join_err),
                },
            ),
        }
    }

    /// Record a subject failure in the error log (best-effort) and produce
    /// its terminal status.
    fn skip(&self, subject_id: u32, err: SubjectError) -> SubjectStatus {
        log_subject_error(subject_id, &err);

        let stack_trace = match &err {
            SubjectError::Schema(violations) => Some(
                violations
                    .violations
                    .iter()
                    .map(|v| v.to_string())
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            _ => None,
        };
        if let Err(log_err) = self.client.log_ingestion_error(
            subject_id,
            err.error_type(),
            &err.message(),
            stack_trace.as_deref(),
        ) {
            warn!(
                "Could not record error for subject {}: {}",
                subject_id, log_err
            );
        }

        SubjectStatus::Skipped {
            phase: phase_of(&err),
            error_type: err.error_type(),
            message: err.message(),
        }
    }
}

fn phase_of(err: &SubjectError) -> PipelinePhase {
    match err {
        SubjectError::NoData { .. } | SubjectError::ExtractionFailed { .. } => {
            PipelinePhase::Extracting
        }
        SubjectError::Schema(_) => PipelinePhase::Validating,
        SubjectError::LoadFailed(_) => PipelinePhase::Loading,
        SubjectError::CoordinationFailed { .. } => PipelinePhase::Coordinating,
    }
}

/// Extraction + validation for one subject, blocking.
///
/// Consumes the batch stream, validates each batch, and writes validated
/// batches to the subject's staging directory. Pure function of its inputs
/// apart from the staging files; subjects share no mutable state.
fn extract_subject<S: SignalSource>(
    source: &S,
    files: &SubjectFiles,
    config: &PipelineConfig,
) -> Result<StagedSubject, SubjectError> {
    info!("Subject {}: extracting", files.subject_id);

    let stream = stream_batches(
        source,
        files.subject_id,
        &files.psg_path,
        &files.hypno_path,
        config.batch_size,
        config.epoch_length_secs,
    )?;

    if stream.total_epochs() == 0 {
        return Err(SubjectError::NoData {
            details: "recording contains no scored epochs".to_string(),
        });
    }

    let validator = SchemaValidator::new(config.validation_profile);
    let mut staging = SubjectStaging::create(&config.staging_dir, files.subject_id)
        .map_err(|err| SubjectError::ExtractionFailed {
            details: format!("staging setup failed: {}", err),
        })?;

    for batch in stream {
        let batch = batch?;
        if batch.is_empty() {
            continue;
        }
        // Validate before anything is staged so bad data never reaches disk
        validator.validate(&batch)?;
        staging
            .append_batch(&batch)
            .map_err(|err| SubjectError::ExtractionFailed {
                details: format!("staging write failed: {}", err),
            })?;
    }

    let staged = staging.finish();
    if staged.parts == 0 {
        return Err(SubjectError::NoData {
            details: "no epochs processed".to_string(),
        });
    }
    Ok(staged)
}

/// Load one staged subject, batch by batch.
///
/// The first part clears existing rows for the subject; subsequent parts
/// append, so a completed load holds exactly one copy of the subject's data.
fn load_staged(
    client: &dyn WarehouseClient,
    staged: &StagedSubject,
) -> Result<(), SubjectError> {
    for (index, path) in staged.part_paths().iter().enumerate() {
        let batch = read_part(path).map_err(|err| SubjectError::CoordinationFailed {
            details: format!("staged part {:?} unreadable: {}", path, err),
        })?;
        client
            .load_epochs(batch.records(), staged.subject_id, index == 0)
            .map_err(SubjectError::from)?;
    }
    Ok(())
}

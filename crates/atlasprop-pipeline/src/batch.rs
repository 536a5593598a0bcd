//! Batch runner over independent subjects.

use burn::tensor::backend::Backend;
use rayon::prelude::*;

use atlasprop_core::{PipelineRun, SkippedStep};
use crate::error::{PipelineError, Result, StageError};

/// What a finished subject run reports back to the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubjectSummary {
    pub subject: String,
    pub artifacts: usize,
    pub skipped: Vec<SkippedStep>,
}

impl SubjectSummary {
    pub fn from_run<B: Backend>(run: &PipelineRun<B>) -> Self {
        Self {
            subject: run.subject().to_string(),
            artifacts: run.artifacts().count(),
            skipped: run.skipped().cloned().collect(),
        }
    }
}

/// Outcome of one subject.
pub type SubjectOutcome = std::result::Result<SubjectSummary, StageError>;

/// Per-subject outcomes of a batch, in job order.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<SubjectOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &SubjectSummary> {
        self.outcomes.iter().filter_map(|o| o.as_ref().ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &StageError> {
        self.outcomes.iter().filter_map(|o| o.as_ref().err())
    }

    pub fn failure_count(&self) -> usize {
        self.failed().count()
    }

    pub fn is_success(&self) -> bool {
        self.failure_count() == 0
    }
}

/// Run `job` for every item on a worker pool.
///
/// Subjects are independent: a failing subject is reported and the others
/// keep running. `on_finish` is called from the worker thread as each
/// subject completes.
pub fn run_batch<T, F, N>(jobs: Vec<T>, threads: Option<usize>, job: F, on_finish: N) -> Result<BatchReport>
where
    T: Send,
    F: Fn(T) -> SubjectOutcome + Sync + Send,
    N: Fn(&SubjectOutcome) + Sync + Send,
{
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(threads) = threads {
        builder = builder.num_threads(threads);
    }
    let pool = builder
        .build()
        .map_err(|e| PipelineError::invalid_input(format!("worker pool: {}", e)))?;

    tracing::info!("running {} subjects on {} threads", jobs.len(), pool.current_num_threads());
    let outcomes = pool.install(|| {
        jobs.into_par_iter()
            .map(|item| {
                let outcome = job(item);
                on_finish(&outcome);
                outcome
            })
            .collect::<Vec<_>>()
    });

    let report = BatchReport { outcomes };
    tracing::info!(
        "batch finished: {} succeeded, {} failed",
        report.succeeded().count(),
        report.failure_count()
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_failure_does_not_stop_other_subjects() {
        let finished = AtomicUsize::new(0);
        let report = run_batch(
            vec!["sub01", "sub02", "sub03"],
            Some(2),
            |subject| {
                if subject == "sub02" {
                    Err(StageError::new(subject, "t2_affine", PipelineError::invalid_input("corrupt header")))
                } else {
                    Ok(SubjectSummary {
                        subject: subject.to_string(),
                        artifacts: 3,
                        skipped: Vec::new(),
                    })
                }
            },
            |_| {
                finished.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();

        assert_eq!(finished.load(Ordering::SeqCst), 3);
        assert_eq!(report.failure_count(), 1);
        let ok: Vec<&str> = report.succeeded().map(|s| s.subject.as_str()).collect();
        assert_eq!(ok, vec!["sub01", "sub03"]);
        assert_eq!(report.failed().next().unwrap().subject, "sub02");
    }
}

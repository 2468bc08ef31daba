use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};

use crate::cache::ProductCache;
use crate::config::SchedulerConfig;
use crate::reconciler::{ReconciliationJob, ReconciliationSummary};
use crate::utils::error::{AppError, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Running {
        started_at: DateTime<Utc>,
    },
    Completed {
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        summary: ReconciliationSummary,
    },
    Failed {
        started_at: DateTime<Utc>,
        finished_at: DateTime<Utc>,
        error: String,
    },
}

impl JobState {
    pub fn is_running(&self) -> bool {
        matches!(self, JobState::Running { .. })
    }
}

/// Runs the reconciliation job at most once at a time, from the cron trigger,
/// the HTTP trigger or the CLI alike. A start request while a run is in
/// flight is refused, never queued.
pub struct JobRunner {
    job: Arc<ReconciliationJob>,
    cache: Arc<ProductCache>,
    gate: Arc<Mutex<()>>,
    state: Arc<RwLock<JobState>>,
}

impl JobRunner {
    pub fn new(job: Arc<ReconciliationJob>, cache: Arc<ProductCache>) -> Self {
        Self {
            job,
            cache,
            gate: Arc::new(Mutex::new(())),
            state: Arc::new(RwLock::new(JobState::Idle)),
        }
    }

    pub async fn state(&self) -> JobState {
        self.state.read().await.clone()
    }

    async fn acquire(&self) -> Result<OwnedMutexGuard<()>> {
        let guard = Arc::clone(&self.gate)
            .try_lock_owned()
            .map_err(|_| AppError::JobAlreadyRunning)?;

        *self.state.write().await = JobState::Running {
            started_at: Utc::now(),
        };
        Ok(guard)
    }

    /// Start a run on its own task and return without waiting for it.
    pub async fn try_start(&self) -> Result<JoinHandle<Result<ReconciliationSummary>>> {
        let guard = self.acquire().await?;
        let job = Arc::clone(&self.job);
        let cache = Arc::clone(&self.cache);
        let state = Arc::clone(&self.state);

        Ok(tokio::spawn(execute(job, cache, state, guard)))
    }

    /// Run to completion on the calling task.
    pub async fn run_now(&self) -> Result<ReconciliationSummary> {
        let guard = self.acquire().await?;
        execute(
            Arc::clone(&self.job),
            Arc::clone(&self.cache),
            Arc::clone(&self.state),
            guard,
        )
        .await
    }
}

async fn execute(
    job: Arc<ReconciliationJob>,
    cache: Arc<ProductCache>,
    state: Arc<RwLock<JobState>>,
    _guard: OwnedMutexGuard<()>,
) -> Result<ReconciliationSummary> {
    let started_at = match &*state.read().await {
        JobState::Running { started_at } => *started_at,
        _ => Utc::now(),
    };

    // The run gets its own task so a panic inside it still ends in a final state.
    let result = match tokio::spawn(async move { job.run().await }).await {
        Ok(result) => result,
        Err(e) => {
            tracing::error!("Reconciliation task aborted: {}", e);
            Err(AppError::Internal(format!("reconciliation task aborted: {}", e)))
        }
    };
    let finished_at = Utc::now();

    let next = match &result {
        Ok(summary) => {
            if summary.persisted > 0 {
                cache.evict_all().await;
            }
            JobState::Completed {
                started_at,
                finished_at,
                summary: summary.clone(),
            }
        }
        Err(e) => {
            // Products saved before the failure are already in storage.
            cache.evict_all().await;
            JobState::Failed {
                started_at,
                finished_at,
                error: e.to_string(),
            }
        }
    };
    *state.write().await = next;

    result
}

/// Fires the job runner on the configured cron schedule (UTC).
pub struct ReconciliationScheduler {
    scheduler: JobScheduler,
    runner: Arc<JobRunner>,
    cron: String,
}

impl ReconciliationScheduler {
    pub async fn new(runner: Arc<JobRunner>, config: &SchedulerConfig) -> Result<Self> {
        let scheduler = JobScheduler::new().await?;

        Ok(Self {
            scheduler,
            runner,
            cron: config.cron.clone(),
        })
    }

    pub async fn start(&mut self) -> Result<()> {
        let runner = Arc::clone(&self.runner);

        let job = Job::new_async(self.cron.as_str(), move |_uuid, _lock| {
            let runner = Arc::clone(&runner);
            Box::pin(async move {
                match runner.try_start().await {
                    Ok(_) => tracing::info!("Scheduled reconciliation started"),
                    Err(AppError::JobAlreadyRunning) => {
                        tracing::warn!("Skipping scheduled reconciliation, a run is already in progress")
                    }
                    Err(e) => tracing::error!("Failed to start scheduled reconciliation: {}", e),
                }
            })
        })?;

        self.scheduler.add(job).await?;
        self.scheduler.start().await?;
        tracing::info!(cron = %self.cron, "Reconciliation scheduler started");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> Result<()> {
        self.scheduler.shutdown().await?;
        tracing::info!("Reconciliation scheduler shutdown");
        Ok(())
    }
}

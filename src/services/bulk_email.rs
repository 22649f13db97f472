//! Bulk email fan-out: a request enqueues a job and returns a job id
//! immediately; a detached worker sends in fixed-size batches with an
//! inter-batch delay and per-recipient backoff on rate-limit errors.
//!
//! Job state lives in a process-local registry and is lost on crash. That is
//! the accepted tradeoff for this feature; do not add persistence here
//! without revisiting it.

use crate::AppCore;
use crate::error::{AppError, Result};
use crate::mailer::Mailer;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

static EMAIL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("valid email regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum RecipientOutcome {
    Sent,
    Failed(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkEmailJob {
    pub id: Uuid,
    pub status: JobStatus,
    /// Valid recipients only; malformed addresses never enter the job.
    pub total: usize,
    pub sent: usize,
    pub failed: usize,
    pub results: HashMap<String, RecipientOutcome>,
    pub created_at: i64,
}

/// Process-local, non-durable job registry.
pub struct JobRegistry {
    jobs: Mutex<HashMap<Uuid, BulkEmailJob>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, id: &Uuid) -> Option<BulkEmailJob> {
        self.jobs.lock().get(id).cloned()
    }

    fn insert(&self, job: BulkEmailJob) {
        self.jobs.lock().insert(job.id, job);
    }

    fn record(&self, id: &Uuid, email: &str, outcome: RecipientOutcome) {
        let mut jobs = self.jobs.lock();
        if let Some(job) = jobs.get_mut(id) {
            match outcome {
                RecipientOutcome::Sent => job.sent += 1,
                RecipientOutcome::Failed(_) => job.failed += 1,
            }
            job.results.insert(email.to_string(), outcome);
        }
    }

    fn complete(&self, id: &Uuid) {
        let mut jobs = self.jobs.lock();
        if let Some(job) = jobs.get_mut(id) {
            job.status = JobStatus::Completed;
        }
    }
}

impl Default for JobRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WorkerOptions {
    pub batch_size: usize,
    pub batch_delay: Duration,
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            batch_delay: Duration::from_secs(1),
            max_attempts: 3,
            backoff_base: Duration::from_millis(500),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SubmitResult {
    pub job_id: Uuid,
    pub total: usize,
    /// Malformed addresses, rejected up front; the worker never sees them.
    pub invalid: Vec<String>,
}

fn looks_rate_limited(err: &anyhow::Error) -> bool {
    let msg = err.to_string().to_lowercase();
    msg.contains("429") || msg.contains("rate") || msg.contains("too many")
}

pub fn submit(
    core: &AppCore,
    recipients: Vec<String>,
    subject: String,
    body: String,
) -> Result<SubmitResult> {
    submit_with_options(core, recipients, subject, body, WorkerOptions::default())
}

pub fn submit_with_options(
    core: &AppCore,
    recipients: Vec<String>,
    subject: String,
    body: String,
    options: WorkerOptions,
) -> Result<SubmitResult> {
    if recipients.is_empty() {
        return Err(AppError::InvalidInput("no recipients given".into()));
    }

    let (valid, invalid): (Vec<String>, Vec<String>) = recipients
        .into_iter()
        .partition(|addr| EMAIL_RE.is_match(addr));

    let total = valid.len();
    let job = BulkEmailJob {
        id: Uuid::new_v4(),
        status: JobStatus::Running,
        total,
        sent: 0,
        failed: 0,
        results: HashMap::new(),
        created_at: chrono::Utc::now().timestamp_millis(),
    };
    let job_id = job.id;
    core.bulk_jobs.insert(job);

    let registry = core.bulk_jobs.clone();
    let mailer = core.mailer.clone();
    tokio::spawn(async move {
        run_job(registry, mailer, job_id, valid, subject, body, options).await;
    });

    Ok(SubmitResult {
        job_id,
        total,
        invalid,
    })
}

async fn run_job(
    registry: Arc<JobRegistry>,
    mailer: Arc<dyn Mailer>,
    job_id: Uuid,
    recipients: Vec<String>,
    subject: String,
    body: String,
    options: WorkerOptions,
) {
    let mut batches = recipients.chunks(options.batch_size.max(1)).peekable();
    while let Some(batch) = batches.next() {
        for email in batch {
            let outcome = send_with_retry(&*mailer, email, &subject, &body, &options).await;
            registry.record(&job_id, email, outcome);
        }
        // Courtesy pause between batches for the mail provider.
        if batches.peek().is_some() {
            tokio::time::sleep(options.batch_delay).await;
        }
    }
    registry.complete(&job_id);
    tracing::info!(%job_id, "bulk email job finished");
}

async fn send_with_retry(
    mailer: &dyn Mailer,
    email: &str,
    subject: &str,
    body: &str,
    options: &WorkerOptions,
) -> RecipientOutcome {
    let mut attempt = 0;
    loop {
        match mailer.send(email, subject, body).await {
            Ok(()) => return RecipientOutcome::Sent,
            Err(err) if looks_rate_limited(&err) && attempt + 1 < options.max_attempts => {
                let delay = options.backoff_base * 2u32.pow(attempt);
                tracing::debug!(recipient = email, attempt, "rate limited, backing off");
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => {
                tracing::warn!(recipient = email, error = %err, "bulk email send failed");
                return RecipientOutcome::Failed(err.to_string());
            }
        }
    }
}

pub fn get_status(core: &AppCore, job_id: Uuid) -> Result<BulkEmailJob> {
    core.bulk_jobs
        .get(&job_id)
        .ok_or_else(|| AppError::NotFound("bulk email job".into()))
}

// Job Scheduler - Cron scheduling for the workflow poll

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_cron_scheduler::{Job, JobScheduler as TokioScheduler, JobSchedulerError};
use tracing::{error, info};
use uuid::Uuid;

use super::workflow_poll::{WorkflowPollJob, WORKFLOW_POLL_JOB};
use crate::config::EngineConfig;
use crate::workflows::{PollReport, WorkflowEngine, WorkflowError};

/// Execution log entries kept in memory
const MAX_EXECUTION_LOGS: usize = 100;

#[derive(Error, Debug)]
pub enum JobError {
    #[error("Scheduler error: {0}")]
    SchedulerError(#[from] JobSchedulerError),
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

pub type JobResult<T> = Result<T, JobError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecutionLog {
    pub id: Uuid,
    pub job_name: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub status: JobStatus,
    pub items_processed: i32,
    pub errors: Vec<String>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum JobStatus {
    Running,
    Completed,
    Failed,
    PartialFailure,
}

type ExecutionLogs = Arc<RwLock<VecDeque<JobExecutionLog>>>;

pub struct JobScheduler {
    scheduler: TokioScheduler,
    engine: Arc<WorkflowEngine>,
    config: EngineConfig,
    execution_logs: ExecutionLogs,
}

impl JobScheduler {
    pub async fn new(engine: Arc<WorkflowEngine>, config: EngineConfig) -> JobResult<Self> {
        let scheduler = TokioScheduler::new().await?;

        Ok(Self {
            scheduler,
            engine,
            config,
            execution_logs: Arc::new(RwLock::new(VecDeque::new())),
        })
    }

    pub async fn start(&self) -> JobResult<()> {
        info!("Starting background job scheduler");

        self.schedule_workflow_poll().await?;
        self.scheduler.start().await?;

        info!("Background job scheduler started successfully");
        Ok(())
    }

    pub async fn shutdown(&mut self) -> JobResult<()> {
        info!("Shutting down background job scheduler");
        self.scheduler.shutdown().await?;
        Ok(())
    }

    async fn schedule_workflow_poll(&self) -> JobResult<()> {
        let interval = self.config.poll_interval_minutes;
        if interval == 0 || interval > 59 {
            return Err(JobError::ConfigError(format!(
                "workflow poll interval must be between 1 and 59 minutes, got {}",
                interval
            )));
        }

        let cron_expr = format!("0 */{} * * * *", interval); // Every N minutes

        let job_runner = WorkflowPollJob::new(self.engine.clone());
        let logs = self.execution_logs.clone();

        let job = Job::new_async(cron_expr.as_str(), move |_uuid, _lock| {
            let job_runner = job_runner.clone();
            let logs = logs.clone();

            Box::pin(async move {
                if let Err(e) = run_logged(&job_runner, &logs).await {
                    error!("Workflow poll failed: {}", e);
                }
            })
        })?;

        self.scheduler.add(job).await?;
        info!("Scheduled workflow poll to run every {} minutes", interval);

        Ok(())
    }

    pub async fn get_execution_logs(&self) -> Vec<JobExecutionLog> {
        self.execution_logs.read().await.iter().cloned().collect()
    }

    pub async fn run_job_now(&self, job_name: &str) -> JobResult<PollReport> {
        match job_name {
            WORKFLOW_POLL_JOB => {
                let job_runner = WorkflowPollJob::new(self.engine.clone());
                Ok(run_logged(&job_runner, &self.execution_logs).await?)
            }
            _ => Err(JobError::ConfigError(format!("Unknown job: {}", job_name))),
        }
    }
}

/// Run the poll and append the outcome to the execution log.
async fn run_logged(job_runner: &WorkflowPollJob, logs: &ExecutionLogs) -> Result<PollReport, WorkflowError> {
    let started_at = Utc::now();
    let result = job_runner.run().await;
    let completed_at = Utc::now();

    let (status, items_processed, errors) = match &result {
        Ok(report) if report.errors == 0 => (JobStatus::Completed, report.processed, Vec::new()),
        Ok(report) => (
            JobStatus::PartialFailure,
            report.processed,
            vec![format!("{} prospects hit store errors", report.errors)],
        ),
        Err(e) => (JobStatus::Failed, 0, vec![e.to_string()]),
    };

    let log = JobExecutionLog {
        id: Uuid::new_v4(),
        job_name: WORKFLOW_POLL_JOB.to_string(),
        started_at,
        completed_at: Some(completed_at),
        status,
        items_processed: items_processed as i32,
        errors,
        duration_ms: Some((completed_at - started_at).num_milliseconds()),
    };

    let mut logs = logs.write().await;
    logs.push_back(log);
    while logs.len() > MAX_EXECUTION_LOGS {
        logs.pop_front();
    }

    result
}

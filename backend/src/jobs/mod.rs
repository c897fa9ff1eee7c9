// Background Jobs Service
//
// Scheduled background jobs for the Cadence campaign platform.
// Jobs are scheduled using tokio-cron-scheduler and run automatically at specified intervals.

pub mod scheduler;
pub mod workflow_poll;

pub use scheduler::{JobError, JobExecutionLog, JobResult, JobScheduler, JobStatus};
pub use workflow_poll::{WorkflowPollJob, WORKFLOW_POLL_JOB};

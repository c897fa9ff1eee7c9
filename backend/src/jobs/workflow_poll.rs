// Workflow Poll Job - Advances every due campaign prospect by one node

use std::sync::Arc;
use tracing::info;

use crate::workflows::{PollReport, WorkflowEngine, WorkflowResult};

pub const WORKFLOW_POLL_JOB: &str = "workflow_poll";

#[derive(Clone)]
pub struct WorkflowPollJob {
    engine: Arc<WorkflowEngine>,
}

impl WorkflowPollJob {
    pub fn new(engine: Arc<WorkflowEngine>) -> Self {
        Self { engine }
    }

    pub async fn run(&self) -> WorkflowResult<PollReport> {
        info!("Running workflow poll job");
        self.engine.poll().await
    }
}

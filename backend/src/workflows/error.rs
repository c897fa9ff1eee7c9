// Workflow Errors - Failure taxonomy for the execution engine

use thiserror::Error;

use super::timing::TimingError;
use crate::services::EmailError;

#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Prospect {prospect_id} has no email address")]
    MissingEmail { prospect_id: i64 },
    #[error("Email delivery failed: {0}")]
    Email(String),
    #[error("Invalid config for node '{node_id}': {source}")]
    InvalidNodeConfig {
        node_id: String,
        source: serde_json::Error,
    },
    #[error("Node '{node_id}' not found in campaign {campaign_id}")]
    NodeNotFound { campaign_id: i64, node_id: String },
    #[error("Campaign {0} has no start node")]
    MissingStartNode(i64),
    #[error("Campaign prospect {0} not found")]
    CampaignProspectNotFound(i64),
    #[error("Prospect {0} not found")]
    ProspectNotFound(i64),
    #[error("Campaign {0} not found")]
    CampaignNotFound(i64),
    #[error("Timing error: {0}")]
    Timing(#[from] TimingError),
    #[error("Condition evaluation failed: {0}")]
    Condition(String),
    #[error("Action '{action}' failed: {message}")]
    Action { action: String, message: String },
}

impl WorkflowError {
    /// Errors caused by rows the engine depends on but does not own.
    ///
    /// A processing pass that hits one of these leaves the prospect state untouched.
    pub fn is_missing_entity(&self) -> bool {
        matches!(
            self,
            Self::NodeNotFound { .. }
                | Self::CampaignProspectNotFound(_)
                | Self::ProspectNotFound(_)
                | Self::CampaignNotFound(_)
                | Self::MissingStartNode(_)
                | Self::InvalidNodeConfig { .. }
        )
    }
}

impl From<EmailError> for WorkflowError {
    fn from(err: EmailError) -> Self {
        Self::Email(err.to_string())
    }
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

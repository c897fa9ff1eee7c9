// Workflow Executor - Runs the side effect of a single node

use cadence_shared::{Prospect, TeamContext};
use regex::Regex;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use super::actions::{ActionHandler, ActionRequest, ProspectAction};
use super::conditions::ConditionEvaluator;
use super::error::{WorkflowError, WorkflowResult};
use super::nodes::{EmailConfig, NodeConfig, WorkflowNode};
use crate::services::{EmailSender, OutboundEmail};

static VARIABLE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z0-9_]+)\s*\}\}").expect("variable pattern is valid")
});

/// Result of executing one node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeOutcome {
    /// Branch selector for outgoing edges; `None` follows the default edges
    pub branch: Option<String>,
    pub output: Option<serde_json::Value>,
}

impl NodeOutcome {
    pub fn proceed() -> Self {
        Self::default()
    }

    pub fn branch(label: impl Into<String>) -> Self {
        Self {
            branch: Some(label.into()),
            output: None,
        }
    }
}

/// Dispatches a node to its side effect
pub struct NodeExecutor {
    email_sender: Arc<dyn EmailSender>,
    conditions: Arc<dyn ConditionEvaluator>,
    actions: Arc<dyn ActionHandler>,
}

impl NodeExecutor {
    pub fn new(
        email_sender: Arc<dyn EmailSender>,
        conditions: Arc<dyn ConditionEvaluator>,
        actions: Arc<dyn ActionHandler>,
    ) -> Self {
        Self {
            email_sender,
            conditions,
            actions,
        }
    }

    pub async fn execute(
        &self,
        node: &WorkflowNode,
        prospect: &Prospect,
        team: &TeamContext,
    ) -> WorkflowResult<NodeOutcome> {
        debug!(
            "Executing node '{}' ({}) for prospect {}",
            node.id, node.node_type, prospect.id
        );

        let action = match &node.config {
            NodeConfig::Start
            | NodeConfig::Delay(_)
            | NodeConfig::WaitUntil(_)
            | NodeConfig::TimeSlot(_) => return Ok(NodeOutcome::proceed()),
            NodeConfig::Email(email) => return self.send_email(email, prospect, team).await,
            NodeConfig::Condition(condition) => {
                let branch = self.conditions.evaluate(condition, prospect, team).await?;
                info!(
                    "Condition node '{}' took branch '{}' for prospect {}",
                    node.id, branch, prospect.id
                );
                return Ok(NodeOutcome::branch(branch));
            }
            NodeConfig::Unknown(_) => {
                warn!(
                    "Unknown node type '{}' on node '{}'; continuing without side effect",
                    node.node_type, node.id
                );
                return Ok(NodeOutcome::proceed());
            }
            NodeConfig::Call(call) => ProspectAction::Call(call),
            NodeConfig::Task(task) => ProspectAction::Task(task),
            NodeConfig::Transfer(transfer) => ProspectAction::Transfer(transfer),
            NodeConfig::VisitLinkedIn => ProspectAction::VisitLinkedIn,
            NodeConfig::AddConnection => ProspectAction::AddConnection,
            NodeConfig::LinkedInMessage(message) => ProspectAction::LinkedInMessage(message),
        };

        let request = ActionRequest {
            node_id: &node.id,
            action,
            prospect,
            team,
        };
        let result = self.actions.handle(&request).await?;

        Ok(NodeOutcome {
            branch: None,
            output: result.output,
        })
    }

    async fn send_email(
        &self,
        config: &EmailConfig,
        prospect: &Prospect,
        team: &TeamContext,
    ) -> WorkflowResult<NodeOutcome> {
        let to_email = prospect
            .email_address()
            .ok_or(WorkflowError::MissingEmail { prospect_id: prospect.id })?;

        let email = OutboundEmail {
            to_email: to_email.to_string(),
            to_name: prospect.display_name(),
            from_email: team.sender_email.clone(),
            from_name: team.sender_name.clone(),
            subject: replace_variables(&config.subject, prospect),
            body: replace_variables(&config.body, prospect),
        };

        self.email_sender.send(&email).await?;

        Ok(NodeOutcome::proceed())
    }
}

/// Substitute `{{variable}}` tokens with prospect attributes.
///
/// Unknown variables and attributes without a value are left as written.
pub fn replace_variables(template: &str, prospect: &Prospect) -> String {
    VARIABLE_PATTERN
        .replace_all(template, |caps: &regex::Captures| {
            prospect
                .attribute(&caps[1])
                .map(str::to_string)
                .unwrap_or_else(|| caps[0].to_string())
        })
        .into_owned()
}

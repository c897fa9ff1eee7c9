// Workflow Actions - Pluggable handlers for prospect-facing actions

use async_trait::async_trait;
use cadence_shared::{Prospect, TeamContext};
use serde::Serialize;
use sqlx::PgPool;
use tracing::info;

use super::error::{WorkflowError, WorkflowResult};
use super::executor::replace_variables;
use super::nodes::{CallConfig, LinkedInMessageConfig, TaskConfig, TransferConfig};

/// Actions delegated to external providers or people
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProspectAction<'a> {
    Call(&'a CallConfig),
    Task(&'a TaskConfig),
    Transfer(&'a TransferConfig),
    VisitLinkedIn,
    AddConnection,
    LinkedInMessage(&'a LinkedInMessageConfig),
}

impl ProspectAction<'_> {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Call(_) => "call",
            Self::Task(_) => "task",
            Self::Transfer(_) => "transfer",
            Self::VisitLinkedIn => "visitLinkedIn",
            Self::AddConnection => "addConnection",
            Self::LinkedInMessage(_) => "linkedInMessage",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ActionRequest<'a> {
    pub node_id: &'a str,
    pub action: ProspectAction<'a>,
    pub prospect: &'a Prospect,
    pub team: &'a TeamContext,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionResult {
    pub output: Option<serde_json::Value>,
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    /// Perform the action. An error keeps the prospect on this node for a retry.
    async fn handle(&self, request: &ActionRequest<'_>) -> WorkflowResult<ActionResult>;
}

/// Records the action in the log and lets the workflow continue.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingActionHandler;

#[async_trait]
impl ActionHandler for LoggingActionHandler {
    async fn handle(&self, request: &ActionRequest<'_>) -> WorkflowResult<ActionResult> {
        info!(
            "Action '{}' for prospect {} (campaign {}, node '{}') has no provider; continuing",
            request.action.name(),
            request.prospect.id,
            request.team.campaign_id,
            request.node_id
        );
        Ok(ActionResult::default())
    }
}

/// Turns `call` and `task` nodes into manual tasks for the team.
///
/// Every other action goes to the logging handler.
#[derive(Clone)]
pub struct TaskActionHandler {
    db_pool: PgPool,
}

impl TaskActionHandler {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    async fn create_task(
        &self,
        request: &ActionRequest<'_>,
        title: String,
        description: Option<String>,
        deadline: Option<chrono::DateTime<chrono::Utc>>,
    ) -> WorkflowResult<ActionResult> {
        let (task_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO prospect_tasks (
                team_id, campaign_id, prospect_id, node_id, kind, title, description, deadline
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(request.team.team_id)
        .bind(request.team.campaign_id)
        .bind(request.prospect.id)
        .bind(request.node_id)
        .bind(request.action.name())
        .bind(&title)
        .bind(&description)
        .bind(deadline)
        .fetch_one(&self.db_pool)
        .await
        .map_err(|e| WorkflowError::Action {
            action: request.action.name().to_string(),
            message: e.to_string(),
        })?;

        info!(
            "Created {} task {} for prospect {} in campaign {}",
            request.action.name(),
            task_id,
            request.prospect.id,
            request.team.campaign_id
        );

        Ok(ActionResult {
            output: Some(serde_json::json!({ "task_id": task_id })),
        })
    }
}

#[async_trait]
impl ActionHandler for TaskActionHandler {
    async fn handle(&self, request: &ActionRequest<'_>) -> WorkflowResult<ActionResult> {
        match request.action {
            ProspectAction::Call(call) => {
                let who = request
                    .prospect
                    .display_name()
                    .unwrap_or_else(|| format!("prospect {}", request.prospect.id));
                let notes = replace_variables(&call.notes, request.prospect);
                let description = (!notes.trim().is_empty()).then_some(notes);

                self.create_task(request, format!("Call {}", who), description, call.deadline)
                    .await
            }
            ProspectAction::Task(task) => {
                let title = replace_variables(&task.title, request.prospect);
                let description = task
                    .description
                    .as_deref()
                    .map(|d| replace_variables(d, request.prospect));

                self.create_task(request, title, description, task.deadline).await
            }
            _ => LoggingActionHandler.handle(request).await,
        }
    }
}

// Workflow State - Durable per-prospect execution cursor

use async_trait::async_trait;
use cadence_shared::{ProspectStatus, WorkflowProspectState};
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::error::WorkflowResult;

/// Error recorded on rows whose execution lease expired.
pub const STALE_LEASE_ERROR: &str = "Execution lease expired before the node finished; requeued";

/// Outcome of a successful node execution, applied to an `executing` row.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    /// Move the cursor to another node
    Advance {
        next_node_id: String,
        status: ProspectStatus,
        scheduled_for: DateTime<Utc>,
        error: Option<String>,
    },
    /// No further nodes
    Complete,
}

impl Transition {
    pub fn ready(next_node_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self::Advance {
            next_node_id: next_node_id.into(),
            status: ProspectStatus::Ready,
            scheduled_for: now,
            error: None,
        }
    }

    pub fn waiting(next_node_id: impl Into<String>, until: DateTime<Utc>) -> Self {
        Self::Advance {
            next_node_id: next_node_id.into(),
            status: ProspectStatus::Waiting,
            scheduled_for: until,
            error: None,
        }
    }

    pub fn with_error(self, message: impl Into<String>) -> Self {
        match self {
            Self::Advance {
                next_node_id,
                status,
                scheduled_for,
                ..
            } => Self::Advance {
                next_node_id,
                status,
                scheduled_for,
                error: Some(message.into()),
            },
            Self::Complete => Self::Complete,
        }
    }
}

/// Durable store of workflow cursors, one per campaign-prospect assignment.
///
/// `status` and `last_executed_at` together form the row lease: only `claim`
/// moves a row into `executing`, and only the holder of that claim instant can
/// move it out through `apply_transition` or `record_failure`. `reclaim_stale`
/// requeues rows whose holder never came back.
#[async_trait]
pub trait ProspectStateStore: Send + Sync {
    async fn find_by_campaign_prospect(
        &self,
        campaign_prospect_id: i64,
    ) -> WorkflowResult<Option<WorkflowProspectState>>;

    /// Insert a `ready` row at the given node unless one already exists; return the stored row.
    async fn create_if_absent(
        &self,
        campaign_prospect_id: i64,
        start_node_id: &str,
        now: DateTime<Utc>,
    ) -> WorkflowResult<WorkflowProspectState>;

    /// Rows that are `ready`, or `waiting` and due, oldest schedule first.
    async fn due_states(&self, now: DateTime<Utc>, limit: i64) -> WorkflowResult<Vec<WorkflowProspectState>>;

    /// Conditionally move a due row to `executing`, stamping `last_executed_at = now`.
    ///
    /// `now` is the lease token for the later `apply_transition` or `record_failure`.
    /// False when another poll got there first.
    async fn claim(&self, state_id: i64, now: DateTime<Utc>) -> WorkflowResult<bool>;

    /// Apply a transition to a row still leased by the claim made at `claimed_at`.
    ///
    /// False when the lease was reclaimed or taken by a later claim.
    async fn apply_transition(
        &self,
        state_id: i64,
        claimed_at: DateTime<Utc>,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> WorkflowResult<bool>;

    /// Release a row leased at `claimed_at` after a failed execution.
    ///
    /// Without `retry_at` the row goes back to `ready`; otherwise it waits until then.
    async fn record_failure(
        &self,
        state_id: i64,
        claimed_at: DateTime<Utc>,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> WorkflowResult<bool>;

    /// Requeue rows that have been `executing` since before `stale_before`.
    async fn reclaim_stale(&self, stale_before: DateTime<Utc>, now: DateTime<Utc>) -> WorkflowResult<u64>;
}

const STATE_COLUMNS: &str = "id, campaign_prospect_id, current_node_id, status, scheduled_for, \
     last_executed_at, completed_at, error, failure_count, created_at, updated_at";

/// State store backed by `workflow_prospect_states`
#[derive(Clone)]
pub struct PgProspectStateStore {
    db_pool: PgPool,
}

impl PgProspectStateStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl ProspectStateStore for PgProspectStateStore {
    async fn find_by_campaign_prospect(
        &self,
        campaign_prospect_id: i64,
    ) -> WorkflowResult<Option<WorkflowProspectState>> {
        let query = format!(
            "SELECT {} FROM workflow_prospect_states WHERE campaign_prospect_id = $1",
            STATE_COLUMNS
        );

        let state = sqlx::query_as::<_, WorkflowProspectState>(&query)
            .bind(campaign_prospect_id)
            .fetch_optional(&self.db_pool)
            .await?;

        Ok(state)
    }

    async fn create_if_absent(
        &self,
        campaign_prospect_id: i64,
        start_node_id: &str,
        now: DateTime<Utc>,
    ) -> WorkflowResult<WorkflowProspectState> {
        sqlx::query(
            r#"
            INSERT INTO workflow_prospect_states (
                campaign_prospect_id, current_node_id, status, scheduled_for, created_at, updated_at
            )
            VALUES ($1, $2, 'ready', $3, $3, $3)
            ON CONFLICT (campaign_prospect_id) DO NOTHING
            "#,
        )
        .bind(campaign_prospect_id)
        .bind(start_node_id)
        .bind(now)
        .execute(&self.db_pool)
        .await?;

        let query = format!(
            "SELECT {} FROM workflow_prospect_states WHERE campaign_prospect_id = $1",
            STATE_COLUMNS
        );

        let state = sqlx::query_as::<_, WorkflowProspectState>(&query)
            .bind(campaign_prospect_id)
            .fetch_one(&self.db_pool)
            .await?;

        Ok(state)
    }

    async fn due_states(&self, now: DateTime<Utc>, limit: i64) -> WorkflowResult<Vec<WorkflowProspectState>> {
        let query = format!(
            r#"
            SELECT {}
            FROM workflow_prospect_states
            WHERE status = 'ready'
               OR (status = 'waiting' AND scheduled_for <= $1)
            ORDER BY scheduled_for, id
            LIMIT $2
            "#,
            STATE_COLUMNS
        );

        let states = sqlx::query_as::<_, WorkflowProspectState>(&query)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.db_pool)
            .await?;

        Ok(states)
    }

    async fn claim(&self, state_id: i64, now: DateTime<Utc>) -> WorkflowResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_prospect_states
            SET status = 'executing', last_executed_at = $2, updated_at = $2
            WHERE id = $1
              AND (status = 'ready' OR (status = 'waiting' AND scheduled_for <= $2))
            "#,
        )
        .bind(state_id)
        .bind(now)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn apply_transition(
        &self,
        state_id: i64,
        claimed_at: DateTime<Utc>,
        transition: &Transition,
        now: DateTime<Utc>,
    ) -> WorkflowResult<bool> {
        let result = match transition {
            Transition::Advance {
                next_node_id,
                status,
                scheduled_for,
                error,
            } => {
                sqlx::query(
                    r#"
                    UPDATE workflow_prospect_states
                    SET current_node_id = $2, status = $3, scheduled_for = $4,
                        error = $5, failure_count = 0, updated_at = $6
                    WHERE id = $1 AND status = 'executing' AND last_executed_at = $7
                    "#,
                )
                .bind(state_id)
                .bind(next_node_id)
                .bind(status)
                .bind(scheduled_for)
                .bind(error)
                .bind(now)
                .bind(claimed_at)
                .execute(&self.db_pool)
                .await?
            }
            Transition::Complete => {
                sqlx::query(
                    r#"
                    UPDATE workflow_prospect_states
                    SET current_node_id = NULL, status = 'completed', completed_at = $2,
                        scheduled_for = $2, error = NULL, failure_count = 0, updated_at = $2
                    WHERE id = $1 AND status = 'executing' AND last_executed_at = $3
                    "#,
                )
                .bind(state_id)
                .bind(now)
                .bind(claimed_at)
                .execute(&self.db_pool)
                .await?
            }
        };

        Ok(result.rows_affected() == 1)
    }

    async fn record_failure(
        &self,
        state_id: i64,
        claimed_at: DateTime<Utc>,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> WorkflowResult<bool> {
        let status = if retry_at.is_some() {
            ProspectStatus::Waiting
        } else {
            ProspectStatus::Ready
        };

        let result = sqlx::query(
            r#"
            UPDATE workflow_prospect_states
            SET status = $2, scheduled_for = $3, error = $4,
                failure_count = failure_count + 1, updated_at = $5
            WHERE id = $1 AND status = 'executing' AND last_executed_at = $6
            "#,
        )
        .bind(state_id)
        .bind(status)
        .bind(retry_at.unwrap_or(now))
        .bind(error)
        .bind(now)
        .bind(claimed_at)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn reclaim_stale(&self, stale_before: DateTime<Utc>, now: DateTime<Utc>) -> WorkflowResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE workflow_prospect_states
            SET status = 'ready', scheduled_for = $2, error = $3,
                failure_count = failure_count + 1, updated_at = $2
            WHERE status = 'executing'
              AND COALESCE(last_executed_at, updated_at) < $1
            "#,
        )
        .bind(stale_before)
        .bind(now)
        .bind(STALE_LEASE_ERROR)
        .execute(&self.db_pool)
        .await?;

        Ok(result.rows_affected())
    }
}

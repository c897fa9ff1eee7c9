// Workflow Engine - Polls due prospects and moves them through the campaign graph

use cadence_shared::{Campaign, Prospect, TeamContext, WorkflowProspectState};
use chrono::{DateTime, Duration, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use super::clock::Clock;
use super::directory::ProspectDirectory;
use super::error::{WorkflowError, WorkflowResult};
use super::executor::NodeExecutor;
use super::graph::GraphStore;
use super::nodes::WorkflowNode;
use super::state::{ProspectStateStore, Transition};
use super::timing;
use crate::config::EngineConfig;

/// Summary of one poll
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
    /// Rows selected as due
    pub due: usize,
    /// Rows claimed and run (advanced + completed + failed)
    pub processed: usize,
    pub advanced: usize,
    pub completed: usize,
    /// Node executions that failed and were released for a retry
    pub failed: usize,
    /// Rows left untouched: claim lost or referenced rows missing
    pub skipped: usize,
    /// Store errors while handling a row
    pub errors: usize,
    /// Stale executing rows requeued before selecting
    pub reclaimed: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepOutcome {
    Advanced,
    Completed,
    Failed,
    Skipped,
}

/// Everything needed to run the current node of one prospect
struct StepContext {
    campaign: Campaign,
    prospect: Prospect,
    node: WorkflowNode,
}

pub struct WorkflowEngine {
    graph: Arc<dyn GraphStore>,
    states: Arc<dyn ProspectStateStore>,
    directory: Arc<dyn ProspectDirectory>,
    executor: NodeExecutor,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl WorkflowEngine {
    pub fn new(
        graph: Arc<dyn GraphStore>,
        states: Arc<dyn ProspectStateStore>,
        directory: Arc<dyn ProspectDirectory>,
        executor: NodeExecutor,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            graph,
            states,
            directory,
            executor,
            clock,
            config,
        }
    }

    /// Run one poll and return the number of prospects processed.
    ///
    /// Safe to call repeatedly; does nothing when no prospect is due.
    pub async fn process_ready_prospects(&self) -> WorkflowResult<usize> {
        Ok(self.poll().await?.processed)
    }

    /// Run one poll: reclaim stale leases, then advance every due prospect by one node.
    pub async fn poll(&self) -> WorkflowResult<PollReport> {
        let now = self.clock.now();
        let mut report = PollReport::default();

        if self.config.stale_after_minutes > 0 {
            report.reclaimed = self.reclaim_stale_at(now).await?;
        }

        let due = self.states.due_states(now, self.config.batch_size).await?;
        report.due = due.len();

        if due.is_empty() {
            debug!("No prospects due for workflow processing");
            return Ok(report);
        }

        let results: Vec<(i64, WorkflowResult<StepOutcome>)> = stream::iter(due)
            .map(|state| async move {
                let campaign_prospect_id = state.campaign_prospect_id;
                (campaign_prospect_id, self.process_state(state, now).await)
            })
            .buffer_unordered(self.config.max_concurrency.max(1))
            .collect()
            .await;

        for (campaign_prospect_id, result) in results {
            match result {
                Ok(StepOutcome::Advanced) => {
                    report.processed += 1;
                    report.advanced += 1;
                }
                Ok(StepOutcome::Completed) => {
                    report.processed += 1;
                    report.completed += 1;
                }
                Ok(StepOutcome::Failed) => {
                    report.processed += 1;
                    report.failed += 1;
                }
                Ok(StepOutcome::Skipped) => report.skipped += 1,
                Err(e) => {
                    error!(
                        "Workflow step for campaign prospect {} aborted: {}",
                        campaign_prospect_id, e
                    );
                    report.errors += 1;
                }
            }
        }

        info!(
            "Workflow poll: due={}, processed={}, advanced={}, completed={}, failed={}, skipped={}, errors={}, reclaimed={}",
            report.due,
            report.processed,
            report.advanced,
            report.completed,
            report.failed,
            report.skipped,
            report.errors,
            report.reclaimed
        );

        Ok(report)
    }

    async fn process_state(
        &self,
        state: WorkflowProspectState,
        now: DateTime<Utc>,
    ) -> WorkflowResult<StepOutcome> {
        let Some(node_id) = state.current_node_id.clone() else {
            // Cursor already past the last node but never marked completed
            if !self.states.claim(state.id, now).await? {
                return Ok(StepOutcome::Skipped);
            }
            return self.apply(&state, Transition::Complete, now).await;
        };

        let context = match self.load_context(&state, &node_id).await {
            Ok(context) => context,
            Err(e) if e.is_missing_entity() => {
                warn!(
                    "Skipping campaign prospect {} at node '{}': {}",
                    state.campaign_prospect_id, node_id, e
                );
                return Ok(StepOutcome::Skipped);
            }
            Err(e) => return Err(e),
        };

        if !self.states.claim(state.id, now).await? {
            debug!(
                "Campaign prospect {} was claimed by another poll",
                state.campaign_prospect_id
            );
            return Ok(StepOutcome::Skipped);
        }

        let team = TeamContext::from(&context.campaign);

        let outcome = match self.executor.execute(&context.node, &context.prospect, &team).await {
            Ok(outcome) => outcome,
            Err(e) => return self.fail(&state, &node_id, e, now).await,
        };

        let transition = match self
            .next_transition(context.campaign.id, &node_id, outcome.branch.as_deref(), now)
            .await
        {
            Ok(transition) => transition,
            Err(e) => return self.fail(&state, &node_id, e, now).await,
        };

        self.apply(&state, transition, now).await
    }

    async fn load_context(
        &self,
        state: &WorkflowProspectState,
        node_id: &str,
    ) -> WorkflowResult<StepContext> {
        let assignment = self
            .directory
            .campaign_prospect(state.campaign_prospect_id)
            .await?
            .ok_or(WorkflowError::CampaignProspectNotFound(state.campaign_prospect_id))?;

        let campaign = self
            .directory
            .campaign(assignment.campaign_id)
            .await?
            .ok_or(WorkflowError::CampaignNotFound(assignment.campaign_id))?;

        let prospect = self
            .directory
            .prospect(assignment.prospect_id)
            .await?
            .ok_or(WorkflowError::ProspectNotFound(assignment.prospect_id))?;

        let node = self
            .graph
            .get_node(campaign.id, node_id)
            .await?
            .ok_or_else(|| WorkflowError::NodeNotFound {
                campaign_id: campaign.id,
                node_id: node_id.to_string(),
            })?;

        Ok(StepContext {
            campaign,
            prospect,
            node,
        })
    }

    /// Where the prospect goes after a successful execution of `node_id`.
    async fn next_transition(
        &self,
        campaign_id: i64,
        node_id: &str,
        branch: Option<&str>,
        now: DateTime<Utc>,
    ) -> WorkflowResult<Transition> {
        let edges = self.graph.outgoing_edges(campaign_id, node_id, branch).await?;

        let Some(edge) = edges.first() else {
            return Ok(Transition::Complete);
        };

        if edges.len() > 1 {
            warn!(
                "Node '{}' in campaign {} has {} edges for branch {:?}; following '{}'",
                node_id,
                campaign_id,
                edges.len(),
                branch,
                edge.id
            );
        }

        let target_id = edge.target_node_id.clone();

        let target = match self.graph.get_node(campaign_id, &target_id).await {
            Ok(Some(target)) => target,
            Ok(None) => {
                warn!(
                    "Edge '{}' in campaign {} points at missing node '{}'",
                    edge.id, campaign_id, target_id
                );
                return Ok(Transition::ready(&target_id, now).with_error(format!(
                    "Node '{}' not found in campaign {}",
                    target_id, campaign_id
                )));
            }
            Err(e) if e.is_missing_entity() => {
                warn!("Target node '{}' in campaign {} is unusable: {}", target_id, campaign_id, e);
                return Ok(Transition::ready(&target_id, now).with_error(e.to_string()));
            }
            Err(e) => return Err(e),
        };

        if !target.is_timing() {
            return Ok(Transition::ready(target.id, now));
        }

        match timing::next_time(&target.config, now) {
            Ok(resume_at) => Ok(Transition::waiting(target.id, resume_at)),
            Err(e) => {
                warn!("Could not schedule timing node '{}': {}", target.id, e);
                Ok(Transition::ready(target.id, now).with_error(e.to_string()))
            }
        }
    }

    /// Store a transition. `now` is also the claim instant, so it fences the lease.
    async fn apply(
        &self,
        state: &WorkflowProspectState,
        transition: Transition,
        now: DateTime<Utc>,
    ) -> WorkflowResult<StepOutcome> {
        if !self.states.apply_transition(state.id, now, &transition, now).await? {
            warn!(
                "Lease on campaign prospect {} was lost before its transition was stored",
                state.campaign_prospect_id
            );
            return Ok(StepOutcome::Skipped);
        }

        match transition {
            Transition::Complete => {
                info!("Campaign prospect {} completed its workflow", state.campaign_prospect_id);
                Ok(StepOutcome::Completed)
            }
            Transition::Advance {
                next_node_id,
                status,
                scheduled_for,
                ..
            } => {
                debug!(
                    "Campaign prospect {} moved to '{}' ({} until {})",
                    state.campaign_prospect_id, next_node_id, status, scheduled_for
                );
                Ok(StepOutcome::Advanced)
            }
        }
    }

    async fn fail(
        &self,
        state: &WorkflowProspectState,
        node_id: &str,
        err: WorkflowError,
        now: DateTime<Utc>,
    ) -> WorkflowResult<StepOutcome> {
        let retry_at = self.retry_at(state.failure_count, now);

        error!(
            "Node '{}' failed for campaign prospect {} (attempt {}): {}",
            node_id,
            state.campaign_prospect_id,
            state.failure_count + 1,
            err
        );

        if !self
            .states
            .record_failure(state.id, now, &err.to_string(), retry_at, now)
            .await?
        {
            warn!(
                "Lease on campaign prospect {} was lost before its failure was stored",
                state.campaign_prospect_id
            );
            return Ok(StepOutcome::Skipped);
        }

        Ok(StepOutcome::Failed)
    }

    /// Backoff deadline for the next attempt, `None` when backoff is disabled.
    ///
    /// A deadline past the representable range parks the row at the latest instant.
    pub fn retry_at(&self, failure_count: i32, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let base = self.config.retry_backoff_seconds;
        if base <= 0 {
            return None;
        }

        let exponent = failure_count.clamp(0, 30) as u32;
        let seconds = base
            .saturating_mul(2i64.saturating_pow(exponent))
            .min(self.config.retry_backoff_max_seconds.max(base));

        let retry_at = Duration::try_seconds(seconds)
            .and_then(|backoff| now.checked_add_signed(backoff))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Some(retry_at)
    }

    /// Requeue rows whose execution lease has expired.
    pub async fn reclaim_stale_executions(&self) -> WorkflowResult<u64> {
        self.reclaim_stale_at(self.clock.now()).await
    }

    async fn reclaim_stale_at(&self, now: DateTime<Utc>) -> WorkflowResult<u64> {
        // A TTL reaching past the earliest instant means nothing can be stale yet
        let Some(stale_before) = Duration::try_minutes(self.config.stale_after_minutes.max(0))
            .and_then(|ttl| now.checked_sub_signed(ttl))
        else {
            return Ok(0);
        };

        let reclaimed = self.states.reclaim_stale(stale_before, now).await?;

        if reclaimed > 0 {
            warn!("Requeued {} workflow states with expired execution leases", reclaimed);
        }

        Ok(reclaimed)
    }

    /// Create the cursor for an assignment at the given start node.
    ///
    /// Returns the existing row unchanged when the assignment already has one.
    pub async fn initialize_prospect_workflow(
        &self,
        campaign_prospect_id: i64,
        start_node_id: &str,
    ) -> WorkflowResult<WorkflowProspectState> {
        if let Some(existing) = self.states.find_by_campaign_prospect(campaign_prospect_id).await? {
            return Ok(existing);
        }

        let state = self
            .states
            .create_if_absent(campaign_prospect_id, start_node_id, self.clock.now())
            .await?;

        info!(
            "Initialized workflow for campaign prospect {} at node '{}'",
            campaign_prospect_id, start_node_id
        );

        Ok(state)
    }

    /// Initialize an assignment at its campaign's start node.
    pub async fn initialize_campaign_prospect(
        &self,
        campaign_prospect_id: i64,
    ) -> WorkflowResult<WorkflowProspectState> {
        let assignment = self
            .directory
            .campaign_prospect(campaign_prospect_id)
            .await?
            .ok_or(WorkflowError::CampaignProspectNotFound(campaign_prospect_id))?;

        let start = self
            .graph
            .start_node(assignment.campaign_id)
            .await?
            .ok_or(WorkflowError::MissingStartNode(assignment.campaign_id))?;

        self.initialize_prospect_workflow(assignment.id, &start.id).await
    }

    /// Initialize every existing assignment of a campaign. Returns how many cursors were created.
    pub async fn initialize_campaign(&self, campaign_id: i64) -> WorkflowResult<usize> {
        self.directory
            .campaign(campaign_id)
            .await?
            .ok_or(WorkflowError::CampaignNotFound(campaign_id))?;

        let start = self
            .graph
            .start_node(campaign_id)
            .await?
            .ok_or(WorkflowError::MissingStartNode(campaign_id))?;

        let assignments = self.directory.campaign_prospects(campaign_id).await?;
        let mut created = 0;

        for assignment in &assignments {
            if self
                .states
                .find_by_campaign_prospect(assignment.id)
                .await?
                .is_some()
            {
                continue;
            }

            self.states
                .create_if_absent(assignment.id, &start.id, self.clock.now())
                .await?;
            created += 1;
        }

        info!(
            "Backfilled campaign {}: {} of {} assignments initialized",
            campaign_id,
            created,
            assignments.len()
        );

        Ok(created)
    }

    pub async fn prospect_state(
        &self,
        campaign_prospect_id: i64,
    ) -> WorkflowResult<Option<WorkflowProspectState>> {
        self.states.find_by_campaign_prospect(campaign_prospect_id).await
    }
}

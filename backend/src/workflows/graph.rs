// Workflow Graph - Read access to campaign nodes and edges

use async_trait::async_trait;
use cadence_shared::{NodeType, WorkflowEdge};
use sqlx::PgPool;

use super::error::WorkflowResult;
use super::nodes::WorkflowNode;

/// Durable workflow graph of every campaign.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Node by id, `None` when the campaign has no such node.
    async fn get_node(&self, campaign_id: i64, node_id: &str) -> WorkflowResult<Option<WorkflowNode>>;

    /// The campaign's `start` node.
    async fn start_node(&self, campaign_id: i64) -> WorkflowResult<Option<WorkflowNode>>;

    /// All edges leaving a node, in insertion order.
    async fn edges_from(&self, campaign_id: i64, node_id: &str) -> WorkflowResult<Vec<WorkflowEdge>>;

    /// Edges leaving a node that match the branch selector, in insertion order.
    async fn outgoing_edges(
        &self,
        campaign_id: i64,
        node_id: &str,
        branch: Option<&str>,
    ) -> WorkflowResult<Vec<WorkflowEdge>> {
        let edges = self.edges_from(campaign_id, node_id).await?;
        Ok(select_edges(edges, branch))
    }
}

/// Keep the edges whose handle matches the branch, preserving order.
pub fn select_edges(edges: Vec<WorkflowEdge>, branch: Option<&str>) -> Vec<WorkflowEdge> {
    edges
        .into_iter()
        .filter(|edge| edge.matches_branch(branch))
        .collect()
}

#[derive(Debug, sqlx::FromRow)]
struct NodeRow {
    id: String,
    campaign_id: i64,
    node_type: String,
    config: serde_json::Value,
}

impl NodeRow {
    fn into_node(self) -> WorkflowResult<WorkflowNode> {
        WorkflowNode::new(self.id, self.campaign_id, NodeType::from(self.node_type), self.config)
    }
}

/// Graph store backed by the `workflow_nodes` and `workflow_edges` tables
#[derive(Clone)]
pub struct PgGraphStore {
    db_pool: PgPool,
}

impl PgGraphStore {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl GraphStore for PgGraphStore {
    async fn get_node(&self, campaign_id: i64, node_id: &str) -> WorkflowResult<Option<WorkflowNode>> {
        let row: Option<NodeRow> = sqlx::query_as(
            r#"
            SELECT id, campaign_id, node_type, config
            FROM workflow_nodes
            WHERE campaign_id = $1 AND id = $2
            "#,
        )
        .bind(campaign_id)
        .bind(node_id)
        .fetch_optional(&self.db_pool)
        .await?;

        row.map(NodeRow::into_node).transpose()
    }

    async fn start_node(&self, campaign_id: i64) -> WorkflowResult<Option<WorkflowNode>> {
        let row: Option<NodeRow> = sqlx::query_as(
            r#"
            SELECT id, campaign_id, node_type, config
            FROM workflow_nodes
            WHERE campaign_id = $1 AND node_type = 'start'
            ORDER BY created_at, id
            LIMIT 1
            "#,
        )
        .bind(campaign_id)
        .fetch_optional(&self.db_pool)
        .await?;

        row.map(NodeRow::into_node).transpose()
    }

    async fn edges_from(&self, campaign_id: i64, node_id: &str) -> WorkflowResult<Vec<WorkflowEdge>> {
        let edges = sqlx::query_as::<_, WorkflowEdge>(
            r#"
            SELECT id, campaign_id, source_node_id, target_node_id, source_handle, label, condition
            FROM workflow_edges
            WHERE campaign_id = $1 AND source_node_id = $2
            ORDER BY seq
            "#,
        )
        .bind(campaign_id)
        .bind(node_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(edges)
    }
}

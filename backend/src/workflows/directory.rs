// Prospect Directory - Campaigns, prospects and their assignments

use async_trait::async_trait;
use cadence_shared::{Campaign, CampaignProspect, Prospect};
use sqlx::PgPool;

use super::error::WorkflowResult;

/// Read access to rows owned by campaign management.
#[async_trait]
pub trait ProspectDirectory: Send + Sync {
    async fn campaign_prospect(&self, campaign_prospect_id: i64) -> WorkflowResult<Option<CampaignProspect>>;

    async fn prospect(&self, prospect_id: i64) -> WorkflowResult<Option<Prospect>>;

    async fn campaign(&self, campaign_id: i64) -> WorkflowResult<Option<Campaign>>;

    /// Every assignment of a campaign, oldest first.
    async fn campaign_prospects(&self, campaign_id: i64) -> WorkflowResult<Vec<CampaignProspect>>;
}

#[derive(Clone)]
pub struct PgProspectDirectory {
    db_pool: PgPool,
}

impl PgProspectDirectory {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }
}

#[async_trait]
impl ProspectDirectory for PgProspectDirectory {
    async fn campaign_prospect(&self, campaign_prospect_id: i64) -> WorkflowResult<Option<CampaignProspect>> {
        let row = sqlx::query_as::<_, CampaignProspect>(
            "SELECT id, campaign_id, prospect_id, created_at FROM campaign_prospects WHERE id = $1",
        )
        .bind(campaign_prospect_id)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(row)
    }

    async fn prospect(&self, prospect_id: i64) -> WorkflowResult<Option<Prospect>> {
        let row = sqlx::query_as::<_, Prospect>(
            r#"
            SELECT id, team_id, name, first_name, last_name, email, company, title, phone, linkedin
            FROM prospects
            WHERE id = $1
            "#,
        )
        .bind(prospect_id)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(row)
    }

    async fn campaign(&self, campaign_id: i64) -> WorkflowResult<Option<Campaign>> {
        let row = sqlx::query_as::<_, Campaign>(
            "SELECT id, team_id, name, sender_name, sender_email, created_at FROM campaigns WHERE id = $1",
        )
        .bind(campaign_id)
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(row)
    }

    async fn campaign_prospects(&self, campaign_id: i64) -> WorkflowResult<Vec<CampaignProspect>> {
        let rows = sqlx::query_as::<_, CampaignProspect>(
            r#"
            SELECT id, campaign_id, prospect_id, created_at
            FROM campaign_prospects
            WHERE campaign_id = $1
            ORDER BY id
            "#,
        )
        .bind(campaign_id)
        .fetch_all(&self.db_pool)
        .await?;

        Ok(rows)
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: i64,
    pub team_id: i64,
    pub name: String,
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Prospect {
    pub id: i64,
    pub team_id: i64,
    pub name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
    pub title: Option<String>,
    pub phone: Option<String>,
    pub linkedin: Option<String>,
}

impl Prospect {
    /// Look up a template attribute by its camelCase variable name.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        let value = match key {
            "name" => self.name.as_deref(),
            "firstName" => self.first_name.as_deref(),
            "lastName" => self.last_name.as_deref(),
            "company" => self.company.as_deref(),
            "title" => self.title.as_deref(),
            "email" => self.email.as_deref(),
            "phone" => self.phone.as_deref(),
            "linkedin" => self.linkedin.as_deref(),
            _ => None,
        };
        value.filter(|v| !v.trim().is_empty())
    }

    /// Best display name for greetings and mailbox headers.
    pub fn display_name(&self) -> Option<String> {
        if let Some(name) = self.attribute("name") {
            return Some(name.to_string());
        }

        match (self.attribute("firstName"), self.attribute("lastName")) {
            (Some(first), Some(last)) => Some(format!("{} {}", first, last)),
            (Some(first), None) => Some(first.to_string()),
            (None, Some(last)) => Some(last.to_string()),
            (None, None) => None,
        }
    }

    /// Email address, ignoring blank values.
    pub fn email_address(&self) -> Option<&str> {
        self.attribute("email")
    }
}

/// Assignment of a prospect to a campaign. One row per assignment.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignProspect {
    pub id: i64,
    pub campaign_id: i64,
    pub prospect_id: i64,
    pub created_at: DateTime<Utc>,
}

/// Tenant information handed to node actions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamContext {
    pub team_id: i64,
    pub campaign_id: i64,
    pub campaign_name: String,
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
}

impl From<&Campaign> for TeamContext {
    fn from(campaign: &Campaign) -> Self {
        Self {
            team_id: campaign.team_id,
            campaign_id: campaign.id,
            campaign_name: campaign.name.clone(),
            sender_name: campaign.sender_name.clone(),
            sender_email: campaign.sender_email.clone(),
        }
    }
}

/// Workflow node types as stored by the workflow editor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum NodeType {
    Start,
    Email,
    Call,
    Task,
    Transfer,
    Delay,
    WaitUntil,
    TimeSlot,
    Condition,
    VisitLinkedIn,
    AddConnection,
    LinkedInMessage,
    Unknown(String),
}

impl NodeType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Start => "start",
            Self::Email => "email",
            Self::Call => "call",
            Self::Task => "task",
            Self::Transfer => "transfer",
            Self::Delay => "delay",
            Self::WaitUntil => "waitUntil",
            Self::TimeSlot => "timeSlot",
            Self::Condition => "condition",
            Self::VisitLinkedIn => "visitLinkedIn",
            Self::AddConnection => "addConnection",
            Self::LinkedInMessage => "linkedInMessage",
            Self::Unknown(other) => other,
        }
    }

    /// Timing nodes only gate when a prospect may continue.
    pub fn is_timing(&self) -> bool {
        matches!(self, Self::Delay | Self::WaitUntil | Self::TimeSlot)
    }
}

impl From<&str> for NodeType {
    fn from(value: &str) -> Self {
        match value {
            "start" => Self::Start,
            "email" => Self::Email,
            "call" => Self::Call,
            "task" => Self::Task,
            "transfer" => Self::Transfer,
            "delay" => Self::Delay,
            "waitUntil" => Self::WaitUntil,
            "timeSlot" => Self::TimeSlot,
            "condition" => Self::Condition,
            "visitLinkedIn" => Self::VisitLinkedIn,
            "addConnection" => Self::AddConnection,
            "linkedInMessage" => Self::LinkedInMessage,
            other => Self::Unknown(other.to_string()),
        }
    }
}

impl From<String> for NodeType {
    fn from(value: String) -> Self {
        Self::from(value.as_str())
    }
}

impl From<NodeType> for String {
    fn from(value: NodeType) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowEdge {
    pub id: String,
    pub campaign_id: i64,
    pub source_node_id: String,
    pub target_node_id: String,
    /// Branch label such as "yes"/"no". Absent or empty for the default transition.
    pub source_handle: Option<String>,
    pub label: Option<String>,
    pub condition: Option<serde_json::Value>,
}

impl WorkflowEdge {
    /// Whether this edge is followed for the given branch selector.
    ///
    /// A branch only matches edges carrying exactly that handle; no branch
    /// matches edges without a handle.
    pub fn matches_branch(&self, branch: Option<&str>) -> bool {
        let handle = self.source_handle.as_deref().filter(|h| !h.is_empty());
        match branch.filter(|b| !b.is_empty()) {
            Some(branch) => handle == Some(branch),
            None => handle.is_none(),
        }
    }
}

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(
    feature = "sqlx",
    sqlx(type_name = "prospect_workflow_status", rename_all = "snake_case")
)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProspectStatus {
    Ready,
    Waiting,
    Executing,
    Completed,
}

impl ProspectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ready => "ready",
            Self::Waiting => "waiting",
            Self::Executing => "executing",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for ProspectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution cursor of one campaign-prospect assignment.
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowProspectState {
    pub id: i64,
    pub campaign_prospect_id: i64,
    /// `None` once the workflow has finished.
    pub current_node_id: Option<String>,
    pub status: ProspectStatus,
    pub scheduled_for: DateTime<Utc>,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub failure_count: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkflowProspectState {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.status {
            ProspectStatus::Ready => true,
            ProspectStatus::Waiting => self.scheduled_for <= now,
            ProspectStatus::Executing | ProspectStatus::Completed => false,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ProspectStatus::Completed
    }
}

// Workflow Nodes - Typed node configuration for campaign workflows

use cadence_shared::NodeType;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::conditions::ConditionRule;
use super::error::{WorkflowError, WorkflowResult};
use super::timing::is_timing_node;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailConfig {
    pub subject: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallConfig {
    #[serde(default)]
    pub notes: String,
    #[serde(default, deserialize_with = "optional_instant")]
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskConfig {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "optional_instant")]
    pub deadline: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferConfig {
    pub target_campaign_id: i64,
    #[serde(default)]
    pub delay: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DelayUnit {
    Minutes,
    Hours,
    Days,
    Weeks,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelayConfig {
    pub amount: i64,
    pub unit: DelayUnit,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitUntilConfig {
    #[serde(deserialize_with = "required_instant")]
    pub wait_until: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimeSlotConfig {
    /// Allowed hours of the day, 0-23
    #[serde(default)]
    pub hours: Vec<u32>,
    /// Allowed weekdays as abbreviations ("Mon".."Sun")
    #[serde(default)]
    pub days: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionConfig {
    #[serde(default)]
    pub question: String,
    /// Optional machine-checkable rule over prospect attributes
    #[serde(default)]
    pub rule: Option<ConditionRule>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LinkedInMessageConfig {
    #[serde(default)]
    pub message: Option<String>,
}

/// Node configuration, one variant per node type.
#[derive(Debug, Clone, PartialEq)]
pub enum NodeConfig {
    Start,
    Email(EmailConfig),
    Call(CallConfig),
    Task(TaskConfig),
    Transfer(TransferConfig),
    Delay(DelayConfig),
    WaitUntil(WaitUntilConfig),
    TimeSlot(TimeSlotConfig),
    Condition(ConditionConfig),
    VisitLinkedIn,
    AddConnection,
    LinkedInMessage(LinkedInMessageConfig),
    /// Types this engine does not know yet; kept raw
    Unknown(serde_json::Value),
}

impl NodeConfig {
    /// Decode the stored payload for a node of the given type.
    pub fn parse(node_type: &NodeType, config: serde_json::Value) -> Result<Self, serde_json::Error> {
        let config = match config {
            serde_json::Value::Null => serde_json::json!({}),
            other => other,
        };

        Ok(match node_type {
            NodeType::Start => Self::Start,
            NodeType::Email => Self::Email(serde_json::from_value(config)?),
            NodeType::Call => Self::Call(serde_json::from_value(config)?),
            NodeType::Task => Self::Task(serde_json::from_value(config)?),
            NodeType::Transfer => Self::Transfer(serde_json::from_value(config)?),
            NodeType::Delay => Self::Delay(serde_json::from_value(config)?),
            NodeType::WaitUntil => Self::WaitUntil(serde_json::from_value(config)?),
            NodeType::TimeSlot => Self::TimeSlot(serde_json::from_value(config)?),
            NodeType::Condition => Self::Condition(serde_json::from_value(config)?),
            NodeType::VisitLinkedIn => Self::VisitLinkedIn,
            NodeType::AddConnection => Self::AddConnection,
            NodeType::LinkedInMessage => Self::LinkedInMessage(serde_json::from_value(config)?),
            NodeType::Unknown(_) => Self::Unknown(config),
        })
    }
}

/// A node of a campaign workflow graph with its decoded configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowNode {
    pub id: String,
    pub campaign_id: i64,
    pub node_type: NodeType,
    pub config: NodeConfig,
}

impl WorkflowNode {
    pub fn new(
        id: impl Into<String>,
        campaign_id: i64,
        node_type: NodeType,
        config: serde_json::Value,
    ) -> WorkflowResult<Self> {
        let id = id.into();
        let config = NodeConfig::parse(&node_type, config).map_err(|source| {
            WorkflowError::InvalidNodeConfig {
                node_id: id.clone(),
                source,
            }
        })?;

        Ok(Self {
            id,
            campaign_id,
            node_type,
            config,
        })
    }

    pub fn is_timing(&self) -> bool {
        is_timing_node(&self.node_type)
    }
}

/// Parse editor timestamps: RFC 3339, or naive date-times and dates taken as UTC.
pub fn parse_instant(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn required_instant<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_instant(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw)))
}

fn optional_instant<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => parse_instant(&raw)
            .map(Some)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{}'", raw))),
        None => Ok(None),
    }
}

// Workflow Conditions - Branch selection for condition nodes

use async_trait::async_trait;
use cadence_shared::{Prospect, TeamContext};
use rand::Rng;
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{WorkflowError, WorkflowResult};
use super::nodes::ConditionConfig;

pub const BRANCH_YES: &str = "yes";
pub const BRANCH_NO: &str = "no";

/// A check of one prospect attribute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionRule {
    /// Template variable name of the attribute, e.g. "company"
    pub field: String,
    pub operator: String,
    #[serde(default)]
    pub value: Option<String>,
}

impl ConditionRule {
    pub fn new(field: &str, operator: &str, value: Option<&str>) -> Self {
        Self {
            field: field.to_string(),
            operator: operator.to_string(),
            value: value.map(str::to_string),
        }
    }

    pub fn equals(field: &str, value: &str) -> Self {
        Self::new(field, "equals", Some(value))
    }

    pub fn contains(field: &str, value: &str) -> Self {
        Self::new(field, "contains", Some(value))
    }

    pub fn is_empty(field: &str) -> Self {
        Self::new(field, "is_empty", None)
    }

    pub fn regex(field: &str, pattern: &str) -> Self {
        Self::new(field, "regex", Some(pattern))
    }

    /// Evaluate against a prospect. Text comparisons ignore case.
    pub fn evaluate(&self, prospect: &Prospect) -> WorkflowResult<bool> {
        let field_value = prospect.attribute(&self.field);
        let expected = self.value.as_deref().unwrap_or_default();

        let matched = match self.operator.as_str() {
            "equals" | "eq" | "==" => field_value
                .map(|v| v.eq_ignore_ascii_case(expected))
                .unwrap_or(false),
            "not_equals" | "ne" | "!=" => field_value
                .map(|v| !v.eq_ignore_ascii_case(expected))
                .unwrap_or(true),
            "contains" => field_value
                .map(|v| v.to_lowercase().contains(&expected.to_lowercase()))
                .unwrap_or(false),
            "starts_with" => field_value
                .map(|v| v.to_lowercase().starts_with(&expected.to_lowercase()))
                .unwrap_or(false),
            "ends_with" => field_value
                .map(|v| v.to_lowercase().ends_with(&expected.to_lowercase()))
                .unwrap_or(false),
            "is_empty" => field_value.is_none(),
            "is_not_empty" => field_value.is_some(),
            "regex" => {
                let re = RegexBuilder::new(expected)
                    .case_insensitive(true)
                    .build()
                    .map_err(|e| WorkflowError::Condition(format!("invalid pattern '{}': {}", expected, e)))?;
                field_value.map(|v| re.is_match(v)).unwrap_or(false)
            }
            other => {
                return Err(WorkflowError::Condition(format!(
                    "unsupported operator '{}'",
                    other
                )));
            }
        };

        Ok(matched)
    }
}

/// Strategy deciding which branch a condition node takes.
#[async_trait]
pub trait ConditionEvaluator: Send + Sync {
    /// Returns the branch label to follow, normally [`BRANCH_YES`] or [`BRANCH_NO`].
    async fn evaluate(
        &self,
        condition: &ConditionConfig,
        prospect: &Prospect,
        team: &TeamContext,
    ) -> WorkflowResult<String>;
}

/// Picks `yes` or `no` uniformly at random.
///
/// Placeholder for conditions nothing can check yet (free-text questions).
/// Replace it with a real evaluator before relying on branch outcomes.
#[derive(Debug, Clone, Copy, Default)]
pub struct RandomConditionEvaluator;

#[async_trait]
impl ConditionEvaluator for RandomConditionEvaluator {
    async fn evaluate(
        &self,
        condition: &ConditionConfig,
        _prospect: &Prospect,
        _team: &TeamContext,
    ) -> WorkflowResult<String> {
        let yes = rand::thread_rng().gen_bool(0.5);
        tracing::debug!("Random branch for condition '{}': {}", condition.question, yes);
        Ok(branch_label(yes).to_string())
    }
}

/// Evaluates `rule` conditions against prospect attributes and hands
/// question-only conditions to a fallback evaluator.
pub struct RuleConditionEvaluator {
    fallback: Arc<dyn ConditionEvaluator>,
}

impl RuleConditionEvaluator {
    pub fn new(fallback: Arc<dyn ConditionEvaluator>) -> Self {
        Self { fallback }
    }
}

impl Default for RuleConditionEvaluator {
    fn default() -> Self {
        Self::new(Arc::new(RandomConditionEvaluator))
    }
}

#[async_trait]
impl ConditionEvaluator for RuleConditionEvaluator {
    async fn evaluate(
        &self,
        condition: &ConditionConfig,
        prospect: &Prospect,
        team: &TeamContext,
    ) -> WorkflowResult<String> {
        match &condition.rule {
            Some(rule) => Ok(branch_label(rule.evaluate(prospect)?).to_string()),
            None => self.fallback.evaluate(condition, prospect, team).await,
        }
    }
}

pub fn branch_label(matched: bool) -> &'static str {
    if matched { BRANCH_YES } else { BRANCH_NO }
}

// Campaign Workflow Engine
//
// Moves each campaign prospect through its campaign's workflow graph one node
// per poll. Progress lives in `workflow_prospect_states`, so a restart resumes
// where the last poll stopped.

pub mod actions;
pub mod clock;
pub mod conditions;
pub mod directory;
pub mod engine;
pub mod error;
pub mod executor;
pub mod graph;
pub mod nodes;
pub mod state;
pub mod timing;

pub use actions::{ActionHandler, ActionRequest, ActionResult, TaskActionHandler};
pub use clock::{Clock, SystemClock};
pub use conditions::{
    ConditionEvaluator, ConditionRule, RandomConditionEvaluator, RuleConditionEvaluator, BRANCH_NO, BRANCH_YES,
};
pub use directory::{PgProspectDirectory, ProspectDirectory};
pub use engine::{PollReport, WorkflowEngine};
pub use error::{WorkflowError, WorkflowResult};
pub use executor::{replace_variables, NodeExecutor, NodeOutcome};
pub use graph::{GraphStore, PgGraphStore};
pub use nodes::WorkflowNode;
pub use state::{PgProspectStateStore, ProspectStateStore, Transition};

//! Action types for cloud resource reconciliation

use crate::error::{CloudError, Result};
use crate::graph::{ResourceKind, ResourceSpec};
use serde::{Deserialize, Serialize};

/// Represents a planned operation on one resource
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Unique identifier for the action (e.g. "create-vpc")
    pub id: String,

    /// Type of action to perform
    pub action_type: ActionType,

    /// Resource kind
    pub kind: ResourceKind,

    /// Logical resource name
    pub resource: String,

    /// Why the planner chose this action
    pub reason: String,

    /// Desired spec for create/update/no-op; absent for delete
    ///
    /// Skipped on serialization because resolved user data may carry key
    /// material.
    #[serde(skip)]
    pub spec: Option<ResourceSpec>,

    /// Provider identifier recorded in state, if any
    pub provider_id: Option<String>,

    /// Fields an update changes in place
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub changed: Vec<String>,
}

impl Action {
    pub fn new(
        action_type: ActionType,
        kind: ResourceKind,
        resource: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        let resource = resource.into();
        Self {
            id: format!("{}-{}", action_type, resource),
            action_type,
            kind,
            resource,
            reason: reason.into(),
            spec: None,
            provider_id: None,
            changed: Vec::new(),
        }
    }

    pub fn with_spec(mut self, spec: ResourceSpec) -> Self {
        self.spec = Some(spec);
        self
    }

    pub fn with_provider_id(mut self, id: impl Into<String>) -> Self {
        self.provider_id = Some(id.into());
        self
    }

    pub fn with_changes(mut self, changed: Vec<String>) -> Self {
        self.changed = changed;
        self
    }
}

/// Type of action to perform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a new resource
    Create,
    /// Update an existing resource
    Update,
    /// Delete a resource
    Delete,
    /// No changes needed
    NoOp,
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionType::Create => write!(f, "create"),
            ActionType::Update => write!(f, "update"),
            ActionType::Delete => write!(f, "delete"),
            ActionType::NoOp => write!(f, "no-op"),
        }
    }
}

/// Result of applying a plan
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplyResult {
    /// Successfully applied actions
    pub succeeded: Vec<ActionResult>,

    /// Failed actions
    pub failed: Vec<ActionResult>,

    /// Actions never attempted because an earlier action failed
    pub skipped: Vec<String>,

    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl ApplyResult {
    pub fn new() -> Self {
        Self {
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn add_success(&mut self, action: &Action, message: String) {
        self.succeeded.push(ActionResult {
            action_id: action.id.clone(),
            resource: action.resource.clone(),
            success: true,
            message,
            error: None,
        });
    }

    pub fn add_failure(&mut self, action: &Action, error: String) {
        self.failed.push(ActionResult {
            action_id: action.id.clone(),
            resource: action.resource.clone(),
            success: false,
            message: String::new(),
            error: Some(error),
        });
    }

    /// First failure, if any
    pub fn first_failure(&self) -> Option<&ActionResult> {
        self.failed.first()
    }

    /// Turn the first failure into an error naming the failing resource
    pub fn ensure_success(&self) -> Result<()> {
        match self.first_failure() {
            None => Ok(()),
            Some(failure) => Err(CloudError::ApplyFailed {
                resource: failure.resource.clone(),
                message: failure.error.clone().unwrap_or_default(),
            }),
        }
    }
}

impl Default for ApplyResult {
    fn default() -> Self {
        Self::new()
    }
}

/// Result of a single action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionResult {
    /// ID of the action
    pub action_id: String,

    /// Logical name of the resource the action targeted
    pub resource: String,

    /// Whether the action succeeded
    pub success: bool,

    /// Success message
    pub message: String,

    /// Error message if failed
    pub error: Option<String>,
}

/// Ordered list of actions produced by the planner
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    /// Actions in execution order
    pub actions: Vec<Action>,

    /// Whether the plan has any changes
    pub has_changes: bool,
}

impl Plan {
    pub fn new(actions: Vec<Action>) -> Self {
        let has_changes = actions.iter().any(|a| a.action_type != ActionType::NoOp);
        Self {
            actions,
            has_changes,
        }
    }

    pub fn empty() -> Self {
        Self {
            actions: Vec::new(),
            has_changes: false,
        }
    }

    /// Get actions by type
    pub fn actions_by_type(&self, action_type: ActionType) -> Vec<&Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type == action_type)
            .collect()
    }

    /// Actions that change something
    pub fn changes(&self) -> impl Iterator<Item = &Action> {
        self.actions
            .iter()
            .filter(|a| a.action_type != ActionType::NoOp)
    }

    /// Summary of the plan
    pub fn summary(&self) -> PlanSummary {
        PlanSummary {
            create: self.actions_by_type(ActionType::Create).len(),
            update: self.actions_by_type(ActionType::Update).len(),
            delete: self.actions_by_type(ActionType::Delete).len(),
            no_change: self.actions_by_type(ActionType::NoOp).len(),
        }
    }
}

/// Summary of planned actions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub delete: usize,
    pub no_change: usize,
}

impl std::fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to delete, {} unchanged",
            self.create, self.update, self.delete, self.no_change
        )
    }
}

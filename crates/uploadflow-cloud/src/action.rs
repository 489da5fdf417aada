//! Provisioning plan for a deployment
//!
//! The plan is data: an ordered list of steps over resource kinds. Delete is
//! the deploy plan reversed, with every step's action inverted.

use serde::{Deserialize, Serialize};

/// Top-level operation requested by the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Deploy,
    Delete,
}

impl Operation {
    pub fn inverse(self) -> Self {
        match self {
            Operation::Deploy => Operation::Delete,
            Operation::Delete => Operation::Deploy,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::Deploy => write!(f, "deploy"),
            Operation::Delete => write!(f, "delete"),
        }
    }
}

/// Type of action to perform, also used as the observed outcome of a step
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

impl ActionType {
    /// Whether this outcome changed anything in the backend
    pub fn is_mutation(self) -> bool {
        self != ActionType::NoOp
    }
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

/// Kind of resource a step operates on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Parameter,
    Bucket,
    Application,
    Subscription,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Parameter => write!(f, "parameter"),
            ResourceKind::Bucket => write!(f, "bucket"),
            ResourceKind::Application => write!(f, "application"),
            ResourceKind::Subscription => write!(f, "subscription"),
        }
    }
}

/// Dependency order for creation: referenced resources come first
const DEPLOY_ORDER: [ResourceKind; 4] = [
    ResourceKind::Parameter,
    ResourceKind::Bucket,
    ResourceKind::Application,
    ResourceKind::Subscription,
];

/// A planned action on one resource kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub kind: ResourceKind,
    /// `Create` (ensure present) or `Delete` (ensure absent)
    pub action: ActionType,
}

impl Step {
    pub fn new(kind: ResourceKind, action: ActionType) -> Self {
        Self { kind, action }
    }

    fn inverted(self) -> Self {
        let action = match self.action {
            ActionType::Create => ActionType::Delete,
            ActionType::Delete => ActionType::Create,
            other => other,
        };
        Self { action, ..self }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.action, self.kind)
    }
}

/// Ordered list of steps to execute
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    operation: Operation,
    steps: Vec<Step>,
}

impl Plan {
    pub fn for_operation(operation: Operation) -> Self {
        match operation {
            Operation::Deploy => Self::deploy(),
            Operation::Delete => Self::delete(),
        }
    }

    /// Parameter, bucket, application, then the bucket → application wiring
    pub fn deploy() -> Self {
        Self {
            operation: Operation::Deploy,
            steps: DEPLOY_ORDER
                .iter()
                .map(|kind| Step::new(*kind, ActionType::Create))
                .collect(),
        }
    }

    /// Exact reverse of [`Plan::deploy`]
    pub fn delete() -> Self {
        Self::deploy().reversed()
    }

    pub fn reversed(&self) -> Self {
        Self {
            operation: self.operation.inverse(),
            steps: self.steps.iter().rev().map(|s| s.inverted()).collect(),
        }
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Deploy stops at the first failure, delete keeps going
    pub fn fail_fast(&self) -> bool {
        self.operation == Operation::Deploy
    }

    pub fn position(&self, kind: ResourceKind) -> Option<usize> {
        self.steps.iter().position(|s| s.kind == kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deploy_order() {
        let plan = Plan::deploy();
        let kinds: Vec<_> = plan.steps().iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::Parameter,
                ResourceKind::Bucket,
                ResourceKind::Application,
                ResourceKind::Subscription,
            ]
        );
        assert!(plan.steps().iter().all(|s| s.action == ActionType::Create));
        assert!(plan.fail_fast());
    }

    #[test]
    fn test_delete_is_reverse_of_deploy() {
        let plan = Plan::delete();
        assert_eq!(plan.operation(), Operation::Delete);
        assert!(!plan.fail_fast());

        let kinds: Vec<_> = plan.steps().iter().map(|s| s.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::Subscription,
                ResourceKind::Application,
                ResourceKind::Bucket,
                ResourceKind::Parameter,
            ]
        );
        assert!(plan.steps().iter().all(|s| s.action == ActionType::Delete));
    }

    #[test]
    fn test_reversed_twice_is_identity() {
        assert_eq!(Plan::deploy().reversed().reversed(), Plan::deploy());
        assert_eq!(Plan::for_operation(Operation::Delete), Plan::delete());
    }

    #[test]
    fn test_dependency_positions() {
        let deploy = Plan::deploy();
        assert!(
            deploy.position(ResourceKind::Application) < deploy.position(ResourceKind::Subscription)
        );

        let delete = Plan::delete();
        assert!(delete.position(ResourceKind::Subscription) < delete.position(ResourceKind::Bucket));
    }

    #[test]
    fn test_step_display() {
        let step = Step::new(ResourceKind::Bucket, ActionType::Delete);
        assert_eq!(step.to_string(), "delete bucket");
        assert_eq!(ActionType::NoOp.to_string(), "no-op");
    }
}

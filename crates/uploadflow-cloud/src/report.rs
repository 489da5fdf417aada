//! Result of executing a plan

use crate::action::{ActionType, Operation, ResourceKind, Step};
use crate::error::{CloudError, ErrorKind};
use crate::resource::ApplicationHandle;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Final state of an invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Complete,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Complete => write!(f, "COMPLETE"),
            RunStatus::Failed => write!(f, "FAILED"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepFailure {
    /// Flattened next to the step's resource `kind`
    #[serde(rename = "error_kind")]
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&CloudError> for StepFailure {
    fn from(err: &CloudError) -> Self {
        Self {
            kind: err.kind(),
            message: err.detailed_message(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded { outcome: ActionType },
    Failed(StepFailure),
    /// Not attempted because an earlier deploy step failed
    Skipped,
}

/// Progress record emitted once per plan step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepRecord {
    pub kind: ResourceKind,
    pub action: ActionType,
    #[serde(flatten)]
    pub status: StepStatus,
}

impl StepRecord {
    pub fn succeeded(step: &Step, outcome: ActionType) -> Self {
        Self {
            kind: step.kind,
            action: step.action,
            status: StepStatus::Succeeded { outcome },
        }
    }

    pub fn failed(step: &Step, err: &CloudError) -> Self {
        Self {
            kind: step.kind,
            action: step.action,
            status: StepStatus::Failed(err.into()),
        }
    }

    pub fn skipped(step: &Step) -> Self {
        Self {
            kind: step.kind,
            action: step.action,
            status: StepStatus::Skipped,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.status, StepStatus::Failed(_))
    }

    pub fn outcome(&self) -> Option<ActionType> {
        match self.status {
            StepStatus::Succeeded { outcome } => Some(outcome),
            _ => None,
        }
    }

    pub fn failure(&self) -> Option<&StepFailure> {
        match &self.status {
            StepStatus::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

impl std::fmt::Display for StepRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.status {
            StepStatus::Succeeded { outcome } => {
                write!(f, "{} {}: {}", self.action, self.kind, outcome)
            }
            StepStatus::Failed(failure) => write!(
                f,
                "{} {}: failed ({}: {})",
                self.action, self.kind, failure.kind, failure.message
            ),
            StepStatus::Skipped => write!(f, "{} {}: skipped", self.action, self.kind),
        }
    }
}

/// Result of one deploy or delete invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub operation: Operation,
    pub status: RunStatus,
    /// One record per plan step, in plan order
    pub steps: Vec<StepRecord>,
    /// Handle of the deployed application, when a deploy reached it
    pub application: Option<ApplicationHandle>,
    pub started_at: DateTime<Utc>,
    /// Total execution time in milliseconds
    pub duration_ms: u64,
}

impl RunReport {
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            status: RunStatus::Complete,
            steps: Vec::new(),
            application: None,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    pub fn push(&mut self, record: StepRecord) {
        if record.is_failure() {
            self.status = RunStatus::Failed;
        }
        self.steps.push(record);
    }

    pub fn is_complete(&self) -> bool {
        self.status == RunStatus::Complete
    }

    pub fn failures(&self) -> Vec<&StepRecord> {
        self.steps.iter().filter(|s| s.is_failure()).collect()
    }

    pub fn step(&self, kind: ResourceKind) -> Option<&StepRecord> {
        self.steps.iter().find(|s| s.kind == kind)
    }

    /// Number of steps that changed something in a backend
    pub fn mutations(&self) -> usize {
        self.steps
            .iter()
            .filter_map(|s| s.outcome())
            .filter(|o| o.is_mutation())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_marks_report_failed() {
        let mut report = RunReport::new(Operation::Delete);
        report.push(StepRecord::succeeded(
            &Step::new(ResourceKind::Subscription, ActionType::Delete),
            ActionType::Delete,
        ));
        assert!(report.is_complete());

        report.push(StepRecord::failed(
            &Step::new(ResourceKind::Bucket, ActionType::Delete),
            &CloudError::NotEmpty("uploads".to_string()),
        ));
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.failures().len(), 1);
        assert_eq!(
            report.step(ResourceKind::Bucket).unwrap().failure().unwrap().kind,
            ErrorKind::NotEmpty
        );
        assert_eq!(report.mutations(), 1);
    }

    #[test]
    fn test_record_display() {
        let record = StepRecord::failed(
            &Step::new(ResourceKind::Bucket, ActionType::Delete),
            &CloudError::NotEmpty("uploads".to_string()),
        );
        assert_eq!(
            record.to_string(),
            "delete bucket: failed (NotEmptyError: Bucket not empty: uploads)"
        );

        let skipped = StepRecord::skipped(&Step::new(ResourceKind::Subscription, ActionType::Create));
        assert_eq!(skipped.to_string(), "create subscription: skipped");
    }

    #[test]
    fn test_record_serializes_flat() {
        let record = StepRecord::succeeded(
            &Step::new(ResourceKind::Parameter, ActionType::Create),
            ActionType::NoOp,
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["kind"], "parameter");
        assert_eq!(json["status"], "succeeded");
        assert_eq!(json["outcome"], "no_op");
    }

    #[test]
    fn test_failed_report_json_round_trip() {
        let mut report = RunReport::new(Operation::Delete);
        report.push(StepRecord::succeeded(
            &Step::new(ResourceKind::Application, ActionType::Delete),
            ActionType::Delete,
        ));
        report.push(StepRecord::failed(
            &Step::new(ResourceKind::Bucket, ActionType::Delete),
            &CloudError::NotEmpty("uploads".to_string()),
        ));
        report.push(StepRecord::skipped(&Step::new(
            ResourceKind::Parameter,
            ActionType::Delete,
        )));

        let json = serde_json::to_value(&report).unwrap();
        let failed = &json["steps"][1];
        assert_eq!(failed["kind"], "bucket");
        assert_eq!(failed["status"], "failed");
        assert_eq!(failed["error_kind"], "not_empty");

        let text = serde_json::to_string(&report).unwrap();
        let parsed: RunReport = serde_json::from_str(&text).unwrap();
        assert_eq!(parsed, report);
        assert_eq!(parsed.failures()[0].kind, ResourceKind::Bucket);
    }
}

//! Plan execution
//!
//! One loop drives both directions. Steps run strictly in plan order since
//! later steps consume handles produced by earlier ones (the subscription
//! needs the application's ARN). Deploy stops at the first failure and marks
//! the remaining steps skipped; delete attempts every step and collects the
//! failures.

use crate::action::{ActionType, Plan, ResourceKind, Step};
use crate::error::{CloudError, Result};
use crate::provider::ResourceClients;
use crate::report::{RunReport, StepRecord};
use crate::resource::{ApplicationHandle, Deployment, EventSubscription};
use std::time::Instant;

/// Handles produced by earlier steps of the same invocation
#[derive(Debug, Default)]
struct RunContext {
    application: Option<ApplicationHandle>,
}

pub struct Orchestrator {
    clients: ResourceClients,
}

impl Orchestrator {
    pub fn new(clients: ResourceClients) -> Self {
        Self { clients }
    }

    /// Execute `plan` against `deployment`
    pub async fn run(&self, plan: &Plan, deployment: &Deployment) -> RunReport {
        self.run_with_progress(plan, deployment, |_| {}).await
    }

    /// Execute `plan`, calling `progress` with each step record as soon as
    /// the step finishes
    pub async fn run_with_progress<F>(
        &self,
        plan: &Plan,
        deployment: &Deployment,
        mut progress: F,
    ) -> RunReport
    where
        F: FnMut(&StepRecord) + Send,
    {
        let start = Instant::now();
        let mut report = RunReport::new(plan.operation());
        let mut context = RunContext::default();
        let mut aborted = false;

        tracing::info!(
            operation = %plan.operation(),
            identity = %deployment.identity,
            "Executing plan with {} steps",
            plan.steps().len()
        );

        for step in plan.steps() {
            let record = if aborted {
                tracing::info!(kind = %step.kind, action = %step.action, outcome = "skipped");
                StepRecord::skipped(step)
            } else {
                match self.execute(step, deployment, &mut context).await {
                    Ok(outcome) => {
                        tracing::info!(kind = %step.kind, action = %step.action, outcome = %outcome);
                        StepRecord::succeeded(step, outcome)
                    }
                    Err(err) => {
                        tracing::error!(
                            kind = %step.kind,
                            action = %step.action,
                            error_kind = %err.kind(),
                            "{}",
                            err.detailed_message()
                        );
                        if plan.fail_fast() {
                            aborted = true;
                        }
                        StepRecord::failed(step, &err)
                    }
                }
            };

            progress(&record);
            report.push(record);
        }

        report.application = context.application;
        report.duration_ms = start.elapsed().as_millis() as u64;

        tracing::info!(
            operation = %plan.operation(),
            status = %report.status,
            failed = report.failures().len(),
            "Plan finished in {}ms",
            report.duration_ms
        );
        report
    }

    async fn execute(
        &self,
        step: &Step,
        deployment: &Deployment,
        context: &mut RunContext,
    ) -> Result<ActionType> {
        let clients = &self.clients;

        match (step.kind, step.action) {
            (ResourceKind::Parameter, ActionType::Create) => clients
                .parameters
                .ensure_exists(&deployment.parameter)
                .await
                .map(|p| p.outcome),
            (ResourceKind::Parameter, ActionType::Delete) => {
                clients
                    .parameters
                    .ensure_absent(&deployment.parameter.name)
                    .await
            }
            (ResourceKind::Bucket, ActionType::Create) => clients
                .buckets
                .ensure_exists(&deployment.bucket)
                .await
                .map(|b| b.outcome),
            (ResourceKind::Bucket, ActionType::Delete) => {
                clients.buckets.ensure_absent(&deployment.bucket.name).await
            }
            (ResourceKind::Application, ActionType::Create) => {
                let provisioned = clients
                    .applications
                    .ensure_exists(&deployment.application)
                    .await?;
                tracing::debug!(arn = %provisioned.handle.arn, "Application handle");
                context.application = Some(provisioned.handle);
                Ok(provisioned.outcome)
            }
            (ResourceKind::Application, ActionType::Delete) => {
                clients
                    .applications
                    .ensure_absent(&deployment.application)
                    .await
            }
            (ResourceKind::Subscription, ActionType::Create) => {
                let application = context.application.as_ref().ok_or_else(|| {
                    CloudError::NotFound(format!(
                        "application {} has no deployed handle to subscribe",
                        deployment.application.function_name()
                    ))
                })?;
                let subscription = EventSubscription::object_created(application.arn.clone());
                clients
                    .buckets
                    .attach_subscription(&deployment.bucket.name, &subscription)
                    .await
            }
            (ResourceKind::Subscription, ActionType::Delete) => {
                clients
                    .buckets
                    .detach_subscription(&deployment.bucket.name)
                    .await
            }
            (kind, action) => Err(CloudError::InvalidConfig(format!(
                "unsupported step: {} {}",
                action, kind
            ))),
        }
    }
}

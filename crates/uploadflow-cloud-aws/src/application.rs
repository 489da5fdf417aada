//! Chalice application client
//!
//! Deploys the application with the chalice CLI and confirms the result
//! against Lambda. Ownership of a live function is read from the
//! `aws-chalice` tag that chalice puts on every function it creates.

use crate::chalice::{Chalice, ChaliceProject, DeployedRecord};
use crate::context::AwsContext;
use crate::error::{AwsError, sdk_error};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use uploadflow_cloud::{
    ActionType, ApplicationClient, ApplicationHandle, ApplicationSpec, CloudError, Provisioned,
    Result,
};

const CHALICE_TAG: &str = "aws-chalice";

/// Whether an `aws-chalice` tag (`version=..:stage=..:app=..`) names the
/// given app and stage
fn chalice_tag_matches(tag: &str, app: &str, stage: &str) -> bool {
    let fields: HashMap<&str, &str> = tag
        .split(':')
        .filter_map(|pair| pair.split_once('='))
        .collect();
    fields.get("app") == Some(&app) && fields.get("stage") == Some(&stage)
}

/// Whether every binding is already present in a live function environment
fn environment_matches(
    live: &HashMap<String, String>,
    bindings: &BTreeMap<String, String>,
) -> bool {
    bindings.iter().all(|(key, value)| live.get(key) == Some(value))
}

/// Locate the event handler in a deployed record. A record holding a single
/// function is taken as the handler whatever its name.
fn deployed_function(
    record: &DeployedRecord,
    spec: &ApplicationSpec,
    record_path: &str,
) -> std::result::Result<ApplicationHandle, AwsError> {
    let function_name = spec.function_name();
    if let Some(arn) = record
        .lambda_function(&[function_name.as_str(), spec.handler.as_str()])
        .and_then(|r| r.lambda_arn.clone())
    {
        return Ok(ApplicationHandle { function_name, arn });
    }

    let mut functions = record.lambda_functions();
    let only = match (functions.next(), functions.next()) {
        (Some(only), None) => only.lambda_arn.clone().map(|arn| (only, arn)),
        _ => None,
    };
    match only {
        Some((only, arn)) => {
            tracing::warn!(
                "Handler {} not in {}, using its only function {}",
                spec.handler,
                record_path,
                only.name
            );
            Ok(ApplicationHandle {
                function_name: arn.rsplit(':').next().unwrap_or(&only.name).to_string(),
                arn,
            })
        }
        _ => Err(AwsError::DeployedFunctionMissing {
            function: function_name,
            record: record_path.to_string(),
        }),
    }
}

/// Function as Lambda currently runs it
struct LiveFunction {
    tags: HashMap<String, String>,
    environment: HashMap<String, String>,
}

pub struct ChaliceApplicationClient {
    lambda: aws_sdk_lambda::Client,
    logs: aws_sdk_cloudwatchlogs::Client,
    region: String,
    log_retention_days: i32,
}

impl ChaliceApplicationClient {
    pub fn new(ctx: &AwsContext) -> Self {
        Self {
            lambda: ctx.lambda(),
            logs: ctx.logs(),
            region: ctx.region().to_string(),
            log_retention_days: 1,
        }
    }

    /// Retention applied to the function's log group after delete
    pub fn with_log_retention_days(mut self, days: i32) -> Self {
        self.log_retention_days = days;
        self
    }

    /// Live function state, or `None` when it does not exist
    async fn live_function(&self, function_name: &str) -> Result<Option<LiveFunction>> {
        match self
            .lambda
            .get_function()
            .function_name(function_name)
            .send()
            .await
        {
            Ok(output) => Ok(Some(LiveFunction {
                tags: output.tags().cloned().unwrap_or_default(),
                environment: output
                    .configuration()
                    .and_then(|c| c.environment())
                    .and_then(|e| e.variables())
                    .cloned()
                    .unwrap_or_default(),
            })),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                Ok(None)
            }
            Err(err) => Err(sdk_error(format!("GetFunction {}", function_name), err)),
        }
    }

    /// The live function, if any; a live function must belong to this
    /// deployment
    async fn owned_function(&self, spec: &ApplicationSpec) -> Result<Option<LiveFunction>> {
        let function_name = spec.function_name();
        let Some(function) = self.live_function(&function_name).await? else {
            return Ok(None);
        };

        let owned = function.tags.get(CHALICE_TAG).is_some_and(|tag| {
            chalice_tag_matches(tag, &spec.identity.application_name, &spec.identity.stage)
        });
        if !owned {
            return Err(CloudError::Conflict(format!(
                "function {} is not managed by this deployment",
                function_name
            )));
        }
        Ok(Some(function))
    }

    async fn set_log_retention(&self, spec: &ApplicationSpec) -> Result<()> {
        let log_group = spec.identity.log_group(&spec.handler);
        let result = self
            .logs
            .put_retention_policy()
            .log_group_name(&log_group)
            .retention_in_days(self.log_retention_days)
            .send()
            .await;

        match result {
            Ok(_) => {
                tracing::info!(
                    "Log retention for {} set to {} day(s)",
                    log_group,
                    self.log_retention_days
                );
            }
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                tracing::debug!("Log group {} not found", log_group);
            }
            Err(err) => {
                let err = sdk_error(format!("PutRetentionPolicy {}", log_group), err);
                tracing::warn!("Unable to set log retention: {}", err.detailed_message());
            }
        }
        Ok(())
    }

    async fn deploy(
        &self,
        spec: &ApplicationSpec,
        project: &ChaliceProject,
    ) -> std::result::Result<ApplicationHandle, AwsError> {
        let chalice = Chalice::new(project, self.region.clone());
        chalice.check_installed().await?;
        chalice.deploy(&spec.identity.stage).await?;

        let record_path = project.deployed_path(&spec.identity.stage);
        let record = project
            .deployed_record(&spec.identity.stage)
            .await?
            .ok_or_else(|| {
                AwsError::InvalidProject(format!(
                    "chalice deploy did not write {}",
                    record_path.display()
                ))
            })?;
        deployed_function(&record, spec, &record_path.display().to_string())
    }
}

#[async_trait]
impl ApplicationClient for ChaliceApplicationClient {
    async fn ensure_exists(
        &self,
        spec: &ApplicationSpec,
    ) -> Result<Provisioned<ApplicationHandle>> {
        let project = ChaliceProject::open(&spec.source_dir)?;
        let live = self.owned_function(spec).await?;
        project.set_environment(&spec.bindings).await?;

        // Redeploy unless the running function already resolves our resources
        let current = live
            .as_ref()
            .is_some_and(|f| environment_matches(&f.environment, &spec.bindings));
        if current {
            if let Some(record) = project.deployed_record(&spec.identity.stage).await? {
                let record_path = project.deployed_path(&spec.identity.stage);
                let handle = deployed_function(&record, spec, &record_path.display().to_string())?;
                tracing::info!("Application {} already deployed", handle.function_name);
                return Ok(Provisioned::existing(handle));
            }
        }

        let handle = self.deploy(spec, &project).await?;
        tracing::info!("Application deployed: {}", handle.arn);
        Ok(if live.is_some() {
            Provisioned::updated(handle)
        } else {
            Provisioned::created(handle)
        })
    }

    async fn ensure_absent(&self, spec: &ApplicationSpec) -> Result<ActionType> {
        let project = ChaliceProject::open(&spec.source_dir)?;
        if project.deployed_record(&spec.identity.stage).await?.is_none() {
            tracing::info!(
                "Application {} has no deployed record. Proceeding.",
                spec.function_name()
            );
            return Ok(ActionType::NoOp);
        }

        self.owned_function(spec).await?;

        let chalice = Chalice::new(&project, self.region.clone());
        chalice.check_installed().await?;
        chalice.delete(&spec.identity.stage).await?;
        tracing::info!("Application {} deleted", spec.function_name());

        project.clear_environment(spec.bindings.keys()).await?;
        self.set_log_retention(spec).await?;

        Ok(ActionType::Delete)
    }
}

//! Resource model for an upload-notification deployment
//!
//! One deployment is a fixed topology: a configuration parameter, a storage
//! bucket, a serverless application, and the bucket → application event
//! subscription. Every name is derived from the [`DeploymentIdentity`] plus
//! the identifiers supplied on the command line.

use crate::action::ActionType;
use crate::error::{CloudError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Tag carrying the owning deployment on buckets and parameters
pub const DEPLOYMENT_TAG: &str = "uploadflow:deployment";

/// Tag carrying the caller that created a resource
pub const CREATED_BY_TAG: &str = "CreatedBy";

/// Event type wired from the bucket to the application
pub const OBJECT_CREATED_EVENT: &str = "s3:ObjectCreated:*";

/// Environment binding holding the parameter name read by the function
pub const PHONE_NUM_PARAM_BINDING: &str = "PHONE_NUM_PARAM";

/// Environment binding holding the bucket name watched by the function
pub const S3_BUCKET_BINDING: &str = "S3_BUCKET";

/// Naming and ownership key shared by every resource of a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeploymentIdentity {
    pub application_name: String,
    pub region: String,
    pub stage: String,
}

impl DeploymentIdentity {
    pub fn new(
        application_name: impl Into<String>,
        region: impl Into<String>,
        stage: impl Into<String>,
    ) -> Self {
        Self {
            application_name: application_name.into(),
            region: region.into(),
            stage: stage.into(),
        }
    }

    /// Value of [`DEPLOYMENT_TAG`] on resources owned by this deployment
    pub fn owner_tag(&self) -> String {
        format!("{}/{}", self.application_name, self.stage)
    }

    /// Deployed function name (`{app}-{stage}-{handler}`)
    pub fn function_name(&self, handler: &str) -> String {
        format!("{}-{}-{}", self.application_name, self.stage, handler)
    }

    /// Log group written by the deployed function
    pub fn log_group(&self, handler: &str) -> String {
        format!("/aws/lambda/{}", self.function_name(handler))
    }
}

impl std::fmt::Display for DeploymentIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (stage {}, region {})",
            self.application_name, self.stage, self.region
        )
    }
}

/// Event wiring from a bucket to a function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSubscription {
    pub function_arn: String,
    pub events: Vec<String>,
}

impl EventSubscription {
    /// Subscription firing on every object upload
    pub fn object_created(function_arn: impl Into<String>) -> Self {
        Self {
            function_arn: function_arn.into(),
            events: vec![OBJECT_CREATED_EVENT.to_string()],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketSpec {
    pub name: String,
    pub region: String,
    /// Attached together with the bucket when set
    pub event_subscription: Option<EventSubscription>,
}

impl BucketSpec {
    pub fn new(name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            region: region.into(),
            event_subscription: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketHandle {
    pub name: String,
    pub region: String,
}

/// Named configuration parameter
///
/// `value: None` means "reuse whatever is stored": the parameter must already
/// exist. `value: Some(_)` creates the parameter or overwrites a differing
/// value on a parameter this deployment owns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    #[serde(skip_serializing)]
    pub value: Option<String>,
}

impl ParameterSpec {
    pub fn new(name: impl Into<String>, value: Option<String>) -> Self {
        Self {
            name: name.into(),
            value,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterHandle {
    pub name: String,
}

/// Serverless application built from a local source tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationSpec {
    pub identity: DeploymentIdentity,
    /// Function inside the application that receives upload events
    pub handler: String,
    pub source_dir: PathBuf,
    /// Environment bindings resolved by the function at invocation time
    pub bindings: BTreeMap<String, String>,
}

impl ApplicationSpec {
    pub fn new(
        identity: DeploymentIdentity,
        handler: impl Into<String>,
        source_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            identity,
            handler: handler.into(),
            source_dir: source_dir.into(),
            bindings: BTreeMap::new(),
        }
    }

    pub fn with_binding(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.bindings.insert(key.into(), value.into());
        self
    }

    pub fn function_name(&self) -> String {
        self.identity.function_name(&self.handler)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationHandle {
    pub function_name: String,
    pub arn: String,
}

/// Result of an `ensure_exists` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provisioned<H> {
    pub handle: H,
    /// `Create`, `Update`, or `NoOp` when the resource was already in place
    pub outcome: ActionType,
}

impl<H> Provisioned<H> {
    pub fn created(handle: H) -> Self {
        Self {
            handle,
            outcome: ActionType::Create,
        }
    }

    pub fn updated(handle: H) -> Self {
        Self {
            handle,
            outcome: ActionType::Update,
        }
    }

    pub fn existing(handle: H) -> Self {
        Self {
            handle,
            outcome: ActionType::NoOp,
        }
    }
}

/// Complete desired topology for one deploy or delete invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub identity: DeploymentIdentity,
    pub parameter: ParameterSpec,
    pub bucket: BucketSpec,
    pub application: ApplicationSpec,
}

impl Deployment {
    /// Build the topology and bind the bucket and parameter names into the
    /// application environment
    pub fn new(
        identity: DeploymentIdentity,
        bucket_name: impl Into<String>,
        parameter: ParameterSpec,
        handler: impl Into<String>,
        source_dir: impl Into<PathBuf>,
    ) -> Self {
        let bucket = BucketSpec::new(bucket_name, identity.region.clone());
        let application = ApplicationSpec::new(identity.clone(), handler, source_dir)
            .with_binding(PHONE_NUM_PARAM_BINDING, parameter.name.clone())
            .with_binding(S3_BUCKET_BINDING, bucket.name.clone());

        Self {
            identity,
            parameter,
            bucket,
            application,
        }
    }
}

/// Check that a phone number is in E.164 form (`+` followed by 1-15 digits)
pub fn validate_phone_number(value: &str) -> Result<()> {
    let digits = value.strip_prefix('+').ok_or_else(|| {
        CloudError::InvalidConfig(format!(
            "phone number must start with '+': {}",
            value
        ))
    })?;

    if digits.is_empty() || digits.len() > 15 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(CloudError::InvalidConfig(format!(
            "phone number must be '+' followed by 1-15 digits: {}",
            value
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity() -> DeploymentIdentity {
        DeploymentIdentity::new("lt-chalice", "us-west-2", "dev")
    }

    #[test]
    fn test_identity_naming() {
        let id = identity();
        assert_eq!(id.owner_tag(), "lt-chalice/dev");
        assert_eq!(
            id.function_name("image_upload_handler"),
            "lt-chalice-dev-image_upload_handler"
        );
        assert_eq!(
            id.log_group("image_upload_handler"),
            "/aws/lambda/lt-chalice-dev-image_upload_handler"
        );
    }

    #[test]
    fn test_deployment_binds_names() {
        let deployment = Deployment::new(
            identity(),
            "uploads-bucket",
            ParameterSpec::new("/lt-chalice/phone", None),
            "image_upload_handler",
            "lt-chalice",
        );

        let bindings = &deployment.application.bindings;
        assert_eq!(bindings[PHONE_NUM_PARAM_BINDING], "/lt-chalice/phone");
        assert_eq!(bindings[S3_BUCKET_BINDING], "uploads-bucket");
        assert_eq!(deployment.bucket.region, "us-west-2");
        assert!(deployment.bucket.event_subscription.is_none());
    }

    #[test]
    fn test_parameter_value_not_serialized() {
        let spec = ParameterSpec::new("/app/phone", Some("+15551234567".to_string()));
        let json = serde_json::to_string(&spec).unwrap();
        assert!(!json.contains("+15551234567"));
    }

    #[test]
    fn test_validate_phone_number() {
        assert!(validate_phone_number("+15551234567").is_ok());
        assert!(validate_phone_number("+1").is_ok());
        assert!(validate_phone_number("15551234567").is_err());
        assert!(validate_phone_number("+").is_err());
        assert!(validate_phone_number("+1555-123").is_err());
        assert!(validate_phone_number("+1234567890123456").is_err());
    }
}

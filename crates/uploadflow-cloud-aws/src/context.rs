//! Explicit AWS configuration shared by every client
//!
//! Loaded once per invocation and handed to each client constructor.

use aws_config::{BehaviorVersion, Region, SdkConfig};
use uploadflow_cloud::DeploymentIdentity;

const DEFAULT_CREATED_BY: &str = "uploadflow";

/// Region, credentials, and deployment identity for one invocation
#[derive(Debug, Clone)]
pub struct AwsContext {
    identity: DeploymentIdentity,
    sdk_config: SdkConfig,
    created_by: String,
}

impl AwsContext {
    /// Resolve credentials from the default provider chain for the
    /// identity's region
    pub async fn load(identity: DeploymentIdentity) -> Self {
        let sdk_config = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(identity.region.clone()))
            .load()
            .await;

        tracing::debug!("Loaded AWS configuration for region {}", identity.region);
        Self::from_sdk_config(identity, sdk_config)
    }

    pub fn from_sdk_config(identity: DeploymentIdentity, sdk_config: SdkConfig) -> Self {
        Self {
            identity,
            sdk_config,
            created_by: DEFAULT_CREATED_BY.to_string(),
        }
    }

    /// Caller recorded in the `CreatedBy` tag of new resources
    pub fn with_created_by(mut self, created_by: impl Into<String>) -> Self {
        self.created_by = created_by.into();
        self
    }

    pub fn identity(&self) -> &DeploymentIdentity {
        &self.identity
    }

    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    pub fn region(&self) -> &str {
        &self.identity.region
    }

    pub fn s3(&self) -> aws_sdk_s3::Client {
        aws_sdk_s3::Client::new(&self.sdk_config)
    }

    pub fn ssm(&self) -> aws_sdk_ssm::Client {
        aws_sdk_ssm::Client::new(&self.sdk_config)
    }

    pub fn lambda(&self) -> aws_sdk_lambda::Client {
        aws_sdk_lambda::Client::new(&self.sdk_config)
    }

    pub fn logs(&self) -> aws_sdk_cloudwatchlogs::Client {
        aws_sdk_cloudwatchlogs::Client::new(&self.sdk_config)
    }

    pub fn sts(&self) -> aws_sdk_sts::Client {
        aws_sdk_sts::Client::new(&self.sdk_config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> AwsContext {
        let sdk_config = SdkConfig::builder()
            .region(Region::new("us-west-2"))
            .behavior_version(BehaviorVersion::latest())
            .build();
        AwsContext::from_sdk_config(
            DeploymentIdentity::new("lt-chalice", "us-west-2", "dev"),
            sdk_config,
        )
    }

    #[test]
    fn test_created_by_defaults_and_overrides() {
        let ctx = context();
        assert_eq!(ctx.created_by(), "uploadflow");
        assert_eq!(ctx.region(), "us-west-2");

        let ctx = ctx.with_created_by("AIDAEXAMPLE");
        assert_eq!(ctx.created_by(), "AIDAEXAMPLE");
        assert_eq!(ctx.identity().owner_tag(), "lt-chalice/dev");
    }
}

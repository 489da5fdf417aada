//! AWS provider for UploadFlow
//!
//! Implements the resource client traits of `uploadflow-cloud` on AWS:
//! S3 for the bucket, SSM Parameter Store for the parameter, and Chalice
//! (with Lambda lookups) for the application.
//!
//! # Requirements
//!
//! - Credentials resolvable by the default AWS provider chain
//! - `chalice` CLI installed (for the application)
//!
//! # Example
//!
//! ```ignore
//! use uploadflow_cloud::{DeploymentIdentity, Orchestrator, Plan};
//! use uploadflow_cloud_aws::{AwsContext, AwsOptions};
//!
//! let identity = DeploymentIdentity::new("lt-chalice", "us-west-2", "dev");
//! let ctx = AwsContext::load(identity).await;
//!
//! let orchestrator = Orchestrator::new(uploadflow_cloud_aws::clients(&ctx, &AwsOptions::default()));
//! let report = orchestrator.run(&Plan::deploy(), &deployment).await;
//! ```

pub mod application;
pub mod chalice;
pub mod context;
pub mod error;
pub mod s3;
pub mod ssm;
pub mod sts;

pub use application::ChaliceApplicationClient;
pub use chalice::{Chalice, ChaliceProject, DeployedRecord};
pub use context::AwsContext;
pub use error::{AwsError, Result};
pub use s3::S3BucketClient;
pub use ssm::SsmParameterClient;
pub use sts::StsAuth;

use std::sync::Arc;
use uploadflow_cloud::ResourceClients;

/// Behavior switches for the AWS clients
#[derive(Debug, Clone)]
pub struct AwsOptions {
    /// Delete remaining objects before deleting the bucket
    pub purge_bucket: bool,
    /// Retention set on the function's log group after delete
    pub log_retention_days: i32,
}

impl Default for AwsOptions {
    fn default() -> Self {
        Self {
            purge_bucket: false,
            log_retention_days: 1,
        }
    }
}

/// Build the AWS resource clients for one invocation
pub fn clients(ctx: &AwsContext, options: &AwsOptions) -> ResourceClients {
    ResourceClients::new(
        Arc::new(SsmParameterClient::new(ctx)),
        Arc::new(S3BucketClient::new(ctx).with_purge(options.purge_bucket)),
        Arc::new(
            ChaliceApplicationClient::new(ctx).with_log_retention_days(options.log_retention_days),
        ),
    )
}

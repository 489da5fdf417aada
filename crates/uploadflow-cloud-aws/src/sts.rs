//! Caller identity check

use crate::context::AwsContext;
use async_trait::async_trait;
use uploadflow_cloud::{AuthCheck, AuthStatus};

/// Verifies credentials with STS `GetCallerIdentity`
pub struct StsAuth {
    sts: aws_sdk_sts::Client,
}

impl StsAuth {
    pub fn new(ctx: &AwsContext) -> Self {
        Self { sts: ctx.sts() }
    }
}

#[async_trait]
impl AuthCheck for StsAuth {
    /// `account_info` is the caller's user id, used as the `CreatedBy` tag
    async fn check_auth(&self) -> uploadflow_cloud::Result<AuthStatus> {
        match self.sts.get_caller_identity().send().await {
            Ok(identity) => {
                tracing::debug!(
                    "Caller {} in account {}",
                    identity.arn().unwrap_or("unknown"),
                    identity.account().unwrap_or("unknown")
                );
                match identity.user_id() {
                    Some(user_id) => Ok(AuthStatus::ok(user_id)),
                    None => Ok(AuthStatus::failed("GetCallerIdentity returned no user id")),
                }
            }
            Err(err) => {
                let err = crate::error::sdk_error("GetCallerIdentity", err);
                Ok(AuthStatus::failed(err.detailed_message()))
            }
        }
    }
}

//! Resource client traits
//!
//! Each resource kind has one capability trait with a uniform shape:
//! `ensure_exists` creates or adopts-by-identity, `ensure_absent` deletes or
//! no-ops. Backends (AWS, in-memory) implement these traits and the
//! orchestrator only sees the trait objects.

use crate::action::ActionType;
use crate::error::Result;
use crate::resource::{
    ApplicationHandle, ApplicationSpec, BucketHandle, BucketSpec, EventSubscription,
    ParameterHandle, ParameterSpec, Provisioned,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Object storage bucket lifecycle
#[async_trait]
pub trait BucketClient: Send + Sync {
    /// Create the bucket if absent. An existing bucket owned by this
    /// deployment is returned untouched; one owned by anyone else is a
    /// `Conflict`. Attaches `spec.event_subscription` when set.
    async fn ensure_exists(&self, spec: &BucketSpec) -> Result<Provisioned<BucketHandle>>;

    /// Route upload events of `bucket` to the subscription's function.
    /// The function must exist (`NotFound` otherwise).
    async fn attach_subscription(
        &self,
        bucket: &str,
        subscription: &EventSubscription,
    ) -> Result<ActionType>;

    /// Remove any event wiring from `bucket`. A missing bucket is a no-op.
    async fn detach_subscription(&self, bucket: &str) -> Result<ActionType>;

    /// Detach events and delete the bucket. Fails with `NotEmpty` when
    /// objects remain and the client is not allowed to purge them.
    async fn ensure_absent(&self, name: &str) -> Result<ActionType>;
}

/// Named key/value configuration store
#[async_trait]
pub trait ParameterClient: Send + Sync {
    /// With a value: create, or overwrite a differing value on an owned
    /// parameter. Without a value: verify the parameter exists (`NotFound`
    /// otherwise) and leave it untouched.
    async fn ensure_exists(&self, spec: &ParameterSpec) -> Result<Provisioned<ParameterHandle>>;

    /// Delete an owned parameter. A missing parameter is a no-op.
    async fn ensure_absent(&self, name: &str) -> Result<ActionType>;
}

/// Serverless application deployment backend
#[async_trait]
pub trait ApplicationClient: Send + Sync {
    /// Deploy the application (build/package is backend specific) and return
    /// the function handle that receives bucket events.
    async fn ensure_exists(
        &self,
        spec: &ApplicationSpec,
    ) -> Result<Provisioned<ApplicationHandle>>;

    /// Tear the application down. A never-deployed application is a no-op.
    async fn ensure_absent(&self, spec: &ApplicationSpec) -> Result<ActionType>;
}

/// Credential check run before any plan executes
#[async_trait]
pub trait AuthCheck: Send + Sync {
    async fn check_auth(&self) -> Result<AuthStatus>;
}

/// Authentication status
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthStatus {
    /// Whether authentication is valid
    pub authenticated: bool,

    /// Account/user information if available
    pub account_info: Option<String>,

    /// Error message if not authenticated
    pub error: Option<String>,
}

impl AuthStatus {
    pub fn ok(account_info: impl Into<String>) -> Self {
        Self {
            authenticated: true,
            account_info: Some(account_info.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            authenticated: false,
            account_info: None,
            error: Some(error.into()),
        }
    }
}

/// The set of clients one orchestrator drives
#[derive(Clone)]
pub struct ResourceClients {
    pub parameters: Arc<dyn ParameterClient>,
    pub buckets: Arc<dyn BucketClient>,
    pub applications: Arc<dyn ApplicationClient>,
}

impl ResourceClients {
    pub fn new(
        parameters: Arc<dyn ParameterClient>,
        buckets: Arc<dyn BucketClient>,
        applications: Arc<dyn ApplicationClient>,
    ) -> Self {
        Self {
            parameters,
            buckets,
            applications,
        }
    }
}

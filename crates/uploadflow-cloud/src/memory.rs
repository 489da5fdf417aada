//! In-memory resource backends
//!
//! A single [`MemoryCloud`] holds buckets, parameters, and applications and
//! records every client call in a shared trace, so tests can check ordering
//! and idempotence without cloud access.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::action::{ActionType, ResourceKind};
use crate::error::{CloudError, Result};
use crate::provider::{
    ApplicationClient, AuthCheck, AuthStatus, BucketClient, ParameterClient, ResourceClients,
};
use crate::resource::{
    ApplicationHandle, ApplicationSpec, BucketHandle, BucketSpec, DeploymentIdentity,
    EventSubscription, ParameterHandle, ParameterSpec, Provisioned,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceCall {
    EnsureExists,
    EnsureAbsent,
    AttachSubscription,
    DetachSubscription,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub kind: ResourceKind,
    pub call: TraceCall,
    pub target: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryBucket {
    pub owner: String,
    pub region: String,
    pub objects: BTreeSet<String>,
    pub subscription: Option<EventSubscription>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryParameter {
    pub owner: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryApplication {
    pub owner: String,
    pub arn: String,
    pub bindings: BTreeMap<String, String>,
}

/// Point-in-time copy of every stored resource
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    pub buckets: BTreeMap<String, MemoryBucket>,
    pub parameters: BTreeMap<String, MemoryParameter>,
    pub applications: BTreeMap<String, MemoryApplication>,
}

#[derive(Debug, Default)]
struct Inner {
    state: Snapshot,
    trace: Vec<TraceEvent>,
    fail_next: HashSet<TraceCall>,
}

impl Inner {
    fn record(&mut self, kind: ResourceKind, call: TraceCall, target: &str) -> Result<()> {
        self.trace.push(TraceEvent {
            kind,
            call,
            target: target.to_string(),
        });
        if self.fail_next.remove(&call) {
            return Err(CloudError::backend(
                format!("{:?} {}", call, target),
                "injected failure",
            ));
        }
        Ok(())
    }
}

/// Shared in-memory cloud
#[derive(Debug, Clone, Default)]
pub struct MemoryCloud {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryCloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Clients acting on behalf of `identity`; buckets are never purged
    pub fn clients(&self, identity: &DeploymentIdentity) -> ResourceClients {
        ResourceClients::new(
            Arc::new(MemoryParameterClient {
                cloud: self.clone(),
                owner: identity.owner_tag(),
            }),
            Arc::new(self.bucket_client(identity, false)),
            Arc::new(MemoryApplicationClient {
                cloud: self.clone(),
                owner: identity.owner_tag(),
                region: identity.region.clone(),
            }),
        )
    }

    pub fn bucket_client(&self, identity: &DeploymentIdentity, purge: bool) -> MemoryBucketClient {
        MemoryBucketClient {
            cloud: self.clone(),
            owner: identity.owner_tag(),
            purge,
        }
    }

    pub async fn snapshot(&self) -> Snapshot {
        self.inner.lock().await.state.clone()
    }

    pub async fn trace(&self) -> Vec<TraceEvent> {
        self.inner.lock().await.trace.clone()
    }

    pub async fn clear_trace(&self) {
        self.inner.lock().await.trace.clear();
    }

    /// Make the next call of this type fail with a backend error
    pub async fn fail_next(&self, call: TraceCall) {
        self.inner.lock().await.fail_next.insert(call);
    }

    pub async fn is_empty(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.state.buckets.is_empty()
            && inner.state.parameters.is_empty()
            && inner.state.applications.is_empty()
    }

    pub async fn put_object(&self, bucket: &str, key: &str) {
        if let Some(b) = self.inner.lock().await.state.buckets.get_mut(bucket) {
            b.objects.insert(key.to_string());
        }
    }

    pub async fn insert_foreign_bucket(&self, name: &str, owner: &str) {
        self.inner.lock().await.state.buckets.insert(
            name.to_string(),
            MemoryBucket {
                owner: owner.to_string(),
                region: "us-east-1".to_string(),
                objects: BTreeSet::new(),
                subscription: None,
            },
        );
    }

    pub async fn insert_parameter(&self, name: &str, value: &str, owner: &str) {
        self.inner.lock().await.state.parameters.insert(
            name.to_string(),
            MemoryParameter {
                owner: owner.to_string(),
                value: value.to_string(),
            },
        );
    }

    pub async fn bucket_exists(&self, name: &str) -> bool {
        self.inner.lock().await.state.buckets.contains_key(name)
    }

    pub async fn bucket_owner(&self, name: &str) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.state.buckets.get(name).map(|b| b.owner.clone())
    }

    pub async fn subscription(&self, bucket: &str) -> Option<EventSubscription> {
        let inner = self.inner.lock().await;
        inner
            .state
            .buckets
            .get(bucket)
            .and_then(|b| b.subscription.clone())
    }

    pub async fn parameter_value(&self, name: &str) -> Option<String> {
        let inner = self.inner.lock().await;
        inner.state.parameters.get(name).map(|p| p.value.clone())
    }

    pub async fn application_arn_exists(&self, arn: &str) -> bool {
        let inner = self.inner.lock().await;
        inner.state.applications.values().any(|a| a.arn == arn)
    }
}

#[async_trait]
impl AuthCheck for MemoryCloud {
    async fn check_auth(&self) -> Result<AuthStatus> {
        Ok(AuthStatus::ok("memory"))
    }
}

pub struct MemoryBucketClient {
    cloud: MemoryCloud,
    owner: String,
    purge: bool,
}

fn foreign(kind: &str, name: &str, owner: &str) -> CloudError {
    CloudError::Conflict(format!("{} {} is owned by {}", kind, name, owner))
}

#[async_trait]
impl BucketClient for MemoryBucketClient {
    async fn ensure_exists(&self, spec: &BucketSpec) -> Result<Provisioned<BucketHandle>> {
        let mut inner = self.cloud.inner.lock().await;
        inner.record(ResourceKind::Bucket, TraceCall::EnsureExists, &spec.name)?;

        let handle = BucketHandle {
            name: spec.name.clone(),
            region: spec.region.clone(),
        };
        let existing_owner = inner.state.buckets.get(&spec.name).map(|b| b.owner.clone());
        let outcome = match existing_owner {
            Some(owner) if owner != self.owner => {
                return Err(foreign("bucket", &spec.name, &owner));
            }
            Some(_) => ActionType::NoOp,
            None => {
                inner.state.buckets.insert(
                    spec.name.clone(),
                    MemoryBucket {
                        owner: self.owner.clone(),
                        region: spec.region.clone(),
                        objects: BTreeSet::new(),
                        subscription: None,
                    },
                );
                ActionType::Create
            }
        };
        drop(inner);

        if let Some(subscription) = &spec.event_subscription {
            self.attach_subscription(&spec.name, subscription).await?;
        }

        Ok(Provisioned { handle, outcome })
    }

    async fn attach_subscription(
        &self,
        bucket: &str,
        subscription: &EventSubscription,
    ) -> Result<ActionType> {
        let mut inner = self.cloud.inner.lock().await;
        inner.record(ResourceKind::Subscription, TraceCall::AttachSubscription, bucket)?;

        let target_exists = inner
            .state
            .applications
            .values()
            .any(|a| a.arn == subscription.function_arn);
        if !target_exists {
            return Err(CloudError::NotFound(format!(
                "function {}",
                subscription.function_arn
            )));
        }

        let owner = self.owner.clone();
        let entry = inner
            .state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| CloudError::NotFound(format!("bucket {}", bucket)))?;
        if entry.owner != owner {
            return Err(foreign("bucket", bucket, &entry.owner));
        }

        let outcome = match &entry.subscription {
            Some(current) if current == subscription => ActionType::NoOp,
            Some(_) => ActionType::Update,
            None => ActionType::Create,
        };
        entry.subscription = Some(subscription.clone());
        Ok(outcome)
    }

    async fn detach_subscription(&self, bucket: &str) -> Result<ActionType> {
        let mut inner = self.cloud.inner.lock().await;
        inner.record(ResourceKind::Subscription, TraceCall::DetachSubscription, bucket)?;

        match inner.state.buckets.get_mut(bucket) {
            None => Ok(ActionType::NoOp),
            Some(entry) if entry.owner != self.owner => Err(foreign("bucket", bucket, &entry.owner)),
            Some(entry) => Ok(match entry.subscription.take() {
                Some(_) => ActionType::Delete,
                None => ActionType::NoOp,
            }),
        }
    }

    async fn ensure_absent(&self, name: &str) -> Result<ActionType> {
        let mut inner = self.cloud.inner.lock().await;
        inner.record(ResourceKind::Bucket, TraceCall::EnsureAbsent, name)?;

        let Some(entry) = inner.state.buckets.get_mut(name) else {
            return Ok(ActionType::NoOp);
        };
        if entry.owner != self.owner {
            return Err(foreign("bucket", name, &entry.owner));
        }

        entry.subscription = None;
        if !entry.objects.is_empty() {
            if !self.purge {
                return Err(CloudError::NotEmpty(format!(
                    "{} still holds {} object(s)",
                    name,
                    entry.objects.len()
                )));
            }
            entry.objects.clear();
        }

        inner.state.buckets.remove(name);
        Ok(ActionType::Delete)
    }
}

pub struct MemoryParameterClient {
    cloud: MemoryCloud,
    owner: String,
}

#[async_trait]
impl ParameterClient for MemoryParameterClient {
    async fn ensure_exists(&self, spec: &ParameterSpec) -> Result<Provisioned<ParameterHandle>> {
        let mut inner = self.cloud.inner.lock().await;
        inner.record(ResourceKind::Parameter, TraceCall::EnsureExists, &spec.name)?;

        let handle = ParameterHandle {
            name: spec.name.clone(),
        };
        let existing = inner.state.parameters.get(&spec.name).cloned();

        match (existing, &spec.value) {
            (None, None) => Err(CloudError::NotFound(format!(
                "parameter {} is required but absent and no value was supplied",
                spec.name
            ))),
            (None, Some(value)) => {
                inner.state.parameters.insert(
                    spec.name.clone(),
                    MemoryParameter {
                        owner: self.owner.clone(),
                        value: value.clone(),
                    },
                );
                Ok(Provisioned::created(handle))
            }
            (Some(existing), _) if existing.owner != self.owner => {
                Err(foreign("parameter", &spec.name, &existing.owner))
            }
            (Some(existing), Some(value)) if existing.value != *value => {
                inner.state.parameters.insert(
                    spec.name.clone(),
                    MemoryParameter {
                        owner: existing.owner,
                        value: value.clone(),
                    },
                );
                Ok(Provisioned::updated(handle))
            }
            (Some(_), _) => Ok(Provisioned::existing(handle)),
        }
    }

    async fn ensure_absent(&self, name: &str) -> Result<ActionType> {
        let mut inner = self.cloud.inner.lock().await;
        inner.record(ResourceKind::Parameter, TraceCall::EnsureAbsent, name)?;

        match inner.state.parameters.get(name).map(|p| p.owner.clone()) {
            None => Ok(ActionType::NoOp),
            Some(owner) if owner != self.owner => Err(foreign("parameter", name, &owner)),
            Some(_) => {
                inner.state.parameters.remove(name);
                Ok(ActionType::Delete)
            }
        }
    }
}

pub struct MemoryApplicationClient {
    cloud: MemoryCloud,
    owner: String,
    region: String,
}

#[async_trait]
impl ApplicationClient for MemoryApplicationClient {
    async fn ensure_exists(
        &self,
        spec: &ApplicationSpec,
    ) -> Result<Provisioned<ApplicationHandle>> {
        let function_name = spec.function_name();
        let mut inner = self.cloud.inner.lock().await;
        inner.record(ResourceKind::Application, TraceCall::EnsureExists, &function_name)?;

        if let Some(existing) = inner.state.applications.get_mut(&function_name) {
            if existing.owner != self.owner {
                return Err(foreign("application", &function_name, &existing.owner));
            }
            let handle = ApplicationHandle {
                function_name,
                arn: existing.arn.clone(),
            };
            // Redeploy when the function would resolve different resources
            if existing.bindings != spec.bindings {
                existing.bindings = spec.bindings.clone();
                return Ok(Provisioned::updated(handle));
            }
            return Ok(Provisioned::existing(handle));
        }

        let arn = format!(
            "arn:aws:lambda:{}:000000000000:function:{}",
            self.region, function_name
        );
        inner.state.applications.insert(
            function_name.clone(),
            MemoryApplication {
                owner: self.owner.clone(),
                arn: arn.clone(),
                bindings: spec.bindings.clone(),
            },
        );
        Ok(Provisioned::created(ApplicationHandle { function_name, arn }))
    }

    async fn ensure_absent(&self, spec: &ApplicationSpec) -> Result<ActionType> {
        let function_name = spec.function_name();
        let mut inner = self.cloud.inner.lock().await;
        inner.record(ResourceKind::Application, TraceCall::EnsureAbsent, &function_name)?;

        match inner
            .state
            .applications
            .get(&function_name)
            .map(|a| a.owner.clone())
        {
            None => Ok(ActionType::NoOp),
            Some(owner) if owner != self.owner => {
                Err(foreign("application", &function_name, &owner))
            }
            Some(_) => {
                inner.state.applications.remove(&function_name);
                Ok(ActionType::Delete)
            }
        }
    }
}

//! UploadFlow Cloud Core
//!
//! Provider-neutral provisioning for the upload-notification topology:
//! a configuration parameter, a storage bucket, a serverless application,
//! and the bucket → application event subscription.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                 uploadflow CLI                   │
//! │             (--action deploy|delete)             │
//! └─────────────────┬───────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────┐
//! │                uploadflow-cloud                  │
//! │  ┌──────────────┐  ┌──────────────────────────┐ │
//! │  │     Plan     │─▶│       Orchestrator       │ │
//! │  └──────────────┘  └────────────┬─────────────┘ │
//! │  ┌──────────────────────────────▼─────────────┐ │
//! │  │ trait BucketClient / ParameterClient /     │ │
//! │  │       ApplicationClient                    │ │
//! │  └────────────────────────────────────────────┘ │
//! └───────┬─────────────────┬───────────────────────┘
//!         │                 │
//! ┌───────▼───────┐ ┌───────▼───────┐
//! │      aws      │ │    memory     │
//! │ (S3/SSM/...)  │ │   (tests)     │
//! └───────────────┘ └───────────────┘
//! ```
//!
//! # Example
//!
//! ```
//! use uploadflow_cloud::memory::MemoryCloud;
//! use uploadflow_cloud::{Deployment, DeploymentIdentity, Orchestrator, ParameterSpec, Plan};
//!
//! # tokio_test::block_on(async {
//! let identity = DeploymentIdentity::new("lt-chalice", "us-west-2", "dev");
//! let deployment = Deployment::new(
//!     identity.clone(),
//!     "my-uploads",
//!     ParameterSpec::new("/lt-chalice/phone", Some("+15551234567".to_string())),
//!     "recognize_faces",
//!     "lt-chalice",
//! );
//!
//! let cloud = MemoryCloud::new();
//! let orchestrator = Orchestrator::new(cloud.clients(&identity));
//! let report = orchestrator.run(&Plan::deploy(), &deployment).await;
//! assert!(report.is_complete());
//! # });
//! ```

pub mod action;
pub mod error;
pub mod handler;
pub mod memory;
pub mod orchestrator;
pub mod provider;
pub mod report;
pub mod resource;

// Re-exports
pub use action::{ActionType, Operation, Plan, ResourceKind, Step};
pub use error::{CloudError, ErrorKind, Result};
pub use orchestrator::Orchestrator;
pub use provider::{
    ApplicationClient, AuthCheck, AuthStatus, BucketClient, ParameterClient, ResourceClients,
};
pub use report::{RunReport, RunStatus, StepFailure, StepRecord, StepStatus};
pub use resource::{
    ApplicationHandle, ApplicationSpec, BucketHandle, BucketSpec, Deployment, DeploymentIdentity,
    EventSubscription, ParameterHandle, ParameterSpec, Provisioned, validate_phone_number,
};

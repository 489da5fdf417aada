//! AWS provider error types

use aws_sdk_s3::error::{BuildError, ProvideErrorMetadata, SdkError};
use aws_smithy_runtime_api::client::orchestrator::HttpResponse;
use thiserror::Error;
use uploadflow_cloud::CloudError;

#[derive(Error, Debug)]
pub enum AwsError {
    #[error("chalice not found. Please install: pip install chalice")]
    ChaliceNotFound,

    #[error("chalice command failed: {0}")]
    CommandFailed(String),

    #[error("Invalid Chalice project: {0}")]
    InvalidProject(String),

    #[error("Function {function} not found in {record}")]
    DeployedFunctionMissing { function: String, record: String },

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Cloud error: {0}")]
    CloudError(#[from] CloudError),
}

pub type Result<T> = std::result::Result<T, AwsError>;

impl From<AwsError> for CloudError {
    fn from(err: AwsError) -> Self {
        match err {
            AwsError::CloudError(inner) => inner,
            AwsError::InvalidProject(msg) => CloudError::InvalidConfig(msg),
            AwsError::DeployedFunctionMissing { .. } => CloudError::NotFound(err.to_string()),
            AwsError::JsonError(e) => CloudError::Json(e),
            AwsError::IoError(e) => CloudError::Io(e),
            AwsError::ChaliceNotFound | AwsError::CommandFailed(_) => {
                CloudError::backend("chalice", err)
            }
        }
    }
}

/// Wrap a failed SDK call, keeping the SDK error as the source
pub(crate) fn sdk_error<E>(context: impl Into<String>, err: SdkError<E, HttpResponse>) -> CloudError
where
    E: std::error::Error + Send + Sync + 'static,
{
    CloudError::backend(context, err)
}

/// Service error code (e.g. `NoSuchBucket`) when the service returned one
pub(crate) fn error_code<E>(err: &SdkError<E, HttpResponse>) -> Option<&str>
where
    E: ProvideErrorMetadata,
{
    err.as_service_error().and_then(|e| e.code())
}

/// HTTP status of the raw response, for errors without a modeled code
pub(crate) fn http_status<E>(err: &SdkError<E, HttpResponse>) -> Option<u16> {
    err.raw_response().map(|r| r.status().as_u16())
}

/// Request construction errors mean required fields were missing
pub(crate) fn build_error(err: BuildError) -> CloudError {
    CloudError::InvalidConfig(err.to_string())
}

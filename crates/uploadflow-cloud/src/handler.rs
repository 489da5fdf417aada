//! Contract for the function wired to the bucket
//!
//! The deployed function is invoked once per upload. It asks an analysis
//! service for detections in the uploaded object and, when there is at least
//! one, sends a text notification to the destination stored in the
//! deployment's parameter. The function itself lives in the application
//! source tree; these traits describe what it must do so the wiring above can
//! be reasoned about and tested.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Object upload notification delivered to the function
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadEvent {
    pub bucket: String,
    pub object_key: String,
}

/// One finding reported by the analysis service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub label: String,
    pub confidence: f32,
}

#[async_trait]
pub trait ImageAnalyzer: Send + Sync {
    async fn detect(&self, bucket: &str, object_key: &str) -> Result<Vec<Detection>>;
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, destination: &str, message: &str) -> Result<()>;
}

/// Resolves the notification destination from the parameter store at
/// invocation time
#[async_trait]
pub trait DestinationResolver: Send + Sync {
    async fn resolve(&self, parameter_name: &str) -> Result<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerOutcome {
    /// Nothing detected, no notification sent
    Silent,
    Notified { detections: usize },
}

/// Message sent for `count` detections in `event`
pub fn summary_message(event: &UploadEvent, count: usize) -> String {
    let noun = if count == 1 { "face" } else { "faces" };
    format!(
        "Detected {} {} in s3://{}/{}",
        count, noun, event.bucket, event.object_key
    )
}

/// Handle one upload. Errors from any collaborator are returned as-is, with
/// no retry.
pub async fn handle_upload(
    event: &UploadEvent,
    parameter_name: &str,
    analyzer: &dyn ImageAnalyzer,
    resolver: &dyn DestinationResolver,
    notifier: &dyn Notifier,
) -> Result<HandlerOutcome> {
    let detections = analyzer.detect(&event.bucket, &event.object_key).await?;
    tracing::info!(
        bucket = %event.bucket,
        key = %event.object_key,
        "Detected {} item(s)",
        detections.len()
    );

    if detections.is_empty() {
        return Ok(HandlerOutcome::Silent);
    }

    let destination = resolver.resolve(parameter_name).await?;
    notifier
        .notify(&destination, &summary_message(event, detections.len()))
        .await?;

    Ok(HandlerOutcome::Notified {
        detections: detections.len(),
    })
}

//! S3 bucket client
//!
//! Ownership is carried by the `uploadflow:deployment` bucket tag. A bucket
//! that exists without our tag, or that HeadBucket reports as forbidden, is
//! never adopted.

use crate::context::AwsContext;
use crate::error::{build_error, error_code, http_status, sdk_error};
use async_trait::async_trait;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CreateBucketConfiguration, Delete, Event,
    LambdaFunctionConfiguration, NotificationConfiguration, ObjectIdentifier, Tag, Tagging,
};
use uploadflow_cloud::resource::{CREATED_BY_TAG, DEPLOYMENT_TAG};
use uploadflow_cloud::{
    ActionType, BucketClient, BucketHandle, BucketSpec, CloudError, EventSubscription,
    Provisioned, Result,
};

/// Notification configuration id used for the upload subscription
const SUBSCRIPTION_ID: &str = "uploadflow-object-created";

/// Region that rejects an explicit LocationConstraint
const DEFAULT_REGION: &str = "us-east-1";

/// DeleteObjects accepts at most 1000 keys per request
const DELETE_BATCH: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Ownership {
    Missing,
    Owned,
    Foreign(String),
}

/// Lambda permission statement letting S3 invoke the function for `bucket`
fn statement_id(bucket: &str) -> String {
    format!("uploadflow-{}", bucket.replace('.', "-"))
}

fn bucket_arn(bucket: &str) -> String {
    format!("arn:aws:s3:::{}", bucket)
}

fn conflict(bucket: &str, owner: &str) -> CloudError {
    CloudError::Conflict(format!(
        "bucket {} exists but is not managed by this deployment (owner: {})",
        bucket, owner
    ))
}

/// Bucket lifecycle on S3, with Lambda permissions for event wiring
pub struct S3BucketClient {
    s3: aws_sdk_s3::Client,
    lambda: aws_sdk_lambda::Client,
    owner: String,
    created_by: String,
    purge: bool,
}

impl S3BucketClient {
    pub fn new(ctx: &AwsContext) -> Self {
        Self {
            s3: ctx.s3(),
            lambda: ctx.lambda(),
            owner: ctx.identity().owner_tag(),
            created_by: ctx.created_by().to_string(),
            purge: false,
        }
    }

    /// Delete remaining objects before deleting the bucket instead of
    /// failing with `NotEmpty`
    pub fn with_purge(mut self, purge: bool) -> Self {
        self.purge = purge;
        self
    }

    async fn ownership(&self, bucket: &str) -> Result<Ownership> {
        if let Err(err) = self.s3.head_bucket().bucket(bucket).send().await {
            if err.as_service_error().is_some_and(|e| e.is_not_found()) {
                return Ok(Ownership::Missing);
            }
            return match http_status(&err) {
                Some(404) => Ok(Ownership::Missing),
                Some(403) => Ok(Ownership::Foreign("another account".to_string())),
                _ => Err(sdk_error(format!("HeadBucket {}", bucket), err)),
            };
        }

        let tag = match self.s3.get_bucket_tagging().bucket(bucket).send().await {
            Ok(output) => output
                .tag_set()
                .iter()
                .find(|t| t.key() == DEPLOYMENT_TAG)
                .map(|t| t.value().to_string()),
            Err(err) if error_code(&err) == Some("NoSuchTagSet") => None,
            Err(err) => return Err(sdk_error(format!("GetBucketTagging {}", bucket), err)),
        };

        Ok(match tag {
            Some(owner) if owner == self.owner => Ownership::Owned,
            Some(owner) => Ownership::Foreign(owner),
            None => Ownership::Foreign("untagged".to_string()),
        })
    }

    async fn create(&self, spec: &BucketSpec) -> Result<()> {
        let mut request = self.s3.create_bucket().bucket(&spec.name);
        if spec.region != DEFAULT_REGION {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(spec.region.as_str()))
                    .build(),
            );
        }

        if let Err(err) = request.send().await {
            let taken = err
                .as_service_error()
                .is_some_and(|e| e.is_bucket_already_exists());
            if taken {
                return Err(conflict(&spec.name, "another account"));
            }
            return Err(sdk_error(format!("CreateBucket {}", spec.name), err));
        }

        let tagging = Tagging::builder()
            .tag_set(
                Tag::builder()
                    .key(DEPLOYMENT_TAG)
                    .value(&self.owner)
                    .build()
                    .map_err(build_error)?,
            )
            .tag_set(
                Tag::builder()
                    .key(CREATED_BY_TAG)
                    .value(&self.created_by)
                    .build()
                    .map_err(build_error)?,
            )
            .build()
            .map_err(build_error)?;

        if let Err(err) = self
            .s3
            .put_bucket_tagging()
            .bucket(&spec.name)
            .tagging(tagging)
            .send()
            .await
        {
            // An untagged bucket would be refused as foreign on every later run
            let err = sdk_error(format!("PutBucketTagging {}", spec.name), err);
            if let Err(cleanup) = self.s3.delete_bucket().bucket(&spec.name).send().await {
                tracing::warn!(
                    "Unable to remove untagged bucket {}: {}",
                    spec.name,
                    sdk_error(format!("DeleteBucket {}", spec.name), cleanup).detailed_message()
                );
            }
            return Err(err);
        }

        tracing::info!("S3 bucket {} created in {}", spec.name, spec.region);
        Ok(())
    }

    async fn lambda_configurations(&self, bucket: &str) -> Result<Vec<LambdaFunctionConfiguration>> {
        let output = self
            .s3
            .get_bucket_notification_configuration()
            .bucket(bucket)
            .send()
            .await
            .map_err(|e| sdk_error(format!("GetBucketNotificationConfiguration {}", bucket), e))?;
        Ok(output.lambda_function_configurations().to_vec())
    }

    async fn put_notifications(
        &self,
        bucket: &str,
        configuration: NotificationConfiguration,
    ) -> Result<()> {
        self.s3
            .put_bucket_notification_configuration()
            .bucket(bucket)
            .notification_configuration(configuration)
            .send()
            .await
            .map_err(|e| sdk_error(format!("PutBucketNotificationConfiguration {}", bucket), e))?;
        Ok(())
    }

    async fn grant_invoke(&self, bucket: &str, function_arn: &str) -> Result<()> {
        let result = self
            .lambda
            .add_permission()
            .function_name(function_arn)
            .statement_id(statement_id(bucket))
            .action("lambda:InvokeFunction")
            .principal("s3.amazonaws.com")
            .source_arn(bucket_arn(bucket))
            .send()
            .await;

        match result {
            Ok(_) => {
                tracing::debug!("Granted S3 invoke permission on {}", function_arn);
                Ok(())
            }
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_conflict_exception()) =>
            {
                tracing::debug!("Invoke permission already present on {}", function_arn);
                Ok(())
            }
            Err(err) => Err(sdk_error(format!("AddPermission {}", function_arn), err)),
        }
    }

    async fn revoke_invoke(&self, bucket: &str, function_arn: &str) -> Result<()> {
        let result = self
            .lambda
            .remove_permission()
            .function_name(function_arn)
            .statement_id(statement_id(bucket))
            .send()
            .await;

        match result {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                Ok(())
            }
            Err(err) => Err(sdk_error(format!("RemovePermission {}", function_arn), err)),
        }
    }

    async fn ensure_function_exists(&self, function_arn: &str) -> Result<()> {
        match self
            .lambda
            .get_function()
            .function_name(function_arn)
            .send()
            .await
        {
            Ok(_) => Ok(()),
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                Err(CloudError::NotFound(format!("function {}", function_arn)))
            }
            Err(err) => Err(sdk_error(format!("GetFunction {}", function_arn), err)),
        }
    }

    async fn has_objects(&self, bucket: &str) -> Result<bool> {
        let output = self
            .s3
            .list_objects_v2()
            .bucket(bucket)
            .max_keys(1)
            .send()
            .await
            .map_err(|e| sdk_error(format!("ListObjectsV2 {}", bucket), e))?;
        Ok(!output.contents().is_empty())
    }

    /// Every object version and delete marker in the bucket
    async fn object_versions(&self, bucket: &str) -> Result<Vec<ObjectIdentifier>> {
        let mut objects = Vec::new();
        let mut key_marker: Option<String> = None;
        let mut version_marker: Option<String> = None;

        loop {
            let output = self
                .s3
                .list_object_versions()
                .bucket(bucket)
                .set_key_marker(key_marker.take())
                .set_version_id_marker(version_marker.take())
                .send()
                .await
                .map_err(|e| sdk_error(format!("ListObjectVersions {}", bucket), e))?;

            let versions = output
                .versions()
                .iter()
                .map(|v| (v.key(), v.version_id()));
            let markers = output
                .delete_markers()
                .iter()
                .map(|m| (m.key(), m.version_id()));
            for (key, version) in versions.chain(markers) {
                let Some(key) = key else { continue };
                objects.push(
                    ObjectIdentifier::builder()
                        .key(key)
                        .set_version_id(version.map(str::to_string))
                        .build()
                        .map_err(build_error)?,
                );
            }

            if !output.is_truncated().unwrap_or(false) {
                break;
            }
            key_marker = output.next_key_marker().map(str::to_string);
            version_marker = output.next_version_id_marker().map(str::to_string);
            if key_marker.is_none() && version_marker.is_none() {
                break;
            }
        }

        Ok(objects)
    }

    /// Delete every object version so the bucket can be removed
    async fn purge_objects(&self, bucket: &str) -> Result<usize> {
        let objects = self.object_versions(bucket).await?;

        for chunk in objects.chunks(DELETE_BATCH) {
            let delete = Delete::builder()
                .set_objects(Some(chunk.to_vec()))
                .quiet(true)
                .build()
                .map_err(build_error)?;

            self.s3
                .delete_objects()
                .bucket(bucket)
                .delete(delete)
                .send()
                .await
                .map_err(|e| sdk_error(format!("DeleteObjects {}", bucket), e))?;
        }

        Ok(objects.len())
    }

    /// Remove the notification configuration and the invoke permissions it
    /// relied on
    async fn unwire(&self, bucket: &str) -> Result<ActionType> {
        let current = self.lambda_configurations(bucket).await?;
        if current.is_empty() {
            return Ok(ActionType::NoOp);
        }

        self.put_notifications(bucket, NotificationConfiguration::builder().build())
            .await?;
        for configuration in &current {
            self.revoke_invoke(bucket, configuration.lambda_function_arn())
                .await?;
        }

        tracing::info!("Removed event subscriptions from bucket {}", bucket);
        Ok(ActionType::Delete)
    }
}

#[async_trait]
impl BucketClient for S3BucketClient {
    async fn ensure_exists(&self, spec: &BucketSpec) -> Result<Provisioned<BucketHandle>> {
        let handle = BucketHandle {
            name: spec.name.clone(),
            region: spec.region.clone(),
        };

        let outcome = match self.ownership(&spec.name).await? {
            Ownership::Foreign(owner) => return Err(conflict(&spec.name, &owner)),
            Ownership::Owned => {
                tracing::info!("S3 bucket {} already exists and is ours", spec.name);
                ActionType::NoOp
            }
            Ownership::Missing => {
                self.create(spec).await?;
                ActionType::Create
            }
        };

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
        match self.ownership(bucket).await? {
            Ownership::Missing => return Err(CloudError::NotFound(format!("bucket {}", bucket))),
            Ownership::Foreign(owner) => return Err(conflict(bucket, &owner)),
            Ownership::Owned => {}
        }
        self.ensure_function_exists(&subscription.function_arn)
            .await?;

        let current = self.lambda_configurations(bucket).await?;
        let unchanged = matches!(current.as_slice(), [only]
            if only.lambda_function_arn() == subscription.function_arn
                && only
                    .events()
                    .iter()
                    .map(|e| e.as_str())
                    .eq(subscription.events.iter().map(String::as_str)));
        if unchanged {
            tracing::info!("Bucket {} already notifies {}", bucket, subscription.function_arn);
            return Ok(ActionType::NoOp);
        }

        self.grant_invoke(bucket, &subscription.function_arn).await?;

        let configuration = LambdaFunctionConfiguration::builder()
            .id(SUBSCRIPTION_ID)
            .lambda_function_arn(&subscription.function_arn)
            .set_events(Some(
                subscription
                    .events
                    .iter()
                    .map(|e| Event::from(e.as_str()))
                    .collect(),
            ))
            .build()
            .map_err(build_error)?;
        self.put_notifications(
            bucket,
            NotificationConfiguration::builder()
                .lambda_function_configurations(configuration)
                .build(),
        )
        .await?;

        tracing::info!(
            "Bucket {} now notifies {} on {}",
            bucket,
            subscription.function_arn,
            subscription.events.join(",")
        );
        Ok(if current.is_empty() {
            ActionType::Create
        } else {
            ActionType::Update
        })
    }

    async fn detach_subscription(&self, bucket: &str) -> Result<ActionType> {
        match self.ownership(bucket).await? {
            Ownership::Missing => {
                tracing::debug!("Bucket {} not found, nothing to unwire", bucket);
                return Ok(ActionType::NoOp);
            }
            Ownership::Foreign(owner) => return Err(conflict(bucket, &owner)),
            Ownership::Owned => {}
        }

        self.unwire(bucket).await
    }

    async fn ensure_absent(&self, name: &str) -> Result<ActionType> {
        match self.ownership(name).await? {
            Ownership::Missing => {
                tracing::info!("S3 bucket {} does not exist. Proceeding.", name);
                return Ok(ActionType::NoOp);
            }
            Ownership::Foreign(owner) => return Err(conflict(name, &owner)),
            Ownership::Owned => {}
        }

        self.unwire(name).await?;

        if self.purge {
            let removed = self.purge_objects(name).await?;
            if removed > 0 {
                tracing::info!("Deleted {} object version(s) from bucket {}", removed, name);
            }
        } else if self.has_objects(name).await? {
            return Err(CloudError::NotEmpty(format!(
                "{} still contains objects (use --purge-bucket to delete them)",
                name
            )));
        }

        match self.s3.delete_bucket().bucket(name).send().await {
            Ok(_) => {
                tracing::info!("S3 bucket {} deleted", name);
                Ok(ActionType::Delete)
            }
            Err(err) => match error_code(&err) {
                Some("NoSuchBucket") => Ok(ActionType::NoOp),
                Some("BucketNotEmpty") => Err(CloudError::NotEmpty(name.to_string())),
                _ => Err(sdk_error(format!("DeleteBucket {}", name), err)),
            },
        }
    }
}

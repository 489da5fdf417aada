//! SSM Parameter Store client
//!
//! The phone number is stored as a `SecureString`. Parameters carry the
//! deployment tag; only tagged parameters are overwritten or deleted.

use crate::context::AwsContext;
use crate::error::{build_error, sdk_error};
use async_trait::async_trait;
use aws_sdk_ssm::types::{ParameterType, ResourceTypeForTagging, Tag};
use uploadflow_cloud::resource::{CREATED_BY_TAG, DEPLOYMENT_TAG};
use uploadflow_cloud::{
    ActionType, CloudError, ParameterClient, ParameterHandle, ParameterSpec, Provisioned, Result,
};

/// Parameter stored in SSM, with its deployment tag if any
struct StoredParameter {
    value: String,
    owner: Option<String>,
}

pub struct SsmParameterClient {
    ssm: aws_sdk_ssm::Client,
    owner: String,
    created_by: String,
}

impl SsmParameterClient {
    pub fn new(ctx: &AwsContext) -> Self {
        Self {
            ssm: ctx.ssm(),
            owner: ctx.identity().owner_tag(),
            created_by: ctx.created_by().to_string(),
        }
    }

    async fn fetch(&self, name: &str) -> Result<Option<StoredParameter>> {
        let output = match self
            .ssm
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_parameter_not_found()) =>
            {
                return Ok(None);
            }
            Err(err) => return Err(sdk_error(format!("GetParameter {}", name), err)),
        };

        let value = output
            .parameter()
            .and_then(|p| p.value())
            .unwrap_or_default()
            .to_string();

        let tags = self
            .ssm
            .list_tags_for_resource()
            .resource_type(ResourceTypeForTagging::Parameter)
            .resource_id(name)
            .send()
            .await
            .map_err(|e| sdk_error(format!("ListTagsForResource {}", name), e))?;
        let owner = tags
            .tag_list()
            .iter()
            .find(|t| t.key() == DEPLOYMENT_TAG)
            .map(|t| t.value().to_string());

        Ok(Some(StoredParameter { value, owner }))
    }
}

fn ensure_owned(owner: &str, name: &str, stored: &StoredParameter) -> Result<()> {
    match stored.owner.as_deref() {
        Some(tag) if tag == owner => Ok(()),
        tag => Err(CloudError::Conflict(format!(
            "parameter {} is not managed by this deployment (owner: {})",
            name,
            tag.unwrap_or("untagged")
        ))),
    }
}

fn creation_tags(owner: &str, created_by: &str) -> Result<Vec<Tag>> {
    Ok(vec![
        Tag::builder()
            .key(DEPLOYMENT_TAG)
            .value(owner)
            .build()
            .map_err(build_error)?,
        Tag::builder()
            .key(CREATED_BY_TAG)
            .value(created_by)
            .build()
            .map_err(build_error)?,
    ])
}

#[async_trait]
impl ParameterClient for SsmParameterClient {
    async fn ensure_exists(&self, spec: &ParameterSpec) -> Result<Provisioned<ParameterHandle>> {
        let handle = ParameterHandle {
            name: spec.name.clone(),
        };
        let stored = self.fetch(&spec.name).await?;

        let value = match (&spec.value, stored) {
            (None, Some(stored)) => {
                ensure_owned(&self.owner, &spec.name, &stored)?;
                tracing::info!("Reusing existing parameter {}", spec.name);
                return Ok(Provisioned::existing(handle));
            }
            (None, None) => {
                return Err(CloudError::NotFound(format!(
                    "parameter {} (a value is required to create it)",
                    spec.name
                )));
            }
            (Some(value), Some(stored)) => {
                ensure_owned(&self.owner, &spec.name, &stored)?;
                if stored.value == *value {
                    tracing::info!("Parameter {} already up to date", spec.name);
                    return Ok(Provisioned::existing(handle));
                }

                self.ssm
                    .put_parameter()
                    .name(&spec.name)
                    .value(value)
                    .r#type(ParameterType::SecureString)
                    .overwrite(true)
                    .send()
                    .await
                    .map_err(|e| sdk_error(format!("PutParameter {}", spec.name), e))?;
                tracing::info!("Parameter {} updated", spec.name);
                return Ok(Provisioned::updated(handle));
            }
            (Some(value), None) => value,
        };

        self.ssm
            .put_parameter()
            .name(&spec.name)
            .value(value)
            .r#type(ParameterType::SecureString)
            .set_tags(Some(creation_tags(&self.owner, &self.created_by)?))
            .send()
            .await
            .map_err(|e| sdk_error(format!("PutParameter {}", spec.name), e))?;

        tracing::info!("Parameter {} created", spec.name);
        Ok(Provisioned::created(handle))
    }

    async fn ensure_absent(&self, name: &str) -> Result<ActionType> {
        let Some(stored) = self.fetch(name).await? else {
            tracing::info!("Parameter {} not found. Proceeding.", name);
            return Ok(ActionType::NoOp);
        };
        ensure_owned(&self.owner, name, &stored)?;

        match self.ssm.delete_parameter().name(name).send().await {
            Ok(_) => {
                tracing::info!("Parameter {} deleted", name);
                Ok(ActionType::Delete)
            }
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_parameter_not_found()) =>
            {
                Ok(ActionType::NoOp)
            }
            Err(err) => Err(sdk_error(format!("DeleteParameter {}", name), err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stored(owner: Option<&str>) -> StoredParameter {
        StoredParameter {
            value: "+15551234567".to_string(),
            owner: owner.map(str::to_string),
        }
    }

    #[test]
    fn test_ownership_requires_matching_tag() {
        assert!(ensure_owned("lt-chalice/dev", "/p", &stored(Some("lt-chalice/dev"))).is_ok());

        let err = ensure_owned("lt-chalice/dev", "/p", &stored(Some("other/prod"))).unwrap_err();
        assert!(matches!(err, CloudError::Conflict(_)));
        assert!(err.to_string().contains("other/prod"));

        let err = ensure_owned("lt-chalice/dev", "/p", &stored(None)).unwrap_err();
        assert!(err.to_string().contains("untagged"));
    }

    #[test]
    fn test_creation_tags_carry_owner_and_creator() {
        let tags = creation_tags("lt-chalice/dev", "AIDAEXAMPLE").unwrap();
        assert_eq!(tags[0].key(), DEPLOYMENT_TAG);
        assert_eq!(tags[0].value(), "lt-chalice/dev");
        assert_eq!(tags[1].key(), CREATED_BY_TAG);
        assert_eq!(tags[1].value(), "AIDAEXAMPLE");
    }

    mod client {
        use super::*;
        use aws_sdk_ssm::operation::delete_parameter::DeleteParameterOutput;
        use aws_sdk_ssm::operation::get_parameter::{GetParameterError, GetParameterOutput};
        use aws_sdk_ssm::operation::list_tags_for_resource::ListTagsForResourceOutput;
        use aws_sdk_ssm::operation::put_parameter::PutParameterOutput;
        use aws_sdk_ssm::types::Parameter;
        use aws_sdk_ssm::types::error::ParameterNotFound;
        use aws_smithy_mocks::{Rule, RuleMode, mock, mock_client};

        const OWNER: &str = "lt-chalice/dev";
        const NAME: &str = "/lt-chalice/dev/phone";

        fn client(rules: &[&Rule]) -> SsmParameterClient {
            SsmParameterClient {
                ssm: mock_client!(aws_sdk_ssm, RuleMode::MatchAny, rules),
                owner: OWNER.to_string(),
                created_by: "AIDAEXAMPLE".to_string(),
            }
        }

        fn stored_value(value: &'static str) -> Rule {
            mock!(aws_sdk_ssm::Client::get_parameter).then_output(move || {
                GetParameterOutput::builder()
                    .parameter(Parameter::builder().name(NAME).value(value).build())
                    .build()
            })
        }

        fn missing() -> Rule {
            mock!(aws_sdk_ssm::Client::get_parameter).then_error(|| {
                GetParameterError::ParameterNotFound(ParameterNotFound::builder().build())
            })
        }

        fn tagged(owner: &'static str) -> Rule {
            mock!(aws_sdk_ssm::Client::list_tags_for_resource).then_output(move || {
                ListTagsForResourceOutput::builder()
                    .tag_list(
                        Tag::builder()
                            .key(DEPLOYMENT_TAG)
                            .value(owner)
                            .build()
                            .unwrap(),
                    )
                    .build()
            })
        }

        fn put() -> Rule {
            mock!(aws_sdk_ssm::Client::put_parameter)
                .then_output(|| PutParameterOutput::builder().version(1).build())
        }

        fn spec(value: Option<&str>) -> ParameterSpec {
            ParameterSpec::new(NAME, value.map(str::to_string))
        }

        #[tokio::test]
        async fn test_creates_missing_parameter_with_tags() {
            let get = missing();
            let put = mock!(aws_sdk_ssm::Client::put_parameter)
                .match_requests(|req| {
                    req.r#type() == Some(&ParameterType::SecureString)
                        && req.overwrite().is_none()
                        && req.tags().iter().any(|t| t.value() == OWNER)
                })
                .then_output(|| PutParameterOutput::builder().version(1).build());

            let provisioned = client(&[&get, &put])
                .ensure_exists(&spec(Some("+15551234567")))
                .await
                .unwrap();
            assert_eq!(provisioned.outcome, ActionType::Create);
            assert_eq!(put.num_calls(), 1);
        }

        #[tokio::test]
        async fn test_missing_parameter_without_value_is_not_found() {
            let get = missing();
            let put = put();

            let err = client(&[&get, &put])
                .ensure_exists(&spec(None))
                .await
                .unwrap_err();
            assert!(matches!(err, CloudError::NotFound(_)));
            assert_eq!(put.num_calls(), 0);
        }

        #[tokio::test]
        async fn test_same_value_is_noop() {
            let get = stored_value("+15551234567");
            let tags = tagged(OWNER);
            let put = put();

            let provisioned = client(&[&get, &tags, &put])
                .ensure_exists(&spec(Some("+15551234567")))
                .await
                .unwrap();
            assert_eq!(provisioned.outcome, ActionType::NoOp);
            assert_eq!(put.num_calls(), 0);
        }

        #[tokio::test]
        async fn test_new_value_overwrites() {
            let get = stored_value("+15551234567");
            let tags = tagged(OWNER);
            let put = mock!(aws_sdk_ssm::Client::put_parameter)
                .match_requests(|req| {
                    req.overwrite() == Some(true) && req.value() == Some("+15557654321")
                })
                .then_output(|| PutParameterOutput::builder().version(2).build());

            let provisioned = client(&[&get, &tags, &put])
                .ensure_exists(&spec(Some("+15557654321")))
                .await
                .unwrap();
            assert_eq!(provisioned.outcome, ActionType::Update);
            assert_eq!(put.num_calls(), 1);
        }

        #[tokio::test]
        async fn test_owned_parameter_reused_without_value() {
            let get = stored_value("+15551234567");
            let tags = tagged(OWNER);

            let provisioned = client(&[&get, &tags])
                .ensure_exists(&spec(None))
                .await
                .unwrap();
            assert_eq!(provisioned.outcome, ActionType::NoOp);
        }

        #[tokio::test]
        async fn test_foreign_parameter_without_value_is_conflict() {
            let get = stored_value("+15551234567");
            let tags = tagged("other/prod");

            let err = client(&[&get, &tags])
                .ensure_exists(&spec(None))
                .await
                .unwrap_err();
            assert!(matches!(err, CloudError::Conflict(_)));
            assert!(err.to_string().contains("other/prod"));
        }

        #[tokio::test]
        async fn test_foreign_parameter_not_deleted() {
            let get = stored_value("+15551234567");
            let tags = tagged("other/prod");
            let delete = mock!(aws_sdk_ssm::Client::delete_parameter)
                .then_output(|| DeleteParameterOutput::builder().build());

            let err = client(&[&get, &tags, &delete])
                .ensure_absent(NAME)
                .await
                .unwrap_err();
            assert!(matches!(err, CloudError::Conflict(_)));
            assert_eq!(delete.num_calls(), 0);
        }

        #[tokio::test]
        async fn test_absent_parameter_delete_is_noop() {
            let get = missing();
            assert_eq!(
                client(&[&get]).ensure_absent(NAME).await.unwrap(),
                ActionType::NoOp
            );
        }
    }
}

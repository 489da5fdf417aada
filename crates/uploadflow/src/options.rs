//! Resolved invocation options
//!
//! clap already applies flag over environment variable; this module fills
//! whatever is still unset from the settings file (which carries the
//! built-in defaults) and validates the result before any AWS call.

use crate::Cli;
use std::path::PathBuf;
use uploadflow_cloud::{
    CloudError, Deployment, DeploymentIdentity, Operation, ParameterSpec, validate_phone_number,
};
use uploadflow_cloud_aws::{AwsOptions, ChaliceProject};
use uploadflow_config::Settings;

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub operation: Operation,
    pub deployment: Deployment,
    pub aws: AwsOptions,
}

impl RunOptions {
    pub fn resolve(cli: &Cli, settings: Settings) -> Result<Self, CloudError> {
        let identity = DeploymentIdentity::new(
            cli.app_name.clone().unwrap_or(settings.app_name),
            cli.region.clone().unwrap_or(settings.region),
            cli.stage.clone().unwrap_or(settings.stage),
        );

        if cli.s3_bucket.trim().is_empty() {
            return Err(CloudError::InvalidConfig("--s3-bucket must not be empty".into()));
        }
        if cli.phone_number_parameter_name.trim().is_empty() {
            return Err(CloudError::InvalidConfig(
                "--phone-number-parameter-name must not be empty".into(),
            ));
        }
        if let Some(value) = &cli.phone_number_parameter_value {
            validate_phone_number(value)?;
        }

        let source_dir: PathBuf = cli
            .chalice_app_dir
            .clone()
            .unwrap_or(settings.chalice_app_dir);
        ChaliceProject::open(&source_dir)?;

        let log_retention_days = cli
            .log_retention_days
            .unwrap_or(settings.log_retention_days);
        if log_retention_days < 1 {
            return Err(CloudError::InvalidConfig(format!(
                "--log-retention-days must be at least 1, got {}",
                log_retention_days
            )));
        }

        let deployment = Deployment::new(
            identity,
            cli.s3_bucket.clone(),
            ParameterSpec::new(
                cli.phone_number_parameter_name.clone(),
                cli.phone_number_parameter_value.clone(),
            ),
            cli.function_name.clone().unwrap_or(settings.function_name),
            source_dir,
        );

        Ok(Self {
            operation: cli.action.into(),
            deployment,
            aws: AwsOptions {
                purge_bucket: cli.purge_bucket || settings.purge_bucket,
                log_retention_days,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use tempfile::TempDir;
    use uploadflow_cloud::ErrorKind;

    fn app_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".chalice")).unwrap();
        std::fs::write(dir.path().join(".chalice/config.json"), "{}\n").unwrap();
        dir
    }

    fn parse(dir: &TempDir, extra: &[&str]) -> Cli {
        let mut args = vec![
            "uploadflow",
            "--action",
            "deploy",
            "--s3-bucket",
            "uploads",
            "--phone-number-parameter-name",
            "/lt-chalice/phone",
            "--chalice-app-dir",
            dir.path().to_str().unwrap(),
        ];
        args.extend_from_slice(extra);
        Cli::try_parse_from(args).unwrap()
    }

    #[test]
    fn test_settings_fill_unset_flags() {
        let dir = app_dir();
        let cli = parse(&dir, &["--region", "eu-west-1"]);
        let settings = Settings {
            region: "ap-northeast-1".to_string(),
            stage: "prod".to_string(),
            purge_bucket: true,
            ..Settings::default()
        };

        let options = RunOptions::resolve(&cli, settings).unwrap();
        let identity = &options.deployment.identity;
        assert_eq!(identity.region, "eu-west-1");
        assert_eq!(identity.stage, "prod");
        assert_eq!(identity.application_name, "lt-chalice");
        assert!(options.aws.purge_bucket);
        assert_eq!(options.operation, Operation::Deploy);
        assert_eq!(
            options.deployment.application.function_name(),
            "lt-chalice-prod-recognize_faces"
        );
    }

    #[test]
    fn test_invalid_phone_number_rejected() {
        let dir = app_dir();
        let cli = parse(&dir, &["--phone-number-parameter-value", "5551234"]);
        let err = RunOptions::resolve(&cli, Settings::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn test_missing_app_dir_rejected() {
        let dir = app_dir();
        let mut cli = parse(&dir, &[]);
        cli.chalice_app_dir = Some(dir.path().join("missing"));
        let err = RunOptions::resolve(&cli, Settings::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfig);
    }

    #[test]
    fn test_parameter_value_is_optional() {
        let dir = app_dir();
        let cli = parse(&dir, &["--log-retention-days", "7"]);
        let options = RunOptions::resolve(&cli, Settings::default()).unwrap();
        assert!(options.deployment.parameter.value.is_none());
        assert_eq!(options.aws.log_retention_days, 7);
    }
}

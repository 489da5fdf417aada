//! chalice CLI wrapper
//!
//! Wraps `chalice deploy` / `chalice delete` and the two project files the
//! deployment touches: `.chalice/config.json` (environment bindings) and
//! `.chalice/deployed/<stage>.json` (what the last deploy created).

use crate::error::{AwsError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

const CONFIG_FILE: &str = ".chalice/config.json";
const DEPLOYED_DIR: &str = ".chalice/deployed";
const ENVIRONMENT_KEY: &str = "environment_variables";

/// A Chalice application source tree
#[derive(Debug, Clone)]
pub struct ChaliceProject {
    dir: PathBuf,
}

impl ChaliceProject {
    /// Open a project directory; it must contain `.chalice/config.json`
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let config = dir.join(CONFIG_FILE);
        if !config.is_file() {
            return Err(AwsError::InvalidProject(format!(
                "{} not found",
                config.display()
            )));
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(CONFIG_FILE)
    }

    pub fn deployed_path(&self, stage: &str) -> PathBuf {
        self.dir.join(DEPLOYED_DIR).join(format!("{}.json", stage))
    }

    async fn read_config(&self) -> Result<Map<String, Value>> {
        let content = tokio::fs::read_to_string(self.config_path()).await?;
        match serde_json::from_str(&content)? {
            Value::Object(map) => Ok(map),
            _ => Err(AwsError::InvalidProject(format!(
                "{} is not a JSON object",
                self.config_path().display()
            ))),
        }
    }

    async fn write_config(&self, config: &Map<String, Value>) -> Result<()> {
        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(b"\t");
        let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
        config.serialize(&mut ser)?;
        buf.push(b'\n');
        tokio::fs::write(self.config_path(), buf).await?;
        Ok(())
    }

    /// Merge `bindings` into `environment_variables`. Returns whether the
    /// file content changed; an unchanged file is not rewritten.
    pub async fn set_environment(&self, bindings: &BTreeMap<String, String>) -> Result<bool> {
        let mut config = self.read_config().await?;
        let environment = config
            .entry(ENVIRONMENT_KEY)
            .or_insert_with(|| Value::Object(Map::new()));
        let Value::Object(environment) = environment else {
            return Err(AwsError::InvalidProject(format!(
                "{} in {} is not an object",
                ENVIRONMENT_KEY,
                self.config_path().display()
            )));
        };

        let mut changed = false;
        for (key, value) in bindings {
            let value = Value::String(value.clone());
            if environment.get(key) != Some(&value) {
                environment.insert(key.clone(), value);
                changed = true;
            }
        }

        if changed {
            self.write_config(&config).await?;
            tracing::debug!("Updated {}", self.config_path().display());
        }
        Ok(changed)
    }

    /// Reset the given environment keys to empty strings
    pub async fn clear_environment<'a>(
        &self,
        keys: impl IntoIterator<Item = &'a String>,
    ) -> Result<bool> {
        let cleared = keys
            .into_iter()
            .map(|k| (k.clone(), String::new()))
            .collect::<BTreeMap<_, _>>();
        self.set_environment(&cleared).await
    }

    /// Record of the last deploy of `stage`, if any
    pub async fn deployed_record(&self, stage: &str) -> Result<Option<DeployedRecord>> {
        let path = self.deployed_path(stage);
        match tokio::fs::read_to_string(&path).await {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Contents of `.chalice/deployed/<stage>.json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployedRecord {
    #[serde(default)]
    pub resources: Vec<DeployedResource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeployedResource {
    pub name: String,
    pub resource_type: String,
    #[serde(default)]
    pub lambda_arn: Option<String>,
}

impl DeployedRecord {
    pub fn lambda_functions(&self) -> impl Iterator<Item = &DeployedResource> {
        self.resources
            .iter()
            .filter(|r| r.resource_type == "lambda_function")
    }

    /// First `lambda_function` resource whose name is one of `names`
    pub fn lambda_function(&self, names: &[&str]) -> Option<&DeployedResource> {
        self.lambda_functions()
            .find(|r| names.contains(&r.name.as_str()))
    }
}

/// chalice CLI wrapper bound to one project and region
pub struct Chalice {
    dir: PathBuf,
    region: String,
}

impl Chalice {
    pub fn new(project: &ChaliceProject, region: impl Into<String>) -> Self {
        Self {
            dir: project.dir().to_path_buf(),
            region: region.into(),
        }
    }

    /// Check if chalice is installed
    pub async fn check_installed(&self) -> Result<()> {
        let which = Command::new("which").arg("chalice").output().await?;

        if !which.status.success() {
            return Err(AwsError::ChaliceNotFound);
        }
        Ok(())
    }

    pub async fn deploy(&self, stage: &str) -> Result<String> {
        self.run_command(&["deploy", "--stage", stage]).await
    }

    pub async fn delete(&self, stage: &str) -> Result<String> {
        self.run_command(&["delete", "--stage", stage]).await
    }

    /// Run a chalice command in the project directory and return stdout
    async fn run_command(&self, args: &[&str]) -> Result<String> {
        let mut cmd = Command::new("chalice");
        cmd.args(args);
        cmd.current_dir(&self.dir);
        cmd.env("AWS_DEFAULT_REGION", &self.region);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        tracing::debug!("Running: chalice {} (in {})", args.join(" "), self.dir.display());

        let output = cmd.output().await?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AwsError::CommandFailed(stderr.trim().to_string()));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const CONFIG: &str = r#"{
  "version": "2.0",
  "app_name": "lt-chalice",
  "stages": {
    "dev": {
      "api_gateway_stage": "api"
    }
  }
}
"#;

    fn project() -> (TempDir, ChaliceProject) {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join(".chalice")).unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), CONFIG).unwrap();
        let project = ChaliceProject::open(dir.path()).unwrap();
        (dir, project)
    }

    fn bindings() -> BTreeMap<String, String> {
        BTreeMap::from([
            ("PHONE_NUM_PARAM".to_string(), "/lt-chalice/phone".to_string()),
            ("S3_BUCKET".to_string(), "uploads".to_string()),
        ])
    }

    #[test]
    fn test_open_requires_config() {
        let dir = TempDir::new().unwrap();
        let err = ChaliceProject::open(dir.path()).unwrap_err();
        assert!(matches!(err, AwsError::InvalidProject(_)));
    }

    #[tokio::test]
    async fn test_set_environment_writes_tab_indented() {
        let (_dir, project) = project();

        assert!(project.set_environment(&bindings()).await.unwrap());

        let content = std::fs::read_to_string(project.config_path()).unwrap();
        assert!(content.ends_with("}\n"));
        assert!(content.contains("\n\t\"environment_variables\""));

        let config: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(config["environment_variables"]["S3_BUCKET"], "uploads");
        assert_eq!(config["stages"]["dev"]["api_gateway_stage"], "api");
    }

    #[tokio::test]
    async fn test_set_environment_unchanged_is_not_rewritten() {
        let (_dir, project) = project();
        assert!(project.set_environment(&bindings()).await.unwrap());
        assert!(!project.set_environment(&bindings()).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_environment_keeps_keys() {
        let (_dir, project) = project();
        let bindings = bindings();
        project.set_environment(&bindings).await.unwrap();

        assert!(project.clear_environment(bindings.keys()).await.unwrap());

        let content = std::fs::read_to_string(project.config_path()).unwrap();
        let config: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(config["environment_variables"]["PHONE_NUM_PARAM"], "");
        assert_eq!(config["environment_variables"]["S3_BUCKET"], "");
    }

    #[tokio::test]
    async fn test_deployed_record() {
        let (dir, project) = project();
        assert!(project.deployed_record("dev").await.unwrap().is_none());

        std::fs::create_dir_all(dir.path().join(DEPLOYED_DIR)).unwrap();
        std::fs::write(
            project.deployed_path("dev"),
            r#"{
              "resources": [
                {"name": "default-role", "resource_type": "iam_role", "role_arn": "arn:aws:iam::1:role/x"},
                {"name": "image_upload_handler", "resource_type": "lambda_function",
                 "lambda_arn": "arn:aws:lambda:us-west-2:1:function:lt-chalice-dev-image_upload_handler"}
              ],
              "schema_version": "2.0",
              "backend": "api"
            }"#,
        )
        .unwrap();

        let record = project.deployed_record("dev").await.unwrap().unwrap();
        let function = record
            .lambda_function(&["lt-chalice-dev-image_upload_handler", "image_upload_handler"])
            .unwrap();
        assert!(function.lambda_arn.as_deref().unwrap().ends_with("image_upload_handler"));
        assert!(record.lambda_function(&["default-role"]).is_none());
    }
}

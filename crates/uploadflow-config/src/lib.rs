//! Optional settings file for the uploadflow CLI
//!
//! The file only supplies defaults; command-line flags and `UPLOADFLOW_*`
//! environment variables take precedence over it.
//!
//! ```yaml
//! region: eu-west-1
//! stage: prod
//! chalice_app_dir: ./lt-chalice
//! ```

pub mod error;

pub use error::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming a settings file directly
pub const CONFIG_PATH_ENV: &str = "UPLOADFLOW_CONFIG_PATH";

const CANDIDATES: [&str; 2] = ["uploadflow.yaml", ".uploadflow.yaml"];

/// Defaults for every optional CLI setting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub region: String,
    pub app_name: String,
    pub stage: String,
    pub chalice_app_dir: PathBuf,
    pub function_name: String,
    pub log_retention_days: i32,
    pub purge_bucket: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            region: "us-west-2".to_string(),
            app_name: "lt-chalice".to_string(),
            stage: "dev".to_string(),
            chalice_app_dir: PathBuf::from("lt-chalice"),
            function_name: "recognize_faces".to_string(),
            log_retention_days: 1,
            purge_bucket: false,
        }
    }
}

impl Settings {
    /// Parse a settings file; keys it omits keep their built-in defaults
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Settings from the first file found, or the built-in defaults when
    /// there is none
    pub fn load() -> Result<Self> {
        match find_settings_file() {
            Ok(path) => {
                tracing::debug!("Using settings file {}", path.display());
                Self::from_file(&path)
            }
            Err(ConfigError::SettingsFileNotFound) => Ok(Self::default()),
            Err(e) => Err(e),
        }
    }
}

/// Find the settings file
///
/// Search order:
/// 1. `UPLOADFLOW_CONFIG_PATH`
/// 2. current directory: uploadflow.yaml, .uploadflow.yaml
/// 3. `./.uploadflow/`, same names
/// 4. `~/.config/uploadflow/uploadflow.yaml`
pub fn find_settings_file() -> Result<PathBuf> {
    if let Ok(config_path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
        tracing::warn!("{} points at a missing file: {}", CONFIG_PATH_ENV, path.display());
    }

    let current_dir = std::env::current_dir()?;
    let search_dirs = [current_dir.clone(), current_dir.join(".uploadflow")];

    for dir in search_dirs.iter().filter(|d| d.is_dir()) {
        for filename in &CANDIDATES {
            let path = dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    if let Some(config_dir) = dirs::config_dir() {
        let global = config_dir.join("uploadflow").join(CANDIDATES[0]);
        if global.exists() {
            return Ok(global);
        }
    }

    Err(ConfigError::SettingsFileNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::fs;

    fn in_dir<F: FnOnce()>(dir: &Path, f: F) {
        let original_dir = std::env::current_dir().unwrap();
        std::env::set_current_dir(dir).unwrap();
        temp_env::with_var_unset(CONFIG_PATH_ENV, f);
        std::env::set_current_dir(original_dir).unwrap();
    }

    #[test]
    #[serial]
    fn test_find_in_current_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("uploadflow.yaml"), "stage: prod\n").unwrap();

        in_dir(temp_dir.path(), || {
            let path = find_settings_file().unwrap();
            assert!(path.ends_with("uploadflow.yaml"));
        });
    }

    #[test]
    #[serial]
    fn test_visible_file_before_hidden() {
        let temp_dir = tempfile::tempdir().unwrap();
        fs::write(temp_dir.path().join("uploadflow.yaml"), "").unwrap();
        fs::write(temp_dir.path().join(".uploadflow.yaml"), "").unwrap();

        in_dir(temp_dir.path(), || {
            let path = find_settings_file().unwrap();
            assert!(path.ends_with("uploadflow.yaml"));
            assert!(!path.ends_with(".uploadflow.yaml"));
        });
    }

    #[test]
    #[serial]
    fn test_find_in_project_dir() {
        let temp_dir = tempfile::tempdir().unwrap();
        let project_dir = temp_dir.path().join(".uploadflow");
        fs::create_dir(&project_dir).unwrap();
        fs::write(project_dir.join("uploadflow.yaml"), "").unwrap();

        in_dir(temp_dir.path(), || {
            let path = find_settings_file().unwrap();
            assert!(path.ends_with(".uploadflow/uploadflow.yaml"));
        });
    }

    #[test]
    #[serial]
    fn test_env_var_wins() {
        let temp_dir = tempfile::tempdir().unwrap();
        let config_path = temp_dir.path().join("custom.yaml");
        fs::write(&config_path, "region: eu-west-1\n").unwrap();

        temp_env::with_var(CONFIG_PATH_ENV, Some(&config_path), || {
            assert_eq!(find_settings_file().unwrap(), config_path);
            assert_eq!(Settings::load().unwrap().region, "eu-west-1");
        });
    }

    #[test]
    #[serial]
    fn test_missing_file_gives_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();

        in_dir(temp_dir.path(), || {
            // A global file on the machine running the tests would be picked up
            if let Err(ConfigError::SettingsFileNotFound) = find_settings_file() {
                assert_eq!(Settings::load().unwrap(), Settings::default());
            }
        });
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("uploadflow.yaml");
        fs::write(&path, "stage: prod\npurge_bucket: true\n").unwrap();

        let settings = Settings::from_file(&path).unwrap();
        assert_eq!(settings.stage, "prod");
        assert!(settings.purge_bucket);
        assert_eq!(settings.region, "us-west-2");
        assert_eq!(settings.chalice_app_dir, PathBuf::from("lt-chalice"));
        assert_eq!(settings.function_name, "recognize_faces");
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("uploadflow.yaml");
        fs::write(&path, "regoin: eu-west-1\n").unwrap();

        let err = Settings::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }
}

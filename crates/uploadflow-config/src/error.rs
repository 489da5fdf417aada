use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "Settings file not found. Searched:\n\
        - current directory: uploadflow.yaml, .uploadflow.yaml\n\
        - ./.uploadflow/ directory\n\
        - ~/.config/uploadflow/uploadflow.yaml\n\
        Set UPLOADFLOW_CONFIG_PATH to point at a file directly"
    )]
    SettingsFileNotFound,

    #[error("Invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

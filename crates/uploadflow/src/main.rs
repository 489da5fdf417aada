mod options;
mod output;
mod run;

use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use uploadflow_cloud::Operation;

#[derive(Parser, Debug)]
#[command(name = "uploadflow")]
#[command(
    about = "Deploy or delete the image upload notification app (S3 bucket, SSM parameter, Chalice app)",
    version,
    long_about = None
)]
struct Cli {
    /// Whether to deploy or delete the app
    #[arg(long, value_enum)]
    action: Action,

    /// Name of the S3 bucket receiving uploads
    #[arg(long = "s3-bucket", env = "UPLOADFLOW_S3_BUCKET")]
    s3_bucket: String,

    /// Name of the SSM parameter holding the notification phone number
    #[arg(
        long = "phone-number-parameter-name",
        env = "UPLOADFLOW_PHONE_NUMBER_PARAMETER_NAME"
    )]
    phone_number_parameter_name: String,

    /// Phone number to store (E.164, e.g. +15551234567). When omitted the
    /// parameter must already exist
    #[arg(
        long = "phone-number-parameter-value",
        env = "UPLOADFLOW_PHONE_NUMBER_PARAMETER_VALUE",
        hide_env_values = true
    )]
    phone_number_parameter_value: Option<String>,

    /// Chalice application directory [default: lt-chalice]
    #[arg(long = "chalice-app-dir", env = "UPLOADFLOW_APP_DIR")]
    chalice_app_dir: Option<PathBuf>,

    /// AWS region [default: us-west-2]
    #[arg(long, env = "UPLOADFLOW_REGION")]
    region: Option<String>,

    /// Application name [default: lt-chalice]
    #[arg(long = "app-name", env = "UPLOADFLOW_APP_NAME")]
    app_name: Option<String>,

    /// Deployment stage [default: dev]
    #[arg(long, env = "UPLOADFLOW_STAGE")]
    stage: Option<String>,

    /// Function receiving upload events [default: recognize_faces]
    #[arg(long = "function-name", env = "UPLOADFLOW_FUNCTION_NAME")]
    function_name: Option<String>,

    /// On delete, remove every object in the bucket first
    #[arg(long = "purge-bucket", env = "UPLOADFLOW_PURGE_BUCKET")]
    purge_bucket: bool,

    /// Log retention applied to the function's log group on delete [default: 1]
    #[arg(long = "log-retention-days", env = "UPLOADFLOW_LOG_RETENTION_DAYS")]
    log_retention_days: Option<i32>,

    /// Report format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text, env = "UPLOADFLOW_OUTPUT")]
    output: OutputFormat,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Action {
    Deploy,
    Delete,
}

impl From<Action> for Operation {
    fn from(action: Action) -> Self {
        match action {
            Action::Deploy => Operation::Deploy,
            Action::Delete => Operation::Delete,
        }
    }
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let settings = uploadflow_config::Settings::load()?;
    let options = options::RunOptions::resolve(&cli, settings)?;

    let report = run::execute(&options, cli.output).await?;
    output::print_report(&report, cli.output)?;

    if !report.is_complete() {
        std::process::exit(1);
    }
    Ok(())
}

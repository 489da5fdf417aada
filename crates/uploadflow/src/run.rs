use crate::OutputFormat;
use crate::options::RunOptions;
use crate::output;
use colored::Colorize;
use uploadflow_cloud::{AuthCheck, Orchestrator, Plan, RunReport};
use uploadflow_cloud_aws::{AwsContext, StsAuth};

/// Verify credentials, then execute the plan for the requested operation
pub async fn execute(options: &RunOptions, format: OutputFormat) -> anyhow::Result<RunReport> {
    let deployment = &options.deployment;
    let ctx = AwsContext::load(deployment.identity.clone()).await;

    let auth = StsAuth::new(&ctx).check_auth().await?;
    let caller = match (auth.authenticated, auth.account_info) {
        (true, Some(caller)) => caller,
        _ => {
            let reason = auth.error.unwrap_or_else(|| "unknown error".to_string());
            anyhow::bail!("AWS credentials check failed: {}", reason);
        }
    };
    tracing::info!("Authenticated as {}", caller);
    let ctx = ctx.with_created_by(caller);

    let plan = Plan::for_operation(options.operation);
    if format == OutputFormat::Text {
        println!(
            "{} {}",
            format!("{}:", options.operation).to_uppercase().blue().bold(),
            deployment.identity.to_string().cyan()
        );
    }

    let orchestrator = Orchestrator::new(uploadflow_cloud_aws::clients(&ctx, &options.aws));
    let report = orchestrator
        .run_with_progress(&plan, deployment, |record| {
            if format == OutputFormat::Text {
                output::print_step(record);
            }
        })
        .await;

    Ok(report)
}

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use tracing::info;

use opwait::operation::STATUS_PENDING;
use opwait::{
    container_operation_wait, init_telemetry, ContainerOperation, ContainerOperationsClient, OpWaitConfig,
    OperationName, OperationQuery, ShutdownCoordinator,
};

#[derive(Parser)]
#[command(name = "opwait")]
#[command(about = "Wait for long-running cluster operations to finish")]
#[command(long_about = "opwait polls a managed Kubernetes cluster operation until it finishes \
                       or the timeout elapses. Ctrl-C cancels the wait.")]
struct Cli {
    /// Configuration file (defaults to ./opwait.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Block until the operation finishes
    Wait {
        #[command(flatten)]
        target: OperationArgs,
        /// Label used in log lines and error messages
        #[arg(long, default_value = "operation")]
        activity: String,
        /// Overall timeout, overrides polling.timeout_secs
        #[arg(long)]
        timeout_secs: Option<u64>,
        /// Delay between polls, overrides polling.poll_interval_ms
        #[arg(long)]
        poll_interval_ms: Option<u64>,
    },
    /// Fetch the operation once and print it as JSON
    Get {
        #[command(flatten)]
        target: OperationArgs,
    },
}

#[derive(Args)]
struct OperationArgs {
    /// Project that owns the operation
    #[arg(long)]
    project: String,
    /// Region or zone of the cluster
    #[arg(long)]
    location: String,
    /// Operation name, short or fully qualified
    #[arg(long)]
    operation: String,
}

impl OperationArgs {
    fn name(&self) -> Result<OperationName> {
        Ok(OperationName::for_operation(&self.project, &self.location, &self.operation)?)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tokio::runtime::Runtime::new()?.block_on(async { run(cli).await })
}

async fn run(cli: Cli) -> Result<()> {
    OpWaitConfig::load_env_file().context("Failed to load .env file")?;
    let mut config = OpWaitConfig::load(cli.config.as_deref())?;
    init_telemetry(&config.observability)?;

    let client = ContainerOperationsClient::new(&config.api, config.retry.to_retry_config())
        .context("Failed to create operations client")?;

    match cli.command {
        Commands::Wait {
            target,
            activity,
            timeout_secs,
            poll_interval_ms,
        } => {
            if let Some(timeout_secs) = timeout_secs {
                config.polling.timeout_secs = timeout_secs;
            }
            if let Some(poll_interval_ms) = poll_interval_ms {
                config.polling.poll_interval_ms = poll_interval_ms;
            }
            wait_command(&client, &target, &activity, &config).await
        }
        Commands::Get { target } => get_command(&client, &target).await,
    }
}

async fn wait_command(
    client: &ContainerOperationsClient,
    target: &OperationArgs,
    activity: &str,
    config: &OpWaitConfig,
) -> Result<()> {
    let name = target.name()?;
    let shutdown = ShutdownCoordinator::new();
    shutdown.install_signal_handlers()?;

    // Seed as pending; the poll loop does the first fetch under cancellation
    // and not-found dismissal.
    let seed = ContainerOperation::new(name.operation(), STATUS_PENDING);

    let finished = container_operation_wait(
        client,
        seed,
        name.project(),
        name.location(),
        activity,
        &config.polling,
        shutdown.token(),
    )
    .await?;

    info!(operation = %name, status = %finished.status, "Operation finished");
    println!("{}: {}", name, finished.status);
    Ok(())
}

async fn get_command(client: &ContainerOperationsClient, target: &OperationArgs) -> Result<()> {
    let name = target.name()?;
    let op = client
        .query(&name)
        .await
        .with_context(|| format!("Failed to fetch {name}"))?;

    println!("{}", serde_json::to_string_pretty(&op)?);
    Ok(())
}

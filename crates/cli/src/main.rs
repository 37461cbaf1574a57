//! `nodebase` CLI entry-point.
//!
//! Available sub-commands:
//! - `validate`: check a workflow JSON file and print its execution order.
//! - `run`:      execute a workflow once, from a file or from Postgres.
//! - `save`:     validate a workflow file and store it in Postgres.
//! - `migrate`:  run pending database migrations.
//! - `enqueue`:  queue a run of a stored workflow.
//! - `worker`:   drain queued runs until interrupted.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context as _};
use clap::{Args, Parser, Subcommand};
use db::{DbPool, PgCredentialStore, PgStepStore, PgWorkflowStore};
use engine::{
    validate_workflow, ExecutorConfig, ExecutorRegistry, ExecutorServices, MemoryStepStore,
    MemoryWorkflowStore, RunRequest, StatusBus, StatusEvent, StepStore, Workflow, WorkflowExecutor,
    WorkflowStore,
};
use nodes::credentials::{Credential, CredentialStore, MemoryCredentialStore};
use nodes::transport::{ReqwestTransport, DEFAULT_HTTP_TIMEOUT};
use queue::{JobSource, PgJobQueue, Worker, WorkerConfig};
use serde_json::Value;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "nodebase", about = "Durable workflow execution engine", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a workflow definition JSON file.
    Validate {
        /// Path to the workflow JSON file.
        path: PathBuf,
    },
    /// Run a workflow once and print the final context.
    Run {
        #[command(flatten)]
        target: RunTarget,
        #[command(flatten)]
        input: RunInput,
        /// JSON file holding an array of credentials (in-memory runs only).
        #[arg(long)]
        credentials: Option<PathBuf>,
        /// Resume this run id instead of starting a fresh one.
        #[arg(long)]
        run_id: Option<Uuid>,
        #[arg(long, env = "DATABASE_URL")]
        database_url: Option<String>,
        #[command(flatten)]
        retry: RetryArgs,
    },
    /// Validate a workflow file and store it.
    Save {
        path: PathBuf,
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Run pending database migrations.
    Migrate {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Queue a run of a stored workflow.
    Enqueue {
        workflow_id: Uuid,
        #[command(flatten)]
        input: RunInput,
        #[arg(long, default_value_t = queue::DEFAULT_MAX_ATTEMPTS)]
        max_attempts: u32,
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
    },
    /// Start a background worker that processes queued runs.
    Worker {
        #[arg(long, env = "DATABASE_URL")]
        database_url: String,
        #[arg(long, default_value_t = 1000)]
        poll_interval_ms: u64,
        /// Seconds a claimed job may stay unsettled before another worker
        /// takes it over.
        #[arg(long, default_value_t = queue::DEFAULT_LEASE.as_secs())]
        job_lease_secs: u64,
        #[command(flatten)]
        retry: RetryArgs,
    },
}

#[derive(Args)]
#[group(required = true, multiple = false)]
struct RunTarget {
    /// Workflow JSON file.
    #[arg(long)]
    file: Option<PathBuf>,
    /// Id of a stored workflow (needs `--database-url`).
    #[arg(long)]
    workflow_id: Option<Uuid>,
}

#[derive(Args)]
struct RunInput {
    /// Initial context as a JSON object.
    #[arg(long)]
    input: Option<String>,
    /// Owner on whose behalf credentials are resolved.
    #[arg(long, default_value = "local")]
    user: String,
}

impl RunInput {
    fn request(&self, workflow_id: Uuid) -> anyhow::Result<RunRequest> {
        let mut request = RunRequest::new(workflow_id, &self.user);
        if let Some(raw) = &self.input {
            let data: Value = serde_json::from_str(raw).context("--input is not valid JSON")?;
            if !data.is_object() {
                bail!("--input must be a JSON object");
            }
            request = request.with_initial_data(data);
        }
        Ok(request)
    }
}

#[derive(Args)]
struct RetryArgs {
    /// Retries per step for transient failures.
    #[arg(long, default_value_t = 3)]
    max_retries: u32,
    #[arg(long, default_value_t = 100)]
    retry_base_delay_ms: u64,
    /// Budget for a single outbound HTTP request; expiry is retried.
    #[arg(long, default_value_t = DEFAULT_HTTP_TIMEOUT.as_millis() as u64)]
    http_timeout_ms: u64,
}

impl RetryArgs {
    fn config(&self) -> ExecutorConfig {
        ExecutorConfig {
            max_retries: self.max_retries,
            retry_base_delay: Duration::from_millis(self.retry_base_delay_ms),
            ..ExecutorConfig::default()
        }
    }

    fn http_timeout(&self) -> Duration {
        Duration::from_millis(self.http_timeout_ms.max(1))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("nodebase=info,engine=info,warn")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Validate { path } => {
            let workflow = read_workflow(&path)?;
            match validate_workflow(&workflow) {
                Ok(order) => println!("Workflow is valid. Execution order: {order:?}"),
                Err(e) => {
                    eprintln!("Validation failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Run {
            target,
            input,
            credentials,
            run_id,
            database_url,
            retry,
        } => {
            run(target, input, credentials, run_id, database_url, &retry).await?;
        }
        Command::Save { path, database_url } => {
            let workflow = read_workflow(&path)?;
            let pool = connect(&database_url).await?;
            let order = PgWorkflowStore::new(pool).save_workflow(&workflow).await?;
            info!(workflow_id = %workflow.id, "workflow saved");
            println!("{} {order:?}", workflow.id);
        }
        Command::Migrate { database_url } => {
            let pool = connect(&database_url).await?;
            db::run_migrations(&pool).await?;
            info!("Migrations applied successfully");
        }
        Command::Enqueue {
            workflow_id,
            input,
            max_attempts,
            database_url,
        } => {
            let pool = connect(&database_url).await?;
            let workflow = PgWorkflowStore::new(pool.clone())
                .load_workflow(workflow_id)
                .await?
                .with_context(|| format!("workflow {workflow_id} not found"))?;
            validate_workflow(&workflow)?;

            let request = input.request(workflow_id)?;
            let run_id = request.run_id;
            let job_id = PgJobQueue::new(pool)
                .with_max_attempts(max_attempts)
                .enqueue(request)
                .await?;
            println!("job {job_id} run {run_id}");
        }
        Command::Worker {
            database_url,
            poll_interval_ms,
            job_lease_secs,
            retry,
        } => {
            let pool = connect(&database_url).await?;
            let executor = pg_executor(pool.clone(), &retry)?;
            let cancel = CancellationToken::new();
            let worker = Worker::new(
                Arc::new(PgJobQueue::new(pool).with_lease(Duration::from_secs(job_lease_secs))),
                Arc::new(executor.inner),
                WorkerConfig {
                    poll_interval: Duration::from_millis(poll_interval_ms),
                },
                cancel.clone(),
            );

            let handle = worker.spawn();
            tokio::signal::ctrl_c().await?;
            info!("Shutdown requested");
            cancel.cancel();
            handle.await?;
        }
    }

    Ok(())
}

async fn run(
    target: RunTarget,
    input: RunInput,
    credentials: Option<PathBuf>,
    run_id: Option<Uuid>,
    database_url: Option<String>,
    retry: &RetryArgs,
) -> anyhow::Result<()> {
    let (executor, workflow_id) = match (target.file, target.workflow_id) {
        (Some(path), _) => {
            let workflow = read_workflow(&path)?;
            let workflow_id = workflow.id;
            let store = Arc::new(MemoryWorkflowStore::from_iter([workflow]));
            let credentials: Arc<dyn CredentialStore> = match &credentials {
                Some(path) => Arc::new(read_credentials(path)?),
                None => Arc::new(MemoryCredentialStore::new()),
            };
            let steps: Arc<dyn StepStore> = match &database_url {
                Some(url) => Arc::new(PgStepStore::new(connect(url).await?)),
                None => Arc::new(MemoryStepStore::new()),
            };
            (build_executor(store, credentials, steps, retry)?, workflow_id)
        }
        (None, Some(workflow_id)) => {
            let Some(url) = database_url else {
                bail!("--workflow-id needs --database-url");
            };
            (pg_executor(connect(&url).await?, retry)?, workflow_id)
        }
        (None, None) => bail!("either --file or --workflow-id is required"),
    };

    let mut request = input.request(workflow_id)?;
    if let Some(run_id) = run_id {
        request = request.with_run_id(run_id);
    }

    let printer = tokio::spawn(print_statuses(executor.statuses.subscribe()));
    let outcome = executor.inner.run(request).await;
    // Dropping every sender closes the channel, which ends the printer.
    drop(executor);
    let printed = printer.await?;
    debug!(printed, "status stream closed");

    match outcome {
        Ok(result) => {
            info!(run_id = %result.run_id, executed = ?result.executed, "run finished");
            println!("{}", serde_json::to_string_pretty(&result.context)?);
            Ok(())
        }
        Err(failure) => {
            eprintln!("{}", serde_json::to_string_pretty(&failure.context)?);
            Err(failure.into())
        }
    }
}

/// An executor plus the bus its statuses go to.
struct LocalExecutor {
    inner: WorkflowExecutor,
    statuses: Arc<StatusBus>,
}

fn build_executor(
    store: Arc<dyn WorkflowStore>,
    credentials: Arc<dyn CredentialStore>,
    steps: Arc<dyn StepStore>,
    retry: &RetryArgs,
) -> anyhow::Result<LocalExecutor> {
    let transport = ReqwestTransport::with_timeout(retry.http_timeout())
        .context("failed to build HTTP client")?;
    let registry = ExecutorRegistry::new(&ExecutorServices {
        transport: Arc::new(transport),
        credentials,
    });
    let config = retry.config();
    let statuses = Arc::new(StatusBus::new(config.status_capacity));
    let inner = WorkflowExecutor::new(store, registry, steps, statuses.clone(), config);
    Ok(LocalExecutor { inner, statuses })
}

fn pg_executor(pool: DbPool, retry: &RetryArgs) -> anyhow::Result<LocalExecutor> {
    build_executor(
        Arc::new(PgWorkflowStore::new(pool.clone())),
        Arc::new(PgCredentialStore::new(pool.clone())),
        Arc::new(PgStepStore::new(pool)),
        retry,
    )
}

/// Log statuses until the bus closes; returns how many were logged.
async fn print_statuses(mut receiver: broadcast::Receiver<StatusEvent>) -> usize {
    let mut printed = 0;
    loop {
        match receiver.recv().await {
            Ok(event) => {
                printed += 1;
                info!(
                    node_id = %event.update.data.node_id,
                    channel = %event.update.channel,
                    status = ?event.update.data.status,
                    "node status"
                );
            }
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "status printer fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
    printed
}

async fn connect(database_url: &str) -> anyhow::Result<DbPool> {
    db::create_pool(database_url, 5)
        .await
        .context("failed to connect to database")
}

fn read_workflow(path: &Path) -> anyhow::Result<Workflow> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid workflow JSON in {}", path.display()))
}

fn read_credentials(path: &Path) -> anyhow::Result<MemoryCredentialStore> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read file {}", path.display()))?;
    let credentials: Vec<Credential> = serde_json::from_str(&content)
        .with_context(|| format!("invalid credentials JSON in {}", path.display()))?;
    Ok(MemoryCredentialStore::from_credentials(credentials))
}

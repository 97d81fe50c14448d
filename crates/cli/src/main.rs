use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, ValueEnum};
use metrics::{describe_counter, describe_histogram, Unit};
use stratus_cfnhub::CfnHub;
use stratus_core::{StackError, StackParams, StackResult};
use stratus_ops::{FanoutNotifier, Orchestrator, Outcome, OutcomeStatus, PollConfig, TracingNotifier};
use tokio::signal;
use tracing::{error, info};

mod console;

use console::ConsoleNotifier;

#[derive(Parser, Debug)]
#[command(name = "stratusctl", version, about = "Create, update, delete or validate a CloudFormation stack and wait for it to settle")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, default_value_t = Output::Human)]
    output: Output,

    /// Create, Update, Delete or Validate (any case)
    #[arg(long, env = "STRATUS_ACTION")]
    action: String,

    /// Stack name (not needed for Validate)
    #[arg(long = "stack", env = "STRATUS_STACK_NAME", default_value = "")]
    stack: String,

    /// Region; falls back to AWS_REGION
    #[arg(long, env = "STRATUS_REGION")]
    region: Option<String>,

    /// Bucket holding the template
    #[arg(long, env = "STRATUS_S3_BUCKET")]
    bucket: Option<String>,

    /// Template object key
    #[arg(long, env = "STRATUS_S3_KEY")]
    key: Option<String>,

    /// Template object version
    #[arg(long = "object-version", env = "STRATUS_S3_OBJECT_VERSION")]
    object_version: Option<String>,

    /// Override the region's storage endpoint, e.g. "minio.local:9000"
    #[arg(long = "s3-endpoint", env = "STRATUS_S3_ENDPOINT")]
    s3_endpoint: Option<String>,

    /// DO_NOTHING, ROLLBACK, DELETE or null (Create only)
    #[arg(long = "on-failure", env = "STRATUS_ON_FAILURE")]
    on_failure: Option<String>,

    /// Seconds between status probes
    #[arg(long = "poll-interval-secs", env = "STRATUS_POLL_INTERVAL_SECS")]
    poll_interval_secs: Option<u64>,

    /// Give up waiting after this many seconds (0 = never)
    #[arg(long = "wait-timeout-secs", env = "STRATUS_WAIT_TIMEOUT_SECS")]
    wait_timeout_secs: Option<u64>,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum Output { Human, Json }

impl Cli {
    fn params(&self) -> StackParams {
        StackParams {
            stack_name: self.stack.clone(),
            region: self.region.clone().or_else(|| std::env::var("AWS_REGION").ok()).unwrap_or_default(),
            action: self.action.clone(),
            bucket: self.bucket.clone(),
            key: self.key.clone(),
            object_version: self.object_version.clone(),
            storage_endpoint: self.s3_endpoint.clone(),
            on_failure: self.on_failure.clone(),
        }
    }
}

/// Our crates log at info; the AWS SDK and its HTTP stack only at warn.
const DEFAULT_LOG: &str = "warn,stratusctl=info,stratus_ops=info,stratus_cfnhub=info,stratus_core=info";

fn log_filter(spec: Option<&str>) -> tracing_subscriber::EnvFilter {
    spec.and_then(|s| tracing_subscriber::EnvFilter::from_str(s).ok())
        .unwrap_or_else(|| tracing_subscriber::EnvFilter::new(DEFAULT_LOG))
}

/// Logs go to stderr so stdout stays the console notifier's (one JSON object per line with `-o json`).
fn init_tracing() {
    let spec = std::env::var("STRATUS_LOG").ok();
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(spec.as_deref()))
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn init_metrics() {
    let Ok(addr) = std::env::var("STRATUS_METRICS_ADDR") else { return };
    let Ok(sock) = addr.parse::<std::net::SocketAddr>() else {
        tracing::warn!(addr = %addr, "invalid STRATUS_METRICS_ADDR; expected host:port");
        return;
    };
    match metrics_exporter_prometheus::PrometheusBuilder::new().with_http_listener(sock).install() {
        Ok(()) => {
            describe_counter!("stack_polls_total", "Status probes issued while waiting for convergence");
            describe_counter!("stack_events_forwarded_total", "Stack events forwarded to notifiers");
            describe_counter!("stack_remote_errors_total", "Failed control-plane calls, by operation");
            describe_histogram!("stack_operation_secs", Unit::Seconds, "Wall time of one invocation, by action and outcome");
            tracing::info!(addr = %addr, "Prometheus metrics exporter listening");
        }
        Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
    }
}

/// 0 success, 1 finished with problems, 2 bad parameters, 130 interrupted.
fn exit_code(result: &StackResult<Outcome>) -> u8 {
    match result {
        Err(StackError::Configuration(_)) => 2,
        Err(_) => 1,
        Ok(outcome) => match outcome.status {
            OutcomeStatus::Success => 0,
            OutcomeStatus::SuccessWithProblems => 1,
            OutcomeStatus::Interrupted => 130,
        },
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    let config = PollConfig::from_env().with_overrides(cli.poll_interval_secs, cli.wait_timeout_secs);
    let notifier = FanoutNotifier::new().with(Arc::new(TracingNotifier)).with(Arc::new(ConsoleNotifier::new(cli.output)));
    let orchestrator = Orchestrator::new(Arc::new(CfnHub::from_env()), Arc::new(notifier)).with_config(config);

    let cancel = orchestrator.cancel_handle();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            info!("Ctrl-C received; interrupting");
            cancel.cancel();
        }
    });

    let result = orchestrator.run(&cli.params()).await;
    match &result {
        Err(e) => {
            error!(error = %e, "invalid parameters");
            match cli.output {
                Output::Human => eprintln!("error: {}", e),
                Output::Json => println!("{}", serde_json::json!({"kind": "error", "error": e.to_string()})),
            }
        }
        Ok(outcome) => {
            if cli.output == Output::Json {
                println!("{}", serde_json::to_string(&serde_json::json!({"kind": "outcome", "outcome": outcome}))?);
            }
        }
    }
    Ok(ExitCode::from(exit_code(&result)))
}

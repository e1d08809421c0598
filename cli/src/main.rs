mod config;
mod views;

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use hcictl_core::catalog;
use hcictl_core::{
    available_versions, resolve, Appliance, ClientConfig, Credentials, EndpointDescriptor, Error,
    HttpMethod, JobHandle, JobState, OperationError, Payload, PollProfile, RunOptions,
};
use serde::Serialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use crate::config::{default_config_path, Config};
use crate::views::{OperationEntry, Resolution, RunView, Submitted};

const EXIT_GENERIC_FAILURE: i32 = 1;
const EXIT_RESOLUTION_FAILURE: i32 = 2;
const EXIT_JOB_FAILED: i32 = 3;
const EXIT_TRANSPORT_OR_AUTH_FAILURE: i32 = 4;
const EXIT_JOB_INCOMPLETE: i32 = 5;

#[derive(Parser, Debug)]
#[command(name = "hcictl")]
#[command(about = "HCI appliance management CLI", long_about = None)]
struct Args {
    /// Appliance manager address (host name or URL)
    #[arg(long, env = "HCICTL_HOST")]
    host: Option<String>,

    /// Management account (basic auth)
    #[arg(long, env = "HCICTL_USERNAME")]
    username: Option<String>,

    /// Management account password
    #[arg(long, env = "HCICTL_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Accept self-signed appliance certificates
    #[arg(long, default_value_t = false)]
    insecure: bool,

    /// Load config from this path
    #[arg(long)]
    config: Option<PathBuf>,

    /// Save host and username into config
    #[arg(long, default_value_t = false)]
    save_config: bool,

    /// HTTP timeout seconds (per request, not per job)
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,

    /// Retry count for GETs answered with 429/503
    #[arg(long, default_value_t = 0)]
    retries: u32,

    /// Log level
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Appliance API description
    Schema {
        #[command(subcommand)]
        cmd: SchemaCmd,
    },

    /// Resolve the API version to use for an endpoint
    Resolve {
        #[command(flatten)]
        endpoint: EndpointArgs,
    },

    /// Operations known to this client
    Operations {
        #[command(subcommand)]
        cmd: OperationsCmd,
    },

    /// Invoke a registered operation once and print the response
    Call {
        #[command(flatten)]
        op: OperationArgs,
    },

    /// Appliance requests (async jobs)
    Jobs {
        #[command(subcommand)]
        cmd: JobsCmd,
    },

    /// Submit an async operation and wait for it to finish
    Run {
        #[command(flatten)]
        op: OperationArgs,
        #[command(flatten)]
        poll: PollArgs,
    },

    /// Cluster lifecycle
    Cluster {
        #[command(subcommand)]
        cmd: ClusterCmd,
    },
}

#[derive(Subcommand, Debug)]
enum SchemaCmd {
    /// Print the normalized path -> version -> method map
    Dump,
    /// List versions exposing an endpoint
    Versions {
        #[arg(long)]
        path: String,
        #[arg(long)]
        method: Option<HttpMethod>,
    },
}

#[derive(Subcommand, Debug)]
enum OperationsCmd {
    List,
}

#[derive(Subcommand, Debug)]
enum JobsCmd {
    /// Fetch a request's current status once
    Get { id: String },
    /// Poll a request until it finishes
    Watch {
        id: String,
        #[command(flatten)]
        poll: PollArgs,
    },
}

#[derive(Subcommand, Debug)]
enum ClusterCmd {
    /// Shut the cluster down (or validate that it can be)
    Shutdown {
        /// Only run the shutdown prechecks
        #[arg(long, default_value_t = false)]
        dry_run: bool,
        #[arg(long)]
        api_version: Option<u32>,
        /// Wait for the request to finish
        #[arg(long, default_value_t = false)]
        wait: bool,
        #[command(flatten)]
        poll: PollArgs,
    },
}

#[derive(ClapArgs, Debug)]
struct EndpointArgs {
    /// Path template without version, e.g. /hosts/{sn}
    #[arg(long)]
    path: String,
    #[arg(long)]
    method: Option<HttpMethod>,
    /// Explicit API version number (default: highest available)
    #[arg(long)]
    api_version: Option<u32>,
}

#[derive(ClapArgs, Debug)]
struct OperationArgs {
    /// Operation suffix, e.g. hosts_get (see `operations list`)
    suffix: String,
    /// Path template; defaults to the catalog entry for the suffix
    #[arg(long)]
    path: Option<String>,
    #[arg(long)]
    method: Option<HttpMethod>,
    #[arg(long)]
    api_version: Option<u32>,
    /// Path parameter (repeatable), e.g. --param sn=V0123
    #[arg(long)]
    param: Vec<String>,
    /// Query parameter (repeatable), e.g. --query limit=10
    #[arg(long)]
    query: Vec<String>,
    /// JSON request body (string) or @/path/to/file.json
    #[arg(long)]
    json: Option<String>,
}

#[derive(ClapArgs, Debug)]
struct PollArgs {
    /// Polling profile: light, standard or heavy
    #[arg(long, default_value = "standard")]
    profile: PollProfile,
    /// Seconds between status queries
    #[arg(long)]
    interval_secs: Option<u64>,
    /// Give up waiting after this many seconds
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// Seconds to wait after a failed status query
    #[arg(long)]
    recovery_secs: Option<u64>,
    /// Failed status queries tolerated in a row
    #[arg(long)]
    max_retries: Option<u32>,
}

impl PollArgs {
    fn options(&self, cfg: &Config) -> RunOptions {
        let overrides = config::ProfileOverride {
            interval_secs: self.interval_secs,
            timeout_secs: self.timeout_secs,
            recovery_secs: self.recovery_secs,
            max_retries: self.max_retries,
        };
        let mut options = RunOptions::new(overrides.apply(cfg.policy(self.profile)));
        options.already_complete = cfg.already_complete.clone();
        options
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logging goes to stderr; stdout carries JSON only.
    let lvl = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(lvl)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if let Err(err) = run(args).await {
        eprintln!("Error: {:#}", err);
        std::process::exit(exit_code(&err));
    }
    Ok(())
}

async fn run(args: Args) -> Result<()> {
    let cfg_path = args.config.clone().unwrap_or_else(default_config_path);
    let mut cfg = Config::load(&cfg_path)?;

    // CLI args override config.
    if let Some(host) = &args.host {
        cfg.host = Some(host.clone());
    }
    if let Some(username) = &args.username {
        cfg.username = Some(username.clone());
    }
    if args.insecure {
        cfg.insecure = true;
    }
    if args.save_config {
        cfg.save(&cfg_path)?;
    }

    let conn = args_conn(&args);
    match args.cmd {
        Command::Operations {
            cmd: OperationsCmd::List,
        } => {
            let registry = catalog::default_registry();
            let entries: Vec<OperationEntry> = registry
                .iter()
                .map(|(id, binding)| OperationEntry::new(id, binding))
                .collect();
            print_json(&entries)
        }
        Command::Schema { cmd } => run_schema(&connect(&conn, &cfg)?, cmd).await,
        Command::Resolve { endpoint } => {
            run_resolve(&connect(&conn, &cfg)?, endpoint).await
        }
        Command::Call { op } => run_call(&connect(&conn, &cfg)?, op).await,
        Command::Jobs { cmd } => run_jobs(&connect(&conn, &cfg)?, &cfg, cmd).await,
        Command::Run { op, poll } => {
            let app = connect(&conn, &cfg)?;
            let options = poll.options(&cfg);
            run_operation(&app, op, &options).await
        }
        Command::Cluster { cmd } => {
            run_cluster(&connect(&conn, &cfg)?, &cfg, cmd).await
        }
    }
}

/// Connection settings taken from the command line.
struct ConnArgs {
    password: Option<String>,
    timeout: Duration,
    retries: u32,
}

fn args_conn(args: &Args) -> ConnArgs {
    ConnArgs {
        password: args.password.clone(),
        timeout: Duration::from_secs(args.timeout_secs),
        retries: args.retries,
    }
}

fn connect(conn: &ConnArgs, cfg: &Config) -> Result<Appliance> {
    let host = cfg
        .host
        .clone()
        .context("No appliance host (pass --host, set HCICTL_HOST, or save one in config)")?;
    let credentials = match (&cfg.username, &conn.password) {
        (Some(username), Some(password)) => Some(Credentials {
            username: username.clone(),
            password: password.clone(),
        }),
        (Some(username), None) => {
            anyhow::bail!("No password for {} (pass --password or set HCICTL_PASSWORD)", username)
        }
        (None, _) => None,
    };
    let mut client = ClientConfig::new(host);
    client.credentials = credentials;
    client.insecure = cfg.insecure;
    client.timeout = conn.timeout;
    client.retries = conn.retries;
    Ok(Appliance::connect(client)?.with_locations(cfg.locations()))
}

async fn run_schema(app: &Appliance, cmd: SchemaCmd) -> Result<()> {
    let schema = app.schema().await?;
    match cmd {
        SchemaCmd::Dump => print_json(&schema),
        SchemaCmd::Versions { path, method } => {
            let versions = available_versions(&schema, &EndpointDescriptor::new(path, method));
            print_json(&versions)
        }
    }
}

async fn run_resolve(app: &Appliance, endpoint: EndpointArgs) -> Result<()> {
    let descriptor = EndpointDescriptor::new(endpoint.path, endpoint.method);
    let schema = app.schema().await?;
    let version = resolve(&schema, &descriptor, endpoint.api_version)?;
    let available = available_versions(&schema, &descriptor).into_iter().collect();
    let operation_id = catalog::CATALOG
        .iter()
        .find(|e| {
            e.path == descriptor.path_template()
                && descriptor.http_method().map_or(true, |m| m == e.method)
        })
        .map(|e| hcictl_core::endpoint::operation_id(&version, e.suffix));
    print_json(&Resolution {
        path: descriptor.path_template().to_string(),
        method: descriptor.http_method(),
        version,
        available,
        operation_id,
    })
}

async fn run_call(app: &Appliance, op: OperationArgs) -> Result<()> {
    let descriptor = descriptor_for(&op)?;
    let payload = payload_for(&op)?;
    let resolved = app
        .resolve(&descriptor, op.api_version, &op.suffix)
        .await?;
    let resp = app
        .invoke(&resolved.version, &op.suffix, &payload)
        .await
        .with_context(|| format!("{} failed", resolved.operation_id))?;
    print_json(&resp.value()?)
}

async fn run_jobs(app: &Appliance, cfg: &Config, cmd: JobsCmd) -> Result<()> {
    match cmd {
        JobsCmd::Get { id } => {
            let schema = app.schema().await?;
            let version = app.status_version(&schema)?;
            let record = app
                .job_status(&version, &JobHandle::new(id.clone()))
                .await
                .with_context(|| format!("Failed to fetch request {}", id))?;
            let outcome = hcictl_core::reduce(&record);
            print_json(&outcome)?;
            if outcome.state == JobState::Failed {
                return Err(Error::JobFailed {
                    outcome: Box::new(outcome),
                }
                .into());
            }
            Ok(())
        }
        JobsCmd::Watch { id, poll } => {
            let options = poll.options(cfg);
            report_run(app.watch(JobHandle::new(id), &options).await)
        }
    }
}

async fn run_operation(app: &Appliance, op: OperationArgs, options: &RunOptions) -> Result<()> {
    let descriptor = descriptor_for(&op)?;
    let payload = payload_for(&op)?;
    report_run(
        app.run(&descriptor, &op.suffix, op.api_version, &payload, options)
            .await,
    )
}

async fn run_cluster(app: &Appliance, cfg: &Config, cmd: ClusterCmd) -> Result<()> {
    match cmd {
        ClusterCmd::Shutdown {
            dry_run,
            api_version,
            wait,
            poll,
        } => {
            let suffix = "cluster_shutdown_post";
            let entry = catalog::find(suffix).context("shutdown is missing from the catalog")?;
            let descriptor = entry.descriptor();
            let payload = Payload::json(serde_json::json!({ "dryrun": dry_run }));
            if wait {
                return report_run(
                    app.run(&descriptor, suffix, api_version, &payload, &poll.options(cfg))
                        .await,
                );
            }
            let resolved = app.resolve(&descriptor, api_version, suffix).await?;
            let handle = app
                .submit(&resolved.version, suffix, &payload)
                .await
                .with_context(|| format!("{} failed", resolved.operation_id))?;
            print_json(&Submitted {
                request_id: handle.request_id().to_string(),
                operation_id: resolved.operation_id,
                status: "submitted",
            })
        }
    }
}

/// Prints the outcome of a waited job. Failed jobs still print their
/// reduced record before the error is returned.
fn report_run(result: hcictl_core::Result<hcictl_core::RunOutcome>) -> Result<()> {
    match result {
        Ok(outcome) => print_json(&RunView::from(&outcome)),
        Err(Error::JobFailed { outcome }) => {
            print_json(&RunView::Job(outcome.as_ref()))?;
            Err(Error::JobFailed { outcome }.into())
        }
        Err(err) => Err(err.into()),
    }
}

fn descriptor_for(op: &OperationArgs) -> Result<EndpointDescriptor> {
    let entry = catalog::find(&op.suffix);
    let path = match (&op.path, entry) {
        (Some(p), _) => p.clone(),
        (None, Some(e)) => e.path.to_string(),
        (None, None) => anyhow::bail!(
            "Unknown operation '{}'; pass --path (and --method) or see `operations list`",
            op.suffix
        ),
    };
    let method = op.method.or(entry.map(|e| e.method));
    Ok(EndpointDescriptor::new(path, method))
}

fn payload_for(op: &OperationArgs) -> Result<Payload> {
    let mut payload = Payload::default();
    for (k, v) in parse_pairs(&op.param, "--param")? {
        payload.path_params.insert(k, v);
    }
    payload.query = parse_pairs(&op.query, "--query")?;
    payload.body = op.json.as_deref().map(parse_json_arg).transpose()?;
    Ok(payload)
}

fn parse_pairs(items: &[String], flag: &str) -> Result<Vec<(String, String)>> {
    items
        .iter()
        .map(|item| {
            let (k, v) = item
                .split_once('=')
                .with_context(|| format!("{} must be key=value, got '{}'", flag, item))?;
            Ok((k.trim().to_string(), v.to_string()))
        })
        .collect()
}

fn parse_json_arg(s: &str) -> Result<serde_json::Value> {
    if let Some(path) = s.strip_prefix('@') {
        let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path))?;
        let v =
            serde_json::from_slice(&bytes).with_context(|| format!("Invalid JSON in {}", path))?;
        return Ok(v);
    }
    let v = serde_json::from_str(s).context("Invalid JSON")?;
    Ok(v)
}

fn print_json<T: Serialize>(v: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(v)?);
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> i32 {
    for cause in err.chain() {
        if let Some(e) = cause.downcast_ref::<Error>() {
            return match e {
                Error::SchemaUnavailable {
                    source: Some(op), ..
                } if transport_or_auth(op) => EXIT_TRANSPORT_OR_AUTH_FAILURE,
                Error::SchemaUnavailable { .. } | Error::VersionNotFound { .. } => {
                    EXIT_RESOLUTION_FAILURE
                }
                Error::Operation(op) => operation_exit_code(op),
                Error::JobFailed { .. } => EXIT_JOB_FAILED,
                Error::JobAborted { .. } | Error::JobTimedOut { .. } => EXIT_JOB_INCOMPLETE,
                Error::JobPollFailed { source, .. } if transport_or_auth(source) => {
                    EXIT_TRANSPORT_OR_AUTH_FAILURE
                }
                Error::JobPollFailed { .. } => EXIT_JOB_INCOMPLETE,
                Error::Config(_) => EXIT_GENERIC_FAILURE,
            };
        }
        if let Some(op) = cause.downcast_ref::<OperationError>() {
            return operation_exit_code(op);
        }
    }
    EXIT_GENERIC_FAILURE
}

fn operation_exit_code(op: &OperationError) -> i32 {
    match op {
        OperationError::NotImplementedForVersion { .. } => EXIT_RESOLUTION_FAILURE,
        _ if transport_or_auth(op) => EXIT_TRANSPORT_OR_AUTH_FAILURE,
        _ => EXIT_GENERIC_FAILURE,
    }
}

fn transport_or_auth(op: &OperationError) -> bool {
    matches!(
        op,
        OperationError::Transport { .. } | OperationError::Http { status: 401 | 403, .. }
    )
}

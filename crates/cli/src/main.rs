use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use orka_core::{ControllerConfig, Kind, ObjectKey, Scheme};
use orka_graph::TracingRecorder;
use orka_kubehub::{KubeCluster, KubeEventRecorder};
use orka_reconcile::{Controller, PassSummary};
use orka_store::MemoryCluster;
use serde::Serialize;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

mod manifest;

#[derive(Parser, Debug)]
#[command(name = "orkactl", version, about = "Orka workload controller CLI")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, global = true, default_value_t = Output::Human)]
    output: Output,

    /// Kubernetes namespace
    #[arg(long = "ns", global = true, env = "ORKA_NAMESPACE")]
    namespace: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum Output { Human, Json }

#[derive(Subcommand, Debug)]
enum Commands {
    /// Converge a manifest against an in-memory cluster, pass by pass
    Simulate {
        /// YAML file with one ReplicatedStateMachine and optional existing Pods
        #[arg(short = 'f', long = "file")]
        file: std::path::PathBuf,
        /// Maximum number of passes
        #[arg(long = "passes", default_value_t = 32)]
        passes: usize,
        /// Keep going after a pass that changed nothing
        #[arg(long = "no-stop", action = ArgAction::SetTrue)]
        no_stop: bool,
    },
    /// Run one reconciliation pass against the live cluster
    Reconcile {
        /// Workload name
        name: String,
    },
    /// Watch workloads and reconcile each change until Ctrl-C
    Run,
}

fn init_tracing() {
    let filter = std::env::var("ORKA_LOG")
        .ok()
        .and_then(|env| tracing_subscriber::EnvFilter::from_str(&env).ok())
        .unwrap_or_else(|| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("ORKA_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "controller metrics served over http"),
                Err(e) => tracing::warn!(error = %e, "controller metrics disabled: exporter install failed"),
            }
        } else {
            tracing::warn!(addr = %addr, "ORKA_METRICS_ADDR is not a socket address, controller metrics disabled");
        }
    }
}

#[derive(Serialize)]
struct PassRow {
    pass: usize,
    #[serde(flatten)]
    summary: PassSummary,
    units: Vec<String>,
}

fn print_summary(output: Output, s: &PassSummary) -> Result<()> {
    match output {
        Output::Human => println!(
            "{}: created={} updated={} patched={} deleted={} status={} tolerated={}{}",
            s.workload,
            s.created,
            s.updated,
            s.patched,
            s.deleted,
            s.status_updated,
            s.tolerated,
            if s.found { "" } else { " (not found)" }
        ),
        Output::Json => println!("{}", serde_json::to_string_pretty(s)?),
    }
    Ok(())
}

async fn simulate(output: Output, file: &std::path::Path, passes: usize, no_stop: bool) -> Result<()> {
    let text = std::fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let objects = manifest::parse(&text, Scheme::global())?;
    let root = manifest::workload(&objects)?;
    let key = root.key();
    info!(workload = %key, objects = objects.len(), "simulate invoked");

    let cluster = Arc::new(MemoryCluster::new());
    for obj in objects.iter().cloned() {
        cluster.seed(obj)?;
    }
    let ctl = Controller::new(cluster.clone(), Arc::new(TracingRecorder), ControllerConfig::from_env()?);

    let mut rows = Vec::new();
    if matches!(output, Output::Human) {
        println!("PASS  CREATED  PATCHED  DELETED  STATUS  UNITS");
    }
    for pass in 1..=passes {
        let summary = ctl.reconcile(&key).await?;
        let units = cluster.names(Kind::Pod, &key.namespace);
        let settled = summary.is_settled();
        if matches!(output, Output::Human) {
            println!(
                "{:<5} {:<8} {:<8} {:<8} {:<7} {}",
                pass,
                summary.created,
                summary.patched,
                summary.deleted,
                summary.status_updated,
                units.join(",")
            );
        }
        rows.push(PassRow { pass, summary, units });
        if (settled && !no_stop) || !rows.last().map(|r| r.summary.found).unwrap_or(true) {
            break;
        }
    }
    if matches!(output, Output::Json) {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    }
    if rows.last().is_some_and(|r| !r.summary.is_settled()) {
        warn!(passes, "stopped before the workload settled");
    }
    Ok(())
}

async fn reconcile_live(output: Output, namespace: &str, name: &str) -> Result<()> {
    info!(ns = %namespace, name = %name, "reconcile invoked");
    let config = ControllerConfig::from_env()?;
    let cluster = Arc::new(KubeCluster::try_default().await?);
    let recorder = Arc::new(KubeEventRecorder::new(cluster.client().clone(), &config.field_manager));
    let ctl = Controller::new(cluster, recorder, config);
    let summary = ctl.reconcile(&ObjectKey::new(Kind::ReplicatedStateMachine, namespace, name)).await?;
    print_summary(output, &summary)
}

async fn run(output: Output, namespace: Option<String>) -> Result<()> {
    let config = ControllerConfig::from_env()?;
    let cluster = Arc::new(KubeCluster::try_default().await?);
    let recorder = Arc::new(KubeEventRecorder::new(cluster.client().clone(), &config.field_manager));
    let ctl = Controller::new(cluster.clone(), recorder, config);
    let cap = std::env::var("ORKA_QUEUE_CAP").ok().and_then(|s| s.parse::<usize>().ok()).unwrap_or(2048);
    let (tx, mut rx) = mpsc::channel::<ObjectKey>(cap);

    let watcher_handle = tokio::spawn({
        let client = cluster.client().clone();
        async move {
            if let Err(e) = orka_kubehub::watch_workloads(client, namespace.as_deref(), tx).await {
                error!(error = ?e, "watcher failed");
            }
        }
    });

    loop {
        tokio::select! {
            maybe = rx.recv() => {
                let Some(key) = maybe else {
                    warn!("trigger channel closed; exiting run loop");
                    break;
                };
                match ctl.reconcile(&key).await {
                    Ok(s) if !s.is_settled() => print_summary(output, &s)?,
                    Ok(_) => {}
                    Err(e) => error!(workload = %key, error = %e, "pass failed"),
                }
            }
            _ = signal::ctrl_c() => {
                info!("Ctrl-C received; shutting down run loop");
                break;
            }
        }
    }
    watcher_handle.abort();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate { file, passes, no_stop } => simulate(cli.output, &file, passes, no_stop).await?,
        Commands::Reconcile { name } => {
            let ns = cli.namespace.as_deref().unwrap_or("default");
            reconcile_live(cli.output, ns, &name).await?;
        }
        Commands::Run => run(cli.output, cli.namespace).await?,
    }

    Ok(())
}

//! Runs a single tributary control plane over JSON lines.
//!
//! Commands are read from stdin, one JSON object per line, and applied in
//! micro-batches. Replies are written to stdout, one JSON object per line.
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

mod error;

use error::Result;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin, Stdout};
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;
use tributary_control_memory::MemoryControlBus;
use tributary_core::{
    ActionKind, Command, ControlPlane, ControlPlaneOptions, Reply, SinkFactory,
    StatusDeserializeError, StatusSerializeError, StreamStatus,
};
use tributary_locks::LockManager1;
use tributary_locks_memory::MemoryLockManager;
use tributary_query_engine_mock::{MockQueryEngine, MockQueryEngineOptions};
use tributary_registry::Registry1;
use tributary_registry_memory::MemoryRegistry;
use tributary_sink_memory::MemorySinks;

type StatusRegistry = MemoryRegistry<StreamStatus, StatusDeserializeError, StatusSerializeError>;
type Plane = ControlPlane<StatusRegistry, MockQueryEngine, MemoryControlBus, MemoryLockManager>;

#[derive(Clone, Debug, Parser)]
#[command(version, about, long_about = None)]
struct Args {
    /// Cluster name scoping registry keys and locks
    #[arg(long, default_value = "tributary", env = "TRIBUTARY_CLUSTER_NAME")]
    cluster_name: String,

    /// Largest number of commands applied as one batch
    #[arg(long, default_value_t = 64, env = "TRIBUTARY_BATCH_SIZE")]
    batch_size: usize,

    /// Milliseconds a batch stays open after its first command
    #[arg(long, default_value_t = 250, env = "TRIBUTARY_BATCH_INTERVAL_MS")]
    batch_interval_ms: u64,

    /// Seconds between status reports (0 disables them)
    #[arg(long, default_value_t = 60, env = "TRIBUTARY_STATUS_INTERVAL_SECS")]
    status_interval_secs: u64,

    /// Maximum log level
    #[arg(long, default_value_t = Level::INFO, env = "TRIBUTARY_LOG_LEVEL")]
    log_level: Level,

    /// Action kinds started without a sink, comma separated
    #[arg(
        long,
        value_delimiter = ',',
        value_parser = parse_action_kind,
        env = "TRIBUTARY_DISABLED_ACTIONS"
    )]
    disabled_actions: Vec<ActionKind>,
}

fn parse_action_kind(value: &str) -> std::result::Result<ActionKind, String> {
    serde_json::from_value(serde_json::Value::String(value.trim().to_uppercase()))
        .map_err(|_| format!("unknown action kind: {value}"))
}

fn build_plane(args: &Args, sinks: &MemorySinks) -> Plane {
    let registry = Registry1::scope(&StatusRegistry::new(), &args.cluster_name);
    let locks = LockManager1::scope(&MemoryLockManager::new(), &args.cluster_name);

    let factories: HashMap<ActionKind, Arc<dyn SinkFactory>> = ActionKind::ALL
        .into_iter()
        .filter(|kind| !args.disabled_actions.contains(kind))
        .map(|kind| (kind, Arc::new(sinks.clone()) as Arc<dyn SinkFactory>))
        .collect();

    ControlPlane::new(ControlPlaneOptions {
        registry,
        engine: MockQueryEngine::new(MockQueryEngineOptions::default()),
        control: MemoryControlBus::new(),
        locks,
        reserved_streams: Plane::default_reserved_streams(),
        sinks: factories,
    })
}

async fn write_reply(stdout: &mut Stdout, reply: &Reply) -> Result<()> {
    let mut line = serde_json::to_vec(reply)?;
    line.push(b'\n');
    stdout.write_all(&line).await?;
    stdout.flush().await?;

    Ok(())
}

fn decode(line: String) -> Option<Command> {
    if line.trim().is_empty() {
        return None;
    }

    match serde_json::from_str::<Command>(&line) {
        Ok(mut command) => {
            command.raw_payload = Some(line);
            Some(command)
        }
        Err(e) => {
            warn!(error = %e, payload = %line, "dropping undecodable command");
            None
        }
    }
}

/// Reads the next batch. Returns the batch and whether stdin is still open.
async fn next_batch(
    lines: &mut Lines<BufReader<Stdin>>,
    batch_size: usize,
    interval: Duration,
) -> Result<(Vec<Command>, bool)> {
    let mut batch = Vec::new();

    // The batch window opens with the first command.
    while batch.is_empty() {
        match lines.next_line().await? {
            Some(line) => batch.extend(decode(line)),
            None => return Ok((batch, false)),
        }
    }

    let deadline = tokio::time::sleep(interval);
    tokio::pin!(deadline);

    while batch.len() < batch_size {
        tokio::select! {
            () = &mut deadline => break,
            line = lines.next_line() => match line? {
                Some(line) => batch.extend(decode(line)),
                None => return Ok((batch, false)),
            },
        }
    }

    Ok((batch, true))
}

async fn serve(plane: Plane, args: Args) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    let interval = Duration::from_millis(args.batch_interval_ms);

    loop {
        let (batch, open) = next_batch(&mut lines, args.batch_size.max(1), interval).await?;

        if !batch.is_empty() {
            debug!(commands = batch.len(), "applying batch");

            for reply in plane.process_batch(&batch).await {
                write_reply(&mut stdout, &reply).await?;
            }
        }

        if !open {
            info!("stdin closed");
            return Ok(());
        }
    }
}

async fn report_status(plane: &Plane) -> Result<()> {
    let report = plane.status_report().await?;
    info!("status report\n{report}");

    Ok(())
}

fn spawn_status_reports(plane: Plane, every: Duration, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = report_status(&plane).await {
                        error!(error = %e, "status report failed");
                    }
                }
            }
        }
    });
}

#[tokio::main(worker_threads = 8)]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing::subscriber::set_global_default(
        FmtSubscriber::builder()
            .with_max_level(args.log_level)
            .with_writer(std::io::stderr)
            .finish(),
    )?;

    let sinks = MemorySinks::new();
    let plane = build_plane(&args, &sinks);
    let shutdown = CancellationToken::new();

    info!(
        cluster = %args.cluster_name,
        disabled = ?args.disabled_actions,
        "control plane ready"
    );

    if args.status_interval_secs > 0 {
        spawn_status_reports(
            plane.clone(),
            Duration::from_secs(args.status_interval_secs),
            shutdown.clone(),
        );
    }

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("shutting down");
            Ok(())
        }
        result = serve(plane.clone(), args) => result,
    };

    shutdown.cancel();
    plane.shutdown().await;
    report_status(&plane).await?;

    result
}

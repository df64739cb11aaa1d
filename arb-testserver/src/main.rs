#![cfg_attr(
    not(test),
    warn(clippy::print_stdout, clippy::dbg_macro),
    deny(clippy::unwrap_used, clippy::expect_used)
)]

use std::{net::IpAddr, path::PathBuf, time::Duration};

use rama::{
    error::BoxError,
    graceful::{self, ShutdownGuard},
    telemetry::tracing::{self, Instrument as _},
};

use clap::Parser;

use crate::simulator::{Mode, SimulatorConfig};

pub mod server;
pub mod simulator;
pub mod utils;

#[cfg(target_family = "unix")]
#[global_allocator]
static ALLOC: jemallocator::Jemalloc = jemallocator::Jemalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static ALLOC: mimalloc::MiMalloc = mimalloc::MiMalloc;


/// CLI arguments for configuring the test server.
#[derive(Debug, Clone, Parser)]
#[command(name = "arb-testserver")]
#[command(bin_name = "arb-testserver")]
#[command(version, about, long_about = None)]
pub struct Args {
    /// behavior of the simulated arbitrage bot
    #[arg(long, value_enum, default_value_t = Mode::Ok)]
    pub mode: Mode,

    /// base latency reported by a healthy bot, jittered per reading
    #[arg(long = "latency-ms", value_name = "MS", default_value_t = SimulatorConfig::DEFAULT_BASE_LATENCY_MS)]
    pub latency_ms: u32,

    /// port to bind the http server to (0 = pick a free port)
    #[arg(long, short = 'p', default_value_t = SimulatorConfig::DEFAULT_LISTEN_PORT)]
    pub port: u16,

    /// ip address to bind the http server to
    #[arg(long, value_name = "IP", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// seed all readings from a single rng, making a run reproducible
    #[arg(long, value_name = "N")]
    pub seed: Option<u64>,

    /// also log every served snapshot (debug); use RUST_LOG env for more options
    #[arg(long, short = 'v', default_value_t = false)]
    pub verbose: bool,

    /// enable pretty logging (format for humans)
    #[arg(long, default_value_t = false)]
    pub pretty: bool,

    /// write the tracing output to the provided (log) file instead of stderr
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,

    /// directory in which the bound server address is written (metrics.addr.txt)
    #[arg(long, short = 'D')]
    pub data: Option<PathBuf>,

    #[arg(long, value_name = "SECONDS", default_value_t = 1.)]
    /// the graceful shutdown timeout (<= 0.0 = no timeout)
    pub graceful: f64,
}

impl Args {
    pub fn simulator_config(&self) -> SimulatorConfig {
        SimulatorConfig {
            mode: self.mode,
            base_latency_ms: self.latency_ms,
            listen_port: self.port,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    utils::telemetry::init_tracing(&args)?;

    let base_shutdown_signal = graceful::default_signal();
    if let Err(err) = run_with_args(base_shutdown_signal, args).await {
        eprintln!("🚩 exit with error: {err}");
        std::process::exit(1);
    }

    Ok(())
}

/// Runs the test server and blocks until
/// a critical error occurs or the (graceful) shutdown has been initiated.
///
/// This entry point is used by both the (binary) `main` function as well as
/// for the e2e test suite found in the test module.
async fn run_with_args<F>(base_shutdown_signal: F, args: Args) -> Result<(), BoxError>
where
    F: Future<Output: Send + 'static> + Send + 'static,
{
    let graceful_timeout = (args.graceful > 0.).then(|| Duration::from_secs_f64(args.graceful));

    let (error_tx, error_rx) = tokio::sync::mpsc::channel::<BoxError>(1);
    let graceful = graceful::Shutdown::new(new_shutdown_signal(error_rx, base_shutdown_signal));

    graceful.spawn_task_fn(move |guard| run_metrics_http_server(args, guard, error_tx));

    let delay = match graceful_timeout {
        Some(duration) => graceful.shutdown_with_limit(duration).await?,
        None => graceful.shutdown().await,
    };

    tracing::info!("gracefully shutdown with a delay of: {delay:?}");
    Ok(())
}

async fn run_metrics_http_server(
    args: Args,
    guard: ShutdownGuard,
    error_tx: tokio::sync::mpsc::Sender<BoxError>,
) {
    tracing::info!(
        mode = %args.mode,
        latency_ms = args.latency_ms,
        port = args.port,
        "spawning metrics http server...",
    );
    if let Err(err) = server::metrics::run_metrics_http_server(args, guard)
        .instrument(tracing::debug_span!(
            "metrics server lifetime",
            server.service.name = utils::env::project_name(),
            otel.kind = "server",
            network.protocol.name = "http",
        ))
        .await
    {
        tracing::error!("metrics server exited with an error: {err}");
        let _ = error_tx.send(err).await;
    }
}

fn new_shutdown_signal(
    error_rx: tokio::sync::mpsc::Receiver<BoxError>,
    base_shutdown_signal: impl Future<Output: Send + 'static> + Send + 'static,
) -> impl Future + Send + 'static {
    async move {
        let mut mut_error_rx = error_rx;
        let mut signal = Box::pin(base_shutdown_signal);

        tokio::select! {
            _ = signal.as_mut() => {
                tracing::debug!("default signal triggered: init graceful shutdown");
            }
            err = mut_error_rx.recv() => {
                if let Some(err) = err {
                    tracing::error!("fatal err received: {err}; abort");
                } else {
                    tracing::info!("wait for default signal, no error was received");
                    signal.await;
                    tracing::debug!("default signal triggered: init graceful shutdown");
                }
            }
        }
    }
}

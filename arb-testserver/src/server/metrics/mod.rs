use std::{convert::Infallible, path::Path, sync::Arc, time::Duration};

use parking_lot::Mutex;
use rama::{
    Layer as _, Service,
    error::{BoxError, ErrorContext as _},
    graceful::ShutdownGuard,
    http::{
        Body, HeaderValue, Request, Response, StatusCode,
        headers::ContentType,
        layer::{required_header::AddRequiredResponseHeadersLayer, trace::TraceLayer},
        server::HttpServer,
        service::web::{
            Router,
            extract::State,
            response::{Headers, Html, IntoResponse},
        },
    },
    layer::TimeoutLayer,
    net::address::SocketAddress,
    rt::Executor,
    tcp::server::TcpListener,
    telemetry::tracing,
};
use rand::{SeedableRng as _, rngs::SmallRng};
use serde::Serialize;

use crate::{
    Args,
    simulator::{Clock as _, MetricsSnapshot, SimulatorConfig, SystemClock, generate_snapshot},
    utils::env::server_identifier,
};


pub const METRICS_PATH: &str = "/api/v1/metrics";

pub const METRICS_ADDRESS_FILE_NAME: &str = "metrics.addr.txt";

const INTERNAL_SERVER_ERROR_MESSAGE: &str = "Internal server error";

/// Shared (read-only) state of the metrics web service.
#[derive(Debug, Clone)]
pub struct MetricsState {
    config: SimulatorConfig,
    // when seeded all requests draw from one guarded rng,
    // otherwise each request uses the thread local rng
    seeded_rng: Option<Arc<Mutex<SmallRng>>>,
}

impl MetricsState {
    pub fn new(config: SimulatorConfig, seed: Option<u64>) -> Self {
        Self {
            config,
            seeded_rng: seed.map(|seed| Arc::new(Mutex::new(SmallRng::seed_from_u64(seed)))),
        }
    }

    #[inline(always)]
    pub fn config(&self) -> &SimulatorConfig {
        &self.config
    }

    fn next_snapshot(&self) -> MetricsSnapshot {
        match &self.seeded_rng {
            Some(rng) => generate_snapshot(&self.config, &SystemClock, &mut *rng.lock()),
            None => generate_snapshot(&self.config, &SystemClock, &mut rand::rng()),
        }
    }
}

/// Runs the metrics http server until the guard's shutdown is triggered.
pub async fn run_metrics_http_server(args: Args, guard: ShutdownGuard) -> Result<(), BoxError> {
    let config = args.simulator_config();
    let state = MetricsState::new(config, args.seed);

    tracing::info!(
        mode = %config.mode,
        base_latency_ms = config.base_latency_ms,
        seeded = args.seed.is_some(),
        "metrics simulator ready",
    );

    let http_svc = (
        TraceLayer::new_for_http(),
        AddRequiredResponseHeadersLayer::new()
            .with_server_header_value(HeaderValue::from_static(server_identifier())),
    )
        .into_layer(web_svc(state));

    let exec = Executor::graceful(guard);
    let http_server = HttpServer::auto(exec.clone()).service(Arc::new(http_svc));

    let tcp_svc = TimeoutLayer::new(Duration::from_secs(60)).into_layer(http_server);

    let tcp_listener = TcpListener::bind(SocketAddress::new(args.host, config.listen_port), exec)
        .await
        .context("bind metrics http server")
        .context_field("port", config.listen_port)?;

    let metrics_addr = tcp_listener
        .local_addr()
        .context("get bound address for metrics http server")?;

    tracing::info!("metrics http server bound to: {metrics_addr}");
    tracing::info!("metrics endpoint: http://{metrics_addr}{METRICS_PATH}");

    if let Some(data) = args.data.as_deref() {
        publish_metrics_address(data, metrics_addr.into()).await?;
    }

    tcp_listener.serve(tcp_svc).await;

    Ok(())
}

/// Publish the bound address as `<data>/metrics.addr.txt`,
/// so callers binding to port 0 can find the server.
async fn publish_metrics_address(data: &Path, addr: SocketAddress) -> Result<(), BoxError> {
    tokio::fs::create_dir_all(data)
        .await
        .context("create data directory")
        .with_context_debug_field("path", || data.to_owned())?;

    let path = data.join(METRICS_ADDRESS_FILE_NAME);
    tokio::fs::write(&path, addr.to_string())
        .await
        .context("write metrics address file")
        .context_field("address", addr)
        .with_context_debug_field("path", || path.clone())
}

/// Create the http service serving the synthetic metrics,
/// a status page and a liveness check.
pub fn web_svc(state: MetricsState) -> impl Service<Request, Output = Response, Error = Infallible> {
    let metrics_state = state.clone();
    Router::new_with_state(state)
        .with_get("/", status_page)
        .with_get("/ping", "pong")
        .with_get(METRICS_PATH, move |req: Request| {
            std::future::ready(serve_metrics(&metrics_state, &req))
        })
}

fn serve_metrics(state: &MetricsState, req: &Request) -> Response {
    // only the exact path is served, e.g. no trailing slash variant
    if req.uri().path() != METRICS_PATH {
        tracing::debug!(path = req.uri().path(), "reject non-canonical metrics path");
        return StatusCode::NOT_FOUND.into_response();
    }

    let snapshot = state.next_snapshot();
    tracing::debug!(
        s = snapshot.status,
        l = snapshot.latency_ms,
        a = snapshot.active_opportunities,
        b = snapshot.best_spread_bps,
        p = snapshot.pnl_cents,
        e = snapshot.error_count,
        ts = snapshot.timestamp_epoch_seconds,
        "served metrics snapshot",
    );
    json_response(&snapshot)
}

/// Encode `value` as a json response.
///
/// Encoding failures are logged and answered with a generic 500 response.
fn json_response<T: Serialize + ?Sized>(value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(payload) => (
            StatusCode::OK,
            Headers::single(ContentType::json()),
            Body::from(payload),
        )
            .into_response(),
        Err(err) => {
            tracing::error!("failed to encode json response: {err}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                INTERNAL_SERVER_ERROR_MESSAGE,
            )
                .into_response()
        }
    }
}

async fn status_page(State(state): State<MetricsState>) -> Html<String> {
    let config = state.config();

    let sample = MetricsSnapshot {
        status: MetricsSnapshot::STATUS_UP,
        latency_ms: 42,
        active_opportunities: 5,
        best_spread_bps: 25,
        pnl_cents: 1234,
        error_count: 0,
        timestamp_epoch_seconds: SystemClock.now_epoch_seconds(),
    };
    let sample_json = serde_json::to_string_pretty(&sample).unwrap_or_default();

    Html(format!(
        r##"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width,initial-scale=1">
<title>ARB Test Server</title>
<style>
html,body{{height:100%}}body{{margin:0;font:16px/1.45 system-ui,-apple-system,Segoe UI,Roboto,Helvetica,Arial;background:#f5f5f5;color:#222;display:grid;place-items:center}}
main{{width:min(600px,92vw);background:#fff;padding:30px;border-radius:8px;box-shadow:0 2px 4px rgba(0,0,0,.1)}}
h1{{margin:0 0 16px;font-weight:800;letter-spacing:-.02em}}
.info{{background:#e7f3ff;padding:15px;border-radius:4px;margin:20px 0}}
.metrics{{background:#f0f0f0;padding:15px;border-radius:4px}}
pre{{margin:0;font-family:ui-monospace,SFMono-Regular,Menlo,Monaco,Consolas,monospace}}
a{{color:#007bff;text-decoration:none}}a:hover{{text-decoration:underline}}
</style>
</head>
<body>
<main>
<h1>ARB Test Server</h1>
<div class="info">
<strong>Mode:</strong> {mode}<br>
<strong>Base Latency:</strong> {base_latency_ms}ms<br>
<strong>Port:</strong> {port}
</div>
<h2>API Endpoint</h2>
<p><a href="{METRICS_PATH}">{METRICS_PATH}</a></p>
<h2>Sample Response</h2>
<div class="metrics"><pre>{sample_json}</pre></div>
</main>
</body>
</html>
"##,
        mode = config.mode,
        base_latency_ms = config.base_latency_ms,
        port = config.listen_port,
    ))
}

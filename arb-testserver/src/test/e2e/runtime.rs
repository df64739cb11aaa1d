use std::{io::ErrorKind, path::PathBuf, sync::Arc, time::Duration};

use clap::Parser;
use rama::{
    Service,
    error::BoxError,
    http::{Request, Response},
    net::address::SocketAddress,
};
use tempfile::TempDir;

use crate::{
    Args,
    server::metrics::{METRICS_ADDRESS_FILE_NAME, METRICS_PATH},
};

#[derive(Clone)]
pub(super) struct Runtime {
    // dropped together with the last clone, removing the data dir
    _data_dir: Arc<TempDir>,

    metrics_addr: SocketAddress,
}

impl Runtime {
    #[inline(always)]
    pub fn metrics_socket_addr(&self) -> SocketAddress {
        self.metrics_addr
    }

    #[inline(always)]
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{path}", self.metrics_addr)
    }

    #[inline(always)]
    pub fn metrics_url(&self) -> String {
        self.url(METRICS_PATH)
    }

    #[inline(always)]
    pub fn client(&self) -> impl Service<Request, Output = Response, Error = BoxError> {
        super::client::new_web_client()
    }
}

/// Spawn a new test server on a free loopback port,
/// running on its own runtime until the test process exits.
pub(super) async fn spawn_with_args(extra_args: &[&str]) -> Runtime {
    let data_dir = spawn_arb_testserver_app_with_args(extra_args);

    let metrics_addr = tokio::time::timeout(
        Duration::from_secs(60),
        read_file_or_wait(data_dir.path().join(METRICS_ADDRESS_FILE_NAME)),
    )
    .await
    .unwrap();

    let runtime = Runtime {
        _data_dir: Arc::new(data_dir),
        metrics_addr,
    };

    assert!(runtime.metrics_socket_addr().ip_addr.is_loopback());

    runtime
}

async fn read_file_or_wait(path: PathBuf) -> SocketAddress {
    loop {
        match tokio::fs::read_to_string(&path).await {
            Ok(s) => {
                let s = s.trim();
                if s.is_empty() {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                }
                match s.parse() {
                    Ok(addr) => return addr,
                    Err(err) => {
                        eprintln!("unexpected error parsing socket addr (content={s:?}): {err}");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                }
            }
            Err(err) => {
                if err.kind() == ErrorKind::NotFound {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    continue;
                } else {
                    panic!("unexpected error: {err}");
                }
            }
        }
    }
}

fn spawn_arb_testserver_app_with_args(extra_args: &[&str]) -> TempDir {
    let data_dir = tempfile::Builder::new()
        .prefix("arb_testserver_app_e2e")
        .tempdir()
        .unwrap();
    eprintln!("arb_testserver_app_e2e data stored under: {:?}", data_dir.path());

    let data_dir_str = data_dir.path().display().to_string();

    let mut argv: Vec<&str> = vec![
        crate::utils::env::project_name(),
        "--host",
        "127.0.0.1",
        "--port",
        "0",
        "--data",
        &data_dir_str,
        "--graceful",
        "0.42",
    ];
    argv.extend(extra_args);

    let args = Args::try_parse_from(argv).unwrap();

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();

        rt.block_on(async move {
            if let Err(err) = crate::run_with_args(std::future::pending::<()>(), args).await {
                eprintln!("arb-testserver e2e app exited with error: {err}");
            }
        });
    });

    data_dir
}

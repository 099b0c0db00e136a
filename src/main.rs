use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use healthwatch::cli::{Cli, Command};
use healthwatch::config::{self, ValidatedConfig};
use healthwatch::core::history::HistoryWriter;
use healthwatch::core::metrics::Metrics;
use healthwatch::core::metrics_server;
use healthwatch::core::pool::WorkerPool;
use healthwatch::core::probe::IsahcTransport;
use healthwatch::core::retry::run_with_retries;
use healthwatch::core::scheduler::Orchestrator;
use healthwatch::core::snapshot::{build_snapshot, SnapshotWriter};
use healthwatch::core::types::ServiceRuntime;
use healthwatch::logging::Logger;
use tokio_util::sync::CancellationToken;

/// Default bind address for the `/metrics` and `/health` exposition
/// endpoint. Process-local only; never exposed beyond the host.
const METRICS_ADDR: &str = "127.0.0.1:9090";
const SNAPSHOT_FILENAME: &str = "status.json";

#[tokio::main(flavor = "multi_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();

    match cli.command {
        Command::Validate { config } => run_validate(&config),
        Command::Run { config } => run_serve(&config).await,
        Command::Snapshot { config } => run_snapshot(&config).await,
    }
}

fn run_validate(path: &Path) -> ExitCode {
    if config::validate_cli(path) {
        println!("configuration is valid");
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn load_or_exit(path: &Path) -> Result<ValidatedConfig, ExitCode> {
    config::load_from_path(path).map_err(|err| {
        match &err {
            config::ConfigError::Violations(violations) => {
                eprintln!("configuration validation failed:");
                for violation in violations {
                    eprintln!("  - {violation}");
                }
            }
            other => eprintln!("{other}"),
        }
        ExitCode::FAILURE
    })
}

async fn run_serve(path: &Path) -> ExitCode {
    let cfg = match load_or_exit(path) {
        Ok(cfg) => cfg,
        Err(code) => return code,
    };

    let logger = Logger::new("healthwatch", env_label());
    let metrics = Arc::new(Metrics::new().expect("metrics registry must construct"));

    let transport = match IsahcTransport::new() {
        Ok(t) => Arc::new(t),
        Err(err) => {
            eprintln!("failed to build HTTP transport: {err}");
            return ExitCode::FAILURE;
        }
    };

    let pool_size = config::effective_pool_size(&cfg.settings);
    let pool = WorkerPool::spawn(pool_size, transport);

    let history_path = Path::new(&cfg.settings.history_file).to_path_buf();
    let snapshot_path = Path::new(&cfg.settings.output_dir).join(SNAPSHOT_FILENAME);
    let history = HistoryWriter::new(history_path);
    let snapshot = SnapshotWriter::new(snapshot_path);

    let cancellation = CancellationToken::new();
    let metrics_for_server = Arc::clone(&metrics);
    let metrics_cancellation = cancellation.clone();
    let metrics_task = tokio::spawn(async move {
        serve_metrics(metrics_for_server, metrics_cancellation).await;
    });

    let shutdown_cancellation = cancellation.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        shutdown_cancellation.cancel();
    });

    logger.info(
        "main",
        "starting orchestrator",
        None,
        serde_json::json!({
            "services": cfg.services.len(),
            "worker_pool_size": pool_size,
        }),
    );

    let orchestrator = Orchestrator::new(
        cfg.services,
        cfg.settings,
        pool,
        history,
        snapshot,
        metrics,
        logger,
    );
    orchestrator.run(cancellation).await;

    metrics_task.abort();
    ExitCode::SUCCESS
}

/// Run exactly one probe cycle against every configured service and write
/// the resulting snapshot, without starting the scheduler's tick loop. Used
/// by external smoke-test flows that just want a fresh status file.
async fn run_snapshot(path: &Path) -> ExitCode {
    let cfg = match load_or_exit(path) {
        Ok(cfg) => cfg,
        Err(code) => return code,
    };

    let transport = match IsahcTransport::new() {
        Ok(t) => t,
        Err(err) => {
            eprintln!("failed to build HTTP transport: {err}");
            return ExitCode::FAILURE;
        }
    };

    let mut runtimes = std::collections::HashMap::new();
    for service in &cfg.services {
        let timeout_ms = service.effective_timeout_ms(&cfg.settings);
        let warning_ms = service.effective_warning_threshold_ms(&cfg.settings);
        let outcome = run_with_retries(
            &transport,
            service,
            timeout_ms,
            warning_ms,
            cfg.settings.max_retries,
        )
        .await;

        let mut runtime = ServiceRuntime::new_pending();
        runtime.apply_result(&outcome.result);
        runtimes.insert(service.name.clone(), runtime);
    }

    let entries = build_snapshot(&cfg.services, &runtimes);
    let snapshot_path = Path::new(&cfg.settings.output_dir).join(SNAPSHOT_FILENAME);
    let writer = SnapshotWriter::new(snapshot_path);

    match writer.write(&entries).await {
        Ok(()) => {
            println!("snapshot written to {}", writer.path().display());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("failed to write snapshot: {err}");
            ExitCode::FAILURE
        }
    }
}

async fn serve_metrics(metrics: Arc<Metrics>, cancellation: CancellationToken) {
    let listener = match tokio::net::TcpListener::bind(METRICS_ADDR).await {
        Ok(listener) => listener,
        Err(err) => {
            eprintln!("failed to bind metrics endpoint on {METRICS_ADDR}: {err}");
            return;
        }
    };

    let app = metrics_server::router(metrics);
    let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
        cancellation.cancelled().await;
    });

    if let Err(err) = serve.await {
        eprintln!("metrics server error: {err}");
    }
}

/// Waits for either Ctrl-C or, on Unix, SIGTERM, whichever arrives first.
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

fn env_label() -> &'static str {
    match std::env::var("HEALTHWATCH_ENV") {
        Ok(v) if v.eq_ignore_ascii_case("production") => "production",
        _ => "development",
    }
}

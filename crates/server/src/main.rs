// mikroscoped: log sidecar daemon.
//
// Startup order matters: preflight, store, indexer, one synchronous index
// pass (so /health reflects current state immediately), one maintenance
// pass, then timers, alerting, and finally the listener.

use chrono::Utc;
use mikroscope_server::http::{build_router, AppState};
use mikroscope_server::indexer::IndexMode;
use mikroscope_server::{
    AlertManager, IndexStore, Indexer, IngestQueue, MaintenanceLoop, Protocol, QueryService,
    ServerConfig,
};
use std::sync::Arc;

const USAGE: &str = "mikroscoped - log sidecar

USAGE:
    mikroscoped [OPTIONS]

Common options (every option is also available as MIKROSCOPE_* environment
variables and as camelCase keys in the --config JSON file):
    --config <path>              JSON config file
    --db-path <path>             index database file (default data/mikroscope.db)
    --logs-path <path>           NDJSON logs root (default logs)
    --host <host>                bind host (default 0.0.0.0)
    --port <port>                bind port (default 8686)
    --protocol <http|https>      https requires --tls-cert-path and --tls-key-path
    --api-token <token>          bearer token for the /api routes
    --ingest-producers <list>    comma list of token=producerId pairs
    --ingest-async-queue         queue ingest batches instead of writing inline
    --disable-auto-ingest        disable the periodic incremental index pass
    --version                    print version and exit
    --help                       print this help and exit
";

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mikroscope_server=info".into()),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|a| a == "--version" || a == "-V") {
        println!("mikroscoped {}", env!("CARGO_PKG_VERSION"));
        return;
    }
    if args.iter().any(|a| a == "--help" || a == "-h") {
        print!("{}", USAGE);
        return;
    }

    if let Err(e) = run(&args).await {
        tracing::error!("startup failed: {}", e);
        std::process::exit(1);
    }
}

async fn run(args: &[String]) -> Result<(), Box<dyn std::error::Error>> {
    let config = ServerConfig::resolve(args)?;

    mikroscope_server::run_preflight(
        &config.db_path,
        &config.logs_path,
        config.min_free_bytes,
    )?;

    let store = Arc::new(IndexStore::open(&config.db_path)?);
    let indexer = Arc::new(Indexer::new(store.clone(), config.logs_path.clone()));
    let query = Arc::new(QueryService::new(store.clone()));
    let alerts = Arc::new(AlertManager::new(
        query.clone(),
        config.resolved_alert_config_path(),
        config.alert_seed(),
    ));
    let maintenance = Arc::new(MaintenanceLoop::new(
        store.clone(),
        config.logs_path.clone(),
        config.retention(),
    ));

    tracing::info!("database: {}", config.db_path.display());
    tracing::info!("logs root: {}", config.logs_path.display());

    if let Some(report) = indexer.run(IndexMode::Incremental)? {
        tracing::info!(
            "initial index pass: {} files, {} inserted, {} skipped, {} parse errors",
            report.files_scanned,
            report.records_inserted,
            report.records_skipped,
            report.parse_errors
        );
    }

    let queue = if config.ingest_async_queue {
        Some(Arc::new(IngestQueue::new(
            config.logs_path.clone(),
            indexer.clone(),
            config.ingest_queue_flush_ms,
        )))
    } else {
        None
    };

    maintenance.run_once(Utc::now());
    let maintenance_timer = {
        let maintenance = maintenance.clone();
        let interval = config.maintenance_interval_ms;
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_millis(interval)).await;
                maintenance.run_once(Utc::now());
            }
        })
    };

    let auto_ingest_timer = if config.disable_auto_ingest {
        None
    } else {
        let indexer = indexer.clone();
        let interval = config.ingest_interval_ms;
        Some(tokio::spawn(async move {
            loop {
                tokio::time::sleep(std::time::Duration::from_millis(interval)).await;
                if let Err(e) = indexer.run(IndexMode::Incremental) {
                    tracing::warn!("auto-ingest pass failed: {}", e);
                }
            }
        }))
    };

    alerts.set_service_url(config.service_url());
    alerts.start();

    let state = Arc::new(AppState {
        store,
        indexer,
        query,
        alerts: alerts.clone(),
        maintenance,
        queue: queue.clone(),
        started_at: Utc::now(),
        config: config.clone(),
    });
    let app = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    match config.protocol {
        Protocol::Http => {
            let listener = tokio::net::TcpListener::bind(&addr).await?;
            tracing::info!("mikroscope listening on http://{}", addr);
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal())
                .await?;
        }
        Protocol::Https => {
            let cert = config.tls_cert_path.clone().expect("validated in config");
            let key = config.tls_key_path.clone().expect("validated in config");
            let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key).await?;
            let handle = axum_server::Handle::new();
            {
                let handle = handle.clone();
                tokio::spawn(async move {
                    shutdown_signal().await;
                    handle.graceful_shutdown(Some(std::time::Duration::from_secs(5)));
                });
            }
            let socket_addr: std::net::SocketAddr = addr.parse()?;
            tracing::info!("mikroscope listening on https://{}", addr);
            axum_server::bind_rustls(socket_addr, tls)
                .handle(handle)
                .serve(app.into_make_service())
                .await?;
        }
    }

    // Orderly teardown: timers first, then alerting, then a final queue
    // drain so queued batches land on disk before the store goes away.
    maintenance_timer.abort();
    if let Some(timer) = auto_ingest_timer {
        timer.abort();
    }
    alerts.stop();
    if let Some(queue) = &queue {
        queue.drain_for_shutdown();
    }
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to listen for ctrl+c");
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
    tracing::info!("shutdown signal received");
}

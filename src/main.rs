use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use deliverus::config::{Cli, Config, default_config_dir, default_config_path};
use deliverus::db::Database;
use deliverus::handler::AppState;
use deliverus::routes;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let args = Cli::parse();

    // The database lives next to the config file.
    let (config_path, data_dir) = match args.config_path {
        Some(path) => {
            let path = std::path::PathBuf::from(path);
            let dir = path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| std::path::PathBuf::from("."));
            (path, dir)
        }
        None => (default_config_path(), default_config_dir()),
    };

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
    tracing::info!("deliverus.svc starting");

    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(error = %e, path = ?data_dir, "failed to create data directory");
        std::process::exit(1);
    }

    let cfg = Config::new(&config_path.to_string_lossy()).unwrap_or_else(|e| {
        tracing::error!(error = %e, path = ?config_path, "failed to load config file");
        std::process::exit(1);
    });
    let db = Arc::new(Database::new(&cfg, &data_dir).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup database");
        std::process::exit(1);
    }));

    let address = format!("0.0.0.0:{}", cfg.app.get_port());
    let cancellation_token = CancellationToken::new();

    let sync_task = if db.is_replica() {
        let sync_db = db.clone();
        let sync_token = cancellation_token.clone();
        let period = Duration::from_secs(cfg.app.sync_interval_seconds.max(1));
        Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = sync_db.sync().await {
                            tracing::warn!("failed to sync replica: {}", e);
                        }
                    }
                    _ = sync_token.cancelled() => {
                        tracing::info!("replica sync task shutting down");
                        break;
                    }
                }
            }
        }))
    } else {
        None
    };

    tracing::info!(limit = cfg.app.get_highlight_limit(), "highlight limit configured");
    let app = routes::app(AppState::new(db, cfg.app.get_highlight_limit()));

    let listener = tokio::net::TcpListener::bind(&address).await.unwrap_or_else(|e| {
        tracing::error!(error = %e, "failed to setup tcp listener");
        std::process::exit(1);
    });

    tracing::info!("deliverus.svc running on {}", &address);
    let shutdown_token = cancellation_token.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("ctrl+c signal received, preparing to shutdown");
            }
            _ = shutdown_token.cancelled() => {}
        }
    });

    if let Err(err) = server.await {
        tracing::error!(error = %err, "server error");
    }

    cancellation_token.cancel();
    if let Some(task) = sync_task {
        let _ = task.await;
    }
    tracing::info!("deliverus.svc going off, graceful shutdown complete");
}

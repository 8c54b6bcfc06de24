//! upwatch - Endpoint Uptime Monitor
//!
//! Periodically checks HTTP, TCP and UDP endpoints, keeps their check
//! history and sends chat notifications on outages and expiring certificates.

mod config;
mod db;
mod monitor;
mod notify;
mod probe;
mod scheduler;
mod store;
mod system;
mod web;

use config::ServerConfig;
use db::{spawn_saver, Database, SaveHandle, Snapshot};
use monitor::MonitorEngine;
use notify::{NotificationSink, TelegramTransport};
use probe::CheckExecutor;
use scheduler::Scheduler;
use store::{HistoryStore, ServiceStore};
use system::{ResourceAlertMonitor, SysinfoSampler};
use web::{AppState, Server};

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn take_snapshot(
    services: &ServiceStore,
    notifier: &NotificationSink,
    resources: &ResourceAlertMonitor,
) -> Snapshot {
    Snapshot {
        services: services.export(),
        histories: services.history().export(),
        notification: notifier.config(),
        alerts: resources.config(),
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("upwatch=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting upwatch on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let db = Arc::new(Database::open_or_recover(&cfg.db_path)?);
    let snapshot = db.load().unwrap_or_else(|e| {
        tracing::error!("Failed to load saved state, starting empty: {}", e);
        Snapshot::default()
    });
    let (save, save_rx) = SaveHandle::channel();

    // Stores
    let history = Arc::new(HistoryStore::new(cfg.history_limit));
    history.import(snapshot.histories);
    let services = Arc::new(ServiceStore::new(history).with_save_hook(save.clone()));
    services.import(snapshot.services);
    tracing::info!("Database initialized, {} endpoints loaded", services.len());

    // Notifications
    let (notifier, dispatcher) =
        NotificationSink::new(snapshot.notification, Arc::new(TelegramTransport::new()?));
    let notifier = Arc::new(notifier.with_save_hook(save.clone()));
    tokio::spawn(dispatcher.run());

    let resources = Arc::new(
        ResourceAlertMonitor::new(snapshot.alerts, notifier.clone(), Arc::new(SysinfoSampler::new()))
            .with_save_hook(save),
    );

    let saver = {
        let services = services.clone();
        let notifier = notifier.clone();
        let resources = resources.clone();
        spawn_saver(db.clone(), save_rx, move || {
            take_snapshot(&services, &notifier, &resources)
        })
    };

    // Engine and scheduler
    let engine = Arc::new(MonitorEngine::new(
        Arc::new(CheckExecutor::new()),
        services.clone(),
        notifier.clone(),
    ));
    let scheduler = Scheduler::new(engine.clone(), cfg.check_interval());
    scheduler.start()?;

    // Start web server
    let server = Server::new(
        cfg,
        AppState {
            engine,
            notifier: notifier.clone(),
            resources: resources.clone(),
        },
    );
    let served = server.start(shutdown_signal()).await;

    scheduler.stop().await;
    saver.abort();
    if let Err(e) = db.save(&take_snapshot(&services, &notifier, &resources)) {
        tracing::error!("Failed to save state on shutdown: {}", e);
    }
    tracing::info!("Shutdown complete");

    served
}

//! Web server module.

mod handlers;

pub use handlers::*;

use crate::config::ServerConfig;
use crate::monitor::MonitorEngine;
use crate::notify::NotificationSink;
use crate::system::ResourceAlertMonitor;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<MonitorEngine>,
    pub notifier: Arc<NotificationSink>,
    pub resources: Arc<ResourceAlertMonitor>,
}

/// Build the router with all routes.
pub fn routes(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(
            "/api/services",
            get(handlers::list_services).post(handlers::create_service),
        )
        .route(
            "/api/services/{id}",
            get(handlers::get_service)
                .put(handlers::update_service)
                .delete(handlers::delete_service),
        )
        .route("/api/services/{id}/check", post(handlers::check_service))
        .route("/api/services/{id}/statistics", get(handlers::service_statistics))
        .route("/api/services/{id}/history", get(handlers::service_history))
        .route(
            "/api/telegram/config",
            get(handlers::get_telegram_config).put(handlers::update_telegram_config),
        )
        .route("/api/telegram/test", post(handlers::test_telegram))
        .route("/api/system/info", get(handlers::system_info))
        .route(
            "/api/system/alerts",
            get(handlers::get_system_alerts).put(handlers::update_system_alerts),
        )
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(1024 * 1024)) // 1MB
        .with_state(state)
}

/// Web server for the monitoring API.
pub struct Server {
    config: ServerConfig,
    state: AppState,
}

impl Server {
    pub fn new(config: ServerConfig, state: AppState) -> Self {
        Self { config, state }
    }

    /// Serve on the configured port until `shutdown` resolves.
    pub async fn start<F>(&self, shutdown: F) -> Result<(), Box<dyn std::error::Error + Send + Sync>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let router = routes(self.state.clone());

        tracing::info!("Web server listening on {}", addr);

        let listener = tokio::net::TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::{enabled_config, sink};
    use crate::probe::{CheckResult, Checker};
    use crate::store::{HistoryStore, MonitoredEndpoint, ServiceStatus, ServiceStore};
    use crate::system::{HostSampler, HostSnapshot, SystemAlertConfig};
    use chrono::Utc;
    use serde_json::{json, Value};

    struct AlwaysUp;

    #[async_trait::async_trait]
    impl Checker for AlwaysUp {
        async fn check(&self, endpoint: &MonitoredEndpoint) -> CheckResult {
            CheckResult {
                endpoint_id: endpoint.id.clone(),
                status: ServiceStatus::Up,
                response_time: 7,
                error_message: String::new(),
                checked_at: Utc::now(),
                certificate: None,
            }
        }
    }

    struct EmptyHost;

    impl HostSampler for EmptyHost {
        fn sample(&self) -> HostSnapshot {
            HostSnapshot {
                hostname: "testhost".to_string(),
                ..Default::default()
            }
        }
    }

    async fn serve() -> String {
        let services = Arc::new(ServiceStore::new(Arc::new(HistoryStore::new(100))));
        let (notifier, _dispatcher) = sink(enabled_config());
        let resources = Arc::new(ResourceAlertMonitor::new(
            SystemAlertConfig::default(),
            notifier.clone(),
            Arc::new(EmptyHost),
        ));
        let state = AppState {
            engine: Arc::new(MonitorEngine::new(Arc::new(AlwaysUp), services, notifier.clone())),
            notifier,
            resources,
        };

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, routes(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_service_lifecycle() {
        let base = serve().await;
        let client = reqwest::Client::new();

        let created = client
            .post(format!("{}/api/services", base))
            .json(&json!({"name": "api", "check_type": "http", "url": "http://example.test"}))
            .send()
            .await
            .unwrap();
        assert_eq!(created.status(), 201);
        let created: Value = created.json().await.unwrap();
        let id = created["id"].as_str().unwrap().to_string();
        assert_eq!(created["status"], "up");
        assert_eq!(created["check_interval"], 60);

        let listed: Value = client
            .get(format!("{}/api/services", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);

        let updated: Value = client
            .put(format!("{}/api/services/{}", base, id))
            .json(&json!({"name": "db", "check_type": "tcp", "host": "10.0.0.5", "port": 5432}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(updated["name"], "db");
        assert_eq!(updated["check_type"], "tcp");
        assert_eq!(updated["status"], "up");
        assert_eq!(updated["created_at"], created["created_at"]);

        let checked = client
            .post(format!("{}/api/services/{}/check", base, id))
            .send()
            .await
            .unwrap();
        assert_eq!(checked.status(), 200);

        let history: Value = client
            .get(format!("{}/api/services/{}/history", base, id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(history["checks"].as_array().unwrap().len(), 2);

        let stats: Value = client
            .get(format!("{}/api/services/{}/statistics", base, id))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(stats["total_checks"], 2);

        let deleted = client
            .delete(format!("{}/api/services/{}", base, id))
            .send()
            .await
            .unwrap();
        assert_eq!(deleted.status(), 200);

        let missing = client
            .get(format!("{}/api/services/{}", base, id))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 404);
    }

    #[tokio::test]
    async fn test_validation_errors() {
        let base = serve().await;
        let client = reqwest::Client::new();

        for body in [
            json!({"name": "", "check_type": "http", "url": "http://x"}),
            json!({"name": "a", "check_type": "http", "url": ""}),
            json!({"name": "a", "check_type": "tcp", "host": "h", "port": 0}),
            json!({"name": "a", "check_type": "smtp", "host": "h", "port": 25}),
        ] {
            let response = client
                .post(format!("{}/api/services", base))
                .json(&body)
                .send()
                .await
                .unwrap();
            assert_eq!(response.status(), 400, "body {}", body);
            let error: Value = response.json().await.unwrap();
            assert!(error["error"].is_string());
        }

        let missing = client
            .post(format!("{}/api/services/nope/check", base))
            .send()
            .await
            .unwrap();
        assert_eq!(missing.status(), 404);
    }

    #[tokio::test]
    async fn test_create_without_check_type_is_http() {
        let base = serve().await;
        let client = reqwest::Client::new();

        let created = client
            .post(format!("{}/api/services", base))
            .json(&json!({"name": "legacy", "url": "http://example.test"}))
            .send()
            .await
            .unwrap();
        assert_eq!(created.status(), 201);
        let created: Value = created.json().await.unwrap();
        assert_eq!(created["check_type"], "http");
        assert_eq!(created["url"], "http://example.test");
    }

    #[tokio::test]
    async fn test_settings_endpoints() {
        let base = serve().await;
        let client = reqwest::Client::new();

        let config: Value = client
            .put(format!("{}/api/telegram/config", base))
            .json(&json!({"bot_token": "123456789:ABCDEFGHIJ", "chat_id": "42", "enabled": true}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(config["config"]["bot_token"], "12345...FGHIJ");

        let alerts: Value = client
            .put(format!("{}/api/system/alerts", base))
            .json(&json!({"disk_space_threshold": 70.0, "cpu_threshold": 95.0, "memory_threshold": 85.0, "enabled": false}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(alerts["cpu_threshold"], 95.0);
        assert_eq!(alerts["enabled"], false);

        let info: Value = client
            .get(format!("{}/api/system/info", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(info["hostname"], "testhost");
    }
}

//! Monitoring engine.
//!
//! Applies check results to stored endpoints, records history and raises
//! notifications on status transitions and certificate expiry.

use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use crate::notify::{Event, NotificationSink};
use crate::probe::{CheckResult, Checker};
use crate::store::{
    CertificateInfo, CheckRecord, EndpointSpec, HistoryLog, MonitoredEndpoint, ServiceStatus,
    ServiceStore, Statistics, StoreError,
};

/// Certificates expiring within this many days trigger an alert.
pub const CERT_EXPIRY_WARNING_DAYS: i64 = 30;

pub struct MonitorEngine {
    checker: Arc<dyn Checker>,
    services: Arc<ServiceStore>,
    notifier: Arc<NotificationSink>,
}

impl MonitorEngine {
    pub fn new(
        checker: Arc<dyn Checker>,
        services: Arc<ServiceStore>,
        notifier: Arc<NotificationSink>,
    ) -> Self {
        Self {
            checker,
            services,
            notifier,
        }
    }

    #[cfg(test)]
    pub fn services(&self) -> &Arc<ServiceStore> {
        &self.services
    }

    /// Fold a check result into the stored endpoint.
    ///
    /// The read of the previous status and the write of the new one happen
    /// under the store's write lock. Notifications are queued after it is
    /// released.
    pub fn apply_result(&self, result: CheckResult) -> Result<MonitoredEndpoint, StoreError> {
        let history = self.services.history().clone();

        let (updated, events) = self.services.update(&result.endpoint_id, |endpoint| {
            let previous = endpoint.status;
            let mut events = Vec::new();

            endpoint.status = result.status;
            endpoint.last_check = Some(result.checked_at);
            endpoint.response_time = result.response_time;
            endpoint.error_message = result.error_message.clone();

            if let Some(cert) = &result.certificate {
                let mut alert_sent = endpoint
                    .certificate
                    .as_ref()
                    .map(|c| c.alert_sent)
                    .unwrap_or(false);

                if cert.days_left > 0 && cert.days_left <= CERT_EXPIRY_WARNING_DAYS {
                    if !alert_sent {
                        events.push(Event::CertificateExpiring {
                            name: endpoint.name.clone(),
                            target: endpoint.target.to_string(),
                            days_left: cert.days_left,
                            expires_at: cert.expires_at,
                            issuer: cert.issuer.clone(),
                        });
                        alert_sent = true;
                    }
                } else if cert.days_left > CERT_EXPIRY_WARNING_DAYS {
                    alert_sent = false;
                }

                endpoint.certificate = Some(CertificateInfo {
                    expires_at: cert.expires_at,
                    issuer: cert.issuer.clone(),
                    days_left: cert.days_left,
                    alert_sent,
                });
            }

            history.add_check_record(
                &endpoint.id,
                CheckRecord {
                    timestamp: result.checked_at,
                    status: result.status,
                    response_time: result.response_time,
                    error_message: result.error_message.clone(),
                },
            );

            match (previous, result.status) {
                (ServiceStatus::Down, ServiceStatus::Up) => events.push(Event::ServiceRecovered {
                    name: endpoint.name.clone(),
                    target: endpoint.target.to_string(),
                    response_time: result.response_time,
                    at: result.checked_at,
                }),
                (ServiceStatus::Up | ServiceStatus::Unknown, ServiceStatus::Down) => {
                    events.push(Event::ServiceDown {
                        name: endpoint.name.clone(),
                        target: endpoint.target.to_string(),
                        error: result.error_message.clone(),
                        at: result.checked_at,
                    })
                }
                _ => {}
            }

            match result.status {
                ServiceStatus::Up => endpoint.last_uptime = Some(result.checked_at),
                ServiceStatus::Down => endpoint.last_downtime = Some(result.checked_at),
                ServiceStatus::Unknown => {}
            }

            (endpoint.clone(), events)
        })?;

        for event in events {
            match &event {
                Event::ServiceDown { error, .. } => {
                    tracing::warn!("Service {} is down: {}", updated.name, error)
                }
                Event::ServiceRecovered { .. } => tracing::info!("Service {} recovered", updated.name),
                Event::CertificateExpiring { days_left, .. } => tracing::warn!(
                    "Certificate for {} expires in {} days",
                    updated.name,
                    days_left
                ),
                Event::ResourceThreshold(_) => {}
            }
            self.notifier.notify(event, &updated.notifications);
        }

        Ok(updated)
    }

    /// Check one endpoint now and return its updated state.
    pub async fn run_check(&self, id: &str) -> Result<MonitoredEndpoint, StoreError> {
        let endpoint = self.services.get(id)?;
        let result = self.checker.check(&endpoint).await;
        self.apply_result(result)
    }

    /// Check every endpoint in turn.
    pub async fn check_all(&self) {
        let endpoints = self.services.all();
        tracing::debug!("Checking {} endpoints", endpoints.len());

        for endpoint in endpoints {
            let result = self.checker.check(&endpoint).await;
            if let Err(e) = self.apply_result(result) {
                // Deleted while its check was in flight.
                tracing::debug!("Discarding check result: {}", e);
            }
        }
    }

    /// Register a new endpoint and run its first check.
    pub async fn create_endpoint(&self, spec: EndpointSpec) -> Result<MonitoredEndpoint, StoreError> {
        let endpoint = MonitoredEndpoint::new(Uuid::new_v4().to_string(), spec, Utc::now());
        let id = endpoint.id.clone();
        self.services.add(endpoint)?;
        tracing::info!("Added endpoint {}", id);
        self.run_check(&id).await
    }

    /// Replace the user-editable fields of an endpoint.
    pub fn update_endpoint(&self, id: &str, spec: EndpointSpec) -> Result<MonitoredEndpoint, StoreError> {
        self.services.update(id, |endpoint| {
            endpoint.apply_edit(spec);
            endpoint.clone()
        })
    }

    pub fn delete_endpoint(&self, id: &str) -> Result<(), StoreError> {
        self.services.delete(id)?;
        tracing::info!("Deleted endpoint {}", id);
        Ok(())
    }

    pub fn endpoint(&self, id: &str) -> Result<MonitoredEndpoint, StoreError> {
        self.services.get(id)
    }

    pub fn endpoints(&self) -> Vec<MonitoredEndpoint> {
        self.services.all()
    }

    /// Check log of an endpoint; empty if it has not been checked yet.
    pub fn history(&self, id: &str) -> Result<HistoryLog, StoreError> {
        self.services.get(id)?;
        let history = self.services.history();
        Ok(history
            .get(id)
            .unwrap_or_else(|_| HistoryLog::new(id, history.max_checks())))
    }

    pub fn statistics(&self, id: &str) -> Result<Statistics, StoreError> {
        self.services.get(id)?;
        Ok(self.services.history().statistics(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::testing::{enabled_config, sink};
    use crate::notify::{Dispatcher, NotificationConfig, NotificationOverride};
    use crate::probe::CertificateSnapshot;
    use crate::store::{CheckTarget, HistoryStore};
    use chrono::Duration as ChronoDuration;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays queued verdicts; an empty script answers up.
    #[derive(Default)]
    struct ScriptedChecker {
        script: Mutex<VecDeque<(ServiceStatus, Option<CertificateSnapshot>)>>,
    }

    impl ScriptedChecker {
        fn push(&self, status: ServiceStatus) {
            self.script.lock().unwrap().push_back((status, None));
        }

        fn push_cert(&self, days_left: i64) {
            self.script.lock().unwrap().push_back((
                ServiceStatus::Up,
                Some(CertificateSnapshot {
                    expires_at: Utc::now() + ChronoDuration::days(days_left),
                    issuer: "Test CA".to_string(),
                    days_left,
                }),
            ));
        }
    }

    #[async_trait::async_trait]
    impl Checker for ScriptedChecker {
        async fn check(&self, endpoint: &MonitoredEndpoint) -> CheckResult {
            let (status, certificate) = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or((ServiceStatus::Up, None));
            CheckResult {
                endpoint_id: endpoint.id.clone(),
                status,
                response_time: 12,
                error_message: match status {
                    ServiceStatus::Down => "connection refused".to_string(),
                    _ => String::new(),
                },
                checked_at: Utc::now(),
                certificate,
            }
        }
    }

    struct Harness {
        engine: MonitorEngine,
        checker: Arc<ScriptedChecker>,
        dispatcher: Dispatcher,
    }

    fn harness(config: NotificationConfig) -> Harness {
        let checker = Arc::new(ScriptedChecker::default());
        let services = Arc::new(ServiceStore::new(Arc::new(HistoryStore::new(100))));
        let (notifier, dispatcher) = sink(config);
        Harness {
            engine: MonitorEngine::new(checker.clone(), services, notifier),
            checker,
            dispatcher,
        }
    }

    fn spec(name: &str) -> EndpointSpec {
        EndpointSpec {
            name: name.to_string(),
            target: CheckTarget::Http {
                url: "https://example.test".to_string(),
            },
            check_interval: 0,
            timeout: 0,
            notifications: NotificationOverride::default(),
        }
    }

    fn events(dispatcher: &mut Dispatcher) -> Vec<Event> {
        dispatcher.drain().into_iter().map(|o| o.event).collect()
    }

    #[tokio::test]
    async fn test_steady_up_sends_nothing() {
        let mut h = harness(enabled_config());
        let created = h.engine.create_endpoint(spec("api")).await.unwrap();
        assert_eq!(created.status, ServiceStatus::Up);
        assert_eq!(created.check_interval, 60);
        assert_eq!(created.timeout, 10);

        h.engine.run_check(&created.id).await.unwrap();
        h.engine.run_check(&created.id).await.unwrap();

        assert!(events(&mut h.dispatcher).is_empty());
        assert_eq!(h.engine.history(&created.id).unwrap().len(), 3);
        assert_eq!(h.engine.statistics(&created.id).unwrap().uptime_percentage, 100.0);
    }

    #[tokio::test]
    async fn test_up_then_down_notifies_once() {
        let mut h = harness(enabled_config());
        let created = h.engine.create_endpoint(spec("api")).await.unwrap();

        h.checker.push(ServiceStatus::Down);
        h.checker.push(ServiceStatus::Down);
        let down = h.engine.run_check(&created.id).await.unwrap();
        h.engine.run_check(&created.id).await.unwrap();

        assert_eq!(down.status, ServiceStatus::Down);
        assert!(down.last_downtime.is_some());
        assert_eq!(down.error_message, "connection refused");

        let sent = events(&mut h.dispatcher);
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Event::ServiceDown { .. }));
    }

    #[tokio::test]
    async fn test_first_check_down_notifies() {
        let mut h = harness(enabled_config());
        h.checker.push(ServiceStatus::Down);
        h.engine.create_endpoint(spec("api")).await.unwrap();

        let sent = events(&mut h.dispatcher);
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Event::ServiceDown { .. }));
    }

    #[tokio::test]
    async fn test_recovery_fires_on_third_check() {
        let mut h = harness(enabled_config());
        h.checker.push(ServiceStatus::Down);
        let created = h.engine.create_endpoint(spec("api")).await.unwrap();
        events(&mut h.dispatcher);

        h.checker.push(ServiceStatus::Down);
        h.engine.run_check(&created.id).await.unwrap();
        assert!(events(&mut h.dispatcher).is_empty());

        let recovered = h.engine.run_check(&created.id).await.unwrap();
        assert_eq!(recovered.status, ServiceStatus::Up);
        assert!(recovered.last_uptime.is_some());

        let sent = events(&mut h.dispatcher);
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Event::ServiceRecovered { response_time: 12, .. }));
    }

    #[tokio::test]
    async fn test_certificate_alert_rearms_after_renewal() {
        let mut h = harness(enabled_config());
        h.checker.push_cert(20);
        let created = h.engine.create_endpoint(spec("site")).await.unwrap();
        let cert = created.certificate.clone().unwrap();
        assert!(cert.alert_sent);
        assert_eq!(cert.issuer, "Test CA");

        h.checker.push_cert(19);
        h.engine.run_check(&created.id).await.unwrap();

        let sent = events(&mut h.dispatcher);
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Event::CertificateExpiring { days_left: 20, .. }));

        h.checker.push_cert(90);
        let renewed = h.engine.run_check(&created.id).await.unwrap();
        assert!(!renewed.certificate.unwrap().alert_sent);

        h.checker.push_cert(10);
        h.engine.run_check(&created.id).await.unwrap();
        let sent = events(&mut h.dispatcher);
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], Event::CertificateExpiring { days_left: 10, .. }));
    }

    #[tokio::test]
    async fn test_expired_certificate_does_not_alert() {
        let mut h = harness(enabled_config());
        h.checker.push_cert(0);
        let created = h.engine.create_endpoint(spec("site")).await.unwrap();
        assert!(events(&mut h.dispatcher).is_empty());
        assert!(!created.certificate.unwrap().alert_sent);
    }

    #[tokio::test]
    async fn test_endpoint_override_routes_notification() {
        let mut h = harness(NotificationConfig::default());
        let mut endpoint_spec = spec("api");
        endpoint_spec.notifications = NotificationOverride {
            bot_token: Some("endpoint-token".to_string()),
            chat_id: Some("endpoint-chat".to_string()),
            enabled: Some(true),
        };
        h.checker.push(ServiceStatus::Down);
        h.engine.create_endpoint(endpoint_spec).await.unwrap();

        let queued = h.dispatcher.drain();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].route.bot_token, "endpoint-token");
        assert_eq!(queued[0].route.chat_id, "endpoint-chat");
    }

    #[tokio::test]
    async fn test_apply_result_for_deleted_endpoint() {
        let h = harness(enabled_config());
        let created = h.engine.create_endpoint(spec("api")).await.unwrap();
        let stale = h.checker.check(&created).await;

        h.engine.delete_endpoint(&created.id).unwrap();
        assert!(matches!(h.engine.apply_result(stale), Err(StoreError::NotFound(_))));
        assert!(matches!(h.engine.history(&created.id), Err(StoreError::NotFound(_))));
        assert!(h.engine.services().history().get(&created.id).is_err());
    }

    #[tokio::test]
    async fn test_update_preserves_check_state() {
        let h = harness(enabled_config());
        h.checker.push(ServiceStatus::Down);
        let created = h.engine.create_endpoint(spec("api")).await.unwrap();

        let mut edit = spec("renamed");
        edit.check_interval = 120;
        let updated = h.engine.update_endpoint(&created.id, edit).unwrap();

        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.check_interval, 120);
        assert_eq!(updated.id, created.id);
        assert_eq!(updated.created_at, created.created_at);
        assert_eq!(updated.status, ServiceStatus::Down);

        assert!(matches!(
            h.engine.update_endpoint("missing", spec("x")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_history_for_unchecked_endpoint_is_empty() {
        let h = harness(enabled_config());
        let endpoint = MonitoredEndpoint::new("fresh".to_string(), spec("api"), Utc::now());
        h.engine.services().add(endpoint).unwrap();

        assert!(h.engine.history("fresh").unwrap().is_empty());
        assert_eq!(h.engine.statistics("fresh").unwrap().total_checks, 0);
    }

    #[tokio::test]
    async fn test_check_all_visits_every_endpoint() {
        let h = harness(enabled_config());
        for name in ["a", "b", "c"] {
            let endpoint = MonitoredEndpoint::new(name.to_string(), spec(name), Utc::now());
            h.engine.services().add(endpoint).unwrap();
        }

        h.engine.check_all().await;

        for endpoint in h.engine.endpoints() {
            assert_eq!(endpoint.status, ServiceStatus::Up);
            assert_eq!(h.engine.history(&endpoint.id).unwrap().len(), 1);
        }
    }
}

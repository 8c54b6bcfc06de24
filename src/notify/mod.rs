//! Notification module.
//!
//! Turns monitoring events into outbound chat messages. Events are queued
//! by [`NotificationSink`] and delivered by a [`Dispatcher`] task, so the
//! check pipeline never waits on the messaging API.

mod message;
mod telegram;

pub use message::*;
pub use telegram::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tokio::sync::mpsc;

use crate::db::SaveHandle;
use crate::system::ResourceAlert;

/// Pending notifications held before new ones are dropped.
const QUEUE_CAPACITY: usize = 256;

/// Notification error types.
#[derive(Error, Debug)]
pub enum NotifyError {
    #[error("bot token and chat ID are required")]
    MissingCredentials,
    #[error("failed to send message: {0}")]
    Transport(String),
    #[error("messaging API returned status code: {0}")]
    Api(u16),
}

/// Default bot credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub chat_id: String,
    #[serde(default)]
    pub enabled: bool,
}

/// Per-endpoint overrides; `None` inherits the default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

/// Credentials resolved for one notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route {
    pub bot_token: String,
    pub chat_id: String,
    pub enabled: bool,
}

impl Route {
    pub fn is_deliverable(&self) -> bool {
        self.enabled && !self.bot_token.is_empty() && !self.chat_id.is_empty()
    }
}

/// Merge an endpoint's overrides over the defaults. Empty override strings
/// count as unset.
pub fn effective(default: &NotificationConfig, overrides: &NotificationOverride) -> Route {
    let pick = |over: &Option<String>, base: &String| match over {
        Some(value) if !value.is_empty() => value.clone(),
        _ => base.clone(),
    };

    Route {
        bot_token: pick(&overrides.bot_token, &default.bot_token),
        chat_id: pick(&overrides.chat_id, &default.chat_id),
        enabled: overrides.enabled.unwrap_or(default.enabled),
    }
}

/// Something worth telling a human about.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    ServiceDown {
        name: String,
        target: String,
        error: String,
        at: DateTime<Utc>,
    },
    ServiceRecovered {
        name: String,
        target: String,
        response_time: u64,
        at: DateTime<Utc>,
    },
    CertificateExpiring {
        name: String,
        target: String,
        days_left: i64,
        expires_at: DateTime<Utc>,
        issuer: String,
    },
    ResourceThreshold(ResourceAlert),
}

/// A queued notification with its resolved credentials.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub route: Route,
    pub event: Event,
}

/// Capability for delivering a rendered message.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn post_message(&self, bot_token: &str, chat_id: &str, text: &str) -> Result<(), NotifyError>;
}

/// Front door for notifications: owns the default config and the queue.
pub struct NotificationSink {
    config: RwLock<NotificationConfig>,
    queue: mpsc::Sender<Outbound>,
    transport: Arc<dyn Transport>,
    save: Option<SaveHandle>,
}

impl NotificationSink {
    /// Create the sink and the dispatcher that drains it.
    pub fn new(config: NotificationConfig, transport: Arc<dyn Transport>) -> (Self, Dispatcher) {
        let (tx, rx) = mpsc::channel(QUEUE_CAPACITY);
        let sink = Self {
            config: RwLock::new(config),
            queue: tx,
            transport: transport.clone(),
            save: None,
        };
        (sink, Dispatcher { rx, transport })
    }

    pub fn with_save_hook(mut self, save: SaveHandle) -> Self {
        self.save = Some(save);
        self
    }

    /// The stored config, token included.
    pub fn config(&self) -> NotificationConfig {
        self.config.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// The config with the bot token masked, for display.
    pub fn masked_config(&self) -> NotificationConfig {
        let mut config = self.config();
        config.bot_token = mask_token(&config.bot_token);
        config
    }

    pub fn set_config(&self, config: NotificationConfig) {
        *self.config.write().unwrap_or_else(PoisonError::into_inner) = config;
        if let Some(save) = &self.save {
            save.request();
        }
    }

    pub fn default_route(&self) -> Route {
        effective(&self.config(), &NotificationOverride::default())
    }

    /// Queue `event` for delivery. Returns whether it was queued.
    ///
    /// Never blocks: undeliverable routes are skipped and a full queue drops
    /// the event.
    pub fn notify(&self, event: Event, overrides: &NotificationOverride) -> bool {
        let route = effective(&self.config(), overrides);
        if !route.is_deliverable() {
            tracing::debug!("Notifications disabled, skipping {:?}", event);
            return false;
        }

        match self.queue.try_send(Outbound { route, event }) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(outbound)) => {
                tracing::warn!("Notification queue full, dropping {:?}", outbound.event);
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::warn!("Notification dispatcher stopped");
                false
            }
        }
    }

    /// Send a test message with the default credentials and report the outcome.
    pub async fn send_test(&self) -> Result<(), NotifyError> {
        let config = self.config();
        if config.bot_token.is_empty() || config.chat_id.is_empty() {
            return Err(NotifyError::MissingCredentials);
        }
        self.transport
            .post_message(&config.bot_token, &config.chat_id, &render_test())
            .await
    }
}

/// Drains the sink's queue and hands messages to the transport.
pub struct Dispatcher {
    rx: mpsc::Receiver<Outbound>,
    transport: Arc<dyn Transport>,
}

impl Dispatcher {
    /// Deliver until every sink handle is gone.
    pub async fn run(mut self) {
        while let Some(outbound) = self.rx.recv().await {
            let text = outbound.event.render(Utc::now());
            if let Err(e) = self
                .transport
                .post_message(&outbound.route.bot_token, &outbound.route.chat_id, &text)
                .await
            {
                tracing::error!("Failed to deliver notification: {}", e);
            }
        }
    }

    /// Take whatever is queued right now without delivering it.
    #[cfg(test)]
    pub fn drain(&mut self) -> Vec<Outbound> {
        let mut pending = Vec::new();
        while let Ok(outbound) = self.rx.try_recv() {
            pending.push(outbound);
        }
        pending
    }
}

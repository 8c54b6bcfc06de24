//! Message rendering for the chat transport.

use chrono::{DateTime, Utc};

use super::telegram::escape_markdown;
use super::Event;
use crate::system::ResourceKind;

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn timestamp(at: &DateTime<Utc>) -> String {
    at.format(TIME_FORMAT).to_string()
}

impl Event {
    /// Render the event as Markdown. User-supplied text is escaped.
    pub fn render(&self, now: DateTime<Utc>) -> String {
        match self {
            Event::ServiceDown { name, target, error, at } => format!(
                "🔴 *Service Down Alert*\n\n\
                 *Service:* {}\n\
                 *URL:* {}\n\
                 *Status:* DOWN\n\
                 *Error:* {}\n\
                 *Time:* {}",
                escape_markdown(name),
                escape_markdown(target),
                escape_markdown(error),
                timestamp(at),
            ),
            Event::ServiceRecovered { name, target, response_time, at } => format!(
                "🟢 *Service Recovered*\n\n\
                 *Service:* {}\n\
                 *URL:* {}\n\
                 *Status:* UP\n\
                 *Response Time:* {}ms\n\
                 *Time:* {}",
                escape_markdown(name),
                escape_markdown(target),
                response_time,
                timestamp(at),
            ),
            Event::CertificateExpiring { name, target, days_left, expires_at, issuer } => format!(
                "🔒 *SSL Certificate Expiry Alert*\n\n\
                 *Service:* {}\n\
                 *URL:* {}\n\
                 *Days Until Expiry:* {}\n\
                 *Expiry Date:* {}\n\
                 *Issuer:* {}\n\
                 *Time:* {}\n\n\
                 _Please renew your SSL certificate\\._",
                escape_markdown(name),
                escape_markdown(target),
                days_left,
                timestamp(expires_at),
                escape_markdown(issuer),
                timestamp(&now),
            ),
            Event::ResourceThreshold(alert) => {
                let (emoji, resource) = match alert.kind {
                    ResourceKind::Disk => ("💾", "Disk Space"),
                    ResourceKind::Cpu => ("🔥", "CPU Usage"),
                    ResourceKind::Memory => ("⚠️", "Memory Usage"),
                };
                let device = match &alert.device {
                    Some(device) => format!("\n*Device:* {}", escape_markdown(device)),
                    None => String::new(),
                };
                format!(
                    "{} *{} Alert*\n\n\
                     *Resource:* {}{}\n\
                     *Current Usage:* {:.1}%\n\
                     *Threshold:* {:.1}%\n\
                     *Time:* {}\n\n\
                     _Please check your system resources\\._",
                    emoji,
                    resource,
                    resource,
                    device,
                    alert.current,
                    alert.threshold,
                    escape_markdown(&timestamp(&now)),
                )
            }
        }
    }
}

pub fn render_test() -> String {
    "✅ *Test Notification*\n\nYour monitoring service is successfully connected to Telegram!"
        .to_string()
}

//! Telegram Bot API transport.

use serde::Serialize;
use std::time::Duration;

use super::{NotifyError, Transport};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Characters reserved by the Markdown dialect the bot API parses.
const RESERVED: &[char] = &[
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Prefix every reserved character with a backslash.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if RESERVED.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Mask a bot token for display.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    match chars.len() {
        0 => String::new(),
        n if n < 10 => "***".to_string(),
        n => {
            let head: String = chars[..5].iter().collect();
            let tail: String = chars[n - 5..].iter().collect();
            format!("{}...{}", head, tail)
        }
    }
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
}

/// Posts messages through `sendMessage`.
pub struct TelegramTransport {
    client: reqwest::Client,
    api_base: String,
}

impl TelegramTransport {
    pub fn new() -> Result<Self, NotifyError> {
        Self::with_api_base(TELEGRAM_API)
    }

    pub fn with_api_base(api_base: &str) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| NotifyError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait::async_trait]
impl Transport for TelegramTransport {
    async fn post_message(&self, bot_token: &str, chat_id: &str, text: &str) -> Result<(), NotifyError> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, bot_token);

        let response = self
            .client
            .post(&url)
            .json(&SendMessage {
                chat_id,
                text,
                parse_mode: "Markdown",
            })
            .send()
            .await
            .map_err(|e| NotifyError::Transport(e.without_url().to_string()))?;

        if response.status() != reqwest::StatusCode::OK {
            return Err(NotifyError::Api(response.status().as_u16()));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{extract::Path, http::StatusCode, routing::post, Json, Router};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_escape_markdown() {
        assert_eq!(escape_markdown("plain text"), "plain text");
        assert_eq!(escape_markdown("a_b*c"), "a\\_b\\*c");
        assert_eq!(escape_markdown("v1.2-beta!"), "v1\\.2\\-beta\\!");
        assert_eq!(escape_markdown("[x](y)"), "\\[x\\]\\(y\\)");
        assert_eq!(escape_markdown("#{a|b}=~`>+"), "\\#\\{a\\|b\\}\\=\\~\\`\\>\\+");
    }

    #[test]
    fn test_mask_token() {
        assert_eq!(mask_token(""), "");
        assert_eq!(mask_token("short"), "***");
        assert_eq!(mask_token("0123456789"), "01234...56789");
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_posts_markdown_payload() {
        let seen: Arc<Mutex<Vec<(String, serde_json::Value)>>> = Arc::default();
        let recorder = seen.clone();
        let router = Router::new().route(
            "/{bot}/sendMessage",
            post(move |Path(bot): Path<String>, Json(body): Json<serde_json::Value>| {
                let recorder = recorder.clone();
                async move {
                    recorder.lock().unwrap().push((bot, body));
                    StatusCode::OK
                }
            }),
        );
        let base = serve(router).await;

        let transport = TelegramTransport::with_api_base(&base).unwrap();
        transport.post_message("123:abc", "42", "*hi*").await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, "bot123:abc");
        assert_eq!(seen[0].1["chat_id"], "42");
        assert_eq!(seen[0].1["text"], "*hi*");
        assert_eq!(seen[0].1["parse_mode"], "Markdown");
    }

    #[tokio::test]
    async fn test_non_ok_status_is_an_error() {
        let router = Router::new().route(
            "/{bot}/sendMessage",
            post(|| async { StatusCode::UNAUTHORIZED }),
        );
        let base = serve(router).await;

        let transport = TelegramTransport::with_api_base(&base).unwrap();
        let err = transport.post_message("bad", "1", "x").await.unwrap_err();
        assert!(matches!(err, NotifyError::Api(401)));
    }
}

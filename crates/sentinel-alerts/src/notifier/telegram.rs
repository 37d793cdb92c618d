use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info};

use sentinel_core::error::NotifyError;
use sentinel_core::traits::Notifier;

use super::{classify_error, classify_status, http_client};

const TELEGRAM_API: &str = "https://api.telegram.org";

/// Sends alerts through the Telegram Bot API (`sendMessage`, HTML parse mode).
///
/// The destination is the chat id.
#[derive(Clone)]
pub struct TelegramNotifier {
    client: reqwest::Client,
    base_url: String,
    bot_token: String,
}

impl std::fmt::Debug for TelegramNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramNotifier")
            .field("base_url", &self.base_url)
            .field("bot_token", &"***")
            .finish()
    }
}

impl TelegramNotifier {
    pub fn new(bot_token: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        Self::with_base_url(TELEGRAM_API, bot_token, timeout)
    }

    /// Point at a different API host (self-hosted Bot API server, tests).
    pub fn with_base_url(
        base_url: impl Into<String>,
        bot_token: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, NotifyError> {
        let bot_token = bot_token.into();
        if bot_token.trim().is_empty() {
            return Err(NotifyError::Permanent("Telegram bot token is empty".into()));
        }
        Ok(Self {
            client: http_client(timeout)?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            bot_token,
        })
    }

    fn endpoint(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.bot_token, method)
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, destination: &str, message: &str) -> Result<(), NotifyError> {
        if destination.trim().is_empty() {
            return Err(NotifyError::Permanent("Telegram chat id is empty".into()));
        }

        let payload = json!({
            "chat_id": destination,
            "text": message,
            "parse_mode": "HTML",
            "disable_web_page_preview": true,
        });
        let response = self
            .client
            .post(self.endpoint("sendMessage"))
            .json(&payload)
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status();
        let body = if status.is_success() {
            String::new()
        } else {
            response.text().await.unwrap_or_default()
        };
        classify_status(status, &body)?;
        debug!(chat_id = destination, "Telegram message sent");
        Ok(())
    }

    /// Calls `getMe`; a bad token or a bot the API does not know is permanent.
    async fn check(&self) -> Result<(), NotifyError> {
        let response = self
            .client
            .get(self.endpoint("getMe"))
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return classify_status(status, &body);
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| NotifyError::Transient(format!("invalid getMe response: {}", e)))?;
        if body["ok"].as_bool() != Some(true) {
            return Err(NotifyError::Permanent(format!("getMe rejected: {}", body)));
        }
        let bot = body["result"]["username"]
            .as_str()
            .or_else(|| body["result"]["first_name"].as_str())
            .unwrap_or("unknown");
        info!(bot, "Telegram bot connected");
        Ok(())
    }

    fn name(&self) -> &str {
        "telegram"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_send_message_payload() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/botTOKEN/sendMessage"))
            .and(body_partial_json(json!({ "chat_id": "42", "parse_mode": "HTML" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
            .expect(1)
            .mount(&server)
            .await;

        let notifier =
            TelegramNotifier::with_base_url(server.uri(), "TOKEN", Duration::from_secs(5)).unwrap();
        notifier.send("42", "<b>XYZ</b> crossed").await.unwrap();
    }

    #[tokio::test]
    async fn test_rate_limit_is_transient_bad_chat_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "chat_id": "busy" })))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "chat_id": "missing" })))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({ "ok": false, "description": "chat not found" })),
            )
            .mount(&server)
            .await;

        let notifier =
            TelegramNotifier::with_base_url(server.uri(), "TOKEN", Duration::from_secs(5)).unwrap();

        assert!(notifier.send("busy", "hi").await.unwrap_err().is_transient());
        let err = notifier.send("missing", "hi").await.unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("chat not found"));
    }

    #[tokio::test]
    async fn test_check_calls_get_me() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/botTOKEN/getMe"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "result": { "id": 7, "is_bot": true, "first_name": "Sentinel", "username": "sentinel_bot" }
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/botBAD/getMe"))
            .respond_with(
                ResponseTemplate::new(401)
                    .set_body_json(json!({ "ok": false, "description": "Unauthorized" })),
            )
            .mount(&server)
            .await;

        let notifier =
            TelegramNotifier::with_base_url(server.uri(), "TOKEN", Duration::from_secs(5)).unwrap();
        notifier.check().await.unwrap();

        let notifier =
            TelegramNotifier::with_base_url(server.uri(), "BAD", Duration::from_secs(5)).unwrap();
        let err = notifier.check().await.unwrap_err();
        assert!(!err.is_transient());
        assert!(err.to_string().contains("Unauthorized"));
    }

    #[test]
    fn test_empty_token_rejected() {
        assert!(TelegramNotifier::new("", Duration::from_secs(1)).is_err());
    }
}

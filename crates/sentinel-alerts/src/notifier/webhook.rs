use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use sentinel_core::error::NotifyError;
use sentinel_core::traits::Notifier;

use super::{classify_error, classify_status, http_client};

/// Posts alerts as JSON to a fixed URL.
///
/// Body: `{"destination": ..., "message": ...}`.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, NotifyError> {
        Ok(Self {
            client: http_client(timeout)?,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, destination: &str, message: &str) -> Result<(), NotifyError> {
        let payload = json!({ "destination": destination, "message": message });
        let response = self
            .client
            .post(&self.url)
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
        classify_status(status, &body)
    }

    /// The endpoint is reachable if it answers a HEAD request at all, and
    /// not with a server error.
    async fn check(&self) -> Result<(), NotifyError> {
        let response = self
            .client
            .head(&self.url)
            .send()
            .await
            .map_err(classify_error)?;

        let status = response.status();
        if status.is_server_error() {
            return Err(NotifyError::Transient(format!("HTTP {}", status)));
        }
        debug!(url = %self.url, %status, "Webhook reachable");
        Ok(())
    }

    fn name(&self) -> &str {
        "webhook"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn notifier_with(status: u16) -> (MockServer, WebhookNotifier) {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(body_string_contains("XYZ crossed"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&server)
            .await;
        let notifier =
            WebhookNotifier::new(format!("{}/hook", server.uri()), Duration::from_secs(5)).unwrap();
        (server, notifier)
    }

    #[tokio::test]
    async fn test_webhook_delivers() {
        let (_server, notifier) = notifier_with(200).await;
        assert!(notifier.send("ops", "XYZ crossed above MA20").await.is_ok());
    }

    #[tokio::test]
    async fn test_webhook_classifies_failures() {
        let (_server, notifier) = notifier_with(503).await;
        let err = notifier.send("ops", "XYZ crossed").await.unwrap_err();
        assert!(err.is_transient());

        let (_server, notifier) = notifier_with(404).await;
        let err = notifier.send("ops", "XYZ crossed").await.unwrap_err();
        assert!(!err.is_transient());
    }

    #[tokio::test]
    async fn test_unreachable_is_transient() {
        // Nothing listens on port 1
        let notifier =
            WebhookNotifier::new("http://127.0.0.1:1/hook", Duration::from_secs(2)).unwrap();
        let err = notifier.send("ops", "XYZ crossed").await.unwrap_err();
        assert!(err.is_transient());
        assert!(notifier.check().await.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_check_accepts_any_non_server_error() {
        let server = MockServer::start().await;
        Mock::given(method("HEAD"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(405))
            .mount(&server)
            .await;
        Mock::given(method("HEAD"))
            .and(path("/down"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let notifier =
            WebhookNotifier::new(format!("{}/hook", server.uri()), Duration::from_secs(5)).unwrap();
        assert!(notifier.check().await.is_ok());

        let notifier =
            WebhookNotifier::new(format!("{}/down", server.uri()), Duration::from_secs(5)).unwrap();
        assert!(notifier.check().await.unwrap_err().is_transient());
    }
}

//! Notification transports.

mod log;
mod telegram;
mod webhook;

pub use self::log::LogNotifier;
pub use telegram::TelegramNotifier;
pub use webhook::WebhookNotifier;

use reqwest::StatusCode;
use sentinel_core::error::NotifyError;

/// Map an HTTP response status to a send result.
///
/// 408, 429 and 5xx are worth retrying; any other 4xx means the request
/// itself is wrong and retrying cannot help.
pub fn classify_status(status: StatusCode, body: &str) -> Result<(), NotifyError> {
    if status.is_success() {
        return Ok(());
    }
    let reason = if body.is_empty() {
        format!("HTTP {}", status)
    } else {
        format!("HTTP {}: {}", status, body)
    };
    if status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
    {
        Err(NotifyError::Transient(reason))
    } else {
        Err(NotifyError::Permanent(reason))
    }
}

/// Map a transport-level error. Anything that never got a response
/// (connect, timeout, reset) is transient.
pub fn classify_error(err: reqwest::Error) -> NotifyError {
    if err.is_builder() {
        return NotifyError::Permanent(err.to_string());
    }
    match err.status() {
        Some(status) => match classify_status(status, "") {
            Err(e) => e,
            Ok(()) => NotifyError::Transient(err.to_string()),
        },
        None => NotifyError::Transient(err.to_string()),
    }
}

pub(crate) fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client, NotifyError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|e| NotifyError::Permanent(format!("failed to build HTTP client: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_status() {
        assert!(classify_status(StatusCode::OK, "").is_ok());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, "").unwrap_err().is_transient());
        assert!(classify_status(StatusCode::REQUEST_TIMEOUT, "").unwrap_err().is_transient());
        assert!(classify_status(StatusCode::BAD_GATEWAY, "").unwrap_err().is_transient());
        assert!(!classify_status(StatusCode::BAD_REQUEST, "").unwrap_err().is_transient());
        assert!(!classify_status(StatusCode::FORBIDDEN, "").unwrap_err().is_transient());
    }
}

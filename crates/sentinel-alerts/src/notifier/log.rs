use async_trait::async_trait;
use tracing::info;

use sentinel_core::error::NotifyError;
use sentinel_core::traits::Notifier;

/// Writes alerts to the log instead of sending them. Used for dry runs.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

impl LogNotifier {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, destination: &str, message: &str) -> Result<(), NotifyError> {
        info!(destination, "ALERT\n{}", message);
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}

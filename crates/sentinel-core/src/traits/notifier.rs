//! Notification collaborator trait.

use crate::error::NotifyError;
use async_trait::async_trait;

/// Outbound message transport (chat bot, webhook, log sink).
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver one message.
    ///
    /// # Arguments
    /// * `destination` - Transport-specific address (chat id, channel, URL path)
    /// * `message` - Rendered alert text
    ///
    /// # Returns
    /// `Ok(())` on success, otherwise a transient or permanent failure
    async fn send(&self, destination: &str, message: &str) -> Result<(), NotifyError>;

    /// Verify the transport is usable before alerts start flowing.
    async fn check(&self) -> Result<(), NotifyError> {
        Ok(())
    }

    /// Get the notifier name.
    fn name(&self) -> &str;
}

//! Feed collaborator trait.

use crate::error::FeedError;
use async_trait::async_trait;

/// Outbound commands to the market-data feed.
///
/// The feed's inbound side is a stream of raw messages handed to the
/// normalizer; this trait is the only way the core talks back to it.
#[async_trait]
pub trait FeedControl: Send + Sync {
    /// (Re)establish the feed session.
    ///
    /// Resolves once the session is usable or the attempt has failed.
    async fn connect(&self) -> Result<(), FeedError>;

    /// Start streaming updates for a symbol.
    async fn subscribe(&self, symbol: &str) -> Result<(), FeedError>;

    /// Stop streaming updates for a symbol.
    async fn unsubscribe(&self, symbol: &str) -> Result<(), FeedError>;

    /// Get the feed name.
    fn name(&self) -> &str;
}

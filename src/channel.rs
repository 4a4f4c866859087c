use crate::error::Result;
use async_trait::async_trait;

pub type UserId = u64;

/// Handle to a posted announcement message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageRef {
    pub channel_id: u64,
    pub message_id: u64,
}

/// Outbound side of the chat service. Injected into the controller; the
/// gateway that produces inbound events lives outside this crate.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    async fn post(&self, channel_id: u64, content: &str) -> Result<MessageRef>;

    async fn edit(&self, message: &MessageRef, content: &str) -> Result<()>;

    async fn add_reaction(&self, message: &MessageRef, symbol: &str) -> Result<()>;

    /// Distinct reaction symbols currently present on the message.
    async fn reaction_symbols(&self, message: &MessageRef) -> Result<Vec<String>>;

    /// Users who reacted with the given symbol, at most `limit` of them.
    async fn reaction_users(
        &self,
        message: &MessageRef,
        symbol: &str,
        limit: usize,
    ) -> Result<Vec<UserId>>;

    async fn direct_message(&self, user: UserId, content: &str) -> Result<()>;
}

/// Role/membership lookups for the community the rain runs in.
#[async_trait]
pub trait MembershipDirectory: Send + Sync {
    async fn is_excluded(&self, user: UserId) -> Result<bool>;
}

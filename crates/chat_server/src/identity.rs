use async_trait::async_trait;

use crate::types::{ClientId, DisplayName, Identity};

/// Maps live connections to the accounts behind them.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn identity(&self, client_id: ClientId) -> Option<Identity>;

    async fn display_name(&self, client_id: ClientId) -> Option<DisplayName>;

    async fn connection_by_identity(&self, identity: &Identity) -> Option<ClientId>;

    /// Case-insensitive.
    async fn connection_by_name(&self, name: &str) -> Option<ClientId>;
}

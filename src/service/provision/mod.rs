mod error;
mod remnawave;

pub use error::ProvisionError;
pub use remnawave::{account_username, RemnawaveClient};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// What to create on the VPN control plane for one subscription.
#[derive(Debug, Clone, PartialEq)]
pub struct AccountRequest {
    pub customer_id: i64,
    pub telegram_id: i64,
    pub sequence: i64,
    pub days: i64,
    pub traffic_limit_bytes: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VpnAccount {
    pub username: String,
    pub subscription_url: String,
    pub expire_at: DateTime<Utc>,
}

#[async_trait]
pub trait VpnProvisioner: Send + Sync {
    async fn create_account(&self, request: &AccountRequest) -> Result<VpnAccount, ProvisionError>;
    async fn health(&self) -> Result<(), ProvisionError>;
}

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use reqwest::{header, Client, StatusCode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashSet;
use uuid::Uuid;

use super::{AccountRequest, ProvisionError, VpnAccount, VpnProvisioner};
use crate::config::VpnConfig;
use crate::utils::mask_half;

const REQUEST_TIMEOUT_SECS: u64 = 10;
const CONNECT_TIMEOUT_SECS: u64 = 5;

#[derive(Debug, Clone, Deserialize)]
struct Envelope<T> {
    response: T,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SquadList {
    internal_squads: Vec<Squad>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct Squad {
    uuid: Uuid,
    name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateUserRequest<'a> {
    username: &'a str,
    status: &'static str,
    telegram_id: i64,
    expire_at: DateTime<Utc>,
    traffic_limit_strategy: &'static str,
    traffic_limit_bytes: i64,
    active_internal_squads: Vec<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tag: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreatedUser {
    username: String,
    subscription_url: String,
    expire_at: DateTime<Utc>,
}

/// `{customer}_{telegram}_{sequence}_{hash}`; the hash keeps repeated attempts for one ordinal distinct.
pub fn account_username(customer_id: i64, telegram_id: i64, sequence: i64, nanos: i64, nonce: u64) -> String {
    let base = format!("{}_{}_{}", customer_id, telegram_id, sequence);
    let digest = Sha256::digest(format!("{}_{}_{}", base, nanos, nonce).as_bytes());
    let hash = hex::encode(digest);
    format!("{}_{}", base, &hash[..6])
}

/// Squads a new account joins: the allow-listed ones, or every squad when no allow-list is set.
fn select_squads(squads: &[Squad], allowed: &HashSet<Uuid>) -> Vec<Uuid> {
    squads
        .iter()
        .filter(|squad| allowed.is_empty() || allowed.contains(&squad.uuid))
        .map(|squad| squad.uuid)
        .collect()
}

pub struct RemnawaveClient {
    client: Client,
    base_url: String,
    squads: HashSet<Uuid>,
    tag: Option<String>,
}

impl RemnawaveClient {
    pub fn new(config: &VpnConfig) -> Result<Self, ProvisionError> {
        info!("Initializing RemnawaveClient...");
        let mut headers = header::HeaderMap::new();
        let token = header::HeaderValue::from_str(&format!("Bearer {}", config.token))
            .map_err(|e| ProvisionError::Api(e.to_string()))?;
        headers.insert(header::AUTHORIZATION, token);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(std::time::Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        info!("RemnawaveClient initialized");
        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            squads: config.squads.clone(),
            tag: config.tag.clone(),
        })
    }

    async fn internal_squads(&self) -> Result<Vec<Squad>, ProvisionError> {
        let response = self
            .client
            .get(format!("{}/api/internal-squads", self.base_url))
            .send()
            .await?;

        let list: Envelope<SquadList> = Self::parse(response).await?;
        Ok(list.response.internal_squads)
    }

    async fn parse<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, ProvisionError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProvisionError::Status {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| ProvisionError::InvalidResponse(e.to_string()))
    }
}

#[async_trait]
impl VpnProvisioner for RemnawaveClient {
    async fn create_account(&self, request: &AccountRequest) -> Result<VpnAccount, ProvisionError> {
        let now = Utc::now();
        let username = account_username(
            request.customer_id,
            request.telegram_id,
            request.sequence,
            now.timestamp_nanos_opt().unwrap_or_default(),
            rand::random::<u64>(),
        );
        let expire_at = now + Duration::days(request.days);

        let squads = select_squads(&self.internal_squads().await?, &self.squads);
        if squads.is_empty() {
            warn!("No internal squads match the allow-list, creating account without squads");
        }

        let body = CreateUserRequest {
            username: &username,
            status: "ACTIVE",
            telegram_id: request.telegram_id,
            expire_at,
            traffic_limit_strategy: "MONTH",
            traffic_limit_bytes: request.traffic_limit_bytes,
            active_internal_squads: squads,
            tag: self.tag.as_deref(),
        };

        let response = self
            .client
            .post(format!("{}/api/users", self.base_url))
            .json(&body)
            .send()
            .await?;
        let created: Envelope<CreatedUser> = Self::parse(response).await?;

        info!(
            "Created VPN account {} for {} ({} days, #{})",
            mask_half(&created.response.username),
            mask_half(&request.telegram_id.to_string()),
            request.days,
            request.sequence
        );

        Ok(VpnAccount {
            username: created.response.username,
            subscription_url: created.response.subscription_url,
            expire_at: created.response.expire_at,
        })
    }

    async fn health(&self) -> Result<(), ProvisionError> {
        let response = self
            .client
            .get(format!("{}/api/internal-squads", self.base_url))
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            status @ (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) => Err(ProvisionError::Status {
                status: status.as_u16(),
                body: "VPN API rejected the token".to_string(),
            }),
            status => Err(ProvisionError::Status {
                status: status.as_u16(),
                body: String::new(),
            }),
        }
    }
}

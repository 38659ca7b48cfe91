use shuttle_runtime::SecretStore;
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::error::{BotError, BotResult};
use crate::service::purchase::InvoiceKind;

static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();

const BYTES_IN_GB: i64 = 1024 * 1024 * 1024;
pub const MONTH_OPTIONS: [i64; 4] = [1, 3, 6, 12];

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing config key: {0}")]
    Missing(String),
    #[error("Invalid config key: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub telegram: TelegramConfig,
    pub storage: StorageConfig,
    pub vpn: VpnConfig,
    pub plan: PlanConfig,
    pub pricing: PricingConfig,
    pub crypto_pay: Option<CryptoPayConfig>,
    pub yookassa: Option<YookassaConfig>,
    pub stars_enabled: bool,
    pub tribute: Option<TributeConfig>,
    pub webhook: WebhookConfig,
    pub interaction: InteractionConfig,
    pub scheduler: SchedulerConfig,
}

impl AppConfig {
    pub fn set_global(config: AppConfig) -> BotResult<()> {
        APP_CONFIG
            .set(config)
            .map_err(|_| BotError::AppStateError("Failed to set global app config".to_string()))
    }

    pub fn get() -> BotResult<&'static AppConfig> {
        APP_CONFIG
            .get()
            .ok_or_else(|| BotError::AppStateError("App config not initialized".to_string()))
    }
}

#[derive(Clone, Debug)]
pub struct TelegramConfig {
    pub token: String,
    pub admin_id: i64,
}

#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub turso_url: String,
    pub turso_token: String,
    pub redis_url: Option<String>,
}

#[derive(Clone, Debug)]
pub struct VpnConfig {
    pub url: String,
    pub token: String,
    pub tag: Option<String>,
    /// Empty means every squad on the panel.
    pub squads: HashSet<Uuid>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PlanConfig {
    pub traffic_limit_bytes: i64,
    pub days_in_month: i64,
    pub trial_days: i64,
    pub trial_traffic_limit_bytes: i64,
    pub referral_days: i64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct PricingConfig {
    /// Months -> price in the fiat currency.
    pub fiat: BTreeMap<i64, f64>,
    /// Months -> price in Telegram Stars.
    pub stars: BTreeMap<i64, i64>,
}

impl PricingConfig {
    pub fn months_options(&self) -> Vec<i64> {
        self.fiat.keys().copied().collect()
    }

    pub fn amount_for(&self, months: i64, kind: InvoiceKind) -> Option<f64> {
        match kind {
            InvoiceKind::Stars => self.stars.get(&months).map(|stars| *stars as f64),
            _ => self.fiat.get(&months).copied(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct CryptoPayConfig {
    pub token: String,
    pub api_url: String,
    pub fiat: String,
    pub bot_url: String,
}

#[derive(Clone, Debug)]
pub struct YookassaConfig {
    pub shop_id: String,
    pub secret_key: String,
    pub api_url: String,
    pub return_url: String,
}

#[derive(Clone, Debug)]
pub struct TributeConfig {
    pub api_key: String,
    pub payment_url: Option<String>,
    pub currency: String,
}

#[derive(Clone, Debug)]
pub struct WebhookConfig {
    pub path_prefix: String,
}

#[derive(Clone, Debug)]
pub struct InteractionConfig {
    pub cache_capacity: usize,
    pub pending_ttl_secs: u64,
    pub payment_message_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct SchedulerConfig {
    pub sweep_interval_secs: u64,
}

struct Secrets<F>(F);

impl<F: Fn(&str) -> Option<String>> Secrets<F> {
    fn optional(&self, key: &str) -> Option<String> {
        (self.0)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn required(&self, key: &str) -> Result<String, ConfigError> {
        self.optional(key).ok_or_else(|| ConfigError::Missing(key.to_string()))
    }

    fn parse_or<T: FromStr>(&self, key: &str, default: T) -> Result<T, ConfigError> {
        match self.optional(key) {
            Some(raw) => raw.parse::<T>().map_err(|_| ConfigError::Invalid(key.to_string())),
            None => Ok(default),
        }
    }

    fn parse_required<T: FromStr>(&self, key: &str) -> Result<T, ConfigError> {
        self.required(key)?
            .parse::<T>()
            .map_err(|_| ConfigError::Invalid(key.to_string()))
    }

    fn flag(&self, key: &str) -> Result<bool, ConfigError> {
        self.parse_or(key, false)
    }
}

fn parse_squads(raw: Option<String>) -> Result<HashSet<Uuid>, ConfigError> {
    let Some(raw) = raw else {
        return Ok(HashSet::new());
    };

    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| Uuid::parse_str(s).map_err(|_| ConfigError::Invalid(format!("SQUAD_UUIDS ({})", s))))
        .collect()
}

pub fn build_config(secret_store: &SecretStore) -> Result<AppConfig, ConfigError> {
    build_config_from(|key| secret_store.get(key))
}

pub fn build_config_from(lookup: impl Fn(&str) -> Option<String>) -> Result<AppConfig, ConfigError> {
    info!("Building AppConfig...");
    let secrets = Secrets(lookup);

    let mut pricing = PricingConfig::default();
    for months in MONTH_OPTIONS {
        let key = format!("PRICE_{}", months);
        if secrets.optional(&key).is_some() {
            pricing.fiat.insert(months, secrets.parse_required::<f64>(&key)?);
        }
        let stars_key = format!("STARS_PRICE_{}", months);
        if secrets.optional(&stars_key).is_some() {
            pricing.stars.insert(months, secrets.parse_required::<i64>(&stars_key)?);
        }
    }
    if pricing.fiat.is_empty() {
        return Err(ConfigError::Missing("PRICE_1".to_string()));
    }

    let crypto_pay = if secrets.flag("CRYPTO_PAY_ENABLED")? {
        Some(CryptoPayConfig {
            token: secrets.required("CRYPTO_PAY_TOKEN")?,
            api_url: secrets
                .optional("CRYPTO_PAY_URL")
                .unwrap_or_else(|| "https://pay.crypt.bot".to_string()),
            fiat: secrets.optional("CRYPTO_PAY_FIAT").unwrap_or_else(|| "RUB".to_string()),
            bot_url: secrets.required("BOT_URL")?,
        })
    } else {
        None
    };

    let yookassa = if secrets.flag("YOOKASSA_ENABLED")? {
        Some(YookassaConfig {
            shop_id: secrets.required("YOOKASSA_SHOP_ID")?,
            secret_key: secrets.required("YOOKASSA_SECRET_KEY")?,
            api_url: secrets
                .optional("YOOKASSA_URL")
                .unwrap_or_else(|| "https://api.yookassa.ru/v3".to_string()),
            return_url: secrets.required("BOT_URL")?,
        })
    } else {
        None
    };

    let tribute = if secrets.flag("TRIBUTE_ENABLED")? {
        Some(TributeConfig {
            api_key: secrets.required("TRIBUTE_API_KEY")?,
            payment_url: secrets.optional("TRIBUTE_PAYMENT_URL"),
            currency: secrets.optional("TRIBUTE_CURRENCY").unwrap_or_else(|| "RUB".to_string()),
        })
    } else {
        None
    };

    let stars_enabled = secrets.flag("TELEGRAM_STARS_ENABLED")?;
    if stars_enabled && pricing.stars.is_empty() {
        return Err(ConfigError::Missing("STARS_PRICE_1".to_string()));
    }

    let config = AppConfig {
        telegram: TelegramConfig {
            token: secrets.required("TELEGRAM_TOKEN")?,
            admin_id: secrets.parse_required::<i64>("ADMIN_TELEGRAM_ID")?,
        },
        storage: StorageConfig {
            turso_url: secrets.required("TURSO_URL")?,
            turso_token: secrets.optional("TURSO_TOKEN").unwrap_or_default(),
            redis_url: secrets.optional("REDIS_URL"),
        },
        vpn: VpnConfig {
            url: secrets.required("REMNAWAVE_URL")?,
            token: secrets.required("REMNAWAVE_TOKEN")?,
            tag: secrets.optional("REMNAWAVE_TAG"),
            squads: parse_squads(secrets.optional("SQUAD_UUIDS"))?,
        },
        plan: PlanConfig {
            traffic_limit_bytes: secrets.parse_or::<i64>("TRAFFIC_LIMIT", 0)? * BYTES_IN_GB,
            days_in_month: secrets.parse_or::<i64>("DAYS_IN_MONTH", 30)?,
            trial_days: secrets.parse_or::<i64>("TRIAL_DAYS", 0)?,
            trial_traffic_limit_bytes: secrets.parse_or::<i64>("TRIAL_TRAFFIC_LIMIT", 0)? * BYTES_IN_GB,
            referral_days: secrets.parse_or::<i64>("REFERRAL_DAYS", 0)?,
        },
        pricing,
        crypto_pay,
        yookassa,
        stars_enabled,
        tribute,
        webhook: WebhookConfig {
            path_prefix: secrets
                .optional("WEBHOOK_PATH_PREFIX")
                .unwrap_or_else(|| "/webhook".to_string())
                .trim_end_matches('/')
                .to_string(),
        },
        interaction: InteractionConfig {
            cache_capacity: secrets.parse_or::<usize>("INTERACTION_CACHE_CAPACITY", 10_000)?,
            pending_ttl_secs: secrets.parse_or::<u64>("PENDING_ACTION_TTL_SECS", 600)?,
            payment_message_ttl_secs: secrets.parse_or::<u64>("PAYMENT_MESSAGE_TTL_SECS", 3600)?,
        },
        scheduler: SchedulerConfig {
            sweep_interval_secs: secrets.parse_or::<u64>("SWEEP_INTERVAL_SECS", 24 * 60 * 60)?,
        },
    };

    info!("AppConfig built");
    Ok(config)
}

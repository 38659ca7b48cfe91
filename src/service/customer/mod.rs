mod model;
mod repository;

pub use model::{Customer, ExpiringCustomer, Registration};
pub use repository::{CustomerRepository, TursoCustomerRepository};

use std::sync::Arc;

use super::referral::{parse_referral_payload, ReferralService};
use crate::storage::StorageError;
use crate::utils::mask_id;

pub const SUPPORTED_LANGUAGES: [&str; 2] = ["en", "ru"];

/// Maps a Telegram language code such as `ru-RU` onto a supported locale.
pub fn normalize_language(code: Option<&str>) -> String {
    let primary = code
        .unwrap_or_default()
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_lowercase();

    if SUPPORTED_LANGUAGES.contains(&primary.as_str()) {
        primary
    } else {
        SUPPORTED_LANGUAGES[0].to_string()
    }
}

#[derive(Clone)]
pub struct CustomerService {
    customers: Arc<dyn CustomerRepository>,
    referrals: ReferralService,
}

impl CustomerService {
    pub fn new(customers: Arc<dyn CustomerRepository>, referrals: ReferralService) -> Self {
        info!("Initializing CustomerService...");
        info!("CustomerService initialized");
        Self { customers, referrals }
    }

    pub async fn find(&self, telegram_id: i64) -> Result<Option<Customer>, StorageError> {
        self.customers.find_by_telegram_id(telegram_id).await
    }

    /// Handles `/start`: creates the customer on first contact and records who invited them.
    pub async fn register(
        &self,
        telegram_id: i64,
        language_code: Option<&str>,
        start_payload: &str,
    ) -> Result<Registration, StorageError> {
        let language = normalize_language(language_code);

        if let Some(mut customer) = self.customers.find_by_telegram_id(telegram_id).await? {
            if customer.language != language {
                self.customers.update_language(customer.id, &language).await?;
                customer.language = language;
            }
            return Ok(Registration {
                customer,
                created: false,
                referred_by: None,
            });
        }

        let customer = self.customers.create(telegram_id, &language).await?;
        info!("New customer {} registered", mask_id(telegram_id));

        let mut referred_by = None;
        if let Some(referrer_telegram_id) = parse_referral_payload(start_payload) {
            if self.customers.find_by_telegram_id(referrer_telegram_id).await?.is_some() {
                referred_by = self
                    .referrals
                    .attribute(referrer_telegram_id, telegram_id)
                    .await?
                    .map(|r| r.referrer_telegram_id);
            } else {
                warn!("Referral payload names unknown customer {}", mask_id(referrer_telegram_id));
            }
        }

        Ok(Registration {
            customer,
            created: true,
            referred_by,
        })
    }
}

use std::{sync::Arc, time::Duration};

use teloxide::{adaptors::Throttle, Bot};

use crate::{
    config::AppConfig,
    error::BotResult,
    runtime::CacheManager,
    storage::{StorageManager, TursoClient},
};

pub mod customer;
pub mod expiration;
pub mod interaction;
pub mod notify;
pub mod payment;
pub mod provision;
pub mod purchase;
pub mod referral;
pub mod subscription;

use customer::{CustomerRepository, CustomerService, TursoCustomerRepository};
use expiration::ExpirationSweep;
use interaction::InteractionService;
use notify::{Notifier, TelegramNotifier};
use payment::{CryptoPayBackend, PaymentBackends, StarsBackend, TributeBackend, YookassaBackend};
use provision::{RemnawaveClient, VpnProvisioner};
use purchase::{PurchaseRepository, PurchaseService, TursoPurchaseRepository};
use referral::{ReferralRepository, ReferralService, TursoReferralRepository};
use subscription::{SubscriptionRepository, SubscriptionService, TursoSubscriptionRepository};

#[derive(Clone)]
pub struct Repositories {
    pub customers: Arc<dyn CustomerRepository>,
    pub purchases: Arc<dyn PurchaseRepository>,
    pub subscriptions: Arc<dyn SubscriptionRepository>,
    pub referrals: Arc<dyn ReferralRepository>,
}

impl Repositories {
    pub fn turso(turso: &TursoClient) -> Self {
        Self {
            customers: Arc::new(TursoCustomerRepository::new(turso.clone())),
            purchases: Arc::new(TursoPurchaseRepository::new(turso.clone())),
            subscriptions: Arc::new(TursoSubscriptionRepository::new(turso.clone())),
            referrals: Arc::new(TursoReferralRepository::new(turso.clone())),
        }
    }
}

#[derive(Clone)]
pub struct ServiceRegistry {
    pub repositories: Repositories,
    pub customer: CustomerService,
    pub referral: ReferralService,
    pub subscription: SubscriptionService,
    pub purchase: Arc<PurchaseService>,
    pub sweep: Arc<ExpirationSweep>,
    pub interaction: InteractionService,
    pub notifier: Arc<dyn Notifier>,
    pub provisioner: Arc<dyn VpnProvisioner>,
    pub yookassa: Option<Arc<YookassaBackend>>,
}

impl ServiceRegistry {
    pub async fn new(config: &AppConfig, storage: &StorageManager, bot: Throttle<Bot>) -> BotResult<Self> {
        info!("Initializing service registry");

        let repositories = Repositories::turso(storage.turso());

        let cache = CacheManager::new(config.interaction.cache_capacity, storage.redis().cloned());
        let interaction = InteractionService::new(
            cache,
            Duration::from_secs(config.interaction.pending_ttl_secs),
            Duration::from_secs(config.interaction.payment_message_ttl_secs),
        );

        let notifier: Arc<dyn Notifier> = Arc::new(TelegramNotifier::new(bot));
        let provisioner: Arc<dyn VpnProvisioner> = Arc::new(RemnawaveClient::new(&config.vpn)?);

        let backends = PaymentBackends::new();
        if let Some(crypto_pay) = &config.crypto_pay {
            backends.register(Arc::new(CryptoPayBackend::new(crypto_pay.clone())?));
        }
        let mut yookassa = None;
        if let Some(yookassa_config) = &config.yookassa {
            let backend = Arc::new(YookassaBackend::new(yookassa_config.clone())?);
            backends.register(backend.clone());
            yookassa = Some(backend);
        }
        if config.stars_enabled {
            backends.register(Arc::new(StarsBackend::new(config.telegram.token.clone())?));
        }
        if let Some(tribute) = &config.tribute {
            backends.register(Arc::new(TributeBackend::new(tribute.currency.clone())));
        }

        let referral = ReferralService::new(repositories.referrals.clone());
        let customer = CustomerService::new(repositories.customers.clone(), referral.clone());
        let subscription = SubscriptionService::new(repositories.customers.clone(), repositories.subscriptions.clone());

        let purchase = Arc::new(PurchaseService::new(
            repositories.clone(),
            backends,
            provisioner.clone(),
            notifier.clone(),
            interaction.clone(),
            config.plan.clone(),
        ));

        let sweep = Arc::new(ExpirationSweep::new(
            repositories.customers.clone(),
            repositories.purchases.clone(),
            purchase.clone(),
            notifier.clone(),
        ));

        info!("Service registry initialized");

        Ok(Self {
            repositories,
            customer,
            referral,
            subscription,
            purchase,
            sweep,
            interaction,
            notifier,
            provisioner,
            yookassa,
        })
    }
}

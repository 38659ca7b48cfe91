//! In-memory stand-ins for the database, VPN panel, payment providers and Telegram.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use teloxide::types::InlineKeyboardMarkup;

use crate::config::PlanConfig;
use crate::runtime::CacheManager;
use crate::service::customer::{Customer, CustomerRepository, ExpiringCustomer};
use crate::service::interaction::InteractionService;
use crate::service::notify::{NotifyError, Notifier};
use crate::service::payment::{GatewayError, Invoice, PaymentBackend, PaymentBackends};
use crate::service::provision::{account_username, AccountRequest, ProvisionError, VpnAccount, VpnProvisioner};
use crate::service::purchase::{InvoiceKind, NewPurchase, Purchase, PurchaseRepository, PurchaseService, PurchaseStatus};
use crate::service::referral::{Referral, ReferralRepository};
use crate::service::subscription::{next_sequence, NewSubscription, Subscription, SubscriptionRepository};
use crate::service::Repositories;
use crate::storage::{StorageError, TursoClient};

#[derive(Default)]
struct Tables {
    next_id: i64,
    customers: Vec<Customer>,
    purchases: Vec<Purchase>,
    subscriptions: Vec<Subscription>,
    referrals: Vec<Referral>,
    settle_clock: Option<DateTime<Utc>>,
}

impl Tables {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert_subscription(&mut self, new: NewSubscription) -> Subscription {
        let subscription = Subscription {
            id: self.id(),
            customer_id: new.customer_id,
            sequence: new.sequence,
            link: new.link,
            expire_at: new.expire_at,
            name: new.name,
            description: new.description,
            is_active: true,
            created_at: Utc::now(),
        };
        if let Some(customer) = self.customers.iter_mut().find(|c| c.id == subscription.customer_id) {
            customer.subscription_link = Some(subscription.link.clone());
            customer.expire_at = Some(subscription.expire_at);
        }
        self.subscriptions.push(subscription.clone());
        subscription
    }

    fn next_sequence(&self, customer_id: i64) -> i64 {
        let owned = self.subscriptions.iter().filter(|s| s.customer_id == customer_id);
        let active = owned.clone().filter(|s| s.is_active).count() as i64;
        let max_issued = owned.map(|s| s.sequence).max().unwrap_or(0);
        next_sequence(active, max_issued)
    }
}

/// A local database file with the schema applied, removed again on drop.
pub struct TempDatabase {
    pub turso: TursoClient,
    path: PathBuf,
}

impl TempDatabase {
    pub async fn new() -> Self {
        let path = std::env::temp_dir().join(format!("vpnshop-test-{}.db", uuid::Uuid::new_v4()));
        let turso = TursoClient::new(&format!("file:{}", path.display()), "")
            .await
            .unwrap();
        Self { turso, path }
    }
}

impl Drop for TempDatabase {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm", "-info"] {
            let _ = std::fs::remove_file(format!("{}{}", self.path.display(), suffix));
        }
    }
}

pub fn new_subscription(customer_id: i64, sequence: i64, expire_at: DateTime<Utc>) -> NewSubscription {
    NewSubscription {
        customer_id,
        sequence,
        link: format!("https://vpn.test/sub/{}/{}", customer_id, sequence),
        expire_at,
        name: format!("Subscription #{}", sequence),
        description: "test".to_string(),
    }
}

/// Implements every repository trait over plain vectors.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn repositories(self: &Arc<Self>) -> Repositories {
        Repositories {
            customers: self.clone(),
            purchases: self.clone(),
            subscriptions: self.clone(),
            referrals: self.clone(),
        }
    }

    pub fn add_customer(&self, telegram_id: i64) -> Customer {
        let mut tables = self.tables.lock().unwrap();
        let customer = Customer {
            id: tables.id(),
            telegram_id,
            language: "en".to_string(),
            subscription_link: None,
            expire_at: None,
            created_at: Utc::now(),
        };
        tables.customers.push(customer.clone());
        customer
    }

    /// An active subscription expiring `days` from now.
    pub fn add_subscription(&self, customer_id: i64, days: i64) -> Subscription {
        self.add_subscription_expiring(customer_id, Utc::now() + Duration::days(days))
    }

    pub fn add_subscription_expiring(&self, customer_id: i64, expire_at: DateTime<Utc>) -> Subscription {
        let mut tables = self.tables.lock().unwrap();
        let sequence = tables.next_sequence(customer_id);
        tables.insert_subscription(NewSubscription {
            customer_id,
            sequence,
            link: format!("https://vpn.test/seed/{}/{}", customer_id, sequence),
            expire_at,
            name: format!("Subscription #{}", sequence),
            description: "seeded".to_string(),
        })
    }

    pub fn add_purchase(&self, customer_id: i64, kind: InvoiceKind, status: PurchaseStatus, months: i64) -> Purchase {
        let mut tables = self.tables.lock().unwrap();
        let purchase = Purchase {
            id: tables.id(),
            customer_id,
            invoice_kind: kind,
            status,
            amount: 100.0 * months as f64,
            currency: "RUB".to_string(),
            months,
            external_id: None,
            payment_url: None,
            auto_renew: kind.is_recurring(),
            created_at: Utc::now(),
            paid_at: None,
        };
        tables.purchases.push(purchase.clone());
        purchase
    }

    pub fn set_paid_at(&self, purchase_id: i64, paid_at: DateTime<Utc>) {
        let mut tables = self.tables.lock().unwrap();
        if let Some(purchase) = tables.purchases.iter_mut().find(|p| p.id == purchase_id) {
            purchase.paid_at = Some(paid_at);
        }
    }

    /// Purchases settled from now on record `paid_at` instead of the wall clock.
    pub fn set_paid_at_on_settle(&self, paid_at: DateTime<Utc>) {
        self.tables.lock().unwrap().settle_clock = Some(paid_at);
    }

    pub fn add_referral(&self, referrer_telegram_id: i64, referee_telegram_id: i64) -> Referral {
        let mut tables = self.tables.lock().unwrap();
        let referral = Referral {
            id: tables.id(),
            referrer_telegram_id,
            referee_telegram_id,
            bonus_granted: false,
            used_at: Utc::now(),
        };
        tables.referrals.push(referral.clone());
        referral
    }

    pub fn customer(&self, id: i64) -> Option<Customer> {
        self.tables.lock().unwrap().customers.iter().find(|c| c.id == id).cloned()
    }

    pub fn purchase(&self, id: i64) -> Option<Purchase> {
        self.tables.lock().unwrap().purchases.iter().find(|p| p.id == id).cloned()
    }

    pub fn purchases(&self) -> Vec<Purchase> {
        self.tables.lock().unwrap().purchases.clone()
    }

    pub fn subscription(&self, id: i64) -> Option<Subscription> {
        self.tables.lock().unwrap().subscriptions.iter().find(|s| s.id == id).cloned()
    }

    pub fn subscriptions_of(&self, customer_id: i64) -> Vec<Subscription> {
        self.tables
            .lock()
            .unwrap()
            .subscriptions
            .iter()
            .filter(|s| s.customer_id == customer_id)
            .cloned()
            .collect()
    }

    pub fn referral_of(&self, referee_telegram_id: i64) -> Option<Referral> {
        self.tables
            .lock()
            .unwrap()
            .referrals
            .iter()
            .find(|r| r.referee_telegram_id == referee_telegram_id)
            .cloned()
    }
}

#[async_trait]
impl CustomerRepository for MemoryStore {
    async fn find_by_id(&self, id: i64) -> Result<Option<Customer>, StorageError> {
        Ok(self.customer(id))
    }

    async fn find_by_telegram_id(&self, telegram_id: i64) -> Result<Option<Customer>, StorageError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.customers.iter().find(|c| c.telegram_id == telegram_id).cloned())
    }

    async fn create(&self, telegram_id: i64, language: &str) -> Result<Customer, StorageError> {
        let mut customer = self.add_customer(telegram_id);
        customer.language = language.to_string();
        CustomerRepository::update_language(self, customer.id, language).await?;
        Ok(customer)
    }

    async fn update_language(&self, id: i64, language: &str) -> Result<(), StorageError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(customer) = tables.customers.iter_mut().find(|c| c.id == id) {
            customer.language = language.to_string();
        }
        Ok(())
    }

    async fn find_expiring_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<ExpiringCustomer>, StorageError> {
        let tables = self.tables.lock().unwrap();
        let mut expiring = Vec::new();
        for customer in &tables.customers {
            let earliest = tables
                .subscriptions
                .iter()
                .filter(|s| s.customer_id == customer.id && s.is_active && s.expire_at >= start)
                .map(|s| s.expire_at)
                .min();
            if let Some(expire_at) = earliest.filter(|at| *at <= end) {
                expiring.push(ExpiringCustomer {
                    customer: customer.clone(),
                    expire_at,
                });
            }
        }
        Ok(expiring)
    }

    async fn all_telegram_ids(&self) -> Result<Vec<i64>, StorageError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables.customers.iter().map(|c| c.telegram_id).collect())
    }
}

#[async_trait]
impl PurchaseRepository for MemoryStore {
    async fn create(&self, new: NewPurchase) -> Result<Purchase, StorageError> {
        let mut purchase = self.add_purchase(new.customer_id, new.invoice_kind, PurchaseStatus::New, new.months);
        let mut tables = self.tables.lock().unwrap();
        if let Some(stored) = tables.purchases.iter_mut().find(|p| p.id == purchase.id) {
            stored.amount = new.amount;
            stored.currency = new.currency.clone();
        }
        purchase.amount = new.amount;
        purchase.currency = new.currency;
        Ok(purchase)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Purchase>, StorageError> {
        Ok(self.purchase(id))
    }

    async fn find_by_external_id(&self, kind: InvoiceKind, external_id: &str) -> Result<Option<Purchase>, StorageError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .purchases
            .iter()
            .rev()
            .find(|p| p.invoice_kind == kind && p.external_id.as_deref() == Some(external_id))
            .cloned())
    }

    async fn mark_pending(
        &self,
        id: i64,
        external_id: Option<&str>,
        payment_url: Option<&str>,
    ) -> Result<bool, StorageError> {
        let mut tables = self.tables.lock().unwrap();
        match tables.purchases.iter_mut().find(|p| p.id == id && p.status == PurchaseStatus::New) {
            Some(purchase) => {
                purchase.status = PurchaseStatus::Pending;
                purchase.external_id = external_id.map(str::to_string);
                purchase.payment_url = payment_url.map(str::to_string);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn mark_cancelled(&self, id: i64) -> Result<bool, StorageError> {
        let mut tables = self.tables.lock().unwrap();
        match tables
            .purchases
            .iter_mut()
            .find(|p| p.id == id && matches!(p.status, PurchaseStatus::New | PurchaseStatus::Pending))
        {
            Some(purchase) => {
                purchase.status = PurchaseStatus::Cancelled;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn settle(&self, id: i64, subscription: NewSubscription) -> Result<Option<Subscription>, StorageError> {
        let mut tables = self.tables.lock().unwrap();
        let paid_at = tables.settle_clock.unwrap_or_else(Utc::now);
        match tables
            .purchases
            .iter_mut()
            .find(|p| p.id == id && p.status == PurchaseStatus::Pending)
        {
            Some(purchase) => {
                purchase.status = PurchaseStatus::Paid;
                purchase.paid_at = Some(paid_at);
            }
            None => return Ok(None),
        }
        Ok(Some(tables.insert_subscription(subscription)))
    }

    async fn find_latest_active_recurring(&self, customer_ids: &[i64]) -> Result<Vec<Purchase>, StorageError> {
        let tables = self.tables.lock().unwrap();
        Ok(customer_ids
            .iter()
            .filter_map(|customer_id| {
                tables
                    .purchases
                    .iter()
                    .filter(|p| {
                        p.customer_id == *customer_id
                            && p.invoice_kind == InvoiceKind::SubscriptionPlatform
                            && p.status == PurchaseStatus::Paid
                    })
                    .max_by_key(|p| p.id)
                    .filter(|p| p.auto_renew)
                    .cloned()
            })
            .collect())
    }

    async fn stop_auto_renew(&self, customer_id: i64) -> Result<u64, StorageError> {
        let mut tables = self.tables.lock().unwrap();
        let mut changed = 0;
        for purchase in tables
            .purchases
            .iter_mut()
            .filter(|p| p.customer_id == customer_id && p.invoice_kind.is_recurring() && p.auto_renew)
        {
            purchase.auto_renew = false;
            changed += 1;
        }
        Ok(changed)
    }
}

#[async_trait]
impl SubscriptionRepository for MemoryStore {
    async fn create(&self, new: NewSubscription) -> Result<Subscription, StorageError> {
        Ok(self.tables.lock().unwrap().insert_subscription(new))
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Subscription>, StorageError> {
        Ok(self.subscription(id))
    }

    async fn find_active(&self, customer_id: i64) -> Result<Vec<Subscription>, StorageError> {
        let mut active: Vec<Subscription> = self
            .subscriptions_of(customer_id)
            .into_iter()
            .filter(|s| s.is_active)
            .collect();
        active.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(active)
    }

    async fn next_sequence(&self, customer_id: i64) -> Result<i64, StorageError> {
        Ok(self.tables.lock().unwrap().next_sequence(customer_id))
    }

    async fn rename(&self, id: i64, name: &str) -> Result<bool, StorageError> {
        let mut tables = self.tables.lock().unwrap();
        match tables.subscriptions.iter_mut().find(|s| s.id == id) {
            Some(subscription) => {
                subscription.name = name.to_string();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn deactivate(&self, id: i64) -> Result<bool, StorageError> {
        let mut tables = self.tables.lock().unwrap();
        match tables.subscriptions.iter_mut().find(|s| s.id == id && s.is_active) {
            Some(subscription) => {
                subscription.is_active = false;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl ReferralRepository for MemoryStore {
    async fn create(&self, referrer_telegram_id: i64, referee_telegram_id: i64) -> Result<Referral, StorageError> {
        if let Some(existing) = self.referral_of(referee_telegram_id) {
            return Ok(existing);
        }
        Ok(self.add_referral(referrer_telegram_id, referee_telegram_id))
    }

    async fn find_by_referee(&self, referee_telegram_id: i64) -> Result<Option<Referral>, StorageError> {
        Ok(self.referral_of(referee_telegram_id))
    }

    async fn grant_bonus(&self, id: i64, subscription: NewSubscription) -> Result<Option<Subscription>, StorageError> {
        let mut tables = self.tables.lock().unwrap();
        match tables.referrals.iter_mut().find(|r| r.id == id && !r.bonus_granted) {
            Some(referral) => referral.bonus_granted = true,
            None => return Ok(None),
        }
        Ok(Some(tables.insert_subscription(subscription)))
    }

    async fn count_by_referrer(&self, referrer_telegram_id: i64) -> Result<i64, StorageError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .referrals
            .iter()
            .filter(|r| r.referrer_telegram_id == referrer_telegram_id)
            .count() as i64)
    }
}

/// Provisioner that records requests and can be told to fail for some customers.
#[derive(Default)]
pub struct FakeProvisioner {
    requests: Mutex<Vec<AccountRequest>>,
    failing_customers: Mutex<HashSet<i64>>,
    delay_ms: AtomicU64,
}

impl FakeProvisioner {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_for(&self, customer_id: i64) {
        self.failing_customers.lock().unwrap().insert(customer_id);
    }

    pub fn recover(&self, customer_id: i64) {
        self.failing_customers.lock().unwrap().remove(&customer_id);
    }

    pub fn set_delay_ms(&self, delay_ms: u64) {
        self.delay_ms.store(delay_ms, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<AccountRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl VpnProvisioner for FakeProvisioner {
    async fn create_account(&self, request: &AccountRequest) -> Result<VpnAccount, ProvisionError> {
        let delay_ms = self.delay_ms.load(Ordering::SeqCst);
        if delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        }

        let attempt = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() as u64
        };
        if self.failing_customers.lock().unwrap().contains(&request.customer_id) {
            return Err(ProvisionError::Api("panel unavailable".to_string()));
        }

        let username = account_username(request.customer_id, request.telegram_id, request.sequence, 0, attempt);
        Ok(VpnAccount {
            subscription_url: format!("https://vpn.test/sub/{}", username),
            username,
            expire_at: Utc::now() + Duration::days(request.days),
        })
    }

    async fn health(&self) -> Result<(), ProvisionError> {
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SentMessage {
    pub chat_id: i64,
    pub text: String,
    pub has_keyboard: bool,
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<SentMessage>>,
    deleted: Mutex<Vec<(i64, i32)>>,
    failing_chats: Mutex<HashSet<i64>>,
    next_message_id: AtomicI32,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_for(&self, chat_id: i64) {
        self.failing_chats.lock().unwrap().insert(chat_id);
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_to(&self, chat_id: i64) -> Vec<SentMessage> {
        self.sent().into_iter().filter(|m| m.chat_id == chat_id).collect()
    }

    pub fn deleted(&self) -> Vec<(i64, i32)> {
        self.deleted.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, chat_id: i64, text: &str, keyboard: Option<InlineKeyboardMarkup>) -> Result<i32, NotifyError> {
        if self.failing_chats.lock().unwrap().contains(&chat_id) {
            return Err(NotifyError::Telegram("bot was blocked by the user".to_string()));
        }
        self.sent.lock().unwrap().push(SentMessage {
            chat_id,
            text: text.to_string(),
            has_keyboard: keyboard.is_some(),
        });
        Ok(self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn delete(&self, chat_id: i64, message_id: i32) -> Result<(), NotifyError> {
        self.deleted.lock().unwrap().push((chat_id, message_id));
        Ok(())
    }
}

/// Payment backend that hands out predictable invoices.
pub struct FakeBackend {
    kind: InvoiceKind,
    failing: AtomicBool,
}

impl FakeBackend {
    pub fn new(kind: InvoiceKind) -> Arc<Self> {
        Arc::new(Self {
            kind,
            failing: AtomicBool::new(false),
        })
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl PaymentBackend for FakeBackend {
    fn kind(&self) -> InvoiceKind {
        self.kind
    }

    fn currency(&self) -> &str {
        "RUB"
    }

    async fn create_invoice(&self, purchase: &Purchase, _customer: &Customer) -> Result<Invoice, GatewayError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(GatewayError::ApiError("provider is down".to_string()));
        }
        if self.kind.is_recurring() {
            return Ok(Invoice::default());
        }
        Ok(Invoice {
            url: Some(format!("https://pay.test/{}", purchase.id)),
            external_id: Some(format!("ext-{}", purchase.id)),
        })
    }
}

pub fn plan() -> PlanConfig {
    PlanConfig {
        traffic_limit_bytes: 100,
        days_in_month: 30,
        trial_days: 3,
        trial_traffic_limit_bytes: 10,
        referral_days: 7,
    }
}

pub fn interaction() -> InteractionService {
    InteractionService::new(
        CacheManager::memory_only(64),
        std::time::Duration::from_secs(60),
        std::time::Duration::from_secs(60),
    )
}

/// Everything a purchase test needs, wired together.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub provisioner: Arc<FakeProvisioner>,
    pub notifier: Arc<RecordingNotifier>,
    pub interaction: InteractionService,
    pub service: Arc<PurchaseService>,
}

impl Harness {
    pub fn new(kinds: &[InvoiceKind]) -> Self {
        Self::with_plan(kinds, plan())
    }

    pub fn with_plan(kinds: &[InvoiceKind], plan: PlanConfig) -> Self {
        let store = MemoryStore::new();
        let provisioner = FakeProvisioner::new();
        let notifier = RecordingNotifier::new();
        let interaction = interaction();

        let backends = PaymentBackends::new();
        for kind in kinds {
            backends.register(FakeBackend::new(*kind));
        }

        let service = Arc::new(PurchaseService::new(
            store.repositories(),
            backends,
            provisioner.clone(),
            notifier.clone(),
            interaction.clone(),
            plan,
        ));

        Self {
            store,
            provisioner,
            notifier,
            interaction,
            service,
        }
    }
}

mod error;
mod model;
mod repository;

pub use error::PaymentError;
pub use model::{
    CreatedPurchase, InvoiceKind, NewPurchase, ProcessOutcome, Purchase, PurchaseStatus, ReferralOutcome,
};
pub use repository::{PurchaseRepository, TursoPurchaseRepository};

use async_trait::async_trait;
use std::sync::Arc;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use super::customer::Customer;
use super::interaction::InteractionService;
use super::notify::Notifier;
use super::payment::PaymentBackends;
use super::provision::{AccountRequest, VpnProvisioner};
use super::subscription::{NewSubscription, Subscription};
use super::Repositories;
use crate::config::PlanConfig;
use crate::runtime::KeyedLocks;
use crate::utils::mask_id;

/// The two orchestrator operations the expiration sweep depends on.
#[async_trait]
pub trait PurchaseProcessor: Send + Sync {
    async fn create_purchase(
        &self,
        amount: f64,
        months: i64,
        customer: &Customer,
        kind: InvoiceKind,
    ) -> Result<CreatedPurchase, PaymentError>;

    async fn process_purchase(&self, purchase_id: i64) -> Result<ProcessOutcome, PaymentError>;
}

/// Drives a purchase from invoice creation to a provisioned subscription.
#[derive(Clone)]
pub struct PurchaseService {
    repositories: Repositories,
    backends: PaymentBackends,
    provisioner: Arc<dyn VpnProvisioner>,
    notifier: Arc<dyn Notifier>,
    interaction: InteractionService,
    plan: PlanConfig,
    locks: KeyedLocks,
}

impl PurchaseService {
    pub fn new(
        repositories: Repositories,
        backends: PaymentBackends,
        provisioner: Arc<dyn VpnProvisioner>,
        notifier: Arc<dyn Notifier>,
        interaction: InteractionService,
        plan: PlanConfig,
    ) -> Self {
        info!("Initializing PurchaseService...");
        info!("PurchaseService initialized");
        Self {
            repositories,
            backends,
            provisioner,
            notifier,
            interaction,
            plan,
            locks: KeyedLocks::new(),
        }
    }

    pub fn backends(&self) -> &PaymentBackends {
        &self.backends
    }

    pub fn trial_enabled(&self) -> bool {
        self.plan.trial_days > 0
    }

    /// Marks a purchase that was never paid as cancelled. Paid purchases stay paid.
    pub async fn cancel_purchase(&self, purchase_id: i64) -> Result<bool, PaymentError> {
        let cancelled = self.repositories.purchases.mark_cancelled(purchase_id).await?;
        if cancelled {
            info!("Purchase {} cancelled", purchase_id);
            if let Some(message) = self.interaction.take_payment_message(purchase_id).await? {
                if let Err(e) = self.notifier.delete(message.chat_id, message.message_id).await {
                    warn!("Failed to delete payment message for purchase {}: {}", purchase_id, e);
                }
            }
        }
        Ok(cancelled)
    }

    /// Records a purchase the subscription platform has already billed. Deliveries carrying
    /// the same reference resolve to the first purchase recorded for it.
    pub async fn record_platform_purchase(
        &self,
        amount: f64,
        months: i64,
        customer: &Customer,
        reference: &str,
    ) -> Result<Purchase, PaymentError> {
        let kind = InvoiceKind::SubscriptionPlatform;
        let backend = self
            .backends
            .get(kind)
            .ok_or_else(|| PaymentError::UnsupportedInvoiceKind(kind.to_string()))?;

        let _guard = self.locks.lock(customer.id).await;

        if let Some(existing) = self.repositories.purchases.find_by_external_id(kind, reference).await? {
            info!("Platform billing {} already recorded as purchase {}", reference, existing.id);
            return Ok(existing);
        }

        let purchase = self
            .repositories
            .purchases
            .create(NewPurchase {
                customer_id: customer.id,
                invoice_kind: kind,
                amount,
                currency: backend.currency().to_string(),
                months,
            })
            .await?;
        self.repositories
            .purchases
            .mark_pending(purchase.id, Some(reference), None)
            .await?;

        info!(
            "Purchase {} recorded for {}: {} month(s) billed by the platform",
            purchase.id,
            mask_id(customer.telegram_id),
            months
        );

        Ok(Purchase {
            status: PurchaseStatus::Pending,
            external_id: Some(reference.to_string()),
            ..purchase
        })
    }

    /// Grants the free trial. Returns `None` when trials are switched off.
    pub async fn activate_trial(&self, telegram_id: i64) -> Result<Option<Subscription>, PaymentError> {
        if !self.trial_enabled() {
            return Ok(None);
        }

        let customer = self
            .repositories
            .customers
            .find_by_telegram_id(telegram_id)
            .await?
            .ok_or(PaymentError::CustomerNotFound(telegram_id))?;

        let _guard = self.locks.lock(customer.id).await;

        let sequence = self.repositories.subscriptions.next_sequence(customer.id).await?;
        if sequence != 1 {
            return Err(PaymentError::TrialUnavailable(telegram_id));
        }

        let account = self
            .provisioner
            .create_account(&AccountRequest {
                customer_id: customer.id,
                telegram_id: customer.telegram_id,
                sequence,
                days: self.plan.trial_days,
                traffic_limit_bytes: self.plan.trial_traffic_limit_bytes,
            })
            .await?;

        let subscription = self
            .repositories
            .subscriptions
            .create(NewSubscription {
                customer_id: customer.id,
                sequence,
                link: account.subscription_url,
                expire_at: account.expire_at,
                name: subscription_name(&customer.language, sequence),
                description: t!(
                    "subscription.trial_description",
                    locale = customer.language.as_str(),
                    days = self.plan.trial_days
                )
                .to_string(),
            })
            .await?;

        info!("Trial activated for {} as #{}", mask_id(telegram_id), sequence);
        Ok(Some(subscription))
    }

    async fn settle_purchase(&self, purchase_id: i64) -> Result<(Customer, ProcessOutcome), PaymentError> {
        let customer_id = self
            .repositories
            .purchases
            .find_by_id(purchase_id)
            .await?
            .ok_or(PaymentError::PurchaseNotFound(purchase_id))?
            .customer_id;

        let _guard = self.locks.lock(customer_id).await;

        // re-read under the lock; a concurrent call may have settled it meanwhile
        let purchase = self
            .repositories
            .purchases
            .find_by_id(purchase_id)
            .await?
            .ok_or(PaymentError::PurchaseNotFound(purchase_id))?;

        let customer = self
            .repositories
            .customers
            .find_by_id(purchase.customer_id)
            .await?
            .ok_or(PaymentError::CustomerNotFound(purchase.customer_id))?;

        match purchase.status {
            PurchaseStatus::Pending => {}
            PurchaseStatus::Paid => {
                info!("Purchase {} already processed", purchase.id);
                return Ok((customer, ProcessOutcome::AlreadyProcessed));
            }
            status => {
                return Err(PaymentError::InvalidStatus {
                    id: purchase.id,
                    status,
                })
            }
        }

        self.clear_payment_message(purchase.id).await;

        let sequence = self.repositories.subscriptions.next_sequence(customer.id).await?;
        let account = self
            .provisioner
            .create_account(&AccountRequest {
                customer_id: customer.id,
                telegram_id: customer.telegram_id,
                sequence,
                days: purchase.months * self.plan.days_in_month,
                traffic_limit_bytes: self.plan.traffic_limit_bytes,
            })
            .await?;

        let new_subscription = NewSubscription {
            customer_id: customer.id,
            sequence,
            link: account.subscription_url,
            expire_at: account.expire_at,
            name: subscription_name(&customer.language, sequence),
            description: t!(
                "subscription.paid_description",
                locale = customer.language.as_str(),
                months = purchase.months
            )
            .to_string(),
        };

        let Some(subscription) = self
            .repositories
            .purchases
            .settle(purchase.id, new_subscription)
            .await?
        else {
            warn!(
                "Purchase {} was settled elsewhere, VPN account {} is left unused",
                purchase.id, account.username
            );
            return Ok((customer, ProcessOutcome::AlreadyProcessed));
        };

        info!(
            "Purchase {} paid, subscription #{} issued to {}",
            purchase.id,
            sequence,
            mask_id(customer.telegram_id)
        );

        Ok((
            customer,
            ProcessOutcome::Completed {
                subscription,
                referral: ReferralOutcome::NoReferral,
            },
        ))
    }

    async fn clear_payment_message(&self, purchase_id: i64) {
        match self.interaction.take_payment_message(purchase_id).await {
            Ok(Some(message)) => {
                if let Err(e) = self.notifier.delete(message.chat_id, message.message_id).await {
                    warn!("Failed to delete payment message for purchase {}: {}", purchase_id, e);
                }
            }
            Ok(None) => {}
            Err(e) => warn!("Failed to look up payment message for purchase {}: {}", purchase_id, e),
        }
    }

    async fn notify_activated(&self, customer: &Customer, subscription: &Subscription) {
        let text = t!(
            "messages.subscription_activated",
            locale = customer.language.as_str(),
            name = subscription.name.as_str(),
            link = subscription.link.as_str()
        );
        let keyboard = subscriptions_keyboard(&customer.language);
        if let Err(e) = self.notifier.send(customer.telegram_id, &text, Some(keyboard)).await {
            warn!("Failed to notify {} about activation: {}", mask_id(customer.telegram_id), e);
        }
    }

    async fn grant_referral_bonus(&self, referee: &Customer) -> ReferralOutcome {
        match self.try_grant_referral_bonus(referee).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    "Purchase for {} completed but the referral bonus failed: {}",
                    mask_id(referee.telegram_id),
                    e
                );
                ReferralOutcome::Failed(e.to_string())
            }
        }
    }

    async fn try_grant_referral_bonus(&self, referee: &Customer) -> Result<ReferralOutcome, PaymentError> {
        let Some(referral) = self.repositories.referrals.find_by_referee(referee.telegram_id).await? else {
            return Ok(ReferralOutcome::NoReferral);
        };
        if referral.bonus_granted {
            return Ok(ReferralOutcome::AlreadyGranted);
        }

        let referrer = self
            .repositories
            .customers
            .find_by_telegram_id(referral.referrer_telegram_id)
            .await?
            .ok_or(PaymentError::CustomerNotFound(referral.referrer_telegram_id))?;
        if referrer.id == referee.id {
            return Ok(ReferralOutcome::NoReferral);
        }

        // every grant for this referral goes to the same referrer, so its lock serializes them
        let _guard = self.locks.lock(referrer.id).await;

        let still_open = self
            .repositories
            .referrals
            .find_by_referee(referee.telegram_id)
            .await?
            .is_some_and(|r| !r.bonus_granted);
        if !still_open {
            return Ok(ReferralOutcome::AlreadyGranted);
        }

        let sequence = self.repositories.subscriptions.next_sequence(referrer.id).await?;
        let account = self
            .provisioner
            .create_account(&AccountRequest {
                customer_id: referrer.id,
                telegram_id: referrer.telegram_id,
                sequence,
                days: self.plan.referral_days,
                traffic_limit_bytes: self.plan.traffic_limit_bytes,
            })
            .await?;

        let new_subscription = NewSubscription {
            customer_id: referrer.id,
            sequence,
            link: account.subscription_url,
            expire_at: account.expire_at,
            name: t!(
                "subscription.referral_name",
                locale = referrer.language.as_str(),
                seq = sequence
            )
            .to_string(),
            description: t!(
                "subscription.referral_description",
                locale = referrer.language.as_str(),
                days = self.plan.referral_days
            )
            .to_string(),
        };

        let Some(subscription) = self
            .repositories
            .referrals
            .grant_bonus(referral.id, new_subscription)
            .await?
        else {
            warn!(
                "Referral {} bonus was granted elsewhere, VPN account {} is left unused",
                referral.id, account.username
            );
            return Ok(ReferralOutcome::AlreadyGranted);
        };

        info!(
            "Referral bonus #{} granted to {}",
            sequence,
            mask_id(referrer.telegram_id)
        );

        let text = t!("messages.referral_bonus_granted", locale = referrer.language.as_str());
        if let Err(e) = self
            .notifier
            .send(referrer.telegram_id, &text, Some(subscriptions_keyboard(&referrer.language)))
            .await
        {
            warn!("Failed to notify referrer {}: {}", mask_id(referrer.telegram_id), e);
        }

        Ok(ReferralOutcome::Granted {
            referrer_telegram_id: referrer.telegram_id,
            subscription,
        })
    }
}

#[async_trait]
impl PurchaseProcessor for PurchaseService {
    async fn create_purchase(
        &self,
        amount: f64,
        months: i64,
        customer: &Customer,
        kind: InvoiceKind,
    ) -> Result<CreatedPurchase, PaymentError> {
        let backend = self
            .backends
            .get(kind)
            .ok_or_else(|| PaymentError::UnsupportedInvoiceKind(kind.to_string()))?;

        let purchase = self
            .repositories
            .purchases
            .create(NewPurchase {
                customer_id: customer.id,
                invoice_kind: kind,
                amount,
                currency: backend.currency().to_string(),
                months,
            })
            .await?;

        let invoice = match backend.create_invoice(&purchase, customer).await {
            Ok(invoice) => invoice,
            Err(e) => {
                error!("Failed to create {} invoice for purchase {}: {}", kind, purchase.id, e);
                if let Err(cancel_err) = self.repositories.purchases.mark_cancelled(purchase.id).await {
                    error!("Failed to cancel purchase {}: {}", purchase.id, cancel_err);
                }
                return Err(e.into());
            }
        };

        self.repositories
            .purchases
            .mark_pending(purchase.id, invoice.external_id.as_deref(), invoice.url.as_deref())
            .await?;

        info!(
            "Purchase {} created for {}: {} month(s) via {}",
            purchase.id,
            mask_id(customer.telegram_id),
            months,
            kind
        );

        Ok(CreatedPurchase {
            purchase_id: purchase.id,
            payment_url: invoice.url,
        })
    }

    async fn process_purchase(&self, purchase_id: i64) -> Result<ProcessOutcome, PaymentError> {
        let (customer, outcome) = self.settle_purchase(purchase_id).await?;

        let subscription = match outcome {
            ProcessOutcome::Completed { subscription, .. } => subscription,
            other => return Ok(other),
        };

        self.notify_activated(&customer, &subscription).await;

        // the referee's lock is released by now; the bonus path takes the referrer's
        let referral = self.grant_referral_bonus(&customer).await;

        Ok(ProcessOutcome::Completed { subscription, referral })
    }
}

pub(crate) fn subscription_name(language: &str, sequence: i64) -> String {
    format!("{} #{}", t!("subscription.label", locale = language), sequence)
}

pub(crate) fn subscriptions_keyboard(language: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[InlineKeyboardButton::callback(
        t!("buttons.my_subscriptions", locale = language),
        "my_subscriptions",
    )]])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::interaction::PaymentMessage;
    use crate::testing::{plan, FakeBackend, Harness};

    #[tokio::test]
    async fn test_create_purchase_marks_pending_with_invoice() {
        let harness = Harness::new(&[InvoiceKind::Crypto]);
        let customer = harness.store.add_customer(100);

        let created = harness
            .service
            .create_purchase(300.0, 3, &customer, InvoiceKind::Crypto)
            .await
            .unwrap();

        let purchase = harness.store.purchase(created.purchase_id).unwrap();
        assert_eq!(purchase.status, PurchaseStatus::Pending);
        assert_eq!(purchase.months, 3);
        assert_eq!(purchase.external_id.as_deref(), Some(format!("ext-{}", purchase.id).as_str()));
        assert_eq!(created.payment_url, purchase.payment_url);
    }

    #[tokio::test]
    async fn test_unsupported_kind_creates_nothing() {
        let harness = Harness::new(&[InvoiceKind::Crypto]);
        let customer = harness.store.add_customer(100);

        let result = harness
            .service
            .create_purchase(10.0, 1, &customer, InvoiceKind::Stars)
            .await;

        assert!(matches!(result, Err(PaymentError::UnsupportedInvoiceKind(_))));
        assert!(harness.store.purchases().is_empty());
    }

    #[tokio::test]
    async fn test_backend_failure_cancels_purchase() {
        let harness = Harness::new(&[]);
        let backend = FakeBackend::new(InvoiceKind::HostedCheckout);
        backend.set_failing(true);
        harness.service.backends().register(backend);
        let customer = harness.store.add_customer(100);

        let result = harness
            .service
            .create_purchase(10.0, 1, &customer, InvoiceKind::HostedCheckout)
            .await;

        assert!(matches!(result, Err(PaymentError::Gateway(_))));
        let purchases = harness.store.purchases();
        assert_eq!(purchases.len(), 1);
        assert_eq!(purchases[0].status, PurchaseStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_process_is_idempotent() {
        let harness = Harness::new(&[InvoiceKind::Crypto]);
        let customer = harness.store.add_customer(100);
        let created = harness
            .service
            .create_purchase(100.0, 1, &customer, InvoiceKind::Crypto)
            .await
            .unwrap();

        let first = harness.service.process_purchase(created.purchase_id).await.unwrap();
        let second = harness.service.process_purchase(created.purchase_id).await.unwrap();

        let subscription = first.subscription().unwrap();
        assert_eq!(subscription.sequence, 1);
        assert_eq!(second, ProcessOutcome::AlreadyProcessed);
        assert_eq!(harness.provisioner.requests().len(), 1);
        assert_eq!(harness.store.subscriptions_of(customer.id).len(), 1);

        let purchase = harness.store.purchase(created.purchase_id).unwrap();
        assert_eq!(purchase.status, PurchaseStatus::Paid);
        assert!(purchase.paid_at.is_some());
    }

    #[tokio::test]
    async fn test_paid_days_follow_months() {
        let harness = Harness::new(&[InvoiceKind::Crypto]);
        let customer = harness.store.add_customer(100);
        let created = harness
            .service
            .create_purchase(600.0, 6, &customer, InvoiceKind::Crypto)
            .await
            .unwrap();

        harness.service.process_purchase(created.purchase_id).await.unwrap();

        let request = &harness.provisioner.requests()[0];
        assert_eq!(request.days, 6 * plan().days_in_month);
        assert_eq!(request.traffic_limit_bytes, plan().traffic_limit_bytes);
    }

    #[tokio::test]
    async fn test_second_purchase_gets_next_sequence() {
        let harness = Harness::new(&[InvoiceKind::Crypto]);
        let customer = harness.store.add_customer(100);
        harness.store.add_subscription(customer.id, 10);

        let created = harness
            .service
            .create_purchase(100.0, 1, &customer, InvoiceKind::Crypto)
            .await
            .unwrap();
        let outcome = harness.service.process_purchase(created.purchase_id).await.unwrap();

        let subscription = outcome.subscription().unwrap();
        assert_eq!(subscription.sequence, 2);
        assert!(subscription.name.ends_with("#2"));
        let refreshed = harness.store.customer(customer.id).unwrap();
        assert_eq!(refreshed.subscription_link.as_deref(), Some(subscription.link.as_str()));
    }

    #[tokio::test]
    async fn test_concurrent_purchases_get_distinct_sequences() {
        let harness = Harness::new(&[InvoiceKind::Crypto]);
        harness.provisioner.set_delay_ms(20);
        let customer = harness.store.add_customer(100);

        let mut ids = Vec::new();
        for _ in 0..3 {
            let created = harness
                .service
                .create_purchase(100.0, 1, &customer, InvoiceKind::Crypto)
                .await
                .unwrap();
            ids.push(created.purchase_id);
        }

        let handles: Vec<_> = ids
            .iter()
            .map(|id| {
                let service = harness.service.clone();
                let id = *id;
                tokio::spawn(async move { service.process_purchase(id).await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        let mut sequences: Vec<i64> = harness
            .store
            .subscriptions_of(customer.id)
            .iter()
            .map(|s| s.sequence)
            .collect();
        sequences.sort();
        assert_eq!(sequences, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_concurrent_duplicate_processing_provisions_once() {
        let harness = Harness::new(&[InvoiceKind::Crypto]);
        harness.provisioner.set_delay_ms(20);
        let customer = harness.store.add_customer(100);
        let created = harness
            .service
            .create_purchase(100.0, 1, &customer, InvoiceKind::Crypto)
            .await
            .unwrap();

        let a = harness.service.clone();
        let b = harness.service.clone();
        let id = created.purchase_id;
        let (first, second) = tokio::join!(a.process_purchase(id), b.process_purchase(id));

        let outcomes = [first.unwrap(), second.unwrap()];
        assert_eq!(
            outcomes.iter().filter(|o| **o == ProcessOutcome::AlreadyProcessed).count(),
            1
        );
        assert_eq!(harness.provisioner.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_new_or_cancelled_purchase_is_rejected() {
        let harness = Harness::new(&[InvoiceKind::Crypto]);
        let customer = harness.store.add_customer(100);
        let fresh = harness
            .store
            .add_purchase(customer.id, InvoiceKind::Crypto, PurchaseStatus::New, 1);
        let cancelled = harness
            .store
            .add_purchase(customer.id, InvoiceKind::Crypto, PurchaseStatus::Cancelled, 1);

        for id in [fresh.id, cancelled.id] {
            let result = harness.service.process_purchase(id).await;
            assert!(matches!(result, Err(PaymentError::InvalidStatus { .. })));
        }
        assert!(matches!(
            harness.service.process_purchase(9999).await,
            Err(PaymentError::PurchaseNotFound(9999))
        ));
        assert!(harness.provisioner.requests().is_empty());
    }

    #[tokio::test]
    async fn test_provisioning_failure_leaves_purchase_pending() {
        let harness = Harness::new(&[InvoiceKind::Crypto]);
        let customer = harness.store.add_customer(100);
        harness.provisioner.fail_for(customer.id);
        let created = harness
            .service
            .create_purchase(100.0, 1, &customer, InvoiceKind::Crypto)
            .await
            .unwrap();

        let result = harness.service.process_purchase(created.purchase_id).await;

        assert!(matches!(result, Err(PaymentError::Provisioning(_))));
        let purchase = harness.store.purchase(created.purchase_id).unwrap();
        assert_eq!(purchase.status, PurchaseStatus::Pending);
        assert!(harness.store.subscriptions_of(customer.id).is_empty());
    }

    #[tokio::test]
    async fn test_referral_bonus_granted_once() {
        let harness = Harness::new(&[InvoiceKind::Crypto]);
        let referrer = harness.store.add_customer(100);
        let referee = harness.store.add_customer(200);
        harness.store.add_referral(100, 200);

        let first = harness
            .service
            .create_purchase(100.0, 1, &referee, InvoiceKind::Crypto)
            .await
            .unwrap();
        let outcome = harness.service.process_purchase(first.purchase_id).await.unwrap();
        match outcome {
            ProcessOutcome::Completed {
                referral: ReferralOutcome::Granted { referrer_telegram_id, subscription },
                ..
            } => {
                assert_eq!(referrer_telegram_id, 100);
                assert_eq!(subscription.customer_id, referrer.id);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        let second = harness
            .service
            .create_purchase(100.0, 1, &referee, InvoiceKind::Crypto)
            .await
            .unwrap();
        let outcome = harness.service.process_purchase(second.purchase_id).await.unwrap();
        assert!(matches!(
            outcome,
            ProcessOutcome::Completed {
                referral: ReferralOutcome::AlreadyGranted,
                ..
            }
        ));

        let bonus = harness.store.subscriptions_of(referrer.id);
        assert_eq!(bonus.len(), 1);
        let request = harness
            .provisioner
            .requests()
            .into_iter()
            .find(|r| r.customer_id == referrer.id)
            .unwrap();
        assert_eq!(request.days, plan().referral_days);
        assert!(harness.store.referral_of(200).unwrap().bonus_granted);
        assert_eq!(harness.notifier.sent_to(100).len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_referee_purchases_grant_bonus_once() {
        let harness = Harness::new(&[InvoiceKind::Crypto]);
        harness.provisioner.set_delay_ms(20);
        let referrer = harness.store.add_customer(100);
        let referee = harness.store.add_customer(200);
        harness.store.add_referral(100, 200);

        let first = harness
            .service
            .create_purchase(100.0, 1, &referee, InvoiceKind::Crypto)
            .await
            .unwrap();
        let second = harness
            .service
            .create_purchase(100.0, 1, &referee, InvoiceKind::Crypto)
            .await
            .unwrap();

        let a = harness.service.clone();
        let b = harness.service.clone();
        let (one, two) = tokio::join!(
            a.process_purchase(first.purchase_id),
            b.process_purchase(second.purchase_id)
        );

        let granted = [one.unwrap(), two.unwrap()]
            .into_iter()
            .filter(|o| {
                matches!(
                    o,
                    ProcessOutcome::Completed {
                        referral: ReferralOutcome::Granted { .. },
                        ..
                    }
                )
            })
            .count();
        assert_eq!(granted, 1);
        assert_eq!(harness.store.subscriptions_of(referrer.id).len(), 1);
        assert_eq!(harness.store.subscriptions_of(referee.id).len(), 2);
        assert!(harness.store.referral_of(200).unwrap().bonus_granted);
    }

    #[tokio::test]
    async fn test_platform_purchase_recorded_once_per_reference() {
        let harness = Harness::new(&[InvoiceKind::SubscriptionPlatform]);
        let customer = harness.store.add_customer(100);

        let a = harness.service.clone();
        let b = harness.service.clone();
        let (first, second) = tokio::join!(
            a.record_platform_purchase(300.0, 3, &customer, "9:2027-01-18"),
            b.record_platform_purchase(300.0, 3, &customer, "9:2027-01-18")
        );
        let (first, second) = (first.unwrap(), second.unwrap());

        assert_eq!(first.id, second.id);
        assert_eq!(harness.store.purchases().len(), 1);
        assert_eq!(first.status, PurchaseStatus::Pending);
        assert_eq!(first.external_id.as_deref(), Some("9:2027-01-18"));

        harness.service.process_purchase(first.id).await.unwrap();
        let again = harness
            .service
            .record_platform_purchase(300.0, 3, &customer, "9:2027-01-18")
            .await
            .unwrap();
        assert_eq!(again.id, first.id);
        assert_eq!(again.status, PurchaseStatus::Paid);

        let renewal = harness
            .service
            .record_platform_purchase(300.0, 3, &customer, "9:2027-04-18")
            .await
            .unwrap();
        assert_ne!(renewal.id, first.id);
    }

    #[tokio::test]
    async fn test_referral_failure_is_partial_success() {
        let harness = Harness::new(&[InvoiceKind::Crypto]);
        let referrer = harness.store.add_customer(100);
        let referee = harness.store.add_customer(200);
        harness.store.add_referral(100, 200);
        harness.provisioner.fail_for(referrer.id);

        let created = harness
            .service
            .create_purchase(100.0, 1, &referee, InvoiceKind::Crypto)
            .await
            .unwrap();
        let outcome = harness.service.process_purchase(created.purchase_id).await.unwrap();

        assert!(outcome.is_partial());
        assert!(outcome.subscription().is_some());
        assert_eq!(
            harness.store.purchase(created.purchase_id).unwrap().status,
            PurchaseStatus::Paid
        );
        assert!(!harness.store.referral_of(200).unwrap().bonus_granted);
        assert!(harness.store.subscriptions_of(referrer.id).is_empty());
    }

    #[tokio::test]
    async fn test_payment_message_deleted_on_settle() {
        let harness = Harness::new(&[InvoiceKind::Crypto]);
        let customer = harness.store.add_customer(100);
        let created = harness
            .service
            .create_purchase(100.0, 1, &customer, InvoiceKind::Crypto)
            .await
            .unwrap();
        harness
            .interaction
            .remember_payment_message(
                created.purchase_id,
                PaymentMessage {
                    chat_id: 100,
                    message_id: 42,
                },
            )
            .await
            .unwrap();

        harness.service.process_purchase(created.purchase_id).await.unwrap();

        assert_eq!(harness.notifier.deleted(), vec![(100, 42)]);
        let activation = harness.notifier.sent_to(100);
        assert_eq!(activation.len(), 1);
        assert!(activation[0].has_keyboard);
    }

    #[tokio::test]
    async fn test_cancel_keeps_paid_purchase() {
        let harness = Harness::new(&[InvoiceKind::Crypto]);
        let customer = harness.store.add_customer(100);
        let pending = harness
            .service
            .create_purchase(100.0, 1, &customer, InvoiceKind::Crypto)
            .await
            .unwrap();
        let paid = harness
            .store
            .add_purchase(customer.id, InvoiceKind::Crypto, PurchaseStatus::Paid, 1);

        assert!(harness.service.cancel_purchase(pending.purchase_id).await.unwrap());
        assert!(!harness.service.cancel_purchase(paid.id).await.unwrap());
        assert_eq!(harness.store.purchase(paid.id).unwrap().status, PurchaseStatus::Paid);
    }

    #[tokio::test]
    async fn test_trial_only_for_new_customers() {
        let harness = Harness::new(&[]);
        harness.store.add_customer(100);

        let trial = harness.service.activate_trial(100).await.unwrap().unwrap();
        assert_eq!(trial.sequence, 1);
        assert_eq!(harness.provisioner.requests()[0].days, plan().trial_days);

        let again = harness.service.activate_trial(100).await;
        assert!(matches!(again, Err(PaymentError::TrialUnavailable(100))));
    }

    #[tokio::test]
    async fn test_trial_disabled() {
        let mut config = plan();
        config.trial_days = 0;
        let harness = Harness::with_plan(&[], config);
        harness.store.add_customer(100);

        assert!(!harness.service.trial_enabled());
        assert!(harness.service.activate_trial(100).await.unwrap().is_none());
        assert!(harness.provisioner.requests().is_empty());
    }
}

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use super::customer::{CustomerRepository, ExpiringCustomer};
use super::notify::{Notifier, NotifyError};
use super::purchase::{InvoiceKind, PaymentError, Purchase, PurchaseProcessor, PurchaseRepository};
use crate::runtime::{RuntimeError, ScheduledJob};
use crate::storage::StorageError;
use crate::utils::{days_until, mask_id};

const LOOKAHEAD_DAYS: i64 = 3;
const RENEW_ON_DAYS_LEFT: i64 = 1;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub candidates: usize,
    pub renewed: usize,
    pub reminded: usize,
    pub already_renewed: usize,
    pub failed: usize,
}

/// Renews or reminds customers whose earliest subscription runs out within the lookahead window.
pub struct ExpirationSweep {
    customers: Arc<dyn CustomerRepository>,
    purchases: Arc<dyn PurchaseRepository>,
    processor: Arc<dyn PurchaseProcessor>,
    notifier: Arc<dyn Notifier>,
}

impl ExpirationSweep {
    pub fn new(
        customers: Arc<dyn CustomerRepository>,
        purchases: Arc<dyn PurchaseRepository>,
        processor: Arc<dyn PurchaseProcessor>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            customers,
            purchases,
            processor,
            notifier,
        }
    }

    pub async fn run_sweep(&self) -> Result<SweepReport, StorageError> {
        self.run_sweep_at(Utc::now()).await
    }

    pub async fn run_sweep_at(&self, now: DateTime<Utc>) -> Result<SweepReport, StorageError> {
        let expiring = self
            .customers
            .find_expiring_between(now, now + Duration::days(LOOKAHEAD_DAYS))
            .await?;

        let mut report = SweepReport {
            candidates: expiring.len(),
            ..Default::default()
        };
        if expiring.is_empty() {
            debug!("No subscriptions expiring soon");
            return Ok(report);
        }

        let ids: Vec<i64> = expiring.iter().map(|e| e.customer.id).collect();
        let recurring: HashMap<i64, Purchase> = self
            .purchases
            .find_latest_active_recurring(&ids)
            .await?
            .into_iter()
            .map(|p| (p.customer_id, p))
            .collect();

        for entry in &expiring {
            let days_left = days_until(now, entry.expire_at);
            let latest = recurring.get(&entry.customer.id);

            if latest.is_some_and(|p| renewed_for(p, entry.expire_at)) {
                debug!(
                    "{} was already renewed for the expiry on {}",
                    mask_id(entry.customer.telegram_id),
                    entry.expire_at.date_naive()
                );
                report.already_renewed += 1;
                continue;
            }

            if let Some(purchase) = latest.filter(|_| days_left == RENEW_ON_DAYS_LEFT) {
                match self.renew(entry, purchase).await {
                    Ok(()) => {
                        report.renewed += 1;
                        continue;
                    }
                    Err(e) => warn!(
                        "Auto-renew failed for {}, sending a reminder instead: {}",
                        mask_id(entry.customer.telegram_id),
                        e
                    ),
                }
            }

            match self.remind(entry).await {
                Ok(()) => report.reminded += 1,
                Err(e) => {
                    warn!("Failed to remind {}: {}", mask_id(entry.customer.telegram_id), e);
                    report.failed += 1;
                }
            }
        }

        info!(
            "Expiration sweep done: {} candidate(s), {} renewed, {} reminded, {} already renewed, {} failed",
            report.candidates, report.renewed, report.reminded, report.already_renewed, report.failed
        );
        Ok(report)
    }

    async fn renew(&self, entry: &ExpiringCustomer, previous: &Purchase) -> Result<(), PaymentError> {
        let created = self
            .processor
            .create_purchase(
                previous.amount,
                previous.months,
                &entry.customer,
                InvoiceKind::SubscriptionPlatform,
            )
            .await?;
        self.processor.process_purchase(created.purchase_id).await?;
        info!(
            "Auto-renewed {} with purchase {}",
            mask_id(entry.customer.telegram_id),
            created.purchase_id
        );
        Ok(())
    }

    async fn remind(&self, entry: &ExpiringCustomer) -> Result<(), NotifyError> {
        let language = entry.customer.language.as_str();
        let text = t!(
            "messages.subscription_expiring",
            locale = language,
            date = entry.expire_at.format("%d.%m.%Y").to_string()
        );
        let keyboard = InlineKeyboardMarkup::new([[InlineKeyboardButton::callback(
            t!("buttons.renew_subscription", locale = language),
            "buy",
        )]]);
        self.notifier
            .send(entry.customer.telegram_id, &text, Some(keyboard))
            .await
            .map(|_| ())
    }
}

/// A recurring purchase paid on or after the renewal day already covers this expiry.
fn renewed_for(purchase: &Purchase, expire_at: DateTime<Utc>) -> bool {
    purchase
        .paid_at
        .is_some_and(|paid_at| days_until(paid_at, expire_at) <= RENEW_ON_DAYS_LEFT)
}

#[async_trait]
impl ScheduledJob for ExpirationSweep {
    fn name(&self) -> &'static str {
        "expiration_sweep"
    }

    async fn run(&self) -> Result<(), RuntimeError> {
        self.run_sweep()
            .await
            .map(|_| ())
            .map_err(|e| RuntimeError::Job(e.to_string()))
    }
}

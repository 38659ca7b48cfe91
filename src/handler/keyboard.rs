use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup};

use crate::config::PricingConfig;
use crate::service::interaction::BroadcastAudience;
use crate::service::purchase::InvoiceKind;
use crate::utils::callback_data;

#[derive(Debug, Clone, Copy, Default)]
pub struct MainMenu {
    pub has_subscriptions: bool,
    pub trial_enabled: bool,
    pub referral_enabled: bool,
    pub is_admin: bool,
}

pub fn get_main_menu_keyboard(language: &str, menu: MainMenu) -> InlineKeyboardMarkup {
    let mut keyboard = Vec::new();

    if menu.has_subscriptions {
        keyboard.push(vec![InlineKeyboardButton::callback(
            t!("buttons.my_subscriptions", locale = language),
            "my_subscriptions",
        )]);
    } else if menu.trial_enabled {
        keyboard.push(vec![InlineKeyboardButton::callback(
            t!("buttons.trial", locale = language),
            "trial",
        )]);
    }

    keyboard.push(vec![InlineKeyboardButton::callback(
        t!("buttons.buy", locale = language),
        "buy",
    )]);

    if menu.referral_enabled {
        keyboard.push(vec![InlineKeyboardButton::callback(
            t!("buttons.referral", locale = language),
            "referral",
        )]);
    }

    if menu.is_admin {
        keyboard.push(vec![InlineKeyboardButton::callback(
            t!("buttons.broadcast", locale = language),
            "broadcast_menu",
        )]);
    }

    InlineKeyboardMarkup::new(keyboard)
}

pub fn get_back_to_main_menu_keyboard(language: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[back_button(language, "start")]])
}

fn back_button(language: &str, target: &str) -> InlineKeyboardButton {
    InlineKeyboardButton::callback(t!("buttons.back", locale = language), target.to_string())
}

pub fn get_months_keyboard(language: &str, pricing: &PricingConfig) -> InlineKeyboardMarkup {
    let mut keyboard: Vec<Vec<InlineKeyboardButton>> = pricing
        .months_options()
        .into_iter()
        .filter_map(|months| {
            let price = pricing.fiat.get(&months)?;
            let months_str = months.to_string();
            Some(vec![InlineKeyboardButton::callback(
                t!(
                    "buttons.months_option",
                    locale = language,
                    months = months,
                    price = price
                ),
                callback_data("sell", &[("month", months_str.as_str())]),
            )])
        })
        .collect();

    keyboard.push(vec![back_button(language, "start")]);
    InlineKeyboardMarkup::new(keyboard)
}

/// One button per enabled backend that has a price for `months`. The subscription
/// platform gets a plain link to the platform instead of a callback.
pub fn get_invoice_kinds_keyboard(
    language: &str,
    months: i64,
    kinds: &[InvoiceKind],
    pricing: &PricingConfig,
    platform_url: Option<&str>,
) -> InlineKeyboardMarkup {
    let months_str = months.to_string();
    let mut keyboard = Vec::new();

    for kind in kinds {
        if pricing.amount_for(months, *kind).is_none() {
            continue;
        }
        let label = match kind {
            InvoiceKind::Crypto => t!("buttons.pay_crypto", locale = language),
            InvoiceKind::HostedCheckout => t!("buttons.pay_checkout", locale = language),
            InvoiceKind::Stars => t!("buttons.pay_stars", locale = language),
            InvoiceKind::SubscriptionPlatform => t!("buttons.pay_tribute", locale = language),
        };
        let button = match (kind, platform_url) {
            (InvoiceKind::SubscriptionPlatform, Some(link)) => match link.parse::<url::Url>() {
                Ok(link) => InlineKeyboardButton::url(label, link),
                Err(_) => continue,
            },
            (InvoiceKind::SubscriptionPlatform, None) => continue,
            _ => InlineKeyboardButton::callback(
                label,
                callback_data("payment", &[("month", months_str.as_str()), ("kind", kind.as_str())]),
            ),
        };
        keyboard.push(vec![button]);
    }

    keyboard.push(vec![back_button(language, "buy")]);
    InlineKeyboardMarkup::new(keyboard)
}

pub fn get_payment_keyboard(language: &str, payment_url: Option<&str>, purchase_id: i64) -> InlineKeyboardMarkup {
    let mut keyboard = Vec::new();
    if let Some(link) = payment_url.and_then(|u| u.parse::<url::Url>().ok()) {
        keyboard.push(vec![InlineKeyboardButton::url(t!("buttons.pay", locale = language), link)]);
    }
    let id = purchase_id.to_string();
    keyboard.push(vec![InlineKeyboardButton::callback(
        t!("buttons.cancel", locale = language),
        callback_data("cancel_purchase", &[("id", id.as_str())]),
    )]);
    InlineKeyboardMarkup::new(keyboard)
}

pub fn get_broadcast_audience_keyboard(language: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([
        [InlineKeyboardButton::callback(
            t!("buttons.broadcast_all", locale = language),
            callback_data("broadcast_audience", &[("to", BroadcastAudience::All.as_str())]),
        )],
        [InlineKeyboardButton::callback(
            t!("buttons.broadcast_admins", locale = language),
            callback_data("broadcast_audience", &[("to", BroadcastAudience::Admins.as_str())]),
        )],
        [back_button(language, "start")],
    ])
}

pub fn get_broadcast_confirm_keyboard(language: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[
        InlineKeyboardButton::callback(t!("buttons.confirm", locale = language), "broadcast_confirm"),
        InlineKeyboardButton::callback(t!("buttons.cancel", locale = language), "broadcast_cancel"),
    ]])
}

pub fn get_cancel_keyboard(language: &str, action: &str) -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([[InlineKeyboardButton::callback(
        t!("buttons.cancel", locale = language),
        action.to_string(),
    )]])
}

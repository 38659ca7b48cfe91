use teloxide::adaptors::Throttle;
use teloxide::dispatching::{HandlerExt, UpdateHandler};
use teloxide::prelude::*;
use teloxide::types::{LinkPreviewOptions, Message, ParseMode};

use crate::command::Command;
use crate::error::{BotError, HandlerResult};
use crate::state::AppState;
use crate::utils::mask_id;

use super::callback::render_subscriptions;
use super::{main_menu, telegram_id, user_language};

async fn handle_start(bot: Throttle<Bot>, msg: Message, payload: String, state: AppState) -> HandlerResult<()> {
    let user = msg
        .from
        .as_ref()
        .ok_or_else(|| BotError::Handler("start without sender".into()))?;

    let registration = state
        .services
        .customer
        .register(telegram_id(user), user.language_code.as_deref(), payload.trim())
        .await?;

    if let Some(referrer) = registration.referred_by {
        info!(
            "{} joined through a referral from {}",
            mask_id(registration.customer.telegram_id),
            mask_id(referrer)
        );
    }

    let customer = registration.customer;
    let keyboard = main_menu(&state, &customer).await?;
    bot.send_message(msg.chat.id, t!("messages.greeting", locale = customer.language.as_str()))
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard)
        .await?;

    Ok(())
}

async fn handle_connect(bot: Throttle<Bot>, msg: Message, state: AppState) -> HandlerResult<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let language = user_language(user);

    let Some(customer) = state.services.customer.find(telegram_id(user)).await? else {
        bot.send_message(msg.chat.id, t!("messages.press_start", locale = language.as_str()))
            .await?;
        return Ok(());
    };

    let subscriptions = state.services.subscription.list_active(customer.telegram_id).await?;
    let (text, keyboard) = render_subscriptions(&subscriptions, &customer.language, chrono::Utc::now());

    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .link_preview_options(LinkPreviewOptions {
            is_disabled: true,
            url: None,
            prefer_small_media: false,
            prefer_large_media: false,
            show_above_text: false,
        })
        .reply_markup(keyboard)
        .await?;

    Ok(())
}

async fn handle_help(bot: Throttle<Bot>, msg: Message) -> HandlerResult<()> {
    let language = msg.from.as_ref().map(user_language).unwrap_or_else(|| "en".to_string());
    bot.send_message(msg.chat.id, t!("commands.help", locale = language.as_str()))
        .parse_mode(ParseMode::Html)
        .await?;
    Ok(())
}

async fn handle_command(bot: Throttle<Bot>, msg: Message, cmd: Command, state: AppState) -> HandlerResult<()> {
    match cmd {
        Command::Start(payload) => handle_start(bot, msg, payload, state).await?,
        Command::Connect => handle_connect(bot, msg, state).await?,
        Command::Help => handle_help(bot, msg).await?,
    }

    Ok(())
}

pub fn get_command_handler() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync>> {
    Update::filter_message()
        .filter_command::<Command>()
        .endpoint(handle_command)
}

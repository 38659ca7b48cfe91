use super::CallbackContext;
use crate::error::HandlerResult;
use crate::handler::{edit_or_send, get_broadcast_audience_keyboard, get_cancel_keyboard, main_menu};
use crate::service::interaction::{BroadcastAudience, PendingAction};
use crate::service::notify::broadcast;

pub async fn handle_callback_broadcast(ctx: &CallbackContext, action: &str) -> HandlerResult<()> {
    let chat_id = ctx.chat_id().0;
    let interaction = &ctx.state.services.interaction;
    let language = ctx.language();

    match action {
        "broadcast_menu" => {
            interaction.clear_pending(chat_id).await?;
            edit_or_send(
                &ctx.bot,
                &ctx.message,
                t!("messages.broadcast_choose_audience", locale = language).to_string(),
                get_broadcast_audience_keyboard(language),
            )
            .await?;
        }
        "broadcast_audience" => {
            let raw: String = ctx.param("to")?;
            let Some(audience) = BroadcastAudience::parse(&raw) else {
                warn!("Unknown broadcast audience '{}'", raw);
                return Ok(());
            };
            interaction
                .set_pending(chat_id, &PendingAction::BroadcastText { audience })
                .await?;
            edit_or_send(
                &ctx.bot,
                &ctx.message,
                t!("messages.broadcast_enter_text", locale = language).to_string(),
                get_cancel_keyboard(language, "broadcast_cancel"),
            )
            .await?;
        }
        "broadcast_confirm" => {
            let Some(PendingAction::BroadcastConfirm { audience, text }) = interaction.take_pending(chat_id).await?
            else {
                edit_or_send(
                    &ctx.bot,
                    &ctx.message,
                    t!("messages.broadcast_expired", locale = language).to_string(),
                    main_menu(&ctx.state, &ctx.customer).await?,
                )
                .await?;
                return Ok(());
            };

            let recipients = match audience {
                BroadcastAudience::All => ctx.state.services.repositories.customers.all_telegram_ids().await?,
                BroadcastAudience::Admins => vec![ctx.state.config.telegram.admin_id],
            };
            info!("Broadcasting to {} recipient(s) ({})", recipients.len(), audience.as_str());

            let report = broadcast(ctx.state.services.notifier.as_ref(), &recipients, &text).await;
            edit_or_send(
                &ctx.bot,
                &ctx.message,
                t!(
                    "messages.broadcast_done",
                    locale = language,
                    sent = report.sent,
                    failed = report.failed
                )
                .to_string(),
                main_menu(&ctx.state, &ctx.customer).await?,
            )
            .await?;
        }
        _ => {
            interaction.clear_pending(chat_id).await?;
            edit_or_send(
                &ctx.bot,
                &ctx.message,
                t!("messages.broadcast_cancelled", locale = language).to_string(),
                main_menu(&ctx.state, &ctx.customer).await?,
            )
            .await?;
        }
    }

    Ok(())
}

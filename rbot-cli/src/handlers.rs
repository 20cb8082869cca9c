//! Stock handlers wired by `rbot run`.

use std::sync::Arc;
use std::time::Duration;

use middleware::{AntiSpamManager, AntiSpamMiddleware, LoggingMiddleware};
use rbot_core::{Bot, ChatType, RbotError, Update};
use rbot_dispatch::{Context, Dispatcher, ExecutionBridge, Filter};
use tracing::info;

const HELP: &str = "/start - greeting\n/help [topic] - this message\n/report - slow report\n/temp - self-deleting reply\nanything else is echoed back";

fn is_command(update: &Update) -> bool {
    update.text().is_some_and(|t| t.starts_with('/'))
}

/// Builds the dispatcher: logging and anti-spam gates, then the handlers in priority order.
pub fn build_dispatcher(
    bot: Arc<dyn Bot>,
    spam: Arc<AntiSpamManager>,
    bridge: ExecutionBridge,
) -> Dispatcher {
    Dispatcher::builder(bot)
        .bridge(bridge)
        .add_middleware(Arc::new(LoggingMiddleware))
        .add_middleware(Arc::new(AntiSpamMiddleware::new(spam)))
        .on_message(Filter::command("start"), |ctx: Context| async move {
            let greeting = match ctx.chat_type() {
                ChatType::Group => "Hello group!",
                ChatType::Channel => "Hello channel!",
                _ => "Hello! Send /help to see what I can do.",
            };
            ctx.reply(greeting).await?;
            Ok::<(), RbotError>(())
        })
        .on_message(Filter::command("help"), |ctx: Context| async move {
            let args = ctx.args();
            let text = match args.first() {
                Some(topic) => format!("No detailed help for `{topic}` yet.\n\n{HELP}"),
                None => HELP.to_string(),
            };
            ctx.reply(&text).await?;
            Ok::<(), RbotError>(())
        })
        .on_callback_prefix("menu:", |ctx: Context| async move {
            let choice = ctx
                .button_id()
                .and_then(|b| b.strip_prefix("menu:"))
                .unwrap_or_default()
                .to_string();
            ctx.reply(&format!("You chose {choice}")).await?;
            Ok::<(), RbotError>(())
        })
        .on_message_blocking(Filter::command("report"), |ctx: Context| -> rbot_core::Result<()> {
            let words = ctx.args().len();
            std::thread::sleep(Duration::from_millis(200));
            ctx.blocking_bot()
                .reply_to(ctx.update(), &format!("Report ready: {words} argument(s)"))?;
            Ok(())
        })
        .on_message(Filter::command("temp"), |ctx: Context| async move {
            ctx.reply_auto_delete("This message deletes itself in 10 seconds", Duration::from_secs(10))
                .await?;
            Ok::<(), RbotError>(())
        })
        .on_message(Filter::HasText & !Filter::custom(is_command), |ctx: Context| async move {
            let text = ctx.text().unwrap_or_default().to_string();
            ctx.reply(&text).await?;
            Ok::<(), RbotError>(())
        })
        .on_started_bot(|ctx: Context| async move {
            info!(chat_id = ?ctx.chat_id(), "Bot started by user");
            if let Some(chat_id) = ctx.chat_id() {
                ctx.bot().send_message(chat_id, "Welcome! Send /help.", None).await?;
            }
            Ok::<(), RbotError>(())
        })
        .on_stopped_bot(|ctx: Context| async move {
            info!(chat_id = ?ctx.chat_id(), "Bot stopped by user");
            Ok::<(), RbotError>(())
        })
        .build()
}

use super::{Flow, Handler, HandlerFuture};
use crate::extract;
use crate::prelude::*;
use crate::tg::Ctx;
use std::sync::Arc;
use std::time::{Duration, Instant};
use teloxide::prelude::*;
use teloxide::types::{ReplyParameters, UpdateKind};
use teloxide::utils::command::BotCommands;
use teloxide::utils::html;

/// A handler compiled into the binary, that plugin manifests refer to by name
pub(crate) struct PluginDef {
    pub(crate) name: &'static str,
    pub(crate) handler: Handler<Ctx>,
}

inventory::collect!(PluginDef);

pub(crate) fn resolve_builtin(name: &str) -> Option<Handler<Ctx>> {
    inventory::iter::<PluginDef>
        .into_iter()
        .find(|def| def.name == name)
        .map(|def| def.handler)
}

#[derive(BotCommands, Clone, Debug)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
pub(crate) enum Command {
    #[command(description = "greet the bot")]
    Start,

    #[command(description = "check that the bot is alive")]
    Ping,
}

/// Name of the command in the message text without the leading slash and
/// the `@bot_username` suffix
fn command_of(update: &Update) -> Option<&str> {
    let UpdateKind::Message(message) = &update.kind else {
        return None;
    };

    let command = message.text()?.split_whitespace().next()?.strip_prefix('/')?;

    command.split('@').next()
}

fn callback_data_of(update: &Update) -> Option<&str> {
    match &update.kind {
        UpdateKind::CallbackQuery(query) => query.data.as_deref(),
        _ => None,
    }
}

fn any_update(_: &Update) -> bool {
    true
}

inventory::submit! {
    PluginDef {
        name: "ban_guard",
        handler: Handler { filter: any_update, run: ban_guard },
    }
}

fn ban_guard(ctx: Arc<Ctx>, update: Update) -> HandlerFuture {
    Box::pin(async move {
        let user = update.from().map(|user| user.id);
        let chat = update.chat().map(|chat| chat.id);

        if !ctx.banned.is_banned(user, chat) {
            return Ok(Flow::Continue);
        }

        info!(?user, ?chat, "Ignoring update from a banned user or chat");
        metrics::counter!("tg_updates_banned_total").increment(1);

        Ok(Flow::Stop)
    })
}

fn is_start(update: &Update) -> bool {
    command_of(update) == Some("start")
}

inventory::submit! {
    PluginDef {
        name: "start",
        handler: Handler { filter: is_start, run: start },
    }
}

fn start(ctx: Arc<Ctx>, update: Update) -> HandlerFuture {
    Box::pin(async move {
        let UpdateKind::Message(message) = update.kind else {
            return Ok(Flow::Continue);
        };

        let greeting = match &message.from {
            Some(user) => html::user_mention(user.id, &user.full_name()),
            None => "there".to_owned(),
        };

        let text = format!(
            "Hey {greeting}, I'm {}!\n\n\
            I keep the files of this community. Tap <b>Tracks</b> under \
            any video and I'll show its audio and subtitle languages.",
            ctx.identity.mention,
        );

        ctx.bot
            .send_message(message.chat.id, text)
            .reply_parameters(ReplyParameters::new(message.id))
            .await?;

        Ok(Flow::Continue)
    })
}

fn is_ping(update: &Update) -> bool {
    command_of(update) == Some("ping")
}

inventory::submit! {
    PluginDef {
        name: "ping",
        handler: Handler { filter: is_ping, run: ping },
    }
}

fn ping(ctx: Arc<Ctx>, update: Update) -> HandlerFuture {
    Box::pin(async move {
        let UpdateKind::Message(message) = update.kind else {
            return Ok(Flow::Continue);
        };

        let start = Instant::now();

        let reply = ctx
            .bot
            .send_message(message.chat.id, "Pinging...")
            .reply_parameters(ReplyParameters::new(message.id))
            .await?;

        let latency = start.elapsed();
        let uptime = format_uptime(ctx.started_at.elapsed());

        ctx.bot
            .edit_message_text(
                message.chat.id,
                reply.id,
                format!("<b>Pong!</b> {latency:.0?}\nUptime: <code>{uptime}</code>"),
            )
            .await?;

        Ok(Flow::Continue)
    })
}

pub(crate) fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    let (days, secs) = (secs / 86_400, secs % 86_400);
    let (hours, secs) = (secs / 3600, secs % 3600);
    let (minutes, secs) = (secs / 60, secs % 60);

    if days > 0 {
        format!("{days}d {hours:02}h {minutes:02}m {secs:02}s")
    } else {
        format!("{hours:02}h {minutes:02}m {secs:02}s")
    }
}

fn is_extract_callback(update: &Update) -> bool {
    callback_data_of(update).is_some_and(|data| data.starts_with(extract::EXTRACT_ACTION))
}

inventory::submit! {
    PluginDef {
        name: "extract",
        handler: Handler { filter: is_extract_callback, run: extract_tracks },
    }
}

fn extract_tracks(ctx: Arc<Ctx>, update: Update) -> HandlerFuture {
    Box::pin(async move {
        if let UpdateKind::CallbackQuery(query) = update.kind {
            extract::handle_extract_callback(ctx, query).await?;
        }
        Ok(Flow::Continue)
    })
}

fn is_wait_callback(update: &Update) -> bool {
    callback_data_of(update) == Some(extract::WAIT_ACTION)
}

inventory::submit! {
    PluginDef {
        name: "wait",
        handler: Handler { filter: is_wait_callback, run: wait },
    }
}

/// Taps on the "please wait" placeholder
fn wait(ctx: Arc<Ctx>, update: Update) -> HandlerFuture {
    Box::pin(async move {
        if let UpdateKind::CallbackQuery(query) = update.kind {
            ctx.bot
                .answer_callback_query(query.id)
                .text("Still working on it, please wait...")
                .await?;
        }
        Ok(Flow::Continue)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(kind: serde_json::Value) -> Update {
        let mut json = serde_json::json!({ "update_id": 7 });
        json.as_object_mut().unwrap().extend(kind.as_object().unwrap().clone());
        serde_json::from_value(json).unwrap()
    }

    fn text_update(text: &str) -> Update {
        update(serde_json::json!({
            "message": {
                "message_id": 1,
                "date": 1_700_000_000,
                "chat": { "id": -100, "type": "supergroup", "title": "Movies" },
                "from": { "id": 5, "is_bot": false, "first_name": "Bob" },
                "text": text
            }
        }))
    }

    fn callback_update(data: &str) -> Update {
        update(serde_json::json!({
            "callback_query": {
                "id": "4382",
                "from": { "id": 5, "is_bot": false, "first_name": "Bob" },
                "chat_instance": "-42",
                "data": data
            }
        }))
    }

    #[test]
    fn recognizes_commands() {
        assert!(is_start(&text_update("/start")));
        assert!(is_start(&text_update("/start@filebot payload")));
        assert!(is_ping(&text_update("/ping")));
        assert!(!is_ping(&text_update("ping")));
        assert!(!is_start(&text_update("/started")));
        assert!(!is_start(&callback_update("/start")));
    }

    #[test]
    fn recognizes_callbacks() {
        assert!(is_extract_callback(&callback_update("extract_data:abc")));
        assert!(!is_extract_callback(&callback_update("file:abc")));
        assert!(is_wait_callback(&callback_update("wait_data")));
        assert!(!is_wait_callback(&text_update("wait_data")));
    }

    #[test]
    fn builtins_are_registered() {
        for name in ["ban_guard", "start", "ping", "extract", "wait"] {
            assert!(resolve_builtin(name).is_some(), "{name} is not registered");
        }
        assert!(resolve_builtin("nope").is_none());
    }

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(Duration::from_secs(59)), "00h 00m 59s");
        assert_eq!(format_uptime(Duration::from_secs(3 * 3600 + 61)), "03h 01m 01s");
        assert_eq!(
            format_uptime(Duration::from_secs(2 * 86_400 + 5)),
            "2d 00h 00m 05s"
        );
    }
}

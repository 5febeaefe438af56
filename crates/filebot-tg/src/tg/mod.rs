//! Telegram client setup and the update processing loop

mod client_pool;
mod config;

use crate::db::{self, BannedSet};
use crate::extract;
use crate::media_info::MediaInfoCli;
use crate::plugins::DispatchTable;
use crate::prelude::*;
use crate::telegraph::{self, Telegraph};
use crate::util::DynError;
use dptree::di::DependencyMap;
use std::sync::Arc;
use std::time::Instant;
use teloxide::adaptors::{CacheMe, DefaultParseMode, Throttle, Trace};
use teloxide::prelude::*;
use teloxide::types::{Me, ParseMode, UpdateKind};
use teloxide::utils::html;
use url::Url;

pub(crate) use client_pool::*;
pub(crate) use config::*;

pub(crate) type Bot = Trace<CacheMe<DefaultParseMode<Throttle<teloxide::Bot>>>>;

/// Read-mostly state built once at startup and shared by all handlers
pub(crate) struct Ctx {
    pub(crate) bot: Bot,
    pub(crate) cfg: Config,
    pub(crate) identity: BotIdentity,
    pub(crate) banned: BannedSet,
    pub(crate) db: db::Db,
    pub(crate) client_pool: ClientPool,
    pub(crate) extract: extract::Config,
    pub(crate) media_info: MediaInfoCli,
    pub(crate) telegraph: Telegraph,
    pub(crate) telegraph_cfg: telegraph::Config,
    pub(crate) started_at: Instant,
}

#[derive(Debug, Clone)]
pub(crate) struct BotIdentity {
    pub(crate) id: UserId,
    pub(crate) username: String,
    pub(crate) first_name: String,

    /// HTML link to the bot
    pub(crate) mention: String,
}

impl BotIdentity {
    pub(crate) fn from_me(me: &Me) -> Self {
        Self {
            id: me.id,
            username: me.username().to_owned(),
            first_name: me.first_name.clone(),
            mention: html::user_mention(me.id, &me.first_name),
        }
    }
}

pub(crate) fn create_bot(token: &str, api_url: Option<&Url>) -> Bot {
    let mut bot = teloxide::Bot::with_client(token, teloxide::net::client_from_env());

    if let Some(api_url) = api_url {
        bot = bot.set_api_url(api_url.clone());
    }

    bot.throttle(Default::default())
        .parse_mode(ParseMode::Html)
        .cache_me()
        .trace(teloxide::adaptors::trace::Settings::all())
}

/// Processes the updates until the process is interrupted
pub(crate) async fn run_dispatcher(ctx: Arc<Ctx>, table: DispatchTable<Ctx>) {
    let mut di = DependencyMap::new();
    di.insert(ctx.clone());
    di.insert(Arc::new(table));

    let handler = dptree::entry().endpoint(
        |ctx: Arc<Ctx>, table: Arc<DispatchTable<Ctx>>, update: Update| async move {
            let kind = update.kind.discriminator();

            metrics::counter!("tg_updates_total", "kind" => kind).increment(1);
            trace!(target: "tg_update", ?update, "Received update");

            if !table.dispatch(&ctx, &update).await {
                metrics::counter!("tg_updates_skipped_total", "kind" => kind).increment(1);
            }

            Ok::<_, Box<DynError>>(())
        },
    );

    info!(bot = %ctx.identity.username, "Starting to dispatch updates...");

    Dispatcher::builder(ctx.bot.clone(), handler)
        .dependencies(di)
        .distribution_function(update_distribution_key)
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("Bot stopped");
}

/// Updates with the same key are processed sequentially. Button presses
/// get no key, so a slow extraction doesn't hold up the rest of the chat.
fn update_distribution_key(update: &Update) -> Option<ChatId> {
    if let UpdateKind::CallbackQuery(_) = update.kind {
        return None;
    }
    update.chat().map(|chat| chat.id)
}

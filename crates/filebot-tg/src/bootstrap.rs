//! The startup sequence of the bot

use crate::db::BannedSet;
use crate::plugins::{self, Command, DispatchTable};
use crate::prelude::*;
use crate::telegraph::Telegraph;
use crate::web::{self, StatusInfo, WebState};
use crate::{db, http, keep_alive, media_info, premium, tg, Config, Result};
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use metrics_exporter_prometheus::PrometheusHandle;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use teloxide::prelude::*;
use teloxide::utils::command::BotCommands;
use tokio::task::JoinHandle;

/// Aborts the spawned tasks when the startup is retried or the bot stops
#[derive(Default)]
struct BackgroundTasks {
    handles: Vec<JoinHandle<()>>,
}

impl BackgroundTasks {
    fn spawn(&mut self, task: impl Future<Output = ()> + Send + 'static) {
        self.handles.push(tokio::spawn(task));
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

pub(crate) async fn run(config: Config, metrics: PrometheusHandle) -> Result {
    let Config {
        tg: tg_cfg,
        db: db_cfg,
        web: web_cfg,
        extract: extract_cfg,
        telegraph: telegraph_cfg,
        premium: premium_cfg,
        plugins: plugins_cfg,
        boot,
    } = config;

    let started_at = Instant::now();
    let mut tasks = BackgroundTasks::default();
    let http = http::create_client();

    let bot = tg::create_bot(&tg_cfg.token, tg_cfg.api_url.as_ref());

    let me = bot.get_me().await?;
    info!(username = me.username(), "Bot session started");

    let client_pool = tg::ClientPool::init(&tg_cfg.extra_tokens, tg_cfg.api_url.as_ref()).await;

    let mut table = DispatchTable::default();
    let loaded = plugins::load_plugins(
        &plugins_cfg.dir,
        &plugins_cfg.package,
        &mut table,
        plugins::resolve_builtin,
    );

    if loaded.is_empty() {
        warn!("No plugins loaded");
    } else {
        info!(count = loaded.len(), handlers = table.len(), "Plugins loaded");
    }

    for (group, plugin) in table.plugins() {
        debug!(group, plugin, "Registered update handler");
    }

    if web_cfg.on_heroku {
        match &web_cfg.app_url {
            Some(app_url) => tasks.spawn(keep_alive::ping_server(
                http.clone(),
                app_url.clone(),
                web_cfg.ping_interval,
            )),
            None => warn!("Hosting ping is enabled, but the app URL is not configured"),
        }
    }

    let db = db::init(db_cfg).await?;

    let banned = prepare_db(&db).await?;

    let me = bot.get_me().await?;
    let identity = tg::BotIdentity::from_me(&me);

    let telegraph = Telegraph::init(telegraph_cfg.clone(), http.clone()).await;

    fs_err::tokio::create_dir_all(&extract_cfg.temp_dir)
        .await
        .fatal_ctx(|| "Failed to create the directory for the downloaded files")?;

    let ctx = Arc::new(tg::Ctx {
        bot,
        cfg: tg_cfg,
        identity,
        banned,
        db,
        client_pool,
        media_info: media_info::MediaInfoCli::new(extract_cfg.mediainfo_bin.clone()),
        extract: extract_cfg,
        telegraph,
        telegraph_cfg,
        started_at,
    });

    tasks.spawn(premium::run_checker(ctx.clone(), premium_cfg));

    let identity = &ctx.identity;
    info!(
        id = %identity.id,
        username = %identity.username,
        name = %identity.first_name,
        version = env!("CARGO_PKG_VERSION"),
        "Bot started"
    );

    let offset = FixedOffset::east_opt(boot.utc_offset_minutes * 60).fatal_ctx(|| {
        format!("Invalid UTC offset: {} minutes", boot.utc_offset_minutes)
    })?;

    let now = Utc::now().with_timezone(&offset);

    ctx.bot
        .send_message(ctx.cfg.log_channel, restart_message(&identity.mention, now))
        .await?;

    let listener = web::bind(web_cfg.port).await?;
    let web_state = WebState {
        status: Arc::new(StatusInfo {
            bot_username: identity.username.clone(),
            started_at,
            client_pool: ctx.client_pool.usernames().map(ToOwned::to_owned).collect(),
        }),
        metrics,
    };
    tasks.spawn(web::serve(listener, web_state));

    tasks.spawn(keep_alive::keep_alive(
        http,
        web_cfg.local_url(),
        web_cfg.ping_interval,
    ));

    ctx.bot.set_my_commands(Command::bot_commands()).await?;

    tg::run_dispatcher(ctx, table).await;

    Ok(())
}

/// Database steps of the startup that depend on each other
#[async_trait]
trait StartupDb: Sync {
    async fn ensure_schema(&self) -> Result;
    async fn get_banned(&self) -> Result<BannedSet>;
    async fn ensure_indexes(&self) -> Result;
}

#[async_trait]
impl StartupDb for db::Db {
    async fn ensure_schema(&self) -> Result {
        db::Db::ensure_schema(self).await
    }

    async fn get_banned(&self) -> Result<BannedSet> {
        self.bans.get_banned().await
    }

    async fn ensure_indexes(&self) -> Result {
        db::Db::ensure_indexes(self).await
    }
}

/// The ban lists can only be read once their tables exist, which is not
/// the case on the first start with an empty database
async fn prepare_db(db: &impl StartupDb) -> Result<BannedSet> {
    db.ensure_schema().await?;

    let banned = db.get_banned().await?;
    info!(
        users = banned.users.len(),
        chats = banned.chats.len(),
        "Loaded banned users and chats"
    );

    db.ensure_indexes().await?;

    Ok(banned)
}

fn restart_message(mention: &str, now: DateTime<FixedOffset>) -> String {
    format!(
        "<b>{mention} restarted 🤖</b>\n\n\
        📆 Date: <code>{date}</code>\n\
        ⏰ Time: <code>{time}</code>\n\
        🌐 Timezone: <code>UTC{offset}</code>\n\
        🛠 Version: <code>{version}</code>",
        date = now.format("%Y-%m-%d"),
        time = now.format("%H:%M:%S %p"),
        offset = now.offset(),
        version = env!("CARGO_PKG_VERSION"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fatal;
    use chrono::TimeZone;
    use expect_test::expect;
    use std::sync::Mutex;

    /// Database that starts empty, like on the very first deploy
    #[derive(Default)]
    struct EmptyDb {
        tables_exist: Mutex<bool>,
        calls: Mutex<Vec<&'static str>>,
    }

    impl EmptyDb {
        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }

        fn require_tables(&self) -> Result {
            if *self.tables_exist.lock().unwrap() {
                return Ok(());
            }
            Err(fatal!("relation \"banned_users\" does not exist"))
        }
    }

    #[async_trait]
    impl StartupDb for EmptyDb {
        async fn ensure_schema(&self) -> Result {
            self.record("ensure_schema");
            *self.tables_exist.lock().unwrap() = true;
            Ok(())
        }

        async fn get_banned(&self) -> Result<BannedSet> {
            self.record("get_banned");
            self.require_tables()?;
            Ok(BannedSet {
                users: [UserId(7)].into(),
                chats: Default::default(),
            })
        }

        async fn ensure_indexes(&self) -> Result {
            self.record("ensure_indexes");
            self.require_tables()
        }
    }

    #[test_log::test(tokio::test)]
    async fn first_start_creates_tables_before_reading_bans() {
        let db = EmptyDb::default();

        let banned = prepare_db(&db).await.unwrap();

        assert!(banned.is_banned(Some(UserId(7)), None));
        assert_eq!(
            *db.calls.lock().unwrap(),
            ["ensure_schema", "get_banned", "ensure_indexes"]
        );
    }

    #[test]
    fn restart_message_uses_fixed_offset() {
        let offset = FixedOffset::east_opt(330 * 60).unwrap();
        let now = Utc
            .with_ymd_and_hms(2024, 3, 1, 20, 15, 7)
            .unwrap()
            .with_timezone(&offset);

        let message = restart_message("<a href=\"tg://user?id=1\">Filebot</a>", now)
            .replace(env!("CARGO_PKG_VERSION"), "{version}");

        expect![[r#"
            <b><a href="tg://user?id=1">Filebot</a> restarted 🤖</b>

            📆 Date: <code>2024-03-02</code>
            ⏰ Time: <code>01:45:07 AM</code>
            🌐 Timezone: <code>UTC+05:30</code>
            🛠 Version: <code>{version}</code>"#]]
        .assert_eq(&message);
    }
}

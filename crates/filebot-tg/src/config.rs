use crate::{db, extract, plugins, premium, telegraph, tg, web};
use serde::{de::DeserializeOwned, Deserialize};

pub struct Config {
    pub(crate) tg: tg::Config,
    pub(crate) db: db::Config,
    pub(crate) web: web::Config,
    pub(crate) extract: extract::Config,
    pub(crate) telegraph: telegraph::Config,
    pub(crate) premium: premium::Config,
    pub(crate) plugins: plugins::Config,
    pub(crate) boot: BootConfig,
}

impl Config {
    pub fn load_or_panic() -> Config {
        Self {
            tg: from_env_or_panic("TG_"),
            db: from_env_or_panic("DATABASE_"),
            web: from_env_or_panic("WEB_"),
            extract: from_env_or_panic("EXTRACT_"),
            telegraph: from_env_or_panic("TELEGRAPH_"),
            premium: from_env_or_panic("PREMIUM_"),
            plugins: from_env_or_panic("PLUGINS_"),
            boot: from_env_or_panic("BOT_"),
        }
    }
}

#[derive(Deserialize)]
pub(crate) struct BootConfig {
    /// Offset of the fixed timezone used in the startup notification
    #[serde(default = "default_utc_offset_minutes")]
    pub(crate) utc_offset_minutes: i32,
}

fn default_utc_offset_minutes() -> i32 {
    // Asia/Kolkata
    5 * 60 + 30
}

pub(crate) fn from_env_or_panic<T: DeserializeOwned>(prefix: &str) -> T {
    envy::prefixed(prefix).from_env().unwrap_or_else(|err| {
        panic!(
            "BUG: Couldn't load config from environment for {}: {:#?}",
            std::any::type_name::<T>(),
            err
        );
    })
}

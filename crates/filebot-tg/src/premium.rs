//! Expiration of the premium subscriptions

use crate::prelude::*;
use crate::tg::Ctx;
use crate::Result;
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::sync::Arc;
use std::time::Duration;
use teloxide::prelude::*;
use tokio::time::MissedTickBehavior;

const EXPIRED_TEXT: &str = "Your premium access has expired. \
    Thanks for supporting us! Contact the admins to renew it.";

#[serde_as]
#[derive(Clone, Deserialize)]
pub(crate) struct Config {
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "check_interval_secs", default = "default_check_interval")]
    pub(crate) check_interval: Duration,
}

fn default_check_interval() -> Duration {
    Duration::from_secs(60)
}

pub(crate) async fn run_checker(ctx: Arc<Ctx>, cfg: Config) {
    let mut ticks = tokio::time::interval(cfg.check_interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticks.tick().await;

        if let Err(err) = expire_once(&ctx).await {
            warn!(err = tracing_err(&err), "Failed to check expired premium grants");
        }
    }
}

#[instrument(skip_all)]
async fn expire_once(ctx: &Ctx) -> Result {
    let expired = ctx.db.premium.take_expired(chrono::Utc::now()).await?;

    if expired.is_empty() {
        return Ok(());
    }

    info!(count = expired.len(), "Premium grants expired");

    for user in expired {
        // The user may have blocked the bot, so this is best-effort
        if let Err(err) = ctx.bot.send_message(user, EXPIRED_TEXT).await {
            debug!(%user, err = tracing_err(&err), "Failed to notify about premium expiry");
        }
    }

    Ok(())
}

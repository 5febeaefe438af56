//! Periodic self-pings that keep the hosting from putting the app to sleep

use crate::http;
use crate::prelude::*;
use crate::Result;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use url::Url;

/// Pings the public URL of the app. Only needed on hostings that suspend
/// the apps without incoming HTTP traffic.
pub(crate) async fn ping_server(http: http::Client, app_url: Url, interval: Duration) {
    ping_forever(http, app_url, interval)
        .instrument(info_span!("ping_server"))
        .await
}

/// Pings the local health check listener
pub(crate) async fn keep_alive(http: http::Client, local_url: Url, interval: Duration) {
    ping_forever(http, local_url, interval)
        .instrument(info_span!("keep_alive"))
        .await
}

async fn ping_forever(http: http::Client, url: Url, interval: Duration) {
    let mut ticks = tokio::time::interval(interval);
    ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);

    // The first tick completes immediately, and the listener may not be up yet
    ticks.tick().await;

    loop {
        ticks.tick().await;

        if let Err(err) = ping_once(&http, &url).await {
            warn!(%url, err = tracing_err(&err), "Keep-alive ping failed");
        }
    }
}

pub(crate) async fn ping_once(http: &http::Client, url: &Url) -> Result {
    let response = http.get(url.clone()).try_send().await?;
    debug!(%url, status = %response.status(), "Keep-alive ping succeeded");
    Ok(())
}

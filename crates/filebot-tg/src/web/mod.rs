//! HTTP listener for the external uptime monitors and metrics scrapers

use crate::error::IoError;
use crate::prelude::*;
use crate::{err_ctx, Result};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use url::Url;

#[serde_as]
#[derive(Clone, Deserialize)]
pub(crate) struct Config {
    #[serde(default = "default_port")]
    pub(crate) port: u16,

    /// Enables pinging of [`Config::app_url`] to keep the free dyno awake
    #[serde(default)]
    pub(crate) on_heroku: bool,

    /// Public URL of this app
    pub(crate) app_url: Option<Url>,

    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "ping_interval_secs", default = "default_ping_interval")]
    pub(crate) ping_interval: Duration,
}

fn default_port() -> u16 {
    8080
}

fn default_ping_interval() -> Duration {
    Duration::from_secs(240)
}

impl Config {
    pub(crate) fn local_url(&self) -> Url {
        let url = format!("http://{}:{}/", Ipv4Addr::LOCALHOST, self.port);
        Url::parse(&url).unwrap_or_else(|err| panic!("BUG: bad local URL {url}: {err}"))
    }
}

/// What the status endpoint reports
pub(crate) struct StatusInfo {
    pub(crate) bot_username: String,
    pub(crate) started_at: Instant,
    pub(crate) client_pool: Vec<String>,
}

#[derive(Clone)]
pub(crate) struct WebState {
    pub(crate) status: Arc<StatusInfo>,
    pub(crate) metrics: PrometheusHandle,
}

#[derive(Debug, Serialize, Deserialize)]
struct StatusResponse {
    status: String,
    bot_username: String,
    uptime_seconds: u64,
    client_pool_size: usize,
    client_pool: Vec<String>,
}

pub(crate) fn router(state: WebState) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/metrics", get(render_metrics))
        .with_state(state)
}

async fn status(State(state): State<WebState>) -> Json<StatusResponse> {
    let status = &state.status;

    Json(StatusResponse {
        status: "running".to_owned(),
        bot_username: status.bot_username.clone(),
        uptime_seconds: status.started_at.elapsed().as_secs(),
        client_pool_size: status.client_pool.len(),
        client_pool: status.client_pool.clone(),
    })
}

async fn render_metrics(State(state): State<WebState>) -> String {
    state.metrics.render()
}

/// Binds to all interfaces. Failure to do so is fatal for the startup.
pub(crate) async fn bind(port: u16) -> Result<TcpListener> {
    let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));

    let listener = TcpListener::bind(addr)
        .await
        .map_err(err_ctx!(IoError::BindListener { addr }))?;

    info!(%addr, "Health check listener is bound");

    Ok(listener)
}

pub(crate) async fn serve(listener: TcpListener, state: WebState) {
    if let Err(err) = axum::serve(listener, router(state)).await {
        error!(err = tracing_err(&err), "Health check listener failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use metrics_exporter_prometheus::PrometheusBuilder;

    async fn spawn_server() -> (SocketAddr, tokio::task::JoinHandle<()>) {
        let recorder = PrometheusBuilder::new().build_recorder();
        let state = WebState {
            status: Arc::new(StatusInfo {
                bot_username: "filebot".to_owned(),
                started_at: Instant::now(),
                client_pool: vec!["helper_bot".to_owned()],
            }),
            metrics: recorder.handle(),
        };

        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
        let addr = listener.local_addr().unwrap();

        (addr, tokio::spawn(serve(listener, state)))
    }

    #[test_log::test(tokio::test)]
    async fn reports_status() {
        let (addr, server) = spawn_server().await;

        let response: StatusResponse = reqwest::get(format!("http://{addr}/"))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();

        assert_eq!(response.status, "running");
        assert_eq!(response.bot_username, "filebot");
        assert_eq!(response.client_pool_size, 1);
        assert_eq!(response.client_pool, ["helper_bot"]);

        server.abort();
    }

    #[test_log::test(tokio::test)]
    async fn serves_metrics() {
        let (addr, server) = spawn_server().await;

        let response = reqwest::get(format!("http://{addr}/metrics")).await.unwrap();

        assert!(response.status().is_success());

        server.abort();
    }

    #[test]
    fn local_url_targets_loopback() {
        let cfg = Config {
            port: 9000,
            on_heroku: false,
            app_url: None,
            ping_interval: default_ping_interval(),
        };
        assert_eq!(cfg.local_url().as_str(), "http://127.0.0.1:9000/");
    }
}

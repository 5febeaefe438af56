//! Outgoing HTTP for the page publisher and the keep-alive pingers

mod json_ext;

use crate::prelude::*;
use async_trait::async_trait;
use reqwest_middleware::{ClientBuilder, Middleware, Next, RequestBuilder};
use reqwest_retry::policies::ExponentialBackoff;
use reqwest_retry::RetryTransientMiddleware;
use std::time::{Duration, Instant};

pub(crate) mod prelude {
    pub(crate) use super::json_ext::RequestBuilderExt as _;
}

pub(crate) type Client = reqwest_middleware::ClientWithMiddleware;

const USER_AGENT: &str = concat!("filebot-tg/", env!("CARGO_PKG_VERSION"));

/// Telegraph and the hosting URL are the only peers, and both are either up
/// within a couple of seconds or not at all
fn retry_policy() -> ExponentialBackoff {
    ExponentialBackoff::builder()
        .retry_bounds(Duration::from_millis(200), Duration::from_secs(2))
        .build_with_max_retries(3)
}

pub(crate) fn create_client() -> Client {
    ClientBuilder::new(teloxide::net::client_from_env())
        .with(RetryTransientMiddleware::new_with_policy(retry_policy()))
        .with(RequestMetrics)
        .with_init(|request: RequestBuilder| request.header(reqwest::header::USER_AGENT, USER_AGENT))
        .build()
}

/// Sits below the retry middleware, so every attempt is logged and measured
/// separately
struct RequestMetrics;

#[async_trait]
impl Middleware for RequestMetrics {
    async fn handle(
        &self,
        request: reqwest::Request,
        extensions: &mut http::Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        let method = request.method().to_string();
        let host = request.url().host_str().unwrap_or("unknown").to_owned();
        let span = debug_span!("http", %method, url = %request.url());

        let start = Instant::now();
        let result = next.run(request, extensions).instrument(span.clone()).await;
        let elapsed = start.elapsed();

        let status = span.in_scope(|| log_outcome(&result, elapsed));

        metrics::histogram!(
            "http_request_duration_seconds",
            "method" => method,
            "host" => host,
            "status" => status,
        )
        .record(elapsed);

        result
    }
}

/// Returns the `status` metric label
fn log_outcome(
    result: &reqwest_middleware::Result<reqwest::Response>,
    elapsed: Duration,
) -> String {
    let duration = tracing_duration(elapsed);

    let response = match result {
        Ok(response) => response,
        Err(err) => {
            warn!(duration, err = tracing_err(err), "HTTP request did not complete");
            return "failed".to_owned();
        }
    };

    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        warn!(duration, %status, "HTTP request returned an error status");
    } else {
        debug!(duration, %status, "HTTP request completed");
    }

    status.as_str().to_owned()
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum HttpClientError {
    #[error("Could not send the HTTP request")]
    Request { source: reqwest_middleware::Error },

    #[error("Could not read the HTTP response body")]
    ReadPayload { source: reqwest::Error },

    #[error("HTTP peer responded with {status}: {body}")]
    BadResponseStatusCode {
        status: reqwest::StatusCode,
        body: String,
    },

    #[error("HTTP response body is not the expected JSON")]
    UnexpectedResponseJsonShape { source: serde_json::Error },
}

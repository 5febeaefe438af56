mod bootstrap;
mod config;
mod db;
mod error;
mod extract;
mod http;
mod keep_alive;
mod media_info;
mod observability;
mod plugins;
mod premium;
mod telegraph;
mod tg;
mod util;
mod web;

pub use crate::error::*;
pub use config::*;
pub use metrics_exporter_prometheus::PrometheusHandle;
pub use observability::{init_logging, init_metrics, tracing_err, LoggingTask};

#[allow(unused_imports)]
mod prelude {
    pub(crate) use crate::error::prelude::*;
    pub(crate) use crate::http::prelude::*;
    pub(crate) use crate::observability::logging::prelude::*;
    pub(crate) use crate::util::prelude::*;
}

/// Run the telegram bot until it's interrupted. The `metrics` handle renders
/// the metrics served by the health check listener.
pub async fn run(config: Config, metrics: PrometheusHandle) -> Result {
    bootstrap::run(config, metrics).await
}

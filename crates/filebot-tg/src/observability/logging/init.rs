use crate::config::from_env_or_panic;
use crate::observability::GLOBAL_LABELS;
use crate::prelude::*;
use serde::Deserialize;
use serde_with::serde_as;
use std::any::Any;
use std::collections::HashMap;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

/// Background task that pushes the logs to Loki. It must be shut down
/// before the process exits, otherwise the last batch of logs is lost.
pub struct LoggingTask {
    loki: Option<LokiTask>,
}

struct LokiTask {
    task: tokio::task::JoinHandle<()>,
    controller: tracing_loki::BackgroundTaskController,
}

impl LoggingTask {
    pub async fn shutdown(self) {
        let Some(LokiTask { task, controller }) = self.loki else {
            return;
        };

        info!("Flushing the remaining logs to Loki...");

        let (result, elapsed) = async {
            controller.shutdown().await;
            task.await
        }
        .with_duration()
        .await;

        // The subscriber may be unable to report anything at this point
        eprintln!("Loki task stopped in {elapsed:.2?}: {result:?}");
    }
}

pub fn init_logging() -> LoggingTask {
    from_env_or_panic::<LoggingConfig>("").init()
}

#[serde_as]
#[derive(Deserialize)]
struct LoggingConfig {
    /// Logs are pushed to Grafana Loki only if this is set
    loki_url: Option<url::Url>,

    /// Extra Loki labels as a JSON object, e.g. `{"env":"prod"}`
    #[serde_as(as = "serde_with::json::JsonString")]
    #[serde(default)]
    filebot_log_labels: HashMap<String, String>,
}

impl LoggingConfig {
    fn init(self) -> LoggingTask {
        let env_filter =
            EnvFilter::try_from_env("FILEBOT_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

        let fmt = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_ansi(std::env::var("COLORS").as_deref() != Ok("0"))
            .pretty();

        let (loki_layer, loki) = match self.loki_url {
            Some(url) => {
                let (layer, task) = loki_layer(url, self.filebot_log_labels);
                (Some(layer), Some(task))
            }
            None => (None, None),
        };

        tracing_subscriber::registry()
            .with(fmt)
            .with(loki_layer)
            .with(env_filter)
            .with(tracing_error::ErrorLayer::default())
            .init();

        let default_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            // The default hook goes first, the panic may come from the
            // logging system itself
            default_hook(info);

            let location = info
                .location()
                .map(|location| format!("{}:{}", location.file(), location.line()));

            error!(
                target: "panic",
                thread = std::thread::current().name(),
                location,
                span_trace = %tracing_error::SpanTrace::capture(),
                backtrace = %std::backtrace::Backtrace::capture(),
                "{}",
                panic_message(info.payload()),
            );
        }));

        LoggingTask { loki }
    }
}

fn loki_layer(
    url: url::Url,
    extra_labels: HashMap<String, String>,
) -> (tracing_loki::Layer, LokiTask) {
    let labels = GLOBAL_LABELS
        .iter()
        .chain(&[("source", "filebot-tg")])
        .map(|(key, value)| ((*key).to_owned(), (*value).to_owned()))
        .chain(extra_labels);

    let mut builder = tracing_loki::builder();
    for (key, value) in labels {
        builder = builder
            .label(key, value)
            .unwrap_or_else(|err| panic!("BUG: invalid Loki label: {err}"));
    }

    let (layer, controller, task) = builder
        .build_controller_url(url)
        .unwrap_or_else(|err| panic!("BUG: failed to set up the Loki layer: {err}"));

    let task = tokio::spawn(task);

    (layer, LokiTask { task, controller })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<String>()
        .map(String::as_str)
        .or_else(|| payload.downcast_ref::<&str>().copied())
        .unwrap_or("<non-string panic payload>")
}

use filebot_tg::{tracing_err, PrometheusHandle};
use futures::prelude::*;
use std::panic::AssertUnwindSafe;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    if dotenvy::dotenv().is_err() {
        eprintln!("Dotenv config was not found, ignoring this...")
    }

    let logging_task = filebot_tg::init_logging();

    let metrics = filebot_tg::init_metrics();

    let exit_code = AssertUnwindSafe(async {
        let result = try_main(metrics).await;

        result.map(|()| ExitCode::SUCCESS).unwrap_or_else(|err| {
            error!(err = tracing_err(&err), "Exiting with an error...");
            ExitCode::FAILURE
        })
    })
    .catch_unwind()
    .unwrap_or_else(|_| {
        error!("Exiting due to a panic...");
        ExitCode::FAILURE
    })
    .await;

    logging_task.shutdown().await;

    exit_code
}

/// Telegram may ask to back off during the startup, in which case the whole
/// startup is retried after the requested delay.
async fn try_main(metrics: PrometheusHandle) -> filebot_tg::Result {
    loop {
        let config = filebot_tg::Config::load_or_panic();

        let Err(err) = filebot_tg::run(config, metrics.clone()).await else {
            info!("Service stopped, bye!");
            return Ok(());
        };

        let Some(backoff) = err.retry_after() else {
            return Err(err);
        };

        warn!(
            backoff_secs = backoff.as_secs(),
            err = tracing_err(&err),
            "Hit Telegram flood limit, retrying the startup after the backoff"
        );

        tokio::time::sleep(backoff).await;
    }
}

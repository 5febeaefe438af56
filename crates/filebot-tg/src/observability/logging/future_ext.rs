use crate::prelude::*;
use async_trait::async_trait;
use easy_ext::ext;
use std::future::Future;
use std::time::{Duration, Instant};

#[ext(FutureExt)]
#[async_trait]
pub(crate) impl<T, E, F> F
where
    F: Future<Output = Result<T, E>> + Send,
{
    /// Logs how long the `operation` took and whether it succeeded
    async fn with_duration_log(self, operation: &str) -> F::Output {
        let (result, elapsed) = self.with_duration().await;
        let duration = tracing_duration(elapsed);

        if result.is_ok() {
            info!(operation, duration, "Operation finished");
        } else {
            warn!(operation, duration, "Operation failed");
        }

        result
    }

    async fn with_duration(self) -> (F::Output, Duration) {
        let start = Instant::now();
        let output = self.await;
        (output, start.elapsed())
    }
}

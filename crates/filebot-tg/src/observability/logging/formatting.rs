use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Records the error as a structured `tracing` value, so subscribers can walk
/// its `source()` chain
#[must_use]
pub fn tracing_err<'e>(err: &'e (impl Error + 'static)) -> impl tracing::Value + 'e {
    err as &(dyn Error + 'static)
}

/// Durations are logged in seconds with millisecond precision
pub(crate) fn tracing_duration(duration: Duration) -> impl tracing::Value {
    tracing::field::display(Seconds(duration))
}

struct Seconds(Duration);

impl fmt::Display for Seconds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.3}s", self.0.as_secs_f64())
    }
}

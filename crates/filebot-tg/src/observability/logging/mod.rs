mod formatting;
mod future_ext;
mod init;

pub use formatting::tracing_err;
pub use init::{init_logging, LoggingTask};

pub(crate) mod prelude {
    pub(crate) use super::formatting::{tracing_duration, tracing_err};
    pub(crate) use super::future_ext::FutureExt as _;

    // The whole macro family is imported at once, so modules don't need to
    // adjust their imports when switching log levels.
    #[allow(unused_imports)]
    pub(crate) use tracing::{
        debug, debug_span, error, info, info_span, instrument, trace, warn, Instrument as _,
    };
}

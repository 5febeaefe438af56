mod ext;
mod macros;

use crate::prelude::*;
use crate::util::DynError;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing_error::SpanTrace;

pub(crate) use ext::*;
pub(crate) use macros::*;

pub(crate) mod prelude {
    pub(crate) use super::ext::{OptionExt as _, ResultExt as _};
}

pub type Result<T = (), E = Error> = std::result::Result<T, E>;

/// Any failure of the bot that is propagated to the caller. Cloning is cheap,
/// which lets the same error be logged and reported to the chat.
#[derive(Clone)]
pub struct Error {
    imp: Arc<ErrorImp>,
}

struct ErrorImp {
    kind: ErrorKind,

    /// Short random tag printed with the error, so a log line can be matched
    /// with the user's report
    id: String,

    /// Shown only in the `Debug` output
    spantrace: SpanTrace,
}

#[derive(Error, Debug)]
pub(crate) enum ErrorKind {
    #[error(transparent)]
    Tg {
        #[from]
        source: teloxide::RequestError,
    },

    #[error(transparent)]
    Db {
        #[from]
        source: crate::db::DbError,
    },

    #[error(transparent)]
    HttpClient {
        #[from]
        source: crate::http::HttpClientError,
    },

    #[error(transparent)]
    Telegraph {
        #[from]
        source: crate::telegraph::TelegraphError,
    },

    #[error(transparent)]
    MediaInfo {
        #[from]
        source: crate::media_info::ParseError,
    },

    #[error(transparent)]
    Stream {
        #[from]
        source: crate::extract::StreamError,
    },

    #[error(transparent)]
    Plugin {
        #[from]
        source: crate::plugins::PluginError,
    },

    #[error(transparent)]
    Io {
        #[from]
        source: IoError,
    },

    /// A broken invariant or an environment problem there is no sensible
    /// reaction to other than bubbling it up
    #[error("FATAL: {message}")]
    Fatal {
        message: String,
        source: Option<Box<DynError>>,
    },
}

impl From<std::io::Error> for ErrorKind {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            source: IoError::Other { source },
        }
    }
}

#[derive(Debug, Error)]
pub(crate) enum IoError {
    #[error("Failed to bind the HTTP listener to {addr}")]
    BindListener {
        addr: SocketAddr,
        source: std::io::Error,
    },

    #[error(transparent)]
    Other { source: std::io::Error },
}

impl Error {
    pub(crate) fn kind(&self) -> &ErrorKind {
        &self.imp.kind
    }

    /// Flood-wait duration if Telegram rejected the request due to its rate
    /// limits
    pub fn retry_after(&self) -> Option<Duration> {
        let ErrorKind::Tg { source } = self.kind() else {
            return None;
        };

        match source {
            teloxide::RequestError::RetryAfter(seconds) => Some(seconds.duration()),
            _ => None,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ErrorImp { kind, id, .. } = &*self.imp;
        write!(f, "{kind} (error id: {id})")
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{self}")?;
        fmt::Display::fmt(&self.imp.spantrace, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.imp.kind.source()
    }
}

impl<T: Into<ErrorKind>> From<T> for Error {
    #[track_caller]
    fn from(kind: T) -> Self {
        let err = Self {
            imp: Arc::new(ErrorImp {
                kind: kind.into(),
                id: nanoid::nanoid!(6),
                spantrace: SpanTrace::capture(),
            }),
        };

        trace!(err = tracing_err(&err), "Error created");

        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_after_is_only_set_for_flood_waits() {
        let flood = Error::from(teloxide::RequestError::RetryAfter(
            teloxide::types::Seconds::from_seconds(7),
        ));
        assert_eq!(flood.retry_after(), Some(Duration::from_secs(7)));

        let other = Error::from(teloxide::RequestError::InvalidJson {
            source: serde_json::from_str::<()>("{").unwrap_err().into(),
            raw: "{".into(),
        });
        assert_eq!(other.retry_after(), None);

        assert_eq!(fatal!("boom").retry_after(), None);
    }

    #[test]
    fn display_includes_the_id() {
        let err = fatal!("scratch dir is missing");
        let text = err.to_string();

        assert!(text.starts_with("FATAL: scratch dir is missing (error id: "), "{text}");
    }
}

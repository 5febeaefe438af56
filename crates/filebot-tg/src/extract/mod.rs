//! Publishing of the media track list of a stored file as a Telegraph page.
//!
//! The flow downloads only a prefix of the file, which is enough for the
//! container headers in most cases, runs it through the metadata parser
//! and publishes the summary. The interactive keyboard of the originating
//! message shows a "please wait" placeholder while the flow runs, and it
//! is replaced with a link or reverted on every exit path.

mod markup;
mod summary;
mod tg_platform;

pub(crate) use markup::*;
pub(crate) use summary::*;
pub(crate) use tg_platform::*;

use crate::db::{FileLookup, StoredFile};
use crate::media_info::{MetadataParser, ParseError};
use crate::prelude::*;
use crate::telegraph::PagePublisher;
use crate::util::{temp_file, DynError};
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::future::FutureExt as _;
use futures::stream::{BoxStream, StreamExt as _};
use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use teloxide::types::InlineKeyboardMarkup;
use tokio::io::AsyncWriteExt as _;
use url::Url;

/// Size of a single chunk of the streamed file prefix
pub(crate) const CHUNK_SIZE: u64 = 1024 * 1024;

/// Files bigger than this get a larger prefix downloaded
const LARGE_FILE_THRESHOLD: u64 = 200 * 1024 * 1024;

#[serde_as]
#[derive(Clone, Deserialize)]
pub(crate) struct Config {
    /// Overall budget for downloading the file prefix
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "stream_timeout_secs", default = "default_stream_timeout")]
    pub(crate) stream_timeout: Duration,

    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "parse_timeout_secs", default = "default_parse_timeout")]
    pub(crate) parse_timeout: Duration,

    /// Path or name of the `mediainfo` executable
    #[serde(default = "default_mediainfo_bin")]
    pub(crate) mediainfo_bin: String,

    #[serde(default = "std::env::temp_dir")]
    pub(crate) temp_dir: PathBuf,
}

fn default_stream_timeout() -> Duration {
    Duration::from_secs(12)
}

fn default_parse_timeout() -> Duration {
    Duration::from_secs(6)
}

fn default_mediainfo_bin() -> String {
    "mediainfo".to_owned()
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum StreamError {
    #[error("failed to resolve the file for download: {source}")]
    Resolve { source: teloxide::RequestError },

    #[error(
        "the file exceeds the download limit of the Bot API, \
        a local Bot API server is required to read it"
    )]
    TooBig { source: teloxide::RequestError },

    #[error("failed to read the file from the local Bot API storage: {source}")]
    ReadLocal { source: std::io::Error },

    #[error("failed to download the file: {source}")]
    Download { source: Box<DynError> },

    #[error("failed to write the downloaded bytes: {source}")]
    Write { source: std::io::Error },
}

/// The file re-sent to the archival channel, which makes it downloadable
#[derive(Debug, Clone)]
pub(crate) struct Materialized {
    pub(crate) file_id: String,
    pub(crate) file_name: String,
    pub(crate) file_size: u64,
}

pub(crate) type ByteStream = BoxStream<'static, Result<Bytes, StreamError>>;

/// Chat operations needed by the flow, bound to the callback query that
/// triggered it.
#[async_trait]
pub(crate) trait Platform: Send + Sync {
    async fn edit_markup(&self, markup: InlineKeyboardMarkup) -> Result;

    /// Shows a modal alert to the user who pressed the button
    async fn alert(&self, text: &str) -> Result;

    /// Replies to the message with the keyboard
    async fn reply(&self, text: &str) -> Result;

    async fn materialize(&self, file: &StoredFile) -> Result<Materialized>;

    /// Streams the file content from its start. The stream may yield more
    /// than `limit` bytes, the caller truncates it.
    async fn stream(&self, file: &Materialized, limit: u64) -> Result<ByteStream, StreamError>;
}

pub(crate) fn chunk_budget(file_size: u64) -> u64 {
    if file_size > LARGE_FILE_THRESHOLD {
        4
    } else {
        2
    }
}

/// How an invocation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub(crate) enum Outcome {
    Published,
    NotFound,
    StreamFailed,
    ParseTimedOut,
    ToolMissing,
    ParseFailed,
    NoMetadata,
    PublishFailed,
    Crashed,
}

pub(crate) struct Seams<'a, P: ?Sized, L: ?Sized, M: ?Sized, Pub: ?Sized> {
    pub(crate) platform: &'a P,
    pub(crate) lookup: &'a L,
    pub(crate) parser: &'a M,
    pub(crate) publisher: &'a Pub,
}

pub(crate) struct Request<'a> {
    /// Full callback data of the pressed button
    pub(crate) callback_data: &'a str,
    pub(crate) file_id: &'a str,
    /// Keyboard of the message before the button was pressed
    pub(crate) original_markup: Option<&'a InlineKeyboardMarkup>,
    /// Prefix of the scratch file name
    pub(crate) temp_prefix: String,
}

pub(crate) struct Settings<'a> {
    pub(crate) cfg: &'a Config,
    pub(crate) footer: PageFooter<'a>,
}

pub(crate) async fn run_extraction<P, L, M, Pub>(
    seams: Seams<'_, P, L, M, Pub>,
    request: Request<'_>,
    settings: Settings<'_>,
) -> Outcome
where
    P: Platform + ?Sized,
    L: FileLookup + ?Sized,
    M: MetadataParser + ?Sized,
    Pub: PagePublisher + ?Sized,
{
    let start = Instant::now();
    let waiting = with_waiting_button(request.original_markup, request.callback_data);

    if let Err(err) = seams.platform.edit_markup(waiting).await {
        debug!(err = tracing_err(&err), "Failed to set waiting markup, continuing");
    }

    let temp_path = temp_file::unique_path(&settings.cfg.temp_dir, &request.temp_prefix);

    let invocation = Invocation {
        seams: &seams,
        request: &request,
        settings: &settings,
        temp_path: &temp_path,
    };

    let result = AssertUnwindSafe(invocation.run()).catch_unwind().await;

    let outcome = match result {
        Ok(Ok(outcome)) => outcome,
        Ok(Err(err)) => {
            error!(err = tracing_err(&err), "Unhandled error in the extraction");
            invocation.fail(&format!("Error: {err}")).await;
            Outcome::Crashed
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            error!(panic = message, "Extraction panicked");
            invocation.fail(&format!("Error: {message}")).await;
            Outcome::Crashed
        }
    };

    temp_file::remove(temp_path);

    let outcome_label: &'static str = outcome.into();
    metrics::counter!("extract_invocations_total", "outcome" => outcome_label).increment(1);
    metrics::histogram!("extract_duration_seconds", "outcome" => outcome_label)
        .record(start.elapsed());

    outcome
}

struct Invocation<'a, P: ?Sized, L: ?Sized, M: ?Sized, Pub: ?Sized> {
    seams: &'a Seams<'a, P, L, M, Pub>,
    request: &'a Request<'a>,
    settings: &'a Settings<'a>,
    temp_path: &'a Path,
}

impl<P, L, M, Pub> Invocation<'_, P, L, M, Pub>
where
    P: Platform + ?Sized,
    L: FileLookup + ?Sized,
    M: MetadataParser + ?Sized,
    Pub: PagePublisher + ?Sized,
{
    async fn run(&self) -> Result<Outcome> {
        let Seams {
            platform,
            lookup,
            parser,
            publisher,
        } = self.seams;

        let Some(stored) = lookup.file_details(self.request.file_id).await? else {
            return Ok(self.abort(Outcome::NotFound, "File not found in DB.").await);
        };

        let materialized = platform.materialize(&stored).await?;

        let file_size = if materialized.file_size == 0 {
            stored.file_size
        } else {
            materialized.file_size
        };

        let limit = chunk_budget(file_size) * CHUNK_SIZE;

        // The file outlives the timeout, so the bytes of a write interrupted
        // by it are still flushed before the parser opens the file
        let mut out = match fs_err::tokio::File::create(self.temp_path).await {
            Ok(out) => out,
            Err(source) => return Ok(self.stream_failed(StreamError::Write { source }).await),
        };

        let mut written = 0;
        let stream = stream_to_file(*platform, &materialized, &mut out, &mut written, limit);
        let streamed = tokio::time::timeout(self.settings.cfg.stream_timeout, stream).await;

        let flushed = out.flush().await;
        drop(out);

        match streamed {
            Ok(Ok(())) => debug!(written, limit, "Downloaded file prefix"),
            Ok(Err(err)) => return Ok(self.stream_failed(err).await),
            Err(_) => warn!(
                written,
                "Streaming partial file timed out, continuing with partial data"
            ),
        }

        if let Err(source) = flushed {
            return Ok(self.stream_failed(StreamError::Write { source }).await);
        }

        let timeout = self.settings.cfg.parse_timeout;
        let tracks = tokio::time::timeout(timeout, parser.parse(self.temp_path))
            .await
            .unwrap_or(Err(ParseError::Timeout { timeout }));

        let tracks = match tracks {
            Ok(tracks) => tracks,
            Err(err) => {
                let (outcome, text) = match &err {
                    ParseError::Timeout { .. } => {
                        warn!("Metadata scan timed out");
                        (Outcome::ParseTimedOut, "Metadata scan timed out.".to_owned())
                    }
                    ParseError::ToolMissing { .. } => {
                        error!(err = tracing_err(&err), "MediaInfo tool error");
                        (
                            Outcome::ToolMissing,
                            "MediaInfo native library not found on server.".to_owned(),
                        )
                    }
                    _ => {
                        error!(err = tracing_err(&err), "MediaInfo parse failed");
                        (Outcome::ParseFailed, format!("Metadata parse error: {err}"))
                    }
                };
                return Ok(self.abort(outcome, &text).await);
            }
        };

        let summary = summarize(&tracks);

        if summary.is_empty() {
            return Ok(self
                .abort(Outcome::NoMetadata, "No readable metadata found.")
                .await);
        }

        let title = sanitize_title(&materialized.file_name);
        let html = render_page(&summary, &self.settings.footer);

        let url = match publisher.publish(&title, &html).await {
            Ok(url) => url,
            Err(err) => {
                error!(err = tracing_err(&err), "Telegraph page creation failed");
                return Ok(self
                    .abort(Outcome::PublishFailed, "Failed to create Telegraph page.")
                    .await);
            }
        };

        info!(%url, "Published track list");

        self.show_link(&url).await;

        Ok(Outcome::Published)
    }

    async fn show_link(&self, url: &Url) {
        let platform = self.seams.platform;
        let markup = with_link_button(
            self.request.original_markup,
            self.request.callback_data,
            url,
        );

        let Err(err) = platform.edit_markup(markup).await else {
            return;
        };

        error!(
            err = tracing_err(&err),
            "Failed to edit message markup with the link"
        );

        if let Err(err) = platform.reply(&format!("Metadata: {url}")).await {
            debug!(err = tracing_err(&err), "Failed to reply with the link");
        }
    }

    async fn stream_failed(&self, err: StreamError) -> Outcome {
        error!(err = tracing_err(&err), "Error while streaming partial file");
        self.abort(Outcome::StreamFailed, &format!("Stream error: {err}"))
            .await
    }

    async fn abort(&self, outcome: Outcome, text: &str) -> Outcome {
        self.fail(text).await;
        outcome
    }

    /// Tells the user what went wrong and restores the keyboard. Both steps
    /// are best-effort.
    async fn fail(&self, text: &str) {
        if let Err(err) = self.seams.platform.alert(text).await {
            debug!(err = tracing_err(&err), "Failed to show the error alert");
        }
        self.revert().await;
    }

    async fn revert(&self) {
        let Some(markup) = self.request.original_markup else {
            return;
        };
        if let Err(err) = self.seams.platform.edit_markup(markup.clone()).await {
            debug!(err = tracing_err(&err), "Could not revert markup, ignoring");
        }
    }
}

/// Copies at most `limit` bytes of the file into `out`. The progress is
/// kept in `written`, so it is known even if the future is cancelled.
async fn stream_to_file<P: Platform + ?Sized>(
    platform: &P,
    file: &Materialized,
    out: &mut fs_err::tokio::File,
    written: &mut u64,
    limit: u64,
) -> Result<(), StreamError> {
    let mut stream = platform.stream(file, limit).await?;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        let remaining = usize::try_from(limit - *written).unwrap_or(usize::MAX);
        let chunk = &chunk[..chunk.len().min(remaining)];

        out.write_all(chunk)
            .await
            .map_err(|source| StreamError::Write { source })?;
        *written += chunk.len() as u64;

        if *written >= limit {
            break;
        }
    }

    Ok(())
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_owned())
}

#[cfg(test)]
mod tests;

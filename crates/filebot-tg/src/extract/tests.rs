use super::*;
use crate::prelude::*;
use crate::db::StoredFileKind;
use crate::fatal;
use crate::media_info::{LanguageTrack, Track, VideoTrack};
use futures::stream::{self, StreamExt as _};
use std::sync::Mutex;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardButtonKind};

const CALLBACK: &str = "extract_data:abc";
const MIB: u64 = CHUNK_SIZE;

fn original_markup() -> InlineKeyboardMarkup {
    InlineKeyboardMarkup::new([
        vec![InlineKeyboardButton::callback("Get file", "file:abc")],
        vec![InlineKeyboardButton::callback("Tracks", CALLBACK)],
    ])
}

fn page_url() -> Url {
    "https://telegra.ph/Movie-Title-2024-10-16".parse().unwrap()
}

enum StreamPlan {
    Chunks(usize),
    ChunksThenHang(usize),
    Fail,
}

#[derive(Default)]
struct Calls {
    markups: Vec<InlineKeyboardMarkup>,
    alerts: Vec<String>,
    replies: Vec<String>,
    materialized: usize,
    stream_limit: Option<u64>,
}

struct FakePlatform {
    calls: Mutex<Calls>,
    stream: StreamPlan,
    file_size: u64,
    fail_link_edit: bool,
    fail_alert: bool,
    panic_on_materialize: bool,
}

#[async_trait]
impl Platform for FakePlatform {
    async fn edit_markup(&self, markup: InlineKeyboardMarkup) -> Result {
        let has_link = markup
            .inline_keyboard
            .iter()
            .flatten()
            .any(|button| matches!(button.kind, InlineKeyboardButtonKind::Url(_)));

        if self.fail_link_edit && has_link {
            return Err(fatal!("message is not modified"));
        }

        self.calls.lock().unwrap().markups.push(markup);
        Ok(())
    }

    async fn alert(&self, text: &str) -> Result {
        if self.fail_alert {
            return Err(fatal!("query is too old and response timeout expired"));
        }
        self.calls.lock().unwrap().alerts.push(text.to_owned());
        Ok(())
    }

    async fn reply(&self, text: &str) -> Result {
        self.calls.lock().unwrap().replies.push(text.to_owned());
        Ok(())
    }

    async fn materialize(&self, file: &StoredFile) -> Result<Materialized> {
        if self.panic_on_materialize {
            panic!("archive channel is gone");
        }
        self.calls.lock().unwrap().materialized += 1;
        Ok(Materialized {
            file_id: format!("{}-resent", file.file_id),
            file_name: file.file_name.clone(),
            file_size: self.file_size,
        })
    }

    async fn stream(&self, _file: &Materialized, limit: u64) -> Result<ByteStream, StreamError> {
        self.calls.lock().unwrap().stream_limit = Some(limit);

        let chunk = || -> Result<Bytes, StreamError> { Ok(Bytes::from(vec![0_u8; MIB as usize])) };

        let stream = match self.stream {
            StreamPlan::Chunks(count) => stream::iter((0..count).map(move |_| chunk())).boxed(),
            StreamPlan::ChunksThenHang(count) => stream::iter((0..count).map(move |_| chunk()))
                .chain(stream::pending())
                .boxed(),
            StreamPlan::Fail => stream::iter([
                chunk(),
                Err(StreamError::Download {
                    source: "connection reset by peer".into(),
                }),
            ])
            .boxed(),
        };

        Ok(stream)
    }
}

struct FakeLookup {
    file: Option<StoredFile>,
    fail: bool,
}

#[async_trait]
impl FileLookup for FakeLookup {
    async fn file_details(&self, _file_id: &str) -> Result<Option<StoredFile>> {
        if self.fail {
            return Err(fatal!("database is down"));
        }
        Ok(self.file.clone())
    }
}

enum ParsePlan {
    Tracks(Vec<Track>),
    Hang,
    ToolMissing,
    Fail,
}

struct FakeParser {
    plan: ParsePlan,
    seen_len: Mutex<Option<u64>>,
}

#[async_trait]
impl MetadataParser for FakeParser {
    async fn parse(&self, path: &Path) -> Result<Vec<Track>, ParseError> {
        *self.seen_len.lock().unwrap() = std::fs::metadata(path).ok().map(|meta| meta.len());

        match &self.plan {
            ParsePlan::Tracks(tracks) => Ok(tracks.clone()),
            ParsePlan::Hang => std::future::pending().await,
            ParsePlan::ToolMissing => Err(ParseError::ToolMissing {
                program: "mediainfo".to_owned(),
                source: std::io::ErrorKind::NotFound.into(),
            }),
            ParsePlan::Fail => Err(ParseError::Failed {
                status: std::process::ExitStatus::default(),
                stderr: "corrupted header".to_owned(),
            }),
        }
    }
}

struct FakePublisher {
    fail: bool,
    published: Mutex<Vec<(String, String)>>,
}

#[async_trait]
impl PagePublisher for FakePublisher {
    async fn publish(&self, title: &str, html: &str) -> Result<Url> {
        if self.fail {
            return Err(fatal!("PAGE_SAVE_FAILED"));
        }
        self.published
            .lock()
            .unwrap()
            .push((title.to_owned(), html.to_owned()));
        Ok(page_url())
    }
}

struct Fixture {
    platform: FakePlatform,
    lookup: FakeLookup,
    parser: FakeParser,
    publisher: FakePublisher,
    dir: tempfile::TempDir,
}

fn movie_tracks() -> Vec<Track> {
    vec![
        Track::Other {
            kind: "General".to_owned(),
        },
        Track::Video(VideoTrack {
            format: Some("HEVC".to_owned()),
            codec_id: None,
            width: Some(1280),
            height: Some(720),
        }),
        Track::Audio(LanguageTrack {
            language: Some("en".to_owned()),
            language_name: Some("English".to_owned()),
        }),
    ]
}

impl Fixture {
    fn new() -> Self {
        Self {
            platform: FakePlatform {
                calls: Default::default(),
                stream: StreamPlan::Chunks(3),
                file_size: 10 * MIB,
                fail_link_edit: false,
                fail_alert: false,
                panic_on_materialize: false,
            },
            lookup: FakeLookup {
                file: Some(StoredFile {
                    file_id: "abc".to_owned(),
                    file_name: "Movie.Title.2024.mkv".to_owned(),
                    file_size: 10 * MIB,
                    kind: StoredFileKind::Video,
                }),
                fail: false,
            },
            parser: FakeParser {
                plan: ParsePlan::Tracks(movie_tracks()),
                seen_len: Default::default(),
            },
            publisher: FakePublisher {
                fail: false,
                published: Default::default(),
            },
            dir: tempfile::tempdir().unwrap(),
        }
    }

    async fn run(&self) -> Outcome {
        let cfg = Config {
            stream_timeout: Duration::from_secs(2),
            parse_timeout: Duration::from_millis(300),
            mediainfo_bin: default_mediainfo_bin(),
            temp_dir: self.dir.path().to_owned(),
        };
        let footer_url: Url = "https://t.me/DreamxBotz".parse().unwrap();
        let markup = original_markup();

        let outcome = run_extraction(
            Seams {
                platform: &self.platform,
                lookup: &self.lookup,
                parser: &self.parser,
                publisher: &self.publisher,
            },
            Request {
                callback_data: CALLBACK,
                file_id: "abc",
                original_markup: Some(&markup),
                temp_prefix: "acc_1_2".to_owned(),
            },
            Settings {
                cfg: &cfg,
                footer: PageFooter {
                    text: "DreamxBotz",
                    url: &footer_url,
                },
            },
        )
        .await;

        self.assert_invariants();

        outcome
    }

    fn assert_invariants(&self) {
        let leftovers: Vec<_> = std::fs::read_dir(self.dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .collect();
        assert!(leftovers.is_empty(), "temp files left: {leftovers:?}");

        let calls = self.platform.calls.lock().unwrap();
        let last = calls.markups.last().expect("markup must be edited");
        assert!(!is_waiting(last), "markup is left waiting: {last:?}");
    }

    fn calls(&self) -> std::sync::MutexGuard<'_, Calls> {
        self.platform.calls.lock().unwrap()
    }

    fn assert_reverted_with_alert(&self, alert: &str) {
        let calls = self.calls();
        assert_eq!(calls.alerts, [alert]);
        assert_eq!(calls.markups.last(), Some(&original_markup()));
    }
}

#[test_log::test(tokio::test)]
async fn publishes_track_list() {
    let fixture = Fixture::new();

    assert_eq!(fixture.run().await, Outcome::Published);

    // 10 MiB file gets two chunks even though the stream has three
    assert_eq!(*fixture.parser.seen_len.lock().unwrap(), Some(2 * MIB));

    let published = fixture.publisher.published.lock().unwrap();
    let (title, html) = &published[0];
    assert_eq!(title, "Movie Title 2024 ");
    assert!(html.contains("<blockquote>• Video: HEVC 1280x720</blockquote>"), "{html}");
    assert!(html.contains("<b>Audio Tracks (1):</b>"), "{html}");

    let calls = fixture.calls();
    assert!(calls.alerts.is_empty());
    assert_eq!(calls.markups.len(), 2);
    assert!(is_waiting(&calls.markups[0]));
    assert_eq!(
        calls.markups[1].inline_keyboard[1][0].kind,
        InlineKeyboardButtonKind::Url(page_url())
    );
}

#[test_log::test(tokio::test)]
async fn large_files_get_bigger_prefix() {
    let mut fixture = Fixture::new();
    fixture.platform.file_size = 300 * MIB;
    fixture.platform.stream = StreamPlan::Chunks(6);

    assert_eq!(fixture.run().await, Outcome::Published);
    assert_eq!(fixture.calls().stream_limit, Some(4 * MIB));
    assert_eq!(*fixture.parser.seen_len.lock().unwrap(), Some(4 * MIB));
}

#[test]
fn chunk_budget_threshold() {
    assert_eq!(chunk_budget(0), 2);
    assert_eq!(chunk_budget(200 * MIB), 2);
    assert_eq!(chunk_budget(200 * MIB + 1), 4);
}

#[test_log::test(tokio::test)]
async fn unknown_file_is_reported_without_download() {
    let mut fixture = Fixture::new();
    fixture.lookup.file = None;

    assert_eq!(fixture.run().await, Outcome::NotFound);
    fixture.assert_reverted_with_alert("File not found in DB.");

    let calls = fixture.calls();
    assert_eq!(calls.materialized, 0);
    assert_eq!(calls.stream_limit, None);
    assert_eq!(*fixture.parser.seen_len.lock().unwrap(), None);
}

#[test_log::test(tokio::test)]
async fn stream_failure_aborts() {
    let mut fixture = Fixture::new();
    fixture.platform.stream = StreamPlan::Fail;

    assert_eq!(fixture.run().await, Outcome::StreamFailed);
    fixture.assert_reverted_with_alert(
        "Stream error: failed to download the file: connection reset by peer",
    );
}

#[test_log::test(tokio::test)]
async fn stream_timeout_keeps_partial_data() {
    let mut fixture = Fixture::new();
    fixture.platform.stream = StreamPlan::ChunksThenHang(1);

    assert_eq!(fixture.run().await, Outcome::Published);
    assert_eq!(*fixture.parser.seen_len.lock().unwrap(), Some(MIB));
}

#[test_log::test(tokio::test)]
async fn parser_sees_every_chunk_written_before_timeout() {
    let mut fixture = Fixture::new();
    fixture.platform.file_size = 300 * MIB;
    fixture.platform.stream = StreamPlan::ChunksThenHang(3);

    assert_eq!(fixture.run().await, Outcome::Published);
    assert_eq!(fixture.calls().stream_limit, Some(4 * MIB));
    assert_eq!(*fixture.parser.seen_len.lock().unwrap(), Some(3 * MIB));
}

#[test_log::test(tokio::test)]
async fn parse_timeout_aborts() {
    let mut fixture = Fixture::new();
    fixture.parser.plan = ParsePlan::Hang;

    assert_eq!(fixture.run().await, Outcome::ParseTimedOut);
    fixture.assert_reverted_with_alert("Metadata scan timed out.");
}

#[test_log::test(tokio::test)]
async fn missing_tool_is_reported() {
    let mut fixture = Fixture::new();
    fixture.parser.plan = ParsePlan::ToolMissing;

    assert_eq!(fixture.run().await, Outcome::ToolMissing);
    fixture.assert_reverted_with_alert("MediaInfo native library not found on server.");
}

#[test_log::test(tokio::test)]
async fn parse_failure_is_reported() {
    let mut fixture = Fixture::new();
    fixture.parser.plan = ParsePlan::Fail;

    assert_eq!(fixture.run().await, Outcome::ParseFailed);

    let calls = fixture.calls();
    assert_eq!(calls.alerts.len(), 1);
    assert!(
        calls.alerts[0].starts_with("Metadata parse error: MediaInfo exited with"),
        "{:?}",
        calls.alerts
    );
}

#[test_log::test(tokio::test)]
async fn general_track_only_is_no_metadata() {
    let mut fixture = Fixture::new();
    fixture.parser.plan = ParsePlan::Tracks(vec![Track::Other {
        kind: "General".to_owned(),
    }]);

    assert_eq!(fixture.run().await, Outcome::NoMetadata);
    fixture.assert_reverted_with_alert("No readable metadata found.");
}

#[test_log::test(tokio::test)]
async fn subtitles_only_is_published_as_partial_scan() {
    let mut fixture = Fixture::new();
    fixture.parser.plan = ParsePlan::Tracks(vec![Track::Text(LanguageTrack {
        language: Some("en".to_owned()),
        language_name: None,
    })]);

    assert_eq!(fixture.run().await, Outcome::Published);

    let published = fixture.publisher.published.lock().unwrap();
    assert!(published[0].1.starts_with("<i>⚠️ Partial scan"));
}

#[test_log::test(tokio::test)]
async fn publish_failure_aborts() {
    let mut fixture = Fixture::new();
    fixture.publisher.fail = true;

    assert_eq!(fixture.run().await, Outcome::PublishFailed);
    fixture.assert_reverted_with_alert("Failed to create Telegraph page.");
}

#[test_log::test(tokio::test)]
async fn falls_back_to_reply_when_link_edit_fails() {
    let mut fixture = Fixture::new();
    fixture.platform.fail_link_edit = true;

    assert_eq!(fixture.run().await, Outcome::Published);

    let calls = fixture.calls();
    assert_eq!(calls.replies, [format!("Metadata: {}", page_url())]);
}

#[test_log::test(tokio::test)]
async fn lookup_error_is_caught() {
    let mut fixture = Fixture::new();
    fixture.lookup.fail = true;

    assert_eq!(fixture.run().await, Outcome::Crashed);

    let calls = fixture.calls();
    assert_eq!(calls.alerts.len(), 1);

    let alert = &calls.alerts[0];
    assert!(alert.starts_with("Error: "), "{alert}");
    assert!(alert.contains("database is down"), "{alert}");
    assert_eq!(calls.markups.last(), Some(&original_markup()));
}

#[test_log::test(tokio::test)]
async fn failed_alert_still_reverts_markup() {
    let mut fixture = Fixture::new();
    fixture.lookup.file = None;
    fixture.platform.fail_alert = true;

    assert_eq!(fixture.run().await, Outcome::NotFound);

    let calls = fixture.calls();
    assert!(calls.alerts.is_empty());
    assert_eq!(calls.markups.last(), Some(&original_markup()));
}

#[test_log::test(tokio::test)]
async fn failed_alert_after_stream_error_still_reverts_markup() {
    let mut fixture = Fixture::new();
    fixture.platform.stream = StreamPlan::Fail;
    fixture.platform.fail_alert = true;

    assert_eq!(fixture.run().await, Outcome::StreamFailed);
    assert_eq!(fixture.calls().markups.last(), Some(&original_markup()));
}

#[test_log::test(tokio::test)]
async fn panic_is_caught() {
    let mut fixture = Fixture::new();
    fixture.platform.panic_on_materialize = true;

    assert_eq!(fixture.run().await, Outcome::Crashed);
    fixture.assert_reverted_with_alert("Error: archive channel is gone");
}

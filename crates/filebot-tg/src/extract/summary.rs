use crate::media_info::{LanguageTrack, Track, VideoTrack};
use crate::prelude::*;
use itertools::Itertools;
use std::fmt::Write as _;
use teloxide::utils::html;
use url::Url;

const MAX_TITLE_CHARS: usize = 200;

/// Marker for a track without any language information
const UNDETERMINED_LANGUAGE: &str = "und";

/// What the published page says about the media file
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct TrackSummary {
    pub(crate) video: Vec<String>,
    pub(crate) audio: Vec<String>,
    pub(crate) subtitles: Vec<String>,

    /// Only subtitles were found, which usually means the downloaded prefix
    /// of the file was too short to reach the other stream headers.
    pub(crate) incomplete_scan: bool,
}

impl TrackSummary {
    /// There is nothing that could be put on the page
    pub(crate) fn is_empty(&self) -> bool {
        self.video.is_empty() && self.audio.is_empty() && self.subtitles.is_empty()
    }
}

pub(crate) fn summarize(tracks: &[Track]) -> TrackSummary {
    let video = tracks
        .iter()
        .filter_map(|track| match track {
            Track::Video(video) => Some(describe_video(video)),
            _ => None,
        })
        .collect();

    let audio = tracks
        .iter()
        .filter_map(|track| match track {
            Track::Audio(audio) => Some(language_of(audio)),
            _ => None,
        })
        .unique()
        .collect();

    let subtitles: Vec<_> = tracks
        .iter()
        .filter_map(|track| match track {
            Track::Text(text) => Some(language_of(text)),
            _ => None,
        })
        .unique()
        .collect();

    let mut summary = TrackSummary {
        video,
        audio,
        subtitles,
        incomplete_scan: false,
    };

    summary.incomplete_scan =
        summary.audio.is_empty() && summary.video.is_empty() && !summary.subtitles.is_empty();

    summary
}

fn describe_video(video: &VideoTrack) -> String {
    let codec = video
        .format
        .as_deref()
        .or(video.codec_id.as_deref())
        .unwrap_or("Unknown");

    let dimension = |value: Option<u32>| value.map_or_else(|| "?".to_owned(), |v| v.to_string());

    format!(
        "Video: {codec} {}x{}",
        dimension(video.width),
        dimension(video.height)
    )
}

fn language_of(track: &LanguageTrack) -> String {
    track
        .language_name
        .as_deref()
        .or(track.language.as_deref())
        .unwrap_or(UNDETERMINED_LANGUAGE)
        .to_owned()
}

/// Strips the common separators and extensions from the file name and
/// limits its length, so it's suitable for a page title.
pub(crate) fn sanitize_title(file_name: &str) -> String {
    let title = file_name.replace(['.', '_', '-'], " ");
    let title = lazy_regex::regex!(r"[\[\]()]|mkv|mp4").replace_all(&title, "");
    title.truncate_chars(MAX_TITLE_CHARS).to_owned()
}

/// Footer link appended to every published page
pub(crate) struct PageFooter<'a> {
    pub(crate) text: &'a str,
    pub(crate) url: &'a Url,
}

pub(crate) fn render_page(summary: &TrackSummary, footer: &PageFooter<'_>) -> String {
    let mut page = String::new();

    if summary.incomplete_scan {
        page.push_str("<i>⚠️ Partial scan - metadata may be incomplete.</i><br><br>");
    }

    page.push_str("<h3><b>Available Tracks</b></h3><br>");

    if !summary.video.is_empty() {
        page.push_str("<b>Video Track:</b><br>");
        push_items(&mut page, &summary.video);
        page.push_str("<br>");
    }

    render_section(&mut page, "Audio Tracks", &summary.audio);
    if summary.audio.is_empty() {
        page.push_str("<br>");
    }

    render_section(&mut page, "Subtitle Tracks", &summary.subtitles);

    // Writing into a `String` never fails
    let _ = write!(
        page,
        r#"<code>Join <a href="{}">{}</a></code>"#,
        html::escape(footer.url.as_str()),
        html::escape(footer.text),
    );

    page
}

fn render_section(page: &mut String, header: &str, items: &[String]) {
    if items.is_empty() {
        let _ = write!(page, "<b>{header}:</b> None<br>");
        return;
    }

    let _ = write!(page, "<b>{header} ({}):</b><br>", items.len());
    push_items(page, items);
    page.push_str("<br>");
}

fn push_items(page: &mut String, items: &[String]) {
    for item in items {
        let _ = write!(page, "<blockquote>• {}</blockquote>", html::escape(item));
    }
}

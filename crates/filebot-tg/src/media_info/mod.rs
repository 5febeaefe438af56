//! Container metadata extraction via the `mediainfo` command line tool.

use crate::prelude::*;
use crate::util::process;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

/// One media stream described by the container metadata
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Track {
    Video(VideoTrack),
    Audio(LanguageTrack),
    /// Subtitles
    Text(LanguageTrack),
    /// General, menu, image and other tracks we don't report
    Other { kind: String },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct VideoTrack {
    pub(crate) format: Option<String>,
    pub(crate) codec_id: Option<String>,
    pub(crate) width: Option<u32>,
    pub(crate) height: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct LanguageTrack {
    /// Short language code, e.g. `en`
    pub(crate) language: Option<String>,
    /// Localized full language name, e.g. `English`
    pub(crate) language_name: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum ParseError {
    #[error("Metadata scan timed out after {timeout:.2?}")]
    Timeout { timeout: Duration },

    #[error("MediaInfo executable `{program}` was not found")]
    ToolMissing {
        program: String,
        source: std::io::Error,
    },

    #[error("Failed to run MediaInfo executable `{program}`")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("MediaInfo exited with {status}: {stderr}")]
    Failed {
        status: std::process::ExitStatus,
        stderr: String,
    },

    #[error("MediaInfo returned unexpected JSON")]
    UnexpectedJson { source: serde_json::Error },
}

#[async_trait]
pub(crate) trait MetadataParser: Send + Sync {
    async fn parse(&self, path: &Path) -> Result<Vec<Track>, ParseError>;
}

/// Runs `mediainfo --Full --Output=JSON` in a child process, so the parsing
/// never blocks the async runtime, and the process is killed when the
/// caller stops waiting for it.
pub(crate) struct MediaInfoCli {
    program: String,
}

impl MediaInfoCli {
    pub(crate) fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl MetadataParser for MediaInfoCli {
    #[instrument(skip_all, fields(path = %path.display()))]
    async fn parse(&self, path: &Path) -> Result<Vec<Track>, ParseError> {
        let path_arg = path.to_string_lossy();
        let args = ["--Full", "--Output=JSON", path_arg.as_ref()];

        let output = process::run(&self.program, &args)
            .await
            .map_err(|source| {
                let program = self.program.clone();
                if source.kind() == std::io::ErrorKind::NotFound {
                    ParseError::ToolMissing { program, source }
                } else {
                    ParseError::Spawn { program, source }
                }
            })?;

        if !output.status.success() {
            return Err(ParseError::Failed {
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        parse_json(&output.stdout)
    }
}

#[derive(Deserialize)]
struct RawOutput {
    media: Option<RawMedia>,
}

#[derive(Deserialize)]
struct RawMedia {
    #[serde(default)]
    track: Vec<RawTrack>,
}

#[derive(Deserialize)]
struct RawTrack {
    #[serde(rename = "@type")]
    kind: String,

    #[serde(rename = "Format")]
    format: Option<String>,

    #[serde(rename = "CodecID")]
    codec_id: Option<String>,

    #[serde(rename = "Width")]
    width: Option<String>,

    #[serde(rename = "Height")]
    height: Option<String>,

    #[serde(rename = "Language")]
    language: Option<String>,

    #[serde(rename = "Language_String")]
    language_name: Option<String>,
}

/// An empty output (e.g. `mediainfo` couldn't recognize the file) gives
/// zero tracks, which is not an error at this level.
pub(crate) fn parse_json(json: &[u8]) -> Result<Vec<Track>, ParseError> {
    let output: RawOutput = serde_json::from_slice(json)
        .map_err(|source| ParseError::UnexpectedJson { source })?;

    let tracks = output
        .media
        .map(|media| media.track)
        .unwrap_or_default()
        .into_iter()
        .map(RawTrack::into_track)
        .collect();

    Ok(tracks)
}

impl RawTrack {
    fn into_track(self) -> Track {
        let non_blank = |value: Option<String>| value.filter(|value| !value.trim().is_empty());

        // Dimensions may be formatted with spaces as thousands separators
        let dimension = |value: Option<String>| {
            value.and_then(|value| {
                let digits: String = value.chars().filter(char::is_ascii_digit).collect();
                digits.parse().ok()
            })
        };

        let language = || LanguageTrack {
            language: non_blank(self.language.clone()),
            language_name: non_blank(self.language_name.clone()),
        };

        match self.kind.to_ascii_lowercase().as_str() {
            "video" => Track::Video(VideoTrack {
                format: non_blank(self.format),
                codec_id: non_blank(self.codec_id),
                width: dimension(self.width),
                height: dimension(self.height),
            }),
            "audio" => Track::Audio(language()),
            "text" | "subtitle" => Track::Text(language()),
            _ => Track::Other { kind: self.kind },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use expect_test::expect;

    #[test]
    fn parses_mediainfo_json() {
        let json = r#"{
            "creatingLibrary": {"name": "MediaInfoLib", "version": "23.04"},
            "media": {
                "@ref": "/tmp/acc_1_2_x.tmp",
                "track": [
                    {"@type": "General", "Format": "Matroska"},
                    {"@type": "Video", "Format": "HEVC", "CodecID": "V_MPEGH/ISO/HEVC", "Width": "1920", "Height": "1 080"},
                    {"@type": "Audio", "Format": "AAC", "Language": "en", "Language_String": "English"},
                    {"@type": "Audio", "Language": "hi"},
                    {"@type": "Text", "Language": ""},
                    {"@type": "Menu"}
                ]
            }
        }"#;

        let tracks = parse_json(json.as_bytes()).unwrap();

        expect![[r#"
            [
                Other {
                    kind: "General",
                },
                Video(
                    VideoTrack {
                        format: Some(
                            "HEVC",
                        ),
                        codec_id: Some(
                            "V_MPEGH/ISO/HEVC",
                        ),
                        width: Some(
                            1920,
                        ),
                        height: Some(
                            1080,
                        ),
                    },
                ),
                Audio(
                    LanguageTrack {
                        language: Some(
                            "en",
                        ),
                        language_name: Some(
                            "English",
                        ),
                    },
                ),
                Audio(
                    LanguageTrack {
                        language: Some(
                            "hi",
                        ),
                        language_name: None,
                    },
                ),
                Text(
                    LanguageTrack {
                        language: None,
                        language_name: None,
                    },
                ),
                Other {
                    kind: "Menu",
                },
            ]
        "#]]
        .assert_debug_eq(&tracks);
    }

    #[test]
    fn unrecognized_file_has_no_tracks() {
        let tracks = parse_json(br#"{"media": null}"#).unwrap();
        assert!(tracks.is_empty());
    }

    #[test]
    fn garbage_output_is_an_error() {
        let err = parse_json(b"<xml/>").unwrap_err();
        assert!(matches!(err, ParseError::UnexpectedJson { .. }), "{err:?}");
    }

    #[test_log::test(tokio::test)]
    async fn missing_executable_is_reported_as_such() {
        let parser = MediaInfoCli::new("definitely-not-an-installed-mediainfo-binary");
        let err = parser.parse(Path::new("/dev/null")).await.unwrap_err();
        assert!(matches!(err, ParseError::ToolMissing { .. }), "{err:?}");
    }
}

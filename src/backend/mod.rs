//! Media extraction backend seam
//!
//! The orchestrator only knows the [`Extractor`] trait: a blocking call that takes
//! an [`ExtractionJob`], reports [`ProgressEvent`]s through a callback while it
//! runs, and returns once the artifact is written (or fails).
//!
//! - [`ytdlp::YtDlpExtractor`] drives the `yt-dlp` program as a child process
//! - [`scripted::ScriptedExtractor`] replays a fixed script, for tests and local runs

pub mod scripted;
pub mod ytdlp;

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::config::BackendConfig;
use crate::tasks::TaskRequest;

pub use scripted::{ConcurrencyProbe, Latch, ScriptedExtractor};
pub use ytdlp::YtDlpExtractor;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Failed(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BackendError>;

/// Requested output kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaFormat {
    Video,
    Audio,
}

impl FromStr for MediaFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "video" => Ok(MediaFormat::Video),
            "audio" => Ok(MediaFormat::Audio),
            other => Err(format!("unsupported format type '{other}'")),
        }
    }
}

impl fmt::Display for MediaFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaFormat::Video => f.write_str("video"),
            MediaFormat::Audio => f.write_str("audio"),
        }
    }
}

/// Quality hint: `best`, `worst` or a maximum video height such as `720`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Quality {
    Best,
    Worst,
    MaxHeight(u32),
}

impl FromStr for Quality {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "best" => Ok(Quality::Best),
            "worst" => Ok(Quality::Worst),
            other => {
                let height = other.strip_suffix('p').unwrap_or(other);
                match height.parse::<u32>() {
                    Ok(h) if h > 0 => Ok(Quality::MaxHeight(h)),
                    _ => Err(format!("unsupported quality '{s}'")),
                }
            }
        }
    }
}

impl TryFrom<String> for Quality {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Quality> for String {
    fn from(value: Quality) -> Self {
        value.to_string()
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Quality::Best => f.write_str("best"),
            Quality::Worst => f.write_str("worst"),
            Quality::MaxHeight(h) => write!(f, "{h}"),
        }
    }
}

/// Stream selection expression for the backend
///
/// Video prefers mp4 video + m4a audio pairs and falls back to a single
/// muxed stream when that combination is unavailable.
pub fn format_selector(format: MediaFormat, quality: Quality) -> String {
    match (format, quality) {
        (MediaFormat::Audio, _) => "bestaudio/best".to_string(),
        (MediaFormat::Video, Quality::Best) => {
            "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best".to_string()
        }
        (MediaFormat::Video, Quality::Worst) => {
            "worstvideo[ext=mp4]+worstaudio[ext=m4a]/worst[ext=mp4]/worst".to_string()
        }
        (MediaFormat::Video, Quality::MaxHeight(h)) => {
            format!("bestvideo[height<={h}][ext=mp4]+bestaudio[ext=m4a]/best[height<={h}]")
        }
    }
}

/// Backend-side audio transcoding request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioExtraction {
    pub codec: String,
    /// Target bitrate in kbps
    pub bitrate_kbps: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub fragment_retries: u32,
    pub extractor_retries: u32,
    pub file_access_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            fragment_retries: 3,
            extractor_retries: 3,
            file_access_retries: 3,
        }
    }
}

/// Everything the backend needs to fetch one task's media
#[derive(Debug, Clone, bon::Builder)]
pub struct ExtractionJob {
    #[builder(into)]
    pub url: String,
    /// Task directory; the backend writes its artifact(s) here
    #[builder(into)]
    pub output_dir: PathBuf,
    #[builder(into)]
    pub format_selector: String,
    pub audio: Option<AudioExtraction>,
    #[builder(default)]
    pub retries: RetryPolicy,
    #[builder(default = Duration::from_secs(30))]
    pub socket_timeout: Duration,
    #[builder(default)]
    pub check_certificate: bool,
}

impl ExtractionJob {
    pub fn from_request(config: &BackendConfig, request: &TaskRequest, output_dir: PathBuf) -> Self {
        let audio = (request.format == MediaFormat::Audio).then(|| AudioExtraction {
            codec: config.audio_codec.clone(),
            bitrate_kbps: config.audio_quality,
        });

        ExtractionJob::builder()
            .url(request.url.as_str())
            .output_dir(output_dir)
            .format_selector(format_selector(request.format, request.quality))
            .maybe_audio(audio)
            .retries(RetryPolicy {
                retries: config.retries,
                fragment_retries: config.fragment_retries,
                extractor_retries: config.extractor_retries,
                file_access_retries: config.file_access_retries,
            })
            .socket_timeout(config.socket_timeout.as_duration())
            .check_certificate(config.check_certificate)
            .build()
    }

    /// Output path template: `<task dir>/%(title)s.%(ext)s`
    pub fn output_template(&self) -> String {
        self.output_dir
            .join("%(title)s.%(ext)s")
            .to_string_lossy()
            .into_owned()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    #[default]
    Downloading,
    Finished,
    Error,
}

fn lenient_u64<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.map(|v| v.max(0.0).round() as u64))
}

/// One progress report from the backend
///
/// Field names follow the backend's progress dictionary so its JSON output can
/// be deserialized directly; unknown fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ProgressEvent {
    pub status: EventStatus,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub downloaded_bytes: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub total_bytes: Option<u64>,
    #[serde(default)]
    pub total_bytes_estimate: Option<f64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub fragment_index: Option<u64>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub fragment_count: Option<u64>,
    #[serde(default)]
    pub speed: Option<f64>,
    #[serde(default)]
    pub eta: Option<f64>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl ProgressEvent {
    /// The backend's guess at the total size; it may change between events
    pub fn estimated_total(&self) -> Option<u64> {
        self.total_bytes_estimate
            .filter(|t| *t > 0.0)
            .map(|t| t.round() as u64)
    }

    pub fn fragments(&self) -> Option<(u64, u64)> {
        match (self.fragment_index, self.fragment_count) {
            (Some(index), Some(count)) if count > 0 => Some((index, count)),
            _ => None,
        }
    }
}

/// What a successful extraction reports besides the files it wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractOutcome {
    pub title: Option<String>,
}

/// A blocking media extraction engine
///
/// Implementations run on a blocking worker thread and may take minutes.
/// `on_progress` is invoked synchronously, in emission order.
pub trait Extractor: Send + Sync {
    fn extract(
        &self,
        job: &ExtractionJob,
        on_progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<ExtractOutcome>;
}

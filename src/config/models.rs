use crate::humanize::{ByteSize, HumanDuration};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Top-level configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub downloads: DownloadsConfig,
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub cleanup: CleanupConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    /// Largest accepted request body
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: ByteSize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 8000))
}

fn default_max_body_bytes() -> ByteSize {
    ByteSize(64 * 1024)
}

/// Task directories and execution limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DownloadsConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Execution gate capacity
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Blocking pool size; must exceed `max_concurrent`
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Delay between serving an artifact and deleting its task
    #[serde(default = "default_artifact_grace")]
    pub artifact_grace: HumanDuration,
}

impl Default for DownloadsConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            max_concurrent: default_max_concurrent(),
            worker_threads: default_worker_threads(),
            artifact_grace: default_artifact_grace(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_max_concurrent() -> usize {
    3
}

fn default_worker_threads() -> usize {
    8
}

fn default_artifact_grace() -> HumanDuration {
    HumanDuration::from_secs(5)
}

/// Extraction backend (`yt-dlp`) options
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BackendConfig {
    #[serde(default = "default_program")]
    pub program: PathBuf,
    #[serde(default = "default_retries")]
    pub retries: u32,
    #[serde(default = "default_retries")]
    pub fragment_retries: u32,
    #[serde(default = "default_retries")]
    pub extractor_retries: u32,
    #[serde(default = "default_retries")]
    pub file_access_retries: u32,
    #[serde(default = "default_socket_timeout")]
    pub socket_timeout: HumanDuration,
    #[serde(default)]
    pub check_certificate: bool,
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,
    /// Audio bitrate in kbps
    #[serde(default = "default_audio_quality")]
    pub audio_quality: u32,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            program: default_program(),
            retries: default_retries(),
            fragment_retries: default_retries(),
            extractor_retries: default_retries(),
            file_access_retries: default_retries(),
            socket_timeout: default_socket_timeout(),
            check_certificate: false,
            audio_codec: default_audio_codec(),
            audio_quality: default_audio_quality(),
        }
    }
}

fn default_program() -> PathBuf {
    PathBuf::from("yt-dlp")
}

fn default_retries() -> u32 {
    3
}

fn default_socket_timeout() -> HumanDuration {
    HumanDuration::from_secs(30)
}

fn default_audio_codec() -> String {
    "mp3".to_string()
}

fn default_audio_quality() -> u32 {
    192
}

/// TTL sweep of task directories
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CleanupConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Directories older than this are deleted
    #[serde(default = "default_ttl")]
    pub ttl: HumanDuration,
    #[serde(default = "default_interval")]
    pub interval: HumanDuration,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            ttl: default_ttl(),
            interval: default_interval(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_ttl() -> HumanDuration {
    HumanDuration::from_secs(60 * 60)
}

fn default_interval() -> HumanDuration {
    HumanDuration::from_secs(300)
}

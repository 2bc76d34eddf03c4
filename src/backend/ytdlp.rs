//! `yt-dlp` driven as a child process
//!
//! Progress is requested as one JSON object per line on stdout (tagged with
//! [`PROGRESS_PREFIX`]), the resolved title is printed once before the download
//! starts (tagged with [`TITLE_PREFIX`]). stderr is drained on a helper thread;
//! its last `ERROR:` line becomes the failure message.

use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, warn};

use super::{BackendError, ExtractOutcome, ExtractionJob, Extractor, ProgressEvent, Result};

pub const PROGRESS_PREFIX: &str = "[progress]";
pub const TITLE_PREFIX: &str = "[title]";

/// One classified line of backend stdout
#[derive(Debug, Clone, PartialEq)]
pub enum OutputLine {
    Progress(ProgressEvent),
    Title(String),
    Other,
}

pub fn parse_line(line: &str) -> OutputLine {
    let line = line.trim();

    if let Some(json) = line.strip_prefix(PROGRESS_PREFIX) {
        return match serde_json::from_str::<ProgressEvent>(json) {
            Ok(event) => OutputLine::Progress(event),
            Err(e) => {
                debug!(error = %e, "Unparseable progress line");
                OutputLine::Other
            }
        };
    }

    match line.strip_prefix(TITLE_PREFIX) {
        Some(title) if !title.trim().is_empty() => OutputLine::Title(title.trim().to_string()),
        _ => OutputLine::Other,
    }
}

#[derive(Debug, Clone)]
pub struct YtDlpExtractor {
    program: PathBuf,
}

impl YtDlpExtractor {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Command line for `job`, program name excluded
    pub fn args(job: &ExtractionJob) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--quiet".into(),
            "--no-warnings".into(),
            "--no-playlist".into(),
            "--newline".into(),
            "--progress".into(),
            "--progress-template".into(),
            format!("download:{PROGRESS_PREFIX}%(progress)j"),
            "--print".into(),
            format!("before_dl:{TITLE_PREFIX}%(title)s"),
            "--no-simulate".into(),
        ];

        let retries = job.retries;
        args.extend([
            "--retries".into(),
            retries.retries.to_string(),
            "--fragment-retries".into(),
            retries.fragment_retries.to_string(),
            "--extractor-retries".into(),
            retries.extractor_retries.to_string(),
            "--file-access-retries".into(),
            retries.file_access_retries.to_string(),
            "--socket-timeout".into(),
            job.socket_timeout.as_secs().max(1).to_string(),
        ]);

        if !job.check_certificate {
            args.push("--no-check-certificates".into());
        }

        args.extend([
            "-f".into(),
            job.format_selector.clone(),
            "-o".into(),
            job.output_template(),
        ]);

        if let Some(audio) = &job.audio {
            args.extend([
                "--extract-audio".into(),
                "--audio-format".into(),
                audio.codec.clone(),
                "--audio-quality".into(),
                format!("{}K", audio.bitrate_kbps),
                "--embed-metadata".into(),
                "--no-write-thumbnail".into(),
            ]);
        }

        // The URL is never read as an option.
        args.push("--".into());
        args.push(job.url.clone());
        args
    }

    fn drain_stderr(stderr: impl std::io::Read) -> Option<String> {
        let mut last_error = None;
        for line in BufReader::new(stderr).lines().map_while(std::io::Result::ok) {
            let line = line.trim();
            if let Some(message) = line.strip_prefix("ERROR:") {
                last_error = Some(message.trim().to_string());
            } else if !line.is_empty() {
                debug!(line, "yt-dlp stderr");
            }
        }
        last_error
    }
}

impl Extractor for YtDlpExtractor {
    fn extract(
        &self,
        job: &ExtractionJob,
        on_progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<ExtractOutcome> {
        let program = self.program.display().to_string();
        debug!(%program, url = %job.url, format = %job.format_selector, "Spawning extractor");

        let mut child = Command::new(&self.program)
            .args(Self::args(job))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| BackendError::Spawn {
                program: program.clone(),
                source,
            })?;

        let stderr = child.stderr.take();
        let stderr_reader =
            std::thread::spawn(move || stderr.and_then(YtDlpExtractor::drain_stderr));

        let mut title = None;
        if let Some(stdout) = child.stdout.take() {
            for line in BufReader::new(stdout).lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        let _ = child.kill();
                        let _ = child.wait();
                        return Err(e.into());
                    }
                };

                match parse_line(&line) {
                    OutputLine::Progress(event) => on_progress(event),
                    OutputLine::Title(t) => title = Some(t),
                    OutputLine::Other => {}
                }
            }
        }

        let status = child.wait()?;
        let last_error = stderr_reader.join().unwrap_or_default();

        if status.success() {
            return Ok(ExtractOutcome { title });
        }

        let message = last_error.unwrap_or_else(|| format!("{program} exited with {status}"));
        warn!(%program, url = %job.url, %status, error = %message, "Extraction failed");
        Err(BackendError::Failed(message))
    }
}

use thiserror::Error;
use url::Url;

use super::models::DownloadRequest;
use crate::backend::{MediaFormat, Quality};
use crate::tasks::TaskRequest;

const SHORT_HOSTS: &[&str] = &["youtu.be", "www.youtu.be"];
const WATCH_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
];
const ID_PATH_PREFIXES: &[&str] = &["/shorts/", "/embed/", "/live/"];

#[derive(Debug, Error)]
pub enum RequestValidationError {
    #[error("Invalid YouTube URL: please provide a valid YouTube video URL")]
    InvalidUrl,
    #[error("Format must be 'video' or 'audio'")]
    InvalidFormat,
    #[error("Quality must be 'best', 'worst' or a height such as '720'")]
    InvalidQuality,
}

/// Accepts only video URLs on known YouTube hosts
pub fn is_youtube_video_url(raw: &str) -> bool {
    let Ok(url) = Url::parse(raw.trim()) else {
        return false;
    };

    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }

    let Some(host) = url.host_str() else {
        return false;
    };

    if SHORT_HOSTS.contains(&host) {
        return !url.path().trim_matches('/').is_empty();
    }

    if !WATCH_HOSTS.contains(&host) {
        return false;
    }

    let path = url.path();
    if path == "/watch" {
        return url.query_pairs().any(|(k, v)| k == "v" && !v.is_empty());
    }

    ID_PATH_PREFIXES.iter().any(|prefix| {
        path.strip_prefix(prefix)
            .is_some_and(|id| !id.trim_matches('/').is_empty())
    })
}

/// Checks a download request and converts it into a task request
pub fn validate_download(request: &DownloadRequest) -> Result<TaskRequest, RequestValidationError> {
    if !is_youtube_video_url(&request.url) {
        return Err(RequestValidationError::InvalidUrl);
    }

    let format: MediaFormat = request
        .format_type
        .parse()
        .map_err(|_| RequestValidationError::InvalidFormat)?;
    let quality: Quality = request
        .quality
        .parse()
        .map_err(|_| RequestValidationError::InvalidQuality)?;

    Ok(TaskRequest {
        url: request.url.trim().to_string(),
        format,
        quality,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(url: &str, format_type: &str, quality: &str) -> DownloadRequest {
        DownloadRequest {
            url: url.to_string(),
            format_type: format_type.to_string(),
            quality: quality.to_string(),
        }
    }

    #[test]
    fn accepts_known_url_shapes() {
        for url in [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "http://youtube.com/watch?feature=share&v=abc",
            "https://m.youtube.com/watch?v=abc",
            "https://music.youtube.com/watch?v=abc&list=RD",
            "https://youtu.be/dQw4w9WgXcQ",
            "https://www.youtu.be/abc?t=10",
            "https://www.youtube.com/shorts/abc",
            "https://www.youtube.com/embed/abc",
            "https://www.youtube.com/live/abc",
        ] {
            assert!(is_youtube_video_url(url), "{url}");
        }
    }

    #[test]
    fn rejects_other_urls() {
        for url in [
            "",
            "not a url",
            "ftp://youtube.com/watch?v=abc",
            "https://vimeo.com/123",
            "https://evil.com/watch?v=abc",
            "https://youtube.com.evil.com/watch?v=abc",
            "https://www.youtube.com/watch",
            "https://www.youtube.com/watch?v=",
            "https://www.youtube.com/",
            "https://www.youtube.com/shorts/",
            "https://youtu.be/",
            "https://www.youtube.com/channel/abc",
        ] {
            assert!(!is_youtube_video_url(url), "{url}");
        }
    }

    #[test]
    fn validate_download_converts_fields() {
        let task = validate_download(&request("https://youtu.be/abc", "audio", "720")).unwrap();
        assert_eq!(task.format, MediaFormat::Audio);
        assert_eq!(task.quality, Quality::MaxHeight(720));
    }

    #[test]
    fn validate_download_rejects_bad_fields() {
        assert!(matches!(
            validate_download(&request("https://vimeo.com/1", "video", "best")),
            Err(RequestValidationError::InvalidUrl)
        ));
        assert!(matches!(
            validate_download(&request("https://youtu.be/abc", "gif", "best")),
            Err(RequestValidationError::InvalidFormat)
        ));
        assert!(matches!(
            validate_download(&request("https://youtu.be/abc", "video", "ultra")),
            Err(RequestValidationError::InvalidQuality)
        ));
    }
}

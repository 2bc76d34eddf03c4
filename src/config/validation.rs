use super::models::Config;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("downloads.max_concurrent must be at least 1")]
    ZeroConcurrency,

    #[error("downloads.worker_threads ({threads}) must be greater than downloads.max_concurrent ({concurrent})")]
    TooFewWorkerThreads { threads: usize, concurrent: usize },

    #[error("Duration must be positive: {field}")]
    ZeroDuration { field: &'static str },

    #[error("backend.program must not be empty")]
    EmptyProgram,

    #[error("backend.audio_codec must not be empty")]
    EmptyAudioCodec,

    #[error("server.max_body_bytes must be positive")]
    ZeroBodyLimit,
}

/// Validate the complete configuration
pub fn validate(config: &Config) -> Result<(), ValidationError> {
    validate_server(config)?;
    validate_downloads(config)?;
    validate_backend(config)?;
    validate_cleanup(config)?;
    Ok(())
}

fn validate_server(config: &Config) -> Result<(), ValidationError> {
    if config.server.max_body_bytes.as_u64() == 0 {
        return Err(ValidationError::ZeroBodyLimit);
    }
    Ok(())
}

fn validate_downloads(config: &Config) -> Result<(), ValidationError> {
    let downloads = &config.downloads;

    if downloads.max_concurrent == 0 {
        return Err(ValidationError::ZeroConcurrency);
    }

    // Filesystem work shares the blocking pool with running extractions, so a
    // full gate must still leave a thread free.
    if downloads.worker_threads <= downloads.max_concurrent {
        return Err(ValidationError::TooFewWorkerThreads {
            threads: downloads.worker_threads,
            concurrent: downloads.max_concurrent,
        });
    }

    if downloads.artifact_grace.as_duration().is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "downloads.artifact_grace",
        });
    }

    Ok(())
}

fn validate_backend(config: &Config) -> Result<(), ValidationError> {
    let backend = &config.backend;

    if backend.program.as_os_str().is_empty() {
        return Err(ValidationError::EmptyProgram);
    }
    if backend.audio_codec.trim().is_empty() {
        return Err(ValidationError::EmptyAudioCodec);
    }
    if backend.socket_timeout.as_duration().is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "backend.socket_timeout",
        });
    }

    Ok(())
}

fn validate_cleanup(config: &Config) -> Result<(), ValidationError> {
    if config.cleanup.ttl.as_duration().is_zero() {
        return Err(ValidationError::ZeroDuration { field: "cleanup.ttl" });
    }
    if config.cleanup.interval.as_duration().is_zero() {
        return Err(ValidationError::ZeroDuration {
            field: "cleanup.interval",
        });
    }
    Ok(())
}

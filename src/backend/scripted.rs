//! Extractor that replays a fixed script instead of touching the network

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use tracing::debug;

use super::{BackendError, EventStatus, ExtractOutcome, ExtractionJob, Extractor, ProgressEvent, Result};

pub fn downloading(downloaded: u64, total: Option<u64>) -> ProgressEvent {
    ProgressEvent {
        status: EventStatus::Downloading,
        downloaded_bytes: Some(downloaded),
        total_bytes: total,
        ..Default::default()
    }
}

pub fn finished(filename: impl Into<String>) -> ProgressEvent {
    ProgressEvent {
        status: EventStatus::Finished,
        filename: Some(filename.into()),
        ..Default::default()
    }
}

/// Tracks how many scripted extractions run at once
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyProbe {
    inner: Arc<ProbeCounters>,
}

#[derive(Debug, Default)]
struct ProbeCounters {
    current: AtomicUsize,
    peak: AtomicUsize,
    started: AtomicUsize,
}

pub struct ProbeGuard {
    inner: Arc<ProbeCounters>,
}

impl ConcurrencyProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> ProbeGuard {
        let now = self.inner.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.peak.fetch_max(now, Ordering::SeqCst);
        self.inner.started.fetch_add(1, Ordering::SeqCst);
        ProbeGuard {
            inner: self.inner.clone(),
        }
    }

    pub fn current(&self) -> usize {
        self.inner.current.load(Ordering::SeqCst)
    }

    pub fn peak(&self) -> usize {
        self.inner.peak.load(Ordering::SeqCst)
    }

    pub fn started(&self) -> usize {
        self.inner.started.load(Ordering::SeqCst)
    }
}

impl Drop for ProbeGuard {
    fn drop(&mut self) {
        self.inner.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// One-shot gate a scripted extraction blocks on until released
#[derive(Debug, Clone, Default)]
pub struct Latch {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Latch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn release(&self) {
        let (open, cvar) = &*self.inner;
        *open.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cvar.notify_all();
    }

    pub fn wait(&self) {
        let (open, cvar) = &*self.inner;
        let mut guard = open.lock().unwrap_or_else(PoisonError::into_inner);
        while !*guard {
            guard = cvar.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// Replays `events`, then fails, panics or writes `artifact` into the job's
/// output directory.
#[derive(Debug, Clone, Default)]
pub struct ScriptedExtractor {
    events: Vec<ProgressEvent>,
    artifact: Option<(String, Vec<u8>)>,
    failure: Option<String>,
    panics: bool,
    step_delay: Duration,
    title: Option<String>,
    probe: Option<ConcurrencyProbe>,
    hold: Option<Latch>,
}

impl ScriptedExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Successful download of `bytes` as `name`, with a full progress run
    pub fn completing(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        let name = name.into();
        let bytes = bytes.into();
        let total = bytes.len() as u64;
        Self::new()
            .event(downloading(0, Some(total)))
            .event(downloading(total, Some(total)))
            .event(finished(name.clone()))
            .artifact(name, bytes)
    }

    pub fn event(mut self, event: ProgressEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn artifact(mut self, name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        self.artifact = Some((name.into(), bytes.into()));
        self
    }

    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panics = true;
        self
    }

    pub fn step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn probe(mut self, probe: ConcurrencyProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Block after the scripted events until `latch` is released
    pub fn hold(mut self, latch: Latch) -> Self {
        self.hold = Some(latch);
        self
    }
}

impl Extractor for ScriptedExtractor {
    fn extract(
        &self,
        job: &ExtractionJob,
        on_progress: &mut dyn FnMut(ProgressEvent),
    ) -> Result<ExtractOutcome> {
        let _active = self.probe.as_ref().map(ConcurrencyProbe::enter);
        debug!(url = %job.url, events = self.events.len(), "Scripted extraction");

        if self.panics {
            panic!("scripted extractor panic");
        }

        for event in &self.events {
            if !self.step_delay.is_zero() {
                std::thread::sleep(self.step_delay);
            }
            on_progress(event.clone());
        }

        if let Some(latch) = &self.hold {
            latch.wait();
        }

        if let Some(message) = &self.failure {
            return Err(BackendError::Failed(message.clone()));
        }

        if let Some((name, bytes)) = &self.artifact {
            std::fs::write(job.output_dir.join(name), bytes)?;
        }

        Ok(ExtractOutcome {
            title: self.title.clone(),
        })
    }
}

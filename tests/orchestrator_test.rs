use std::sync::Arc;
use std::time::{Duration, SystemTime};

use tempfile::TempDir;

use mediafetch::backend::{ConcurrencyProbe, Latch, MediaFormat, Quality, ScriptedExtractor};
use mediafetch::cleanup::run_sweep;
use mediafetch::config::Config;
use mediafetch::orchestrator::{DownloadManager, PANIC_MESSAGE};
use mediafetch::tasks::{ProgressRecord, TaskId, TaskRequest, TaskStatus};

fn build_manager(tmp: &TempDir, max_concurrent: usize, extractor: ScriptedExtractor) -> DownloadManager {
    let mut config = Config::default();
    config.downloads.root = tmp.path().join("downloads");
    config.downloads.max_concurrent = max_concurrent;
    DownloadManager::new(&config, Arc::new(extractor))
}

fn request(format: MediaFormat) -> TaskRequest {
    TaskRequest {
        url: "https://www.youtube.com/watch?v=dQw4w9WgXcQ".to_string(),
        format,
        quality: Quality::Best,
    }
}

async fn wait_until(manager: &DownloadManager, task_id: &TaskId, done: impl Fn(&ProgressRecord) -> bool) {
    for _ in 0..300 {
        if let Some(record) = manager.get_progress(task_id) {
            if done(&record) {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("task {task_id} did not reach the expected state");
}

/// The final status lands just before the permit is dropped.
async fn wait_idle(manager: &DownloadManager) {
    for _ in 0..300 {
        if manager.gate().in_flight() == 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("permits were never released");
}

fn age_dir(path: &std::path::Path, age: Duration) {
    std::fs::File::open(path)
        .unwrap()
        .set_modified(SystemTime::now() - age)
        .unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrency_cap_is_respected() {
    let tmp = TempDir::new().unwrap();
    let probe = ConcurrencyProbe::new();
    let extractor = ScriptedExtractor::completing("clip.mp4", b"bytes".to_vec())
        .step_delay(Duration::from_millis(15))
        .probe(probe.clone());
    let manager = build_manager(&tmp, 2, extractor);

    let mut ids = Vec::new();
    for _ in 0..8 {
        let record = manager.start_download(request(MediaFormat::Video)).await.unwrap();
        assert_eq!(record.status, TaskStatus::Starting);
        ids.push(record.task_id);
    }

    for id in &ids {
        wait_until(&manager, id, |r| r.status == TaskStatus::Completed).await;
    }
    wait_idle(&manager).await;

    assert_eq!(probe.started(), 8);
    assert!(probe.peak() <= 2, "peak concurrency was {}", probe.peak());
    assert_eq!(probe.current(), 0);
    assert_eq!(manager.gate().in_flight(), 0);
    assert_eq!(manager.gate().available(), 2);
    assert_eq!(manager.metrics().snapshot().tasks_completed, 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_permit_released_after_panic() {
    let tmp = TempDir::new().unwrap();
    let manager = build_manager(&tmp, 1, ScriptedExtractor::new().panicking());

    // With a single permit, a leaked one would hang the second download.
    for _ in 0..3 {
        let record = manager.download(request(MediaFormat::Audio)).await.unwrap();
        assert_eq!(record.status, TaskStatus::Error);
        assert_eq!(record.error.as_deref(), Some(PANIC_MESSAGE));
    }

    assert_eq!(manager.gate().available(), 1);
    assert_eq!(manager.metrics().snapshot().tasks_failed, 3);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_permit_released_after_failure() {
    let tmp = TempDir::new().unwrap();
    let manager = build_manager(&tmp, 1, ScriptedExtractor::new().failing("HTTP Error 403: Forbidden"));

    let first = manager.start_download(request(MediaFormat::Video)).await.unwrap();
    let second = manager.start_download(request(MediaFormat::Video)).await.unwrap();

    for id in [first.task_id, second.task_id] {
        wait_until(&manager, &id, |r| r.status == TaskStatus::Error).await;
        let record = manager.get_progress(&id).unwrap();
        assert_eq!(record.error.as_deref(), Some("HTTP Error 403: Forbidden"));
        assert!(record.file_path.is_none());
    }
    wait_idle(&manager).await;
}

#[tokio::test]
async fn test_completed_download_reports_full_progress() {
    let tmp = TempDir::new().unwrap();
    let extractor = ScriptedExtractor::completing("Song.mp3", vec![7u8; 1000]).title("Song");
    let manager = build_manager(&tmp, 3, extractor);

    let record = manager.download(request(MediaFormat::Audio)).await.unwrap();

    assert_eq!(record.status, TaskStatus::Completed);
    assert_eq!(record.total_bytes, 1000);
    assert_eq!(record.downloaded_bytes, 1000);
    assert_eq!(record.percent, 100.0);
    assert_eq!(record.progress, 100.0);
    assert_eq!(record.filename, "Song.mp3");
    assert_eq!(record.title.as_deref(), Some("Song"));
    assert!(record.error.is_none());

    let path = record.file_path.unwrap();
    assert!(path.starts_with(manager.dirs().path(&record.task_id)));
    assert_eq!(std::fs::read(&path).unwrap().len(), 1000);
}

#[tokio::test]
async fn test_failed_download_has_no_artifact() {
    let tmp = TempDir::new().unwrap();
    let manager = build_manager(&tmp, 3, ScriptedExtractor::new().failing("Video unavailable"));

    let record = manager.download(request(MediaFormat::Video)).await.unwrap();

    assert_eq!(record.status, TaskStatus::Error);
    assert_eq!(record.error.as_deref(), Some("Video unavailable"));
    assert!(record.file_path.is_none());
    assert!(manager.artifact_path(&record.task_id).is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_delete_while_downloading() {
    let tmp = TempDir::new().unwrap();
    let latch = Latch::new();
    let probe = ConcurrencyProbe::new();
    let extractor = ScriptedExtractor::completing("clip.mp4", b"x".to_vec())
        .hold(latch.clone())
        .probe(probe.clone());
    let manager = build_manager(&tmp, 1, extractor);

    let record = manager.start_download(request(MediaFormat::Video)).await.unwrap();
    let task_id = record.task_id;
    let dir = manager.dirs().path(&task_id);
    wait_until(&manager, &task_id, |r| r.status == TaskStatus::Processing).await;

    assert!(manager.cleanup_task(&task_id).await.unwrap());
    assert!(manager.get_progress(&task_id).is_none());
    assert!(!dir.exists());
    assert_eq!(probe.current(), 1);

    latch.release();
    wait_idle(&manager).await;

    // The worker's final update lands on nothing.
    assert_eq!(probe.current(), 0);
    assert!(manager.get_progress(&task_id).is_none());
    assert!(manager.store().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_abandoned_wait_keeps_permit_and_final_status() {
    let tmp = TempDir::new().unwrap();
    let latch = Latch::new();
    let probe = ConcurrencyProbe::new();
    let extractor = ScriptedExtractor::completing("clip.mp4", b"x".to_vec())
        .hold(latch.clone())
        .probe(probe.clone());
    let manager = build_manager(&tmp, 1, extractor);

    // The waiting caller gives up while the extraction is blocked.
    let waited = tokio::time::timeout(
        Duration::from_millis(200),
        manager.download(request(MediaFormat::Video)),
    )
    .await;
    assert!(waited.is_err());

    assert_eq!(probe.current(), 1);
    assert_eq!(manager.gate().in_flight(), 1);
    assert_eq!(manager.gate().available(), 0);

    let first: TaskId = manager.dirs().list_dirs().unwrap()[0]
        .file_name()
        .unwrap()
        .to_str()
        .unwrap()
        .parse()
        .unwrap();

    let second = manager.start_download(request(MediaFormat::Video)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(probe.peak(), 1);
    assert_eq!(
        manager.get_progress(&second.task_id).unwrap().status,
        TaskStatus::Starting
    );

    latch.release();
    for id in [first, second.task_id] {
        wait_until(&manager, &id, |r| r.status == TaskStatus::Completed).await;
        assert!(manager.get_progress(&id).unwrap().file_path.is_some());
    }
    wait_idle(&manager).await;
    assert_eq!(probe.peak(), 1);
    assert_eq!(probe.started(), 2);
}

#[tokio::test]
async fn test_sweep_removes_only_expired_tasks() {
    let tmp = TempDir::new().unwrap();
    let manager = build_manager(&tmp, 3, ScriptedExtractor::completing("a.mp4", b"x".to_vec()));

    let old = manager.download(request(MediaFormat::Video)).await.unwrap();
    let fresh = manager.download(request(MediaFormat::Video)).await.unwrap();
    age_dir(&manager.dirs().path(&old.task_id), Duration::from_secs(2 * 3600));
    age_dir(&manager.dirs().path(&fresh.task_id), Duration::from_secs(10 * 60));

    let removed = run_sweep(&manager, Duration::from_secs(3600)).await;

    assert_eq!(removed, 1);
    assert!(!manager.dirs().path(&old.task_id).exists());
    assert!(manager.get_progress(&old.task_id).is_none());
    assert!(manager.dirs().path(&fresh.task_id).is_dir());
    assert!(manager.get_progress(&fresh.task_id).is_some());
    assert_eq!(manager.metrics().snapshot().directories_swept, 1);
}

use std::sync::Arc;

use crate::cleanup::CleanupScheduler;
use crate::config::Config;
use crate::observability::Metrics;
use crate::orchestrator::DownloadManager;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub manager: DownloadManager,
    pub cleanup: Arc<CleanupScheduler>,
}

impl AppState {
    pub fn new(config: Config, manager: DownloadManager) -> Self {
        let cleanup = CleanupScheduler::from_config(manager.clone(), &config.cleanup);
        Self {
            config: Arc::new(config),
            manager,
            cleanup: Arc::new(cleanup),
        }
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        self.manager.metrics()
    }
}

use crate::config::Config;
use modvault_core::logbus::LogBus;
use modvault_core::orchestrator::Orchestrator;
use modvault_core::registry::ArtifactRegistry;
use modvault_core::scraper::ItemMetadataProvider;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub orchestrator: Orchestrator,
    pub metadata: Arc<dyn ItemMetadataProvider>,
    pub bus: Arc<LogBus>,
    /// Fired once at shutdown; long-lived connections watch it.
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn registry(&self) -> &Arc<ArtifactRegistry> {
        self.orchestrator.registry()
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}

//! Download orchestration for Steam Workshop items.
//!
//! The pipeline is: admit a job, drive `steamcmd` to fetch the item
//! into a per-job workspace, verify the produced content, stream it
//! into a zip archive, and register the archive for delivery. The
//! [`orchestrator::Orchestrator`] sequences those steps per job under a
//! global concurrency cap; the remaining modules are its collaborators.

pub mod archive;
pub mod logbus;
pub mod orchestrator;
pub mod registry;
pub mod scraper;
pub mod steam;
pub mod sweeper;
pub mod url;
pub mod workspace;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use archive::BuilderConfig;
pub use logbus::{LogBus, LogBusConfig};
pub use orchestrator::{CapacityError, Orchestrator, OrchestratorConfig};
pub use registry::ArtifactRegistry;
pub use scraper::{ItemMetadataProvider, ScrapeError, WorkshopPageScraper};
pub use steam::adapter::{AdapterConfig, Credentials, SteamCmdAdapter, WorkshopFetcher};
pub use sweeper::SweeperConfig;
pub use workspace::WorkspaceManager;

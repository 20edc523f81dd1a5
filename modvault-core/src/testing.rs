//! Scripted fakes for exercising the pipeline without steamcmd.
//!
//! Enabled with the `test-util` feature; integration suites in this
//! workspace script one outcome per fetch attempt and observe how the
//! orchestrator reacts.

use crate::steam::adapter::{SessionFailure, WorkshopFetcher};
use crate::steam::events::{FetchEvent, FetchOutcome};
use crate::workspace::canonical_content_dir;
use async_trait::async_trait;
use modvault_model::{AppId, WorkshopItemId};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::Path;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// What one scripted fetch attempt should do.
#[derive(Debug, Clone)]
pub enum ScriptedStep {
    /// Write the given files into the canonical content layout and
    /// report `ContentWritten`.
    Content(Vec<(String, Vec<u8>)>),
    /// Report this outcome without touching the filesystem.
    Fail(FetchOutcome),
    /// Block until cancelled, like a wedged external process.
    Hang,
}

/// A [`WorkshopFetcher`] that replays a script, one step per attempt.
/// Runs out of script → reports a transient failure.
pub struct ScriptedFetcher {
    steps: Mutex<VecDeque<ScriptedStep>>,
    session: Mutex<Result<(), SessionFailure>>,
    /// Progress ticks emitted before each outcome.
    pub ticks_per_fetch: usize,
}

impl std::fmt::Debug for ScriptedFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedFetcher").finish_non_exhaustive()
    }
}

impl ScriptedFetcher {
    pub fn new(steps: impl IntoIterator<Item = ScriptedStep>) -> Self {
        Self {
            steps: Mutex::new(steps.into_iter().collect()),
            session: Mutex::new(Ok(())),
            ticks_per_fetch: 3,
        }
    }

    /// A fetcher that always succeeds with plausible mod content.
    pub fn always_succeeding() -> Self {
        Self::new(Vec::new())
    }

    /// Makes `prepare_session` fail, e.g. with `SecondFactorRequired`.
    pub fn with_session_failure(self, failure: SessionFailure) -> Self {
        *self.session.lock() = Err(failure);
        self
    }

    /// Deterministic incompressible payload so produced archives clear
    /// the minimum-size floor.
    pub fn noise(len: usize) -> Vec<u8> {
        let mut state: u32 = 0x9E3779B9;
        (0..len)
            .map(|_| {
                state = state.wrapping_mul(1664525).wrapping_add(1013904223);
                (state >> 24) as u8
            })
            .collect()
    }

    /// Default content for a successful step.
    pub fn default_content() -> Vec<(String, Vec<u8>)> {
        vec![
            ("mod.cpp".to_string(), Self::noise(2048)),
            ("addons/core.pbo".to_string(), Self::noise(8192)),
        ]
    }

    fn next_step(&self) -> ScriptedStep {
        self.steps
            .lock()
            .pop_front()
            .unwrap_or_else(|| ScriptedStep::Content(Self::default_content()))
    }
}

#[async_trait]
impl WorkshopFetcher for ScriptedFetcher {
    async fn prepare_session(&self) -> Result<(), SessionFailure> {
        self.session.lock().clone()
    }

    async fn fetch(
        &self,
        workspace: &Path,
        app_id: AppId,
        item_id: WorkshopItemId,
        events: mpsc::Sender<FetchEvent>,
        cancel: CancellationToken,
    ) -> FetchOutcome {
        let _ = events
            .send(FetchEvent::OutputLine("Loading Steam API...OK".into()))
            .await;
        for _ in 0..self.ticks_per_fetch {
            let _ = events.send(FetchEvent::ProgressTick).await;
        }

        match self.next_step() {
            ScriptedStep::Content(files) => {
                let content = canonical_content_dir(workspace, app_id, item_id);
                for (name, bytes) in files {
                    let path = content.join(name);
                    if let Some(parent) = path.parent() {
                        let _ = tokio::fs::create_dir_all(parent).await;
                    }
                    let _ = tokio::fs::write(path, bytes).await;
                }
                FetchOutcome::ContentWritten(content)
            }
            ScriptedStep::Fail(outcome) => outcome,
            ScriptedStep::Hang => {
                cancel.cancelled().await;
                FetchOutcome::TransientFailure("cancelled".into())
            }
        }
    }
}

//! Background worker lifecycle.
//!
//! A worker version installs its shell assets, then waits until no older
//! version controls clients (or a skip-waiting request arrives) before it
//! activates and deletes the buckets of older versions.

use super::manager::AssetCacheManager;
use serde::Deserialize;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::watch;
use wittr_core::Error;

/// Lifecycle state of a worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Parsed,
    Installing,
    /// Installed and waiting to take over.
    Installed,
    Activating,
    Activated,
    /// Install failed; this version never activates.
    Redundant,
}

/// Message sent from a page to the worker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ControlMessage {
    pub action: ControlAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum ControlAction {
    #[serde(rename = "skip-waiting", alias = "skipWaiting")]
    SkipWaiting,
}

impl ControlMessage {
    pub fn parse(raw: &str) -> Result<Self, Error> {
        serde_json::from_str(raw).map_err(|e| Error::InvalidMessage(e.to_string()))
    }
}

/// One worker version driving an [`AssetCacheManager`].
pub struct Worker {
    manager: AssetCacheManager,
    state: watch::Sender<WorkerState>,
    skip_requested: AtomicBool,
}

impl Worker {
    pub fn new(manager: AssetCacheManager) -> Self {
        let (state, _) = watch::channel(WorkerState::Parsed);
        Self { manager, state, skip_requested: AtomicBool::new(false) }
    }

    pub fn manager(&self) -> &AssetCacheManager {
        &self.manager
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<WorkerState> {
        self.state.subscribe()
    }

    /// Install, then activate unless an older version still controls
    /// clients and nobody asked to skip waiting.
    ///
    /// Returns the state the worker settled in.
    pub async fn start(&self, has_controller: bool) -> Result<WorkerState, Error> {
        self.install().await?;
        if !has_controller || self.skip_requested.load(Ordering::SeqCst) {
            self.activate_waiting().await?;
        } else {
            tracing::info!("installed, waiting for older version to release clients");
        }
        Ok(self.state())
    }

    /// Run the install step. A failure leaves the worker redundant.
    pub async fn install(&self) -> Result<usize, Error> {
        self.transition(WorkerState::Parsed, WorkerState::Installing)?;
        match self.manager.install().await {
            Ok(count) => {
                self.state.send_replace(WorkerState::Installed);
                Ok(count)
            }
            Err(e) => {
                tracing::warn!(error = %e, "install failed, worker is redundant");
                self.state.send_replace(WorkerState::Redundant);
                Err(e)
            }
        }
    }

    /// Run the activate step. Only an installed worker may activate; if
    /// bucket cleanup fails the worker goes back to waiting.
    pub async fn activate(&self) -> Result<Vec<String>, Error> {
        self.transition(WorkerState::Installed, WorkerState::Activating)?;
        match self.manager.activate().await {
            Ok(deleted) => {
                self.state.send_replace(WorkerState::Activated);
                tracing::info!(bucket = %self.manager.names().static_name, "worker activated");
                Ok(deleted)
            }
            Err(e) => {
                self.state.send_replace(WorkerState::Installed);
                Err(e)
            }
        }
    }

    /// Handle a raw control message from a page.
    pub async fn handle_message(&self, raw: &str) -> Result<WorkerState, Error> {
        match ControlMessage::parse(raw)?.action {
            ControlAction::SkipWaiting => self.skip_waiting().await,
        }
    }

    /// Activate now if waiting; otherwise remember the request for when
    /// install finishes.
    pub async fn skip_waiting(&self) -> Result<WorkerState, Error> {
        self.skip_requested.store(true, Ordering::SeqCst);
        if self.state() == WorkerState::Installed {
            self.activate_waiting().await?;
        }
        Ok(self.state())
    }

    /// Activate a waiting worker. Losing the race to another activation
    /// is not an error.
    async fn activate_waiting(&self) -> Result<(), Error> {
        match self.activate().await {
            Ok(_) => Ok(()),
            Err(Error::WorkerState(_)) if matches!(self.state(), WorkerState::Activating | WorkerState::Activated) => {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn transition(&self, from: WorkerState, to: WorkerState) -> Result<(), Error> {
        let mut actual = from;
        let moved = self.state.send_if_modified(|state| {
            if *state == from {
                *state = to;
                true
            } else {
                actual = *state;
                false
            }
        });
        if moved {
            tracing::debug!(?from, ?to, "worker state change");
            Ok(())
        } else {
            Err(Error::WorkerState(format!("cannot move to {to:?} from {actual:?}")))
        }
    }
}

//! Install / activate / retire transitions and the cache management
//! command channel.

use crate::errors::CacheError;
use crate::fetcher::FetchRequest;
use crate::models::{Category, RequestKey, WorkerState};
use crate::services::CacheService;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[cfg(test)]
mod tests;

const COMMAND_QUEUE_DEPTH: usize = 16;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstallReport {
    pub cached: Vec<String>,
    pub failed: Vec<String>,
}

impl InstallReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Turns a partial install into `CacheError::InstallPartialFailure`.
    pub fn into_result(self) -> Result<Self, CacheError> {
        if self.is_complete() {
            Ok(self)
        } else {
            Err(CacheError::InstallPartialFailure(self.failed.len()))
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ActivationReport {
    pub deleted: Vec<String>,
}

/// Lifecycle of one cache generation. Clones share state.
#[derive(Clone)]
pub struct Lifecycle {
    service: CacheService,
    state: Arc<RwLock<WorkerState>>,
    clients_claimed: Arc<AtomicBool>,
}

impl Lifecycle {
    pub fn new(service: CacheService) -> Self {
        Self {
            service,
            state: Arc::new(RwLock::new(WorkerState::Installing)),
            clients_claimed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub async fn state(&self) -> WorkerState {
        *self.state.read().await
    }

    /// Whether intercepted requests should go through the cache layer.
    pub async fn is_controlling(&self) -> bool {
        self.state().await == WorkerState::Active && self.clients_claimed.load(Ordering::SeqCst)
    }

    /// Pre-warms the static area and moves straight to `Waiting` without
    /// deferring to older sessions. Individual asset failures are reported,
    /// not fatal.
    pub async fn install(&self) -> Result<InstallReport, CacheError> {
        let current = self.state().await;
        if current != WorkerState::Installing {
            return Err(CacheError::InvalidState(format!("cannot install while {}", current)));
        }

        info!("Installing cache generation {}", self.service.config().cache_version);
        let report = self.precache().await;
        if !report.is_complete() {
            warn!(
                "Failed to cache {} static asset(s), continuing: {:?}",
                report.failed.len(),
                report.failed
            );
        }

        *self.state.write().await = WorkerState::Waiting;
        info!("Installed; skipping wait for activation");
        Ok(report)
    }

    /// Fetches every manifest entry into the static area concurrently.
    async fn precache(&self) -> InstallReport {
        let area = self.service.config().area_for(Category::StaticAsset);
        self.service.storage().open(&area).await;

        let fetches = self.service.config().precache_manifest.iter().map(|url| {
            let url = url.clone();
            async move {
                let Some(key) = RequestKey::from_url(url.clone()) else {
                    return Err(url.to_string());
                };
                let request = FetchRequest::get(url);
                match self
                    .service
                    .fetch_and_store(request, &key, Category::StaticAsset)
                    .await
                {
                    Ok(parts) if parts.is_success() => Ok(key.to_string()),
                    Ok(parts) => {
                        warn!("Precache of {} answered {}", key, parts.status);
                        Err(key.to_string())
                    }
                    Err(e) => {
                        warn!("Precache of {} failed: {}", key, e);
                        Err(key.to_string())
                    }
                }
            }
        });

        let mut report = InstallReport::default();
        for outcome in join_all(fetches).await {
            match outcome {
                Ok(url) => report.cached.push(url),
                Err(url) => report.failed.push(url),
            }
        }
        report
    }

    /// Deletes every area that is not a current generation, then takes
    /// control of all clients.
    pub async fn activate(&self) -> Result<ActivationReport, CacheError> {
        let current = self.state().await;
        if current == WorkerState::Redundant || current == WorkerState::Installing {
            return Err(CacheError::InvalidState(format!("cannot activate while {}", current)));
        }

        let expected = self.service.config().expected_area_names();
        let storage = self.service.storage();
        let stale: Vec<String> = storage
            .keys()
            .await
            .into_iter()
            .filter(|name| !expected.contains(name))
            .collect();

        let deletions = stale.iter().map(|name| async move {
            info!("Deleting old cache: {}", name);
            storage.delete(name).await
        });
        join_all(deletions).await;

        *self.state.write().await = WorkerState::Active;
        self.clients_claimed.store(true, Ordering::SeqCst);
        info!("Activated; controlling all clients");

        Ok(ActivationReport { deleted: stale })
    }

    /// This generation has been replaced or shut down.
    pub async fn retire(&self) {
        *self.state.write().await = WorkerState::Redundant;
        self.clients_claimed.store(false, Ordering::SeqCst);
        info!("Cache generation {} is redundant", self.service.config().cache_version);
    }

    /// Deletes every area, current generations included.
    pub async fn clear_all(&self) -> usize {
        let storage = self.service.storage();
        let names = storage.keys().await;
        let deleted = join_all(names.iter().map(|name| storage.delete(name))).await;
        let count = deleted.into_iter().filter(|removed| *removed).count();
        info!("All caches cleared ({} area(s))", count);
        count
    }

    /// Re-runs the static precache.
    pub async fn update_cache(&self) -> InstallReport {
        let report = self.precache().await;
        info!(
            "Cache updated: {} cached, {} failed",
            report.cached.len(),
            report.failed.len()
        );
        report
    }

    pub async fn handle_command(&self, command: Command) -> Ack {
        match command {
            Command::ClearCache => {
                self.clear_all().await;
                Ack { success: true }
            }
            Command::UpdateCache => match self.update_cache().await.into_result() {
                Ok(_) => Ack { success: true },
                Err(e) => {
                    warn!("Cache update incomplete: {}", e);
                    Ack { success: false }
                }
            },
        }
    }
}

/// Host-issued cache management commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Command {
    ClearCache,
    UpdateCache,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
}

pub struct CommandEnvelope {
    pub command: Command,
    pub reply: oneshot::Sender<Ack>,
}

#[derive(Clone)]
pub struct CommandSender {
    tx: mpsc::Sender<CommandEnvelope>,
}

impl CommandSender {
    /// Sends a command and waits for its acknowledgement. A closed channel
    /// is reported as a failure.
    pub async fn send(&self, command: Command) -> Ack {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(CommandEnvelope { command, reply }).await.is_err() {
            warn!("Command channel closed, dropping {:?}", command);
            return Ack { success: false };
        }
        rx.await.unwrap_or(Ack { success: false })
    }
}

/// Runs commands one at a time until every sender is dropped.
pub fn spawn_command_loop(lifecycle: Lifecycle) -> (CommandSender, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<CommandEnvelope>(COMMAND_QUEUE_DEPTH);
    let handle = tokio::spawn(async move {
        while let Some(envelope) = rx.recv().await {
            let ack = lifecycle.handle_command(envelope.command).await;
            if envelope.reply.send(ack).is_err() {
                warn!("Requester went away before {:?} was acknowledged", envelope.command);
            }
        }
    });
    (CommandSender { tx }, handle)
}

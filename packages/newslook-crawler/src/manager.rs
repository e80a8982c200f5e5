//! Crawler Manager: owns one [`Worker`] per known
//! source, dispatches `start`/`stop`/`status`/`subscribe`, and holds
//! the shared resources every Worker runs against: tasks share the HTTP
//! client, rate limiter, Storage writer lock, and Monitor.
//!
//! A long-lived owner spawns one cancellable task per unit of work and
//! tracks it in a map guarded by `tokio::sync::RwLock`.

use std::collections::HashMap;
use std::sync::{Arc, RwLock as StdRwLock};

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use newslook_extraction::extractor::Extractor;
use newslook_extraction::pipeline::Pipeline;
use newslook_extraction::types::config::WorkerParams;

use crate::monitor::Monitor;
use crate::status::{CrawlEvent, SourceStatus};
use crate::worker::{GlobalRateLimiter, Worker, WorkerConfig};

const EVENT_CHANNEL_CAPACITY: usize = 1024;

#[derive(Debug, Error)]
pub enum ManagerError {
    #[error("source '{0}' is already running")]
    AlreadyRunning(String),
    #[error("unknown source '{0}'")]
    UnknownSource(String),
    #[error("source '{0}' is not running")]
    NotRunning(String),
    #[error("source '{name}' is cooling down until {until}")]
    Cooldown { name: String, until: DateTime<Utc> },
}

struct SourceHandle {
    worker: Arc<Worker>,
    status: Arc<StdRwLock<SourceStatus>>,
    cancel: Option<CancellationToken>,
    task: Option<JoinHandle<()>>,
}

/// Registration record for one source, supplied at `Manager::new` time.
pub struct SourceRegistration {
    pub name: String,
    pub extractor: Arc<dyn Extractor>,
    pub config: WorkerConfig,
}

/// Owns every source's Worker and the resources they share.
/// `start`/`stop` return immediately; the cycle itself runs as a
/// spawned task tracked in `sources`.
pub struct Manager {
    sources: RwLock<HashMap<String, SourceHandle>>,
    events: broadcast::Sender<CrawlEvent>,
}

impl Manager {
    pub fn new(
        registrations: Vec<SourceRegistration>,
        pipeline: Arc<Pipeline>,
        monitor: Arc<Monitor>,
        rate_limiter: Arc<GlobalRateLimiter>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let mut sources = HashMap::with_capacity(registrations.len());
        for reg in registrations {
            let worker = Arc::new(Worker::new(
                reg.name.clone(),
                reg.extractor,
                pipeline.clone(),
                monitor.clone(),
                rate_limiter.clone(),
                reg.config,
            ));
            sources.insert(
                reg.name.clone(),
                SourceHandle {
                    worker,
                    status: Arc::new(StdRwLock::new(SourceStatus::idle(reg.name))),
                    cancel: None,
                    task: None,
                },
            );
        }
        Self { sources: RwLock::new(sources), events }
    }

    /// Names of every registered source, in registration order is not
    /// preserved (backed by a `HashMap`); callers needing stable order
    /// should sort.
    pub async fn known_sources(&self) -> Vec<String> {
        self.sources.read().await.keys().cloned().collect()
    }

    /// Start `source`, or every source when `None`.
    /// Best-effort across `all`: a source already running is skipped
    /// (reported in the returned `Vec`) rather than aborting the rest.
    pub async fn start(
        &self,
        source: Option<&str>,
        params: WorkerParams,
    ) -> Result<Vec<(String, Result<(), ManagerError>)>, ManagerError> {
        let targets = self.resolve_targets(source).await?;
        let mut results = Vec::with_capacity(targets.len());
        for name in targets {
            let outcome = self.start_one(&name, params.clone()).await;
            results.push((name, outcome));
        }
        Ok(results)
    }

    async fn start_one(&self, name: &str, params: WorkerParams) -> Result<(), ManagerError> {
        let mut sources = self.sources.write().await;
        let handle = sources.get_mut(name).ok_or_else(|| ManagerError::UnknownSource(name.to_string()))?;

        let current = handle.status.read().unwrap().clone();
        if current.state == crate::status::WorkerState::Running {
            return Err(ManagerError::AlreadyRunning(name.to_string()));
        }
        if let Some(until) = current.cooldown_until {
            if Utc::now() < until {
                return Err(ManagerError::Cooldown { name: name.to_string(), until });
            }
        }

        let cancel = CancellationToken::new();
        let run_id = Uuid::new_v4().to_string();
        let worker = handle.worker.clone();
        let status = handle.status.clone();
        let events = self.events.clone();
        let cancel_for_task = cancel.clone();
        let source_name = name.to_string();

        let task = tokio::spawn(async move {
            if let Err(err) = worker.run_cycle(run_id, params, status, events, cancel_for_task).await {
                warn!(source = %source_name, error = %err, "crawl cycle returned an error");
            }
        });

        handle.cancel = Some(cancel);
        handle.task = Some(task);
        info!(source = name, "worker started");
        Ok(())
    }

    /// Request cooperative stop for `source`, or every running source
    /// when `None` ("Cancellation").
    pub async fn stop(&self, source: Option<&str>) -> Result<Vec<(String, Result<(), ManagerError>)>, ManagerError> {
        let targets = self.resolve_targets(source).await?;
        let mut results = Vec::with_capacity(targets.len());
        for name in targets {
            let outcome = self.stop_one(&name).await;
            results.push((name, outcome));
        }
        Ok(results)
    }

    async fn stop_one(&self, name: &str) -> Result<(), ManagerError> {
        let sources = self.sources.read().await;
        let handle = sources.get(name).ok_or_else(|| ManagerError::UnknownSource(name.to_string()))?;
        match &handle.cancel {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                Ok(())
            }
            _ => Err(ManagerError::NotRunning(name.to_string())),
        }
    }

    /// Copy-on-read status for every source.
    pub async fn status(&self) -> HashMap<String, SourceStatus> {
        let sources = self.sources.read().await;
        sources.iter().map(|(name, handle)| (name.clone(), handle.status.read().unwrap().clone())).collect()
    }

    pub async fn status_one(&self, source: &str) -> Result<SourceStatus, ManagerError> {
        let sources = self.sources.read().await;
        sources
            .get(source)
            .map(|handle| handle.status.read().unwrap().clone())
            .ok_or_else(|| ManagerError::UnknownSource(source.to_string()))
    }

    /// Subscribe to lifecycle events across every source. A lagging
    /// subscriber may observe `RecvError::Lagged`; `status()` remains
    /// authoritative.
    pub fn subscribe(&self) -> broadcast::Receiver<CrawlEvent> {
        self.events.subscribe()
    }

    async fn resolve_targets(&self, source: Option<&str>) -> Result<Vec<String>, ManagerError> {
        match source {
            Some(name) => {
                let sources = self.sources.read().await;
                if sources.contains_key(name) {
                    Ok(vec![name.to_string()])
                } else {
                    Err(ManagerError::UnknownSource(name.to_string()))
                }
            }
            None => Ok(self.known_sources().await),
        }
    }
}

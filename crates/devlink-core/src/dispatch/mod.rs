// ── Dispatcher ──
//
// Feeds link identities to the reconciler. A pool of workers drains a
// shared work queue; the queue guarantees that one identity is never
// reconciled by two workers at once. Failed passes come back with an
// exponential delay, successful ones reset the delay.

mod queue;

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::{AdaptorHandler, AdaptorNotification, ConnectionHandler, ConnectionStatus};
use crate::config::ReconcilerConfig;
use crate::error::CoreError;
use crate::model::ObjectKey;
use crate::predicate::LinkChangedPredicate;
use crate::reconciler::{DeviceLinkReconciler, ReconcileOutcome};
use crate::store::{LinkEvent, ResourceStore};

pub use queue::WorkQueue;

struct DispatcherInner {
    reconciler: Arc<DeviceLinkReconciler>,
    store: Arc<dyn ResourceStore>,
    config: ReconcilerConfig,
    predicate: LinkChangedPredicate,
    queue: WorkQueue,
    failures: DashMap<ObjectKey, u32>,
}

#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

impl Dispatcher {
    pub fn new(
        reconciler: Arc<DeviceLinkReconciler>,
        store: Arc<dyn ResourceStore>,
        config: ReconcilerConfig,
    ) -> Result<Self, CoreError> {
        config.validate()?;
        let predicate = LinkChangedPredicate::new(config.node_name.clone());
        Ok(Self {
            inner: Arc::new(DispatcherInner {
                reconciler,
                store,
                config,
                predicate,
                queue: WorkQueue::new(),
                failures: DashMap::new(),
            }),
        })
    }

    pub fn enqueue(&self, key: ObjectKey) {
        self.inner.queue.add(key);
    }

    pub fn queue(&self) -> &WorkQueue {
        &self.inner.queue
    }

    /// Enqueue every stored link relevant to this node.
    pub async fn resync(&self) -> Result<usize, CoreError> {
        let links = self.inner.store.list_links().await?;
        let mut queued = 0;
        for link in links.iter().filter(|l| self.inner.predicate.create(l)) {
            self.enqueue(link.key());
            queued += 1;
        }
        debug!(queued, "resynced links");
        Ok(queued)
    }

    /// Handler to register with the bridge for adaptor notifications.
    pub fn adaptor_handler(&self) -> Arc<dyn AdaptorHandler> {
        Arc::new(self.clone())
    }

    /// Handler to register with the bridge for session health changes.
    pub fn connection_handler(&self) -> Arc<dyn ConnectionHandler> {
        Arc::new(self.clone())
    }

    /// Run workers and the watch loop until `cancel` fires.
    pub async fn run(
        &self,
        mut events: broadcast::Receiver<LinkEvent>,
        cancel: CancellationToken,
    ) -> Result<(), CoreError> {
        info!(
            node = %self.inner.config.node_name,
            workers = self.inner.config.workers,
            "dispatcher starting"
        );
        self.resync().await?;

        let mut workers = JoinSet::new();
        for id in 0..self.inner.config.workers {
            let inner = Arc::clone(&self.inner);
            workers.spawn(async move { inner.work(id).await });
        }

        let mut watching = true;
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                received = events.recv(), if watching => match received {
                    Ok(event) => {
                        if self.inner.predicate.matches(&event) {
                            self.enqueue(event.key());
                        }
                    }
                    Err(RecvError::Lagged(missed)) => {
                        warn!(missed, "link watch lagged, resyncing");
                        if let Err(e) = self.resync().await {
                            warn!(error = %e, "resync failed");
                        }
                    }
                    Err(RecvError::Closed) => {
                        debug!("link watch closed");
                        watching = false;
                    }
                },
            }
        }

        self.inner.queue.shutdown();
        while workers.join_next().await.is_some() {}
        info!("dispatcher stopped");
        Ok(())
    }
}

impl DispatcherInner {
    async fn work(&self, id: usize) {
        debug!(worker = id, "worker started");
        while let Some(key) = self.queue.get().await {
            match self.reconciler.reconcile(&key).await {
                ReconcileOutcome::Done => {
                    self.failures.remove(&key);
                }
                ReconcileOutcome::Requeue => {
                    let failures = {
                        let mut entry = self.failures.entry(key.clone()).or_insert(0);
                        *entry += 1;
                        *entry
                    };
                    let delay = self.config.backoff(failures - 1);
                    debug!(link = %key, failures, ?delay, "requeueing");
                    self.queue.add_after(key.clone(), delay);
                }
            }
            self.queue.done(&key);
        }
        debug!(worker = id, "worker stopped");
    }
}

#[async_trait]
impl AdaptorHandler for Dispatcher {
    async fn on_adaptor(&self, notification: AdaptorNotification) {
        let links = match self.inner.store.list_links().await {
            Ok(links) => links,
            Err(e) => {
                warn!(error = %e, "unable to list links for adaptor change");
                return;
            }
        };
        let adaptor = notification.adaptor();
        for link in links {
            if link.status.adaptor_name == adaptor || link.spec.adaptor.name == adaptor {
                self.enqueue(link.key());
            }
        }
    }
}

#[async_trait]
impl ConnectionHandler for Dispatcher {
    async fn on_connection(&self, key: ObjectKey, status: ConnectionStatus) {
        if let Err(e) = self.inner.reconciler.mark_connection(&key, status).await {
            warn!(link = %key, error = %e, "unable to record connection status");
        }
        self.enqueue(key);
    }
}

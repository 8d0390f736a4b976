//! Change notifications for the root filesystem
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │  CloudEvent: what changed after a reconciliation                │
//! │  ├── PeersChanged: peer table changed (mounts may follow)       │
//! │  └── ProvidersChanged: provider set or provider mounts changed  │
//! │                                                                 │
//! │  MountChanges: mount names added / removed / renamed / updated  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Events are published on a broadcast channel after the reconciliation lock
//! is released. Delivery is best-effort: a receiver that falls behind loses
//! the oldest events, and two rapid reconciliations may be observed in either
//! order by callback observers. Consumers should treat every event as "the
//! root listing is stale" and re-read the mount table.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{CloudError, CloudResult};

/// Default capacity for the event broadcast channel
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Mount-level effect of one reconciliation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MountChanges {
    /// Newly inserted mount names
    pub added: Vec<String>,
    /// Removed mount names
    pub removed: Vec<String>,
    /// Re-keyed mounts as (old name, new name)
    pub renamed: Vec<(String, String)>,
    /// Mounts whose endpoint changed in place
    pub updated: Vec<String>,
}

impl MountChanges {
    /// Whether nothing happened
    pub fn is_empty(&self) -> bool {
        self.added.is_empty()
            && self.removed.is_empty()
            && self.renamed.is_empty()
            && self.updated.is_empty()
    }
}

/// Events emitted by the personal cloud
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloudEvent {
    /// The peer table changed
    PeersChanged {
        /// Peers cached after the change
        peer_count: usize,
        /// Resulting mount changes
        mounts: MountChanges,
    },
    /// The provider set or the provider mounts changed
    ProvidersChanged {
        /// Provider instances after the change
        provider_count: usize,
        /// Resulting mount changes
        mounts: MountChanges,
    },
}

impl CloudEvent {
    /// Mount changes carried by this event
    pub fn mounts(&self) -> &MountChanges {
        match self {
            CloudEvent::PeersChanged { mounts, .. } => mounts,
            CloudEvent::ProvidersChanged { mounts, .. } => mounts,
        }
    }
}

/// Broadcast fan-out of [`CloudEvent`]s
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<CloudEvent>,
}

impl EventBus {
    /// Create a bus with the given buffer capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe a raw receiver
    pub fn subscribe(&self) -> broadcast::Receiver<CloudEvent> {
        self.tx.subscribe()
    }

    /// Number of live subscribers
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Publish without waiting for anyone
    pub fn publish(&self, event: CloudEvent) {
        if self.tx.send(event).is_err() {
            debug!("No event subscribers");
        }
    }

    /// Run `callback` for every event on a background task.
    ///
    /// A panicking callback is caught and logged; the listener keeps running.
    /// Requires a Tokio runtime.
    pub fn on_event<F>(&self, callback: F) -> CloudResult<JoinHandle<()>>
    where
        F: Fn(CloudEvent) + Send + 'static,
    {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| CloudError::Config(format!("event observers need a Tokio runtime: {}", e)))?;
        let mut receiver = self.tx.subscribe();

        Ok(handle.spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        if catch_unwind(AssertUnwindSafe(|| callback(event))).is_err() {
                            warn!("Event observer panicked; event discarded");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Event observer lagged; events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }))
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EVENT_CHANNEL_CAPACITY)
    }
}

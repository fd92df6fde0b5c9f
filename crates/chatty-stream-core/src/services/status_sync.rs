use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

use super::ports::StreamStatusSource;
use crate::models::{StreamRegistry, StreamStatus};

/// Decides whether a status sync may hit the network right now.
///
/// Sync is suspended while the client is hidden or while the user is editing
/// something (rename, search) that a repaint would disrupt.
pub struct SyncGate {
    visible: AtomicBool,
    local_edits: AtomicUsize,
}

impl SyncGate {
    pub fn new() -> Self {
        Self {
            visible: AtomicBool::new(true),
            local_edits: AtomicUsize::new(0),
        }
    }

    pub fn set_visible(&self, visible: bool) {
        self.visible.store(visible, Ordering::SeqCst);
    }

    pub fn is_visible(&self) -> bool {
        self.visible.load(Ordering::SeqCst)
    }

    /// Suspend sync until the returned guard is dropped. Guards nest.
    pub fn begin_local_edit(self: &Arc<Self>) -> LocalEditGuard {
        self.local_edits.fetch_add(1, Ordering::SeqCst);
        LocalEditGuard { gate: self.clone() }
    }

    pub fn allows_sync(&self) -> bool {
        self.is_visible() && self.local_edits.load(Ordering::SeqCst) == 0
    }
}

impl Default for SyncGate {
    fn default() -> Self {
        Self::new()
    }
}

pub struct LocalEditGuard {
    gate: Arc<SyncGate>,
}

impl Drop for LocalEditGuard {
    fn drop(&mut self) {
        self.gate.local_edits.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Result of one bulk reconciliation pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub updated: usize,
    pub cleared: usize,
    /// The gate was closed; no request was made.
    pub skipped: bool,
    /// The request failed; the registry was left as it was.
    pub failed: bool,
}

/// Feeds the registry from the server's view of which streams are live.
///
/// The server is authoritative for *clearing* entries, except for the stream
/// this client owns, which only the controller may end.
pub struct ServerStatusSync {
    registry: Arc<StreamRegistry>,
    source: Arc<dyn StreamStatusSource>,
    gate: Arc<SyncGate>,
}

impl ServerStatusSync {
    pub fn new(
        registry: Arc<StreamRegistry>,
        source: Arc<dyn StreamStatusSource>,
        gate: Arc<SyncGate>,
    ) -> Self {
        Self {
            registry,
            source,
            gate,
        }
    }

    pub fn gate(&self) -> &Arc<SyncGate> {
        &self.gate
    }

    /// Refresh a single conversation. Failures count as "not streaming" and are
    /// only logged. Returns the registry's status after reconciling.
    pub async fn refresh_one(&self, conversation_id: &str) -> StreamStatus {
        if !self.gate.allows_sync() {
            debug!(conv_id = %conversation_id, "Status refresh skipped, sync gated");
            return self.registry.get_status(conversation_id);
        }

        match self.source.fetch_status(conversation_id).await {
            Ok(status) if status.streaming => {
                if self.registry.get_status(conversation_id) != status {
                    self.registry.set_status(conversation_id, Some(status));
                }
            }
            Ok(_) => {
                self.registry.clear_unless_claimed(conversation_id);
            }
            Err(e) => {
                warn!(conv_id = %conversation_id, error = ?e, "Failed to fetch stream status, treating as not streaming");
                self.registry.clear_unless_claimed(conversation_id);
            }
        }

        self.registry.get_status(conversation_id)
    }

    /// Reconcile every entry against the server's bulk status map.
    pub async fn refresh_all(&self) -> SyncReport {
        if !self.gate.allows_sync() {
            debug!("Bulk status refresh skipped, sync gated");
            return SyncReport {
                skipped: true,
                ..SyncReport::default()
            };
        }

        let server = match self.source.fetch_all().await {
            Ok(server) => server,
            Err(e) => {
                warn!(error = ?e, "Failed to fetch bulk stream status");
                return SyncReport {
                    failed: true,
                    ..SyncReport::default()
                };
            }
        };

        let mut report = SyncReport::default();

        for (conversation_id, status) in &server {
            if status.streaming && self.registry.get_status(conversation_id) != *status {
                self.registry
                    .set_status(conversation_id, Some(status.clone()));
                report.updated += 1;
            }
        }

        for conversation_id in self.registry.active_ids() {
            let confirmed = server
                .get(&conversation_id)
                .is_some_and(|status| status.streaming);
            if !confirmed && self.registry.clear_unless_claimed(&conversation_id) {
                report.cleared += 1;
            }
        }

        debug!(
            updated = report.updated,
            cleared = report.cleared,
            "Bulk status refresh complete"
        );
        report
    }

    /// Run `refresh_all` every `interval` until the handle is stopped or dropped.
    /// The first pass happens one interval from now.
    pub fn spawn_polling(self: &Arc<Self>, interval: Duration) -> PollingHandle {
        let sync = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Consume the immediate tick
            ticker.tick().await;
            loop {
                ticker.tick().await;
                sync.refresh_all().await;
            }
        });
        PollingHandle { task }
    }
}

/// Stops the polling task when dropped.
pub struct PollingHandle {
    task: JoinHandle<()>,
}

impl PollingHandle {
    pub fn stop(self) {
        drop(self);
    }
}

impl Drop for PollingHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}

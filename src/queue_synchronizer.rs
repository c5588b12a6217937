//! Read path: keeps the visible queue in step with the playback engine.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::broadcast::Sender;

use crate::{
    collaborators::PlaybackEngine,
    engine_state::{Operation, QueueStateHandle, RebuiltQueue},
    protocol::{Message, QueueMessage},
    queue_filter::QueueFilter,
    track::SourceType,
};

/// Rebuilds and publishes the visible queue in reaction to engine and
/// network notifications.
#[derive(Clone)]
pub struct QueueSynchronizer {
    engine: Arc<dyn PlaybackEngine>,
    filter: QueueFilter,
    state: QueueStateHandle,
    bus_producer: Sender<Message>,
}

impl QueueSynchronizer {
    pub fn new(
        engine: Arc<dyn PlaybackEngine>,
        filter: QueueFilter,
        state: QueueStateHandle,
        bus_producer: Sender<Message>,
    ) -> Self {
        Self {
            engine,
            filter,
            state,
            bus_producer,
        }
    }

    pub fn state(&self) -> &QueueStateHandle {
        &self.state
    }

    /// Broadcasts the current observable state.
    pub fn publish(&self) {
        let _ = self
            .bus_producer
            .send(Message::Queue(QueueMessage::ViewChanged(self.state.view())));
    }

    /// Records reachability. The queue is rebuilt on the next track change
    /// or refresh, so short reachability blips do not reshuffle the list.
    pub fn handle_network_change(&self, reachable: bool) {
        let was_offline = self.state.is_offline();
        self.state.set_offline(!reachable);
        if was_offline == reachable {
            info!(
                "QueueSynchronizer: network {}",
                if reachable { "reachable" } else { "unreachable" }
            );
        }
        self.publish();
    }

    /// Rebuilds after the engine reported a new active track. Dropped while
    /// any other operation owns the engine. Returns whether a new queue was
    /// stored.
    pub async fn handle_track_changed(&self) -> bool {
        self.resync("track change").await
    }

    /// Rebuilds from the engine's current active track.
    pub async fn refresh(&self) -> bool {
        self.resync("refresh").await
    }

    async fn resync(&self, reason: &str) -> bool {
        let guard = match self.state.begin(Operation::Resyncing) {
            Ok(guard) => guard,
            Err(err) => {
                debug!(
                    "QueueSynchronizer: {} ignored while {:?}",
                    reason, err.from
                );
                return false;
            }
        };

        let Some(rebuilt) = self.rebuild().await else {
            return false;
        };
        if !self.state.commit_resync(&guard, rebuilt) {
            debug!(
                "QueueSynchronizer: {} result discarded, preempted by user operation",
                reason
            );
            return false;
        }
        drop(guard);
        self.publish();
        true
    }

    /// Reads the engine and computes the visible queue without storing it.
    /// Returns `None` when the active track cannot be read.
    pub async fn rebuild(&self) -> Option<RebuiltQueue> {
        let anchor = match self.engine.get_active_track().await {
            Ok(anchor) => anchor,
            Err(err) => {
                warn!("QueueSynchronizer: failed to read active track: {}", err);
                return None;
            }
        };
        let current_index = match self.engine.get_current_index().await {
            Ok(index) => index,
            Err(err) => {
                warn!("QueueSynchronizer: failed to read current index: {}", err);
                None
            }
        };

        let visible_queue = self
            .filter
            .resolve(anchor.as_ref(), self.state.is_offline())
            .await;
        let is_local_source = anchor
            .as_ref()
            .is_some_and(|track| self.filter.classifier().classify(track) != SourceType::Online);

        Some(RebuiltQueue {
            visible_queue,
            current_index,
            is_local_source,
        })
    }
}

//! Queue session event loop.
//!
//! The manager is the single consumer of queue-relevant bus traffic. Engine
//! and network notifications are handled inline, in arrival order. Selection
//! and drop run as tasks so the loop keeps draining the bus while they own
//! the engine; track changes observed in that window are dropped by the
//! operation state machine.

use log::{debug, info, warn};
use tokio::sync::broadcast::{error::RecvError, Receiver, Sender};
use tokio::task::JoinSet;

use crate::{
    protocol::{EngineMessage, Message, NetworkMessage, QueueMessage, SessionMessage},
    queue_reorderer::{DragOutcome, QueueReorderer},
    queue_synchronizer::QueueSynchronizer,
    track::Track,
    track_selector::{SelectionOutcome, TrackSelector},
};

/// Dispatches bus messages to the synchronizer, selector and reorderer.
pub struct QueueManager {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    synchronizer: QueueSynchronizer,
    selector: TrackSelector,
    reorderer: QueueReorderer,
    in_flight: JoinSet<()>,
}

impl QueueManager {
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        synchronizer: QueueSynchronizer,
        selector: TrackSelector,
        reorderer: QueueReorderer,
    ) -> Self {
        Self {
            bus_consumer,
            bus_producer,
            synchronizer,
            selector,
            reorderer,
            in_flight: JoinSet::new(),
        }
    }

    /// Processes bus messages until the session ends or the bus closes.
    /// Operations still in flight are awaited before returning.
    pub async fn run(&mut self) {
        info!("QueueManager: started");
        loop {
            match self.bus_consumer.recv().await {
                Ok(Message::Session(SessionMessage::End)) => break,
                Ok(message) => self.handle_message(message).await,
                Err(RecvError::Lagged(skipped)) => {
                    warn!("QueueManager: bus lagged by {} messages", skipped);
                }
                Err(RecvError::Closed) => {
                    warn!("QueueManager: bus closed");
                    break;
                }
            }
            while self.in_flight.try_join_next().is_some() {}
        }

        while let Some(result) = self.in_flight.join_next().await {
            if let Err(err) = result {
                warn!("QueueManager: operation task ended abnormally: {}", err);
            }
        }
        info!("QueueManager: stopped");
    }

    async fn handle_message(&mut self, message: Message) {
        match message {
            Message::Engine(EngineMessage::TrackChanged { index, track_id }) => {
                debug!(
                    "QueueManager: engine track changed index={:?} id={:?}",
                    index, track_id
                );
                self.synchronizer.handle_track_changed().await;
            }
            Message::Network(NetworkMessage::ReachabilityChanged { reachable }) => {
                self.synchronizer.handle_network_change(reachable);
            }
            Message::Queue(QueueMessage::SelectTrack(track)) => self.spawn_selection(track),
            Message::Queue(QueueMessage::DragStart) => {
                self.reorderer.drag_start();
            }
            Message::Queue(QueueMessage::DragEnd {
                from,
                to,
                visual_order,
            }) => self.spawn_drop(from, to, visual_order),
            Message::Queue(QueueMessage::Refresh) => {
                self.synchronizer.refresh().await;
            }
            Message::Queue(
                QueueMessage::ViewChanged(_)
                | QueueMessage::SelectionFinished { .. }
                | QueueMessage::ReorderFinished { .. },
            ) => {}
            Message::Session(SessionMessage::End) => {}
        }
    }

    fn spawn_selection(&mut self, track: Track) {
        let selector = self.selector.clone();
        let synchronizer = self.synchronizer.clone();
        let bus_producer = self.bus_producer.clone();
        self.in_flight.spawn(async move {
            let outcome = selector.select_track(&track).await;
            if outcome != SelectionOutcome::Rejected {
                synchronizer.refresh().await;
            }
            let _ = bus_producer.send(Message::Queue(QueueMessage::SelectionFinished {
                track_id: track.id,
                succeeded: outcome.succeeded(),
            }));
        });
    }

    fn spawn_drop(&mut self, from: usize, to: usize, visual_order: Vec<Track>) {
        let reorderer = self.reorderer.clone();
        let bus_producer = self.bus_producer.clone();
        self.in_flight.spawn(async move {
            let outcome = reorderer.handle_drag_end(from, to, visual_order).await;
            let succeeded = matches!(outcome, DragOutcome::Unchanged | DragOutcome::Reordered);
            let _ = bus_producer.send(Message::Queue(QueueMessage::ReorderFinished { succeeded }));
        });
    }
}

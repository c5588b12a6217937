//! Playback-session lifecycle.
//!
//! A session owns one [`QueueStateHandle`], the bus, and the tasks feeding
//! it. Collaborator notifications are forwarded onto the bus as typed
//! messages; UI gestures go through [`QueueSession`] and travel the same bus.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio::task::JoinHandle;

use crate::{
    collaborators::{
        DownloadedLibrary, NetworkMonitor, NoticeSink, PlaybackEngine, PlaybackEvent,
        SubscriptionId,
    },
    config::Config,
    engine_state::{QueueStateHandle, QueueView},
    protocol::{EngineMessage, Message, NetworkMessage, QueueMessage, SessionMessage},
    queue_filter::QueueFilter,
    queue_manager::QueueManager,
    queue_reorderer::QueueReorderer,
    queue_synchronizer::QueueSynchronizer,
    source_classifier::SourceClassifier,
    track::Track,
    track_selector::TrackSelector,
};

pub struct QueueSessionConfig {
    pub engine: Arc<dyn PlaybackEngine>,
    pub library: Arc<dyn DownloadedLibrary>,
    pub network: Arc<dyn NetworkMonitor>,
    pub notices: Arc<dyn NoticeSink>,
    pub config: Config,
}

/// UI-facing handle of a running queue session.
///
/// Commands are fire-and-forget; results arrive on the bus as
/// [`QueueMessage::ViewChanged`], [`QueueMessage::SelectionFinished`] and
/// [`QueueMessage::ReorderFinished`].
pub struct QueueSession {
    bus_sender: broadcast::Sender<Message>,
    state: QueueStateHandle,
    network: Arc<dyn NetworkMonitor>,
    network_subscription: Option<SubscriptionId>,
    manager_task: Option<JoinHandle<()>>,
    forwarders: Vec<JoinHandle<()>>,
}

/// Builds the session components, starts the manager and the collaborator
/// forwarders, and queues the initial refresh when configured.
pub async fn spawn_queue_session(config: QueueSessionConfig) -> QueueSession {
    let QueueSessionConfig {
        engine,
        library,
        network,
        notices,
        config,
    } = config;

    let (bus_sender, _) = broadcast::channel(config.session.bus_capacity);
    let state = QueueStateHandle::new();
    let classifier = SourceClassifier::new(config.classifier.local_prefixes.iter().cloned());

    let reachable = match network.fetch_current_state().await {
        Ok(network_state) => network_state.reachable,
        Err(err) => {
            warn!(
                "QueueSession: failed to read network state, assuming {}: {}",
                if config.session.assume_reachable_on_error {
                    "reachable"
                } else {
                    "unreachable"
                },
                err
            );
            config.session.assume_reachable_on_error
        }
    };
    state.set_offline(!reachable);

    let filter = QueueFilter::new(classifier.clone(), engine.clone(), library);
    let synchronizer =
        QueueSynchronizer::new(engine.clone(), filter, state.clone(), bus_sender.clone());
    let selector = TrackSelector::new(
        engine.clone(),
        notices.clone(),
        config.notices.clone(),
        classifier.clone(),
        state.clone(),
    );
    let reorderer = QueueReorderer::new(
        engine.clone(),
        notices,
        config.notices.clone(),
        classifier,
        synchronizer.clone(),
    );

    let mut manager = QueueManager::new(
        bus_sender.subscribe(),
        bus_sender.clone(),
        synchronizer,
        selector,
        reorderer,
    );
    let manager_task = tokio::spawn(async move {
        manager.run().await;
    });

    let mut engine_events = engine.subscribe_events();
    let engine_bus_sender = bus_sender.clone();
    let engine_forwarder = tokio::spawn(async move {
        loop {
            match engine_events.recv().await {
                Ok(PlaybackEvent::TrackChanged { index, track_id }) => {
                    let message = Message::Engine(EngineMessage::TrackChanged { index, track_id });
                    if engine_bus_sender.send(message).is_err() {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!("QueueSession: engine events lagged by {}", skipped);
                }
                Err(RecvError::Closed) => break,
            }
        }
        debug!("QueueSession: engine event forwarder stopped");
    });

    let (network_tx, mut network_rx) = mpsc::unbounded_channel();
    let network_subscription = network.subscribe(network_tx);
    let network_bus_sender = bus_sender.clone();
    let network_forwarder = tokio::spawn(async move {
        while let Some(network_state) = network_rx.recv().await {
            let message = Message::Network(NetworkMessage::ReachabilityChanged {
                reachable: network_state.reachable,
            });
            if network_bus_sender.send(message).is_err() {
                break;
            }
        }
        debug!("QueueSession: network forwarder stopped");
    });

    if config.session.refresh_on_start {
        let _ = bus_sender.send(Message::Queue(QueueMessage::Refresh));
    }

    info!(
        "QueueSession: started (offline={}, refresh_on_start={})",
        !reachable, config.session.refresh_on_start
    );

    QueueSession {
        bus_sender,
        state,
        network,
        network_subscription: Some(network_subscription),
        manager_task: Some(manager_task),
        forwarders: vec![engine_forwarder, network_forwarder],
    }
}

impl QueueSession {
    /// Current observable queue state.
    pub fn view(&self) -> QueueView {
        self.state.view()
    }

    /// Receives every bus message published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<Message> {
        self.bus_sender.subscribe()
    }

    pub fn select_track(&self, item: Track) {
        self.send(Message::Queue(QueueMessage::SelectTrack(item)));
    }

    pub fn drag_start(&self) {
        self.send(Message::Queue(QueueMessage::DragStart));
    }

    pub fn drag_end(&self, from: usize, to: usize, visual_order: Vec<Track>) {
        self.send(Message::Queue(QueueMessage::DragEnd {
            from,
            to,
            visual_order,
        }));
    }

    pub fn refresh(&self) {
        self.send(Message::Queue(QueueMessage::Refresh));
    }

    /// Stops listening to collaborators, lets in-flight operations finish,
    /// and stops the manager.
    pub async fn shutdown(mut self) {
        self.stop_forwarding();
        self.send(Message::Session(SessionMessage::End));
        if let Some(manager_task) = self.manager_task.take() {
            if let Err(err) = manager_task.await {
                warn!("QueueSession: manager task ended abnormally: {}", err);
            }
        }
        info!("QueueSession: ended");
    }

    fn send(&self, message: Message) {
        if self.bus_sender.send(message).is_err() {
            warn!("QueueSession: bus has no consumer, message dropped");
        }
    }

    fn stop_forwarding(&mut self) {
        if let Some(id) = self.network_subscription.take() {
            self.network.unsubscribe(id);
        }
        for forwarder in self.forwarders.drain(..) {
            forwarder.abort();
        }
    }
}

impl Drop for QueueSession {
    fn drop(&mut self) {
        self.stop_forwarding();
        if let Some(manager_task) = self.manager_task.take() {
            manager_task.abort();
        }
    }
}

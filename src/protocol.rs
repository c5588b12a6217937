//! Event-bus protocol for a queue session.
//!
//! Engine and network notifications, UI commands, and published queue state
//! all travel on one broadcast bus and are processed in arrival order by the
//! queue manager.

use crate::{engine_state::QueueView, track::Track};

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Engine(EngineMessage),
    Network(NetworkMessage),
    Queue(QueueMessage),
    Session(SessionMessage),
}

/// Notifications forwarded from the playback engine.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineMessage {
    TrackChanged {
        index: Option<usize>,
        track_id: Option<String>,
    },
}

/// Notifications forwarded from the network monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMessage {
    ReachabilityChanged { reachable: bool },
}

/// UI commands and queue notifications.
#[derive(Debug, Clone)]
pub enum QueueMessage {
    /// User tapped a visible-queue row.
    SelectTrack(Track),
    DragStart,
    /// Drop finished. `visual_order` is the list as the user now sees it.
    DragEnd {
        from: usize,
        to: usize,
        visual_order: Vec<Track>,
    },
    Refresh,
    /// Published after every change to the observable queue state.
    ViewChanged(QueueView),
    SelectionFinished {
        track_id: String,
        succeeded: bool,
    },
    ReorderFinished {
        succeeded: bool,
    },
}

/// Session lifecycle control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionMessage {
    End,
}

//! Contracts for the external services the queue engine drives.
//!
//! The playback engine, downloaded-library provider, network monitor, and
//! notice sink are implemented by the host application. This crate only calls
//! them; `in_memory` carries reference implementations.

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};

use crate::track::Track;

/// Failure reported by the playback engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("playback engine unavailable: {0}")]
    Unavailable(String),
    #[error("playback engine rejected {operation}: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },
    #[error("queue index {index} out of range (len {len})")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Failure reported by a data source (downloaded library or network monitor).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("storage lookup failed: {0}")]
    Storage(String),
    #[error("network state query failed: {0}")]
    Network(String),
}

/// Transport state reported by the playback engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    None,
    Ready,
    Loading,
    Buffering,
    Playing,
    Paused,
    Stopped,
    Ended,
    Error,
}

impl PlaybackState {
    pub fn is_playing(self) -> bool {
        matches!(self, PlaybackState::Playing)
    }
}

/// Notification emitted by the playback engine.
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    /// The active track changed (skip, natural advance, or queue replacement).
    TrackChanged {
        index: Option<usize>,
        track_id: Option<String>,
    },
}

/// Reachability reported by the network monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkState {
    pub reachable: bool,
}

/// Handle returned by [`NetworkMonitor::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub uuid::Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Authoritative queue and transport owned by the host's audio player.
#[async_trait]
pub trait PlaybackEngine: Send + Sync {
    async fn get_queue(&self) -> Result<Vec<Track>, EngineError>;

    /// Inserts `tracks` before `at_index`, or appends when `at_index` is `None`.
    async fn add(&self, tracks: Vec<Track>, at_index: Option<usize>) -> Result<(), EngineError>;

    async fn remove(&self, index: usize) -> Result<(), EngineError>;

    /// Clears the queue and stops playback.
    async fn reset(&self) -> Result<(), EngineError>;

    async fn skip(&self, index: usize) -> Result<(), EngineError>;

    async fn seek_to(&self, seconds: f64) -> Result<(), EngineError>;

    async fn play(&self) -> Result<(), EngineError>;

    async fn pause(&self) -> Result<(), EngineError>;

    async fn get_active_track(&self) -> Result<Option<Track>, EngineError>;

    async fn get_current_index(&self) -> Result<Option<usize>, EngineError>;

    async fn get_playback_state(&self) -> Result<PlaybackState, EngineError>;

    /// Playback position of the active track, in seconds.
    async fn get_position(&self) -> Result<f64, EngineError>;

    fn subscribe_events(&self) -> broadcast::Receiver<PlaybackEvent>;
}

/// Source of tracks the download subsystem has stored on the device.
#[async_trait]
pub trait DownloadedLibrary: Send + Sync {
    /// Every returned track is tagged `is_local = is_downloaded = true`.
    async fn get_all_downloaded_tracks(&self) -> Result<Vec<Track>, ProviderError>;
}

/// Device reachability detector.
#[async_trait]
pub trait NetworkMonitor: Send + Sync {
    async fn fetch_current_state(&self) -> Result<NetworkState, ProviderError>;

    fn subscribe(&self, listener: mpsc::UnboundedSender<NetworkState>) -> SubscriptionId;

    fn unsubscribe(&self, id: SubscriptionId);
}

/// Fire-and-forget sink for transient user-facing notices.
pub trait NoticeSink: Send + Sync {
    fn notify(&self, message: &str);
}

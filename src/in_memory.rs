//! In-memory collaborators.
//!
//! These mirror the observable behavior of a mobile playback engine closely
//! enough to drive a full session without audio output. Every engine call is
//! recorded so callers can assert on the exact sequence of operations, and
//! individual operations can be made to fail.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use async_trait::async_trait;
use log::info;
use tokio::sync::{broadcast, mpsc};

use crate::{
    collaborators::{
        DownloadedLibrary, EngineError, NetworkMonitor, NetworkState, NoticeSink, PlaybackEngine,
        PlaybackEvent, PlaybackState, ProviderError, SubscriptionId,
    },
    track::Track,
};

const ENGINE_EVENT_CAPACITY: usize = 64;

/// Engine operation kinds, used to inject failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineOp {
    GetQueue,
    Add,
    Remove,
    Reset,
    Skip,
    SeekTo,
    Play,
    Pause,
    GetActiveTrack,
    GetCurrentIndex,
    GetPlaybackState,
    GetPosition,
}

/// One recorded engine call.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCall {
    GetQueue,
    Add {
        ids: Vec<String>,
        at_index: Option<usize>,
    },
    Remove(usize),
    Reset,
    Skip(usize),
    SeekTo(f64),
    Play,
    Pause,
    GetActiveTrack,
    GetCurrentIndex,
    GetPlaybackState,
    GetPosition,
}

impl EngineCall {
    /// True for calls that change the queue, the active index, or the transport.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            EngineCall::Add { .. }
                | EngineCall::Remove(_)
                | EngineCall::Reset
                | EngineCall::Skip(_)
                | EngineCall::SeekTo(_)
                | EngineCall::Play
                | EngineCall::Pause
        )
    }
}

#[derive(Default)]
struct EngineInner {
    queue: Vec<Track>,
    current_index: Option<usize>,
    state: Option<PlaybackState>,
    position_seconds: f64,
    calls: Vec<EngineCall>,
    fail_next: HashSet<EngineOp>,
    fail_always: HashSet<EngineOp>,
}

impl EngineInner {
    fn check(&mut self, op: EngineOp, call: EngineCall) -> Result<(), EngineError> {
        self.calls.push(call);
        if self.fail_always.contains(&op) || self.fail_next.remove(&op) {
            return Err(EngineError::Unavailable(format!("injected {:?} failure", op)));
        }
        Ok(())
    }

    fn playback_state(&self) -> PlaybackState {
        self.state.unwrap_or(PlaybackState::None)
    }
}

/// Playback engine holding its queue in memory.
pub struct InMemoryPlaybackEngine {
    inner: Mutex<EngineInner>,
    events: broadcast::Sender<PlaybackEvent>,
}

impl Default for InMemoryPlaybackEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryPlaybackEngine {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(ENGINE_EVENT_CAPACITY);
        Self {
            inner: Mutex::new(EngineInner::default()),
            events,
        }
    }

    /// Creates an engine whose first track is active and paused.
    pub fn with_queue(tracks: Vec<Track>) -> Self {
        let engine = Self::new();
        {
            let mut inner = engine.lock();
            inner.current_index = if tracks.is_empty() { None } else { Some(0) };
            inner.state = Some(if tracks.is_empty() {
                PlaybackState::None
            } else {
                PlaybackState::Paused
            });
            inner.queue = tracks;
        }
        engine
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, EngineInner> {
        self.inner.lock().expect("engine state lock poisoned")
    }

    fn emit_track_changed(&self, index: Option<usize>, queue: &[Track]) {
        let track_id = index.and_then(|i| queue.get(i)).map(|t| t.id.clone());
        let _ = self
            .events
            .send(PlaybackEvent::TrackChanged { index, track_id });
    }

    /// Sets the active index and transport state without recording a call.
    pub fn set_active(&self, index: usize, state: PlaybackState, position_seconds: f64) {
        let mut inner = self.lock();
        inner.current_index = Some(index);
        inner.state = Some(state);
        inner.position_seconds = position_seconds;
    }

    /// Emits a track-changed event for the current index, as a natural
    /// advance would, without recording a call.
    pub fn announce_track_changed(&self) {
        let inner = self.lock();
        self.emit_track_changed(inner.current_index, &inner.queue);
    }

    pub fn fail_next(&self, op: EngineOp) {
        self.lock().fail_next.insert(op);
    }

    pub fn fail_always(&self, op: EngineOp) {
        self.lock().fail_always.insert(op);
    }

    pub fn clear_failures(&self) {
        let mut inner = self.lock();
        inner.fail_next.clear();
        inner.fail_always.clear();
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.lock().calls.clone()
    }

    pub fn mutation_calls(&self) -> Vec<EngineCall> {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.is_mutation())
            .cloned()
            .collect()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn queue_ids(&self) -> Vec<String> {
        self.lock().queue.iter().map(|t| t.id.clone()).collect()
    }

    pub fn active_id(&self) -> Option<String> {
        let inner = self.lock();
        inner
            .current_index
            .and_then(|i| inner.queue.get(i))
            .map(|t| t.id.clone())
    }

    pub fn state(&self) -> PlaybackState {
        self.lock().playback_state()
    }

    pub fn position(&self) -> f64 {
        self.lock().position_seconds
    }
}

#[async_trait]
impl PlaybackEngine for InMemoryPlaybackEngine {
    async fn get_queue(&self) -> Result<Vec<Track>, EngineError> {
        let mut inner = self.lock();
        inner.check(EngineOp::GetQueue, EngineCall::GetQueue)?;
        Ok(inner.queue.clone())
    }

    async fn add(&self, tracks: Vec<Track>, at_index: Option<usize>) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.check(
            EngineOp::Add,
            EngineCall::Add {
                ids: tracks.iter().map(|t| t.id.clone()).collect(),
                at_index,
            },
        )?;
        let len = inner.queue.len();
        let insert_at = at_index.unwrap_or(len);
        if insert_at > len {
            return Err(EngineError::IndexOutOfRange {
                index: insert_at,
                len,
            });
        }
        let count = tracks.len();
        inner.queue.splice(insert_at..insert_at, tracks);
        match inner.current_index {
            Some(current) if current >= insert_at => {
                inner.current_index = Some(current + count);
            }
            Some(_) => {}
            None if !inner.queue.is_empty() => {
                inner.current_index = Some(0);
                inner.state = Some(PlaybackState::Ready);
                inner.position_seconds = 0.0;
                self.emit_track_changed(Some(0), &inner.queue);
            }
            None => {}
        }
        Ok(())
    }

    async fn remove(&self, index: usize) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.check(EngineOp::Remove, EngineCall::Remove(index))?;
        let len = inner.queue.len();
        if index >= len {
            return Err(EngineError::IndexOutOfRange { index, len });
        }
        inner.queue.remove(index);
        match inner.current_index {
            Some(current) if current > index => inner.current_index = Some(current - 1),
            Some(current) if current == index => {
                inner.current_index = if inner.queue.is_empty() {
                    None
                } else {
                    Some(current.min(inner.queue.len() - 1))
                };
                inner.position_seconds = 0.0;
                let current_index = inner.current_index;
                self.emit_track_changed(current_index, &inner.queue);
            }
            _ => {}
        }
        Ok(())
    }

    async fn reset(&self) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.check(EngineOp::Reset, EngineCall::Reset)?;
        inner.queue.clear();
        inner.current_index = None;
        inner.state = Some(PlaybackState::None);
        inner.position_seconds = 0.0;
        self.emit_track_changed(None, &[]);
        Ok(())
    }

    async fn skip(&self, index: usize) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.check(EngineOp::Skip, EngineCall::Skip(index))?;
        let len = inner.queue.len();
        if index >= len {
            return Err(EngineError::IndexOutOfRange { index, len });
        }
        inner.current_index = Some(index);
        inner.position_seconds = 0.0;
        self.emit_track_changed(Some(index), &inner.queue);
        Ok(())
    }

    async fn seek_to(&self, seconds: f64) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.check(EngineOp::SeekTo, EngineCall::SeekTo(seconds))?;
        inner.position_seconds = seconds.max(0.0);
        Ok(())
    }

    async fn play(&self) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.check(EngineOp::Play, EngineCall::Play)?;
        if inner.current_index.is_some() {
            inner.state = Some(PlaybackState::Playing);
        }
        Ok(())
    }

    async fn pause(&self) -> Result<(), EngineError> {
        let mut inner = self.lock();
        inner.check(EngineOp::Pause, EngineCall::Pause)?;
        if inner.current_index.is_some() {
            inner.state = Some(PlaybackState::Paused);
        }
        Ok(())
    }

    async fn get_active_track(&self) -> Result<Option<Track>, EngineError> {
        let mut inner = self.lock();
        inner.check(EngineOp::GetActiveTrack, EngineCall::GetActiveTrack)?;
        Ok(inner
            .current_index
            .and_then(|index| inner.queue.get(index))
            .cloned())
    }

    async fn get_current_index(&self) -> Result<Option<usize>, EngineError> {
        let mut inner = self.lock();
        inner.check(EngineOp::GetCurrentIndex, EngineCall::GetCurrentIndex)?;
        Ok(inner.current_index)
    }

    async fn get_playback_state(&self) -> Result<PlaybackState, EngineError> {
        let mut inner = self.lock();
        inner.check(EngineOp::GetPlaybackState, EngineCall::GetPlaybackState)?;
        Ok(inner.playback_state())
    }

    async fn get_position(&self) -> Result<f64, EngineError> {
        let mut inner = self.lock();
        inner.check(EngineOp::GetPosition, EngineCall::GetPosition)?;
        Ok(inner.position_seconds)
    }

    fn subscribe_events(&self) -> broadcast::Receiver<PlaybackEvent> {
        self.events.subscribe()
    }
}

/// Downloaded-library provider backed by a fixed track list.
#[derive(Default)]
pub struct InMemoryLibrary {
    tracks: Mutex<Vec<Track>>,
    failing: Mutex<bool>,
}

impl InMemoryLibrary {
    /// Stores `tracks`, tagging each one as a local download.
    pub fn new(tracks: Vec<Track>) -> Self {
        let library = Self::default();
        library.set_tracks(tracks);
        library
    }

    pub fn set_tracks(&self, tracks: Vec<Track>) {
        let tagged = tracks
            .into_iter()
            .map(|mut track| {
                track.is_local = true;
                track.is_downloaded = true;
                track
            })
            .collect();
        *self.tracks.lock().expect("library lock poisoned") = tagged;
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().expect("library lock poisoned") = failing;
    }
}

#[async_trait]
impl DownloadedLibrary for InMemoryLibrary {
    async fn get_all_downloaded_tracks(&self) -> Result<Vec<Track>, ProviderError> {
        if *self.failing.lock().expect("library lock poisoned") {
            return Err(ProviderError::Storage("metadata store unavailable".to_string()));
        }
        Ok(self.tracks.lock().expect("library lock poisoned").clone())
    }
}

/// Network monitor whose reachability is set by the caller.
pub struct InMemoryNetworkMonitor {
    reachable: Mutex<bool>,
    failing: Mutex<bool>,
    listeners: Mutex<HashMap<SubscriptionId, mpsc::UnboundedSender<NetworkState>>>,
}

impl InMemoryNetworkMonitor {
    pub fn new(reachable: bool) -> Self {
        Self {
            reachable: Mutex::new(reachable),
            failing: Mutex::new(false),
            listeners: Mutex::new(HashMap::new()),
        }
    }

    /// Updates reachability and notifies every subscriber.
    pub fn set_reachable(&self, reachable: bool) {
        *self.reachable.lock().expect("network lock poisoned") = reachable;
        let mut listeners = self.listeners.lock().expect("network lock poisoned");
        listeners.retain(|_, listener| listener.send(NetworkState { reachable }).is_ok());
    }

    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().expect("network lock poisoned") = failing;
    }

    pub fn subscriber_count(&self) -> usize {
        self.listeners.lock().expect("network lock poisoned").len()
    }
}

#[async_trait]
impl NetworkMonitor for InMemoryNetworkMonitor {
    async fn fetch_current_state(&self) -> Result<NetworkState, ProviderError> {
        if *self.failing.lock().expect("network lock poisoned") {
            return Err(ProviderError::Network("reachability probe failed".to_string()));
        }
        Ok(NetworkState {
            reachable: *self.reachable.lock().expect("network lock poisoned"),
        })
    }

    fn subscribe(&self, listener: mpsc::UnboundedSender<NetworkState>) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.listeners
            .lock()
            .expect("network lock poisoned")
            .insert(id, listener);
        id
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.listeners
            .lock()
            .expect("network lock poisoned")
            .remove(&id);
    }
}

/// Notice sink that logs each notice and keeps it for later inspection.
#[derive(Default)]
pub struct RecordingNoticeSink {
    notices: Mutex<Vec<String>>,
}

impl RecordingNoticeSink {
    pub fn notices(&self) -> Vec<String> {
        self.notices.lock().expect("notice lock poisoned").clone()
    }
}

impl NoticeSink for RecordingNoticeSink {
    fn notify(&self, message: &str) {
        info!("Notice: {}", message);
        self.notices
            .lock()
            .expect("notice lock poisoned")
            .push(message.to_string());
    }
}

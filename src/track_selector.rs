//! Write path: user taps on visible-queue rows.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::{
    collaborators::{EngineError, NoticeSink, PlaybackEngine},
    config::NoticeConfig,
    engine_state::{Operation, QueueStateHandle},
    source_classifier::SourceClassifier,
    track::{SourceType, Track},
};

/// What a selection did to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionOutcome {
    /// The row was the active track; transport toggled, queue untouched.
    Toggled { playing: bool },
    /// The track was already queued and the engine skipped to it.
    Skipped { index: usize },
    /// The track was inserted at the front of the engine queue.
    Injected,
    /// The engine queue was replaced by the selected track.
    Replaced,
    /// An engine call failed; the user has been notified.
    Failed,
    /// Another operation owned the engine; nothing was done.
    Rejected,
}

impl SelectionOutcome {
    pub fn succeeded(self) -> bool {
        !matches!(self, SelectionOutcome::Failed | SelectionOutcome::Rejected)
    }
}

/// Applies user selections to the playback engine.
#[derive(Clone)]
pub struct TrackSelector {
    engine: Arc<dyn PlaybackEngine>,
    notices: Arc<dyn NoticeSink>,
    notice_config: NoticeConfig,
    classifier: SourceClassifier,
    state: QueueStateHandle,
}

impl TrackSelector {
    pub fn new(
        engine: Arc<dyn PlaybackEngine>,
        notices: Arc<dyn NoticeSink>,
        notice_config: NoticeConfig,
        classifier: SourceClassifier,
        state: QueueStateHandle,
    ) -> Self {
        Self {
            engine,
            notices,
            notice_config,
            classifier,
            state,
        }
    }

    /// Plays or toggles `item`. Holds the operation lock for the whole call;
    /// engine failures are reported through the notice sink, never returned.
    pub async fn select_track(&self, item: &Track) -> SelectionOutcome {
        let _guard = match self.state.begin(Operation::Selecting) {
            Ok(guard) => guard,
            Err(err) => {
                debug!(
                    "TrackSelector: selection of {} rejected while {:?}",
                    item.id, err.from
                );
                return SelectionOutcome::Rejected;
            }
        };

        match self.apply_selection(item).await {
            Ok(outcome) => {
                debug!("TrackSelector: selected {} -> {:?}", item.id, outcome);
                outcome
            }
            Err(err) => {
                warn!("TrackSelector: failed to select {}: {}", item.id, err);
                if self.notice_config.enabled {
                    self.notices.notify(&self.notice_config.selection_failed);
                }
                SelectionOutcome::Failed
            }
        }
    }

    async fn apply_selection(&self, item: &Track) -> Result<SelectionOutcome, EngineError> {
        let active = self.engine.get_active_track().await?;
        if active.as_ref().is_some_and(|active| active.id == item.id) {
            let playing = !self.engine.get_playback_state().await?.is_playing();
            if playing {
                self.engine.play().await?;
            } else {
                self.engine.pause().await?;
            }
            return Ok(SelectionOutcome::Toggled { playing });
        }

        let engine_queue = self.engine.get_queue().await?;
        if let Some(index) = engine_queue.iter().position(|track| track.id == item.id) {
            self.engine.skip(index).await?;
            self.engine.play().await?;
            return Ok(SelectionOutcome::Skipped { index });
        }

        if !item.has_url() {
            info!(
                "TrackSelector: {} has no locator, replacing queue best-effort",
                item.id
            );
            self.replace_queue_with(item.clone()).await?;
            return Ok(SelectionOutcome::Replaced);
        }

        let source_type = self.intended_source_type(item, active.as_ref());
        let active_shares_source = active
            .as_ref()
            .is_some_and(|active| self.classifier.classify(active) == source_type);
        let injected = item.clone().with_source_type(source_type);

        if !engine_queue.is_empty() && active_shares_source {
            self.engine.add(vec![injected], Some(0)).await?;
            self.engine.skip(0).await?;
            self.engine.play().await?;
            Ok(SelectionOutcome::Injected)
        } else {
            self.replace_queue_with(injected).await?;
            Ok(SelectionOutcome::Replaced)
        }
    }

    /// Explicit tag, then locality hints, then the active track's class for
    /// continuity, then online.
    fn intended_source_type(&self, item: &Track, active: Option<&Track>) -> SourceType {
        if let Some(source_type) = item.source_type {
            return source_type;
        }
        if self.classifier.has_local_hint(item) {
            return SourceType::Download;
        }
        active
            .map(|active| self.classifier.classify(active))
            .unwrap_or(SourceType::Online)
    }

    async fn replace_queue_with(&self, track: Track) -> Result<(), EngineError> {
        self.engine.reset().await?;
        self.engine.add(vec![track], None).await?;
        self.engine.play().await
    }
}

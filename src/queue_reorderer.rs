//! Write path: drag-and-drop reordering of the visible queue.
//!
//! A drop rewrites the engine queue with a full reset-and-add rather than
//! in-place moves. Playback is paused around the rewrite and restored to the
//! same track and position afterwards.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::{
    collaborators::{EngineError, NoticeSink, PlaybackEngine},
    config::NoticeConfig,
    engine_state::{Operation, QueueStateHandle},
    queue::Queue,
    queue_synchronizer::QueueSynchronizer,
    source_classifier::SourceClassifier,
    track::{SourceType, Track},
};

/// Transport state captured right before the engine queue is rewritten.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub was_playing: bool,
    pub position_seconds: f64,
    pub current_track_id: Option<String>,
}

/// What a drop did to the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DragOutcome {
    /// Dropped where it started; the engine was not touched.
    Unchanged,
    Reordered,
    /// An engine call failed. The optimistic visible queue is kept until the
    /// next resync; the user has been notified.
    Failed,
    /// Another operation owned the engine; nothing was done.
    Rejected,
}

/// Computes the new physical engine order.
///
/// Slots holding tracks of `provenance` are refilled following
/// `visual_order`; tracks of that provenance missing from the visual list
/// follow in their engine order. Tracks of any other provenance keep their
/// slots. Visual entries that are not in the engine queue are ignored, so the
/// result is a permutation of a duplicate-free `engine_queue`. Duplicate
/// engine entries of the grouped provenance collapse into one, which
/// shortens the result.
pub fn reorder_engine_queue(
    classifier: &SourceClassifier,
    engine_queue: &[Track],
    provenance: SourceType,
    visual_order: &[Track],
) -> Vec<Track> {
    let is_grouped = |track: &Track| classifier.classify(track) == provenance;
    let grouped_by_id: HashMap<&str, &Track> = engine_queue
        .iter()
        .filter(|track| is_grouped(track))
        .map(|track| (track.id.as_str(), track))
        .collect();

    let mut seen: HashSet<&str> = HashSet::new();
    let mut grouped_order: Vec<Track> = Vec::with_capacity(grouped_by_id.len());
    for visual in visual_order {
        if let Some(track) = grouped_by_id.get(visual.id.as_str()) {
            if seen.insert(track.id.as_str()) {
                grouped_order.push((*track).clone());
            }
        }
    }
    for track in engine_queue.iter().filter(|track| is_grouped(track)) {
        if seen.insert(track.id.as_str()) {
            grouped_order.push(track.clone());
        }
    }

    let mut grouped_iter = grouped_order.into_iter();
    let reordered: Vec<Track> = engine_queue
        .iter()
        .filter_map(|track| {
            if is_grouped(track) {
                grouped_iter.next()
            } else {
                Some(track.clone())
            }
        })
        .collect();
    if reordered.len() != engine_queue.len() {
        warn!(
            "QueueReorderer: collapsed {} duplicate engine entries",
            engine_queue.len() - reordered.len()
        );
    }
    reordered
}

/// Handles drag start and drop for the visible queue.
#[derive(Clone)]
pub struct QueueReorderer {
    engine: Arc<dyn PlaybackEngine>,
    notices: Arc<dyn NoticeSink>,
    notice_config: NoticeConfig,
    classifier: SourceClassifier,
    state: QueueStateHandle,
    synchronizer: QueueSynchronizer,
}

impl QueueReorderer {
    pub fn new(
        engine: Arc<dyn PlaybackEngine>,
        notices: Arc<dyn NoticeSink>,
        notice_config: NoticeConfig,
        classifier: SourceClassifier,
        synchronizer: QueueSynchronizer,
    ) -> Self {
        Self {
            engine,
            notices,
            notice_config,
            classifier,
            state: synchronizer.state().clone(),
            synchronizer,
        }
    }

    /// Sets the dragging flag so engine events stop rebuilding the list
    /// under the user's finger.
    pub fn drag_start(&self) -> bool {
        match self.state.start_drag() {
            Ok(()) => {
                self.synchronizer.publish();
                true
            }
            Err(err) => {
                debug!("QueueReorderer: drag start ignored while {:?}", err.from);
                false
            }
        }
    }

    /// Applies a drop from `from` to `to`. `visual_order` is the list as the
    /// user sees it after the drop.
    pub async fn handle_drag_end(
        &self,
        from: usize,
        to: usize,
        visual_order: Vec<Track>,
    ) -> DragOutcome {
        if from == to {
            if self.state.cancel_drag() {
                self.synchronizer.publish();
            }
            return DragOutcome::Unchanged;
        }

        let guard = match self.state.begin(Operation::Reordering) {
            Ok(guard) => guard,
            Err(err) => {
                debug!("QueueReorderer: drop ignored while {:?}", err.from);
                return DragOutcome::Rejected;
            }
        };

        let visual = Queue::from_tracks(visual_order);
        self.state.set_visible_queue(visual.clone());
        self.synchronizer.publish();

        let outcome = match self.rewrite_engine_queue(visual.as_slice()).await {
            Ok(()) => {
                if let Some(rebuilt) = self.synchronizer.rebuild().await {
                    self.state.apply_rebuild(rebuilt);
                }
                info!("QueueReorderer: moved item {} -> {}", from, to);
                DragOutcome::Reordered
            }
            Err(err) => {
                warn!(
                    "QueueReorderer: reorder {} -> {} failed, keeping visible order until next resync: {}",
                    from, to, err
                );
                if self.notice_config.enabled {
                    self.notices.notify(&self.notice_config.reorder_failed);
                }
                DragOutcome::Failed
            }
        };

        drop(guard);
        self.synchronizer.publish();
        outcome
    }

    async fn rewrite_engine_queue(&self, visual: &[Track]) -> Result<(), EngineError> {
        let engine_queue = self.engine.get_queue().await?;
        if engine_queue.is_empty() {
            return Ok(());
        }
        let current_index = self.engine.get_current_index().await?;
        let active = current_index.and_then(|index| engine_queue.get(index));
        let provenance = active
            .or_else(|| visual.first())
            .map(|track| self.classifier.classify(track))
            .unwrap_or(SourceType::Online);

        let new_order = reorder_engine_queue(&self.classifier, &engine_queue, provenance, visual);
        let unchanged = new_order.len() == engine_queue.len()
            && new_order
                .iter()
                .zip(engine_queue.iter())
                .all(|(next, current)| next.id == current.id);
        if unchanged {
            debug!("QueueReorderer: engine order already matches, skipping rewrite");
            return Ok(());
        }

        let snapshot = self.capture_snapshot(active).await?;
        if snapshot.was_playing {
            self.engine.pause().await?;
        }

        self.engine.reset().await?;
        self.engine.add(new_order.clone(), None).await?;
        self.restore_playback(&snapshot, &new_order).await
    }

    async fn capture_snapshot(&self, active: Option<&Track>) -> Result<PlaybackSnapshot, EngineError> {
        let was_playing = self.engine.get_playback_state().await?.is_playing();
        let position_seconds = match self.engine.get_position().await {
            Ok(position) => position.max(0.0),
            Err(err) => {
                warn!("QueueReorderer: failed to read position, restarting track: {}", err);
                0.0
            }
        };
        Ok(PlaybackSnapshot {
            was_playing,
            position_seconds,
            current_track_id: active.map(|track| track.id.clone()),
        })
    }

    /// Skips back to the captured track, then seeks and resumes. Seek and
    /// resume failures are logged and do not abort each other.
    async fn restore_playback(
        &self,
        snapshot: &PlaybackSnapshot,
        new_order: &[Track],
    ) -> Result<(), EngineError> {
        let Some(track_id) = snapshot.current_track_id.as_deref() else {
            return Ok(());
        };
        let Some(index) = new_order.iter().position(|track| track.id == track_id) else {
            warn!("QueueReorderer: active track {} missing after reorder", track_id);
            return Ok(());
        };
        self.engine.skip(index).await?;

        if snapshot.position_seconds > 0.0 {
            if let Err(err) = self.engine.seek_to(snapshot.position_seconds).await {
                warn!("QueueReorderer: failed to restore position: {}", err);
            }
        }
        if snapshot.was_playing {
            if let Err(err) = self.engine.play().await {
                warn!("QueueReorderer: failed to resume playback: {}", err);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::broadcast;

    use super::{reorder_engine_queue, DragOutcome, QueueReorderer};
    use crate::{
        collaborators::PlaybackState,
        config::NoticeConfig,
        engine_state::{Operation, QueueStateHandle},
        in_memory::{EngineCall, EngineOp, InMemoryLibrary, InMemoryPlaybackEngine, RecordingNoticeSink},
        queue_filter::QueueFilter,
        queue_synchronizer::QueueSynchronizer,
        source_classifier::SourceClassifier,
        track::{SourceType, Track},
    };

    struct ReordererHarness {
        engine: Arc<InMemoryPlaybackEngine>,
        notices: Arc<RecordingNoticeSink>,
        state: QueueStateHandle,
        reorderer: QueueReorderer,
    }

    impl ReordererHarness {
        fn new(queue: Vec<Track>) -> Self {
            let engine = Arc::new(InMemoryPlaybackEngine::with_queue(queue));
            let notices = Arc::new(RecordingNoticeSink::default());
            let state = QueueStateHandle::new();
            let (bus_sender, _) = broadcast::channel(64);
            let filter = QueueFilter::new(
                SourceClassifier::default(),
                engine.clone(),
                Arc::new(InMemoryLibrary::new(vec![])),
            );
            let synchronizer =
                QueueSynchronizer::new(engine.clone(), filter, state.clone(), bus_sender);
            let reorderer = QueueReorderer::new(
                engine.clone(),
                notices.clone(),
                NoticeConfig::default(),
                SourceClassifier::default(),
                synchronizer,
            );
            Self {
                engine,
                notices,
                state,
                reorderer,
            }
        }
    }

    fn online(id: &str) -> Track {
        Track::new(id, format!("https://cdn.example.com/{id}.mp3"))
    }

    fn downloaded(id: &str) -> Track {
        online(id).downloaded_at(format!("/data/user/0/app/files/{id}.mp3"))
    }

    fn tracks(ids: &[&str]) -> Vec<Track> {
        ids.iter().map(|id| online(id)).collect()
    }

    fn ids(tracks: &[Track]) -> Vec<String> {
        tracks.iter().map(|track| track.id.clone()).collect()
    }

    #[test]
    fn test_reorder_keeps_other_provenance_in_place() {
        let engine = vec![
            online("A"),
            downloaded("D1"),
            online("B"),
            online("C"),
            downloaded("D2"),
        ];
        let visual = tracks(&["C", "A", "B"]);

        let reordered = reorder_engine_queue(
            &SourceClassifier::default(),
            &engine,
            SourceType::Online,
            &visual,
        );

        assert_eq!(ids(&reordered), vec!["C", "D1", "A", "B", "D2"]);
    }

    #[test]
    fn test_reorder_with_partial_visual_list_is_a_permutation() {
        let engine = vec![online("A"), online("B"), online("C"), downloaded("D")];
        let visual = vec![online("C"), online("Z"), downloaded("D"), online("C")];

        let reordered = reorder_engine_queue(
            &SourceClassifier::default(),
            &engine,
            SourceType::Online,
            &visual,
        );

        assert_eq!(ids(&reordered), vec!["C", "A", "B", "D"]);
        let mut sorted = ids(&reordered);
        sorted.sort();
        assert_eq!(sorted, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn test_reorder_collapses_duplicate_engine_entries() {
        let engine = tracks(&["A", "B", "A", "C"]);
        let visual = tracks(&["C", "B", "A"]);

        let reordered = reorder_engine_queue(
            &SourceClassifier::default(),
            &engine,
            SourceType::Online,
            &visual,
        );

        assert_eq!(ids(&reordered), vec!["C", "B", "A"]);
    }

    #[tokio::test]
    async fn test_same_index_drop_is_a_no_op() {
        let harness = ReordererHarness::new(tracks(&["A", "B", "C"]));
        assert!(harness.reorderer.drag_start());
        assert!(harness.state.view().is_dragging);

        let outcome = harness
            .reorderer
            .handle_drag_end(2, 2, tracks(&["C", "B", "A"]))
            .await;

        assert_eq!(outcome, DragOutcome::Unchanged);
        assert!(harness.engine.calls().is_empty());
        assert!(!harness.state.view().is_dragging);
        assert_eq!(harness.state.operation(), Operation::Idle);
    }

    #[tokio::test]
    async fn test_drop_restores_active_track_position_and_playback() {
        let harness = ReordererHarness::new(tracks(&["A", "B", "C", "D"]));
        harness.engine.set_active(1, PlaybackState::Playing, 42.5);
        assert!(harness.reorderer.drag_start());

        let outcome = harness
            .reorderer
            .handle_drag_end(2, 1, tracks(&["B", "C", "A", "D"]))
            .await;

        assert_eq!(outcome, DragOutcome::Reordered);
        assert_eq!(harness.engine.queue_ids(), vec!["B", "C", "A", "D"]);
        assert_eq!(harness.engine.active_id().as_deref(), Some("B"));
        assert!((harness.engine.position() - 42.5).abs() < 0.01);
        assert_eq!(harness.engine.state(), PlaybackState::Playing);

        let mutations = harness.engine.mutation_calls();
        assert_eq!(mutations.first(), Some(&EngineCall::Pause));
        assert!(mutations.contains(&EngineCall::Reset));
        assert!(mutations.contains(&EngineCall::Skip(0)));
        assert!(mutations
            .iter()
            .any(|call| matches!(call, EngineCall::SeekTo(t) if (t - 42.5).abs() < 0.01)));
        assert_eq!(mutations.last(), Some(&EngineCall::Play));

        let view = harness.state.view();
        assert!(!view.is_dragging);
        assert_eq!(harness.state.visible_ids(), vec!["B", "C", "A", "D"]);
        assert_eq!(view.current_index, Some(0));
    }

    #[tokio::test]
    async fn test_drop_while_paused_does_not_resume() {
        let harness = ReordererHarness::new(tracks(&["A", "B", "C"]));
        harness.engine.set_active(0, PlaybackState::Paused, 0.0);

        let outcome = harness
            .reorderer
            .handle_drag_end(2, 1, tracks(&["A", "C", "B"]))
            .await;

        assert_eq!(outcome, DragOutcome::Reordered);
        let mutations = harness.engine.mutation_calls();
        assert!(!mutations.contains(&EngineCall::Pause));
        assert!(!mutations.contains(&EngineCall::Play));
        assert!(!mutations
            .iter()
            .any(|call| matches!(call, EngineCall::SeekTo(_))));
        assert_eq!(harness.engine.state(), PlaybackState::Ready);
    }

    #[tokio::test]
    async fn test_seek_failure_does_not_prevent_resume() {
        let harness = ReordererHarness::new(tracks(&["A", "B", "C"]));
        harness.engine.set_active(0, PlaybackState::Playing, 10.0);
        harness.engine.fail_next(EngineOp::SeekTo);

        let outcome = harness
            .reorderer
            .handle_drag_end(0, 2, tracks(&["B", "C", "A"]))
            .await;

        assert_eq!(outcome, DragOutcome::Reordered);
        assert_eq!(harness.engine.active_id().as_deref(), Some("A"));
        assert_eq!(harness.engine.state(), PlaybackState::Playing);
        assert!(harness.notices.notices().is_empty());
    }

    #[tokio::test]
    async fn test_failed_rewrite_keeps_optimistic_order_and_notifies() {
        let harness = ReordererHarness::new(tracks(&["A", "B", "C"]));
        harness.engine.set_active(0, PlaybackState::Playing, 3.0);
        harness.engine.fail_next(EngineOp::Reset);
        harness.reorderer.drag_start();

        let outcome = harness
            .reorderer
            .handle_drag_end(2, 1, tracks(&["A", "C", "B", "C"]))
            .await;

        assert_eq!(outcome, DragOutcome::Failed);
        assert_eq!(harness.state.visible_ids(), vec!["A", "C", "B"]);
        assert_eq!(harness.engine.queue_ids(), vec!["A", "B", "C"]);
        assert_eq!(
            harness.notices.notices(),
            vec![NoticeConfig::default().reorder_failed]
        );
        assert_eq!(harness.state.operation(), Operation::Idle);
        assert!(!harness.state.view().is_dragging);
    }

    #[tokio::test]
    async fn test_drop_matching_engine_order_skips_rewrite() {
        let harness = ReordererHarness::new(vec![online("A"), downloaded("D1"), downloaded("D2")]);
        harness.engine.set_active(0, PlaybackState::Playing, 8.0);

        let outcome = harness
            .reorderer
            .handle_drag_end(1, 0, vec![online("A"), downloaded("D2"), downloaded("D1")])
            .await;

        assert_eq!(outcome, DragOutcome::Reordered);
        assert!(harness.engine.mutation_calls().is_empty());
        assert_eq!(harness.engine.queue_ids(), vec!["A", "D1", "D2"]);
    }

    #[tokio::test]
    async fn test_drop_rejected_while_selection_holds_lock() {
        let harness = ReordererHarness::new(tracks(&["A", "B"]));
        let _selection = harness
            .state
            .begin(Operation::Selecting)
            .expect("idle -> selecting");

        let outcome = harness
            .reorderer
            .handle_drag_end(0, 1, tracks(&["B", "A"]))
            .await;

        assert_eq!(outcome, DragOutcome::Rejected);
        assert!(harness.engine.calls().is_empty());
    }
}

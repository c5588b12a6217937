//! Visible-queue construction.
//!
//! The visible queue shows only tracks that share the anchor's provenance,
//! anchor first. When the device is offline and the anchor is a streamed
//! track, the downloaded library is shown instead so the user still has
//! something playable.

use std::collections::HashSet;
use std::sync::Arc;

use log::warn;

use crate::{
    collaborators::{DownloadedLibrary, PlaybackEngine},
    queue::Queue,
    source_classifier::SourceClassifier,
    track::{SourceType, Track},
};

/// Builds the visible queue for `anchor` from already-fetched inputs.
pub fn build_visible_queue(
    classifier: &SourceClassifier,
    anchor: Option<&Track>,
    engine_queue: &[Track],
    downloaded_library: &[Track],
    is_offline: bool,
) -> Queue {
    let Some(anchor) = anchor else {
        return Queue::new();
    };

    let candidates: Vec<Track> = match classifier.classify(anchor) {
        SourceType::MyMusic => engine_queue
            .iter()
            .filter(|track| classifier.classify(track) == SourceType::MyMusic)
            .cloned()
            .collect(),
        SourceType::Download => {
            // Library entries count as downloads even when tagged otherwise.
            let library_ids: HashSet<&str> =
                downloaded_library.iter().map(|track| track.id.as_str()).collect();
            engine_queue
                .iter()
                .filter(|track| {
                    classifier.classify(track) == SourceType::Download
                        || library_ids.contains(track.id.as_str())
                })
                .chain(downloaded_library.iter())
                .cloned()
                .collect()
        }
        SourceType::Online if is_offline => downloaded_library.to_vec(),
        SourceType::Online => engine_queue
            .iter()
            .filter(|track| {
                !matches!(
                    classifier.classify(track),
                    SourceType::Download | SourceType::MyMusic
                )
            })
            .cloned()
            .collect(),
    };

    let mut visible = Queue::from_tracks(candidates);
    visible.ensure_front(anchor);
    visible
}

/// Fetches the inputs of [`build_visible_queue`] from the collaborators.
#[derive(Clone)]
pub struct QueueFilter {
    classifier: SourceClassifier,
    engine: Arc<dyn PlaybackEngine>,
    library: Arc<dyn DownloadedLibrary>,
}

impl QueueFilter {
    pub fn new(
        classifier: SourceClassifier,
        engine: Arc<dyn PlaybackEngine>,
        library: Arc<dyn DownloadedLibrary>,
    ) -> Self {
        Self {
            classifier,
            engine,
            library,
        }
    }

    pub fn classifier(&self) -> &SourceClassifier {
        &self.classifier
    }

    /// Resolves the visible queue for `anchor`. Any data-source failure
    /// degrades to `[anchor]` (or an empty queue without an anchor).
    pub async fn resolve(&self, anchor: Option<&Track>, is_offline: bool) -> Queue {
        let Some(anchor_track) = anchor else {
            return Queue::new();
        };

        let engine_queue = match self.engine.get_queue().await {
            Ok(tracks) => tracks,
            Err(err) => {
                warn!("QueueFilter: failed to read engine queue: {}", err);
                return Queue::from_tracks([anchor_track.clone()]);
            }
        };

        let needs_library = match self.classifier.classify(anchor_track) {
            SourceType::Download => true,
            SourceType::Online => is_offline,
            SourceType::MyMusic => false,
        };
        let downloaded = if needs_library {
            match self.library.get_all_downloaded_tracks().await {
                Ok(tracks) => tracks,
                Err(err) => {
                    warn!("QueueFilter: failed to read downloaded library: {}", err);
                    return Queue::from_tracks([anchor_track.clone()]);
                }
            }
        } else {
            Vec::new()
        };

        build_visible_queue(
            &self.classifier,
            anchor,
            &engine_queue,
            &downloaded,
            is_offline,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::{build_visible_queue, QueueFilter};
    use crate::{
        in_memory::{EngineOp, InMemoryLibrary, InMemoryPlaybackEngine},
        source_classifier::SourceClassifier,
        track::{SourceType, Track},
    };

    fn online(id: &str) -> Track {
        Track::new(id, format!("https://cdn.example.com/{id}.mp3"))
    }

    fn downloaded(id: &str) -> Track {
        Track::new(id, format!("https://cdn.example.com/{id}.mp3"))
            .downloaded_at(format!("/data/user/0/app/files/{id}.mp3"))
    }

    fn mymusic(id: &str) -> Track {
        Track::new(id, format!("content://media/external/audio/{id}"))
            .with_source_type(SourceType::MyMusic)
    }

    fn ids(queue: &crate::queue::Queue) -> Vec<String> {
        queue.ids()
    }

    fn build(anchor: &Track, engine: &[Track], library: &[Track], offline: bool) -> Vec<String> {
        ids(&build_visible_queue(
            &SourceClassifier::default(),
            Some(anchor),
            engine,
            library,
            offline,
        ))
    }

    #[test]
    fn test_online_anchor_moves_to_front_and_excludes_downloads() {
        let engine = vec![online("A"), online("B"), downloaded("C")];
        assert_eq!(build(&online("B"), &engine, &[], false), vec!["B", "A"]);
    }

    #[test]
    fn test_online_anchor_offline_falls_back_to_library() {
        let engine = vec![online("A"), online("B"), downloaded("C")];
        let library = vec![downloaded("C"), downloaded("D")];
        assert_eq!(
            build(&online("B"), &engine, &library, true),
            vec!["B", "C", "D"]
        );
    }

    #[test]
    fn test_offline_fallback_ignores_engine_queue_contents() {
        let library = vec![downloaded("X"), online("B"), downloaded("Y")];
        let expected = vec!["B", "X", "Y"];
        assert_eq!(build(&online("B"), &[], &library, true), expected);
        assert_eq!(
            build(
                &online("B"),
                &[online("Q"), mymusic("R"), downloaded("S")],
                &library,
                true
            ),
            expected
        );
    }

    #[test]
    fn test_offline_with_empty_library_yields_anchor_only() {
        let engine = vec![online("A"), online("B")];
        assert_eq!(build(&online("B"), &engine, &[], true), vec!["B"]);
    }

    #[test]
    fn test_online_anchor_with_empty_engine_queue_yields_anchor_only() {
        assert_eq!(build(&online("B"), &[], &[downloaded("C")], false), vec!["B"]);
    }

    #[test]
    fn test_online_anchor_absent_from_subset_is_prepended() {
        let engine = vec![online("A"), online("C")];
        assert_eq!(build(&online("B"), &engine, &[], false), vec!["B", "A", "C"]);
    }

    #[test]
    fn test_online_subset_empty_yields_anchor_only() {
        let engine = vec![downloaded("C"), mymusic("M")];
        assert_eq!(build(&online("B"), &engine, &[], false), vec!["B"]);
    }

    #[test]
    fn test_mymusic_anchor_keeps_engine_order_of_library_tracks() {
        let engine = vec![mymusic("M1"), online("A"), mymusic("M2"), mymusic("M3")];
        assert_eq!(
            build(&mymusic("M2"), &engine, &[downloaded("D")], false),
            vec!["M2", "M1", "M3"]
        );
        assert_eq!(build(&mymusic("M9"), &[online("A")], &[], false), vec!["M9"]);
    }

    #[test]
    fn test_download_anchor_unions_engine_downloads_and_library() {
        let engine = vec![downloaded("D1"), online("A"), downloaded("D2")];
        let library = vec![downloaded("D3"), downloaded("D1")];
        assert_eq!(
            build(&downloaded("D2"), &engine, &library, false),
            vec!["D2", "D1", "D3"]
        );
        assert_eq!(build(&downloaded("D9"), &[online("A")], &[], false), vec!["D9"]);
    }

    #[test]
    fn test_output_is_unique_and_anchor_first_for_duplicate_heavy_input() {
        let engine = vec![
            online("A"),
            online("B"),
            online("A"),
            online("C"),
            online("B"),
        ];
        let output = build(&online("C"), &engine, &[], false);
        assert_eq!(output, vec!["C", "A", "B"]);
    }

    #[test]
    fn test_filter_is_idempotent_on_its_own_output() {
        let classifier = SourceClassifier::default();
        let library = vec![
            downloaded("D3"),
            downloaded("D1"),
            online("X")
                .with_source_type(SourceType::Online)
                .downloaded_at("/data/user/0/app/files/X.mp3"),
        ];
        let engine = vec![
            online("A"),
            downloaded("D1"),
            online("B"),
            mymusic("M1"),
            downloaded("D2"),
            mymusic("M2"),
        ];
        for (anchor, offline) in [
            (online("B"), false),
            (online("B"), true),
            (downloaded("D2"), false),
            (mymusic("M2"), false),
        ] {
            let first =
                build_visible_queue(&classifier, Some(&anchor), &engine, &library, offline);
            let second = build_visible_queue(
                &classifier,
                Some(&anchor),
                first.as_slice(),
                &library,
                offline,
            );
            assert_eq!(first, second, "anchor {} offline {}", anchor.id, offline);
        }
    }

    #[test]
    fn test_download_anchor_keeps_tagged_library_entries_stable() {
        let tagged = online("X")
            .with_source_type(SourceType::Online)
            .downloaded_at("/data/user/0/app/files/X.mp3");
        let library = vec![tagged, downloaded("D2")];
        let anchor = downloaded("D1");

        let first = build(&anchor, &[downloaded("D1")], &library, false);
        assert_eq!(first, vec!["D1", "X", "D2"]);

        let first_tracks = vec![anchor.clone(), library[0].clone(), library[1].clone()];
        let second = build(&anchor, &first_tracks, &library, false);
        assert_eq!(second, first);
    }

    #[test]
    fn test_no_anchor_yields_empty_queue() {
        let queue = build_visible_queue(
            &SourceClassifier::default(),
            None,
            &[online("A")],
            &[downloaded("D")],
            true,
        );
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_degrades_to_anchor_when_engine_queue_fails() {
        let engine = Arc::new(InMemoryPlaybackEngine::with_queue(vec![
            online("A"),
            online("B"),
        ]));
        engine.fail_next(EngineOp::GetQueue);
        let filter = QueueFilter::new(
            SourceClassifier::default(),
            engine,
            Arc::new(InMemoryLibrary::new(vec![])),
        );

        let queue = filter.resolve(Some(&online("B")), false).await;
        assert_eq!(queue.ids(), vec!["B"]);
        assert!(filter.resolve(None, false).await.is_empty());
    }

    #[tokio::test]
    async fn test_resolve_degrades_to_anchor_when_library_fails() {
        let engine = Arc::new(InMemoryPlaybackEngine::with_queue(vec![
            downloaded("D1"),
            downloaded("D2"),
        ]));
        let library = Arc::new(InMemoryLibrary::new(vec![downloaded("D3")]));
        library.set_failing(true);
        let filter = QueueFilter::new(SourceClassifier::default(), engine, library);

        let queue = filter.resolve(Some(&downloaded("D2")), false).await;
        assert_eq!(queue.ids(), vec!["D2"]);
    }

    #[tokio::test]
    async fn test_resolve_skips_library_for_reachable_online_anchor() {
        let engine = Arc::new(InMemoryPlaybackEngine::with_queue(vec![
            online("A"),
            online("B"),
        ]));
        let library = Arc::new(InMemoryLibrary::new(vec![downloaded("D")]));
        library.set_failing(true);
        let filter = QueueFilter::new(SourceClassifier::default(), engine, library);

        let queue = filter.resolve(Some(&online("A")), false).await;
        assert_eq!(queue.ids(), vec!["A", "B"]);
    }
}

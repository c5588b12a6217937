//! Playback queue synchronization for a mobile music player.
//!
//! The playback engine owns the authoritative queue. A [`session::QueueSession`]
//! keeps a provenance-filtered visible queue in step with it, and turns user
//! taps and drag-and-drop gestures into engine mutations.

pub mod collaborators;
pub mod config;
pub mod config_persistence;
pub mod engine_state;
pub mod in_memory;
pub mod protocol;
pub mod queue;
pub mod queue_filter;
pub mod queue_manager;
pub mod queue_reorderer;
pub mod queue_synchronizer;
pub mod session;
pub mod source_classifier;
pub mod track;
pub mod track_selector;

pub use engine_state::QueueView;
pub use session::{spawn_queue_session, QueueSession, QueueSessionConfig};
pub use track::{SourceType, Track};

//! Session-owned queue state and the operation state machine.
//!
//! One `QueueEngineState` exists per playback session. It mirrors the visible
//! queue shown to the user and tracks which operation, if any, currently owns
//! the engine. Read-path resyncs only run from `Idle`; write-path operations
//! may preempt a resync, which then discards its result.

use std::sync::{Arc, Mutex, MutexGuard};

use log::debug;
use thiserror::Error;

use crate::{queue::Queue, track::Track};

/// Operation currently owning the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Idle,
    Selecting,  // User tapped a row
    Dragging,   // Drag gesture started, not yet dropped
    Reordering, // Drop received, engine queue being rewritten
    Resyncing,  // Visible queue being rebuilt from the engine
}

impl Operation {
    /// Legal transitions other than release to `Idle`, which only the owning
    /// guard performs.
    pub fn can_transition_to(self, next: Operation) -> bool {
        use Operation::*;
        match (self, next) {
            (Idle, Selecting | Dragging | Reordering | Resyncing) => true,
            (Resyncing, Selecting | Dragging | Reordering) => true,
            (Dragging, Reordering | Idle) => true,
            _ => false,
        }
    }

    /// Selection and reorder hold the operation lock.
    pub fn holds_lock(self) -> bool {
        matches!(self, Operation::Selecting | Operation::Reordering)
    }

    pub fn is_dragging(self) -> bool {
        matches!(self, Operation::Dragging | Operation::Reordering)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("illegal queue operation transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: Operation,
    pub to: Operation,
}

/// Observable queue state published to the UI.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueView {
    pub visible_queue: Vec<Track>,
    pub current_index: Option<usize>,
    pub is_local_source: bool,
    pub is_dragging: bool,
    pub is_offline: bool,
}

/// Result of rebuilding the visible queue from engine state.
#[derive(Debug, Clone, PartialEq)]
pub struct RebuiltQueue {
    pub visible_queue: Queue,
    pub current_index: Option<usize>,
    pub is_local_source: bool,
}

/// Mutable state of one playback session.
#[derive(Debug)]
pub struct QueueEngineState {
    visible_queue: Queue,
    current_index: Option<usize>,
    is_local_source: bool,
    is_offline: bool,
    operation: Operation,
    generation: u64,
}

impl Default for QueueEngineState {
    fn default() -> Self {
        Self {
            visible_queue: Queue::new(),
            current_index: None,
            is_local_source: false,
            is_offline: false,
            operation: Operation::Idle,
            generation: 0,
        }
    }
}

impl QueueEngineState {
    fn view(&self) -> QueueView {
        QueueView {
            visible_queue: self.visible_queue.as_slice().to_vec(),
            current_index: self.current_index,
            is_local_source: self.is_local_source,
            is_dragging: self.operation.is_dragging(),
            is_offline: self.is_offline,
        }
    }

    fn enter(&mut self, next: Operation) -> Result<u64, TransitionError> {
        if !self.operation.can_transition_to(next) || next == Operation::Idle {
            return Err(TransitionError {
                from: self.operation,
                to: next,
            });
        }
        self.operation = next;
        self.generation += 1;
        Ok(self.generation)
    }

    fn apply_rebuild(&mut self, rebuilt: RebuiltQueue) {
        self.visible_queue = rebuilt.visible_queue;
        self.current_index = rebuilt.current_index;
        self.is_local_source = rebuilt.is_local_source;
    }
}

/// Shared handle to a session's [`QueueEngineState`].
///
/// The lock is never held across an await point.
#[derive(Debug, Clone, Default)]
pub struct QueueStateHandle {
    inner: Arc<Mutex<QueueEngineState>>,
}

impl QueueStateHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, QueueEngineState> {
        self.inner.lock().expect("queue state lock poisoned")
    }

    pub fn view(&self) -> QueueView {
        self.lock().view()
    }

    pub fn operation(&self) -> Operation {
        self.lock().operation
    }

    pub fn is_offline(&self) -> bool {
        self.lock().is_offline
    }

    pub fn set_offline(&self, is_offline: bool) {
        self.lock().is_offline = is_offline;
    }

    pub fn visible_ids(&self) -> Vec<String> {
        self.lock().visible_queue.ids()
    }

    /// Enters `operation` and returns a guard that releases it on drop.
    pub fn begin(&self, operation: Operation) -> Result<OperationGuard, TransitionError> {
        let generation = self.lock().enter(operation)?;
        debug!("Queue operation started: {:?}", operation);
        Ok(OperationGuard {
            state: self.clone(),
            operation,
            generation,
        })
    }

    /// Marks a drag gesture as started. The flag is cleared by the drop
    /// operation or by [`QueueStateHandle::cancel_drag`].
    pub fn start_drag(&self) -> Result<(), TransitionError> {
        self.lock().enter(Operation::Dragging).map(|_| ())
    }

    /// Clears the dragging flag when no drop operation took it over.
    pub fn cancel_drag(&self) -> bool {
        let mut state = self.lock();
        if state.operation == Operation::Dragging {
            state.operation = Operation::Idle;
            state.generation += 1;
            true
        } else {
            false
        }
    }

    /// Replaces the visible queue without touching index or provenance.
    pub fn set_visible_queue(&self, visible_queue: Queue) {
        self.lock().visible_queue = visible_queue;
    }

    /// Stores a rebuild unconditionally. Used by operations that already
    /// own the engine.
    pub fn apply_rebuild(&self, rebuilt: RebuiltQueue) {
        self.lock().apply_rebuild(rebuilt);
    }

    /// Stores a resync result only if `guard` still owns the state.
    /// Returns false when a user operation preempted the resync.
    pub fn commit_resync(&self, guard: &OperationGuard, rebuilt: RebuiltQueue) -> bool {
        let mut state = self.lock();
        if state.operation != guard.operation || state.generation != guard.generation {
            return false;
        }
        state.apply_rebuild(rebuilt);
        true
    }

    fn release(&self, operation: Operation, generation: u64) {
        let mut state = self.lock();
        if state.operation == operation && state.generation == generation {
            state.operation = Operation::Idle;
            debug!("Queue operation finished: {:?}", operation);
        }
    }
}

/// Ownership of the current operation. Dropping it returns the state to
/// `Idle` unless another operation has taken over since.
#[derive(Debug)]
pub struct OperationGuard {
    state: QueueStateHandle,
    operation: Operation,
    generation: u64,
}

impl OperationGuard {
    pub fn operation(&self) -> Operation {
        self.operation
    }
}

impl Drop for OperationGuard {
    fn drop(&mut self) {
        self.state.release(self.operation, self.generation);
    }
}

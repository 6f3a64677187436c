//! Creation attempt state

use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;

/// Where a creation attempt is
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CreationState {
    #[default]
    Pristine,
    /// The user committed a selection; the cache write has not happened yet
    Running,
    /// The annotation is in the cache (persistence may still be pending)
    Success,
    /// Anchoring failed, or persistence failed and the entry was rolled back
    Error,
}

/// Publishes state transitions to any number of watchers
#[derive(Debug, Clone)]
pub(crate) struct CreationStateCell {
    tx: Arc<watch::Sender<CreationState>>,
}

impl CreationStateCell {
    pub(crate) fn new() -> Self {
        let (tx, _) = watch::channel(CreationState::Pristine);
        Self { tx: Arc::new(tx) }
    }

    pub(crate) fn set(&self, state: CreationState) {
        self.tx.send_replace(state);
    }

    pub(crate) fn get(&self) -> CreationState {
        *self.tx.borrow()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<CreationState> {
        self.tx.subscribe()
    }
}

/// The pipeline-wide view: mirrors whichever attempt started last
#[derive(Debug, Clone)]
pub(crate) struct CreationTracker {
    latest_cell: CreationStateCell,
    /// Id of the newest attempt; held while publishing to `latest_cell`
    latest: Arc<Mutex<u64>>,
}

impl CreationTracker {
    pub(crate) fn new() -> Self {
        Self {
            latest_cell: CreationStateCell::new(),
            latest: Arc::new(Mutex::new(0)),
        }
    }

    /// Start an attempt; it becomes the latest
    pub(crate) fn begin(&self) -> CreationAttempt {
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        *latest += 1;
        let attempt = CreationAttempt {
            id: *latest,
            own: CreationStateCell::new(),
            tracker: self.clone(),
        };
        attempt.own.set(CreationState::Running);
        self.latest_cell.set(CreationState::Running);
        attempt
    }

    pub(crate) fn get(&self) -> CreationState {
        self.latest_cell.get()
    }

    pub(crate) fn watch(&self) -> watch::Receiver<CreationState> {
        self.latest_cell.watch()
    }
}

/// One creation attempt's state.
///
/// Transitions always reach the attempt's own watchers. They reach the
/// pipeline-wide view only while no newer attempt has started.
#[derive(Debug, Clone)]
pub(crate) struct CreationAttempt {
    id: u64,
    own: CreationStateCell,
    tracker: CreationTracker,
}

impl CreationAttempt {
    pub(crate) fn set(&self, state: CreationState) {
        self.own.set(state);
        let latest = self.tracker.latest.lock().unwrap_or_else(PoisonError::into_inner);
        if *latest == self.id {
            self.tracker.latest_cell.set(state);
        }
    }

    pub(crate) fn watch(&self) -> watch::Receiver<CreationState> {
        self.own.watch()
    }
}

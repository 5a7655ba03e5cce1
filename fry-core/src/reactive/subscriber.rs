//! Identifiers and bookkeeping shared by every reactive node.
//!
//! A *source* is anything that can be read and remembers who read it
//! (signals, computeds). A *sink* is anything that reads sources and re-runs
//! when they change (effects, computeds). Each side gets its own id space.
//!
//! The run-state machine of a sink (`active`, `pending_dispose`, `disposed`
//! and the dependency set) lives in [`SinkCore`], which effects and computeds
//! both embed.

use std::fmt;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::trace;

use super::runtime::{Sink, Source};

/// Unique identifier for a sink.
///
/// Each sink (effect or computed) gets a unique ID when created. This ID is
/// the key of every subscriber set it appears in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across threads.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sink#{}", self.0)
    }
}

/// Unique identifier for a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    /// Generate a new unique source ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "source#{}", self.0)
    }
}

/// What kind of sink a subscriber is. Carried in failure reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    Effect,
    Computed,
}

impl fmt::Display for SinkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SinkKind::Effect => f.write_str("effect"),
            SinkKind::Computed => f.write_str("computed"),
        }
    }
}

/// Sinks subscribed to one source, in subscription order.
///
/// Sources hold their sinks strongly: an effect stays alive for as long as
/// something it reads is alive, until it is disposed.
pub(crate) type SubscriberSet = IndexMap<SubscriberId, Arc<dyn Sink>>;

/// Sources one sink read during its latest run.
///
/// Held weakly; a source going away just means there is nothing to unsubscribe from.
pub(crate) type Dependencies = IndexMap<SourceId, Weak<dyn Source>>;

/// Remove `sink` from the subscriber set of every source in `dependencies`.
pub(crate) fn sever(sink: SubscriberId, dependencies: Dependencies) {
    for source in dependencies.into_values() {
        if let Some(source) = source.upgrade() {
            source.remove_subscriber(sink);
            trace!(source = %source.source_id(), %sink, "edge removed");
        }
    }
}

#[derive(Default)]
struct SinkState {
    /// The body is currently executing.
    active: bool,
    /// `dispose` arrived while active; performed once the run ends.
    pending_dispose: bool,
    /// Terminal.
    disposed: bool,
    dependencies: Dependencies,
}

/// Run-state machine shared by effects and computeds.
///
/// ```text
/// fresh/idle --begin_run--> running --finish_run--> idle
/// fresh/idle --dispose----> disposed
/// running    --dispose----> running (pending) --finish_run--> disposed
/// ```
pub(crate) struct SinkCore {
    id: SubscriberId,
    state: Mutex<SinkState>,
}

impl SinkCore {
    pub(crate) fn new() -> Self {
        Self {
            id: SubscriberId::new(),
            state: Mutex::new(SinkState::default()),
        }
    }

    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    /// Enter the running state.
    ///
    /// Returns the dependencies of the previous run, or `None` when the sink
    /// is already running or disposed (the run must be skipped).
    pub(crate) fn begin_run(&self) -> Option<Dependencies> {
        let mut state = self.state.lock();
        if state.active || state.disposed {
            return None;
        }
        state.active = true;
        Some(mem::take(&mut state.dependencies))
    }

    /// Leave the running state.
    ///
    /// Sources read by the previous run but not by this one drop their edge
    /// to this sink. Returns whether a disposal was requested mid-run.
    pub(crate) fn finish_run(&self, previous: Dependencies) -> bool {
        let (stale, pending_dispose) = {
            let mut state = self.state.lock();
            state.active = false;
            let stale: Dependencies = previous
                .into_iter()
                .filter(|(id, _)| !state.dependencies.contains_key(id))
                .collect();
            (stale, state.pending_dispose)
        };
        sever(self.id, stale);
        pending_dispose
    }

    /// Transition towards `disposed`.
    ///
    /// Returns the dependencies to sever when the sink is disposed right now.
    /// Returns `None` when it was already disposed, or when it is running and
    /// the disposal has been deferred to the end of the run.
    pub(crate) fn dispose(&self) -> Option<Dependencies> {
        let mut state = self.state.lock();
        if state.disposed {
            return None;
        }
        if state.active {
            state.pending_dispose = true;
            return None;
        }
        state.pending_dispose = false;
        state.disposed = true;
        Some(mem::take(&mut state.dependencies))
    }

    pub(crate) fn add_dependency(&self, id: SourceId, source: Weak<dyn Source>) {
        self.state.lock().dependencies.entry(id).or_insert(source);
    }

    pub(crate) fn remove_dependency(&self, id: SourceId) {
        self.state.lock().dependencies.shift_remove(&id);
    }

    pub(crate) fn is_active(&self) -> bool {
        self.state.lock().active
    }

    pub(crate) fn is_disposed(&self) -> bool {
        self.state.lock().disposed
    }

    pub(crate) fn dependency_count(&self) -> usize {
        self.state.lock().dependencies.len()
    }

    pub(crate) fn depends_on(&self, id: SourceId) -> bool {
        self.state.lock().dependencies.contains_key(&id)
    }
}

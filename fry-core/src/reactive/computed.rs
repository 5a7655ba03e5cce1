//! Computed Implementation
//!
//! A Computed is a derived value. It is a sink of whatever its derivation
//! reads and a source for whoever reads it.
//!
//! # How Computeds Work
//!
//! 1. Nothing runs at creation. The derivation first runs on the first read
//!    or when an upstream write re-runs the computed.
//!
//! 2. Every [`Computed::get`] evaluates the derivation again. There is no
//!    cache: the result is stored (so [`Computed::peek`] can return it) and
//!    the reader is subscribed to the computed. The derivation runs on the
//!    reader's behalf here, so what it reads is tracked by the reader too.
//!
//! 3. When a dependency is written, the computed re-runs as a sink of its
//!    own. If the result differs from the stored one it is stored and the
//!    computed's subscribers re-run, with the same all-attempted failure
//!    policy as a signal write.
//!
//! # Cost
//!
//! Derivations should be cheap and free of side effects, since they run
//! on every read.

use std::fmt::Debug;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::{Serialize, Serializer};
use tracing::{debug, trace};

use super::context::RunScope;
use super::equality::{loose_eq, EqualityFn};
use super::runtime::{self, Sink, Source};
use super::subscriber::{sever, SinkCore, SinkKind, SourceId, SubscriberId, SubscriberSet};
use crate::error::{BoxError, ReactiveError};

type DeriveFn<T> = Box<dyn Fn() -> Result<T, BoxError> + Send + Sync>;

struct ComputedInner<T> {
    // Source half.
    id: SourceId,
    value: RwLock<Option<T>>,
    subscribers: Mutex<SubscriberSet>,
    equals: EqualityFn<T>,

    // Sink half.
    core: SinkCore,
    derive: DeriveFn<T>,

    self_weak: Weak<ComputedInner<T>>,
}

impl<T> ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Store `value`, reporting whether it differs from the previous one.
    fn store(&self, value: T) -> bool {
        let mut current = self.value.write();
        let changed = match current.as_ref() {
            Some(previous) => !(self.equals)(previous, &value),
            None => true,
        };
        if changed {
            *current = Some(value);
        }
        changed
    }
}

impl<T> Source for ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn source_id(&self) -> SourceId {
        self.id
    }

    fn remove_subscriber(&self, subscriber: SubscriberId) {
        self.subscribers.lock().shift_remove(&subscriber);
    }
}

impl<T> Sink for ComputedInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn subscriber_id(&self) -> SubscriberId {
        self.core.id()
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Computed
    }

    fn callback(&self) -> Result<(), ReactiveError> {
        let Some(this) = self.self_weak.upgrade() else {
            return Ok(());
        };
        let Some(_scope) = RunScope::begin(&self.core, this) else {
            trace!(computed = %self.id, "skipped re-entrant or disposed run");
            return Ok(());
        };
        let value = runtime::run_body(|| (self.derive)())?;
        if !self.store(value) {
            trace!(computed = %self.id, "recomputed an equal value");
            return Ok(());
        }
        // Still inside the run: a subscriber that writes back into one of our
        // dependencies does not re-enter this computed.
        runtime::propagate(self.id, &self.subscribers)
    }

    fn add_dependency(&self, id: SourceId, source: Weak<dyn Source>) {
        self.core.add_dependency(id, source);
    }

    fn remove_dependency(&self, id: SourceId) {
        self.core.remove_dependency(id);
    }

    fn dispose(&self) {
        let Some(dependencies) = self.core.dispose() else {
            return;
        };
        sever(self.core.id(), dependencies);
        let subscribers = std::mem::take(&mut *self.subscribers.lock());
        for sink in subscribers.into_values() {
            sink.remove_dependency(self.id);
        }
        debug!(computed = %self.id, "computed disposed");
    }
}

/// A derived value that re-evaluates on every read.
///
/// # Type Parameters
///
/// - `T`: The type of the computed value. Must be Clone + Send + Sync.
///
/// # Example
///
/// ```rust
/// use fry_core::reactive::{Computed, Signal};
///
/// let count = Signal::new(2);
/// let count_clone = count.clone();
/// let doubled = Computed::new(move || count_clone.get() * 2);
///
/// assert_eq!(doubled.peek(), None);
/// assert_eq!(doubled.get().unwrap(), 4);
/// assert_eq!(doubled.peek(), Some(4));
/// ```
pub struct Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<ComputedInner<T>>,
}

impl<T> Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new computed with the given derivation.
    ///
    /// The derivation is not run immediately.
    pub fn new<F>(derive: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: PartialEq,
    {
        Self::try_new(move || Ok(derive()))
    }

    /// Create a new computed whose derivation may fail.
    pub fn try_new<F>(derive: F) -> Self
    where
        F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
        T: PartialEq,
    {
        Self::with_equality(derive, loose_eq::<T>)
    }

    /// Create a new computed that uses `equals` to decide whether a
    /// recomputed value is a change worth propagating.
    pub fn with_equality<F>(derive: F, equals: EqualityFn<T>) -> Self
    where
        F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|self_weak| ComputedInner {
            id: SourceId::new(),
            value: RwLock::new(None),
            subscribers: Mutex::new(SubscriberSet::default()),
            equals,
            core: SinkCore::new(),
            derive: Box::new(derive),
            self_weak: self_weak.clone(),
        });
        debug!(computed = %inner.id, "computed created");
        Self { inner }
    }

    /// The computed's ID as a source.
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// The computed's ID as a sink.
    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.core.id()
    }

    /// Evaluate the derivation and return its result.
    ///
    /// The result is stored as the latest value. If called while an effect
    /// or computed is running, that computation is subscribed to this one.
    /// Does not notify subscribers, even when the value changed.
    pub fn get(&self) -> Result<T, ReactiveError> {
        let value = runtime::run_body(|| (self.inner.derive)())?;
        *self.inner.value.write() = Some(value.clone());
        if !self.inner.core.is_disposed() {
            let source: Weak<dyn Source> = Arc::downgrade(&self.inner) as Weak<_>;
            runtime::track(self.inner.id, source, &self.inner.subscribers);
        }
        Ok(value)
    }

    /// The latest computed value, without evaluating or tracking.
    ///
    /// `None` until the derivation has run once.
    pub fn peek(&self) -> Option<T> {
        self.inner.value.read().clone()
    }

    /// Re-run the computed as its dependencies being written would.
    pub fn run(&self) -> Result<(), ReactiveError> {
        self.inner.callback()
    }

    /// Dispose of the computed.
    ///
    /// Cuts it loose from both what it reads and who reads it. Deferred to
    /// the end of the current run when called from inside its derivation.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// Check if the computed has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.core.is_disposed()
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Whether `subscriber` currently depends on this computed.
    pub fn has_subscriber(&self, subscriber: SubscriberId) -> bool {
        self.inner.subscribers.lock().contains_key(&subscriber)
    }

    /// Get the number of dependencies.
    pub fn dependency_count(&self) -> usize {
        self.inner.core.dependency_count()
    }

    /// Whether the latest run read `source`.
    pub fn depends_on(&self, source: SourceId) -> bool {
        self.inner.core.depends_on(source)
    }
}

impl<T> Clone for Computed<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Computed<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Computed")
            .field("id", &self.inner.id)
            .field("value", &self.peek())
            .field("subscriber_count", &self.subscriber_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl<T> Serialize for Computed<T>
where
    T: Clone + Send + Sync + Serialize + 'static,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.inner.value.read().serialize(serializer)
    }
}

/// Create a new computed. Shorthand for [`Computed::new`].
pub fn computed<T, F>(derive: F) -> Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    Computed::new(derive)
}

/// Like [`computed`], for derivations that can fail.
pub fn try_computed<T, F>(derive: F) -> Computed<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
    F: Fn() -> Result<T, BoxError> + Send + Sync + 'static,
{
    Computed::try_new(derive)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

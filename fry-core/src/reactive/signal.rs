//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read with [`Signal::get`] while an effect or computed
//!    is running, that sink becomes a subscriber of the signal (and the
//!    signal a dependency of the sink).
//!
//! 2. [`Signal::peek`] reads without subscribing anyone.
//!
//! 3. [`Signal::set`] stores the value and synchronously re-runs every
//!    subscriber, unless the new value is equal to the current one.
//!
//! # Memory Layout
//!
//! Each signal consists of:
//! - A unique ID (8 bytes)
//! - The value (behind an RwLock)
//! - An insertion-ordered set of subscribers (grows with number of dependents)

use std::fmt::Debug;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use tracing::trace;

use super::equality::{strict_eq, EqualityFn};
use super::runtime::{self, Source};
use super::subscriber::{SourceId, SubscriberId, SubscriberSet};
use crate::error::ReactiveError;

struct SignalInner<T> {
    id: SourceId,
    value: RwLock<T>,
    subscribers: Mutex<SubscriberSet>,
    equals: EqualityFn<T>,
}

impl<T> Source for SignalInner<T>
where
    T: Send + Sync + 'static,
{
    fn source_id(&self) -> SourceId {
        self.id
    }

    fn remove_subscriber(&self, subscriber: SubscriberId) {
        self.subscribers.lock().shift_remove(&subscriber);
    }
}

/// A reactive signal holding a value of type T.
///
/// # Type Parameters
///
/// - `T`: The type of value stored in the signal. Must be Clone + Send + Sync.
///
/// # Example
///
/// ```rust
/// use fry_core::reactive::Signal;
///
/// let count = Signal::new(0);
///
/// // Read the value
/// assert_eq!(count.get(), 0);
///
/// // Update the value (re-runs subscribers)
/// count.set(5).unwrap();
/// assert_eq!(count.peek(), 5);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Create a new signal with the given initial value.
    ///
    /// Writes equal to the current value (by `PartialEq`) are no-ops.
    pub fn new(value: T) -> Self
    where
        T: PartialEq,
    {
        Self::with_equality(value, strict_eq::<T>)
    }

    /// Create a new signal that uses `equals` to detect no-op writes.
    pub fn with_equality(value: T, equals: EqualityFn<T>) -> Self {
        Self {
            inner: Arc::new(SignalInner {
                id: SourceId::new(),
                value: RwLock::new(value),
                subscribers: Mutex::new(SubscriberSet::default()),
                equals,
            }),
        }
    }

    /// Get the signal's unique ID.
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If called while an effect or computed is running, this also registers
    /// that computation as a subscriber.
    pub fn get(&self) -> T {
        let source: Weak<dyn Source> = Arc::downgrade(&self.inner) as Weak<_>;
        runtime::track(self.inner.id, source, &self.inner.subscribers);
        self.peek()
    }

    /// Get the current value without tracking dependencies.
    pub fn peek(&self) -> T {
        self.inner.value.read().clone()
    }

    /// Set a new value and re-run subscribers.
    ///
    /// Every subscriber is attempted even if an earlier one fails; the
    /// failures are returned together as [`ReactiveError::Propagation`].
    pub fn set(&self, value: T) -> Result<(), ReactiveError> {
        {
            let mut current = self.inner.value.write();
            if (self.inner.equals)(&*current, &value) {
                trace!(source = %self.inner.id, "write of an equal value ignored");
                return Ok(());
            }
            *current = value;
        }
        runtime::propagate(self.inner.id, &self.inner.subscribers)
    }

    /// Update the value using a function.
    ///
    /// This is useful for updates that depend on the current value.
    pub fn update<F>(&self, f: F) -> Result<(), ReactiveError>
    where
        F: FnOnce(&T) -> T,
    {
        let current = self.peek();
        self.set(f(&current))
    }

    /// Get the number of subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.inner.subscribers.lock().len()
    }

    /// Whether `subscriber` currently depends on this signal.
    pub fn has_subscriber(&self, subscriber: SubscriberId) -> bool {
        self.inner.subscribers.lock().contains_key(&subscriber)
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.peek())
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

impl<T> Serialize for Signal<T>
where
    T: Clone + Send + Sync + Serialize + 'static,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.inner.value.read().serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Signal<T>
where
    T: Clone + Send + Sync + PartialEq + Deserialize<'de> + 'static,
{
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        T::deserialize(deserializer).map(Signal::new)
    }
}

/// Create a new signal. Shorthand for [`Signal::new`].
pub fn signal<T>(value: T) -> Signal<T>
where
    T: Clone + Send + Sync + PartialEq + 'static,
{
    Signal::new(value)
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::equality::never_eq;
    use crate::reactive::Effect;
    use std::sync::atomic::{AtomicI32, Ordering};

    #[test]
    fn signal_get_and_set() {
        let signal = Signal::new(0);
        assert_eq!(signal.get(), 0);

        signal.set(42).unwrap();
        assert_eq!(signal.get(), 42);
    }

    #[test]
    fn signal_update() {
        let signal = Signal::new(10);
        signal.update(|v| v + 5).unwrap();
        assert_eq!(signal.get(), 15);
    }

    #[test]
    fn signal_clone_shares_state() {
        let signal1 = Signal::new(0);
        let signal2 = signal1.clone();

        signal1.set(42).unwrap();
        assert_eq!(signal2.get(), 42);

        signal2.set(100).unwrap();
        assert_eq!(signal1.get(), 100);
        assert_eq!(signal1.id(), signal2.id());
    }

    #[test]
    fn signal_ids_are_unique() {
        let s1 = Signal::new(0);
        let s2 = Signal::new(0);
        let s3 = Signal::new(0);

        assert_ne!(s1.id(), s2.id());
        assert_ne!(s2.id(), s3.id());
        assert_ne!(s1.id(), s3.id());
    }

    #[test]
    fn reads_outside_a_sink_are_inert() {
        let signal = Signal::new(1);
        signal.get();
        signal.get();
        assert_eq!(signal.subscriber_count(), 0);
    }

    #[test]
    fn equal_write_does_not_rerun_subscribers() {
        let signal = Signal::new(3);
        let runs = Arc::new(AtomicI32::new(0));

        let runs_clone = runs.clone();
        let signal_clone = signal.clone();
        let _effect = Effect::new(move || {
            signal_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        signal.set(signal.peek()).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        signal.set(4).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn custom_equality_can_force_propagation() {
        let signal = Signal::with_equality(3, never_eq);
        let runs = Arc::new(AtomicI32::new(0));

        let runs_clone = runs.clone();
        let signal_clone = signal.clone();
        let _effect = Effect::new(move || {
            signal_clone.get();
            runs_clone.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        signal.set(3).unwrap();
        signal.set(3).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn signal_serializes_its_value() {
        let signal = Signal::new(vec![1, 2, 3]);
        assert_eq!(serde_json::to_string(&signal).unwrap(), "[1,2,3]");

        let restored: Signal<String> = serde_json::from_str("\"hello\"").unwrap();
        assert_eq!(restored.peek(), "hello");
        assert_eq!(restored.subscriber_count(), 0);
    }

    #[test]
    fn debug_shows_value_and_subscribers() {
        let signal = Signal::new(7);
        let rendered = format!("{signal:?}");
        assert!(rendered.contains("value: 7"));
        assert!(rendered.contains("subscriber_count: 0"));
    }

    #[test]
    fn update_closure_may_write_the_same_signal() {
        let signal = Signal::new(1);
        let signal_clone = signal.clone();

        signal
            .update(move |value| {
                signal_clone.set(10).unwrap();
                value + 1
            })
            .unwrap();

        assert_eq!(signal.peek(), 2);
    }
}

//! Reactive Runtime
//!
//! The runtime connects sources and sinks. There is no central registry:
//! every source keeps its own subscriber set and every sink its own
//! dependency set, and the functions here keep the two sides mirrored.
//!
//! # How It Works
//!
//! 1. A sink runs its body inside a [`RunScope`](super::context::RunScope),
//!    which makes it the current reader.
//!
//! 2. Reading a source while a sink is current calls [`track`], which adds
//!    the edge on both sides.
//!
//! 3. Writing a source calls [`propagate`], which synchronously runs the
//!    callback of every subscriber before the write returns. Failures are
//!    collected, not short-circuited, and reported together.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use smallvec::SmallVec;
use tracing::{debug, trace, warn};

use super::context::ReactiveContext;
use super::subscriber::{SinkKind, SourceId, SubscriberId, SubscriberSet};
use crate::error::{BoxError, PropagationFailure, ReactiveError, SinkFailure};

/// Something that can be read and remembers its readers.
pub(crate) trait Source: Send + Sync {
    fn source_id(&self) -> SourceId;

    /// Drop the edge to `subscriber`, if any.
    fn remove_subscriber(&self, subscriber: SubscriberId);
}

/// Something that reads sources and re-runs when they change.
pub(crate) trait Sink: Send + Sync {
    fn subscriber_id(&self) -> SubscriberId;

    fn kind(&self) -> SinkKind;

    /// Re-run the sink. A no-op while it is already running or once disposed.
    fn callback(&self) -> Result<(), ReactiveError>;

    fn add_dependency(&self, id: SourceId, source: Weak<dyn Source>);

    fn remove_dependency(&self, id: SourceId);

    /// Retire the sink, deferred to the end of the current run if it is running.
    fn dispose(&self);
}

/// Register the current reader, if any, as a subscriber of `source`.
///
/// Both sides are sets, so reading the same source repeatedly within one run
/// leaves a single edge.
pub(crate) fn track(source_id: SourceId, source: Weak<dyn Source>, subscribers: &Mutex<SubscriberSet>) {
    let Some(current) = ReactiveContext::current() else {
        return;
    };
    let subscriber = current.subscriber_id();
    subscribers
        .lock()
        .entry(subscriber)
        .or_insert_with(|| Arc::clone(&current));
    current.add_dependency(source_id, source);
    trace!(%source_id, %subscriber, "tracked read");
}

/// Run every subscriber of `origin` after its value changed.
///
/// Subscribers run in subscription order on the caller's stack. A sink that
/// was removed from the set by an earlier subscriber's run is skipped. A sink
/// that subscribes while the fan-out is under way is not visited until the
/// next change.
pub(crate) fn propagate(origin: SourceId, subscribers: &Mutex<SubscriberSet>) -> Result<(), ReactiveError> {
    let snapshot: SmallVec<[Arc<dyn Sink>; 4]> = subscribers.lock().values().cloned().collect();
    if snapshot.is_empty() {
        return Ok(());
    }
    debug!(%origin, subscribers = snapshot.len(), "propagating change");

    let mut failures = Vec::new();
    for sink in snapshot {
        let id = sink.subscriber_id();
        if !subscribers.lock().contains_key(&id) {
            continue;
        }
        if let Err(error) = sink.callback() {
            warn!(%origin, sink = %id, kind = %sink.kind(), %error, "subscriber failed");
            failures.push(SinkFailure {
                sink: id,
                kind: sink.kind(),
                error,
            });
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(PropagationFailure { origin, failures }.into())
    }
}

/// Run a user body, turning both returned errors and panics into [`ReactiveError`].
///
/// A body that bubbles up a `ReactiveError` with `?` (typically the aggregate
/// of a nested write) gets it back unchanged.
pub(crate) fn run_body<T>(body: impl FnOnce() -> Result<T, BoxError>) -> Result<T, ReactiveError> {
    match panic::catch_unwind(AssertUnwindSafe(body)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(match error.downcast::<ReactiveError>() {
            Ok(reactive) => *reactive,
            Err(other) => ReactiveError::Body(other),
        }),
        Err(payload) => Err(ReactiveError::Panicked(panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::subscriber::SinkCore;
    use std::sync::atomic::{AtomicI32, Ordering};

    struct MockSink {
        core: SinkCore,
        calls: AtomicI32,
        fail: bool,
    }

    impl MockSink {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                core: SinkCore::new(),
                calls: AtomicI32::new(0),
                fail,
            })
        }
    }

    impl Sink for MockSink {
        fn subscriber_id(&self) -> SubscriberId {
            self.core.id()
        }

        fn kind(&self) -> SinkKind {
            SinkKind::Effect
        }

        fn callback(&self) -> Result<(), ReactiveError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(ReactiveError::Panicked("mock".to_string()))
            } else {
                Ok(())
            }
        }

        fn add_dependency(&self, id: SourceId, source: Weak<dyn Source>) {
            self.core.add_dependency(id, source);
        }

        fn remove_dependency(&self, id: SourceId) {
            self.core.remove_dependency(id);
        }

        fn dispose(&self) {
            self.core.dispose();
        }
    }

    struct MockSource {
        id: SourceId,
        subscribers: Mutex<SubscriberSet>,
    }

    impl Source for MockSource {
        fn source_id(&self) -> SourceId {
            self.id
        }

        fn remove_subscriber(&self, subscriber: SubscriberId) {
            self.subscribers.lock().shift_remove(&subscriber);
        }
    }

    fn mock_source() -> Arc<MockSource> {
        Arc::new(MockSource {
            id: SourceId::new(),
            subscribers: Mutex::new(SubscriberSet::default()),
        })
    }

    fn subscribe(source: &MockSource, sink: &Arc<MockSink>) {
        let sink: Arc<dyn Sink> = sink.clone();
        source.subscribers.lock().insert(sink.subscriber_id(), sink);
    }

    #[test]
    fn track_is_inert_without_context() {
        let source = mock_source();
        let weak: Weak<dyn Source> = Arc::downgrade(&source) as Weak<_>;
        track(source.id, weak, &source.subscribers);
        assert!(source.subscribers.lock().is_empty());
    }

    #[test]
    fn track_mirrors_the_edge_once() {
        let source = mock_source();
        let sink = MockSink::new(false);
        let _ctx = ReactiveContext::enter(sink.clone());

        for _ in 0..3 {
            let weak: Weak<dyn Source> = Arc::downgrade(&source) as Weak<_>;
            track(source.id, weak, &source.subscribers);
        }

        assert_eq!(source.subscribers.lock().len(), 1);
        assert!(source.subscribers.lock().contains_key(&sink.subscriber_id()));
        assert_eq!(sink.core.dependency_count(), 1);
        assert!(sink.core.depends_on(source.id));
    }

    #[test]
    fn propagate_runs_every_subscriber_and_aggregates() {
        let source = mock_source();
        let failing = MockSink::new(true);
        let healthy = MockSink::new(false);
        subscribe(&source, &failing);
        subscribe(&source, &healthy);

        let err = propagate(source.id, &source.subscribers).unwrap_err();

        assert_eq!(failing.calls.load(Ordering::SeqCst), 1);
        assert_eq!(healthy.calls.load(Ordering::SeqCst), 1);
        let failures = err.failures();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].sink, failing.subscriber_id());
        assert_eq!(failures[0].kind, SinkKind::Effect);
    }

    #[test]
    fn propagate_without_subscribers_is_ok() {
        let source = mock_source();
        assert!(propagate(source.id, &source.subscribers).is_ok());
    }

    #[test]
    fn run_body_catches_panics() {
        let err = run_body::<()>(|| panic!("exploded")).unwrap_err();
        assert!(matches!(err, ReactiveError::Panicked(ref message) if message == "exploded"));

        let err = run_body::<()>(|| panic!("{} exploded", 2)).unwrap_err();
        assert!(matches!(err, ReactiveError::Panicked(ref message) if message == "2 exploded"));
    }

    #[test]
    fn run_body_passes_reactive_errors_through() {
        let err = run_body::<()>(|| Err(ReactiveError::Panicked("nested".to_string()).into())).unwrap_err();
        assert!(matches!(err, ReactiveError::Panicked(ref message) if message == "nested"));

        let err = run_body::<()>(|| Err("plain".into())).unwrap_err();
        assert!(matches!(err, ReactiveError::Body(_)));
        assert_eq!(run_body(|| Ok(7)).unwrap(), 7);
    }
}

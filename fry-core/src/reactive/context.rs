//! Reactive Context
//!
//! The reactive context tracks which sink is currently running.
//! This enables automatic dependency tracking: when a source is read,
//! the sink on top of the stack is registered as a subscriber.
//!
//! # Implementation
//!
//! We use a thread-local stack of sinks. Running a sink pushes it; the run
//! ends by popping it again. Both happen through guards, so the stack stays
//! balanced when a body returns early or unwinds.
//!
//! This design supports nested reactive contexts (e.g., an effect whose
//! body writes a signal that re-runs another effect).

use std::cell::RefCell;
use std::sync::Arc;

use super::runtime::Sink;
use super::subscriber::{Dependencies, SinkCore, SubscriberId};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Arc<dyn Sink>>> = const { RefCell::new(Vec::new()) };
}

/// Guard that pops the context when dropped.
///
/// This ensures the context stack is properly maintained even if
/// the computation panics.
pub struct ReactiveContext {
    subscriber_id: SubscriberId,
}

impl ReactiveContext {
    /// Enter a new reactive context for the given sink.
    ///
    /// While this context is active, any source that is read will
    /// register the sink as a subscriber.
    pub(crate) fn enter(sink: Arc<dyn Sink>) -> Self {
        let subscriber_id = sink.subscriber_id();
        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(sink));
        Self { subscriber_id }
    }

    /// Check if there is an active reactive context.
    pub fn is_active() -> bool {
        CONTEXT_STACK.with(|stack| !stack.borrow().is_empty())
    }

    /// Get the current subscriber ID, if any.
    pub fn current_subscriber() -> Option<SubscriberId> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().map(|sink| sink.subscriber_id()))
    }

    /// Number of sinks currently running on this thread.
    pub fn depth() -> usize {
        CONTEXT_STACK.with(|stack| stack.borrow().len())
    }

    /// The sink on top of the stack.
    pub(crate) fn current() -> Option<Arc<dyn Sink>> {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned())
    }
}

impl Drop for ReactiveContext {
    fn drop(&mut self) {
        let popped = CONTEXT_STACK.with(|stack| stack.borrow_mut().pop());

        if let Some(sink) = popped {
            debug_assert_eq!(
                sink.subscriber_id(),
                self.subscriber_id,
                "ReactiveContext mismatch: expected {:?}, got {:?}",
                self.subscriber_id,
                sink.subscriber_id()
            );
        }
    }
}

/// One run of a sink.
///
/// Created by [`RunScope::begin`], which marks the sink active and pushes it
/// as current reader. Dropping the scope pops the context, marks the sink
/// idle, prunes edges to sources the run no longer read, and finally performs
/// a disposal requested while the body was running.
pub(crate) struct RunScope<'a> {
    core: &'a SinkCore,
    sink: Arc<dyn Sink>,
    previous: Option<Dependencies>,
    context: Option<ReactiveContext>,
}

impl<'a> RunScope<'a> {
    /// Returns `None` when the sink is already running or disposed.
    pub(crate) fn begin(core: &'a SinkCore, sink: Arc<dyn Sink>) -> Option<Self> {
        let previous = core.begin_run()?;
        let context = ReactiveContext::enter(Arc::clone(&sink));
        Some(Self {
            core,
            sink,
            previous: Some(previous),
            context: Some(context),
        })
    }
}

impl Drop for RunScope<'_> {
    fn drop(&mut self) {
        drop(self.context.take());
        let previous = self.previous.take().unwrap_or_default();
        if self.core.finish_run(previous) {
            self.sink.dispose();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReactiveError;
    use crate::reactive::subscriber::{SinkKind, SourceId};
    use crate::reactive::runtime::Source;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Weak;

    struct Probe {
        core: SinkCore,
        disposed: AtomicBool,
    }

    impl Probe {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                core: SinkCore::new(),
                disposed: AtomicBool::new(false),
            })
        }
    }

    impl Sink for Probe {
        fn subscriber_id(&self) -> SubscriberId {
            self.core.id()
        }

        fn kind(&self) -> SinkKind {
            SinkKind::Effect
        }

        fn callback(&self) -> Result<(), ReactiveError> {
            Ok(())
        }

        fn add_dependency(&self, id: SourceId, source: Weak<dyn Source>) {
            self.core.add_dependency(id, source);
        }

        fn remove_dependency(&self, id: SourceId) {
            self.core.remove_dependency(id);
        }

        fn dispose(&self) {
            if self.core.dispose().is_some() {
                self.disposed.store(true, Ordering::SeqCst);
            }
        }
    }

    #[test]
    fn context_tracks_subscriber() {
        let probe = Probe::new();
        let id = probe.subscriber_id();

        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());

        {
            let _ctx = ReactiveContext::enter(probe);

            assert!(ReactiveContext::is_active());
            assert_eq!(ReactiveContext::current_subscriber(), Some(id));
        }

        // Context should be cleaned up after drop
        assert!(!ReactiveContext::is_active());
        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn nested_contexts() {
        let outer = Probe::new();
        let inner = Probe::new();
        let (id1, id2) = (outer.subscriber_id(), inner.subscriber_id());

        {
            let _ctx1 = ReactiveContext::enter(outer);
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));

            {
                let _ctx2 = ReactiveContext::enter(inner);
                assert_eq!(ReactiveContext::current_subscriber(), Some(id2));
                assert_eq!(ReactiveContext::depth(), 2);
            }

            // After inner context drops, outer should be current
            assert_eq!(ReactiveContext::current_subscriber(), Some(id1));
        }

        assert!(ReactiveContext::current_subscriber().is_none());
    }

    #[test]
    fn run_scope_pops_on_panic() {
        let probe = Probe::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _scope = RunScope::begin(&probe.core, probe.clone()).unwrap();
            assert!(probe.core.is_active());
            panic!("body failed");
        }));

        assert!(result.is_err());
        assert!(!ReactiveContext::is_active());
        assert!(!probe.core.is_active());
    }

    #[test]
    fn run_scope_refuses_reentry() {
        let probe = Probe::new();
        let _scope = RunScope::begin(&probe.core, probe.clone()).unwrap();
        assert!(RunScope::begin(&probe.core, probe.clone()).is_none());
        assert_eq!(ReactiveContext::depth(), 1);
    }

    #[test]
    fn run_scope_performs_deferred_dispose() {
        let probe = Probe::new();
        {
            let _scope = RunScope::begin(&probe.core, probe.clone()).unwrap();
            probe.dispose();
            assert!(!probe.disposed.load(Ordering::SeqCst));
        }
        assert!(probe.disposed.load(Ordering::SeqCst));
        assert!(probe.core.is_disposed());
    }
}

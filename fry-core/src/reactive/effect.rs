//! Effect Implementation
//!
//! An Effect is a side-effecting computation that runs whenever its
//! dependencies change.
//!
//! # How Effects Work
//!
//! 1. When created, the effect runs its function immediately to establish
//!    initial dependencies. If that first run fails, the effect is disposed
//!    and the error returned instead of the effect.
//!
//! 2. When any dependency is written, the effect re-runs synchronously,
//!    inside the write.
//!
//! 3. Each run rediscovers dependencies from scratch; sources the run no
//!    longer reads drop their edge to the effect.
//!
//! # Re-entrancy and Disposal
//!
//! A run that (indirectly) triggers its own effect again is not recursed
//! into: the nested trigger is skipped. Disposing an effect from inside its
//! own body is deferred until the body returns.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use tracing::{debug, trace, warn};

use super::context::RunScope;
use super::runtime::{self, Sink, Source};
use super::subscriber::{sever, SinkCore, SinkKind, SourceId, SubscriberId};
use crate::error::{BoxError, ReactiveError};

type EffectFn = Box<dyn Fn() -> Result<(), BoxError> + Send + Sync>;

struct EffectInner {
    core: SinkCore,
    run: EffectFn,
    run_count: AtomicUsize,
    self_weak: Weak<EffectInner>,
}

impl Sink for EffectInner {
    fn subscriber_id(&self) -> SubscriberId {
        self.core.id()
    }

    fn kind(&self) -> SinkKind {
        SinkKind::Effect
    }

    fn callback(&self) -> Result<(), ReactiveError> {
        let Some(this) = self.self_weak.upgrade() else {
            return Ok(());
        };
        let Some(_scope) = RunScope::begin(&self.core, this) else {
            trace!(effect = %self.core.id(), "skipped re-entrant or disposed run");
            return Ok(());
        };
        self.run_count.fetch_add(1, Ordering::Relaxed);
        runtime::run_body(|| (self.run)())
    }

    fn add_dependency(&self, id: SourceId, source: Weak<dyn Source>) {
        self.core.add_dependency(id, source);
    }

    fn remove_dependency(&self, id: SourceId) {
        self.core.remove_dependency(id);
    }

    fn dispose(&self) {
        match self.core.dispose() {
            Some(dependencies) => {
                sever(self.core.id(), dependencies);
                debug!(effect = %self.core.id(), "effect disposed");
            }
            None if self.core.is_active() => {
                debug!(effect = %self.core.id(), "effect disposal deferred until run completes");
            }
            None => {}
        }
    }
}

/// A side-effecting computation that runs when dependencies change.
///
/// Most callers want the [`effect`] function, which hands back only a
/// [`Disposer`]. This handle adds introspection on top.
///
/// # Example
///
/// ```rust
/// use fry_core::reactive::{Effect, Signal};
///
/// let count = Signal::new(0);
///
/// let count_clone = count.clone();
/// let effect = Effect::new(move || {
///     println!("Count is: {}", count_clone.get());
/// })
/// .unwrap();
///
/// count.set(5).unwrap(); // Prints: "Count is: 5"
/// assert_eq!(effect.run_count(), 2);
/// ```
pub struct Effect {
    inner: Arc<EffectInner>,
}

impl Effect {
    /// Create a new effect with the given function.
    ///
    /// The function runs immediately to establish initial dependencies.
    pub fn new<F>(run: F) -> Result<Self, ReactiveError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::try_new(move || {
            run();
            Ok(())
        })
    }

    /// Create a new effect whose body may fail.
    ///
    /// A failure of the first run disposes the effect and is returned.
    pub fn try_new<F>(run: F) -> Result<Self, ReactiveError>
    where
        F: Fn() -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let inner = Arc::new_cyclic(|self_weak| EffectInner {
            core: SinkCore::new(),
            run: Box::new(run),
            run_count: AtomicUsize::new(0),
            self_weak: self_weak.clone(),
        });
        debug!(effect = %inner.core.id(), "effect created");

        if let Err(error) = inner.callback() {
            warn!(effect = %inner.core.id(), %error, "first run failed, disposing effect");
            inner.dispose();
            return Err(error);
        }
        Ok(Self { inner })
    }

    /// Get the effect's unique ID.
    pub fn id(&self) -> SubscriberId {
        self.inner.core.id()
    }

    /// Run the effect now.
    ///
    /// Does nothing while the effect is already running or once disposed.
    pub fn run(&self) -> Result<(), ReactiveError> {
        self.inner.callback()
    }

    /// Dispose of the effect.
    ///
    /// After disposal, the effect will not run again. Called from inside the
    /// effect's own body, disposal happens when the body returns.
    pub fn dispose(&self) {
        self.inner.dispose();
    }

    /// A teardown handle for this effect.
    pub fn disposer(&self) -> Disposer {
        Disposer {
            sink: self.inner.clone(),
        }
    }

    /// Check if the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.core.is_disposed()
    }

    /// Get the number of times the effect body has run.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::Relaxed)
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

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.id())
            .field("run_count", &self.run_count())
            .field("dependency_count", &self.dependency_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// Teardown handle returned by [`effect`].
///
/// Calling [`dispose`](Disposer::dispose) more than once is harmless.
/// Dropping the disposer does not dispose anything.
#[derive(Clone)]
pub struct Disposer {
    sink: Arc<dyn Sink>,
}

impl Disposer {
    /// Retire the effect this disposer belongs to.
    pub fn dispose(&self) {
        self.sink.dispose();
    }
}

impl fmt::Debug for Disposer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Disposer")
            .field("sink", &self.sink.subscriber_id())
            .finish()
    }
}

/// Create an effect and run it once.
///
/// Returns the effect's [`Disposer`], or the error of the first run.
pub fn effect<F>(run: F) -> Result<Disposer, ReactiveError>
where
    F: Fn() + Send + Sync + 'static,
{
    Effect::new(run).map(|effect| effect.disposer())
}

/// Like [`effect`], for bodies that can fail.
pub fn try_effect<F>(run: F) -> Result<Disposer, ReactiveError>
where
    F: Fn() -> Result<(), BoxError> + Send + Sync + 'static,
{
    Effect::try_new(run).map(|effect| effect.disposer())
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

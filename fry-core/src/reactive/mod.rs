//! Reactive Primitives
//!
//! This module implements the core reactive system: signals, computeds, and
//! effects. Dependencies are discovered while code runs, and a write re-runs
//! exactly the computations that read the written value.
//!
//! # Concepts
//!
//! ## Signals
//!
//! A Signal is a container for mutable state. When a signal's value is read
//! while an effect or computed runs, the signal registers that computation
//! as a subscriber. When the signal's value changes, all subscribers re-run
//! before the write returns.
//!
//! ## Computeds
//!
//! A Computed is a derived value. It subscribes to what its derivation reads
//! and can itself be subscribed to. It does not cache: every read evaluates
//! the derivation again.
//!
//! ## Effects
//!
//! An Effect is a side-effecting computation that runs once when created and
//! again whenever its dependencies change. Effects are used to synchronize
//! reactive state with external systems, such as page elements.
//!
//! # Implementation Notes
//!
//! The reactive system uses a thread-local stack of running computations to
//! detect dependencies. When a source is read, the computation on top of the
//! stack (if any) is subscribed to it, and the source is recorded in that
//! computation's dependency set. Both sides are kept in sync at all times.
//!
//! Propagation is synchronous and unbatched: a write runs its subscribers
//! inline, and writes made by those subscribers propagate inline too.

mod computed;
mod context;
mod effect;
mod equality;
mod runtime;
mod signal;
mod subscriber;

pub use computed::{computed, try_computed, Computed};
pub use context::ReactiveContext;
pub use effect::{effect, try_effect, Disposer, Effect};
pub use equality::{loose_eq, never_eq, strict_eq, EqualityFn};
pub use signal::{signal, Signal};
pub use subscriber::{SinkKind, SourceId, SubscriberId};

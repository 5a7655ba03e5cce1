//! Fry Core
//!
//! This crate provides the reactive runtime behind Fry's client-side
//! hydration. It implements:
//!
//! - Reactive primitives (signals, computeds, effects)
//! - Automatic dependency tracking through an execution-context stack
//! - Synchronous change propagation with per-subscriber error aggregation
//!
//! The crate is designed to be used both as a native Rust library and, with
//! the `python` feature, as a Python extension module via PyO3.
//!
//! # Architecture
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `error`: Errors raised by reactive bodies and by propagation
//!
//! # Example
//!
//! ```rust
//! use std::sync::atomic::{AtomicI32, Ordering};
//! use std::sync::Arc;
//!
//! use fry_core::{computed, effect, signal};
//!
//! // Create a signal
//! let count = signal(0);
//!
//! // Create a derived value
//! let count_clone = count.clone();
//! let doubled = computed(move || count_clone.get() * 2);
//!
//! // Create an effect
//! let seen = Arc::new(AtomicI32::new(0));
//! let seen_clone = seen.clone();
//! let dispose = effect(move || {
//!     if let Ok(value) = doubled.get() {
//!         seen_clone.store(value, Ordering::SeqCst);
//!     }
//! })
//! .unwrap();
//!
//! // Update the signal; the effect runs before `set` returns
//! count.set(5).unwrap();
//! assert_eq!(seen.load(Ordering::SeqCst), 10);
//!
//! dispose.dispose();
//! ```

pub mod error;
pub mod reactive;

#[cfg(feature = "python")]
mod python;

pub use error::{BoxError, PropagationFailure, ReactiveError, Result, SinkFailure};
pub use reactive::{computed, effect, signal, try_computed, try_effect};
pub use reactive::{Computed, Disposer, Effect, Signal};

//! Vigil Core
//!
//! This crate provides a dependency-tracking reactive state runtime.
//! It implements:
//!
//! - Reactive primitives (observable values, computed values, actions,
//!   reactions)
//! - Automatic dependency tracking and batched change propagation
//! - Dynamic values with observable lists and maps
//! - An annotation layer that turns plain records into observable objects
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: Core reactive primitives and dependency tracking
//! - `value`: Dynamic values, wrapping policies and observable containers
//! - `annotation`: `make_observable` and friends
//! - `diagnostics`: Non-fatal warnings and dependency trees
//! - `config`: Per-thread runtime configuration
//! - `error`: Error types
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::{AtomicI32, Ordering};
//! use vigil_core::reactive::{autorun, run_in_action, Computed, ObservableValue};
//!
//! // Create an observable value
//! let count = ObservableValue::new(0);
//!
//! // Create a derived value
//! let doubled = {
//!     let count = count.clone();
//!     Computed::new(move || count.get() * 2)
//! };
//!
//! // Create a reaction
//! let seen = Arc::new(AtomicI32::new(-1));
//! let _printer = {
//!     let (doubled, seen) = (doubled.clone(), seen.clone());
//!     autorun(move |_| seen.store(doubled.get(), Ordering::SeqCst))
//! };
//!
//! // Update inside an action: the reaction runs once, afterwards
//! run_in_action("bump", || {
//!     count.set(4);
//!     count.set(5);
//! });
//! assert_eq!(seen.load(Ordering::SeqCst), 10);
//! ```

pub mod annotation;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod reactive;
pub mod value;

pub use error::{MisuseError, ReactiveError, Result};

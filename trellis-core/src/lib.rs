//! Trellis Core
//!
//! This crate provides the core runtime for the Trellis declarative UI
//! framework. It implements:
//!
//! - Reactive primitives (signals, memos, effects)
//! - Ownership scopes with cleanups and context propagation
//! - A reconciler that drives an external retained tree
//! - Property and event reflection onto a node family
//!
//! The runtime is toolkit-agnostic: a backend implements the
//! [`TreeNode`](tree::TreeNode) and
//! [`PropertyTarget`](tree::PropertyTarget) traits for its node family
//! and everything else comes for free.
//!
//! # Architecture
//!
//! The crate is organized into two layers:
//!
//! - `reactive`: dependency tracking, scheduling, and ownership
//! - `tree`: child resolution, reconciliation, and property binding
//!
//! # Example
//!
//! ```rust,ignore
//! use trellis_core::reactive::Runtime;
//!
//! let runtime = Runtime::new();
//! let count = runtime.create_signal(0);
//!
//! let doubled = {
//!     let count = count.clone();
//!     runtime.create_memo(move || count.get() * 2)
//! };
//!
//! let ((), root) = runtime.create_root(|| {
//!     let doubled = doubled.clone();
//!     runtime.create_effect(move || {
//!         println!("doubled: {}", doubled.get());
//!     });
//! });
//!
//! count.set(5);
//! // The effect re-runs and prints: "doubled: 10"
//!
//! root.dispose();
//! ```

pub mod reactive;
pub mod tree;

mod error;

pub use error::{Error, PropertyError};

//! Fine-Grained Reactive Core
//!
//! A dependency-tracking engine built from four pieces:
//!
//! - **Signals** ([`Signal`]): mutable leaf values. Reading one inside a
//!   computation subscribes the computation; writing one notifies readers.
//! - **Memos** ([`Memo`]): cached derived values, recomputed lazily and
//!   always resolved before any effect observes them.
//! - **Effects** ([`Effect`]): side-effecting computations that re-run
//!   when their tracked sources change.
//! - **Owners** ([`RootOwner`]): a strict tree controlling lifetimes;
//!   disposing an owner tears down everything created beneath it and
//!   carries [context](Context) down to descendants.
//!
//! Dependencies are discovered at run time: whatever a computation reads
//! is what it depends on, rebuilt on every run. The [`Runtime`] ties the
//! pieces together and schedules propagation so that all memos settle
//! before effects run and batched writes coalesce.

mod context;
mod effect;
mod memo;
mod owner;
mod runtime;
mod signal;

pub use context::{create_context, Context, ContextId};
pub use effect::Effect;
pub use memo::{ComputationState, Memo};
pub use owner::{OwnerId, RootOwner};
pub use runtime::{ComputationId, Runtime, SourceId};
pub use signal::Signal;

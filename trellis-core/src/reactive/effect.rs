//! Effect Implementation
//!
//! An Effect is a side-effecting computation. Unlike a memo it produces
//! no value; it exists to push reactive state out to the non-reactive
//! world (tree mutations, property writes, logging).
//!
//! # How Effects Work
//!
//! 1. The body runs once, immediately, on creation. Sources read during
//!    that run become the effect's dependencies.
//!
//! 2. A write to any dependency queues the effect. The scheduler runs
//!    queued effects after all stale memos have been resolved, so an
//!    effect only ever observes consistent derived state.
//!
//! 3. Each re-run rebuilds the dependency set from scratch; sources not
//!    read this time are unsubscribed.
//!
//! 4. Multiple invalidations within one batch coalesce into a single
//!    re-run.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

use indexmap::IndexSet;

use super::owner::OwnerId;
use super::runtime::{
    AnyComputation, BatchScope, ComputationId, Runtime, RuntimeInner, SourceId,
};

/// A side-effecting computation that re-runs when its tracked sources
/// change.
///
/// Created through [`Runtime::create_effect`]. Dropping the handle does
/// not stop the effect; it lives until its owner is disposed or
/// [`Effect::dispose`] is called.
pub struct Effect {
    inner: Arc<EffectInner>,
}

struct EffectInner {
    id: ComputationId,

    /// The owner node backing this effect's nested scope.
    owner: OwnerId,

    /// The effect body.
    body: Box<dyn Fn() + Send + Sync>,

    /// Sources read during the last run.
    sources: RwLock<IndexSet<SourceId>>,

    /// Set on teardown; a disposed effect never re-runs.
    disposed: AtomicBool,

    /// True while the body is executing.
    running: AtomicBool,

    /// Completed runs, for tests and diagnostics.
    run_count: AtomicUsize,

    runtime: Weak<RuntimeInner>,
}

impl Runtime {
    /// Create an effect and run it immediately.
    ///
    /// The initial run happens inside a batch scope, so signal writes
    /// made by the body are coalesced like any other write.
    pub fn create_effect(&self, body: impl Fn() + Send + Sync + 'static) -> Effect {
        let parent = self.inner.current_owner();
        if parent.is_none() {
            tracing::warn!("effect created outside a reactive root; it will only be freed with its handle");
        }
        let owner = self.inner.create_owner(parent);

        let inner = Arc::new(EffectInner {
            id: ComputationId::new(),
            owner,
            body: Box::new(body),
            sources: RwLock::new(IndexSet::new()),
            disposed: AtomicBool::new(false),
            running: AtomicBool::new(false),
            run_count: AtomicUsize::new(0),
            runtime: Arc::downgrade(&self.inner),
        });
        self.inner
            .register_computation(inner.clone() as Arc<dyn AnyComputation>);

        let _scope = BatchScope::enter(&self.inner);
        inner.run();

        Effect { inner }
    }
}

impl Effect {
    /// Get the effect's computation ID.
    pub fn id(&self) -> ComputationId {
        self.inner.id
    }

    /// Number of completed runs, including the initial one.
    pub fn run_count(&self) -> usize {
        self.inner.run_count.load(Ordering::SeqCst)
    }

    /// Check whether the effect has been disposed.
    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Stop the effect and run the cleanups registered in its scope.
    ///
    /// Safe to call more than once.
    pub fn dispose(&self) {
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.dispose_owner(self.inner.owner);
        }
    }
}

impl AnyComputation for EffectInner {
    fn id(&self) -> ComputationId {
        self.id
    }

    fn owner(&self) -> OwnerId {
        self.owner
    }

    fn is_effect(&self) -> bool {
        true
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    fn mark_stale(&self) {}

    fn run(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };

        self.running.store(true, Ordering::SeqCst);
        struct RunningReset<'a>(&'a AtomicBool);
        impl Drop for RunningReset<'_> {
            fn drop(&mut self) {
                self.0.store(false, Ordering::SeqCst);
            }
        }
        let _reset = RunningReset(&self.running);

        let scope = runtime.enter_computation(self.owner, self.id);
        (self.body)();
        let reads = scope.finish();
        runtime.update_sources(self.id, &self.sources, reads);

        self.run_count.fetch_add(1, Ordering::SeqCst);
    }

    fn teardown(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.remove_computation(self.id, &self.sources);
        }
    }
}

impl Clone for Effect {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl Debug for Effect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Effect")
            .field("id", &self.inner.id)
            .field("run_count", &self.run_count())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

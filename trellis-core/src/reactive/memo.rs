//! Memo Implementation
//!
//! A Memo is a cached derived value. It is a computation paired with an
//! output source: the computation re-derives the value when invalidated,
//! and the output source lets other computations subscribe to the result.
//!
//! # How Memos Work
//!
//! 1. On first access, the memo runs its function and caches the result.
//!
//! 2. A write to any tracked source marks the memo stale and queues it;
//!    the scheduler resolves every stale memo before any effect runs.
//!
//! 3. Reading a stale memo resolves it on the spot, so a memo is never
//!    observed with stale inputs, not even mid-propagation.
//!
//! 4. After a run, the memo compares old and new values with its equality
//!    function and only notifies its own readers when they differ.
//!
//! # Failure Semantics
//!
//! A panic inside the memo body propagates to whoever triggered the run.
//! The memo is left stale, so the next dependency change (or read)
//! retries. Nothing is swallowed.

use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, Weak};

use indexmap::IndexSet;

use super::owner::OwnerId;
use super::runtime::{
    AnyComputation, BatchScope, ComputationId, Runtime, RuntimeInner, SourceId,
};

type ComputeFn<T> = Box<dyn Fn() -> T + Send + Sync>;
type EqualsFn<T> = Box<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// Lifecycle state of a computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputationState {
    /// The cached value is up-to-date.
    Clean,

    /// A tracked source changed; the next resolution re-runs the body.
    Stale,

    /// The body is executing right now.
    Running,
}

/// A cached derived value that recomputes when its tracked sources change.
///
/// Created through [`Runtime::create_memo`]. Handles are cheap to clone
/// and share one computation.
pub struct Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<MemoInner<T>>,
}

struct MemoInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Computation identity in the runtime registry.
    id: ComputationId,

    /// Output source identity; readers of the memo subscribe here.
    out: SourceId,

    /// The owner node backing this memo's nested scope.
    owner: OwnerId,

    /// The computation function.
    compute: ComputeFn<T>,

    /// Decides whether a recomputation changed the value.
    equals: EqualsFn<T>,

    /// The cached value (`None` until first computed).
    value: RwLock<Option<T>>,

    /// Current lifecycle state.
    state: RwLock<ComputationState>,

    /// Sources read during the last run.
    sources: RwLock<IndexSet<SourceId>>,

    /// Set on teardown; a disposed memo never recomputes.
    disposed: AtomicBool,

    runtime: Weak<RuntimeInner>,
}

impl Runtime {
    /// Create a memo using `PartialEq` to detect result changes.
    ///
    /// The computation does not run immediately; it runs on first access
    /// or when first invalidated.
    pub fn create_memo<T>(&self, compute: impl Fn() -> T + Send + Sync + 'static) -> Memo<T>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
    {
        self.create_memo_with(compute, |a, b| a == b)
    }

    /// Create a memo with a custom equality function.
    ///
    /// The comparator gates downstream notification: when a recomputation
    /// produces a value equal to the previous one, the memo's own readers
    /// are left alone.
    pub fn create_memo_with<T>(
        &self,
        compute: impl Fn() -> T + Send + Sync + 'static,
        equals: impl Fn(&T, &T) -> bool + Send + Sync + 'static,
    ) -> Memo<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        let parent = self.inner.current_owner();
        if parent.is_none() {
            tracing::warn!("memo created outside a reactive root; it will only be freed with its handle");
        }
        let owner = self.inner.create_owner(parent);

        let inner = Arc::new(MemoInner {
            id: ComputationId::new(),
            out: SourceId::new(),
            owner,
            compute: Box::new(compute),
            equals: Box::new(equals),
            value: RwLock::new(None),
            state: RwLock::new(ComputationState::Stale),
            sources: RwLock::new(IndexSet::new()),
            disposed: AtomicBool::new(false),
            runtime: Arc::downgrade(&self.inner),
        });
        self.inner
            .register_computation(inner.clone() as Arc<dyn AnyComputation>);

        Memo { inner }
    }
}

impl<T> Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Get the memo's computation ID.
    pub fn id(&self) -> ComputationId {
        self.inner.id
    }

    /// Get the current value, resolving first if the memo is stale.
    ///
    /// If a computation is currently running, it is registered as a reader
    /// of the memo's output.
    ///
    /// # Panics
    ///
    /// Panics when called from inside the memo's own body (a memo may not
    /// read itself).
    pub fn get(&self) -> T {
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.track_read(self.inner.out);
        }
        self.resolve();
        self.inner
            .value
            .read()
            .expect("value lock poisoned")
            .clone()
            .expect("resolved memo should have a value")
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T {
        self.resolve();
        self.inner
            .value
            .read()
            .expect("value lock poisoned")
            .clone()
            .expect("resolved memo should have a value")
    }

    /// Get the current lifecycle state.
    pub fn state(&self) -> ComputationState {
        *self.inner.state.read().expect("state lock poisoned")
    }

    /// Check whether the memo has computed at least once.
    pub fn has_value(&self) -> bool {
        self.inner
            .value
            .read()
            .expect("value lock poisoned")
            .is_some()
    }

    /// Re-run the body if the cached value is missing or stale.
    fn resolve(&self) {
        let state = self.state();
        if state == ComputationState::Running {
            panic!("memo is already running; a memo may not read its own value");
        }
        if state == ComputationState::Clean && self.has_value() {
            return;
        }

        match self.inner.runtime.upgrade() {
            Some(runtime) => {
                // A pull may cascade notifications; scope them like a write.
                let _scope = BatchScope::enter(&runtime);
                self.inner.run();
            }
            None => {
                // The runtime is gone; compute once without tracking so the
                // handle still answers reads.
                let value = (self.inner.compute)();
                *self.inner.value.write().expect("value lock poisoned") = Some(value);
                *self.inner.state.write().expect("state lock poisoned") =
                    ComputationState::Clean;
            }
        }
    }
}

impl<T> AnyComputation for MemoInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn id(&self) -> ComputationId {
        self.id
    }

    fn owner(&self) -> OwnerId {
        self.owner
    }

    fn is_effect(&self) -> bool {
        false
    }

    fn is_running(&self) -> bool {
        *self.state.read().expect("state lock poisoned") == ComputationState::Running
    }

    fn mark_stale(&self) {
        if !self.disposed.load(Ordering::SeqCst) {
            *self.state.write().expect("state lock poisoned") = ComputationState::Stale;
        }
    }

    fn run(&self) {
        if self.disposed.load(Ordering::SeqCst) {
            return;
        }
        {
            let state = self.state.read().expect("state lock poisoned");
            if *state == ComputationState::Clean
                && self
                    .value
                    .read()
                    .expect("value lock poisoned")
                    .is_some()
            {
                // Already resolved through a pull earlier in this flush.
                return;
            }
        }
        let Some(runtime) = self.runtime.upgrade() else {
            return;
        };

        *self.state.write().expect("state lock poisoned") = ComputationState::Running;

        // Fall back to stale if the body panics, so the next trigger retries.
        struct StaleOnPanic<'a> {
            state: &'a RwLock<ComputationState>,
            armed: bool,
        }
        impl Drop for StaleOnPanic<'_> {
            fn drop(&mut self) {
                if self.armed {
                    *self.state.write().expect("state lock poisoned") =
                        ComputationState::Stale;
                }
            }
        }
        let mut panic_guard = StaleOnPanic {
            state: &self.state,
            armed: true,
        };

        let scope = runtime.enter_computation(self.owner, self.id);
        let new_value = (self.compute)();
        let reads = scope.finish();
        runtime.update_sources(self.id, &self.sources, reads);

        let changed = {
            let value = self.value.read().expect("value lock poisoned");
            match &*value {
                Some(old) => !(self.equals)(old, &new_value),
                None => true,
            }
        };
        *self.value.write().expect("value lock poisoned") = Some(new_value);
        panic_guard.armed = false;
        *self.state.write().expect("state lock poisoned") = ComputationState::Clean;

        if changed {
            runtime.notify(self.out);
        }
    }

    fn teardown(&self) {
        if self.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.remove_computation(self.id, &self.sources);
            runtime.remove_source(self.out);
        }
    }
}

impl<T> Clone for Memo<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Memo<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Memo")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("has_value", &self.has_value())
            .finish()
    }
}

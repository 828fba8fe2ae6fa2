//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects signals, memos,
//! effects, and owners. It records which computation is currently running,
//! routes change notifications, and schedules deferred work.
//!
//! # How It Works
//!
//! 1. When a source (a signal, or a memo's output) is read while a
//!    computation is running, the runtime records the dependency.
//!
//! 2. When a source changes, the runtime:
//!    a. Takes the source's current reader set (readers re-collect on
//!       their next run)
//!    b. Marks memo readers stale and queues them for resolution
//!    c. Queues effect readers for the render phase
//!
//! 3. Every write happens inside a batch scope. When the outermost scope
//!    exits, the runtime resolves all stale memos first (in queue order,
//!    each re-deriving depth-first), then runs each queued effect exactly
//!    once.
//!
//! # One Runtime Per World
//!
//! Nothing here is a true global. The ambient "currently running
//! computation" and "current owner" slots live on the runtime itself, so
//! independent runtimes never cross-talk and every test can construct a
//! fresh one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, Weak};

use indexmap::IndexSet;

use super::owner::{OwnerId, OwnerRecord};

/// Unique identifier for a readable source: a signal, or a memo's output.
///
/// Signals and memo outputs share one namespace so a single notification
/// path serves both.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceId(u64);

impl SourceId {
    /// Generate a new unique source ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for SourceId {
    fn default() -> Self {
        Self::new()
    }
}

/// Unique identifier for a computation (memo or effect).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputationId(u64);

impl ComputationId {
    /// Generate a new unique computation ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ComputationId {
    fn default() -> Self {
        Self::new()
    }
}

/// The runtime-facing face of a memo or effect.
///
/// The runtime's registry holds these weakly; the strong references live on
/// the owner tree, so disposing an owner is what actually frees a
/// computation.
pub(crate) trait AnyComputation: Send + Sync {
    /// The computation's unique ID.
    fn id(&self) -> ComputationId;

    /// The owner node backing this computation.
    fn owner(&self) -> OwnerId;

    /// Whether this computation is an effect (queued for the render phase)
    /// rather than a memo (resolved synchronously).
    fn is_effect(&self) -> bool;

    /// Whether the computation's body is executing right now. A running
    /// computation observes fresh values already, so notification skips it.
    fn is_running(&self) -> bool;

    /// Mark the computation stale; the next resolution re-runs it.
    fn mark_stale(&self);

    /// Re-run the computation, re-collecting its dependency set.
    fn run(&self);

    /// Permanently stop the computation and drop its registrations.
    fn teardown(&self);
}

/// A frame on the tracking stack: the computation currently collecting
/// dependencies, or `None` inside an `untrack` scope.
struct TrackingFrame {
    computation: Option<ComputationId>,
    reads: IndexSet<SourceId>,
}

/// A handle to an independent reactive runtime.
///
/// Cloning is cheap; clones share the same world. Signals, memos, effects,
/// and owners created through one handle are visible through all of them.
#[derive(Clone, Default)]
pub struct Runtime {
    pub(crate) inner: Arc<RuntimeInner>,
}

impl Runtime {
    /// Create a fresh, empty runtime.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RuntimeInner::default()),
        }
    }

    /// Execute `f` with change notifications deferred.
    ///
    /// Writes inside the batch apply immediately, but dependent memos
    /// reconcile once and each affected effect runs exactly once, after
    /// the outermost batch exits. Nested batches compose; only the
    /// outermost flushes. The flush happens even if `f` panics.
    pub fn batch<T>(&self, f: impl FnOnce() -> T) -> T {
        let _scope = BatchScope::enter(&self.inner);
        f()
    }

    /// Execute `f` without collecting dependencies.
    ///
    /// Source reads inside `f` do not subscribe the surrounding
    /// computation, so later writes to those sources will not re-trigger
    /// it.
    pub fn untrack<T>(&self, f: impl FnOnce() -> T) -> T {
        self.inner
            .tracking
            .write()
            .expect("tracking stack lock poisoned")
            .push(TrackingFrame {
                computation: None,
                reads: IndexSet::new(),
            });

        struct PopFrame<'a>(&'a RuntimeInner);
        impl Drop for PopFrame<'_> {
            fn drop(&mut self) {
                self.0
                    .tracking
                    .write()
                    .expect("tracking stack lock poisoned")
                    .pop();
            }
        }

        let _guard = PopFrame(&self.inner);
        f()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("computations", &self.inner.registry_len())
            .field("owners", &self.inner.owner_count())
            .field(
                "batch_depth",
                &self.inner.batch_depth.load(Ordering::SeqCst),
            )
            .finish()
    }
}

/// Shared state behind a [`Runtime`] handle.
#[derive(Default)]
pub(crate) struct RuntimeInner {
    /// All live computations, held weakly. Owners hold the strong refs.
    registry: RwLock<HashMap<ComputationId, Weak<dyn AnyComputation>>>,

    /// Which computations currently read which source. Taken (and thereby
    /// cleared for re-collection) on every notification.
    readers: RwLock<HashMap<SourceId, IndexSet<ComputationId>>>,

    /// The owner arena, indexed by integer id. Parents are stored as ids
    /// rather than references, keeping ancestor walks cheap and lifetimes
    /// simple.
    pub(crate) owners: RwLock<HashMap<OwnerId, OwnerRecord>>,

    /// Ambient owner stack. The top entry owns computations, cleanups, and
    /// context entries created right now.
    owner_stack: RwLock<Vec<OwnerId>>,

    /// Active computation stack for dependency collection.
    tracking: RwLock<Vec<TrackingFrame>>,

    /// Current batch nesting depth. The flush runs when this returns to
    /// zero.
    batch_depth: AtomicUsize,

    /// Re-entrancy guard for the flush loop.
    flushing: AtomicBool,

    /// Stale memos awaiting resolution, in notification order, deduplicated.
    pending_memos: RwLock<IndexSet<ComputationId>>,

    /// Effects awaiting the render phase, in notification order,
    /// deduplicated.
    pending_effects: RwLock<IndexSet<ComputationId>>,
}

impl RuntimeInner {
    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Register a computation and attach its strong reference to its owner.
    pub(crate) fn register_computation(&self, computation: Arc<dyn AnyComputation>) {
        let id = computation.id();
        let owner = computation.owner();

        self.registry
            .write()
            .expect("registry lock poisoned")
            .insert(id, Arc::downgrade(&computation));

        let mut owners = self.owners.write().expect("owner arena lock poisoned");
        if let Some(record) = owners.get_mut(&owner) {
            record.computations.push(computation);
        }
    }

    /// Look up a live computation by ID.
    pub(crate) fn computation(&self, id: ComputationId) -> Option<Arc<dyn AnyComputation>> {
        self.registry
            .read()
            .expect("registry lock poisoned")
            .get(&id)
            .and_then(Weak::upgrade)
    }

    /// Drop every trace of a computation: registry entry, reader-set
    /// memberships, and queue entries.
    pub(crate) fn remove_computation(
        &self,
        id: ComputationId,
        sources: &RwLock<IndexSet<SourceId>>,
    ) {
        self.registry
            .write()
            .expect("registry lock poisoned")
            .remove(&id);

        let sources = std::mem::take(&mut *sources.write().expect("source set lock poisoned"));
        {
            let mut readers = self.readers.write().expect("reader map lock poisoned");
            for source in sources {
                if let Some(set) = readers.get_mut(&source) {
                    set.shift_remove(&id);
                }
            }
        }

        self.pending_memos
            .write()
            .expect("pending memo queue lock poisoned")
            .shift_remove(&id);
        self.pending_effects
            .write()
            .expect("pending effect queue lock poisoned")
            .shift_remove(&id);
    }

    fn registry_len(&self) -> usize {
        self.registry.read().expect("registry lock poisoned").len()
    }

    fn owner_count(&self) -> usize {
        self.owners.read().expect("owner arena lock poisoned").len()
    }

    // ------------------------------------------------------------------
    // Dependency collection
    // ------------------------------------------------------------------

    /// Record that the active computation (if any) read `source`.
    pub(crate) fn track_read(&self, source: SourceId) {
        let computation = {
            let mut tracking = self.tracking.write().expect("tracking stack lock poisoned");
            let Some(frame) = tracking.last_mut() else {
                return;
            };
            let Some(computation) = frame.computation else {
                // Inside an untrack scope.
                return;
            };
            frame.reads.insert(source);
            computation
        };

        self.readers
            .write()
            .expect("reader map lock poisoned")
            .entry(source)
            .or_default()
            .insert(computation);
    }

    /// Begin a computation run: tear down the previous run's scope
    /// contents, then install the computation as the ambient owner and
    /// active tracker. The returned scope pops both on drop, panics
    /// included.
    pub(crate) fn enter_computation(
        &self,
        owner: OwnerId,
        computation: ComputationId,
    ) -> ComputationScope<'_> {
        self.clean_owner(owner);
        self.owner_stack
            .write()
            .expect("owner stack lock poisoned")
            .push(owner);
        self.tracking
            .write()
            .expect("tracking stack lock poisoned")
            .push(TrackingFrame {
                computation: Some(computation),
                reads: IndexSet::new(),
            });
        ComputationScope {
            runtime: self,
            finished: false,
        }
    }

    /// Replace a computation's tracked source set, unsubscribing from every
    /// source it did not read this run. Branches not taken stop triggering
    /// recomputation.
    pub(crate) fn update_sources(
        &self,
        computation: ComputationId,
        sources: &RwLock<IndexSet<SourceId>>,
        new_reads: IndexSet<SourceId>,
    ) {
        let old = std::mem::replace(
            &mut *sources.write().expect("source set lock poisoned"),
            new_reads.clone(),
        );

        let mut readers = self.readers.write().expect("reader map lock poisoned");
        for source in old {
            if !new_reads.contains(&source) {
                if let Some(set) = readers.get_mut(&source) {
                    set.shift_remove(&computation);
                }
            }
        }
        // Re-register every kept read. A notification that fired mid-run
        // drops this computation from the reader set; without this it would
        // never hear from that source again.
        for source in new_reads {
            readers.entry(source).or_default().insert(computation);
        }
    }

    /// Drop a source's reader bookkeeping entirely (last handle gone).
    pub(crate) fn remove_source(&self, source: SourceId) {
        self.readers
            .write()
            .expect("reader map lock poisoned")
            .remove(&source);
    }

    // ------------------------------------------------------------------
    // Notification and scheduling
    // ------------------------------------------------------------------

    /// Notify every current reader of `source` that it changed.
    ///
    /// The reader set is taken, not copied: readers re-register on their
    /// next run. Memo readers are marked stale and queued for synchronous
    /// resolution; effect readers are queued for the render phase. Readers
    /// that are mid-run already observe the new value and are skipped.
    pub(crate) fn notify(&self, source: SourceId) {
        let reader_ids: Vec<ComputationId> = {
            let mut readers = self.readers.write().expect("reader map lock poisoned");
            match readers.get_mut(&source) {
                Some(set) => std::mem::take(set).into_iter().collect(),
                None => return,
            }
        };

        if reader_ids.is_empty() {
            return;
        }
        tracing::trace!(
            source = source.raw(),
            readers = reader_ids.len(),
            "source changed"
        );

        for id in reader_ids {
            let Some(computation) = self.computation(id) else {
                continue;
            };
            if computation.is_running() {
                continue;
            }
            if computation.is_effect() {
                self.pending_effects
                    .write()
                    .expect("pending effect queue lock poisoned")
                    .insert(id);
            } else {
                computation.mark_stale();
                self.pending_memos
                    .write()
                    .expect("pending memo queue lock poisoned")
                    .insert(id);
            }
        }
    }

    /// Current number of computations reading `source`.
    pub(crate) fn reader_count(&self, source: SourceId) -> usize {
        self.readers
            .read()
            .expect("reader map lock poisoned")
            .get(&source)
            .map(IndexSet::len)
            .unwrap_or(0)
    }

    /// Drain the deferred queues: every stale memo first, then each queued
    /// effect exactly once, both in notification order. Re-entrant calls
    /// (an effect writing a signal mid-flush) return immediately and let
    /// the outer loop pick up the new work.
    fn flush(&self) {
        if self.flushing.swap(true, Ordering::SeqCst) {
            return;
        }

        struct FlushDone<'a>(&'a AtomicBool);
        impl Drop for FlushDone<'_> {
            fn drop(&mut self) {
                self.0.store(false, Ordering::SeqCst);
            }
        }
        let _done = FlushDone(&self.flushing);

        loop {
            let next_memo = self
                .pending_memos
                .write()
                .expect("pending memo queue lock poisoned")
                .shift_remove_index(0);
            if let Some(id) = next_memo {
                if let Some(computation) = self.computation(id) {
                    computation.run();
                }
                continue;
            }

            let next_effect = self
                .pending_effects
                .write()
                .expect("pending effect queue lock poisoned")
                .shift_remove_index(0);
            if let Some(id) = next_effect {
                tracing::trace!(computation = id.raw(), "running queued effect");
                if let Some(computation) = self.computation(id) {
                    computation.run();
                }
                continue;
            }

            break;
        }
    }

    // ------------------------------------------------------------------
    // Owner arena
    // ------------------------------------------------------------------

    /// Allocate an owner record under `parent` (or as a root).
    pub(crate) fn create_owner(&self, parent: Option<OwnerId>) -> OwnerId {
        let id = OwnerId::new();
        let mut owners = self.owners.write().expect("owner arena lock poisoned");
        owners.insert(id, OwnerRecord::new(parent));
        if let Some(parent) = parent {
            if let Some(record) = owners.get_mut(&parent) {
                record.children.push(id);
            }
        }
        id
    }

    /// The owner on top of the ambient stack, if any.
    pub(crate) fn current_owner(&self) -> Option<OwnerId> {
        self.owner_stack
            .read()
            .expect("owner stack lock poisoned")
            .last()
            .copied()
    }

    /// Push `owner` as the ambient owner; the returned scope pops it.
    pub(crate) fn enter_owner(&self, owner: OwnerId) -> OwnerScope<'_> {
        self.owner_stack
            .write()
            .expect("owner stack lock poisoned")
            .push(owner);
        OwnerScope { runtime: self }
    }

    /// Reset an owner for a computation re-run: run its cleanups in reverse
    /// registration order, dispose its child owners, and clear its context
    /// entries. The record itself and its computations survive.
    pub(crate) fn clean_owner(&self, owner: OwnerId) {
        let (cleanups, children) = {
            let mut owners = self.owners.write().expect("owner arena lock poisoned");
            let Some(record) = owners.get_mut(&owner) else {
                return;
            };
            record.context.clear();
            // Bind first so the cleanup list guard drops before `owners`.
            let cleanups = std::mem::take(
                &mut *record
                    .cleanups
                    .lock()
                    .expect("cleanup list lock poisoned"),
            );
            (cleanups, std::mem::take(&mut record.children))
        };

        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
        for child in children {
            self.dispose_owner(child);
        }
    }

    /// Dispose an owner subtree: cleanups in reverse order, then children
    /// depth-first, then the owner's computations, then detach from the
    /// parent. Idempotent; a second call is a no-op.
    pub(crate) fn dispose_owner(&self, owner: OwnerId) {
        let parts = {
            let mut owners = self.owners.write().expect("owner arena lock poisoned");
            match owners.get_mut(&owner) {
                Some(record) if !record.disposed => {
                    record.disposed = true;
                    // Bind first so the cleanup list guard drops before
                    // `owners`.
                    let cleanups = std::mem::take(
                        &mut *record
                            .cleanups
                            .lock()
                            .expect("cleanup list lock poisoned"),
                    );
                    Some((
                        cleanups,
                        std::mem::take(&mut record.children),
                        std::mem::take(&mut record.computations),
                        record.parent,
                    ))
                }
                _ => None,
            }
        };
        let Some((cleanups, children, computations, parent)) = parts else {
            return;
        };
        tracing::trace!(owner = owner.raw(), "disposing owner");

        for cleanup in cleanups.into_iter().rev() {
            cleanup();
        }
        for child in children {
            self.dispose_owner(child);
        }
        for computation in computations {
            computation.teardown();
        }

        let mut owners = self.owners.write().expect("owner arena lock poisoned");
        if let Some(parent) = parent {
            if let Some(record) = owners.get_mut(&parent) {
                record.children.retain(|child| *child != owner);
            }
        }
        owners.remove(&owner);
    }
}

/// Guard installed for the duration of a computation run.
///
/// Popping through `Drop` keeps the stacks consistent when the body panics;
/// `finish` pops normally and hands back the collected reads.
pub(crate) struct ComputationScope<'a> {
    runtime: &'a RuntimeInner,
    finished: bool,
}

impl ComputationScope<'_> {
    /// End the run and return the sources read during it.
    pub(crate) fn finish(mut self) -> IndexSet<SourceId> {
        self.finished = true;
        let frame = self
            .runtime
            .tracking
            .write()
            .expect("tracking stack lock poisoned")
            .pop()
            .expect("tracking stack underflow");
        self.runtime
            .owner_stack
            .write()
            .expect("owner stack lock poisoned")
            .pop();
        frame.reads
    }
}

impl Drop for ComputationScope<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.runtime
                .tracking
                .write()
                .expect("tracking stack lock poisoned")
                .pop();
            self.runtime
                .owner_stack
                .write()
                .expect("owner stack lock poisoned")
                .pop();
        }
    }
}

/// Guard popping an ambient owner pushed outside a computation run.
pub(crate) struct OwnerScope<'a> {
    runtime: &'a RuntimeInner,
}

impl Drop for OwnerScope<'_> {
    fn drop(&mut self) {
        self.runtime
            .owner_stack
            .write()
            .expect("owner stack lock poisoned")
            .pop();
    }
}

/// Batch nesting guard. The outermost scope flushes on exit, panics
/// included.
pub(crate) struct BatchScope<'a> {
    runtime: &'a RuntimeInner,
}

impl<'a> BatchScope<'a> {
    pub(crate) fn enter(runtime: &'a RuntimeInner) -> Self {
        runtime.batch_depth.fetch_add(1, Ordering::SeqCst);
        Self { runtime }
    }
}

impl Drop for BatchScope<'_> {
    fn drop(&mut self) {
        if self.runtime.batch_depth.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.runtime.flush();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicI32;

    struct MockComputation {
        id: ComputationId,
        owner: OwnerId,
        effect: bool,
        stale: AtomicBool,
        runs: AtomicI32,
    }

    impl MockComputation {
        fn new(runtime: &RuntimeInner, effect: bool) -> Arc<Self> {
            let owner = runtime.create_owner(None);
            Arc::new(Self {
                id: ComputationId::new(),
                owner,
                effect,
                stale: AtomicBool::new(false),
                runs: AtomicI32::new(0),
            })
        }
    }

    impl AnyComputation for MockComputation {
        fn id(&self) -> ComputationId {
            self.id
        }

        fn owner(&self) -> OwnerId {
            self.owner
        }

        fn is_effect(&self) -> bool {
            self.effect
        }

        fn is_running(&self) -> bool {
            false
        }

        fn mark_stale(&self) {
            self.stale.store(true, Ordering::SeqCst);
        }

        fn run(&self) {
            self.stale.store(false, Ordering::SeqCst);
            self.runs.fetch_add(1, Ordering::SeqCst);
        }

        fn teardown(&self) {}
    }

    #[test]
    fn tracking_records_reads_for_active_computation() {
        let runtime = Runtime::new();
        let computation = MockComputation::new(&runtime.inner, false);
        runtime.inner.register_computation(computation.clone());

        let source = SourceId::new();
        let scope = runtime
            .inner
            .enter_computation(computation.owner, computation.id);
        runtime.inner.track_read(source);
        let reads = scope.finish();

        assert!(reads.contains(&source));
        assert_eq!(runtime.inner.reader_count(source), 1);
    }

    #[test]
    fn untrack_suppresses_collection() {
        let runtime = Runtime::new();
        let computation = MockComputation::new(&runtime.inner, false);
        runtime.inner.register_computation(computation.clone());

        let source = SourceId::new();
        let scope = runtime
            .inner
            .enter_computation(computation.owner, computation.id);
        runtime.untrack(|| runtime.inner.track_read(source));
        let reads = scope.finish();

        assert!(reads.is_empty());
        assert_eq!(runtime.inner.reader_count(source), 0);
    }

    #[test]
    fn notify_queues_effects_and_marks_memos() {
        let runtime = Runtime::new();
        let memo = MockComputation::new(&runtime.inner, false);
        let effect = MockComputation::new(&runtime.inner, true);
        runtime.inner.register_computation(memo.clone());
        runtime.inner.register_computation(effect.clone());

        let source = SourceId::new();
        for computation in [&memo, &effect] {
            let scope = runtime
                .inner
                .enter_computation(computation.owner, computation.id);
            runtime.inner.track_read(source);
            scope.finish();
        }

        runtime.batch(|| runtime.inner.notify(source));

        assert_eq!(memo.runs.load(Ordering::SeqCst), 1);
        assert_eq!(effect.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn nested_batches_flush_once_at_outermost_exit() {
        let runtime = Runtime::new();
        let effect = MockComputation::new(&runtime.inner, true);
        runtime.inner.register_computation(effect.clone());

        let source = SourceId::new();
        let scope = runtime.inner.enter_computation(effect.owner, effect.id);
        runtime.inner.track_read(source);
        scope.finish();

        runtime.batch(|| {
            runtime.inner.notify(source);
            runtime.batch(|| {
                // Inner batch must not flush early.
                assert_eq!(effect.runs.load(Ordering::SeqCst), 0);
            });
            assert_eq!(effect.runs.load(Ordering::SeqCst), 0);
        });
        assert_eq!(effect.runs.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reader_set_clears_on_notify() {
        let runtime = Runtime::new();
        let effect = MockComputation::new(&runtime.inner, true);
        runtime.inner.register_computation(effect.clone());

        let source = SourceId::new();
        let scope = runtime.inner.enter_computation(effect.owner, effect.id);
        runtime.inner.track_read(source);
        scope.finish();
        assert_eq!(runtime.inner.reader_count(source), 1);

        runtime.batch(|| runtime.inner.notify(source));
        // The mock's run does not re-read, so the set stays empty.
        assert_eq!(runtime.inner.reader_count(source), 0);
    }
}

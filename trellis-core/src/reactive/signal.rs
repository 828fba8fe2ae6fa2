//! Signal Implementation
//!
//! A Signal is the fundamental reactive primitive. It holds a value and
//! the runtime tracks which computations depend on it.
//!
//! # How Signals Work
//!
//! 1. When a signal is read while a computation is running, the runtime
//!    registers that computation as a reader.
//!
//! 2. When a signal's value changes (per its equality function), all
//!    current readers are invalidated and the reader set is cleared for
//!    re-collection.
//!
//! 3. Writes that compare equal to the current value are no-ops: no
//!    notification, no recomputation.
//!
//! # Thread Safety
//!
//! The value sits behind a `RwLock`; the closure producing the replacement
//! in [`Signal::update`] runs outside the write lock, so a signal may be
//! written from within a computation that also reads it.

use std::fmt::Debug;
use std::sync::{Arc, RwLock, Weak};

use super::runtime::{BatchScope, Runtime, RuntimeInner, SourceId};

type EqualsFn<T> = Box<dyn Fn(&T, &T) -> bool + Send + Sync>;

/// A reactive signal holding a value of type T.
///
/// Handles are cheap to clone and share one underlying cell. Created
/// through [`Runtime::create_signal`].
///
/// # Example
///
/// ```rust,ignore
/// let runtime = Runtime::new();
/// let count = runtime.create_signal(0);
///
/// // Read the value (registers the running computation, if any)
/// let value = count.get();
///
/// // Update the value (invalidates readers)
/// count.set(5);
/// ```
pub struct Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    inner: Arc<SignalInner<T>>,
}

struct SignalInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Source identity shared with the runtime's reader map.
    id: SourceId,

    /// The current value.
    value: RwLock<T>,

    /// Decides whether a write actually changed anything.
    equals: EqualsFn<T>,

    /// Weak so that a forgotten signal handle never keeps a runtime alive.
    runtime: Weak<RuntimeInner>,
}

impl<T> Drop for SignalInner<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.remove_source(self.id);
        }
    }
}

impl Runtime {
    /// Create a signal with the given initial value, using `PartialEq` to
    /// detect changes.
    pub fn create_signal<T>(&self, value: T) -> Signal<T>
    where
        T: Clone + Send + Sync + PartialEq + 'static,
    {
        self.create_signal_with(value, |a, b| a == b)
    }

    /// Create a signal with a custom equality function.
    ///
    /// The comparator decides whether a write is a change; writes whose
    /// new value compares equal to the current one notify nobody.
    pub fn create_signal_with<T>(
        &self,
        value: T,
        equals: impl Fn(&T, &T) -> bool + Send + Sync + 'static,
    ) -> Signal<T>
    where
        T: Clone + Send + Sync + 'static,
    {
        Signal {
            inner: Arc::new(SignalInner {
                id: SourceId::new(),
                value: RwLock::new(value),
                equals: Box::new(equals),
                runtime: Arc::downgrade(&self.inner),
            }),
        }
    }
}

impl<T> Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Get the signal's source ID.
    pub fn id(&self) -> SourceId {
        self.inner.id
    }

    /// Get the current value.
    ///
    /// If a computation is currently running, it is registered as a reader
    /// and will be invalidated by the next change.
    pub fn get(&self) -> T {
        if let Some(runtime) = self.inner.runtime.upgrade() {
            runtime.track_read(self.inner.id);
        }
        self.inner
            .value
            .read()
            .expect("value lock poisoned")
            .clone()
    }

    /// Get the current value without registering a dependency.
    pub fn get_untracked(&self) -> T {
        self.inner
            .value
            .read()
            .expect("value lock poisoned")
            .clone()
    }

    /// Set a new value and invalidate readers.
    ///
    /// A no-op when the signal's equality function reports the value
    /// unchanged. Outside a batch the write propagates inline: dependent
    /// memos reconcile and queued effects run before `set` returns. Inside
    /// a batch, effect execution is deferred to batch exit.
    pub fn set(&self, value: T) {
        {
            let current = self.inner.value.read().expect("value lock poisoned");
            if (self.inner.equals)(&current, &value) {
                return;
            }
        }
        *self.inner.value.write().expect("value lock poisoned") = value;

        if let Some(runtime) = self.inner.runtime.upgrade() {
            tracing::trace!(source = self.inner.id.raw(), "signal write");
            let _scope = BatchScope::enter(&runtime);
            runtime.notify(self.inner.id);
        }
    }

    /// Update the value using a function of the current value.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        let new_value = {
            let current = self.inner.value.read().expect("value lock poisoned");
            f(&current)
        };
        self.set(new_value);
    }

    /// Number of computations currently subscribed to this signal.
    pub fn reader_count(&self) -> usize {
        match self.inner.runtime.upgrade() {
            Some(runtime) => runtime.reader_count(self.inner.id),
            None => 0,
        }
    }
}

impl<T> Clone for Signal<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Debug for Signal<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Signal")
            .field("id", &self.inner.id)
            .field("value", &self.get_untracked())
            .field("reader_count", &self.reader_count())
            .finish()
    }
}

//! Owner Tree
//!
//! Every computation lives under an owner: a node in a strict tree that
//! controls its lifetime. Disposing an owner tears down everything created
//! beneath it exactly once: cleanups first (in reverse registration
//! order), then child owners depth-first, then the owner's computations.
//!
//! Owners are arena records indexed by integer id; the parent link is an
//! id, not a reference, so ancestor walks for context lookup and disposal
//! are O(1) per step with no lifetime entanglement.
//!
//! An owner is only ever created as a nested call during another owner's
//! run (or as a root), so the tree can hold no cycles by construction.

use std::any::Any;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use smallvec::SmallVec;

use super::context::ContextId;
use super::runtime::{AnyComputation, Runtime, RuntimeInner};
use crate::error::Error;

/// Unique identifier for an owner record in the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Generate a new unique owner ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for OwnerId {
    fn default() -> Self {
        Self::new()
    }
}

/// One node of the owner tree.
pub(crate) struct OwnerRecord {
    /// Parent owner, or `None` for a root.
    pub(crate) parent: Option<OwnerId>,

    /// Child owners in creation order.
    pub(crate) children: SmallVec<[OwnerId; 4]>,

    /// Cleanup callbacks in registration order; they run in reverse.
    /// The inner lock exists so the record stays `Sync` despite holding
    /// `FnOnce` boxes; the arena lock already serializes access.
    pub(crate) cleanups: Mutex<Vec<Box<dyn FnOnce() + Send>>>,

    /// Context entries provided on this owner.
    pub(crate) context: HashMap<ContextId, Arc<dyn Any + Send + Sync>>,

    /// Strong references keeping this owner's computations alive.
    pub(crate) computations: SmallVec<[Arc<dyn AnyComputation>; 1]>,

    /// Set once disposal starts; makes disposal idempotent.
    pub(crate) disposed: bool,
}

impl OwnerRecord {
    pub(crate) fn new(parent: Option<OwnerId>) -> Self {
        Self {
            parent,
            children: SmallVec::new(),
            cleanups: Mutex::new(Vec::new()),
            context: HashMap::new(),
            computations: SmallVec::new(),
            disposed: false,
        }
    }
}

/// Disposer for a root owner created by [`Runtime::create_root`].
///
/// Disposal is explicit: dropping the handle does nothing, calling
/// [`dispose`](RootOwner::dispose) tears the whole subtree down. A second
/// call is a no-op.
pub struct RootOwner {
    runtime: Weak<RuntimeInner>,
    id: OwnerId,
}

impl RootOwner {
    /// The root owner's arena id.
    pub fn id(&self) -> OwnerId {
        self.id
    }

    /// Dispose the root and everything created under it. Idempotent.
    pub fn dispose(&self) {
        if let Some(runtime) = self.runtime.upgrade() {
            runtime.dispose_owner(self.id);
        }
    }

    /// Whether the root has already been disposed.
    pub fn is_disposed(&self) -> bool {
        match self.runtime.upgrade() {
            Some(runtime) => !runtime
                .owners
                .read()
                .expect("owner arena lock poisoned")
                .contains_key(&self.id),
            None => true,
        }
    }
}

impl std::fmt::Debug for RootOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootOwner")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Runtime {
    /// Run `f` under a fresh root owner and return its result together
    /// with a disposer for the whole subtree.
    ///
    /// The root stays installed as the ambient owner for the duration of
    /// `f`, and signals created inside keep scheduling effects through it
    /// afterwards, until the disposer is called.
    ///
    /// If another owner is already active, the root nests under it so
    /// context entries stay visible and disposing the outer scope also
    /// tears down the new root.
    pub fn create_root<T>(&self, f: impl FnOnce() -> T) -> (T, RootOwner) {
        let id = self.inner.create_owner(self.inner.current_owner());
        let value = {
            let _scope = self.inner.enter_owner(id);
            f()
        };
        let root = RootOwner {
            runtime: Arc::downgrade(&self.inner),
            id,
        };
        (value, root)
    }

    /// Register `f` to run when the current owner is cleaned or disposed.
    ///
    /// # Panics
    ///
    /// Panics when no owner is active; use
    /// [`try_on_cleanup`](Runtime::try_on_cleanup) to handle that case as
    /// a value.
    pub fn on_cleanup(&self, f: impl FnOnce() + Send + 'static) {
        if let Err(err) = self.try_on_cleanup(f) {
            panic!("{err}");
        }
    }

    /// Fallible variant of [`on_cleanup`](Runtime::on_cleanup).
    pub fn try_on_cleanup(&self, f: impl FnOnce() + Send + 'static) -> Result<(), Error> {
        let owner = self.inner.current_owner().ok_or(Error::NoActiveOwner)?;
        let mut owners = self.inner.owners.write().expect("owner arena lock poisoned");
        let record = owners.get_mut(&owner).ok_or(Error::NoActiveOwner)?;
        record
            .cleanups
            .lock()
            .expect("cleanup list lock poisoned")
            .push(Box::new(f));
        Ok(())
    }

    /// Dispose an arbitrary owner subtree by id. Idempotent.
    pub fn dispose(&self, owner: OwnerId) {
        self.inner.dispose_owner(owner);
    }
}

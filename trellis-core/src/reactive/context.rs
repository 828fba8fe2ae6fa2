//! Context Propagation
//!
//! Context carries a value down the owner tree without threading it
//! through every intermediate call. A provider stores the value on the
//! current owner; a consumer anywhere beneath that owner reads it by
//! walking its ancestor chain.
//!
//! # How It Works
//!
//! 1. [`create_context`] mints a typed key with a default value.
//!
//! 2. [`Runtime::provide_context`] attaches a value for that key to the
//!    current owner. Each owner holds at most one value per key.
//!
//! 3. [`Runtime::use_context`] walks from the current owner toward the
//!    root and returns the first value found, or the key's default when
//!    no ancestor provides one.
//!
//! Lookup respects the owner tree, not call order: siblings never see
//! each other's provisions, and a provider deeper in the tree shadows
//! one above it.

use std::any::Any;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::runtime::Runtime;
use crate::error::Error;

/// Unique identifier for a context key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContextId(u64);

impl ContextId {
    /// Generate a new unique context ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl Default for ContextId {
    fn default() -> Self {
        Self::new()
    }
}

/// A typed context key with a fallback value.
///
/// Two contexts created with the same type and default are still
/// distinct keys; identity is the key, not the type.
pub struct Context<T>
where
    T: Clone + Send + Sync + 'static,
{
    id: ContextId,
    default: T,
}

/// Create a context key with a default value.
///
/// The default is returned by [`Runtime::use_context`] when no ancestor
/// owner has provided a value for this key.
pub fn create_context<T>(default: T) -> Context<T>
where
    T: Clone + Send + Sync + 'static,
{
    Context {
        id: ContextId::new(),
        default,
    }
}

impl<T> Context<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Get the context key's ID.
    pub fn id(&self) -> ContextId {
        self.id
    }

    /// Get the key's default value.
    pub fn default_value(&self) -> T {
        self.default.clone()
    }
}

impl<T> Clone for Context<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            default: self.default.clone(),
        }
    }
}

impl<T> Debug for Context<T>
where
    T: Clone + Send + Sync + Debug + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("id", &self.id)
            .field("default", &self.default)
            .finish()
    }
}

impl Runtime {
    /// Provide a context value on the current owner.
    ///
    /// # Panics
    ///
    /// Panics when called outside any owner scope or when this owner
    /// already provides a value for the key. Use
    /// [`try_provide_context`](Runtime::try_provide_context) for a
    /// fallible variant.
    pub fn provide_context<T>(&self, context: &Context<T>, value: T)
    where
        T: Clone + Send + Sync + 'static,
    {
        self.try_provide_context(context, value)
            .unwrap_or_else(|err| panic!("{err}"));
    }

    /// Provide a context value on the current owner, reporting usage
    /// errors instead of panicking.
    pub fn try_provide_context<T>(&self, context: &Context<T>, value: T) -> Result<(), Error>
    where
        T: Clone + Send + Sync + 'static,
    {
        let Some(owner) = self.inner.current_owner() else {
            return Err(Error::NoActiveOwner);
        };
        let mut owners = self
            .inner
            .owners
            .write()
            .expect("owner arena lock poisoned");
        let record = owners.get_mut(&owner).ok_or(Error::NoActiveOwner)?;
        if record.context.contains_key(&context.id) {
            return Err(Error::ContextAlreadyProvided);
        }
        record
            .context
            .insert(context.id, Arc::new(value) as Arc<dyn Any + Send + Sync>);
        Ok(())
    }

    /// Read the nearest provided value for a context key.
    ///
    /// Walks from the current owner toward the root and returns the key's
    /// default when no ancestor provides a value.
    ///
    /// # Panics
    ///
    /// Panics when called outside any owner scope; use
    /// [`try_use_context`](Runtime::try_use_context) for a fallible
    /// variant.
    pub fn use_context<T>(&self, context: &Context<T>) -> T
    where
        T: Clone + Send + Sync + 'static,
    {
        self.try_use_context(context)
            .unwrap_or_else(|err| panic!("{err}"))
    }

    /// Fallible variant of [`use_context`](Runtime::use_context).
    pub fn try_use_context<T>(&self, context: &Context<T>) -> Result<T, Error>
    where
        T: Clone + Send + Sync + 'static,
    {
        let mut cursor = Some(self.inner.current_owner().ok_or(Error::NoActiveOwner)?);
        let owners = self
            .inner
            .owners
            .read()
            .expect("owner arena lock poisoned");
        while let Some(owner) = cursor {
            let Some(record) = owners.get(&owner) else {
                break;
            };
            if let Some(value) = record.context.get(&context.id) {
                let value = value
                    .clone()
                    .downcast::<T>()
                    .expect("context value type matches its key");
                return Ok((*value).clone());
            }
            cursor = record.parent;
        }
        Ok(context.default.clone())
    }
}

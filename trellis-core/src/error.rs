//! Error types for the reactive core and the tree layer.
//!
//! The core recovers nothing automatically. Usage errors (programmer
//! mistakes such as owner-scoped calls outside any owner) are surfaced
//! either as `Error` values through the `try_*` variants of an operation,
//! or as descriptive panics through the plain variants. Failures reported
//! by an external node family pass through as [`PropertyError`] without
//! reinterpretation.

use thiserror::Error;

/// Errors raised by the reactive core.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An owner-scoped operation (cleanup registration, context lookup)
    /// was invoked while no owner was active.
    #[error("no reactive owner is active; create one with `Runtime::create_root`")]
    NoActiveOwner,

    /// A context key was provided twice on the same owner. Context entries
    /// are immutable once set; shadow them from a nested scope instead.
    #[error("context is already provided on the current owner; shadow it from a nested scope")]
    ContextAlreadyProvided,

    /// A resolved child list contained another list. Child lists are flat;
    /// deeper nesting is a usage error, never silently flattened.
    #[error("child lists must be flat; found a nested list")]
    NestedChildList,

    /// A resolved child list contained an unresolved lazy child. Lazy
    /// children are only unwrapped at the top level of a children
    /// expression.
    #[error("child lists may not contain lazy children")]
    LazyChildInList,
}

/// Errors raised by a [`PropertyTarget`](crate::tree::PropertyTarget)
/// implementation, or by the binding layer dispatching onto one.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PropertyError {
    /// The node family has no attribute with this name.
    #[error("property `{0}` is not supported by this node family")]
    UnsupportedProperty(String),

    /// The node family has no event with this name.
    #[error("event `{0}` is not supported by this node family")]
    UnsupportedEvent(String),

    /// An event-named property was given a plain value.
    #[error("`{0}` names an event and requires a handler")]
    HandlerRequired(String),

    /// An attribute-named property was given an event handler.
    #[error("`{0}` names an attribute and requires a value")]
    ValueRequired(String),

    /// The underlying assignment was rejected by the node family. This is
    /// the implementor's catch-all for failures the other variants do not
    /// describe (bad value shape, read-only attribute, toolkit refusal).
    #[error("failed to apply `{property}`: {message}")]
    Rejected {
        /// The resolved property name.
        property: String,
        /// The node family's own description of the failure.
        message: String,
    },
}

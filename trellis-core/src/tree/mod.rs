//! Declarative-to-Imperative Tree Layer
//!
//! Drives an external retained tree (widgets, scene nodes) from reactive
//! state. The external tree stays authoritative; this layer only issues
//! inserts, removes, attribute writes, and event subscriptions through
//! two small traits:
//!
//! - [`TreeNode`]: structural access plus the two mutations the
//!   reconciler needs.
//! - [`PropertyTarget`]: attribute writes and event subscriptions with
//!   string names.
//!
//! [`children`] resolves a child expression to a stable shape,
//! [`mount_children`] keeps a parent synchronized with it, and
//! [`Bindings`] routes named properties onto a node.

mod children;
mod node;
mod props;
mod reconcile;

#[cfg(test)]
pub(crate) mod testing;

pub use children::{children, Child, Children};
pub use node::TreeNode;
pub use props::{
    bind_attribute, bind_event, camel_to_kebab, Bindings, PropertyName, PropertyTarget,
    PropertyValue,
};
pub use reconcile::{mount_children, reconcile};

//! Child Reconciliation
//!
//! [`reconcile`] moves a parent's managed children from one ordered list
//! to the next using only insert and remove operations on the external
//! tree. It is anchor-based rather than an edit-distance diff: cheap,
//! predictable, and minimal for the common cases (append, remove,
//! single move).
//!
//! # How It Works
//!
//! 1. Remove every managed node that does not survive into the next
//!    list.
//!
//! 2. Read back the parent's current child order, filtered to nodes of
//!    the next list. Children the reconciler does not manage are left
//!    untouched, so a foreign mutation between runs is tolerated.
//!
//! 3. Walk the next list from the end. A node already in place (it
//!    matches the tail of the live order) costs nothing; any other node
//!    is inserted before the previously placed node. The previously
//!    placed node is always a valid anchor because the walk goes right
//!    to left.

use std::sync::{Arc, RwLock};

use crate::reactive::{Effect, Runtime};

use super::children::Children;
use super::node::{child_order, TreeNode};

/// Mutate `parent` so its managed children go from `prev` to `next`.
///
/// Nodes in `prev` but not `next` are detached; nodes in `next` are
/// inserted or moved as needed. Children of `parent` that appear in
/// neither list are never touched.
pub fn reconcile<N: TreeNode>(parent: &N, prev: &[N], next: &[N]) {
    for node in prev {
        if !next.iter().any(|n| n.same(node)) {
            // Skip nodes a foreign mutation already detached.
            if node.parent().is_some_and(|p| p.same(parent)) {
                N::remove(parent, node);
            }
        }
    }
    if next.is_empty() {
        return;
    }

    let live: Vec<N> = child_order(parent)
        .into_iter()
        .filter(|c| next.iter().any(|n| n.same(c)))
        .collect();

    let mut anchor: Option<N> = None;
    let mut tail = live.len();
    for node in next.iter().rev() {
        if tail > 0 && live[tail - 1].same(node) {
            tail -= 1;
        } else {
            tracing::trace!("placing child");
            N::insert_before(parent, node, anchor.as_ref());
        }
        anchor = Some(node.clone());
    }
}

/// Keep `parent`'s managed children synchronized with a resolved child
/// source.
///
/// Runs a reconciling effect immediately and on every change to the
/// resolved shape. A cleanup registered on the current owner detaches
/// all managed nodes when the owner is disposed; without an active
/// owner the nodes simply stay mounted.
pub fn mount_children<N: TreeNode>(
    runtime: &Runtime,
    parent: N,
    children: Children<N>,
) -> Effect {
    let applied: Arc<RwLock<Vec<N>>> = Arc::new(RwLock::new(Vec::new()));

    let unmount_parent = parent.clone();
    let unmount_applied = applied.clone();
    let registered = runtime.try_on_cleanup(move || {
        let mounted = unmount_applied
            .read()
            .expect("applied children lock poisoned")
            .clone();
        reconcile(&unmount_parent, &mounted, &[]);
    });
    if registered.is_err() {
        tracing::warn!("children mounted outside a reactive root; they will never be detached");
    }

    runtime.create_effect(move || {
        let next = children.to_array();
        let prev = applied
            .read()
            .expect("applied children lock poisoned")
            .clone();
        reconcile(&parent, &prev, &next);
        *applied.write().expect("applied children lock poisoned") = next;
    })
}

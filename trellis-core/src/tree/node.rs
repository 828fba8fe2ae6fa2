//! Tree Node Abstraction
//!
//! The tree layer drives an external retained tree (a widget hierarchy,
//! a scene graph) through this trait rather than owning the tree itself.
//! Handles are cheap clones of an identity; two handles may name the
//! same underlying node, which [`TreeNode::same`] detects.

/// A handle to a node in an external mutable tree.
///
/// Implementations mutate the real tree in [`insert_before`] and
/// [`remove`]; the reconciler only ever touches the tree through these
/// two operations plus the traversal accessors.
///
/// [`insert_before`]: TreeNode::insert_before
/// [`remove`]: TreeNode::remove
pub trait TreeNode: Clone + Send + Sync + 'static {
    /// Whether two handles name the same underlying node.
    fn same(&self, other: &Self) -> bool;

    /// Insert `node` under `parent`, immediately before `anchor`.
    ///
    /// With no anchor the node is appended as the last child. A node
    /// already under `parent` is moved, not duplicated.
    fn insert_before(parent: &Self, node: &Self, anchor: Option<&Self>);

    /// Detach `node` from `parent`.
    fn remove(parent: &Self, node: &Self);

    /// The node's current parent, if attached.
    fn parent(&self) -> Option<Self>;

    /// The node's first child in tree order.
    fn first_child(&self) -> Option<Self>;

    /// The node's next sibling in tree order.
    fn next_sibling(&self) -> Option<Self>;
}

/// Iterate a parent's children in tree order.
pub(crate) fn child_order<N: TreeNode>(parent: &N) -> Vec<N> {
    let mut out = Vec::new();
    let mut cursor = parent.first_child();
    while let Some(node) = cursor {
        cursor = node.next_sibling();
        out.push(node);
    }
    out
}

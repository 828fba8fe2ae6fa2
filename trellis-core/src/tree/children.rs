//! Child Shape Resolution
//!
//! A component's children arrive in one of four shapes: nothing, a
//! single node, a list, or a deferred closure producing one of the
//! others. [`children`] wraps a child source in two memo layers so that
//! downstream consumers see a stable, resolved shape:
//!
//! 1. The outer memo caches the raw shape under structural equality, so
//!    a re-render that produces the same nodes does not look like a
//!    change.
//!
//! 2. The inner memo unwraps deferred closures (repeatedly, until a
//!    concrete shape appears) inside the tracking scope, so signals read
//!    by those closures become dependencies of the resolved shape.
//!
//! [`Children::to_array`] then normalizes the resolved shape to a flat
//! node list: nothing becomes the empty list, a node becomes a
//! singleton, and absences inside a list are dropped. Lists nest at
//! most one level; a list inside a list is a usage error, as is a
//! deferred closure inside a list.

use std::fmt::Debug;
use std::sync::Arc;

use crate::error::Error;
use crate::reactive::{Memo, Runtime};

use super::node::TreeNode;

type LazyChild<N> = Arc<dyn Fn() -> Child<N> + Send + Sync>;

/// One shape a child expression can take.
pub enum Child<N: TreeNode> {
    /// No child at all (conditional branches render this).
    Absent,

    /// A single tree node.
    Node(N),

    /// An ordered list of children, at most one level deep.
    List(Vec<Child<N>>),

    /// A deferred child, evaluated inside the resolver's tracking scope.
    Lazy(LazyChild<N>),
}

impl<N: TreeNode> Child<N> {
    /// Wrap a closure as a deferred child.
    pub fn lazy(f: impl Fn() -> Child<N> + Send + Sync + 'static) -> Self {
        Child::Lazy(Arc::new(f))
    }

    /// Structural identity comparison.
    ///
    /// Nodes compare by tree identity, lists elementwise, and deferred
    /// closures by pointer (a freshly built closure never equals an old
    /// one, which is what forces the resolver to re-run it).
    pub fn structural_eq(a: &Self, b: &Self) -> bool {
        match (a, b) {
            (Child::Absent, Child::Absent) => true,
            (Child::Node(x), Child::Node(y)) => x.same(y),
            (Child::List(xs), Child::List(ys)) => {
                xs.len() == ys.len()
                    && xs.iter().zip(ys).all(|(x, y)| Self::structural_eq(x, y))
            }
            (Child::Lazy(x), Child::Lazy(y)) => Arc::ptr_eq(x, y),
            _ => false,
        }
    }
}

impl<N: TreeNode> Clone for Child<N> {
    fn clone(&self) -> Self {
        match self {
            Child::Absent => Child::Absent,
            Child::Node(n) => Child::Node(n.clone()),
            Child::List(items) => Child::List(items.clone()),
            Child::Lazy(f) => Child::Lazy(Arc::clone(f)),
        }
    }
}

impl<N: TreeNode> PartialEq for Child<N> {
    fn eq(&self, other: &Self) -> bool {
        Self::structural_eq(self, other)
    }
}

impl<N: TreeNode> Debug for Child<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Child::Absent => write!(f, "Absent"),
            Child::Node(_) => write!(f, "Node(..)"),
            Child::List(items) => f.debug_tuple("List").field(&items.len()).finish(),
            Child::Lazy(_) => write!(f, "Lazy(..)"),
        }
    }
}

/// A resolved child source backed by two memo layers.
///
/// Created through [`children`]. Cloning shares the underlying memos.
#[derive(Clone)]
pub struct Children<N: TreeNode> {
    resolved: Memo<Child<N>>,
}

/// Wrap a child source in the two-layer resolver.
///
/// Reading the result inside a computation tracks both the source and
/// any signals read by deferred closures it contains.
pub fn children<N: TreeNode>(
    runtime: &Runtime,
    source: impl Fn() -> Child<N> + Send + Sync + 'static,
) -> Children<N> {
    let raw = runtime.create_memo_with(source, Child::structural_eq);
    let resolved = runtime.create_memo_with(
        move || {
            let mut child = raw.get();
            // Trampoline: a closure may itself return a closure.
            while let Child::Lazy(f) = child {
                child = f();
            }
            child
        },
        Child::structural_eq,
    );
    Children { resolved }
}

impl<N: TreeNode> Children<N> {
    /// The resolved shape, tracked.
    pub fn get(&self) -> Child<N> {
        self.resolved.get()
    }

    /// Normalize the resolved shape to a flat node list.
    ///
    /// Absent children are dropped; a single node becomes a singleton
    /// list. Returns an error when a list contains a nested list or a
    /// deferred closure.
    pub fn try_to_array(&self) -> Result<Vec<N>, Error> {
        match self.resolved.get() {
            Child::Absent => Ok(Vec::new()),
            Child::Node(n) => Ok(vec![n]),
            Child::List(items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Child::Absent => {}
                        Child::Node(n) => out.push(n),
                        Child::List(_) => return Err(Error::NestedChildList),
                        Child::Lazy(_) => return Err(Error::LazyChildInList),
                    }
                }
                Ok(out)
            }
            Child::Lazy(_) => unreachable!("resolver unwraps deferred children"),
        }
    }

    /// Like [`try_to_array`](Children::try_to_array) but panics on a
    /// malformed list.
    pub fn to_array(&self) -> Vec<N> {
        self.try_to_array().unwrap_or_else(|err| panic!("{err}"))
    }
}

impl<N: TreeNode> Debug for Children<N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Children").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{MockNode, MockTree};
    use super::*;
    use std::sync::atomic::{AtomicI32, Ordering};
    use std::sync::Arc;

    #[test]
    fn absent_normalizes_to_empty_list() {
        let runtime = Runtime::new();
        let resolved = children::<MockNode>(&runtime, || Child::Absent);
        assert_eq!(resolved.to_array().len(), 0);
    }

    #[test]
    fn single_node_normalizes_to_singleton() {
        let runtime = Runtime::new();
        let tree = MockTree::new();
        let node = tree.node("a");

        let source = node.clone();
        let resolved = children(&runtime, move || Child::Node(source.clone()));
        let array = resolved.to_array();
        assert_eq!(array.len(), 1);
        assert!(array[0].same(&node));
    }

    #[test]
    fn list_drops_absent_entries() {
        let runtime = Runtime::new();
        let tree = MockTree::new();
        let a = tree.node("a");
        let b = tree.node("b");

        let (a2, b2) = (a.clone(), b.clone());
        let resolved = children(&runtime, move || {
            Child::List(vec![
                Child::Node(a2.clone()),
                Child::Absent,
                Child::Node(b2.clone()),
            ])
        });
        let array = resolved.to_array();
        assert_eq!(array.len(), 2);
        assert!(array[0].same(&a));
        assert!(array[1].same(&b));
    }

    #[test]
    fn nested_list_is_a_usage_error() {
        let runtime = Runtime::new();
        let resolved = children::<MockNode>(&runtime, || {
            Child::List(vec![Child::List(vec![Child::Absent])])
        });
        assert_eq!(resolved.try_to_array(), Err(Error::NestedChildList));
    }

    #[test]
    fn lazy_inside_list_is_a_usage_error() {
        let runtime = Runtime::new();
        let resolved = children::<MockNode>(&runtime, || {
            Child::List(vec![Child::lazy(|| Child::Absent)])
        });
        assert_eq!(resolved.try_to_array(), Err(Error::LazyChildInList));
    }

    #[test]
    fn lazy_chains_unwrap_to_a_concrete_shape() {
        let runtime = Runtime::new();
        let tree = MockTree::new();
        let node = tree.node("a");

        let inner = node.clone();
        let resolved = children(&runtime, move || {
            let inner = inner.clone();
            Child::lazy(move || {
                let inner = inner.clone();
                Child::lazy(move || Child::Node(inner.clone()))
            })
        });
        let array = resolved.to_array();
        assert_eq!(array.len(), 1);
        assert!(array[0].same(&node));
    }

    #[test]
    fn lazy_reads_are_tracked_through_resolution() {
        let runtime = Runtime::new();
        let tree = MockTree::new();
        let a = tree.node("a");
        let b = tree.node("b");

        let which = runtime.create_signal(false);
        let which_reader = which.clone();
        let (a2, b2) = (a.clone(), b.clone());
        let resolved = children(&runtime, move || {
            let which_reader = which_reader.clone();
            let (a2, b2) = (a2.clone(), b2.clone());
            Child::lazy(move || {
                if which_reader.get() {
                    Child::Node(b2.clone())
                } else {
                    Child::Node(a2.clone())
                }
            })
        });

        assert!(resolved.to_array()[0].same(&a));
        which.set(true);
        assert!(resolved.to_array()[0].same(&b));
    }

    #[test]
    fn identical_shape_does_not_look_like_a_change() {
        let runtime = Runtime::new();
        let tree = MockTree::new();
        let a = tree.node("a");
        let b = tree.node("b");

        let tick = runtime.create_signal(0);
        let tick_reader = tick.clone();
        let (a2, b2) = (a.clone(), b.clone());
        // Re-runs on every tick but always yields the same nodes.
        let resolved = children(&runtime, move || {
            tick_reader.get();
            Child::List(vec![Child::Node(a2.clone()), Child::Node(b2.clone())])
        });

        let runs = Arc::new(AtomicI32::new(0));
        let runs_clone = runs.clone();
        let resolved_clone = resolved.clone();
        let ((), _root) = runtime.create_root(|| {
            runtime.create_effect(move || {
                resolved_clone.get();
                runs_clone.fetch_add(1, Ordering::SeqCst);
            });
        });
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tick.set(1);
        tick.set(2);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}

//! In-memory mock tree for exercising the tree layer without a real
//! widget toolkit. Every structural mutation is appended to a shared
//! operation log so tests can assert on exactly what the reconciler did.

use std::sync::{Arc, Mutex, Weak};

use super::node::TreeNode;

/// Factory for [`MockNode`]s sharing one operation log.
#[derive(Clone, Default)]
pub(crate) struct MockTree {
    ops: Arc<Mutex<Vec<String>>>,
}

impl MockTree {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn node(&self, label: &str) -> MockNode {
        MockNode {
            inner: Arc::new(MockNodeInner {
                label: label.to_string(),
                children: Mutex::new(Vec::new()),
                parent: Mutex::new(Weak::new()),
                ops: self.ops.clone(),
            }),
        }
    }

    /// Drain the operation log.
    pub(crate) fn take_ops(&self) -> Vec<String> {
        std::mem::take(&mut *self.ops.lock().unwrap())
    }

    /// Parent a node outside the reconciler, as a foreign mutation would.
    pub(crate) fn attach(parent: &MockNode, node: &MockNode) {
        MockNode::insert_before(parent, node, None);
    }

    /// Detach a node outside the reconciler.
    pub(crate) fn detach(parent: &MockNode, node: &MockNode) {
        MockNode::remove(parent, node);
    }
}

#[derive(Clone)]
pub(crate) struct MockNode {
    inner: Arc<MockNodeInner>,
}

struct MockNodeInner {
    label: String,
    children: Mutex<Vec<MockNode>>,
    parent: Mutex<Weak<MockNodeInner>>,
    ops: Arc<Mutex<Vec<String>>>,
}

impl MockNode {
    pub(crate) fn label(&self) -> &str {
        &self.inner.label
    }

    /// Labels of the node's children, in order.
    pub(crate) fn child_labels(&self) -> Vec<String> {
        self.inner
            .children
            .lock()
            .unwrap()
            .iter()
            .map(|c| c.inner.label.clone())
            .collect()
    }

    fn log(&self, op: String) {
        self.inner.ops.lock().unwrap().push(op);
    }
}

impl TreeNode for MockNode {
    fn same(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    fn insert_before(parent: &Self, node: &Self, anchor: Option<&Self>) {
        let mut children = parent.inner.children.lock().unwrap();
        // A move detaches first; one logged operation either way.
        children.retain(|c| !c.same(node));
        let position = match anchor {
            Some(anchor) => children
                .iter()
                .position(|c| c.same(anchor))
                .unwrap_or(children.len()),
            None => children.len(),
        };
        children.insert(position, node.clone());
        *node.inner.parent.lock().unwrap() = Arc::downgrade(&parent.inner);
        drop(children);
        match anchor {
            Some(anchor) => parent.log(format!(
                "insert {} before {}",
                node.inner.label, anchor.inner.label
            )),
            None => parent.log(format!("append {}", node.inner.label)),
        }
    }

    fn remove(parent: &Self, node: &Self) {
        let mut children = parent.inner.children.lock().unwrap();
        let before = children.len();
        children.retain(|c| !c.same(node));
        let removed = children.len() < before;
        drop(children);
        if removed {
            *node.inner.parent.lock().unwrap() = Weak::new();
            parent.log(format!("remove {}", node.inner.label));
        }
    }

    fn parent(&self) -> Option<Self> {
        self.inner
            .parent
            .lock()
            .unwrap()
            .upgrade()
            .map(|inner| MockNode { inner })
    }

    fn first_child(&self) -> Option<Self> {
        self.inner.children.lock().unwrap().first().cloned()
    }

    fn next_sibling(&self) -> Option<Self> {
        let parent = self.parent()?;
        let children = parent.inner.children.lock().unwrap();
        let index = children.iter().position(|c| c.same(self))?;
        children.get(index + 1).cloned()
    }
}

impl PartialEq for MockNode {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl std::fmt::Debug for MockNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockNode")
            .field("label", &self.inner.label)
            .finish()
    }
}

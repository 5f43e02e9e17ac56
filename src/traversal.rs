use crate::{element::OctreeElement, node::NodeRef};

/// Visitor called once per node by a [`Traversal`].
pub trait OctreeTraveler<T: OctreeElement + ?Sized> {
    fn visit(&mut self, node: NodeRef<'_, T>);
}

impl<T, F> OctreeTraveler<T> for F
where
    T: OctreeElement + ?Sized,
    F: FnMut(NodeRef<'_, T>),
{
    fn visit(&mut self, node: NodeRef<'_, T>) {
        self(node);
    }
}

/// Walk strategy feeding every node below a starting node to a traveler.
///
/// The tree is borrowed for the whole walk. In debug builds every node on the current path is also
/// registered with the tree's guard registry, so structural changes during a walk are rejected loudly.
pub trait Traversal {
    fn traverse<T: OctreeElement + ?Sized>(
        &self,
        node: NodeRef<'_, T>,
        traveler: &mut dyn OctreeTraveler<T>,
    );
}

/// Visits a node before its children, children in no particular order.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unordered;

impl Traversal for Unordered {
    fn traverse<T: OctreeElement + ?Sized>(
        &self,
        node: NodeRef<'_, T>,
        traveler: &mut dyn OctreeTraveler<T>,
    ) {
        let guards = node.tree().guards();
        let _walk = guards.enter(node.id());

        let mut pending = vec![node];
        while let Some(node) = pending.pop() {
            let _guard = guards.enter(node.id());
            node.accept(traveler);
            pending.extend(node.children());
        }
    }
}

/// Completes each child's subtree before moving to the next sibling; a node is visited after all of
/// its children.
#[derive(Debug, Default, Clone, Copy)]
pub struct DepthFirst;

impl Traversal for DepthFirst {
    fn traverse<T: OctreeElement + ?Sized>(
        &self,
        node: NodeRef<'_, T>,
        traveler: &mut dyn OctreeTraveler<T>,
    ) {
        let _guard = node.tree().guards().enter(node.id());

        for child in node.children() {
            self.traverse(child, traveler);
        }

        node.accept(traveler);
    }
}

pub(crate) use guard::GuardRegistry;

#[cfg(debug_assertions)]
mod guard {
    use std::{cell::RefCell, rc::Rc};

    use crate::node::NodeId;

    /// Nodes of one tree currently on the path of an active walk.
    #[derive(Default)]
    pub(crate) struct GuardRegistry {
        guarded: Rc<RefCell<Vec<NodeId>>>,
    }

    impl GuardRegistry {
        pub(crate) fn enter(&self, node: NodeId) -> TraversalGuard {
            self.guarded.borrow_mut().push(node);
            TraversalGuard {
                guarded: Rc::clone(&self.guarded),
                node,
            }
        }

        pub(crate) fn assert_unguarded(&self, node: NodeId) {
            let guarded = self.guarded.borrow().contains(&node);
            if guarded {
                tracing::error!(?node, "manipulating octree branch during iteration");
                panic!("manipulating octree branch {node:?} during iteration");
            }
        }
    }

    /// Marks a node as being walked until dropped.
    pub(crate) struct TraversalGuard {
        guarded: Rc<RefCell<Vec<NodeId>>>,
        node: NodeId,
    }

    impl Drop for TraversalGuard {
        fn drop(&mut self) {
            let mut guarded = self.guarded.borrow_mut();
            if let Some(position) = guarded.iter().rposition(|node| *node == self.node) {
                guarded.remove(position);
            }
        }
    }
}

#[cfg(not(debug_assertions))]
mod guard {
    use crate::node::NodeId;

    #[derive(Default)]
    pub(crate) struct GuardRegistry;

    impl GuardRegistry {
        pub(crate) fn enter(&self, _node: NodeId) -> TraversalGuard {
            TraversalGuard
        }

        pub(crate) fn assert_unguarded(&self, _node: NodeId) {}
    }

    pub(crate) struct TraversalGuard;
}

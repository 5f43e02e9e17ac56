use std::sync::Arc;

use crate::node::OctreeNode;

/// Observer attached to a single node, called synchronously on structural changes of that node.
///
/// Nodes only keep weak references to their listeners; a listener that has been dropped is
/// skipped. Element level notifications default to doing nothing.
pub trait OctreeListener<T: ?Sized> {
    fn handle_child_addition(&self, parent: &OctreeNode<T>, child: &OctreeNode<T>);

    fn handle_child_removal(&self, parent: &OctreeNode<T>, child: &OctreeNode<T>);

    fn handle_insertion(&self, _node: &OctreeNode<T>, _element: &Arc<T>) {}

    fn handle_removal(&self, _node: &OctreeNode<T>, _element: &Arc<T>) {}

    /// The node is about to be released back to the pool.
    fn handle_destruction(&self, _node: &OctreeNode<T>) {}
}

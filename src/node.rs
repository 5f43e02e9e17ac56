use std::{
    fmt::{self, Debug},
    ops::Deref,
    sync::{Arc, Weak},
};

use nalgebra::Vector3;

use crate::{
    element::OctreeElement, geometry::Aabb, listener::OctreeListener, traversal::OctreeTraveler,
    Octree,
};

pub(crate) const NO_CHILD: u8 = u8::MAX;

/// Generational handle to a node of an [`Octree`].
///
/// Handles of destroyed nodes stay detectably stale even once their slot is reused.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl NodeId {
    pub(crate) fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub(crate) fn slot(self) -> usize {
        self.index as usize
    }
}

/// A cube of space holding up to eight children and a list of resident elements.
pub struct OctreeNode<T: ?Sized> {
    pub(crate) id: NodeId,
    pub(crate) bounds: Aabb,
    pub(crate) parent: Option<NodeId>,
    pub(crate) octant: u8,
    pub(crate) children: [Option<NodeId>; 8],
    pub(crate) child_count: usize,
    /// Octant to index into `children`, `NO_CHILD` where no child occupies the octant.
    pub(crate) child_map: [u8; 8],
    pub(crate) elements: Vec<Arc<T>>,
    pub(crate) listeners: Vec<Weak<dyn OctreeListener<T>>>,
}

impl<T: ?Sized> OctreeNode<T> {
    /// A detached node; `parent` and `octant` are filled in when it is attached.
    pub(crate) fn new(id: NodeId, bounds: Aabb, reserve: usize) -> Self {
        Self {
            id,
            bounds,
            parent: None,
            octant: NO_CHILD,
            children: [None; 8],
            child_count: 0,
            child_map: [NO_CHILD; 8],
            elements: Vec::with_capacity(reserve),
            listeners: Vec::new(),
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn bounds(&self) -> &Aabb {
        &self.bounds
    }

    pub fn center(&self) -> Vector3<f32> {
        self.bounds.center()
    }

    pub fn half_size(&self) -> Vector3<f32> {
        self.bounds.half_size()
    }

    /// Half size along x, the size every placement decision is made against.
    pub fn size(&self) -> f32 {
        self.bounds.half_size().x
    }

    pub fn min(&self) -> Vector3<f32> {
        self.bounds.get_min()
    }

    pub fn max(&self) -> Vector3<f32> {
        self.bounds.get_max()
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// Slot this node occupies in its parent, `None` for the root.
    pub fn octant(&self) -> Option<u8> {
        (self.octant != NO_CHILD).then_some(self.octant)
    }

    pub fn child_count(&self) -> usize {
        self.child_count
    }

    pub fn child(&self, index: usize) -> Option<NodeId> {
        self.children.get(index).copied().flatten()
    }

    pub fn child_at_octant(&self, octant: u8) -> Option<NodeId> {
        match self.child_map.get(octant as usize) {
            Some(&slot) if slot != NO_CHILD => self.children[slot as usize],
            _ => None,
        }
    }

    pub fn children(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.children[..self.child_count].iter().flatten().copied()
    }

    pub fn elements(&self) -> &[Arc<T>] {
        &self.elements
    }

    pub fn element_count(&self) -> usize {
        self.elements.len()
    }

    pub fn is_leaf(&self) -> bool {
        self.child_count == 0
    }

    /// True when the node holds no elements directly.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }

    pub(crate) fn clear_children(&mut self) {
        self.children = [None; 8];
        self.child_count = 0;
        self.child_map = [NO_CHILD; 8];
    }

    pub(crate) fn live_listeners(&self) -> impl Iterator<Item = Arc<dyn OctreeListener<T>>> + '_ {
        self.listeners.iter().filter_map(Weak::upgrade)
    }
}

impl<T: ?Sized> Debug for OctreeNode<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OctreeNode")
            .field("id", &self.id)
            .field("center", &self.bounds.center())
            .field("half_size", &self.bounds.half_size())
            .field("parent", &self.parent)
            .field("octant", &self.octant())
            .field("children", &self.child_count)
            .field("elements", &self.elements.len())
            .finish()
    }
}

/// A node borrowed together with its tree, so visitors can walk to children and parents.
pub struct NodeRef<'a, T: OctreeElement + ?Sized> {
    tree: &'a Octree<T>,
    node: &'a OctreeNode<T>,
}

impl<'a, T: OctreeElement + ?Sized> NodeRef<'a, T> {
    pub(crate) fn new(tree: &'a Octree<T>, node: &'a OctreeNode<T>) -> Self {
        Self { tree, node }
    }

    pub fn tree(&self) -> &'a Octree<T> {
        self.tree
    }

    pub fn node(&self) -> &'a OctreeNode<T> {
        self.node
    }

    pub fn parent(&self) -> Option<NodeRef<'a, T>> {
        let tree = self.tree;
        self.node.parent.and_then(|parent| tree.node_ref(parent))
    }

    pub fn children(&self) -> impl Iterator<Item = NodeRef<'a, T>> + 'a {
        let tree = self.tree;
        let node = self.node;
        node.children().filter_map(move |child| tree.node_ref(child))
    }

    /// Hands this node to `traveler`. Descending is left to the traversal driving it.
    pub fn accept(&self, traveler: &mut dyn OctreeTraveler<T>) {
        traveler.visit(*self);
    }
}

impl<T: OctreeElement + ?Sized> Clone for NodeRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: OctreeElement + ?Sized> Copy for NodeRef<'_, T> {}

impl<T: OctreeElement + ?Sized> Deref for NodeRef<'_, T> {
    type Target = OctreeNode<T>;

    fn deref(&self) -> &Self::Target {
        self.node
    }
}

impl<T: OctreeElement + ?Sized> Debug for NodeRef<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.node.fmt(f)
    }
}

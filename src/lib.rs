#![deny(clippy::pedantic)]
#![deny(clippy::perf)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod element;
pub mod error;
pub mod geometry;
pub mod listener;
pub mod node;
pub mod pool;
pub mod stats;
pub mod traversal;

use std::{
    fmt::{self, Debug},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Weak,
    },
};

use nalgebra::Vector3;

use crate::{
    geometry::aabb::{indistinguishable, octant_between, push_center},
    node::NO_CHILD,
    traversal::GuardRegistry,
};

pub use crate::{
    config::{OctreeConfig, PlacementRule},
    element::{BinIndex, OctreeElement, UNINDEXED},
    error::{Error, InsertionError, Result},
    geometry::Aabb,
    listener::OctreeListener,
    node::{NodeId, NodeRef, OctreeNode},
    pool::NodePool,
    stats::OctreeStats,
    traversal::{DepthFirst, OctreeTraveler, Traversal, Unordered},
};

static NEXT_ID: AtomicUsize = AtomicUsize::new(0);

/// Elements with a larger bin radius are refused by the root.
pub const MAX_BIN_RADIUS: f32 = 4096.;

/// Elements further than this from the root center on any axis are refused by the root.
pub const MAX_POSITION_OFFSET: f32 = 1024. * 1024.;

const NEAR_ZERO: f32 = 0.001;

/// Loose octree over shared elements, with a root that grows to fit and collapses on `balance`.
///
/// Nodes live in a [`NodePool`] and are addressed by [`NodeId`]. The tree never owns its elements
/// exclusively: it keeps an `Arc` to each one and records the element's slot through
/// [`OctreeElement::set_bin_index`].
pub struct Octree<T: OctreeElement + ?Sized> {
    id: usize,
    config: OctreeConfig,
    pool: NodePool<T>,
    root: NodeId,
    stats: OctreeStats,
    guards: GuardRegistry,
}

impl<T: OctreeElement + ?Sized> Octree<T> {
    pub fn new(center: Vector3<f32>, half_size: f32, config: OctreeConfig) -> Result<Self> {
        config.validate()?;

        if !(half_size > 0. && half_size.is_finite()) {
            return Err(Error::Config(format!(
                "root half size must be positive and finite, got {half_size}"
            )));
        }

        if !(center.x.is_finite() && center.y.is_finite() && center.z.is_finite()) {
            return Err(Error::Config(format!(
                "root center must be finite, got {center:?}"
            )));
        }

        Ok(Self::with_bounds(Aabb::cube(center, half_size), config))
    }

    fn with_bounds(bounds: Aabb, config: OctreeConfig) -> Self {
        let mut pool = NodePool::new();
        let root = pool.acquire(|id| OctreeNode::new(id, bounds, config.reserve_capacity_per_node));

        let mut stats = OctreeStats::new();
        stats.add_node();
        stats.realloc(0, pool[root].elements.capacity());

        tracing::debug!(target: "creating octree", min = ?bounds.get_min(), max = ?bounds.get_max());

        Self {
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
            config,
            pool,
            root,
            stats,
            guards: GuardRegistry::default(),
        }
    }

    /// Builds a tree just large enough for `elements` and inserts them.
    pub fn from_elements<I>(elements: I, config: OctreeConfig) -> Result<Self>
    where
        I: IntoIterator<Item = Arc<T>>,
    {
        config.validate()?;

        let elements = elements.into_iter().collect::<Vec<_>>();
        let mut octree = Self::with_bounds(enclosing_bounds(&elements), config);
        octree.insert_elements(elements);

        Ok(octree)
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn config(&self) -> &OctreeConfig {
        &self.config
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn root_node(&self) -> &OctreeNode<T> {
        &self.pool[self.root]
    }

    pub fn bounds(&self) -> Aabb {
        self.pool[self.root].bounds
    }

    pub fn node(&self, id: NodeId) -> Option<&OctreeNode<T>> {
        self.pool.get(id)
    }

    pub fn node_ref(&self, id: NodeId) -> Option<NodeRef<'_, T>> {
        self.pool.get(id).map(|node| NodeRef::new(self, node))
    }

    pub fn root_ref(&self) -> NodeRef<'_, T> {
        NodeRef::new(self, &self.pool[self.root])
    }

    pub fn pool(&self) -> &NodePool<T> {
        &self.pool
    }

    pub fn stats(&self) -> &OctreeStats {
        &self.stats
    }

    pub(crate) fn guards(&self) -> &GuardRegistry {
        &self.guards
    }

    pub fn dump_stats(&mut self) {
        self.stats.dump();
    }

    /// Number of elements held anywhere in the tree.
    pub fn count(&self) -> usize {
        self.pool.iter().map(OctreeNode::element_count).sum()
    }

    pub fn node_count(&self) -> usize {
        self.pool.len()
    }

    /// Inserts `element` from the root, growing the root first if it does not cover the element.
    ///
    /// Returns `true` when the element was stored on the root itself and `false` otherwise, which
    /// includes rejection. Use [`try_insert`](Octree::try_insert) to tell the two apart.
    pub fn insert(&mut self, element: Arc<T>) -> bool {
        self.try_insert(element).unwrap_or_else(|error| {
            report(&error);
            false
        })
    }

    pub fn try_insert(&mut self, element: Arc<T>) -> Result<bool> {
        self.guards.assert_unguarded(self.root);

        let index = element.bin_index();
        if index != UNINDEXED {
            return Err(InsertionError::AlreadyIndexed(index).into());
        }

        self.insert_from_root(element)
    }

    /// Inserts starting at `node` instead of the root. The root is never grown from here unless the
    /// element has to be restarted from it.
    pub fn insert_at(&mut self, node: NodeId, element: Arc<T>) -> bool {
        self.try_insert_at(node, element).unwrap_or_else(|error| {
            report(&error);
            false
        })
    }

    pub fn try_insert_at(&mut self, node: NodeId, element: Arc<T>) -> Result<bool> {
        if !self.pool.contains(node) {
            return Err(Error::Validation(format!("stale octree node handle {node:?}")));
        }

        let index = element.bin_index();
        if index != UNINDEXED {
            return Err(InsertionError::AlreadyIndexed(index).into());
        }

        self.insert_into(node, element)
    }

    /// Inserts every element from the root, returning how many were accepted.
    pub fn insert_elements<I>(&mut self, elements: I) -> usize
    where
        I: IntoIterator<Item = Arc<T>>,
    {
        elements
            .into_iter()
            .filter(|element| match self.try_insert(element.clone()) {
                Ok(_) => true,
                Err(error) => {
                    report(&error);
                    false
                }
            })
            .count()
    }

    fn insert_from_root(&mut self, element: Arc<T>) -> Result<bool> {
        let radius = element.bin_radius();
        if !(radius <= MAX_BIN_RADIUS) {
            return Err(InsertionError::RadiusTooLarge(radius).into());
        }

        let position = element.position_group();
        let offset = (position - self.pool[self.root].center()).abs();
        if !(offset.x < MAX_POSITION_OFFSET
            && offset.y < MAX_POSITION_OFFSET
            && offset.z < MAX_POSITION_OFFSET)
        {
            return Err(InsertionError::OutOfRange([position.x, position.y, position.z]).into());
        }

        self.grow_to_fit(position, radius);

        let node = self.get_node_at_from_unchecked(self.root, position, radius);
        let stored = self.insert_into(node, element)?;

        Ok(stored && node == self.root)
    }

    fn root_fits(&self, position: Vector3<f32>, radius: f32) -> bool {
        let root = &self.pool[self.root];
        root.size() > radius && root.bounds.contains_point(position)
    }

    /// Doubles the root towards `position` until it covers the element. A root with children keeps
    /// them under a new branch holding the previous bounds.
    fn grow_to_fit(&mut self, position: Vector3<f32>, radius: f32) {
        let mut iterations = 0_usize;

        while !self.root_fits(position, radius) {
            self.guards.assert_unguarded(self.root);

            let root = &self.pool[self.root];
            let previous = root.bounds;
            let center = push_center(previous.center(), previous.half_size(), position);
            let grown = Aabb::new(center, previous.half_size() * 2.);

            if root.is_leaf() {
                self.pool[self.root].bounds = grown;
            } else {
                let children = root.children;
                let branch = self.allocate_node(previous);

                let root = &mut self.pool[self.root];
                root.clear_children();
                root.bounds = grown;

                for child in children.into_iter().flatten() {
                    self.add_child(branch, child, false);
                }
                self.add_child(self.root, branch, false);
            }

            iterations += 1;
        }

        if iterations > 0 {
            let bounds = self.pool[self.root].bounds;
            tracing::debug!(
                iterations,
                center = ?bounds.center(),
                half_size = bounds.half_size().x,
                "grew octree root"
            );
        }
    }

    /// Places `element` at or below `id`. Returns `true` when it was stored on `id` itself.
    fn insert_into(&mut self, start: NodeId, element: Arc<T>) -> Result<bool> {
        let position = element.position_group();
        let radius = element.bin_radius();
        let mut id = start;

        loop {
            self.guards.assert_unguarded(id);

            let node = &self.pool[id];

            if !node.bounds.is_inside(position, radius) {
                if !node.is_root() && !node.bounds.contains_point(position) {
                    tracing::warn!(?position, "octree insertion failed, starting over from root");
                }
                return self.insert_from_root(element).map(|_| false);
            }

            if self.accepts(id, radius) {
                self.store(id, element);
                return Ok(id == start);
            }

            if radius > node.size() {
                // every child would be too small for the element
                self.store(id, element);
                return Ok(id == start);
            }

            if let Some(child) = node.child_at_octant(node.bounds.octant_of(position)) {
                if self.pool[child].bounds.contains_point(position) {
                    id = child;
                    continue;
                }

                // rounding left the position between the child and its parent
                self.store(id, element);
                return Ok(id == start);
            }

            let half_size = node.half_size() / 2.;
            let center = push_center(node.center(), half_size, position);
            let bounds = Aabb::new(center, half_size);

            if indistinguishable(center, node.center()) || !bounds.contains_point(position) {
                // too small to split any further
                self.store(id, element);
                return Ok(id == start);
            }

            let child = self.allocate_node(bounds);
            self.add_child(id, child, false);
            id = child;
        }
    }

    fn accepts(&self, id: NodeId, radius: f32) -> bool {
        let node = &self.pool[id];
        let max = self.config.max_elements_per_node;
        let under_capacity = node.element_count() < max;
        let size = node.size();

        match self.config.placement {
            PlacementRule::Capacity => under_capacity && radius <= size * 2.,
            PlacementRule::SizeBand => {
                let in_band = !node.is_root()
                    && ((radius <= NEAR_ZERO && size <= NEAR_ZERO)
                        || (radius <= size * 2. && radius > size));

                (under_capacity && in_band)
                    || (radius > size
                        && node
                            .parent
                            .is_some_and(|parent| self.pool[parent].element_count() >= max))
            }
        }
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn store(&mut self, id: NodeId, element: Arc<T>) {
        let node = &mut self.pool[id];
        let old_capacity = node.elements.capacity();

        element.set_bin_index(node.elements.len() as i32);
        node.elements.push(element);

        let new_capacity = node.elements.capacity();
        if old_capacity != new_capacity {
            self.stats.realloc(old_capacity, new_capacity);
        }

        let node = &self.pool[id];
        if let Some(element) = node.elements.last() {
            for listener in node.live_listeners() {
                listener.handle_insertion(node, element);
            }
        }
    }

    /// Removes `element` from the tree, starting the search at the root.
    pub fn remove(&mut self, element: &Arc<T>) -> bool {
        self.remove_from(self.root, element)
    }

    /// Removes `element`, trusting its bin index to point into `node` first.
    ///
    /// A stale bin index falls back to a positional search below `node` and finally to a scan of
    /// every node. Returns `false` only when the element is not in the tree at all.
    pub fn remove_from(&mut self, node: NodeId, element: &Arc<T>) -> bool {
        let start = if self.pool.contains(node) {
            node
        } else {
            self.root
        };

        self.guards.assert_unguarded(start);

        if let Some(slot) = self.indexed_slot(start, element) {
            self.stats.indexed_removal();
            self.remove_at(start, slot);
            return true;
        }

        let position = element.position_group();
        let radius = element.bin_radius();

        if self.pool[start].bounds.is_inside(position, radius) {
            let mut cursor = Some(self.get_node_at_from_unchecked(start, position, radius));

            while let Some(id) = cursor {
                if let Some(slot) = self.indexed_slot(id, element) {
                    self.stats.indexed_removal();
                    self.remove_at(id, slot);
                    return true;
                }

                if let Some(slot) = self.slot_of(id, element) {
                    self.remove_at(id, slot);
                    return true;
                }

                if id == start {
                    break;
                }
                cursor = self.pool[id].parent;
            }
        }

        tracing::warn!(
            ?position,
            "octree removing element by address, severe performance penalty"
        );
        self.stats.address_scan();
        self.remove_by_address(element)
    }

    fn remove_by_address(&mut self, element: &Arc<T>) -> bool {
        let mut pending = vec![self.root];

        while let Some(id) = pending.pop() {
            if let Some(slot) = self.slot_of(id, element) {
                tracing::warn!(node = ?id, "found element by address");
                self.remove_at(id, slot);
                return true;
            }

            pending.extend(self.pool[id].children());
        }

        false
    }

    /// The element's bin index, if it really points at `element` inside `id`.
    fn indexed_slot(&self, id: NodeId, element: &Arc<T>) -> Option<usize> {
        usize::try_from(element.bin_index()).ok().filter(|&slot| {
            self.pool[id]
                .elements
                .get(slot)
                .is_some_and(|resident| Arc::ptr_eq(resident, element))
        })
    }

    fn slot_of(&self, id: NodeId, element: &Arc<T>) -> Option<usize> {
        self.pool[id]
            .elements
            .iter()
            .position(|resident| Arc::ptr_eq(resident, element))
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    fn remove_at(&mut self, id: NodeId, slot: usize) {
        self.guards.assert_unguarded(id);

        let reserve = self.config.reserve_capacity_per_node;
        let node = &mut self.pool[id];

        let element = node.elements.swap_remove(slot);
        element.set_bin_index(UNINDEXED);
        if let Some(moved) = node.elements.get(slot) {
            moved.set_bin_index(slot as i32);
        }

        let old_capacity = node.elements.capacity();
        let len = node.elements.len();
        if len <= reserve {
            node.elements.shrink_to(reserve);
        } else if old_capacity > len * 2 {
            node.elements.shrink_to(len + 4);
        }

        let new_capacity = node.elements.capacity();
        if old_capacity != new_capacity {
            self.stats.realloc(old_capacity, new_capacity);
        }

        let node = &self.pool[id];
        for listener in node.live_listeners() {
            listener.handle_removal(node, &element);
        }

        self.check_alive(id);
    }

    /// Prunes `id` from its parent once it holds neither children nor elements.
    fn check_alive(&mut self, id: NodeId) {
        let node = &self.pool[id];

        if node.is_leaf() && node.is_empty() {
            if let Some(parent) = node.parent {
                self.delete_child(parent, id);
            }
        }
    }

    fn delete_child(&mut self, parent: NodeId, child: NodeId) {
        let found = self.pool[parent].children().position(|c| c == child);
        match found {
            Some(index) => self.remove_child(parent, index),
            None => tracing::error!(?parent, ?child, "octree failed to delete requested child"),
        }
    }

    fn remove_child(&mut self, parent: NodeId, index: usize) {
        self.guards.assert_unguarded(parent);

        let Some(child) = self.pool[parent].child(index) else {
            return;
        };

        {
            let parent_node = &self.pool[parent];
            let child_node = &self.pool[child];
            for listener in parent_node.live_listeners() {
                listener.handle_child_removal(parent_node, child_node);
            }
        }

        self.destroy(child);

        let node = &mut self.pool[parent];
        node.child_count -= 1;
        node.children[index] = node.children[node.child_count];
        node.children[node.child_count] = None;
        self.rebuild_child_map(parent);

        self.check_alive(parent);
    }

    #[allow(clippy::cast_possible_truncation)]
    fn rebuild_child_map(&mut self, id: NodeId) {
        let mut child_map = [NO_CHILD; 8];
        for (slot, child) in self.pool[id].children().enumerate() {
            child_map[self.pool[child].octant as usize] = slot as u8;
        }

        self.pool[id].child_map = child_map;
    }

    #[allow(clippy::cast_possible_truncation)]
    fn add_child(&mut self, parent: NodeId, child: NodeId, silent: bool) {
        self.guards.assert_unguarded(parent);

        let octant = octant_between(self.pool[parent].center(), self.pool[child].center());

        let child_node = &mut self.pool[child];
        child_node.parent = Some(parent);
        child_node.octant = octant;

        let node = &mut self.pool[parent];
        debug_assert!(
            node.child_map[octant as usize] == NO_CHILD,
            "duplicate octree child in octant {octant}"
        );

        let slot = node.child_count;
        node.children[slot] = Some(child);
        node.child_map[octant as usize] = slot as u8;
        node.child_count += 1;

        if !silent {
            let parent_node = &self.pool[parent];
            let child_node = &self.pool[child];
            for listener in parent_node.live_listeners() {
                listener.handle_child_addition(parent_node, child_node);
            }
        }
    }

    fn allocate_node(&mut self, bounds: Aabb) -> NodeId {
        let reserve = self.config.reserve_capacity_per_node;
        let id = self
            .pool
            .acquire(|id| OctreeNode::new(id, bounds, reserve));

        self.stats.add_node();
        self.stats.realloc(0, self.pool[id].elements.capacity());

        tracing::debug!(target: "creating octree", min = ?bounds.get_min(), max = ?bounds.get_max());

        id
    }

    /// Releases `id` and its whole subtree, unindexing every element they held.
    fn destroy(&mut self, id: NodeId) {
        {
            let node = &self.pool[id];
            for listener in node.live_listeners() {
                listener.handle_destruction(node);
            }
        }

        let children = self.pool[id].children;
        for child in children.into_iter().flatten() {
            self.destroy(child);
        }

        if let Some(node) = self.pool.release(id) {
            for element in &node.elements {
                element.set_bin_index(UNINDEXED);
            }

            self.stats.free(node.elements.capacity());
            self.stats.remove_node();

            tracing::debug!(node = ?id, elements = node.elements.len(), "destroyed octree node");
        }
    }

    /// Collapses a root whose only child is an element free branch into that child.
    ///
    /// Returns `false` after a collapse so callers can keep balancing, `true` once nothing changed.
    pub fn balance(&mut self) -> bool {
        let root = &self.pool[self.root];

        let Some(child_id) = root.child(0).filter(|_| root.child_count == 1) else {
            return true;
        };

        let child = &self.pool[child_id];
        let collapsible = !child.is_leaf()
            && child.is_empty()
            && root.elements.iter().all(|element| {
                child
                    .bounds
                    .is_inside(element.position_group(), element.bin_radius())
            });

        if !collapsible {
            return true;
        }

        self.guards.assert_unguarded(self.root);
        self.guards.assert_unguarded(child_id);

        let bounds = child.bounds;
        let grandchildren = child.children;

        let root = &mut self.pool[self.root];
        root.bounds = bounds;
        root.clear_children();

        for grandchild in grandchildren.into_iter().flatten() {
            self.add_child(self.root, grandchild, true);
        }

        self.pool[child_id].clear_children();
        self.destroy(child_id);

        tracing::debug!(
            center = ?bounds.center(),
            half_size = bounds.half_size().x,
            "collapsed octree root"
        );

        false
    }

    /// Smallest node at or below the root that should hold an element at `position`.
    pub fn get_node_at(&self, position: Vector3<f32>, radius: f32) -> NodeId {
        self.get_node_at_from_unchecked(self.root, position, radius)
    }

    /// Like [`get_node_at`](Octree::get_node_at) but starting from `node`, climbing towards the
    /// root while `node` does not cover the position.
    pub fn get_node_at_from(
        &self,
        node: NodeId,
        position: Vector3<f32>,
        radius: f32,
    ) -> Option<NodeId> {
        self.pool
            .contains(node)
            .then(|| self.get_node_at_from_unchecked(node, position, radius))
    }

    fn get_node_at_from_unchecked(
        &self,
        start: NodeId,
        position: Vector3<f32>,
        radius: f32,
    ) -> NodeId {
        let mut id = start;

        loop {
            let node = &self.pool[id];

            if node.bounds.is_inside(position, radius) {
                let mut node = node;
                while node.size() >= radius {
                    match node.child_at_octant(node.bounds.octant_of(position)) {
                        Some(child) if self.pool[child].bounds.contains_point(position) => {
                            node = &self.pool[child];
                        }
                        _ => break,
                    }
                }
                return node.id;
            }

            match node.parent {
                Some(parent) => id = parent,
                None => return id,
            }
        }
    }

    /// Node currently holding `element`, if any.
    pub fn find_node(&self, element: &Arc<T>) -> Option<NodeId> {
        let position = element.position_group();
        let mut cursor = Some(self.get_node_at(position, element.bin_radius()));

        while let Some(id) = cursor {
            if self.indexed_slot(id, element).is_some() || self.slot_of(id, element).is_some() {
                return Some(id);
            }
            cursor = self.pool[id].parent;
        }

        self.pool
            .iter()
            .find(|node| node.elements.iter().any(|e| Arc::ptr_eq(e, element)))
            .map(OctreeNode::id)
    }

    pub fn contains(&self, element: &Arc<T>) -> bool {
        self.find_node(element).is_some()
    }

    /// Elements whose position lies inside `range`, faces included.
    pub fn query_range(&self, range: &Aabb) -> Vec<Arc<T>> {
        let mut found = Vec::new();
        let mut pending = vec![self.root];

        while let Some(id) = pending.pop() {
            let node = &self.pool[id];
            if !node.bounds.intersects_bounds(range) {
                continue;
            }

            found.extend(
                node.elements
                    .iter()
                    .filter(|element| range.encloses_point(element.position_group()))
                    .cloned(),
            );
            pending.extend(node.children());
        }

        found
    }

    /// Elements whose position lies within `radius` of `center`.
    pub fn query_sphere(&self, center: Vector3<f32>, radius: f32) -> Vec<Arc<T>> {
        let radius_squared = radius * radius;
        let mut found = Vec::new();
        let mut pending = vec![self.root];

        while let Some(id) = pending.pop() {
            let node = &self.pool[id];
            if node.bounds.distance_squared(center) > radius_squared {
                continue;
            }

            found.extend(
                node.elements
                    .iter()
                    .filter(|element| {
                        (element.position_group() - center).norm_squared() <= radius_squared
                    })
                    .cloned(),
            );
            pending.extend(node.children());
        }

        found
    }

    /// Visits exactly `node`, without descending.
    pub fn accept(&self, node: NodeId, traveler: &mut dyn OctreeTraveler<T>) -> bool {
        match self.node_ref(node) {
            Some(node) => {
                node.accept(traveler);
                true
            }
            None => false,
        }
    }

    pub fn traverse(&self, traversal: &impl Traversal, traveler: &mut dyn OctreeTraveler<T>) {
        traversal.traverse(self.root_ref(), traveler);
    }

    pub fn traverse_from(
        &self,
        node: NodeId,
        traversal: &impl Traversal,
        traveler: &mut dyn OctreeTraveler<T>,
    ) -> bool {
        match self.node_ref(node) {
            Some(node) => {
                traversal.traverse(node, traveler);
                true
            }
            None => false,
        }
    }

    /// Registers `listener` on `node`. The node only keeps a weak reference.
    pub fn add_listener<L>(&mut self, node: NodeId, listener: &Arc<L>) -> bool
    where
        L: OctreeListener<T> + 'static,
    {
        let Some(node) = self.pool.get_mut(node) else {
            return false;
        };

        let listener: Weak<L> = Arc::downgrade(listener);
        node.listeners.push(listener);

        true
    }

    pub fn remove_listener<L>(&mut self, node: NodeId, listener: &Arc<L>) -> bool
    where
        L: OctreeListener<T> + 'static,
    {
        let Some(node) = self.pool.get_mut(node) else {
            return false;
        };

        let target = Arc::as_ptr(listener).cast::<()>();
        let before = node.listeners.len();
        node.listeners.retain(|registered| {
            registered.strong_count() > 0 && Weak::as_ptr(registered).cast::<()>() != target
        });

        node.listeners.len() != before
    }

    /// Checks parent links, octant bookkeeping, child geometry, pruning and bin indices.
    pub fn validate(&self) -> Result<()> {
        let mut pending = vec![self.root];

        while let Some(id) = pending.pop() {
            let node = &self.pool[id];

            if !node.is_root() && node.is_leaf() && node.is_empty() {
                return Err(Error::Validation(format!("empty octree node {id:?} was not pruned")));
            }

            for (slot, element) in node.elements.iter().enumerate() {
                if usize::try_from(element.bin_index()).ok() != Some(slot) {
                    return Err(Error::Validation(format!(
                        "element in slot {slot} of {id:?} has bin index {}",
                        element.bin_index()
                    )));
                }

                if element.bin_radius() > node.size() * 2. {
                    return Err(Error::Validation(format!(
                        "element of radius {} is too large for {id:?}",
                        element.bin_radius()
                    )));
                }

                if !node.bounds.contains_point(element.position_group()) {
                    return Err(Error::Validation(format!(
                        "element at {:?} lies outside {id:?}",
                        element.position_group()
                    )));
                }
            }

            let mapped = node.child_map.iter().filter(|&&slot| slot != NO_CHILD).count();
            if mapped != node.child_count {
                return Err(Error::Validation(format!(
                    "{id:?} maps {mapped} octants for {} children",
                    node.child_count
                )));
            }

            for child_id in node.children() {
                let child = &self.pool[child_id];

                if child.parent != Some(id) {
                    return Err(Error::Validation(format!(
                        "octree child {child_id:?} has invalid parent"
                    )));
                }

                if node.child_at_octant(child.octant) != Some(child_id)
                    || octant_between(node.center(), child.center()) != child.octant
                {
                    return Err(Error::Validation(format!(
                        "invalid child map, bad octant data for {child_id:?}"
                    )));
                }

                let expected_size = node.size() / 2.;
                let offset = (child.center() - node.center()).abs();
                let tolerance = expected_size * 1e-3;
                if (child.size() - expected_size).abs() > tolerance
                    || offset.iter().any(|axis| (axis - expected_size).abs() > tolerance)
                {
                    return Err(Error::Validation(format!(
                        "octree child {child_id:?} has invalid size or center"
                    )));
                }

                pending.push(child_id);
            }
        }

        Ok(())
    }
}

fn report(error: &Error) {
    if error.is_programmer_error() {
        tracing::error!(%error, "invalid element added to octree");
        if cfg!(debug_assertions) {
            panic!("invalid element added to octree: {error}");
        }
    } else {
        tracing::warn!(%error, "octree insertion rejected");
    }
}

/// Cube around every element position, falling back to a unit cube at the origin.
fn enclosing_bounds<T: OctreeElement + ?Sized>(elements: &[Arc<T>]) -> Aabb {
    let mut smallest = Vector3::repeat(f32::MAX);
    let mut largest = Vector3::repeat(f32::MIN);

    for element in elements {
        let point = element.position_group();
        smallest = smallest.inf(&point);
        largest = largest.sup(&point);
    }

    let center = (smallest + largest) / 2.;
    let half_size = ((largest - smallest) / 2.).max();

    if center.iter().all(|axis| axis.is_finite()) && half_size.is_finite() && half_size > 0. {
        Aabb::cube(center, half_size)
    } else if center.iter().all(|axis| axis.is_finite()) {
        Aabb::cube(center, 1.)
    } else {
        Aabb::cube(Vector3::zeros(), 1.)
    }
}

impl<T: OctreeElement + ?Sized> FromIterator<Arc<T>> for Octree<T> {
    fn from_iter<I: IntoIterator<Item = Arc<T>>>(iter: I) -> Self {
        let elements = iter.into_iter().collect::<Vec<_>>();
        let mut octree = Self::with_bounds(enclosing_bounds(&elements), OctreeConfig::default());
        octree.insert_elements(elements);
        octree
    }
}

impl<T: OctreeElement + ?Sized> Debug for Octree<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Octree")
            .field("id", &self.id)
            .field("config", &self.config)
            .field("root", &self.pool[self.root])
            .field("nodes", &self.pool.len())
            .finish_non_exhaustive()
    }
}

impl<T: OctreeElement + ?Sized> Drop for Octree<T> {
    fn drop(&mut self) {
        for node in self.pool.iter() {
            for listener in node.live_listeners() {
                listener.handle_destruction(node);
            }

            for element in &node.elements {
                element.set_bin_index(UNINDEXED);
            }
        }
    }
}

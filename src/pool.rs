use std::ops::{Index, IndexMut};

use crate::node::{NodeId, OctreeNode};

/// Node slots allocated per chunk.
pub const NODES_PER_CHUNK: usize = 1024;

struct Slot<T: ?Sized> {
    generation: u32,
    node: Option<OctreeNode<T>>,
}

/// Slab of octree nodes, grown a chunk at a time.
///
/// Chunks are never reallocated once created, so a live node keeps its address. Released slots are
/// recycled through a free list before a new chunk is requested.
pub struct NodePool<T: ?Sized> {
    chunks: Vec<Vec<Slot<T>>>,
    free: Vec<u32>,
    live: usize,
}

impl<T: ?Sized> NodePool<T> {
    pub fn new() -> Self {
        Self {
            chunks: Vec::new(),
            free: Vec::new(),
            live: 0,
        }
    }

    /// Stores the node built by `build` and returns its handle.
    pub fn acquire(&mut self, build: impl FnOnce(NodeId) -> OctreeNode<T>) -> NodeId {
        self.live += 1;

        if let Some(index) = self.free.pop() {
            let slot = self.slot_mut(index as usize);
            let id = NodeId::new(index, slot.generation);
            slot.node = Some(build(id));
            return id;
        }

        if self
            .chunks
            .last()
            .map_or(true, |chunk| chunk.len() == NODES_PER_CHUNK)
        {
            tracing::debug!(chunks = self.chunks.len() + 1, "growing octree node pool");
            self.chunks.push(Vec::with_capacity(NODES_PER_CHUNK));
        }

        let chunk_index = self.chunks.len() - 1;
        let chunk = &mut self.chunks[chunk_index];
        let index = u32::try_from(chunk_index * NODES_PER_CHUNK + chunk.len())
            .unwrap_or_else(|_| panic!("octree node pool exhausted"));
        let id = NodeId::new(index, 0);
        chunk.push(Slot {
            generation: 0,
            node: Some(build(id)),
        });

        id
    }

    /// Takes the node out of the pool, invalidating `id`.
    pub fn release(&mut self, id: NodeId) -> Option<OctreeNode<T>> {
        let slot = self.slot_checked_mut(id)?;
        let node = slot.node.take()?;
        slot.generation = slot.generation.wrapping_add(1);

        self.free.push(id.index);
        self.live -= 1;

        Some(node)
    }

    pub fn get(&self, id: NodeId) -> Option<&OctreeNode<T>> {
        let slot = self
            .chunks
            .get(id.slot() / NODES_PER_CHUNK)?
            .get(id.slot() % NODES_PER_CHUNK)?;

        if slot.generation == id.generation {
            slot.node.as_ref()
        } else {
            None
        }
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut OctreeNode<T>> {
        self.slot_checked_mut(id)?.node.as_mut()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.get(id).is_some()
    }

    /// Live nodes.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Slots allocated across every chunk, live or free.
    pub fn capacity(&self) -> usize {
        self.chunks.len() * NODES_PER_CHUNK
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &OctreeNode<T>> {
        self.chunks
            .iter()
            .flat_map(|chunk| chunk.iter())
            .filter_map(|slot| slot.node.as_ref())
    }

    fn slot_mut(&mut self, index: usize) -> &mut Slot<T> {
        &mut self.chunks[index / NODES_PER_CHUNK][index % NODES_PER_CHUNK]
    }

    fn slot_checked_mut(&mut self, id: NodeId) -> Option<&mut Slot<T>> {
        let slot = self
            .chunks
            .get_mut(id.slot() / NODES_PER_CHUNK)?
            .get_mut(id.slot() % NODES_PER_CHUNK)?;

        (slot.generation == id.generation).then_some(slot)
    }
}

impl<T: ?Sized> Default for NodePool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: ?Sized> Index<NodeId> for NodePool<T> {
    type Output = OctreeNode<T>;

    fn index(&self, id: NodeId) -> &Self::Output {
        match self.get(id) {
            Some(node) => node,
            None => panic!("stale octree node handle {id:?}"),
        }
    }
}

impl<T: ?Sized> IndexMut<NodeId> for NodePool<T> {
    fn index_mut(&mut self, id: NodeId) -> &mut Self::Output {
        match self.get_mut(id) {
            Some(node) => node,
            None => panic!("stale octree node handle {id:?}"),
        }
    }
}

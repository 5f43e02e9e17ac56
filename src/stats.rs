use std::time::Instant;

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    nodes_created: u64,
    nodes_destroyed: u64,
    allocs: u64,
    frees: u64,
    largest_size: usize,
    indexed_removals: u64,
    address_scans: u64,
}

/// Node and element list allocation counters for one octree.
///
/// Lifetime totals accumulate forever, period counters reset on every [`dump`](OctreeStats::dump).
#[derive(Debug, Clone)]
pub struct OctreeStats {
    total: Counters,
    period: Counters,
    live_nodes: usize,
    total_slots: usize,
    started: Instant,
    period_started: Instant,
}

impl OctreeStats {
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            total: Counters::default(),
            period: Counters::default(),
            live_nodes: 0,
            total_slots: 0,
            started: now,
            period_started: now,
        }
    }

    pub(crate) fn add_node(&mut self) {
        self.live_nodes += 1;
        self.total.nodes_created += 1;
        self.period.nodes_created += 1;
    }

    pub(crate) fn remove_node(&mut self) {
        self.live_nodes = self.live_nodes.saturating_sub(1);
        self.total.nodes_destroyed += 1;
        self.period.nodes_destroyed += 1;
    }

    /// Records an element list whose capacity went from `old_capacity` to `new_capacity`.
    pub(crate) fn realloc(&mut self, old_capacity: usize, new_capacity: usize) {
        self.total_slots = (self.total_slots + new_capacity).saturating_sub(old_capacity);
        self.total.largest_size = self.total.largest_size.max(new_capacity);
        self.period.largest_size = self.period.largest_size.max(new_capacity);
        self.total.allocs += 1;
        self.period.allocs += 1;
    }

    pub(crate) fn free(&mut self, capacity: usize) {
        self.total_slots = self.total_slots.saturating_sub(capacity);
        self.total.frees += 1;
        self.period.frees += 1;
    }

    /// A removal that found its element through the cached bin index.
    pub(crate) fn indexed_removal(&mut self) {
        self.total.indexed_removals += 1;
        self.period.indexed_removals += 1;
    }

    /// A removal that had to fall back to scanning every node.
    pub(crate) fn address_scan(&mut self) {
        self.total.address_scans += 1;
        self.period.address_scans += 1;
    }

    pub fn live_nodes(&self) -> usize {
        self.live_nodes
    }

    pub fn nodes_created(&self) -> u64 {
        self.total.nodes_created
    }

    pub fn nodes_destroyed(&self) -> u64 {
        self.total.nodes_destroyed
    }

    /// Element slots currently reserved across every node.
    pub fn total_slots(&self) -> usize {
        self.total_slots
    }

    pub fn largest_size(&self) -> usize {
        self.total.largest_size
    }

    pub fn indexed_removals(&self) -> u64 {
        self.total.indexed_removals
    }

    pub fn address_scans(&self) -> u64 {
        self.total.address_scans
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn dump(&mut self) {
        let lifetime = self.started.elapsed().as_secs_f64().max(f64::EPSILON);
        let period = self.period_started.elapsed().as_secs_f64().max(f64::EPSILON);

        tracing::info!(
            allocs = self.total.allocs,
            frees = self.total.frees,
            allocs_per_sec = self.total.allocs as f64 / lifetime,
            frees_per_sec = self.total.frees as f64 / lifetime,
            nodes = self.live_nodes,
            slots = self.total_slots,
            avg_slots = self.total_slots as f64 / self.live_nodes.max(1) as f64,
            largest = self.total.largest_size,
            address_scans = self.total.address_scans,
            "octree lifetime stats"
        );
        tracing::info!(
            allocs = self.period.allocs,
            frees = self.period.frees,
            allocs_per_sec = self.period.allocs as f64 / period,
            frees_per_sec = self.period.frees as f64 / period,
            nodes_created = self.period.nodes_created,
            nodes_destroyed = self.period.nodes_destroyed,
            largest = self.period.largest_size,
            address_scans = self.period.address_scans,
            "octree period stats"
        );

        self.period = Counters::default();
        self.period_started = Instant::now();
    }
}

impl Default for OctreeStats {
    fn default() -> Self {
        Self::new()
    }
}

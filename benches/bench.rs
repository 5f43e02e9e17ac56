#![feature(test)]
extern crate test;

use std::sync::Arc;

use nalgebra::Vector3;
use test::Bencher;

use scene_octree::{
    BinIndex, DepthFirst, NodeRef, Octree, OctreeConfig, OctreeElement, Unordered,
};

#[derive(Debug)]
struct TileData {
    point: Vector3<f32>,
    bin: BinIndex,
}

impl OctreeElement for TileData {
    fn position_group(&self) -> Vector3<f32> {
        self.point
    }

    fn bin_radius(&self) -> f32 {
        0.5
    }

    fn bin_index(&self) -> i32 {
        self.bin.get()
    }

    fn set_bin_index(&self, index: i32) {
        self.bin.set(index);
    }
}

#[allow(clippy::cast_precision_loss)]
fn tiles(extent: i32) -> Vec<Arc<TileData>> {
    let mut points = Vec::new();
    for x in 0..extent {
        for y in 0..extent {
            for z in 0..extent {
                points.push(Arc::new(TileData {
                    point: Vector3::new(x as f32, y as f32, z as f32),
                    bin: BinIndex::new(),
                }));
            }
        }
    }
    points
}

fn filled(points: &[Arc<TileData>], max_elements: usize) -> Octree<TileData> {
    let mut octree = Octree::new(
        Vector3::repeat(10.),
        10.,
        OctreeConfig::with_max_elements(max_elements),
    )
    .unwrap();
    octree.insert_elements(points.iter().cloned());
    octree
}

#[bench]
fn bench_fill_20e3_octree(b: &mut Bencher) {
    let points = tiles(20);

    b.iter(|| filled(&points, 32));
}

#[bench]
fn bench_fill_20e3_octree_growing(b: &mut Bencher) {
    let points = tiles(20);

    b.iter(|| {
        let mut octree =
            Octree::new(Vector3::zeros(), 1., OctreeConfig::with_max_elements(32)).unwrap();
        octree.insert_elements(points.iter().cloned());
        octree
    });
}

#[bench]
fn bench_fill_and_empty_20e3_octree(b: &mut Bencher) {
    let points = tiles(20);

    b.iter(|| {
        let mut octree = filled(&points, 32);
        for point in &points {
            octree.remove(point);
        }
        while !octree.balance() {}
    });
}

#[bench]
fn bench_query_range_20e3_octree(b: &mut Bencher) {
    let points = tiles(20);
    let octree = filled(&points, 32);
    let range = scene_octree::Aabb::from_extents(Vector3::repeat(4.), Vector3::repeat(12.));

    b.iter(|| octree.query_range(&range).len());
}

#[bench]
fn bench_traverse_20e3_octree(b: &mut Bencher) {
    let points = tiles(20);
    let octree = filled(&points, 8);

    b.iter(|| {
        let mut count = 0;
        octree.traverse(&Unordered, &mut |node: NodeRef<'_, TileData>| {
            count += node.element_count();
        });
        octree.traverse(&DepthFirst, &mut |node: NodeRef<'_, TileData>| {
            count += node.element_count();
        });
        count
    });
}

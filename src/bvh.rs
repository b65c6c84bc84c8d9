use crate::aabb::{calculate_aabb, Aabb};
use crate::geometry::{Fp, Intersection, Ray};
use crate::scene::Primitive;

pub const ROOT: usize = 0;

#[derive(Clone, Debug)]
pub enum BvhNodeKind {
    /// Primitives `first..last` of the tree's (reordered) primitive list.
    Leaf { first: usize, last: usize },
    Internal { left: usize, right: usize },
}

#[derive(Clone, Debug)]
pub struct BvhNode {
    pub aabb: Aabb,
    pub kind: BvhNodeKind,
}

/// Hit indices refer to [`BvhTree::primitives`], which the build reorders.
#[derive(Debug)]
pub struct BvhTree {
    nodes: Vec<BvhNode>,
    primitives: Vec<Primitive>,
}

impl Default for BvhTree {
    fn default() -> Self {
        BvhTree::build(vec![])
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TraversalStats {
    pub nodes_visited: usize,
    pub primitive_tests: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Axis {
    X,
    Y,
    Z,
}

const AXES: [Axis; 3] = [Axis::X, Axis::Y, Axis::Z];

impl Axis {
    fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
            Axis::Z => 2,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TraversalOrder {
    LeftFirst,
    RightFirst,
}

fn sort_along(primitives: &mut [Primitive], axis: Axis) {
    let axis = axis.index();
    primitives.sort_by(|a, b| {
        a.object3d.position[axis].total_cmp(&b.object3d.position[axis])
    });
}

/// Cheapest split of `primitives` (at least two of them) in their current
/// order: returns the SAH cost and the size of the left part. Ties go to the
/// smaller left part.
fn best_split(primitives: &[Primitive]) -> (Fp, usize) {
    let n = primitives.len();
    let mut scores = vec![0.0; n];

    let mut prefix = primitives[0].aabb.clone();
    for i in 1..n {
        scores[i] = prefix.area() * i as Fp;
        prefix = prefix.extend_aabb(&primitives[i].aabb);
    }

    let mut suffix = primitives[n - 1].aabb.clone();
    for i in (1..n).rev() {
        scores[i] += suffix.area() * (n - i) as Fp;
        suffix = suffix.extend_aabb(&primitives[i - 1].aabb);
    }

    (2..n).fold((scores[1], 1), |best, i| {
        if scores[i] < best.0 {
            (scores[i], i)
        } else {
            best
        }
    })
}

fn nearer(
    first: Option<(Intersection, usize)>,
    second: Option<(Intersection, usize)>,
) -> Option<(Intersection, usize)> {
    match (first, second) {
        (Some(a), Some(b)) => {
            if b.0.offset < a.0.offset {
                Some(b)
            } else {
                Some(a)
            }
        }
        (a, b) => a.or(b),
    }
}

impl BvhTree {
    pub fn build(primitives: Vec<Primitive>) -> BvhTree {
        let count = primitives.len();
        let mut tree = BvhTree {
            nodes: Vec::with_capacity(2 * count.max(1)),
            primitives,
        };
        let root = tree.build_node(0, count);
        debug_assert_eq!(root, ROOT);
        log::debug!(
            "bvh over {} primitives: {} nodes, {} leaves, depth {}",
            count,
            tree.nodes.len(),
            tree.leaf_count(),
            tree.depth()
        );
        tree
    }

    // Pushes the node before recursing, so a parent always precedes its
    // children and the root lands at index 0.
    fn build_node(&mut self, first: usize, last: usize) -> usize {
        let aabb = calculate_aabb(&self.primitives[first..last]);
        let this = self.nodes.len();
        self.nodes.push(BvhNode {
            aabb: aabb.clone(),
            kind: BvhNodeKind::Leaf { first, last },
        });
        let count = last - first;
        if count <= 1 {
            return this;
        }

        let range = &mut self.primitives[first..last];
        let mut best: Option<(Axis, Fp, usize)> = None;
        for axis in AXES {
            sort_along(range, axis);
            let (cost, left_count) = best_split(range);
            if best.map_or(true, |(_, best_cost, _)| cost < best_cost) {
                best = Some((axis, cost, left_count));
            }
        }
        let Some((axis, cost, left_count)) = best else {
            return this;
        };
        if !(cost < aabb.area() * count as Fp) {
            return this;
        }
        sort_along(range, axis);

        let mid = first + left_count;
        let left = self.build_node(first, mid);
        let right = self.build_node(mid, last);
        debug_assert!(aabb.contains(&self.nodes[left].aabb) && aabb.contains(&self.nodes[right].aabb));
        self.nodes[this].kind = BvhNodeKind::Internal { left, right };
        this
    }

    pub fn nodes(&self) -> &[BvhNode] {
        &self.nodes
    }

    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    pub fn aabb(&self) -> &Aabb {
        &self.nodes[ROOT].aabb
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| matches!(node.kind, BvhNodeKind::Leaf { .. }))
            .count()
    }

    pub fn depth(&self) -> usize {
        fn depth_from(nodes: &[BvhNode], index: usize) -> usize {
            match nodes[index].kind {
                BvhNodeKind::Leaf { .. } => 1,
                BvhNodeKind::Internal { left, right } => {
                    1 + usize::max(depth_from(nodes, left), depth_from(nodes, right))
                }
            }
        }
        depth_from(&self.nodes, ROOT)
    }

    /// Nearest primitive hit. `best` is an already known hit distance; nodes
    /// that start beyond it are skipped.
    pub fn intersect(&self, ray: &Ray, best: Option<Fp>) -> Option<(Intersection, usize)> {
        self.intersect_with_stats(ray, best, &mut TraversalStats::default())
    }

    pub fn intersect_with_stats(
        &self,
        ray: &Ray,
        best: Option<Fp>,
        stats: &mut TraversalStats,
    ) -> Option<(Intersection, usize)> {
        self.intersect_node(ROOT, ray, best, stats, TraversalOrder::LeftFirst)
    }

    fn intersect_node(
        &self,
        index: usize,
        ray: &Ray,
        mut best: Option<Fp>,
        stats: &mut TraversalStats,
        order: TraversalOrder,
    ) -> Option<(Intersection, usize)> {
        let node = &self.nodes[index];
        stats.nodes_visited += 1;
        let aabb_hit = node.aabb.intersect(ray)?;
        if best.is_some_and(|best| best < aabb_hit.offset) && !aabb_hit.inside {
            return None;
        }

        match node.kind {
            BvhNodeKind::Leaf { first, last } => {
                let mut nearest: Option<(Intersection, usize)> = None;
                for i in first..last {
                    stats.primitive_tests += 1;
                    if let Some(intersection) = self.primitives[i].object3d.intersect(ray) {
                        if nearest
                            .as_ref()
                            .map_or(true, |(n, _)| intersection.offset < n.offset)
                        {
                            nearest = Some((intersection, i));
                        }
                    }
                }
                nearest
            }
            BvhNodeKind::Internal { left, right } => {
                let (first, second) = match order {
                    TraversalOrder::LeftFirst => (left, right),
                    TraversalOrder::RightFirst => (right, left),
                };
                let first_hit = self.intersect_node(first, ray, best, stats, order);
                if let Some((intersection, _)) = &first_hit {
                    if best.map_or(true, |best| intersection.offset < best) {
                        best = Some(intersection.offset);
                    }
                }
                let second_hit = self.intersect_node(second, ray, best, stats, order);
                nearer(first_hit, second_hit)
            }
        }
    }
}

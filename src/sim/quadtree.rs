//! Barnes-Hut quadtree over node positions, mass-weighted by the node size
//! hint so heavy hub nodes repel proportionally harder.

use eframe::egui::{vec2, Vec2};

const LEAF_CAPACITY: usize = 8;
const MAX_DEPTH: usize = 12;

#[derive(Clone, Copy)]
pub(super) struct Region {
    pub(super) center: Vec2,
    pub(super) half_extent: f32,
}

impl Region {
    fn enclosing(points: &[Vec2]) -> Option<Self> {
        let mut min = vec2(f32::INFINITY, f32::INFINITY);
        let mut max = vec2(f32::NEG_INFINITY, f32::NEG_INFINITY);
        for point in points {
            min.x = min.x.min(point.x);
            min.y = min.y.min(point.y);
            max.x = max.x.max(point.x);
            max.y = max.y.max(point.y);
        }

        if !(min.x.is_finite() && min.y.is_finite() && max.x.is_finite() && max.y.is_finite()) {
            return None;
        }

        let span = (max.x - min.x).max(max.y - min.y).max(1.0);
        Some(Self {
            center: (min + max) * 0.5,
            half_extent: span * 0.5 + 1.0,
        })
    }

    pub(super) fn contains(self, point: Vec2) -> bool {
        (point.x - self.center.x).abs() <= self.half_extent
            && (point.y - self.center.y).abs() <= self.half_extent
    }

    pub(super) fn side_length(self) -> f32 {
        self.half_extent * 2.0
    }

    /// Squared distance from `point` to the region boundary; zero inside.
    fn distance_sq_to_point(self, point: Vec2) -> f32 {
        let dx = ((point.x - self.center.x).abs() - self.half_extent).max(0.0);
        let dy = ((point.y - self.center.y).abs() - self.half_extent).max(0.0);
        dx * dx + dy * dy
    }

    fn quadrant_of(self, point: Vec2) -> usize {
        ((point.x >= self.center.x) as usize) | (((point.y >= self.center.y) as usize) << 1)
    }

    fn child_region(self, quadrant: usize) -> Self {
        let quarter = self.half_extent * 0.5;
        let dx = if quadrant & 1 == 1 { quarter } else { -quarter };
        let dy = if quadrant & 2 == 2 { quarter } else { -quarter };
        Self {
            center: self.center + vec2(dx, dy),
            half_extent: quarter,
        }
    }
}

pub(super) struct QuadTree {
    pub(super) region: Region,
    pub(super) center_of_mass: Vec2,
    pub(super) mass: f32,
    /// Point indices; populated only at leaves.
    pub(super) members: Vec<usize>,
    pub(super) children: [Option<Box<QuadTree>>; 4],
}

impl QuadTree {
    pub(super) fn build(positions: &[Vec2], masses: &[f32]) -> Option<Self> {
        debug_assert_eq!(positions.len(), masses.len());
        let region = Region::enclosing(positions)?;
        let members = (0..positions.len()).collect::<Vec<_>>();
        Some(Self::subdivide(region, members, positions, masses, 0))
    }

    fn subdivide(
        region: Region,
        members: Vec<usize>,
        positions: &[Vec2],
        masses: &[f32],
        depth: usize,
    ) -> Self {
        let mut mass = 0.0_f32;
        let mut center_of_mass = Vec2::ZERO;
        for &index in &members {
            mass += masses[index];
            center_of_mass += positions[index] * masses[index];
        }
        if mass > 0.0 {
            center_of_mass /= mass;
        }

        let mut tree = Self {
            region,
            center_of_mass,
            mass,
            members,
            children: std::array::from_fn(|_| None),
        };

        if depth >= MAX_DEPTH || tree.members.len() <= LEAF_CAPACITY {
            return tree;
        }

        let mut buckets: [Vec<usize>; 4] = std::array::from_fn(|_| Vec::new());
        for &index in &tree.members {
            buckets[region.quadrant_of(positions[index])].push(index);
        }
        // All points coincide in one quadrant: splitting cannot help.
        if buckets.iter().filter(|bucket| !bucket.is_empty()).count() <= 1 {
            return tree;
        }

        for (quadrant, bucket) in buckets.into_iter().enumerate() {
            if bucket.is_empty() {
                continue;
            }
            tree.children[quadrant] = Some(Box::new(Self::subdivide(
                region.child_region(quadrant),
                bucket,
                positions,
                masses,
                depth + 1,
            )));
        }
        tree.members.clear();
        tree
    }

    pub(super) fn is_leaf(&self) -> bool {
        self.children.iter().all(Option::is_none)
    }

    /// Visit the indices of every point within `range` of `center`
    /// (conservatively: callers re-check exact distances).
    pub(super) fn for_each_within(&self, center: Vec2, range: f32, visit: &mut impl FnMut(usize)) {
        if self.region.distance_sq_to_point(center) > range * range {
            return;
        }

        if self.is_leaf() {
            for &index in &self.members {
                visit(index);
            }
            return;
        }

        for child in self.children.iter().flatten() {
            child.for_each_within(center, range, visit);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tree_mass_matches_input() {
        let positions = vec![
            vec2(0.0, 0.0),
            vec2(100.0, 0.0),
            vec2(0.0, 100.0),
            vec2(100.0, 100.0),
            vec2(50.0, 50.0),
        ];
        let masses = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        let tree = QuadTree::build(&positions, &masses).expect("non-empty tree");
        assert!((tree.mass - 15.0).abs() < 1e-4);
        assert!(tree.region.contains(vec2(50.0, 50.0)));
    }

    #[test]
    fn range_query_finds_close_points_only() {
        let positions = (0..32)
            .map(|i| vec2((i % 8) as f32 * 50.0, (i / 8) as f32 * 50.0))
            .collect::<Vec<_>>();
        let masses = vec![1.0_f32; positions.len()];
        let tree = QuadTree::build(&positions, &masses).expect("non-empty tree");

        let mut hits = Vec::new();
        tree.for_each_within(vec2(0.0, 0.0), 60.0, &mut |index| {
            if positions[index].length() <= 60.0 {
                hits.push(index);
            }
        });
        hits.sort_unstable();
        // (0,0), (50,0), (0,50) are within 60 units of the origin.
        assert_eq!(hits, vec![0, 1, 8]);
    }
}

//! Per-node force accumulation: Barnes-Hut approximated repulsion and
//! radius-based collision separation.

use eframe::egui::{vec2, Vec2};

use super::quadtree::QuadTree;

/// Direction from `b` to `a`, with a stable synthetic direction for
/// coincident points so stacked nodes separate deterministically.
fn separation_direction(a: Vec2, b: Vec2, index_a: usize, index_b: usize) -> (Vec2, f32) {
    let delta = a - b;
    let distance = delta.length();
    if distance > 0.0001 {
        (delta / distance, distance)
    } else {
        let angle =
            ((index_a as f32) * 0.618_034 + (index_b as f32) * 0.414_214) * std::f32::consts::TAU;
        (vec2(angle.cos(), angle.sin()), 0.0001)
    }
}

/// Inverse-square repulsion of `index` against the whole tree, descending
/// only where the opening criterion (`theta`) demands it.
pub(super) fn repulsion_on(
    tree: &QuadTree,
    index: usize,
    positions: &[Vec2],
    masses: &[f32],
    strength: f32,
    softening: f32,
    theta: f32,
) -> Vec2 {
    let mut force = Vec2::ZERO;
    let point = positions[index];

    if tree.is_leaf() {
        for &other in &tree.members {
            if other == index {
                continue;
            }
            let (direction, distance) = separation_direction(point, positions[other], index, other);
            force += direction * (strength * masses[other] / (distance * distance + softening));
        }
        return force;
    }

    let delta = point - tree.center_of_mass;
    let distance_sq = delta.length_sq().max(0.0001);
    let distance = distance_sq.sqrt();
    if !tree.region.contains(point) && tree.region.side_length() / distance < theta {
        let direction = delta / distance;
        return direction * (strength * tree.mass / (distance_sq + softening));
    }

    for child in tree.children.iter().flatten() {
        force += repulsion_on(child, index, positions, masses, strength, softening, theta);
    }
    force
}

/// Push `index` away from any neighbor overlapping its padded radius. Each
/// node queries independently, so the net effect is symmetric without a
/// pair pass.
pub(super) fn collision_on(
    tree: &QuadTree,
    index: usize,
    positions: &[Vec2],
    radii: &[f32],
    max_radius: f32,
    strength: f32,
) -> Vec2 {
    let mut force = Vec2::ZERO;
    let point = positions[index];
    let reach = radii[index] + max_radius + COLLISION_PADDING;

    tree.for_each_within(point, reach, &mut |other| {
        if other == index {
            return;
        }
        let (direction, distance) = separation_direction(point, positions[other], index, other);
        let min_distance = radii[index] + radii[other] + COLLISION_PADDING;
        if distance < min_distance {
            force += direction * ((min_distance - distance) * strength);
        }
    });
    force
}

pub(super) const COLLISION_PADDING: f32 = 4.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repulsion_pushes_points_apart() {
        let positions = vec![vec2(-10.0, 0.0), vec2(10.0, 0.0)];
        let masses = vec![1.0, 1.0];
        let tree = QuadTree::build(&positions, &masses).expect("tree");

        let left = repulsion_on(&tree, 0, &positions, &masses, 1000.0, 10.0, 0.7);
        let right = repulsion_on(&tree, 1, &positions, &masses, 1000.0, 10.0, 0.7);
        assert!(left.x < 0.0);
        assert!(right.x > 0.0);
        assert!((left.x + right.x).abs() < 1e-3);
    }

    #[test]
    fn coincident_points_still_separate() {
        let positions = vec![vec2(5.0, 5.0), vec2(5.0, 5.0)];
        let masses = vec![1.0, 1.0];
        let tree = QuadTree::build(&positions, &masses).expect("tree");

        let force = collision_on(&tree, 0, &positions, &[8.0, 8.0], 8.0, 1.0);
        assert!(force.length() > 0.0);
    }

    #[test]
    fn collision_ignores_distant_neighbors() {
        let positions = vec![vec2(0.0, 0.0), vec2(500.0, 0.0)];
        let masses = vec![1.0, 1.0];
        let tree = QuadTree::build(&positions, &masses).expect("tree");

        let force = collision_on(&tree, 0, &positions, &[8.0, 8.0], 8.0, 1.0);
        assert_eq!(force, Vec2::ZERO);
    }
}

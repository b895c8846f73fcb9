use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Deterministic pseudo-random pair in [-1, 1] derived from a node id.
/// Seeds initial layout jitter so repeated runs over the same graph start
/// from the same positions.
pub fn stable_pair(id: &str) -> (f32, f32) {
    let mut hasher = DefaultHasher::new();
    id.hash(&mut hasher);
    let hash = hasher.finish();

    let x = ((hash & 0xffff_ffff) as f64 / u32::MAX as f64) as f32;
    let y = (((hash >> 32) & 0xffff_ffff) as f64 / u32::MAX as f64) as f32;
    ((x * 2.0) - 1.0, (y * 2.0) - 1.0)
}

pub fn truncate_label(label: &str, max_chars: usize) -> String {
    if label.chars().count() <= max_chars {
        return label.to_owned();
    }

    let mut shortened = label
        .chars()
        .take(max_chars.saturating_sub(1))
        .collect::<String>();
    shortened.push('…');
    shortened
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stable_pair_is_deterministic_and_bounded() {
        let (x1, y1) = stable_pair("Machine Learning");
        let (x2, y2) = stable_pair("Machine Learning");
        assert_eq!((x1, y1), (x2, y2));
        assert!((-1.0..=1.0).contains(&x1));
        assert!((-1.0..=1.0).contains(&y1));

        let other = stable_pair("TensorFlow");
        assert_ne!((x1, y1), other);
    }

    #[test]
    fn truncate_label_keeps_short_labels() {
        assert_eq!(truncate_label("AI", 10), "AI");
        let truncated = truncate_label("Natural Language Processing", 10);
        assert!(truncated.chars().count() <= 10);
        assert!(truncated.ends_with('…'));
    }
}

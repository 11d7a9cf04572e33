//! Label-preserving variants of a path.
//!
//! Rule choices of every node at depth `>= reset_layer` are redrawn from a
//! generator seeded with `variant_seed`; the class and all shallower choices
//! are kept, so the variant shares the class label and the top of the tree
//! with the original realization.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::Result;

use super::resolver::Path;
use super::rules::RuleBank;

/// Seed used for the variant of sample `index` when a batch shares one base
/// seed.
#[inline]
pub fn variant_seed_for(base_seed: u64, index: i128) -> u64 {
    base_seed.wrapping_add(index as u64)
}

/// Redraw every rule choice at depth `>= reset_layer`, breadth-first.
///
/// `reset_layer >= num_layers` returns the path unchanged.
pub fn inject_variant(
    path: &Path,
    bank: &RuleBank,
    reset_layer: usize,
    variant_seed: u64,
) -> Result<Path> {
    bank.check_path(path)?;

    if reset_layer >= bank.num_layers() {
        return Ok(path.clone());
    }

    let m = bank.m() as u32;
    let start = bank
        .layer_range(reset_layer)
        .map_or(path.len(), |range| range.start);
    let mut rng = ChaCha8Rng::seed_from_u64(variant_seed);

    let mut choices = path.choices().to_vec();
    for choice in &mut choices[start..] {
        *choice = rng.gen_range(0..m);
    }

    Ok(Path::from_parts(path.class(), choices))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::resolver::IndexResolver;
    use crate::hierarchy::rules::build;

    #[test]
    fn test_variant_preserves_shallow_choices() {
        let bank = build(10, 4, 3, 2, 2, 0).unwrap();
        let resolver = IndexResolver::new(&bank).unwrap();
        let path = resolver.resolve(20_000_000).unwrap();

        for reset_layer in 0..=bank.num_layers() {
            let variant = inject_variant(&path, &bank, reset_layer, 17).unwrap();
            assert_eq!(variant.class(), path.class());
            for depth in 0..reset_layer.min(bank.num_layers()) {
                assert_eq!(variant.layer(&bank, depth), path.layer(&bank, depth));
            }
            assert!(variant.choices().iter().all(|&c| c < 3));
        }
    }

    #[test]
    fn test_reset_at_num_layers_is_identity() {
        let bank = build(10, 4, 3, 1, 2, 0).unwrap();
        let path = IndexResolver::new(&bank).unwrap().resolve(99).unwrap();
        assert_eq!(inject_variant(&path, &bank, 4, 5).unwrap(), path);
        assert_eq!(inject_variant(&path, &bank, 42, 5).unwrap(), path);
    }

    #[test]
    fn test_variant_is_deterministic() {
        let bank = build(10, 4, 3, 1, 2, 0).unwrap();
        let path = IndexResolver::new(&bank).unwrap().resolve(12_345).unwrap();
        let a = inject_variant(&path, &bank, 1, 8).unwrap();
        let b = inject_variant(&path, &bank, 1, 8).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_full_reset_changes_deep_choices() {
        // 15 choices redrawn among 3 values: at least one seed must differ
        let bank = build(10, 4, 3, 1, 2, 0).unwrap();
        let path = IndexResolver::new(&bank).unwrap().resolve(0).unwrap();
        let changed = (0..8u64)
            .map(|seed| inject_variant(&path, &bank, 0, seed).unwrap())
            .any(|variant| variant != path);
        assert!(changed);
    }

    #[test]
    fn test_variant_seed_for_wraps() {
        assert_eq!(variant_seed_for(10, 5), 15);
        assert_eq!(variant_seed_for(u64::MAX, 1), 0);
    }
}

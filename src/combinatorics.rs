//! Exact counting and radix helpers for the hierarchy.
//!
//! Every count that can grow combinatorially (tuple spaces, node counts,
//! `Pmax`) is computed with checked arithmetic and reported as
//! `RhmError::CountOverflow` instead of wrapping.

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{Result, RhmError};

/// `base^exp` in `u128`, `None` on overflow.
pub fn checked_pow(base: u128, exp: usize) -> Option<u128> {
    match base {
        0 => Some(if exp == 0 { 1 } else { 0 }),
        1 => Some(1),
        _ => u32::try_from(exp).ok().and_then(|e| base.checked_pow(e)),
    }
}

/// Number of nodes at depth `depth` of an `s`-ary tree, `s^depth`.
pub fn layer_width(s: usize, depth: usize) -> Result<usize> {
    checked_pow(s as u128, depth)
        .and_then(|w| usize::try_from(w).ok())
        .ok_or(RhmError::CountOverflow { what: "layer width" })
}

/// Number of internal nodes of an `s`-ary tree with `num_layers` levels of
/// rules, i.e. `(s^num_layers - 1) / (s - 1)`.
///
/// This is also the number of rule choices in a path.
pub fn num_rule_nodes(s: usize, num_layers: usize) -> Result<usize> {
    let mut total: usize = 0;
    for depth in 0..num_layers {
        total = total
            .checked_add(layer_width(s, depth)?)
            .ok_or(RhmError::CountOverflow { what: "node count" })?;
    }
    Ok(total)
}

/// Total number of distinct samples,
/// `Pmax = m^((s^num_layers - 1)/(s - 1)) * num_classes`.
pub fn pmax(m: usize, s: usize, num_layers: usize, num_classes: usize) -> Result<u128> {
    let nodes = num_rule_nodes(s, num_layers)?;
    checked_pow(m as u128, nodes)
        .and_then(|per_class| per_class.checked_mul(num_classes as u128))
        .ok_or(RhmError::CountOverflow { what: "Pmax" })
}

/// Sample-complexity scale of the hierarchy, `P* = num_classes * m^num_layers`.
pub fn pstar(m: usize, num_layers: usize, num_classes: usize) -> Result<u128> {
    checked_pow(m as u128, num_layers)
        .and_then(|p| p.checked_mul(num_classes as u128))
        .ok_or(RhmError::CountOverflow { what: "P*" })
}

/// Write `value` in base `base` with exactly `len` digits, most significant
/// first. Higher digits that do not fit in `len` are dropped.
pub fn to_base(mut value: u128, base: u32, len: usize) -> Vec<u32> {
    let mut digits = vec![0u32; len];
    let b = base as u128;
    for slot in digits.iter_mut().rev() {
        *slot = (value % b) as u32;
        value /= b;
    }
    digits
}

/// Inverse of [`to_base`]. `None` if the value overflows `u128`.
pub fn from_base(digits: &[u32], base: u32) -> Option<u128> {
    digits.iter().try_fold(0u128, |acc, &d| {
        acc.checked_mul(base as u128)?.checked_add(d as u128)
    })
}

/// Draw `count` distinct values from `[0, space)` in random order.
///
/// Uses `rand::seq::index::sample` when the space fits in `usize` and
/// Floyd's algorithm otherwise.
pub fn sample_distinct<R: Rng + ?Sized>(
    rng: &mut R,
    space: u128,
    count: usize,
) -> Result<Vec<u128>> {
    if count as u128 > space {
        return Err(RhmError::Configuration(format!(
            "cannot draw {} distinct values from a space of {}",
            count, space
        )));
    }

    if let Ok(len) = usize::try_from(space) {
        return Ok(rand::seq::index::sample(rng, len, count)
            .into_iter()
            .map(|i| i as u128)
            .collect());
    }

    let mut chosen: HashSet<u128> = HashSet::with_capacity(count);
    let mut out = Vec::with_capacity(count);
    for j in (space - count as u128)..space {
        let t = rng.gen_range(0..=j);
        let pick = if chosen.contains(&t) { j } else { t };
        chosen.insert(pick);
        out.push(pick);
    }
    out.shuffle(rng);
    Ok(out)
}

/// Seeded draw of `count` distinct sample indices from `[0, pmax)`.
///
/// A smaller `count` under the same seed is not necessarily a prefix of a
/// larger draw, so callers draw every index they need at once and split
/// afterwards.
pub fn sample_indices(pmax: u128, count: usize, seed: u64) -> Result<Vec<u128>> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    sample_distinct(&mut rng, pmax, count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(2, 2, 2, 2, 16)]
    #[case(3, 2, 4, 1, 14_348_907)]
    #[case(2, 3, 2, 4, 64)]
    #[case(1, 2, 5, 7, 7)]
    fn test_pmax_formula(
        #[case] m: usize,
        #[case] s: usize,
        #[case] num_layers: usize,
        #[case] num_classes: usize,
        #[case] expected: u128,
    ) {
        assert_eq!(pmax(m, s, num_layers, num_classes).unwrap(), expected);
    }

    #[test]
    fn test_pmax_overflow_is_reported() {
        // 10^63 does not fit in u128
        let err = pmax(10, 2, 6, 10).unwrap_err();
        assert!(matches!(err, RhmError::CountOverflow { .. }));
    }

    #[test]
    fn test_pstar() {
        assert_eq!(pstar(2, 3, 4).unwrap(), 32);
        assert_eq!(pstar(3, 4, 1).unwrap(), 81);
        assert!(matches!(pstar(10, 40, 1), Err(RhmError::CountOverflow { .. })));
    }

    #[test]
    fn test_num_rule_nodes() {
        assert_eq!(num_rule_nodes(2, 4).unwrap(), 15);
        assert_eq!(num_rule_nodes(3, 3).unwrap(), 13);
        assert_eq!(num_rule_nodes(2, 1).unwrap(), 1);
    }

    #[test]
    fn test_base_conversion_inverse() {
        let digits = to_base(1234, 7, 5);
        assert_eq!(digits, vec![0, 3, 4, 1, 2]);
        assert_eq!(from_base(&digits, 7), Some(1234));
    }

    #[test]
    fn test_sample_distinct_small_space() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let mut values = sample_distinct(&mut rng, 20, 20).unwrap();
        values.sort_unstable();
        assert_eq!(values, (0..20).collect::<Vec<u128>>());
    }

    #[test]
    fn test_sample_distinct_huge_space() {
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let space = u128::MAX / 3;
        let values = sample_distinct(&mut rng, space, 500).unwrap();
        let unique: HashSet<u128> = values.iter().copied().collect();
        assert_eq!(unique.len(), 500);
        assert!(values.iter().all(|&v| v < space));
    }

    #[test]
    fn test_sample_distinct_rejects_oversized_request() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert!(sample_distinct(&mut rng, 5, 6).is_err());
    }

    #[test]
    fn test_sample_indices_reproducible() {
        let a = sample_indices(14_348_907, 10, 0).unwrap();
        let b = sample_indices(14_348_907, 10, 0).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, sample_indices(14_348_907, 10, 1).unwrap());
    }
}

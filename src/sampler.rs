//! Batched sampling into tensors.
//!
//! Samples are independent: each index is resolved, optionally turned into a
//! variant, and realized on the rayon pool, then the realizations are written
//! into dense `ndarray` buffers in input order.

use ndarray::{Array1, Array2, Array3};
use rayon::prelude::*;
use tracing::trace;

use crate::config::{Encoding, SampleConfig};
use crate::error::Result;
use crate::hierarchy::{inject_variant, realize, variant_seed_for, IndexResolver, Realization, RuleBank};

/// Encoded leaf sequences of a batch.
#[derive(Debug, Clone, PartialEq)]
pub enum Features {
    /// `[batch, s^L, num_features]`
    OneHot(Array3<f32>),
    /// `[batch, s^L, 1]`
    Index(Array3<i64>),
}

impl Features {
    pub fn shape(&self) -> &[usize] {
        match self {
            Features::OneHot(x) => x.shape(),
            Features::Index(x) => x.shape(),
        }
    }

    pub fn encoding(&self) -> Encoding {
        match self {
            Features::OneHot(_) => Encoding::OneHot,
            Features::Index(_) => Encoding::Index,
        }
    }

    pub fn as_one_hot(&self) -> Option<&Array3<f32>> {
        match self {
            Features::OneHot(x) => Some(x),
            Features::Index(_) => None,
        }
    }

    pub fn as_index(&self) -> Option<&Array3<i64>> {
        match self {
            Features::Index(x) => Some(x),
            Features::OneHot(_) => None,
        }
    }
}

/// One batch of samples.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleBatch {
    pub x: Features,
    /// Class label of every sample.
    pub y: Array1<i64>,
    /// `[batch, s^d]` symbols for every intermediate depth `d = 1 .. L-1`,
    /// when requested.
    pub layer_labels: Option<Vec<Array2<i64>>>,
}

impl SampleBatch {
    pub fn len(&self) -> usize {
        self.y.len()
    }

    pub fn is_empty(&self) -> bool {
        self.y.is_empty()
    }
}

/// Resolve, optionally vary, and realize one index.
///
/// The variant of sample `index` is seeded with
/// `variant_seed_for(config.variant_seed, index)`, so it does not depend on
/// the batch the index belongs to.
pub fn realize_index(
    resolver: &IndexResolver<'_>,
    index: i128,
    config: &SampleConfig,
) -> Result<Realization> {
    let bank = resolver.bank();
    let path = resolver.resolve(index)?;
    let path = match config.seed_reset_layer {
        Some(reset_layer) if reset_layer < bank.num_layers() => inject_variant(
            &path,
            bank,
            reset_layer,
            variant_seed_for(config.variant_seed, index),
        )?,
        _ => path,
    };
    realize(&path, bank)
}

/// Sample `indices` into one batch, in parallel.
///
/// # Arguments
/// * `indices` - Sample indices in `[0, Pmax)`
/// * `bank` - Rule bank shared by all samples
/// * `config` - Encoding, variant depth and seed, layer labels
///
/// # Returns
/// * `SampleBatch` with one row per index, in input order; the first
///   invalid index fails the whole batch
pub fn sample(indices: &[i128], bank: &RuleBank, config: &SampleConfig) -> Result<SampleBatch> {
    let resolver = IndexResolver::new(bank)?;

    let realizations: Vec<Realization> = indices
        .par_iter()
        .map(|&index| realize_index(&resolver, index, config))
        .collect::<Result<Vec<_>>>()?;

    trace!(
        batch = realizations.len(),
        encoding = %config.encoding,
        reset_layer = ?config.seed_reset_layer,
        "sampled batch"
    );

    Ok(encode(&realizations, bank, config))
}

/// Write realizations into tensors.
pub fn encode(realizations: &[Realization], bank: &RuleBank, config: &SampleConfig) -> SampleBatch {
    let batch = realizations.len();
    let length = bank.leaf_count();

    let x = match config.encoding {
        Encoding::Index => {
            let mut x = Array3::<i64>::zeros((batch, length, 1));
            for (b, realization) in realizations.iter().enumerate() {
                for (position, &symbol) in realization.leaves().iter().enumerate() {
                    x[[b, position, 0]] = symbol as i64;
                }
            }
            Features::Index(x)
        }
        Encoding::OneHot => {
            let vocab = bank.num_features();
            let (off, on) = if config.whitening {
                whitened_levels(vocab)
            } else {
                (0.0, 1.0)
            };
            let mut x = Array3::<f32>::from_elem((batch, length, vocab), off);
            for (b, realization) in realizations.iter().enumerate() {
                for (position, &symbol) in realization.leaves().iter().enumerate() {
                    x[[b, position, symbol as usize]] = on;
                }
            }
            Features::OneHot(x)
        }
    };

    let y: Array1<i64> = realizations
        .iter()
        .map(|r| r.class_label() as i64)
        .collect();

    let layer_labels = config.layer_labels.then(|| {
        (1..bank.num_layers())
            .map(|depth| {
                let width = bank.layer_width(depth).unwrap_or_default();
                let mut labels = Array2::<i64>::zeros((batch, width));
                for (b, realization) in realizations.iter().enumerate() {
                    for (position, &symbol) in realization.level(depth).iter().enumerate() {
                        labels[[b, position]] = symbol as i64;
                    }
                }
                labels
            })
            .collect()
    });

    SampleBatch { x, y, layer_labels }
}

/// Values of the inactive and active entries of a whitened one-hot vector,
/// `(x - 1/v) / sqrt(1 - 1/v)`. A single-symbol vocabulary has no variance
/// and whitens to zeros.
fn whitened_levels(vocab: usize) -> (f32, f32) {
    if vocab < 2 {
        return (0.0, 0.0);
    }
    let mean = 1.0 / vocab as f64;
    let scale = (1.0 - mean).sqrt();
    ((-mean / scale) as f32, ((1.0 - mean) / scale) as f32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combinatorics::{pmax, sample_indices};
    use crate::config::{HierarchyConfig, PartitionMode};
    use crate::error::RhmError;
    use crate::hierarchy::build;
    use std::collections::HashSet;

    fn e2e_indices() -> Vec<i128> {
        let p = pmax(3, 2, 4, 1).unwrap();
        sample_indices(p, 10, 0)
            .unwrap()
            .into_iter()
            .map(|i| i as i128)
            .collect()
    }

    #[test]
    fn test_end_to_end_scenario() {
        let bank = build(10, 4, 3, 1, 2, 0).unwrap();
        assert_eq!(bank.pmax().unwrap(), 3u128.pow(15));

        let indices = e2e_indices();
        let batch = sample(&indices, &bank, &SampleConfig::canonical(Encoding::OneHot)).unwrap();

        assert_eq!(batch.x.shape(), &[10, 16, 10]);
        assert_eq!(batch.len(), 10);
        assert!(batch.y.iter().all(|&label| label == 0));

        // exactly one active feature per position
        let x = batch.x.as_one_hot().unwrap();
        for row in x.rows() {
            assert_eq!(row.sum(), 1.0);
        }
    }

    #[test]
    fn test_index_encoding_shape_and_values() {
        let bank = build(10, 4, 3, 1, 2, 0).unwrap();
        let indices = e2e_indices();
        let config = SampleConfig::canonical(Encoding::Index);
        let batch = sample(&indices, &bank, &config).unwrap();
        assert_eq!(batch.x.shape(), &[10, 16, 1]);

        let resolver = IndexResolver::new(&bank).unwrap();
        let x = batch.x.as_index().unwrap();
        for (b, &index) in indices.iter().enumerate() {
            let realization = realize_index(&resolver, index, &config).unwrap();
            for (position, &symbol) in realization.leaves().iter().enumerate() {
                assert_eq!(x[[b, position, 0]], symbol as i64);
            }
        }
    }

    #[test]
    fn test_one_hot_and_index_agree() {
        let bank = build(6, 3, 2, 3, 2, 2).unwrap();
        let indices: Vec<i128> = (0..50).map(|i| i * 7).collect();
        let one_hot = sample(&indices, &bank, &SampleConfig::canonical(Encoding::OneHot)).unwrap();
        let index = sample(&indices, &bank, &SampleConfig::canonical(Encoding::Index)).unwrap();

        let one_hot = one_hot.x.as_one_hot().unwrap();
        let index = index.x.as_index().unwrap();
        for b in 0..indices.len() {
            for position in 0..8 {
                let symbol = index[[b, position, 0]] as usize;
                assert_eq!(one_hot[[b, position, symbol]], 1.0);
            }
        }
    }

    #[test]
    fn test_batch_is_independent_of_composition() {
        let bank = build(10, 4, 3, 2, 2, 0).unwrap();
        let config = SampleConfig::variant(Encoding::Index, 1, 99);
        let full = sample(&[5, 600, 70_000], &bank, &config).unwrap();
        let single = sample(&[600], &bank, &config).unwrap();

        let full_x = full.x.as_index().unwrap();
        let single_x = single.x.as_index().unwrap();
        for position in 0..16 {
            assert_eq!(full_x[[1, position, 0]], single_x[[0, position, 0]]);
        }
    }

    #[test]
    fn test_sample_is_deterministic() {
        let bank = build(10, 4, 3, 2, 2, 0).unwrap();
        let indices: Vec<i128> = (0..64).map(|i| i * 400_009).collect();
        let config = SampleConfig::variant(Encoding::OneHot, 2, 5).with_layer_labels(true);
        assert_eq!(
            sample(&indices, &bank, &config).unwrap(),
            sample(&indices, &bank, &config).unwrap()
        );
    }

    #[test]
    fn test_variant_keeps_labels() {
        let bank = build(8, 3, 2, 8, 2, 1).unwrap();
        let indices: Vec<i128> = (0..100).map(|i| i * 10).collect();
        let canonical =
            sample(&indices, &bank, &SampleConfig::canonical(Encoding::Index).with_layer_labels(true))
                .unwrap();
        let variant = sample(
            &indices,
            &bank,
            &SampleConfig::variant(Encoding::Index, 2, 3).with_layer_labels(true),
        )
        .unwrap();

        assert_eq!(canonical.y, variant.y);
        let canonical_labels = canonical.layer_labels.unwrap();
        let variant_labels = variant.layer_labels.unwrap();
        // depth 1 and 2 are fixed by the choices of depth 0 and 1
        assert_eq!(canonical_labels[0], variant_labels[0]);
        assert_eq!(canonical_labels[1], variant_labels[1]);
    }

    #[test]
    fn test_reset_at_num_layers_is_canonical() {
        let bank = build(8, 3, 2, 8, 2, 1).unwrap();
        let indices: Vec<i128> = (0..20).collect();
        let canonical = sample(&indices, &bank, &SampleConfig::canonical(Encoding::Index)).unwrap();
        let sentinel = sample(&indices, &bank, &SampleConfig::variant(Encoding::Index, 3, 77)).unwrap();
        assert_eq!(canonical, sentinel);
    }

    #[test]
    fn test_layer_label_shapes() {
        let bank = build(10, 4, 3, 2, 2, 0).unwrap();
        let config = SampleConfig::canonical(Encoding::Index).with_layer_labels(true);
        let batch = sample(&[0, 1, 2], &bank, &config).unwrap();
        let shapes: Vec<Vec<usize>> = batch
            .layer_labels
            .unwrap()
            .iter()
            .map(|labels| labels.shape().to_vec())
            .collect();
        assert_eq!(shapes, vec![vec![3, 2], vec![3, 4], vec![3, 8]]);
    }

    #[test]
    fn test_full_enumeration_is_bijective() {
        let bank = build(4, 2, 2, 2, 2, 0).unwrap();
        let indices: Vec<i128> = (0..16).collect();
        let batch = sample(&indices, &bank, &SampleConfig::canonical(Encoding::Index)).unwrap();
        let x = batch.x.as_index().unwrap();
        let sequences: HashSet<Vec<i64>> = x
            .outer_iter()
            .map(|sample| sample.iter().copied().collect())
            .collect();
        assert_eq!(sequences.len(), 16);
    }

    #[test]
    fn test_symbol_partition_full_enumeration_is_bijective() {
        let config =
            HierarchyConfig::new(200, 3, 2, 2, 2, 9).with_partition(PartitionMode::Symbols);
        let bank = RuleBank::from_config(&config).unwrap();
        assert_eq!(bank.pmax().unwrap(), 256);

        let indices: Vec<i128> = (0..256).collect();
        let batch = sample(&indices, &bank, &SampleConfig::canonical(Encoding::Index)).unwrap();
        let x = batch.x.as_index().unwrap();
        let sequences: HashSet<Vec<i64>> = x
            .outer_iter()
            .map(|sample| sample.iter().copied().collect())
            .collect();
        assert_eq!(sequences.len(), 256);

        let one_hot = sample(&[0, 255], &bank, &SampleConfig::canonical(Encoding::OneHot)).unwrap();
        assert_eq!(one_hot.x.shape(), &[2, 8, 200]);
    }

    #[test]
    fn test_whitened_positions_have_zero_mean() {
        let bank = build(10, 4, 3, 2, 2, 0).unwrap();
        let indices: Vec<i128> = (0..20).map(|i| i * 400_009).collect();
        let plain = sample(&indices, &bank, &SampleConfig::canonical(Encoding::OneHot)).unwrap();
        let config = SampleConfig::canonical(Encoding::OneHot).with_whitening(true);
        let whitened = sample(&indices, &bank, &config).unwrap();

        let plain = plain.x.as_one_hot().unwrap();
        let x = whitened.x.as_one_hot().unwrap();
        assert_eq!(x.shape(), &[20, 16, 10]);
        for row in x.rows() {
            assert!(row.sum().abs() < 1e-5);
        }

        let on = (0.9f32).sqrt();
        let off = -0.1 / (0.9f32).sqrt();
        for (&w, &p) in x.iter().zip(plain.iter()) {
            let expected = if p == 1.0 { on } else { off };
            assert!((w - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_whitening_leaves_index_encoding_unchanged() {
        let bank = build(6, 3, 2, 3, 2, 2).unwrap();
        let indices: Vec<i128> = (0..30).collect();
        let plain = sample(&indices, &bank, &SampleConfig::canonical(Encoding::Index)).unwrap();
        let config = SampleConfig::canonical(Encoding::Index).with_whitening(true);
        assert_eq!(sample(&indices, &bank, &config).unwrap(), plain);
    }

    #[test]
    fn test_out_of_range_index_fails_batch() {
        let bank = build(4, 2, 2, 2, 2, 0).unwrap();
        let err = sample(&[0, 3, 16], &bank, &SampleConfig::default()).unwrap_err();
        assert!(matches!(err, RhmError::IndexOutOfRange { index: 16, .. }));
    }

    #[test]
    fn test_empty_batch() {
        let bank = build(4, 2, 2, 2, 2, 0).unwrap();
        let batch = sample(&[], &bank, &SampleConfig::default()).unwrap();
        assert!(batch.is_empty());
        assert_eq!(batch.x.shape(), &[0, 4, 4]);
    }
}

//! Random Hierarchy Model: synthetic labeled data from random, multi-layer
//! production-rule trees.
//!
//! A [`RuleBank`] is sampled once from a seed. Every integer in
//! `[0, Pmax)` then addresses exactly one root-to-leaf expansion of the
//! hierarchy, which is realized into a leaf sequence of length
//! `s^num_layers` and its class label:
//!
//! ```
//! use rhm::{build, sample, Encoding, SampleConfig};
//!
//! let bank = build(10, 4, 3, 1, 2, 0).unwrap();
//! assert_eq!(bank.pmax().unwrap(), 3u128.pow(15));
//!
//! let batch = sample(&[0, 1, 2], &bank, &SampleConfig::canonical(Encoding::OneHot)).unwrap();
//! assert_eq!(batch.x.shape(), &[3, 16, 10]);
//! ```
//!
//! Label-preserving variants redraw the rule choices below a depth:
//! `SampleConfig::variant(encoding, reset_layer, seed)`.

pub mod combinatorics;
pub mod config;
pub mod dataset;
pub mod error;
pub mod hierarchy;
pub mod sampler;

#[cfg(feature = "python")]
mod bindings;

pub use combinatorics::{pmax, pstar, sample_indices};
pub use config::{DatasetConfig, Encoding, HierarchyConfig, PartitionMode, SampleConfig, SampleCount};
pub use dataset::{Batches, HierarchicalDataset, Split};
pub use error::{Result, RhmError};
pub use hierarchy::{
    build, inject_variant, realize, resolve, IndexResolver, LayerRules, Path, Realization, RuleBank,
    Symbol,
};
pub use sampler::{sample, Features, SampleBatch};

//! Train/test datasets over one rule bank.
//!
//! The rule bank is built once; `train + test` distinct indices are drawn
//! from `[0, Pmax)` with one seeded draw and split, so the two splits never
//! share a sample. Batches are realized lazily from the stored indices.

use std::slice::Chunks;

use tracing::info;

use crate::combinatorics::sample_indices;
use crate::config::{DatasetConfig, SampleConfig};
use crate::error::{Result, RhmError};
use crate::hierarchy::{IndexResolver, Realization, RuleBank};
use crate::sampler::{self, SampleBatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Test,
}

#[derive(Debug, Clone)]
pub struct HierarchicalDataset {
    config: DatasetConfig,
    bank: RuleBank,
    pmax: u128,
    train: Vec<i128>,
    test: Vec<i128>,
}

impl HierarchicalDataset {
    pub fn new(config: DatasetConfig) -> Result<Self> {
        let bank = RuleBank::from_config(&config.hierarchy)?;
        let pmax = bank.pmax()?;
        let pstar = bank.pstar()?;

        let n_train = config.train_size.resolve(pmax, pstar)?;
        let n_test = config.test_size.resolve(pmax, pstar)?;
        let total = n_train
            .checked_add(n_test)
            .ok_or(RhmError::CountOverflow { what: "dataset size" })?;
        if total as u128 > pmax {
            return Err(RhmError::Configuration(format!(
                "requested {} train + {} test samples, but only {} distinct samples exist",
                n_train, n_test, pmax
            )));
        }

        let mut train = sample_indices(pmax, total, config.sample_seed())?
            .into_iter()
            .map(|index| {
                i128::try_from(index).map_err(|_| RhmError::CountOverflow {
                    what: "sample index",
                })
            })
            .collect::<Result<Vec<_>>>()?;
        let test = train.split_off(n_train);

        info!(
            pmax = %pmax,
            train = train.len(),
            test = test.len(),
            sample_seed = config.sample_seed(),
            "built hierarchical dataset"
        );

        Ok(Self {
            config,
            bank,
            pmax,
            train,
            test,
        })
    }

    pub fn bank(&self) -> &RuleBank {
        &self.bank
    }

    pub fn config(&self) -> &DatasetConfig {
        &self.config
    }

    pub fn pmax(&self) -> u128 {
        self.pmax
    }

    pub fn indices(&self, split: Split) -> &[i128] {
        match split {
            Split::Train => &self.train,
            Split::Test => &self.test,
        }
    }

    pub fn len(&self, split: Split) -> usize {
        self.indices(split).len()
    }

    pub fn is_empty(&self, split: Split) -> bool {
        self.indices(split).is_empty()
    }

    fn sample_config(&self) -> SampleConfig {
        SampleConfig::canonical(self.config.encoding)
            .with_layer_labels(self.config.layer_labels)
            .with_whitening(self.config.whitening)
    }

    /// Canonical realization of the `position`-th sample of `split`.
    pub fn get(&self, split: Split, position: usize) -> Result<Realization> {
        let indices = self.indices(split);
        let &index = indices.get(position).ok_or(RhmError::SplitPosition {
            position,
            len: indices.len(),
        })?;
        let resolver = IndexResolver::new(&self.bank)?;
        sampler::realize_index(&resolver, index, &self.sample_config())
    }

    /// Canonical batches of `split`, in draw order.
    pub fn batches(&self, split: Split, batch_size: usize) -> Result<Batches<'_>> {
        self.batches_with(split, batch_size, self.sample_config())
    }

    /// Batches whose rule choices at depth `>= reset_layer` are redrawn.
    /// Labels (and everything above `reset_layer`) match [`batches`](Self::batches).
    pub fn variant_batches(
        &self,
        split: Split,
        batch_size: usize,
        reset_layer: usize,
        variant_seed: u64,
    ) -> Result<Batches<'_>> {
        let config = SampleConfig::variant(self.config.encoding, reset_layer, variant_seed)
            .with_layer_labels(self.config.layer_labels)
            .with_whitening(self.config.whitening);
        self.batches_with(split, batch_size, config)
    }

    fn batches_with(
        &self,
        split: Split,
        batch_size: usize,
        config: SampleConfig,
    ) -> Result<Batches<'_>> {
        if batch_size == 0 {
            return Err(RhmError::Configuration("batch_size must be positive".into()));
        }
        Ok(Batches {
            bank: &self.bank,
            chunks: self.indices(split).chunks(batch_size),
            config,
        })
    }
}

/// Iterator over the batches of one split.
pub struct Batches<'a> {
    bank: &'a RuleBank,
    chunks: Chunks<'a, i128>,
    config: SampleConfig,
}

impl<'a> Iterator for Batches<'a> {
    type Item = Result<SampleBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        let chunk = self.chunks.next()?;
        Some(sampler::sample(chunk, self.bank, &self.config))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.chunks.size_hint()
    }
}

impl ExactSizeIterator for Batches<'_> {}

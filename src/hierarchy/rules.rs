//! Production-rule bank of the random hierarchy.
//!
//! Layer `l` of the bank maps every symbol of vocabulary `l` to `m` ordered
//! `s`-tuples of symbols of vocabulary `l + 1`. Rules are stored flat, indexed
//! by `(parent, rule)`, so a bank is a handful of `Vec<Symbol>` and can be
//! shared across threads by reference.
//!
//! Rule sets of different parents never overlap, which is what makes the
//! index → path decoding injective:
//! - `PartitionMode::Tuples`: all `v_l * m` tuples of a layer are distinct.
//! - `PartitionMode::Symbols`: all `v_l * m * s` child symbols of a layer are
//!   distinct.

use std::ops::Range;

use ndarray::Array3;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::combinatorics::{self, checked_pow, layer_width, num_rule_nodes, sample_distinct};
use crate::config::{HierarchyConfig, PartitionMode};
use crate::error::{Result, RhmError};

use super::resolver::Path;

/// Symbol id, scoped to one layer's vocabulary.
pub type Symbol = u32;

/// Rules from one layer to the next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerRules {
    parent_vocab: usize,
    child_vocab: usize,
    m: usize,
    s: usize,
    /// `tuples[((parent * m) + rule) * s + k]`
    tuples: Vec<Symbol>,
}

impl LayerRules {
    pub fn parent_vocab(&self) -> usize {
        self.parent_vocab
    }

    pub fn child_vocab(&self) -> usize {
        self.child_vocab
    }

    /// The `s` children produced by rule `rule` of `parent`.
    #[inline]
    pub fn rule(&self, parent: Symbol, rule: usize) -> &[Symbol] {
        let start = (parent as usize * self.m + rule) * self.s;
        &self.tuples[start..start + self.s]
    }

    /// All `m` tuples of `parent`, concatenated.
    pub fn rules_of(&self, parent: Symbol) -> &[Symbol] {
        let start = parent as usize * self.m * self.s;
        &self.tuples[start..start + self.m * self.s]
    }

    /// Every rule tuple of the layer, parent-major.
    pub fn tuples(&self) -> std::slice::ChunksExact<'_, Symbol> {
        self.tuples.chunks_exact(self.s)
    }

    pub fn as_flat(&self) -> &[Symbol] {
        &self.tuples
    }

    /// Rules as a `[parent_vocab, m, s]` array.
    pub fn to_array(&self) -> Array3<i64> {
        Array3::from_shape_fn((self.parent_vocab, self.m, self.s), |(p, r, k)| {
            self.tuples[(p * self.m + r) * self.s + k] as i64
        })
    }
}

/// Immutable bank of production rules for every layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleBank {
    config: HierarchyConfig,
    vocab_sizes: Vec<usize>,
    layers: Vec<LayerRules>,
    /// `layer_offsets[d]` is the position of the first depth-`d` choice in a
    /// path; the last entry is the path length.
    layer_offsets: Vec<usize>,
    leaf_count: usize,
}

/// Build a rule bank with the default (tuple) partition.
///
/// # Arguments
/// * `num_features` - Vocabulary size of the leaves and intermediate layers
/// * `num_layers` - Number of rule layers
/// * `m` - Rules per symbol
/// * `num_classes` - Vocabulary size of the root
/// * `s` - Tuple length (branching factor)
/// * `seed` - Seed of the rule sampling
///
/// # Returns
/// * The rule bank, or `InsufficientVocabulary` if some layer cannot supply
///   `v * m` distinct tuples
pub fn build(
    num_features: usize,
    num_layers: usize,
    m: usize,
    num_classes: usize,
    s: usize,
    seed: u64,
) -> Result<RuleBank> {
    RuleBank::from_config(&HierarchyConfig::new(
        num_features,
        num_layers,
        m,
        num_classes,
        s,
        seed,
    ))
}

impl RuleBank {
    /// Sample the rules of every layer, root first, from a generator seeded
    /// with `config.seed`.
    pub fn from_config(config: &HierarchyConfig) -> Result<Self> {
        config.validate()?;

        let mut config = config.clone();
        config.num_classes = Some(config.num_classes());
        config.m = Some(config.m());
        let m = config.m();

        let vocab_sizes = vocab_sizes(&config)?;
        let mut layer_offsets = Vec::with_capacity(config.num_layers + 1);
        for depth in 0..=config.num_layers {
            layer_offsets.push(num_rule_nodes(config.s, depth)?);
        }
        let leaf_count = layer_width(config.s, config.num_layers)?;

        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let mut layers = Vec::with_capacity(config.num_layers);

        for layer in 0..config.num_layers {
            let parent_vocab = vocab_sizes[layer];
            let child_vocab = vocab_sizes[layer + 1];

            let tuples = match config.partition {
                PartitionMode::Tuples => {
                    sample_tuple_rules(&mut rng, layer, parent_vocab, child_vocab, m, config.s)?
                }
                PartitionMode::Symbols => {
                    sample_symbol_rules(&mut rng, layer, parent_vocab, child_vocab, m, config.s)?
                }
            };

            debug!(
                layer,
                parent_vocab,
                child_vocab,
                rules = parent_vocab * m,
                "sampled production rules"
            );

            layers.push(LayerRules {
                parent_vocab,
                child_vocab,
                m,
                s: config.s,
                tuples,
            });
        }

        info!(
            num_features = config.num_features,
            num_layers = config.num_layers,
            m,
            s = config.s,
            num_classes = config.num_classes(),
            seed = config.seed,
            partition = ?config.partition,
            "built rule bank"
        );

        Ok(Self {
            config,
            vocab_sizes,
            layers,
            layer_offsets,
            leaf_count,
        })
    }

    pub fn config(&self) -> &HierarchyConfig {
        &self.config
    }

    pub fn num_features(&self) -> usize {
        self.config.num_features
    }

    pub fn num_layers(&self) -> usize {
        self.config.num_layers
    }

    pub fn m(&self) -> usize {
        self.config.m()
    }

    pub fn s(&self) -> usize {
        self.config.s
    }

    pub fn num_classes(&self) -> usize {
        self.config.num_classes()
    }

    pub fn seed(&self) -> u64 {
        self.config.seed
    }

    pub fn partition(&self) -> PartitionMode {
        self.config.partition
    }

    /// Vocabulary size of every layer, root (`num_classes`) to leaves
    /// (`num_features`).
    pub fn vocab_sizes(&self) -> &[usize] {
        &self.vocab_sizes
    }

    pub fn vocab_size(&self, layer: usize) -> usize {
        self.vocab_sizes[layer]
    }

    pub fn layers(&self) -> &[LayerRules] {
        &self.layers
    }

    pub fn layer(&self, layer: usize) -> &LayerRules {
        &self.layers[layer]
    }

    #[inline]
    pub fn rule(&self, layer: usize, parent: Symbol, rule: usize) -> &[Symbol] {
        self.layers[layer].rule(parent, rule)
    }

    /// Number of nodes at `depth`, `s^depth`, for `depth <= num_layers`.
    pub fn layer_width(&self, depth: usize) -> Option<usize> {
        match depth.cmp(&self.num_layers()) {
            std::cmp::Ordering::Less => self.layer_range(depth).map(|range| range.len()),
            std::cmp::Ordering::Equal => Some(self.leaf_count),
            std::cmp::Ordering::Greater => None,
        }
    }

    /// Length of a realized sequence, `s^num_layers`.
    pub fn leaf_count(&self) -> usize {
        self.leaf_count
    }

    /// Number of rule choices in a path, `(s^L - 1) / (s - 1)`.
    pub fn path_len(&self) -> usize {
        self.layer_offsets[self.num_layers()]
    }

    /// Positions of the depth-`depth` choices within a path, for
    /// `depth < num_layers`.
    pub fn layer_range(&self, depth: usize) -> Option<Range<usize>> {
        let start = *self.layer_offsets.get(depth)?;
        let end = *self.layer_offsets.get(depth.checked_add(1)?)?;
        Some(start..end)
    }

    /// Total number of distinct samples.
    pub fn pmax(&self) -> Result<u128> {
        combinatorics::pmax(self.m(), self.s(), self.num_layers(), self.num_classes())
    }

    /// `num_classes * m^num_layers`, the unit of relative split sizes.
    pub fn pstar(&self) -> Result<u128> {
        combinatorics::pstar(self.m(), self.num_layers(), self.num_classes())
    }

    /// Check that `path` has this bank's shape and only valid choices.
    pub fn check_path(&self, path: &Path) -> Result<()> {
        if path.len() != self.path_len() {
            return Err(RhmError::PathShape {
                expected: format!("{} rule choices", self.path_len()),
                found: format!("{} rule choices", path.len()),
            });
        }
        if path.class() as usize >= self.num_classes() {
            return Err(RhmError::PathShape {
                expected: format!("class below {}", self.num_classes()),
                found: format!("class {}", path.class()),
            });
        }
        if let Some(&choice) = path.choices().iter().find(|&&c| c as usize >= self.m()) {
            return Err(RhmError::PathShape {
                expected: format!("rule choices below m = {}", self.m()),
                found: format!("rule choice {}", choice),
            });
        }
        Ok(())
    }
}

fn vocab_sizes(config: &HierarchyConfig) -> Result<Vec<usize>> {
    let num_layers = config.num_layers;
    let mut sizes = Vec::with_capacity(num_layers + 1);
    sizes.push(config.num_classes());

    for layer in 1..num_layers {
        let size = match config.partition {
            PartitionMode::Tuples => config.num_features,
            PartitionMode::Symbols => sizes[layer - 1]
                .checked_mul(config.m())
                .and_then(|v| v.checked_mul(config.s))
                .filter(|&v| v <= Symbol::MAX as usize)
                .ok_or(RhmError::CountOverflow {
                    what: "intermediate vocabulary",
                })?,
        };
        sizes.push(size);
    }

    sizes.push(config.num_features);
    Ok(sizes)
}

/// `parent_vocab * m` distinct tuples drawn from the `child_vocab^s` tuple
/// space, dealt out `m` per parent.
fn sample_tuple_rules(
    rng: &mut ChaCha8Rng,
    layer: usize,
    parent_vocab: usize,
    child_vocab: usize,
    m: usize,
    s: usize,
) -> Result<Vec<Symbol>> {
    let required = parent_vocab
        .checked_mul(m)
        .ok_or(RhmError::CountOverflow { what: "rule count" })?;
    // an overflowing tuple space is larger than any request
    let available = checked_pow(child_vocab as u128, s).unwrap_or(u128::MAX);

    if (required as u128) > available {
        return Err(RhmError::InsufficientVocabulary {
            layer,
            required: required as u128,
            available,
        });
    }

    let codes = sample_distinct(rng, available, required)?;
    let mut tuples = Vec::with_capacity(required * s);
    for code in codes {
        tuples.extend(combinatorics::to_base(code, child_vocab as u32, s));
    }
    Ok(tuples)
}

/// `parent_vocab * m * s` distinct child symbols, chunked into tuples and
/// dealt out `m` per parent.
fn sample_symbol_rules(
    rng: &mut ChaCha8Rng,
    layer: usize,
    parent_vocab: usize,
    child_vocab: usize,
    m: usize,
    s: usize,
) -> Result<Vec<Symbol>> {
    let required = parent_vocab
        .checked_mul(m)
        .and_then(|v| v.checked_mul(s))
        .ok_or(RhmError::CountOverflow { what: "rule symbol count" })?;

    if required > child_vocab {
        return Err(RhmError::InsufficientVocabulary {
            layer,
            required: required as u128,
            available: child_vocab as u128,
        });
    }

    Ok(sample_distinct(rng, child_vocab as u128, required)?
        .into_iter()
        .map(|symbol| symbol as Symbol)
        .collect())
}

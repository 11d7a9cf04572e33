//! Configuration for rule banks, sampling, and datasets.
//!
//! All structs are `serde` types with `#[serde(default)]`, so a TOML file
//! only needs the fields it overrides:
//!
//! ```toml
//! train_size = 0.8
//! test_size = 1000
//! encoding = "one_hot"
//!
//! [hierarchy]
//! num_features = 8
//! num_layers = 3
//! m = 2
//! s = 2
//! seed = 0
//! ```

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{Result, RhmError};

/// Unit in which the rule sets of different parents are kept disjoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PartitionMode {
    /// Every layer below the root has `num_features` symbols; all `s`-tuples
    /// of a layer are distinct across parents.
    #[default]
    Tuples,
    /// Parents claim disjoint blocks of child symbols; intermediate
    /// vocabularies grow by a factor `m * s` per layer.
    Symbols,
}

/// How leaf symbols are written into the `x` tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// `[B, s^L, num_features]` indicator vectors.
    #[default]
    OneHot,
    /// `[B, s^L, 1]` raw symbol ids.
    Index,
}

impl FromStr for Encoding {
    type Err = RhmError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "onehot" | "one_hot" => Ok(Encoding::OneHot),
            "long" | "index" => Ok(Encoding::Index),
            other => Err(RhmError::Configuration(format!(
                "unknown input format '{}', expected 'onehot' or 'long'",
                other
            ))),
        }
    }
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::OneHot => write!(f, "onehot"),
            Encoding::Index => write!(f, "long"),
        }
    }
}

/// Parameters of the random hierarchy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HierarchyConfig {
    /// Vocabulary size of the leaves (and of intermediate layers in tuple mode).
    pub num_features: usize,
    /// Number of rule layers between root and leaves.
    pub num_layers: usize,
    /// Rules per symbol. `None` means `num_features`.
    pub m: Option<usize>,
    /// Number of root classes. `None` means `num_features`.
    pub num_classes: Option<usize>,
    /// Branching factor (tuple length).
    pub s: usize,
    /// Seed of the rule bank.
    pub seed: u64,
    pub partition: PartitionMode,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            num_features: 8,
            num_layers: 2,
            m: Some(2),
            num_classes: None,
            s: 2,
            seed: 0,
            partition: PartitionMode::Tuples,
        }
    }
}

impl HierarchyConfig {
    pub fn new(
        num_features: usize,
        num_layers: usize,
        m: usize,
        num_classes: usize,
        s: usize,
        seed: u64,
    ) -> Self {
        Self {
            num_features,
            num_layers,
            m: Some(m),
            num_classes: Some(num_classes),
            s,
            seed,
            partition: PartitionMode::Tuples,
        }
    }

    pub fn with_partition(mut self, partition: PartitionMode) -> Self {
        self.partition = partition;
        self
    }

    pub fn m(&self) -> usize {
        self.m.unwrap_or(self.num_features)
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes.unwrap_or(self.num_features)
    }

    /// Check the structural parameters. Vocabulary sufficiency is checked
    /// while building, since it depends on the partition mode.
    pub fn validate(&self) -> Result<()> {
        if self.s < 2 {
            return Err(RhmError::Configuration(format!(
                "s must be at least 2, got {}",
                self.s
            )));
        }
        if self.m() < 1 {
            return Err(RhmError::Configuration("m must be at least 1".into()));
        }
        if self.num_layers < 1 {
            return Err(RhmError::Configuration(
                "num_layers must be at least 1".into(),
            ));
        }
        if self.num_features < 1 {
            return Err(RhmError::Configuration(
                "num_features must be at least 1".into(),
            ));
        }
        if self.num_classes() < 1 {
            return Err(RhmError::Configuration(
                "num_classes must be at least 1".into(),
            ));
        }
        let limit = u32::MAX as usize;
        if self.num_features > limit || self.num_classes() > limit || self.m() > limit {
            return Err(RhmError::Configuration(format!(
                "num_features, num_classes and m must not exceed {}",
                limit
            )));
        }
        Ok(())
    }
}

/// Per-batch sampling options.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleConfig {
    pub encoding: Encoding,
    /// Base seed for re-randomized rule choices. Sample `i` uses
    /// `variant_seed + i`.
    pub variant_seed: u64,
    /// Depth from which rule choices are redrawn. `None`, or any value
    /// `>= num_layers`, gives the canonical realization.
    pub seed_reset_layer: Option<usize>,
    /// Also return the symbols of every intermediate layer.
    pub layer_labels: bool,
    /// Write one-hot features as `(x - 1/v) / sqrt(1 - 1/v)`, `v` the leaf
    /// vocabulary, so every position sums to zero. No effect on index
    /// encoding.
    pub whitening: bool,
}

impl SampleConfig {
    pub fn canonical(encoding: Encoding) -> Self {
        Self {
            encoding,
            ..Default::default()
        }
    }

    pub fn variant(encoding: Encoding, reset_layer: usize, variant_seed: u64) -> Self {
        Self {
            encoding,
            variant_seed,
            seed_reset_layer: Some(reset_layer),
            ..Default::default()
        }
    }

    pub fn with_layer_labels(mut self, layer_labels: bool) -> Self {
        self.layer_labels = layer_labels;
        self
    }

    pub fn with_whitening(mut self, whitening: bool) -> Self {
        self.whitening = whitening;
        self
    }
}

/// Size of a dataset split.
///
/// In a config file a size is a single number, read like the `--ptr` and
/// `--pte` training flags:
/// - a float in `[0, 1]` is a fraction of `Pmax`;
/// - a non-negative integer, or a float above 1, is an absolute count;
/// - a negative number `-a` asks for `a * P*` samples, with
///   `P* = num_classes * m^num_layers`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "SizeArg", into = "SizeArg")]
pub enum SampleCount {
    Count(u64),
    Fraction(f64),
    /// Multiple of `P*`.
    Relative(f64),
}

impl From<f64> for SampleCount {
    fn from(value: f64) -> Self {
        if value < 0.0 {
            SampleCount::Relative(-value)
        } else if value > 1.0 {
            SampleCount::Count(value.floor() as u64)
        } else {
            SampleCount::Fraction(value)
        }
    }
}

/// Raw form of a [`SampleCount`] in a config file.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
enum SizeArg {
    Integer(i64),
    Real(f64),
}

impl From<SizeArg> for SampleCount {
    fn from(arg: SizeArg) -> Self {
        match arg {
            SizeArg::Integer(n) if n < 0 => SampleCount::Relative(n.unsigned_abs() as f64),
            SizeArg::Integer(n) => SampleCount::Count(n as u64),
            SizeArg::Real(f) => SampleCount::from(f),
        }
    }
}

impl From<SampleCount> for SizeArg {
    fn from(count: SampleCount) -> Self {
        match count {
            SampleCount::Count(n) => SizeArg::Integer(i64::try_from(n).unwrap_or(i64::MAX)),
            SampleCount::Fraction(f) => SizeArg::Real(f),
            SampleCount::Relative(a) => SizeArg::Real(-a),
        }
    }
}

impl SampleCount {
    /// Number of samples out of `pmax`, with `pstar = num_classes * m^L`.
    ///
    /// Fractions are clamped to `pmax`; counts and `P*` multiples are not,
    /// and an oversized request is rejected when the dataset is drawn.
    pub fn resolve(&self, pmax: u128, pstar: u128) -> Result<usize> {
        let count = match *self {
            SampleCount::Count(n) => n as u128,
            SampleCount::Fraction(f) => {
                if !(0.0..=1.0).contains(&f) {
                    return Err(RhmError::Configuration(format!(
                        "split fraction must be in [0, 1], got {}",
                        f
                    )));
                }
                ((f * pmax as f64).floor() as u128).min(pmax)
            }
            SampleCount::Relative(a) => {
                if !(a.is_finite() && a >= 0.0) {
                    return Err(RhmError::Configuration(format!(
                        "P* multiple must be finite and non-negative, got {}",
                        a
                    )));
                }
                (a * pstar as f64).floor() as u128
            }
        };
        usize::try_from(count).map_err(|_| RhmError::CountOverflow {
            what: "split size",
        })
    }
}

/// Train/test dataset over one rule bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DatasetConfig {
    pub train_size: SampleCount,
    pub test_size: SampleCount,
    /// Seed of the index draw. `None` reuses the hierarchy seed.
    pub sample_seed: Option<u64>,
    pub encoding: Encoding,
    pub layer_labels: bool,
    pub whitening: bool,
    pub hierarchy: HierarchyConfig,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            train_size: SampleCount::Fraction(0.8),
            test_size: SampleCount::Fraction(0.2),
            sample_seed: None,
            encoding: Encoding::OneHot,
            layer_labels: false,
            whitening: false,
            hierarchy: HierarchyConfig::default(),
        }
    }
}

impl DatasetConfig {
    pub fn sample_seed(&self) -> u64 {
        self.sample_seed.unwrap_or(self.hierarchy.seed)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        parse_toml(content)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        parse_toml(&content)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        Ok(toml::to_string(self)?)
    }
}

fn parse_toml<T: DeserializeOwned>(content: &str) -> Result<T> {
    Ok(toml::from_str(content)?)
}

//! Sample index ↔ path bijection.
//!
//! An index in `[0, Pmax)` is split as
//!
//! ```text
//! index = class * m^N + r,    N = (s^L - 1) / (s - 1)
//! ```
//!
//! and `r` is written in base `m` with exactly `N` digits, most significant
//! first. Digit `i` is the rule choice of the `i`-th node in breadth-first
//! order: the root, then the `s` nodes of depth 1 left to right, then the
//! `s^2` nodes of depth 2, and so on. Shallow nodes are therefore controlled
//! by the most significant digits, and consecutive indices differ first in
//! the leaf-level rule choices.

use crate::combinatorics::{from_base, to_base};
use crate::error::{Result, RhmError};

use super::rules::{RuleBank, Symbol};

/// One root-to-leaf expansion: a class symbol and one rule choice per
/// internal node, in breadth-first order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Path {
    class: Symbol,
    choices: Vec<u32>,
}

impl Path {
    pub(crate) fn from_parts(class: Symbol, choices: Vec<u32>) -> Self {
        Self { class, choices }
    }

    pub fn class(&self) -> Symbol {
        self.class
    }

    /// All rule choices, breadth-first.
    pub fn choices(&self) -> &[u32] {
        &self.choices
    }

    /// The `s^depth` choices of the nodes at `depth`, left to right. `None`
    /// if `depth >= num_layers` or the path is shorter than the bank's.
    pub fn layer<'a>(&'a self, bank: &RuleBank, depth: usize) -> Option<&'a [u32]> {
        self.choices.get(bank.layer_range(depth)?)
    }

    pub fn len(&self) -> usize {
        self.choices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choices.is_empty()
    }
}

/// Decodes sample indices against one rule bank.
#[derive(Debug, Clone, Copy)]
pub struct IndexResolver<'a> {
    bank: &'a RuleBank,
    pmax: u128,
    per_class: u128,
}

impl<'a> IndexResolver<'a> {
    /// Fails with `CountOverflow` if `Pmax` does not fit in `u128`.
    pub fn new(bank: &'a RuleBank) -> Result<Self> {
        let pmax = bank.pmax()?;
        Ok(Self {
            bank,
            pmax,
            per_class: pmax / bank.num_classes() as u128,
        })
    }

    pub fn bank(&self) -> &'a RuleBank {
        self.bank
    }

    pub fn pmax(&self) -> u128 {
        self.pmax
    }

    /// Number of distinct paths below each class, `m^N`.
    pub fn paths_per_class(&self) -> u128 {
        self.per_class
    }

    pub fn resolve(&self, index: i128) -> Result<Path> {
        if index < 0 || index as u128 >= self.pmax {
            return Err(RhmError::IndexOutOfRange {
                index,
                pmax: self.pmax,
            });
        }

        let index = index as u128;
        let class = (index / self.per_class) as Symbol;
        let choices = to_base(
            index % self.per_class,
            self.bank.m() as u32,
            self.bank.path_len(),
        );
        Ok(Path::from_parts(class, choices))
    }

    /// Inverse of [`resolve`](Self::resolve).
    pub fn index_of(&self, path: &Path) -> Result<u128> {
        self.bank.check_path(path)?;
        // both bounded by Pmax, which fits
        let within_class = from_base(path.choices(), self.bank.m() as u32)
            .ok_or(RhmError::CountOverflow { what: "path index" })?;
        Ok(path.class() as u128 * self.per_class + within_class)
    }
}

/// Decode a single index. Prefer [`IndexResolver`] when resolving many.
pub fn resolve(index: i128, bank: &RuleBank) -> Result<Path> {
    IndexResolver::new(bank)?.resolve(index)
}

//! Expansion of a path into symbol sequences.

use crate::error::Result;

use super::resolver::Path;
use super::rules::{RuleBank, Symbol};

/// Symbols visited at every depth of one expansion.
///
/// `levels[0]` holds the class, `levels[d]` the `s^d` symbols of depth `d`,
/// and `levels[num_layers]` the leaf sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Realization {
    levels: Vec<Vec<Symbol>>,
}

impl Realization {
    pub fn class_label(&self) -> Symbol {
        self.levels[0][0]
    }

    /// Leaf symbols, left to right.
    pub fn leaves(&self) -> &[Symbol] {
        self.levels.last().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Symbols of the intermediate depths `1 .. num_layers`.
    pub fn layer_labels(&self) -> &[Vec<Symbol>] {
        &self.levels[1..self.levels.len() - 1]
    }

    pub fn level(&self, depth: usize) -> &[Symbol] {
        &self.levels[depth]
    }

    pub fn levels(&self) -> &[Vec<Symbol>] {
        &self.levels
    }

    pub fn into_leaves(mut self) -> Vec<Symbol> {
        self.levels.pop().unwrap_or_default()
    }
}

/// Expand `path` top-down: node `j` of depth `d` writes the tuple selected by
/// its choice to positions `j*s .. (j+1)*s` of depth `d + 1`.
pub fn realize(path: &Path, bank: &RuleBank) -> Result<Realization> {
    bank.check_path(path)?;

    let mut levels: Vec<Vec<Symbol>> = Vec::with_capacity(bank.num_layers() + 1);
    levels.push(vec![path.class()]);

    for depth in 0..bank.num_layers() {
        let rules = bank.layer(depth);
        let parents = &levels[depth];
        let mut children = Vec::with_capacity(parents.len() * bank.s());
        let choices = path.layer(bank, depth).unwrap_or_default();
        for (&symbol, &choice) in parents.iter().zip(choices) {
            children.extend_from_slice(rules.rule(symbol, choice as usize));
        }
        levels.push(children);
    }

    Ok(Realization { levels })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::resolver::IndexResolver;
    use crate::hierarchy::rules::build;
    use crate::hierarchy::variant::inject_variant;
    use std::collections::HashSet;

    #[test]
    fn test_realization_follows_rules() {
        let bank = build(6, 2, 3, 2, 2, 1).unwrap();
        let resolver = IndexResolver::new(&bank).unwrap();
        let path = resolver.resolve(40).unwrap();
        let realization = realize(&path, &bank).unwrap();

        // 40 = 1 * 27 + 13, 13 = [1, 1, 1] in base 3
        assert_eq!(realization.class_label(), 1);
        assert_eq!(path.choices(), &[1, 1, 1]);

        let mid = bank.rule(0, 1, 1);
        assert_eq!(realization.level(1), mid);
        let mut expected = bank.rule(1, mid[0], 1).to_vec();
        expected.extend_from_slice(bank.rule(1, mid[1], 1));
        assert_eq!(realization.leaves(), expected.as_slice());
        assert_eq!(realization.layer_labels(), &[mid.to_vec()]);
    }

    #[test]
    fn test_all_indices_give_distinct_leaf_sequences() {
        let bank = build(4, 2, 2, 2, 2, 3).unwrap();
        let resolver = IndexResolver::new(&bank).unwrap();
        let sequences: HashSet<Vec<Symbol>> = (0..resolver.pmax() as i128)
            .map(|i| {
                realize(&resolver.resolve(i).unwrap(), &bank)
                    .unwrap()
                    .into_leaves()
            })
            .collect();
        assert_eq!(sequences.len(), 16);
    }

    #[test]
    fn test_leaf_sequences_distinct_for_three_layers() {
        // m = 2, s = 2, L = 3: 2^7 * 3 = 384 samples
        let bank = build(5, 3, 2, 3, 2, 8).unwrap();
        let resolver = IndexResolver::new(&bank).unwrap();
        assert_eq!(resolver.pmax(), 384);
        let sequences: HashSet<Vec<Symbol>> = (0..384)
            .map(|i| {
                realize(&resolver.resolve(i).unwrap(), &bank)
                    .unwrap()
                    .into_leaves()
            })
            .collect();
        assert_eq!(sequences.len(), 384);
    }

    #[test]
    fn test_variant_realization_keeps_upper_levels() {
        let bank = build(10, 4, 3, 3, 2, 0).unwrap();
        let resolver = IndexResolver::new(&bank).unwrap();
        let path = resolver.resolve(31_000_000).unwrap();
        let canonical = realize(&path, &bank).unwrap();

        let variant = realize(&inject_variant(&path, &bank, 2, 4).unwrap(), &bank).unwrap();
        assert_eq!(variant.class_label(), canonical.class_label());
        assert_eq!(variant.level(1), canonical.level(1));
        assert_eq!(variant.level(2), canonical.level(2));
        assert_eq!(variant.leaves().len(), 16);
    }

    #[test]
    fn test_realize_is_deterministic() {
        let bank = build(10, 4, 3, 1, 2, 0).unwrap();
        let path = IndexResolver::new(&bank).unwrap().resolve(777).unwrap();
        assert_eq!(realize(&path, &bank).unwrap(), realize(&path, &bank).unwrap());
    }
}

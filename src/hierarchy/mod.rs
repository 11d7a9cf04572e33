//! Generative engine of the Random Hierarchy Model.
//!
//! - `rules`: seeded construction of the production-rule bank
//! - `resolver`: sample index ↔ path bijection
//! - `variant`: re-randomization of rule choices below a depth
//! - `realize`: expansion of a path into per-depth symbol sequences
//!
//! A sample goes through resolve → (inject_variant) → realize; every step is
//! a pure function of its inputs and the shared, immutable `RuleBank`.

pub mod realize;
pub mod resolver;
pub mod rules;
pub mod variant;

pub use realize::{realize, Realization};
pub use resolver::{resolve, IndexResolver, Path};
pub use rules::{build, LayerRules, RuleBank, Symbol};
pub use variant::{inject_variant, variant_seed_for};

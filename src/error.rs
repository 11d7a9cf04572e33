//! Error taxonomy for rule-bank construction and sampling.
//!
//! Construction errors (`Configuration`, `InsufficientVocabulary`,
//! `CountOverflow`) are fatal for a given parameter set. `IndexOutOfRange`,
//! `SplitPosition` and `PathShape` are per-call and leave the rule bank usable.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RhmError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error(
        "insufficient vocabulary below layer {layer}: {required} required, {available} available"
    )]
    InsufficientVocabulary {
        layer: usize,
        required: u128,
        available: u128,
    },

    #[error("sample index {index} out of range [0, {pmax})")]
    IndexOutOfRange { index: i128, pmax: u128 },

    #[error("position {position} out of range for a split of {len} samples")]
    SplitPosition { position: usize, len: usize },

    #[error("{what} overflows the supported integer range")]
    CountOverflow { what: &'static str },

    #[error("path does not belong to this rule bank: expected {expected}, found {found}")]
    PathShape { expected: String, found: String },

    #[error("failed to parse configuration: {0}")]
    ConfigParse(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for RhmError {
    fn from(e: toml::de::Error) -> Self {
        RhmError::ConfigParse(e.to_string())
    }
}

impl From<toml::ser::Error> for RhmError {
    fn from(e: toml::ser::Error) -> Self {
        RhmError::ConfigParse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, RhmError>;

use thiserror::Error;

use crate::itemset::FrequentItemsets;

pub type Result<T> = std::result::Result<T, MiningError>;

/// Every failure the mining core can report. All variants are recoverable;
/// callers decide whether to retry with different parameters or report.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum MiningError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid threshold: {name} = {value}")]
    InvalidThreshold { name: &'static str, value: f64 },

    #[error("undefined metric: {metric} for rule {rule}")]
    UndefinedMetric { metric: &'static str, rule: String },

    /// The candidate limit was hit at `level`. `partial` holds every itemset
    /// found on the levels below it.
    #[error("itemset search aborted at level {level}: {candidates} candidates exceed limit {limit}")]
    ItemsetSearchAborted {
        level: usize,
        candidates: usize,
        limit: usize,
        partial: Box<FrequentItemsets>,
    },
}

impl MiningError {
    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput(message.into())
    }

    /// The partial result attached to an aborted search, if any.
    pub fn partial(&self) -> Option<&FrequentItemsets> {
        match self {
            Self::ItemsetSearchAborted { partial, .. } => Some(partial),
            _ => None,
        }
    }
}

impl From<toml::de::Error> for MiningError {
    fn from(value: toml::de::Error) -> Self {
        Self::InvalidInput(format!("malformed configuration: {value}"))
    }
}

//! Frequent itemset mining and association rules over retail transaction logs.
//!
//! A log of `(transaction, item, quantity)` lines is encoded into a boolean
//! presence matrix, mined with Apriori or FP-Growth, turned into rules with
//! the usual interest metrics and, given per-transaction weights, annotated
//! with monetary-weighted support, confidence and lift.

#[cfg(feature = "python")]
use mimalloc::MiMalloc;

#[cfg(feature = "python")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

pub mod apriori;
pub mod association_rules;
pub mod basket;
mod common;
pub mod config;
pub mod error;
pub mod fpgrowth;
pub mod itemset;
pub mod miner;
pub mod pipeline;
#[cfg(feature = "python")]
mod python;
pub mod weighted;

pub use apriori::Apriori;
pub use association_rules::{generate_rules, MetricStats, Rule, RuleSet, RuleSummary};
pub use basket::{encode, LogEntry, PresenceMatrix};
pub use config::{MiningConfig, RuleFilter, RuleMetric};
pub use error::{MiningError, Result};
pub use fpgrowth::FpGrowth;
pub use itemset::{FrequentItemsets, Itemset};
pub use miner::{compare, runs_agree, Algorithm, FrequentItemsetMiner, MinerRun};
pub use pipeline::{Pipeline, PipelineOutput};
pub use weighted::{compute_weighted, item_hubs, weighted_support, ItemHub, TransactionWeights, WeightedMetrics, WeightedRules};

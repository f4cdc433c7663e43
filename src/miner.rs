//! Shared interface of the frequent-itemset miners.
//!
//! Apriori and FP-Growth produce the same logical output for the same input;
//! callers pick one through [`Algorithm`] or run several through
//! [`compare`] and check that they agree.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::apriori::Apriori;
use crate::basket::PresenceMatrix;
use crate::config::MiningConfig;
use crate::error::Result;
use crate::fpgrowth::FpGrowth;
use crate::itemset::FrequentItemsets;

/// Anything that can enumerate the itemsets of a presence matrix whose
/// relative support is at least `min_support`.
pub trait FrequentItemsetMiner: Send + Sync {
    fn name(&self) -> &'static str;

    fn mine(&self, matrix: &PresenceMatrix, min_support: f64) -> Result<FrequentItemsets>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    Apriori,
    #[default]
    FpGrowth,
    /// Run both and compare; downstream steps use the FP-Growth result.
    Both,
}

impl Algorithm {
    pub fn miners(self, config: &MiningConfig) -> Vec<Box<dyn FrequentItemsetMiner>> {
        let apriori = || Box::new(Apriori::from_config(config)) as Box<dyn FrequentItemsetMiner>;
        let fpgrowth = || Box::new(FpGrowth::from_config(config)) as Box<dyn FrequentItemsetMiner>;
        match self {
            Algorithm::Apriori => vec![apriori()],
            Algorithm::FpGrowth => vec![fpgrowth()],
            Algorithm::Both => vec![apriori(), fpgrowth()],
        }
    }
}

/// One timed miner invocation.
#[derive(Clone, Debug, Serialize)]
pub struct MinerRun {
    pub algorithm: &'static str,
    pub elapsed: Duration,
    pub itemsets: FrequentItemsets,
}

/// Runs every miner on the same matrix and threshold, in order.
pub fn compare(
    miners: &[Box<dyn FrequentItemsetMiner>],
    matrix: &PresenceMatrix,
    min_support: f64,
) -> Result<Vec<MinerRun>> {
    let mut runs = Vec::with_capacity(miners.len());
    for miner in miners {
        let start = Instant::now();
        let itemsets = miner.mine(matrix, min_support)?;
        let elapsed = start.elapsed();
        info!(
            algorithm = miner.name(),
            min_support,
            itemsets = itemsets.len(),
            mean_len = itemsets.mean_len(),
            elapsed_ms = elapsed.as_secs_f64() * 1e3,
            "mining finished"
        );
        runs.push(MinerRun { algorithm: miner.name(), elapsed, itemsets });
    }
    Ok(runs)
}

/// True when every run produced the same itemsets with the same counts.
pub fn runs_agree(runs: &[MinerRun]) -> bool {
    let Some((first, rest)) = runs.split_first() else {
        return true;
    };
    rest.iter().all(|run| {
        let same = first.itemsets.agrees_with(&run.itemsets);
        if !same {
            warn!(
                left = first.algorithm,
                right = run.algorithm,
                left_itemsets = first.itemsets.len(),
                right_itemsets = run.itemsets.len(),
                "miners disagree"
            );
        }
        same
    })
}

//! Single mining run: basket encoding → frequent itemsets → rules → weighted rules.
//!
//! Every stage is a plain function of the previous stage's output; the
//! pipeline only threads the validated configuration through them.

use serde::Serialize;
use tracing::{info, info_span};

use crate::association_rules::{generate_rules, RuleSet, RuleSummary};
use crate::basket::{encode, LogEntry, PresenceMatrix};
use crate::config::MiningConfig;
use crate::error::{MiningError, Result};
use crate::itemset::FrequentItemsets;
use crate::miner::{compare, runs_agree, Algorithm, MinerRun};
use crate::weighted::{compute_weighted, TransactionWeights, WeightedRules};

#[derive(Clone, Debug, Serialize)]
pub struct PipelineOutput {
    pub n_transactions: usize,
    pub n_items: usize,
    pub runs: Vec<MinerRun>,
    /// Set when more than one miner ran.
    pub agreement: Option<bool>,
    pub rules: RuleSet,
    pub summary: RuleSummary,
    pub weighted: Option<WeightedRules>,
}

impl PipelineOutput {
    /// Itemsets the rules were generated from.
    pub fn itemsets(&self) -> Option<&FrequentItemsets> {
        self.runs.last().map(|run| &run.itemsets)
    }
}

#[derive(Clone, Debug)]
pub struct Pipeline {
    config: MiningConfig,
}

impl Pipeline {
    pub fn new(config: MiningConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &MiningConfig {
        &self.config
    }

    pub fn run(
        &self,
        log: &[LogEntry],
        weights: Option<&TransactionWeights>,
        algorithm: Algorithm,
    ) -> Result<PipelineOutput> {
        let matrix = encode(log, self.config.basket_threshold)?;
        self.run_matrix(&matrix, weights, algorithm)
    }

    pub fn run_matrix(
        &self,
        matrix: &PresenceMatrix,
        weights: Option<&TransactionWeights>,
        algorithm: Algorithm,
    ) -> Result<PipelineOutput> {
        let config = &self.config;
        let _span = info_span!("pipeline", ?algorithm, min_support = config.min_support).entered();

        let miners = algorithm.miners(config);
        let runs = compare(&miners, matrix, config.min_support)?;
        let agreement = (runs.len() > 1).then(|| runs_agree(&runs));
        let itemsets = match runs.last() {
            Some(run) => &run.itemsets,
            None => return Err(MiningError::invalid_input("no miner selected")),
        };

        let mut rules = generate_rules(itemsets, config.metric, config.min_threshold)?;
        if !config.filter.is_empty() {
            rules = rules.filter(&config.filter);
        }
        let summary = rules.summary();

        let weighted = match weights {
            Some(w) => Some(compute_weighted(&rules, matrix, w)?),
            None => None,
        };

        info!(
            n_transactions = matrix.n_transactions(),
            n_items = matrix.n_items(),
            itemsets = itemsets.len(),
            truncated = itemsets.is_truncated(),
            rules = rules.len(),
            weighted = weighted.is_some(),
            "pipeline finished"
        );

        Ok(PipelineOutput {
            n_transactions: matrix.n_transactions(),
            n_items: matrix.n_items(),
            runs,
            agreement,
            rules,
            summary,
            weighted,
        })
    }
}

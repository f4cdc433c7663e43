use ahash::AHashSet;
use rayon::prelude::*;
use tracing::{debug, debug_span};

use crate::association_rules::{generate_rules, RuleSet};
use crate::basket::PresenceMatrix;
use crate::common::{is_sorted_subset, min_count_for};
use crate::config::{validate_max_len, validate_min_support, MiningConfig, RuleMetric};
use crate::error::{MiningError, Result};
use crate::itemset::FrequentItemsets;
use crate::miner::FrequentItemsetMiner;

/// Level-wise frequent itemset search.
///
/// Level k+1 candidates come from pairs of frequent k-itemsets that share
/// their first k-1 items; a candidate with any infrequent k-subset is dropped
/// before its support is counted.
#[derive(Clone, Debug, Default)]
pub struct Apriori {
    max_len: Option<usize>,
    max_candidates: Option<usize>,
}

impl Apriori {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &MiningConfig) -> Self {
        Self { max_len: config.max_len, max_candidates: config.max_candidates }
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    pub fn with_max_candidates(mut self, limit: usize) -> Self {
        self.max_candidates = Some(limit);
        self
    }

    pub fn mine(&self, matrix: &PresenceMatrix, min_support: f64) -> Result<FrequentItemsets> {
        validate_min_support(min_support)?;
        validate_max_len(self.max_len)?;
        let n = matrix.n_transactions();
        let _span = debug_span!("apriori", min_support, n_transactions = n).entered();
        if n == 0 {
            return Ok(FrequentItemsets::from_counts(Vec::new(), matrix, min_support, self.max_len, false));
        }
        let min_count = min_count_for(min_support, n);

        let mut level: Vec<(Vec<u32>, u64)> = matrix
            .item_support_counts()
            .into_iter()
            .enumerate()
            .filter(|&(_, c)| c >= min_count)
            .map(|(item, c)| (vec![item as u32], c))
            .collect();
        debug!(level = 1, frequent = level.len(), min_count, "counted items");

        let mut found: Vec<(u64, Vec<u32>)> = level.iter().map(|(items, c)| (*c, items.clone())).collect();
        let mut truncated = false;
        let mut k = 1;

        while level.len() >= 2 {
            let candidates = join_and_prune(&level);
            if candidates.is_empty() {
                break;
            }

            if self.max_len.map_or(false, |ml| k >= ml) {
                // Probe one level past the cap so the caller learns whether
                // longer frequent itemsets were left out.
                let counts = count_candidates(matrix.rows(), &candidates);
                truncated = counts.iter().any(|&c| c >= min_count);
                debug!(level = k + 1, candidates = candidates.len(), truncated, "stopped at max_len");
                break;
            }

            if let Some(limit) = self.max_candidates {
                if candidates.len() > limit {
                    debug!(level = k + 1, candidates = candidates.len(), limit, "candidate limit exceeded");
                    let partial = FrequentItemsets::from_counts(found, matrix, min_support, self.max_len, true);
                    return Err(MiningError::ItemsetSearchAborted {
                        level: k + 1,
                        candidates: candidates.len(),
                        limit,
                        partial: Box::new(partial),
                    });
                }
            }

            let n_candidates = candidates.len();
            let counts = count_candidates(matrix.rows(), &candidates);
            level = candidates
                .into_iter()
                .zip(counts)
                .filter(|&(_, c)| c >= min_count)
                .collect();
            k += 1;
            debug!(level = k, candidates = n_candidates, frequent = level.len(), "counted candidates");
            found.extend(level.iter().map(|(items, c)| (*c, items.clone())));
        }

        Ok(FrequentItemsets::from_counts(found, matrix, min_support, self.max_len, truncated))
    }

    /// Rule generation over this miner's output; shares the single rule
    /// generator with every other miner.
    pub fn generate_rules(
        &self,
        itemsets: &FrequentItemsets,
        metric: RuleMetric,
        min_threshold: f64,
    ) -> Result<RuleSet> {
        generate_rules(itemsets, metric, min_threshold)
    }
}

impl FrequentItemsetMiner for Apriori {
    fn name(&self) -> &'static str {
        "apriori"
    }

    fn mine(&self, matrix: &PresenceMatrix, min_support: f64) -> Result<FrequentItemsets> {
        Apriori::mine(self, matrix, min_support)
    }
}

/// Join step plus prune step. `level` must be sorted lexicographically; the
/// output is too.
fn join_and_prune(level: &[(Vec<u32>, u64)]) -> Vec<Vec<u32>> {
    let frequent: AHashSet<&[u32]> = level.iter().map(|(items, _)| items.as_slice()).collect();
    let k = level[0].0.len();

    level
        .par_iter()
        .enumerate()
        .flat_map_iter(|(i, (a, _))| {
            let prefix = &a[..k - 1];
            let frequent = &frequent;
            level[i + 1..]
                .iter()
                .take_while(move |(b, _)| &b[..k - 1] == prefix)
                .filter_map(move |(b, _)| {
                    let mut candidate = Vec::with_capacity(k + 1);
                    candidate.extend_from_slice(a);
                    candidate.push(b[k - 1]);
                    // The two subsets dropping one of the last two items are
                    // the parents and already known to be frequent.
                    let mut subset = Vec::with_capacity(k);
                    for skip in 0..k - 1 {
                        subset.clear();
                        subset.extend(candidate.iter().enumerate().filter(|&(j, _)| j != skip).map(|(_, &x)| x));
                        if !frequent.contains(subset.as_slice()) {
                            return None;
                        }
                    }
                    Some(candidate)
                })
        })
        .collect()
}

/// Support count of every candidate. Workers fold rows into private count
/// vectors which are summed at the end.
fn count_candidates(rows: &[Vec<u32>], candidates: &[Vec<u32>]) -> Vec<u64> {
    let size = candidates.first().map_or(0, Vec::len);
    rows.par_iter()
        .filter(|row| row.len() >= size)
        .fold(
            || vec![0u64; candidates.len()],
            |mut acc, row| {
                for (slot, candidate) in acc.iter_mut().zip(candidates) {
                    if is_sorted_subset(candidate, row) {
                        *slot += 1;
                    }
                }
                acc
            },
        )
        .reduce(
            || vec![0u64; candidates.len()],
            |mut a, b| {
                for (x, y) in a.iter_mut().zip(b.iter()) {
                    *x += y;
                }
                a
            },
        )
}

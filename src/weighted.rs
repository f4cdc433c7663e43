use ahash::AHashMap;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::association_rules::{Rule, RuleSet};
use crate::basket::{LogEntry, PresenceMatrix};
use crate::common::is_sorted_subset;
use crate::error::{MiningError, Result};

/// Rule strength recomputed with per-transaction weights.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightedMetrics {
    pub weighted_support: f64,
    pub weighted_confidence: f64,
    pub weighted_lift: f64,
}

/// Non-negative weight per transaction id, e.g. the monetary value of an invoice.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TransactionWeights {
    weights: AHashMap<String, f64>,
}

impl TransactionWeights {
    pub fn new<I, K>(weights: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let mut map = AHashMap::new();
        for (id, weight) in weights {
            let id = id.into();
            if !weight.is_finite() || weight < 0.0 {
                return Err(MiningError::invalid_input(format!(
                    "weight of transaction '{id}' must be a non-negative number, got {weight}"
                )));
            }
            if map.insert(id.clone(), weight).is_some() {
                return Err(MiningError::invalid_input(format!("duplicate weight for transaction '{id}'")));
            }
        }
        Ok(Self { weights: map })
    }

    /// Sums `quantity × unit_price` per transaction. Entries without a unit
    /// price contribute nothing but still register their transaction.
    pub fn from_log(log: &[LogEntry]) -> Result<Self> {
        if log.is_empty() {
            return Err(MiningError::invalid_input("transaction log has no rows"));
        }
        let mut totals: AHashMap<&str, f64> = AHashMap::new();
        for entry in log {
            let value = entry.quantity * entry.unit_price.unwrap_or(0.0);
            *totals.entry(entry.transaction_id.as_str()).or_insert(0.0) += value;
        }
        Self::new(totals)
    }

    pub fn get(&self, transaction_id: &str) -> Option<f64> {
        self.weights.get(transaction_id).copied()
    }

    pub fn len(&self) -> usize {
        self.weights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.weights.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Weight of every matrix row, in row order, and how many rows had no
    /// weight (counted as 0).
    fn row_weights(&self, matrix: &PresenceMatrix) -> (Vec<f64>, usize) {
        let mut missing = 0;
        let weights = matrix
            .transactions()
            .iter()
            .map(|id| match self.weights.get(id) {
                Some(&w) => w,
                None => {
                    missing += 1;
                    0.0
                }
            })
            .collect();
        (weights, missing)
    }
}

/// Row weights aligned with a presence matrix.
struct WeightedRows<'a> {
    matrix: &'a PresenceMatrix,
    weights: Vec<f64>,
    total: f64,
    missing: usize,
}

impl<'a> WeightedRows<'a> {
    fn new(matrix: &'a PresenceMatrix, weights: &TransactionWeights) -> Self {
        let (weights, missing) = weights.row_weights(matrix);
        let total = weights.iter().sum();
        if missing > 0 {
            warn!(missing, n_transactions = matrix.n_transactions(), "transactions without weight count as 0");
        }
        Self { matrix, weights, total, missing }
    }

    fn require_total(&self) -> Result<()> {
        if self.total > 0.0 {
            Ok(())
        } else {
            Err(MiningError::UndefinedMetric {
                metric: "weighted_support",
                rule: "total transaction weight is zero".to_owned(),
            })
        }
    }

    fn support(&self, items: &[u32]) -> f64 {
        let covered: f64 = self
            .matrix
            .rows()
            .iter()
            .zip(self.weights.iter())
            .filter(|(row, _)| is_sorted_subset(items, row))
            .map(|(_, &w)| w)
            .sum();
        covered / self.total
    }
}

/// Weighted support of one itemset (ascending column indices). The empty
/// itemset has weighted support 1.
pub fn weighted_support(matrix: &PresenceMatrix, weights: &TransactionWeights, items: &[u32]) -> Result<f64> {
    let rows = WeightedRows::new(matrix, weights);
    rows.require_total()?;
    Ok(rows.support(items))
}

/// Rules with their weighted metrics plus diagnostics of the weighting.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WeightedRules {
    pub rules: RuleSet,
    /// Matrix rows that had no entry in the weights mapping.
    pub missing_weights: usize,
    pub total_weight: f64,
}

/// Recomputes support, confidence and lift of every rule under `weights`.
///
/// Returns a new rule set; the unweighted metrics are copied unchanged and
/// any weighted metrics already present are overwritten.
pub fn compute_weighted(
    rules: &RuleSet,
    matrix: &PresenceMatrix,
    weights: &TransactionWeights,
) -> Result<WeightedRules> {
    let rows = WeightedRows::new(matrix, weights);
    if rules.is_empty() {
        return Ok(WeightedRules { rules: rules.clone(), missing_weights: rows.missing, total_weight: rows.total });
    }
    rows.require_total()?;

    let mut needed: Vec<Vec<u32>> = rules
        .iter()
        .flat_map(|r| [r.antecedent.clone(), r.consequent.clone(), r.itemset()])
        .collect();
    needed.sort_unstable();
    needed.dedup();
    let supports: AHashMap<Vec<u32>, f64> = needed
        .into_par_iter()
        .map(|items| {
            let s = rows.support(&items);
            (items, s)
        })
        .collect::<Vec<_>>()
        .into_iter()
        .collect();
    debug!(rules = rules.len(), itemsets = supports.len(), total_weight = rows.total, "computed weighted supports");

    let weighted = rules
        .iter()
        .map(|rule| {
            let ws_ac = supports[&rule.itemset()];
            let ws_a = supports[&rule.antecedent];
            let ws_c = supports[&rule.consequent];
            if ws_a == 0.0 {
                return Err(MiningError::UndefinedMetric { metric: "weighted_confidence", rule: rules.describe(rule) });
            }
            if ws_c == 0.0 {
                return Err(MiningError::UndefinedMetric { metric: "weighted_lift", rule: rules.describe(rule) });
            }
            let weighted_confidence = ws_ac / ws_a;
            Ok(Rule {
                weighted: Some(WeightedMetrics {
                    weighted_support: ws_ac,
                    weighted_confidence,
                    weighted_lift: weighted_confidence / ws_c,
                }),
                ..rule.clone()
            })
        })
        .collect::<Result<Vec<Rule>>>()?;

    Ok(WeightedRules { rules: rules.with_rules(weighted), missing_weights: rows.missing, total_weight: rows.total })
}

/// Per-item frequency next to its share of total weight.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ItemHub {
    pub item: String,
    pub frequency: f64,
    pub weighted_support: f64,
}

/// Frequency and weighted support of every column, in column order.
pub fn item_hubs(matrix: &PresenceMatrix, weights: &TransactionWeights) -> Result<Vec<ItemHub>> {
    if matrix.is_empty() {
        return Ok(Vec::new());
    }
    let rows = WeightedRows::new(matrix, weights);
    rows.require_total()?;

    let n_items = matrix.n_items();
    let (counts, covered) = matrix
        .rows()
        .par_iter()
        .zip(rows.weights.par_iter())
        .fold(
            || (vec![0u64; n_items], vec![0f64; n_items]),
            |(mut counts, mut covered), (row, &w)| {
                for &item in row {
                    counts[item as usize] += 1;
                    covered[item as usize] += w;
                }
                (counts, covered)
            },
        )
        .reduce(
            || (vec![0u64; n_items], vec![0f64; n_items]),
            |(mut ca, mut wa), (cb, wb)| {
                ca.iter_mut().zip(cb).for_each(|(x, y)| *x += y);
                wa.iter_mut().zip(wb).for_each(|(x, y)| *x += y);
                (ca, wa)
            },
        );

    let n = matrix.n_transactions() as f64;
    Ok(matrix
        .items()
        .iter()
        .zip(counts.into_iter().zip(covered))
        .map(|(item, (count, w))| ItemHub {
            item: item.clone(),
            frequency: count as f64 / n,
            weighted_support: w / rows.total,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apriori::Apriori;
    use crate::association_rules::generate_rules;
    use crate::config::RuleMetric;

    fn groceries() -> PresenceMatrix {
        PresenceMatrix::from_transactions(vec![
            ("1", vec!["milk", "bread"]),
            ("2", vec!["milk", "bread", "eggs"]),
            ("3", vec!["bread"]),
            ("4", vec!["milk", "eggs"]),
        ])
        .unwrap()
    }

    fn weights() -> TransactionWeights {
        TransactionWeights::new(vec![("1", 10.0), ("2", 20.0), ("3", 5.0), ("4", 15.0)]).unwrap()
    }

    #[test]
    fn weighted_support_of_milk() {
        let m = groceries();
        let milk = m.item_ids(&["milk"]).unwrap();
        assert!((weighted_support(&m, &weights(), &milk).unwrap() - 0.9).abs() < 1e-12);
        assert!((weighted_support(&m, &weights(), &[]).unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn weights_from_log_multiply_price() {
        let log = vec![
            LogEntry::new("A1", "MUG", 2.0).with_unit_price(3.5),
            LogEntry::new("A1", "JAR", 1.0).with_unit_price(1.0),
            LogEntry::new("A2", "MUG", 4.0),
        ];
        let w = TransactionWeights::from_log(&log).unwrap();
        assert_eq!(w.get("A1"), Some(8.0));
        assert_eq!(w.get("A2"), Some(0.0));
        assert_eq!(w.total(), 8.0);
    }

    #[test]
    fn rejects_negative_and_duplicate_weights() {
        assert!(matches!(TransactionWeights::new(vec![("1", -1.0)]), Err(MiningError::InvalidInput(_))));
        assert!(matches!(TransactionWeights::new(vec![("1", f64::INFINITY)]), Err(MiningError::InvalidInput(_))));
        assert!(matches!(
            TransactionWeights::new(vec![("1", 1.0), ("1", 2.0)]),
            Err(MiningError::InvalidInput(_))
        ));
    }

    #[test]
    fn weighted_rule_metrics() {
        let m = groceries();
        let sets = Apriori::new().mine(&m, 0.5).unwrap();
        let rules = generate_rules(&sets, RuleMetric::Confidence, 0.0).unwrap();
        let out = compute_weighted(&rules, &m, &weights()).unwrap();
        assert_eq!(out.missing_weights, 0);
        assert_eq!(out.total_weight, 50.0);
        assert!(rules.iter().all(|r| r.weighted.is_none()));

        let milk = m.item_ids(&["milk"]).unwrap();
        let bread = m.item_ids(&["bread"]).unwrap();
        let rule = out.rules.find(&milk, &bread).unwrap();
        let w = rule.weighted.unwrap();
        // milk & bread: rows 1, 2 → 30/50; milk: 45/50; bread: 35/50
        assert!((w.weighted_support - 0.6).abs() < 1e-12);
        assert!((w.weighted_confidence - 0.6 / 0.9).abs() < 1e-12);
        assert!((w.weighted_lift - (0.6 / 0.9) / 0.7).abs() < 1e-12);
        assert_eq!(rule.confidence, rules.find(&milk, &bread).unwrap().confidence);
    }

    #[test]
    fn missing_weights_count_as_zero() {
        let m = groceries();
        let partial = TransactionWeights::new(vec![("1", 10.0), ("2", 20.0)]).unwrap();
        let milk = m.item_ids(&["milk"]).unwrap();
        assert!((weighted_support(&m, &partial, &milk).unwrap() - 1.0).abs() < 1e-12);

        let sets = Apriori::new().mine(&m, 0.5).unwrap();
        let rules = generate_rules(&sets, RuleMetric::Confidence, 0.0).unwrap();
        let out = compute_weighted(&rules, &m, &partial).unwrap();
        assert_eq!(out.missing_weights, 2);
        assert_eq!(out.total_weight, 30.0);

        let eggs = m.item_ids(&["eggs"]).unwrap();
        let milk = m.item_ids(&["milk"]).unwrap();
        let w = out.rules.find(&eggs, &milk).unwrap().weighted.unwrap();
        // eggs only keeps the weight of row 2, which also holds milk
        assert!((w.weighted_support - 20.0 / 30.0).abs() < 1e-12);
        assert!((w.weighted_confidence - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_weight_antecedent_is_undefined() {
        let m = groceries();
        // bread never occurs in a weighted row, so bread → milk has no weighted confidence
        let only_row_four = TransactionWeights::new(vec![("1", 0.0), ("2", 0.0), ("3", 0.0), ("4", 15.0)]).unwrap();
        let sets = Apriori::new().mine(&m, 0.5).unwrap();
        let rules = generate_rules(&sets, RuleMetric::Confidence, 0.0).unwrap();
        let err = compute_weighted(&rules, &m, &only_row_four).unwrap_err();
        assert!(matches!(err, MiningError::UndefinedMetric { metric: "weighted_confidence", .. }));

        let nothing = TransactionWeights::new(Vec::<(String, f64)>::new()).unwrap();
        let err = compute_weighted(&rules, &m, &nothing).unwrap_err();
        assert!(matches!(err, MiningError::UndefinedMetric { metric: "weighted_support", .. }));
    }

    #[test]
    fn zero_weight_consequent_is_undefined() {
        let m = PresenceMatrix::from_transactions(vec![
            ("1", vec!["a", "b"]),
            ("2", vec!["a", "b"]),
            ("3", vec!["a"]),
            ("4", vec!["a"]),
        ])
        .unwrap();
        // a carries all the weight, b none of it: a → b has a weighted
        // confidence of 0 but no weighted lift
        let w = TransactionWeights::new(vec![("1", 0.0), ("2", 0.0), ("3", 5.0), ("4", 5.0)]).unwrap();
        let sets = Apriori::new().mine(&m, 0.5).unwrap();
        let rules = generate_rules(&sets, RuleMetric::Confidence, 0.0).unwrap();
        assert_eq!(rules.describe(&rules.as_slice()[0]), "a → b");

        let err = compute_weighted(&rules, &m, &w).unwrap_err();
        match err {
            MiningError::UndefinedMetric { metric, rule } => {
                assert_eq!(metric, "weighted_lift");
                assert_eq!(rule, "a → b");
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn hubs_report_frequency_and_value() {
        let m = groceries();
        let hubs = item_hubs(&m, &weights()).unwrap();
        assert_eq!(hubs.iter().map(|h| h.item.as_str()).collect::<Vec<_>>(), vec!["bread", "eggs", "milk"]);
        assert_eq!(hubs[2].frequency, 0.75);
        assert!((hubs[2].weighted_support - 0.9).abs() < 1e-12);
        assert!((hubs[1].weighted_support - 0.7).abs() < 1e-12);
    }
}

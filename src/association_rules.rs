use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{RuleFilter, RuleMetric};
use crate::error::{MiningError, Result};
use crate::itemset::FrequentItemsets;
use crate::weighted::WeightedMetrics;

/// A directional rule `antecedent → consequent` with its interest metrics.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub antecedent: Vec<u32>,
    pub consequent: Vec<u32>,
    pub antecedent_support: f64,
    pub consequent_support: f64,
    pub support: f64,
    pub confidence: f64,
    pub lift: f64,
    pub leverage: f64,
    /// Infinite for rules with confidence 1; serialized as null.
    #[serde(with = "unbounded")]
    pub conviction: f64,
    pub zhangs_metric: f64,
    pub jaccard: f64,
    pub certainty: f64,
    pub kulczynski: f64,
    /// Filled by the weighted metrics calculator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weighted: Option<WeightedMetrics>,
}

impl Rule {
    pub fn metric(&self, metric: RuleMetric) -> f64 {
        match metric {
            RuleMetric::AntecedentSupport => self.antecedent_support,
            RuleMetric::ConsequentSupport => self.consequent_support,
            RuleMetric::Support => self.support,
            RuleMetric::Confidence => self.confidence,
            RuleMetric::Lift => self.lift,
            RuleMetric::Leverage => self.leverage,
            RuleMetric::Conviction => self.conviction,
            RuleMetric::ZhangsMetric => self.zhangs_metric,
            RuleMetric::Jaccard => self.jaccard,
            RuleMetric::Certainty => self.certainty,
            RuleMetric::Kulczynski => self.kulczynski,
        }
    }

    /// Sorted union of antecedent and consequent: the source itemset.
    pub fn itemset(&self) -> Vec<u32> {
        let mut items = Vec::with_capacity(self.antecedent.len() + self.consequent.len());
        items.extend_from_slice(&self.antecedent);
        items.extend_from_slice(&self.consequent);
        items.sort_unstable();
        items
    }
}

/// Text formats such as JSON have no infinity, so it travels as null.
mod unbounded {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &f64, serializer: S) -> Result<S::Ok, S::Error> {
        if value.is_finite() {
            serializer.serialize_some(value)
        } else {
            serializer.serialize_none()
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
        Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::INFINITY))
    }
}

#[inline]
fn compute_rule(antecedent: Vec<u32>, consequent: Vec<u32>, s_ac: f64, s_a: f64, s_c: f64) -> Rule {
    let confidence = if s_a == 0.0 { f64::INFINITY } else { s_ac / s_a };
    let conf_ca = if s_c == 0.0 { f64::INFINITY } else { s_ac / s_c };
    let lift = if s_c == 0.0 { f64::INFINITY } else { confidence / s_c };
    let leverage = s_ac - s_a * s_c;
    let conviction = if confidence >= 1.0 { f64::INFINITY } else { (1.0 - s_c) / (1.0 - confidence) };
    let zd = f64::max(s_ac * (1.0 - s_a), s_a * (s_c - s_ac));
    let zhangs_metric = if zd == 0.0 { 0.0 } else { leverage / zd };
    let jd = s_a + s_c - s_ac;
    let jaccard = if jd == 0.0 { 0.0 } else { s_ac / jd };
    let cd = 1.0 - s_c;
    let certainty = if cd == 0.0 { 0.0 } else { (confidence - s_c) / cd };
    let kulczynski = (confidence + conf_ca) / 2.0;
    Rule {
        antecedent,
        consequent,
        antecedent_support: s_a,
        consequent_support: s_c,
        support: s_ac,
        confidence,
        lift,
        leverage,
        conviction,
        zhangs_metric,
        jaccard,
        certainty,
        kulczynski,
        weighted: None,
    }
}

/// Every split of the ascending `itemset` into a non-empty antecedent and a
/// non-empty consequent, antecedents ordered by size then lexicographically.
fn rule_combinations(itemset: &[u32]) -> Vec<(Vec<u32>, Vec<u32>)> {
    let n = itemset.len();
    let mut rules = Vec::new();
    for ant_size in 1..n {
        let mut indices: Vec<usize> = (0..ant_size).collect();
        loop {
            let mut ant = Vec::with_capacity(ant_size);
            let mut con = Vec::with_capacity(n - ant_size);
            let mut next = 0;
            for (pos, &item) in itemset.iter().enumerate() {
                if next < ant_size && indices[next] == pos {
                    ant.push(item);
                    next += 1;
                } else {
                    con.push(item);
                }
            }
            rules.push((ant, con));

            let mut i = ant_size as isize - 1;
            while i >= 0 {
                if indices[i as usize] < n - (ant_size - i as usize) {
                    break;
                }
                i -= 1;
            }
            if i < 0 {
                break;
            }
            let i = i as usize;
            indices[i] += 1;
            for j in (i + 1)..ant_size {
                indices[j] = indices[j - 1] + 1;
            }
        }
    }
    rules
}

/// Derives every rule of `itemsets` whose `metric` is at least `min_threshold`.
///
/// Supports of antecedents and consequents are looked up in `itemsets`, which
/// therefore has to be downward closed (every miner output is).
pub fn generate_rules(itemsets: &FrequentItemsets, metric: RuleMetric, min_threshold: f64) -> Result<RuleSet> {
    metric.validate_threshold(min_threshold)?;

    let lookup = |items: &[u32]| {
        itemsets.support_of(items).ok_or_else(|| {
            MiningError::invalid_input(format!(
                "missing support for {:?}; itemsets must contain every subset of a frequent itemset",
                itemsets.names(items)
            ))
        })
    };

    let per_itemset: Vec<Vec<Rule>> = itemsets
        .as_slice()
        .par_iter()
        .filter(|iset| iset.items.len() >= 2)
        .map(|iset| -> Result<Vec<Rule>> {
            let mut kept = Vec::new();
            for (ant, con) in rule_combinations(&iset.items) {
                let s_a = lookup(ant.as_slice())?;
                let s_c = lookup(con.as_slice())?;
                let rule = compute_rule(ant, con, iset.support, s_a, s_c);
                if rule.metric(metric) >= min_threshold {
                    kept.push(rule);
                }
            }
            Ok(kept)
        })
        .collect::<Result<_>>()?;

    let rules: Vec<Rule> = per_itemset.into_iter().flatten().collect();
    debug!(
        itemsets = itemsets.len(),
        rules = rules.len(),
        metric = metric.name(),
        min_threshold,
        "generated rules"
    );
    Ok(RuleSet {
        rules,
        item_names: itemsets.item_names().to_vec(),
        n_transactions: itemsets.n_transactions(),
    })
}

/// Mean, minimum and maximum of one metric over a rule set.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl MetricStats {
    fn of(values: impl Iterator<Item = f64>) -> Option<Self> {
        let mut n = 0usize;
        let mut sum = 0.0;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in values {
            n += 1;
            sum += v;
            min = min.min(v);
            max = max.max(v);
        }
        (n > 0).then(|| MetricStats { mean: sum / n as f64, min, max })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleSummary {
    pub total_rules: usize,
    pub support: Option<MetricStats>,
    pub confidence: Option<MetricStats>,
    pub lift: Option<MetricStats>,
}

/// Rules of one run together with the item names needed to render them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    rules: Vec<Rule>,
    item_names: Vec<String>,
    n_transactions: usize,
}

impl RuleSet {
    pub(crate) fn with_rules(&self, rules: Vec<Rule>) -> RuleSet {
        RuleSet { rules, item_names: self.item_names.clone(), n_transactions: self.n_transactions }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Rule> {
        self.rules.iter()
    }

    pub fn as_slice(&self) -> &[Rule] {
        &self.rules
    }

    pub fn item_names(&self) -> &[String] {
        &self.item_names
    }

    pub fn n_transactions(&self) -> usize {
        self.n_transactions
    }

    /// Finds the rule with exactly this antecedent and consequent.
    pub fn find(&self, antecedent: &[u32], consequent: &[u32]) -> Option<&Rule> {
        self.rules.iter().find(|r| r.antecedent == antecedent && r.consequent == consequent)
    }

    /// The rules accepted by `filter`, in their current order.
    pub fn filter(&self, filter: &RuleFilter) -> RuleSet {
        self.with_rules(self.rules.iter().filter(|r| filter.accepts(r)).cloned().collect())
    }

    /// Sorts by `metric`, highest first. Ties keep their current order.
    pub fn sort_by(&mut self, metric: RuleMetric) {
        self.rules.sort_by(|a, b| b.metric(metric).total_cmp(&a.metric(metric)));
    }

    pub fn top_by(&self, metric: RuleMetric, n: usize) -> Vec<&Rule> {
        let mut ranked: Vec<&Rule> = self.rules.iter().collect();
        ranked.sort_by(|a, b| b.metric(metric).total_cmp(&a.metric(metric)));
        ranked.truncate(n);
        ranked
    }

    pub fn summary(&self) -> RuleSummary {
        RuleSummary {
            total_rules: self.rules.len(),
            support: MetricStats::of(self.rules.iter().map(|r| r.support)),
            confidence: MetricStats::of(self.rules.iter().map(|r| r.confidence)),
            lift: MetricStats::of(self.rules.iter().map(|r| r.lift)),
        }
    }

    pub fn names(&self, items: &[u32]) -> Vec<&str> {
        items.iter().filter_map(|&i| self.item_names.get(i as usize).map(String::as_str)).collect()
    }

    /// Renders a rule as `a, b → c`.
    pub fn describe(&self, rule: &Rule) -> String {
        format!("{} → {}", self.names(&rule.antecedent).join(", "), self.names(&rule.consequent).join(", "))
    }
}

impl<'a> IntoIterator for &'a RuleSet {
    type Item = &'a Rule;
    type IntoIter = std::slice::Iter<'a, Rule>;

    fn into_iter(self) -> Self::IntoIter {
        self.rules.iter()
    }
}

use numpy::{IntoPyArray, PyArray1};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::apriori::Apriori;
use crate::association_rules::{generate_rules, RuleSet};
use crate::basket::{encode, LogEntry, PresenceMatrix};
use crate::config::{RuleMetric, METRIC_NAMES};
use crate::error::MiningError;
use crate::fpgrowth::FpGrowth;
use crate::itemset::FrequentItemsets;
use crate::weighted::{compute_weighted, TransactionWeights};

type Flat<'py, S> = (Vec<String>, Bound<'py, PyArray1<S>>, Bound<'py, PyArray1<u32>>, Bound<'py, PyArray1<u32>>);

type FlatRules<'py> = (
    Vec<String>,
    Bound<'py, PyArray1<u32>>,
    Bound<'py, PyArray1<u32>>,
    Bound<'py, PyArray1<u32>>,
    Bound<'py, PyArray1<u32>>,
    Bound<'py, PyArray1<f64>>,
);

impl From<MiningError> for PyErr {
    fn from(err: MiningError) -> Self {
        PyValueError::new_err(err.to_string())
    }
}

fn log_from_columns(
    transaction_ids: Vec<String>,
    items: Vec<String>,
    quantities: Vec<f64>,
    unit_prices: Option<Vec<f64>>,
) -> PyResult<Vec<LogEntry>> {
    let n = transaction_ids.len();
    if items.len() != n || quantities.len() != n || unit_prices.as_ref().map_or(false, |p| p.len() != n) {
        return Err(PyValueError::new_err("log columns must all have the same length"));
    }
    let mut prices = unit_prices.map(Vec::into_iter);
    Ok(transaction_ids
        .into_iter()
        .zip(items)
        .zip(quantities)
        .map(|((t, item), q)| {
            let entry = LogEntry::new(t, item, q);
            match prices.as_mut().and_then(Iterator::next) {
                Some(p) => entry.with_unit_price(p),
                None => entry,
            }
        })
        .collect())
}

/// Itemsets as (supports, offsets, items): itemset i is
/// `items[offsets[i]..offsets[i + 1]]`.
pub(crate) fn flatten_itemsets(itemsets: &FrequentItemsets) -> (Vec<f64>, Vec<u32>, Vec<u32>) {
    let mut supports = Vec::with_capacity(itemsets.len());
    let mut offsets = Vec::with_capacity(itemsets.len() + 1);
    let total: usize = itemsets.iter().map(|s| s.len()).sum();
    let mut all_items = Vec::with_capacity(total);

    offsets.push(0);
    for itemset in itemsets {
        supports.push(itemset.support);
        all_items.extend_from_slice(&itemset.items);
        offsets.push(all_items.len() as u32);
    }
    (supports, offsets, all_items)
}

/// Rules as antecedent and consequent offset/item pairs plus a row-major
/// metric block of `METRIC_NAMES.len()` columns per rule.
fn flatten_rules<'py>(py: Python<'py>, rules: &RuleSet, weighted: bool) -> FlatRules<'py> {
    let mut names: Vec<String> = METRIC_NAMES.iter().map(|(n, _)| n.to_string()).collect();
    if weighted {
        names.extend(["weighted_support", "weighted_confidence", "weighted_lift"].map(String::from));
    }
    let width = names.len();

    let mut ant_offsets = vec![0u32];
    let mut ant_items = Vec::new();
    let mut con_offsets = vec![0u32];
    let mut con_items = Vec::new();
    let mut metrics = Vec::with_capacity(rules.len() * width);
    for rule in rules {
        ant_items.extend_from_slice(&rule.antecedent);
        ant_offsets.push(ant_items.len() as u32);
        con_items.extend_from_slice(&rule.consequent);
        con_offsets.push(con_items.len() as u32);
        metrics.extend(METRIC_NAMES.iter().map(|(_, m)| rule.metric(*m)));
        if weighted {
            match rule.weighted {
                Some(w) => metrics.extend([w.weighted_support, w.weighted_confidence, w.weighted_lift]),
                None => metrics.extend([f64::NAN; 3]),
            }
        }
    }

    (
        names,
        ant_offsets.into_pyarray(py),
        ant_items.into_pyarray(py),
        con_offsets.into_pyarray(py),
        con_items.into_pyarray(py),
        metrics.into_pyarray(py),
    )
}

fn mine(matrix: &PresenceMatrix, algorithm: &str, min_support: f64, max_len: Option<usize>) -> PyResult<FrequentItemsets> {
    let itemsets = match algorithm {
        "apriori" => {
            let miner = Apriori::new();
            let miner = match max_len {
                Some(ml) => miner.with_max_len(ml),
                None => miner,
            };
            miner.mine(matrix, min_support)?
        }
        "fpgrowth" => {
            let miner = FpGrowth::new();
            let miner = match max_len {
                Some(ml) => miner.with_max_len(ml),
                None => miner,
            };
            miner.run(matrix, min_support)?
        }
        other => return Err(PyValueError::new_err(format!("unknown algorithm: '{other}'"))),
    };
    Ok(itemsets)
}

/// Presence matrix in CSR form: (transactions, items, indptr, indices).
#[pyfunction]
#[pyo3(signature = (transaction_ids, items, quantities, threshold=1.0))]
pub fn encode_basket<'py>(
    py: Python<'py>,
    transaction_ids: Vec<String>,
    items: Vec<String>,
    quantities: Vec<f64>,
    threshold: f64,
) -> PyResult<(Vec<String>, Vec<String>, Bound<'py, PyArray1<u32>>, Bound<'py, PyArray1<u32>>)> {
    let log = log_from_columns(transaction_ids, items, quantities, None)?;
    let matrix = py.allow_threads(|| encode(&log, threshold))?;

    let mut indptr = Vec::with_capacity(matrix.n_transactions() + 1);
    let mut indices = Vec::new();
    indptr.push(0u32);
    for row in matrix.rows() {
        indices.extend_from_slice(row);
        indptr.push(indices.len() as u32);
    }
    Ok((matrix.transactions().to_vec(), matrix.items().to_vec(), indptr.into_pyarray(py), indices.into_pyarray(py)))
}

#[pyfunction]
#[pyo3(signature = (transaction_ids, items, quantities, min_support, max_len=None, max_candidates=None, threshold=1.0))]
#[allow(clippy::too_many_arguments)]
pub fn apriori<'py>(
    py: Python<'py>,
    transaction_ids: Vec<String>,
    items: Vec<String>,
    quantities: Vec<f64>,
    min_support: f64,
    max_len: Option<usize>,
    max_candidates: Option<usize>,
    threshold: f64,
) -> PyResult<Flat<'py, f64>> {
    let log = log_from_columns(transaction_ids, items, quantities, None)?;
    let itemsets = py.allow_threads(|| {
        let matrix = encode(&log, threshold)?;
        let mut miner = Apriori::new();
        if let Some(ml) = max_len {
            miner = miner.with_max_len(ml);
        }
        if let Some(limit) = max_candidates {
            miner = miner.with_max_candidates(limit);
        }
        miner.mine(&matrix, min_support)
    })?;

    let (supports, offsets, flat) = flatten_itemsets(&itemsets);
    Ok((itemsets.item_names().to_vec(), supports.into_pyarray(py), offsets.into_pyarray(py), flat.into_pyarray(py)))
}

#[pyfunction]
#[pyo3(signature = (transaction_ids, items, quantities, min_support, max_len=None, threshold=1.0))]
pub fn fpgrowth<'py>(
    py: Python<'py>,
    transaction_ids: Vec<String>,
    items: Vec<String>,
    quantities: Vec<f64>,
    min_support: f64,
    max_len: Option<usize>,
    threshold: f64,
) -> PyResult<Flat<'py, f64>> {
    let log = log_from_columns(transaction_ids, items, quantities, None)?;
    let itemsets = py.allow_threads(|| {
        let matrix = encode(&log, threshold)?;
        mine(&matrix, "fpgrowth", min_support, max_len)
    })?;

    let (supports, offsets, flat) = flatten_itemsets(&itemsets);
    Ok((itemsets.item_names().to_vec(), supports.into_pyarray(py), offsets.into_pyarray(py), flat.into_pyarray(py)))
}

/// Returns (item names, rules) where rules is the tuple produced by
/// `flatten_rules`; the metric column names come first in that tuple.
#[pyfunction]
#[pyo3(signature = (transaction_ids, items, quantities, min_support, metric="confidence", min_threshold=0.8, algorithm="fpgrowth", max_len=None, threshold=1.0))]
#[allow(clippy::too_many_arguments)]
pub fn association_rules<'py>(
    py: Python<'py>,
    transaction_ids: Vec<String>,
    items: Vec<String>,
    quantities: Vec<f64>,
    min_support: f64,
    metric: &str,
    min_threshold: f64,
    algorithm: &str,
    max_len: Option<usize>,
    threshold: f64,
) -> PyResult<(Vec<String>, FlatRules<'py>)> {
    let metric: RuleMetric = metric.parse()?;
    let log = log_from_columns(transaction_ids, items, quantities, None)?;
    let rules = py.allow_threads(|| -> PyResult<RuleSet> {
        let matrix = encode(&log, threshold)?;
        let itemsets = mine(&matrix, algorithm, min_support, max_len)?;
        Ok(generate_rules(&itemsets, metric, min_threshold)?)
    })?;
    Ok((rules.item_names().to_vec(), flatten_rules(py, &rules, false)))
}

/// Like `association_rules`, with each transaction weighted by the summed
/// `quantity * unit_price` of its lines.
#[pyfunction]
#[pyo3(signature = (transaction_ids, items, quantities, unit_prices, min_support, metric="confidence", min_threshold=0.8, algorithm="fpgrowth", max_len=None, threshold=1.0))]
#[allow(clippy::too_many_arguments)]
pub fn weighted_rules<'py>(
    py: Python<'py>,
    transaction_ids: Vec<String>,
    items: Vec<String>,
    quantities: Vec<f64>,
    unit_prices: Vec<f64>,
    min_support: f64,
    metric: &str,
    min_threshold: f64,
    algorithm: &str,
    max_len: Option<usize>,
    threshold: f64,
) -> PyResult<(Vec<String>, FlatRules<'py>)> {
    let metric: RuleMetric = metric.parse()?;
    let log = log_from_columns(transaction_ids, items, quantities, Some(unit_prices))?;
    let weighted = py.allow_threads(|| -> PyResult<_> {
        let matrix = encode(&log, threshold)?;
        let weights = TransactionWeights::from_log(&log)?;
        let itemsets = mine(&matrix, algorithm, min_support, max_len)?;
        let rules = generate_rules(&itemsets, metric, min_threshold)?;
        Ok(compute_weighted(&rules, &matrix, &weights)?)
    })?;
    Ok((weighted.rules.item_names().to_vec(), flatten_rules(py, &weighted.rules, true)))
}

#[pymodule]
fn _basket_rules(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(encode_basket, m)?)?;
    m.add_function(wrap_pyfunction!(apriori, m)?)?;
    m.add_function(wrap_pyfunction!(fpgrowth, m)?)?;
    m.add_function(wrap_pyfunction!(association_rules, m)?)?;
    m.add_function(wrap_pyfunction!(weighted_rules, m)?)?;
    Ok(())
}

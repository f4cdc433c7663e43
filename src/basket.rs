use ahash::{AHashMap, AHashSet};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::common::{count_item_support, is_sorted_subset};
use crate::config::validate_basket_threshold;
use crate::error::{MiningError, Result};

/// One line-item of a transaction log.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub transaction_id: String,
    pub item: String,
    pub quantity: f64,
    /// Monetary value of one unit; only used to derive transaction weights.
    #[serde(default)]
    pub unit_price: Option<f64>,
}

impl LogEntry {
    pub fn new(transaction_id: impl Into<String>, item: impl Into<String>, quantity: f64) -> Self {
        Self { transaction_id: transaction_id.into(), item: item.into(), quantity, unit_price: None }
    }

    pub fn with_unit_price(mut self, unit_price: f64) -> Self {
        self.unit_price = Some(unit_price);
        self
    }
}

/// Boolean transaction × item matrix stored row-wise as sorted column indices.
///
/// Rows keep the transaction id they were built from; columns are item names
/// in ascending order, so the column index of an item is stable for a given
/// set of items.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PresenceMatrix {
    transactions: Vec<String>,
    items: Vec<String>,
    rows: Vec<Vec<u32>>,
    #[serde(skip)]
    row_index: AHashMap<String, usize>,
}

/// Builds the presence matrix of `log`: an item is present in a transaction
/// iff its summed quantity there is at least `threshold`.
pub fn encode(log: &[LogEntry], threshold: f64) -> Result<PresenceMatrix> {
    validate_basket_threshold(threshold)?;
    if log.is_empty() {
        return Err(MiningError::invalid_input("transaction log has no rows"));
    }

    let mut row_of: AHashMap<&str, usize> = AHashMap::new();
    let mut transactions: Vec<String> = Vec::new();
    let mut item_names: Vec<&str> = Vec::new();
    for entry in log {
        if !entry.quantity.is_finite() {
            return Err(MiningError::invalid_input(format!(
                "non-finite quantity for item '{}' in transaction '{}'",
                entry.item, entry.transaction_id
            )));
        }
        row_of.entry(entry.transaction_id.as_str()).or_insert_with(|| {
            transactions.push(entry.transaction_id.clone());
            transactions.len() - 1
        });
        item_names.push(entry.item.as_str());
    }
    item_names.sort_unstable();
    item_names.dedup();
    let col_of: AHashMap<&str, u32> =
        item_names.iter().enumerate().map(|(col, &name)| (name, col as u32)).collect();

    let mut sums: AHashMap<(usize, u32), f64> = AHashMap::with_capacity(log.len());
    for entry in log {
        let key = (row_of[entry.transaction_id.as_str()], col_of[entry.item.as_str()]);
        *sums.entry(key).or_insert(0.0) += entry.quantity;
    }

    let mut rows: Vec<Vec<u32>> = vec![Vec::new(); transactions.len()];
    for ((row, col), total) in sums {
        if total >= threshold {
            rows[row].push(col);
        }
    }
    rows.par_iter_mut().for_each(|row| row.sort_unstable());

    let matrix = PresenceMatrix::assemble(transactions, item_names.into_iter().map(str::to_owned).collect(), rows);
    debug!(
        n_entries = log.len(),
        n_transactions = matrix.n_transactions(),
        n_items = matrix.n_items(),
        empty_rows = matrix.rows.iter().filter(|r| r.is_empty()).count(),
        "encoded basket"
    );
    Ok(matrix)
}

impl PresenceMatrix {
    /// `transactions` must be distinct.
    fn assemble(transactions: Vec<String>, items: Vec<String>, rows: Vec<Vec<u32>>) -> Self {
        let row_index = transactions.iter().enumerate().map(|(row, id)| (id.clone(), row)).collect();
        Self { transactions, items, rows, row_index }
    }

    /// Builds a matrix from already-encoded baskets. Repeated items inside a
    /// basket collapse; a repeated transaction id is rejected.
    pub fn from_transactions<I, T, B, S>(baskets: I) -> Result<Self>
    where
        I: IntoIterator<Item = (T, B)>,
        T: Into<String>,
        B: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut transactions: Vec<String> = Vec::new();
        let mut named_rows: Vec<Vec<String>> = Vec::new();
        for (id, basket) in baskets {
            transactions.push(id.into());
            named_rows.push(basket.into_iter().map(|s| s.as_ref().to_owned()).collect());
        }

        let mut seen: AHashSet<&str> = AHashSet::with_capacity(transactions.len());
        for id in &transactions {
            if !seen.insert(id.as_str()) {
                return Err(MiningError::invalid_input(format!("duplicate transaction id '{id}'")));
            }
        }

        let mut items: Vec<String> = named_rows.iter().flatten().cloned().collect();
        items.sort_unstable();
        items.dedup();

        let rows = named_rows
            .iter()
            .map(|basket| {
                let mut row: Vec<u32> = basket
                    .iter()
                    .filter_map(|name| items.binary_search(name).ok().map(|c| c as u32))
                    .collect();
                row.sort_unstable();
                row.dedup();
                row
            })
            .collect();

        Ok(Self::assemble(transactions, items, rows))
    }

    pub fn n_transactions(&self) -> usize {
        self.rows.len()
    }

    pub fn n_items(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn transactions(&self) -> &[String] {
        &self.transactions
    }

    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn rows(&self) -> &[Vec<u32>] {
        &self.rows
    }

    pub fn row(&self, index: usize) -> &[u32] {
        &self.rows[index]
    }

    pub fn row_of(&self, transaction_id: &str) -> Option<usize> {
        self.row_index.get(transaction_id).copied()
    }

    pub fn item_id(&self, name: &str) -> Option<u32> {
        self.items.binary_search_by(|probe| probe.as_str().cmp(name)).ok().map(|c| c as u32)
    }

    pub fn item_name(&self, id: u32) -> Option<&str> {
        self.items.get(id as usize).map(String::as_str)
    }

    /// Column indices for `names`, sorted. `None` if any name is unknown.
    pub fn item_ids<S: AsRef<str>>(&self, names: &[S]) -> Option<Vec<u32>> {
        let mut ids = names.iter().map(|n| self.item_id(n.as_ref())).collect::<Option<Vec<u32>>>()?;
        ids.sort_unstable();
        ids.dedup();
        Some(ids)
    }

    pub fn contains(&self, row: usize, item: u32) -> bool {
        self.rows[row].binary_search(&item).is_ok()
    }

    pub fn item_support_counts(&self) -> Vec<u64> {
        count_item_support(&self.rows, self.items.len())
    }

    /// Number of rows containing every item of the ascending slice `items`.
    pub fn support_count(&self, items: &[u32]) -> u64 {
        self.rows.par_iter().filter(|row| is_sorted_subset(items, row)).count() as u64
    }

    /// A copy without the rows that have no present item.
    pub fn without_empty_rows(&self) -> Self {
        let (transactions, rows) = self
            .transactions
            .iter()
            .zip(self.rows.iter())
            .filter(|(_, row)| !row.is_empty())
            .map(|(t, r)| (t.clone(), r.clone()))
            .unzip();
        Self::assemble(transactions, self.items.clone(), rows)
    }
}

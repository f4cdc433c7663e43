use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::basket::PresenceMatrix;

/// A frequent itemset: ascending column indices plus absolute and relative support.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Itemset {
    pub items: Vec<u32>,
    pub count: u64,
    pub support: f64,
}

impl Itemset {
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Output of one mining run.
///
/// Itemsets are kept in canonical order (by length, then lexicographically by
/// column index) so results from different miners compare with `==`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredItemsets")]
pub struct FrequentItemsets {
    itemsets: Vec<Itemset>,
    item_names: Vec<String>,
    n_transactions: usize,
    min_support: f64,
    max_len: Option<usize>,
    truncated: bool,
    #[serde(skip)]
    index: AHashMap<Vec<u32>, usize>,
}

impl FrequentItemsets {
    pub(crate) fn from_counts(
        raw: Vec<(u64, Vec<u32>)>,
        matrix: &PresenceMatrix,
        min_support: f64,
        max_len: Option<usize>,
        truncated: bool,
    ) -> Self {
        let n = matrix.n_transactions();
        let mut itemsets: Vec<Itemset> = raw
            .into_iter()
            .map(|(count, mut items)| {
                items.sort_unstable();
                Itemset { items, count, support: count as f64 / n as f64 }
            })
            .collect();
        itemsets.sort_unstable_by(|a, b| a.items.len().cmp(&b.items.len()).then_with(|| a.items.cmp(&b.items)));

        StoredItemsets {
            itemsets,
            item_names: matrix.items().to_vec(),
            n_transactions: n,
            min_support,
            max_len,
            truncated,
        }
        .into()
    }

    pub fn len(&self) -> usize {
        self.itemsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.itemsets.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Itemset> {
        self.itemsets.iter()
    }

    pub fn as_slice(&self) -> &[Itemset] {
        &self.itemsets
    }

    pub fn n_transactions(&self) -> usize {
        self.n_transactions
    }

    pub fn item_names(&self) -> &[String] {
        &self.item_names
    }

    pub fn min_support(&self) -> f64 {
        self.min_support
    }

    pub fn max_len(&self) -> Option<usize> {
        self.max_len
    }

    /// True when the search was cut short: either some frequent itemset
    /// longer than `max_len` exists but was not enumerated, or this is the
    /// partial result of an aborted search whose higher levels were never
    /// counted.
    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Looks up an itemset by its ascending column indices.
    pub fn get(&self, items: &[u32]) -> Option<&Itemset> {
        self.index.get(items).map(|&i| &self.itemsets[i])
    }

    pub fn support_of(&self, items: &[u32]) -> Option<f64> {
        self.get(items).map(|s| s.support)
    }

    pub fn count_of(&self, items: &[u32]) -> Option<u64> {
        self.get(items).map(|s| s.count)
    }

    pub fn of_length(&self, k: usize) -> impl Iterator<Item = &Itemset> + '_ {
        self.itemsets.iter().filter(move |s| s.items.len() == k)
    }

    pub fn longest(&self) -> usize {
        self.itemsets.last().map_or(0, |s| s.items.len())
    }

    pub fn mean_len(&self) -> f64 {
        if self.itemsets.is_empty() {
            return 0.0;
        }
        self.itemsets.iter().map(|s| s.items.len()).sum::<usize>() as f64 / self.itemsets.len() as f64
    }

    pub fn names<'a>(&'a self, items: &[u32]) -> Vec<&'a str> {
        items.iter().filter_map(|&i| self.item_names.get(i as usize).map(String::as_str)).collect()
    }

    /// Same itemsets with the same counts over the same number of transactions.
    pub fn agrees_with(&self, other: &FrequentItemsets) -> bool {
        self.n_transactions == other.n_transactions
            && self.itemsets.len() == other.itemsets.len()
            && self
                .itemsets
                .iter()
                .zip(other.itemsets.iter())
                .all(|(a, b)| a.items == b.items && a.count == b.count)
    }
}

/// Serialized form of [`FrequentItemsets`]; the lookup index is rebuilt on load.
#[derive(Deserialize)]
struct StoredItemsets {
    itemsets: Vec<Itemset>,
    item_names: Vec<String>,
    n_transactions: usize,
    min_support: f64,
    max_len: Option<usize>,
    truncated: bool,
}

impl From<StoredItemsets> for FrequentItemsets {
    fn from(stored: StoredItemsets) -> Self {
        let index = stored.itemsets.iter().enumerate().map(|(i, s)| (s.items.clone(), i)).collect();
        Self {
            itemsets: stored.itemsets,
            item_names: stored.item_names,
            n_transactions: stored.n_transactions,
            min_support: stored.min_support,
            max_len: stored.max_len,
            truncated: stored.truncated,
            index,
        }
    }
}

impl<'a> IntoIterator for &'a FrequentItemsets {
    type Item = &'a Itemset;
    type IntoIter = std::slice::Iter<'a, Itemset>;

    fn into_iter(self) -> Self::IntoIter {
        self.itemsets.iter()
    }
}

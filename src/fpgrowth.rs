use rayon::prelude::*;
use tracing::{debug, debug_span};

use crate::basket::PresenceMatrix;
use crate::common::{combinations, min_count_for};
use crate::config::{validate_max_len, validate_min_support, MiningConfig};
use crate::error::Result;
use crate::itemset::FrequentItemsets;
use crate::miner::FrequentItemsetMiner;

const PAR_ITEMS_CUTOFF: usize = 4;
const NIL: u32 = u32::MAX;

/// FP-tree node. Nodes live in one arena and refer to each other by index:
/// `parent` towards the root, `first_child`/`next_sibling` down the tree and
/// `next_same_item` along the node-link chain of `item`.
#[derive(Debug, Clone, Copy)]
pub(crate) struct FPNode {
    pub item: u32,
    pub count: u64,
    pub parent: u32,
    pub first_child: u32,
    pub next_sibling: u32,
    pub next_same_item: u32,
}

impl FPNode {
    #[inline(always)]
    fn new(item: u32, count: u64, parent: u32, next_sibling: u32) -> Self {
        FPNode { item, count, parent, first_child: NIL, next_sibling, next_same_item: NIL }
    }
}

/// Prefix tree over local item ids. Local id 0 is the most frequent item;
/// every inserted path is ascending in local id.
pub(crate) struct FPTree {
    pub nodes: Vec<FPNode>,
    /// Header table: first and last node of each item's node-link chain.
    heads: Vec<u32>,
    tails: Vec<u32>,
    /// Local id → column index in the presence matrix.
    pub original_items: Vec<u32>,
    /// Column indices of the prefix this (conditional) tree was built for.
    pub cond_items: Vec<u32>,
    /// Tracked incrementally: false once any node gets >1 child.
    single_path: bool,
}

impl FPTree {
    pub fn new(num_items: usize, original_items: Vec<u32>) -> Self {
        let mut nodes = Vec::with_capacity(256);
        nodes.push(FPNode::new(NIL, 0, NIL, NIL));
        FPTree {
            nodes,
            heads: vec![NIL; num_items],
            tails: vec![NIL; num_items],
            original_items,
            cond_items: Vec::new(),
            single_path: true,
        }
    }

    #[inline(always)]
    pub fn is_path(&self) -> bool {
        self.single_path
    }

    pub fn num_items(&self) -> usize {
        self.original_items.len()
    }

    #[inline]
    fn find_child(&self, node_idx: u32, item: u32) -> Option<u32> {
        let mut child = self.nodes[node_idx as usize].first_child;
        while child != NIL {
            let node = &self.nodes[child as usize];
            if node.item == item {
                return Some(child);
            }
            child = node.next_sibling;
        }
        None
    }

    fn add_child(&mut self, parent_idx: u32, item: u32, count: u64) -> u32 {
        let new_idx = self.nodes.len() as u32;
        let first = self.nodes[parent_idx as usize].first_child;
        if first != NIL {
            self.single_path = false;
        }
        self.nodes.push(FPNode::new(item, count, parent_idx, first));
        self.nodes[parent_idx as usize].first_child = new_idx;

        let tail = self.tails[item as usize];
        if tail == NIL {
            self.heads[item as usize] = new_idx;
        } else {
            self.nodes[tail as usize].next_same_item = new_idx;
        }
        self.tails[item as usize] = new_idx;
        new_idx
    }

    /// Adds `count` copies of the ascending local-id path `itemset`.
    pub fn insert_itemset(&mut self, itemset: &[u32], count: u64) {
        self.nodes[0].count += count;
        let mut node_idx = 0u32;
        for &item in itemset {
            node_idx = match self.find_child(node_idx, item) {
                Some(child_idx) => {
                    self.nodes[child_idx as usize].count += count;
                    child_idx
                }
                None => self.add_child(node_idx, item, count),
            };
        }
    }

    /// Walks the node-link chain of `item`.
    pub fn node_links(&self, item: u32) -> impl Iterator<Item = &FPNode> + '_ {
        let mut next = self.heads[item as usize];
        std::iter::from_fn(move || {
            if next == NIL {
                return None;
            }
            let node = &self.nodes[next as usize];
            next = node.next_same_item;
            Some(node)
        })
    }

    pub fn item_support(&self, item: u32) -> u64 {
        self.node_links(item).map(|n| n.count).sum()
    }

    /// Prefix paths of every `item` node, each with that node's count.
    fn pattern_base(&self, item: u32) -> Vec<(Vec<u32>, u64)> {
        let mut base = Vec::new();
        let mut branch_buf = Vec::with_capacity(32);
        for node in self.node_links(item) {
            branch_buf.clear();
            let mut idx = node.parent;
            while idx != 0 {
                let ancestor = &self.nodes[idx as usize];
                branch_buf.push(ancestor.item);
                idx = ancestor.parent;
            }
            if !branch_buf.is_empty() {
                branch_buf.reverse();
                base.push((branch_buf.clone(), node.count));
            }
        }
        base
    }

    /// Per-item counts inside the conditional pattern base of `item`. Only
    /// items with a smaller local id can be ancestors.
    fn conditional_counts(&self, item: u32) -> Vec<u64> {
        let mut counts = vec![0u64; item as usize];
        for node in self.node_links(item) {
            let mut idx = node.parent;
            while idx != 0 {
                let ancestor = &self.nodes[idx as usize];
                counts[ancestor.item as usize] += node.count;
                idx = ancestor.parent;
            }
        }
        counts
    }

    /// Whether the conditional tree of `item` would hold any frequent item.
    pub fn has_frequent_extension(&self, item: u32, minsup: u64) -> bool {
        self.conditional_counts(item).into_iter().any(|c| c >= minsup)
    }

    pub fn conditional_tree(&self, item: u32, minsup: u64) -> FPTree {
        let counts = self.conditional_counts(item);

        let mut valid_items: Vec<(u32, u64)> = counts
            .into_iter()
            .enumerate()
            .filter(|&(_, c)| c >= minsup)
            .map(|(i, c)| (i as u32, c))
            .collect();
        valid_items.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        let mut old_to_new = vec![NIL; item as usize];
        let mut new_original_items = Vec::with_capacity(valid_items.len());
        for (new_id, &(old_id, _)) in valid_items.iter().enumerate() {
            old_to_new[old_id as usize] = new_id as u32;
            new_original_items.push(self.original_items[old_id as usize]);
        }

        let mut cond_tree = FPTree::new(valid_items.len(), new_original_items);
        cond_tree.cond_items = self.cond_items.clone();
        cond_tree.cond_items.push(self.original_items[item as usize]);
        if valid_items.is_empty() {
            return cond_tree;
        }

        let mut filtered = Vec::with_capacity(32);
        for (branch, branch_count) in self.pattern_base(item) {
            filtered.clear();
            filtered.extend(branch.into_iter().map(|i| old_to_new[i as usize]).filter(|&i| i != NIL));
            if filtered.is_empty() {
                continue;
            }
            filtered.sort_unstable();
            cond_tree.insert_itemset(&filtered, branch_count);
        }
        cond_tree
    }
}

/// Mines `tree`. Returns every frequent itemset below its prefix, plus
/// whether `max_len` hid a longer frequent itemset.
pub(crate) fn fpg_step(tree: &FPTree, minsup: u64, max_len: Option<usize>) -> (Vec<(u64, Vec<u32>)>, bool) {
    let num_items = tree.num_items();
    let cond_len = tree.cond_items.len();
    if num_items == 0 {
        return (Vec::new(), false);
    }
    let room = max_len.map_or(num_items, |ml| ml.saturating_sub(cond_len));
    if room == 0 {
        return (Vec::new(), true);
    }

    let mut results: Vec<(u64, Vec<u32>)> = Vec::with_capacity(num_items.saturating_mul(2));

    if tree.is_path() {
        let local_ids: Vec<u32> = (0..num_items as u32).collect();
        for size in 1..=room.min(num_items) {
            for combo in combinations(&local_ids, size) {
                let support = combo
                    .iter()
                    .map(|&local_id| tree.item_support(local_id))
                    .min()
                    .unwrap_or(0);
                let mut iset = tree.cond_items.clone();
                iset.extend(combo.iter().map(|&id| tree.original_items[id as usize]));
                results.push((support, iset));
            }
        }
        return (results, num_items > room);
    }

    let mine_item = |local_id: u32| -> (Vec<(u64, Vec<u32>)>, bool) {
        let mut iset = Vec::with_capacity(cond_len + 1);
        iset.extend_from_slice(&tree.cond_items);
        iset.push(tree.original_items[local_id as usize]);
        let mut sub = vec![(tree.item_support(local_id), iset)];

        if room == 1 {
            return (sub, tree.has_frequent_extension(local_id, minsup));
        }
        let cond_tree = tree.conditional_tree(local_id, minsup);
        let (deeper, truncated) = fpg_step(&cond_tree, minsup, max_len);
        sub.extend(deeper);
        (sub, truncated)
    };

    // Least frequent item first keeps the conditional trees small.
    let sub_results: Vec<(Vec<(u64, Vec<u32>)>, bool)> = if num_items >= PAR_ITEMS_CUTOFF {
        (0..num_items as u32).into_par_iter().rev().map(mine_item).collect()
    } else {
        (0..num_items as u32).rev().map(mine_item).collect()
    };

    let mut truncated = false;
    for (mut chunk, t) in sub_results {
        results.append(&mut chunk);
        truncated |= t;
    }
    (results, truncated)
}

/// Frequent columns ordered by descending count, ties by column index.
/// Returns the column → local id map and the local id → column list.
pub(crate) fn process_item_counts(item_count: &[u64], min_count: u64) -> Option<(Vec<u32>, Vec<u32>)> {
    let mut frequent: Vec<(u32, u64)> = item_count
        .iter()
        .enumerate()
        .filter(|(_, &c)| c >= min_count)
        .map(|(col, &c)| (col as u32, c))
        .collect();
    if frequent.is_empty() {
        return None;
    }
    frequent.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    let mut global_to_local = vec![NIL; item_count.len()];
    let mut original_items = Vec::with_capacity(frequent.len());
    for (local_id, &(col, _)) in frequent.iter().enumerate() {
        global_to_local[col as usize] = local_id as u32;
        original_items.push(col);
    }
    Some((global_to_local, original_items))
}

/// Builds the global FP-tree. Identical baskets are inserted once with
/// their multiplicity.
pub(crate) fn build_tree(matrix: &PresenceMatrix, global_to_local: &[u32], original_items: Vec<u32>) -> FPTree {
    let mut baskets: Vec<Vec<u32>> = matrix
        .rows()
        .par_iter()
        .filter_map(|row| {
            let mut items: Vec<u32> = row
                .iter()
                .map(|&col| global_to_local[col as usize])
                .filter(|&l| l != NIL)
                .collect();
            if items.is_empty() {
                return None;
            }
            items.sort_unstable();
            Some(items)
        })
        .collect();
    baskets.par_sort_unstable();

    let mut tree = FPTree::new(original_items.len(), original_items);
    let total = baskets.len();
    let mut i = 0;
    while i < total {
        let basket = &baskets[i];
        let mut j = i + 1;
        while j < total && baskets[j] == *basket {
            j += 1;
        }
        tree.insert_itemset(basket, (j - i) as u64);
        i = j;
    }
    tree
}

/// Pattern-growth frequent itemset search over a compressed prefix tree.
#[derive(Clone, Debug, Default)]
pub struct FpGrowth {
    max_len: Option<usize>,
}

impl FpGrowth {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &MiningConfig) -> Self {
        Self { max_len: config.max_len }
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = Some(max_len);
        self
    }

    pub fn run(&self, matrix: &PresenceMatrix, min_support: f64) -> Result<FrequentItemsets> {
        validate_min_support(min_support)?;
        validate_max_len(self.max_len)?;
        let n = matrix.n_transactions();
        let _span = debug_span!("fpgrowth", min_support, n_transactions = n).entered();
        let empty = || FrequentItemsets::from_counts(Vec::new(), matrix, min_support, self.max_len, false);
        if n == 0 {
            return Ok(empty());
        }
        let min_count = min_count_for(min_support, n);

        let (global_to_local, original_items) = match process_item_counts(&matrix.item_support_counts(), min_count) {
            Some(v) => v,
            None => return Ok(empty()),
        };
        let tree = build_tree(matrix, &global_to_local, original_items);
        debug!(
            frequent_items = tree.num_items(),
            nodes = tree.nodes.len(),
            single_path = tree.is_path(),
            min_count,
            "built fp-tree"
        );

        let (results, truncated) = fpg_step(&tree, min_count, self.max_len);
        Ok(FrequentItemsets::from_counts(results, matrix, min_support, self.max_len, truncated))
    }
}

impl FrequentItemsetMiner for FpGrowth {
    fn name(&self) -> &'static str {
        "fpgrowth"
    }

    fn mine(&self, matrix: &PresenceMatrix, min_support: f64) -> Result<FrequentItemsets> {
        self.run(matrix, min_support)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::apriori::Apriori;
    use crate::error::MiningError;

    fn matrix() -> PresenceMatrix {
        PresenceMatrix::from_transactions(vec![
            ("1", vec!["f", "a", "c", "d", "g", "i", "m", "p"]),
            ("2", vec!["a", "b", "c", "f", "l", "m", "o"]),
            ("3", vec!["b", "f", "h", "j", "o"]),
            ("4", vec!["b", "c", "k", "s", "p"]),
            ("5", vec!["a", "f", "c", "e", "l", "p", "m", "n"]),
        ])
        .unwrap()
    }

    #[test]
    fn tree_links_same_item_nodes() {
        let m = matrix();
        let counts = m.item_support_counts();
        let (g2l, orig) = process_item_counts(&counts, 3).unwrap();
        // f:4 c:4 a:3 b:3 m:3 p:3, ties broken by column order
        let names: Vec<&str> = orig.iter().map(|&c| m.item_name(c).unwrap()).collect();
        assert_eq!(names, vec!["c", "f", "a", "b", "m", "p"]);

        let tree = build_tree(&m, &g2l, orig);
        assert!(!tree.is_path());
        for local in 0..tree.num_items() as u32 {
            let col = tree.original_items[local as usize];
            assert_eq!(tree.item_support(local), counts[col as usize]);
            assert!(tree.node_links(local).all(|n| n.item == local));
        }
        // p hangs off two different branches
        assert_eq!(tree.node_links(5).count(), 2);
    }

    #[test]
    fn conditional_tree_keeps_only_frequent_prefix_items() {
        let m = matrix();
        let (g2l, orig) = process_item_counts(&m.item_support_counts(), 3).unwrap();
        let tree = build_tree(&m, &g2l, orig);
        // m (local 4) co-occurs with c, f, a in all three of its baskets
        let cond = tree.conditional_tree(4, 3);
        assert!(cond.is_path());
        let names: Vec<&str> = cond.original_items.iter().map(|&c| m.item_name(c).unwrap()).collect();
        assert_eq!(names, vec!["c", "f", "a"]);
        assert_eq!(cond.cond_items, vec![m.item_id("m").unwrap()]);
    }

    #[test]
    fn matches_apriori() {
        let m = matrix();
        for min_support in [0.2, 0.4, 0.6, 0.8, 1.0] {
            let fp = FpGrowth::new().run(&m, min_support).unwrap();
            let ap = Apriori::new().mine(&m, min_support).unwrap();
            assert_eq!(fp, ap, "min_support = {min_support}");
        }
    }

    #[test]
    fn max_len_truncation_matches_apriori() {
        let m = matrix();
        for max_len in 1..=5 {
            let fp = FpGrowth::new().with_max_len(max_len).run(&m, 0.6).unwrap();
            let ap = Apriori::new().with_max_len(max_len).mine(&m, 0.6).unwrap();
            assert_eq!(fp, ap, "max_len = {max_len}");
            assert!(fp.longest() <= max_len);
        }
        // {c, f, a, m} is frequent at 0.6, so a cap of 3 is partial and 4 is not
        assert!(FpGrowth::new().with_max_len(3).run(&m, 0.6).unwrap().is_truncated());
        assert!(!FpGrowth::new().with_max_len(4).run(&m, 0.6).unwrap().is_truncated());
    }

    #[test]
    fn rejects_bad_thresholds() {
        let m = matrix();
        assert!(matches!(FpGrowth::new().run(&m, 0.0), Err(MiningError::InvalidThreshold { .. })));
        assert!(matches!(
            FpGrowth::new().with_max_len(0).run(&m, 0.5),
            Err(MiningError::InvalidThreshold { name: "max_len", .. })
        ));
    }
}

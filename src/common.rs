use rayon::prelude::*;

/// Compute per-item support counts from a binarised row dataset.
/// `rows` holds the present column indices of each transaction.
/// Returns a Vec where `result[item] = count of rows containing item`.
/// Each rayon worker folds into its own vector; the vectors are summed once.
pub fn count_item_support(rows: &[Vec<u32>], n_items: usize) -> Vec<u64> {
    rows.par_iter()
        .fold(
            || vec![0u64; n_items],
            |mut acc, row| {
                for &item in row {
                    if (item as usize) < n_items {
                        acc[item as usize] += 1;
                    }
                }
                acc
            },
        )
        .reduce(
            || vec![0u64; n_items],
            |mut a, b| {
                for (x, y) in a.iter_mut().zip(b.iter()) {
                    *x += y;
                }
                a
            },
        )
}

/// Smallest transaction count whose relative support reaches `min_support`.
///
/// `ceil(min_support * n)` alone over-shoots when the product picks up
/// rounding error (0.3 * 10 = 3.0000000000000004), so the candidate is
/// stepped back while the smaller count still qualifies.
pub fn min_count_for(min_support: f64, n_transactions: usize) -> u64 {
    let n = n_transactions as f64;
    let mut count = (min_support * n).ceil().max(1.0) as u64;
    while count > 1 && (count - 1) as f64 / n >= min_support {
        count -= 1;
    }
    count
}

/// `needle ⊆ haystack` for two ascending slices.
#[inline]
pub fn is_sorted_subset(needle: &[u32], haystack: &[u32]) -> bool {
    if needle.len() > haystack.len() {
        return false;
    }
    let mut h = haystack.iter();
    'outer: for &x in needle {
        for &y in h.by_ref() {
            if y == x {
                continue 'outer;
            }
            if y > x {
                return false;
            }
        }
        return false;
    }
    true
}

/// Lexicographic k-combinations of `items`, as owned vectors.
pub fn combinations<T: Copy>(items: &[T], size: usize) -> impl Iterator<Item = Vec<T>> + '_ {
    let n = items.len();
    let mut indices: Vec<usize> = (0..size).collect();
    let mut first = true;

    std::iter::from_fn(move || {
        if size == 0 || n < size {
            return None;
        }
        if !first {
            let mut i = size as isize - 1;
            while i >= 0 {
                if indices[i as usize] < n - size + i as usize {
                    break;
                }
                i -= 1;
            }
            if i < 0 {
                return None;
            }
            let idx = i as usize;
            indices[idx] += 1;
            for j in (idx + 1)..size {
                indices[j] = indices[j - 1] + 1;
            }
        } else {
            first = false;
        }
        Some(indices.iter().map(|&i| items[i]).collect())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_items_across_rows() {
        let rows = vec![vec![0, 1], vec![0, 1, 2], vec![1], vec![0, 2], vec![]];
        assert_eq!(count_item_support(&rows, 3), vec![3, 3, 2]);
    }

    #[test]
    fn min_count_survives_rounding() {
        assert_eq!(min_count_for(0.3, 10), 3);
        assert_eq!(min_count_for(0.5, 4), 2);
        assert_eq!(min_count_for(0.51, 4), 3);
        assert_eq!(min_count_for(1.0, 7), 7);
        assert_eq!(min_count_for(1e-9, 7), 1);
    }

    #[test]
    fn subset_on_sorted_slices() {
        assert!(is_sorted_subset(&[], &[1, 2]));
        assert!(is_sorted_subset(&[1, 3], &[0, 1, 2, 3]));
        assert!(!is_sorted_subset(&[1, 4], &[0, 1, 2, 3]));
        assert!(!is_sorted_subset(&[0, 1, 2], &[0, 1]));
    }

    #[test]
    fn combinations_in_lexicographic_order() {
        let got: Vec<Vec<u32>> = combinations(&[1u32, 2, 3], 2).collect();
        assert_eq!(got, vec![vec![1, 2], vec![1, 3], vec![2, 3]]);
        assert_eq!(combinations(&[1u32, 2], 3).count(), 0);
        assert_eq!(combinations(&[1u32, 2], 0).count(), 0);
    }
}

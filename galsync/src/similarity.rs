//! Case-insensitive sequence-matcher similarity
//!
//! `ratio = 2·M / T`, where `T` is the combined character count and `M` the
//! number of characters in the matching blocks. Blocks are found by taking
//! the longest common substring (earliest in `a`, then earliest in `b`, on
//! ties) and recursing on both sides of it. Popular-character junk
//! heuristics are not applied.

use std::collections::HashMap;

/// Similarity of two strings in `[0, 1]` after lowercasing both
pub fn ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().flat_map(char::to_lowercase).collect();
    let b: Vec<char> = b.chars().flat_map(char::to_lowercase).collect();

    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let matched = SequenceMatcher::new(&a, &b).matching_characters();
    2.0 * matched as f64 / total as f64
}

struct SequenceMatcher<'a> {
    a: &'a [char],
    b: &'a [char],
    /// Positions of each character in `b`, ascending
    b_index: HashMap<char, Vec<usize>>,
}

impl<'a> SequenceMatcher<'a> {
    fn new(a: &'a [char], b: &'a [char]) -> Self {
        let mut b_index: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, c) in b.iter().enumerate() {
            b_index.entry(*c).or_default().push(j);
        }
        Self { a, b, b_index }
    }

    /// Total size of all matching blocks
    fn matching_characters(&self) -> usize {
        let mut pending = vec![(0, self.a.len(), 0, self.b.len())];
        let mut matched = 0;

        while let Some((alo, ahi, blo, bhi)) = pending.pop() {
            let (i, j, size) = self.longest_match(alo, ahi, blo, bhi);
            if size == 0 {
                continue;
            }
            matched += size;
            if alo < i && blo < j {
                pending.push((alo, i, blo, j));
            }
            if i + size < ahi && j + size < bhi {
                pending.push((i + size, ahi, j + size, bhi));
            }
        }

        matched
    }

    /// Longest common run within `a[alo..ahi]` and `b[blo..bhi]`
    fn longest_match(&self, alo: usize, ahi: usize, blo: usize, bhi: usize) -> (usize, usize, usize) {
        let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
        // run length of the match ending at b[j], for the previous row of a
        let mut run_ending: HashMap<usize, usize> = HashMap::new();

        for i in alo..ahi {
            let mut next_run: HashMap<usize, usize> = HashMap::new();
            if let Some(positions) = self.b_index.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let k = j
                        .checked_sub(1)
                        .and_then(|prev| run_ending.get(&prev))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    next_run.insert(j, k);
                    if k > best_size {
                        best_i = i + 1 - k;
                        best_j = j + 1 - k;
                        best_size = k;
                    }
                }
            }
            run_ending = next_run;
        }

        (best_i, best_j, best_size)
    }
}

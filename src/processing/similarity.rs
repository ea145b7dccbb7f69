//! Ratcliff/Obershelp string similarity.
//!
//! `ratio` returns `2 * M / T` where `M` is the number of characters in the
//! matching blocks found by repeatedly taking the longest common substring and
//! recursing on both sides, and `T` the total number of characters. Two empty
//! strings are identical (1.0).

/// Similarity in `[0, 1]` of two strings, compared character by character.
pub fn ratio(a: &str, b: &str) -> f32 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matching_characters(&a, &b) as f32 / total as f32
}

/// Case-insensitive variant used for label lookups.
pub fn ratio_lowercase(a: &str, b: &str) -> f32 {
    ratio(&a.to_lowercase(), &b.to_lowercase())
}

fn matching_characters(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, size) = longest_match(a, b, alo, ahi, blo, bhi);
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

/// Longest common run of `a[alo..ahi]` and `b[blo..bhi]`; the earliest in `a`
/// wins ties, then the earliest in `b`.
fn longest_match(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
    // run length ending at (previous i, j)
    let mut prev = vec![0usize; bhi - blo + 1];

    for i in alo..ahi {
        let mut current = vec![0usize; bhi - blo + 1];
        for j in blo..bhi {
            if a[i] != b[j] {
                continue;
            }
            let k = prev[j - blo] + 1;
            current[j - blo + 1] = k;
            if k > best_size {
                best_i = i + 1 - k;
                best_j = j + 1 - k;
                best_size = k;
            }
        }
        prev = current;
    }
    (best_i, best_j, best_size)
}

//! Finding similarity (§4.5 Step 1): four weighted string/location
//! components combined into a single score in `[0,1]`, with the two
//! boost rules.

use crate::config::SimilarityWeights;
use crate::constants::{DEFAULT_CATEGORY_SEVERITY_BOOST, DEFAULT_SAME_FILE_CLAMP_LINE_DELTA};
use crate::models::Finding;

/// Levenshtein edit distance between two strings, in characters.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (n, m) = (a.len(), b.len());
    if n == 0 {
        return m;
    }
    if m == 0 {
        return n;
    }

    let mut prev: Vec<usize> = (0..=m).collect();
    let mut curr = vec![0usize; m + 1];

    for i in 1..=n {
        curr[0] = i;
        for j in 1..=m {
            let cost = if a[i - 1] == b[j - 1] { 0 } else { 1 };
            curr[j] = (prev[j] + 1).min(curr[j - 1] + 1).min(prev[j - 1] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[m]
}

/// String similarity normalized by the longer string's length; two
/// empty strings are identical.
fn string_similarity(a: &str, b: &str) -> f64 {
    let max_len = a.chars().count().max(b.chars().count());
    if max_len == 0 {
        return 1.0;
    }
    1.0 - (levenshtein(a, b) as f64 / max_len as f64)
}

/// `1 − min(|Δline|, 5)/5`, zero beyond 5 lines.
fn location_similarity(line_a: u32, line_b: u32) -> f64 {
    let delta = (line_a as i64 - line_b as i64).unsigned_abs();
    let clamp = DEFAULT_SAME_FILE_CLAMP_LINE_DELTA.unsigned_abs();
    1.0 - (delta.min(clamp) as f64 / clamp as f64)
}

/// Pairwise similarity `S(f1, f2) ∈ [0,1]` (§4.5 Step 1).
pub fn similarity(a: &Finding, b: &Finding, weights: &SimilarityWeights) -> f64 {
    let file_sim = string_similarity(&a.file_path, &b.file_path);
    let rule_sim = string_similarity(&a.rule_id, &b.rule_id);
    let title_sim = string_similarity(&a.title, &b.title);
    let loc_sim = location_similarity(a.line, b.line);

    let mut score =
        file_sim * weights.file + rule_sim * weights.rule + title_sim * weights.title + loc_sim * weights.location;

    if a.category == b.category && a.severity == b.severity {
        score += DEFAULT_CATEGORY_SEVERITY_BOOST;
    }

    let same_file = a.file_path == b.file_path;
    let near_line = (a.line as i64 - b.line as i64).abs() <= DEFAULT_SAME_FILE_CLAMP_LINE_DELTA;
    if same_file && near_line {
        score = 1.0;
    }

    score.clamp(0.0, 1.0)
}

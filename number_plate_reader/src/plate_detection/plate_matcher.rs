//! Fuzzy matching of recognized text against the known plates.
//!
//! The score is the classic sequence matching ratio `2 * M / T`, where `M`
//! counts the characters covered by the recursively found longest matching
//! blocks and `T` is the combined length of both strings. The acceptance
//! threshold is tuned against this exact score, so the block search below
//! follows the reference algorithm step by step, including its tie-breaks
//! and its "popular element" pruning for long second sequences.

use std::collections::HashMap;

/// Second sequences at least this long drop their popular elements.
const POPULAR_MIN_LEN: usize = 200;

/// Ordered list of known plates. Earlier entries win ties.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlateRegistry {
    plates: Vec<String>,
}

impl PlateRegistry {
    pub fn new<I, S>(plates: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            plates: plates.into_iter().map(Into::into).collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.plates.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.plates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plates.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched_plate: Option<String>,
    pub similarity: f64,
}

impl MatchResult {
    pub fn none() -> Self {
        Self {
            matched_plate: None,
            similarity: 0.0,
        }
    }
}

/// Returns the registry entry most similar to `candidate`.
///
/// Only a strictly better score replaces the current best, so the first of
/// several equally similar plates is kept. A candidate that shares nothing
/// with any plate yields [`MatchResult::none`].
pub fn best_match(candidate: &str, registry: &PlateRegistry) -> MatchResult {
    if candidate.is_empty() {
        return MatchResult::none();
    }

    let candidate: Vec<char> = candidate.chars().collect();
    let mut best = MatchResult::none();
    for plate in registry.iter() {
        let plate_chars: Vec<char> = plate.chars().collect();
        let similarity = SequenceMatcher::new(&candidate, &plate_chars).ratio();
        if similarity > best.similarity {
            best = MatchResult {
                matched_plate: Some(plate.to_string()),
                similarity,
            };
        }
    }
    best
}

/// Similarity of `a` to `b` in `[0, 1]`. Two empty strings are identical.
///
/// The score is not symmetric for every input: block tie-breaks depend on
/// which string is scanned first.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    SequenceMatcher::new(&a, &b).ratio()
}

struct SequenceMatcher<'a> {
    a: &'a [char],
    b: &'a [char],
    /// Positions of every non-popular element of `b`, ascending.
    b2j: HashMap<char, Vec<usize>>,
}

impl<'a> SequenceMatcher<'a> {
    fn new(a: &'a [char], b: &'a [char]) -> Self {
        let mut b2j: HashMap<char, Vec<usize>> = HashMap::new();
        for (j, element) in b.iter().enumerate() {
            b2j.entry(*element).or_default().push(j);
        }

        if b.len() >= POPULAR_MIN_LEN {
            let max_count = b.len() / 100 + 1;
            b2j.retain(|_, positions| positions.len() <= max_count);
        }

        Self { a, b, b2j }
    }

    fn ratio(&self) -> f64 {
        let total = self.a.len() + self.b.len();
        if total == 0 {
            return 1.0;
        }
        2.0 * self.matching_characters() as f64 / total as f64
    }

    fn matching_characters(&self) -> usize {
        let mut pending = vec![(0, self.a.len(), 0, self.b.len())];
        let mut matched = 0;

        while let Some((alo, ahi, blo, bhi)) = pending.pop() {
            let (i, j, size) = self.find_longest_match(alo, ahi, blo, bhi);
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

    /// Longest block `a[i..i+size] == b[j..j+size]` inside the given ranges.
    /// Among equally long blocks the one starting earliest in `a`, then in
    /// `b`, is returned.
    fn find_longest_match(
        &self,
        alo: usize,
        ahi: usize,
        blo: usize,
        bhi: usize,
    ) -> (usize, usize, usize) {
        let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);

        // Length of the match ending at b[j] for the previous row of a.
        let mut j2len: HashMap<usize, usize> = HashMap::new();
        for i in alo..ahi {
            let mut next_j2len = HashMap::new();
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                for &j in positions {
                    if j < blo {
                        continue;
                    }
                    if j >= bhi {
                        break;
                    }
                    let size = j
                        .checked_sub(1)
                        .and_then(|prev| j2len.get(&prev))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    next_j2len.insert(j, size);
                    if size > best_size {
                        best_i = i + 1 - size;
                        best_j = j + 1 - size;
                        best_size = size;
                    }
                }
            }
            j2len = next_j2len;
        }

        // Popular elements are absent from b2j, grow the block over them.
        while best_i > alo && best_j > blo && self.a[best_i - 1] == self.b[best_j - 1] {
            best_i -= 1;
            best_j -= 1;
            best_size += 1;
        }
        while best_i + best_size < ahi
            && best_j + best_size < bhi
            && self.a[best_i + best_size] == self.b[best_j + best_size]
        {
            best_size += 1;
        }

        (best_i, best_j, best_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> PlateRegistry {
        PlateRegistry::new(["MC-RL04", "AB-1234", "XYZ-7890"])
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-12,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn exact_plate_is_a_perfect_match() {
        let result = best_match("AB-1234", &registry());
        assert_eq!(result.matched_plate.as_deref(), Some("AB-1234"));
        assert_eq!(result.similarity, 1.0);
    }

    #[test]
    fn empty_candidate_or_registry_matches_nothing() {
        assert_eq!(best_match("", &registry()), MatchResult::none());
        assert_eq!(
            best_match("AB-1234", &PlateRegistry::new(Vec::<String>::new())),
            MatchResult::none()
        );
    }

    #[test]
    fn candidate_without_common_characters_matches_nothing() {
        assert_eq!(best_match("QQQQ", &registry()), MatchResult::none());
    }

    #[test]
    fn ratios_agree_with_reference_values() {
        assert_close(similarity_ratio("AB-1243", "AB-1234"), 6.0 / 7.0);
        assert_close(similarity_ratio("A8-1234", "AB-1234"), 6.0 / 7.0);
        assert_close(similarity_ratio("AB-1234", "MC-RL04"), 2.0 / 7.0);
        assert_close(similarity_ratio("AB-1234", "XYZ-7890"), 2.0 / 15.0);
        assert_close(similarity_ratio("K-9", "XYZ-7890"), 4.0 / 11.0);
        assert_close(similarity_ratio("AB12", "ZZ12ZZ"), 0.4);
        assert_close(similarity_ratio("abcd", "bcda"), 0.75);
        assert_close(similarity_ratio("", ""), 1.0);
        assert_close(similarity_ratio("AB", ""), 0.0);
    }

    #[test]
    fn ratio_depends_on_argument_order_for_crossed_blocks() {
        assert_close(similarity_ratio("tide", "diet"), 0.25);
        assert_close(similarity_ratio("diet", "tide"), 0.5);
    }

    #[test]
    fn popular_elements_of_long_plates_are_pruned() {
        let long = "a".repeat(200);
        // Blocks still grow over pruned elements next to a match start.
        assert_close(similarity_ratio("aaaa", &long), 8.0 / 204.0);
        assert_close(similarity_ratio("baaa", &long), 0.0);
        // Below the length limit nothing is pruned.
        assert_close(similarity_ratio("baaa", &"a".repeat(199)), 6.0 / 203.0);
    }

    #[test]
    fn first_plate_wins_a_tie() {
        let registry = PlateRegistry::new(["AB-1299", "AB-1288"]);
        let result = best_match("AB-12", &registry);

        assert_eq!(result.matched_plate.as_deref(), Some("AB-1299"));
        assert_close(result.similarity, 10.0 / 12.0);

        let reversed = PlateRegistry::new(["AB-1288", "AB-1299"]);
        assert_eq!(
            best_match("AB-12", &reversed).matched_plate.as_deref(),
            Some("AB-1288")
        );
    }

    #[test]
    fn best_of_several_partial_matches_is_returned() {
        let result = best_match("ZZ-12", &registry());
        assert_eq!(result.matched_plate.as_deref(), Some("AB-1234"));
        assert_close(result.similarity, 0.5);
    }

    #[test]
    fn characters_are_compared_as_unicode_scalars() {
        assert_close(similarity_ratio("ÄB-1", "ÄB-2"), 0.75);
    }
}

//! Bias-resistant scheduling
//!
//! Runners never execute benchmarks in catalog order. Every suite run draws a
//! fresh random order in which each benchmark appears `iterations` times, and
//! every scheduled occurrence runs the revision tags in a fresh random order.
//! Drift over time (thermal, caches, background load) therefore shows up as
//! noise instead of as a difference between benchmarks or revisions.
//!
//! The module also covers how benchmark names map to `go test -bench`
//! patterns, where every `/`-separated segment is matched on its own.

use rand::Rng;
use regex::Regex;

/// Shuffles `items` in place (Durstenfeld's variant of Fisher-Yates)
///
/// For every position `i` from the end down to 1 a position `j` is drawn
/// uniformly from `[0, i]` and the two are swapped.
pub fn fisher_yates<T, R: Rng + ?Sized>(items: &mut [T], rng: &mut R) {
    for i in (1..items.len()).rev() {
        let j = rng.random_range(0..=i);
        items.swap(i, j);
    }
}

/// Random sequence containing each index of `0..n` exactly `k` times
///
/// Returns an empty sequence when `n` or `k` is zero.
pub fn extended_permutation<R: Rng + ?Sized>(n: usize, k: usize, rng: &mut R) -> Vec<usize> {
    let mut order: Vec<usize> = (0..n * k).map(|m| m % n).collect();
    fisher_yates(&mut order, rng);
    order
}

/// Turns a benchmark name into a pattern that selects this benchmark only
///
/// `go test -bench` splits its pattern on `/` and matches every segment as an
/// independent, unanchored expression against the corresponding level of the
/// benchmark name. Each segment is therefore quoted and anchored on its own;
/// anchoring the whole name once would still select `BenchmarkAB` for
/// `BenchmarkA` or `A/BX` for `A/B`.
pub fn mask_name_to_pattern(name: &str) -> String {
    regex::escape(name)
        .split('/')
        .map(|segment| format!("^{segment}$"))
        .collect::<Vec<_>>()
        .join("/")
}

/// A compiled `-bench` style filter
#[derive(Debug, Clone)]
pub struct NameFilter {
    segments: Vec<Regex>,
}

impl NameFilter {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        let segments = split_pattern(pattern)
            .into_iter()
            .map(Regex::new)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { segments })
    }

    /// Whether `name` is selected by the filter
    ///
    /// Every pattern segment must find a match in the name segment at the
    /// same level. Names with fewer levels than the pattern are not selected.
    pub fn matches(&self, name: &str) -> bool {
        let levels: Vec<&str> = name.split('/').collect();
        if levels.len() < self.segments.len() {
            return false;
        }
        self.segments
            .iter()
            .zip(levels)
            .all(|(segment, level)| segment.is_match(level))
    }
}

/// Convenience wrapper compiling `pattern` for a single check
pub fn pattern_matches(pattern: &str, name: &str) -> Result<bool, regex::Error> {
    Ok(NameFilter::new(pattern)?.matches(name))
}

/// Splits a pattern on `/` outside of brackets and parentheses
fn split_pattern(pattern: &str) -> Vec<&str> {
    let bytes = pattern.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;
    let mut brackets = 0usize;
    let mut parens = 0isize;
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'[' => brackets += 1,
            b']' => brackets = brackets.saturating_sub(1),
            b'(' if brackets == 0 => parens += 1,
            b')' if brackets == 0 => parens -= 1,
            b'\\' => i += 1,
            b'/' if brackets == 0 && parens == 0 => {
                segments.push(&pattern[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    segments.push(&pattern[start.min(pattern.len())..]);
    segments
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_extended_permutation_multiplicity() {
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        for n in 1..8 {
            for k in 1..5 {
                let order = extended_permutation(n, k, &mut rng);
                assert_eq!(order.len(), n * k);
                for index in 0..n {
                    assert_eq!(order.iter().filter(|&&i| i == index).count(), k);
                }
            }
        }
    }

    #[test]
    fn test_extended_permutation_empty() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert!(extended_permutation(0, 3, &mut rng).is_empty());
        assert!(extended_permutation(3, 0, &mut rng).is_empty());
    }

    #[test]
    fn test_extended_permutation_is_shuffled() {
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let firsts: Vec<usize> = (0..200)
            .map(|_| extended_permutation(4, 2, &mut rng)[0])
            .collect();
        assert!(firsts.iter().any(|&first| first != 0));

        // single benchmark scheduled twice: the only multiset arrangement
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        assert_eq!(extended_permutation(1, 2, &mut rng), vec![0, 0]);
    }

    #[test]
    fn test_fisher_yates_reaches_every_arrangement() {
        let mut rng = ChaCha8Rng::seed_from_u64(11);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..500 {
            let mut items = ["a", "b", "c"];
            fisher_yates(&mut items, &mut rng);
            seen.insert(items);
        }
        assert_eq!(seen.len(), 6);
    }

    #[test]
    fn test_fisher_yates_keeps_elements() {
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let mut tags = vec!["v1".to_string(), "v2".to_string(), "v3".to_string()];
        fisher_yates(&mut tags, &mut rng);
        tags.sort();
        assert_eq!(tags, vec!["v1", "v2", "v3"]);
    }

    #[test]
    fn test_mask_name_to_pattern() {
        assert_eq!(mask_name_to_pattern("BenchmarkA"), "^BenchmarkA$");
        assert_eq!(mask_name_to_pattern("A/B"), "^A$/^B$");
        assert_eq!(
            mask_name_to_pattern("BenchmarkSort/size=10.5"),
            "^BenchmarkSort$/^size=10\\.5$"
        );
    }

    #[test]
    fn test_masked_pattern_selects_only_its_benchmark() {
        let pattern = mask_name_to_pattern("A/B");
        assert!(pattern_matches(&pattern, "A/B").unwrap());
        assert!(!pattern_matches(&pattern, "AX/B").unwrap());
        assert!(!pattern_matches(&pattern, "A/BX").unwrap());
        assert!(!pattern_matches(&pattern, "XA/B").unwrap());
        assert!(!pattern_matches(&pattern, "A").unwrap());
    }

    #[test]
    fn test_masked_pattern_quotes_metacharacters() {
        let pattern = mask_name_to_pattern("BenchmarkRe/a+b(c)");
        assert!(pattern_matches(&pattern, "BenchmarkRe/a+b(c)").unwrap());
        assert!(!pattern_matches(&pattern, "BenchmarkRe/aab(c)").unwrap());
    }

    #[test]
    fn test_unanchored_filter() {
        let filter = NameFilter::new("Parse").unwrap();
        assert!(filter.matches("BenchmarkParseJSON"));
        assert!(filter.matches("BenchmarkParseJSON/small"));
        assert!(!filter.matches("BenchmarkEncode"));

        let all = NameFilter::new(".").unwrap();
        assert!(all.matches("BenchmarkAnything"));
    }

    #[test]
    fn test_split_pattern_respects_groups() {
        assert_eq!(split_pattern("a/b"), vec!["a", "b"]);
        assert_eq!(split_pattern("(a/b)"), vec!["(a/b)"]);
        assert_eq!(split_pattern("[/]x/y"), vec!["[/]x", "y"]);
        assert_eq!(split_pattern(r"a\/b"), vec![r"a\/b"]);
    }

    #[test]
    fn test_invalid_filter() {
        assert!(NameFilter::new("(unclosed").is_err());
    }
}

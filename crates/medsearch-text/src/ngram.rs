use std::collections::HashSet;

/// Punctuation dropped before windowing.
const IGNORED_CHARS: [char; 4] = ['、', '，', '。', ' '];

/// Character n-grams of `s` as a set.
///
/// A string shorter than `n` characters yields itself; an empty string yields
/// nothing.
pub fn char_ngrams(s: &str, n: usize) -> HashSet<String> {
    let chars: Vec<char> = s.chars().filter(|c| !IGNORED_CHARS.contains(c)).collect();
    if chars.is_empty() {
        return HashSet::new();
    }
    if n == 0 || chars.len() < n {
        return HashSet::from([chars.into_iter().collect()]);
    }
    chars.windows(n).map(|w| w.iter().collect()).collect()
}

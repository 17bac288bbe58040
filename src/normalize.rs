//! Canonical token form for chart labels, app names and path hints.
//!
//! All four vocabularies pass through the same `Normalizer` so they compare
//! on equal terms.
use crate::config::SyncConfig;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

/// Lower-cased tokens with noise and trailing version parts removed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct TokenSet {
    tokens: Vec<String>,
}

impl TokenSet {
    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    /// Joined form used as the index key.
    pub fn key(&self) -> String {
        self.tokens.join("-")
    }

    pub fn as_set(&self) -> BTreeSet<&str> {
        self.tokens.iter().map(String::as_str).collect()
    }

    /// True when every token of `self` appears in `other`.
    pub fn is_subset_of(&self, other: &TokenSet) -> bool {
        let other = other.as_set();
        !self.tokens.is_empty() && self.tokens.iter().all(|token| other.contains(token.as_str()))
    }
}

/// Pure identifier canonicalizer.
#[derive(Debug, Clone)]
pub struct Normalizer {
    noise: BTreeSet<String>,
    aliases: BTreeMap<String, String>,
    version: Regex,
    hash: Regex,
}

impl Normalizer {
    pub fn new<I, S>(noise_tokens: I, aliases: BTreeMap<String, String>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let noise = noise_tokens
            .into_iter()
            .map(|token| token.as_ref().trim().to_ascii_lowercase())
            .filter(|token| !token.is_empty())
            .collect();
        let aliases = aliases
            .into_iter()
            .map(|(from, to)| (from.trim().to_ascii_lowercase(), to))
            .collect();
        Self {
            noise,
            aliases,
            version: Regex::new(r"^v?\d+(\.\d+)*$").expect("regex for version tokens"),
            hash: Regex::new(r"^(\d+(\.\d+)*_)?[0-9a-f]{7,}$").expect("regex for hash tokens"),
        }
    }

    pub fn from_config(config: &SyncConfig) -> Self {
        Self::new(&config.noise_tokens, config.aliases.clone())
    }

    /// Canonicalize `raw`. Never fails; unusable input yields an empty set.
    pub fn normalize(&self, raw: &str) -> TokenSet {
        let lowered = raw.trim().to_lowercase();
        let mut tokens: Vec<String> = lowered
            .split(['-', '_'])
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .map(str::to_string)
            .collect();
        // "collabora-online-1.1.41_6eb338d50269" splits into a version and a hash.
        while tokens.len() > 1 {
            let Some(last) = tokens.last() else {
                break;
            };
            if self.is_version_like(last) {
                tokens.pop();
            } else {
                break;
            }
        }
        tokens.retain(|token| !self.noise.contains(token));
        let key = tokens.join("-");
        if let Some(alias) = self.aliases.get(&key) {
            tokens = alias
                .to_lowercase()
                .split(['-', '_'])
                .filter(|token| !token.is_empty())
                .map(str::to_string)
                .collect();
        }
        TokenSet { tokens }
    }

    fn is_version_like(&self, token: &str) -> bool {
        if self.version.is_match(token) {
            return true;
        }
        self.hash.is_match(token) && token.chars().any(|ch| ch.is_ascii_digit())
    }
}

/// Classic Levenshtein distance over chars.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            current[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(current[j] + 1);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

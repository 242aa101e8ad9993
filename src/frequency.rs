//! Word frequency accumulator used by the client.

use std::collections::BTreeMap;

/// Word to occurrence count, kept ordered by word for reporting.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FrequencyTable {
    counts: BTreeMap<String, u64>,
}

impl FrequencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one occurrence of `word`.
    pub fn record(&mut self, word: &str) {
        match self.counts.get_mut(word) {
            Some(count) => *count += 1,
            None => {
                self.counts.insert(word.to_string(), 1);
            }
        }
    }

    /// Count every word of a page.
    pub fn record_all<'a>(&mut self, words: impl IntoIterator<Item = &'a str>) {
        for word in words {
            self.record(word);
        }
    }

    /// All `(word, count)` pairs in lexicographic word order.
    pub fn snapshot(&self) -> Vec<(&str, u64)> {
        self.counts
            .iter()
            .map(|(word, count)| (word.as_str(), *count))
            .collect()
    }

    /// Number of distinct words.
    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Sum of all counts.
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }
}

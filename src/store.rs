//! Immutable word store.
//!
//! Holds the word sequence loaded at startup and answers page queries.
//! The store never changes after construction, so a single `Arc<WordStore>`
//! can back any number of sessions.

use crate::protocol::PageResponse;
use std::io::BufRead;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Read-only ordered word sequence.
#[derive(Debug, Default)]
pub struct WordStore {
    words: Vec<String>,
}

impl WordStore {
    /// Create a store over an already loaded word sequence.
    pub fn new(words: Vec<String>) -> Arc<Self> {
        info!(words = words.len(), "Initializing word store");
        Arc::new(Self { words })
    }

    /// Load the word sequence from the first line of `path`.
    pub fn from_file(path: &Path) -> std::io::Result<Arc<Self>> {
        let file = std::fs::File::open(path)?;
        let mut line = String::new();
        std::io::BufReader::new(file).read_line(&mut line)?;

        info!(path = %path.display(), "Loaded word file");
        Ok(Self::new(parse_words(&line)))
    }

    /// Number of words held.
    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Answer a page query.
    ///
    /// Returns up to `count` words starting at `offset`. The page is marked
    /// end-of-stream once `offset + count` reaches the end of the sequence,
    /// including when `offset` is already past it.
    pub fn serve(&self, offset: usize, count: usize) -> PageResponse {
        let total = self.words.len();
        let start = offset.min(total);
        let end = offset.saturating_add(count).min(total);

        PageResponse {
            words: self.words[start..end].to_vec(),
            end_of_stream: offset.saturating_add(count) >= total,
        }
    }
}

/// Split a comma-separated line into words, dropping empty tokens.
pub fn parse_words(line: &str) -> Vec<String> {
    line.split(',')
        .map(str::trim)
        .filter(|word| !word.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{decode_response, encode_response};
    use bytes::BytesMut;
    use std::io::Write;

    fn store(words: &[&str]) -> Arc<WordStore> {
        WordStore::new(words.iter().map(|w| w.to_string()).collect())
    }

    #[test]
    fn test_serve_middle_page() {
        let store = store(&["a", "b", "a", "c", "b", "a"]);

        let page = store.serve(2, 2);
        assert_eq!(page.words, vec!["a", "c"]);
        assert!(!page.end_of_stream);
    }

    #[test]
    fn test_serve_last_page() {
        let store = store(&["a", "b", "a", "c", "b", "a"]);

        let page = store.serve(4, 2);
        assert_eq!(page.words, vec!["b", "a"]);
        assert!(page.end_of_stream);
    }

    #[test]
    fn test_serve_step_larger_than_sequence() {
        let store = store(&["x", "y", "z"]);

        let page = store.serve(0, 10);
        assert_eq!(page.words, vec!["x", "y", "z"]);
        assert!(page.end_of_stream);
    }

    #[test]
    fn test_serve_past_end_is_bare_sentinel() {
        let store = store(&["x", "y", "z"]);

        for offset in [3, 4, 100, usize::MAX] {
            let page = store.serve(offset, 2);
            assert!(page.words.is_empty());
            assert!(page.end_of_stream);
        }
    }

    #[test]
    fn test_serve_empty_store() {
        let store = store(&[]);
        assert!(store.is_empty());

        let page = store.serve(0, 5);
        assert!(page.words.is_empty());
        assert!(page.end_of_stream);
    }

    #[test]
    fn test_serve_huge_count_does_not_overflow() {
        let store = store(&["x", "y"]);

        let page = store.serve(1, usize::MAX);
        assert_eq!(page.words, vec!["y"]);
        assert!(page.end_of_stream);
    }

    #[test]
    fn test_serve_zero_count_before_end() {
        let store = store(&["x", "y"]);

        let page = store.serve(0, 0);
        assert!(page.words.is_empty());
        assert!(!page.end_of_stream);
    }

    #[test]
    fn test_end_of_stream_matches_returned_count() {
        let words = ["a", "b", "c", "d", "e", "f", "g"];
        let store = store(&words);

        for offset in 0..=words.len() + 1 {
            for count in 1..=words.len() + 1 {
                let page = store.serve(offset, count);
                assert_eq!(
                    page.end_of_stream,
                    offset + page.words.len() >= words.len(),
                    "offset={offset} count={count}"
                );
            }
        }
    }

    /// Page through `store` from offset 0, passing every page through the
    /// wire encoding, and return the words in arrival order plus the number
    /// of round trips.
    fn paginate(store: &WordStore, step: usize) -> (Vec<String>, usize) {
        let mut offset = 0;
        let mut seen = Vec::new();
        let mut pages = 0;

        loop {
            let mut frame = BytesMut::new();
            encode_response(&store.serve(offset, step), &mut frame);
            let page = decode_response(std::str::from_utf8(&frame).unwrap()).unwrap();

            pages += 1;
            seen.extend(page.words);
            if page.end_of_stream {
                return (seen, pages);
            }
            offset += step;
        }
    }

    #[test]
    fn test_pagination_visits_every_word_once_in_order() {
        let sequences = [
            vec![],
            vec!["x"],
            vec!["a", "b", "a", "c", "b", "a"],
            vec!["one", "two", "three", "four", "five", "six", "seven"],
        ];

        for sequence in sequences {
            let n = sequence.len();
            let store = store(&sequence);

            for step in [1, 2, n.max(1), n + 5] {
                let (seen, pages) = paginate(&store, step);
                assert_eq!(seen, sequence, "n={n} step={step}");
                assert!(pages <= n.div_ceil(step) + 1, "n={n} step={step} pages={pages}");
            }
        }
    }

    #[test]
    fn test_parse_words() {
        assert_eq!(parse_words("a,b, c ,d\r\n"), vec!["a", "b", "c", "d"]);
        assert_eq!(parse_words("a,,b,"), vec!["a", "b"]);
        assert!(parse_words("").is_empty());
        assert!(parse_words("\n").is_empty());
    }

    #[test]
    fn test_from_file_reads_first_line_only() {
        let path = std::env::temp_dir().join(format!(
            "wordpage-store-test-{}.txt",
            std::process::id()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "alpha,beta,gamma").unwrap();
        writeln!(file, "ignored,line").unwrap();
        drop(file);

        let store = WordStore::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(store.len(), 3);
        assert_eq!(store.serve(0, 3).words, vec!["alpha", "beta", "gamma"]);
    }

    #[test]
    fn test_from_file_missing() {
        let result = WordStore::from_file(Path::new("/nonexistent/wordpage/words.txt"));
        assert!(result.is_err());
    }
}

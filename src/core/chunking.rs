//! Word-level smoothing for streamed text.
//!
//! Upstream backends emit text deltas at arbitrary byte boundaries;
//! forwarding them raw makes the client render half-words. The chunker
//! rebuffers deltas and re-emits whole words (each carrying its
//! trailing whitespace), so the client sees steady word-by-word output
//! regardless of upstream chunk sizes.

/// Re-chunks a stream of text deltas into whole words.
#[derive(Debug, Default)]
pub struct WordChunker {
    buf: String,
}

impl WordChunker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a delta, returning the complete words now available.
    ///
    /// A word is complete once the whitespace that follows it has
    /// arrived; the final partial word stays buffered until `flush`.
    pub fn feed(&mut self, delta: &str) -> Vec<String> {
        self.buf.push_str(delta);

        let mut out = Vec::new();
        loop {
            // Find the end of the first run of whitespace that follows
            // non-whitespace content.
            let mut split_at = None;
            let mut seen_word = false;
            let mut in_space = false;
            for (i, c) in self.buf.char_indices() {
                if c.is_whitespace() {
                    if seen_word {
                        in_space = true;
                    }
                } else {
                    if in_space {
                        split_at = Some(i);
                        break;
                    }
                    seen_word = true;
                }
            }

            match split_at {
                Some(i) => {
                    let word: String = self.buf.drain(..i).collect();
                    out.push(word);
                }
                None => break,
            }
        }
        out
    }

    /// Drain whatever remains buffered (end of stream).
    pub fn flush(&mut self) -> Option<String> {
        if self.buf.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reassembles_split_words() {
        let mut chunker = WordChunker::new();
        assert!(chunker.feed("hel").is_empty());
        assert!(chunker.feed("lo ").is_empty());
        // "hello " completes only once the next word starts
        assert_eq!(chunker.feed("world"), vec!["hello ".to_string()]);
        assert_eq!(chunker.flush(), Some("world".to_string()));
    }

    #[test]
    fn test_multiple_words_in_one_delta() {
        let mut chunker = WordChunker::new();
        let words = chunker.feed("one two three");
        assert_eq!(words, vec!["one ".to_string(), "two ".to_string()]);
        assert_eq!(chunker.flush(), Some("three".to_string()));
    }

    #[test]
    fn test_concat_round_trips() {
        let mut chunker = WordChunker::new();
        let input = "The quick\nbrown  fox jumps";
        let mut rebuilt = String::new();
        for piece in chunker.feed(input) {
            rebuilt.push_str(&piece);
        }
        if let Some(tail) = chunker.flush() {
            rebuilt.push_str(&tail);
        }
        assert_eq!(rebuilt, input);
    }

    #[test]
    fn test_flush_empty() {
        let mut chunker = WordChunker::new();
        assert_eq!(chunker.flush(), None);
    }

    #[test]
    fn test_leading_whitespace_attaches_forward() {
        let mut chunker = WordChunker::new();
        assert!(chunker.feed("  hi").is_empty());
        assert_eq!(chunker.feed(" there"), vec!["  hi ".to_string()]);
        assert_eq!(chunker.flush(), Some("there".to_string()));
    }
}

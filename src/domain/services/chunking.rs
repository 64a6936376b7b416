use once_cell::sync::Lazy;
use regex::Regex;

/// Simple sentences splitter.
///
/// Simple regex:
/// - groups sentences finishing by .?! or if reaching the end of the content.
/// - removes sentences with less than 2 characters (ex: a `!` from several `!!!`)
pub fn split_sentences(content: &str) -> Vec<String> {
    static RE: Lazy<Regex> =
        Lazy::new(|| Regex::new(r"\s*(?P<sentence>[^.!?]*(?:[.!?]|$))").unwrap());
    RE.captures_iter(content)
        .map(|cap| cap["sentence"].to_string())
        .filter(|sentence| sentence.len() > 1)
        .collect()
}

/// Rough token count of a text: 1 token ~ 4 characters, rounded up
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Splits a document into bounded, sentence-aligned chunks sized for
/// embedding.
///
/// Sentences are greedily accumulated until the estimated token count would
/// exceed `max_tokens`; the overflowing sentence starts the next chunk. Each
/// new chunk is seeded with the trailing sentences of the previous one, up
/// to `overlap_tokens`, so neighbouring chunks share context. With
/// `overlap_tokens = 0` the concatenated output reproduces the sentence
/// sequence exactly.
#[derive(Debug, Clone, Copy)]
pub struct DocumentChunker {
    max_tokens: usize,
    overlap_tokens: usize,
}

impl DocumentChunker {
    pub fn new(max_tokens: usize, overlap_tokens: usize) -> Self {
        Self {
            max_tokens,
            overlap_tokens,
        }
    }

    #[tracing::instrument(name = "Chunking document", skip(self, content))]
    pub fn chunk(&self, content: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        // Sentences of the chunk being built, with their token estimates
        let mut current: Vec<(String, usize)> = Vec::new();
        let mut current_tokens = 0;
        // Sentences of `current` that were not seeded from the previous chunk
        let mut fresh_in_current = 0;

        for sentence in split_sentences(content) {
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }
            let tokens = estimate_tokens(sentence);

            // A chunk closes when the next sentence would overflow it, but
            // never before it holds at least one non-seeded sentence: a
            // sentence longer than the budget is emitted as its own
            // oversized chunk rather than split further.
            if !current.is_empty() && current_tokens + tokens > self.max_tokens {
                if fresh_in_current > 0 {
                    chunks.push(join_sentences(&current));
                    current = self.overlap_tail(&current);
                    current_tokens = current.iter().map(|(_, tokens)| *tokens).sum();
                    fresh_in_current = 0;
                }
            }

            current_tokens += tokens;
            current.push((sentence.to_string(), tokens));
            fresh_in_current += 1;
        }

        if fresh_in_current > 0 {
            chunks.push(join_sentences(&current));
        }

        chunks
    }

    /// Trailing sentences of a closed chunk fitting the overlap budget
    fn overlap_tail(&self, closed: &[(String, usize)]) -> Vec<(String, usize)> {
        let mut tail: Vec<(String, usize)> = Vec::new();
        let mut tail_tokens = 0;

        for (sentence, tokens) in closed.iter().rev() {
            if tail_tokens + tokens > self.overlap_tokens {
                break;
            }
            tail_tokens += tokens;
            tail.push((sentence.clone(), *tokens));
        }

        tail.reverse();
        tail
    }
}

fn join_sentences(sentences: &[(String, usize)]) -> String {
    sentences
        .iter()
        .map(|(sentence, _)| sentence.as_str())
        .collect::<Vec<&str>>()
        .join(" ")
}

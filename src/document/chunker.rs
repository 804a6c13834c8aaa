//! Size-bounded document chunking
//!
//! Text is packed greedily at the coarsest granularity that fits: paragraphs first, then
//! sentences of a paragraph that is too large on its own, then words of a sentence that is
//! too large on its own. Sizes are counted in chars. Only a single word longer than the
//! ceiling can produce an oversized chunk.

use serde::Serialize;

const PARAGRAPH_SEPARATOR: &str = "\n";
const SENTENCE_SEPARATOR: &str = " ";

const TERMINATORS: &[char] = &['.', '!', '?', '…'];
const FULL_WIDTH_TERMINATORS: &[char] = &['。', '！', '？'];
const CLOSERS: &[char] = &['"', '\'', '”', '’', ')', ']', '}', '»', '」', '』'];

/// One contiguous piece of a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DocumentChunk {
    index: usize,
    text: String,
}

impl DocumentChunk {
    /// Position in document order, starting at zero
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length in chars
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Splits `text` into ordered chunks of at most `max_chunk_size` chars.
///
/// A ceiling of zero is treated as one.
pub fn chunk(text: &str, max_chunk_size: usize) -> Vec<DocumentChunk> {
    let max = max_chunk_size.max(1);
    let mut packer = Packer::new(max);

    for paragraph in text.lines().map(str::trim).filter(|p| !p.is_empty()) {
        if char_len(paragraph) <= max {
            packer.push(paragraph, PARAGRAPH_SEPARATOR);
            continue;
        }

        let mut separator = PARAGRAPH_SEPARATOR;
        for sentence in sentences(paragraph) {
            if char_len(sentence) <= max {
                packer.push(sentence, separator);
            } else {
                let mut word_separator = separator;
                for word in sentence.split_whitespace() {
                    packer.push(word, word_separator);
                    word_separator = SENTENCE_SEPARATOR;
                }
            }
            separator = SENTENCE_SEPARATOR;
        }
    }

    packer
        .finish()
        .into_iter()
        .enumerate()
        .map(|(index, text)| DocumentChunk { index, text })
        .collect()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Greedy accumulator shared by all three granularities
struct Packer {
    max: usize,
    chunks: Vec<String>,
    current: String,
    current_len: usize,
}

impl Packer {
    fn new(max: usize) -> Self {
        Self {
            max,
            chunks: Vec::new(),
            current: String::new(),
            current_len: 0,
        }
    }

    /// Appends `piece`, joined by `separator` unless it starts a new chunk
    fn push(&mut self, piece: &str, separator: &str) {
        let piece_len = char_len(piece);

        if self.current.is_empty() {
            self.current.push_str(piece);
            self.current_len = piece_len;
            return;
        }

        let separator_len = char_len(separator);
        if self.current_len + separator_len + piece_len <= self.max {
            self.current.push_str(separator);
            self.current.push_str(piece);
            self.current_len += separator_len + piece_len;
        } else {
            self.flush();
            self.current.push_str(piece);
            self.current_len = piece_len;
        }
    }

    fn flush(&mut self) {
        if !self.current.is_empty() {
            self.chunks.push(std::mem::take(&mut self.current));
        }
        self.current_len = 0;
    }

    fn finish(mut self) -> Vec<String> {
        self.flush();
        self.chunks
    }
}

/// Sentence segmentation for Latin and CJK punctuation.
///
/// A sentence ends after a terminator run plus any closing quotes or brackets, when
/// followed by whitespace or the end of text. Full-width terminators end a sentence
/// without needing whitespace.
fn sentences(paragraph: &str) -> Vec<&str> {
    let mut result = Vec::new();
    let mut chars = paragraph.char_indices().peekable();
    let mut start = 0;

    while let Some((_, c)) = chars.next() {
        let full_width = FULL_WIDTH_TERMINATORS.contains(&c);
        if !full_width && !TERMINATORS.contains(&c) {
            continue;
        }

        while let Some(&(_, next)) = chars.peek() {
            if TERMINATORS.contains(&next)
                || FULL_WIDTH_TERMINATORS.contains(&next)
                || CLOSERS.contains(&next)
            {
                chars.next();
            } else {
                break;
            }
        }

        let end = chars.peek().map(|&(i, _)| i).unwrap_or(paragraph.len());
        let at_boundary = chars.peek().map_or(true, |&(_, next)| next.is_whitespace());

        if full_width || at_boundary {
            let sentence = paragraph[start..end].trim();
            if !sentence.is_empty() {
                result.push(sentence);
            }
            start = end;
        }
    }

    let tail = paragraph[start..].trim();
    if !tail.is_empty() {
        result.push(tail);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    fn texts(chunks: &[DocumentChunk]) -> Vec<&str> {
        chunks.iter().map(DocumentChunk::text).collect()
    }

    #[test]
    fn test_empty_input() {
        assert!(chunk("", 100).is_empty());
        assert!(chunk("  \n\n \t\n", 100).is_empty());
    }

    #[test]
    fn test_paragraphs_packed_with_newline() {
        let chunks = chunk("alpha\n\nbeta\ngamma", 100);
        assert_eq!(texts(&chunks), vec!["alpha\nbeta\ngamma"]);
        assert_eq!(chunks[0].index(), 0);
    }

    #[test]
    fn test_paragraph_overflow_starts_new_chunk() {
        let chunks = chunk("aaaa\nbbbb\ncccc", 9);
        assert_eq!(texts(&chunks), vec!["aaaa\nbbbb", "cccc"]);
        assert_eq!(chunks[1].index(), 1);
    }

    #[test]
    fn test_oversize_paragraph_split_into_sentences() {
        let chunks = chunk("One two. Three four! Five six?", 20);
        assert_eq!(texts(&chunks), vec!["One two. Three four!", "Five six?"]);
    }

    #[test]
    fn test_oversize_sentence_split_into_words() {
        let chunks = chunk("aaa bbb ccc ddd", 7);
        assert_eq!(texts(&chunks), vec!["aaa bbb", "ccc ddd"]);
    }

    #[test]
    fn test_single_long_word_is_kept_whole() {
        let word = "x".repeat(50);
        let chunks = chunk(&word, 10);
        assert_eq!(texts(&chunks), vec![word.as_str()]);
    }

    #[test]
    fn test_zero_ceiling_treated_as_one() {
        let chunks = chunk("a b", 0);
        assert_eq!(texts(&chunks), vec!["a", "b"]);
    }

    #[test]
    fn test_sizes_counted_in_chars() {
        // 4 chars, 12 bytes
        let chunks = chunk("日本語だ\n日本語だ", 9);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].char_len(), 9);
    }

    #[parameterized(
        plain = { "Hi there. How are you?", &["Hi there.", "How are you?"] },
        closing_quote = { "He said \"stop.\" Then left.", &["He said \"stop.\"", "Then left."] },
        ellipsis = { "Well… maybe. Ok", &["Well…", "maybe.", "Ok"] },
        decimal = { "Pi is 3.14 roughly. Yes.", &["Pi is 3.14 roughly.", "Yes."] },
        repeated = { "What?! Really.", &["What?!", "Really."] },
        cjk = { "今日は晴れ。明日は雨？はい", &["今日は晴れ。", "明日は雨？", "はい"] },
    )]
    fn test_sentence_segmentation(input: &str, expected: &[&str]) {
        assert_eq!(sentences(input), expected);
    }

    #[parameterized(
        three_small_paragraphs = { 3, 500, 2000, 1 },
        two_fill_one_chunk_each = { 2, 1500, 2000, 2 },
        many_tiny = { 40, 10, 100, 5 },
    )]
    fn test_paragraph_packing(paragraphs: usize, size: usize, max: usize, expected: usize) {
        let text = vec!["p".repeat(size); paragraphs].join("\n");
        let chunks = chunk(&text, max);

        assert_eq!(chunks.len(), expected);
        assert!(chunks.iter().all(|c| c.char_len() <= max));
    }

    #[test]
    fn test_unpunctuated_paragraph_split_by_words() {
        let text = "abcd ".repeat(1000);
        assert_eq!(char_len(&text), 5000);

        let chunks = chunk(&text, 2000);
        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c.char_len() <= 2000));
    }

    #[test]
    fn test_round_trip_modulo_separators() {
        let text = "First paragraph is short.\n\n\
                    Second paragraph is much longer. It has several sentences! Does it? \
                    Yes, and one of them goes on and on without stopping for quite a while\n\
                    Third.";
        let chunks = chunk(text, 40);

        let rejoined: Vec<&str> = chunks
            .iter()
            .flat_map(|c| c.text().split_whitespace())
            .collect();
        let original: Vec<&str> = text.split_whitespace().collect();
        assert_eq!(rejoined, original);

        let indices: Vec<usize> = chunks.iter().map(DocumentChunk::index).collect();
        assert_eq!(indices, (0..chunks.len()).collect::<Vec<_>>());
        assert!(chunks.iter().all(|c| c.char_len() <= 40));
    }
}

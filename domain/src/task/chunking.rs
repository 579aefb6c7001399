//! Splitting oversized worldbook content into sequentially executed chunks.
//!
//! # Algorithm
//!
//! 1. **Paragraphs**: split after each blank-line separator
//! 2. **Sentences**: paragraphs longer than the chunk size are split after
//!    `.`, `!`, `?`, `。`, `！` or `？`
//! 3. **Char windows**: sentences still too long are cut at char boundaries
//! 4. **Greedy packing**: pieces are packed into chunks of at most
//!    `chunk_size` chars
//!
//! Separators stay attached to the preceding piece, so concatenating the
//! chunks always reproduces the input.

/// Result of [`split_content`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkPlan {
    pub chunks: Vec<String>,
    /// Chunks beyond the cap that will not be sent.
    pub dropped: usize,
}

impl ChunkPlan {
    pub fn is_chunked(&self) -> bool {
        self.chunks.len() > 1
    }
}

/// Split `content` into chunks of at most `chunk_size` chars.
///
/// A `chunk_size` of 0 disables chunking. A `max_chunks` of 0 means no cap.
/// Content that fits (including empty content) yields a single chunk.
pub fn split_content(content: &str, chunk_size: usize, max_chunks: usize) -> ChunkPlan {
    if chunk_size == 0 || char_len(content) <= chunk_size {
        return ChunkPlan {
            chunks: vec![content.to_string()],
            dropped: 0,
        };
    }

    let mut pieces: Vec<&str> = Vec::new();
    for paragraph in content.split_inclusive("\n\n") {
        if char_len(paragraph) <= chunk_size {
            pieces.push(paragraph);
            continue;
        }
        for sentence in paragraph.split_inclusive(is_sentence_end) {
            if char_len(sentence) <= chunk_size {
                pieces.push(sentence);
            } else {
                pieces.extend(char_windows(sentence, chunk_size));
            }
        }
    }

    let mut chunks: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;
    for piece in pieces {
        let len = char_len(piece);
        if current_len + len > chunk_size && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(piece);
        current_len += len;
    }
    if !current.is_empty() {
        chunks.push(current);
    }

    let mut dropped = 0;
    if max_chunks > 0 && chunks.len() > max_chunks {
        dropped = chunks.len() - max_chunks;
        chunks.truncate(max_chunks);
    }

    ChunkPlan { chunks, dropped }
}

/// Banner placed above each chunk result when a task was chunked.
pub fn segment_banner(index: usize, total: usize) -> String {
    format!("[segment {}/{}]", index + 1, total)
}

/// Join per-chunk results. A single result is returned untouched.
pub fn merge_chunk_results(results: &[String]) -> String {
    match results {
        [] => String::new(),
        [only] => only.clone(),
        _ => results
            .iter()
            .enumerate()
            .map(|(i, text)| format!("{}\n{}", segment_banner(i, results.len()), text))
            .collect::<Vec<_>>()
            .join("\n\n"),
    }
}

fn is_sentence_end(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | '。' | '！' | '？')
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn char_windows(s: &str, size: usize) -> Vec<&str> {
    let mut windows = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (offset, _) in s.char_indices() {
        if count == size {
            windows.push(&s[start..offset]);
            start = offset;
            count = 0;
        }
        count += 1;
    }
    if start < s.len() {
        windows.push(&s[start..]);
    }
    windows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_content_is_one_chunk() {
        let plan = split_content("short", 100, 4);
        assert_eq!(plan.chunks, vec!["short"]);
        assert!(!plan.is_chunked());

        let plan = split_content("", 10, 4);
        assert_eq!(plan.chunks, vec![""]);
    }

    #[test]
    fn test_zero_size_disables_chunking() {
        let text = "a".repeat(10_000);
        assert_eq!(split_content(&text, 0, 0).chunks.len(), 1);
    }

    #[test]
    fn test_paragraphs_are_packed() {
        let text = "aaaa\n\nbbbb\n\ncccc";
        let plan = split_content(text, 12, 0);
        assert_eq!(plan.chunks, vec!["aaaa\n\nbbbb\n\n", "cccc"]);
        assert_eq!(plan.chunks.concat(), text);
    }

    #[test]
    fn test_long_paragraph_falls_back_to_sentences() {
        let text = "One two. Three four! Five six?";
        let plan = split_content(text, 12, 0);
        assert!(plan.chunks.iter().all(|c| c.chars().count() <= 12));
        assert_eq!(plan.chunks[0], "One two.");
        assert_eq!(plan.chunks.concat(), text);
    }

    #[test]
    fn test_cjk_sentences_and_char_windows() {
        let text = "天気がいい。散歩に行こう！とても長い文章がここに続いています";
        let plan = split_content(text, 8, 0);
        assert!(plan.chunks.iter().all(|c| c.chars().count() <= 8));
        assert_eq!(plan.chunks.concat(), text);
    }

    #[test]
    fn test_cap_drops_excess_chunks() {
        let text = "aaaa\n\nbbbb\n\ncccc\n\ndddd";
        let plan = split_content(text, 6, 2);
        assert_eq!(plan.chunks.len(), 2);
        assert_eq!(plan.dropped, 2);
    }

    #[test]
    fn test_merge_chunk_results() {
        assert_eq!(merge_chunk_results(&["only".to_string()]), "only");
        let merged = merge_chunk_results(&["a".to_string(), "b".to_string()]);
        assert_eq!(merged, "[segment 1/2]\na\n\n[segment 2/2]\nb");
    }
}

//! Content chunking.
//!
//! Scraped pages are split into bounded chunks before topic extraction
//! so each generation-service call sees a prompt-sized slice of text.
//! Splits prefer paragraph boundaries; oversized paragraphs are hard-cut
//! at a character boundary.

use crate::types::{ContentChunk, ScrapedPage};

/// Chunks shorter than this carry too little signal to extract from.
const MIN_CHUNK_CHARS: usize = 80;

#[derive(Debug, Clone)]
pub struct Chunker {
    max_chars: usize,
}

impl Chunker {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(MIN_CHUNK_CHARS),
        }
    }

    /// Splits every page into chunks carrying their source URL and index.
    pub fn chunk_pages(&self, pages: &[ScrapedPage]) -> Vec<ContentChunk> {
        let mut chunks = Vec::new();
        for page in pages {
            for (chunk_index, text) in self.split(&page.text).into_iter().enumerate() {
                chunks.push(ContentChunk {
                    source_url: page.url.clone(),
                    chunk_index,
                    text,
                });
            }
        }
        chunks
    }

    fn split(&self, text: &str) -> Vec<String> {
        let mut pieces = Vec::new();
        let mut current = String::new();

        for paragraph in text.split("\n\n") {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }

            if current.len() + paragraph.len() + 2 > self.max_chars && !current.is_empty() {
                pieces.push(std::mem::take(&mut current));
            }

            if paragraph.len() > self.max_chars {
                for piece in hard_split(paragraph, self.max_chars) {
                    pieces.push(piece);
                }
                continue;
            }

            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
        }
        if !current.is_empty() {
            pieces.push(current);
        }

        pieces.retain(|p| p.len() >= MIN_CHUNK_CHARS);
        pieces
    }
}

/// Cuts `text` into pieces of at most `max_chars`, respecting char
/// boundaries and preferring whitespace near the cut.
fn hard_split(text: &str, max_chars: usize) -> Vec<String> {
    let mut pieces = Vec::new();
    let mut rest = text;
    while rest.len() > max_chars {
        let mut cut = max_chars;
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        // Back up to the last whitespace so words stay intact.
        if let Some(ws) = rest[..cut].rfind(char::is_whitespace) {
            if ws > max_chars / 2 {
                cut = ws;
            }
        }
        pieces.push(rest[..cut].trim().to_string());
        rest = rest[cut..].trim_start();
    }
    if !rest.is_empty() {
        pieces.push(rest.to_string());
    }
    pieces
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page(url: &str, text: &str) -> ScrapedPage {
        ScrapedPage {
            url: url.to_string(),
            title: String::new(),
            text: text.to_string(),
            word_count: text.split_whitespace().count(),
        }
    }

    #[test]
    fn test_short_page_single_chunk() {
        let chunker = Chunker::new(500);
        let text = "One paragraph that is comfortably longer than the minimum chunk size limit.";
        let chunks = chunker.chunk_pages(&[page("https://example.com/a", text)]);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].source_url, "https://example.com/a");
        assert_eq!(chunks[0].chunk_index, 0);
    }

    #[test]
    fn test_paragraphs_group_under_budget() {
        let chunker = Chunker::new(200);
        let paragraph = "Sentence with around ninety characters of content for the grouping test here ok."
            .to_string();
        let text = [paragraph.clone(), paragraph.clone(), paragraph].join("\n\n");
        let chunks = chunker.chunk_pages(&[page("https://example.com/a", &text)]);
        assert!(chunks.len() >= 2, "three ~90-char paragraphs exceed 200 chars");
        for chunk in &chunks {
            assert!(chunk.text.len() <= 200);
        }
    }

    #[test]
    fn test_oversized_paragraph_hard_split() {
        let chunker = Chunker::new(200);
        let long = "word ".repeat(100);
        let chunks = chunker.chunk_pages(&[page("https://example.com/a", &long)]);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.text.len() <= 200);
        }
    }

    #[test]
    fn test_tiny_fragments_dropped() {
        let chunker = Chunker::new(500);
        let chunks = chunker.chunk_pages(&[page("https://example.com/a", "too short")]);
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_chunk_ids_unique_per_page() {
        let chunker = Chunker::new(200);
        let long = "content words repeated over and over again for splitting purposes ".repeat(10);
        let chunks = chunker.chunk_pages(&[
            page("https://example.com/a", &long),
            page("https://example.com/b", &long),
        ]);
        let ids: std::collections::HashSet<String> = chunks.iter().map(|c| c.id()).collect();
        assert_eq!(ids.len(), chunks.len());
    }

    #[test]
    fn test_hard_split_respects_char_boundaries() {
        let text = "日本語のテキスト ".repeat(50);
        let pieces = hard_split(&text, 100);
        for piece in pieces {
            assert!(piece.len() <= 100 + 4);
        }
    }
}

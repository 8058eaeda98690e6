//! `Chunker` adapter splitting a file's text into fixed-size line windows.
//! A real indexing pipeline would pick boundaries language-aware; this is
//! the simplest conforming implementation of the contract.

use gitvec_core::error::CoreResult;
use gitvec_core::hashutil::{chunk_hash_hex, hash_chunk};
use gitvec_core::interop::Chunker;
use gitvec_core::model::Chunk;

pub struct LineChunker {
    pub lines_per_chunk: usize,
}

impl Default for LineChunker {
    fn default() -> Self {
        Self { lines_per_chunk: 60 }
    }
}

impl Chunker for LineChunker {
    fn chunk(&self, text: &str, _path: &str) -> CoreResult<Vec<Chunk>> {
        let lines: Vec<&str> = text.lines().collect();
        if lines.is_empty() {
            return Ok(Vec::new());
        }

        let mut chunks = Vec::new();
        let mut start_line = 0;
        let mut start_offset = 0;

        while start_line < lines.len() {
            let end_line = (start_line + self.lines_per_chunk).min(lines.len());
            let slice = lines[start_line..end_line].join("\n");
            let end_offset = start_offset + slice.len();

            chunks.push(Chunk {
                chunk_hash: chunk_hash_hex(&hash_chunk(&slice)),
                text: slice,
                start_line,
                end_line,
                start_offset,
                end_offset,
            });

            start_offset = end_offset + 1;
            start_line = end_line;
        }

        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_into_windows_of_the_configured_size() {
        let chunker = LineChunker { lines_per_chunk: 2 };
        let text = "a\nb\nc\nd\ne";
        let chunks = chunker.chunk(text, "f.rs").unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].text, "a\nb");
        assert_eq!(chunks[2].text, "e");
    }

    #[test]
    fn empty_text_produces_no_chunks() {
        let chunker = LineChunker::default();
        assert!(chunker.chunk("", "f.rs").unwrap().is_empty());
    }
}

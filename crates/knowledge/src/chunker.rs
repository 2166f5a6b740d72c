//! Text chunking with configurable size and overlap.

use crate::types::ChunkCandidate;

/// Split text into chunks of at most `chunk_size` characters.
///
/// A chunk ends on the last whitespace inside its window when one exists in
/// the second half of the window, so words are rarely cut. Consecutive chunks
/// share `overlap` characters. Chunks that are empty after trimming are
/// dropped. Metadata records the byte range of each chunk in `text`.
pub fn chunk_text(
    source_id: &str,
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Vec<ChunkCandidate> {
    if text.trim().is_empty() || chunk_size == 0 {
        return vec![];
    }

    // Byte offset of every char, plus the end of the string.
    let mut bounds: Vec<usize> = text.char_indices().map(|(i, _)| i).collect();
    bounds.push(text.len());
    let char_len = bounds.len() - 1;
    let overlap = overlap.min(chunk_size.saturating_sub(1));

    let mut chunks = Vec::new();
    let mut position = 0u32;
    let mut start = 0usize;

    while start < char_len {
        let mut end = (start + chunk_size).min(char_len);

        if end < char_len {
            let window = &text[bounds[start]..bounds[end]];
            if let Some(ws) = window.rfind(char::is_whitespace) {
                let ws_chars = window[..ws].chars().count();
                if ws_chars >= chunk_size / 2 {
                    end = start + ws_chars + 1;
                }
            }
        }

        let (byte_start, byte_end) = (bounds[start], bounds[end]);
        let piece = text[byte_start..byte_end].trim();

        if !piece.is_empty() {
            chunks.push(ChunkCandidate {
                source_id: source_id.to_string(),
                position,
                text: piece.to_string(),
                metadata: serde_json::json!({
                    "start": byte_start,
                    "end": byte_end,
                }),
            });
            position += 1;
        }

        if end == char_len {
            break;
        }
        start = if end - start > overlap {
            end - overlap
        } else {
            end
        };
    }

    tracing::debug!(
        "Chunked text into {} chunks (size: {}, overlap: {})",
        chunks.len(),
        chunk_size,
        overlap
    );

    chunks
}

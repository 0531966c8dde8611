//! Delimiter-priority text splitter.
//!
//! All lengths are counted in characters, not bytes, so multi-byte input
//! never lands a cut inside a code point.

use shared::settings::ChunkingSettings;

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Split `text` into chunks of at most `chunk_size` characters (plus overlap).
///
/// Delimiters are tried in priority order; the first one that actually occurs
/// in the text wins. Parts are greedily packed, each keeping its trailing
/// delimiter, so concatenating the chunks (with overlap suffixes stripped)
/// reproduces the input exactly. A part that is on its own longer than
/// `chunk_size` becomes a single oversized chunk rather than being split
/// mid-part.
///
/// An empty-string delimiter, or a text in which no delimiter occurs at all,
/// falls through to a hard cut into exact `chunk_size`-character windows with
/// no overlap. That path guarantees termination for pathological input.
pub fn split_text(text: &str, policy: &ChunkingSettings) -> Vec<String> {
    let size = policy.chunk_size.max(1);
    if char_len(text) <= size {
        return vec![text.to_string()];
    }

    for delimiter in &policy.delimiters {
        if delimiter.is_empty() {
            // Trailing empty delimiter means "hard character cut".
            break;
        }
        let parts: Vec<&str> = text.split(delimiter.as_str()).collect();
        if parts.len() > 1 {
            let chunks = pack_parts(&parts, delimiter, size);
            return apply_overlap(chunks, policy.chunk_overlap);
        }
    }

    hard_cut(text, size)
}

/// Greedily pack split parts into chunks, re-suffixing each part (except the
/// last) with the delimiter it was split on.
fn pack_parts(parts: &[&str], delimiter: &str, size: usize) -> Vec<String> {
    let last = parts.len() - 1;
    let delimiter_len = char_len(delimiter);

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for (i, part) in parts.iter().enumerate() {
        let piece_len = char_len(part) + if i < last { delimiter_len } else { 0 };
        if current_len > 0 && current_len + piece_len > size {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
        current.push_str(part);
        if i < last {
            current.push_str(delimiter);
        }
        current_len += piece_len;
    }
    if current_len > 0 {
        chunks.push(current);
    }
    chunks
}

/// Append the first `overlap` characters of each successor chunk to its
/// predecessor, for prose continuity across chunk boundaries.
fn apply_overlap(mut chunks: Vec<String>, overlap: usize) -> Vec<String> {
    if overlap == 0 || chunks.len() < 2 {
        return chunks;
    }
    for i in 0..chunks.len() - 1 {
        let suffix: String = chunks[i + 1].chars().take(overlap).collect();
        chunks[i].push_str(&suffix);
    }
    chunks
}

/// Fixed-size windows of exactly `size` characters, no overlap.
fn hard_cut(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size)
        .map(|window| window.iter().collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(size: usize, overlap: usize, delimiters: &[&str]) -> ChunkingSettings {
        ChunkingSettings {
            chunk_size: size,
            chunk_overlap: overlap,
            delimiters: delimiters.iter().map(|d| d.to_string()).collect(),
        }
    }

    /// Reverse the overlap step and concatenate, expecting the original text.
    /// The suffix appended to chunk `i` is the first `overlap` characters of
    /// chunk `i + 1` *before* that chunk received its own suffix, so the
    /// pre-overlap lengths are recovered right to left.
    fn reassemble(chunks: &[String], overlap: usize) -> String {
        let mut orig_lens = vec![0usize; chunks.len()];
        for i in (0..chunks.len()).rev() {
            let appended = if i + 1 < chunks.len() {
                overlap.min(orig_lens[i + 1])
            } else {
                0
            };
            orig_lens[i] = char_len(&chunks[i]) - appended;
        }
        chunks
            .iter()
            .enumerate()
            .map(|(i, c)| c.chars().take(orig_lens[i]).collect::<String>())
            .collect()
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let p = policy(100, 10, &["\n\n", "\n", ". ", " ", ""]);
        assert_eq!(split_text("hello world", &p), vec!["hello world"]);
    }

    #[test]
    fn empty_text_is_a_single_empty_chunk() {
        let p = policy(10, 0, &["\n\n", ""]);
        assert_eq!(split_text("", &p), vec![""]);
    }

    #[test]
    fn paragraph_scenario() {
        // At size 3 each paragraph (plus its trailing delimiter) fills a
        // chunk exactly, so no two paragraphs pack together.
        let p = policy(3, 0, &["\n\n", " ", ""]);
        let chunks = split_text("a\n\nb\n\nc\n\nd", &p);
        assert_eq!(chunks, vec!["a\n\n", "b\n\n", "c\n\n", "d"]);
        let stripped: Vec<&str> = chunks
            .iter()
            .map(|c| c.trim_end_matches("\n\n"))
            .collect();
        assert_eq!(stripped, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn coverage_with_overlap() {
        let text = "aaaa bbbb cccc dddd eeee ffff gggg";
        let p = policy(10, 3, &[" "]);
        let chunks = split_text(text, &p);
        assert!(chunks.len() > 1);
        assert_eq!(reassemble(&chunks, p.chunk_overlap), text);
    }

    #[test]
    fn coverage_across_delimiter_priorities() {
        let text = "First paragraph.\n\nSecond paragraph that runs longer.\nThird line. Fourth sentence here.";
        for (size, overlap) in [(20, 0), (20, 5), (12, 4), (7, 2)] {
            let p = policy(size, overlap, &["\n\n", "\n", ". ", " ", ""]);
            let chunks = split_text(text, &p);
            assert_eq!(
                reassemble(&chunks, overlap),
                text,
                "size={size} overlap={overlap}"
            );
        }
    }

    #[test]
    fn size_bound_with_overlap() {
        let text = "aa bb cc dd ee ff gg hh ii jj kk ll";
        let p = policy(8, 3, &[" "]);
        for chunk in split_text(text, &p) {
            assert!(char_len(&chunk) <= p.chunk_size + p.chunk_overlap, "{chunk:?}");
        }
    }

    #[test]
    fn hard_cut_termination() {
        // No delimiter occurs anywhere; the empty-string fallback hard-cuts.
        let text = "x".repeat(25);
        let p = policy(10, 5, &["\n\n", "\n", ". ", " ", ""]);
        let chunks = split_text(&text, &p);
        assert_eq!(chunks.len(), 3); // ceil(25 / 10)
        assert_eq!(chunks.iter().map(|c| char_len(c)).collect::<Vec<_>>(), vec![10, 10, 5]);
        // Hard cut applies no overlap.
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn oversized_part_becomes_its_own_chunk() {
        let text = "short aaaaaaaaaaaaaaaaaaaa short";
        let p = policy(10, 0, &[" "]);
        let chunks = split_text(text, &p);
        assert!(chunks.iter().any(|c| char_len(c) > 10));
        assert_eq!(reassemble(&chunks, 0), text);
    }

    #[test]
    fn multibyte_input_never_splits_a_code_point() {
        let text = "héllo wörld ünïcode tèxt çontent hère".repeat(3);
        let p = policy(9, 2, &[" ", ""]);
        // Would panic on a byte-indexed slice; also must round-trip.
        let chunks = split_text(&text, &p);
        assert_eq!(reassemble(&chunks, 2), text);
    }
}

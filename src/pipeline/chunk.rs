//! Split cached document texts into pieces that fit a model's context.
//!
//! Splitting happens on whitespace boundaries only; cleaned texts contain
//! single spaces, so rejoining the chunks with `' '` yields the input.

/// Context window assumed for models missing from the table.
pub const DEFAULT_CONTEXT_TOKENS: usize = 16_384;

/// Conservative characters-per-token ratio for English prose.
const CHARS_PER_TOKEN: usize = 3;

/// Context window of a model, in tokens.
pub fn context_tokens(model: &str) -> usize {
    let m = model.to_ascii_lowercase();
    // Longer prefixes first: "gpt-4-32k" must not match "gpt-4".
    if m.starts_with("gpt-3.5-turbo-16k") {
        16_384
    } else if m.starts_with("gpt-3.5-turbo") {
        4_096
    } else if m.starts_with("gpt-4-32k") {
        32_768
    } else if m.starts_with("gpt-4o") || m.starts_with("gpt-4.1") || m.starts_with("gpt-4-turbo") {
        128_000
    } else if m.starts_with("gpt-4") {
        8_192
    } else if m.starts_with("claude") {
        200_000
    } else {
        DEFAULT_CONTEXT_TOKENS
    }
}

/// Maximum characters of document text per chunk for `model`, leaving
/// `reserved_tokens` for the instruction, the prompt and the answer.
pub fn chunk_chars_for(model: &str, reserved_tokens: usize) -> usize {
    let usable = context_tokens(model).saturating_sub(reserved_tokens).max(256);
    usable * CHARS_PER_TOKEN
}

/// Split `text` into chunks of at most `max_chars` characters.
///
/// Words longer than `max_chars` are split hard at character boundaries.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;

    for word in text.split_whitespace() {
        let word_len = word.chars().count();

        if word_len > max_chars {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            let chars: Vec<char> = word.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        let needed = if current.is_empty() {
            word_len
        } else {
            current_len + 1 + word_len
        };

        if needed > max_chars {
            chunks.push(std::mem::take(&mut current));
            current.push_str(word);
            current_len = word_len;
        } else {
            if !current.is_empty() {
                current.push(' ');
            }
            current.push_str(word);
            current_len = needed;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_table() {
        assert_eq!(context_tokens("gpt-3.5-turbo"), 4_096);
        assert_eq!(context_tokens("gpt-3.5-turbo-16k"), 16_384);
        assert_eq!(context_tokens("gpt-4"), 8_192);
        assert_eq!(context_tokens("gpt-4-32k"), 32_768);
        assert_eq!(context_tokens("gpt-4.1-nano"), 128_000);
        assert_eq!(context_tokens("some-local-model"), DEFAULT_CONTEXT_TOKENS);
    }

    #[test]
    fn chunk_budget_leaves_room() {
        assert!(chunk_chars_for("gpt-3.5-turbo", 2_048) < 4_096 * CHARS_PER_TOKEN);
        assert!(chunk_chars_for("gpt-3.5-turbo", 1_000_000) >= 256);
    }

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(chunk_text("a b c", 100), vec!["a b c".to_string()]);
    }

    #[test]
    fn splits_on_whitespace() {
        let chunks = chunk_text("aaa bbb ccc ddd", 7);
        assert_eq!(chunks, vec!["aaa bbb", "ccc ddd"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 7));
    }

    #[test]
    fn rejoining_reconstructs_text() {
        let text = "the quick brown fox jumps over the lazy dog";
        let chunks = chunk_text(text, 10);
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn long_word_is_split_hard() {
        let chunks = chunk_text("xx abcdefghij yy", 4);
        assert_eq!(chunks, vec!["xx", "abcd", "efgh", "ij", "yy"]);
    }

    #[test]
    fn empty_text_has_no_chunks() {
        assert!(chunk_text("   ", 10).is_empty());
    }
}

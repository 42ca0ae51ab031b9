//! Input normalization.
//!
//! [`tokenize`] turns raw text into the lowercased token sequence that every
//! matching stage compares against. Pure and deterministic.

/// Split text into normalized tokens.
///
/// Lowercases the input, strips punctuation, and splits on non-word
/// boundaries. Internal hyphens are preserved, so `"e-commerce"` stays a
/// single token. Empty input yields an empty sequence.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();

    for ch in text.to_lowercase().chars() {
        if ch.is_alphanumeric() || ch == '-' {
            current.push(ch);
        } else {
            flush_token(&mut tokens, &mut current);
        }
    }
    flush_token(&mut tokens, &mut current);

    tokens
}

fn flush_token(tokens: &mut Vec<String>, current: &mut String) {
    // Hyphens only count inside a token.
    let trimmed = current.trim_matches('-');
    if !trimmed.is_empty() {
        tokens.push(trimmed.to_string());
    }
    current.clear();
}

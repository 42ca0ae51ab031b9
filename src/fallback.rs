//! Rotating fallback responses.
//!
//! When no matching stage produces an answer, the engine emits the next
//! entry of a fixed message list. The rotation is a pure cursor with
//! wraparound: no randomness, fully replayable.

/// Prompt returned for empty or whitespace-only input.
pub const EMPTY_INPUT_PROMPT: &str = "Please type a message to chat with the assistant.";

/// Canned apology responses, cycled in order.
pub const FALLBACK_RESPONSES: [&str; 3] = [
    "I'm sorry, I don't understand that query. Could you please rephrase?",
    "I don't have information on that topic yet. Please try asking something else.",
    "I couldn't find a match for your query. Please try using different keywords.",
];

pub struct FallbackRotator {
    messages: Vec<String>,
    cursor: usize,
}

impl FallbackRotator {
    pub fn new(messages: Vec<String>) -> Self {
        Self {
            messages,
            cursor: 0,
        }
    }

    /// Return the current message and advance the cursor, wrapping at the
    /// end of the list.
    pub fn next_message(&mut self) -> String {
        let message = self.messages[self.cursor].clone();
        self.cursor = (self.cursor + 1) % self.messages.len();
        message
    }
}

impl Default for FallbackRotator {
    fn default() -> Self {
        Self::new(FALLBACK_RESPONSES.iter().map(|s| s.to_string()).collect())
    }
}

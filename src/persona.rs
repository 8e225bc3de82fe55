//! Persona of the remote assistant
//!
//! Name, system prompt and greeting are opaque configuration: the prompt is
//! passed through as the session's system instruction and the greeting seeds
//! the transcript.

use serde::{Deserialize, Serialize};

const DEFAULT_NAME: &str = "Radha";

const DEFAULT_SYSTEM_INSTRUCTION: &str = "\
You are Radha, a warm, supportive and knowledgeable assistant in a real-time voice \
conversation. Speak as Radha in the first person and keep a natural, friendly tone. \
Answer briefly and clearly first, and offer more detail only when the user wants it. \
For questions about study, work or programming, give practical guidance with examples. \
Stay respectful and stay in character.";

const DEFAULT_GREETING: &str =
    "Hello there! I'm Radha. It's lovely to meet you. Press Enter to start our conversation!";

/// Identity of the assistant on the other end
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct Persona {
    /// Display name
    pub name: String,

    /// System prompt sent when a session opens
    pub system_instruction: String,

    /// First assistant line of the transcript; empty disables it
    pub greeting: String,
}

impl Default for Persona {
    fn default() -> Self {
        Self {
            name: DEFAULT_NAME.to_string(),
            system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
            greeting: DEFAULT_GREETING.to_string(),
        }
    }
}

impl Persona {
    /// Get the display name
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the system prompt, if any
    #[must_use]
    pub fn system_prompt(&self) -> Option<&str> {
        Some(self.system_instruction.as_str()).filter(|s| !s.trim().is_empty())
    }

    /// Get the greeting, if any
    #[must_use]
    pub fn greeting(&self) -> Option<&str> {
        Some(self.greeting.as_str()).filter(|s| !s.trim().is_empty())
    }
}

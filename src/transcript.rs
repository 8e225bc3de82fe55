//! Transcript assembly
//!
//! Streaming transcript fragments accumulate per speaker until the remote
//! signals the end of a turn, then become finished chat lines.

use std::fmt;

/// Who said a line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Speaker {
    User,
    Assistant,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Assistant => write!(f, "assistant"),
        }
    }
}

/// One finished line of the conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatLine {
    pub speaker: Speaker,
    pub text: String,
}

impl ChatLine {
    #[must_use]
    pub fn new(speaker: Speaker, text: impl Into<String>) -> Self {
        Self {
            speaker,
            text: text.into(),
        }
    }
}

/// Pending text of the turn in progress
#[derive(Debug, Default)]
pub struct TranscriptTurn {
    user: String,
    assistant: String,
}

impl TranscriptTurn {
    /// Append a fragment of the user's speech
    pub fn push_user(&mut self, fragment: &str) {
        self.user.push_str(fragment);
    }

    /// Append a fragment of the assistant's speech
    pub fn push_assistant(&mut self, fragment: &str) {
        self.assistant.push_str(fragment);
    }

    /// Finish the turn
    ///
    /// Returns the trimmed, non-empty lines with the user line first, and
    /// clears both accumulators.
    pub fn complete(&mut self) -> Vec<ChatLine> {
        let user = std::mem::take(&mut self.user);
        let assistant = std::mem::take(&mut self.assistant);

        [(Speaker::User, user), (Speaker::Assistant, assistant)]
            .into_iter()
            .filter_map(|(speaker, text)| {
                let text = text.trim();
                (!text.is_empty()).then(|| ChatLine::new(speaker, text))
            })
            .collect()
    }

    /// Drop pending text
    pub fn clear(&mut self) {
        self.user.clear();
        self.assistant.clear();
    }

    /// Whether nothing is pending
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.assistant.is_empty()
    }
}

/// Append-only conversation log plus the turn in progress
#[derive(Debug, Default)]
pub struct Transcript {
    lines: Vec<ChatLine>,
    turn: TranscriptTurn,
}

impl Transcript {
    /// Create a log, optionally starting with an assistant greeting
    #[must_use]
    pub fn with_greeting(greeting: &str) -> Self {
        let mut transcript = Self::default();
        let greeting = greeting.trim();
        if !greeting.is_empty() {
            transcript
                .lines
                .push(ChatLine::new(Speaker::Assistant, greeting));
        }
        transcript
    }

    /// Pending accumulators
    pub fn turn_mut(&mut self) -> &mut TranscriptTurn {
        &mut self.turn
    }

    /// Finish the current turn and append its lines
    ///
    /// Returns the lines that were appended.
    pub fn complete_turn(&mut self) -> &[ChatLine] {
        let start = self.lines.len();
        self.lines.extend(self.turn.complete());
        &self.lines[start..]
    }

    /// Every finished line, oldest first
    #[must_use]
    pub fn lines(&self) -> &[ChatLine] {
        &self.lines
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_assembly_orders_user_first() {
        let mut transcript = Transcript::default();
        let turn = transcript.turn_mut();
        turn.push_assistant("Hi");
        turn.push_user("Hel");
        turn.push_assistant(" there");
        turn.push_user("lo");

        let appended = transcript.complete_turn().to_vec();
        assert_eq!(
            appended,
            vec![
                ChatLine::new(Speaker::User, "Hello"),
                ChatLine::new(Speaker::Assistant, "Hi there"),
            ]
        );
        assert_eq!(transcript.lines(), appended.as_slice());
    }

    #[test]
    fn test_empty_turn_appends_nothing() {
        let mut transcript = Transcript::default();
        transcript.turn_mut().push_user("   ");
        transcript.turn_mut().push_assistant("\n");

        assert!(transcript.complete_turn().is_empty());
        assert!(transcript.lines().is_empty());
        assert!(transcript.turn_mut().is_empty());
    }

    #[test]
    fn test_one_sided_turn() {
        let mut transcript = Transcript::default();
        transcript.turn_mut().push_assistant("  Welcome back. ");

        assert_eq!(
            transcript.complete_turn(),
            &[ChatLine::new(Speaker::Assistant, "Welcome back.")]
        );
    }

    #[test]
    fn test_accumulators_reset_between_turns() {
        let mut transcript = Transcript::default();
        transcript.turn_mut().push_user("one");
        transcript.complete_turn();
        transcript.turn_mut().push_user("two");
        transcript.complete_turn();

        let texts: Vec<&str> = transcript.lines().iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn test_greeting() {
        let transcript = Transcript::with_greeting("Hello!");
        assert_eq!(transcript.lines(), &[ChatLine::new(Speaker::Assistant, "Hello!")]);

        assert!(Transcript::with_greeting("").lines().is_empty());
    }
}

//! Per-session conversation state.
//!
//! A [`Session`] is owned by the interactive loop and passed by reference
//! into every pipeline call. Nothing in it is shared between sessions or
//! persisted.

use crate::models::ConversationTurn;

#[derive(Debug, Clone)]
pub struct Session {
    turns: Vec<ConversationTurn>,
    window: usize,
}

impl Session {
    /// `window` is the number of prior turns replayed before each new question.
    pub fn new(window: usize) -> Self {
        Self {
            turns: Vec::new(),
            window,
        }
    }

    pub fn record(&mut self, turn: ConversationTurn) {
        self.turns.push(turn);
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    fn recent(&self) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(self.window);
        &self.turns[start..]
    }

    /// The question with the last `window` turns prepended as plain text:
    ///
    /// ```text
    /// Q: <earlier question>
    /// A: <earlier answer>
    /// Q: <question>
    /// A:
    /// ```
    ///
    /// With no history (or a zero window) the question is returned unchanged.
    pub fn windowed_query(&self, question: &str) -> String {
        let recent = self.recent();
        if recent.is_empty() {
            return question.to_string();
        }

        let mut text = String::new();
        for turn in recent {
            text.push_str(&format!("Q: {}\nA: {}\n", turn.question, turn.answer));
        }
        text.push_str(&format!("Q: {}\nA:", question));
        text
    }

    /// Code-generation prompt body: the last `window` prompt/code pairs
    /// followed by the new request.
    pub fn code_request(&self, prompt: &str) -> String {
        let mut text = String::new();
        for turn in self.recent() {
            text.push_str(&format!(
                "User Prompt: {}\nGenerated Code:\n{}\n\n",
                turn.question, turn.answer
            ));
        }
        text.push_str(&format!(
            "User Prompt: {}\nPlease generate the code accordingly.",
            prompt
        ));
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(q: &str, a: &str) -> ConversationTurn {
        ConversationTurn {
            question: q.to_string(),
            answer: a.to_string(),
            cited_chunks: Vec::new(),
        }
    }

    #[test]
    fn test_first_question_is_unchanged() {
        let session = Session::new(2);
        assert_eq!(session.windowed_query("What is this?"), "What is this?");
    }

    #[test]
    fn test_window_keeps_last_turns() {
        let mut session = Session::new(2);
        session.record(turn("q1", "a1"));
        session.record(turn("q2", "a2"));
        session.record(turn("q3", "a3"));

        let query = session.windowed_query("q4");
        assert_eq!(query, "Q: q2\nA: a2\nQ: q3\nA: a3\nQ: q4\nA:");
        assert_eq!(session.turns().len(), 3);
    }

    #[test]
    fn test_zero_window() {
        let mut session = Session::new(0);
        session.record(turn("q1", "a1"));
        assert_eq!(session.windowed_query("q2"), "q2");
    }

    #[test]
    fn test_code_request_history() {
        let mut session = Session::new(2);
        assert_eq!(
            session.code_request("sort a list"),
            "User Prompt: sort a list\nPlease generate the code accordingly."
        );

        session.record(turn("sort a list", "sorted(xs)"));
        let text = session.code_request("now reverse it");
        assert!(text.starts_with("User Prompt: sort a list\nGenerated Code:\nsorted(xs)\n\n"));
        assert!(text.ends_with("User Prompt: now reverse it\nPlease generate the code accordingly."));
    }
}

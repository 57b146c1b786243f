//! Bounded per-session conversation memory.
//!
//! Each session keeps an ordered sequence of alternating question/answer
//! strings, capped to the most recent exchanges with FIFO drop. The
//! transcript rendered for prompts covers only the last few exchanges.
//! A best-effort cache, not a system of record: same-session races are
//! last-writer-wins.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::config::MemoryConfig;

/// Sentinel returned when a session is unknown or empty.
pub const NO_CONTEXT: &str = "No previous conversation context.";

pub struct ConversationMemory {
    sessions: Mutex<HashMap<String, VecDeque<String>>>,
    max_exchanges: usize,
}

impl ConversationMemory {
    pub fn new(config: &MemoryConfig) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            max_exchanges: config.max_exchanges,
        }
    }

    /// Record one question/answer exchange, dropping the oldest entries
    /// once the per-session bound is exceeded.
    pub fn append(&self, session_id: &str, question: &str, answer: &str) {
        let mut sessions = self.sessions.lock().unwrap();
        let history = sessions.entry(session_id.to_string()).or_default();
        history.push_back(question.to_string());
        history.push_back(answer.to_string());
        while history.len() > self.max_exchanges * 2 {
            history.pop_front();
        }
    }

    /// Render the most recent `max_turns` exchanges as a transcript for
    /// prompt assembly, or [`NO_CONTEXT`] when there is nothing to show.
    pub fn transcript(&self, session_id: &str, max_turns: usize) -> String {
        let sessions = self.sessions.lock().unwrap();
        let history = match sessions.get(session_id) {
            Some(history) if !history.is_empty() => history,
            _ => return NO_CONTEXT.to_string(),
        };

        let recent: Vec<&String> = history
            .iter()
            .skip(history.len().saturating_sub(max_turns * 2))
            .collect();

        let mut lines = Vec::new();
        for pair in recent.chunks(2) {
            if let [question, answer] = pair {
                lines.push(format!("Previous Question: {}", question));
                lines.push(format!("Previous Answer: {}", answer));
            }
        }

        if lines.is_empty() {
            NO_CONTEXT.to_string()
        } else {
            lines.join("\n")
        }
    }

    /// Whether the session has any stored context worth including in a
    /// prompt.
    pub fn has_context(&self, session_id: &str) -> bool {
        let sessions = self.sessions.lock().unwrap();
        sessions.get(session_id).is_some_and(|h| !h.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> ConversationMemory {
        ConversationMemory::new(&MemoryConfig {
            max_exchanges: 10,
            prompt_turns: 3,
        })
    }

    #[test]
    fn unknown_session_yields_sentinel() {
        let mem = memory();
        assert_eq!(mem.transcript("nope", 3), NO_CONTEXT);
        assert!(!mem.has_context("nope"));
    }

    #[test]
    fn transcript_pairs_questions_and_answers() {
        let mem = memory();
        mem.append("s1", "What is X?", "X is a thing.");
        mem.append("s1", "And Y?", "Y is another.");

        let transcript = mem.transcript("s1", 3);
        assert_eq!(
            transcript,
            "Previous Question: What is X?\n\
             Previous Answer: X is a thing.\n\
             Previous Question: And Y?\n\
             Previous Answer: Y is another."
        );
    }

    #[test]
    fn transcript_limits_to_recent_turns() {
        let mem = memory();
        for i in 0..5 {
            mem.append("s1", &format!("q{}", i), &format!("a{}", i));
        }
        let transcript = mem.transcript("s1", 2);
        assert!(!transcript.contains("q2"));
        assert!(transcript.contains("q3"));
        assert!(transcript.contains("q4"));
    }

    #[test]
    fn sessions_are_isolated() {
        let mem = memory();
        mem.append("s1", "q", "a");
        assert_eq!(mem.transcript("s2", 3), NO_CONTEXT);
    }

    #[test]
    fn oldest_exchanges_are_dropped_fifo() {
        let mem = ConversationMemory::new(&MemoryConfig {
            max_exchanges: 2,
            prompt_turns: 2,
        });
        mem.append("s1", "q1", "a1");
        mem.append("s1", "q2", "a2");
        mem.append("s1", "q3", "a3");

        let transcript = mem.transcript("s1", 10);
        assert!(!transcript.contains("q1"));
        assert!(transcript.contains("q2"));
        assert!(transcript.contains("q3"));
    }
}

//! Memoria conversacional por sesión.
//!
//! Cada sesión (identificada por la cookie `session_id`) acumula sus propios
//! turnos; sesiones distintas nunca comparten historial. Todas las sesiones
//! viven detrás de un único `Mutex`, que nunca se mantiene tomado durante una
//! llamada al modelo.
//!
//! La memoria está acotada: cada sesión conserva sus últimos
//! `MAX_TURNS_PER_SESSION` turnos y, al superar `MAX_SESSIONS`, se descarta la
//! sesión usada hace más tiempo.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryTurn {
    pub question: String,
    pub answer: String,
}

impl MemoryTurn {
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
        }
    }
}

pub const MAX_SESSIONS: usize = 1000;
pub const MAX_TURNS_PER_SESSION: usize = 50;

#[derive(Debug, Default)]
struct Session {
    turns: VecDeque<MemoryTurn>,
    last_used: u64,
}

#[derive(Debug, Default)]
struct Sessions {
    clock: u64,
    by_id: HashMap<String, Session>,
}

#[derive(Debug)]
pub struct ConversationMemory {
    max_sessions: usize,
    max_turns: usize,
    sessions: Mutex<Sessions>,
}

impl Default for ConversationMemory {
    fn default() -> Self {
        Self::with_limits(MAX_SESSIONS, MAX_TURNS_PER_SESSION)
    }
}

impl ConversationMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(max_sessions: usize, max_turns: usize) -> Self {
        Self {
            max_sessions: max_sessions.max(1),
            max_turns: max_turns.max(1),
            sessions: Mutex::new(Sessions::default()),
        }
    }

    /// Copia del historial de la sesión (vacío si la sesión es nueva).
    pub fn history(&self, session: &str) -> Vec<MemoryTurn> {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.clock += 1;
        let now = sessions.clock;
        match sessions.by_id.get_mut(session) {
            Some(entry) => {
                entry.last_used = now;
                entry.turns.iter().cloned().collect()
            }
            None => Vec::new(),
        }
    }

    pub fn append(&self, session: &str, turn: MemoryTurn) {
        let mut sessions = self.sessions.lock().unwrap();
        sessions.clock += 1;
        let now = sessions.clock;

        if !sessions.by_id.contains_key(session) && sessions.by_id.len() >= self.max_sessions {
            let oldest = sessions
                .by_id
                .iter()
                .min_by_key(|(_, s)| s.last_used)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                debug!("Descartando la memoria de la sesión {oldest}");
                sessions.by_id.remove(&oldest);
            }
        }

        let entry = sessions.by_id.entry(session.to_string()).or_default();
        entry.last_used = now;
        if entry.turns.len() == self.max_turns {
            entry.turns.pop_front();
        }
        entry.turns.push_back(turn);
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().unwrap().by_id.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sessions_do_not_see_each_other() {
        let memory = ConversationMemory::new();
        memory.append("alice", MemoryTurn::new("q1", "a1"));
        memory.append("bob", MemoryTurn::new("q2", "a2"));
        memory.append("alice", MemoryTurn::new("q3", "a3"));

        assert_eq!(
            memory.history("alice"),
            vec![MemoryTurn::new("q1", "a1"), MemoryTurn::new("q3", "a3")]
        );
        assert_eq!(memory.history("bob"), vec![MemoryTurn::new("q2", "a2")]);
        assert!(memory.history("carol").is_empty());
        assert_eq!(memory.session_count(), 2);
    }

    #[test]
    fn each_session_keeps_only_its_latest_turns() {
        let memory = ConversationMemory::with_limits(10, 3);
        for i in 0..5 {
            memory.append("alice", MemoryTurn::new(format!("q{i}"), format!("a{i}")));
        }

        let questions: Vec<String> = memory
            .history("alice")
            .into_iter()
            .map(|t| t.question)
            .collect();
        assert_eq!(questions, vec!["q2", "q3", "q4"]);
    }

    #[test]
    fn least_recently_used_session_is_evicted() {
        let memory = ConversationMemory::with_limits(2, 10);
        memory.append("alice", MemoryTurn::new("q1", "a1"));
        memory.append("bob", MemoryTurn::new("q2", "a2"));
        // Leer el historial de alice la marca como usada.
        assert_eq!(memory.history("alice").len(), 1);

        memory.append("carol", MemoryTurn::new("q3", "a3"));

        assert_eq!(memory.session_count(), 2);
        assert!(memory.history("bob").is_empty());
        assert_eq!(memory.history("alice").len(), 1);
        assert_eq!(memory.history("carol").len(), 1);
    }
}

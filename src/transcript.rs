//! Transcript compartido del chat, acotado a los últimos `capacity` turnos.

use std::collections::VecDeque;

use serde::Serialize;

use crate::models::ChatTurn;

#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    #[serde(skip)]
    capacity: usize,
    turns: VecDeque<ChatTurn>,
}

impl Transcript {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            turns: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    /// Añade un turno descartando el más antiguo si se alcanza la capacidad.
    pub fn push(&mut self, turn: ChatTurn) {
        if self.turns.len() == self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    /// Copia ordenada de los turnos retenidos, del más antiguo al más reciente.
    pub fn turns(&self) -> Vec<ChatTurn> {
        self.turns.iter().cloned().collect()
    }

    /// Número de turnos retenidos.
    pub fn retained(&self) -> usize {
        self.turns.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn turn(i: usize) -> ChatTurn {
        ChatTurn {
            user: Some(format!("q{i}")),
            bot: format!("a{i}"),
            response_time_ms: i as f64,
            timestamp: "2024-01-01 00:00:00".to_string(),
        }
    }

    #[test]
    fn oldest_turns_are_evicted() {
        let mut transcript = Transcript::with_capacity(3);
        for i in 0..5 {
            transcript.push(turn(i));
        }
        assert_eq!(transcript.retained(), 3);
        assert_eq!(transcript.turns().last().unwrap().bot, "a4");

        let json = serde_json::to_value(&transcript).unwrap();
        let users: Vec<&str> = json
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["user"].as_str().unwrap())
            .collect();
        assert_eq!(users, vec!["q2", "q3", "q4"]);
    }

    #[test]
    fn zero_capacity_still_keeps_the_latest_turn() {
        let mut transcript = Transcript::with_capacity(0);
        transcript.push(turn(1));
        transcript.push(turn(2));
        assert_eq!(transcript.retained(), 1);
        assert_eq!(transcript.turns()[0].bot, "a2");
    }
}

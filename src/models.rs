//! Modelos de dominio (chunks del corpus y turnos del chat).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Trozo de texto derivado de una fila del CSV.
/// Se produce una sola vez al arrancar y es inmutable a partir de entonces.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentChunk {
    pub text: String,
    /// Metadatos de origen (`source` = ruta del CSV, `row` = fila 0-based).
    pub source_metadata: BTreeMap<String, serde_json::Value>,
}

impl DocumentChunk {
    pub fn new(text: impl Into<String>, source_metadata: BTreeMap<String, serde_json::Value>) -> Self {
        Self {
            text: text.into(),
            source_metadata,
        }
    }
}

/// Un intercambio pregunta/respuesta tal como se muestra en el transcript.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatTurn {
    /// `None` cuando la petición llegó sin `user_input`.
    pub user: Option<String>,
    pub bot: String,
    pub response_time_ms: f64,
    pub timestamp: String,
}

/// Formato de fecha usado en el transcript y en las estadísticas.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub fn now_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

//! Carga del dataset tabular (CSV) y conversión de cada fila en chunks de texto.

use std::{collections::BTreeMap, path::Path};

use anyhow::{Context, Result};
use serde_json::json;
use tracing::{debug, info};

use crate::{models::DocumentChunk, text_splitter::RecursiveCharacterSplitter};

/// Valor con el que se rellenan las columnas que faltan en una fila corta.
const MISSING_VALUE: &str = "None";

/// Lee el CSV, convierte cada fila en un documento `"columna: valor"` por línea
/// y lo divide en chunks acotados. Cualquier error de lectura es fatal: el
/// servidor no debe arrancar sin corpus.
///
/// Las filas con menos campos que la cabecera se aceptan; cada columna ausente
/// aparece como `columna: None`. Los campos sobrantes se ignoran.
pub fn load_and_process_csv(
    csv_path: &Path,
    splitter: &RecursiveCharacterSplitter,
) -> Result<Vec<DocumentChunk>> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(csv_path)
        .with_context(|| format!("No se pudo abrir el CSV {}", csv_path.display()))?;

    let headers: Vec<String> = reader
        .headers()
        .with_context(|| format!("No se pudo leer la cabecera de {}", csv_path.display()))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();

    let source = csv_path.to_string_lossy().to_string();
    let mut chunks = Vec::new();
    let mut rows = 0usize;

    for (row, record) in reader.records().enumerate() {
        let record = record
            .with_context(|| format!("Fila {row} ilegible en {}", csv_path.display()))?;
        rows += 1;

        if record.len() != headers.len() {
            debug!(
                "Fila {} con {} campos (cabecera con {})",
                row,
                record.len(),
                headers.len()
            );
        }

        let text = headers
            .iter()
            .enumerate()
            .map(|(i, column)| {
                let value = record.get(i).map_or(MISSING_VALUE, str::trim);
                format!("{column}: {value}")
            })
            .collect::<Vec<_>>()
            .join("\n");

        for piece in splitter.split_text(&text) {
            let mut metadata = BTreeMap::new();
            metadata.insert("source".to_string(), json!(source));
            metadata.insert("row".to_string(), json!(row));
            chunks.push(DocumentChunk::new(piece, metadata));
        }
    }

    info!(
        "📄 {} filas cargadas de {}, divididas en {} chunks.",
        rows,
        csv_path.display(),
        chunks.len()
    );
    Ok(chunks)
}

//! División recursiva de texto en chunks de tamaño acotado con solapamiento.
//!
//! Algoritmo:
//!   1. Se elige el primer separador de la lista (`"\n\n"`, `"\n"`, `" "`, `""`)
//!      que aparezca en el texto.
//!   2. Se parte el texto por ese separador, conservándolo al inicio de cada trozo.
//!   3. Los trozos cortos se fusionan hasta llenar `chunk_size`; al cerrar un chunk
//!      se conservan los últimos trozos que quepan en `chunk_overlap`.
//!   4. Los trozos que siguen siendo demasiado largos se dividen recursivamente
//!      con los separadores restantes.
//!
//! Todas las longitudes se miden en caracteres, no en bytes.

use anyhow::{anyhow, Result};
use tracing::warn;

const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

#[derive(Debug, Clone)]
pub struct RecursiveCharacterSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveCharacterSplitter {
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(anyhow!("chunk_size debe ser mayor que cero"));
        }
        if chunk_overlap >= chunk_size {
            return Err(anyhow!(
                "El solapamiento ({chunk_overlap}) debe ser menor que el tamaño de chunk ({chunk_size})"
            ));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }

    /// Divide `text` en chunks ordenados. Nunca devuelve chunks vacíos.
    pub fn split_text(&self, text: &str) -> Vec<String> {
        self.split_recursive(text, &DEFAULT_SEPARATORS)
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, remaining) = pick_separator(text, separators);
        let splits = split_keeping_separator(text, separator);

        let mut chunks = Vec::new();
        let mut pending: Vec<String> = Vec::new();

        for piece in splits {
            if char_len(&piece) < self.chunk_size {
                pending.push(piece);
                continue;
            }
            if !pending.is_empty() {
                chunks.extend(self.merge_splits(&pending));
                pending.clear();
            }
            if remaining.is_empty() {
                chunks.push(piece);
            } else {
                chunks.extend(self.split_recursive(&piece, remaining));
            }
        }

        if !pending.is_empty() {
            chunks.extend(self.merge_splits(&pending));
        }
        chunks
    }

    /// Fusiona trozos pequeños en chunks de hasta `chunk_size` caracteres,
    /// arrastrando al siguiente chunk la cola que cabe en `chunk_overlap`.
    fn merge_splits(&self, splits: &[String]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: Vec<&str> = Vec::new();
        let mut first = 0;
        let mut total = 0;

        for piece in splits {
            let len = char_len(piece);
            if total + len > self.chunk_size {
                if total > self.chunk_size {
                    warn!(
                        "Chunk de {} caracteres supera el tamaño máximo de {}",
                        total, self.chunk_size
                    );
                }
                if first < current.len() {
                    if let Some(doc) = join_pieces(&current[first..]) {
                        docs.push(doc);
                    }
                    while first < current.len()
                        && (total > self.chunk_overlap
                            || (total + len > self.chunk_size && total > 0))
                    {
                        total -= char_len(current[first]);
                        first += 1;
                    }
                }
            }
            current.push(piece.as_str());
            total += len;
        }

        if let Some(doc) = join_pieces(&current[first..]) {
            docs.push(doc);
        }
        docs
    }
}

fn pick_separator<'a, 'b>(text: &str, separators: &'b [&'a str]) -> (&'a str, &'b [&'a str]) {
    for (i, &sep) in separators.iter().enumerate() {
        if sep.is_empty() {
            return (sep, &[]);
        }
        if text.contains(sep) {
            return (sep, &separators[i + 1..]);
        }
    }
    ("", &[])
}

/// Parte el texto conservando el separador al comienzo del trozo siguiente.
fn split_keeping_separator(text: &str, separator: &str) -> Vec<String> {
    if separator.is_empty() {
        return text.chars().map(String::from).collect();
    }
    let mut parts = text.split(separator);
    let mut out = Vec::new();
    if let Some(head) = parts.next() {
        out.push(head.to_string());
    }
    out.extend(parts.map(|p| format!("{separator}{p}")));
    out.retain(|p| !p.is_empty());
    out
}

fn join_pieces(pieces: &[&str]) -> Option<String> {
    let joined = pieces.concat();
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

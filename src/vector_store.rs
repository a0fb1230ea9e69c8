//! Vector store local persistido en disco para los chunks del corpus.
//!
//! API pública:
//!   - `VectorGateway`: capacidad estrecha (existencia, apertura, creación,
//!     inserción por lotes, persistencia, búsqueda).
//!   - `LocalVectorStore`: implementación con colección JSON + similitud coseno.
//!   - `create_or_load_vector_db(...)`: política de arranque (reutilizar o crear).

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::llm::Embedder;
use crate::models::DocumentChunk;

const COLLECTION_FILE: &str = "collection.json";

/// Textos por petición al proveedor de embeddings.
const EMBED_REQUEST_SIZE: usize = 64;

#[async_trait]
pub trait VectorGateway: Send + Sync {
    /// `true` si en `location` hay una colección con al menos un documento.
    async fn exists_and_populated(&self, location: &Path) -> Result<bool>;

    /// Abre una colección existente en `location`.
    async fn open(&self, location: &Path) -> Result<()>;

    /// Crea (o vacía) la colección en `location`.
    async fn create(&self, location: &Path) -> Result<()>;

    async fn insert_batch(&self, chunks: &[DocumentChunk]) -> Result<()>;

    /// Vuelca la colección abierta a disco.
    async fn persist(&self) -> Result<()>;

    /// Los `k` chunks más similares a `query`, de mayor a menor similitud.
    async fn search(&self, query: &str, k: usize) -> Result<Vec<DocumentChunk>>;

    async fn count(&self) -> Result<usize>;
}

/// Resultado de la política de arranque del vector store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Reused { documents: usize },
    Created { documents: usize, batches: usize },
}

/// Reutiliza la colección persistida si tiene documentos; si no, la crea e
/// inserta todos los chunks en lotes de como mucho `batch_size`.
///
/// No hay camino incremental: un cambio de corpus exige borrar el directorio.
pub async fn create_or_load_vector_db(
    gateway: &dyn VectorGateway,
    location: &Path,
    chunks: &[DocumentChunk],
    batch_size: usize,
) -> Result<LoadOutcome> {
    if batch_size == 0 {
        return Err(anyhow!("El tamaño de lote debe ser mayor que cero"));
    }

    if gateway.exists_and_populated(location).await? {
        info!("✅ Embeddings encontrados. Cargando la colección existente...");
        gateway.open(location).await?;
        let documents = gateway.count().await?;
        return Ok(LoadOutcome::Reused { documents });
    }

    warn!("⚠️ No se encontraron embeddings. Generándolos ahora...");
    gateway.create(location).await?;

    let batches = chunks.len().div_ceil(batch_size);
    info!(
        "Insertando {} documentos en lotes de {}...",
        chunks.len(),
        batch_size
    );

    let progress = ProgressBar::new(batches as u64);
    progress.set_style(
        ProgressStyle::with_template("Embedding {bar:40.cyan/blue} {pos}/{len} lotes ({elapsed})")?,
    );
    for batch in chunks.chunks(batch_size) {
        gateway.insert_batch(batch).await?;
        progress.inc(1);
    }
    progress.finish_and_clear();

    gateway.persist().await?;
    info!("✅ Embeddings almacenados en {}.", location.display());

    Ok(LoadOutcome::Created {
        documents: chunks.len(),
        batches,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredEntry {
    id: String,
    chunk: DocumentChunk,
    embedding: Vec<f64>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Collection {
    embedding_model: String,
    entries: Vec<StoredEntry>,
}

#[derive(Default)]
struct StoreState {
    location: Option<PathBuf>,
    collection: Collection,
    /// Colección leída por `exists_and_populated`, pendiente de `open`.
    probed: Option<(PathBuf, Collection)>,
}

/// Colección en memoria respaldada por `<location>/collection.json`.
/// La búsqueda es coseno por fuerza bruta sobre todos los vectores.
pub struct LocalVectorStore {
    embedder: Arc<dyn Embedder>,
    embedding_model: String,
    state: RwLock<StoreState>,
}

impl LocalVectorStore {
    pub fn new(embedder: Arc<dyn Embedder>, embedding_model: impl Into<String>) -> Self {
        Self {
            embedder,
            embedding_model: embedding_model.into(),
            state: RwLock::new(StoreState::default()),
        }
    }

    async fn read_collection(location: &Path) -> Result<Option<Collection>> {
        let file = location.join(COLLECTION_FILE);
        if !file.exists() {
            return Ok(None);
        }
        let raw = tokio::fs::read(&file)
            .await
            .with_context(|| format!("No se pudo leer {}", file.display()))?;
        let collection = serde_json::from_slice(&raw)
            .with_context(|| format!("Colección corrupta en {}", file.display()))?;
        Ok(Some(collection))
    }

    fn opened_location(&self) -> Result<PathBuf> {
        self.state
            .read()
            .unwrap()
            .location
            .clone()
            .ok_or_else(|| anyhow!("El vector store no está abierto"))
    }
}

#[async_trait]
impl VectorGateway for LocalVectorStore {
    async fn exists_and_populated(&self, location: &Path) -> Result<bool> {
        if !location.is_dir() {
            return Ok(false);
        }
        match Self::read_collection(location).await? {
            Some(collection) if !collection.entries.is_empty() => {
                self.state.write().unwrap().probed = Some((location.to_path_buf(), collection));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn open(&self, location: &Path) -> Result<()> {
        let probed = {
            let mut state = self.state.write().unwrap();
            match state.probed.take() {
                Some((path, collection)) if path.as_path() == location => Some(collection),
                _ => None,
            }
        };
        let collection = match probed {
            Some(collection) => collection,
            None => Self::read_collection(location).await?.unwrap_or_default(),
        };
        if !collection.entries.is_empty() && collection.embedding_model != self.embedding_model {
            warn!(
                "La colección se generó con '{}' pero el modelo configurado es '{}'",
                collection.embedding_model, self.embedding_model
            );
        }

        let mut state = self.state.write().unwrap();
        state.location = Some(location.to_path_buf());
        state.collection = collection;
        Ok(())
    }

    async fn create(&self, location: &Path) -> Result<()> {
        tokio::fs::create_dir_all(location)
            .await
            .with_context(|| format!("No se pudo crear {}", location.display()))?;

        let mut state = self.state.write().unwrap();
        state.probed = None;
        state.location = Some(location.to_path_buf());
        state.collection = Collection {
            embedding_model: self.embedding_model.clone(),
            entries: Vec::new(),
        };
        Ok(())
    }

    async fn insert_batch(&self, chunks: &[DocumentChunk]) -> Result<()> {
        self.opened_location()?;

        let mut entries = Vec::with_capacity(chunks.len());
        for group in chunks.chunks(EMBED_REQUEST_SIZE) {
            let texts = group.iter().map(|c| c.text.clone()).collect();
            let vectors = self.embedder.embed_texts(texts).await?;
            if vectors.len() != group.len() {
                return Err(anyhow!(
                    "Número de embeddings ({}) distinto al número de chunks ({})",
                    vectors.len(),
                    group.len()
                ));
            }
            entries.extend(group.iter().zip(vectors).map(|(chunk, embedding)| StoredEntry {
                id: Uuid::new_v4().to_string(),
                chunk: chunk.clone(),
                embedding,
            }));
        }

        self.state.write().unwrap().collection.entries.extend(entries);
        Ok(())
    }

    async fn persist(&self) -> Result<()> {
        let location = self.opened_location()?;
        let payload = {
            let state = self.state.read().unwrap();
            serde_json::to_vec(&state.collection)?
        };

        let file = location.join(COLLECTION_FILE);
        let tmp = location.join(format!("{COLLECTION_FILE}.tmp"));
        tokio::fs::write(&tmp, payload)
            .await
            .with_context(|| format!("No se pudo escribir {}", tmp.display()))?;
        tokio::fs::rename(&tmp, &file)
            .await
            .with_context(|| format!("No se pudo reemplazar {}", file.display()))?;
        Ok(())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<DocumentChunk>> {
        self.opened_location()?;

        let query_vec = self
            .embedder
            .embed_texts(vec![query.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| anyhow!("No se pudo generar el embedding de la consulta"))?;

        let state = self.state.read().unwrap();
        let mut scored: Vec<(f64, &StoredEntry)> = state
            .collection
            .entries
            .iter()
            .map(|entry| (cosine_similarity(&query_vec, &entry.embedding), entry))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(_, entry)| entry.chunk.clone())
            .collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().unwrap().collection.entries.len())
    }
}

fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f64 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a < f64::EPSILON || norm_b < f64::EPSILON {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

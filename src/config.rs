//! Carga y gestión de configuración de la aplicación (corpus, vector store, LLM y servidor).

use std::env;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LlmProvider {
    Mistral,
    OpenAI,
}

impl LlmProvider {
    pub fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "mistral" => Ok(Self::Mistral),
            "openai" => Ok(Self::OpenAI),
            other => Err(anyhow!("Proveedor LLM no soportado: {other}")),
        }
    }

    /// Variable de entorno que contiene la clave de API del proveedor.
    pub fn api_key_var(&self) -> &'static str {
        match self {
            Self::Mistral => "MISTRAL_API_KEY",
            Self::OpenAI => "OPENAI_API_KEY",
        }
    }

    fn default_chat_model(&self) -> &'static str {
        match self {
            Self::Mistral => "mistral-large-2407",
            Self::OpenAI => "gpt-4o-mini",
        }
    }

    fn default_embedding_model(&self) -> &'static str {
        match self {
            Self::Mistral => "mistral-embed",
            Self::OpenAI => "text-embedding-3-small",
        }
    }
}

/// Configuración completa de la aplicación.
#[derive(Clone, Debug)]
pub struct AppConfig {
    pub server_addr: String,
    pub open_browser: bool,

    pub csv_path: PathBuf,
    pub vector_db_dir: PathBuf,
    pub analytics_dir: PathBuf,
    pub plot_file: PathBuf,

    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub insert_batch_size: usize,
    pub retriever_k: usize,
    pub transcript_capacity: usize,

    pub llm_provider: LlmProvider,
    pub llm_api_key: String,
    pub llm_embedding_model: String,
    pub llm_chat_model: String,
    pub llm_temperature: f64,
}

impl AppConfig {
    /// Carga la configuración desde variables de entorno (usando .env si existe).
    ///
    /// La única variable obligatoria es la clave de API del proveedor; sin ella
    /// el proceso no debe arrancar.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Construye la configuración resolviendo cada variable con `lookup`.
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let llm_provider_str = lookup("LLM_PROVIDER").unwrap_or_else(|| "mistral".to_string());
        let llm_provider = LlmProvider::from_str(&llm_provider_str)?;

        let key_var = llm_provider.api_key_var();
        let llm_api_key = lookup(key_var)
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| anyhow!("Falta {key_var} en el entorno"))?;

        let llm_chat_model = lookup("LLM_CHAT_MODEL")
            .unwrap_or_else(|| llm_provider.default_chat_model().to_string());
        let llm_embedding_model = lookup("LLM_EMBEDDING_MODEL")
            .unwrap_or_else(|| llm_provider.default_embedding_model().to_string());

        let chunk_size = parse_var(&lookup, "CHUNK_SIZE", 500)?;
        let chunk_overlap = parse_var(&lookup, "CHUNK_OVERLAP", 50)?;
        if chunk_overlap >= chunk_size {
            return Err(anyhow!(
                "CHUNK_OVERLAP ({chunk_overlap}) debe ser menor que CHUNK_SIZE ({chunk_size})"
            ));
        }

        let insert_batch_size = parse_var(&lookup, "INSERT_BATCH_SIZE", 5000)?;
        if insert_batch_size == 0 {
            return Err(anyhow!("INSERT_BATCH_SIZE debe ser mayor que cero"));
        }

        Ok(Self {
            server_addr: lookup("SERVER_ADDR").unwrap_or_else(|| "127.0.0.1:5000".to_string()),
            open_browser: parse_var(&lookup, "OPEN_BROWSER", false)?,
            csv_path: path_var(&lookup, "CSV_PATH", "dataset/cleaned/dataset_cleaned.csv"),
            vector_db_dir: path_var(&lookup, "VECTOR_DB_DIR", "chroma_db"),
            analytics_dir: path_var(&lookup, "ANALYTICS_DIR", "static/analytics"),
            plot_file: path_var(&lookup, "PLOT_FILE", "static/analytics/geo_distribution.json"),
            chunk_size,
            chunk_overlap,
            insert_batch_size,
            retriever_k: parse_var(&lookup, "RETRIEVER_K", 10)?,
            transcript_capacity: parse_var(&lookup, "TRANSCRIPT_CAPACITY", 1000)?,
            llm_provider,
            llm_api_key,
            llm_embedding_model,
            llm_chat_model,
            llm_temperature: parse_var(&lookup, "LLM_TEMPERATURE", 0.2)?,
        })
    }
}

fn path_var(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: &str) -> PathBuf {
    PathBuf::from(lookup(name).unwrap_or_else(|| default.to_string()))
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(name) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Valor inválido para {name}: '{raw}'")),
        None => Ok(default),
    }
}

#[cfg(test)]
impl AppConfig {
    /// Configuración mínima para tests, sin tocar el entorno del proceso.
    pub fn for_tests(root: &std::path::Path) -> Self {
        Self {
            server_addr: "127.0.0.1:0".to_string(),
            open_browser: false,
            csv_path: root.join("dataset.csv"),
            vector_db_dir: root.join("chroma_db"),
            analytics_dir: root.join("analytics"),
            plot_file: root.join("analytics").join("geo_distribution.json"),
            chunk_size: 500,
            chunk_overlap: 50,
            insert_batch_size: 5000,
            retriever_k: 10,
            transcript_capacity: 1000,
            llm_provider: LlmProvider::Mistral,
            llm_api_key: "test-key".to_string(),
            llm_embedding_model: "mistral-embed".to_string(),
            llm_chat_model: "mistral-large-2407".to_string(),
            llm_temperature: 0.2,
        }
    }
}

//! Abstracción sobre Rig para trabajar con distintos proveedores de LLM.
//! Se implementan Mistral (por defecto) y OpenAI, tanto para chat como para embeddings.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use rig::completion::{Chat, Message, Prompt};
use rig::embeddings::EmbeddingModel; // <- para .embed_texts
use tracing::debug;

use crate::config::{AppConfig, LlmProvider};
use crate::memory::MemoryTurn;

const QA_PREAMBLE: &str = r#"
You are an assistant that answers questions about a tabular dataset.
Each piece of context is one row of the dataset written as "column: value" lines.
Use only the information in the context and the previous conversation.
If the context does not contain the answer, say clearly that you do not know.
"#;

const CONDENSE_PREAMBLE: &str = r#"
Given a conversation and a follow-up question, rewrite the follow-up question
as a standalone question, in its original language.
Reply with the standalone question only.
"#;

/// Capacidad de embeddings consumida por el vector store.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>>;
}

/// Capacidad de chat consumida por el pipeline conversacional.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Reescribe una pregunta de seguimiento como pregunta autónoma.
    async fn condense_question(&self, history: &[MemoryTurn], question: &str) -> Result<String>;

    /// Genera la respuesta a partir de la pregunta, el contexto recuperado y
    /// la memoria de la conversación.
    async fn answer_with_context(
        &self,
        question: &str,
        context: &str,
        history: &[MemoryTurn],
    ) -> Result<String>;
}

/// Gestor de LLMs y embeddings.
#[derive(Debug, Clone)]
pub struct LlmManager {
    pub provider: LlmProvider,
    api_key: String,
    pub embedding_model: String,
    pub chat_model: String,
    pub temperature: f64,
}

impl LlmManager {
    /// Construye el manager a partir de la configuración.
    pub fn from_config(cfg: &AppConfig) -> Result<Self> {
        if cfg.llm_api_key.is_empty() {
            return Err(anyhow!("La clave de API del proveedor LLM está vacía"));
        }
        Ok(Self {
            provider: cfg.llm_provider.clone(),
            api_key: cfg.llm_api_key.clone(),
            embedding_model: cfg.llm_embedding_model.clone(),
            chat_model: cfg.llm_chat_model.clone(),
            temperature: cfg.llm_temperature,
        })
    }

    // ---------------------------------------------------------------------
    // EMBEDDINGS
    // ---------------------------------------------------------------------

    async fn embed_with_mistral(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>> {
        use rig::client::EmbeddingsClient as _;
        use rig::providers::mistral;

        let client = mistral::Client::new(&self.api_key);
        let embedding_model = client.embedding_model(&self.embedding_model);
        let embeddings = embedding_model.embed_texts(texts).await?;
        Ok(embeddings.into_iter().map(|e| e.vec).collect())
    }

    async fn embed_with_openai(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>> {
        use rig::client::EmbeddingsClient as _;
        use rig::providers::openai;

        let client = openai::Client::new(&self.api_key);
        let embedding_model = client.embedding_model(&self.embedding_model);
        let embeddings = embedding_model.embed_texts(texts).await?;
        Ok(embeddings.into_iter().map(|e| e.vec).collect())
    }

    // ---------------------------------------------------------------------
    // CHAT / COMPLETION
    // ---------------------------------------------------------------------

    async fn prompt_once(&self, preamble: &str, prompt: &str) -> Result<String> {
        use rig::client::CompletionClient as _;
        use rig::providers::{mistral, openai};

        let answer = match self.provider {
            LlmProvider::Mistral => {
                let client = mistral::Client::new(&self.api_key);
                let agent = client
                    .agent(&self.chat_model)
                    .preamble(preamble)
                    .temperature(self.temperature)
                    .build();
                agent.prompt(prompt).await?
            }
            LlmProvider::OpenAI => {
                let client = openai::Client::new(&self.api_key);
                let agent = client
                    .agent(&self.chat_model)
                    .preamble(preamble)
                    .temperature(self.temperature)
                    .build();
                agent.prompt(prompt).await?
            }
        };
        Ok(answer)
    }

    async fn chat_with_context(
        &self,
        question: &str,
        context: &str,
        history: Vec<Message>,
    ) -> Result<String> {
        use rig::client::CompletionClient as _;
        use rig::providers::{mistral, openai};

        let full_context = format!("Context:\n{}", context);

        let answer = match self.provider {
            LlmProvider::Mistral => {
                let client = mistral::Client::new(&self.api_key);
                let agent = client
                    .agent(&self.chat_model)
                    .preamble(QA_PREAMBLE)
                    .temperature(self.temperature)
                    .context(&full_context)
                    .build();
                agent.chat(question.to_string(), history).await?
            }
            LlmProvider::OpenAI => {
                let client = openai::Client::new(&self.api_key);
                let agent = client
                    .agent(&self.chat_model)
                    .preamble(QA_PREAMBLE)
                    .temperature(self.temperature)
                    .context(&full_context)
                    .build();
                agent.chat(question.to_string(), history).await?
            }
        };
        Ok(answer)
    }
}

#[async_trait]
impl Embedder for LlmManager {
    async fn embed_texts(&self, texts: Vec<String>) -> Result<Vec<Vec<f64>>> {
        let expected = texts.len();
        let vectors = match self.provider {
            LlmProvider::Mistral => self.embed_with_mistral(texts).await?,
            LlmProvider::OpenAI => self.embed_with_openai(texts).await?,
        };

        if vectors.len() != expected {
            return Err(anyhow!(
                "Número de embeddings ({}) distinto al número de textos ({})",
                vectors.len(),
                expected
            ));
        }
        Ok(vectors)
    }
}

#[async_trait]
impl ChatBackend for LlmManager {
    async fn condense_question(&self, history: &[MemoryTurn], question: &str) -> Result<String> {
        let prompt = format!(
            "Chat history:\n{}\n\nFollow-up question: {}\nStandalone question:",
            format_history(history),
            question
        );
        let standalone = self.prompt_once(CONDENSE_PREAMBLE, &prompt).await?;
        let standalone = standalone.trim();
        debug!("Pregunta reformulada: {standalone}");

        if standalone.is_empty() {
            Ok(question.to_string())
        } else {
            Ok(standalone.to_string())
        }
    }

    async fn answer_with_context(
        &self,
        question: &str,
        context: &str,
        history: &[MemoryTurn],
    ) -> Result<String> {
        let messages = history
            .iter()
            .flat_map(|turn| {
                [
                    Message::user(turn.question.clone()),
                    Message::assistant(turn.answer.clone()),
                ]
            })
            .collect();
        self.chat_with_context(question, context, messages).await
    }
}

/// Representa la memoria como texto plano para el prompt de reformulación.
fn format_history(history: &[MemoryTurn]) -> String {
    history
        .iter()
        .map(|turn| format!("Human: {}\nAssistant: {}", turn.question, turn.answer))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_is_rendered_as_alternating_roles() {
        let history = vec![
            MemoryTurn::new("How many bookings?", "There are 10 bookings."),
            MemoryTurn::new("And cancelled?", "Three of them."),
        ];
        assert_eq!(
            format_history(&history),
            "Human: How many bookings?\nAssistant: There are 10 bookings.\nHuman: And cancelled?\nAssistant: Three of them."
        );
    }

    #[test]
    fn empty_api_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = AppConfig::for_tests(dir.path());
        cfg.llm_api_key.clear();
        assert!(LlmManager::from_config(&cfg).is_err());
    }
}

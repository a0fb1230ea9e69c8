//! Pipeline conversacional de recuperación (RAG) sobre el vector store.
//!
//! Flujo:
//!   1. Si la sesión tiene historial, el LLM reformula la pregunta como autónoma.
//!   2. Búsqueda vectorial de los `k` chunks más relevantes.
//!   3. El LLM responde con el contexto recuperado y la memoria de la sesión.
//!   4. El intercambio se añade a la memoria de la sesión.

use std::sync::Arc;

use anyhow::Result;
use tracing::debug;

use crate::{
    llm::ChatBackend,
    memory::{ConversationMemory, MemoryTurn},
    vector_store::VectorGateway,
};

const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

pub struct ConversationalPipeline {
    gateway: Arc<dyn VectorGateway>,
    llm: Arc<dyn ChatBackend>,
    memory: ConversationMemory,
    top_k: usize,
}

impl ConversationalPipeline {
    pub fn new(gateway: Arc<dyn VectorGateway>, llm: Arc<dyn ChatBackend>, top_k: usize) -> Self {
        Self {
            gateway,
            llm,
            memory: ConversationMemory::new(),
            top_k,
        }
    }

    /// Responde `question` dentro de la conversación `session`.
    ///
    /// Cualquier error del retriever o del modelo se propaga sin tocar la
    /// memoria; el llamador decide cómo degradar.
    pub async fn answer(&self, session: &str, question: &str) -> Result<String> {
        let history = self.memory.history(session);

        let standalone = if history.is_empty() {
            question.to_string()
        } else {
            self.llm.condense_question(&history, question).await?
        };

        let docs = self.gateway.search(&standalone, self.top_k).await?;
        debug!(
            "{} chunks recuperados para la sesión {} ({} sesiones activas)",
            docs.len(),
            session,
            self.memory.session_count()
        );

        let context = docs
            .iter()
            .map(|d| d.text.as_str())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);

        let answer = self
            .llm
            .answer_with_context(&standalone, &context, &history)
            .await?;

        self.memory
            .append(session, MemoryTurn::new(question, answer.clone()));
        Ok(answer)
    }

    #[cfg(test)]
    pub fn history(&self, session: &str) -> Vec<MemoryTurn> {
        self.memory.history(session)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::vector_store::tests::{chunk, RecordingGateway};
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Backend de chat simulado: devuelve una respuesta fija y registra lo recibido.
    #[derive(Default)]
    pub(crate) struct ScriptedChat {
        pub reply: String,
        pub fail: bool,
        pub condensed: Mutex<Vec<(usize, String)>>,
        pub answered: Mutex<Vec<(String, String, usize)>>,
    }

    impl ScriptedChat {
        pub(crate) fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                ..Default::default()
            }
        }

        pub(crate) fn failing() -> Self {
            Self {
                fail: true,
                ..Default::default()
            }
        }

        pub(crate) fn answer_calls(&self) -> usize {
            self.answered.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatBackend for ScriptedChat {
        async fn condense_question(&self, history: &[MemoryTurn], question: &str) -> Result<String> {
            self.condensed
                .lock()
                .unwrap()
                .push((history.len(), question.to_string()));
            Ok(format!("standalone: {question}"))
        }

        async fn answer_with_context(
            &self,
            question: &str,
            context: &str,
            history: &[MemoryTurn],
        ) -> Result<String> {
            if self.fail {
                return Err(anyhow!("modelo no disponible"));
            }
            self.answered.lock().unwrap().push((
                question.to_string(),
                context.to_string(),
                history.len(),
            ));
            Ok(self.reply.clone())
        }
    }

    fn gateway_with(texts: &[&str]) -> Arc<RecordingGateway> {
        Arc::new(RecordingGateway {
            search_results: texts.iter().map(|t| chunk(t)).collect(),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn first_question_retrieves_k_chunks_and_remembers_the_exchange() {
        let gateway = gateway_with(&["hotel: Resort Hotel", "hotel: City Hotel"]);
        let llm = Arc::new(ScriptedChat::replying("37% of bookings were cancelled."));
        let pipeline = ConversationalPipeline::new(gateway.clone(), llm.clone(), 10);

        let answer = pipeline
            .answer("s1", "What is the cancellation rate?")
            .await
            .unwrap();

        assert_eq!(answer, "37% of bookings were cancelled.");
        assert_eq!(
            *gateway.searches.lock().unwrap(),
            vec![("What is the cancellation rate?".to_string(), 10)]
        );
        assert!(llm.condensed.lock().unwrap().is_empty());

        let answered = llm.answered.lock().unwrap();
        assert_eq!(answered[0].1, "hotel: Resort Hotel\n\n---\n\nhotel: City Hotel");
        assert_eq!(answered[0].2, 0);
        drop(answered);

        assert_eq!(
            pipeline.history("s1"),
            vec![MemoryTurn::new(
                "What is the cancellation rate?",
                "37% of bookings were cancelled."
            )]
        );
    }

    #[tokio::test]
    async fn follow_up_is_condensed_with_session_history_only() {
        let gateway = gateway_with(&["row"]);
        let llm = Arc::new(ScriptedChat::replying("ok"));
        let pipeline = ConversationalPipeline::new(gateway.clone(), llm.clone(), 10);

        pipeline.answer("s1", "first").await.unwrap();
        pipeline.answer("s2", "other user").await.unwrap();
        pipeline.answer("s1", "and then?").await.unwrap();

        assert_eq!(
            *llm.condensed.lock().unwrap(),
            vec![(1, "and then?".to_string())]
        );
        let searches = gateway.searches.lock().unwrap();
        assert_eq!(searches[2].0, "standalone: and then?");
        assert_eq!(pipeline.history("s1").len(), 2);
        assert_eq!(pipeline.history("s2").len(), 1);
    }

    #[tokio::test]
    async fn failures_propagate_and_leave_memory_untouched() {
        let pipeline = ConversationalPipeline::new(
            gateway_with(&["row"]),
            Arc::new(ScriptedChat::failing()),
            10,
        );

        let err = pipeline.answer("s1", "question").await.unwrap_err();
        assert!(err.to_string().contains("modelo no disponible"));
        assert!(pipeline.history("s1").is_empty());
    }
}

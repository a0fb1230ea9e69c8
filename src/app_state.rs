use std::sync::{Arc, Mutex};

use anyhow::Result;
use minijinja::Environment;

use crate::{
    config::AppConfig,
    llm::ChatBackend,
    rag::ConversationalPipeline,
    stats::ApiStats,
    transcript::Transcript,
    vector_store::VectorGateway,
};

pub const INDEX_TEMPLATE: &str = "index.html";

#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub gateway: Arc<dyn VectorGateway>,
    pub pipeline: Arc<ConversationalPipeline>,
    pub stats: Arc<Mutex<ApiStats>>,
    pub transcript: Arc<Mutex<Transcript>>,
    pub templates: Arc<Environment<'static>>,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        gateway: Arc<dyn VectorGateway>,
        llm: Arc<dyn ChatBackend>,
    ) -> Result<Self> {
        let pipeline = ConversationalPipeline::new(gateway.clone(), llm, config.retriever_k);
        let transcript = Transcript::with_capacity(config.transcript_capacity);

        Ok(Self {
            gateway,
            pipeline: Arc::new(pipeline),
            stats: Arc::new(Mutex::new(ApiStats::default())),
            transcript: Arc::new(Mutex::new(transcript)),
            templates: Arc::new(build_templates()?),
            config,
        })
    }
}

/// Plantillas HTML embebidas en el binario. El autoescape se activa por la
/// extensión `.html`.
fn build_templates() -> Result<Environment<'static>> {
    let mut env = Environment::new();
    env.add_template(INDEX_TEMPLATE, include_str!("../templates/index.html"))?;
    Ok(env)
}

// Módulos de la aplicación
mod analytics;
mod api;
mod app_state;
mod config;
mod ingest;
mod llm;
mod memory;
mod models;
mod rag;
mod stats;
mod text_splitter;
mod transcript;
mod vector_store;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::{
    app_state::AppState,
    config::AppConfig,
    llm::LlmManager,
    rag::ConversationalPipeline,
    text_splitter::RecursiveCharacterSplitter,
    vector_store::{LoadOutcome, LocalVectorStore, VectorGateway},
};

#[derive(Parser)]
#[command(
    name = "tabular-rag-chatbot",
    about = "Chatbot RAG sobre un dataset tabular con panel de analítica"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Arranca el servidor web (por defecto).
    Serve,
    /// Conversación interactiva en la terminal. Escribe `exit` para salir.
    Chat,
    /// Muestra cuántos documentos hay en el vector store.
    Check,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Cargar .env e inicializar logging
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    // 2. Cargar configuración (la clave de API es obligatoria)
    let cfg = AppConfig::from_env().context("Error al cargar la configuración")?;

    // 3. Cargar el corpus y asegurar el vector store
    let llm_manager = Arc::new(LlmManager::from_config(&cfg)?);
    let gateway = load_vector_store(&cfg, llm_manager.clone()).await?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => serve(cfg, gateway, llm_manager).await,
        Command::Chat => chat_repl(&cfg, gateway, llm_manager).await,
        Command::Check => {
            let total = gateway.count().await?;
            println!("Documentos en el vector store: {total}");
            Ok(())
        }
    }
}

async fn load_vector_store(
    cfg: &AppConfig,
    llm_manager: Arc<LlmManager>,
) -> Result<Arc<dyn VectorGateway>> {
    let splitter = RecursiveCharacterSplitter::new(cfg.chunk_size, cfg.chunk_overlap)?;
    let chunks = ingest::load_and_process_csv(&cfg.csv_path, &splitter)
        .context("Error cargando el corpus")?;

    let store: Arc<dyn VectorGateway> = Arc::new(LocalVectorStore::new(
        llm_manager,
        cfg.llm_embedding_model.clone(),
    ));
    let outcome = vector_store::create_or_load_vector_db(
        store.as_ref(),
        &cfg.vector_db_dir,
        &chunks,
        cfg.insert_batch_size,
    )
    .await
    .context("Error preparando el vector store")?;
    match outcome {
        LoadOutcome::Reused { documents } => {
            info!("Vector store reutilizado con {documents} documentos.")
        }
        LoadOutcome::Created { documents, batches } => {
            info!("Vector store creado con {documents} documentos en {batches} lotes.")
        }
    }

    Ok(store)
}

async fn serve(
    cfg: AppConfig,
    gateway: Arc<dyn VectorGateway>,
    llm_manager: Arc<LlmManager>,
) -> Result<()> {
    // 4. Crear estado compartido de la aplicación
    let app_state = AppState::new(cfg.clone(), gateway, llm_manager)?;

    // 5. Configurar el router de la API
    let app = Router::new().merge(api::create_router(app_state)).layer(
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any),
    );

    // 6. Iniciar el servidor
    let listener = tokio::net::TcpListener::bind(&cfg.server_addr)
        .await
        .with_context(|| format!("No se pudo escuchar en {}", cfg.server_addr))?;
    let server_url = format!("http://{}", cfg.server_addr);
    info!("🚀 Servidor escuchando en {}", &server_url);

    if cfg.open_browser && webbrowser::open(&server_url).is_err() {
        info!("No se pudo abrir el navegador. Por favor, accede a {} manualmente.", server_url);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("No se pudo instalar el manejador de Ctrl+C: {e}");
                std::future::pending::<()>().await;
            }
            info!("Señal de apagado recibida, iniciando cierre del servidor.");
        })
        .await?;

    info!("✅ Servidor cerrado correctamente.");
    Ok(())
}

/// Bucle de consola sobre el mismo pipeline que usa el servidor.
async fn chat_repl(
    cfg: &AppConfig,
    gateway: Arc<dyn VectorGateway>,
    llm_manager: Arc<LlmManager>,
) -> Result<()> {
    const SESSION: &str = "terminal";

    let pipeline = ConversationalPipeline::new(gateway, llm_manager, cfg.retriever_k);
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    stdout
        .write_all("\nChatbot listo. Escribe 'exit' para salir.\n\n".as_bytes())
        .await?;
    loop {
        stdout.write_all(b"You: ").await?;
        stdout.flush().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let query = line.trim();
        if query.eq_ignore_ascii_case("exit") {
            stdout.write_all("¡Hasta luego!\n".as_bytes()).await?;
            break;
        }
        if query.is_empty() {
            continue;
        }

        match pipeline.answer(SESSION, query).await {
            Ok(answer) => stdout.write_all(format!("Bot: {answer}\n").as_bytes()).await?,
            Err(e) => stdout.write_all(format!("Bot: An error occurred: {e}\n").as_bytes()).await?,
        }
    }
    Ok(())
}

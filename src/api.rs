use std::time::Instant;

use axum::{
    extract::{Form, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use minijinja::context;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::services::ServeDir;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::{
    analytics::{collect_analytics, AnalyticsData},
    app_state::{AppState, INDEX_TEMPLATE},
    models::{now_timestamp, ChatTurn},
    stats::{round2, ApiStats, ApiStatus},
};

/// Respuesta fija cuando el formulario llega sin pregunta.
pub const PROMPT_REQUEST: &str = "Please enter a valid prompt.";

const SESSION_COOKIE: &str = "session_id";

type ApiError = (StatusCode, Json<serde_json::Value>);

// --- Payloads y Respuestas de la API ---

#[derive(Deserialize)]
pub struct ChatForm {
    user_input: Option<String>,
}

#[derive(Serialize)]
pub struct DashboardData {
    chat_history: Vec<ChatTurn>,
    api_stats: ApiStats,
    #[serde(flatten)]
    analytics: AnalyticsData,
}

// --- Router ---

pub fn create_router(app_state: AppState) -> Router {
    let analytics_dir = app_state.config.analytics_dir.clone();
    Router::new()
        .route("/", get(index_handler))
        .route("/get_data", get(get_data_handler))
        .route("/api_stats", get(api_stats_handler))
        .route("/chat", post(chat_handler))
        .route("/show-analytics", get(show_analytics_handler))
        .route("/health", get(health_handler))
        .nest_service("/static/analytics", ServeDir::new(analytics_dir))
        .with_state(app_state)
}

// --- Handlers ---

#[axum::debug_handler]
async fn index_handler(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    render_page(&state, context! { chat_history => Vec::<ChatTurn>::new() })
}

#[axum::debug_handler]
async fn get_data_handler(State(state): State<AppState>) -> Json<DashboardData> {
    let analytics = collect_analytics(&state.config.analytics_dir, &state.config.plot_file);
    Json(DashboardData {
        chat_history: transcript_snapshot(&state),
        api_stats: state.stats.lock().unwrap().clone(),
        analytics,
    })
}

#[axum::debug_handler]
async fn api_stats_handler(State(state): State<AppState>) -> Json<ApiStats> {
    Json(state.stats.lock().unwrap().clone())
}

/// START -> TIMED_INVOKE -> STATS_UPDATE -> RESPOND.
#[axum::debug_handler]
async fn chat_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    form: Option<Form<ChatForm>>,
) -> Result<Response, ApiError> {
    let start = Instant::now();
    let (session, new_session) = session_from_headers(&headers);
    let user_input = form.and_then(|Form(f)| f.user_input);

    // Una entrada con solo espacios cuenta como ausente (no solo la cadena vacía):
    // no llega al pipeline, pero se guarda tal cual en el transcript.
    let bot_response = match user_input.as_deref().filter(|q| !q.trim().is_empty()) {
        None => PROMPT_REQUEST.to_string(),
        Some(question) => match state.pipeline.answer(&session, question).await {
            Ok(answer) => answer,
            Err(e) => {
                error!("Error procesando la consulta RAG: {e:#}");
                state.stats.lock().unwrap().mark_degraded();
                format!("An error occurred: {e}")
            }
        },
    };

    let response_time_ms = round2(start.elapsed().as_secs_f64() * 1000.0);
    let api_stats = {
        let mut stats = state.stats.lock().unwrap();
        stats.record(response_time_ms);
        stats.clone()
    };

    let chat_history = {
        let mut transcript = state.transcript.lock().unwrap();
        transcript.push(ChatTurn {
            user: user_input,
            bot: bot_response,
            response_time_ms,
            timestamp: now_timestamp(),
        });
        debug!("Transcript con {} turnos retenidos", transcript.retained());
        transcript.turns()
    };

    let analytics = collect_analytics(&state.config.analytics_dir, &state.config.plot_file);
    let page = render_page(
        &state,
        context! {
            chat_history => chat_history,
            api_stats => api_stats,
            analytics_images => analytics.analytics_images,
            captions => analytics.captions,
            plot_html => analytics.plot_html,
        },
    )?;

    let mut response = page.into_response();
    if new_session {
        let cookie = format!("{SESSION_COOKIE}={session}; Path=/; HttpOnly; SameSite=Lax");
        let value = HeaderValue::from_str(&cookie).map_err(|e| internal_error(e.to_string()))?;
        response.headers_mut().insert(header::SET_COOKIE, value);
    }
    Ok(response)
}

/// Ruta heredada: misma página, con transcript y analítica pero sin estadísticas.
#[axum::debug_handler]
async fn show_analytics_handler(State(state): State<AppState>) -> Result<Html<String>, ApiError> {
    let analytics = collect_analytics(&state.config.analytics_dir, &state.config.plot_file);
    render_page(
        &state,
        context! {
            chat_history => transcript_snapshot(&state),
            analytics_images => analytics.analytics_images,
            captions => analytics.captions,
            plot_html => analytics.plot_html,
        },
    )
}

/// Búsqueda trivial contra el vector store. Es el único camino que puede
/// devolver el estado a `Online`.
#[axum::debug_handler]
async fn health_handler(State(state): State<AppState>) -> Json<serde_json::Value> {
    let status = match state.gateway.search("test", 1).await {
        Ok(_) => ApiStatus::Online,
        Err(e) => {
            error!("Health check fallido: {e:#}");
            ApiStatus::Degraded
        }
    };
    state.stats.lock().unwrap().set_status(status);
    info!("Health check: {:?}", status);
    Json(json!({ "status": status }))
}

// --- Utilidades ---

fn render_page(state: &AppState, ctx: minijinja::Value) -> Result<Html<String>, ApiError> {
    state
        .templates
        .get_template(INDEX_TEMPLATE)
        .and_then(|tpl| tpl.render(ctx))
        .map(Html)
        .map_err(|e| {
            error!("Error renderizando la plantilla: {e:#}");
            internal_error(format!("Error renderizando la página: {e}"))
        })
}

fn transcript_snapshot(state: &AppState) -> Vec<ChatTurn> {
    state.transcript.lock().unwrap().turns()
}

fn internal_error(message: String) -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": message })),
    )
}

/// Devuelve la sesión de la cookie si es un UUID válido; si no, genera una
/// nueva e indica que hay que enviarla al cliente.
fn session_from_headers(headers: &HeaderMap) -> (String, bool) {
    let existing = headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .and_then(|(_, value)| Uuid::parse_str(value.trim()).ok());

    match existing {
        Some(id) => (id.to_string(), false),
        None => (Uuid::new_v4().to_string(), true),
    }
}

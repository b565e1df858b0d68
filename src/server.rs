//! Web front-end and JSON API.
//!
//! Browser routes keep state in a `tower-sessions` session identified by
//! the `sessionid` cookie; JSON routes are stateless.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/` | Site index with the input form |
//! | `POST` | `/` | Extract terms from text, or start the Zotero flow |
//! | `GET`  | `/discoveries/` | Search terms of the current session |
//! | `GET`  | `/stash/` | Library items and terms of the current session |
//! | `GET`  | `/auth/zotero/` | Begin Zotero OAuth |
//! | `GET`  | `/auth/zotero/callback` | Zotero OAuth callback |
//! | `GET`  | `/auth/logout/` | Destroy the session |
//! | `GET`  | `/auth/login-error/` | Plain-text login failure page |
//! | `POST` | `/api/keywords` | Frequency keywords for `{ "text", "max_items"? }` |
//! | `POST` | `/api/terms` | DBpedia terms for `{ "text" }` |
//! | `GET`  | `/health` | Health check (returns version) |
//!
//! # Error Contract
//!
//! JSON routes answer errors with
//!
//! ```json
//! { "error": { "code": "bad_request", "message": "text must not be empty" } }
//! ```
//!
//! Error codes: `bad_request` (400), `upstream` (502), `internal` (500).
//! Browser routes never show an error body for a failed OAuth exchange:
//! the failure is logged and the user is sent back to the site index.

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tower_sessions::{MemoryStore, Session, SessionManagerLayer};

use crate::config::Config;
use crate::db;
use crate::forms::{self, InputForm, Submission};
use crate::keywords::common_words;
use crate::migrate;
use crate::models::SearchTerms;
use crate::pages::Pages;
use crate::session::{self, SessionData};
use crate::spotlight::SpotlightClient;
use crate::stopwords::Stopwords;
use crate::users;
use crate::zotero::ZoteroClient;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub pool: SqlitePool,
    pages: Arc<Pages>,
    stopwords: Arc<Stopwords>,
    spotlight: SpotlightClient,
    zotero: Option<ZoteroClient>,
    sessions: SessionManagerLayer<MemoryStore>,
}

impl AppState {
    /// Connect the database (creating the schema if needed) and build the
    /// HTTP clients and templates.
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let pool = db::connect(config).await?;
        migrate::migrate_pool(&pool).await?;

        let zotero = match &config.zotero {
            Some(z) => Some(ZoteroClient::new(z)?),
            None => None,
        };

        Ok(Self {
            config: Arc::new(config.clone()),
            pool,
            pages: Arc::new(Pages::new()?),
            stopwords: Arc::new(Stopwords::with_extra(&config.keywords.extra_stopwords)),
            spotlight: SpotlightClient::new(&config.spotlight)?,
            zotero,
            sessions: session::layer(config.server.session_ttl_secs)?,
        })
    }

    /// Run the configured extractor over `text`.
    async fn extract_terms(&self, text: &str) -> anyhow::Result<SearchTerms> {
        if self.config.keywords.uses_dbpedia() {
            self.spotlight.get_search_terms(text).await
        } else {
            Ok(common_words(
                text,
                self.config.keywords.max_items,
                &self.stopwords,
            ))
        }
    }
}

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api = Router::new()
        .route("/api/keywords", post(handle_api_keywords))
        .route("/api/terms", post(handle_api_terms))
        .route("/health", get(handle_health))
        .layer(cors);

    Router::new()
        .route("/", get(handle_site_index).post(handle_submit))
        .route("/discoveries/", get(handle_discoveries))
        .route("/stash/", get(handle_view_items))
        .route("/auth/zotero/", get(handle_zotero_login))
        .route("/auth/zotero/callback", get(handle_zotero_oauth))
        .route("/auth/logout/", get(handle_logout))
        .route("/auth/login-error/", get(handle_login_error))
        .merge(api)
        .layer(state.sessions.clone())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` and runs until terminated.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = AppState::new(config).await?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.server.bind))?;
    tracing::info!("listening on http://{}", config.server.bind);

    axum::serve(listener, app).await?;
    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

/// Internal error type that converts into an Axum HTTP response.
pub struct AppError {
    status: StatusCode,
    code: String,
    message: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: ErrorDetail {
                code: self.code,
                message: self.message,
            },
        };
        (self.status, Json(body)).into_response()
    }
}

fn bad_request(message: impl Into<String>) -> AppError {
    AppError {
        status: StatusCode::BAD_REQUEST,
        code: "bad_request".to_string(),
        message: message.into(),
    }
}

fn upstream(err: anyhow::Error) -> AppError {
    tracing::warn!("upstream service failed: {:#}", err);
    AppError {
        status: StatusCode::BAD_GATEWAY,
        code: "upstream".to_string(),
        message: format!("{:#}", err),
    }
}

fn internal(err: anyhow::Error) -> AppError {
    tracing::error!("internal error: {:#}", err);
    AppError {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        code: "internal".to_string(),
        message: err.to_string(),
    }
}

// ============ Helpers ============

/// Session data, starting over when the stored value cannot be read.
async fn session_data(session: &Session) -> SessionData {
    session::load(session).await.unwrap_or_else(|e| {
        tracing::warn!("{:#}", e);
        SessionData::default()
    })
}

fn render(state: &AppState, name: &str, data: serde_json::Value) -> Result<Html<String>, AppError> {
    state.pages.render(name, &data).map(Html).map_err(internal)
}

fn index_page(
    state: &AppState,
    session: &SessionData,
    form: &InputForm,
    error: Option<&str>,
) -> Result<Html<String>, AppError> {
    render(
        state,
        "index",
        json!({
            "title": "Home",
            "zotero_username": session.zotero_username,
            "form": form,
            "error": error,
            "labels": {
                "text": forms::TEXT_LABEL,
                "text_help": forms::TEXT_HELP,
                "zotero": forms::ZOTERO_LABEL,
                "zotero_help": forms::ZOTERO_HELP,
            },
        }),
    )
}

// ============ Site ============

async fn handle_site_index(
    State(state): State<AppState>,
    session: Session,
) -> Result<Html<String>, AppError> {
    let data = session_data(&session).await;
    index_page(&state, &data, &InputForm::default(), None)
}

async fn handle_submit(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<InputForm>,
) -> Result<Response, AppError> {
    let mut data = session_data(&session).await;

    let text = match form.validate() {
        Ok(Submission::Text(text)) => text,
        Ok(Submission::Zotero(user)) => {
            tracing::debug!(user = %user, "starting zotero flow from form");
            return Ok(Redirect::to("/auth/zotero/").into_response());
        }
        Err(message) => {
            return Ok(index_page(&state, &data, &form, Some(message))?.into_response());
        }
    };

    let terms = match state.extract_terms(&text).await {
        Ok(terms) => terms,
        Err(e) => {
            tracing::warn!("term extraction failed: {:#}", e);
            let message = "Could not extract search terms from that text. Please try again.";
            return Ok(index_page(&state, &data, &form, Some(message))?.into_response());
        }
    };

    data.search_terms = Some(forms::sanitize(terms));
    data.stash.clear();
    session::save(&session, &data).await.map_err(internal)?;

    Ok(Redirect::to("/discoveries/").into_response())
}

async fn handle_discoveries(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, AppError> {
    let data = session_data(&session).await;

    match &data.search_terms {
        Some(terms) if !terms.is_empty() => Ok(render(
            &state,
            "discoveries",
            json!({
                "title": "Discoveries",
                "zotero_username": data.zotero_username,
                "terms": terms,
            }),
        )?
        .into_response()),
        _ => Ok(Redirect::to("/").into_response()),
    }
}

async fn handle_view_items(
    State(state): State<AppState>,
    session: Session,
) -> Result<Html<String>, AppError> {
    let data = session_data(&session).await;

    render(
        &state,
        "stash",
        json!({
            "title": "Stash",
            "zotero_username": data.zotero_username,
            "items": data.stash,
            "terms": data.search_terms,
        }),
    )
}

// ============ Zotero auth ============

async fn handle_zotero_login(State(state): State<AppState>, session: Session) -> Response {
    let Some(zotero) = state.zotero.clone() else {
        tracing::warn!("zotero login requested but [zotero] is not configured");
        return Redirect::to("/auth/login-error/").into_response();
    };

    let mut data = session_data(&session).await;

    let token = match zotero.request_token().await {
        Ok(token) => token,
        Err(e) => {
            tracing::warn!("zotero request token failed: {:#}", e);
            return Redirect::to("/auth/login-error/").into_response();
        }
    };

    let authorize = match zotero.authorize_url(&token) {
        Ok(url) => url,
        Err(e) => {
            tracing::warn!("{:#}", e);
            return Redirect::to("/auth/login-error/").into_response();
        }
    };

    data.request_token = Some(token);
    if let Err(e) = session::save(&session, &data).await {
        return internal(e).into_response();
    }
    Redirect::to(&authorize).into_response()
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    oauth_verifier: Option<String>,
    oauth_token: Option<String>,
}

/// Exchange the verifier, read the library and build the session's terms.
async fn complete_oauth(
    state: &AppState,
    data: &mut SessionData,
    params: &CallbackParams,
) -> anyhow::Result<()> {
    let zotero = state
        .zotero
        .as_ref()
        .ok_or_else(|| anyhow::anyhow!("zotero is not configured"))?;
    let verifier = params
        .oauth_verifier
        .as_deref()
        .ok_or_else(|| anyhow::anyhow!("callback missing oauth_verifier"))?;
    let request_token = data
        .request_token
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no request token in session"))?;

    if let Some(token) = &params.oauth_token {
        if token != &request_token.token {
            anyhow::bail!("callback oauth_token does not match the session request token");
        }
    }

    let info = zotero.access_info(verifier, &request_token).await?;
    let items = zotero
        .get_user_items(&info.userid, &info.api_key, zotero_num_items(state))
        .await?;

    let terms = common_words(
        &items.combined_text(),
        state.config.keywords.max_items,
        &state.stopwords,
    );

    let user = users::upsert_zotero_user(&state.pool, &info).await?;
    tracing::info!(
        user = %user.username,
        items = items.items.len(),
        keywords = terms.keywords.len(),
        "zotero library linked"
    );

    data.search_terms = Some(forms::sanitize(terms));
    data.stash = items.items;
    data.zotero_username = Some(user.username);
    data.request_token = None;
    Ok(())
}

fn zotero_num_items(state: &AppState) -> u32 {
    state
        .config
        .zotero
        .as_ref()
        .map(|z| z.num_items)
        .unwrap_or(99)
}

async fn handle_zotero_oauth(
    State(state): State<AppState>,
    session: Session,
    Query(params): Query<CallbackParams>,
) -> Response {
    let mut data = session_data(&session).await;
    data.oauth_verifier = params.oauth_verifier.clone();

    let target = match complete_oauth(&state, &mut data, &params).await {
        Ok(()) => "/discoveries/",
        Err(e) => {
            tracing::warn!("zotero oauth failed: {:#}", e);
            "/"
        }
    };

    if let Err(e) = session::save(&session, &data).await {
        return internal(e).into_response();
    }
    Redirect::to(target).into_response()
}

async fn handle_logout(session: Session) -> Response {
    if let Err(e) = session::destroy(&session).await {
        return internal(e).into_response();
    }
    Redirect::to("/").into_response()
}

async fn handle_login_error() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain")],
        "there was a problem logging you in",
    )
}

// ============ JSON API ============

#[derive(Debug, Deserialize)]
struct KeywordsRequest {
    text: String,
    max_items: Option<usize>,
}

async fn handle_api_keywords(
    State(state): State<AppState>,
    Json(req): Json<KeywordsRequest>,
) -> Result<Json<SearchTerms>, AppError> {
    if req.text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }
    let max_items = req.max_items.unwrap_or(state.config.keywords.max_items);
    Ok(Json(common_words(&req.text, max_items, &state.stopwords)))
}

#[derive(Debug, Deserialize)]
struct TermsRequest {
    text: String,
}

async fn handle_api_terms(
    State(state): State<AppState>,
    Json(req): Json<TermsRequest>,
) -> Result<Json<SearchTerms>, AppError> {
    if req.text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }
    let terms = state
        .spotlight
        .get_search_terms(&req.text)
        .await
        .map_err(upstream)?;
    Ok(Json(terms))
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

use crate::client::{
    CaseApi, ClientConfig, ClientError, HttpCaseApi, IMAGE_PREFIX, SESSION_COOKIE, TEMP_PREFIX,
    parse_weights,
};
use crate::payload::ResultPayload;
use crate::render::{Fragments, ItemAction, RenderError, render_fragments};
use askama::Template;
use axum::{
    Form, Json, Router,
    extract::State,
    http::{HeaderMap, HeaderValue, StatusCode, Uri, header},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use cookie::{Cookie, SameSite};
use rand::{Rng, distributions::Alphanumeric, thread_rng};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{info, warn};

type SharedState = Arc<AppState>;

pub struct AppState {
    pub api: HttpCaseApi,
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub backend: ClientConfig,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            backend: ClientConfig::default(),
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
    Client(ClientError),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
            WebError::Client(err) => write!(f, "backend client error: {err}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

impl From<ClientError> for WebError {
    fn from(value: ClientError) -> Self {
        WebError::Client(value)
    }
}

pub async fn serve(config: WebConfig) -> Result<(), WebError> {
    let backend = config.backend.backend_url.clone();
    let state = Arc::new(AppState {
        api: HttpCaseApi::new(config.backend)?,
    });
    let router = build_router(state);
    info!(%config.addr, %backend, "Binding HTTP listener");
    let listener = TcpListener::bind(config.addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("HTTP server exited");
    Ok(())
}

#[derive(Debug)]
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }
}

impl From<ClientError> for ApiError {
    fn from(err: ClientError) -> Self {
        warn!(error = %err, "case backend call failed");
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: err.to_string(),
        }
    }
}

impl From<RenderError> for ApiError {
    fn from(err: RenderError) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let payload = json!({ "error": self.message });
        (self.status, Json(payload)).into_response()
    }
}

fn build_router(state: SharedState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/render", post(render_payload))
        .route("/fragments/query", post(fragments_query))
        .route("/fragments/item", post(fragments_item))
        .route("/fragments/weights", post(fragments_weights))
        .route(&format!("{IMAGE_PREFIX}*path"), get(backend_asset))
        .route(&format!("{TEMP_PREFIX}*path"), get(backend_asset))
        .route("/healthz", get(health))
        .with_state(state)
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        if let Ok(mut stream) = signal(SignalKind::terminate()) {
            let _ = stream.recv().await;
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "archseek-view" }))
}

async fn index(headers: HeaderMap) -> Response {
    let page = IndexTemplate {
        version: env!("CARGO_PKG_VERSION"),
    };
    let body = match page.render() {
        Ok(body) => body,
        Err(err) => return ApiError::from(RenderError::from(err)).into_response(),
    };
    // Re-issued on every visit to extend its lifetime.
    let session_id = session_from_headers(&headers).unwrap_or_else(generate_session_id);
    let cookie = Cookie::build((SESSION_COOKIE, session_id))
        .path("/")
        .same_site(SameSite::Lax)
        .max_age(cookie::time::Duration::hours(1))
        .build();
    ([(header::SET_COOKIE, cookie.to_string())], Html(body)).into_response()
}

/// Case images and uploaded thumbnails use backend-relative URLs, so the page
/// origin has to serve them too.
async fn backend_asset(
    State(state): State<SharedState>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Response, ApiError> {
    let path = uri.path_and_query().map_or(uri.path(), |value| value.as_str());
    let asset = session_api(&state, &headers).fetch_asset(path).await?;
    let status = StatusCode::from_u16(asset.status.as_u16()).unwrap_or(StatusCode::BAD_GATEWAY);
    let mut response = (status, asset.body).into_response();
    if let Some(content_type) = asset
        .content_type
        .as_deref()
        .and_then(|value| HeaderValue::from_str(value).ok())
    {
        response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }
    Ok(response)
}

async fn render_payload(Json(payload): Json<ResultPayload>) -> Result<Json<Fragments>, ApiError> {
    Ok(Json(render_fragments(&payload)?))
}

#[derive(Debug, Deserialize)]
struct QueryForm {
    #[serde(rename = "inputData", default)]
    input_data: String,
}

#[derive(Debug, Deserialize)]
struct ItemForm {
    action: String,
    case_id: String,
}

#[derive(Debug, Deserialize)]
struct WeightsForm {
    weights: String,
}

async fn fragments_query(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Form(form): Form<QueryForm>,
) -> Result<Json<Fragments>, ApiError> {
    let payload = session_api(&state, &headers).query(&form.input_data).await?;
    Ok(Json(render_fragments(&payload)?))
}

async fn fragments_item(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Form(form): Form<ItemForm>,
) -> Result<Json<Fragments>, ApiError> {
    let action = ItemAction::parse(&form.action)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown action {:?}", form.action)))?;
    info!(case_id = %form.case_id, %action, "forwarding case affordance click");
    let payload = session_api(&state, &headers)
        .mutate(action, &form.case_id)
        .await?;
    Ok(Json(render_fragments(&payload)?))
}

async fn fragments_weights(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Form(form): Form<WeightsForm>,
) -> Result<Json<Fragments>, ApiError> {
    let weights = parse_weights(&form.weights)
        .ok_or_else(|| ApiError::bad_request("`weights` must be comma-separated numbers"))?;
    let payload = session_api(&state, &headers)
        .apply_weights(&weights)
        .await?;
    Ok(Json(render_fragments(&payload)?))
}

fn session_api(state: &AppState, headers: &HeaderMap) -> HttpCaseApi {
    match session_from_headers(headers) {
        Some(session_id) => state.api.with_session(session_id),
        None => state.api.clone(),
    }
}

fn session_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(Cookie::split_parse)
        .filter_map(Result::ok)
        .find(|cookie| cookie.name() == SESSION_COOKIE && !cookie.value().is_empty())
        .map(|cookie| cookie.value().to_string())
}

fn generate_session_id() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>ArchSeek</title>
    <style>
      body { font-family: system-ui, sans-serif; margin: 0; background: #f8fafc; color: #0f172a; }
      main { display: grid; grid-template-columns: 20rem 1fr; gap: 2rem; padding: 2rem; }
      .case { background: #fff; border-radius: .5rem; padding: 1rem; margin-bottom: 1rem; box-shadow: 0 1px 3px #0002; }
      .case-head { display: flex; gap: 1rem; align-items: baseline; }
      .case-title { font-weight: 700; flex: 1; }
      .plus, .remove { cursor: pointer; user-select: none; }
      .image-container img, #query-thumbnail img { max-width: 100%; }
      .tag { color: #64748b; margin-right: .5rem; }
      .slider { width: 100%; }
      body.busy .plus, body.busy .remove { pointer-events: none; opacity: .5; }
    </style>
  </head>
  <body>
    <main>
      <aside>
        <form id="search">
          <input type="text" name="inputData" placeholder="Describe a project" />
          <button type="submit">Search</button>
        </form>
        <div id="query-thumbnail"></div>
        <div id="queryset"></div>
        <button type="button" id="apply-weights">Apply weights</button>
        <p class="tag">archseek-view v{{ version }}</p>
      </aside>
      <section id="result"></section>
    </main>
    <script>
      const regions = {
        result: document.getElementById("result"),
        queryset: document.getElementById("queryset"),
        thumbnail: document.getElementById("query-thumbnail"),
      };
      let inFlight = false;

      function show(fragments) {
        regions.result.innerHTML = fragments.result;
        regions.queryset.innerHTML = fragments.queryset;
        if (fragments.thumbnail !== null) {
          regions.thumbnail.innerHTML = fragments.thumbnail;
        }
      }

      async function send(path, fields) {
        if (inFlight) {
          return;
        }
        inFlight = true;
        document.body.classList.add("busy");
        try {
          const response = await fetch(path, { method: "POST", body: new URLSearchParams(fields) });
          if (response.ok) {
            show(await response.json());
          } else {
            console.warn("request failed", path, response.status);
          }
        } finally {
          inFlight = false;
          document.body.classList.remove("busy");
        }
      }

      regions.result.addEventListener("click", (event) => {
        const target = event.target.closest("[data-caseid]");
        if (target) {
          send("/fragments/item", { action: target.dataset.action, case_id: target.dataset.caseid });
        }
      });

      document.getElementById("search").addEventListener("submit", (event) => {
        event.preventDefault();
        send("/fragments/query", new FormData(event.target));
      });

      document.getElementById("apply-weights").addEventListener("click", () => {
        const weights = Array.from(regions.queryset.querySelectorAll(".slider"), (slider) => slider.value);
        send("/fragments/weights", { weights: weights.join(",") });
      });
    </script>
  </body>
</html>"#,
    ext = "html"
)]
struct IndexTemplate {
    version: &'static str,
}

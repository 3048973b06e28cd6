use crate::{
    DisplayJoke, HttpJokeSource, JokeError, LengthBucket, SearchPresenter, SessionState,
    SourceConfig,
};
use askama::Template;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
};
use serde::Deserialize;
use serde_json::json;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::compression::CompressionLayer;
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::{error, info};

type SharedState = Arc<AppState>;

#[derive(Clone)]
pub struct AppState {
    pub source: HttpJokeSource,
    pub theme: WebTheme,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum WebTheme {
    #[default]
    Tailwind,
    Bootstrap,
}

impl fmt::Display for WebTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebTheme::Tailwind => write!(f, "tailwind"),
            WebTheme::Bootstrap => write!(f, "bootstrap"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Chrome {
    use_tailwind: bool,
    use_bootstrap: bool,
    body_class: &'static str,
    main_class: &'static str,
    card_class: &'static str,
    eyebrow_class: &'static str,
    headline_class: &'static str,
    lede_class: &'static str,
    button_class: &'static str,
    input_class: &'static str,
    alert_class: &'static str,
    joke_class: &'static str,
}

impl Chrome {
    fn new(theme: WebTheme) -> Self {
        match theme {
            WebTheme::Tailwind => Self {
                use_tailwind: true,
                use_bootstrap: false,
                body_class: "bg-slate-50 text-slate-900",
                main_class: "min-h-screen flex flex-col items-center justify-start py-10 px-4",
                card_class: "max-w-4xl w-full space-y-6",
                eyebrow_class: "uppercase tracking-wide text-sm text-slate-500",
                headline_class: "text-4xl font-extrabold tracking-tight",
                lede_class: "text-lg text-slate-600",
                button_class: "inline-flex items-center rounded-md bg-slate-900 px-4 py-2 text-white font-semibold shadow hover:bg-slate-800 transition-colors",
                input_class: "flex-1 rounded-md border border-slate-300 px-3 py-2",
                alert_class: "rounded-md bg-red-50 border border-red-200 px-4 py-3 text-red-800",
                joke_class: "px-4 py-3 bg-white rounded shadow",
            },
            WebTheme::Bootstrap => Self {
                use_tailwind: false,
                use_bootstrap: true,
                body_class: "bg-light text-dark",
                main_class: "container py-5",
                card_class: "mx-auto col-lg-8",
                eyebrow_class: "text-uppercase text-muted mb-2",
                headline_class: "display-5 fw-bold",
                lede_class: "lead mb-4",
                button_class: "btn btn-primary px-4",
                input_class: "form-control",
                alert_class: "alert alert-danger",
                joke_class: "list-group-item",
            },
        }
    }
}

#[derive(Clone)]
pub struct WebConfig {
    pub addr: SocketAddr,
    pub theme: WebTheme,
    pub source: SourceConfig,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            theme: WebTheme::default(),
            source: SourceConfig::default(),
        }
    }
}

#[derive(Debug)]
pub enum WebError {
    Io(std::io::Error),
    Source(JokeError),
}

impl fmt::Display for WebError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WebError::Io(err) => write!(f, "io error: {err}"),
            WebError::Source(err) => write!(f, "joke source error: {err}"),
        }
    }
}

impl std::error::Error for WebError {}

impl From<std::io::Error> for WebError {
    fn from(value: std::io::Error) -> Self {
        WebError::Io(value)
    }
}

impl From<JokeError> for WebError {
    fn from(value: JokeError) -> Self {
        WebError::Source(value)
    }
}

pub async fn serve(config: WebConfig) -> Result<(), WebError> {
    let source = HttpJokeSource::new(config.source.clone())?;
    let state = Arc::new(AppState {
        source,
        theme: config.theme,
    });
    let router = build_router(state);
    info!(
        %config.addr,
        theme = %config.theme,
        api = %config.source.base_url,
        "Binding HTTP listener"
    );
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
    fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
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
        .route("/", get(home))
        .route("/random", get(random_html))
        .route("/search", get(search_html))
        .route("/api/random", get(api_random))
        .route("/api/search", get(api_search))
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

#[derive(Debug, Deserialize)]
struct SearchParams {
    term: Option<String>,
}

impl SearchParams {
    fn term(&self) -> &str {
        self.term.as_deref().unwrap_or_default()
    }
}

async fn home(State(state): State<SharedState>) -> impl IntoResponse {
    render_page(state.theme, &SessionState::default())
}

async fn random_html(State(state): State<SharedState>) -> impl IntoResponse {
    let presenter = SearchPresenter::new(state.source.clone());
    let session = presenter.fetch_random().await;
    render_page(state.theme, &session)
}

async fn search_html(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> impl IntoResponse {
    let presenter = SearchPresenter::new(state.source.clone());
    let session = presenter.search(params.term()).await;
    render_page(state.theme, &session)
}

async fn api_random(State(state): State<SharedState>) -> Result<Json<SessionState>, ApiError> {
    let presenter = SearchPresenter::new(state.source.clone());
    into_api_response(presenter.fetch_random().await)
}

async fn api_search(
    State(state): State<SharedState>,
    Query(params): Query<SearchParams>,
) -> Result<Json<SessionState>, ApiError> {
    let presenter = SearchPresenter::new(state.source.clone());
    into_api_response(presenter.search(params.term()).await)
}

fn into_api_response(session: SessionState) -> Result<Json<SessionState>, ApiError> {
    if let Some(message) = &session.error {
        return Err(ApiError::bad_gateway(message.clone()));
    }
    Ok(Json(session))
}

async fn health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "service": "jokes-web" }))
}

struct BucketView<'a> {
    label: &'static str,
    jokes: &'a [DisplayJoke],
}

fn render_page(theme: WebTheme, session: &SessionState) -> Response {
    let buckets = LengthBucket::ALL
        .iter()
        .map(|bucket| BucketView {
            label: bucket.label(),
            jokes: session.grouped.bucket(*bucket),
        })
        .collect();
    let template = JokesTemplate {
        chrome: Chrome::new(theme),
        session,
        error_message: session.error.as_deref().unwrap_or_default(),
        random_text: session
            .random_joke
            .as_ref()
            .map(|joke| joke.joke.as_str())
            .unwrap_or_default(),
        has_results: !session.grouped.is_empty(),
        buckets,
        version: env!("CARGO_PKG_VERSION"),
    };
    match template.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => {
            error!(error = %err, "failed to render jokes page");
            (StatusCode::INTERNAL_SERVER_ERROR, "failed to render page").into_response()
        }
    }
}

#[derive(Template)]
#[template(
    source = r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Jokes{% if session.search_term.len() > 0 %} • {{ session.search_term }}{% endif %}</title>
    {% if chrome.use_tailwind %}
    <script src="https://cdn.jsdelivr.net/npm/@tailwindcss/browser@4"></script>
    {% endif %}
    {% if chrome.use_bootstrap %}
    <link href="https://cdn.jsdelivr.net/npm/bootstrap@5.3.8/dist/css/bootstrap.min.css" rel="stylesheet" integrity="sha384-sRIl4kxILFvY47J16cr9ZwB07vP4J8+LH7qKQnuqkuIAvNWLzeN8tE5YBujZqJLB" crossorigin="anonymous">
    {% endif %}
  </head>
  <body class="{{ chrome.body_class }}">
    <main class="{{ chrome.main_class }}">
      <div class="{{ chrome.card_class }} space-y-6">
        <div>
          <p class="{{ chrome.eyebrow_class }}">Jokes v{{ version }}</p>
          <h1 class="{{ chrome.headline_class }}">Random jokes and joke search</h1>
        </div>

        {% if error_message.len() > 0 %}
        <div class="{{ chrome.alert_class }}" role="alert">{{ error_message }}</div>
        {% endif %}

        <section id="random" class="space-y-3">
          <a href="/random" class="{{ chrome.button_class }}">Get a random joke</a>
          {% if random_text.len() > 0 %}
          <blockquote class="{{ chrome.lede_class }}">{{ random_text }}</blockquote>
          {% endif %}
        </section>

        <section id="search" class="space-y-4">
          <form action="/search" method="get" class="flex gap-3">
            <input type="search" name="term" value="{{ session.search_term }}" placeholder="Search jokes" class="{{ chrome.input_class }}">
            <button type="submit" class="{{ chrome.button_class }}">Search</button>
          </form>
          {% if session.loading %}
          <p>Loading…</p>
          {% endif %}
          {% if has_results %}
            {% for bucket in buckets %}
            {% if bucket.jokes.len() > 0 %}
            <div class="space-y-2">
              <h2 class="text-xl font-semibold">{{ bucket.label }} ({{ bucket.jokes.len() }})</h2>
              <ul class="space-y-2">
                {% for joke in bucket.jokes %}
                <li class="{{ chrome.joke_class }}" data-id="{{ joke.id }}">{{ joke.highlighted|safe }}</li>
                {% endfor %}
              </ul>
            </div>
            {% endif %}
            {% endfor %}
          {% else %}
            {% if session.search_term.len() > 0 && error_message.len() == 0 %}
            <p>No jokes found for “{{ session.search_term }}”.</p>
            {% endif %}
          {% endif %}
        </section>
      </div>
    </main>
  </body>
</html>"#,
    ext = "html"
)]
struct JokesTemplate<'a> {
    chrome: Chrome,
    session: &'a SessionState,
    error_message: &'a str,
    random_text: &'a str,
    has_results: bool,
    buckets: Vec<BucketView<'a>>,
    version: &'static str,
}

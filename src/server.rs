use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower::ServiceBuilder;
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{info, warn};

use crate::{
    api::ScannerApi,
    session::{Rejected, Session},
    types::FormPatch,
    view::ViewModel,
};

const INDEX_HTML: &str = include_str!("../ui/index.html");

pub struct AppState<A> {
    session: Arc<Session<A>>,
}

impl<A> Clone for AppState<A> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
        }
    }
}

/// Build the UI router around an existing session.
pub fn router<A: ScannerApi>(session: Arc<Session<A>>) -> Router {
    let state = AppState { session };

    let api = Router::new()
        .route("/state", get(get_state::<A>))
        .route("/form", post(post_form::<A>))
        .route("/scan", post(post_scan::<A>))
        .route("/analyze", post(post_analyze::<A>))
        .route("/match", post(post_match::<A>))
        .route("/refresh", post(post_refresh::<A>))
        .with_state(state);

    Router::new()
        .route("/", get(index))
        .nest("/api", api)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(SetResponseHeaderLayer::overriding(
                    header::CACHE_CONTROL,
                    HeaderValue::from_static("no-store"),
                )),
        )
}

pub async fn spawn_server<A: ScannerApi>(bind: &str, session: Arc<Session<A>>) -> Result<()> {
    let app = router(session);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(addr = %listener.local_addr()?, "serving UI");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Serve until `shutdown` resolves. A bind or serve failure is returned instead of waiting on `shutdown`.
pub async fn serve_until<A, F>(bind: &str, session: Arc<Session<A>>, shutdown: F) -> Result<()>
where
    A: ScannerApi,
    F: Future<Output = ()>,
{
    tokio::select! {
        res = spawn_server(bind, session) => res,
        _ = shutdown => {
            info!("shutting down UI server");
            Ok(())
        }
    }
}

async fn index() -> impl IntoResponse {
    Html(INDEX_HTML)
}

async fn view_of<A: ScannerApi>(app: &AppState<A>) -> ViewModel {
    ViewModel::from_snapshot(&app.session.snapshot().await)
}

async fn get_state<A: ScannerApi>(State(app): State<AppState<A>>) -> impl IntoResponse {
    (StatusCode::OK, Json(view_of(&app).await))
}

async fn post_form<A: ScannerApi>(
    State(app): State<AppState<A>>,
    Json(patch): Json<FormPatch>,
) -> impl IntoResponse {
    app.session.update_form(patch).await;
    (StatusCode::OK, Json(view_of(&app).await))
}

async fn post_scan<A: ScannerApi>(State(app): State<AppState<A>>) -> Response {
    if !app.session.form().await.has_target() {
        return rejected(Rejected::MissingTarget);
    }
    let session = app.session.clone();
    tokio::spawn(async move {
        if let Err(e) = session.scan_ports().await {
            warn!(error = %e, "scan not started");
        }
    });
    accepted(&app).await
}

async fn post_analyze<A: ScannerApi>(State(app): State<AppState<A>>) -> Response {
    if !app.session.form().await.has_target() {
        return rejected(Rejected::MissingTarget);
    }
    let session = app.session.clone();
    tokio::spawn(async move {
        if let Err(e) = session.analyze_web_page().await {
            warn!(error = %e, "analysis not started");
        }
    });
    accepted(&app).await
}

async fn post_match<A: ScannerApi>(State(app): State<AppState<A>>) -> Response {
    if app.session.snapshot().await.scan_result.is_none() {
        return rejected(Rejected::NoScanResult);
    }
    let session = app.session.clone();
    tokio::spawn(async move {
        if let Err(e) = session.match_vulnerabilities().await {
            warn!(error = %e, "match not started");
        }
    });
    accepted(&app).await
}

async fn post_refresh<A: ScannerApi>(State(app): State<AppState<A>>) -> Response {
    let session = app.session.clone();
    tokio::spawn(async move {
        session.mount().await;
    });
    accepted(&app).await
}

// Let the spawned action take its ticket first so the reply usually shows it loading.
async fn accepted<A: ScannerApi>(app: &AppState<A>) -> Response {
    tokio::task::yield_now().await;
    (StatusCode::ACCEPTED, Json(view_of(app).await)).into_response()
}

fn rejected(reason: Rejected) -> Response {
    (StatusCode::CONFLICT, reason.to_string()).into_response()
}

use axum::{
    extract::{Path, Query, State},
    http::Request,
    middleware::{self, Next},
    response::{Html, IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, error, info};
use url::Url;

mod backend;
mod cache;
mod config;
mod legend;
mod models;
mod popup;
mod render;
mod status;
mod upload;
mod utils;
mod views;

use backend::{Backend, BackendError};
use cache::ByteCache;
use config::Config;
use popup::MapSession;
use render::RenderedMap;
use upload::{sync_tables, UploadTables};

struct AppState {
    config: Config,
    backend: Backend,
    http_client: reqwest::Client,
    cache: ByteCache,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .init();

    let config = Config::load()?;
    let thread_count = config.thread_count.unwrap_or_else(|| num_cpus::get());

    info!("starting server with {} threads", thread_count);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(thread_count)
        .enable_all()
        .build()?;

    runtime.block_on(async_main(config))
}

async fn log_request_response(
    req: Request<axum::body::Body>,
    next: Next,
) -> Response {
    let path = req.uri().path().to_string();
    let method = req.method().to_string();
    info!("incoming request: {} {}", method, path);
    let response = next.run(req).await;
    info!("request result: {} for {} {}", response.status(), method, path);
    response
}

async fn async_main(config: Config) -> anyhow::Result<()> {
    let http_client = reqwest::Client::builder()
        .user_agent("Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36")
        .build()?;

    let backend = Backend::new(Url::parse(&config.backend_url)?, http_client.clone());

    let cache_dir = std::path::Path::new("data/cache").to_path_buf();
    let max_cache_gb = config.cache_size_gb.unwrap_or(2);
    let cache = ByteCache::open(cache_dir, max_cache_gb).await?;

    let listen_addr = config
        .listen_addr
        .clone()
        .unwrap_or_else(|| "0.0.0.0:3001".to_string());

    let state = Arc::new(AppState {
        config,
        backend,
        http_client,
        cache,
    });

    let app = Router::new()
        .route("/", get(map_page))
        .route("/upload", get(upload_page))
        .route("/upload/form", get(upload_form))
        .route("/dashboard", get(dashboard_dialog))
        .route("/api/map", get(api_map))
        .route("/api/closest", get(api_closest))
        .route("/api/uploads", get(api_uploads))
        .route("/api/uploads/delete", post(api_delete_upload))
        .route("/tiles/{provider}/{z}/{x}/{y}", get(proxy_tile))
        .route("/graph", get(proxy_graph))
        .layer(middleware::from_fn(log_request_response))
        .with_state(state);

    info!("listening on {}", listen_addr);
    let listener = TcpListener::bind(&listen_addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// --- Pages ---

async fn map_page() -> Html<String> {
    Html(views::render_map_page())
}

async fn upload_page() -> Html<String> {
    Html(views::render_upload_page())
}

// --- Handlers ---

#[derive(Deserialize)]
struct MapQuery {
    project: Option<String>,
}

async fn api_map(State(state): State<Arc<AppState>>, Query(params): Query<MapQuery>) -> Response {
    let project = params
        .project
        .or_else(|| state.config.default_project.clone());

    let features = match state.backend.project_features(project.as_deref()).await {
        Ok(features) => features,
        Err(e) => {
            error!("feature fetch failed: {}", e);
            return (axum::http::StatusCode::BAD_GATEWAY, "backend unavailable").into_response();
        }
    };

    let today = Utc::now().date_naive();
    let providers = &state.config.tile_providers;
    let payload = match render::render(&features, today, state.config.requests_on_top) {
        RenderedMap::Document {
            layers,
            legend,
            extent,
        } => json!({
            "no_data": false,
            "extent": extent,
            "layers": layers,
            "legend": legend,
            "providers": providers,
        }),
        RenderedMap::NoData { extent } => json!({
            "no_data": true,
            "message": views::NO_MAP_DATA,
            "extent": extent,
            "providers": providers,
        }),
    };
    Json(payload).into_response()
}

async fn api_closest(
    State(state): State<Arc<AppState>>,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let mut lat = None;
    let mut lng = None;
    let mut obj_type = String::new();
    let mut obj_id = String::new();
    let mut overlays = Vec::new();
    for (key, value) in params {
        match key.as_str() {
            "lat" => lat = value.parse().ok(),
            "lng" => lng = value.parse().ok(),
            "objType" => obj_type = value,
            "objId" => obj_id = value,
            "overlays[]" => overlays.push(value),
            _ => {}
        }
    }
    let (Some(lat), Some(lng)) = (lat, lng) else {
        return (axum::http::StatusCode::BAD_REQUEST, "lat and lng are required").into_response();
    };

    let mut session = MapSession::new();
    if !obj_type.is_empty() {
        if let Ok(id) = obj_id.parse::<i64>() {
            session.hover_enter(&obj_type, id);
        }
    }

    let query = session.click(lat, lng, overlays);
    match state.backend.closest_to(&query).await {
        Ok(resp) => {
            let (html, latlng) = views::render_popup(session.resolve(&resp));
            Json(json!({ "html": html, "latlng": latlng })).into_response()
        }
        Err(e) => {
            session.fail();
            error!("closest-feature query failed: {}", e);
            (axum::http::StatusCode::BAD_GATEWAY, "backend unavailable").into_response()
        }
    }
}

#[derive(Deserialize)]
struct UploadsQuery {
    /// Row ids currently present in the page, comma separated.
    have: Option<String>,
}

async fn api_uploads(
    State(state): State<Arc<AppState>>,
    Query(params): Query<UploadsQuery>,
) -> Response {
    let rows = match state.backend.uploaded_files().await {
        Ok(rows) => rows,
        Err(e) => {
            error!("upload status fetch failed: {}", e);
            return (axum::http::StatusCode::BAD_GATEWAY, "backend unavailable").into_response();
        }
    };

    let tables = UploadTables::partition(rows);
    let existing: Vec<String> = params
        .have
        .unwrap_or_default()
        .split(',')
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect();

    let sync = sync_tables(&existing, &tables);
    let mut payload = views::render_table_sync(&sync);
    payload["poll_again"] = json!(tables.poll_again());
    Json(payload).into_response()
}

#[derive(Deserialize)]
struct DeleteUpload {
    url: String,
}

async fn api_delete_upload(
    State(state): State<Arc<AppState>>,
    Json(req): Json<DeleteUpload>,
) -> Response {
    match state.backend.delete_uploaded(&req.url).await {
        Ok(()) => axum::http::StatusCode::NO_CONTENT.into_response(),
        Err(BackendError::ForeignUrl(url)) => {
            error!("refused delete outside the backend: {}", url);
            (axum::http::StatusCode::BAD_REQUEST, "invalid delete URL").into_response()
        }
        Err(e) => {
            error!("delete forward failed: {}", e);
            (axum::http::StatusCode::BAD_GATEWAY, "backend unavailable").into_response()
        }
    }
}

async fn proxy_tile(
    State(state): State<Arc<AppState>>,
    Path((provider, z, x, y)): Path<(String, u32, u32, u32)>,
) -> Response {
    let Some(source) = state
        .config
        .tile_providers
        .iter()
        .find(|p| p.id == provider)
    else {
        return (axum::http::StatusCode::NOT_FOUND, "tile provider not found").into_response();
    };

    let cache_key = format!("tile:{}:{}/{}/{}", provider, z, x, y);
    if let Ok(Some(bytes)) = state.cache.get(&cache_key).await {
        return ([("content-type", "image/png")], bytes).into_response();
    }

    let url = source
        .url
        .replace("{z}", &z.to_string())
        .replace("{x}", &x.to_string())
        .replace("{y}", &y.to_string());

    match state.http_client.get(url).send().await {
        Ok(resp) => {
            let status = resp.status();
            let content_type = resp
                .headers()
                .get("content-type")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("image/png")
                .to_string();
            let bytes = resp.bytes().await.unwrap_or_default();
            if status.is_success() {
                let _ = state.cache.put(&cache_key, &bytes).await;
            }
            (
                axum::http::StatusCode::from_u16(status.as_u16())
                    .unwrap_or(axum::http::StatusCode::INTERNAL_SERVER_ERROR),
                [("content-type", content_type)],
                bytes,
            )
                .into_response()
        }
        Err(e) => {
            error!("tile proxy error for {}: {}", provider, e);
            (
                axum::http::StatusCode::INTERNAL_SERVER_ERROR,
                "external tile source error",
            )
                .into_response()
        }
    }
}

#[derive(Deserialize)]
struct GraphQuery {
    url: String,
    width: Option<u32>,
    height: Option<u32>,
}

/// Proxy a detail graph image. A failed or refused fetch is "no data
/// for this location", never a page error; the page shows a fixed
/// message on 404.
async fn proxy_graph(
    State(state): State<Arc<AppState>>,
    Query(params): Query<GraphQuery>,
) -> Response {
    let width = params.width.unwrap_or(620);
    let height = params.height.unwrap_or(300);
    let cache_key = format!("graph:{}:{}x{}", params.url, width, height);

    if let Ok(Some(bytes)) = state.cache.get(&cache_key).await {
        // Graphs are served as PNG by the backend.
        return ([("content-type", "image/png")], bytes).into_response();
    }

    match state.backend.graph_image(&params.url, width, height).await {
        Ok((bytes, content_type)) => {
            let _ = state.cache.put(&cache_key, &bytes).await;
            ([("content-type", content_type)], bytes).into_response()
        }
        Err(e) => {
            debug!("graph image unavailable ({}), treating as no data", e);
            axum::http::StatusCode::NOT_FOUND.into_response()
        }
    }
}

#[derive(Deserialize)]
struct DashboardQuery {
    area: String,
    contractor: String,
    area_name: Option<String>,
    contractor_name: Option<String>,
}

async fn dashboard_dialog(
    State(state): State<Arc<AppState>>,
    Query(params): Query<DashboardQuery>,
) -> Response {
    let query = [
        ("area".to_string(), params.area.clone()),
        ("contractor".to_string(), params.contractor.clone()),
    ];
    match state.backend.fragment("dashboard", &query).await {
        Ok(fragment) => Html(views::render_dashboard_dialog(
            params.area_name.as_deref().unwrap_or(&params.area),
            params.contractor_name.as_deref().unwrap_or(&params.contractor),
            &fragment,
        ))
        .into_response(),
        Err(e) => {
            error!("dashboard fetch failed: {}", e);
            (axum::http::StatusCode::BAD_GATEWAY, "backend unavailable").into_response()
        }
    }
}

async fn upload_form(State(state): State<Arc<AppState>>) -> Response {
    match state.backend.fragment("upload_form", &[]).await {
        Ok(fragment) => Html(fragment).into_response(),
        Err(e) => {
            error!("upload form fetch failed: {}", e);
            (axum::http::StatusCode::BAD_GATEWAY, "backend unavailable").into_response()
        }
    }
}

mod api;
mod error;
mod state;
mod types;

use std::sync::Arc;

use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub use self::error::AppError;
pub use self::state::*;
pub use self::types::{EmbedImageResponse, EmbedPdfResponse};

/// 默认上传限制：20M
pub const DEFAULT_MAX_UPLOAD: usize = 1024 * 1024 * 20;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::embed_image_handler,
        api::embed_pdf_handler,
        api::ask_handler,
        api::store_handler,
        api::search_handler,
        api::search_image_handler,
        api::metrics_handler,
    ),
    components(schemas(
        types::FileForm,
        types::EmbedImageResponse,
        types::EmbedPdfResponse,
        types::AskRequest,
        types::AskResponse,
        types::StoreForm,
        types::StoreResponse,
        types::SearchRequest,
        types::SearchImageForm,
        types::SearchResponse,
        crate::store::ScoredPoint,
    ))
)]
pub struct ApiDoc;

/// 构建API服务器，`max_upload` 为请求体大小上限，单位为字节
pub fn create_app(state: Arc<AppState>, max_upload: usize) -> Router {
    Router::new()
        .route("/embed-image", post(api::embed_image_handler))
        .route("/embed-pdf", post(api::embed_pdf_handler))
        .route("/ask", post(api::ask_handler))
        .route("/store", post(api::store_handler))
        .route("/search", post(api::search_handler))
        .route("/search-image", post(api::search_image_handler))
        .route("/metrics", get(api::metrics_handler))
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_upload))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, anyhow};
use axum::Json;
use axum::extract::State;
use axum::http::header;
use axum::response::IntoResponse;
use axum_typed_multipart::TypedMultipart;
use log::info;
use prometheus::TEXT_FORMAT;

use super::error::Result;
use super::state::AppState;
use super::types::*;
use crate::metrics;
use crate::store::{DEFAULT_LIMIT, Payload};

/// 计算一张图片的嵌入向量
#[utoipa::path(
    post,
    path = "/embed-image",
    request_body(content = FileForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = EmbedImageResponse),
    )
)]
pub async fn embed_image_handler(
    State(state): State<Arc<AppState>>,
    data: TypedMultipart<FileRequest>,
) -> Result<Json<EmbedImageResponse>> {
    let start = Instant::now();
    let embedding = state.rag.embed_image(data.0.file.to_vec()).await?;
    info!("图片嵌入完成，耗时 {} ms", start.elapsed().as_millis());
    Ok(Json(EmbedImageResponse { embedding }))
}

/// 计算 PDF 每一页的嵌入向量
#[utoipa::path(
    post,
    path = "/embed-pdf",
    request_body(content = FileForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = EmbedPdfResponse),
    )
)]
pub async fn embed_pdf_handler(
    State(state): State<Arc<AppState>>,
    data: TypedMultipart<FileRequest>,
) -> Result<Json<EmbedPdfResponse>> {
    let start = Instant::now();
    let pages = state.rag.embed_pdf(data.0.file.to_vec()).await?;
    info!("PDF 嵌入完成，共 {} 页，耗时 {} ms", pages.len(), start.elapsed().as_millis());
    Ok(Json(EmbedPdfResponse::from(pages)))
}

/// 向问答模型提问
#[utoipa::path(
    post,
    path = "/ask",
    request_body = AskRequest,
    responses(
        (status = 200, body = AskResponse),
    )
)]
pub async fn ask_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<AskRequest>,
) -> Result<Json<AskResponse>> {
    let answer = state.rag.ask(&data.question, &data.context_embeddings).await?;
    Ok(Json(AskResponse { answer }))
}

/// 嵌入并存储一个文件
#[utoipa::path(
    post,
    path = "/store",
    request_body(content = StoreForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = StoreResponse),
    )
)]
pub async fn store_handler(
    State(state): State<Arc<AppState>>,
    data: TypedMultipart<StoreRequest>,
) -> Result<Json<StoreResponse>> {
    let StoreRequest { user_id, file, metadata } = data.0;
    let metadata = match metadata.as_deref().map(str::trim) {
        None | Some("") => Payload::new(),
        Some(text) => serde_json::from_str::<Payload>(text).context("metadata 必须是 JSON 对象")?,
    };
    let ids = state.rag.store_file(&user_id, file.to_vec(), metadata).await?;
    info!("用户 {} 写入 {} 个向量", user_id, ids.len());
    Ok(Json(StoreResponse { ids }))
}

/// 使用向量检索
#[utoipa::path(
    post,
    path = "/search",
    request_body = SearchRequest,
    responses(
        (status = 200, body = SearchResponse),
    )
)]
pub async fn search_handler(
    State(state): State<Arc<AppState>>,
    Json(data): Json<SearchRequest>,
) -> Result<Json<SearchResponse>> {
    if data.vector.is_empty() {
        return Err(anyhow!("vector 不能为空").into());
    }
    let limit = data.limit.unwrap_or(DEFAULT_LIMIT);
    let result = state.rag.search(&data.user_id, &data.vector, limit).await?;
    Ok(Json(SearchResponse { result }))
}

/// 使用图片检索
#[utoipa::path(
    post,
    path = "/search-image",
    request_body(content = SearchImageForm, content_type = "multipart/form-data"),
    responses(
        (status = 200, body = SearchResponse),
    )
)]
pub async fn search_image_handler(
    State(state): State<Arc<AppState>>,
    data: TypedMultipart<SearchImageRequest>,
) -> Result<Json<SearchResponse>> {
    let SearchImageRequest { user_id, file, limit } = data.0;
    info!("正在搜索上传图片");
    let limit = limit.unwrap_or(DEFAULT_LIMIT);
    let result = state.rag.search_image(&user_id, file.to_vec(), limit).await?;
    Ok(Json(SearchResponse { result }))
}

/// 导出 prometheus 指标
#[utoipa::path(get, path = "/metrics", responses((status = 200, body = String)))]
pub async fn metrics_handler() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, TEXT_FORMAT)], metrics::render())
}

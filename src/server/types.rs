use axum::body::Bytes;
use axum_typed_multipart::TryFromMultipart;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::rag::PageEmbedding;
use crate::store::ScoredPoint;

/// 上传单个文件的请求
#[derive(TryFromMultipart)]
pub struct FileRequest {
    pub file: Bytes,
}

/// 上传单个文件（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct FileForm {
    /// 上传的图片或 PDF 文件
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
}

/// 图片嵌入响应
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EmbedImageResponse {
    pub embedding: Vec<f32>,
}

/// PDF 嵌入响应，三个字段按页对齐
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct EmbedPdfResponse {
    pub num_pages: usize,
    pub embeddings: Vec<Vec<f32>>,
    /// 每一页规范化后的 PNG，格式为 data URI
    pub images: Vec<String>,
}

impl From<Vec<PageEmbedding>> for EmbedPdfResponse {
    fn from(pages: Vec<PageEmbedding>) -> Self {
        let (images, embeddings): (Vec<_>, Vec<_>) =
            pages.into_iter().map(|page| (page.image, page.embedding)).unzip();
        Self { num_pages: embeddings.len(), embeddings, images }
    }
}

/// 问答请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct AskRequest {
    pub question: String,
    /// 相关图片的嵌入向量，目前只用于日志
    #[serde(default)]
    pub context_embeddings: Vec<Vec<f32>>,
}

/// 问答响应
#[derive(Debug, Serialize, ToSchema)]
pub struct AskResponse {
    pub answer: String,
}

/// 存储请求参数
#[derive(TryFromMultipart)]
pub struct StoreRequest {
    pub user_id: String,
    pub file: Bytes,
    pub metadata: Option<String>,
}

/// 存储表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct StoreForm {
    /// 数据所属用户
    pub user_id: String,
    /// 上传的图片或 PDF 文件，PDF 每一页单独存储
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
    /// 附加到每个向量上的 JSON 对象
    pub metadata: Option<String>,
}

/// 存储响应
#[derive(Debug, Serialize, ToSchema)]
pub struct StoreResponse {
    /// 新写入的向量 ID
    pub ids: Vec<String>,
}

/// 向量检索请求
#[derive(Debug, Deserialize, ToSchema)]
pub struct SearchRequest {
    pub user_id: String,
    pub vector: Vec<f32>,
    /// 返回结果数量
    #[schema(default = 5)]
    pub limit: Option<usize>,
}

/// 图片检索请求参数
#[derive(TryFromMultipart)]
pub struct SearchImageRequest {
    pub user_id: String,
    pub file: Bytes,
    pub limit: Option<usize>,
}

/// 图片检索表单（用于API文档）
#[derive(Debug, ToSchema)]
#[allow(unused)]
pub struct SearchImageForm {
    pub user_id: String,
    /// 被搜索的图片
    #[schema(format = Binary, content_media_type = "application/octet-stream")]
    pub file: String,
    /// 返回结果数量
    pub limit: Option<usize>,
}

/// 检索响应，按相似度从高到低排序
#[derive(Debug, Serialize, ToSchema)]
pub struct SearchResponse {
    pub result: Vec<ScoredPoint>,
}

use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::debug;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{http, metrics};

pub const DEFAULT_COHERE_BASE_URL: &str = "https://api.cohere.com";
pub const DEFAULT_EMBED_MODEL: &str = "embed-v4.0";

/// 嵌入向量的用途
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputType {
    /// 被检索的内容
    SearchDocument,
    /// 检索请求
    SearchQuery,
}

/// 图片嵌入服务
#[async_trait]
pub trait Embedder: Send + Sync {
    /// 计算一张已规范化图片（data URI）的嵌入向量
    async fn embed_image(&self, data_uri: &str, input_type: InputType) -> Result<Vec<f32>>;
}

#[derive(Debug, Clone)]
pub struct CohereOptions {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input_type: InputType,
    embedding_types: [&'static str; 1],
    images: [&'a str; 1],
}

#[derive(Deserialize)]
struct EmbedResponse {
    embeddings: EmbedByType,
}

#[derive(Deserialize)]
struct EmbedByType {
    #[serde(default)]
    float: Vec<Vec<f32>>,
}

/// Cohere v2 embed 接口
pub struct CohereEmbedder {
    client: Client,
    options: CohereOptions,
}

impl CohereEmbedder {
    pub fn new(options: CohereOptions) -> Result<Self> {
        if options.api_key.trim().is_empty() {
            return Err(Error::Connection("缺少 Cohere API key".to_string()));
        }
        let client = http::create_client(options.timeout)?;
        Ok(Self { client, options })
    }

    fn embed_url(&self) -> String {
        format!("{}/v2/embed", http::trim_base_url(&self.options.base_url))
    }
}

#[async_trait]
impl Embedder for CohereEmbedder {
    async fn embed_image(&self, data_uri: &str, input_type: InputType) -> Result<Vec<f32>> {
        let request = EmbedRequest {
            model: &self.options.model,
            input_type,
            embedding_types: ["float"],
            images: [data_uri],
        };

        let start = Instant::now();
        let response = self
            .client
            .post(self.embed_url())
            .bearer_auth(&self.options.api_key)
            .json(&request)
            .send()
            .await
            .inspect_err(|_| metrics::inc_provider_failure("cohere"))?;
        let response = http::check_status(response, "cohere")
            .await
            .inspect_err(|_| metrics::inc_provider_failure("cohere"))?;
        let body: EmbedResponse = response.json().await?;
        metrics::observe_provider_duration("cohere", start.elapsed().as_secs_f64());

        let embedding = body
            .embeddings
            .float
            .into_iter()
            .next()
            .ok_or_else(|| Error::Service("cohere 未返回嵌入向量".to_string()))?;
        debug!("cohere 返回 {} 维向量", embedding.len());
        Ok(embedding)
    }
}

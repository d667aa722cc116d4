mod memory;
mod qdrant;

use std::fmt;

use async_trait::async_trait;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use utoipa::ToSchema;

pub use self::memory::MemoryStore;
pub use self::qdrant::{QdrantOptions, QdrantStore};
use crate::error::Result;

/// 用于隔离不同用户数据的 payload 字段
pub const OWNER_FIELD: &str = "user_id";

/// 默认的检索结果数量
pub const DEFAULT_LIMIT: usize = 5;

/// 向量附带的元数据
pub type Payload = Map<String, Value>;

/// 向量距离
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Distance {
    /// 余弦相似度
    #[default]
    Cosine,
    /// 欧氏距离
    Euclid,
    /// 点积
    Dot,
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Cosine => "Cosine",
            Self::Euclid => "Euclid",
            Self::Dot => "Dot",
        };
        f.write_str(name)
    }
}

/// 集合的定义
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionSpec {
    pub name: String,
    pub dim: usize,
    pub distance: Distance,
}

/// 检索命中的向量
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ScoredPoint {
    pub id: String,
    pub score: f32,
    #[schema(value_type = Object)]
    pub payload: Payload,
}

/// 向量数据库
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 确保集合及 `user_id` 索引存在，可重复调用
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<()>;

    /// 写入一个新的向量，返回新生成的 ID
    async fn store(
        &self,
        collection: &str,
        owner_id: &str,
        vector: Vec<f32>,
        metadata: Payload,
    ) -> Result<String>;

    /// 在指定用户的向量中检索最相似的 `limit` 个
    async fn search(
        &self,
        collection: &str,
        owner_id: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>>;
}

/// 将 `user_id` 合并到元数据中，`user_id` 总是覆盖同名字段
pub fn owned_payload(owner_id: &str, mut metadata: Payload) -> Payload {
    metadata.insert(OWNER_FIELD.to_string(), Value::String(owner_id.to_string()));
    metadata
}

/// 生成新的向量 ID
pub fn new_point_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

use std::cmp::Ordering;
use std::collections::HashMap;

use async_trait::async_trait;
use log::{debug, info};
use tokio::sync::RwLock;

use super::*;
use crate::error::Error;

struct StoredPoint {
    id: String,
    vector: Vec<f32>,
    payload: Payload,
}

struct MemoryCollection {
    dim: usize,
    distance: Distance,
    /// 按写入顺序保存
    points: Vec<StoredPoint>,
}

/// 进程内的向量库，语义与 Qdrant 后端一致，数据不落盘
#[derive(Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, MemoryCollection>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 集合数量
    pub async fn collection_count(&self) -> usize {
        self.collections.read().await.len()
    }
}

fn score(distance: Distance, a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    match distance {
        Distance::Dot => dot,
        Distance::Cosine => {
            let na = a.iter().map(|x| x * x).sum::<f32>().sqrt();
            let nb = b.iter().map(|x| x * x).sum::<f32>().sqrt();
            if na == 0.0 || nb == 0.0 { 0.0 } else { dot / (na * nb) }
        }
        Distance::Euclid => a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt(),
    }
}

/// 按相似度从高到低比较两个分数，Euclid 分数为距离，越小越近
fn rank(distance: Distance, a: f32, b: f32) -> Ordering {
    let ord = b.partial_cmp(&a).unwrap_or(Ordering::Equal);
    match distance {
        Distance::Euclid => ord.reverse(),
        _ => ord,
    }
}

fn check_dim(collection: &str, expected: usize, vector: &[f32]) -> Result<()> {
    if vector.len() != expected {
        return Err(Error::Service(format!(
            "集合 {collection} 的向量维度为 {expected}，实际为 {}",
            vector.len()
        )));
    }
    Ok(())
}

#[async_trait]
impl VectorStore for MemoryStore {
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<()> {
        let mut collections = self.collections.write().await;
        let collection = collections.entry(spec.name.clone()).or_insert_with(|| {
            info!("创建集合 {}: {} 维, {}", spec.name, spec.dim, spec.distance);
            MemoryCollection { dim: spec.dim, distance: spec.distance, points: vec![] }
        });
        info!("集合 {} 共有 {} 个向量", spec.name, collection.points.len());
        Ok(())
    }

    async fn store(
        &self,
        collection: &str,
        owner_id: &str,
        vector: Vec<f32>,
        metadata: Payload,
    ) -> Result<String> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| Error::NotFound(collection.to_string()))?;
        check_dim(collection, target.dim, &vector)?;

        let id = new_point_id();
        target.points.push(StoredPoint {
            id: id.clone(),
            vector,
            payload: owned_payload(owner_id, metadata),
        });
        debug!("写入向量 {id} 到集合 {collection}");
        Ok(id)
    }

    async fn search(
        &self,
        collection: &str,
        owner_id: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let collections = self.collections.read().await;
        let target =
            collections.get(collection).ok_or_else(|| Error::NotFound(collection.to_string()))?;
        check_dim(collection, target.dim, vector)?;

        let mut hits = target
            .points
            .iter()
            .filter(|p| p.payload.get(OWNER_FIELD).and_then(|v| v.as_str()) == Some(owner_id))
            .map(|p| (score(target.distance, &p.vector, vector), p))
            .collect::<Vec<_>>();
        // 稳定排序，相同分数按写入顺序
        hits.sort_by(|a, b| rank(target.distance, a.0, b.0));

        Ok(hits
            .into_iter()
            .take(limit)
            .map(|(score, p)| ScoredPoint { id: p.id.clone(), score, payload: p.payload.clone() })
            .collect())
    }
}

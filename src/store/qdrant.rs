use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::{Client, RequestBuilder, Url};
use serde::Deserialize;
use serde_json::{Value, json};

use super::*;
use crate::error::Error;
use crate::http;

const SERVICE: &str = "qdrant";

#[derive(Debug, Clone)]
pub struct QdrantOptions {
    /// 例如 `http://localhost:6333`
    pub url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Deserialize)]
struct QdrantResponse<T> {
    result: T,
}

#[derive(Deserialize)]
struct ExistsResult {
    exists: bool,
}

#[derive(Deserialize)]
struct CollectionInfo {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    points_count: Option<u64>,
}

#[derive(Deserialize)]
struct QdrantHit {
    id: Value,
    score: f32,
    #[serde(default)]
    payload: Option<Payload>,
}

/// 通过 REST 接口访问 Qdrant
pub struct QdrantStore {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl QdrantStore {
    pub fn new(options: QdrantOptions) -> Result<Self> {
        if options.url.trim().is_empty() {
            return Err(Error::Connection("未设置 Qdrant 地址".to_string()));
        }
        let base_url = Url::parse(options.url.trim())
            .ok()
            .filter(|url| !url.cannot_be_a_base())
            .ok_or_else(|| Error::Connection(format!("无效的 Qdrant 地址: {}", options.url)))?;
        Ok(Self {
            client: http::create_client(options.timeout)?,
            base_url,
            api_key: options.api_key.filter(|key| !key.is_empty()),
        })
    }

    /// 集合名作为单独的路径段编码
    fn collection_url(&self, collection: &str, suffix: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().push("collections").push(collection).extend(suffix);
        }
        url
    }

    fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("api-key", key),
            None => builder,
        }
    }

    async fn send<T>(&self, builder: RequestBuilder) -> Result<T>
    where
        T: for<'de> Deserialize<'de>,
    {
        let response = self.authorize(builder).send().await?;
        let response = http::check_status(response, SERVICE).await?;
        let body: QdrantResponse<T> = response.json().await?;
        Ok(body.result)
    }

    async fn collection_exists(&self, collection: &str) -> Result<bool> {
        let url = self.collection_url(collection, &["exists"]);
        let result: ExistsResult = self.send(self.client.get(url)).await?;
        Ok(result.exists)
    }

    async fn create_owner_index(&self, collection: &str) -> Result<()> {
        let url = self.collection_url(collection, &["index"]);
        let body = json!({ "field_name": OWNER_FIELD, "field_schema": "keyword" });
        let request = self.client.put(url).query(&[("wait", "true")]).json(&body);
        let _: Value = self.send(request).await?;
        Ok(())
    }
}

#[async_trait]
impl VectorStore for QdrantStore {
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<()> {
        if !self.collection_exists(&spec.name).await? {
            info!("创建集合 {}: {} 维, {}", spec.name, spec.dim, spec.distance);
            let url = self.collection_url(&spec.name, &[]);
            let body = json!({
                "vectors": { "size": spec.dim, "distance": spec.distance.to_string() }
            });
            let _: Value = self.send(self.client.put(url).json(&body)).await?;
        }

        match self.create_owner_index(&spec.name).await {
            Ok(()) => {}
            Err(err @ Error::Connection(_)) => return Err(err),
            Err(err) => warn!("创建 {} 索引失败，可能已经存在: {}", OWNER_FIELD, err),
        }

        let info: CollectionInfo =
            self.send(self.client.get(self.collection_url(&spec.name, &[]))).await?;
        info!(
            "集合 {}: status = {}, points = {}",
            spec.name,
            info.status.as_deref().unwrap_or("unknown"),
            info.points_count.unwrap_or_default()
        );
        Ok(())
    }

    async fn store(
        &self,
        collection: &str,
        owner_id: &str,
        vector: Vec<f32>,
        metadata: Payload,
    ) -> Result<String> {
        let id = new_point_id();
        let body = json!({
            "points": [{
                "id": id,
                "vector": vector,
                "payload": owned_payload(owner_id, metadata),
            }]
        });
        let url = self.collection_url(collection, &["points"]);
        let request = self.client.put(url).query(&[("wait", "true")]).json(&body);
        let _: Value = self.send(request).await?;
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
        let body = json!({
            "vector": vector,
            "limit": limit,
            "with_payload": true,
            "filter": {
                "must": [{ "key": OWNER_FIELD, "match": { "value": owner_id } }]
            },
        });
        let url = self.collection_url(collection, &["points", "search"]);
        let hits: Vec<QdrantHit> = self.send(self.client.post(url).json(&body)).await?;

        Ok(hits
            .into_iter()
            .map(|hit| ScoredPoint {
                id: match hit.id {
                    Value::String(s) => s,
                    other => other.to_string(),
                },
                score: hit.score,
                payload: hit.payload.unwrap_or_default(),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn ok(result: Value) -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({
            "result": result,
            "status": "ok",
            "time": 0.001,
        }))
    }

    fn store(server: &MockServer) -> QdrantStore {
        QdrantStore::new(QdrantOptions {
            url: format!("{}/", server.uri()),
            api_key: Some("q-key".to_string()),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    fn spec() -> CollectionSpec {
        CollectionSpec { name: "test".to_string(), dim: 1536, distance: Distance::Cosine }
    }

    async fn mount_info(server: &MockServer) {
        Mock::given(method("GET"))
            .and(path("/collections/test"))
            .respond_with(ok(json!({ "status": "green", "points_count": 3 })))
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn creates_missing_collection_and_index() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/test/exists"))
            .and(header("api-key", "q-key"))
            .respond_with(ok(json!({ "exists": false })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/collections/test"))
            .and(body_partial_json(json!({ "vectors": { "size": 1536, "distance": "Cosine" } })))
            .respond_with(ok(json!(true)))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/collections/test/index"))
            .and(body_partial_json(json!({ "field_name": "user_id", "field_schema": "keyword" })))
            .respond_with(ok(json!({ "operation_id": 1, "status": "completed" })))
            .expect(1)
            .mount(&server)
            .await;
        mount_info(&server).await;

        store(&server).ensure_collection(&spec()).await.unwrap();
    }

    #[tokio::test]
    async fn existing_collection_is_not_recreated() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/collections/test/exists"))
            .respond_with(ok(json!({ "exists": true })))
            .mount(&server)
            .await;
        Mock::given(method("PUT"))
            .and(path("/collections/test"))
            .respond_with(ok(json!(true)))
            .expect(0)
            .mount(&server)
            .await;
        // 索引已存在时的失败只记录日志
        Mock::given(method("PUT"))
            .and(path("/collections/test/index"))
            .respond_with(ResponseTemplate::new(400).set_body_string("index exists"))
            .expect(2)
            .mount(&server)
            .await;
        mount_info(&server).await;

        let store = store(&server);
        store.ensure_collection(&spec()).await.unwrap();
        store.ensure_collection(&spec()).await.unwrap();
    }

    #[tokio::test]
    async fn unauthorized_is_connection_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
            .mount(&server)
            .await;

        let err = store(&server).ensure_collection(&spec()).await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }

    #[tokio::test]
    async fn store_merges_owner_into_payload() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/collections/test/points"))
            .and(query_param("wait", "true"))
            .and(body_partial_json(json!({
                "points": [{ "vector": [0.5, 0.5], "payload": { "user_id": "alice", "doc": "x" } }]
            })))
            .respond_with(ok(json!({ "operation_id": 7, "status": "completed" })))
            .expect(1)
            .mount(&server)
            .await;

        let metadata = json!({ "doc": "x" }).as_object().cloned().unwrap();
        let id = store(&server).store("test", "alice", vec![0.5, 0.5], metadata).await.unwrap();
        assert!(uuid::Uuid::parse_str(&id).is_ok());
    }

    #[tokio::test]
    async fn search_filters_by_owner() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/test/points/search"))
            .and(body_partial_json(json!({
                "limit": 5,
                "with_payload": true,
                "filter": { "must": [{ "key": "user_id", "match": { "value": "alice" } }] },
            })))
            .respond_with(ok(json!([
                { "id": "2f1b6c1e-5a4b-4c1d-9f0e-000000000001", "version": 0, "score": 0.97,
                  "payload": { "user_id": "alice", "doc": "x" } },
                { "id": 42, "version": 0, "score": 0.5 },
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let hits = store(&server).search("test", "alice", &[0.1, 0.2], 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "2f1b6c1e-5a4b-4c1d-9f0e-000000000001");
        assert_eq!(hits[0].payload["doc"], "x");
        assert_eq!(hits[1].id, "42");
        assert!(hits[1].payload.is_empty());
    }

    #[tokio::test]
    async fn search_missing_collection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(404)
                    .set_body_string(r#"{"status":{"error":"Collection `test` doesn't exist!"}}"#),
            )
            .mount(&server)
            .await;

        let err = store(&server).search("test", "alice", &[0.1], 5).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn collection_name_is_one_path_segment() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/collections/my%20docs%2Fv1%3F/points/search"))
            .respond_with(ok(json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let hits = store(&server).search("my docs/v1?", "alice", &[0.1], 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[test]
    fn empty_url_is_rejected() {
        let options =
            QdrantOptions { url: String::new(), api_key: None, timeout: Duration::from_secs(1) };
        assert!(matches!(QdrantStore::new(options), Err(Error::Connection(_))));
    }
}

use std::sync::Arc;

use futures::{StreamExt, TryStreamExt, stream};
use log::{debug, info};
use rayon::prelude::*;
use serde::Serialize;
use serde_json::Value;
use tokio::task::spawn_blocking;

use crate::answer::{Generator, build_prompt};
use crate::embedding::{Embedder, InputType};
use crate::error::{Error, Result};
use crate::metrics;
use crate::normalize::{self, NormalizedImage};
use crate::pdf::{self, PdfRasterizer};
use crate::store::{CollectionSpec, Payload, ScoredPoint, VectorStore};

/// PDF 单页的嵌入结果
#[derive(Debug, Clone, Serialize)]
pub struct PageEmbedding {
    /// 规范化后的页面图片
    pub image: String,
    pub embedding: Vec<f32>,
}

/// 一个文件的嵌入结果
#[derive(Debug, Clone)]
pub enum FileEmbedding {
    Image(Vec<f32>),
    Pdf(Vec<PageEmbedding>),
}

/// 将图片或 PDF 嵌入、存储、检索并回答问题
///
/// 各外部服务通过 [`VisionRagBuilder`] 注入。
pub struct VisionRag {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorStore>,
    generator: Option<Arc<dyn Generator>>,
    rasterizer: PdfRasterizer,
    collection: CollectionSpec,
    concurrency: usize,
}

pub struct VisionRagBuilder {
    collection: CollectionSpec,
    embedder: Option<Arc<dyn Embedder>>,
    store: Option<Arc<dyn VectorStore>>,
    generator: Option<Arc<dyn Generator>>,
    rasterizer: PdfRasterizer,
    concurrency: usize,
}

impl VisionRagBuilder {
    pub fn new(collection: CollectionSpec) -> Self {
        Self {
            collection,
            embedder: None,
            store: None,
            generator: None,
            rasterizer: PdfRasterizer::default(),
            concurrency: 4,
        }
    }

    pub fn embedder(mut self, embedder: Arc<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn generator(mut self, generator: Arc<dyn Generator>) -> Self {
        self.generator = Some(generator);
        self
    }

    pub fn rasterizer(mut self, rasterizer: PdfRasterizer) -> Self {
        self.rasterizer = rasterizer;
        self
    }

    /// PDF 页面同时请求嵌入的数量
    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn build(self) -> anyhow::Result<VisionRag> {
        let embedder = self.embedder.ok_or_else(|| anyhow::anyhow!("未配置嵌入服务"))?;
        let store = self.store.ok_or_else(|| anyhow::anyhow!("未配置向量数据库"))?;
        Ok(VisionRag {
            embedder,
            store,
            generator: self.generator,
            rasterizer: self.rasterizer,
            collection: self.collection,
            concurrency: self.concurrency,
        })
    }
}

impl VisionRag {
    pub fn collection(&self) -> &CollectionSpec {
        &self.collection
    }

    /// 确保集合存在
    pub async fn ensure_collection(&self) -> Result<()> {
        self.store.ensure_collection(&self.collection).await
    }

    /// 解码并规范化上传的图片
    pub async fn normalize(&self, bytes: Vec<u8>) -> Result<NormalizedImage> {
        spawn_blocking(move || normalize::normalize(&bytes)).await?
    }

    /// 将 PDF 的每一页渲染并规范化
    pub async fn normalize_pdf(&self, bytes: Vec<u8>) -> Result<Vec<NormalizedImage>> {
        let rasterizer = self.rasterizer.clone();
        spawn_blocking(move || {
            let pages = rasterizer.render(&bytes)?;
            pages.into_par_iter().map(normalize::normalize_image).collect::<Result<Vec<_>>>()
        })
        .await?
    }

    /// 计算一张图片的嵌入向量
    pub async fn embed_image(&self, bytes: Vec<u8>) -> Result<Vec<f32>> {
        let image = self.normalize(bytes).await?;
        metrics::inc_embed_image_count((image.width, image.height), "image");
        self.embedder.embed_image(&image.data_uri, InputType::SearchDocument).await
    }

    /// 计算 PDF 每一页的嵌入向量，结果保持页面顺序
    pub async fn embed_pdf(&self, bytes: Vec<u8>) -> Result<Vec<PageEmbedding>> {
        let pages = self.normalize_pdf(bytes).await?;
        info!("PDF 共 {} 页", pages.len());
        self.embed_pages(pages).await
    }

    /// 并发计算已规范化页面的嵌入向量，结果保持输入顺序
    pub async fn embed_pages(&self, pages: Vec<NormalizedImage>) -> Result<Vec<PageEmbedding>> {
        stream::iter(pages)
            .map(|page| async move {
                metrics::inc_embed_image_count((page.width, page.height), "pdf");
                let embedding =
                    self.embedder.embed_image(&page.data_uri, InputType::SearchDocument).await?;
                Ok::<_, Error>(PageEmbedding { image: page.data_uri, embedding })
            })
            .buffered(self.concurrency)
            .try_collect()
            .await
    }

    /// 根据文件头选择图片或 PDF 处理方式
    pub async fn embed_file(&self, bytes: Vec<u8>) -> Result<FileEmbedding> {
        if pdf::is_pdf(&bytes) {
            Ok(FileEmbedding::Pdf(self.embed_pdf(bytes).await?))
        } else {
            Ok(FileEmbedding::Image(self.embed_image(bytes).await?))
        }
    }

    /// 嵌入并存储一个文件，PDF 的每一页单独存储，返回新的向量 ID
    pub async fn store_file(
        &self,
        owner_id: &str,
        bytes: Vec<u8>,
        metadata: Payload,
    ) -> Result<Vec<String>> {
        if pdf::is_pdf(&bytes) {
            let pages = self.normalize_pdf(bytes).await?;
            return self.store_pages(owner_id, pages, metadata).await;
        }
        let embedding = self.embed_image(bytes).await?;
        let id = self.store.store(&self.collection.name, owner_id, embedding, metadata).await?;
        Ok(vec![id])
    }

    /// 按页面顺序存储，payload 中的 `page` 从 1 开始
    pub async fn store_pages(
        &self,
        owner_id: &str,
        pages: Vec<NormalizedImage>,
        metadata: Payload,
    ) -> Result<Vec<String>> {
        let name = &self.collection.name;
        let pages = self.embed_pages(pages).await?;
        let mut ids = Vec::with_capacity(pages.len());
        for (index, page) in pages.into_iter().enumerate() {
            let mut metadata = metadata.clone();
            metadata.insert("page".to_string(), Value::from(index + 1));
            ids.push(self.store.store(name, owner_id, page.embedding, metadata).await?);
        }
        Ok(ids)
    }

    /// 使用向量检索指定用户的数据
    pub async fn search(
        &self,
        owner_id: &str,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        self.store.search(&self.collection.name, owner_id, vector, limit).await
    }

    /// 使用图片检索指定用户的数据
    pub async fn search_image(
        &self,
        owner_id: &str,
        bytes: Vec<u8>,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let image = self.normalize(bytes).await?;
        let vector = self.embedder.embed_image(&image.data_uri, InputType::SearchQuery).await?;
        self.search(owner_id, &vector, limit).await
    }

    /// 向生成模型提问
    pub async fn ask(&self, question: &str, context_embeddings: &[Vec<f32>]) -> Result<String> {
        let generator = self
            .generator
            .as_ref()
            .ok_or_else(|| Error::Connection("未配置问答服务".to_string()))?;
        debug!("问题附带 {} 个上下文向量", context_embeddings.len());
        generator.generate(&build_prompt(question)).await
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use image::{DynamicImage, ImageFormat, RgbImage};

    use super::*;
    use crate::store::{Distance, MemoryStore};

    /// 以图片宽度作为向量的嵌入服务
    #[derive(Default)]
    struct WidthEmbedder {
        calls: Mutex<Vec<InputType>>,
    }

    #[async_trait]
    impl Embedder for WidthEmbedder {
        async fn embed_image(&self, data_uri: &str, input_type: InputType) -> Result<Vec<f32>> {
            self.calls.lock().unwrap().push(input_type);
            let png = normalize::decode_data_uri(data_uri).unwrap();
            let image = image::load_from_memory(&png).unwrap();
            Ok(vec![image.width() as f32, 1.0])
        }
    }

    struct Echo;

    #[async_trait]
    impl Generator for Echo {
        async fn generate(&self, prompt: &str) -> Result<String> {
            Ok(prompt.to_uppercase())
        }
    }

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut buf = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(RgbImage::new(width, height))
            .write_to(&mut buf, ImageFormat::Png)
            .unwrap();
        buf.into_inner()
    }

    async fn rag(generator: bool) -> (VisionRag, Arc<WidthEmbedder>) {
        let embedder = Arc::new(WidthEmbedder::default());
        let spec = CollectionSpec { name: "test".to_string(), dim: 2, distance: Distance::Cosine };
        let mut builder = VisionRagBuilder::new(spec)
            .embedder(embedder.clone())
            .store(Arc::new(MemoryStore::new()));
        if generator {
            builder = builder.generator(Arc::new(Echo));
        }
        let rag = builder.build().unwrap();
        rag.ensure_collection().await.unwrap();
        (rag, embedder)
    }

    #[tokio::test]
    async fn embeds_normalized_image() {
        let (rag, embedder) = rag(false).await;
        let embedding = rag.embed_image(png(2000, 1600)).await.unwrap();
        assert_eq!(embedding, vec![1753.0, 1.0]);
        assert_eq!(*embedder.calls.lock().unwrap(), vec![InputType::SearchDocument]);
    }

    #[tokio::test]
    async fn store_then_search_by_image() {
        let (rag, embedder) = rag(false).await;
        let metadata = serde_json::json!({ "path": "a.png" }).as_object().cloned().unwrap();
        let ids = rag.store_file("alice", png(10, 10), metadata).await.unwrap();
        assert_eq!(ids.len(), 1);

        let hits = rag.search_image("alice", png(10, 10), 5).await.unwrap();
        assert_eq!(hits[0].id, ids[0]);
        assert_eq!(hits[0].payload["path"], "a.png");
        assert!(rag.search_image("bob", png(10, 10), 5).await.unwrap().is_empty());
        assert_eq!(embedder.calls.lock().unwrap()[1], InputType::SearchQuery);
    }

    #[tokio::test]
    async fn broken_image_is_decode_error() {
        let (rag, _) = rag(false).await;
        let err = rag.embed_file(b"garbage".to_vec()).await.unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }

    #[tokio::test]
    async fn ask_uses_fixed_prompt() {
        let (rag, _) = rag(true).await;
        let answer = rag.ask("why?", &[vec![0.1, 0.2]]).await.unwrap();
        assert_eq!(answer, "[CONTEXT INFO EXTRACTED FROM IMAGES]\n\nQ: WHY?\nA:");
    }

    #[tokio::test]
    async fn ask_without_generator() {
        let (rag, _) = rag(false).await;
        let err = rag.ask("why?", &[]).await.unwrap_err();
        assert!(matches!(err, Error::Connection(_)));
    }

    /// 页码越小返回越慢的嵌入服务
    struct SlowFirstPages;

    #[async_trait]
    impl Embedder for SlowFirstPages {
        async fn embed_image(&self, data_uri: &str, _: InputType) -> Result<Vec<f32>> {
            let png = normalize::decode_data_uri(data_uri).unwrap();
            let width = image::load_from_memory(&png).unwrap().width();
            tokio::time::sleep(Duration::from_millis(u64::from(40 - width))).await;
            Ok(vec![width as f32, 1.0])
        }
    }

    fn pages() -> Vec<NormalizedImage> {
        [10, 20, 30].into_iter().map(|w| normalize::normalize(&png(w, 8)).unwrap()).collect()
    }

    async fn paged_rag() -> VisionRag {
        let spec = CollectionSpec { name: "test".to_string(), dim: 2, distance: Distance::Cosine };
        let rag = VisionRagBuilder::new(spec)
            .embedder(Arc::new(SlowFirstPages))
            .store(Arc::new(MemoryStore::new()))
            .concurrency(3)
            .build()
            .unwrap();
        rag.ensure_collection().await.unwrap();
        rag
    }

    #[tokio::test]
    async fn page_embeddings_keep_page_order() {
        let rag = paged_rag().await;
        let embedded = rag.embed_pages(pages()).await.unwrap();
        let widths = embedded.iter().map(|p| p.embedding[0]).collect::<Vec<_>>();
        assert_eq!(widths, vec![10.0, 20.0, 30.0]);
        assert!(embedded.iter().all(|p| p.image.starts_with("data:image/png;base64,")));
    }

    #[tokio::test]
    async fn stored_pages_carry_page_number() {
        let rag = paged_rag().await;
        let metadata = serde_json::json!({ "path": "a.pdf" }).as_object().cloned().unwrap();
        let ids = rag.store_pages("alice", pages(), metadata).await.unwrap();
        assert_eq!(ids.len(), 3);

        for (page, width) in [(1, 10.0), (2, 20.0), (3, 30.0)] {
            let hits = rag.search("alice", &[width, 1.0], 3).await.unwrap();
            assert_eq!(hits[0].payload["page"], page);
            assert_eq!(hits[0].payload["path"], "a.pdf");
            assert_eq!(hits[0].id, ids[page as usize - 1]);
        }
    }

    #[test]
    fn builder_requires_embedder_and_store() {
        let spec = CollectionSpec { name: "t".to_string(), dim: 2, distance: Distance::Dot };
        assert!(VisionRagBuilder::new(spec.clone()).build().is_err());
        assert!(VisionRagBuilder::new(spec).store(Arc::new(MemoryStore::new())).build().is_err());
    }
}

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand, ValueEnum};

use crate::answer::{
    DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL, GeminiGenerator, GeminiOptions, Generator,
};
use crate::cli::*;
use crate::embedding::{
    CohereEmbedder, CohereOptions, DEFAULT_COHERE_BASE_URL, DEFAULT_EMBED_MODEL, Embedder,
};
use crate::pdf::{DEFAULT_DPI, PdfRasterizer};
use crate::store::{CollectionSpec, Distance, MemoryStore, QdrantOptions, QdrantStore, VectorStore};
use crate::{VisionRag, VisionRagBuilder};

#[derive(Parser, Debug, Clone)]
pub struct ProviderOptions {
    /// Cohere API key，用于计算图片嵌入
    #[arg(long, env = "COHERE_API_KEY", hide_env_values = true)]
    pub cohere_api_key: Option<String>,
    /// Cohere API 地址
    #[arg(long, env = "COHERE_BASE_URL", value_name = "URL", default_value = DEFAULT_COHERE_BASE_URL)]
    pub cohere_base_url: String,
    /// 嵌入模型
    #[arg(long, value_name = "MODEL", default_value = DEFAULT_EMBED_MODEL)]
    pub embed_model: String,
    /// Google API key，用于回答问题
    #[arg(long, env = "GOOGLE_API_KEY", hide_env_values = true)]
    pub google_api_key: Option<String>,
    /// Gemini API 地址
    #[arg(long, env = "GEMINI_BASE_URL", value_name = "URL", default_value = DEFAULT_GEMINI_BASE_URL)]
    pub gemini_base_url: String,
    /// 问答模型
    #[arg(long, value_name = "MODEL", default_value = DEFAULT_GEMINI_MODEL)]
    pub gemini_model: String,
    /// 外部服务请求超时时间，单位为秒
    #[arg(long, value_name = "SECONDS", default_value_t = 120)]
    pub request_timeout: u64,
}

#[derive(Parser, Debug, Clone)]
pub struct StoreOptions {
    /// 向量数据库后端
    #[arg(long, value_enum, env = "VECTOR_STORE", default_value_t = StoreKind::Qdrant)]
    pub store: StoreKind,
    /// Qdrant 地址
    #[arg(long, env = "QDRANT_CLOUD_HOST", value_name = "URL", default_value = "http://localhost:6333")]
    pub qdrant_url: String,
    /// Qdrant API key
    #[arg(long, env = "QDRANT_CLOUD_API_KEY", hide_env_values = true)]
    pub qdrant_api_key: Option<String>,
    /// 集合名称
    #[arg(long, env = "QDRANT_COLLECTION", value_name = "NAME", default_value = "test")]
    pub collection: String,
    /// 向量维度，需要与嵌入模型一致
    #[arg(long, value_name = "N", default_value_t = 1536)]
    pub dim: usize,
    /// 向量距离
    #[arg(long, value_enum, default_value_t = Distance::Cosine)]
    pub distance: Distance,
}

#[derive(Parser, Debug, Clone)]
pub struct PdfOptions {
    /// PDF 页面渲染 DPI
    #[arg(long, value_name = "DPI", default_value_t = DEFAULT_DPI)]
    pub pdf_dpi: u16,
    /// pdfium 动态库所在目录，不填则使用系统库
    #[arg(long, env = "PDFIUM_DIR", value_name = "DIR")]
    pub pdfium_dir: Option<PathBuf>,
    /// PDF 页面同时请求嵌入的数量
    #[arg(long, value_name = "N", default_value_t = 4)]
    pub embed_concurrency: usize,
}

#[derive(Parser, Debug, Clone)]
#[command(name = "visionrag", version)]
pub struct Opts {
    #[command(subcommand)]
    pub subcmd: SubCommand,
    #[command(flatten)]
    pub provider: ProviderOptions,
    #[command(flatten)]
    pub store: StoreOptions,
    #[command(flatten)]
    pub pdf: PdfOptions,
}

#[derive(Subcommand, Debug, Clone)]
pub enum SubCommand {
    /// 启动 HTTP 服务
    Server(ServerCommand),
    /// 创建集合及 user_id 索引
    Init(InitCommand),
    /// 计算图片或 PDF 的嵌入向量
    Embed(EmbedCommand),
    /// 将目录中的图片和 PDF 添加到向量数据库
    Add(AddCommand),
    /// 使用图片检索向量数据库
    Search(SearchCommand),
    /// 向问答模型提问
    Ask(AskCommand),
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    /// Qdrant REST 接口
    Qdrant,
    /// 进程内存储，进程退出后数据丢失
    Memory,
}

impl Opts {
    fn timeout(&self) -> Duration {
        Duration::from_secs(self.provider.request_timeout)
    }

    pub fn collection_spec(&self) -> CollectionSpec {
        CollectionSpec {
            name: self.store.collection.clone(),
            dim: self.store.dim,
            distance: self.store.distance,
        }
    }

    pub fn vector_store(&self) -> Result<Arc<dyn VectorStore>> {
        Ok(match self.store.store {
            StoreKind::Memory => Arc::new(MemoryStore::new()),
            StoreKind::Qdrant => Arc::new(QdrantStore::new(QdrantOptions {
                url: self.store.qdrant_url.clone(),
                api_key: self.store.qdrant_api_key.clone(),
                timeout: self.timeout(),
            })?),
        })
    }

    pub fn embedder(&self) -> Result<Arc<dyn Embedder>> {
        let api_key =
            self.provider.cohere_api_key.clone().ok_or_else(|| anyhow!("未设置 COHERE_API_KEY"))?;
        let embedder = CohereEmbedder::new(CohereOptions {
            api_key,
            base_url: self.provider.cohere_base_url.clone(),
            model: self.provider.embed_model.clone(),
            timeout: self.timeout(),
        })
        .context("无法创建嵌入服务")?;
        Ok(Arc::new(embedder))
    }

    pub fn generator(&self) -> Result<Arc<dyn Generator>> {
        let api_key =
            self.provider.google_api_key.clone().ok_or_else(|| anyhow!("未设置 GOOGLE_API_KEY"))?;
        let generator = GeminiGenerator::new(GeminiOptions {
            api_key,
            base_url: self.provider.gemini_base_url.clone(),
            model: self.provider.gemini_model.clone(),
            timeout: self.timeout(),
        })
        .context("无法创建问答服务")?;
        Ok(Arc::new(generator))
    }

    pub fn rasterizer(&self) -> PdfRasterizer {
        PdfRasterizer::new(self.pdf.pdfium_dir.clone(), self.pdf.pdf_dpi)
    }

    /// 创建不带问答服务的 [`VisionRagBuilder`]
    pub fn rag_builder(&self) -> Result<VisionRagBuilder> {
        Ok(VisionRagBuilder::new(self.collection_spec())
            .embedder(self.embedder()?)
            .store(self.vector_store()?)
            .rasterizer(self.rasterizer())
            .concurrency(self.pdf.embed_concurrency))
    }

    pub fn rag(&self) -> Result<VisionRag> {
        self.rag_builder()?.build()
    }
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use crate::Opts;
use crate::cli::SubCommandExtend;
use crate::rag::FileEmbedding;
use crate::server::{EmbedImageResponse, EmbedPdfResponse};

#[derive(Parser, Debug, Clone)]
pub struct EmbedCommand {
    /// 图片或 PDF 文件路径
    pub file: PathBuf,
    /// 输出 PDF 每一页规范化后的图片
    #[arg(long)]
    pub with_images: bool,
}

impl SubCommandExtend for EmbedCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let rag = opts.rag()?;
        let bytes = tokio::fs::read(&self.file)
            .await
            .with_context(|| format!("无法读取文件: {}", self.file.display()))?;

        info!("正在计算嵌入向量: {}", self.file.display());
        let output = match rag.embed_file(bytes).await? {
            FileEmbedding::Image(embedding) => {
                serde_json::to_string(&EmbedImageResponse { embedding })?
            }
            FileEmbedding::Pdf(pages) => {
                let mut response = EmbedPdfResponse::from(pages);
                if !self.with_images {
                    response.images.clear();
                }
                serde_json::to_string(&response)?
            }
        };
        println!("{}", output);
        Ok(())
    }
}

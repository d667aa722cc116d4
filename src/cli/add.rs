use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressIterator};
use log::{info, warn};
use serde_json::Value;
use walkdir::WalkDir;

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::error::Error;
use crate::store::Payload;
use crate::utils::{has_suffix, pb_style, suffix_regex};

#[derive(Parser, Debug, Clone)]
pub struct AddCommand {
    /// 图片或 PDF 所在目录，也可以是单个文件
    pub path: PathBuf,
    /// 数据所属用户
    #[arg(short, long, value_name = "ID")]
    pub user: String,
    /// 扫描的文件后缀名，多个后缀用逗号分隔
    #[arg(short, long, default_value = "jpg,jpeg,png,webp,pdf")]
    pub suffix: String,
}

impl SubCommandExtend for AddCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let re_suf = suffix_regex(&self.suffix).context("无效的后缀名")?;
        let rag = opts.rag()?;
        rag.ensure_collection().await?;

        info!("开始扫描目录: {}", self.path.display());
        let pb2 = ProgressBar::no_length().with_style(pb_style());
        let entries = WalkDir::new(&self.path)
            .sort_by_file_name()
            .into_iter()
            .progress_with(pb2)
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file() && has_suffix(entry.path(), &re_suf))
            .map(|entry| entry.into_path())
            .collect::<Vec<_>>();
        info!("扫描完成，共 {} 个文件", entries.len());

        let pb = ProgressBar::new(entries.len() as u64).with_style(pb_style());
        let mut total = 0;
        for entry in entries {
            let path = entry.to_string_lossy().to_string();
            let data = tokio::fs::read(&entry).await?;
            let mut metadata = Payload::new();
            metadata.insert("path".to_string(), Value::String(path.clone()));

            match rag.store_file(&self.user, data, metadata).await {
                Ok(ids) => {
                    total += ids.len();
                    pb.suspend(|| ids.iter().for_each(|id| println!("{id}\t{path}")));
                    pb.set_message(path);
                }
                // 外部服务不可用时继续处理也没有意义
                Err(e @ Error::Connection(_)) => return Err(e.into()),
                Err(e) => warn!("添加失败: {}: {}", path, e),
            }
            pb.inc(1);
        }

        pb.finish_with_message(format!("添加完成，共写入 {total} 个向量"));
        Ok(())
    }
}

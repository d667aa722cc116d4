use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};

use crate::cli::SubCommandExtend;
use crate::config::Opts;
use crate::store::{DEFAULT_LIMIT, ScoredPoint};

#[derive(Parser, Debug, Clone)]
pub struct SearchCommand {
    /// 被搜索的图片路径
    pub image: PathBuf,
    /// 用户 ID，只在该用户的数据中检索
    #[arg(short, long, value_name = "ID")]
    pub user: String,
    /// 显示的结果数量
    #[arg(short, long, value_name = "COUNT", default_value_t = DEFAULT_LIMIT)]
    pub limit: usize,
    /// 输出格式
    #[arg(long, value_enum, value_name = "FORMAT", default_value_t = OutputFormat::Table)]
    pub output_format: OutputFormat,
}

impl SubCommandExtend for SearchCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let rag = opts.rag()?;
        let bytes = tokio::fs::read(&self.image)
            .await
            .with_context(|| format!("无法读取图片: {}", self.image.display()))?;

        let result = rag.search_image(&self.user, bytes, self.limit).await?;
        print_result(&result, self)
    }
}

fn print_result(result: &[ScoredPoint], opts: &SearchCommand) -> Result<()> {
    match opts.output_format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?)
        }
        OutputFormat::Table => {
            for point in result {
                let payload = serde_json::to_string(&point.payload)?;
                println!("{:.4}\t{}\t{}", point.score, point.id, payload);
            }
        }
    }
    Ok(())
}

#[derive(ValueEnum, Debug, Clone)]
pub enum OutputFormat {
    Json,
    Table,
}

use anyhow::Result;
use clap::Parser;
use log::info;

use crate::Opts;
use crate::cli::SubCommandExtend;

#[derive(Parser, Debug, Clone)]
pub struct InitCommand {}

impl SubCommandExtend for InitCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let spec = opts.collection_spec();
        opts.vector_store()?.ensure_collection(&spec).await?;
        info!("集合 {} 已就绪", spec.name);
        Ok(())
    }
}

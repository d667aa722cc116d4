use anyhow::Result;
use clap::Parser;

use crate::Opts;
use crate::answer::build_prompt;
use crate::cli::SubCommandExtend;

#[derive(Parser, Debug, Clone)]
pub struct AskCommand {
    /// 问题
    pub question: String,
}

impl SubCommandExtend for AskCommand {
    async fn run(&self, opts: &Opts) -> Result<()> {
        let generator = opts.generator()?;
        let answer = generator.generate(&build_prompt(&self.question)).await?;
        println!("{}", answer);
        Ok(())
    }
}

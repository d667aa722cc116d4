mod add;
mod ask;
mod embed;
mod init;
mod search;
pub mod server;

pub use add::*;
pub use ask::*;
pub use embed::*;
pub use init::*;
pub use search::*;
pub use server::*;

use crate::config::Opts;

pub trait SubCommandExtend {
    fn run(&self, opts: &Opts) -> impl std::future::Future<Output = anyhow::Result<()>> + Send;
}

pub mod answer;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
mod http;
pub mod metrics;
pub mod normalize;
pub mod pdf;
pub mod rag;
pub mod server;
pub mod store;
pub mod utils;

pub use config::Opts;
pub use error::{Error, Result};
pub use rag::{FileEmbedding, PageEmbedding, VisionRag, VisionRagBuilder};

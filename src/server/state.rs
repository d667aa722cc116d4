use std::sync::Arc;

use crate::VisionRag;

/// 应用状态
pub struct AppState {
    pub rag: VisionRag,
}

impl AppState {
    /// 创建新的应用状态
    pub fn new(rag: VisionRag) -> Arc<Self> {
        Arc::new(AppState { rag })
    }
}

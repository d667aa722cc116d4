use thiserror::Error;

/// 外部服务与输入处理中可能出现的错误
#[derive(Debug, Error)]
pub enum Error {
    /// 图片或 PDF 无法解码
    #[error("无法解码输入: {0}")]
    Decode(String),
    /// 外部服务不可达，或鉴权失败
    #[error("无法连接外部服务: {0}")]
    Connection(String),
    /// 集合不存在
    #[error("集合不存在: {0}")]
    NotFound(String),
    /// 外部服务返回了错误
    #[error("外部服务调用失败: {0}")]
    Service(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Self::Decode(err.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::Connection(err.to_string())
        } else {
            Self::Service(err.to_string())
        }
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Service(err.to_string())
    }
}

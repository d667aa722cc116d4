use std::time::Duration;

use reqwest::{Client, Response, StatusCode};

use crate::error::{Error, Result};

/// 建立连接的超时时间
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// 创建访问外部服务使用的 HTTP 客户端
pub fn create_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(CONNECT_TIMEOUT)
        .build()
        .map_err(|e| Error::Service(format!("无法创建 HTTP 客户端: {e}")))
}

/// 将非 2xx 响应转换为错误
///
/// 401/403 视为鉴权失败，404 视为资源不存在。
pub async fn check_status(response: Response, service: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(status, &body, service))
}

pub fn status_error(status: StatusCode, body: &str, service: &str) -> Error {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Error::Connection(format!("{service} 鉴权失败: {status} {body}"))
        }
        StatusCode::NOT_FOUND => Error::NotFound(format!("{service}: {body}")),
        _ => Error::Service(format!("{service} 返回错误: {status} {body}")),
    }
}

/// 去掉 URL 末尾的 `/`
pub fn trim_base_url(url: &str) -> String {
    url.trim_end_matches('/').to_string()
}

use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::{http, metrics};

pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash-preview-04-17";

/// 拼接发送给生成模型的提示词
pub fn build_prompt(question: &str) -> String {
    format!("[Context info extracted from images]\n\nQ: {question}\nA:")
}

/// 文本生成服务
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct GeminiOptions {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: [Content<'a>; 1],
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: [TextPart<'a>; 1],
}

#[derive(Serialize)]
struct TextPart<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

/// Gemini generateContent 接口
pub struct GeminiGenerator {
    client: Client,
    options: GeminiOptions,
}

impl GeminiGenerator {
    pub fn new(options: GeminiOptions) -> Result<Self> {
        if options.api_key.trim().is_empty() {
            return Err(Error::Connection("缺少 Google API key".to_string()));
        }
        let client = http::create_client(options.timeout)?;
        Ok(Self { client, options })
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            http::trim_base_url(&self.options.base_url),
            self.options.model
        );
        let request = GenerateRequest {
            contents: [Content { role: "user", parts: [TextPart { text: prompt }] }],
        };

        let start = Instant::now();
        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.options.api_key)
            .json(&request)
            .send()
            .await
            .inspect_err(|_| metrics::inc_provider_failure("gemini"))?;
        let response = http::check_status(response, "gemini")
            .await
            .inspect_err(|_| metrics::inc_provider_failure("gemini"))?;
        let body: GenerateResponse = response.json().await?;
        metrics::observe_provider_duration("gemini", start.elapsed().as_secs_f64());

        let answer: String = body
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if answer.trim().is_empty() {
            return Err(Error::Service("gemini 未返回文本".to_string()));
        }
        Ok(answer)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn options(base_url: String) -> GeminiOptions {
        GeminiOptions {
            api_key: "g-key".to_string(),
            base_url,
            model: "gemini-test".to_string(),
            timeout: Duration::from_secs(5),
        }
    }

    #[test]
    fn prompt_layout() {
        assert_eq!(
            build_prompt("What is shown?"),
            "[Context info extracted from images]\n\nQ: What is shown?\nA:"
        );
    }

    #[tokio::test]
    async fn joins_text_parts() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1beta/models/gemini-test:generateContent"))
            .and(header("x-goog-api-key", "g-key"))
            .and(body_json(json!({
                "contents": [{ "role": "user", "parts": [{ "text": "hi" }] }]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "candidates": [{
                    "content": {
                        "role": "model",
                        "parts": [{ "text": "Hello" }, { "text": " there" }],
                    }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let generator = GeminiGenerator::new(options(server.uri())).unwrap();
        assert_eq!(generator.generate("hi").await.unwrap(), "Hello there");
    }

    #[tokio::test]
    async fn empty_answer_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
            .mount(&server)
            .await;

        let generator = GeminiGenerator::new(options(server.uri())).unwrap();
        let err = generator.generate("hi").await.unwrap_err();
        assert!(matches!(err, Error::Service(_)));
    }

    #[tokio::test]
    async fn server_error_is_service_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let generator = GeminiGenerator::new(options(server.uri())).unwrap();
        let err = generator.generate("hi").await.unwrap_err();
        assert!(matches!(err, Error::Service(msg) if msg.contains("overloaded")));
    }
}

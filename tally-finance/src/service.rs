//! External categorization service: one chat-completion call per request.

use anyhow::{bail, Context, Result};
use reqwest::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Anything that can answer a classification request with free text.
///
/// `instructions` is the fixed task description, `payload` the serialized record.
pub trait CategoryService: Send + Sync + 'static {
    fn complete(&self, instructions: &str, payload: &str) -> impl Future<Output = Result<String>> + Send;
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub api_key: String,
    pub http_timeout: Duration,
}

/// Client for an OpenAI-compatible `/v1/chat/completions` endpoint.
#[derive(Debug, Clone)]
pub struct ChatCompletionsService {
    config: ServiceConfig,
    client: reqwest::Client,
}

impl ChatCompletionsService {
    pub fn new(config: ServiceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.http_timeout)
            .build()
            .context("build http client")?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.config.base_url.trim_end_matches('/'))
    }
}

#[derive(Serialize)]
struct Msg<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct Req<'a> {
    model: &'a str,
    messages: Vec<Msg<'a>>,
    temperature: f32,
}

#[derive(Deserialize)]
struct Resp {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: MsgOut,
}

#[derive(Deserialize)]
struct MsgOut {
    content: Option<String>,
}

impl CategoryService for ChatCompletionsService {
    fn complete(&self, instructions: &str, payload: &str) -> impl Future<Output = Result<String>> + Send {
        async move {
            let body = Req {
                model: &self.config.model,
                messages: vec![
                    Msg {
                        role: "system",
                        content: instructions,
                    },
                    Msg {
                        role: "user",
                        content: payload,
                    },
                ],
                temperature: self.config.temperature,
            };

            let resp = self
                .client
                .post(self.endpoint())
                .header(AUTHORIZATION, format!("Bearer {}", self.config.api_key))
                .json(&body)
                .send()
                .await
                .context("categorization request")?;

            let status = resp.status();
            if !status.is_success() {
                let txt = resp.text().await.unwrap_or_default();
                bail!("categorization service error: {status} {txt}");
            }

            let out: Resp = resp.json().await.context("parse categorization response")?;
            let content = out
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .unwrap_or_default();

            Ok(content.trim().to_string())
        }
    }
}

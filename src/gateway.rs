use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use log::{debug, error, warn};
use reqwest::header::{HeaderMap, RETRY_AFTER};
use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, ERROR_PREFIX};
use crate::key_pool::{Credential, KeyPool};
use crate::providers::{ProviderDescriptor, ProviderRegistry};

const CHAT_TIMEOUT: Duration = Duration::from_secs(30);
const AUDIO_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_ATTEMPTS: u32 = 3;
const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// Instruction sent along with every frame.
pub const DESCRIBE_INSTRUCTION: &str = "Describe VERY BRIEFLY (1-2 sentences) what is happening in \
the picture: which game, which anime, which music. If it is none of these, say what is going on. \
No introductions.";

/// True when `text` is an error reply rather than model output.
pub fn is_error_reply(text: &str) -> bool {
    text.starts_with(ERROR_PREFIX)
}

/// Message content: plain text or a list of typed parts (text + image).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Prompt {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl From<String> for Prompt {
    fn from(text: String) -> Self {
        Prompt::Text(text)
    }
}

impl From<&str> for Prompt {
    fn from(text: &str) -> Self {
        Prompt::Text(text.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a Prompt,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ReplyMessage,
}

#[derive(Deserialize)]
struct ReplyMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct TranscriptionResponse {
    text: Option<String>,
    transcript: Option<String>,
}

/// What the observation pipeline and the personas need from an AI provider.
///
/// Failures never surface as `Err`: chat replies carry the error text (see
/// [`is_error_reply`]) and the media helpers come back empty.
#[async_trait]
pub trait AiBackend: Send + Sync {
    async fn chat_complete(&self, prompt: Prompt, provider: &str, model: Option<&str>) -> String;

    async fn transcribe_audio(&self, path: &Path, provider: &str) -> String;

    async fn describe_image(&self, path: &Path, provider: &str) -> String;
}

/// OpenAI-style HTTP adapter over every configured provider, load-balanced by [`KeyPool`].
pub struct AiGateway {
    client: reqwest::Client,
    pool: KeyPool,
    providers: Arc<ProviderRegistry>,
    attempts: u32,
    default_backoff: Duration,
}

impl AiGateway {
    pub fn new(pool: KeyPool, providers: Arc<ProviderRegistry>) -> Self {
        Self {
            client: reqwest::Client::new(),
            pool,
            providers,
            attempts: DEFAULT_ATTEMPTS,
            default_backoff: DEFAULT_BACKOFF,
        }
    }

    /// Wait used after a 429 that carries no `Retry-After` header.
    #[cfg(test)]
    pub fn with_default_backoff(mut self, backoff: Duration) -> Self {
        self.default_backoff = backoff;
        self
    }

    /// Chat completion with an explicit attempt budget. At most `attempts` HTTP calls are
    /// made; only 429 responses are retried.
    pub async fn chat_complete_with_attempts(
        &self,
        prompt: &Prompt,
        provider: &str,
        model: Option<&str>,
        attempts: u32,
    ) -> String {
        match self.try_chat(prompt, provider, model, attempts).await {
            Ok(content) => content,
            Err(err) => {
                error!("{} chat call failed: {}", provider, err);
                err.to_string()
            }
        }
    }

    async fn try_chat(
        &self,
        prompt: &Prompt,
        provider: &str,
        model: Option<&str>,
        attempts: u32,
    ) -> Result<String, GatewayError> {
        for attempt in 1..=attempts {
            let credential = self.acquire(provider).await?;
            let descriptor = self.descriptor(provider)?;
            let model = model
                .or(credential.model.as_deref())
                .unwrap_or(&descriptor.chat_model);

            let body = ChatRequest {
                model,
                messages: [ChatMessage {
                    role: "user",
                    content: prompt,
                }],
            };
            let request = self
                .client
                .post(&descriptor.chat_url)
                .bearer_auth(&credential.secret)
                .json(&body)
                .timeout(CHAT_TIMEOUT);
            let response = with_headers(request, descriptor)
                .send()
                .await
                .map_err(|e| GatewayError::from_reqwest(provider, e))?;

            let status = response.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                let wait = retry_after(response.headers()).unwrap_or(self.default_backoff);
                warn!(
                    "{} rate limit on key {} (attempt {}/{}), backing off {:?}",
                    provider, credential.id, attempt, attempts, wait
                );
                self.penalize(&credential).await;
                if attempt < attempts {
                    tokio::time::sleep(wait).await;
                }
                continue;
            }
            if status != StatusCode::OK {
                let text = response.text().await.unwrap_or_default();
                error!("{} API error {}: {}", provider, status, text);
                return Err(GatewayError::Http {
                    provider: provider.to_string(),
                    status: status.as_u16(),
                });
            }

            let parsed: ChatResponse = response.json().await.map_err(|e| {
                if e.is_timeout() {
                    GatewayError::from_reqwest(provider, e)
                } else {
                    GatewayError::MalformedResponse {
                        provider: provider.to_string(),
                    }
                }
            })?;
            let content = parsed
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.message.content)
                .ok_or_else(|| GatewayError::MalformedResponse {
                    provider: provider.to_string(),
                })?;

            self.record_use(&credential).await;
            return Ok(content);
        }

        Err(GatewayError::RateLimitExhausted {
            provider: provider.to_string(),
        })
    }

    async fn try_transcribe(&self, path: &Path, provider: &str) -> Result<String, GatewayError> {
        let credential = self.acquire(provider).await?;
        let descriptor = self.descriptor(provider)?;
        let (Some(url), Some(model)) = (
            descriptor.transcription_url.as_deref(),
            descriptor.transcription_model.as_deref(),
        ) else {
            return Err(GatewayError::UnsupportedProvider {
                provider: provider.to_string(),
            });
        };

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| GatewayError::transport(provider, e))?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "clip.wav".to_string());
        let form = Form::new()
            .part("file", Part::bytes(bytes).file_name(file_name))
            .text("model", model.to_string());

        let request = self
            .client
            .post(url)
            .bearer_auth(&credential.secret)
            .multipart(form)
            .timeout(AUDIO_TIMEOUT);
        let response = with_headers(request, descriptor)
            .send()
            .await
            .map_err(|e| GatewayError::from_reqwest(provider, e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            self.penalize(&credential).await;
            return Err(GatewayError::RateLimitExhausted {
                provider: provider.to_string(),
            });
        }
        if status != StatusCode::OK {
            return Err(GatewayError::Http {
                provider: provider.to_string(),
                status: status.as_u16(),
            });
        }

        let parsed: TranscriptionResponse =
            response
                .json()
                .await
                .map_err(|_| GatewayError::MalformedResponse {
                    provider: provider.to_string(),
                })?;
        self.record_use(&credential).await;
        Ok(parsed.text.or(parsed.transcript).unwrap_or_default())
    }

    async fn acquire(&self, provider: &str) -> Result<Credential, GatewayError> {
        self.pool
            .acquire(provider)
            .await
            .map_err(|e| GatewayError::transport(provider, e))?
            .ok_or_else(|| GatewayError::NoCredential {
                provider: provider.to_string(),
            })
    }

    fn descriptor(&self, provider: &str) -> Result<&ProviderDescriptor, GatewayError> {
        self.providers
            .get(provider)
            .ok_or_else(|| GatewayError::UnsupportedProvider {
                provider: provider.to_string(),
            })
    }

    async fn penalize(&self, credential: &Credential) {
        if let Err(e) = self.pool.penalize(credential.id).await {
            error!("Failed to penalize key {}: {}", credential.id, e);
        }
    }

    async fn record_use(&self, credential: &Credential) {
        if let Err(e) = self.pool.record_use(credential.id).await {
            error!("Failed to record use of key {}: {}", credential.id, e);
        }
    }
}

#[async_trait]
impl AiBackend for AiGateway {
    async fn chat_complete(&self, prompt: Prompt, provider: &str, model: Option<&str>) -> String {
        self.chat_complete_with_attempts(&prompt, provider, model, self.attempts)
            .await
    }

    async fn transcribe_audio(&self, path: &Path, provider: &str) -> String {
        debug!("Transcribing {} via {}", path.display(), provider);
        match self.try_transcribe(path, provider).await {
            Ok(text) => text,
            Err(err) => {
                error!("Audio transcription failed: {}", err);
                String::new()
            }
        }
    }

    async fn describe_image(&self, path: &Path, provider: &str) -> String {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                error!("Cannot read frame {}: {}", path.display(), e);
                return String::new();
            }
        };
        let prompt = Prompt::Parts(vec![
            ContentPart::Text {
                text: DESCRIBE_INSTRUCTION.to_string(),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: format!("data:image/jpeg;base64,{}", STANDARD.encode(bytes)),
                },
            },
        ]);

        let reply = self.chat_complete(prompt, provider, None).await;
        if is_error_reply(&reply) {
            String::new()
        } else {
            reply
        }
    }
}

fn with_headers(
    mut request: reqwest::RequestBuilder,
    descriptor: &ProviderDescriptor,
) -> reqwest::RequestBuilder {
    for (name, value) in &descriptor.extra_headers {
        request = request.header(name.as_str(), value.as_str());
    }
    request
}

/// Whole-second `Retry-After` value, if the provider sent one.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

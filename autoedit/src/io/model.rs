//! Chat-completions client with bounded retry and per-attempt audit records.
//!
//! The HTTP call itself sits behind [`Transport`]; [`ModelClient`] owns the
//! credential check, status classification, retry loop and `api_call`
//! records. Backoff decisions come from [`RetryPolicy`].

use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::core::prompt::Prompt;
use crate::core::retry::{ErrorClass, RetryDecision, RetryPolicy, classify_status};
use crate::io::audit::{
    ApiCallRecord, ApiCallStatus, AuditLog, AuditRecord, excerpt, round_seconds,
};
use crate::io::config::ModelConfig;

/// One chat-completions request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub max_tokens: u32,
}

/// Raw HTTP reply: status plus body text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

/// Failures below the HTTP status layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),
    #[error("network error: {0}")]
    Network(String),
}

pub trait Transport {
    fn send(&self, request: &ModelRequest, token: &str) -> Result<HttpReply, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn send(&self, request: &ModelRequest, token: &str) -> Result<HttpReply, TransportError> {
        (**self).send(request, token)
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReplyMessage,
}

#[derive(Deserialize)]
struct ChatReplyMessage {
    content: Option<String>,
}

/// `reqwest::blocking` transport against an OpenAI-compatible endpoint.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::blocking::Client,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(endpoint: impl Into<String>, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    pub fn from_config(config: &ModelConfig) -> anyhow::Result<Self> {
        Self::new(
            config.endpoint.clone(),
            Duration::from_secs(config.request_timeout_secs),
        )
    }
}

fn transport_error(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout(err.to_string())
    } else {
        TransportError::Network(err.to_string())
    }
}

impl Transport for HttpTransport {
    #[instrument(skip_all, fields(model = %request.model))]
    fn send(&self, request: &ModelRequest, token: &str) -> Result<HttpReply, TransportError> {
        let body = ChatRequest {
            model: &request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: 0.0,
            max_tokens: request.max_tokens,
        };
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&body)
            .send()
            .map_err(transport_error)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(transport_error)?;
        debug!(status, bytes = body.len(), "model response received");
        Ok(HttpReply { status, body })
    }
}

/// Reply text at `choices[0].message.content`, if present.
pub fn reply_content(body: &str) -> Option<String> {
    let parsed: ChatResponse = serde_json::from_str(body).ok()?;
    parsed.choices.into_iter().next()?.message.content
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("environment variable {env} is not set")]
    MissingCredential { env: String },
    #[error("model API returned {status}: {body}")]
    ClientError { status: u16, body: String },
    #[error("model API server error {status}: {body}")]
    ServerError { status: u16, body: String },
    #[error("model API rate limited: {body}")]
    RateLimited { body: String },
    #[error("{0}")]
    Timeout(String),
    #[error("{0}")]
    NetworkError(String),
    #[error("invalid model response: {0}")]
    InvalidResponse(String),
    #[error("write api_call record: {0:#}")]
    Audit(anyhow::Error),
}

impl ModelError {
    /// Failure class for retry decisions. `None` for audit failures.
    pub fn class(&self) -> Option<ErrorClass> {
        match self {
            ModelError::MissingCredential { .. } => Some(ErrorClass::MissingCredential),
            ModelError::ClientError { .. } | ModelError::InvalidResponse(_) => {
                Some(ErrorClass::ClientError)
            }
            ModelError::ServerError { .. } => Some(ErrorClass::ServerError),
            ModelError::RateLimited { .. } => Some(ErrorClass::RateLimited),
            ModelError::Timeout(_) => Some(ErrorClass::Timeout),
            ModelError::NetworkError(_) => Some(ErrorClass::NetworkError),
            ModelError::Audit(_) => None,
        }
    }

    fn api_status(&self) -> ApiCallStatus {
        match self {
            ModelError::RateLimited { .. } => ApiCallStatus::RateLimited,
            ModelError::Timeout(_) => ApiCallStatus::Timeout,
            ModelError::NetworkError(_) => ApiCallStatus::NetworkError,
            _ => ApiCallStatus::Error,
        }
    }
}

impl From<TransportError> for ModelError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(message) => ModelError::Timeout(message),
            TransportError::Network(message) => ModelError::NetworkError(message),
        }
    }
}

fn error_for_status(status: u16, body: &str) -> Option<ModelError> {
    let body = excerpt(body);
    match classify_status(status)? {
        ErrorClass::RateLimited => Some(ModelError::RateLimited { body }),
        ErrorClass::ServerError => Some(ModelError::ServerError { status, body }),
        _ => Some(ModelError::ClientError { status, body }),
    }
}

/// Model invocation with retries. Every attempt appends one `api_call` record.
pub struct ModelClient<'a, T> {
    transport: T,
    credential: Option<String>,
    credential_env: String,
    max_tokens: u32,
    policy: RetryPolicy,
    audit: &'a AuditLog,
}

impl<'a, T: Transport> ModelClient<'a, T> {
    /// Build a client reading the bearer token from `config.token_env`.
    pub fn new(
        transport: T,
        config: &ModelConfig,
        policy: RetryPolicy,
        audit: &'a AuditLog,
    ) -> Self {
        Self {
            transport,
            credential: std::env::var(&config.token_env).ok(),
            credential_env: config.token_env.clone(),
            max_tokens: config.max_tokens,
            policy,
            audit,
        }
    }

    /// Override the credential read from the environment.
    pub fn with_credential(mut self, credential: Option<String>) -> Self {
        self.credential = credential;
        self
    }

    /// Send `prompt` to `model`, retrying transient failures.
    ///
    /// Returns the reply text, or the last error once retries are exhausted or
    /// the failure is not retryable. A missing credential fails before any
    /// request is made and records nothing.
    #[instrument(skip_all, fields(model = %model))]
    pub fn invoke(&self, prompt: &Prompt, model: &str) -> Result<String, ModelError> {
        let token = self
            .credential
            .as_deref()
            .filter(|token| !token.trim().is_empty())
            .ok_or_else(|| ModelError::MissingCredential {
                env: self.credential_env.clone(),
            })?;
        let request = ModelRequest {
            model: model.to_string(),
            system: prompt.system.clone(),
            user: prompt.user.clone(),
            max_tokens: self.max_tokens,
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let started = Instant::now();
            let (status_code, result) = self.attempt(&request, token);
            let record = ApiCallRecord {
                model: request.model.clone(),
                attempt,
                elapsed_seconds: round_seconds(started.elapsed()),
                status: result
                    .as_ref()
                    .map_or_else(ModelError::api_status, |_| ApiCallStatus::Success),
                status_code,
                error: result.as_ref().err().map(|err| excerpt(&err.to_string())),
            };
            self.audit
                .append(&AuditRecord::ApiCall(record))
                .map_err(ModelError::Audit)?;

            let err = match result {
                Ok(reply) => {
                    info!(attempt, "model call succeeded");
                    return Ok(reply);
                }
                Err(err) => err,
            };
            let decision = match err.class() {
                Some(class) => self.policy.decide(attempt, class),
                None => RetryDecision::GiveUp,
            };
            match decision {
                RetryDecision::RetryAfter(delay) => {
                    warn!(attempt, err = %err, delay_ms = delay.as_millis(), "model call failed, retrying");
                    thread::sleep(delay);
                }
                RetryDecision::GiveUp => {
                    warn!(attempt, err = %err, "model call failed, giving up");
                    return Err(err);
                }
            }
        }
    }

    fn attempt(
        &self,
        request: &ModelRequest,
        token: &str,
    ) -> (Option<u16>, Result<String, ModelError>) {
        let reply = match self.transport.send(request, token) {
            Ok(reply) => reply,
            Err(err) => return (None, Err(err.into())),
        };
        if let Some(err) = error_for_status(reply.status, &reply.body) {
            return (Some(reply.status), Err(err));
        }
        let result = reply_content(&reply.body).ok_or_else(|| {
            ModelError::InvalidResponse("missing choices[0].message.content".to_string())
        });
        (Some(reply.status), result)
    }
}

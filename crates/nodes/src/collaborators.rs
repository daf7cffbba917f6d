//! Narrow capability interfaces for side-effecting node types.
//!
//! Executors for `email_send`, `social_publish`, `webhook`, `ai_generate`
//! and `action` do not perform the side effect themselves. They call one of
//! these traits, which the host application implements and injects through
//! [`Collaborators`]. A collaborator failure surfaces as an
//! [`ExecutionOutcome`](crate::ExecutionOutcome) rather than being swallowed.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use thiserror::Error;
use tracing::info;

use crate::ExecutionOutcome;

/// Failure reported by a collaborator.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CollaboratorError {
    /// Worth retrying (rate limit, timeout, 5xx).
    #[error("transient collaborator failure: {0}")]
    Transient(String),

    /// Retrying will not help (rejected recipient, invalid credentials).
    #[error("permanent collaborator failure: {0}")]
    Permanent(String),
}

impl From<CollaboratorError> for ExecutionOutcome {
    fn from(err: CollaboratorError) -> Self {
        match err {
            CollaboratorError::Transient(msg) => Self::Retryable(msg),
            CollaboratorError::Permanent(msg) => Self::Fatal(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub cc: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SocialPost {
    pub platform: String,
    pub content: String,
    /// Publish immediately when absent.
    #[serde(default)]
    pub schedule_at: Option<String>,
    #[serde(default)]
    pub hashtags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookRequest {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: Map<String, Value>,
    #[serde(default)]
    pub body: Value,
}

fn default_method() -> String {
    "POST".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    pub prompt: String,
    #[serde(default)]
    pub max_tokens: Option<u32>,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(
        &self,
        message: &EmailMessage,
        idempotency_key: &str,
    ) -> Result<Value, CollaboratorError>;
}

#[async_trait]
pub trait SocialPublisher: Send + Sync {
    async fn publish(
        &self,
        post: &SocialPost,
        idempotency_key: &str,
    ) -> Result<Value, CollaboratorError>;
}

#[async_trait]
pub trait WebhookClient: Send + Sync {
    async fn call(
        &self,
        request: &WebhookRequest,
        idempotency_key: &str,
    ) -> Result<Value, CollaboratorError>;
}

#[async_trait]
pub trait ContentGenerator: Send + Sync {
    async fn generate(
        &self,
        request: &GenerationRequest,
        idempotency_key: &str,
    ) -> Result<String, CollaboratorError>;
}

/// Catch-all for `action` nodes, keyed by the node's `action_type`.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn perform(
        &self,
        action_type: &str,
        params: &Value,
        idempotency_key: &str,
    ) -> Result<Map<String, Value>, CollaboratorError>;
}

/// The full set of collaborators handed to the built-in executors.
#[derive(Clone)]
pub struct Collaborators {
    pub email: Arc<dyn EmailSender>,
    pub social: Arc<dyn SocialPublisher>,
    pub webhook: Arc<dyn WebhookClient>,
    pub content: Arc<dyn ContentGenerator>,
    pub actions: Arc<dyn ActionHandler>,
}

impl Collaborators {
    /// Every capability backed by [`DryRunCollaborator`].
    pub fn dry_run() -> Self {
        let dry = Arc::new(DryRunCollaborator);
        Self {
            email: dry.clone(),
            social: dry.clone(),
            webhook: dry.clone(),
            content: dry.clone(),
            actions: dry,
        }
    }
}

/// Logs what would have happened and returns a receipt. Used by the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunCollaborator;

fn receipt(idempotency_key: &str) -> Value {
    json!({ "dry_run": true, "idempotency_key": idempotency_key })
}

#[async_trait]
impl EmailSender for DryRunCollaborator {
    async fn send(
        &self,
        message: &EmailMessage,
        idempotency_key: &str,
    ) -> Result<Value, CollaboratorError> {
        info!(
            to = %message.to,
            subject = %message.subject,
            key = idempotency_key,
            "dry-run: email"
        );
        Ok(receipt(idempotency_key))
    }
}

#[async_trait]
impl SocialPublisher for DryRunCollaborator {
    async fn publish(
        &self,
        post: &SocialPost,
        idempotency_key: &str,
    ) -> Result<Value, CollaboratorError> {
        info!(
            platform = %post.platform,
            scheduled = post.schedule_at.is_some(),
            key = idempotency_key,
            "dry-run: social post"
        );
        Ok(receipt(idempotency_key))
    }
}

#[async_trait]
impl WebhookClient for DryRunCollaborator {
    async fn call(
        &self,
        request: &WebhookRequest,
        idempotency_key: &str,
    ) -> Result<Value, CollaboratorError> {
        info!(
            method = %request.method,
            url = %request.url,
            key = idempotency_key,
            "dry-run: webhook"
        );
        Ok(receipt(idempotency_key))
    }
}

#[async_trait]
impl ContentGenerator for DryRunCollaborator {
    async fn generate(
        &self,
        request: &GenerationRequest,
        idempotency_key: &str,
    ) -> Result<String, CollaboratorError> {
        info!(provider = %request.provider, key = idempotency_key, "dry-run: content generation");
        Ok(format!("[dry-run] {}", request.prompt))
    }
}

#[async_trait]
impl ActionHandler for DryRunCollaborator {
    async fn perform(
        &self,
        action_type: &str,
        _params: &Value,
        idempotency_key: &str,
    ) -> Result<Map<String, Value>, CollaboratorError> {
        info!(action_type, key = idempotency_key, "dry-run: action");
        let mut out = Map::new();
        out.insert(format!("{action_type}_result"), receipt(idempotency_key));
        Ok(out)
    }
}

//! Executors whose side effects live in a collaborator.
//!
//! Each one renders `{{path}}` placeholders in its configuration against the
//! claimed snapshot, hands the typed request to its collaborator together with
//! the invocation's idempotency key, and writes the collaborator's answer under
//! `output_key` (or the node type's default key).

use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::collaborators::{
    ActionHandler, ContentGenerator, EmailMessage, EmailSender, GenerationRequest, SocialPost,
    SocialPublisher, WebhookClient, WebhookRequest,
};
use crate::{ExecutionOutcome, NodeError, NodeExecutor, NodeInvocation, NodeType};

/// Rendered, typed configuration plus the optional `output_key` override.
fn prepare<T: DeserializeOwned>(
    invocation: &NodeInvocation,
) -> Result<(T, Option<String>), NodeError> {
    let rendered = invocation.context.render_value(&invocation.config);
    let output_key = rendered
        .get("output_key")
        .and_then(Value::as_str)
        .map(str::to_owned);

    let request = serde_json::from_value(rendered).map_err(|e| NodeError::InvalidConfig {
        node_id: invocation.node_id.clone(),
        message: e.to_string(),
    })?;

    Ok((request, output_key))
}

macro_rules! prepare_or_fail {
    ($invocation:expr) => {
        match prepare($invocation) {
            Ok(prepared) => prepared,
            Err(e) => return e.into(),
        }
    };
}

/// `email_send` → [`EmailSender`].
pub struct EmailSendNode {
    sender: Arc<dyn EmailSender>,
}

impl EmailSendNode {
    pub fn new(sender: Arc<dyn EmailSender>) -> Self {
        Self { sender }
    }
}

#[async_trait]
impl NodeExecutor for EmailSendNode {
    fn node_types(&self) -> Vec<NodeType> {
        vec![NodeType::EmailSend]
    }

    async fn execute(&self, invocation: &NodeInvocation) -> ExecutionOutcome {
        let (message, output_key): (EmailMessage, _) = prepare_or_fail!(invocation);

        match self.sender.send(&message, &invocation.idempotency_key()).await {
            Ok(receipt) => {
                let key = output_key.unwrap_or_else(|| "email_receipt".into());
                ExecutionOutcome::write(key, receipt)
            }
            Err(e) => e.into(),
        }
    }
}

/// `social_publish` → [`SocialPublisher`].
pub struct SocialPublishNode {
    publisher: Arc<dyn SocialPublisher>,
}

impl SocialPublishNode {
    pub fn new(publisher: Arc<dyn SocialPublisher>) -> Self {
        Self { publisher }
    }
}

#[async_trait]
impl NodeExecutor for SocialPublishNode {
    fn node_types(&self) -> Vec<NodeType> {
        vec![NodeType::SocialPublish]
    }

    async fn execute(&self, invocation: &NodeInvocation) -> ExecutionOutcome {
        let (post, output_key): (SocialPost, _) = prepare_or_fail!(invocation);

        match self.publisher.publish(&post, &invocation.idempotency_key()).await {
            Ok(result) => {
                let key = output_key.unwrap_or_else(|| "social_post".into());
                ExecutionOutcome::write(key, result)
            }
            Err(e) => e.into(),
        }
    }
}

/// `webhook` → [`WebhookClient`].
pub struct WebhookNode {
    client: Arc<dyn WebhookClient>,
}

impl WebhookNode {
    pub fn new(client: Arc<dyn WebhookClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl NodeExecutor for WebhookNode {
    fn node_types(&self) -> Vec<NodeType> {
        vec![NodeType::Webhook]
    }

    async fn execute(&self, invocation: &NodeInvocation) -> ExecutionOutcome {
        let (request, output_key): (WebhookRequest, _) = prepare_or_fail!(invocation);

        match self.client.call(&request, &invocation.idempotency_key()).await {
            Ok(response) => {
                let key = output_key.unwrap_or_else(|| "webhook_response".into());
                ExecutionOutcome::write(key, response)
            }
            Err(e) => e.into(),
        }
    }
}

/// `ai_generate` → [`ContentGenerator`].
pub struct AiGenerateNode {
    generator: Arc<dyn ContentGenerator>,
}

impl AiGenerateNode {
    pub fn new(generator: Arc<dyn ContentGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl NodeExecutor for AiGenerateNode {
    fn node_types(&self) -> Vec<NodeType> {
        vec![NodeType::AiGenerate]
    }

    async fn execute(&self, invocation: &NodeInvocation) -> ExecutionOutcome {
        let (request, output_key): (GenerationRequest, _) = prepare_or_fail!(invocation);

        match self.generator.generate(&request, &invocation.idempotency_key()).await {
            Ok(text) => ExecutionOutcome::write(
                output_key.unwrap_or_else(|| "ai_generated_content".into()),
                Value::String(text),
            ),
            Err(e) => e.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ActionConfig {
    action_type: String,
    #[serde(default)]
    params: Value,
}

/// `action` → [`ActionHandler`]; every key the handler returns is written.
pub struct ActionNode {
    handler: Arc<dyn ActionHandler>,
}

impl ActionNode {
    pub fn new(handler: Arc<dyn ActionHandler>) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl NodeExecutor for ActionNode {
    fn node_types(&self) -> Vec<NodeType> {
        vec![NodeType::Action]
    }

    async fn execute(&self, invocation: &NodeInvocation) -> ExecutionOutcome {
        let (config, _): (ActionConfig, _) = prepare_or_fail!(invocation);
        debug!(
            node_id = %invocation.node_id,
            action_type = %config.action_type,
            "dispatching action"
        );

        match self
            .handler
            .perform(&config.action_type, &config.params, &invocation.idempotency_key())
            .await
        {
            Ok(writes) => ExecutionOutcome::Success(writes),
            Err(e) => e.into(),
        }
    }
}

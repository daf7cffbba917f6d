//! Built-in executors for every [`NodeType`].

mod condition;
mod delay;
mod outbound;
mod transform;
mod trigger;

use std::sync::Arc;

pub use condition::ConditionNode;
pub use delay::DelayNode;
pub use outbound::{ActionNode, AiGenerateNode, EmailSendNode, SocialPublishNode, WebhookNode};
pub use transform::DataTransformNode;
pub use trigger::TriggerNode;

use crate::{Collaborators, NodeExecutor};

/// One executor per node type, side-effecting ones wired to `collaborators`.
pub fn all(collaborators: &Collaborators) -> Vec<Arc<dyn NodeExecutor>> {
    vec![
        Arc::new(TriggerNode),
        Arc::new(ConditionNode),
        Arc::new(DelayNode),
        Arc::new(DataTransformNode),
        Arc::new(EmailSendNode::new(collaborators.email.clone())),
        Arc::new(SocialPublishNode::new(collaborators.social.clone())),
        Arc::new(WebhookNode::new(collaborators.webhook.clone())),
        Arc::new(AiGenerateNode::new(collaborators.content.clone())),
        Arc::new(ActionNode::new(collaborators.actions.clone())),
    ]
}

//! The closed set of node types a workflow definition may use.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Tag selecting which executor handles a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    /// Entry point; copies the trigger payload into the context.
    Trigger,
    /// Generic action routed to an [`ActionHandler`](crate::collaborators::ActionHandler).
    Action,
    /// Compares a context value and records the result.
    Condition,
    /// Waits for a fixed duration.
    Delay,
    /// Calls an outbound webhook.
    Webhook,
    /// Generates content through an AI provider.
    AiGenerate,
    /// Publishes or schedules a social media post.
    SocialPublish,
    /// Sends an email.
    EmailSend,
    /// Reshapes context data.
    DataTransform,
}

impl NodeType {
    pub const ALL: [NodeType; 9] = [
        NodeType::Trigger,
        NodeType::Action,
        NodeType::Condition,
        NodeType::Delay,
        NodeType::Webhook,
        NodeType::AiGenerate,
        NodeType::SocialPublish,
        NodeType::EmailSend,
        NodeType::DataTransform,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trigger       => "trigger",
            Self::Action        => "action",
            Self::Condition     => "condition",
            Self::Delay         => "delay",
            Self::Webhook       => "webhook",
            Self::AiGenerate    => "ai_generate",
            Self::SocialPublish => "social_publish",
            Self::EmailSend     => "email_send",
            Self::DataTransform => "data_transform",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "trigger" | "start" => Ok(Self::Trigger),
            "action"            => Ok(Self::Action),
            "condition"         => Ok(Self::Condition),
            "delay"             => Ok(Self::Delay),
            "webhook"           => Ok(Self::Webhook),
            "ai_generate"       => Ok(Self::AiGenerate),
            "social_publish"    => Ok(Self::SocialPublish),
            "email_send"        => Ok(Self::EmailSend),
            "data_transform"    => Ok(Self::DataTransform),
            other               => Err(format!("unknown node type: {other}")),
        }
    }
}

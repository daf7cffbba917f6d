use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::{ExecutionOutcome, NodeError, NodeExecutor, NodeInvocation, NodeType};

#[derive(Debug, Default, Deserialize)]
struct DelayConfig {
    #[serde(default)]
    seconds: u64,
    #[serde(default)]
    millis: u64,
}

/// Sleeps for `seconds` + `millis`, writes nothing.
pub struct DelayNode;

#[async_trait]
impl NodeExecutor for DelayNode {
    fn node_types(&self) -> Vec<NodeType> {
        vec![NodeType::Delay]
    }

    async fn execute(&self, invocation: &NodeInvocation) -> ExecutionOutcome {
        let config: DelayConfig = match invocation.parse_config() {
            Ok(c) => c,
            Err(e) => return e.into(),
        };

        let Some(delay) =
            Duration::from_secs(config.seconds).checked_add(Duration::from_millis(config.millis))
        else {
            return NodeError::InvalidConfig {
                node_id: invocation.node_id.clone(),
                message: format!("delay of {}s + {}ms overflows", config.seconds, config.millis),
            }
            .into();
        };
        debug!(node_id = %invocation.node_id, ?delay, "delay node sleeping");
        tokio::time::sleep(delay).await;

        ExecutionOutcome::done()
    }
}

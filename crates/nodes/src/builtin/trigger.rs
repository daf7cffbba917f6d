use async_trait::async_trait;
use serde::Deserialize;

use crate::{ExecutionOutcome, NodeExecutor, NodeInvocation, NodeType, OutputWrites};

#[derive(Debug, Default, Deserialize)]
struct TriggerConfig {
    /// Only these payload keys are copied; all of them when empty.
    #[serde(default)]
    keys: Vec<String>,
}

/// Entry node: copies the trigger payload into the context.
pub struct TriggerNode;

#[async_trait]
impl NodeExecutor for TriggerNode {
    fn node_types(&self) -> Vec<NodeType> {
        vec![NodeType::Trigger]
    }

    async fn execute(&self, invocation: &NodeInvocation) -> ExecutionOutcome {
        let config: TriggerConfig = match invocation.parse_config() {
            Ok(c) => c,
            Err(e) => return e.into(),
        };

        let writes: OutputWrites = invocation
            .context
            .trigger_payload()
            .iter()
            .filter(|(k, _)| config.keys.is_empty() || config.keys.contains(k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        ExecutionOutcome::Success(writes)
    }
}

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use crate::{ExecutionOutcome, NodeError, NodeExecutor, NodeInvocation, NodeType, OutputWrites};

#[derive(Debug, Default, Deserialize)]
struct TransformConfig {
    /// Literal values; strings may contain `{{path}}` placeholders.
    #[serde(default)]
    set: BTreeMap<String, Value>,
    /// `destination -> source path`; the source must exist.
    #[serde(default)]
    copy: BTreeMap<String, String>,
}

/// Reshapes context data without leaving the process.
pub struct DataTransformNode;

#[async_trait]
impl NodeExecutor for DataTransformNode {
    fn node_types(&self) -> Vec<NodeType> {
        vec![NodeType::DataTransform]
    }

    async fn execute(&self, invocation: &NodeInvocation) -> ExecutionOutcome {
        let config: TransformConfig = match invocation.parse_config() {
            Ok(c) => c,
            Err(e) => return e.into(),
        };
        let ctx = &invocation.context;
        let mut writes = OutputWrites::new();

        for (dest, source) in &config.copy {
            match ctx.lookup(source) {
                Some(value) => {
                    writes.insert(dest.clone(), value.clone());
                }
                None => return NodeError::MissingContextKey(source.clone()).into(),
            }
        }
        for (key, value) in &config.set {
            writes.insert(key.clone(), ctx.render_value(value));
        }

        ExecutionOutcome::Success(writes)
    }
}

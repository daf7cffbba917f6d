//! Engine tuning knobs.

use std::time::Duration;

use crate::models::NodeDefinition;

/// Settings shared by every run an executor drives.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum number of node executions in flight per run.
    pub concurrency: usize,
    /// Executor invocations allowed per node (first try included).
    pub max_attempts: u32,
    /// Base delay for exponential back-off between retries.
    pub retry_base_delay: Duration,
    /// Upper bound for a single back-off delay.
    pub retry_max_delay: Duration,
    /// Per-invocation timeout; expiry counts as a retryable failure.
    pub node_timeout: Duration,
    /// Treat guard evaluation errors as node failures instead of "not taken".
    pub strict_guards: bool,
    /// Attach a context snapshot to completion and settlement log records.
    pub log_context_snapshots: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            max_attempts: 3,
            retry_base_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(30),
            node_timeout: Duration::from_secs(300),
            strict_guards: false,
            log_context_snapshots: true,
        }
    }
}

impl EngineConfig {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_retry_delays(mut self, base: Duration, max: Duration) -> Self {
        self.retry_base_delay = base;
        self.retry_max_delay = max;
        self
    }

    pub fn with_node_timeout(mut self, timeout: Duration) -> Self {
        self.node_timeout = timeout;
        self
    }

    pub fn with_strict_guards(mut self, strict: bool) -> Self {
        self.strict_guards = strict;
        self
    }

    /// Delay before re-running a node whose `failed_attempts`-th attempt was
    /// retryable: `base × 2^(failed_attempts - 1)`, capped at `retry_max_delay`.
    pub fn backoff_delay(&self, failed_attempts: u32) -> Duration {
        let factor = 2u32.checked_pow(failed_attempts.saturating_sub(1)).unwrap_or(u32::MAX);
        self.retry_base_delay
            .checked_mul(factor)
            .unwrap_or(self.retry_max_delay)
            .min(self.retry_max_delay)
    }

    pub fn attempts_for(&self, node: &NodeDefinition) -> u32 {
        node.max_attempts.unwrap_or(self.max_attempts).max(1)
    }

    pub fn timeout_for(&self, node: &NodeDefinition) -> Duration {
        node.timeout_ms.map(Duration::from_millis).unwrap_or(self.node_timeout)
    }
}

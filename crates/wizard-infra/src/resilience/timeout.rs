//! Timeout handling
//!
//! Provides deadlines for hook and storage operations.

use std::future::Future;
use std::time::Duration;
use tracing::warn;
use wizard_core::TimeoutConfig;

/// Timeout error
#[derive(Debug, Clone, thiserror::Error)]
#[error("Operation '{operation}' timed out after {duration:?}")]
pub struct TimeoutError {
    /// Duration that was exceeded
    pub duration: Duration,
    /// Operation name
    pub operation: String,
}

/// Timeout policy configuration
#[derive(Debug, Clone)]
pub struct TimeoutPolicy {
    /// Deadline for guard, validate, on_enter, on_exit and on_complete hooks
    pub hook_timeout: Duration,
    /// Deadline for storage adapter calls
    pub storage_timeout: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::from_config(&TimeoutConfig::default())
    }
}

impl TimeoutPolicy {
    /// Create a policy using one deadline for everything
    pub fn new(timeout: Duration) -> Self {
        Self {
            hook_timeout: timeout,
            storage_timeout: timeout,
        }
    }

    pub fn from_config(config: &TimeoutConfig) -> Self {
        Self {
            hook_timeout: config.hook_timeout(),
            storage_timeout: config.storage_timeout(),
        }
    }

    /// Set hook timeout
    pub fn with_hook_timeout(mut self, timeout: Duration) -> Self {
        self.hook_timeout = timeout;
        self
    }

    /// Set storage timeout
    pub fn with_storage_timeout(mut self, timeout: Duration) -> Self {
        self.storage_timeout = timeout;
        self
    }

    /// Run a hook under the hook deadline
    pub async fn hook<Fut, T>(&self, operation_name: &str, operation: Fut) -> Result<T, TimeoutError>
    where
        Fut: Future<Output = T>,
    {
        self.execute_with_timeout(operation_name, self.hook_timeout, operation)
            .await
    }

    /// Run a storage call under the storage deadline
    pub async fn storage<Fut, T>(
        &self,
        operation_name: &str,
        operation: Fut,
    ) -> Result<T, TimeoutError>
    where
        Fut: Future<Output = T>,
    {
        self.execute_with_timeout(operation_name, self.storage_timeout, operation)
            .await
    }

    /// Execute an operation with a specific timeout
    pub async fn execute_with_timeout<Fut, T>(
        &self,
        operation_name: &str,
        timeout: Duration,
        operation: Fut,
    ) -> Result<T, TimeoutError>
    where
        Fut: Future<Output = T>,
    {
        match tokio::time::timeout(timeout, operation).await {
            Ok(result) => Ok(result),
            Err(_) => {
                warn!(
                    operation = operation_name,
                    timeout_ms = timeout.as_millis() as u64,
                    "Operation timed out"
                );
                Err(TimeoutError {
                    duration: timeout,
                    operation: operation_name.to_string(),
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_timeout_success() {
        let policy = TimeoutPolicy::default();

        let result = policy.hook("guard", async { 42 }).await;

        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn test_timeout_exceeded() {
        let policy = TimeoutPolicy::new(Duration::from_secs(5))
            .with_storage_timeout(Duration::from_millis(10));

        let result = policy
            .storage("storage.save", async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                42
            })
            .await;

        let err = result.unwrap_err();
        assert_eq!(err.operation, "storage.save");
        assert_eq!(err.duration, Duration::from_millis(10));
    }

    #[test]
    fn test_policy_from_config() {
        let policy = TimeoutPolicy::from_config(&TimeoutConfig {
            hook_ms: 250,
            storage_ms: 1_500,
        });

        assert_eq!(policy.hook_timeout, Duration::from_millis(250));
        assert_eq!(policy.storage_timeout, Duration::from_millis(1_500));
    }
}

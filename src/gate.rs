use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::error::ServiceError;

/// Bounds concurrent access to the shared model. One loaded model instance
/// cannot serve parallel generation calls, so the default capacity is a
/// single permit; deployments with N backend replicas raise it to N.
pub struct ExecutionGate {
    permits: Arc<Semaphore>,
    wait_timeout: Duration,
}

impl ExecutionGate {
    /// Panics if `capacity` is zero: a gate nobody can pass is a
    /// misconfiguration, not a policy.
    pub fn new(capacity: usize, wait_timeout: Duration) -> Self {
        assert!(capacity > 0, "execution gate requires at least one permit");
        Self {
            permits: Arc::new(Semaphore::new(capacity)),
            wait_timeout,
        }
    }

    /// Waits FIFO for a permit up to the configured timeout. The permit is
    /// owned, so dropping it on any exit path releases the gate.
    pub async fn acquire(&self) -> Result<OwnedSemaphorePermit, ServiceError> {
        match tokio::time::timeout(self.wait_timeout, self.permits.clone().acquire_owned()).await {
            Ok(Ok(permit)) => Ok(permit),
            // closed never happens here, but map it rather than panic
            Ok(Err(_)) => Err(ServiceError::Overloaded),
            Err(_) => Err(ServiceError::Overloaded),
        }
    }

    #[cfg(test)]
    pub fn available_permits(&self) -> usize {
        self.permits.available_permits()
    }
}

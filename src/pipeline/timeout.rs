//! Per-attempt processing deadline

use super::{Middleware, Next};
use crate::error::{RelayerError, RelayerResult};

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::timeout;
use tracing::warn;

/// Fails the attempt once the rest of the chain exceeds `limit`.
///
/// Placed inside the metrics stage so an expired deadline is accounted as
/// a failed attempt.
pub struct TimeoutMiddleware {
    limit: Duration,
}

impl TimeoutMiddleware {
    pub fn new(limit: Duration) -> Self {
        Self { limit }
    }
}

#[async_trait]
impl<C: Send + 'static> Middleware<C> for TimeoutMiddleware {
    async fn handle(&self, ctx: &mut C, next: Next<'_, C>) -> RelayerResult<()> {
        match timeout(self.limit, next.run(ctx)).await {
            Ok(result) => result,
            Err(_) => {
                warn!("Processing exceeded {:?}", self.limit);
                Err(RelayerError::Timeout {
                    operation: format!("job processing ({} ms)", self.limit.as_millis()),
                })
            }
        }
    }
}

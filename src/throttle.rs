use async_trait::async_trait;
use std::time::Duration;

/// Common protocol of the outbound limiters: wait for permission to issue one call,
/// or push the next permission out after the server showed distress.
#[async_trait]
pub trait Throttle: Send + Sync {
    /// Suspends the calling task until one call may be issued, then spends it.
    async fn acquire(&self);

    /// Drops any remaining allowance; nothing is granted again until `delay` from now.
    fn cooldown(&self, delay: Duration);
}

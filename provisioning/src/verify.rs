use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// How often a post-grant re-query is attempted before a missing grant is
/// reported. The default is a single check with no polling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for VerifyPolicy {
    fn default() -> Self {
        Self::single_shot()
    }
}

impl VerifyPolicy {
    pub fn single_shot() -> Self {
        Self {
            attempts: 1,
            delay: Duration::ZERO,
        }
    }

    pub fn polling(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Run `check` until it reports satisfied or attempts run out.
    ///
    /// Returns the last observation and whether it was satisfied. Errors
    /// from `check` end the loop immediately.
    pub async fn run<T, E, F, Fut>(
        &self,
        satisfied: impl Fn(&T) -> bool,
        mut check: F,
    ) -> Result<(T, bool), E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            let observed = check().await?;
            if satisfied(&observed) {
                return Ok((observed, true));
            }
            if attempt >= attempts {
                return Ok((observed, false));
            }
            debug!(
                attempt,
                attempts,
                delay_ms = self.delay.as_millis() as u64,
                "Grant not visible yet; re-checking"
            );
            tokio::time::sleep(self.delay).await;
            attempt += 1;
        }
    }
}

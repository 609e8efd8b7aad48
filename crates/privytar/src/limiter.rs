//! Token-bucket limiter for outbound requests

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

/// Longest single sleep in `acquire`; the bucket is re-checked after it.
const MAX_WAIT: Duration = Duration::from_secs(3600);

/// Token bucket shared by every fetch issued from one client.
///
/// Holds up to `burst` tokens and refills at `rate` tokens per second.
/// The lock is never held across an await.
#[derive(Debug)]
pub(crate) struct TokenBucket {
    state: Mutex<BucketState>,
    rate: f64,
    burst: f64,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    refilled_at: Instant,
}

impl TokenBucket {
    /// Start with a full bucket.
    ///
    /// `burst` is raised to at least one. A rate too small to refill a token
    /// within `MAX_WAIT` makes `acquire` sleep in `MAX_WAIT` steps.
    pub(crate) fn new(rate: f64, burst: u32) -> Self {
        let burst = f64::from(burst.max(1));
        Self {
            state: Mutex::new(BucketState {
                tokens: burst,
                refilled_at: Instant::now(),
            }),
            rate,
            burst,
        }
    }

    /// Take one token, sleeping until one is available.
    ///
    /// Cancel-safe: dropping the future before it resolves takes nothing.
    pub(crate) async fn acquire(&self) {
        loop {
            let wait = match self.try_take() {
                Ok(()) => return,
                Err(wait) => wait,
            };
            tokio::time::sleep(wait).await;
        }
    }

    /// Take one token if one is available right now
    pub(crate) fn try_acquire(&self) -> bool {
        self.try_take().is_ok()
    }

    fn try_take(&self) -> Result<(), Duration> {
        let mut state = self.state.lock();
        let now = Instant::now();

        let elapsed = now.saturating_duration_since(state.refilled_at).as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.rate).min(self.burst);
        state.refilled_at = now;

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            let wait = (1.0 - state.tokens) / self.rate;
            Err(Duration::try_from_secs_f64(wait).map_or(MAX_WAIT, |wait| wait.min(MAX_WAIT)))
        }
    }
}

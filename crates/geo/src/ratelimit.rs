//! Token-bucket rate limiting for provider calls.

use tokio::sync::Mutex;
use tokio::time::{Duration, Instant, sleep};

/// A token bucket: `capacity` tokens, refilled continuously at
/// `refill_per_second`. Each provider call acquires one token, so request
/// rate is bounded by the provider's documented quota regardless of how many
/// workers are dispatching.
pub struct TokenBucket {
    capacity: f64,
    refill_per_second: f64,
    state: Mutex<BucketState>,
}

struct BucketState {
    tokens: f64,
    refilled_at: Instant,
}

impl TokenBucket {
    /// Create a bucket that starts full.
    ///
    /// `refill_per_second` must be positive; a zero rate would deadlock every
    /// caller after the initial burst, so it is clamped to a slow trickle.
    pub fn new(capacity: u32, refill_per_second: f64) -> Self {
        let capacity = f64::from(capacity.max(1));
        Self {
            capacity,
            refill_per_second: refill_per_second.max(0.001),
            state: Mutex::new(BucketState { tokens: capacity, refilled_at: Instant::now() }),
        }
    }

    /// Wait until a token is available, then consume it.
    pub async fn acquire(&self) {
        loop {
            let wait = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                let elapsed = now.duration_since(state.refilled_at).as_secs_f64();
                state.tokens = (state.tokens + elapsed * self.refill_per_second).min(self.capacity);
                state.refilled_at = now;

                if state.tokens >= 1.0 {
                    state.tokens -= 1.0;
                    return;
                }
                // Not enough tokens; sleep outside the lock so other callers
                // aren't blocked from refilling.
                Duration::from_secs_f64((1.0 - state.tokens) / self.refill_per_second)
            };
            sleep(wait).await;
        }
    }
}

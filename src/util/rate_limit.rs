//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified requests per second
pub fn create_limiter(requests_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Clients send one action per frame at most (50 fps), twice that is abuse
pub const ACTION_RATE_LIMIT: u32 = 100;

/// Per-player rate limiter state
#[derive(Clone)]
pub struct PlayerRateLimiter {
    action_limiter: Arc<Limiter>,
}

impl PlayerRateLimiter {
    pub fn new() -> Self {
        Self::with_rate(ACTION_RATE_LIMIT)
    }

    pub fn with_rate(per_second: u32) -> Self {
        Self {
            action_limiter: create_limiter(per_second),
        }
    }

    /// Check if an action message is allowed (returns true if allowed)
    pub fn check_action(&self) -> bool {
        self.action_limiter.check().is_ok()
    }
}

impl Default for PlayerRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

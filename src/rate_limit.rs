use std::{sync::Mutex, time::Duration};

use tokio::time::{sleep_until, Instant};

use crate::RateLimit;

#[derive(Debug, Default)]
struct GateState {
    /// Instant the most recently admitted dispatch was scheduled for.
    last_slot: Option<Instant>,
    /// Deadline set by a 429; cleared lazily once it has passed.
    limited_until: Option<Instant>,
}

/// Spaces dispatches at least `window_ms / requests` apart and tracks the
/// server-signaled cool-down.
///
/// Each caller reserves the next free slot under the lock and then sleeps
/// outside it, so concurrent callers queue up behind each other instead of
/// all passing the spacing check at once.
#[derive(Debug)]
pub(crate) struct RateLimitGate {
    min_interval: Duration,
    state: Mutex<GateState>,
}

impl RateLimitGate {
    pub(crate) fn new(limit: RateLimit) -> Self {
        Self {
            min_interval: limit.min_interval(),
            state: Mutex::new(GateState::default()),
        }
    }

    /// Reserves a dispatch slot and returns the instant it opens.
    pub(crate) fn reserve(&self) -> Instant {
        let now = Instant::now();
        let mut state = self.lock();
        let slot = match state.last_slot {
            Some(last) => (last + self.min_interval).max(now),
            None => now,
        };
        state.last_slot = Some(slot);
        slot
    }

    /// Waits until this caller may dispatch.
    pub(crate) async fn acquire(&self) -> Duration {
        let slot = self.reserve();
        let wait = slot.saturating_duration_since(Instant::now());
        if !wait.is_zero() {
            #[cfg(feature = "tracing")]
            tracing::debug!(wait_ms = wait.as_millis() as u64, "rate limit gate delaying dispatch");

            sleep_until(slot).await;
        }
        wait
    }

    pub(crate) fn mark_rate_limited(&self, duration: Duration) {
        let until = Instant::now() + duration;
        let mut state = self.lock();
        state.limited_until = Some(match state.limited_until {
            Some(existing) => existing.max(until),
            None => until,
        });
    }

    pub(crate) fn is_rate_limited(&self) -> bool {
        let mut state = self.lock();
        match state.limited_until {
            Some(until) if until > Instant::now() => true,
            Some(_) => {
                state.limited_until = None;
                false
            }
            None => false,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GateState> {
        // The state is plain data; a panic elsewhere cannot leave it torn.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

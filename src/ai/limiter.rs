//! Admission Controller (Rate Limiter)
//!
//! Process-wide gate in front of the completion endpoint enforcing three
//! independent ceilings:
//!
//! - **Requests per minute**: sliding 60-second window of admission timestamps
//! - **Requests per day**: counter reset at each UTC midnight
//! - **Tokens per minute**: estimated-token counter reset every minute
//!
//! ## Locking
//!
//! All counters live in one `RateLimitState` behind a single mutex so that
//! they are always purged, checked and committed together. The lock is never
//! held across an `.await`: when a call has to wait, the wait is computed
//! under the lock, the lock is released, the caller sleeps, and the whole
//! check runs again from the top. Capacity is only recorded on admission, so
//! a caller canceled while waiting leaves the counters untouched.
//!
//! ```text
//! admit(n) ──lock──> reset daily/token periods ──> daily cap? ──> Err(DailyLimitExceeded)
//!                     purge window ──> wait needed? ──unlock──> sleep(wait) ──┐
//!                                   └─> commit(now, n) ──unlock──> Ok        │
//!                     ^──────────────────────────────────────────────────────┘
//! ```

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::cancel::CallContext;
use crate::constants::limits as limit_constants;
use crate::types::{ForgeError, Result};

const WINDOW: Duration = Duration::from_secs(limit_constants::WINDOW_SECS);
const DAY: Duration = Duration::from_secs(limit_constants::DAY_SECS);

// =============================================================================
// Configuration
// =============================================================================

/// The three configured ceilings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimits {
    pub requests_per_minute: u32,
    pub requests_per_day: u32,
    pub tokens_per_minute: u64,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self {
            requests_per_minute: limit_constants::REQUESTS_PER_MINUTE,
            requests_per_day: limit_constants::REQUESTS_PER_DAY,
            tokens_per_minute: limit_constants::TOKENS_PER_MINUTE,
        }
    }
}

impl RateLimits {
    pub fn validate(&self) -> Result<()> {
        if self.requests_per_minute == 0 {
            return Err(ForgeError::Config(
                "limits.requests_per_minute must be greater than 0".to_string(),
            ));
        }
        if self.requests_per_day == 0 {
            return Err(ForgeError::Config(
                "limits.requests_per_day must be greater than 0".to_string(),
            ));
        }
        if self.tokens_per_minute == 0 {
            return Err(ForgeError::Config(
                "limits.tokens_per_minute must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// State
// =============================================================================

/// All mutable limiter state, guarded as one unit
#[derive(Debug)]
struct RateLimitState {
    window: VecDeque<Instant>,
    daily_count: u32,
    daily_reset_at: Instant,
    tokens_this_minute: u64,
    token_reset_at: Instant,
}

/// Outcome of one locked admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Decision {
    Admitted,
    Wait(Duration),
    DailyExhausted(Duration),
}

impl RateLimitState {
    fn new(now: Instant, daily_reset_in: Duration) -> Self {
        Self {
            window: VecDeque::new(),
            daily_count: 0,
            daily_reset_at: now + daily_reset_in,
            tokens_this_minute: 0,
            token_reset_at: now + WINDOW,
        }
    }

    /// Roll the daily and per-minute periods forward and purge the window
    fn refresh(&mut self, now: Instant) {
        if now >= self.daily_reset_at {
            self.daily_count = 0;
            while now >= self.daily_reset_at {
                self.daily_reset_at += DAY;
            }
            debug!("Daily request counter reset");
        }

        if now >= self.token_reset_at {
            self.tokens_this_minute = 0;
            while now >= self.token_reset_at {
                self.token_reset_at += WINDOW;
            }
        }

        while let Some(oldest) = self.window.front() {
            if now.saturating_duration_since(*oldest) >= WINDOW {
                self.window.pop_front();
            } else {
                break;
            }
        }
    }

    /// Check every ceiling and, when all pass, record the call
    fn try_admit(&mut self, now: Instant, limits: &RateLimits, estimated_tokens: u64) -> Decision {
        self.refresh(now);

        if self.daily_count >= limits.requests_per_day {
            return Decision::DailyExhausted(self.daily_reset_at.saturating_duration_since(now));
        }

        if self.window.len() >= limits.requests_per_minute as usize
            && let Some(oldest) = self.window.front()
        {
            let wait = WINDOW.saturating_sub(now.saturating_duration_since(*oldest));
            return Decision::Wait(wait);
        }

        // A single call larger than the whole budget is let through on an
        // empty minute; otherwise it could never be admitted.
        let fits = self.tokens_this_minute.saturating_add(estimated_tokens)
            <= limits.tokens_per_minute
            || self.tokens_this_minute == 0;
        if !fits {
            return Decision::Wait(self.token_reset_at.saturating_duration_since(now));
        }

        self.window.push_back(now);
        self.daily_count += 1;
        self.tokens_this_minute = self.tokens_this_minute.saturating_add(estimated_tokens);
        Decision::Admitted
    }
}

// =============================================================================
// Stats
// =============================================================================

/// Point-in-time view of the limiter, refreshed before reading
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitStats {
    pub requests_this_minute: u32,
    pub requests_per_minute_limit: u32,
    pub daily_requests: u32,
    pub daily_limit: u32,
    pub tokens_this_minute: u64,
    pub tokens_per_minute_limit: u64,
    /// When the oldest request leaves the sliding window (None if empty)
    pub window_frees_at: Option<DateTime<Utc>>,
    pub token_reset_at: DateTime<Utc>,
    pub daily_reset_at: DateTime<Utc>,
}

/// Information about a granted admission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Total time spent waiting for capacity
    pub waited: Duration,
    /// Number of times the caller had to wait
    pub waits: u32,
}

// =============================================================================
// Admission Controller
// =============================================================================

/// Thread-safe admission controller shared by every generation call.
///
/// Create one per process and share it behind an `Arc`.
#[derive(Debug)]
pub struct AdmissionController {
    limits: RateLimits,
    state: Mutex<RateLimitState>,
}

impl AdmissionController {
    /// Create a controller whose daily counter resets at the next UTC midnight
    pub fn new(limits: RateLimits) -> Self {
        Self::with_daily_reset_in(limits, until_next_utc_midnight(Utc::now()))
    }

    /// Create a controller whose first daily reset happens after `daily_reset_in`
    pub fn with_daily_reset_in(limits: RateLimits, daily_reset_in: Duration) -> Self {
        Self {
            limits,
            state: Mutex::new(RateLimitState::new(Instant::now(), daily_reset_in)),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, RateLimitState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Wait until a call needing `estimated_tokens` may proceed, then record it.
    ///
    /// Fails with `DailyLimitExceeded` (never retried) once the daily ceiling is
    /// reached, or `Canceled` if `ctx` fires while waiting. Neither failure
    /// consumes capacity.
    pub async fn admit(&self, estimated_tokens: u64, ctx: &CallContext) -> Result<Admission> {
        let mut waited = Duration::ZERO;
        let mut waits = 0u32;

        loop {
            ctx.check()?;

            // Guard is dropped at the end of this statement, before any await
            let decision = self
                .lock()
                .try_admit(Instant::now(), &self.limits, estimated_tokens);

            match decision {
                Decision::Admitted => {
                    info!(
                        estimated_tokens,
                        waited_ms = waited.as_millis() as u64,
                        "Request admitted"
                    );
                    return Ok(Admission { waited, waits });
                }
                Decision::DailyExhausted(resets_in) => {
                    warn!(
                        daily_limit = self.limits.requests_per_day,
                        resets_in_secs = resets_in.as_secs(),
                        "Daily request limit reached"
                    );
                    return Err(ForgeError::DailyLimitExceeded { resets_in });
                }
                Decision::Wait(wait) => {
                    debug!(
                        wait_ms = wait.as_millis() as u64,
                        estimated_tokens, "Rate limit reached, waiting for capacity"
                    );
                    ctx.sleep(wait).await?;
                    waited += wait;
                    waits += 1;
                }
            }
        }
    }

    /// Current usage after applying the same resets and purge as admission
    pub fn stats(&self) -> RateLimitStats {
        let now = Instant::now();
        let wall_now = Utc::now();
        let mut state = self.lock();
        state.refresh(now);

        let to_wall = |at: Instant| -> DateTime<Utc> {
            let ahead = at.saturating_duration_since(now);
            wall_now + chrono::Duration::from_std(ahead).unwrap_or(chrono::Duration::zero())
        };

        RateLimitStats {
            requests_this_minute: state.window.len() as u32,
            requests_per_minute_limit: self.limits.requests_per_minute,
            daily_requests: state.daily_count,
            daily_limit: self.limits.requests_per_day,
            tokens_this_minute: state.tokens_this_minute,
            tokens_per_minute_limit: self.limits.tokens_per_minute,
            window_frees_at: state.window.front().map(|oldest| to_wall(*oldest + WINDOW)),
            token_reset_at: to_wall(state.token_reset_at),
            daily_reset_at: to_wall(state.daily_reset_at),
        }
    }
}

/// Time from `now` until the next 00:00 UTC
pub fn until_next_utc_midnight(now: DateTime<Utc>) -> Duration {
    let next_midnight = now
        .date_naive()
        .succ_opt()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc());

    match next_midnight {
        Some(at) => (at - now).to_std().unwrap_or(DAY),
        None => DAY,
    }
}

//! Shared request state and the per-token rate limiter.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use studycards_core::Assistant;
use studycards_shared::RateLimitConfig;
use studycards_storage::Storage;

use crate::error::ApiError;

/// Which assistant endpoint a rate limit applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    Ask,
    Suggestions,
}

/// State shared by handlers (via `State`) and middleware (via `Extension`).
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<Storage>,
    pub assistant: Arc<Assistant>,
    ask_limiter: Arc<Mutex<RateLimiter>>,
    suggestions_limiter: Arc<Mutex<RateLimiter>>,
}

impl AppState {
    pub fn new(storage: Arc<Storage>, assistant: Assistant, limits: &RateLimitConfig) -> Self {
        let window = Duration::from_secs(limits.window_secs);
        Self {
            storage,
            assistant: Arc::new(assistant),
            ask_limiter: Arc::new(Mutex::new(RateLimiter::new(window, limits.assistant_max))),
            suggestions_limiter: Arc::new(Mutex::new(RateLimiter::new(
                window,
                limits.suggestions_max,
            ))),
        }
    }

    pub(crate) fn limiter(&self, limit: Limit) -> &Arc<Mutex<RateLimiter>> {
        match limit {
            Limit::Ask => &self.ask_limiter,
            Limit::Suggestions => &self.suggestions_limiter,
        }
    }

    /// Resolve a bearer token to the user who logged in with it.
    pub(crate) async fn session_user(&self, token: &str) -> Result<String, ApiError> {
        self.storage
            .session_user(token)
            .await?
            .ok_or_else(ApiError::unauthorized)
    }
}

/// Sliding-window request counter keyed by access token.
///
/// Keys whose window has fully expired are swept at most once per window,
/// so random tokens cannot grow the map without bound.
#[derive(Debug)]
pub struct RateLimiter {
    windows: HashMap<String, Vec<Instant>>,
    window: Duration,
    max_requests: u32,
    last_sweep: Instant,
}

impl RateLimiter {
    pub fn new(window: Duration, max_requests: u32) -> Self {
        Self {
            windows: HashMap::new(),
            window,
            max_requests,
            last_sweep: Instant::now(),
        }
    }

    /// Record a request for `key`. Returns `Err(retry_after_secs)` when the
    /// key already used up its window.
    pub fn check(&mut self, key: &str) -> Result<(), u64> {
        self.check_at(key, Instant::now())
    }

    /// Number of keys currently tracked.
    pub fn tracked_keys(&self) -> usize {
        self.windows.len()
    }

    fn check_at(&mut self, key: &str, now: Instant) -> Result<(), u64> {
        if now.duration_since(self.last_sweep) >= self.window {
            self.sweep(now);
        }

        let window = self.window;
        let max_requests = self.max_requests as usize;
        if max_requests == 0 {
            return Err(window.as_secs().max(1));
        }

        let hits = self.windows.entry(key.to_string()).or_default();
        hits.retain(|ts| now.duration_since(*ts) < window);

        if hits.len() >= max_requests {
            let wait = hits
                .first()
                .map(|oldest| window.saturating_sub(now.duration_since(*oldest)))
                .unwrap_or(window);
            return Err((wait.as_secs_f64().ceil() as u64).max(1));
        }

        hits.push(now);
        Ok(())
    }

    fn sweep(&mut self, now: Instant) {
        let window = self.window;
        self.windows.retain(|_, hits| {
            hits.retain(|ts| now.duration_since(*ts) < window);
            !hits.is_empty()
        });
        self.last_sweep = now;
    }
}

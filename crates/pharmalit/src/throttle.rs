//! Request pacing and retry.
//!
//! NCBI allows a fixed number of E-utilities requests per second per client: 3 without an API
//! key, 10 with one. A [`Throttle`] enforces that as a minimum interval between consecutive
//! requests. One throttle is meant to be shared, through an [`Arc`], by every fetcher in the
//! process, so concurrent searches still respect the quota together.
//!
//! [`RetryPolicy`] retries operations that fail with a transient error (see
//! [`PharmalitError::is_transient`]) using exponential backoff.
//!
//! ```
//! use std::time::Duration;
//!
//! use pharmalit::throttle::{RetryPolicy, Throttle};
//!
//! let throttle = Throttle::for_api_key(false);
//! assert_eq!(throttle.interval(), Duration::from_millis(334));
//!
//! let policy = RetryPolicy::default();
//! assert_eq!(policy.delay_for(1), Duration::from_millis(500));
//! assert_eq!(policy.delay_for(2), Duration::from_secs(1));
//! ```

use std::future::Future;

use tokio::{sync::Mutex, time::Instant};

use super::*;

/// Requests per second NCBI allows without an API key.
pub const UNAUTHENTICATED_RATE: f64 = 3.0;

/// Requests per second NCBI allows with an API key.
pub const API_KEY_RATE: f64 = 10.0;

/// Minimum interval between consecutive requests, shared by all holders.
#[derive(Debug)]
pub struct Throttle {
  /// Time that must pass between two requests
  interval: Duration,
  /// When the last request was let through
  last:     Mutex<Option<Instant>>,
}

impl Throttle {
  /// Creates a throttle letting one request through per `interval`.
  pub fn new(interval: Duration) -> Self { Self { interval, last: Mutex::new(None) } }

  /// Creates a throttle for the given number of requests per second.
  ///
  /// Non-positive or non-finite rates disable throttling.
  pub fn per_second(rate: f64) -> Self {
    if rate.is_finite() && rate > 0.0 {
      // Rounded up to whole milliseconds so the quota is never exceeded.
      Self::new(Duration::from_millis((1000.0 / rate).ceil() as u64))
    } else {
      Self::unthrottled()
    }
  }

  /// Creates the throttle matching NCBI's quota with or without an API key.
  pub fn for_api_key(has_key: bool) -> Self {
    Self::per_second(if has_key { API_KEY_RATE } else { UNAUTHENTICATED_RATE })
  }

  /// A throttle that never waits.
  pub fn unthrottled() -> Self { Self::new(Duration::ZERO) }

  /// The minimum interval between requests.
  pub fn interval(&self) -> Duration { self.interval }

  /// Waits until the next request may be sent.
  ///
  /// Waiters are served in arrival order; the lock is held while sleeping so that no two
  /// callers can claim the same slot.
  pub async fn acquire(&self) {
    let mut last = self.last.lock().await;
    if let Some(at) = *last {
      let ready = at + self.interval;
      if ready > Instant::now() {
        trace!("throttled for {:?}", ready - Instant::now());
        tokio::time::sleep_until(ready).await;
      }
    }
    *last = Some(Instant::now());
  }
}

impl Default for Throttle {
  fn default() -> Self { Self::for_api_key(false) }
}

/// How often, and how patiently, transient failures are retried.
///
/// ```toml
/// [retry]
/// max_attempts  = 4
/// base_delay_ms = 250
/// max_delay_ms  = 4000
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Total attempts including the first one; at least 1
  pub max_attempts:  u32,
  /// Delay before the first retry, doubled for every further retry
  pub base_delay_ms: u64,
  /// Upper bound for any single delay
  pub max_delay_ms:  u64,
}

impl Default for RetryPolicy {
  fn default() -> Self { Self { max_attempts: 3, base_delay_ms: 500, max_delay_ms: 8_000 } }
}

impl RetryPolicy {
  /// Creates a policy with the given attempt count and initial delay.
  pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
    let base_delay_ms = base_delay.as_millis() as u64;
    Self { max_attempts, base_delay_ms, max_delay_ms: base_delay_ms.saturating_mul(16) }
  }

  /// A policy that makes a single attempt.
  pub fn no_retry() -> Self { Self { max_attempts: 1, ..Self::default() } }

  /// Delay before retry number `retry` (1-based).
  pub fn delay_for(&self, retry: u32) -> Duration {
    let factor = 2u64.saturating_pow(retry.saturating_sub(1));
    Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
  }

  /// Runs `operation`, retrying transient failures until the attempts run out.
  ///
  /// Non-transient errors are returned immediately. The last error is returned when every
  /// attempt failed.
  pub async fn retry<T, F, Fut>(&self, what: &str, mut operation: F) -> Result<T>
  where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>, {
    let attempts = self.max_attempts.max(1);
    let mut attempt = 1;
    loop {
      match operation().await {
        Ok(value) => return Ok(value),
        Err(e) if e.is_transient() && attempt < attempts => {
          let delay = self.delay_for(attempt);
          warn!("{what} failed (attempt {attempt}/{attempts}), retrying in {delay:?}: {e}");
          tokio::time::sleep(delay).await;
          attempt += 1;
        },
        Err(e) => {
          debug!("{what} failed after {attempt} attempt(s): {e}");
          return Err(e);
        },
      }
    }
  }
}

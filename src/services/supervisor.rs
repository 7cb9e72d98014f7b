//! Link Supervisor
//!
//! Tracks the bridge link lifecycle and computes reconnection delays with
//! exponential backoff and jitter. The device state machine never retries;
//! this is the only place a reconnect policy lives.

use crate::domain::config::RetrySettings;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::time::Duration;

/// Backoff policy for link recovery
#[derive(Clone, Debug)]
pub struct RetryConfig {
    pub initial_delay: Duration,
    /// Upper bound for a single wait
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Fraction of the delay randomly added or removed (0.0 - 1.0)
    pub jitter: f64,
    /// 0 = retry forever
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetrySettings::default().into()
    }
}

impl From<RetrySettings> for RetryConfig {
    fn from(settings: RetrySettings) -> Self {
        Self {
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            multiplier: settings.multiplier,
            jitter: settings.jitter.clamp(0.0, 1.0),
            max_attempts: settings.max_attempts,
        }
    }
}

impl RetryConfig {
    /// Whether `attempt` (1-based) is past the configured limit
    pub fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts > 0 && attempt > self.max_attempts
    }

    /// Delay before retry `attempt` (1-based). `spread` in [-1.0, 1.0] picks
    /// where inside the jitter band the delay lands.
    pub fn delay_for(&self, attempt: u32, spread: f64) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let ceiling = self.max_delay.as_millis() as f64;
        let nominal = (self.initial_delay.as_millis() as f64 * self.multiplier.powi(exponent)).min(ceiling);
        let offset = nominal * self.jitter * spread.clamp(-1.0, 1.0);
        Duration::from_millis((nominal + offset).max(0.0).round() as u64)
    }
}

/// Lifecycle of the underlying bridge link
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkState {
    /// Not connected, not trying to connect
    Down = 0,
    /// Attempting to connect
    Dialing = 1,
    /// Link established
    Up = 2,
    /// Waiting before next retry attempt
    Backoff = 3,
}

impl LinkState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => LinkState::Down,
            1 => LinkState::Dialing,
            2 => LinkState::Up,
            _ => LinkState::Backoff,
        }
    }
}

/// Supervisor for one bridge link
pub struct Supervisor {
    endpoint: String,
    config: RetryConfig,
    state: AtomicU8,
    attempt: AtomicU32,
}

impl Supervisor {
    pub fn new(endpoint: impl Into<String>, config: RetryConfig) -> Self {
        Self {
            endpoint: endpoint.into(),
            config,
            state: AtomicU8::new(LinkState::Down as u8),
            attempt: AtomicU32::new(0),
        }
    }

    pub fn state(&self) -> LinkState {
        LinkState::from_u8(self.state.load(Ordering::SeqCst))
    }

    fn set_state(&self, state: LinkState) {
        self.state.store(state as u8, Ordering::SeqCst);
    }

    pub fn on_dialing(&self) {
        self.set_state(LinkState::Dialing);
        tracing::debug!("{}: dialing", self.endpoint);
    }

    /// Mark link as up and reset the attempt counter
    pub fn on_connected(&self) {
        self.attempt.store(0, Ordering::SeqCst);
        self.set_state(LinkState::Up);
        tracing::info!("{}: link up", self.endpoint);
    }

    /// Mark link as down (the caller then asks for a retry delay)
    pub fn on_disconnected(&self, reason: &str) {
        self.set_state(LinkState::Down);
        tracing::warn!("{}: link down - {}", self.endpoint, reason);
    }

    /// Next retry delay, or `None` once `max_attempts` is exhausted
    pub fn next_retry_delay(&self) -> Option<Duration> {
        let attempt = self.attempt.fetch_add(1, Ordering::SeqCst) + 1;
        if self.config.exhausted(attempt) {
            self.set_state(LinkState::Down);
            tracing::warn!("{}: giving up after {} attempts", self.endpoint, attempt - 1);
            return None;
        }

        let delay = self.config.delay_for(attempt, jitter_spread());
        self.set_state(LinkState::Backoff);
        tracing::info!(
            "{}: reconnecting in {}ms (attempt {})",
            self.endpoint,
            delay.as_millis(),
            attempt
        );
        Some(delay)
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt.load(Ordering::SeqCst)
    }
}

/// Uniform-ish value in [-1.0, 1.0] from the std hasher's random keys
fn jitter_spread() -> f64 {
    use std::collections::hash_map::RandomState;
    use std::hash::BuildHasher;

    let bits = RandomState::new().hash_one(std::time::Instant::now());
    (bits % 2001) as f64 / 1000.0 - 1.0
}

impl std::fmt::Debug for Supervisor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Supervisor")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state())
            .field("attempt", &self.attempt_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_jitter(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(500),
            multiplier: 2.0,
            jitter: 0.0,
            max_attempts,
        }
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let supervisor = Supervisor::new("test", no_jitter(0));
        let delays: Vec<u128> = (0..5)
            .map(|_| supervisor.next_retry_delay().expect("delay").as_millis())
            .collect();
        assert_eq!(delays, vec![100, 200, 400, 500, 500]);
        assert_eq!(supervisor.state(), LinkState::Backoff);
    }

    #[test]
    fn test_jitter_stays_in_band() {
        let config = RetryConfig {
            jitter: 0.1,
            ..no_jitter(0)
        };
        assert_eq!(config.delay_for(1, -1.0), Duration::from_millis(90));
        assert_eq!(config.delay_for(1, 1.0), Duration::from_millis(110));
        assert_eq!(config.delay_for(30, 0.0), Duration::from_millis(500));

        let supervisor = Supervisor::new("test", config);
        let delay = supervisor.next_retry_delay().expect("delay");
        assert!((90..=110).contains(&delay.as_millis()));
    }

    #[test]
    fn test_max_attempts() {
        let supervisor = Supervisor::new("test", no_jitter(3));

        assert!(supervisor.next_retry_delay().is_some());
        assert!(supervisor.next_retry_delay().is_some());
        assert!(supervisor.next_retry_delay().is_some());
        assert!(supervisor.next_retry_delay().is_none());
        assert_eq!(supervisor.state(), LinkState::Down);
    }

    #[test]
    fn test_connect_resets_attempts() {
        let supervisor = Supervisor::new("test", no_jitter(0));
        supervisor.next_retry_delay();
        supervisor.next_retry_delay();
        supervisor.on_connected();
        assert_eq!(supervisor.attempt_count(), 0);
        assert_eq!(supervisor.state(), LinkState::Up);
        assert_eq!(
            supervisor.next_retry_delay().expect("delay"),
            Duration::from_millis(100)
        );
    }
}

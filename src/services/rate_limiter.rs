//! Failed-PIN rate limiting keyed by client address.
//!
//! State lives only in process memory and is lost on restart. Windows are
//! recomputed on every check; there is no background sweep.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub max_attempts: u32,
    pub attempt_window: Duration,
    pub lockout_duration: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            attempt_window: Duration::minutes(5),
            lockout_duration: Duration::minutes(15),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub attempts: u32,
    pub first_attempt: DateTime<Utc>,
    pub lockout_until: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitStatus {
    Allowed { attempts_remaining: u32 },
    /// `remaining_minutes` is rounded up, as shown to the user.
    Locked { remaining_minutes: i64 },
}

#[cfg(test)]
impl RateLimitStatus {
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitStatus::Allowed { .. })
    }
}

pub struct RateLimiter {
    config: RateLimitConfig,
    records: Mutex<HashMap<String, RateLimitRecord>>,
}

impl RateLimiter {
    pub fn new(config: RateLimitConfig) -> Self {
        Self {
            config,
            records: Mutex::new(HashMap::new()),
        }
    }

    pub fn check(&self, client: &str) -> RateLimitStatus {
        self.check_at(client, Utc::now())
    }

    /// Evaluate the limit for `client` as of `now` without counting an
    /// attempt.
    pub fn check_at(&self, client: &str, now: DateTime<Utc>) -> RateLimitStatus {
        let mut records = self.records.lock();
        match self.refresh(&mut records, client, now) {
            Some(locked) => locked,
            None => RateLimitStatus::Allowed {
                attempts_remaining: self.config.max_attempts
                    - records.get(client).map_or(0, |r| r.attempts),
            },
        }
    }

    pub fn try_begin(&self, client: &str) -> RateLimitStatus {
        self.try_begin_at(client, Utc::now())
    }

    /// Check the limit and, when allowed, count one attempt for `client`.
    ///
    /// Both happen under a single lock, so concurrent attempts from one
    /// client can never exceed `max_attempts`. The returned budget already
    /// includes this attempt. Callers forget the client with
    /// [`RateLimiter::record_success`] once the attempt turns out valid.
    pub fn try_begin_at(&self, client: &str, now: DateTime<Utc>) -> RateLimitStatus {
        let mut records = self.records.lock();
        if let Some(locked) = self.refresh(&mut records, client, now) {
            return locked;
        }

        let record = records
            .entry(client.to_string())
            .and_modify(|record| record.attempts += 1)
            .or_insert(RateLimitRecord {
                attempts: 1,
                first_attempt: now,
                lockout_until: None,
            });
        RateLimitStatus::Allowed {
            attempts_remaining: self.config.max_attempts.saturating_sub(record.attempts),
        }
    }

    /// Apply lockout expiry and window rules to the record of `client`.
    ///
    /// Returns `Some(Locked)` when the client may not try again. Reaching
    /// `max_attempts` starts the lockout at `now`. A window older than
    /// `attempt_window` without an active lockout is discarded.
    fn refresh(
        &self,
        records: &mut HashMap<String, RateLimitRecord>,
        client: &str,
        now: DateTime<Utc>,
    ) -> Option<RateLimitStatus> {
        let record = records.get_mut(client)?;

        if let Some(until) = record.lockout_until {
            if now < until {
                return Some(RateLimitStatus::Locked {
                    remaining_minutes: ceil_minutes(until - now),
                });
            }
        }

        if now - record.first_attempt > self.config.attempt_window {
            records.remove(client);
            return None;
        }

        if record.attempts >= self.config.max_attempts {
            record.lockout_until = Some(now + self.config.lockout_duration);
            warn!(
                client = %client,
                attempts = record.attempts,
                "PIN attempts exhausted, locking out"
            );
            return Some(RateLimitStatus::Locked {
                remaining_minutes: ceil_minutes(self.config.lockout_duration),
            });
        }

        None
    }

    /// A successful authentication forgets the client entirely.
    pub fn record_success(&self, client: &str) {
        self.records.lock().remove(client);
    }

    #[cfg(test)]
    pub fn record(&self, client: &str) -> Option<RateLimitRecord> {
        self.records.lock().get(client).cloned()
    }
}

fn ceil_minutes(duration: Duration) -> i64 {
    let millis = duration.num_milliseconds().max(0);
    (millis + 59_999) / 60_000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{sync::Arc, thread};

    const IP: &str = "10.0.0.7";

    fn limiter() -> RateLimiter {
        RateLimiter::new(RateLimitConfig::default())
    }

    #[test]
    fn unknown_client_has_full_budget() {
        assert_eq!(
            limiter().check(IP),
            RateLimitStatus::Allowed {
                attempts_remaining: 5
            }
        );
    }

    #[test]
    fn each_attempt_spends_budget_until_locked() {
        let limiter = limiter();
        let now = Utc::now();

        for remaining in [4, 3, 2, 1, 0] {
            assert_eq!(
                limiter.try_begin_at(IP, now),
                RateLimitStatus::Allowed {
                    attempts_remaining: remaining
                }
            );
        }
        assert_eq!(limiter.record(IP).unwrap().attempts, 5);

        assert_eq!(
            limiter.try_begin_at(IP, now),
            RateLimitStatus::Locked {
                remaining_minutes: 15
            }
        );
        let record = limiter.record(IP).unwrap();
        assert_eq!(record.attempts, 5);
        assert!(record.lockout_until.is_some());
    }

    #[test]
    fn check_does_not_count_an_attempt() {
        let limiter = limiter();
        let now = Utc::now();
        limiter.try_begin_at(IP, now);
        limiter.try_begin_at(IP, now);
        for _ in 0..3 {
            assert_eq!(
                limiter.check_at(IP, now),
                RateLimitStatus::Allowed {
                    attempts_remaining: 3
                }
            );
        }
        assert_eq!(limiter.record(IP).unwrap().attempts, 2);
    }

    #[test]
    fn lockout_counts_down_and_then_expires() {
        let limiter = limiter();
        let start = Utc::now();
        for _ in 0..5 {
            limiter.try_begin_at(IP, start);
        }
        assert!(!limiter.check_at(IP, start).is_allowed());

        let later = start + Duration::minutes(10) + Duration::seconds(30);
        assert_eq!(
            limiter.try_begin_at(IP, later),
            RateLimitStatus::Locked {
                remaining_minutes: 5
            }
        );

        let after = start + Duration::minutes(16);
        assert_eq!(
            limiter.check_at(IP, after),
            RateLimitStatus::Allowed {
                attempts_remaining: 5
            }
        );
        assert!(limiter.record(IP).is_none());
    }

    #[test]
    fn stale_window_is_discarded() {
        let limiter = limiter();
        let now = Utc::now();
        let stale = now - Duration::minutes(6);
        for _ in 0..4 {
            limiter.try_begin_at(IP, stale);
        }

        assert_eq!(
            limiter.try_begin_at(IP, now),
            RateLimitStatus::Allowed {
                attempts_remaining: 4
            }
        );
        let record = limiter.record(IP).unwrap();
        assert_eq!(record.attempts, 1);
        assert_eq!(record.first_attempt, now);
    }

    #[test]
    fn success_clears_record() {
        let limiter = limiter();
        limiter.try_begin(IP);
        limiter.try_begin(IP);
        limiter.record_success(IP);
        assert!(limiter.record(IP).is_none());
        assert!(limiter.check(IP).is_allowed());
    }

    #[test]
    fn clients_are_tracked_independently() {
        let limiter = limiter();
        let now = Utc::now();
        for _ in 0..5 {
            limiter.try_begin_at(IP, now);
        }
        assert!(!limiter.check_at(IP, now).is_allowed());
        assert!(limiter.check_at("10.0.0.8", now).is_allowed());
    }

    #[test]
    fn concurrent_attempts_never_exceed_the_budget() {
        let limiter = Arc::new(limiter());
        let handles: Vec<_> = (0..32)
            .map(|_| {
                let limiter = limiter.clone();
                thread::spawn(move || limiter.try_begin(IP).is_allowed())
            })
            .collect();
        let allowed = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();
        assert_eq!(allowed, 5);
    }
}

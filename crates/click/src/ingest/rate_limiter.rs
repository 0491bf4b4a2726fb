use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;

/// A single IP's current fixed window.
struct Window {
    count: u32,
    window_end: DateTime<Utc>,
}

/// Per-IP fixed-window rate limiter.
///
/// A sharded map gives per-entry locking without a single global mutex.
pub struct RateLimiter {
    max_requests: u32,
    window: Duration,
    table: DashMap<IpAddr, Window>,
}

impl RateLimiter {
    pub fn new(max_requests: u32, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            table: DashMap::new(),
        }
    }

    /// Returns true if the request is allowed, false if the IP has exceeded
    /// `max_requests` within the current window. Takes `now` as a parameter
    /// so tests can inject a clock (§8 scenario 7).
    pub fn check(&self, ip: IpAddr, now: DateTime<Utc>) -> bool {
        let mut entry = self.table.entry(ip).or_insert_with(|| Window {
            count: 0,
            window_end: now + chrono::Duration::from_std(self.window).unwrap(),
        });

        if now >= entry.window_end {
            entry.count = 0;
            entry.window_end = now + chrono::Duration::from_std(self.window).unwrap();
        }

        if entry.count >= self.max_requests {
            return false;
        }
        entry.count += 1;
        true
    }

    /// Evicts windows that closed before `now`. Intended to run on its own
    /// ticker, independent of request handling, so the table doesn't grow
    /// unbounded with one-shot IPs (§5 "cleanup sweeps expired entries on
    /// its own ticker").
    pub fn sweep_expired(&self, now: DateTime<Utc>) {
        self.table.retain(|_, w| w.window_end > now);
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    fn ip() -> IpAddr {
        IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4))
    }

    #[test]
    fn accepts_up_to_max_then_rejects() {
        let rl = RateLimiter::new(3, Duration::from_secs(60));
        let t0 = Utc::now();
        assert!(rl.check(ip(), t0));
        assert!(rl.check(ip(), t0));
        assert!(rl.check(ip(), t0));
        assert!(!rl.check(ip(), t0));
    }

    #[test]
    fn window_elapsing_resets_budget() {
        let rl = RateLimiter::new(3, Duration::from_secs(60));
        let t0 = Utc::now();
        for _ in 0..3 {
            assert!(rl.check(ip(), t0));
        }
        assert!(!rl.check(ip(), t0));

        let after = t0 + chrono::Duration::seconds(121);
        assert!(rl.check(ip(), after));
    }

    #[test]
    fn sweep_removes_closed_windows() {
        let rl = RateLimiter::new(3, Duration::from_secs(60));
        let t0 = Utc::now();
        rl.check(ip(), t0);
        assert_eq!(rl.len(), 1);
        rl.sweep_expired(t0 + chrono::Duration::seconds(61));
        assert_eq!(rl.len(), 0);
    }

    #[test]
    fn distinct_ips_tracked_independently() {
        let rl = RateLimiter::new(1, Duration::from_secs(60));
        let t0 = Utc::now();
        let a = IpAddr::V4(Ipv4Addr::new(1, 1, 1, 1));
        let b = IpAddr::V4(Ipv4Addr::new(2, 2, 2, 2));
        assert!(rl.check(a, t0));
        assert!(!rl.check(a, t0));
        assert!(rl.check(b, t0));
    }
}

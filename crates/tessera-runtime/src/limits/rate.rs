//! Fixed-window rate limiting per namespace.

use super::LimitError;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tessera_auth::{PolicyTable, TrustTier};
use tessera_types::Namespace;

/// Windows are pruned once the map grows past this many namespaces.
const PRUNE_THRESHOLD: usize = 4_096;

/// Attempts allowed per window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    /// Attempts allowed in one window.
    pub requests_per_window: u32,
    /// Window length.
    pub window: Duration,
}

impl RateLimit {
    /// Reference limit for `tier`.
    #[must_use]
    pub fn reference(tier: TrustTier) -> Self {
        let requests_per_window = match tier {
            TrustTier::Internal => 1_000,
            TrustTier::Tenant => 100,
            TrustTier::Public => 20,
        };
        Self {
            requests_per_window,
            window: Duration::from_millis(60_000),
        }
    }
}

/// Outcome of [`RateLimiter::check`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    /// Whether the attempt may proceed.
    pub allowed: bool,
    /// Human-readable reason when refused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    /// Time until the window rolls over, when refused.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_ms: Option<u64>,
}

impl RateLimitDecision {
    fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
            retry_after_ms: None,
        }
    }

    /// Converts into a result.
    ///
    /// # Errors
    ///
    /// Returns [`LimitError::RateLimited`] when the attempt was refused.
    pub fn into_result(self) -> Result<(), LimitError> {
        if self.allowed {
            Ok(())
        } else {
            Err(LimitError::RateLimited {
                retry_after_ms: self.retry_after_ms.unwrap_or_default(),
            })
        }
    }
}

#[derive(Debug)]
struct Window {
    start: Instant,
    count: u32,
}

/// Namespace-keyed fixed-window counters.
///
/// Tiers whose policy grants `can_bypass_rate_limit` are always allowed and
/// never touch the counters.
#[derive(Debug)]
pub struct RateLimiter {
    limits: [Option<RateLimit>; 3],
    windows: Mutex<HashMap<Namespace, Window>>,
}

impl RateLimiter {
    /// Builds a limiter; `limit_for` supplies the limit of each
    /// non-bypassing tier.
    #[must_use]
    pub fn new(policies: &PolicyTable, limit_for: impl Fn(TrustTier) -> RateLimit) -> Self {
        let limits = TrustTier::ALL.map(|tier| {
            if policies.policy_for(tier).can_bypass_rate_limit {
                None
            } else {
                Some(limit_for(tier))
            }
        });
        Self {
            limits,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Records an attempt by `namespace` under `tier`.
    pub fn check(&self, tier: TrustTier, namespace: &Namespace) -> RateLimitDecision {
        self.check_at(tier, namespace, Instant::now())
    }

    fn limit(&self, tier: TrustTier) -> Option<RateLimit> {
        match tier {
            TrustTier::Public => self.limits[0],
            TrustTier::Tenant => self.limits[1],
            TrustTier::Internal => self.limits[2],
        }
    }

    pub(crate) fn check_at(
        &self,
        tier: TrustTier,
        namespace: &Namespace,
        now: Instant,
    ) -> RateLimitDecision {
        let Some(limit) = self.limit(tier) else {
            return RateLimitDecision::allowed();
        };

        let mut windows = self.windows.lock();
        if windows.len() > PRUNE_THRESHOLD {
            windows.retain(|_, w| now.duration_since(w.start) < limit.window);
        }

        let window = windows.entry(namespace.clone()).or_insert(Window {
            start: now,
            count: 0,
        });
        if now.duration_since(window.start) >= limit.window {
            window.start = now;
            window.count = 0;
        }
        window.count = window.count.saturating_add(1);

        if window.count <= limit.requests_per_window {
            return RateLimitDecision::allowed();
        }

        let elapsed = now.duration_since(window.start);
        let retry_after = limit.window.saturating_sub(elapsed);
        let retry_after_ms = u64::try_from(retry_after.as_millis()).unwrap_or(u64::MAX);
        tracing::warn!(%tier, %namespace, retry_after_ms, "rate limited");
        RateLimitDecision {
            allowed: false,
            reason: Some(format!(
                "Rate limit of {} requests per {}ms exceeded",
                limit.requests_per_window,
                limit.window.as_millis()
            )),
            retry_after_ms: Some(retry_after_ms),
        }
    }

    /// Number of namespaces with live counters.
    #[must_use]
    pub fn tracked_namespaces(&self) -> usize {
        self.windows.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(requests: u32, window_ms: u64) -> RateLimiter {
        RateLimiter::new(&PolicyTable::reference(), |_| RateLimit {
            requests_per_window: requests,
            window: Duration::from_millis(window_ms),
        })
    }

    #[test]
    fn internal_always_allowed_and_untracked() {
        let l = limiter(1, 60_000);
        let ns = Namespace::unrestricted();
        for _ in 0..100 {
            assert!(l.check(TrustTier::Internal, &ns).allowed);
        }
        assert_eq!(l.tracked_namespaces(), 0);
    }

    #[test]
    fn refuses_after_limit_within_window() {
        let l = limiter(2, 1_000);
        let ns = Namespace::tenant("acme");
        let t0 = Instant::now();

        assert!(l.check_at(TrustTier::Tenant, &ns, t0).allowed);
        assert!(l.check_at(TrustTier::Tenant, &ns, t0).allowed);

        let d = l.check_at(TrustTier::Tenant, &ns, t0 + Duration::from_millis(400));
        assert!(!d.allowed);
        assert_eq!(d.retry_after_ms, Some(600));
        assert!(d.reason.is_some());
        assert_eq!(
            d.into_result(),
            Err(LimitError::RateLimited {
                retry_after_ms: 600
            })
        );
    }

    #[test]
    fn window_rollover_resets() {
        let l = limiter(1, 1_000);
        let ns = Namespace::user("bob");
        let t0 = Instant::now();

        assert!(l.check_at(TrustTier::Public, &ns, t0).allowed);
        assert!(!l.check_at(TrustTier::Public, &ns, t0).allowed);
        assert!(
            l.check_at(TrustTier::Public, &ns, t0 + Duration::from_millis(1_000))
                .allowed
        );
    }

    #[test]
    fn namespaces_are_independent() {
        let l = limiter(1, 60_000);
        let t0 = Instant::now();
        assert!(l.check_at(TrustTier::Tenant, &Namespace::tenant("a"), t0).allowed);
        assert!(l.check_at(TrustTier::Tenant, &Namespace::tenant("b"), t0).allowed);
        assert!(!l.check_at(TrustTier::Tenant, &Namespace::tenant("a"), t0).allowed);
    }

    #[test]
    fn refused_attempts_still_count() {
        let l = limiter(1, 1_000);
        let ns = Namespace::tenant("a");
        let t0 = Instant::now();
        for _ in 0..5 {
            l.check_at(TrustTier::Tenant, &ns, t0);
        }
        let windows = l.windows.lock();
        assert_eq!(windows.get(&ns).map(|w| w.count), Some(5));
    }
}

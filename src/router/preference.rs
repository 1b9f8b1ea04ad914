//! Adaptive routing preference
//!
//! Counts model outcomes per path over a fixed window. When the window fills,
//! the local success rate decides whether to keep preferring the device, and
//! the counters start over.

use serde::Serialize;

use crate::intent::ResolutionPath;

/// Default window length in attempts
pub const DEFAULT_WINDOW: usize = 20;

/// Default local success rate above which local is preferred
pub const DEFAULT_PREFER_LOCAL_RATIO: f32 = 0.7;

/// Outcome counters for one path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PathStats {
    pub successes: u32,
    pub failures: u32,
}

impl PathStats {
    const fn attempts(self) -> u32 {
        self.successes + self.failures
    }

    #[allow(clippy::cast_precision_loss)]
    fn success_rate(self) -> Option<f32> {
        let attempts = self.attempts();
        (attempts > 0).then(|| self.successes as f32 / attempts as f32)
    }
}

/// Read-only view for diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PreferenceSnapshot {
    pub local: PathStats,
    pub remote: PathStats,
    pub prefer_local: bool,
    pub window: usize,
}

/// Rolling estimator; mutated only by the router
#[derive(Debug, Clone)]
pub struct RoutingPreference {
    window: usize,
    ratio: f32,
    local: PathStats,
    remote: PathStats,
    prefer_local: bool,
}

impl RoutingPreference {
    /// Create an estimator with the given window and threshold ratio
    #[must_use]
    pub fn new(window: usize, ratio: f32) -> Self {
        Self {
            window: window.max(1),
            ratio,
            local: PathStats::default(),
            remote: PathStats::default(),
            prefer_local: false,
        }
    }

    /// Record one completed model attempt
    ///
    /// Returns the new preference when this attempt closed the window.
    pub fn record(&mut self, path: ResolutionPath, success: bool) -> Option<bool> {
        let stats = match path {
            ResolutionPath::Local => &mut self.local,
            ResolutionPath::Remote => &mut self.remote,
            ResolutionPath::Rule => return None,
        };
        if success {
            stats.successes += 1;
        } else {
            stats.failures += 1;
        }

        let attempts = (self.local.attempts() + self.remote.attempts()) as usize;
        if attempts < self.window {
            return None;
        }

        // A window with no local attempts carries no evidence either way
        if let Some(rate) = self.local.success_rate() {
            self.prefer_local = rate > self.ratio;
        }
        self.local = PathStats::default();
        self.remote = PathStats::default();
        Some(self.prefer_local)
    }

    /// Current preference
    #[must_use]
    pub const fn prefer_local(&self) -> bool {
        self.prefer_local
    }

    /// Counters and preference
    #[must_use]
    pub const fn snapshot(&self) -> PreferenceSnapshot {
        PreferenceSnapshot {
            local: self.local,
            remote: self.remote,
            prefer_local: self.prefer_local,
            window: self.window,
        }
    }
}

impl Default for RoutingPreference {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW, DEFAULT_PREFER_LOCAL_RATIO)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mostly_successful_local_converges_to_prefer_local() {
        let mut pref = RoutingPreference::default();
        let mut decided = None;
        for i in 0..20 {
            decided = pref.record(ResolutionPath::Local, i % 10 != 0);
        }
        assert_eq!(decided, Some(true));
        assert!(pref.prefer_local());
        assert_eq!(pref.snapshot().local.successes, 0);
    }

    #[test]
    fn test_mostly_failing_local_converges_away() {
        let mut pref = RoutingPreference::default();
        for i in 0..20 {
            pref.record(ResolutionPath::Local, i % 10 != 0);
        }
        assert!(pref.prefer_local());

        for i in 0..20 {
            pref.record(ResolutionPath::Local, i % 10 == 0);
        }
        assert!(!pref.prefer_local());
    }

    #[test]
    fn test_window_without_local_keeps_preference() {
        let mut pref = RoutingPreference::new(4, 0.7);
        for _ in 0..4 {
            pref.record(ResolutionPath::Local, true);
        }
        assert!(pref.prefer_local());
        for _ in 0..4 {
            pref.record(ResolutionPath::Remote, false);
        }
        assert!(pref.prefer_local());
    }

    #[test]
    fn test_exact_threshold_does_not_prefer_local() {
        let mut pref = RoutingPreference::new(10, 0.7);
        for i in 0..10 {
            pref.record(ResolutionPath::Local, i < 7);
        }
        assert!(!pref.prefer_local());
    }

    #[test]
    fn test_rule_path_is_ignored() {
        let mut pref = RoutingPreference::new(1, 0.7);
        assert_eq!(pref.record(ResolutionPath::Rule, true), None);
        assert_eq!(pref.snapshot().local.attempts(), 0);
    }
}

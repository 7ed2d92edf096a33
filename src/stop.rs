//! Cooperative stop criteria, polled at iteration, period and sweep boundaries.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub trait StopCriterion: Send + Sync {
    fn is_triggered(&self) -> bool;
}

/// Shared flag raised by whoever wants the search to stop.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    flag: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        StopToken::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl StopCriterion for StopToken {
    fn is_triggered(&self) -> bool {
        self.is_stopped()
    }
}

/// Wall clock budget starting at construction.
#[derive(Debug, Clone, Copy)]
pub struct TimeLimit {
    start: Instant,
    limit: Duration,
}

impl TimeLimit {
    pub fn new(limit: Duration) -> Self {
        TimeLimit {
            start: Instant::now(),
            limit,
        }
    }

    pub fn remaining(&self) -> Duration {
        self.limit.saturating_sub(self.start.elapsed())
    }
}

impl StopCriterion for TimeLimit {
    fn is_triggered(&self) -> bool {
        self.start.elapsed() >= self.limit
    }
}

/// Never triggers.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverStop;

impl StopCriterion for NeverStop {
    fn is_triggered(&self) -> bool {
        false
    }
}

/// Triggers as soon as one of its criteria does.
#[derive(Default)]
pub struct AnyStop<'a> {
    criteria: Vec<&'a dyn StopCriterion>,
    limits: Vec<TimeLimit>,
}

impl<'a> AnyStop<'a> {
    pub fn new() -> Self {
        AnyStop::default()
    }

    pub fn with(mut self, criterion: &'a dyn StopCriterion) -> Self {
        self.criteria.push(criterion);
        self
    }

    /// Add a time budget starting now, if any.
    pub fn with_time_limit(mut self, limit: Option<Duration>) -> Self {
        self.limits.extend(limit.map(TimeLimit::new));
        self
    }
}

impl StopCriterion for AnyStop<'_> {
    fn is_triggered(&self) -> bool {
        self.limits.iter().any(|l| l.is_triggered()) || self.criteria.iter().any(|c| c.is_triggered())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_is_shared_between_clones() {
        let token = StopToken::new();
        let observer = token.clone();
        assert!(!observer.is_triggered());
        token.stop();
        assert!(observer.is_triggered());
    }

    #[test]
    fn test_any_stop() {
        let token = StopToken::new();
        let any = AnyStop::new().with(&NeverStop).with(&token);
        assert!(!any.is_triggered());
        token.stop();
        assert!(any.is_triggered());

        let expired = AnyStop::new().with_time_limit(Some(Duration::ZERO));
        assert!(expired.is_triggered());
        assert!(!AnyStop::new().with_time_limit(None).is_triggered());
    }
}

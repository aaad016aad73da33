//! Time budgets, failure accounting and reset tracking for collection runs

use crate::models::TriggerType;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Result of consulting the run's time budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetCheck {
    Within,
    SectionExceeded,
    GlobalExceeded,
}

/// Wall-clock budget for one run and for the section currently running
#[derive(Debug, Clone)]
pub struct RunTimeBudget {
    global_start: Instant,
    section_start: Instant,
    max_global: Option<Duration>,
    max_section: Option<Duration>,
}

impl RunTimeBudget {
    /// Start a run budget now
    pub fn new(max_global: Option<Duration>) -> Self {
        let now = Instant::now();
        Self {
            global_start: now,
            section_start: now,
            max_global,
            max_section: None,
        }
    }

    pub fn unbounded() -> Self {
        Self::new(None)
    }

    pub fn set_global_limit(&mut self, limit: Option<Duration>) {
        self.max_global = limit;
    }

    pub fn set_section_limit(&mut self, limit: Option<Duration>) {
        self.max_section = limit;
    }

    pub fn global_elapsed(&self) -> Duration {
        self.global_start.elapsed()
    }

    pub fn section_elapsed(&self) -> Duration {
        self.section_start.elapsed()
    }

    /// Restart the section timer, returning the time the section took
    pub fn reset_section(&mut self) -> Duration {
        let elapsed = self.section_start.elapsed();
        self.section_start = Instant::now();
        elapsed
    }

    /// Check both limits; the global limit takes precedence
    pub fn check(&self) -> BudgetCheck {
        if self
            .max_global
            .map(|max| self.global_elapsed() > max)
            .unwrap_or(false)
        {
            return BudgetCheck::GlobalExceeded;
        }
        if self
            .max_section
            .map(|max| self.section_elapsed() > max)
            .unwrap_or(false)
        {
            return BudgetCheck::SectionExceeded;
        }
        BudgetCheck::Within
    }
}

/// Whether a run's failures should be escalated as a collection failure.
///
/// Runs triggered after a reset never escalate.
pub fn is_collection_failure(failures: u32, trigger: &TriggerType) -> bool {
    failures > 0 && !trigger.is_post_reset()
}

/// Per-trigger failure counts that persist across runs
#[derive(Debug, Default)]
pub struct FailureLedger {
    counts: HashMap<TriggerType, u32>,
    current: u32,
}

impl FailureLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset the current run's count
    pub fn begin_run(&mut self) {
        self.current = 0;
    }

    pub fn record_failure(&mut self, trigger: &TriggerType) {
        self.current += 1;
        *self.counts.entry(trigger.clone()).or_insert(0) += 1;
    }

    /// Failures recorded since `begin_run`
    pub fn run_failures(&self) -> u32 {
        self.current
    }

    /// Failures accumulated for a trigger type across runs
    pub fn failures_for(&self, trigger: &TriggerType) -> u32 {
        self.counts.get(trigger).copied().unwrap_or(0)
    }

    /// Close the run; a clean run clears the trigger's accumulated count
    pub fn complete_run(&mut self, trigger: &TriggerType) {
        if self.current == 0 {
            self.counts.remove(trigger);
        }
    }
}

/// Snapshot of reset tracking state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResetState {
    pub detected: bool,
    pub reset_cpu: Option<usize>,
    pub reset_section: Option<String>,
    pub current_cpu: Option<usize>,
    pub current_section: Option<String>,
}

impl ResetState {
    /// Marker recorded in the dump, `cpu<N>.<section>` or `NONE`
    pub fn marker(&self) -> String {
        match (self.detected, self.reset_cpu, &self.reset_section) {
            (true, Some(cpu), Some(section)) => format!("cpu{}.{}", cpu, section),
            _ => "NONE".to_string(),
        }
    }
}

/// Tracks where collection was when a host reset was observed.
///
/// Shared between the collection run and whatever observes resets; the
/// first reset seen during a run wins.
#[derive(Debug, Default)]
pub struct ResetContext {
    state: Mutex<ResetState>,
}

impl ResetContext {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ResetState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn clear(&self) {
        *self.lock() = ResetState::default();
    }

    /// Note the processor and section being collected
    pub fn update_current(&self, cpu: usize, section: &str) {
        let mut state = self.lock();
        state.current_cpu = Some(cpu);
        state.current_section = Some(section.to_string());
    }

    /// Record that a reset happened at the current position
    pub fn mark_reset(&self) {
        let mut state = self.lock();
        if state.detected {
            return;
        }
        state.detected = true;
        state.reset_cpu = state.current_cpu;
        state.reset_section = state.current_section.clone();
    }

    pub fn snapshot(&self) -> ResetState {
        self.lock().clone()
    }

    /// Snapshot and clear
    pub fn take(&self) -> ResetState {
        std::mem::take(&mut *self.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_without_limits() {
        let budget = RunTimeBudget::unbounded();
        assert_eq!(budget.check(), BudgetCheck::Within);
    }

    #[test]
    fn test_zero_global_limit_exceeds_immediately() {
        let mut budget = RunTimeBudget::new(Some(Duration::ZERO));
        budget.set_section_limit(Some(Duration::ZERO));
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(budget.check(), BudgetCheck::GlobalExceeded);
    }

    #[test]
    fn test_section_limit() {
        let mut budget = RunTimeBudget::new(Some(Duration::from_secs(3600)));
        budget.set_section_limit(Some(Duration::ZERO));
        std::thread::sleep(Duration::from_millis(2));
        assert_eq!(budget.check(), BudgetCheck::SectionExceeded);

        budget.set_section_limit(Some(Duration::from_secs(3600)));
        budget.reset_section();
        assert_eq!(budget.check(), BudgetCheck::Within);
    }

    #[test]
    fn test_collection_failure_escalation() {
        assert!(is_collection_failure(1, &TriggerType::Ierr));
        assert!(is_collection_failure(3, &TriggerType::OnDemand));
        assert!(!is_collection_failure(0, &TriggerType::Ierr));
        assert!(!is_collection_failure(5, &TriggerType::PostReset));
    }

    #[test]
    fn test_ledger_clears_on_clean_run() {
        let mut ledger = FailureLedger::new();
        ledger.begin_run();
        ledger.record_failure(&TriggerType::Ierr);
        ledger.record_failure(&TriggerType::Ierr);
        ledger.complete_run(&TriggerType::Ierr);
        assert_eq!(ledger.failures_for(&TriggerType::Ierr), 2);

        ledger.begin_run();
        ledger.record_failure(&TriggerType::Ierr);
        ledger.complete_run(&TriggerType::Ierr);
        assert_eq!(ledger.failures_for(&TriggerType::Ierr), 3);

        ledger.begin_run();
        ledger.complete_run(&TriggerType::Ierr);
        assert_eq!(ledger.failures_for(&TriggerType::Ierr), 0);
    }

    #[test]
    fn test_ledger_tracks_triggers_separately() {
        let mut ledger = FailureLedger::new();
        ledger.begin_run();
        ledger.record_failure(&TriggerType::Err2);
        ledger.complete_run(&TriggerType::Err2);

        ledger.begin_run();
        ledger.complete_run(&TriggerType::OnDemand);
        assert_eq!(ledger.failures_for(&TriggerType::Err2), 1);
    }

    #[test]
    fn test_reset_context_first_reset_wins() {
        let ctx = ResetContext::new();
        assert_eq!(ctx.snapshot().marker(), "NONE");

        ctx.update_current(1, "uncore");
        ctx.mark_reset();
        ctx.update_current(2, "TOR");
        ctx.mark_reset();

        let state = ctx.take();
        assert_eq!(state.marker(), "cpu1.uncore");
        assert_eq!(state.current_cpu, Some(2));
        assert_eq!(ctx.snapshot(), ResetState::default());
    }
}

//! Scheduler tunables.

use thiserror::Error;

/// Default cap on handler invocations per call to
/// [`process_runnable_tasks`](crate::sched::Scheduler::process_runnable_tasks).
pub const DEFAULT_RUN_BUDGET: u32 = 200;

/// Default number of tasks detached per batch.
pub const DEFAULT_BATCH: usize = 16;

/// Invalid scheduler configuration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The per-call run budget must allow at least one invocation.
    #[error("run budget must be at least 1")]
    ZeroRunBudget,
    /// Batches must hold at least one task.
    #[error("batch size must be at least 1")]
    ZeroBatch,
}

/// Construction-time tunables for a [`Scheduler`](crate::sched::Scheduler).
///
/// ```
/// use coopsched::SchedulerConfig;
///
/// let config = SchedulerConfig::default()
///     .with_initial_tasks(1024)
///     .with_run_budget(100);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    initial_tasks: usize,
    run_budget: u32,
    batch: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            initial_tasks: 0,
            run_budget: DEFAULT_RUN_BUDGET,
            batch: DEFAULT_BATCH,
        }
    }
}

impl SchedulerConfig {
    /// Pre-sizes the task pool for this many records.
    #[must_use]
    pub const fn with_initial_tasks(mut self, initial_tasks: usize) -> Self {
        self.initial_tasks = initial_tasks;
        self
    }

    /// Caps handler invocations per processing call.
    #[must_use]
    pub const fn with_run_budget(mut self, run_budget: u32) -> Self {
        self.run_budget = run_budget;
        self
    }

    /// Sets how many tasks are detached per batch.
    #[must_use]
    pub const fn with_batch(mut self, batch: usize) -> Self {
        self.batch = batch;
        self
    }

    /// Initial task pool capacity.
    #[must_use]
    pub const fn initial_tasks(&self) -> usize {
        self.initial_tasks
    }

    /// Per-call invocation cap.
    #[must_use]
    pub const fn run_budget(&self) -> u32 {
        self.run_budget
    }

    /// Batch size.
    #[must_use]
    pub const fn batch(&self) -> usize {
        self.batch
    }

    /// Rejects configurations the scheduler cannot run with.
    pub const fn validate(&self) -> Result<(), ConfigError> {
        if self.run_budget == 0 {
            return Err(ConfigError::ZeroRunBudget);
        }
        if self.batch == 0 {
            return Err(ConfigError::ZeroBatch);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        assert!(SchedulerConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_budget_is_rejected() {
        let config = SchedulerConfig::default().with_run_budget(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroRunBudget));
    }

    #[test]
    fn zero_batch_is_rejected() {
        let config = SchedulerConfig::default().with_batch(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroBatch));
    }
}

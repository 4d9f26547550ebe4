//! The per-task record tracked by the scheduler.

use crate::sched::ticktree::EntryId;
use crate::sched::Scheduler;
use crate::types::{TaskId, TaskState, Tick};
use core::fmt;
use std::any::Any;

/// Lowest accepted nice value (strongest boost).
pub const NICE_MIN: i16 = -1024;

/// Highest accepted nice value (strongest penalty).
pub const NICE_MAX: i16 = 1024;

/// A task handler.
///
/// Invoked with the owning scheduler, the task's id and its state snapshot
/// (the accumulated wake reasons plus `RUNNING`). Returns the task to
/// re-queue — usually its own id — or `None` when the task deleted itself,
/// in which case the handler must have unlinked both queues and freed the
/// record before returning.
pub type TaskFn = Box<dyn FnMut(&mut Scheduler, TaskId, TaskState) -> Option<TaskId>>;

/// One schedulable unit.
///
/// The record owns the handler and the creator's context; queue membership is
/// expressed through the two generational handles `rq` and `wq`, which are
/// `Some` exactly while the matching tree holds an entry for this task.
pub struct TaskRecord {
    pub(crate) state: TaskState,
    pub(crate) pending_state: TaskState,
    pub(crate) nice: i16,
    pub(crate) expire: Tick,
    pub(crate) calls: u64,
    /// Taken out of the record for the duration of each invocation so the
    /// handler can receive the scheduler re-entrantly.
    pub(crate) process: Option<TaskFn>,
    pub(crate) context: Option<Box<dyn Any>>,
    pub(crate) rq: Option<EntryId>,
    pub(crate) wq: Option<EntryId>,
}

impl TaskRecord {
    pub(crate) fn new(process: TaskFn) -> Self {
        Self {
            state: TaskState::WOKEN_INIT,
            pending_state: TaskState::empty(),
            nice: 0,
            expire: Tick::ETERNITY,
            calls: 0,
            process: Some(process),
            context: None,
            rq: None,
            wq: None,
        }
    }

    /// Current state bits.
    #[must_use]
    pub const fn state(&self) -> TaskState {
        self.state
    }

    /// Wake reasons accumulated while the task was running.
    #[must_use]
    pub const fn pending_state(&self) -> TaskState {
        self.pending_state
    }

    /// The scheduling bias, in [`NICE_MIN`]..=[`NICE_MAX`].
    #[must_use]
    pub const fn nice(&self) -> i16 {
        self.nice
    }

    /// The timer deadline; [`Tick::ETERNITY`] when no timer is armed.
    #[must_use]
    pub const fn expire(&self) -> Tick {
        self.expire
    }

    /// How many times the handler has been invoked.
    #[must_use]
    pub const fn calls(&self) -> u64 {
        self.calls
    }

    /// True while linked into the run queue.
    #[must_use]
    pub const fn in_run_queue(&self) -> bool {
        self.rq.is_some()
    }

    /// True while linked into the wait queue.
    #[must_use]
    pub const fn in_wait_queue(&self) -> bool {
        self.wq.is_some()
    }
}

impl fmt::Debug for TaskRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRecord")
            .field("state", &self.state)
            .field("pending_state", &self.pending_state)
            .field("nice", &self.nice)
            .field("expire", &self.expire)
            .field("calls", &self.calls)
            .field("in_run_queue", &self.rq.is_some())
            .field("in_wait_queue", &self.wq.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_record_defaults() {
        let record = TaskRecord::new(Box::new(|_, id, _| Some(id)));
        assert_eq!(record.state(), TaskState::WOKEN_INIT);
        assert_eq!(record.pending_state(), TaskState::empty());
        assert_eq!(record.nice(), 0);
        assert_eq!(record.expire(), Tick::ETERNITY);
        assert_eq!(record.calls(), 0);
        assert!(!record.in_run_queue());
        assert!(!record.in_wait_queue());
    }
}

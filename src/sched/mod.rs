//! The cooperative scheduler: run queue, wait queue, and the driver loop.
//!
//! A [`Scheduler`] owns a pool of task records and two [`TickTree`]s:
//!
//! - the **run queue**, keyed by a wrapping insertion counter biased by each
//!   task's nice value, drained in batches by
//!   [`process_runnable_tasks`](Scheduler::process_runnable_tasks);
//! - the **wait queue**, keyed by each task's expiration tick, swept by
//!   [`wake_expired_tasks`](Scheduler::wake_expired_tasks).
//!
//! A task may sit in both queues at once ("run me now" and "wake me by
//! then"); it sits in neither while its handler is executing, and wakeups
//! arriving during execution accumulate in `pending_state` for the next
//! activation.
//!
//! The driver alternates the two entry points: sweep the wait queue, hand the
//! returned deadline to the I/O poller as its sleep bound, then drain the run
//! queue, and repeat.

pub mod ticktree;

use crate::config::SchedulerConfig;
use crate::record::task::{TaskFn, TaskRecord, NICE_MAX, NICE_MIN};
use crate::types::{TaskId, TaskState, Tick};
use crate::util::Arena;
use smallvec::SmallVec;
use std::any::Any;
use ticktree::TickTree;
use tracing::{debug, trace};

/// Wrap-compensation window for ordered lookups on the cyclic key space.
///
/// Both queues find "the next key from here" with `lookup_ge(base -
/// TIMER_LOOK_BACK)`: any key up to half the ring behind the base is still
/// considered pending rather than wrapped into the far future. Half the ring
/// tolerates the oldest entry either queue can legitimately hold (stale
/// timers, negative-nice run keys) while keeping every valid future key out
/// of the window.
pub const TIMER_LOOK_BACK: u32 = 1 << 31;

/// Counter snapshot for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Live task records.
    pub tasks: u32,
    /// Tasks currently linked into the run queue.
    pub run_queue: u32,
    /// Run-queue-linked tasks with a non-zero nice.
    pub niced: u32,
    /// Run-queue length captured at the start of the last processing call.
    pub run_queue_cur: u32,
    /// Task count captured at the start of the last processing call.
    pub tasks_cur: u32,
}

/// Single-threaded cooperative task scheduler.
///
/// All state lives in this value; shard one scheduler per worker thread
/// rather than sharing it.
#[derive(Debug)]
pub struct Scheduler {
    tasks: Arena<TaskRecord>,
    run_queue: TickTree<TaskId>,
    wait_queue: TickTree<TaskId>,
    /// Wrapping insertion counter; advances by exactly one per run-queue
    /// insertion and doubles as the base for nice offsets.
    queue_ticks: u32,
    run_queue_tasks: u32,
    niced_tasks: u32,
    run_queue_cur: u32,
    tasks_cur: u32,
    config: SchedulerConfig,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Creates a scheduler with default tunables.
    #[must_use]
    pub fn new() -> Self {
        Self::with_validated(SchedulerConfig::default())
    }

    /// Creates a scheduler from `config`.
    ///
    /// # Errors
    ///
    /// Returns the validation error when `config` is unusable.
    pub fn with_config(config: SchedulerConfig) -> Result<Self, crate::config::ConfigError> {
        config.validate()?;
        Ok(Self::with_validated(config))
    }

    fn with_validated(config: SchedulerConfig) -> Self {
        Self {
            tasks: Arena::with_capacity(config.initial_tasks()),
            run_queue: TickTree::with_capacity(config.initial_tasks()),
            wait_queue: TickTree::with_capacity(config.initial_tasks()),
            queue_ticks: 0,
            run_queue_tasks: 0,
            niced_tasks: 0,
            run_queue_cur: 0,
            tasks_cur: 0,
            config,
        }
    }

    /// Allocates a task around `process`.
    ///
    /// The task starts with [`TaskState::WOKEN_INIT`], neutral nice, no timer
    /// and no queue membership; wake it or queue it to get it going.
    pub fn new_task(&mut self, process: TaskFn) -> TaskId {
        let id = TaskId::from_arena(self.tasks.insert(TaskRecord::new(process)));
        debug!(task = ?id, "task created");
        id
    }

    /// Releases a task record.
    ///
    /// The task must not be mid-invocation in another task's handler; a
    /// handler may free its own task before returning `None`. Queue links
    /// are removed defensively so a misqueued free cannot strand an entry.
    pub fn free_task(&mut self, id: TaskId) {
        self.unlink_rq(id);
        self.unlink_wq(id);
        if self.tasks.remove(id.arena_index()).is_some() {
            debug!(task = ?id, "task freed");
        }
    }

    /// Number of live tasks.
    #[must_use]
    pub fn nb_tasks(&self) -> u32 {
        self.tasks.len() as u32
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            tasks: self.nb_tasks(),
            run_queue: self.run_queue_tasks,
            niced: self.niced_tasks,
            run_queue_cur: self.run_queue_cur,
            tasks_cur: self.tasks_cur,
        }
    }

    /// Read access to a task record.
    #[must_use]
    pub fn task(&self, id: TaskId) -> Option<&TaskRecord> {
        self.tasks.get(id.arena_index())
    }

    /// The task's current state bits.
    #[must_use]
    pub fn state(&self, id: TaskId) -> Option<TaskState> {
        self.task(id).map(TaskRecord::state)
    }

    /// The task's handler invocation count.
    #[must_use]
    pub fn calls(&self, id: TaskId) -> Option<u64> {
        self.task(id).map(TaskRecord::calls)
    }

    /// The task's timer deadline.
    #[must_use]
    pub fn expire(&self, id: TaskId) -> Option<Tick> {
        self.task(id).map(TaskRecord::expire)
    }

    /// Sets the timer deadline without touching the wait queue.
    ///
    /// Pushing the deadline later deliberately leaves any linked entry where
    /// it is: the sweep re-queues the task when the stale position fires.
    /// Call [`queue`](Self::queue) afterwards to link or advance the entry.
    pub fn set_expire(&mut self, id: TaskId, expire: Tick) {
        if let Some(rec) = self.tasks.get_mut(id.arena_index()) {
            rec.expire = expire;
        }
    }

    /// Sets the scheduling bias, clamped to [`NICE_MIN`]..=[`NICE_MAX`].
    ///
    /// Takes effect at the task's next run-queue insertion.
    pub fn set_nice(&mut self, id: TaskId, nice: i16) {
        let nice = nice.clamp(NICE_MIN, NICE_MAX);
        let Some(rec) = self.tasks.get_mut(id.arena_index()) else {
            return;
        };
        if rec.rq.is_some() {
            if rec.nice == 0 && nice != 0 {
                self.niced_tasks += 1;
            } else if rec.nice != 0 && nice == 0 {
                self.niced_tasks -= 1;
            }
        }
        rec.nice = nice;
    }

    /// Attaches creator-owned context to the task.
    pub fn set_context(&mut self, id: TaskId, context: Box<dyn Any>) {
        if let Some(rec) = self.tasks.get_mut(id.arena_index()) {
            rec.context = Some(context);
        }
    }

    /// Typed access to the task's context.
    #[must_use]
    pub fn context_mut<T: 'static>(&mut self, id: TaskId) -> Option<&mut T> {
        self.tasks
            .get_mut(id.arena_index())?
            .context
            .as_mut()?
            .downcast_mut::<T>()
    }

    /// Detaches and returns the task's context.
    pub fn take_context(&mut self, id: TaskId) -> Option<Box<dyn Any>> {
        self.tasks.get_mut(id.arena_index())?.context.take()
    }

    /// Makes `id` runnable, recording `reason` among its wake reasons.
    ///
    /// A task that is already running, or already run-queue linked, only
    /// accumulates the reason in `pending_state`; the execution loop promotes
    /// it at the task's next activation.
    pub fn wakeup(&mut self, id: TaskId, reason: TaskState) {
        let Some(rec) = self.tasks.get_mut(id.arena_index()) else {
            return;
        };
        if rec.state.is_running() || rec.rq.is_some() {
            rec.pending_state.insert(reason.wake_reasons());
            return;
        }
        self.wakeup_now(id, reason.wake_reasons());
    }

    /// Unconditional run-queue insertion; the caller has checked the task is
    /// neither running nor already linked.
    fn wakeup_now(&mut self, id: TaskId, reason: TaskState) {
        let Some(rec) = self.tasks.get(id.arena_index()) else {
            return;
        };
        let nice = rec.nice;

        self.run_queue_tasks += 1;
        self.queue_ticks = self.queue_ticks.wrapping_add(1);
        let mut key = self.queue_ticks;
        if nice != 0 {
            self.niced_tasks += 1;
            // A nice of ±1024 shifts by ±32 run-queue lengths; ±N by N/32.
            let offset = (i64::from(self.run_queue_tasks) * i64::from(nice)) / 32;
            key = key.wrapping_add(offset as u32);
        }

        let entry = self.run_queue.insert(key, id);
        if let Some(rec) = self.tasks.get_mut(id.arena_index()) {
            rec.state = rec.pending_state.union(reason);
            rec.pending_state = TaskState::empty();
            rec.rq = Some(entry);
        }
        trace!(task = ?id, key, "woken into run queue");
    }

    /// Removes the task from the run queue; harmless when unlinked.
    pub fn unlink_rq(&mut self, id: TaskId) {
        let (entry, nice) = match self.tasks.get_mut(id.arena_index()) {
            Some(rec) => (rec.rq.take(), rec.nice),
            None => return,
        };
        let Some(entry) = entry else { return };
        self.run_queue.remove(entry);
        debug_assert!(self.run_queue_tasks > 0);
        self.run_queue_tasks -= 1;
        if nice != 0 {
            debug_assert!(self.niced_tasks > 0);
            self.niced_tasks -= 1;
        }
    }

    /// Removes the task from the wait queue; harmless when unlinked.
    pub fn unlink_wq(&mut self, id: TaskId) {
        let entry = match self.tasks.get_mut(id.arena_index()) {
            Some(rec) => rec.wq.take(),
            None => return,
        };
        if let Some(entry) = entry {
            self.wait_queue.remove(entry);
        }
    }

    /// Places the task in the wait queue according to its deadline.
    ///
    /// Cheap pre-checks first: an unset deadline leaves everything alone
    /// (a stale linked entry is disposed of by the sweep), and a deadline at
    /// or after the linked position keeps the existing entry, again deferring
    /// to the sweep. Only a new or earlier deadline moves the entry.
    pub fn queue(&mut self, id: TaskId) {
        let requeue = {
            let Some(rec) = self.tasks.get(id.arena_index()) else {
                return;
            };
            if !rec.expire.is_set() {
                return;
            }
            match rec.wq {
                None => true,
                Some(entry) => match self.wait_queue.key(entry) {
                    Some(linked) => rec.expire.is_before(Tick::from_raw(linked)),
                    None => true,
                },
            }
        };
        if requeue {
            self.queue_force(id);
        }
    }

    /// Unlinks (if linked) and inserts at the current deadline. A deadline in
    /// the past is inserted normally and fires on the next sweep.
    fn queue_force(&mut self, id: TaskId) {
        let (expire, old) = match self.tasks.get_mut(id.arena_index()) {
            Some(rec) => (rec.expire, rec.wq.take()),
            None => return,
        };
        if let Some(entry) = old {
            self.wait_queue.remove(entry);
        }
        if !expire.is_set() {
            return;
        }
        let entry = self.wait_queue.insert(expire.raw(), id);
        if let Some(rec) = self.tasks.get_mut(id.arena_index()) {
            rec.wq = Some(entry);
        }
        trace!(task = ?id, expire = ?expire, "timer armed");
    }

    /// Arms a timer at the earlier of `when` and the current deadline, then
    /// queues the task. Does nothing when the task is already runnable.
    pub fn schedule(&mut self, id: TaskId, when: Tick) {
        let requeue = {
            let Some(rec) = self.tasks.get_mut(id.arena_index()) else {
                return;
            };
            if rec.rq.is_some() {
                return;
            }
            let when = if rec.wq.is_some() {
                when.first(rec.expire)
            } else {
                when
            };
            rec.expire = when;
            match rec.wq {
                None => true,
                Some(entry) => match self.wait_queue.key(entry) {
                    Some(linked) => when.is_before(Tick::from_raw(linked)),
                    None => true,
                },
            }
        };
        if requeue {
            self.queue_force(id);
        }
    }

    /// Wakes every task whose deadline has passed at `now` and returns the
    /// next future deadline, or [`Tick::ETERNITY`] when the queue is empty.
    ///
    /// The returned tick is the I/O poller's sleep bound.
    pub fn wake_expired_tasks(&mut self, now: Tick) -> Tick {
        loop {
            let entry = self
                .wait_queue
                .lookup_ge(now.raw().wrapping_sub(TIMER_LOOK_BACK))
                .or_else(|| self.wait_queue.first());
            let Some(entry) = entry else {
                return Tick::ETERNITY;
            };
            let Some(key) = self.wait_queue.key(entry) else {
                return Tick::ETERNITY;
            };
            let key = Tick::from_raw(key);
            if now.is_before(key) {
                // Nothing expired; this is the next event.
                return key;
            }

            let Some(id) = self.wait_queue.get(entry).copied() else {
                return Tick::ETERNITY;
            };
            self.wait_queue.remove(entry);
            let expire = match self.tasks.get_mut(id.arena_index()) {
                Some(rec) => {
                    rec.wq = None;
                    rec.expire
                }
                None => continue,
            };

            // The tree position can lag behind the real deadline: advancing a
            // deadline skips the tree update (see `queue`), and disabling the
            // timer leaves the old entry behind. Settle the difference here,
            // now that the entry is detached anyway.
            if !expire.is_expired(now) {
                if !expire.is_set() {
                    continue;
                }
                self.queue_force(id);
                continue;
            }
            trace!(task = ?id, "timer fired");
            self.wakeup(id, TaskState::WOKEN_TIMER);
        }
    }

    /// Runs a bounded prefix of the run queue.
    ///
    /// Tasks are detached in batches (16 by default) before any handler runs,
    /// so a handler can wake siblings, rearm timers or delete itself without
    /// the loop revisiting the tree between invocations. The per-call budget
    /// is the smaller of the run-queue length and the configured cap (200 by
    /// default), quartered while any niced task is queued so biased ordering
    /// gets a chance to act before the queue is drained.
    pub fn process_runnable_tasks(&mut self) {
        self.run_queue_cur = self.run_queue_tasks;
        self.tasks_cur = self.nb_tasks();
        if self.run_queue_tasks == 0 {
            return;
        }

        let mut budget = self.run_queue_tasks.min(self.config.run_budget());
        if self.niced_tasks > 0 {
            budget = (budget + 3) / 4;
        }

        let mut batch: SmallVec<[TaskId; 16]> = SmallVec::new();
        let mut outcomes: SmallVec<[Option<TaskId>; 16]> = SmallVec::new();

        while budget > 0 {
            let batch_cap = self.config.batch().min(budget as usize);

            // Collect a contiguous run of tasks, wrap-aware. `rewound` makes
            // sure one collection never loops back to the head twice.
            let mut rewound = false;
            let mut cursor = self
                .run_queue
                .lookup_ge(self.queue_ticks.wrapping_sub(TIMER_LOOK_BACK));
            if cursor.is_none() {
                cursor = self.run_queue.first();
                if cursor.is_none() {
                    break;
                }
                rewound = true;
            }

            batch.clear();
            outcomes.clear();
            while batch.len() < batch_cap {
                let Some(entry) = cursor else {
                    if rewound {
                        break;
                    }
                    cursor = self.run_queue.first();
                    if cursor.is_none() {
                        break;
                    }
                    rewound = true;
                    continue;
                };
                let Some(&id) = self.run_queue.get(entry) else {
                    break;
                };
                cursor = self.run_queue.next(entry);
                self.unlink_rq(id);
                if let Some(rec) = self.tasks.get_mut(id.arena_index()) {
                    // Reasons that arrived while the task sat queued were
                    // parked in pending_state; fold them into this
                    // activation's snapshot before clearing.
                    let pending = rec.pending_state.wake_reasons();
                    rec.state = rec.state.union(pending).union(TaskState::RUNNING);
                    rec.pending_state = TaskState::empty();
                    rec.calls += 1;
                }
                batch.push(id);
            }
            if batch.is_empty() {
                break;
            }
            trace!(count = batch.len(), "executing batch");

            for &id in &batch {
                let (state, process) = match self.tasks.get_mut(id.arena_index()) {
                    Some(rec) => (rec.state, rec.process.take()),
                    None => {
                        outcomes.push(None);
                        continue;
                    }
                };
                let Some(mut process) = process else {
                    outcomes.push(Some(id));
                    continue;
                };
                let outcome = process(&mut *self, id, state);
                if let Some(rec) = self.tasks.get_mut(id.arena_index()) {
                    rec.process = Some(process);
                }
                outcomes.push(outcome);
            }

            budget -= batch.len() as u32;

            for outcome in outcomes.drain(..) {
                // A missing outcome means the task deleted itself; its
                // handler already unlinked and freed it.
                let Some(id) = outcome else { continue };
                let Some(rec) = self.tasks.get_mut(id.arena_index()) else {
                    continue;
                };
                rec.state.remove(TaskState::RUNNING);
                if rec.pending_state.is_empty() {
                    self.queue(id);
                } else {
                    // Woken again while it ran; straight back to the run
                    // queue, promoting the pending reasons.
                    self.wakeup_now(id, TaskState::empty());
                }
            }
        }
    }

    /// Seeds the run-queue insertion counter. Intended for tests and
    /// benchmarks exercising counter wrap.
    #[doc(hidden)]
    pub fn seed_queue_ticks(&mut self, ticks: u32) {
        self.queue_ticks = ticks;
    }

    /// Asserts the counter and membership invariants. Test support.
    #[cfg(test)]
    pub(crate) fn check_consistency(&self) {
        let mut rq_linked = 0u32;
        let mut niced = 0u32;
        for (idx, rec) in self.tasks.iter() {
            let id = TaskId::from_arena(idx);
            assert!(
                !rec.state.is_running(),
                "{id:?} still marked running at rest"
            );
            if let Some(entry) = rec.rq {
                rq_linked += 1;
                if rec.nice != 0 {
                    niced += 1;
                }
                assert_eq!(self.run_queue.get(entry).copied(), Some(id));
            }
            if let Some(entry) = rec.wq {
                let key = self.wait_queue.key(entry).map(Tick::from_raw);
                assert_eq!(self.wait_queue.get(entry).copied(), Some(id));
                if rec.expire.is_set() {
                    let key = key.expect("linked entry has a key");
                    assert!(
                        key == rec.expire || key.is_before(rec.expire),
                        "{id:?} linked later than its deadline"
                    );
                }
            }
        }
        assert_eq!(rq_linked, self.run_queue_tasks);
        assert_eq!(niced, self.niced_tasks);
        assert_eq!(self.run_queue.len(), self.run_queue_tasks as usize);
    }
}

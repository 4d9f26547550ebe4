//! Coopsched: the cooperative task scheduler of an event-driven proxy.
//!
//! # Overview
//!
//! A [`Scheduler`] owns every schedulable unit of one worker thread and two
//! ordered queues over a wrapping 32-bit tick space:
//!
//! - a **wait queue** of tasks pending a future deadline, swept by
//!   [`Scheduler::wake_expired_tasks`], which also tells the surrounding I/O
//!   poller how long it may sleep;
//! - a **run queue** of tasks eligible now, ordered by a wrapping insertion
//!   counter biased per task ("nice"), drained in bounded batches by
//!   [`Scheduler::process_runnable_tasks`].
//!
//! Handlers run to completion and communicate through their return value and
//! the scheduler API: re-arm a timer and return to sleep, wake yourself (or a
//! sibling) to run again, or free your record and return `None` to disappear.
//! Wakeups that arrive while a task executes accumulate and produce exactly
//! one follow-up activation.
//!
//! # Core guarantees
//!
//! - **FIFO fairness**: with neutral nice, tasks run in wakeup order.
//! - **Advisory bias**: nice shifts a task by `nice/32` run-queue lengths;
//!   it reorders, it never starves or guarantees.
//! - **Bounded latency**: each processing call invokes at most the configured
//!   budget of handlers (200 by default, quartered while biased tasks wait).
//! - **Wrap correctness**: tick comparisons and both queues are modular;
//!   counter wrap-around preserves ordering.
//!
//! # Example
//!
//! ```
//! use coopsched::{Scheduler, TaskState, Tick};
//!
//! let mut sched = Scheduler::new();
//! let task = sched.new_task(Box::new(|_sched, id, _state| Some(id)));
//!
//! // Arm a 100 ms timer and let the sweep fire it.
//! sched.set_expire(task, Tick::from_raw(1000).add_ms(100));
//! sched.queue(task);
//! let next = sched.wake_expired_tasks(Tick::from_raw(1000));
//! assert_eq!(next, Tick::from_raw(1100));
//!
//! sched.wake_expired_tasks(Tick::from_raw(1100));
//! sched.process_runnable_tasks();
//! assert_eq!(sched.calls(task), Some(1));
//!
//! // Direct wakeups work the same way without a timer.
//! sched.wakeup(task, TaskState::WOKEN_MSG);
//! sched.process_runnable_tasks();
//! assert_eq!(sched.calls(task), Some(2));
//! ```
//!
//! # Threading model
//!
//! Single-threaded cooperative: one `Scheduler` per worker thread, no locks,
//! no suspension points. A handler that blocks stalls the whole worker.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod config;
pub mod record;
pub mod sched;
#[cfg(any(test, feature = "test-util"))]
pub mod test_utils;
pub mod types;
pub mod util;

pub use config::{ConfigError, SchedulerConfig};
pub use record::task::{TaskFn, TaskRecord, NICE_MAX, NICE_MIN};
pub use sched::{Scheduler, SchedulerStats, TIMER_LOOK_BACK};
pub use types::{TaskId, TaskState, Tick};

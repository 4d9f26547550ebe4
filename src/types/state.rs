//! Task state bits: the running flag plus the wake reasons delivered to a
//! handler on each invocation.

use bitflags::bitflags;

bitflags! {
    /// Bit set describing why a task is runnable and whether it is currently
    /// being executed.
    ///
    /// The `WOKEN_*` bits accumulate between invocations and are handed to
    /// the handler as its wake reasons. `RUNNING` is owned by the execution
    /// loop and never appears in `pending_state`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
    pub struct TaskState: u16 {
        /// The handler is currently executing.
        const RUNNING      = 1;

        /// Freshly created, never run.
        const WOKEN_INIT   = 1 << 1;

        /// A timer reached its expiration tick.
        const WOKEN_TIMER  = 1 << 2;

        /// I/O readiness on a watched descriptor.
        const WOKEN_IO     = 1 << 3;

        /// A signal was delivered.
        const WOKEN_SIGNAL = 1 << 4;

        /// A message arrived from a peer task.
        const WOKEN_MSG    = 1 << 5;

        /// A watched resource became available.
        const WOKEN_RES    = 1 << 6;

        /// Any other reason.
        const WOKEN_OTHER  = 1 << 7;

        /// Every wake-reason bit, excluding `RUNNING`.
        const WOKEN_ANY = Self::WOKEN_INIT.bits()
            | Self::WOKEN_TIMER.bits()
            | Self::WOKEN_IO.bits()
            | Self::WOKEN_SIGNAL.bits()
            | Self::WOKEN_MSG.bits()
            | Self::WOKEN_RES.bits()
            | Self::WOKEN_OTHER.bits();
    }
}

impl TaskState {
    /// The wake reasons carried by this state, with `RUNNING` masked off.
    #[must_use]
    pub const fn wake_reasons(self) -> Self {
        self.intersection(Self::WOKEN_ANY)
    }

    /// True while the handler is executing.
    #[must_use]
    pub const fn is_running(self) -> bool {
        self.contains(Self::RUNNING)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wake_reasons_mask_off_running() {
        let state = TaskState::RUNNING | TaskState::WOKEN_TIMER | TaskState::WOKEN_MSG;
        assert_eq!(
            state.wake_reasons(),
            TaskState::WOKEN_TIMER | TaskState::WOKEN_MSG
        );
        assert!(state.is_running());
        assert!(!state.wake_reasons().is_running());
    }

    #[test]
    fn woken_any_covers_every_reason() {
        for reason in [
            TaskState::WOKEN_INIT,
            TaskState::WOKEN_TIMER,
            TaskState::WOKEN_IO,
            TaskState::WOKEN_SIGNAL,
            TaskState::WOKEN_MSG,
            TaskState::WOKEN_RES,
            TaskState::WOKEN_OTHER,
        ] {
            assert!(TaskState::WOKEN_ANY.contains(reason));
        }
        assert!(!TaskState::WOKEN_ANY.contains(TaskState::RUNNING));
    }
}

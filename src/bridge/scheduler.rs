//! Countdown that decides when the whole fleet is polled

/// Scheduling state owned by the bridge loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollState {
    /// Ticks remaining until the next scheduled poll
    pub countdown: u64,
    /// Value the countdown is reset to after a poll
    pub full_cycle_ticks: u64,
}

impl PollState {
    /// Initial state: the first tick polls
    pub fn new(full_cycle_ticks: u64) -> Self {
        Self {
            countdown: 0,
            full_cycle_ticks,
        }
    }
}

/// Advance the countdown by one tick (pure function)
///
/// A countdown of zero triggers a poll and resets to `full_cycle_ticks`;
/// otherwise the countdown is decremented.
pub fn tick(state: PollState) -> (PollState, bool) {
    if state.countdown == 0 {
        (
            PollState {
                countdown: state.full_cycle_ticks,
                ..state
            },
            true,
        )
    } else {
        (
            PollState {
                countdown: state.countdown - 1,
                ..state
            },
            false,
        )
    }
}

/// Stateful wrapper around [`tick`]
#[derive(Debug, Clone)]
pub struct PollScheduler {
    state: PollState,
}

impl PollScheduler {
    pub fn new(full_cycle_ticks: u64) -> Self {
        Self {
            state: PollState::new(full_cycle_ticks),
        }
    }

    /// Advance one tick; returns whether a full poll is due
    pub fn tick(&mut self) -> bool {
        let (next, should_poll) = tick(self.state);
        self.state = next;
        should_poll
    }

    pub fn state(&self) -> PollState {
        self.state
    }
}

//! When is an agent response complete?
//!
//! The platform never says "this turn is over", so completion is inferred
//! from successive polls of the aggregator. [`CompletionTracker`] is the pure
//! state machine behind that inference: it is fed one [`Observation`] per
//! poll and never touches a clock or a channel itself.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Poll cadence and thresholds for response completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollTiming {
    pub interval: Duration,
    /// Polls without any ready fragment before giving up.
    pub idle_polls: u32,
    /// Consecutive polls with an unchanged latest fragment before the
    /// response counts as complete.
    pub quiet_polls: u32,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            idle_polls: 10,
            quiet_polls: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// Nothing arrived within the idle budget.
    IdleTimeout,
    /// Fragments arrived and then stopped changing.
    Quiescent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle { polls: u32 },
    Collecting { last: DateTime<Utc> },
    Quiescing { last: DateTime<Utc>, repeats: u32 },
    Done(Completion),
}

/// What one poll saw.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Observation {
    /// Timestamp of the most recent fragment belonging to a completed request.
    pub latest_fragment: Option<DateTime<Utc>>,
    /// A terminal request status was applied since the previous poll.
    pub status_changed: bool,
}

#[derive(Debug, Clone)]
pub struct CompletionTracker {
    timing: PollTiming,
    phase: Phase,
}

impl CompletionTracker {
    pub fn new(timing: PollTiming) -> Self {
        Self {
            timing,
            phase: Phase::Idle { polls: 0 },
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_done(&self) -> bool {
        matches!(self.phase, Phase::Done(_))
    }

    /// Advances the state machine by one poll and returns the new phase.
    pub fn observe(&mut self, observation: Observation) -> Phase {
        self.phase = match (self.phase, observation.latest_fragment) {
            (Phase::Done(done), _) => Phase::Done(done),

            (Phase::Idle { polls }, None) => {
                let polls = if observation.status_changed { 0 } else { polls + 1 };
                if polls >= self.timing.idle_polls {
                    Phase::Done(Completion::IdleTimeout)
                } else {
                    Phase::Idle { polls }
                }
            }
            (Phase::Idle { .. }, Some(latest)) => Phase::Collecting { last: latest },

            (Phase::Collecting { last } | Phase::Quiescing { last, .. }, latest)
                if observation.status_changed || latest.is_some_and(|latest| latest != last) =>
            {
                Phase::Collecting {
                    last: latest.unwrap_or(last),
                }
            }
            (Phase::Collecting { last }, _) => self.quiescing(last, 1),
            (Phase::Quiescing { last, repeats }, _) => self.quiescing(last, repeats + 1),
        };
        self.phase
    }

    fn quiescing(&self, last: DateTime<Utc>, repeats: u32) -> Phase {
        if repeats >= self.timing.quiet_polls {
            Phase::Done(Completion::Quiescent)
        } else {
            Phase::Quiescing { last, repeats }
        }
    }
}

//! Chatting with an agent: turning the platform's fragment stream into
//! complete, ordered turns.

pub mod aggregator;
pub mod completion;
pub mod driver;
pub mod fragment;
pub mod turn;

pub use aggregator::TurnAggregator;
pub use completion::{Completion, CompletionTracker, Observation, Phase, PollTiming};
pub use driver::{DEFAULT_LANGUAGE, DriverOptions, LANGUAGES, SessionDriver};
pub use fragment::{Fragment, FragmentSource};
pub use turn::{Transcript, Turn};

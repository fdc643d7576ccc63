//! Batch definitions: scripted conversations loaded from YAML, and the
//! runner that plays one of them against an agent.

mod definition;
pub mod filter;
pub mod loader;
mod result;
pub mod runner;

pub use definition::{AppDescriptor, BatchDefinition, BatchSettings};
pub use filter::BatchFilter;
pub use loader::discover;
pub use result::RunResult;
pub use runner::{BatchRunner, RunBatch, RunnerOptions};

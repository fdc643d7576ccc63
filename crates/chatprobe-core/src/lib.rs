// Core chatprobe functionality without CLI dependencies

pub mod batch;
pub mod chat;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod platform;
pub mod steps;
pub mod test_utils;
pub mod utils;

pub use error::{Error, Result};

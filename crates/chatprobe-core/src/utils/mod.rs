pub mod paths;
pub mod tracing;

pub use paths::AppPaths;
pub use self::tracing::{TracingOptions, init_tracing};

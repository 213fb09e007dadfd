pub mod cli;
pub mod warm;

pub use cli::DatasetArgs;
pub use warm::{warm_cache, WarmFailure, WarmSummary};

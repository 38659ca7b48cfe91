mod cache;
mod error;
mod lock;
mod scheduler;

pub use cache::*;
pub use error::RuntimeError;
pub use lock::KeyedLocks;
pub use scheduler::{ScheduledJob, Scheduler};

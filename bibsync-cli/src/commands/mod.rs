//! CLI command implementations.

pub mod diff;
pub mod health;
pub mod sync;
pub mod usage;

pub use diff::diff;
pub use health::{health, HealthOptions};
pub use sync::{sync, SyncOptions};
pub use usage::usage;

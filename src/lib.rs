pub mod config;
pub mod devserver;
pub mod errors;
pub mod gigs;
pub mod logging;
pub mod realtime;
pub mod sync;

pub use errors::{ConfigError, SyncError};

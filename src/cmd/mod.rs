//! CLI command implementations.
//!
//! Each submodule owns one or more related `Commands` variants:
//!
//! | Module   | Commands handled                             |
//! |----------|----------------------------------------------|
//! | `gigs`   | `List`, `Create`, `Edit`, `Assign`, `State`  |
//! | `watch`  | `Watch`                                      |
//! | `serve`  | `Serve`                                      |
//! | `config` | `Config`                                     |

pub mod config;
pub mod gigs;
pub mod serve;
pub mod watch;

pub use config::cmd_config;
pub use gigs::{cmd_assign, cmd_create, cmd_edit, cmd_list, cmd_state};
pub use serve::cmd_serve;
pub use watch::cmd_watch;

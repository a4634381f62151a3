//! Line-oriented client for ridesync
//!
//! A thin shell over [`ridesync_app::Driver`] that reads commands from stdin
//! and prints the view to stdout. All orchestration logic lives in the
//! generic [`ridesync_app::Runtime`]

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod commands;
pub mod config;
pub mod render;
pub mod stdio;

pub use commands::Command;
pub use config::{Args, RoleArg};
pub use render::render;
pub use ridesync_app::{App, AppEvent, Driver, Runtime};
pub use stdio::{StdioDriver, StdioError};

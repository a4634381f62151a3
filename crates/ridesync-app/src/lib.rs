//! Application layer for ride clients
//!
//! Pure view state and a generic runtime that owns the transport channel,
//! event router and ride client, so the same orchestration runs in the CLI
//! and in deterministic simulation.
//!
//! # Components
//!
//! - [`App`]: View state (session, progress, offers, banner, notices)
//! - [`Bridge`]: Protocol bridge (translates App actions to Client events)
//! - [`Driver`]: Trait for platform-specific I/O abstraction
//! - [`Runtime`]: Generic orchestration loop using Driver

mod action;
mod app;
mod bridge;
mod driver;
mod event;
mod runtime;
mod state;

pub use action::AppAction;
pub use app::App;
pub use bridge::{Bridge, Effect};
pub use driver::{Driver, DriverEvent};
pub use event::AppEvent;
pub use runtime::{Credentials, Runtime, RuntimeConfig, RuntimeError};
pub use state::{Notice, NoticeLevel};

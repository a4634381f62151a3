//! Environment abstraction.
//!
//! State machines never read the system clock directly. Production code uses
//! [`SystemEnv`]; simulation supplies a virtual clock so timeouts and ticks
//! are reproducible.

/// Source of time for the client.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Current instant.
    fn now(&self) -> std::time::Instant;
}

/// Wall-clock environment.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl Environment for SystemEnv {
    fn now(&self) -> std::time::Instant {
        std::time::Instant::now()
    }
}

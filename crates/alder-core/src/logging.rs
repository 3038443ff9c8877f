//! Logging facilities for Alder.
//!
//! Alder uses the `tracing` crate for instrumentation. To see logs, install
//! a tracing subscriber in your application:
//!
//! ```ignore
//! use tracing_subscriber;
//!
//! fn main() {
//!     tracing_subscriber::fmt::init();
//!
//!     // Your application code...
//! }
//! ```

/// Span names used throughout Alder for tracing.
///
/// These constants can be used to filter traces for specific subsystems.
pub mod span_names {
    /// Signal emission span.
    pub const SIGNAL: &str = "alder::signal";
    /// Scheduler processing span.
    pub const SCHEDULER: &str = "alder::scheduler";
    /// Row validation span.
    pub const VALIDATE: &str = "alder::validate";
}

/// Target names for log filtering.
///
/// Use these with `tracing` directives to filter logs by subsystem.
pub mod targets {
    /// Core crate target.
    pub const CORE: &str = "alder_core";
    /// Signal/slot system target.
    pub const SIGNAL: &str = "alder_core::signal";
    /// Task scheduler target.
    pub const SCHEDULER: &str = "alder_core::scheduler";
}

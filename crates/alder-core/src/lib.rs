//! Core systems for Alder.
//!
//! This crate provides the foundational components of the Alder toolkit:
//!
//! - **Signal/Slot System**: Type-safe communication between models, views
//!   and application code
//! - **Scheduler**: Cooperative one-shot and periodic task scheduling, owned
//!   by the component that schedules the work
//! - **Errors**: The [`AlderError`] hierarchy shared by the toolkit
//! - **Logging**: `tracing` targets for per-subsystem filtering
//!
//! Alder components are single-threaded: signals invoke their slots directly
//! on the emitting thread, and schedulers are driven cooperatively by their
//! owner rather than by a background thread.
//!
//! # Signal/Slot Example
//!
//! ```
//! use alder_core::Signal;
//!
//! // Create a signal that notifies when a value changes
//! let value_changed = Signal::<i32>::new();
//!
//! // Connect a slot to handle the signal
//! let conn_id = value_changed.connect(|value| {
//!     println!("Value changed to: {}", value);
//! });
//!
//! // Emit the signal
//! value_changed.emit(42);
//!
//! // Disconnect when done
//! value_changed.disconnect(conn_id);
//! ```
//!
//! # Scheduler Example
//!
//! ```
//! use alder_core::TaskScheduler;
//! use std::time::Duration;
//!
//! let mut scheduler = TaskScheduler::new();
//!
//! // Defer work to the next processing cycle at least 30 ms from now
//! scheduler.schedule_once(Duration::from_millis(30), || {
//!     println!("Deferred work executed!");
//! });
//!
//! // The owner drives the scheduler from its event loop
//! scheduler.process_ready();
//! ```

mod error;
pub mod logging;
mod scheduler;
pub mod signal;

pub use error::{AlderError, Result, SchedulerError, SignalError};
pub use scheduler::{ScheduledTaskId, ScheduledTaskKind, TaskScheduler};
pub use signal::{ConnectionGuard, ConnectionId, Signal};

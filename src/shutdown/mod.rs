//! Signal-driven shutdown hooks
//!
//! A [`ShutdownCoordinator`] delivers OS termination signals to every
//! subsystem that registered interest before the process exits. Hooks run
//! in registration order, one after the other, on the listener task.

pub mod coordinator;
pub mod hook;


pub use coordinator::ShutdownCoordinator;
pub use hook::{ShutdownHook, Signal, SignalHook, signal_hook};

//! Notification actions module
//!
//! Provides the action handler for read, archive, snooze and unsubscribe.

mod handler;

pub use handler::ActionHandler;

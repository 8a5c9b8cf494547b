//! Background Tasks Module
//!
//! Contains background tasks that run periodically during server operation.
//!
//! # Tasks
//! - Expiry sweep: purges expired entries and abandoned locks

mod cleanup;

pub use cleanup::spawn_cleanup_task;

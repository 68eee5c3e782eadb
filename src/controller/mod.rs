//! # Controller
//!
//! Core controller modules for the Secret Sync Controller.
//!
//! - `backoff`: Exponential backoff for retryable failures
//! - `catalog`: Stores known to the controller
//! - `health`: Store health cache read by the flood gate
//! - `scheduler`: Per-object state machine and worker pool
//! - `sink`: Where completed passes deliver their result
//! - `validator`: Periodic store health probes

pub mod backoff;
pub mod catalog;
pub mod health;
pub mod scheduler;
pub mod sink;
pub mod validator;

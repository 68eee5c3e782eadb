//! Secret Sync Controller Library
//!
//! This library provides the core functionality for the Secret Sync Controller:
//! a provider abstraction over external secret managers and a scheduler that
//! keeps sync objects reconciled against them.
//!
//! ## Quick Start
//!
//! ```rust
//! use secret_sync_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod error;
pub mod observability;
pub mod prelude;
pub mod provider;
pub mod runtime;
pub mod server;

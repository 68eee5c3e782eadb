//! # Runtime
//!
//! Process bootstrap and the main loop of the controller binary.

pub mod initialization;
pub mod run_loop;

pub use initialization::{build_registry, init_process, initialize, InitOptions, InitializationResult};
pub use run_loop::run;

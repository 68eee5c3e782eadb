//! # Configuration
//!
//! - `controller`: process-level settings from environment variables
//! - `resources`: stores and sync objects loaded from a YAML manifest

pub mod controller;
pub mod resources;

pub use controller::ControllerConfig;
pub use resources::{load_resources, ResourceManifest};

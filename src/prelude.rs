//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use secret_sync_controller::prelude::*;
//! ```
//!
//! This brings into scope:
//! - All configuration types (SecretStore, SyncObject, ProviderConfig, etc.)
//! - Provider traits and the registry
//! - Scheduler types
//! - Common error types

// Configuration types - most commonly used
pub use crate::crd::*;

// Provider traits - needed for implementing providers
pub use crate::provider::{
    Capabilities, CredentialResolver, MaintenanceStatus, Provider, ProviderRegistry,
    SecretsClient, ValidationResult,
};

// Scheduler types - core controller functionality
pub use crate::controller::scheduler::{
    Scheduler, SchedulerConfig, SchedulerError, SchedulerHandle, TriggerSource,
};
pub use crate::controller::sink::{ChannelSink, LogSink, SyncSink};

// Config types - for configuration management
pub use crate::config::{ControllerConfig, ResourceManifest};

// Common error types
pub use crate::error::{ErrorKind, Result, SyncError};

// Built-in providers
pub use crate::provider::memory::{MemoryProvider, MemoryVault};
pub use crate::provider::sakura::SakuraProvider;

//! # Configuration Types
//!
//! Types describing stores, sync objects and their status.
//!
//! ## Module Structure
//!
//! - `provider.rs` - Backend configuration variants and credential references
//! - `store.rs` - Store identity, scope and references
//! - `sync.rs` - Sync objects, remote references, find queries and push specs
//! - `status.rs` - Phase and status recorded by the scheduler

mod provider;
mod status;
mod store;
mod sync;

pub use provider::{
    CredentialReference, MemoryConfig, ProviderConfig, SakuraAuth, SakuraConfig, SakuraSecretRef,
};
pub use status::{SyncPhase, SyncStatus};
pub use store::{SecretStore, StoreKey, StoreKind, StoreRef};
pub use sync::{
    DataRequest, DeletionPolicy, FindQuery, ObjectKey, PushRequest, PushSpec, RemoteRef,
    SecretData, SyncObject,
};

//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! provider registration, credential resolution and resource loading.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{load_resources, ControllerConfig, ResourceManifest};
use crate::controller::catalog::StoreCatalog;
use crate::controller::health::HealthCache;
use crate::controller::scheduler::{Scheduler, SchedulerHandle};
use crate::controller::sink::LogSink;
use crate::controller::validator::StoreValidator;
use crate::observability;
use crate::provider::memory::MemoryProvider;
use crate::provider::resolver::{KubeCredentialResolver, StaticCredentialResolver};
use crate::provider::sakura::SakuraProvider;
use crate::provider::{CredentialResolver, MaintenanceStatus, ProviderRegistry};
use crate::server::ServerState;

/// Startup options taken from the command line
#[derive(Debug, Clone, Default)]
pub struct InitOptions {
    /// Manifest of stores and sync objects
    pub resources: PathBuf,
    /// Resolve credentials from an empty static table instead of the cluster
    pub without_cluster: bool,
}

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    pub config: ControllerConfig,
    pub manifest: ResourceManifest,
    pub scheduler: Scheduler,
    pub handle: SchedulerHandle,
    pub validator: StoreValidator,
    pub server_state: Arc<ServerState>,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("stores", &self.manifest.stores.len())
            .field("objects", &self.manifest.objects.len())
            .field(
                "server_ready",
                &self
                    .server_state
                    .is_ready
                    .load(std::sync::atomic::Ordering::Relaxed),
            )
            .finish_non_exhaustive()
    }
}

/// Install the rustls provider and the tracing subscriber
///
/// Must run before any TLS client is built.
pub fn init_process(config: &ControllerConfig) {
    // Required for rustls 0.23+ when no default provider is set via features
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        eprintln!("rustls crypto provider already installed");
    }

    let default_filter = format!(
        "secret_sync_controller={}",
        config.log_level.to_lowercase()
    );
    if let Err(e) = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .try_init()
    {
        eprintln!("Tracing subscriber already initialized: {e}");
    }
}

/// Build every collaborator of the controller without starting anything
///
/// # Errors
/// Fails when metrics cannot be registered, a provider tag is registered
/// twice, or the resource manifest cannot be loaded.
pub async fn initialize(config: ControllerConfig, options: &InitOptions) -> Result<InitializationResult> {
    info!("Starting Secret Sync Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );
    for warning in config.warnings() {
        warn!("{}", warning);
    }

    observability::metrics::register_metrics()?;

    let registry = Arc::new(build_registry(&config)?);
    info!(providers = ?registry.tags(), "Providers registered");

    let resolver = credential_resolver(options.without_cluster).await;

    let manifest = load_resources(&options.resources)
        .with_context(|| format!("Failed to load resources from {}", options.resources.display()))?;
    info!(
        stores = manifest.stores.len(),
        objects = manifest.objects.len(),
        "Resources loaded"
    );

    let health = Arc::new(HealthCache::new(config.health_ttl()));
    let catalog = Arc::new(StoreCatalog::default());
    let (scheduler, handle) = Scheduler::new(
        config.scheduler_config(),
        Arc::clone(&registry),
        Arc::clone(&resolver),
        Arc::new(LogSink),
        Arc::clone(&health),
        Arc::clone(&catalog),
    );
    let validator = StoreValidator::new(
        catalog,
        registry,
        resolver,
        health,
        handle.clone(),
        config.store_validation_interval(),
    )
    .with_timeout(config.backend_http_timeout());

    let server_state = Arc::new(ServerState {
        is_ready: Arc::new(AtomicBool::new(false)),
        scheduler: handle.clone(),
    });

    Ok(InitializationResult {
        config,
        manifest,
        scheduler,
        handle,
        validator,
        server_state,
    })
}

/// Registry with every built-in backend
///
/// # Errors
/// `DuplicateProvider` when two backends claim one tag.
pub fn build_registry(config: &ControllerConfig) -> Result<ProviderRegistry> {
    let mut registry = ProviderRegistry::new();
    registry.register(
        "sakura",
        Arc::new(SakuraProvider::new(config.backend_http_timeout())),
        MaintenanceStatus::Maintained,
    )?;
    registry.register(
        "memory",
        Arc::new(MemoryProvider::default()),
        MaintenanceStatus::Maintained,
    )?;
    Ok(registry)
}

async fn credential_resolver(without_cluster: bool) -> Arc<dyn CredentialResolver> {
    if without_cluster {
        info!("Running without a cluster: credential references will not resolve");
        return Arc::new(StaticCredentialResolver::new());
    }
    match kube::Client::try_default().await {
        Ok(client) => Arc::new(KubeCredentialResolver::new(client)),
        Err(e) => {
            warn!(
                "Kubernetes client unavailable, credential references will not resolve: {}",
                e
            );
            Arc::new(StaticCredentialResolver::new())
        }
    }
}

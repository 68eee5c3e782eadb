//! # Common Provider Utilities
//!
//! Shared utilities and patterns used across all provider implementations.
//!
//! Backends differ in their native APIs but share the same upsert and
//! bulk-fetch shape, so the comparison, fan-out and metric helpers live here.

use futures::{stream, StreamExt, TryStreamExt};
use std::future::Future;
use std::time::Instant;
use tracing::{debug, info};

use super::find::NameMatcher;
use crate::constants::FIND_FETCH_CONCURRENCY;
use crate::crd::SecretData;
use crate::error::Result;
use crate::observability::metrics;

/// Result of a secret comparison operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecretComparison {
    /// Secret doesn't exist
    NotFound,
    /// Secret exists but value is unchanged
    Unchanged,
    /// Secret exists and value has changed
    Changed,
}

/// Compare the current remote value with the value about to be pushed
///
/// # Errors
/// Whatever `get_current_value` fails with.
pub async fn compare_secret_value<F, Fut>(
    get_current_value: F,
    new_value: &[u8],
) -> Result<SecretComparison>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Option<Vec<u8>>>>,
{
    let current_value = get_current_value().await?;

    Ok(match current_value {
        None => SecretComparison::NotFound,
        Some(current) if current == new_value => SecretComparison::Unchanged,
        Some(_) => SecretComparison::Changed,
    })
}

/// Record metrics for a backend operation
pub fn record_operation(provider: &str, operation: &str, start_time: Instant) {
    metrics::record_provider_operation(provider, operation, start_time.elapsed().as_secs_f64());
}

/// Log the outcome of a push comparison
pub fn log_push_operation(provider: &str, remote_key: &str, comparison: SecretComparison) {
    match comparison {
        SecretComparison::NotFound => {
            info!("Creating new {} secret: {}", provider, remote_key);
        }
        SecretComparison::Unchanged => {
            debug!("{} secret {} unchanged, skipping update", provider, remote_key);
        }
        SecretComparison::Changed => {
            info!("Secret value changed, updating {} secret: {}", provider, remote_key);
        }
    }
}

/// Filter `names` and fetch every survivor
///
/// Fetches run concurrently. The first failure fails the whole call and no
/// partial result is returned.
///
/// # Errors
/// The first error returned by `fetch`.
pub async fn fetch_matching<F, Fut>(
    names: Vec<String>,
    matcher: Option<&NameMatcher>,
    fetch: F,
) -> Result<SecretData>
where
    F: Fn(String) -> Fut,
    Fut: Future<Output = Result<(String, Vec<u8>)>>,
{
    let survivors: Vec<String> = names
        .into_iter()
        .filter(|name| matcher.is_none_or(|m| m.is_match(name)))
        .collect();

    stream::iter(survivors)
        .map(fetch)
        .buffer_unordered(FIND_FETCH_CONCURRENCY)
        .try_collect::<SecretData>()
        .await
}

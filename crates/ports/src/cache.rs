//! Transient key/value cache boundary contract.

use crate::BoxFuture;
use std::time::Duration;
use stratus_shared::{RequestContext, Result};

/// Expiring JSON cache shared by the quota ledger and admission controller.
pub trait CachePort: Send + Sync {
    /// Fetch a live value; expired entries read as `None`.
    fn get(
        &self,
        ctx: &RequestContext,
        key: Box<str>,
    ) -> BoxFuture<'_, Result<Option<serde_json::Value>>>;

    /// Store a value for `ttl`.
    fn set(
        &self,
        ctx: &RequestContext,
        key: Box<str>,
        value: serde_json::Value,
        ttl: Duration,
    ) -> BoxFuture<'_, Result<()>>;

    /// Drop a value. Missing keys are not an error.
    fn invalidate(&self, ctx: &RequestContext, key: Box<str>) -> BoxFuture<'_, Result<()>>;
}

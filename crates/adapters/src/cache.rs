//! Bounded in-memory cache with per-entry expiry.

use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use stratus_ports::{BoxFuture, CachePort, ClockPort};
use stratus_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};

/// LRU cache of JSON values; expiry is measured on the injected clock.
pub struct MemoryTtlCache {
    clock: Arc<dyn ClockPort>,
    max_entries: usize,
    state: tokio::sync::Mutex<CacheState>,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<Box<str>, CacheEntry>,
    order: VecDeque<Box<str>>,
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: DateTime<Utc>,
}

impl MemoryTtlCache {
    /// Create a cache holding at most `max_entries` values.
    pub fn new(clock: Arc<dyn ClockPort>, max_entries: usize) -> Result<Self> {
        if max_entries == 0 {
            return Err(ErrorEnvelope::expected(
                ErrorCode::invalid_input(),
                "cache max_entries must be greater than zero",
            ));
        }
        Ok(Self {
            clock,
            max_entries,
            state: tokio::sync::Mutex::new(CacheState::default()),
        })
    }

    /// Live entries (expired ones not yet swept are excluded).
    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        self.state
            .lock()
            .await
            .entries
            .values()
            .filter(|entry| entry.expires_at > now)
            .count()
    }

    /// Returns true when no live entry remains.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn touch(state: &mut CacheState, key: &str) {
        if let Some(pos) = state.order.iter().position(|k| k.as_ref() == key) {
            state.order.remove(pos);
        }
        state.order.push_back(key.to_owned().into_boxed_str());
    }

    fn forget(state: &mut CacheState, key: &str) {
        state.entries.remove(key);
        if let Some(pos) = state.order.iter().position(|k| k.as_ref() == key) {
            state.order.remove(pos);
        }
    }

    fn evict(state: &mut CacheState, max_entries: usize, now: DateTime<Utc>) {
        let expired: Vec<Box<str>> = state
            .entries
            .iter()
            .filter(|(_, entry)| entry.expires_at <= now)
            .map(|(key, _)| key.clone())
            .collect();
        for key in expired {
            Self::forget(state, &key);
        }
        while state.entries.len() > max_entries {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
        }
    }
}

impl CachePort for MemoryTtlCache {
    fn get(&self, ctx: &RequestContext, key: Box<str>) -> BoxFuture<'_, Result<Option<Value>>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("memory_cache.get")?;
            let now = self.clock.now();
            let mut state = self.state.lock().await;
            let Some(entry) = state.entries.get(&key).cloned() else {
                return Ok(None);
            };
            if entry.expires_at <= now {
                Self::forget(&mut state, &key);
                return Ok(None);
            }
            Self::touch(&mut state, &key);
            drop(state);
            Ok(Some(entry.value))
        })
    }

    fn set(
        &self,
        ctx: &RequestContext,
        key: Box<str>,
        value: Value,
        ttl: Duration,
    ) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("memory_cache.set")?;
            let now = self.clock.now();
            let ttl = TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX);
            let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);
            let mut state = self.state.lock().await;
            state.entries.insert(key.clone(), CacheEntry { value, expires_at });
            Self::touch(&mut state, &key);
            Self::evict(&mut state, self.max_entries, now);
            drop(state);
            Ok(())
        })
    }

    fn invalidate(&self, ctx: &RequestContext, key: Box<str>) -> BoxFuture<'_, Result<()>> {
        let ctx = ctx.clone();
        Box::pin(async move {
            ctx.ensure_not_cancelled("memory_cache.invalidate")?;
            let mut state = self.state.lock().await;
            Self::forget(&mut state, &key);
            drop(state);
            Ok(())
        })
    }
}

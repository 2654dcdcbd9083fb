//! Shared wiring for the app integration tests.

#![allow(dead_code, reason = "each test binary uses a different subset of helpers")]

use std::sync::Arc;
use std::time::Duration;
use stratus_adapters::{MemoryJobRegistry, MemoryTtlCache};
use stratus_app::{
    AdmissionController, AdmissionSettings, ChronoTracker, JobCatalog, LedgerSettings,
    ProcessManager, QuotaLedger,
};
use stratus_domain::{QuotaDayRow, QuotaLimits, QuotaMode, ServiceId, Verb, VerbMap};
use stratus_ports::{CachePort, ClockPort, LoggerPort};
use stratus_shared::Result;
use stratus_testkit::in_memory::{InMemoryStatsStore, ManualClock, RecordingLogger, StaticPolicy};

/// 02:00 UTC: early enough that the strict projection does not apply yet.
pub const EARLY_MORNING: &str = "2026-03-14T02:00:00Z";

/// 12:00 UTC: half the day gone, so the strict projection applies.
pub const MIDDAY: &str = "2026-03-14T12:00:00Z";

/// Seed of every controller built by [`Harness::controller`].
pub const CONTROLLER_SEED: u64 = 7;

/// Collaborators of one ledger/controller pair.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<InMemoryStatsStore>,
    pub cache: Arc<dyn CachePort>,
    pub logger: RecordingLogger,
    pub ledger: Arc<QuotaLedger>,
    pub owm: ServiceId,
}

impl Harness {
    /// Ledger over a working TTL cache and a policy of 500 GET calls per day.
    pub fn new(now: &str) -> Result<Self> {
        let clock = Arc::new(ManualClock::at(now).map_err(parse_error)?);
        let cache: Arc<dyn CachePort> = Arc::new(MemoryTtlCache::new(clock.clone(), 64)?);
        Self::with_cache(clock, cache)
    }

    /// Same harness over an explicit cache.
    pub fn with_cache(clock: Arc<ManualClock>, cache: Arc<dyn CachePort>) -> Result<Self> {
        let owm = ServiceId::parse("owm")?;
        let store = Arc::new(InMemoryStatsStore::new());
        let logger = RecordingLogger::new();
        let ledger = Arc::new(QuotaLedger::new(
            clock.clone(),
            store.clone(),
            Arc::clone(&cache),
            Arc::new(policy(&owm)),
            Some(Arc::new(logger.clone())),
            LedgerSettings::default(),
        ));
        Ok(Self {
            clock,
            store,
            cache,
            logger,
            ledger,
            owm,
        })
    }

    /// Admission controller sharing this harness' ledger.
    pub fn controller(&self, mode: QuotaMode) -> AdmissionController {
        AdmissionController::new(
            Arc::clone(&self.ledger),
            Arc::new(policy(&self.owm)),
            Arc::clone(&self.cache),
            self.clock.clone(),
            self.logger_port(),
            AdmissionSettings {
                mode,
                cache_expiry: Duration::from_secs(900),
                ..AdmissionSettings::default()
            },
        )
        .with_seed(CONTROLLER_SEED)
    }

    /// Seed `count` GET calls for owm, `ago_secs` before now (floored to its bucket).
    pub async fn seed_get(&self, count: u64, ago_secs: i64) {
        let at = self.clock.now() - chrono::TimeDelta::seconds(ago_secs);
        self.store
            .seed_day(QuotaDayRow {
                bucket: stratus_domain::quota_bucket(at),
                service: self.owm.clone(),
                counts: get_counts(count),
            })
            .await;
    }

    /// The recording logger as a port.
    pub fn logger_port(&self) -> Option<Arc<dyn LoggerPort>> {
        Some(Arc::new(self.logger.clone()))
    }
}

/// 500 GET calls per day, 60 per minute, for `service`.
pub fn policy(service: &ServiceId) -> StaticPolicy {
    StaticPolicy::new().with(service, Verb::Get, QuotaLimits::new(500, 60))
}

/// Counts holding only GET.
pub fn get_counts(count: u64) -> VerbMap<u64> {
    let mut counts = VerbMap::<u64>::default();
    *counts.get_mut(Verb::Get) = count;
    counts
}

/// Runner over a fresh registry; returns both.
pub fn runner(
    clock: Arc<ManualClock>,
    catalog: JobCatalog,
    execution_time_limit_secs: u64,
) -> (Arc<MemoryJobRegistry>, Arc<ChronoTracker>, ProcessManager) {
    let registry = Arc::new(MemoryJobRegistry::new());
    let chrono = Arc::new(ChronoTracker::new(
        clock.clone(),
        Arc::new(InMemoryStatsStore::new()),
        None,
    ));
    let runner = ProcessManager::new(
        registry.clone(),
        Arc::new(catalog),
        Arc::clone(&chrono),
        clock,
        None,
        execution_time_limit_secs,
    );
    (registry, chrono, runner)
}

pub fn parse_error(error: chrono::ParseError) -> stratus_shared::ErrorEnvelope {
    stratus_shared::ErrorEnvelope::expected(
        stratus_shared::ErrorCode::invalid_input(),
        error.to_string(),
    )
}

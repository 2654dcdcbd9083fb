//! Integration tests for the admission controller.

mod common;

use common::{EARLY_MORNING, Harness, MIDDAY};
use proptest::prelude::*;
use std::sync::Arc;
use stratus_app::{AdmissionTuning, ProjectionInput, decide, project};
use stratus_domain::{QuotaAlert, QuotaMode, ServiceId, Verb, VerbUsage};
use stratus_ports::LogLevel;
use stratus_shared::{ErrorCode, ErrorEnvelope, RequestContext, Result};
use stratus_testkit::in_memory::{FailingCache, ManualClock};

#[tokio::test]
async fn block_mode_admits_below_the_rolling_projection() -> Result<()> {
    let ctx = RequestContext::new_tick();
    let harness = Harness::new(EARLY_MORNING)?;
    harness.seed_get(480, 6 * 3_600).await;
    let controller = harness.controller(QuotaMode::Block);

    let evaluation = controller
        .evaluate(&ctx, &harness.owm, Verb::Get)
        .await?
        .ok_or_else(|| ErrorEnvelope::expected(ErrorCode::not_found(), "no evaluation"))?;
    assert_eq!(evaluation.projection.projected_rolling, 486);

    assert!(controller.verify(&ctx, &harness.owm, Verb::Get).await);
    assert_eq!(harness.ledger.delta(&harness.owm, Verb::Get), 1);
    Ok(())
}

#[tokio::test]
async fn block_mode_denies_at_the_quota() -> Result<()> {
    let ctx = RequestContext::new_tick();
    let harness = Harness::new(EARLY_MORNING)?;
    harness.seed_get(498, 6 * 3_600).await;
    let controller = harness.controller(QuotaMode::Block);

    assert!(!controller.verify(&ctx, &harness.owm, Verb::Get).await);
    assert_eq!(harness.ledger.delta(&harness.owm, Verb::Get), 0);
    assert!(harness.logger.has(LogLevel::Warn, "quota.denied"));
    Ok(())
}

#[tokio::test]
async fn log_only_mode_admits_and_raises_the_alert() -> Result<()> {
    let ctx = RequestContext::new_tick();
    let harness = Harness::new(EARLY_MORNING)?;
    harness.seed_get(2_000, 3_600).await;
    let controller = harness.controller(QuotaMode::LogOnly);

    assert!(controller.verify(&ctx, &harness.owm, Verb::Get).await);
    assert_eq!(controller.alert_level(&ctx).await?, QuotaAlert::Error);
    assert!(harness.logger.has(LogLevel::Error, "quota.alert"));
    Ok(())
}

#[tokio::test]
async fn disabled_mode_and_unlimited_pairs_always_admit() -> Result<()> {
    let ctx = RequestContext::new_tick();
    let harness = Harness::new(EARLY_MORNING)?;
    harness.seed_get(10_000, 3_600).await;

    let disabled = harness.controller(QuotaMode::Disabled);
    assert!(disabled.verify(&ctx, &harness.owm, Verb::Get).await);

    let blocking = harness.controller(QuotaMode::Block);
    let wug = ServiceId::parse("wug")?;
    assert!(blocking.verify(&ctx, &wug, Verb::Get).await);
    assert!(blocking.verify(&ctx, &harness.owm, Verb::Post).await);
    assert!(blocking.evaluate(&ctx, &wug, Verb::Get).await?.is_none());

    assert_eq!(harness.ledger.delta(&harness.owm, Verb::Get), 1);
    assert_eq!(harness.ledger.delta(&wug, Verb::Get), 1);
    Ok(())
}

#[tokio::test]
async fn cache_outage_still_enforces_from_the_store() -> Result<()> {
    let ctx = RequestContext::new_tick();
    let clock = Arc::new(ManualClock::at(EARLY_MORNING).map_err(common::parse_error)?);
    let harness = Harness::with_cache(clock, Arc::new(FailingCache))?;
    harness.seed_get(2_000, 3_600).await;
    let controller = harness.controller(QuotaMode::Block);

    let mut admitted = 0;
    for _ in 0..600 {
        if controller.verify(&ctx, &harness.owm, Verb::Get).await {
            admitted += 1;
        }
    }
    assert_eq!(admitted, 0);
    assert!(harness.logger.has(LogLevel::Warn, "quota.actual.cache_read_failed"));
    assert!(!harness.logger.has(LogLevel::Warn, "quota.usage_unavailable"));

    let usage = harness.ledger.actual(&ctx, &harness.owm).await?;
    assert_eq!(usage.get(Verb::Get).rolling, 2_000);
    Ok(())
}

#[tokio::test]
async fn unreadable_store_fails_open() -> Result<()> {
    let ctx = RequestContext::new_tick();
    let harness = Harness::new(EARLY_MORNING)?;
    harness.seed_get(2_000, 3_600).await;
    harness.store.fail_reads(true);
    let controller = harness.controller(QuotaMode::Block);

    assert!(controller.verify(&ctx, &harness.owm, Verb::Get).await);
    assert!(harness.logger.has(LogLevel::Warn, "quota.usage_unavailable"));
    assert_eq!(harness.ledger.delta(&harness.owm, Verb::Get), 1);
    Ok(())
}

#[tokio::test]
async fn log_only_mode_raises_a_warning_when_only_the_full_day_overshoots() -> Result<()> {
    let ctx = RequestContext::new_tick();
    let harness = Harness::new(MIDDAY)?;
    // Strict: 300 + 300 * 900 / 43200 + 1 = 307 <= 500, extrapolated to 614 > 500.
    harness.seed_get(300, 3_600).await;
    let controller = harness.controller(QuotaMode::LogOnly);

    assert!(controller.verify(&ctx, &harness.owm, Verb::Get).await);
    assert_eq!(controller.alert_level(&ctx).await?, QuotaAlert::Warning);
    assert!(harness.logger.has(LogLevel::Warn, "quota.alert"));
    assert!(!harness.logger.has(LogLevel::Error, "quota.alert"));
    Ok(())
}

#[tokio::test]
async fn probabilistic_mode_follows_the_seeded_admitted_percentage() -> Result<()> {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let ctx = RequestContext::new_tick();
    let harness = Harness::new(MIDDAY)?;
    harness.seed_get(400, 3_600).await;
    let controller = harness.controller(QuotaMode::Probabilistic);

    let tuning = AdmissionTuning::default();
    let mut replay = StdRng::seed_from_u64(common::CONTROLLER_SEED);
    let mut admitted = 0_u64;
    for call in 0..200 {
        let projection = project(
            ProjectionInput {
                usage: VerbUsage {
                    rolling: 400,
                    strict: 400,
                },
                delta: admitted,
                count_quota: 500,
                cache_expiry_secs: 900,
                seconds_today: 43_200,
            },
            &tuning,
        );
        assert!(projection.strict.is_some());
        let expected = decide(
            QuotaMode::Probabilistic,
            &projection,
            500,
            replay.random::<f64>(),
        );
        let actual = controller.verify(&ctx, &harness.owm, Verb::Get).await;
        assert_eq!(actual, expected, "call {call}");
        if actual {
            admitted += 1;
        }
    }
    assert!(admitted > 0 && admitted < 200, "admitted {admitted}");
    assert_eq!(harness.ledger.delta(&harness.owm, Verb::Get), admitted);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_never_share_the_last_slot() -> Result<()> {
    let harness = Harness::new(EARLY_MORNING)?;
    harness.seed_get(480, 3_600).await;
    let controller = Arc::new(harness.controller(QuotaMode::Block));
    let owm = harness.owm.clone();

    let mut calls = tokio::task::JoinSet::new();
    for _ in 0..40 {
        let controller = Arc::clone(&controller);
        let owm = owm.clone();
        calls.spawn(async move {
            let ctx = RequestContext::new_tick();
            controller.verify(&ctx, &owm, Verb::Get).await
        });
    }
    let mut admitted = 0;
    while let Some(joined) = calls.join_next().await {
        if joined.unwrap_or(false) {
            admitted += 1;
        }
    }
    // Same boundary as the sequential case: delta may reach 13 and no further.
    assert_eq!(admitted, 14);
    assert_eq!(harness.ledger.delta(&owm, Verb::Get), 14);
    Ok(())
}

#[tokio::test]
async fn pending_delta_counts_against_the_quota() -> Result<()> {
    let ctx = RequestContext::new_tick();
    let harness = Harness::new(EARLY_MORNING)?;
    harness.seed_get(480, 3_600).await;
    let controller = harness.controller(QuotaMode::Block);

    let mut admitted = 0;
    for _ in 0..40 {
        if controller.verify(&ctx, &harness.owm, Verb::Get).await {
            admitted += 1;
        }
    }
    // 480 + 5 + delta + 1 < 500 holds while delta <= 13.
    assert_eq!(admitted, 14);
    Ok(())
}

#[test]
fn probabilistic_admission_converges_to_the_admitted_percentage() {
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    let tuning = AdmissionTuning::default();
    let projection = project(
        ProjectionInput {
            usage: VerbUsage {
                rolling: 400,
                strict: 400,
            },
            delta: 0,
            count_quota: 500,
            cache_expiry_secs: 900,
            seconds_today: 43_200,
        },
        &tuning,
    );
    let target = projection.admitted_percentage / 100.0;
    assert!(target > 0.0 && target < 1.0);

    let mut rng = StdRng::seed_from_u64(2_026);
    let trials = 10_000;
    let admitted = (0..trials)
        .filter(|_| decide(QuotaMode::Probabilistic, &projection, 500, rng.random::<f64>()))
        .count();
    let observed = admitted as f64 / f64::from(trials);
    assert!((observed - target).abs() < 0.02, "observed {observed}, target {target}");
}

proptest! {
    #[test]
    fn larger_delta_never_raises_admission(
        rolling in 0_u64..2_000,
        strict_share in 0_u64..=100,
        quota in 1_u64..2_000,
        seconds_today in 0_u64..86_400,
        delta in 0_u64..500,
        extra in 1_u64..500,
    ) {
        let tuning = AdmissionTuning::default();
        let strict = rolling * strict_share / 100;
        let at = |delta| project(
            ProjectionInput {
                usage: VerbUsage { rolling, strict },
                delta,
                count_quota: quota,
                cache_expiry_secs: 900,
                seconds_today,
            },
            &tuning,
        );
        let low = at(delta);
        let high = at(delta + extra);

        prop_assert!(high.admitted_percentage <= low.admitted_percentage);
        prop_assert!(high.projected_rolling >= low.projected_rolling);
        if decide(QuotaMode::Block, &high, quota, 0.0) {
            prop_assert!(decide(QuotaMode::Block, &low, quota, 0.0));
        }
    }

    #[test]
    fn only_block_and_probabilistic_modes_deny(
        rolling in 0_u64..5_000,
        quota in 1_u64..2_000,
        draw in 0.0_f64..1.0,
    ) {
        let projection = project(
            ProjectionInput {
                usage: VerbUsage { rolling, strict: rolling },
                delta: 0,
                count_quota: quota,
                cache_expiry_secs: 900,
                seconds_today: 3_600,
            },
            &AdmissionTuning::default(),
        );
        prop_assert!(decide(QuotaMode::Disabled, &projection, quota, draw));
        prop_assert!(decide(QuotaMode::LogOnly, &projection, quota, draw));
        prop_assert_eq!(
            decide(QuotaMode::Block, &projection, quota, draw),
            projection.projected_rolling < quota
        );
    }
}

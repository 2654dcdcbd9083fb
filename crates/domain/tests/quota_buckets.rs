//! Integration coverage for quota values and bucket arithmetic.

use chrono::{DateTime, FixedOffset, TimeDelta, Utc};
use proptest::prelude::*;
use stratus_domain::{
    PrimitiveError, QuotaMode, SECONDS_PER_DAY, ServiceId, local_midnight, quota_bucket,
    seconds_since_local_midnight,
};
use stratus_shared::ErrorEnvelope;

#[test]
fn primitive_errors_map_into_error_envelopes() -> Result<(), PrimitiveError> {
    let Err(error) = ServiceId::parse(" ") else {
        return Err(PrimitiveError::EmptyServiceId { input_length: 0 });
    };

    let envelope: ErrorEnvelope = error.into();
    assert_eq!(envelope.code.namespace(), "domain");
    assert_eq!(envelope.code.code(), "invalid_service_id");
    assert_eq!(
        envelope.metadata.get("input_length"),
        Some(&"1".to_string())
    );

    let Err(mode_error) = QuotaMode::try_from(7) else {
        return Err(PrimitiveError::UnknownQuotaMode { value: 7 });
    };
    let envelope: ErrorEnvelope = mode_error.into();
    assert_eq!(envelope.code.code(), "unknown_quota_mode");
    assert_eq!(envelope.metadata.get("value"), Some(&"7".to_string()));

    Ok(())
}

#[test]
fn quota_mode_deserializes_from_numbers() -> Result<(), serde_json::Error> {
    let mode: QuotaMode = serde_json::from_str("3")?;
    assert_eq!(mode, QuotaMode::Probabilistic);
    assert!(serde_json::from_str::<QuotaMode>("4").is_err());
    Ok(())
}

fn timestamp(seconds: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(seconds, 0).unwrap_or_default()
}

proptest! {
    #[test]
    fn quota_bucket_is_aligned_floor(seconds in 0i64..4_000_000_000) {
        let ts = timestamp(seconds);
        let bucket = quota_bucket(ts);
        prop_assert!(bucket <= ts);
        prop_assert!(ts - bucket < TimeDelta::seconds(600));
        prop_assert_eq!(bucket.timestamp().rem_euclid(600), 0);
    }

    #[test]
    fn local_midnight_precedes_now_within_a_day(
        seconds in 0i64..4_000_000_000,
        offset_hours in -12i32..=14,
    ) {
        let Some(offset) = FixedOffset::east_opt(offset_hours * 3_600) else {
            return Err(TestCaseError::fail("offset out of range"));
        };
        let now = timestamp(seconds);
        let midnight = local_midnight(now, offset);
        prop_assert!(midnight <= now);
        prop_assert!(now - midnight < TimeDelta::days(1));
        let elapsed = seconds_since_local_midnight(now, offset);
        prop_assert!((0..SECONDS_PER_DAY).contains(&elapsed));
    }
}

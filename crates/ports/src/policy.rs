//! Quota policy boundary contract.

use stratus_domain::{QuotaLimits, ServiceId, Verb};

/// Static `(service, verb)` quota table.
pub trait QuotaPolicyPort: Send + Sync {
    /// Limits for the pair; `None` means no quota applies.
    fn limits(&self, service: &ServiceId, verb: Verb) -> Option<QuotaLimits>;

    /// Services with at least one configured limit.
    fn services(&self) -> Vec<ServiceId>;
}

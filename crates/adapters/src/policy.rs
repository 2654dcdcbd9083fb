//! Quota policy backed by the resolved configuration table.

use stratus_config::PolicyTable;
use stratus_ports::{QuotaLimits, QuotaPolicyPort, ServiceId, Verb};

/// Policy answering from a `PolicyTable` resolved at config validation.
#[derive(Debug, Clone, Default)]
pub struct ConfigPolicy {
    table: PolicyTable,
}

impl ConfigPolicy {
    /// Wrap a resolved table.
    #[must_use]
    pub const fn new(table: PolicyTable) -> Self {
        Self { table }
    }

    /// Underlying table.
    #[must_use]
    pub const fn table(&self) -> &PolicyTable {
        &self.table
    }
}

impl QuotaPolicyPort for ConfigPolicy {
    fn limits(&self, service: &ServiceId, verb: Verb) -> Option<QuotaLimits> {
        self.table.limits(service, verb)
    }

    fn services(&self) -> Vec<ServiceId> {
        self.table.services()
    }
}

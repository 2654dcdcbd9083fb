//! Built-in quota plan catalog and the resolved policy table.
//!
//! Each weather provider publishes a handful of subscription tiers. The catalog maps
//! `service -> plan -> verb -> {count, rate}`; the config picks one plan per service
//! and may add custom services. Resolution happens once, at validation time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use stratus_domain::{QuotaLimits, ServiceId, Verb};

/// Per-verb limits of one plan. Verbs absent from the map carry no quota.
pub type PlanLimits = BTreeMap<Verb, QuotaLimits>;

/// Plans offered by one service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServicePlans {
    /// Human-readable provider name.
    pub display_name: Box<str>,
    /// Plan used when the config does not choose one.
    pub default_plan: Box<str>,
    /// Plans by name.
    pub plans: BTreeMap<Box<str>, PlanLimits>,
}

/// Catalog of every known service and its plans.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PlanCatalog {
    services: BTreeMap<ServiceId, ServicePlans>,
}

impl PlanCatalog {
    /// The catalog shipped with stratus.
    #[must_use]
    pub fn builtin() -> Self {
        let mut catalog = Self::default();
        catalog.insert(
            "owm",
            "OpenWeatherMap",
            "free",
            &[
                ("free", &[(Verb::Get, 1_000, 60)]),
                ("startup", &[(Verb::Get, 30_000, 600)]),
                ("developer", &[(Verb::Get, 100_000, 3_000)]),
                ("professional", &[(Verb::Get, 1_000_000, 30_000)]),
            ],
        );
        catalog.insert(
            "wug",
            "Weather Underground",
            "pws-contributor",
            &[
                ("pws-contributor", &[(Verb::Get, 1_500, 30)]),
                ("commercial", &[(Verb::Get, 50_000, 300)]),
            ],
        );
        catalog.insert(
            "netatmo",
            "Netatmo",
            "standard",
            &[("standard", &[(Verb::Get, 12_000, 50), (Verb::Post, 1_000, 10)])],
        );
        catalog.insert(
            "pws",
            "PWS Weather",
            "contributor",
            &[
                ("contributor", &[(Verb::Get, 1_000, 10), (Verb::Post, 0, 2)]),
                ("premium", &[(Verb::Get, 10_000, 100), (Verb::Post, 0, 10)]),
            ],
        );
        catalog.insert(
            "wow",
            "Met Office WOW",
            "observer",
            &[("observer", &[(Verb::Get, 0, 0), (Verb::Post, 1_440, 1)])],
        );
        catalog
    }

    fn insert(
        &mut self,
        service: &str,
        display_name: &str,
        default_plan: &str,
        plans: &[(&str, &[(Verb, u64, u64)])],
    ) {
        let Ok(service) = ServiceId::parse(service) else {
            return;
        };
        let plans = plans
            .iter()
            .map(|(name, limits)| {
                let limits = limits
                    .iter()
                    .map(|(verb, count, rate)| (*verb, QuotaLimits::new(*count, *rate)))
                    .collect();
                ((*name).to_owned().into_boxed_str(), limits)
            })
            .collect();
        self.services.insert(
            service,
            ServicePlans {
                display_name: display_name.to_owned().into_boxed_str(),
                default_plan: default_plan.to_owned().into_boxed_str(),
                plans,
            },
        );
    }

    /// Plans of `service`.
    #[must_use]
    pub fn service(&self, service: &ServiceId) -> Option<&ServicePlans> {
        self.services.get(service)
    }

    /// Limits of `plan` for `service`.
    #[must_use]
    pub fn plan(&self, service: &ServiceId, plan: &str) -> Option<&PlanLimits> {
        self.services.get(service)?.plans.get(plan)
    }

    /// Every known service, sorted.
    pub fn services(&self) -> impl Iterator<Item = (&ServiceId, &ServicePlans)> {
        self.services.iter()
    }
}

/// Resolved `(service, verb) -> limits` table derived from config.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(transparent)]
pub struct PolicyTable {
    entries: BTreeMap<ServiceId, PlanLimits>,
}

impl PolicyTable {
    /// Build from explicit entries.
    #[must_use]
    pub const fn new(entries: BTreeMap<ServiceId, PlanLimits>) -> Self {
        Self { entries }
    }

    /// Limits of the pair; `None` when the service or verb has no quota entry.
    #[must_use]
    pub fn limits(&self, service: &ServiceId, verb: Verb) -> Option<QuotaLimits> {
        self.entries.get(service)?.get(&verb).copied()
    }

    /// Services in the table, sorted.
    #[must_use]
    pub fn services(&self) -> Vec<ServiceId> {
        self.entries.keys().cloned().collect()
    }

    /// Number of services.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true when no service is configured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

//! Quota value types: verbs, per-verb maps, limits, modes, alerts, usage.

use crate::PrimitiveError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// HTTP verb of an outbound call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verb {
    /// GET
    Get,
    /// POST
    Post,
    /// PUT
    Put,
    /// PATCH
    Patch,
    /// DELETE
    Delete,
}

impl Verb {
    /// Every verb, in column order.
    pub const ALL: [Self; 5] = [Self::Get, Self::Post, Self::Put, Self::Patch, Self::Delete];

    /// Uppercase wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }

    /// Lowercase storage column name.
    #[must_use]
    pub const fn column(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Post => "post",
            Self::Put => "put",
            Self::Patch => "patch",
            Self::Delete => "delete",
        }
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str(self.as_str())
    }
}

impl FromStr for Verb {
    type Err = PrimitiveError;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let normalized = input.trim().to_ascii_uppercase();
        Self::ALL
            .into_iter()
            .find(|verb| verb.as_str() == normalized)
            .ok_or(PrimitiveError::UnknownVerb { input: normalized })
    }
}

/// One value per verb.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE", default)]
pub struct VerbMap<T> {
    /// GET value.
    pub get: T,
    /// POST value.
    pub post: T,
    /// PUT value.
    pub put: T,
    /// PATCH value.
    pub patch: T,
    /// DELETE value.
    pub delete: T,
}

impl<T> VerbMap<T> {
    /// Build a map by evaluating `op` for every verb.
    pub fn from_fn(mut op: impl FnMut(Verb) -> T) -> Self {
        Self {
            get: op(Verb::Get),
            post: op(Verb::Post),
            put: op(Verb::Put),
            patch: op(Verb::Patch),
            delete: op(Verb::Delete),
        }
    }

    /// Borrow the value for `verb`.
    #[must_use]
    pub const fn get(&self, verb: Verb) -> &T {
        match verb {
            Verb::Get => &self.get,
            Verb::Post => &self.post,
            Verb::Put => &self.put,
            Verb::Patch => &self.patch,
            Verb::Delete => &self.delete,
        }
    }

    /// Mutably borrow the value for `verb`.
    pub const fn get_mut(&mut self, verb: Verb) -> &mut T {
        match verb {
            Verb::Get => &mut self.get,
            Verb::Post => &mut self.post,
            Verb::Put => &mut self.put,
            Verb::Patch => &mut self.patch,
            Verb::Delete => &mut self.delete,
        }
    }

    /// Iterate `(verb, value)` pairs in column order.
    pub fn iter(&self) -> impl Iterator<Item = (Verb, &T)> {
        Verb::ALL.into_iter().map(|verb| (verb, self.get(verb)))
    }

    /// Transform every value.
    pub fn map<U>(&self, mut op: impl FnMut(Verb, &T) -> U) -> VerbMap<U> {
        VerbMap::from_fn(|verb| op(verb, self.get(verb)))
    }
}

impl VerbMap<u64> {
    /// Sum across verbs.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.iter().map(|(_, value)| *value).sum()
    }

    /// Returns true when every verb count is zero.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.iter().all(|(_, value)| *value == 0)
    }

    /// Add `other` into `self`, verb by verb.
    pub fn add_assign(&mut self, other: &Self) {
        for verb in Verb::ALL {
            let slot = self.get_mut(verb);
            *slot = slot.saturating_add(*other.get(verb));
        }
    }
}

/// Limits for one `(service, verb)` pair. Zero means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaLimits {
    /// Calls allowed per 24 hours.
    pub count: u64,
    /// Calls allowed per minute.
    pub rate: u64,
}

impl QuotaLimits {
    /// Build limits from raw values.
    #[must_use]
    pub const fn new(count: u64, rate: u64) -> Self {
        Self { count, rate }
    }

    /// Returns true when no count quota applies.
    #[must_use]
    pub const fn is_unlimited(&self) -> bool {
        self.count == 0
    }
}

/// How the admission controller enforces count quotas.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum QuotaMode {
    /// No enforcement.
    Disabled,
    /// Never block; raise alerts only.
    #[default]
    LogOnly,
    /// Deny once the rolling projection reaches the quota.
    Block,
    /// Admit with the strict-window admitted percentage as probability.
    Probabilistic,
}

impl QuotaMode {
    /// Numeric mode value.
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Disabled => 0,
            Self::LogOnly => 1,
            Self::Block => 2,
            Self::Probabilistic => 3,
        }
    }

    /// Returns true when the mode can deny calls.
    #[must_use]
    pub const fn may_deny(self) -> bool {
        matches!(self, Self::Block | Self::Probabilistic)
    }
}

impl TryFrom<u8> for QuotaMode {
    type Error = PrimitiveError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Disabled),
            1 => Ok(Self::LogOnly),
            2 => Ok(Self::Block),
            3 => Ok(Self::Probabilistic),
            _ => Err(PrimitiveError::UnknownQuotaMode { value }),
        }
    }
}

impl From<QuotaMode> for u8 {
    fn from(mode: QuotaMode) -> Self {
        mode.as_u8()
    }
}

/// Admin-visible alert raised by log-only admission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuotaAlert {
    /// Nothing to report.
    #[default]
    None,
    /// Full-day projection exceeds the quota.
    Warning,
    /// Quota already (or about to be) exceeded.
    Error,
}

impl QuotaAlert {
    /// Numeric alert level (0, 1, 2).
    #[must_use]
    pub const fn level(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Warning => 1,
            Self::Error => 2,
        }
    }

    /// Parse a numeric level; anything above 2 saturates to `Error`.
    #[must_use]
    pub const fn from_level(level: u64) -> Self {
        match level {
            0 => Self::None,
            1 => Self::Warning,
            _ => Self::Error,
        }
    }
}

/// Usage of one verb over both windows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerbUsage {
    /// Calls in the trailing 24 hours.
    pub rolling: u64,
    /// Calls since local midnight.
    pub strict: u64,
}

/// Persisted usage of a service, per verb.
pub type ActualUsage = VerbMap<VerbUsage>;

//! Status and per-apply reporting structures returned to the host.

use serde::{Deserialize, Serialize};

use crate::identifiers::{IdentityCategory, SpoofedIdentifiers};

/// Result of a status query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpoofStatus {
    /// Whether spoofing is currently observable by the target.
    pub active: bool,
    /// The applied identifier set, present only while active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifiers: Option<SpoofedIdentifiers>,
}

/// What happened to one identifier category during an apply call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CategoryOutcome {
    /// The category is wired to an installed interception and is now
    /// being rewritten.
    Applied,
    /// The category was empty (or gated off by policy) and was left alone.
    Skipped,
    /// The category has no effective rewrite at this layer.
    Unsupported,
}

/// Per-category accounting for one apply call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryReport {
    pub category: IdentityCategory,
    pub outcome: CategoryOutcome,
}

/// Overall result of an apply call.
///
/// `success` is false when the call failed outright (called before
/// initialize, or the interception install did not commit); per-category
/// outcomes are only reported for calls that got as far as installing.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyReport {
    pub success: bool,
    #[serde(default)]
    pub categories: Vec<CategoryReport>,
}

impl ApplyReport {
    /// Report for a call that failed before any category was attempted.
    pub fn failure() -> Self {
        Self::default()
    }

    /// The recorded outcome for `category`, if the call got that far.
    pub fn outcome(&self, category: IdentityCategory) -> Option<CategoryOutcome> {
        self.categories
            .iter()
            .find(|report| report.category == category)
            .map(|report| report.outcome)
    }
}

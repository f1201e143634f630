//! Cleanup rules, from their textual expressions
//! to the single disposition applied to a domain.

pub mod expression;
pub mod manager;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumIter, EnumString};

pub use self::expression::{CompiledRule, RuleReport};
pub use self::manager::{CleanupRequest, CleanupTrigger, RuleManager, RuleOptions, RuleSnapshot,
    report_all};

/// When the data of a domain is purged.
/// The derived ordering is the declaration order shown to users,
/// matching rules are resolved with [CleanupType::precedence] instead.
#[derive(
    Clone, Copy, Debug, Deserialize, Display, EnumIter, EnumString,
    Eq, Hash, Ord, PartialEq, PartialOrd, Serialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum CleanupType { Never, Startup, Leave, Instantly }

impl CleanupType {
    /// Rank among matching rules, higher wins:
    /// `INSTANTLY > LEAVE > NEVER > STARTUP`.
    pub fn precedence(self) -> u8 {
        match self {
            CleanupType::Startup => 0,
            CleanupType::Never => 1,
            CleanupType::Leave => 2,
            CleanupType::Instantly => 3,
        }
    }
}

/// A rule as the user or a temporary grant defined it.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RuleDefinition {
    pub expression: String,
    pub cleanup_type: CleanupType,
    #[serde(default)]
    pub temporary: bool,
}

impl RuleDefinition {
    pub fn new(expression: &str, cleanup_type: CleanupType) -> Self {
        Self { expression: String::from(expression), cleanup_type, temporary: false }
    }

    pub fn temporary(expression: &str, cleanup_type: CleanupType) -> Self {
        Self { temporary: true, ..Self::new(expression, cleanup_type) }
    }
}

//! All preferences handed over by the settings store.

use std::time::Duration;

use derivative::Derivative;
use serde::{Deserialize, Serialize};

use crate::rule::{CleanupType, RuleDefinition};

/// All preferences handed over by the settings store,
/// the store persists them, this crate only reads them.
#[derive(Clone, Debug, Derivative, Deserialize, Serialize)]
#[derivative(Default)]
#[serde(default)]
pub struct Preferences {
    pub rules: Vec<RuleDefinition>,
    #[derivative(Default(value = "CleanupType::Leave"))]
    pub fallback_rule: CleanupType,
    #[derivative(Default(value = "true"))]
    pub whitelist_file_system: bool,
    pub whitelist_no_tld: bool,
    pub protect_open_domains: ProtectOpenDomains,
    #[derivative(Default(value = "15"))]
    pub leave_delay_seconds: u64,
    pub snoozing: bool,
}

impl Preferences {
    pub fn leave_delay(&self) -> Duration {
        Duration::from_secs(self.leave_delay_seconds)
    }
}

/// Whether domains open in a tab are kept by the cleanups
/// that do not originate from leaving a domain.
#[derive(Clone, Debug, Derivative, Deserialize, Eq, PartialEq, Serialize)]
#[derivative(Default)]
#[serde(default)]
pub struct ProtectOpenDomains {
    #[derivative(Default(value = "true"))]
    pub startup: bool,
    #[derivative(Default(value = "true"))]
    pub manual: bool,
}

#[cfg(test)]
mod test {
    use serde_assert::{Deserializer, Token};

    use super::*;

    #[test]
    fn test_missing_fields_take_defaults() {
        let mut deserializer = Deserializer::builder([
            Token::Struct { name: "Preferences", len: 2 },
            Token::Field("whitelist_no_tld"),
            Token::Bool(true),
            Token::Field("protect_open_domains"),
            Token::Struct { name: "ProtectOpenDomains", len: 1 },
            Token::Field("manual"),
            Token::Bool(false),
            Token::StructEnd,
            Token::StructEnd,
        ]).build();
        let preferences = Preferences::deserialize(&mut deserializer)
            .expect("deserializable preferences");
        assert!(preferences.whitelist_no_tld);
        assert!(preferences.whitelist_file_system);
        assert_eq!(preferences.fallback_rule, CleanupType::Leave);
        assert_eq!(preferences.protect_open_domains,
            ProtectOpenDomains { startup: true, manual: false });
        assert_eq!(preferences.leave_delay(), Duration::from_secs(15));
        assert!(preferences.rules.is_empty());
    }
}

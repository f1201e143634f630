use std::cmp::Ordering;
use std::collections::BTreeSet;

use strum::IntoEnumIterator;
use strum_macros::EnumIter;

use super::EncodedDomain;
use crate::util::errors::CustomError;

/// Finds the longest public suffix that `domain` ends with,
/// returning the number of labels of that suffix.
/// An exclusion entry shortens the suffix by its leftmost label,
/// and no matching entry means the top level domain alone.
pub fn suffix_level(set: &BTreeSet<Suffix>, domain: &EncodedDomain) -> usize {
    let mut level = 1;
    let mut candidate = Some(domain.clone());
    while let Some(current) = candidate {
        let current_level = current.level();
        let parent = current.parent();
        if set.contains(&Suffix::new(SuffixType::Exclusion, current.clone())) {
            return level.max(current_level - 1);
        }
        let globbed = parent.as_ref().is_some_and(|parent| {
            set.contains(&Suffix::new(SuffixType::Glob, parent.clone()))
        });
        if current_level > level
            && (globbed || set.contains(&Suffix::new(SuffixType::Normal, current.clone())))
        {
            level = current_level;
        }
        candidate = parent;
    }
    level
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Suffix { suffix_type: SuffixType, domain: EncodedDomain }

impl Suffix {
    pub fn new(suffix_type: SuffixType, domain: EncodedDomain) -> Self {
        Self { suffix_type, domain }
    }

    pub fn raw(&self) -> String {
        format!("{}{}", self.suffix_type.prefix(), self.domain.raw())
    }

    pub fn suffix_type(&self) -> &SuffixType { &self.suffix_type }
}

impl TryFrom<&str> for Suffix {
    type Error = CustomError;

    /// Parses a list entry, `*.` marks a glob and `!` an exclusion.
    /// Fails for entries with empty labels or that cannot be encoded.
    fn try_from(entry: &str) -> Result<Self, Self::Error> {
        let (suffix_type, domain) = SuffixType::iter()
            .find_map(|suffix_type| entry.strip_prefix(suffix_type.prefix())
                .filter(|_| suffix_type != SuffixType::Normal)
                .map(|domain| (suffix_type, domain)))
            .unwrap_or((SuffixType::Normal, entry));
        if domain.split('.').any(str::is_empty) {
            return Err(CustomError::InvalidSuffix { suffix: String::from(entry) });
        }
        Ok(Self { suffix_type, domain: EncodedDomain::try_from(domain)? })
    }
}

impl PartialOrd for Suffix {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
impl Ord for Suffix {
    fn cmp(&self, other: &Self) -> Ordering {
        self.domain.cmp(&other.domain)
            .then(self.suffix_type.cmp(&other.suffix_type))
    }
}

#[derive(Clone, Debug, EnumIter, Eq, Ord, PartialEq, PartialOrd)]
pub enum SuffixType { Exclusion, Normal, Glob }

impl SuffixType {
    fn prefix(&self) -> &'static str {
        match self {
            SuffixType::Exclusion => "!",
            SuffixType::Normal => "",
            SuffixType::Glob => "*.",
        }
    }
}

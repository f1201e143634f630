//! Domains as ASCII labels, for rule patterns and first-party grouping.

pub mod psl;
pub mod suffix;

use std::cmp::Ordering;
use std::net::IpAddr;

/// Domain that can be encoded as an international domain name.
/// Equality and ordering only consider the encoded form.
#[derive(Clone, Debug, Eq)]
pub struct EncodedDomain {
    encoded: String,
    raw: String,
}

impl EncodedDomain {
    /// Punycode and lowercase form.
    pub fn encoded(&self) -> &str { &self.encoded }

    /// The domain as it was given.
    pub fn raw(&self) -> &str { &self.raw }

    /// Labels from the top level domain down.
    pub fn labels_from_top(&self) -> impl Iterator<Item = &str> {
        self.encoded.split('.').rev()
    }

    pub fn level(&self) -> usize { self.encoded.split('.').count() }

    /// The domain without its leftmost label,
    /// [None] for a top level domain.
    pub fn parent(&self) -> Option<Self> {
        let (_, encoded) = self.encoded.split_once('.')?;
        let raw = self.raw.split_once('.').map_or(encoded, |(_, raw)| raw);
        Some(Self { encoded: String::from(encoded), raw: String::from(raw) })
    }

    /// The rightmost `level` labels, the whole domain if it has fewer.
    pub fn truncate(&self, level: usize) -> &str {
        let skipped = self.level().saturating_sub(level);
        self.encoded.splitn(skipped + 1, '.').last().unwrap_or(self.encoded.as_str())
    }

    pub fn is_ip_address(&self) -> bool {
        self.encoded.parse::<IpAddr>().is_ok()
    }
}

impl TryFrom<&str> for EncodedDomain {
    type Error = idna::Errors;

    /// Encodes a hostname, single labels included.
    /// Fails with [idna::Errors] for empty labels or disallowed code points.
    fn try_from(value: &str) -> Result<Self, Self::Error> {
        // strict mode rejects single labels, so encode under a known parent
        let encoded = idna::domain_to_ascii_strict(&format!("{value}.example"))?;
        let encoded = encoded.strip_suffix(".example").unwrap_or(encoded.as_str());
        Ok(Self { encoded: String::from(encoded), raw: String::from(value) })
    }
}

impl PartialEq for EncodedDomain {
    fn eq(&self, other: &Self) -> bool { self.encoded == other.encoded }
}

impl PartialOrd for EncodedDomain {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> { Some(self.cmp(other)) }
}

impl Ord for EncodedDomain {
    /// Sibling domains sort next to each other.
    fn cmp(&self, other: &Self) -> Ordering {
        self.labels_from_top().cmp(other.labels_from_top())
    }
}

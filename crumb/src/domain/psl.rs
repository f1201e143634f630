use std::collections::BTreeSet;

use async_std::io::prelude::*;
use chrono::naive::NaiveDate;

use super::EncodedDomain;
use super::suffix::{self, Suffix};
use crate::util::errors::CustomError;

/// Public suffix list, used for grouping hostnames by first-party domain.
#[derive(Default)]
pub struct Psl { last_updated: NaiveDate, set: BTreeSet<Suffix> }

impl Psl {
    /// Reads the list in its published format, one entry per line,
    /// skipping comments and blank lines.
    /// Fails if the stream cannot be read or an entry is not a valid suffix.
    pub async fn from_stream<T>(stream: &mut T, last_updated: NaiveDate)
    -> Result<Self, CustomError>
    where T: BufRead + Unpin {
        let mut set = BTreeSet::default();
        let mut buf = String::new();
        while let 1.. = stream.read_line(&mut buf).await
            .map_err(|error| CustomError::IoError(error.kind()))? {
            let entry = buf.trim();
            if !(entry.starts_with("//") || entry.is_empty()) {
                let entry = entry.split_whitespace().next()
                    .expect("non-empty trimmed line has a word");
                set.insert(Suffix::try_from(entry)?);
            }
            buf.clear();
        }
        Ok(Self { last_updated, set })
    }

    /// Registrable part of a hostname (eTLD+1).
    /// Hosts that are a public suffix themselves, single labels and
    /// IP addresses are their own first-party domain, as are hostnames
    /// that cannot be encoded.
    pub fn first_party_domain(&self, hostname: &str) -> String {
        let Ok(domain) = EncodedDomain::try_from(hostname) else {
            return String::from(hostname);
        };
        if domain.is_ip_address() { return String::from(domain.encoded()); }
        let registrable_level = suffix::suffix_level(&self.set, &domain) + 1;
        if registrable_level > domain.level() { return String::from(domain.encoded()); }
        String::from(domain.truncate(registrable_level))
    }

    pub fn len(&self) -> usize { self.set.len() }
    pub fn is_empty(&self) -> bool { self.set.is_empty() }
    pub fn last_updated(&self) -> NaiveDate { self.last_updated }
}

//! Compilation of rule expressions of the form `container?cookie@domain`,
//! where only the domain pattern is mandatory.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::{CleanupType, RuleDefinition};
use crate::domain::EncodedDomain;
use crate::interop::contextual_identities::{self, ContextualIdentity, CookieStoreId};
use crate::util::errors::CustomError;

/// Conservative cookie name token, the separators of RFC 6265 excluded.
static COOKIE_NAME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[!#$%&'*+\-.^_`|~0-9A-Za-z]+$").expect("valid cookie name pattern")
});

/// Label of an encoded domain, letters, digits and inner dashes.
static DOMAIN_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9](?:[a-z0-9-]*[a-z0-9])?$").expect("valid label pattern")
});

/// The three textual parts of an expression, before validation.
#[derive(Debug, Eq, PartialEq)]
pub struct RuleExpression<'a> {
    pub container: Option<&'a str>,
    pub cookie_name: Option<&'a str>,
    pub domain_pattern: &'a str,
}

impl<'a> RuleExpression<'a> {
    /// Splits off the container before the first `?`,
    /// then the cookie name before the last `@`.
    pub fn split(expression: &'a str) -> Self {
        let (container, rest) = match expression.split_once('?') {
            Some((container, rest)) => (Some(container), rest),
            None => (None, expression),
        };
        let (cookie_name, domain_pattern) = match rest.rsplit_once('@') {
            Some((cookie_name, domain_pattern)) => (Some(cookie_name), domain_pattern),
            None => (None, rest),
        };
        Self { container, cookie_name, domain_pattern }
    }
}

/// Where a valid rule applies.
#[derive(Debug)]
pub struct RuleScope {
    matcher: Regex,
    cookie_store_id: Option<CookieStoreId>,
    cookie_name: Option<String>,
}

impl RuleScope {
    pub fn matches_domain(&self, domain: &str) -> bool {
        self.matcher.is_match(domain)
    }
    pub fn cookie_store_id(&self) -> Option<&CookieStoreId> {
        self.cookie_store_id.as_ref()
    }
    /// Lowercased cookie name.
    pub fn cookie_name(&self) -> Option<&str> {
        self.cookie_name.as_deref()
    }
}

/// A rule definition with its expression compiled.
/// A rule that fails to compile keeps the rendered error
/// and never matches any domain.
#[derive(Debug)]
pub struct CompiledRule {
    definition: RuleDefinition,
    scope: Result<RuleScope, String>,
}

impl CompiledRule {
    /// Compiles a definition against the currently known identities.
    pub fn compile(definition: RuleDefinition, identities: &[ContextualIdentity]) -> Self {
        let scope = compile_scope(&definition.expression, identities)
            .map_err(|error| error.to_string());
        if let Err(error) = &scope {
            log::warn!("rule `{}` is ignored: {error}", definition.expression);
        }
        Self { definition, scope }
    }

    pub fn definition(&self) -> &RuleDefinition { &self.definition }
    pub fn expression(&self) -> &str { &self.definition.expression }
    pub fn cleanup_type(&self) -> CleanupType { self.definition.cleanup_type }
    pub fn is_temporary(&self) -> bool { self.definition.temporary }

    pub fn scope(&self) -> Option<&RuleScope> { self.scope.as_ref().ok() }
    pub fn compile_error(&self) -> Option<&str> { self.scope.as_ref().err().map(String::as_str) }

    pub fn report(&self) -> RuleReport {
        RuleReport {
            expression: String::from(self.expression()),
            cleanup_type: self.cleanup_type(),
            temporary: self.is_temporary(),
            error: self.compile_error().map(String::from),
        }
    }
}

/// Serializable view of a compiled rule for listings.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct RuleReport {
    pub expression: String,
    pub cleanup_type: CleanupType,
    pub temporary: bool,
    pub error: Option<String>,
}

fn compile_scope(expression: &str, identities: &[ContextualIdentity])
-> Result<RuleScope, CustomError> {
    let invalid = |reason: &str| CustomError::InvalidExpression {
        expression: String::from(expression), reason: String::from(reason)
    };
    let parts = RuleExpression::split(expression.trim());
    let cookie_store_id = match parts.container {
        Some(name) => Some(contextual_identities::resolve_by_name(identities, name)
            .cloned()
            .ok_or(CustomError::UnknownContainer { name: String::from(name) })?),
        None => None,
    };
    let cookie_name = match parts.cookie_name {
        Some(name) if COOKIE_NAME.is_match(name) => Some(name.to_lowercase()),
        Some(_) => return Err(invalid("cookie name has invalid characters")),
        None => None,
    };
    let matcher = domain_matcher(parts.domain_pattern).ok_or_else(|| {
        invalid("domain pattern has an invalid label")
    })?;
    Ok(RuleScope { matcher, cookie_store_id, cookie_name })
}

/// Builds the matcher of a domain pattern.
/// A leftmost `*` matches zero or more labels, `*` elsewhere exactly one,
/// and literal labels match exactly after encoding.
/// Returns [None] if a label is invalid.
fn domain_matcher(pattern: &str) -> Option<Regex> {
    if pattern == "*" {
        return Some(Regex::new("^.*$").expect("valid catch-all pattern"));
    }
    let mut source = String::from("^");
    for (index, label) in pattern.split('.').enumerate() {
        if label == "*" {
            source.push_str(if index == 0 { r"(?:[^.]+\.)*" } else { r"[^.]+\." });
            continue;
        }
        let encoded = EncodedDomain::try_from(label).ok()?;
        if !DOMAIN_LABEL.is_match(encoded.encoded()) { return None; }
        source.push_str(&regex::escape(encoded.encoded()));
        source.push_str(r"\.");
    }
    let source = source.strip_suffix(r"\.")?;
    Regex::new(&format!("{source}$")).ok()
}

//! Resolution of the compiled rule set into cleanup decisions.

use std::sync::Arc;

use arc_swap::ArcSwap;
use derivative::Derivative;
use serde::{Deserialize, Serialize};

use super::expression::RuleReport;
use super::{CleanupType, CompiledRule, RuleDefinition};
use crate::interop::contextual_identities::{ContextualIdentity, CookieStoreId};
use crate::preferences::{Preferences, ProtectOpenDomains};
use crate::tab::watcher::TabWatcher;
use crate::util;

/// Settings that shape the resolution besides the rules themselves.
#[derive(Clone, Debug, Derivative)]
#[derivative(Default)]
pub struct RuleOptions {
    #[derivative(Default(value = "CleanupType::Leave"))]
    pub fallback_rule: CleanupType,
    pub protect_open_domains: ProtectOpenDomains,
    #[derivative(Default(value = "true"))]
    pub whitelist_file_system: bool,
    pub whitelist_no_tld: bool,
}

impl From<&Preferences> for RuleOptions {
    fn from(preferences: &Preferences) -> Self {
        Self {
            fallback_rule: preferences.fallback_rule,
            protect_open_domains: preferences.protect_open_domains.clone(),
            whitelist_file_system: preferences.whitelist_file_system,
            whitelist_no_tld: preferences.whitelist_no_tld,
        }
    }
}

/// What caused a cleaner to ask whether a domain should be cleaned.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CleanupTrigger { Startup, Manual, Leave, Instantly }

/// A cleaner's question about one domain, and optionally one cookie.
#[derive(Clone, Debug)]
pub struct CleanupRequest<'a> {
    pub domain: &'a str,
    pub cookie_store_id: &'a CookieStoreId,
    pub cookie_name: Option<&'a str>,
    pub trigger: CleanupTrigger,
}

/// Immutable compiled state, replaced as a whole on every update.
#[derive(Debug, Default)]
pub struct RuleSnapshot {
    options: RuleOptions,
    rules: Vec<CompiledRule>,
    /// Indices of rules that compiled.
    matching: Vec<usize>,
    /// Indices of rules that compiled and have no cookie scope.
    domain_only: Vec<usize>,
}

impl RuleSnapshot {
    pub fn new(definitions: &[RuleDefinition], options: RuleOptions,
        identities: &[ContextualIdentity]) -> Self {
        let rules = definitions.iter().cloned()
            .map(|definition| CompiledRule::compile(definition, identities))
            .collect::<Vec<CompiledRule>>();
        let matching = (0..rules.len())
            .filter(|&index| rules[index].scope().is_some())
            .collect::<Vec<usize>>();
        let domain_only = matching.iter().copied()
            .filter(|&index| rules[index].scope()
                .is_some_and(|scope| scope.cookie_name().is_none()))
            .collect();
        Self { options, rules, matching, domain_only }
    }

    pub fn options(&self) -> &RuleOptions { &self.options }

    /// Every rule, including those that failed to compile.
    pub fn all_rules(&self) -> &[CompiledRule] { &self.rules }

    pub fn temporary_rules(&self) -> impl Iterator<Item = &CompiledRule> {
        self.rules.iter().filter(|rule| rule.is_temporary())
    }

    /// Valid rules among `candidates` whose pattern matches the domain,
    /// narrowed to the given store if any of them is scoped to it,
    /// otherwise to the rules without a store scope.
    fn store_narrowed<'a>(&'a self, candidates: &'a [usize], domain: &str,
        cookie_store_id: Option<&CookieStoreId>) -> Vec<&'a CompiledRule> {
        let matched = candidates.iter()
            .map(|&index| &self.rules[index])
            .filter(|rule| rule.scope().is_some_and(|scope| scope.matches_domain(domain)))
            .collect::<Vec<&CompiledRule>>();
        let in_store = |rule: &&CompiledRule| rule.scope()
            .and_then(|scope| scope.cookie_store_id()) == cookie_store_id;
        let scoped = cookie_store_id.is_some() && matched.iter().any(in_store);
        matched.into_iter()
            .filter(|rule| if scoped { in_store(rule) } else {
                rule.scope().is_some_and(|scope| scope.cookie_store_id().is_none())
            })
            .collect()
    }

    /// Rules deciding the query after store and then cookie narrowing.
    pub fn matching_rules(&self, domain: &str, cookie_store_id: Option<&CookieStoreId>,
        cookie_name: Option<&str>) -> Vec<&CompiledRule> {
        let candidates = if cookie_name.is_some() { &self.matching } else { &self.domain_only };
        let rules = self.store_narrowed(candidates, domain, cookie_store_id);
        let cookie_name = cookie_name.map(str::to_lowercase);
        let for_cookie = |rule: &&CompiledRule| cookie_name.is_some()
            && rule.scope().and_then(|scope| scope.cookie_name()) == cookie_name.as_deref();
        let scoped = rules.iter().any(for_cookie);
        rules.into_iter()
            .filter(|rule| if scoped { for_cookie(rule) } else {
                rule.scope().is_some_and(|scope| scope.cookie_name().is_none())
            })
            .collect()
    }

    /// The single disposition for a domain, store and cookie.
    /// Whitelisted hosts are never cleaned, no matching rule means the
    /// fallback rule, otherwise the highest precedence among the
    /// narrowed rules wins regardless of declaration order.
    pub fn cleanup_type_for(&self, domain: &str, cookie_store_id: Option<&CookieStoreId>,
        cookie_name: Option<&str>) -> CleanupType {
        let domain = util::normalize_hostname(domain);
        if self.options.whitelist_file_system && domain.is_empty() {
            return CleanupType::Never;
        }
        if self.options.whitelist_no_tld && !domain.is_empty() && !domain.contains('.') {
            return CleanupType::Never;
        }
        self.matching_rules(&domain, cookie_store_id, cookie_name).into_iter()
            .map(CompiledRule::cleanup_type)
            .max_by_key(|cleanup_type| cleanup_type.precedence())
            .unwrap_or(self.options.fallback_rule)
    }

    /// Distinct dispositions of the rules matching a domain in a store,
    /// cookie scoped rules included, highest precedence first.
    pub fn cleanup_types_for(&self, domain: &str, cookie_store_id: Option<&CookieStoreId>)
    -> Vec<CleanupType> {
        let domain = util::normalize_hostname(domain);
        let mut cleanup_types = self.store_narrowed(&self.matching, &domain, cookie_store_id)
            .into_iter()
            .map(CompiledRule::cleanup_type)
            .collect::<Vec<CleanupType>>();
        cleanup_types.sort_by_key(|cleanup_type| std::cmp::Reverse(cleanup_type.precedence()));
        cleanup_types.dedup();
        cleanup_types
    }

    /// Every rule in the highest precedence bucket matching a domain,
    /// for showing which rules are in effect.
    pub fn chosen_rules_for_domain(&self, domain: &str,
        cookie_store_id: Option<&CookieStoreId>) -> Vec<&CompiledRule> {
        let domain = util::normalize_hostname(domain);
        let rules = self.store_narrowed(&self.matching, &domain, cookie_store_id);
        let Some(highest) = rules.iter()
            .map(|rule| rule.cleanup_type().precedence()).max() else {
            return Vec::new();
        };
        rules.into_iter()
            .filter(|rule| rule.cleanup_type().precedence() == highest)
            .collect()
    }

    pub fn is_domain_protected(&self, domain: &str, cookie_store_id: Option<&CookieStoreId>,
        ignore_startup_type: bool) -> bool {
        match self.cleanup_type_for(domain, cookie_store_id, None) {
            CleanupType::Never => true,
            CleanupType::Startup => !ignore_startup_type,
            _ => false,
        }
    }

    pub fn is_domain_instantly(&self, domain: &str, cookie_store_id: Option<&CookieStoreId>,
        cookie_name: Option<&str>) -> bool {
        self.cleanup_type_for(domain, cookie_store_id, cookie_name) == CleanupType::Instantly
    }

    /// Whether anything could ever be cleaned instantly,
    /// so that the listener for new cookies is only needed then.
    pub fn has_blocking_rule(&self) -> bool {
        self.options.fallback_rule == CleanupType::Instantly
            || self.matching.iter()
                .any(|&index| self.rules[index].cleanup_type() == CleanupType::Instantly)
    }

    /// Decides whether a cleaner may remove the data in question.
    /// Domains open in the store are kept on leave, and on startup or
    /// manual cleanups when protection of open domains is enabled.
    pub fn should_clean(&self, request: &CleanupRequest, tabs: &TabWatcher) -> bool {
        let protect_open = match request.trigger {
            CleanupTrigger::Startup => self.options.protect_open_domains.startup,
            CleanupTrigger::Manual => self.options.protect_open_domains.manual,
            CleanupTrigger::Leave => true,
            CleanupTrigger::Instantly => false,
        };
        if protect_open && tabs.contains_domain(request.domain, Some(request.cookie_store_id)) {
            return false;
        }
        let cleanup_type = self.cleanup_type_for(request.domain,
            Some(request.cookie_store_id), request.cookie_name);
        match request.trigger {
            CleanupTrigger::Startup => cleanup_type != CleanupType::Never,
            CleanupTrigger::Manual => !matches!(cleanup_type,
                CleanupType::Never | CleanupType::Startup),
            CleanupTrigger::Leave => matches!(cleanup_type,
                CleanupType::Leave | CleanupType::Instantly),
            CleanupTrigger::Instantly => cleanup_type == CleanupType::Instantly,
        }
    }

    /// Expressions of temporary rules that no open hostname matches
    /// anymore in the stores they apply to.
    pub fn expired_temporary_rules(&self, tabs: &TabWatcher) -> Vec<String> {
        self.temporary_rules()
            .filter(|rule| !rule.scope().is_some_and(|scope| {
                tabs.open_hostnames(scope.cookie_store_id())
                    .into_iter()
                    .any(|hostname| scope.matches_domain(hostname))
            }))
            .map(|rule| String::from(rule.expression()))
            .collect()
    }
}

/// Owner of the compiled rule set.
/// Updates swap the whole [RuleSnapshot], so a reader holding a snapshot
/// never observes a partially updated rule list.
#[derive(Default)]
pub struct RuleManager { snapshot: ArcSwap<RuleSnapshot> }

impl RuleManager {
    pub fn update(&self, definitions: &[RuleDefinition], options: RuleOptions,
        identities: &[ContextualIdentity]) {
        let snapshot = RuleSnapshot::new(definitions, options, identities);
        log::info!("rule set replaced, {} of {} rules valid",
            snapshot.matching.len(), snapshot.rules.len());
        self.snapshot.store(Arc::new(snapshot));
    }

    pub fn snapshot(&self) -> Arc<RuleSnapshot> { self.snapshot.load_full() }

    pub fn get_cleanup_type_for(&self, domain: &str, cookie_store_id: Option<&CookieStoreId>,
        cookie_name: Option<&str>) -> CleanupType {
        self.snapshot.load().cleanup_type_for(domain, cookie_store_id, cookie_name)
    }

    pub fn is_domain_protected(&self, domain: &str, cookie_store_id: Option<&CookieStoreId>,
        ignore_startup_type: bool) -> bool {
        self.snapshot.load().is_domain_protected(domain, cookie_store_id, ignore_startup_type)
    }

    pub fn is_domain_instantly(&self, domain: &str, cookie_store_id: Option<&CookieStoreId>,
        cookie_name: Option<&str>) -> bool {
        self.snapshot.load().is_domain_instantly(domain, cookie_store_id, cookie_name)
    }

    pub fn has_blocking_rule(&self) -> bool { self.snapshot.load().has_blocking_rule() }

    pub fn get_chosen_rules_for_domain(&self, domain: &str,
        cookie_store_id: Option<&CookieStoreId>) -> Vec<RuleDefinition> {
        self.snapshot.load().chosen_rules_for_domain(domain, cookie_store_id)
            .into_iter().map(|rule| rule.definition().clone()).collect()
    }

    pub fn should_clean(&self, request: &CleanupRequest, tabs: &TabWatcher) -> bool {
        self.snapshot.load().should_clean(request, tabs)
    }
}

/// Listing of every rule, broken ones included, for diagnostics.
pub fn report_all(snapshot: &RuleSnapshot) -> Vec<RuleReport> {
    snapshot.all_rules().iter().map(CompiledRule::report).collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::tab::watcher::TabWatcher;

    const WORK: &str = "firefox-container-1";

    fn identities() -> Vec<ContextualIdentity> {
        vec![ContextualIdentity::new(CookieStoreId::new(WORK), "work")]
    }

    fn manager(rules: &[(&str, CleanupType)], fallback_rule: CleanupType) -> RuleManager {
        let manager = RuleManager::default();
        let definitions = rules.iter()
            .map(|&(expression, cleanup_type)| RuleDefinition::new(expression, cleanup_type))
            .collect::<Vec<RuleDefinition>>();
        manager.update(&definitions, RuleOptions { fallback_rule, ..Default::default() },
            &identities());
        manager
    }

    #[test]
    fn test_precedence_beats_declaration_order() {
        use CleanupType::*;
        for rules in [
            [("*.ads.example", Never), ("*.ads.example", Instantly)],
            [("*.ads.example", Instantly), ("*.ads.example", Never)],
        ] {
            let manager = manager(&rules, Leave);
            assert_eq!(manager.get_cleanup_type_for("tracker.ads.example", None, None),
                Instantly);
        }
        let manager = manager(&[("example.com", Startup), ("*.example.com", Never)], Leave);
        assert_eq!(manager.get_cleanup_type_for("example.com", None, None), Never);
    }

    #[test]
    fn test_container_rule_wins_in_its_store() {
        use CleanupType::*;
        let manager = manager(&[("work?*.mail.example", Startup),
            ("*.mail.example", Instantly)], Leave);
        let work = CookieStoreId::new(WORK);
        let other = CookieStoreId::default();
        assert_eq!(manager.get_cleanup_type_for("mail.example", Some(&work), None), Startup);
        assert_eq!(manager.get_cleanup_type_for("inbox.mail.example", Some(&other), None),
            Instantly);
        assert_eq!(manager.get_cleanup_type_for("mail.example", None, None), Instantly);
    }

    #[test]
    fn test_cookie_rule_wins_for_its_cookie() {
        use CleanupType::*;
        let manager = manager(&[("sid@example.com", Never), ("example.com", Instantly)],
            Leave);
        assert_eq!(manager.get_cleanup_type_for("example.com", None, Some("SID")), Never);
        assert_eq!(manager.get_cleanup_type_for("example.com", None, Some("other")),
            Instantly);
        assert_eq!(manager.get_cleanup_type_for("example.com", None, None), Instantly);
    }

    #[test]
    fn test_container_scope_narrows_before_cookie_scope() {
        use CleanupType::*;
        let manager = manager(&[("sid@example.com", Never), ("work?example.com", Leave)],
            Startup);
        let work = CookieStoreId::new(WORK);
        assert_eq!(manager.get_cleanup_type_for("example.com", Some(&work), Some("sid")),
            Leave);
        assert_eq!(manager.get_cleanup_type_for("example.com", None, Some("sid")), Never);
    }

    #[test]
    fn test_cookie_rules_ignored_for_domain_queries() {
        use CleanupType::*;
        let manager = manager(&[("sid@example.com", Instantly)], Never);
        assert_eq!(manager.get_cleanup_type_for("example.com", None, None), Never);
        assert!(!manager.is_domain_instantly("example.com", None, None));
        assert!(manager.is_domain_instantly("example.com", None, Some("sid")));
    }

    #[test]
    fn test_fallback_and_whitelists() {
        use CleanupType::*;
        let manager = RuleManager::default();
        manager.update(&[RuleDefinition::new("*", Instantly)], RuleOptions {
            fallback_rule: Leave, whitelist_file_system: true, whitelist_no_tld: true,
            ..Default::default()
        }, &[]);
        assert_eq!(manager.get_cleanup_type_for("", None, None), Never);
        assert_eq!(manager.get_cleanup_type_for("intranet", None, None), Never);
        assert_eq!(manager.get_cleanup_type_for("example.com", None, None), Instantly);

        let manager = self::manager(&[("example.com", Never)], Startup);
        assert_eq!(manager.get_cleanup_type_for("other.com", None, None), Startup);
        assert_eq!(manager.get_cleanup_type_for("EXAMPLE.com.", None, None), Never);
    }

    #[test]
    fn test_broken_rules_listed_but_never_match() {
        use CleanupType::*;
        let manager = manager(&[("personal?example.com", Never), ("exa mple.com", Never),
            ("example.com", Leave)], Instantly);
        assert_eq!(manager.get_cleanup_type_for("example.com", None, None), Leave);
        let snapshot = manager.snapshot();
        let reports = report_all(&snapshot);
        assert_eq!(reports.len(), 3);
        assert_eq!(reports.iter().filter(|report| report.error.is_some()).count(), 2);
    }

    #[test]
    fn test_domain_protection() {
        use CleanupType::*;
        let manager = manager(&[("keep.example", Never), ("boot.example", Startup)], Leave);
        assert!(manager.is_domain_protected("keep.example", None, true));
        assert!(manager.is_domain_protected("boot.example", None, false));
        assert!(!manager.is_domain_protected("boot.example", None, true));
        assert!(!manager.is_domain_protected("other.example", None, false));
    }

    #[test]
    fn test_blocking_rule() {
        use CleanupType::*;
        assert!(!manager(&[("example.com", Leave)], Leave).has_blocking_rule());
        assert!(manager(&[("example.com", Instantly)], Leave).has_blocking_rule());
        assert!(manager(&[], Instantly).has_blocking_rule());
        assert!(!manager(&[("broken..com", Instantly)], Leave).has_blocking_rule());
    }

    #[test]
    fn test_chosen_rules_share_highest_bucket() {
        use CleanupType::*;
        let manager = manager(&[("*.example.com", Leave), ("www.example.com", Leave),
            ("*.www.example.com", Startup), ("other.com", Instantly)], Never);
        let chosen = manager.get_chosen_rules_for_domain("www.example.com", None);
        assert_eq!(chosen, [RuleDefinition::new("*.example.com", Leave),
            RuleDefinition::new("www.example.com", Leave)]);
        assert!(manager.get_chosen_rules_for_domain("nothing.org", None).is_empty());
    }

    #[test]
    fn test_cleanup_types_for_domain() {
        use CleanupType::*;
        let manager = manager(&[("*.example.com", Startup), ("sid@example.com", Instantly),
            ("example.com", Startup)], Never);
        assert_eq!(manager.snapshot().cleanup_types_for("example.com", None),
            [Instantly, Startup]);
    }

    #[test]
    fn test_snapshot_survives_update() {
        use CleanupType::*;
        let manager = manager(&[("example.com", Never)], Leave);
        let before = manager.snapshot();
        manager.update(&[RuleDefinition::new("example.com", Instantly)],
            RuleOptions::default(), &[]);
        assert_eq!(before.cleanup_type_for("example.com", None, None), Never);
        assert_eq!(manager.get_cleanup_type_for("example.com", None, None), Instantly);
    }

    #[test]
    fn test_should_clean_guards_open_domains() {
        use CleanupType::*;
        let manager = manager(&[("open.example", Leave), ("boot.example", Startup),
            ("now.example", Instantly)], Leave);
        let store = CookieStoreId::default();
        let mut tabs = TabWatcher::new(Vec::new());
        tabs.on_tab_created(1, store.clone(), "open.example");
        tabs.on_tab_created(2, store.clone(), "now.example");
        let request = |domain, trigger| CleanupRequest {
            domain, cookie_store_id: &store, cookie_name: None, trigger,
        };
        assert!(!manager.should_clean(&request("open.example", CleanupTrigger::Leave), &tabs));
        assert!(manager.should_clean(&request("closed.example", CleanupTrigger::Leave), &tabs));
        assert!(!manager.should_clean(&request("boot.example", CleanupTrigger::Leave), &tabs));
        assert!(manager.should_clean(&request("boot.example", CleanupTrigger::Startup), &tabs));
        assert!(!manager.should_clean(&request("boot.example", CleanupTrigger::Manual), &tabs));
        assert!(!manager.should_clean(&request("open.example", CleanupTrigger::Manual), &tabs));
        assert!(manager.should_clean(&request("now.example", CleanupTrigger::Instantly), &tabs));
        assert!(!manager.should_clean(&request("open.example", CleanupTrigger::Instantly),
            &tabs));
    }

    #[test]
    fn test_expired_temporary_rules() {
        let manager = RuleManager::default();
        manager.update(&[
            RuleDefinition::temporary("*.open.example", CleanupType::Never),
            RuleDefinition::temporary("*.closed.example", CleanupType::Never),
            RuleDefinition::temporary("work?*.open.example", CleanupType::Never),
            RuleDefinition::new("*.permanent.example", CleanupType::Never),
        ], RuleOptions::default(), &identities());
        let mut tabs = TabWatcher::new(Vec::new());
        tabs.on_tab_created(1, CookieStoreId::default(), "www.open.example");
        assert_eq!(manager.snapshot().expired_temporary_rules(&tabs),
            ["*.closed.example", "work?*.open.example"]);
        assert_eq!(manager.snapshot().temporary_rules().count(), 3);
    }
}

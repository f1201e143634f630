//! Everything the background page keeps between messages.

use std::sync::Arc;

use crate::domain::psl::Psl;
use crate::interop::contextual_identities::{ContextualIdentity, CookieStoreId};
use crate::preferences::Preferences;
use crate::rule::{CleanupRequest, CleanupTrigger, RuleManager, RuleOptions};
use crate::scheduler::{LeaveCallback, LeaveScheduler};
use crate::tab::watcher::TabWatcher;

/// Rules, tabs and the leave scheduler wired together.
/// The scheduler is the only listener of the tab watcher.
pub struct GlobalContext {
    pub rules: RuleManager,
    pub tabs: TabWatcher,
    pub scheduler: LeaveScheduler,
    pub psl: Arc<Psl>,
    preferences: Preferences,
    identities: Vec<ContextualIdentity>,
}

impl GlobalContext {
    /// Context with default preferences, `on_leave` receives every
    /// debounced leave.
    pub fn new(on_leave: LeaveCallback) -> Self {
        let preferences = Preferences::default();
        let scheduler = LeaveScheduler::new(preferences.leave_delay(), on_leave);
        let tabs = TabWatcher::new(vec![Box::new(scheduler.clone())]);
        let rules = RuleManager::default();
        rules.update(&preferences.rules, RuleOptions::from(&preferences), &[]);
        Self {
            rules, tabs, scheduler, psl: Arc::default(), preferences, identities: Vec::new(),
        }
    }

    pub fn preferences(&self) -> &Preferences { &self.preferences }
    pub fn identities(&self) -> &[ContextualIdentity] { &self.identities }

    /// Recompiles the rules and reconfigures the scheduler.
    pub fn apply_preferences(&mut self, preferences: Preferences) {
        self.scheduler.set_delay(preferences.leave_delay());
        self.scheduler.set_snoozing(preferences.snoozing);
        self.preferences = preferences;
        self.recompile();
    }

    /// Replaces the known containers,
    /// rules naming a container are resolved again.
    pub fn set_identities(&mut self, identities: Vec<ContextualIdentity>) {
        log::debug!("{} containers known", identities.len());
        self.identities = identities;
        self.recompile();
    }

    pub fn set_snoozing(&mut self, snoozing: bool) {
        self.preferences.snoozing = snoozing;
        self.scheduler.set_snoozing(snoozing);
    }

    pub fn set_psl(&mut self, psl: Psl) {
        log::info!("public suffix list of {} loaded with {} entries",
            psl.last_updated(), psl.len());
        let psl = Arc::new(psl);
        self.tabs.set_psl(psl.clone());
        self.psl = psl;
    }

    /// Whether a fired leave still warrants cleaning,
    /// the domain may have been opened again meanwhile.
    pub fn should_clean_on_leave(&self, cookie_store_id: &CookieStoreId, hostname: &str)
    -> bool {
        self.rules.should_clean(&CleanupRequest {
            domain: hostname, cookie_store_id, cookie_name: None,
            trigger: CleanupTrigger::Leave,
        }, &self.tabs)
    }

    fn recompile(&self) {
        self.rules.update(&self.preferences.rules,
            RuleOptions::from(&self.preferences), &self.identities);
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;
    use std::time::Duration;

    use async_std::task;

    use super::*;
    use crate::rule::{CleanupType, RuleDefinition};
    use crate::scheduler::LeaveFuture;

    type Left = Arc<Mutex<Vec<(String, String)>>>;

    fn context() -> (GlobalContext, Left) {
        let left = Left::default();
        let recorded = left.clone();
        let context = GlobalContext::new(Arc::new(move |cookie_store_id: CookieStoreId,
            hostname: String| -> LeaveFuture {
            recorded.lock().unwrap().push((cookie_store_id.to_string(), hostname));
            Box::pin(async { Ok(()) })
        }));
        (context, left)
    }

    fn preferences(rules: Vec<RuleDefinition>) -> Preferences {
        Preferences { rules, leave_delay_seconds: 0, ..Preferences::default() }
    }

    #[test]
    fn test_defaults() {
        let (context, _) = context();
        assert_eq!(context.rules.get_cleanup_type_for("a.example", None, None),
            CleanupType::Leave);
        assert!(!context.scheduler.is_snoozing());
        assert!(context.psl.is_empty());
    }

    #[test]
    fn test_identities_resolve_container_rules() {
        let (mut context, _) = context();
        let work = CookieStoreId::new("firefox-container-1");
        context.apply_preferences(preferences(vec![
            RuleDefinition::new("Work?a.example", CleanupType::Never)]));
        assert_eq!(context.rules.get_cleanup_type_for("a.example", Some(&work), None),
            CleanupType::Leave);
        context.set_identities(vec![ContextualIdentity::new(work.clone(), "work")]);
        assert_eq!(context.rules.get_cleanup_type_for("a.example", Some(&work), None),
            CleanupType::Never);
    }

    #[async_std::test]
    async fn test_closing_last_tab_fires_leave() {
        let (mut context, left) = context();
        context.apply_preferences(preferences(Vec::new()));
        context.tabs.on_tab_created(1, CookieStoreId::default(), "a.example");
        context.tabs.on_tab_removed(1);
        task::sleep(Duration::from_millis(100)).await;
        assert_eq!(*left.lock().unwrap(),
            [(String::from(CookieStoreId::DEFAULT), String::from("a.example"))]);
        assert!(context.should_clean_on_leave(&CookieStoreId::default(), "a.example"));
    }

    #[async_std::test]
    async fn test_snoozing_holds_leaves() {
        let (mut context, left) = context();
        context.apply_preferences(preferences(Vec::new()));
        context.set_snoozing(true);
        context.tabs.on_tab_created(1, CookieStoreId::default(), "a.example");
        context.tabs.on_tab_removed(1);
        task::sleep(Duration::from_millis(100)).await;
        assert!(left.lock().unwrap().is_empty());
        assert!(context.preferences().snoozing);
        context.set_snoozing(false);
        task::sleep(Duration::from_millis(100)).await;
        assert_eq!(left.lock().unwrap().len(), 1);
    }

    #[async_std::test]
    async fn test_reentry_within_delay_cancels_leave() {
        let (mut context, left) = context();
        context.apply_preferences(preferences(Vec::new()));
        context.scheduler.set_delay(Duration::from_millis(100));
        context.tabs.on_tab_created(1, CookieStoreId::default(), "a.example");
        context.tabs.on_tab_removed(1);
        assert!(context.scheduler.is_pending(&CookieStoreId::default(), "a.example"));
        task::sleep(Duration::from_millis(30)).await;
        context.tabs.on_tab_created(2, CookieStoreId::default(), "a.example");
        assert_eq!(context.scheduler.pending_count(), 0);
        task::sleep(Duration::from_millis(300)).await;
        assert!(left.lock().unwrap().is_empty());
        assert!(!context.should_clean_on_leave(&CookieStoreId::default(), "a.example"));
    }

    #[test]
    fn test_reopened_domain_is_not_cleaned_on_leave() {
        let (mut context, _) = context();
        context.apply_preferences(preferences(vec![
            RuleDefinition::new("keep.example", CleanupType::Never)]));
        context.tabs.on_tab_created(1, CookieStoreId::default(), "a.example");
        assert!(!context.should_clean_on_leave(&CookieStoreId::default(), "a.example"));
        assert!(!context.should_clean_on_leave(&CookieStoreId::default(), "keep.example"));
        assert!(context.should_clean_on_leave(&CookieStoreId::new("firefox-container-1"),
            "a.example"));
    }
}

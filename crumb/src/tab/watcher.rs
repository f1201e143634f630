//! Store-wide domain presence over every tracked tab.

use std::collections::{BTreeSet, HashMap};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use slab::Slab;

use super::{FrameId, TabId, TabInfo};
use crate::domain::psl::Psl;
use crate::interop::contextual_identities::CookieStoreId;
use crate::util::{self, errors::CustomError};

/// Subscriber to domains appearing in or disappearing from a cookie store.
#[cfg_attr(test, mockall::automock)]
pub trait DomainListener: Send + Sync {
    fn on_domain_enter(&self, cookie_store_id: &CookieStoreId, hostname: &str);
    fn on_domain_leave(&self, cookie_store_id: &CookieStoreId, hostname: &str);
}

pub type FrameFuture = Pin<Box<dyn Future<Output = Result<Vec<FrameId>, CustomError>>>>;

/// Source of the frames a tab currently has,
/// for frames removed without any navigation event.
#[cfg_attr(test, mockall::automock)]
pub trait FrameSource {
    fn live_frames(&self, tab_id: TabId) -> FrameFuture;
}

/// Owner of every [TabInfo], indexed by tab and by cookie store.
/// The listeners are fixed at construction and notified in order,
/// a domain is only left once no tab of the store may still hold it.
pub struct TabWatcher {
    tabs: Slab<TabInfo>,
    by_tab_id: HashMap<TabId, usize>,
    by_store: HashMap<CookieStoreId, BTreeSet<usize>>,
    listeners: Vec<Box<dyn DomainListener>>,
    psl: Arc<Psl>,
}

impl TabWatcher {
    pub fn new(listeners: Vec<Box<dyn DomainListener>>) -> Self {
        Self {
            tabs: Slab::new(), by_tab_id: HashMap::new(), by_store: HashMap::new(),
            listeners, psl: Arc::default(),
        }
    }

    pub fn set_psl(&mut self, psl: Arc<Psl>) { self.psl = psl; }

    pub fn tab(&self, tab_id: TabId) -> Option<&TabInfo> {
        self.by_tab_id.get(&tab_id).map(|&key| &self.tabs[key])
    }

    pub fn len(&self) -> usize { self.tabs.len() }
    pub fn is_empty(&self) -> bool { self.tabs.is_empty() }

    pub fn on_tab_created(&mut self, tab_id: TabId, cookie_store_id: CookieStoreId,
        hostname: &str) {
        if self.by_tab_id.contains_key(&tab_id) { self.on_tab_removed(tab_id); }
        let entered = self.absent(&cookie_store_id, hostname);
        let key = self.tabs.insert(TabInfo::new(tab_id, cookie_store_id.clone(), hostname));
        self.by_tab_id.insert(tab_id, key);
        self.by_store.entry(cookie_store_id.clone()).or_default().insert(key);
        if entered { self.emit_enter(&cookie_store_id, hostname); }
    }

    pub fn on_tab_removed(&mut self, tab_id: TabId) {
        let Some(key) = self.by_tab_id.remove(&tab_id) else {
            log::debug!("removed tab {tab_id} was never tracked");
            return;
        };
        let mut tab = self.tabs.remove(key);
        let cookie_store_id = tab.cookie_store_id().clone();
        if let Some(keys) = self.by_store.get_mut(&cookie_store_id) {
            keys.remove(&key);
            if keys.is_empty() { self.by_store.remove(&cookie_store_id); }
        }
        let candidates = tab.clear();
        self.emit_left(&cookie_store_id, candidates);
    }

    pub fn on_navigation_prepare(&mut self, tab_id: TabId, frame_id: FrameId, hostname: &str) {
        let Some(tab) = self.tab_mut(tab_id) else { return };
        let cookie_store_id = tab.cookie_store_id().clone();
        let candidates = tab.prepare_navigation(frame_id, hostname);
        self.emit_left(&cookie_store_id, candidates);
    }

    pub fn on_navigation_commit(&mut self, tab_id: TabId, frame_id: FrameId, hostname: &str) {
        let Some(cookie_store_id) = self.tab(tab_id)
            .map(|tab| tab.cookie_store_id().clone()) else { return };
        let entered = self.absent(&cookie_store_id, hostname);
        let candidates = self.tab_mut(tab_id)
            .map(|tab| tab.commit_navigation(frame_id, hostname))
            .unwrap_or_default();
        if entered { self.emit_enter(&cookie_store_id, hostname); }
        self.emit_left(&cookie_store_id, candidates);
    }

    /// Drops the frames of a tab that are not in `live_frames`.
    pub fn remove_dead_frames(&mut self, tab_id: TabId, live_frames: &[FrameId]) {
        let Some(tab) = self.tab_mut(tab_id) else { return };
        let cookie_store_id = tab.cookie_store_id().clone();
        let candidates = tab.remove_dead_frames(live_frames);
        self.emit_left(&cookie_store_id, candidates);
    }

    /// Queries the live frames of a tab and drops the others.
    /// Fails if the frames cannot be queried, the tab is left untouched then.
    pub async fn check_dead_frames(&mut self, tab_id: TabId, source: &impl FrameSource)
    -> Result<(), CustomError> {
        let live_frames = source.live_frames(tab_id).await?;
        self.remove_dead_frames(tab_id, &live_frames);
        Ok(())
    }

    /// Whether a tab holds the hostname, pending navigations included,
    /// in the given store or in any store.
    pub fn contains_domain(&self, hostname: &str, cookie_store_id: Option<&CookieStoreId>)
    -> bool {
        self.tabs_in(cookie_store_id).any(|tab| tab.contains(hostname, true))
    }

    /// Whether a tab of the store belongs to the first-party domain,
    /// or with `deep`, holds exactly that hostname.
    pub fn cookie_store_contains_domain_fp(&self, cookie_store_id: &CookieStoreId,
        first_party_domain: &str, deep: bool) -> bool {
        self.tabs_in(Some(cookie_store_id)).any(|tab| if deep {
            tab.contains(first_party_domain, true)
        } else {
            tab.contains_first_party(&self.psl, first_party_domain)
        })
    }

    /// Whether a cookie of `cookie_domain` is foreign to the top level
    /// document of the tab. Unknown tabs hold no third party cookie.
    pub fn is_third_party_cookie_on_tab(&self, tab_id: TabId, cookie_domain: &str) -> bool {
        let Some(main_hostname) = self.tab(tab_id).and_then(TabInfo::main_hostname) else {
            return false;
        };
        let cookie_domain = util::normalize_hostname(cookie_domain.trim_start_matches('.'));
        self.psl.first_party_domain(main_hostname) != self.psl.first_party_domain(&cookie_domain)
    }

    /// Every hostname open in the store, or in any store.
    pub fn open_hostnames(&self, cookie_store_id: Option<&CookieStoreId>) -> BTreeSet<&str> {
        self.tabs_in(cookie_store_id).flat_map(TabInfo::hostnames).collect()
    }

    fn tab_mut(&mut self, tab_id: TabId) -> Option<&mut TabInfo> {
        let tab = self.by_tab_id.get(&tab_id).and_then(|&key| self.tabs.get_mut(key));
        if tab.is_none() { log::debug!("event for untracked tab {tab_id} ignored"); }
        tab
    }

    fn tabs_in<'a>(&'a self, cookie_store_id: Option<&CookieStoreId>)
    -> Box<dyn Iterator<Item = &'a TabInfo> + 'a> {
        match cookie_store_id {
            Some(cookie_store_id) => Box::new(self.by_store.get(cookie_store_id)
                .into_iter().flatten().map(|&key| &self.tabs[key])),
            None => Box::new(self.tabs.iter().map(|(_, tab)| tab)),
        }
    }

    /// Whether the hostname is settled in no tab of the store.
    fn absent(&self, cookie_store_id: &CookieStoreId, hostname: &str) -> bool {
        !self.tabs_in(Some(cookie_store_id)).any(|tab| tab.contains(hostname, false))
    }

    fn emit_enter(&self, cookie_store_id: &CookieStoreId, hostname: &str) {
        let hostname = util::normalize_hostname(hostname);
        if hostname.is_empty() { return; }
        log::debug!("entered `{hostname}` in {cookie_store_id}");
        for listener in &self.listeners { listener.on_domain_enter(cookie_store_id, &hostname); }
    }

    /// Notifies a leave for every candidate no tab of the store may still hold.
    fn emit_left(&self, cookie_store_id: &CookieStoreId, candidates: BTreeSet<String>) {
        for hostname in candidates {
            if hostname.is_empty() || self.contains_domain(&hostname, Some(cookie_store_id)) {
                continue;
            }
            log::debug!("left `{hostname}` in {cookie_store_id}");
            for listener in &self.listeners {
                listener.on_domain_leave(cookie_store_id, &hostname);
            }
        }
    }
}

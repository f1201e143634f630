//! Structures tracking which hostnames the frames of a tab occupy.

pub mod watcher;

use std::collections::{BTreeMap, BTreeSet};

use crate::domain::psl::Psl;
use crate::interop::contextual_identities::CookieStoreId;
use crate::util;

pub type TabId = i32;
pub type FrameId = i32;

/// Frame of the top level document.
pub const MAIN_FRAME: FrameId = 0;

/// Hostname occupancy of a single frame.
/// A navigation is prepared before it is committed,
/// in between both hostnames may still be reachable.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum FrameState {
    Steady(String),
    Navigating { current: String, next: String },
}

impl FrameState {
    /// Hostnames this frame may hold, the pending one included.
    fn hostnames(&self) -> impl Iterator<Item = &str> {
        let (current, next) = match self {
            FrameState::Steady(current) => (current, None),
            FrameState::Navigating { current, next } => (current, Some(next)),
        };
        std::iter::once(current.as_str()).chain(next.map(String::as_str))
    }

    fn contains(&self, hostname: &str, include_pending: bool) -> bool {
        match self {
            FrameState::Steady(current) => current == hostname,
            FrameState::Navigating { current, next } => include_pending
                && (current == hostname || next == hostname),
        }
    }
}

/// All frames of one tab, in the cookie store the tab was opened in.
/// Operations return the hostnames that may have been left,
/// the caller decides whether they are still open elsewhere.
#[derive(Debug)]
pub struct TabInfo {
    tab_id: TabId,
    cookie_store_id: CookieStoreId,
    frames: BTreeMap<FrameId, FrameState>,
}

impl TabInfo {
    pub fn new(tab_id: TabId, cookie_store_id: CookieStoreId, hostname: &str) -> Self {
        let mut frames = BTreeMap::new();
        frames.insert(MAIN_FRAME, FrameState::Steady(util::normalize_hostname(hostname)));
        Self { tab_id, cookie_store_id, frames }
    }

    pub fn tab_id(&self) -> TabId { self.tab_id }
    pub fn cookie_store_id(&self) -> &CookieStoreId { &self.cookie_store_id }

    pub fn frame(&self, frame_id: FrameId) -> Option<&FrameState> {
        self.frames.get(&frame_id)
    }

    /// Hostname of the top level document once committed.
    pub fn main_hostname(&self) -> Option<&str> {
        match self.frames.get(&MAIN_FRAME)? {
            FrameState::Steady(current) => Some(current),
            FrameState::Navigating { current, .. } => Some(current),
        }
    }

    /// Marks the frame as navigating to `hostname` without leaving its
    /// current hostname yet.
    /// Returns the hostname of a previously pending navigation that was
    /// superseded, and the current hostname if it is about to be replaced.
    pub fn prepare_navigation(&mut self, frame_id: FrameId, hostname: &str)
    -> BTreeSet<String> {
        let next = util::normalize_hostname(hostname);
        let mut candidates = BTreeSet::new();
        let state = match self.frames.remove(&frame_id) {
            None => FrameState::Navigating { current: String::new(), next },
            Some(FrameState::Steady(current)) => {
                if current != next { candidates.insert(current.clone()); }
                FrameState::Navigating { current, next }
            }
            Some(FrameState::Navigating { current, next: superseded }) => {
                if superseded != next { candidates.insert(superseded); }
                if current != next { candidates.insert(current.clone()); }
                FrameState::Navigating { current, next }
            }
        };
        self.frames.insert(frame_id, state);
        candidates
    }

    /// Settles the frame on `hostname`.
    /// A committed top level navigation also drops every sub frame.
    /// Returns every hostname that was replaced.
    pub fn commit_navigation(&mut self, frame_id: FrameId, hostname: &str)
    -> BTreeSet<String> {
        let hostname = util::normalize_hostname(hostname);
        let mut candidates = BTreeSet::new();
        if frame_id == MAIN_FRAME {
            let sub_frames = self.frames.split_off(&(MAIN_FRAME + 1));
            candidates.extend(sub_frames.values()
                .flat_map(FrameState::hostnames).map(String::from));
        }
        if let Some(state) = self.frames.insert(frame_id, FrameState::Steady(hostname.clone())) {
            candidates.extend(state.hostnames().map(String::from));
        }
        candidates.remove(&hostname);
        candidates
    }

    /// Drops the sub frames missing from `live_frames`,
    /// the top level frame is only dropped with the tab.
    /// Returns the hostnames of the dropped frames.
    pub fn remove_dead_frames(&mut self, live_frames: &[FrameId]) -> BTreeSet<String> {
        let mut candidates = BTreeSet::new();
        self.frames.retain(|&frame_id, state| {
            let alive = frame_id == MAIN_FRAME || live_frames.contains(&frame_id);
            if !alive { candidates.extend(state.hostnames().map(String::from)); }
            alive
        });
        candidates
    }

    /// Commits every frame to nothing, for a removed tab.
    pub fn clear(&mut self) -> BTreeSet<String> {
        let frames = std::mem::take(&mut self.frames);
        frames.values().flat_map(FrameState::hostnames).map(String::from).collect()
    }

    /// Whether any frame is settled on `hostname`, or with
    /// `include_pending`, whether any frame may still be or become it.
    pub fn contains(&self, hostname: &str, include_pending: bool) -> bool {
        let hostname = util::normalize_hostname(hostname);
        self.frames.values().any(|state| state.contains(&hostname, include_pending))
    }

    /// Every hostname any frame may hold, pending ones included.
    pub fn hostnames(&self) -> impl Iterator<Item = &str> {
        self.frames.values().flat_map(FrameState::hostnames)
            .filter(|hostname| !hostname.is_empty())
    }

    /// Whether any frame belongs to the first-party domain.
    pub fn contains_first_party(&self, psl: &Psl, first_party_domain: &str) -> bool {
        let first_party_domain = util::normalize_hostname(first_party_domain);
        self.hostnames().any(|hostname| psl.first_party_domain(hostname) == first_party_domain)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn set(hostnames: &[&str]) -> BTreeSet<String> {
        hostnames.iter().map(|&hostname| String::from(hostname)).collect()
    }

    fn tab(hostname: &str) -> TabInfo {
        TabInfo::new(1, CookieStoreId::default(), hostname)
    }

    #[test]
    fn test_prepare_keeps_current_hostname() {
        let mut tab = tab("old.example");
        assert_eq!(tab.prepare_navigation(MAIN_FRAME, "new.example"), set(&["old.example"]));
        assert_eq!(tab.frame(MAIN_FRAME), Some(&FrameState::Navigating {
            current: String::from("old.example"), next: String::from("new.example"),
        }));
        assert!(tab.contains("old.example", true));
        assert!(tab.contains("new.example", true));
        assert!(!tab.contains("old.example", false));
        assert!(!tab.contains("new.example", false));
    }

    #[test]
    fn test_prepare_supersedes_pending_navigation() {
        let mut tab = tab("a.example");
        tab.prepare_navigation(MAIN_FRAME, "b.example");
        assert_eq!(tab.prepare_navigation(MAIN_FRAME, "c.example"),
            set(&["a.example", "b.example"]));
        assert!(!tab.contains("b.example", true));
    }

    #[test]
    fn test_commit_replaces_hostnames() {
        let mut tab = tab("a.example");
        tab.prepare_navigation(MAIN_FRAME, "b.example");
        assert_eq!(tab.commit_navigation(MAIN_FRAME, "b.example"), set(&["a.example"]));
        assert_eq!(tab.frame(MAIN_FRAME), Some(&FrameState::Steady(String::from("b.example"))));
        assert!(tab.contains("B.Example", false));
        assert!(tab.commit_navigation(MAIN_FRAME, "b.example").is_empty());
    }

    #[test]
    fn test_main_frame_commit_drops_sub_frames() {
        let mut tab = tab("a.example");
        tab.commit_navigation(3, "ads.example");
        tab.prepare_navigation(4, "widget.example");
        assert!(tab.contains("ads.example", false));
        assert_eq!(tab.commit_navigation(MAIN_FRAME, "b.example"),
            set(&["a.example", "ads.example", "widget.example"]));
        assert!(tab.frame(3).is_none());
        assert!(tab.frame(4).is_none());
    }

    #[test]
    fn test_remove_dead_frames() {
        let mut tab = tab("a.example");
        tab.commit_navigation(1, "one.example");
        tab.commit_navigation(2, "two.example");
        assert_eq!(tab.remove_dead_frames(&[2]), set(&["one.example"]));
        assert!(tab.frame(MAIN_FRAME).is_some());
        assert!(tab.contains("two.example", false));
    }

    #[test]
    fn test_clear_leaves_everything() {
        let mut tab = tab("a.example");
        tab.commit_navigation(1, "one.example");
        tab.prepare_navigation(MAIN_FRAME, "b.example");
        assert_eq!(tab.clear(), set(&["a.example", "b.example", "one.example"]));
        assert!(!tab.contains("a.example", true));
        assert_eq!(tab.main_hostname(), None);
    }

    #[test]
    fn test_unknown_frame_is_absent() {
        let tab = tab("a.example");
        assert!(tab.frame(9).is_none());
        assert!(!tab.contains("nothing.example", true));
    }
}

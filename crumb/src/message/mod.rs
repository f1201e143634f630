use std::ops::DerefMut;

use async_std::io::BufReader;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::context::GlobalContext;
use crate::domain::psl::Psl;
use crate::interop::contextual_identities::{ContextualIdentity, CookieStoreId};
use crate::preferences::Preferences;
use crate::rule::{self, CleanupRequest, CleanupTrigger, CleanupType, RuleDefinition, RuleReport};
use crate::tab::watcher::FrameSource;
use crate::tab::{FrameId, TabId};
use crate::util::errors::CustomError;

/// Browser events forwarded by the background script,
/// and the queries of the cleaners and the popup.
#[derive(Debug, Deserialize)]
#[serde(rename_all="snake_case", tag="message_type")]
pub enum Message {
    TabCreated { tab_id: TabId, #[serde(default)] cookie_store_id: CookieStoreId,
        hostname: String },
    TabRemoved { tab_id: TabId },
    NavigationPrepare { tab_id: TabId, frame_id: FrameId, hostname: String },
    NavigationCommit { tab_id: TabId, frame_id: FrameId, hostname: String },
    NavigationComplete { tab_id: TabId, #[serde(default)] live_frames: Option<Vec<FrameId>> },
    UpdatePreferences { preferences: Preferences },
    UpdateIdentities { identities: Option<Vec<ContextualIdentity>> },
    SetSnoozing { snoozing: bool },
    LoadPsl { list: String, last_updated: Option<NaiveDate> },

    CleanupType { domain: String, cookie_store_id: Option<CookieStoreId>,
        cookie_name: Option<String> },
    CleanupTypes { domain: String, cookie_store_id: Option<CookieStoreId> },
    DomainProtected { domain: String, cookie_store_id: Option<CookieStoreId>,
        #[serde(default)] ignore_startup_type: bool },
    ContainsDomain { domain: String, cookie_store_id: Option<CookieStoreId> },
    ChosenRules { domain: String, cookie_store_id: Option<CookieStoreId> },
    AllRules,
    ExpiredTemporaryRules,
    HasBlockingRule,
    ThirdPartyCookie { tab_id: TabId, cookie_domain: String },
    ShouldClean { domain: String, #[serde(default)] cookie_store_id: CookieStoreId,
        cookie_name: Option<String>, trigger: CleanupTrigger },
}

/// Answer to a [Message], events answer with [Response::None].
#[derive(Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    None,
    Bool(bool),
    CleanupType(CleanupType),
    CleanupTypes(Vec<CleanupType>),
    Rules(Vec<RuleDefinition>),
    Reports(Vec<RuleReport>),
    Expressions(Vec<String>),
    Date(NaiveDate),
}

impl Message {
    /// Queries the browser for what the event left out,
    /// so that acting on it needs no browser call.
    pub async fn prefetch(self, frames: &impl FrameSource) -> Result<Self, CustomError> {
        Ok(match self {
            Self::NavigationComplete { tab_id, live_frames: None } => Self::NavigationComplete {
                tab_id, live_frames: Some(frames.live_frames(tab_id).await?),
            },
            Self::UpdateIdentities { identities: None } => Self::UpdateIdentities {
                identities: Some(ContextualIdentity::fetch_all().await?),
            },
            message => message,
        })
    }

    /// Applies an event or answers a query.
    /// Fails if the browser or the payload does not cooperate,
    /// the context is left as it was then.
    pub async fn act(
        self, global_context: &mut impl DerefMut<Target = GlobalContext>,
        frames: &impl FrameSource,
    ) -> Result<Response, CustomError> {
        let context = global_context.deref_mut();
        Ok(match self {
            Self::TabCreated { tab_id, cookie_store_id, hostname } => {
                context.tabs.on_tab_created(tab_id, cookie_store_id, &hostname);
                Response::None
            },
            Self::TabRemoved { tab_id } => {
                context.tabs.on_tab_removed(tab_id);
                Response::None
            },
            Self::NavigationPrepare { tab_id, frame_id, hostname } => {
                context.tabs.on_navigation_prepare(tab_id, frame_id, &hostname);
                Response::None
            },
            Self::NavigationCommit { tab_id, frame_id, hostname } => {
                context.tabs.on_navigation_commit(tab_id, frame_id, &hostname);
                Response::None
            },
            Self::NavigationComplete { tab_id, live_frames: Some(live_frames) } => {
                context.tabs.remove_dead_frames(tab_id, &live_frames);
                Response::None
            },
            Self::NavigationComplete { tab_id, live_frames: None } => {
                context.tabs.check_dead_frames(tab_id, frames).await?;
                Response::None
            },
            Self::UpdatePreferences { preferences } => {
                context.apply_preferences(preferences);
                Response::None
            },
            Self::UpdateIdentities { identities } => {
                let identities = match identities {
                    Some(identities) => identities,
                    None => ContextualIdentity::fetch_all().await?,
                };
                context.set_identities(identities);
                Response::None
            },
            Self::SetSnoozing { snoozing } => {
                context.set_snoozing(snoozing);
                Response::None
            },
            Self::LoadPsl { list, last_updated } => {
                let last_updated = last_updated.unwrap_or_else(|| Utc::now().date_naive());
                let mut reader = BufReader::new(list.as_bytes());
                context.set_psl(Psl::from_stream(&mut reader, last_updated).await?);
                Response::Date(last_updated)
            },

            Self::CleanupType { domain, cookie_store_id, cookie_name } => Response::CleanupType(
                context.rules.get_cleanup_type_for(&domain, cookie_store_id.as_ref(),
                    cookie_name.as_deref())),
            Self::CleanupTypes { domain, cookie_store_id } => Response::CleanupTypes(
                context.rules.snapshot().cleanup_types_for(&domain, cookie_store_id.as_ref())),
            Self::DomainProtected { domain, cookie_store_id, ignore_startup_type } => Response::Bool(
                context.rules.is_domain_protected(&domain, cookie_store_id.as_ref(),
                    ignore_startup_type)),
            Self::ContainsDomain { domain, cookie_store_id } => Response::Bool(
                context.tabs.contains_domain(&domain, cookie_store_id.as_ref())),
            Self::ChosenRules { domain, cookie_store_id } => Response::Rules(
                context.rules.get_chosen_rules_for_domain(&domain, cookie_store_id.as_ref())),
            Self::AllRules => Response::Reports(rule::report_all(&context.rules.snapshot())),
            Self::ExpiredTemporaryRules => Response::Expressions(
                context.rules.snapshot().expired_temporary_rules(&context.tabs)),
            Self::HasBlockingRule => Response::Bool(context.rules.has_blocking_rule()),
            Self::ThirdPartyCookie { tab_id, cookie_domain } => Response::Bool(
                context.tabs.is_third_party_cookie_on_tab(tab_id, &cookie_domain)),
            Self::ShouldClean { domain, cookie_store_id, cookie_name, trigger } => Response::Bool(
                context.rules.should_clean(&CleanupRequest {
                    domain: &domain, cookie_store_id: &cookie_store_id,
                    cookie_name: cookie_name.as_deref(), trigger,
                }, &context.tabs)),
        })
    }
}

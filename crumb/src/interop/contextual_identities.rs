use std::fmt::{Debug, Display, Formatter, Result as FmtResult};

use js_sys::{Array, Object, Promise};
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use crate::util::errors::CustomError;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace=["browser", "contextualIdentities"], js_name="query")]
    fn identity_query(details: &Object) -> Promise;
}

/// Identity of a cookie store, the partition a tab keeps its site data in.
#[derive(Clone, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct CookieStoreId { inner: String }

impl CookieStoreId {
    pub const DEFAULT: &'static str = "firefox-default";

    pub fn new(cookie_store_id: &str) -> Self {
        Self { inner: String::from(cookie_store_id) }
    }

    pub fn as_str(&self) -> &str { &self.inner }
}

impl Default for CookieStoreId {
    /// Store of tabs that are not in any container.
    fn default() -> Self { Self::new(Self::DEFAULT) }
}

impl Display for CookieStoreId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        formatter.write_str(&self.inner)
    }
}

#[derive(Clone, Deserialize, Serialize)]
#[serde(rename_all="camelCase")]
pub struct ContextualIdentity { cookie_store_id: CookieStoreId, name: String }

impl ContextualIdentity {
    pub fn new(cookie_store_id: CookieStoreId, name: &str) -> Self {
        Self { cookie_store_id, name: String::from(name) }
    }

    /// Fetches every identity known to the browser.
    /// Fails if the browser indicates so.
    pub async fn fetch_all() -> Result<Vec<Self>, CustomError> {
        let identities = JsFuture::from(identity_query(&Object::new())).await
            .or(Err(CustomError::StandardMismatch {
                message: String::from("contextual identities are unavailable")
            }))?;
        Array::from(&identities).iter()
            .map(|identity| serde_wasm_bindgen::from_value(identity)
                .or(Err(CustomError::StandardMismatch {
                    message: String::from("contextual identity expected")
                })))
            .collect()
    }

    pub fn cookie_store_id(&self) -> &CookieStoreId { &self.cookie_store_id }
    pub fn name(&self) -> &str { &self.name }
}

impl Debug for ContextualIdentity {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        formatter.write_fmt(format_args!(
            "contextual identity `{}`", self.name))
    }
}
impl Display for ContextualIdentity {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> FmtResult {
        (self as &dyn Debug).fmt(formatter)
    }
}

/// Resolves an identity by its name, ignoring case.
pub fn resolve_by_name<'a>(identities: &'a [ContextualIdentity], name: &str)
-> Option<&'a CookieStoreId> {
    identities.iter()
        .find(|identity| identity.name.to_lowercase() == name.to_lowercase())
        .map(ContextualIdentity::cookie_store_id)
}

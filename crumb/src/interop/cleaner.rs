//! The cleaner registered by the background script,
//! which removes the data of a domain once it is no longer needed.

use std::cell::RefCell;

use js_sys::{Function, Promise};
use wasm_bindgen::JsValue;
use wasm_bindgen_futures::JsFuture;

use crate::interop::contextual_identities::CookieStoreId;
use crate::util::errors::CustomError;

thread_local! {
    static CLEANER: RefCell<Option<Function>> = const { RefCell::new(None) };
}

pub fn set_cleaner(cleaner: Function) {
    CLEANER.with_borrow_mut(|registered| *registered = Some(cleaner));
}

/// Calls the cleaner with the hostname and the cookie store id,
/// awaiting it if it returns a promise.
/// Fails if no cleaner is registered, or if it throws or rejects.
pub async fn clean(cookie_store_id: &CookieStoreId, hostname: &str) -> Result<(), CustomError> {
    let failed = |message: String| CustomError::FailedCleanup {
        hostname: String::from(hostname), message,
    };
    let returned = CLEANER.with_borrow(|registered| registered.as_ref()
        .map(|cleaner| cleaner.call2(&JsValue::NULL, &JsValue::from(hostname),
            &JsValue::from(cookie_store_id.as_str()))))
        .ok_or_else(|| failed(String::from("no cleaner registered")))?
        .map_err(|error| failed(format!("{error:?}")))?;
    JsFuture::from(Promise::resolve(&returned)).await
        .map_err(|error| failed(format!("{error:?}")))?;
    Ok(())
}

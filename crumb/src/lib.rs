mod context;
mod domain;
mod interop;
mod message;
mod preferences;
mod rule;
mod scheduler;
mod tab;
mod util;

use std::panic;
use std::sync::Arc;
use std::time::Duration;

use async_std::channel::{self, Receiver, Sender};
use async_std::sync::Mutex;
use async_std::task;
use js_sys::Function;
use once_cell::sync::Lazy;
use wasm_bindgen::prelude::*;

use crate::context::GlobalContext;
use crate::interop::cleaner;
use crate::interop::contextual_identities::CookieStoreId;
use crate::interop::frames::WebNavigationFrames;
use crate::message::Message;
use crate::scheduler::LeaveFuture;
use crate::util::errors::CustomError;

/// Time for frames to settle after a navigation completes.
const FRAME_SETTLE_DELAY: Duration = Duration::from_millis(500);

type Leave = (CookieStoreId, String);

static LEAVES: Lazy<(Sender<Leave>, Receiver<Leave>)> = Lazy::new(channel::unbounded);

static GLOBAL_CONTEXT: Lazy<Mutex<GlobalContext>> = Lazy::new(||
    Mutex::new(GlobalContext::new(Arc::new(|cookie_store_id: CookieStoreId, hostname: String|
    -> LeaveFuture {
        Box::pin(async move {
            LEAVES.0.send((cookie_store_id, hostname.clone())).await
                .map_err(|_| CustomError::FailedCleanup {
                    hostname, message: String::from("cleaner is gone"),
                })
        })
    }))));

#[wasm_bindgen(start)]
fn main() {
    panic::set_hook(Box::new(console_error_panic_hook::hook));
    wasm_logger::init(wasm_logger::Config::default());
    wasm_bindgen_futures::spawn_local(clean_left_domains());
}

/// Hands every fired leave to the cleaner if it is still warranted.
/// Failures are logged and never retried.
async fn clean_left_domains() {
    while let Ok((cookie_store_id, hostname)) = LEAVES.1.recv().await {
        let should_clean = GLOBAL_CONTEXT.lock().await
            .should_clean_on_leave(&cookie_store_id, &hostname);
        if !should_clean {
            log::debug!("`{hostname}` in {cookie_store_id} kept after leaving");
            continue;
        }
        if let Err(error) = cleaner::clean(&cookie_store_id, &hostname).await {
            log::error!("{error}");
        }
    }
}

#[wasm_bindgen(js_name="setCleaner")]
pub fn set_cleaner(cleaner: Function) {
    cleaner::set_cleaner(cleaner);
}

#[wasm_bindgen(js_name="onMessage")]
pub async fn on_message(message: JsValue) -> Result<JsValue, JsError> {
    let message: Message = interop::cast_or_standard_mismatch(message)
        .map_err(|error| JsError::new(&error.to_string()))?;
    if matches!(message, Message::NavigationComplete { .. }) {
        task::sleep(FRAME_SETTLE_DELAY).await;
    }
    // browser queries are awaited before the context is locked
    let message = message.prefetch(&WebNavigationFrames).await
        .map_err(|error| JsError::new(&error.to_string()))?;
    let response = message.act(&mut GLOBAL_CONTEXT.lock().await, &WebNavigationFrames).await
        .map_err(|error| JsError::new(&error.to_string()))?;
    interop::to_js_value(&response).map_err(|error| JsError::new(&error.to_string()))
}

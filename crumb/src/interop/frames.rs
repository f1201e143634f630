use js_sys::Promise;
use serde::{Deserialize, Serialize};
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::JsFuture;

use super::{cast_or_standard_mismatch, to_js_value};
use crate::tab::watcher::{FrameFuture, FrameSource};
use crate::tab::{FrameId, TabId};
use crate::util::errors::CustomError;

#[wasm_bindgen]
extern "C" {
    #[wasm_bindgen(js_namespace=["browser", "webNavigation"], js_name="getAllFrames")]
    fn get_all_frames(details: JsValue) -> Promise;
}

#[derive(Serialize)]
#[serde(rename_all="camelCase")]
struct GetAllFramesDetails { tab_id: TabId }

#[derive(Deserialize)]
#[serde(rename_all="camelCase")]
struct FrameDetails { frame_id: FrameId }

/// Frames as reported by `browser.webNavigation`.
pub struct WebNavigationFrames;

impl FrameSource for WebNavigationFrames {
    fn live_frames(&self, tab_id: TabId) -> FrameFuture {
        Box::pin(async move {
            let details = to_js_value(&GetAllFramesDetails { tab_id })?;
            let frames = JsFuture::from(get_all_frames(details)).await
                .or(Err(CustomError::FailedFrameQuery { tab_id }))?;
            // closed tabs resolve to null
            let frames: Option<Vec<FrameDetails>> = cast_or_standard_mismatch(frames)?;
            Ok(frames.unwrap_or_default().into_iter().map(|frame| frame.frame_id).collect())
        })
    }
}

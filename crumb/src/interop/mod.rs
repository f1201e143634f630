pub mod cleaner;
pub mod contextual_identities;
pub mod frames;

use serde::Serialize;
use serde_wasm_bindgen::Serializer;
use wasm_bindgen::JsValue;

use crate::util::errors::CustomError;

const MAP_SERIALIZER: &Serializer = &Serializer::new()
    .serialize_maps_as_objects(true);

/// Converts a value to a plain JS object.
/// Fails if serde cannot represent it in JS.
pub fn to_js_value<T: Serialize + ?Sized>(value: &T) -> Result<JsValue, CustomError> {
    value.serialize(MAP_SERIALIZER)
        .map_err(|error| CustomError::StandardMismatch { message: error.to_string() })
}

/// Reads a value the browser or the background script handed over.
/// Fails with [CustomError::StandardMismatch] if the shape is unexpected.
pub fn cast_or_standard_mismatch<T>(value: JsValue) -> Result<T, CustomError>
where T: for<'de> serde::Deserialize<'de> {
    serde_wasm_bindgen::from_value(value)
        .map_err(|error| CustomError::StandardMismatch { message: error.to_string() })
}

use forgeframe_protocol::ForgeFrameError;
use serde::{Deserialize, Serialize};
use tracing::error;
use tsify::Tsify;
use wasm_bindgen::JsValue;

/// Wraps [`ForgeFrameError`] the way `ironposh-web`'s `WasmError` wraps its
/// lower layers: a `thiserror` enum that converts to `JsValue` via a stable
/// `{code, message}` shape, logging on the way out.
#[derive(Debug, thiserror::Error)]
pub enum WasmError {
    #[error("{0}")]
    Core(#[from] ForgeFrameError),

    #[error("Serialization Error: {0}")]
    SerializationError(#[from] serde_wasm_bindgen::Error),

    #[error("Invalid Argument: {0}")]
    InvalidArgument(String),

    #[error("Generic Error: {0}")]
    Generic(String),
}

unsafe impl Send for WasmError {}
unsafe impl Sync for WasmError {}

impl WasmError {
    pub fn name(&self) -> &str {
        match self {
            WasmError::Core(inner) => inner.code(),
            WasmError::SerializationError(_) => "SerializationError",
            WasmError::InvalidArgument(_) => "InvalidArgument",
            WasmError::Generic(_) => "GenericError",
        }
    }
}

impl From<WasmError> for ForgeFrameJsError {
    fn from(value: WasmError) -> Self {
        error!(
            error_code = value.name(),
            error_message = %value,
            "converting WasmError to ForgeFrameJsError"
        );
        ForgeFrameJsError {
            code: value.name().to_string(),
            message: value.to_string(),
        }
    }
}

impl From<WasmError> for JsValue {
    fn from(value: WasmError) -> Self {
        error!(
            error_code = value.name(),
            error_message = %value,
            "converting WasmError to JsValue"
        );
        let api_error: ForgeFrameJsError = value.into();
        api_error.into()
    }
}

/// Stable JS-visible error shape, analogous to `ironposh-web`'s `IronPoshError`.
#[derive(Serialize, Deserialize, Tsify)]
#[tsify(from_wasm_abi, into_wasm_abi)]
pub struct ForgeFrameJsError {
    pub code: String,
    pub message: String,
}

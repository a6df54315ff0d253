use thiserror::Error;

/// Error taxonomy shared by every ForgeFrame crate.
///
/// Mirrors the shape of `ironposh-web`'s `WasmError`: one enum per crate
/// boundary, a stable `name()` for cross-boundary reporting, manual
/// messages instead of leaning on `Debug`.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ForgeFrameError {
    #[error("Component tag is required")]
    MissingTag,

    #[error("Invalid component tag {0}")]
    InvalidTag(String),

    #[error("Component url is required")]
    MissingUrl,

    #[error("Invalid component URL {0}")]
    InvalidUrl(String),

    #[error("Component {0} is already registered")]
    AlreadyRegistered(String),

    #[error("Handshake payload exceeds {limit} bytes (got {actual})")]
    PayloadTooLarge { limit: usize, actual: usize },

    #[error("{name} timed out after {millis}ms")]
    Timeout { name: String, millis: u64 },

    #[error("Transport has been destroyed")]
    TransportDestroyed,

    #[error("Function with id {0} not found")]
    UnknownCallable(String),

    #[error("Schema validation is synchronous only; async schema detected for {0}")]
    AsyncSchemaUnsupported(String),

    #[error("Container {0} not found")]
    ContainerNotFound(String),

    #[error("Component {0} is not eligible to render")]
    Ineligible(String),

    #[error("Could not resolve consumer window")]
    ConsumerUnresolvable,

    #[error("Invalid operation for instance in state {0}")]
    InvalidState(String),

    #[error("Required parameter {0} is missing")]
    RequiredParameter(String),

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Circular reference detected{}", path.as_ref().map(|p| format!(" at {p}")).unwrap_or_default())]
    CircularReference { path: Option<String> },

    #[error("Malformed message: {0}")]
    MalformedMessage(String),

    #[error("{0}")]
    Remote(String),

    #[error("Generic error: {0}")]
    Generic(String),
}

impl ForgeFrameError {
    /// Stable machine-readable error code, analogous to `WasmError::name`.
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingTag => "MissingTag",
            Self::InvalidTag(_) => "InvalidTag",
            Self::MissingUrl => "MissingUrl",
            Self::InvalidUrl(_) => "InvalidUrl",
            Self::AlreadyRegistered(_) => "AlreadyRegistered",
            Self::PayloadTooLarge { .. } => "PayloadTooLarge",
            Self::Timeout { .. } => "Timeout",
            Self::TransportDestroyed => "TransportDestroyed",
            Self::UnknownCallable(_) => "UnknownCallable",
            Self::AsyncSchemaUnsupported(_) => "AsyncSchemaUnsupported",
            Self::ContainerNotFound(_) => "ContainerNotFound",
            Self::Ineligible(_) => "Ineligible",
            Self::ConsumerUnresolvable => "ConsumerUnresolvable",
            Self::InvalidState(_) => "InvalidState",
            Self::RequiredParameter(_) => "RequiredParameter",
            Self::ValidationFailed(_) => "ValidationFailed",
            Self::CircularReference { .. } => "CircularReference",
            Self::MalformedMessage(_) => "MalformedMessage",
            Self::Remote(_) => "RemoteError",
            Self::Generic(_) => "GenericError",
        }
    }
}

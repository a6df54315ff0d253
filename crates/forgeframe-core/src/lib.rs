//! Transport-agnostic lifecycle engine for ForgeFrame components.
//!
//! Everything here operates on plain `serde_json::Value` and generic
//! handle types so it is unit-tested without a browser. `forgeframe-web`
//! supplies the real `Window`/`JsValue` glue on top.

pub mod builtin;
pub mod bridge;
pub mod component;
pub mod consumer;
pub mod host;
pub mod params;
pub mod peer;
pub mod registry;

pub use component::{ComponentDefinition, ParamType, ParameterDefinition};
pub use consumer::{Instance, InstanceState, LifecycleEvent};
pub use registry::{ComponentRegistry, WindowRef, WindowRefTable};

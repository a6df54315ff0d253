//! JS-facing declarative types, spec.md §6. `tsify`-derived the same way
//! `ironposh-web::types` derives every type handed to or received from JS,
//! so TypeScript consumers get generated `.d.ts` signatures for free.
//!
//! Declarative registration covers the JSON-representable shape of a
//! parameter (type, required, default, visibility, alias, named query
//! projection). Derived values, custom validators, schemas and value/host
//! transforms are closures and stay a Rust-only `forgeframe-core` API —
//! not reachable from this declarative surface (see DESIGN.md).

use std::collections::HashMap;
use std::rc::Rc;

use forgeframe_core::builtin::builtin_definitions;
use forgeframe_core::component::{self, ComponentDefinition, Dimensions as CoreDimensions, DomainMatcher, ParameterDefinition, UrlSource};
use forgeframe_protocol::handshake::RenderingMode as CoreRenderingMode;
use forgeframe_protocol::ForgeFrameError;
use serde::{Deserialize, Serialize};
use tsify::Tsify;

#[derive(Tsify, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl From<Dimensions> for CoreDimensions {
    fn from(d: Dimensions) -> Self {
        Self {
            width: d.width,
            height: d.height,
        }
    }
}

impl From<CoreDimensions> for Dimensions {
    fn from(d: CoreDimensions) -> Self {
        Self {
            width: d.width,
            height: d.height,
        }
    }
}

#[derive(Tsify, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "lowercase")]
pub enum RenderingMode {
    Iframe,
    Popup,
}

impl From<RenderingMode> for CoreRenderingMode {
    fn from(mode: RenderingMode) -> Self {
        match mode {
            RenderingMode::Iframe => Self::Iframe,
            RenderingMode::Popup => Self::Popup,
        }
    }
}

impl From<CoreRenderingMode> for RenderingMode {
    fn from(mode: CoreRenderingMode) -> Self {
        match mode {
            CoreRenderingMode::Iframe => Self::Iframe,
            CoreRenderingMode::Popup => Self::Popup,
        }
    }
}

#[derive(Tsify, Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "lowercase")]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Callable,
    Any,
}

impl From<ParamType> for component::ParamType {
    fn from(t: ParamType) -> Self {
        match t {
            ParamType::String => Self::String,
            ParamType::Number => Self::Number,
            ParamType::Boolean => Self::Boolean,
            ParamType::Object => Self::Object,
            ParamType::Array => Self::Array,
            ParamType::Callable => Self::Callable,
            ParamType::Any => Self::Any,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Tsify, Serialize, Deserialize, Clone, Debug)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct ParamOption {
    pub name: String,
    pub param_type: ParamType,
    #[serde(default)]
    pub required: bool,
    #[serde(default)]
    pub default: Option<serde_json::Value>,
    #[serde(default = "default_true")]
    pub visible_to_host: bool,
    #[serde(default)]
    pub same_origin_only: bool,
    #[serde(default)]
    pub trusted_domain: Option<String>,
    #[serde(default)]
    pub alias: Option<String>,
    /// `None` never projects to the query string; `Some(name)` projects
    /// under that explicit name, spec.md §4.3.
    #[serde(default)]
    pub query_name: Option<String>,
}

impl ParamOption {
    fn into_definition(self) -> ParameterDefinition {
        let mut def = ParameterDefinition::new(self.param_type.into());
        def.required = self.required;
        def.default = self.default.map(component::ValueSource::Literal);
        def.visible_to_host = self.visible_to_host;
        def.same_origin_only = self.same_origin_only;
        def.trusted_domain = self.trusted_domain.map(DomainMatcher::Exact);
        def.alias = self.alias;
        def.query = self.query_name.map(component::QueryProjection::Name);
        def
    }
}

fn default_mode() -> RenderingMode {
    RenderingMode::Iframe
}

fn default_dimensions() -> Dimensions {
    Dimensions { width: 400, height: 300 }
}

fn default_init_timeout_ms() -> u64 {
    10_000
}

#[derive(Tsify, Serialize, Deserialize, Clone, Debug)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct ComponentOptions {
    pub tag: String,
    pub url: String,
    #[serde(default)]
    pub params: Vec<ParamOption>,
    #[serde(default = "default_mode")]
    pub default_mode: RenderingMode,
    #[serde(default)]
    pub allowed_domain: Option<String>,
    #[serde(default = "default_dimensions")]
    pub dimensions: Dimensions,
    #[serde(default = "default_init_timeout_ms")]
    pub init_timeout_ms: u64,
}

impl ComponentOptions {
    pub fn into_definition(self) -> Result<ComponentDefinition, ForgeFrameError> {
        ComponentDefinition::validate_new(&self.tag, &Some(self.url.clone()))?;

        let mut params: HashMap<String, ParameterDefinition> = builtin_definitions();
        for param in self.params {
            params.insert(param.name.clone(), param.into_definition());
        }

        Ok(ComponentDefinition {
            tag: self.tag,
            url: UrlSource::Literal(self.url),
            params,
            default_mode: self.default_mode.into(),
            allowed_domain: self.allowed_domain.map(DomainMatcher::Exact),
            dimensions: self.dimensions.into(),
            init_timeout_ms: self.init_timeout_ms,
            nested_components: None,
            // Eligibility predicates are Rust closures with no JSON shape,
            // so they stay a forgeframe-core-only API; see DESIGN.md.
            eligible: None,
        })
    }
}

#[derive(Tsify, Serialize, Deserialize, Clone, Debug)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct PeerInfo {
    pub uid: String,
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exports: Option<Vec<String>>,
}

impl From<forgeframe_core::peer::PeerInfo> for PeerInfo {
    fn from(p: forgeframe_core::peer::PeerInfo) -> Self {
        Self {
            uid: p.uid,
            tag: p.tag,
            exports: p.exports,
        }
    }
}

/// Re-exported so call sites don't need to reach into `forgeframe_core`
/// just to build a trusted-domain matcher from a regular expression.
pub fn compile_trusted_pattern(pattern: &str) -> Result<Rc<regex::Regex>, ForgeFrameError> {
    regex::Regex::new(pattern)
        .map(Rc::new)
        .map_err(|e| ForgeFrameError::Generic(format!("invalid trusted-domain pattern: {e}")))
}

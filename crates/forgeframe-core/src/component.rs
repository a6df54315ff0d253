use std::collections::HashMap;
use std::rc::Rc;

use forgeframe_protocol::{handshake::RenderingMode, ForgeFrameError};
use serde_json::{Map, Value};

/// Parameters resolved so far, passed to derived-value closures.
pub type Ctx = Map<String, Value>;

/// A literal value, or one derived from the context built up so far.
#[derive(Clone)]
pub enum ValueSource {
    Literal(Value),
    Derived(Rc<dyn Fn(&Ctx) -> Value>),
}

impl ValueSource {
    pub fn resolve(&self, ctx: &Ctx) -> Value {
        match self {
            Self::Literal(v) => v.clone(),
            Self::Derived(f) => f(ctx),
        }
    }
}

/// Target URL: a literal, or derived from the fully-normalized parameters.
#[derive(Clone)]
pub enum UrlSource {
    Literal(String),
    Derived(Rc<dyn Fn(&Ctx) -> String>),
}

impl UrlSource {
    pub fn resolve(&self, ctx: &Ctx) -> String {
        match self {
            Self::Literal(s) => s.clone(),
            Self::Derived(f) => f(ctx),
        }
    }
}

/// Matches a consumer/host origin either by exact string or regular expression,
/// per spec.md §4.1 ("string matchers do exact compare, pattern matchers do
/// regular-expression test").
#[derive(Clone)]
pub enum DomainMatcher {
    Exact(String),
    Pattern(Rc<regex::Regex>),
}

impl DomainMatcher {
    pub fn matches(&self, origin: &str) -> bool {
        match self {
            Self::Exact(s) => s == origin,
            Self::Pattern(re) => re.is_match(origin),
        }
    }
}

/// Outcome of running a schema (a validator with the standard
/// `validate(value) -> {value} | {issues}` shape spec.md §3 describes).
pub enum SchemaOutcome {
    Valid(Value),
    Invalid(Vec<SchemaIssue>),
}

#[derive(Debug, Clone)]
pub struct SchemaIssue {
    pub path: String,
    pub message: String,
}

pub trait Schema {
    fn validate(&self, value: &Value) -> SchemaOutcome;
    /// Schemas must be synchronous; implementations that would need to await
    /// something should return `true` here so the pipeline can reject them
    /// with `AsyncSchemaUnsupported` instead of silently blocking. Defaults
    /// to `false` (synchronous).
    fn is_async(&self) -> bool {
        false
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    String,
    Number,
    Boolean,
    Object,
    Array,
    Callable,
    Any,
}

impl ParamType {
    /// Loose JS-style type check used when no schema is attached.
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            Self::Any => true,
            Self::String => value.is_string(),
            Self::Number => value.is_number(),
            Self::Boolean => value.is_boolean(),
            Self::Object => value.is_object(),
            Self::Array => value.is_array(),
            // Callable values never appear as plain JSON in forgeframe-core;
            // the web layer substitutes a CallableRef object, which is itself
            // a JSON object, so accept objects shaped like one.
            Self::Callable => value.is_object(),
        }
    }
}

/// Query-string projection setting for a parameter, spec.md §4.3.
#[derive(Clone)]
pub enum QueryProjection {
    /// `true` projects under the parameter's own name; `false` never projects.
    Bool(bool),
    /// Project under an explicit name.
    Name(String),
    /// Compute the projected string from `{value}`.
    Derived(Rc<dyn Fn(&Value) -> String>),
}

/// Per-parameter definition, spec.md §3.
#[derive(Clone)]
pub struct ParameterDefinition {
    pub param_type: ParamType,
    pub required: bool,
    pub value_fn: Option<Rc<dyn Fn(&Ctx) -> Value>>,
    pub default: Option<ValueSource>,
    pub visible_to_host: bool,
    pub same_origin_only: bool,
    pub trusted_domain: Option<DomainMatcher>,
    pub validator: Option<Rc<dyn Fn(&Value) -> Result<(), String>>>,
    pub consumer_transform: Option<Rc<dyn Fn(Value) -> Value>>,
    pub host_transform: Option<Rc<dyn Fn(Value) -> Value>>,
    pub alias: Option<String>,
    pub query: Option<QueryProjection>,
    pub schema: Option<Rc<dyn Schema>>,
}

impl ParameterDefinition {
    pub fn new(param_type: ParamType) -> Self {
        Self {
            param_type,
            required: false,
            value_fn: None,
            default: None,
            visible_to_host: true,
            same_origin_only: false,
            trusted_domain: None,
            validator: None,
            consumer_transform: None,
            host_transform: None,
            alias: None,
            query: None,
            schema: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Immutable record produced once per component type, spec.md §3.
#[derive(Clone)]
pub struct ComponentDefinition {
    pub tag: String,
    pub url: UrlSource,
    pub params: HashMap<String, ParameterDefinition>,
    pub default_mode: RenderingMode,
    pub allowed_domain: Option<DomainMatcher>,
    pub dimensions: Dimensions,
    pub init_timeout_ms: u64,
    pub nested_components: Option<HashMap<String, Rc<ComponentDefinition>>>,
    /// Re-checked against the normalized parameters just before render,
    /// spec.md §4.5 step 2. `None` means every instance is eligible.
    pub eligible: Option<Rc<dyn Fn(&Ctx) -> bool>>,
}

impl ComponentDefinition {
    /// spec.md §4.5 step 2: instances whose predicate returns `false` must
    /// not render; absent a predicate every instance is eligible.
    pub fn is_eligible(&self, props: &Ctx) -> bool {
        match &self.eligible {
            Some(f) => f(props),
            None => true,
        }
    }
}

/// `^[a-z][a-z0-9-]*$`, spec.md §3 / §6.
pub fn is_valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

impl ComponentDefinition {
    pub fn validate_new(tag: &str, url: &Option<String>) -> Result<(), ForgeFrameError> {
        if tag.is_empty() {
            return Err(ForgeFrameError::MissingTag);
        }
        if !is_valid_tag(tag) {
            return Err(ForgeFrameError::InvalidTag(tag.to_string()));
        }
        match url {
            None => Err(ForgeFrameError::MissingUrl),
            Some(u) if u.is_empty() => Err(ForgeFrameError::InvalidUrl(u.clone())),
            Some(_) => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_validation() {
        assert!(is_valid_tag("a"));
        assert!(is_valid_tag("my-component-2"));
        assert!(!is_valid_tag("Bad-Tag"));
        assert!(!is_valid_tag("2-starts-with-digit"));
        assert!(!is_valid_tag(""));
    }

    #[test]
    fn param_type_loose_matching() {
        assert!(ParamType::String.matches(&Value::String("x".into())));
        assert!(!ParamType::String.matches(&Value::Bool(true)));
        assert!(ParamType::Any.matches(&Value::Null));
    }
}

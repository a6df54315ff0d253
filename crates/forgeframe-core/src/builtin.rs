//! Built-in parameter set always merged into a component's schema,
//! spec.md §4.3.

use std::collections::HashMap;

use crate::component::{ParamType, ParameterDefinition};

/// Names of the consumer-local lifecycle callbacks: never shipped to the host.
pub const LIFECYCLE_CALLBACKS: &[&str] = &[
    "onPrerender",
    "onRendered",
    "onDisplay",
    "onResize",
    "onFocus",
    "onClose",
    "onDestroy",
    "onError",
    "onParameterChange",
];

pub const PARAM_UID: &str = "uid";
pub const PARAM_TAG: &str = "tag";
pub const PARAM_DIMENSIONS: &str = "dimensions";
pub const PARAM_INIT_TIMEOUT: &str = "timeout";
pub const PARAM_CSP_NONCE: &str = "cspNonce";

/// Built-in parameters merged into every component's effective schema.
pub fn builtin_definitions() -> HashMap<String, ParameterDefinition> {
    let mut defs = HashMap::new();

    let mut uid = ParameterDefinition::new(ParamType::String);
    uid.visible_to_host = true;
    defs.insert(PARAM_UID.to_string(), uid);

    let mut tag = ParameterDefinition::new(ParamType::String);
    tag.visible_to_host = true;
    defs.insert(PARAM_TAG.to_string(), tag);

    let mut dimensions = ParameterDefinition::new(ParamType::Object);
    dimensions.visible_to_host = false;
    defs.insert(PARAM_DIMENSIONS.to_string(), dimensions);

    let mut timeout = ParameterDefinition::new(ParamType::Number);
    timeout.visible_to_host = false;
    defs.insert(PARAM_INIT_TIMEOUT.to_string(), timeout);

    let mut csp_nonce = ParameterDefinition::new(ParamType::String);
    csp_nonce.visible_to_host = true;
    defs.insert(PARAM_CSP_NONCE.to_string(), csp_nonce);

    for name in LIFECYCLE_CALLBACKS {
        let mut callback = ParameterDefinition::new(ParamType::Callable);
        callback.visible_to_host = false;
        defs.insert((*name).to_string(), callback);
    }

    defs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_hide_local_only_fields_from_host() {
        let defs = builtin_definitions();
        assert!(!defs[PARAM_DIMENSIONS].visible_to_host);
        assert!(!defs[PARAM_INIT_TIMEOUT].visible_to_host);
        for name in LIFECYCLE_CALLBACKS {
            assert!(!defs[*name].visible_to_host, "{name} must stay consumer-local");
        }
    }

    #[test]
    fn builtins_expose_uid_tag_and_nonce_to_host() {
        let defs = builtin_definitions();
        assert!(defs[PARAM_UID].visible_to_host);
        assert!(defs[PARAM_TAG].visible_to_host);
        assert!(defs[PARAM_CSP_NONCE].visible_to_host);
    }
}

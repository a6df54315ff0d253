//! Host Engine state, spec.md §4.6.
//!
//! Window/DOM resolution (finding the parent/opener, binding the
//! well-known parameter slot) is a `forgeframe-web` concern; this module
//! owns the state that doesn't need a `Window` to reason about: dormancy,
//! the PROPS merge semantics, and `initError` bookkeeping.

use std::collections::HashMap;

use forgeframe_protocol::ForgeFrameError;
use serde_json::{Map, Value};

use crate::component::ParameterDefinition;
use crate::params::validate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostState {
    /// Window name doesn't carry a handshake payload; module stays inert.
    Dormant,
    Initializing,
    Ready,
    Failed,
}

pub struct HostInstance {
    pub uid: String,
    pub tag: String,
    state: HostState,
    pub init_error: Option<ForgeFrameError>,
}

impl HostInstance {
    pub fn new(uid: String, tag: String) -> Self {
        Self {
            uid,
            tag,
            state: HostState::Initializing,
            init_error: None,
        }
    }

    pub fn state(&self) -> HostState {
        self.state
    }

    pub fn mark_ready(&mut self) {
        self.state = HostState::Ready;
    }

    /// A failed INIT is retained as `initError` and surfaced via an error
    /// event, not propagated as a panic, spec.md §4.6.
    pub fn mark_failed(&mut self, error: ForgeFrameError) {
        self.init_error = Some(error);
        self.state = HostState::Failed;
    }
}

/// Merge an incoming PROPS payload into the host's exposed slot using
/// `Object.assign` semantics (apply first), then re-validate. A failed
/// validation leaves the merged (partial) state in place and is reported
/// back to the caller, matching the open question spec.md §9 resolves in
/// favor of partial updates.
pub fn apply_props_update(
    current: &mut Map<String, Value>,
    defs: &HashMap<String, ParameterDefinition>,
    partial: Map<String, Value>,
) -> Result<(), ForgeFrameError> {
    for (key, value) in partial {
        current.insert(key, value);
    }
    let validated = validate(defs, current)?;
    *current = validated;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ParamType, ParameterDefinition};

    #[test]
    fn failed_validation_still_leaves_partial_merge() {
        let mut defs = HashMap::new();
        let mut required = ParameterDefinition::new(ParamType::String);
        required.required = true;
        defs.insert("name".into(), required);
        defs.insert("count".into(), ParameterDefinition::new(ParamType::Number));

        let mut current = Map::new();
        current.insert("name".into(), Value::String("x".into()));
        current.insert("count".into(), Value::from(1));

        let mut partial = Map::new();
        partial.insert("count".into(), Value::String("not-a-number".into()));

        let err = apply_props_update(&mut current, &defs, partial).unwrap_err();
        assert!(matches!(err, ForgeFrameError::ValidationFailed(_)));
        // the bad value is still visible — partial update, not rollback.
        assert_eq!(current["count"], Value::String("not-a-number".into()));
    }

    #[test]
    fn init_failure_is_retained_not_propagated() {
        let mut host = HostInstance::new("u1_a".into(), "widget".into());
        host.mark_failed(ForgeFrameError::ConsumerUnresolvable);
        assert_eq!(host.state(), HostState::Failed);
        assert!(host.init_error.is_some());
    }
}

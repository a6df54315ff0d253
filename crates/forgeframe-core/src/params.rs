//! Parameter Pipeline, spec.md §4.3: normalize, validate, project-for-host,
//! query-string projection. Operates on `serde_json::Value` so every stage
//! is unit-tested without a browser; `forgeframe-web` converts to/from
//! `JsValue` at the edges and substitutes real callables via
//! `forgeframe_core::bridge`.

use std::collections::HashMap;

use forgeframe_protocol::ForgeFrameError;
use serde_json::{Map, Value};

use crate::component::{ParamType, ParameterDefinition, QueryProjection, SchemaOutcome};

/// Deterministic processing order: later definitions' derived values may
/// reference earlier ones through `ctx`, so parameters are walked in name
/// order rather than `HashMap`'s unspecified iteration order.
fn sorted_names(defs: &HashMap<String, ParameterDefinition>) -> Vec<&String> {
    let mut names: Vec<&String> = defs.keys().collect();
    names.sort();
    names
}

/// Fold user-provided parameters with defaults, spec.md §4.3 "Normalize".
pub fn normalize(defs: &HashMap<String, ParameterDefinition>, user_values: &Map<String, Value>) -> Map<String, Value> {
    let mut ctx = Map::new();
    for name in sorted_names(defs) {
        let def = &defs[name];
        let mut value = user_values
            .get(name)
            .cloned()
            .or_else(|| def.alias.as_ref().and_then(|alias| user_values.get(alias)).cloned())
            .or_else(|| def.value_fn.as_ref().map(|f| f(&ctx)))
            .or_else(|| def.default.as_ref().map(|d| d.resolve(&ctx)))
            .or_else(|| {
                def.schema.as_ref().map(|schema| match schema.validate(&Value::Null) {
                    SchemaOutcome::Valid(v) => v,
                    SchemaOutcome::Invalid(_) => Value::Null,
                })
            })
            .unwrap_or(Value::Null);

        if !value.is_null() {
            if let Some(transform) = &def.consumer_transform {
                value = transform(value);
            }
        }

        ctx.insert(name.clone(), value);
    }
    ctx
}

/// Validate a normalized record, spec.md §4.3 "Validate".
pub fn validate(
    defs: &HashMap<String, ParameterDefinition>,
    record: &Map<String, Value>,
) -> Result<Map<String, Value>, ForgeFrameError> {
    let mut result = record.clone();

    for name in sorted_names(defs) {
        let def = &defs[name];
        let value = result.get(name).cloned().unwrap_or(Value::Null);

        if def.required && value.is_null() {
            return Err(ForgeFrameError::RequiredParameter(name.clone()));
        }

        if let Some(schema) = &def.schema {
            if schema.is_async() {
                return Err(ForgeFrameError::AsyncSchemaUnsupported(name.clone()));
            }
            match schema.validate(&value) {
                SchemaOutcome::Valid(v) => {
                    result.insert(name.clone(), v);
                }
                SchemaOutcome::Invalid(issues) => {
                    let message = issues
                        .iter()
                        .map(|issue| format!("{}: {}", issue.path, issue.message))
                        .collect::<Vec<_>>()
                        .join("; ");
                    return Err(ForgeFrameError::ValidationFailed(message));
                }
            }
        } else if !value.is_null() && !def.param_type.matches(&value) {
            return Err(ForgeFrameError::ValidationFailed(format!(
                "{name}: expected {:?}",
                def.param_type
            )));
        }

        if let Some(validator) = &def.validator {
            let value = result.get(name).cloned().unwrap_or(Value::Null);
            validator(&value).map_err(|msg| ForgeFrameError::ValidationFailed(format!("{name}: {msg}")))?;
        }
    }

    Ok(result)
}

/// Drop parameters not meant for the host, spec.md §4.3 "Project for host".
pub fn project_for_host(
    defs: &HashMap<String, ParameterDefinition>,
    record: &Map<String, Value>,
    consumer_origin: &str,
    host_origin: &str,
) -> Map<String, Value> {
    let mut projected = Map::new();
    for name in sorted_names(defs) {
        let def = &defs[name];
        if !def.visible_to_host {
            continue;
        }
        if def.same_origin_only && consumer_origin != host_origin {
            continue;
        }
        if let Some(matcher) = &def.trusted_domain {
            if !matcher.matches(host_origin) {
                continue;
            }
        }
        let mut value = record.get(name).cloned().unwrap_or(Value::Null);
        if let Some(transform) = &def.host_transform {
            value = transform(value);
        }
        projected.insert(name.clone(), value);
    }
    projected
}

/// Build the query-string pairs for the target URL, spec.md §4.3
/// "Query-string projection".
pub fn project_query_string(defs: &HashMap<String, ParameterDefinition>, record: &Map<String, Value>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for name in sorted_names(defs) {
        let def = &defs[name];
        let Some(projection) = &def.query else {
            continue;
        };
        if matches!(def.param_type, ParamType::Callable) {
            continue;
        }
        let value = record.get(name).cloned().unwrap_or(Value::Null);
        if value.is_null() {
            continue;
        }

        let key = match projection {
            QueryProjection::Bool(false) => continue,
            QueryProjection::Bool(true) => name.clone(),
            QueryProjection::Name(explicit) => explicit.clone(),
            QueryProjection::Derived(_) => name.clone(),
        };

        let encoded = match projection {
            QueryProjection::Derived(f) => f(&value),
            _ => match &value {
                Value::Object(_) | Value::Array(_) => serde_json::to_string(&value).expect("value serializes"),
                Value::String(s) => s.clone(),
                other => other.to_string(),
            },
        };

        pairs.push((key, encoded));
    }
    pairs
}

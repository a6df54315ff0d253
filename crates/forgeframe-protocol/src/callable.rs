use serde::{Deserialize, Serialize};

use crate::ids::short_uid;

/// Stands in for a function value crossing the origin boundary.
///
/// Opaque on the receiving side; the Function Bridge wraps it into a
/// callable that issues a `forgeframe_call` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallableRef {
    #[serde(rename = "type")]
    pub kind: CallableRefKind,
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallableRefKind {
    Function,
}

impl CallableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            kind: CallableRefKind::Function,
            id: short_uid(),
            name: name.into(),
        }
    }
}

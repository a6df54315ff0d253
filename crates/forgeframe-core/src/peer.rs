//! Peer discovery, spec.md §4.7.

use serde::{Deserialize, Serialize};

use crate::registry::ComponentRegistry;

/// Snapshot used for peer discovery; never persisted, recomputed per query.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerInfo {
    pub uid: String,
    pub tag: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exports: Option<Vec<String>>,
}

/// Options carried on a `GET_SIBLINGS` request, spec.md §4.7.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GetSiblingsOptions {
    /// Reserved for expansion to search other consumer windows; this
    /// implementation restricts peer discovery to the local consumer
    /// regardless of this flag (see DESIGN.md open-question resolution).
    #[serde(default, rename = "anyConsumer")]
    pub any_consumer: bool,
}

/// Every instance of `tag` except `asking_uid`, per spec.md §4.7.
pub fn resolve_peers(
    registry: &ComponentRegistry,
    tag: &str,
    asking_uid: &str,
    exports_for: impl Fn(&str) -> Option<Vec<String>>,
) -> Vec<PeerInfo> {
    registry
        .instances_for(tag)
        .iter()
        .filter(|uid| uid.as_str() != asking_uid)
        .map(|uid| PeerInfo {
            uid: uid.clone(),
            tag: tag.to_string(),
            exports: exports_for(uid),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentDefinition, Dimensions, UrlSource};
    use forgeframe_protocol::handshake::RenderingMode;
    use std::collections::HashMap;

    fn def(tag: &str) -> ComponentDefinition {
        ComponentDefinition {
            tag: tag.to_string(),
            url: UrlSource::Literal("https://example.com".into()),
            params: HashMap::new(),
            default_mode: RenderingMode::Iframe,
            allowed_domain: None,
            dimensions: Dimensions { width: 1, height: 1 },
            init_timeout_ms: 1,
            nested_components: None,
            eligible: None,
        }
    }

    #[test]
    fn excludes_the_asking_instance() {
        let mut registry = ComponentRegistry::new();
        registry.register(def("widget")).unwrap();
        registry.add_instance("widget", "u1_a".into());
        registry.add_instance("widget", "u2_b".into());

        let peers = resolve_peers(&registry, "widget", "u1_a", |_| None);
        assert_eq!(peers.len(), 1);
        assert_eq!(peers[0].uid, "u2_b");
    }
}

//! Registry & Refs, spec.md §4.7.

use std::collections::HashMap;
use std::rc::Rc;

use forgeframe_protocol::ForgeFrameError;
use serde::{Deserialize, Serialize};

use crate::component::ComponentDefinition;

/// Process-wide directory: component tag -> definition + live instance list.
pub struct ComponentRegistry {
    components: HashMap<String, Rc<ComponentDefinition>>,
    instances: HashMap<String, Vec<String>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self {
            components: HashMap::new(),
            instances: HashMap::new(),
        }
    }

    pub fn register(&mut self, definition: ComponentDefinition) -> Result<(), ForgeFrameError> {
        if self.components.contains_key(&definition.tag) {
            return Err(ForgeFrameError::AlreadyRegistered(definition.tag));
        }
        self.instances.insert(definition.tag.clone(), Vec::new());
        self.components.insert(definition.tag.clone(), Rc::new(definition));
        Ok(())
    }

    pub fn get(&self, tag: &str) -> Option<Rc<ComponentDefinition>> {
        self.components.get(tag).cloned()
    }

    pub fn unregister(&mut self, tag: &str) {
        self.components.remove(tag);
        self.instances.remove(tag);
    }

    pub fn clear(&mut self) {
        self.components.clear();
        self.instances.clear();
    }

    /// Instances register themselves on creation, spec.md §3 Instance.
    pub fn add_instance(&mut self, tag: &str, uid: String) {
        self.instances.entry(tag.to_string()).or_default().push(uid);
    }

    /// Instances remove themselves on destroy, spec.md §3 Instance.
    pub fn remove_instance(&mut self, tag: &str, uid: &str) {
        if let Some(list) = self.instances.get_mut(tag) {
            list.retain(|existing| existing != uid);
        }
    }

    pub fn instances_for(&self, tag: &str) -> &[String] {
        self.instances.get(tag).map(Vec::as_slice).unwrap_or(&[])
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Window-reference kinds, spec.md §4.7. `Direct` holds an opaque handle
/// (a real `web_sys::Window` in `forgeframe-web`) and can never cross the
/// wire: the caller must register it and send a `Global` reference instead.
#[derive(Clone)]
pub enum WindowRef<W> {
    Opener,
    Parent { distance: u32 },
    Global { uid: String },
    Direct(W),
}

/// The wire-safe projection of a [`WindowRef`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SerializableWindowRef {
    Opener,
    Parent { distance: u32 },
    Global { uid: String },
}

impl<W> WindowRef<W> {
    pub fn to_serializable(&self) -> Result<SerializableWindowRef, ForgeFrameError> {
        match self {
            Self::Opener => Ok(SerializableWindowRef::Opener),
            Self::Parent { distance } => Ok(SerializableWindowRef::Parent { distance: *distance }),
            Self::Global { uid } => Ok(SerializableWindowRef::Global { uid: uid.clone() }),
            Self::Direct(_) => Err(ForgeFrameError::Generic(
                "direct window handles cannot be serialized; register the window and send a Global reference".into(),
            )),
        }
    }
}

impl SerializableWindowRef {
    /// The inverse of [`WindowRef::to_serializable`]; a wire reference never
    /// carries a `Direct` handle, so this always lands on one of the other
    /// three kinds.
    pub fn into_window_ref<W>(self) -> WindowRef<W> {
        match self {
            Self::Opener => WindowRef::Opener,
            Self::Parent { distance } => WindowRef::Parent { distance },
            Self::Global { uid } => WindowRef::Global { uid },
        }
    }
}

impl<W: Clone> WindowRef<W> {
    /// Resolution maps each kind back to a window handle or `None`, spec.md
    /// §4.7. `opener`/`parent` are resolved by the caller (a `forgeframe-web`
    /// concern, since only it can walk `Window::opener`/`Window::parent`);
    /// `Global` consults `table`, the only kind this process can have
    /// registered out of band.
    pub fn resolve(&self, opener: Option<&W>, parent: Option<&W>, table: &WindowRefTable<W>) -> Option<W> {
        match self {
            Self::Opener => opener.cloned(),
            // Only the immediate parent is tracked; anything further up the
            // frame chain has no local handle to resolve against.
            Self::Parent { distance: 0 } => parent.cloned(),
            Self::Parent { .. } => None,
            Self::Global { uid } => table.get(uid).cloned(),
            Self::Direct(handle) => Some(handle.clone()),
        }
    }
}

/// Per-process weak window-reference table keyed by instance uid, spec.md §3.
pub struct WindowRefTable<W> {
    entries: HashMap<String, W>,
}

impl<W> WindowRefTable<W> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn register(&mut self, uid: String, handle: W) {
        self.entries.insert(uid, handle);
    }

    pub fn get(&self, uid: &str) -> Option<&W> {
        self.entries.get(uid)
    }

    pub fn remove(&mut self, uid: &str) -> Option<W> {
        self.entries.remove(uid)
    }
}

impl<W> Default for WindowRefTable<W> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{ComponentDefinition, Dimensions, UrlSource};
    use forgeframe_protocol::handshake::RenderingMode;
    use std::collections::HashMap as StdHashMap;

    fn def(tag: &str) -> ComponentDefinition {
        ComponentDefinition {
            tag: tag.to_string(),
            url: UrlSource::Literal("https://example.com".into()),
            params: StdHashMap::new(),
            default_mode: RenderingMode::Iframe,
            allowed_domain: None,
            dimensions: Dimensions { width: 400, height: 300 },
            init_timeout_ms: 10_000,
            nested_components: None,
            eligible: None,
        }
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = ComponentRegistry::new();
        registry.register(def("a")).unwrap();
        let err = registry.register(def("a")).unwrap_err();
        assert!(matches!(err, ForgeFrameError::AlreadyRegistered(tag) if tag == "a"));
    }

    #[test]
    fn instance_list_tracks_add_and_remove() {
        let mut registry = ComponentRegistry::new();
        registry.register(def("a")).unwrap();
        registry.add_instance("a", "u1_x".into());
        registry.add_instance("a", "u2_y".into());
        assert_eq!(registry.instances_for("a").len(), 2);
        registry.remove_instance("a", "u1_x");
        assert_eq!(registry.instances_for("a"), &["u2_y".to_string()]);
    }

    #[test]
    fn direct_window_refs_refuse_serialization() {
        let direct: WindowRef<u32> = WindowRef::Direct(42);
        assert!(direct.to_serializable().is_err());
        let global: WindowRef<u32> = WindowRef::Global { uid: "u1_x".into() };
        assert!(global.to_serializable().is_ok());
    }

    #[test]
    fn resolve_maps_each_kind_to_a_handle_or_none() {
        let mut table: WindowRefTable<u32> = WindowRefTable::new();
        table.register("u1_x".into(), 7);

        let opener = 1u32;
        let parent = 2u32;

        assert_eq!(WindowRef::Opener.resolve(Some(&opener), Some(&parent), &table), Some(1));
        assert_eq!(
            WindowRef::Parent { distance: 0 }.resolve(Some(&opener), Some(&parent), &table),
            Some(2)
        );
        assert_eq!(
            WindowRef::Parent { distance: 2 }.resolve(Some(&opener), Some(&parent), &table),
            None
        );
        assert_eq!(
            WindowRef::Global { uid: "u1_x".into() }.resolve(None, None, &table),
            Some(7)
        );
        assert_eq!(
            WindowRef::Global { uid: "missing".into() }.resolve(None, None, &table),
            None
        );
        assert_eq!(WindowRef::Direct(99u32).resolve(None, None, &table), Some(99));
    }

    #[test]
    fn serializable_round_trips_through_window_ref() {
        let wire = SerializableWindowRef::Global { uid: "u1_x".into() };
        let back: WindowRef<u32> = wire.into_window_ref();
        assert!(matches!(back, WindowRef::Global { uid } if uid == "u1_x"));
    }
}

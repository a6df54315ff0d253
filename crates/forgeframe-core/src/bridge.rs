//! Transport-agnostic half of the Function Bridge (spec.md §4.2).
//!
//! The producer-side table, eviction policy and cycle-detecting tree walk
//! live here so they are unit-testable without a browser. `forgeframe-web`
//! supplies the `TreeNode` implementation for `JsValue` and the actual
//! `CALL` request plumbing.

use std::collections::{HashMap, HashSet, VecDeque};

use forgeframe_protocol::{callable::CallableRefKind, ids::short_uid, CallableRef, ForgeFrameError};
use serde_json::Value;

/// Per-side table of callable handles, keyed by reference id.
///
/// Capacity-bounded, oldest-first eviction, per spec.md §4.2 and the
/// "Eviction bound" testable property in spec.md §8.
pub struct FunctionTable<T> {
    capacity: usize,
    order: VecDeque<String>,
    entries: HashMap<String, T>,
}

impl<T: Clone> FunctionTable<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            order: VecDeque::new(),
            entries: HashMap::new(),
        }
    }

    pub fn with_default_capacity() -> Self {
        // spec.md §4.2: capacity 500.
        Self::new(500)
    }

    /// Register a handle, recording its id in the current batch.
    pub fn register(&mut self, handle: T, batch: &mut HashSet<String>) -> String {
        let id = short_uid();
        self.insert(id.clone(), handle);
        batch.insert(id.clone());
        id
    }

    fn insert(&mut self, id: String, handle: T) {
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
            }
        }
        self.order.push_back(id.clone());
        self.entries.insert(id, handle);
    }

    pub fn get(&self, id: &str) -> Option<&T> {
        self.entries.get(id)
    }

    /// Evict every entry not present in `batch`, unless `keep_previous` is
    /// set (spec.md §4.2: "keeping previously-registered functions is an
    /// option so peers do not receive dangling references mid-update").
    pub fn evict_unmarked(&mut self, batch: &HashSet<String>, keep_previous: bool) {
        if keep_previous {
            return;
        }
        let stale: Vec<String> = self
            .order
            .iter()
            .filter(|id| !batch.contains(id.as_str()))
            .cloned()
            .collect();
        for id in stale {
            self.entries.remove(&id);
            self.order.retain(|existing| existing != &id);
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Consumer-side cache of id -> wrapper, so identity-based equality on the
/// receiver stays stable across repeated deserialization of the same ref.
pub struct WrapperCache<W> {
    entries: HashMap<String, W>,
}

impl<W: Clone> WrapperCache<W> {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn get_or_insert_with(&mut self, id: &str, make: impl FnOnce() -> W) -> W {
        if let Some(existing) = self.entries.get(id) {
            return existing.clone();
        }
        let wrapper = make();
        self.entries.insert(id.to_string(), wrapper.clone());
        wrapper
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl<W: Clone> Default for WrapperCache<W> {
    fn default() -> Self {
        Self::new()
    }
}

/// What a node in a source value tree turns out to be, generic over the
/// concrete tree type `T` (either a hand-rolled test node or `JsValue`).
pub enum Classification<T> {
    Primitive,
    Array(Vec<T>),
    Object(Vec<(String, T)>),
    Function,
}

/// A value that can be walked by the producer-side serializer.
///
/// Implemented by a simple test double in this crate's tests, and by
/// `JsValue` in `forgeframe-web`.
pub trait TreeNode: Sized + Clone {
    fn classify(&self) -> Classification<Self>;
    /// Reference-identity comparison, used for cycle detection along the
    /// current recursion path (spec.md §4.2's "weak identity set").
    fn ptr_eq(&self, other: &Self) -> bool;
    /// Convert a primitive leaf to JSON. Only called when `classify`
    /// returned `Classification::Primitive`.
    fn to_json_primitive(&self) -> Value;
}

/// Walk `node`, replacing callables with [`CallableRef`] JSON objects and
/// registering them in `table`/`batch`. Rejects cycles along the current
/// recursion path. `name` is the object key or array index `node` was
/// reached at (empty at the root), and becomes a function's `CallableRef.name`.
pub fn serialize_tree<T: TreeNode>(
    node: &T,
    name: &str,
    table: &mut FunctionTable<T>,
    batch: &mut HashSet<String>,
    ancestors: &mut Vec<T>,
) -> Result<Value, ForgeFrameError> {
    match node.classify() {
        Classification::Primitive => Ok(node.to_json_primitive()),
        Classification::Function => {
            let id = table.register(node.clone(), batch);
            let callable = CallableRef {
                kind: CallableRefKind::Function,
                id,
                name: name.to_string(),
            };
            Ok(serde_json::to_value(callable).expect("CallableRef always serializes"))
        }
        Classification::Array(items) => {
            if ancestors.iter().any(|a| a.ptr_eq(node)) {
                return Err(ForgeFrameError::CircularReference { path: None });
            }
            ancestors.push(node.clone());
            let mut out = Vec::with_capacity(items.len());
            for (index, item) in items.iter().enumerate() {
                out.push(serialize_tree(item, &index.to_string(), table, batch, ancestors)?);
            }
            ancestors.pop();
            Ok(Value::Array(out))
        }
        Classification::Object(fields) => {
            if ancestors.iter().any(|a| a.ptr_eq(node)) {
                return Err(ForgeFrameError::CircularReference { path: None });
            }
            ancestors.push(node.clone());
            let mut map = serde_json::Map::new();
            for (key, value) in &fields {
                map.insert(key.clone(), serialize_tree(value, key, table, batch, ancestors)?);
            }
            ancestors.pop();
            Ok(Value::Object(map))
        }
    }
}

/// Whether a decoded JSON value is shaped like a [`CallableRef`].
pub fn detect_callable_ref(value: &Value) -> Option<CallableRef> {
    let obj = value.as_object()?;
    if obj.get("type")?.as_str()? != "function" {
        return None;
    }
    serde_json::from_value(value.clone()).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Clone)]
    enum Node {
        Primitive(Value),
        Array(Rc<RefCell<Vec<Node>>>),
        Function(&'static str),
    }

    impl TreeNode for Node {
        fn classify(&self) -> Classification<Self> {
            match self {
                Node::Primitive(_) => Classification::Primitive,
                Node::Array(items) => Classification::Array(items.borrow().clone()),
                Node::Function(_) => Classification::Function,
            }
        }

        fn ptr_eq(&self, other: &Self) -> bool {
            match (self, other) {
                (Node::Array(a), Node::Array(b)) => Rc::ptr_eq(a, b),
                _ => false,
            }
        }

        fn to_json_primitive(&self) -> Value {
            match self {
                Node::Primitive(v) => v.clone(),
                _ => Value::Null,
            }
        }
    }

    #[test]
    fn serializes_primitives_unchanged() {
        let mut table = FunctionTable::<Node>::with_default_capacity();
        let mut batch = HashSet::new();
        let mut ancestors = Vec::new();
        let node = Node::Primitive(Value::String("hi".into()));
        let json = serialize_tree(&node, "", &mut table, &mut batch, &mut ancestors).unwrap();
        assert_eq!(json, Value::String("hi".into()));
    }

    #[test]
    fn replaces_functions_with_callable_refs() {
        let mut table = FunctionTable::<Node>::with_default_capacity();
        let mut batch = HashSet::new();
        let mut ancestors = Vec::new();
        let node = Node::Function("onOk");
        let json = serialize_tree(&node, "onOk", &mut table, &mut batch, &mut ancestors).unwrap();
        assert_eq!(json["type"], "function");
        assert_eq!(json["name"], "onOk");
        assert_eq!(table.len(), 1);
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn rejects_cycles() {
        let items = Rc::new(RefCell::new(Vec::new()));
        let array = Node::Array(items.clone());
        items.borrow_mut().push(array.clone());

        let mut table = FunctionTable::<Node>::with_default_capacity();
        let mut batch = HashSet::new();
        let mut ancestors = Vec::new();
        let err = serialize_tree(&array, "", &mut table, &mut batch, &mut ancestors).unwrap_err();
        assert!(matches!(err, ForgeFrameError::CircularReference { .. }));
    }

    #[test]
    fn eviction_bound_never_exceeded() {
        let mut table = FunctionTable::<&'static str>::with_default_capacity();
        for _ in 0..600 {
            let mut batch = HashSet::new();
            table.register("handle", &mut batch);
        }
        assert!(table.len() <= 500);
    }

    #[test]
    fn batch_eviction_drops_unmarked_entries() {
        let mut table = FunctionTable::<&'static str>::new(10);
        let mut first_batch = HashSet::new();
        let id_a = table.register("a", &mut first_batch);
        table.evict_unmarked(&first_batch, false);
        assert!(table.get(&id_a).is_some());

        let second_batch = HashSet::new();
        table.evict_unmarked(&second_batch, false);
        assert!(table.get(&id_a).is_none());
    }

    #[test]
    fn keep_previous_batch_avoids_eviction() {
        let mut table = FunctionTable::<&'static str>::new(10);
        let mut first_batch = HashSet::new();
        let id_a = table.register("a", &mut first_batch);
        let second_batch = HashSet::new();
        table.evict_unmarked(&second_batch, true);
        assert!(table.get(&id_a).is_some());
    }

    #[test]
    fn detects_callable_ref_shape() {
        let value = serde_json::json!({"type": "function", "id": "abc", "name": "onOk"});
        let detected = detect_callable_ref(&value).expect("should detect");
        assert_eq!(detected.id, "abc");

        assert!(detect_callable_ref(&serde_json::json!({"type": "object"})).is_none());
    }
}

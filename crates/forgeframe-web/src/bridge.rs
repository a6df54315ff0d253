//! wasm-bindgen glue for the Function Bridge, spec.md §4.2.
//!
//! `forgeframe_core::bridge` carries the capacity table, eviction policy
//! and cycle-detecting tree walk; this module supplies the `TreeNode`
//! implementation over `JsValue` and both halves of the `forgeframe_call`
//! exchange.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use forgeframe_core::bridge::{serialize_tree, Classification, FunctionTable, TreeNode, WrapperCache};
use forgeframe_protocol::message::names;
use forgeframe_protocol::{CallableRef, ForgeFrameError};
use js_sys::{Array, Function, Object, Reflect};
use serde::Deserialize;
use serde_json::Value;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_futures::JsFuture;
use web_sys::Window;

use crate::transport::{RequestHandler, Transport};

/// A `JsValue` walked by [`serialize_tree`]. A newtype because `TreeNode`
/// can't be implemented directly on the foreign `JsValue`.
#[derive(Clone)]
pub struct JsTree(pub JsValue);

impl TreeNode for JsTree {
    fn classify(&self) -> Classification<Self> {
        if self.0.is_function() {
            return Classification::Function;
        }
        if Array::is_array(&self.0) {
            let array = Array::from(&self.0);
            let items = array.iter().map(JsTree).collect();
            return Classification::Array(items);
        }
        if self.0.is_object() {
            let object = Object::from(self.0.clone());
            let mut fields = Vec::new();
            for key in Object::keys(&object).iter() {
                let Some(key) = key.as_string() else { continue };
                let value = Reflect::get(&object, &JsValue::from_str(&key)).unwrap_or(JsValue::UNDEFINED);
                fields.push((key, JsTree(value)));
            }
            return Classification::Object(fields);
        }
        Classification::Primitive
    }

    fn ptr_eq(&self, other: &Self) -> bool {
        Object::is(&self.0, &other.0)
    }

    fn to_json_primitive(&self) -> Value {
        serde_wasm_bindgen::from_value(self.0.clone()).unwrap_or(Value::Null)
    }
}

/// Producer side: walk `value`, replacing JS functions with `CallableRef`
/// JSON, registering each function in `table`/`batch`.
pub fn serialize_for_wire(
    value: &JsValue,
    table: &mut FunctionTable<JsTree>,
    batch: &mut HashSet<String>,
) -> Result<Value, ForgeFrameError> {
    let mut ancestors = Vec::new();
    serialize_tree(&JsTree(value.clone()), "", table, batch, &mut ancestors)
}

#[derive(Deserialize)]
struct CallPayload {
    id: String,
    #[serde(default)]
    args: Vec<Value>,
}

/// Installs the `forgeframe_call` handler that looks up the callable in
/// `table`, invokes it, and awaits the result if it is a promise.
pub fn install_call_handler(transport: &Transport, table: Rc<RefCell<FunctionTable<JsTree>>>) {
    let handler: RequestHandler = Rc::new(move |data, _source| {
        let table = Rc::clone(&table);
        Box::pin(async move {
            let call: CallPayload = serde_json::from_value(data)
                .map_err(|e| ForgeFrameError::MalformedMessage(e.to_string()))?;

            let handle = table.borrow().get(&call.id).cloned();
            let Some(handle) = handle else {
                return Err(ForgeFrameError::UnknownCallable(call.id));
            };
            let function: &Function = handle.0.unchecked_ref();

            let js_args = Array::new();
            for arg in &call.args {
                let js_arg = serde_wasm_bindgen::to_value(arg).map_err(|e| ForgeFrameError::Generic(e.to_string()))?;
                js_args.push(&js_arg);
            }

            let result = function
                .apply(&JsValue::UNDEFINED, &js_args)
                .map_err(|e| ForgeFrameError::Remote(format!("{e:?}")))?;

            let resolved = if result.is_instance_of::<js_sys::Promise>() {
                JsFuture::from(result.unchecked_into::<js_sys::Promise>())
                    .await
                    .map_err(|e| ForgeFrameError::Remote(format!("{e:?}")))?
            } else {
                result
            };

            serde_wasm_bindgen::from_value(resolved).map_err(|e| ForgeFrameError::Generic(e.to_string()))
        })
    });
    transport.on(names::CALL, handler);
}

/// Consumer side: a single remote callable, spec.md §4.2. JS sees it as a
/// plain object with a `call(args)` method rather than a native variadic
/// function, since wasm-bindgen closures can't bind JS call syntax directly.
#[wasm_bindgen]
#[derive(Clone)]
pub struct RemoteCallable {
    id: String,
    name: String,
    transport: Rc<Transport>,
    target: Window,
    target_origin: String,
}

#[wasm_bindgen]
impl RemoteCallable {
    #[wasm_bindgen(getter)]
    pub fn name(&self) -> String {
        self.name.clone()
    }

    /// Issues a `forgeframe_call` request and resolves/rejects with the
    /// producer's response.
    pub fn call(&self, args: Array) -> js_sys::Promise {
        let transport = Rc::clone(&self.transport);
        let target = self.target.clone();
        let target_origin = self.target_origin.clone();
        let id = self.id.clone();

        wasm_bindgen_futures::future_to_promise(async move {
            let args: Vec<Value> = args
                .iter()
                .map(|a| serde_wasm_bindgen::from_value(a).unwrap_or(Value::Null))
                .collect();
            let payload = serde_json::json!({ "id": id, "args": args });
            let result = transport
                .send(&target, &target_origin, names::CALL, payload, None)
                .await
                .map_err(|e| JsValue::from_str(&e.to_string()))?;
            serde_wasm_bindgen::to_value(&result).map_err(|e| JsValue::from_str(&e.to_string()))
        })
    }
}

/// Wraps a decoded [`CallableRef`] into a [`RemoteCallable`], caching by id
/// so repeated decoding of the same ref yields the same wrapper.
pub fn wrap_callable(
    callable: &CallableRef,
    cache: &mut WrapperCache<RemoteCallable>,
    transport: Rc<Transport>,
    target: Window,
    target_origin: String,
) -> RemoteCallable {
    let id = callable.id.clone();
    let name = callable.name.clone();
    cache.get_or_insert_with(&id, move || RemoteCallable {
        id,
        name,
        transport,
        target,
        target_origin,
    })
}

//! Function Bridge call round trip, spec.md §4.2: a JS function serialized
//! into a `CallableRef`, installed behind a `forgeframe_call` handler in one
//! window, and invoked through a `RemoteCallable` from another.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use forgeframe_core::bridge::{FunctionTable, TreeNode, WrapperCache};
use forgeframe_protocol::callable::CallableRefKind;
use forgeframe_protocol::CallableRef;
use forgeframe_web::bridge::{self, JsTree};
use forgeframe_web::transport::Transport;
use js_sys::{Function, Reflect};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_test::*;
use web_sys::{HtmlIFrameElement, Window};

wasm_bindgen_test_configure!(run_in_browser);

async fn spawn_iframe_window() -> Window {
    let document = web_sys::window().expect("window").document().expect("document");
    let iframe = document
        .create_element("iframe")
        .expect("create iframe")
        .dyn_into::<HtmlIFrameElement>()
        .expect("iframe element");
    iframe.set_src("about:blank");

    let (tx, rx) = futures::channel::oneshot::channel();
    let tx = Rc::new(RefCell::new(Some(tx)));
    let onload = Closure::once(move || {
        if let Some(tx) = tx.borrow_mut().take() {
            let _ = tx.send(());
        }
    });
    iframe.set_onload(Some(onload.as_ref().unchecked_ref()));
    document.body().expect("body").append_child(&iframe).expect("append iframe");
    rx.await.expect("iframe loads");
    onload.forget();

    iframe.content_window().expect("iframe has a contentWindow")
}

fn own_origin() -> String {
    web_sys::window().unwrap().location().origin().expect("origin")
}

#[wasm_bindgen_test]
async fn remote_callable_invokes_the_producer_function_and_returns_its_result() {
    let origin = own_origin();
    let top = web_sys::window().expect("window");
    let iframe_window = spawn_iframe_window().await;

    // Producer side: a plain JS function registered in a FunctionTable,
    // reachable through the `forgeframe_call` handler.
    let table: Rc<RefCell<FunctionTable<JsTree>>> = Rc::new(RefCell::new(FunctionTable::with_default_capacity()));
    let adder: Function = js_sys::Function::new_with_args("a, b", "return a + b;");
    let mut batch = HashSet::new();
    let id = table.borrow_mut().register(JsTree(adder.into()), &mut batch);

    let producer_transport = Rc::new(Transport::new(iframe_window.clone(), origin.clone(), "producer-uid".into()));
    bridge::install_call_handler(&producer_transport, Rc::clone(&table));

    // Consumer side: a RemoteCallable pointing at the same id.
    let consumer_transport = Rc::new(Transport::new(top.clone(), origin.clone(), "consumer-uid".into()));
    let callable = CallableRef {
        kind: CallableRefKind::Function,
        id,
        name: "add".into(),
    };
    let mut cache: WrapperCache<bridge::RemoteCallable> = WrapperCache::new();
    let remote = bridge::wrap_callable(&callable, &mut cache, Rc::clone(&consumer_transport), iframe_window.clone(), origin.clone());

    let args = js_sys::Array::new();
    args.push(&JsValue::from_f64(2.0));
    args.push(&JsValue::from_f64(3.0));

    let promise = remote.call(args);
    let result = wasm_bindgen_futures::JsFuture::from(promise).await.expect("call resolves");
    assert_eq!(result.as_f64(), Some(5.0));

    producer_transport.destroy();
    consumer_transport.destroy();
}

#[wasm_bindgen_test]
async fn unknown_callable_id_rejects_the_call() {
    let origin = own_origin();
    let top = web_sys::window().expect("window");
    let iframe_window = spawn_iframe_window().await;

    let table: Rc<RefCell<FunctionTable<JsTree>>> = Rc::new(RefCell::new(FunctionTable::with_default_capacity()));
    let producer_transport = Rc::new(Transport::new(iframe_window.clone(), origin.clone(), "producer-uid".into()));
    bridge::install_call_handler(&producer_transport, table);

    let consumer_transport = Rc::new(Transport::new(top.clone(), origin.clone(), "consumer-uid".into()));
    let callable = CallableRef {
        kind: CallableRefKind::Function,
        id: "never-registered".into(),
        name: "ghost".into(),
    };
    let mut cache: WrapperCache<bridge::RemoteCallable> = WrapperCache::new();
    let remote = bridge::wrap_callable(&callable, &mut cache, Rc::clone(&consumer_transport), iframe_window.clone(), origin.clone());

    let promise = remote.call(js_sys::Array::new());
    let result = wasm_bindgen_futures::JsFuture::from(promise).await;
    assert!(result.is_err(), "calling an unregistered id must reject");

    producer_transport.destroy();
    consumer_transport.destroy();
}

#[wasm_bindgen_test]
fn serialize_for_wire_names_callable_refs_after_their_object_key() {
    let mut table: FunctionTable<JsTree> = FunctionTable::with_default_capacity();
    let mut batch = HashSet::new();

    let object = js_sys::Object::new();
    let on_ok: Function = js_sys::Function::new_no_args("return 1;");
    Reflect::set(&object, &JsValue::from_str("onOk"), &on_ok).unwrap();

    let serialized = bridge::serialize_for_wire(&object.into(), &mut table, &mut batch).expect("serializes");
    let name = serialized.get("onOk").and_then(|v| v.get("name")).and_then(|v| v.as_str());
    assert_eq!(name, Some("onOk"));
}

/// Sanity check that `JsTree::classify` matches a plain `{}`-style object,
/// independent of the transport machinery above.
#[wasm_bindgen_test]
fn js_tree_classifies_plain_objects_and_arrays() {
    let object = js_sys::Object::new();
    Reflect::set(&object, &JsValue::from_str("x"), &JsValue::from_f64(1.0)).unwrap();
    match JsTree(object.into()).classify() {
        forgeframe_core::bridge::Classification::Object(fields) => {
            assert_eq!(fields.len(), 1);
            assert_eq!(fields[0].0, "x");
        }
        _ => panic!("expected an object classification"),
    }

    let array = js_sys::Array::new();
    array.push(&JsValue::from_f64(1.0));
    array.push(&JsValue::from_f64(2.0));
    match JsTree(array.into()).classify() {
        forgeframe_core::bridge::Classification::Array(items) => assert_eq!(items.len(), 2),
        _ => panic!("expected an array classification"),
    }
}

//! `Transport` send/receive/timeout/destroy, exercised against two real
//! `web_sys::Window` objects (the test window and a same-origin `about:blank`
//! iframe) since `Transport` drives `postMessage`/`addEventListener` directly.

use std::cell::RefCell;
use std::rc::Rc;

use forgeframe_protocol::message::names;
use forgeframe_protocol::ForgeFrameError;
use forgeframe_web::transport::Transport;
use futures::channel::oneshot;
use serde_json::{json, Value};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use wasm_bindgen_test::*;
use web_sys::{HtmlIFrameElement, Window};

wasm_bindgen_test_configure!(run_in_browser);

/// Appends a same-origin `about:blank` iframe to the document and resolves
/// once it has loaded, handing back its `contentWindow`.
async fn spawn_iframe_window() -> Window {
    let document = web_sys::window().expect("window").document().expect("document");
    let iframe = document
        .create_element("iframe")
        .expect("create iframe")
        .dyn_into::<HtmlIFrameElement>()
        .expect("iframe element");
    iframe.set_src("about:blank");

    let (tx, rx) = oneshot::channel();
    let tx = Rc::new(RefCell::new(Some(tx)));
    let onload = Closure::once(move || {
        if let Some(tx) = tx.borrow_mut().take() {
            let _ = tx.send(());
        }
    });
    iframe.set_onload(Some(onload.as_ref().unchecked_ref()));

    document
        .body()
        .expect("body")
        .append_child(&iframe)
        .expect("append iframe");

    rx.await.expect("iframe loads");
    onload.forget();

    iframe.content_window().expect("iframe has a contentWindow")
}

fn own_origin() -> String {
    web_sys::window().unwrap().location().origin().expect("origin")
}

#[wasm_bindgen_test]
async fn round_trips_a_request_and_response() {
    let origin = own_origin();
    let top = web_sys::window().expect("window");
    let iframe_window = spawn_iframe_window().await;

    // The "consumer" side lives in the iframe's window, the "host" side in
    // the top window; both share the same postMessage channel.
    let host = Transport::new(top.clone(), origin.clone(), "host-uid".into());
    let consumer = Transport::new(iframe_window.clone(), origin.clone(), "consumer-uid".into());

    consumer.on(
        "greet",
        Rc::new(|data: Value, _source| {
            Box::pin(async move {
                let name = data.get("name").and_then(Value::as_str).unwrap_or("stranger").to_string();
                Ok(json!({ "greeting": format!("hello, {name}") }))
            })
        }),
    );

    let response = host
        .send(&iframe_window, &origin, "greet", json!({ "name": "world" }), None)
        .await
        .expect("request succeeds");

    assert_eq!(response, json!({ "greeting": "hello, world" }));

    host.destroy();
    consumer.destroy();
}

#[wasm_bindgen_test]
async fn unregistered_name_is_silently_dropped() {
    let origin = own_origin();
    let top = web_sys::window().expect("window");
    let iframe_window = spawn_iframe_window().await;

    let host = Transport::new(top.clone(), origin.clone(), "host-uid".into());
    let _consumer = Transport::new(iframe_window.clone(), origin.clone(), "consumer-uid".into());

    let result = host
        .send(&iframe_window, &origin, names::RESIZE, Value::Null, Some(250))
        .await;

    assert!(matches!(result, Err(ForgeFrameError::Timeout { .. })));
    host.destroy();
}

#[wasm_bindgen_test]
async fn destroyed_transport_rejects_outstanding_and_future_calls() {
    let origin = own_origin();
    let top = web_sys::window().expect("window");
    let iframe_window = spawn_iframe_window().await;

    let host = Transport::new(top.clone(), origin.clone(), "host-uid".into());

    let pending = host.send(&iframe_window, &origin, "never-answered", Value::Null, Some(5_000));
    host.destroy();
    let result = pending.await;
    assert!(matches!(result, Err(ForgeFrameError::TransportDestroyed)));

    let after = host.send(&iframe_window, &origin, "still-destroyed", Value::Null, None).await;
    assert!(matches!(after, Err(ForgeFrameError::TransportDestroyed)));
}

#[wasm_bindgen_test]
async fn messages_from_untrusted_origins_are_ignored() {
    let top = web_sys::window().expect("window");
    let iframe_window = spawn_iframe_window().await;

    // The consumer only trusts `https://nowhere.invalid`, so a request sent
    // from the real test origin must be dropped rather than handled.
    let host = Transport::new(top.clone(), own_origin(), "host-uid".into());
    let consumer = Transport::new(iframe_window.clone(), "https://nowhere.invalid".into(), "consumer-uid".into());

    consumer.on(
        "greet",
        Rc::new(|_data, _source| Box::pin(async move { Ok(Value::Null) })),
    );

    let result = host
        .send(&iframe_window, &own_origin(), "greet", Value::Null, Some(250))
        .await;

    assert!(matches!(result, Err(ForgeFrameError::Timeout { .. })));
    host.destroy();
    consumer.destroy();
}

//! Cross-window Transport, spec.md §4.1.
//!
//! Grounded on `ironposh-web::websocket` (tracing around every send/recv,
//! typed error mapping) and `ironposh-async::connection` (one oneshot per
//! pending call). Unlike a WebSocket, the underlying channel here is
//! `Window::post_message` plus a single shared `message` event listener.

use std::cell::RefCell;
use std::collections::HashMap;
use std::pin::Pin;
use std::rc::Rc;

use forgeframe_core::component::DomainMatcher;
use forgeframe_protocol::message::{names, Message, MessageKind, MessageSource, RemoteError};
use forgeframe_protocol::ForgeFrameError;
use futures::channel::oneshot;
use futures::Future;
use gloo_timers::callback::Timeout;
use serde_json::Value;
use tracing::{debug, error, info, warn};
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{MessageEvent, Window};

/// Default request timeout, spec.md §4.1.
pub const DEFAULT_TIMEOUT_MS: u32 = 10_000;

pub type BoxedHandlerFuture = Pin<Box<dyn Future<Output = Result<Value, ForgeFrameError>>>>;
pub type RequestHandler = Rc<dyn Fn(Value, MessageSource) -> BoxedHandlerFuture>;

struct PendingCall {
    sender: oneshot::Sender<Result<Value, ForgeFrameError>>,
    // Held only so the timer is cancelled (dropped) once the call settles.
    _timeout: Timeout,
}

/// Unsubscribe handle returned by [`Transport::on`].
pub struct Unsubscribe {
    name: String,
    handlers: Rc<RefCell<HashMap<String, RequestHandler>>>,
}

impl Unsubscribe {
    pub fn unsubscribe(self) {
        self.handlers.borrow_mut().remove(&self.name);
    }
}

struct Shared {
    uid: String,
    own_origin: String,
    own_window: Window,
    trusted: RefCell<Vec<DomainMatcher>>,
    pending: Rc<RefCell<HashMap<String, PendingCall>>>,
    handlers: Rc<RefCell<HashMap<String, RequestHandler>>>,
    listener: RefCell<Option<Closure<dyn FnMut(MessageEvent)>>>,
    destroyed: RefCell<bool>,
}

/// Ordered request/response exchange between two windows, spec.md §4.1.
///
/// Holds only an `Rc<Shared>` so it can be cloned freely (e.g. into a
/// [`crate::bridge::RemoteCallable`]) and `destroy`-ed through a shared
/// reference; the listener closure and pending calls live in `Shared`.
pub struct Transport {
    shared: Rc<Shared>,
}

impl Transport {
    pub fn new(own_window: Window, own_origin: String, uid: String) -> Self {
        let shared = Rc::new(Shared {
            uid,
            trusted: RefCell::new(vec![DomainMatcher::Exact(own_origin.clone())]),
            own_origin,
            own_window,
            pending: Rc::new(RefCell::new(HashMap::new())),
            handlers: Rc::new(RefCell::new(HashMap::new())),
            listener: RefCell::new(None),
            destroyed: RefCell::new(false),
        });

        let listener = install_listener(&shared.own_window, Rc::clone(&shared));
        *shared.listener.borrow_mut() = Some(listener);

        info!(uid = %shared.uid, "transport created");

        Self { shared }
    }

    pub fn add_trusted_origin(&self, matcher: DomainMatcher) {
        self.shared.trusted.borrow_mut().push(matcher);
    }

    pub fn on(&self, name: impl Into<String>, handler: RequestHandler) -> Unsubscribe {
        let name = name.into();
        self.shared.handlers.borrow_mut().insert(name.clone(), handler);
        Unsubscribe {
            name,
            handlers: Rc::clone(&self.shared.handlers),
        }
    }

    /// Fire-and-forget; no pending entry, no response expected.
    pub fn post(&self, target: &Window, target_origin: &str, name: &str, payload: Value) -> Result<(), ForgeFrameError> {
        if *self.shared.destroyed.borrow() {
            return Err(ForgeFrameError::TransportDestroyed);
        }
        let message = Message::request(name, payload, self.source());
        send_wire(target, target_origin, &message.serialize())?;
        debug!(name, "posted fire-and-forget message");
        Ok(())
    }

    /// Allocates a fresh id, registers a pending call, and resolves once a
    /// matching response (or ack) arrives, or rejects on timeout/destroy.
    pub async fn send(
        &self,
        target: &Window,
        target_origin: &str,
        name: &str,
        payload: Value,
        timeout_ms: Option<u32>,
    ) -> Result<Value, ForgeFrameError> {
        if *self.shared.destroyed.borrow() {
            return Err(ForgeFrameError::TransportDestroyed);
        }

        let message = Message::request(name, payload, self.source());
        let id = message.id.clone();
        let (tx, rx) = oneshot::channel();

        let millis = timeout_ms.unwrap_or(DEFAULT_TIMEOUT_MS);
        let pending_for_timeout = Rc::clone(&self.shared.pending);
        let timeout_id = id.clone();
        let timeout_name = name.to_string();
        let timeout = Timeout::new(millis, move || {
            if let Some(entry) = pending_for_timeout.borrow_mut().remove(&timeout_id) {
                warn!(id = %timeout_id, name = %timeout_name, millis, "request timed out");
                let _ = entry.sender.send(Err(ForgeFrameError::Timeout {
                    name: timeout_name,
                    millis: u64::from(millis),
                }));
            }
        });

        self.shared
            .pending
            .borrow_mut()
            .insert(id.clone(), PendingCall { sender: tx, _timeout: timeout });

        if let Err(err) = send_wire(target, target_origin, &message.serialize()) {
            self.shared.pending.borrow_mut().remove(&id);
            return Err(err);
        }
        debug!(id = %id, name, "sent request, awaiting response");

        rx.await.unwrap_or(Err(ForgeFrameError::TransportDestroyed))
    }

    /// Idempotent: detaches the listener, rejects every outstanding pending
    /// call, empties the handler table. Further send/post fails.
    pub fn destroy(&self) {
        if *self.shared.destroyed.borrow() {
            return;
        }
        *self.shared.destroyed.borrow_mut() = true;

        if let Some(closure) = self.shared.listener.borrow_mut().take() {
            let _ = self
                .shared
                .own_window
                .remove_event_listener_with_callback("message", closure.as_ref().unchecked_ref());
        }

        for (_, entry) in self.shared.pending.borrow_mut().drain() {
            let _ = entry.sender.send(Err(ForgeFrameError::TransportDestroyed));
        }
        self.shared.handlers.borrow_mut().clear();

        info!(uid = %self.shared.uid, "transport destroyed");
    }

    fn source(&self) -> MessageSource {
        MessageSource {
            uid: self.shared.uid.clone(),
            domain: self.shared.own_origin.clone(),
        }
    }
}

impl Drop for Transport {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn send_wire(target: &Window, target_origin: &str, wire: &str) -> Result<(), ForgeFrameError> {
    target
        .post_message(&JsValue::from_str(wire), target_origin)
        .map_err(|e| {
            error!(?e, target_origin, "post_message failed");
            ForgeFrameError::Generic(format!("post_message failed: {e:?}"))
        })
}

fn install_listener(own_window: &Window, shared: Rc<Shared>) -> Closure<dyn FnMut(MessageEvent)> {
    let own_window_for_identity = own_window.clone();
    let closure = Closure::wrap(Box::new(move |event: MessageEvent| {
        on_message(&event, &shared, &own_window_for_identity);
    }) as Box<dyn FnMut(MessageEvent)>);

    own_window
        .add_event_listener_with_callback("message", closure.as_ref().unchecked_ref())
        .expect("addEventListener never fails for a valid Window");

    closure
}

fn on_message(event: &MessageEvent, shared: &Rc<Shared>, own_window: &Window) {
    let source = event.source();

    // (a) ignore messages whose source is this window itself.
    if let Some(source) = &source {
        if js_sys::Object::is(source.as_ref(), own_window.as_ref()) {
            return;
        }
    }

    // (b) origin must be trusted.
    let origin = event.origin();
    let trusted = shared.trusted.borrow();
    if !trusted.iter().any(|matcher| matcher.matches(&origin)) {
        return;
    }
    drop(trusted);

    // (c) payload must decode to a well-formed record.
    let Some(raw) = event.data().as_string() else {
        return;
    };
    let Some(message) = Message::deserialize(&raw) else {
        return;
    };

    match message.kind {
        MessageKind::Response | MessageKind::Ack => {
            if let Some(entry) = shared.pending.borrow_mut().remove(&message.id) {
                let result = match message.error {
                    Some(err) => Err(ForgeFrameError::Remote(err.message)),
                    None => Ok(message.data),
                };
                let _ = entry.sender.send(result);
            }
        }
        MessageKind::Request => {
            // The reply must go back to whoever sent the request, not to
            // this window's own listening window.
            let Some(reply_target) = source.and_then(|s| s.dyn_into::<Window>().ok()) else {
                warn!(name = %message.name, "request had no window source, dropping");
                return;
            };
            handle_request(message, shared, &reply_target, &origin);
        }
    }
}

fn handle_request(message: Message, shared: &Rc<Shared>, reply_target: &Window, reply_origin: &str) {
    let handler = shared.handlers.borrow().get(&message.name).cloned();
    let Some(handler) = handler else {
        // spec.md §4.1: no handler registered -> silently dropped, no response.
        return;
    };

    let reply_target = reply_target.clone();
    let reply_origin = reply_origin.to_string();
    let source = message.source.clone();
    let id = message.id.clone();
    let name = message.name.clone();
    let reply_source = MessageSource {
        uid: shared.uid.clone(),
        domain: shared.own_origin.clone(),
    };

    wasm_bindgen_futures::spawn_local(async move {
        let outcome = handler(message.data, source).await;
        let reply = match outcome {
            Ok(data) => Message::response_ok(id, name.clone(), data, reply_source),
            Err(err) => {
                error!(name = %name, error = %err, "request handler failed");
                Message::response_err(id, name, RemoteError::new(err.to_string()), reply_source)
            }
        };
        let _ = send_wire(&reply_target, &reply_origin, &reply.serialize());
    });
}

/// Reserved message names re-exported for callers building handlers.
pub mod message_names {
    pub use super::names::*;
}

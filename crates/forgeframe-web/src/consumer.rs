//! Consumer Engine, spec.md §4.5. `forgeframe_core::consumer::Instance`
//! owns the pure state machine; this module drives it, owns the
//! `Transport`/`FunctionTable`, and exposes the hook points
//! (`onPrerender`/`onOpen`/`onEvent`) the excluded DOM layer calls into —
//! this crate never creates an `<iframe>` or popup itself.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use forgeframe_core::bridge::{FunctionTable, WrapperCache};
use forgeframe_core::component::ComponentDefinition;
use forgeframe_core::consumer::{Instance, InstanceState};
use forgeframe_core::params::{normalize, project_query_string, validate};
use forgeframe_core::peer::{resolve_peers, GetSiblingsOptions};
use forgeframe_core::registry::{ComponentRegistry, SerializableWindowRef, WindowRef, WindowRefTable};
use forgeframe_protocol::handshake::HandshakePayload;
use forgeframe_protocol::message::names;
use forgeframe_protocol::{CallableRef, ForgeFrameError};
use futures::channel::oneshot;
use gloo_timers::callback::Timeout;
use js_sys::Function;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;
use wasm_bindgen::prelude::*;
use web_sys::Window;

use crate::bridge::{self, JsTree, RemoteCallable};
use crate::error::WasmError;
use crate::handshake as handshake_io;
use crate::transport::{RequestHandler, Transport};
use crate::types::{ComponentOptions, PeerInfo};

thread_local! {
    static REGISTRY: RefCell<ComponentRegistry> = RefCell::new(ComponentRegistry::new());
    /// Per-process window handles keyed by instance uid, spec.md §3/§4.7.
    /// `ConsumerEngine::open` and `HostEngine::try_init` both register the
    /// window they just bound to so a `Global` reference can later resolve
    /// back to it.
    static WINDOW_REFS: RefCell<WindowRefTable<Window>> = RefCell::new(WindowRefTable::new());
}

pub(crate) fn register_window_ref(uid: String, window: Window) {
    WINDOW_REFS.with(|t| t.borrow_mut().register(uid, window));
}

pub(crate) fn unregister_window_ref(uid: &str) {
    WINDOW_REFS.with(|t| t.borrow_mut().remove(uid));
}

/// Resolution maps each wire-level [`SerializableWindowRef`] kind back to a
/// window handle or `None`, spec.md §4.7. `opener`/`parent` are resolved by
/// the caller, which is the only side that can walk `Window::opener`/
/// `Window::parent`; `Global` consults the process-wide table above.
pub fn resolve_window_ref(reference: SerializableWindowRef, opener: Option<&Window>, parent: Option<&Window>) -> Option<Window> {
    let window_ref: WindowRef<Window> = reference.into_window_ref();
    WINDOW_REFS.with(|t| window_ref.resolve(opener, parent, &t.borrow()))
}

/// Registers a component definition for later `new ConsumerEngine(...)`
/// calls, spec.md §6 consumer-facing surface.
#[wasm_bindgen(js_name = registerComponent)]
pub fn register_component(options: ComponentOptions) -> Result<(), WasmError> {
    let definition = options.into_definition()?;
    REGISTRY.with(|r| r.borrow_mut().register(definition)).map_err(WasmError::from)
}

fn own_window() -> Result<Window, WasmError> {
    web_sys::window().ok_or_else(|| WasmError::Generic("no global window".into()))
}

fn own_origin(window: &Window) -> Result<String, WasmError> {
    window
        .location()
        .origin()
        .map_err(|_| WasmError::Generic("window.location.origin unavailable".into()))
}

#[wasm_bindgen]
pub struct ConsumerEngine {
    instance: Instance,
    definition: Rc<ComponentDefinition>,
    normalized: Map<String, Value>,
    function_table: Rc<RefCell<FunctionTable<JsTree>>>,
    wrapper_cache: WrapperCache<RemoteCallable>,
    transport: Option<Rc<Transport>>,
    target: Option<Window>,
    target_origin: String,
    handshake: Option<HandshakePayload>,
    exports_from_host: Rc<RefCell<HashMap<String, CallableRef>>>,
    ready_tx: Rc<RefCell<Option<oneshot::Sender<Result<(), ForgeFrameError>>>>>,
    on_prerender: Option<Function>,
    on_open: Option<Function>,
    on_event: Option<Function>,
}

#[wasm_bindgen]
impl ConsumerEngine {
    #[wasm_bindgen(constructor)]
    pub fn new(tag: String, props: JsValue) -> Result<ConsumerEngine, WasmError> {
        let definition = REGISTRY
            .with(|r| r.borrow().get(&tag))
            .ok_or_else(|| WasmError::Core(ForgeFrameError::ContainerNotFound(tag.clone())))?;

        let own = own_window()?;
        let uid = forgeframe_protocol::ids::instance_uid(js_sys::Date::now() as u64);

        let mut function_table = FunctionTable::with_default_capacity();
        let mut batch = HashSet::new();
        let serialized = bridge::serialize_for_wire(&props, &mut function_table, &mut batch)?;
        function_table.evict_unmarked(&batch, false);

        let user_values = serialized.as_object().cloned().unwrap_or_default();
        let normalized = normalize(&definition.params, &user_values);
        let normalized = validate(&definition.params, &normalized).map_err(WasmError::from)?;

        REGISTRY.with(|r| r.borrow_mut().add_instance(&tag, uid.clone()));

        Ok(Self {
            instance: Instance::new(uid, tag),
            definition,
            normalized,
            function_table: Rc::new(RefCell::new(function_table)),
            wrapper_cache: WrapperCache::new(),
            transport: None,
            target: None,
            target_origin: own_origin(&own)?,
            handshake: None,
            exports_from_host: Rc::new(RefCell::new(HashMap::new())),
            ready_tx: Rc::new(RefCell::new(None)),
            on_prerender: None,
            on_open: None,
            on_event: None,
        })
    }

    /// Must be set before [`ConsumerEngine::open`]; handlers are wired at
    /// `open()` time.
    #[wasm_bindgen(js_name = onPrerender)]
    pub fn set_on_prerender(&mut self, callback: Function) {
        self.on_prerender = Some(callback);
    }

    #[wasm_bindgen(js_name = onOpen)]
    pub fn set_on_open(&mut self, callback: Function) {
        self.on_open = Some(callback);
    }

    /// Called with `(name: string, data: unknown)` for every forwarded
    /// host-originated event (`resize`, `focus`, `show`, `hide`, `error`).
    #[wasm_bindgen(js_name = onEvent)]
    pub fn set_on_event(&mut self, callback: Function) {
        self.on_event = Some(callback);
    }

    /// The URL the DOM layer should navigate the target window to, carrying
    /// every queryable parameter, spec.md §4.3 "Query-string projection".
    #[wasm_bindgen(js_name = resolvedUrl)]
    pub fn resolved_url(&self) -> String {
        let base = self.definition.url.resolve(&self.normalized);
        let pairs = project_query_string(&self.definition.params, &self.normalized);
        if pairs.is_empty() {
            return base;
        }
        let query = pairs
            .iter()
            .map(|(k, v)| format!("{}={}", urlencode(k), urlencode(v)))
            .collect::<Vec<_>>()
            .join("&");
        let sep = if base.contains('?') { '&' } else { '?' };
        format!("{base}{sep}{query}")
    }

    /// spec.md §4.5: re-checks the eligibility predicate (if the definition
    /// carries one) without any side effects.
    #[wasm_bindgen(js_name = isEligible)]
    pub fn is_eligible(&self) -> bool {
        self.definition.is_eligible(&self.normalized)
    }

    /// spec.md §4.5: "returns a new unrendered instance with the same
    /// parameters." Shares the definition and function table (so callable
    /// references captured in the normalized parameters stay valid) but
    /// gets its own uid, state, and Transport binding.
    #[wasm_bindgen(js_name = clone)]
    pub fn clone_instance(&self) -> ConsumerEngine {
        let uid = forgeframe_protocol::ids::instance_uid(js_sys::Date::now() as u64);
        REGISTRY.with(|r| r.borrow_mut().add_instance(&self.instance.tag, uid.clone()));
        Self {
            instance: Instance::new(uid, self.instance.tag.clone()),
            definition: Rc::clone(&self.definition),
            normalized: self.normalized.clone(),
            function_table: Rc::clone(&self.function_table),
            wrapper_cache: WrapperCache::new(),
            transport: None,
            target: None,
            target_origin: self.target_origin.clone(),
            handshake: None,
            exports_from_host: Rc::new(RefCell::new(HashMap::new())),
            ready_tx: Rc::new(RefCell::new(None)),
            on_prerender: None,
            on_open: None,
            on_event: None,
        }
    }

    /// spec.md §4.5 step 1: `CREATED -> PRERENDERED`.
    pub fn prerender(&mut self) -> Result<(), WasmError> {
        self.instance.ensure_renderable().map_err(WasmError::from)?;

        // spec.md §4.5 render precondition: re-check eligibility before
        // doing anything else.
        if !self.definition.is_eligible(&self.normalized) {
            return Err(ForgeFrameError::Ineligible(self.instance.tag.clone()).into());
        }

        let own = own_window()?;
        let consumer_domain = own_origin(&own)?;
        self.handshake = Some(HandshakePayload {
            uid: self.instance.uid.clone(),
            tag: self.instance.tag.clone(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            context: self.definition.default_mode,
            consumer_domain,
            props: Value::Object(self.normalized.clone()),
            exports: Vec::new(),
            children: None,
        });

        self.instance.transition(InstanceState::Prerendered).map_err(WasmError::from)?;
        invoke(&self.on_prerender, &[]);
        Ok(())
    }

    /// spec.md §4.5 step 2: writes the handshake into `target.name`, binds
    /// the Transport, and moves `PRERENDERED -> OPENED`. `target` is the
    /// (still unnavigated) window the excluded DOM layer created for the
    /// `<iframe>`/popup; this call must happen before it is navigated, so
    /// the host can read its own `window.name` synchronously on load.
    pub fn open(&mut self, target: Window, target_origin: String) -> Result<(), WasmError> {
        if let Some(allowed) = &self.definition.allowed_domain {
            if !allowed.matches(&target_origin) {
                return Err(ForgeFrameError::Ineligible(target_origin).into());
            }
        }

        let payload = self
            .handshake
            .clone()
            .ok_or_else(|| WasmError::InvalidArgument("prerender() must run before open()".into()))?;
        handshake_io::write(&target, &payload)?;

        let own = own_window()?;
        let transport = Rc::new(Transport::new(own, target_origin.clone(), self.instance.uid.clone()));
        self.install_handlers(&transport);

        // spec.md §4.5 step 2: register the opened window under the
        // instance uid so a `Global` reference can resolve back to it.
        register_window_ref(self.instance.uid.clone(), target.clone());

        self.transport = Some(transport);
        self.target = Some(target);
        self.target_origin = target_origin;

        self.instance.transition(InstanceState::Opened).map_err(WasmError::from)?;
        invoke(&self.on_open, &[]);
        Ok(())
    }

    /// Resolves once the host's `forgeframe_init` request arrives (`OPENED
    /// -> READY`), or rejects once `initTimeoutMs` elapses.
    #[wasm_bindgen(js_name = awaitReady)]
    pub fn await_ready(&mut self) -> js_sys::Promise {
        let (tx, rx) = oneshot::channel();
        *self.ready_tx.borrow_mut() = Some(tx);

        let ready_tx = Rc::clone(&self.ready_tx);
        let millis = self.definition.init_timeout_ms as u32;
        Timeout::new(millis, move || {
            if let Some(tx) = ready_tx.borrow_mut().take() {
                let _ = tx.send(Err(ForgeFrameError::Timeout {
                    name: names::INIT.to_string(),
                    millis: u64::from(millis),
                }));
            }
        })
        .forget();

        wasm_bindgen_futures::future_to_promise(async move {
            match rx.await {
                Ok(Ok(())) => Ok(JsValue::UNDEFINED),
                Ok(Err(e)) => Err(WasmError::from(e).into()),
                Err(_) => Err(WasmError::Generic("consumer destroyed before ready".into()).into()),
            }
        })
    }

    /// spec.md §4.5: `READY <-> UPDATING`, re-sends the full normalized
    /// parameter record.
    #[wasm_bindgen(js_name = updateProps)]
    pub async fn update_props(&mut self, props: JsValue) -> Result<(), WasmError> {
        self.instance.ensure_ready().map_err(WasmError::from)?;
        self.instance.transition(InstanceState::Updating).map_err(WasmError::from)?;

        let mut batch = HashSet::new();
        let serialized = {
            let mut table = self.function_table.borrow_mut();
            bridge::serialize_for_wire(&props, &mut table, &mut batch)?
        };
        self.function_table.borrow_mut().evict_unmarked(&batch, true);

        let user_values = serialized.as_object().cloned().unwrap_or_default();
        let normalized = normalize(&self.definition.params, &user_values);
        let normalized = validate(&self.definition.params, &normalized).map_err(WasmError::from)?;

        let bound = self.bound();
        let send_result = match &bound {
            Ok((transport, target, origin)) => {
                transport
                    .send(target, origin, names::PROPS, Value::Object(normalized.clone()), None)
                    .await
            }
            Err(_) => Err(ForgeFrameError::TransportDestroyed),
        };

        // Whatever the outcome, the instance must not get stuck in
        // `Updating` — fall back to `Ready` before surfacing the error.
        self.instance.transition(InstanceState::Ready).map_err(WasmError::from)?;
        send_result.map_err(WasmError::from)?;

        self.normalized = normalized;
        Ok(())
    }

    /// Idempotent teardown, spec.md §4.5. No-op (returns `false`) if
    /// already destroyed.
    pub async fn close(&mut self) -> Result<bool, WasmError> {
        if self.instance.is_destroyed() {
            return Ok(false);
        }
        if let Ok((transport, target, origin)) = self.bound() {
            let _ = transport.send(&target, &origin, names::CLOSE, Value::Null, Some(2_000)).await;
        }
        self.instance.close().map_err(WasmError::from)?;
        if let Some(transport) = self.transport.take() {
            transport.destroy();
        }
        unregister_window_ref(&self.instance.uid);
        REGISTRY.with(|r| r.borrow_mut().remove_instance(&self.instance.tag, &self.instance.uid));
        info!(uid = %self.instance.uid, "consumer instance closed");
        Ok(true)
    }

    #[wasm_bindgen(js_name = getSiblings)]
    pub fn get_siblings(&self, any_consumer: bool) -> Vec<PeerInfo> {
        // spec.md §9 open question, resolved in DESIGN.md: peer discovery
        // always stays local-consumer-only regardless of this flag.
        let _ = any_consumer;
        REGISTRY.with(|r| {
            let registry = r.borrow();
            resolve_peers(&registry, &self.instance.tag, &self.instance.uid, |_| None)
                .into_iter()
                .map(PeerInfo::from)
                .collect()
        })
    }

    /// Looks up a function the host exported via `forgeframe_export`.
    #[wasm_bindgen(js_name = getExport)]
    pub fn get_export(&mut self, name: String) -> Option<RemoteCallable> {
        let callable = self.exports_from_host.borrow().get(&name).cloned()?;
        let (transport, target, origin) = self.bound().ok()?;
        Some(bridge::wrap_callable(&callable, &mut self.wrapper_cache, transport, target, origin))
    }

    pub fn state(&self) -> String {
        format!("{:?}", self.instance.state())
    }
}

impl ConsumerEngine {
    fn bound(&self) -> Result<(Rc<Transport>, Window, String), WasmError> {
        let transport = self
            .transport
            .clone()
            .ok_or_else(|| WasmError::InvalidArgument("open() has not run yet".into()))?;
        let target = self
            .target
            .clone()
            .ok_or_else(|| WasmError::InvalidArgument("open() has not run yet".into()))?;
        Ok((transport, target, self.target_origin.clone()))
    }

    fn install_handlers(&self, transport: &Transport) {
        let ready_tx = Rc::clone(&self.ready_tx);
        let init_handler: RequestHandler = Rc::new(move |_data, _source| {
            if let Some(tx) = ready_tx.borrow_mut().take() {
                let _ = tx.send(Ok(()));
            }
            Box::pin(async move { Ok(Value::Null) })
        });
        transport.on(names::INIT, init_handler);

        bridge::install_call_handler(transport, Rc::clone(&self.function_table));

        let exports_from_host = Rc::clone(&self.exports_from_host);
        let export_handler: RequestHandler = Rc::new(move |data, _source| {
            let exports_from_host = Rc::clone(&exports_from_host);
            Box::pin(async move {
                if let Ok(payload) = serde_json::from_value::<ExportPayload>(data) {
                    let mut map = exports_from_host.borrow_mut();
                    for callable in payload.exports {
                        map.insert(callable.name.clone(), callable);
                    }
                }
                Ok(Value::Null)
            })
        });
        transport.on(names::EXPORT, export_handler);

        let tag = self.instance.tag.clone();
        let uid = self.instance.uid.clone();
        let siblings_handler: RequestHandler = Rc::new(move |data, _source| {
            let tag = tag.clone();
            let uid = uid.clone();
            Box::pin(async move {
                let _options: GetSiblingsOptions = serde_json::from_value(data).unwrap_or_default();
                let peers = REGISTRY.with(|r| {
                    let registry = r.borrow();
                    resolve_peers(&registry, &tag, &uid, |_| None)
                });
                serde_json::to_value(&peers).map_err(|e| ForgeFrameError::Generic(e.to_string()))
            })
        });
        transport.on(names::GET_SIBLINGS, siblings_handler);

        for name in [names::RESIZE, names::FOCUS, names::SHOW, names::HIDE, names::ERROR] {
            let forwarded = name.to_string();
            let on_event = self.on_event.clone();
            let handler: RequestHandler = Rc::new(move |data, _source| {
                let forwarded = forwarded.clone();
                let on_event = on_event.clone();
                Box::pin(async move {
                    if let Some(callback) = &on_event {
                        let name_js = JsValue::from_str(&forwarded);
                        let data_js = serde_wasm_bindgen::to_value(&data).unwrap_or(JsValue::NULL);
                        let args = js_sys::Array::of2(&name_js, &data_js);
                        let _ = callback.apply(&JsValue::UNDEFINED, &args);
                    }
                    Ok(Value::Null)
                })
            });
            transport.on(name, handler);
        }

        info!(uid = %self.instance.uid, "consumer handlers installed");
    }
}

#[derive(Deserialize)]
struct ExportPayload {
    exports: Vec<CallableRef>,
}

fn invoke(callback: &Option<Function>, args: &[JsValue]) {
    if let Some(f) = callback {
        let array = js_sys::Array::new();
        for a in args {
            array.push(a);
        }
        let _ = f.apply(&JsValue::UNDEFINED, &array);
    }
}

fn urlencode(s: &str) -> String {
    utf8_percent_encode(s, NON_ALPHANUMERIC).to_string()
}

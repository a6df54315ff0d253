//! Host Engine, spec.md §4.6. `forgeframe_core::host` owns the pure
//! dormancy/PROPS-merge bookkeeping; this module resolves the consumer
//! window from `window.name`, drives the Transport, and exposes the
//! JS-facing surface a host page embeds on load.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use forgeframe_core::bridge::{FunctionTable, WrapperCache};
use forgeframe_core::builtin::builtin_definitions;
use forgeframe_core::component::ParameterDefinition;
use forgeframe_core::host::{HostInstance, HostState};
use forgeframe_core::params::{normalize, validate};
use forgeframe_core::peer::GetSiblingsOptions;
use forgeframe_protocol::callable::CallableRefKind;
use forgeframe_protocol::handshake::RenderingMode;
use forgeframe_protocol::message::names;
use forgeframe_protocol::{CallableRef, ForgeFrameError};
use js_sys::Function;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::info;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::Window;

use crate::bridge::{self, JsTree, RemoteCallable};
use crate::consumer::{register_window_ref, unregister_window_ref};
use crate::error::WasmError;
use crate::handshake as handshake_io;
use crate::transport::{RequestHandler, Transport};
use crate::types::{ComponentOptions, PeerInfo};

const DEFAULT_INIT_TIMEOUT_MS: u32 = 10_000;

fn own_window() -> Result<Window, WasmError> {
    web_sys::window().ok_or_else(|| WasmError::Generic("no global window".into()))
}

/// Resolves the window this page was opened/framed by, per the handshake's
/// `context`. The consumer always writes the handshake into exactly one of
/// these before navigating the target, so only the matching one is tried.
fn resolve_consumer_window(own: &Window, context: RenderingMode) -> Result<Window, WasmError> {
    let unresolvable = || WasmError::Core(ForgeFrameError::ConsumerUnresolvable);
    match context {
        RenderingMode::Popup => {
            let opener = own.opener().map_err(|_| unresolvable())?;
            opener.dyn_into::<Window>().map_err(|_| unresolvable())
        }
        RenderingMode::Iframe => {
            let parent = own.parent().map_err(|_| unresolvable())?;
            match parent {
                Some(p) if !js_sys::Object::is(p.as_ref(), own.as_ref()) => Ok(p),
                _ => Err(unresolvable()),
            }
        }
    }
}

#[wasm_bindgen]
pub struct HostEngine {
    instance: HostInstance,
    defs: HashMap<String, ParameterDefinition>,
    props: Rc<RefCell<Map<String, Value>>>,
    transport: Rc<Transport>,
    consumer: Window,
    consumer_origin: String,
    function_table: Rc<RefCell<FunctionTable<JsTree>>>,
    wrapper_cache: WrapperCache<RemoteCallable>,
    exports_from_consumer: Rc<RefCell<HashMap<String, CallableRef>>>,
    on_props: Option<Function>,
    on_close: Option<Function>,
}

#[wasm_bindgen]
impl HostEngine {
    /// `None` means `window.name` carries no handshake payload: the page
    /// was loaded directly, not embedded, and the host module should stay
    /// dormant, spec.md §4.6.
    #[wasm_bindgen(js_name = tryInit)]
    pub async fn try_init(options: ComponentOptions) -> Result<Option<HostEngine>, WasmError> {
        let own = own_window()?;
        let Some(payload) = handshake_io::read(&own) else {
            return Ok(None);
        };

        let definition = options.into_definition()?;
        let mut defs = builtin_definitions();
        defs.extend(definition.params.clone());

        let user_values = payload.props.as_object().cloned().unwrap_or_default();
        let normalized = normalize(&defs, &user_values);

        let mut instance = HostInstance::new(payload.uid.clone(), payload.tag.clone());
        let props = match validate(&defs, &normalized) {
            Ok(validated) => validated,
            Err(err) => {
                instance.mark_failed(err);
                normalized
            }
        };

        let transport = Rc::new(Transport::new(own.clone(), payload.consumer_domain.clone(), payload.uid.clone()));
        let props = Rc::new(RefCell::new(props));
        let function_table = Rc::new(RefCell::new(FunctionTable::with_default_capacity()));
        let exports_from_consumer = Rc::new(RefCell::new(HashMap::new()));

        // spec.md §5(a): handlers must be installed before the consumer
        // window is resolved, so a request arriving mid-resolution is never
        // dropped for lack of a registered handler.
        Self::install_handlers_on(&transport, &defs, &props, &function_table, &exports_from_consumer);

        let consumer = resolve_consumer_window(&own, payload.context)?;

        // spec.md §4.7: register this window under the instance uid so a
        // `Global` reference can resolve back to it.
        register_window_ref(instance.uid.clone(), own);

        let mut engine = Self {
            instance,
            defs,
            props,
            transport,
            consumer,
            consumer_origin: payload.consumer_domain,
            function_table,
            wrapper_cache: WrapperCache::new(),
            exports_from_consumer,
            on_props: None,
            on_close: None,
        };

        if engine.instance.state() != HostState::Failed {
            // spec.md §4.6: a failed INIT is retained as `initError`, not
            // propagated — the host page still gets a usable engine back.
            let _ = engine.signal_init().await;
        }
        Ok(Some(engine))
    }

    #[wasm_bindgen(js_name = onProps)]
    pub fn set_on_props(&mut self, callback: Function) {
        self.on_props = Some(callback);
    }

    #[wasm_bindgen(js_name = onClose)]
    pub fn set_on_close(&mut self, callback: Function) {
        self.on_close = Some(callback);
    }

    #[wasm_bindgen(js_name = getProps)]
    pub fn get_props(&self) -> Result<JsValue, WasmError> {
        serde_wasm_bindgen::to_value(&*self.props.borrow()).map_err(WasmError::from)
    }

    pub fn state(&self) -> String {
        format!("{:?}", self.instance.state())
    }

    #[wasm_bindgen(js_name = initError)]
    pub fn init_error(&self) -> Option<String> {
        self.instance.init_error.as_ref().map(|e| e.to_string())
    }

    /// Exposes a host-side function to the consumer, sending a
    /// `forgeframe_export` notification, spec.md §4.2.
    #[wasm_bindgen(js_name = bindExport)]
    pub fn bind_export(&mut self, name: String, func: Function) -> Result<(), WasmError> {
        let mut batch = HashSet::new();
        let id = self
            .function_table
            .borrow_mut()
            .register(JsTree(func.into()), &mut batch);
        let callable = CallableRef {
            kind: CallableRefKind::Function,
            id,
            name: name.clone(),
        };
        let payload = serde_json::json!({ "exports": [callable] });
        self.transport
            .post(&self.consumer, &self.consumer_origin, names::EXPORT, payload)
            .map_err(WasmError::from)
    }

    /// Looks up a function the consumer exported to the host.
    #[wasm_bindgen(js_name = getExport)]
    pub fn get_export(&mut self, name: String) -> Option<RemoteCallable> {
        let callable = self.exports_from_consumer.borrow().get(&name).cloned()?;
        Some(bridge::wrap_callable(
            &callable,
            &mut self.wrapper_cache,
            Rc::clone(&self.transport),
            self.consumer.clone(),
            self.consumer_origin.clone(),
        ))
    }

    #[wasm_bindgen(js_name = getSiblings)]
    pub async fn get_siblings(&self, any_consumer: bool) -> Result<Vec<PeerInfo>, WasmError> {
        let payload = serde_json::to_value(GetSiblingsOptions { any_consumer }).expect("options serialize");
        let result = self
            .transport
            .send(&self.consumer, &self.consumer_origin, names::GET_SIBLINGS, payload, None)
            .await
            .map_err(WasmError::from)?;
        let peers: Vec<forgeframe_core::peer::PeerInfo> =
            serde_json::from_value(result).map_err(|e| WasmError::Generic(e.to_string()))?;
        Ok(peers.into_iter().map(PeerInfo::from).collect())
    }

    /// Closes the Transport; idempotent.
    pub fn close(&self) {
        unregister_window_ref(&self.instance.uid);
        self.transport.destroy();
    }
}

impl HostEngine {
    async fn signal_init(&mut self) -> Result<(), WasmError> {
        let payload = serde_json::json!({ "uid": self.instance.uid });
        let result = self
            .transport
            .send(&self.consumer, &self.consumer_origin, names::INIT, payload, Some(DEFAULT_INIT_TIMEOUT_MS))
            .await;
        match result {
            Ok(_) => {
                self.instance.mark_ready();
                info!(uid = %self.instance.uid, "host signaled init, consumer acked");
                Ok(())
            }
            Err(err) => {
                self.instance.mark_failed(err.clone());
                Err(WasmError::from(err))
            }
        }
    }

    /// Installs the PROPS/CLOSE/CALL/EXPORT handlers. A free function rather
    /// than a method so `try_init` can install them before `Self` exists,
    /// spec.md §5(a): handler installation must precede window resolution.
    /// `on_props`/`on_close` are always `None` at this point — callers only
    /// set them via [`Self::set_on_props`]/[`Self::set_on_close`] after
    /// `tryInit` resolves, before any message event can fire.
    fn install_handlers_on(
        transport: &Rc<Transport>,
        defs: &HashMap<String, ParameterDefinition>,
        props: &Rc<RefCell<Map<String, Value>>>,
        function_table: &Rc<RefCell<FunctionTable<JsTree>>>,
        exports_from_consumer: &Rc<RefCell<HashMap<String, CallableRef>>>,
    ) {
        let defs = defs.clone();
        let props_for_handler = Rc::clone(props);
        let props_handler: RequestHandler = Rc::new(move |data, _source| {
            let defs = defs.clone();
            let props = Rc::clone(&props_for_handler);
            Box::pin(async move {
                let partial: Map<String, Value> = match data {
                    Value::Object(map) => map,
                    _ => return Err(ForgeFrameError::MalformedMessage("props payload must be an object".into())),
                };
                let mut current = props.borrow_mut();
                forgeframe_core::host::apply_props_update(&mut current, &defs, partial)?;
                Ok(Value::Null)
            })
        });
        transport.on(names::PROPS, props_handler);

        let close_handler: RequestHandler = Rc::new(move |_data, _source| Box::pin(async move { Ok(Value::Null) }));
        transport.on(names::CLOSE, close_handler);

        bridge::install_call_handler(transport, Rc::clone(function_table));

        let exports_from_consumer = Rc::clone(exports_from_consumer);
        let export_handler: RequestHandler = Rc::new(move |data, _source| {
            let exports_from_consumer = Rc::clone(&exports_from_consumer);
            Box::pin(async move {
                if let Ok(payload) = serde_json::from_value::<ExportPayload>(data) {
                    let mut map = exports_from_consumer.borrow_mut();
                    for callable in payload.exports {
                        map.insert(callable.name.clone(), callable);
                    }
                }
                Ok(Value::Null)
            })
        });
        transport.on(names::EXPORT, export_handler);

        info!("host handlers installed");
    }
}

#[derive(Deserialize)]
struct ExportPayload {
    exports: Vec<CallableRef>,
}

impl Drop for HostEngine {
    fn drop(&mut self) {
        self.transport.destroy();
    }
}

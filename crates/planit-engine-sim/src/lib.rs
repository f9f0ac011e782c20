//! PLANit engine simulator.
//!
//! An in-memory engine that speaks the gateway protocol. It hands out the same
//! remote types the real engine does, validates and records configuration
//! calls, and answers memory-output queries with canned results. It does not
//! run any assignment algorithm.
//!
//! `SimEngine` implements `GatewayDispatch`, so it can be served in-process with
//! `GatewayServer::start` or out-of-process through the `planit-engine-sim`
//! binary.

pub mod behavior;
pub mod space;

use async_trait::async_trait;
use behavior::Call;
use planit_core::enums::EnumCatalog;
use planit_core::gateway::protocol::{methods, CreateEnumParams, InvokeParams};
use planit_core::gateway::{GatewayDispatch, HelloInfo};
use planit_core::wrappers::PlanitJ2Py;
use planit_core::{GatewayConfig, MappingKind, PlanitError, RemoteHandle, WireValue};
use space::ObjectSpace;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::Notify;
use tracing::{debug, info};

/// Engine name reported by `gateway.hello`.
pub const ENGINE_NAME: &str = "planit-engine-sim";

/// A request the engine received, in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum LoggedRequest {
    CreateEnum {
        class: String,
        value: String,
    },
    Invoke {
        class: String,
        method: String,
        args: Vec<WireValue>,
    },
}

impl LoggedRequest {
    /// `class.method` for invocations, `class.VALUE` for enum creation.
    pub fn describe(&self) -> String {
        match self {
            LoggedRequest::CreateEnum { class, value } => format!("{}.{}", class, value),
            LoggedRequest::Invoke { class, method, .. } => format!("{}.{}", class, method),
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    space: ObjectSpace,
    root: Option<RemoteHandle>,
    log: Vec<LoggedRequest>,
}

/// Simulated engine state.
#[derive(Debug, Default)]
pub struct SimEngine {
    state: Mutex<SimState>,
    shutdown: Notify,
    shutdown_requests: AtomicUsize,
}

impl SimEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, SimState>, PlanitError> {
        self.state
            .lock()
            .map_err(|_| PlanitError::Other("engine state poisoned".to_string()))
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<LoggedRequest> {
        self.lock().map(|state| state.log.clone()).unwrap_or_default()
    }

    /// Invoked remote methods as `class.method`, in order.
    pub fn invocations(&self) -> Vec<String> {
        self.requests()
            .iter()
            .filter(|request| matches!(request, LoggedRequest::Invoke { .. }))
            .map(LoggedRequest::describe)
            .collect()
    }

    /// Property of a live object.
    pub fn property(&self, id: &str, key: &str) -> Option<WireValue> {
        self.lock()
            .ok()
            .and_then(|state| state.space.prop(id, key).cloned())
    }

    /// Live objects of a remote type, in creation order.
    pub fn objects_of(&self, class: &str) -> Vec<RemoteHandle> {
        self.lock()
            .map(|state| state.space.handles_of(class))
            .unwrap_or_default()
    }

    pub fn shutdown_requests(&self) -> usize {
        self.shutdown_requests.load(Ordering::SeqCst)
    }

    /// Resolves once `gateway.shutdown` has been received.
    pub async fn wait_for_shutdown(&self) {
        self.shutdown.notified().await;
    }

    fn handle(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value, PlanitError> {
        match method {
            methods::HELLO => Ok(serde_json::to_value(HelloInfo {
                protocol: GatewayConfig::PROTOCOL_VERSION.to_string(),
                engine: ENGINE_NAME.to_string(),
            })?),
            methods::ENTRY_POINT => {
                let mut state = self.lock()?;
                let root = match state.root.clone() {
                    Some(root) => root,
                    None => {
                        let root = state.space.create(PlanitJ2Py::SPEC.remote_type);
                        state.root = Some(root.clone());
                        root
                    }
                };
                Ok(serde_json::to_value(WireValue::Object(root))?)
            }
            methods::CREATE_ENUM => {
                let params: CreateEnumParams = Self::params(params)?;
                let mut state = self.lock()?;
                state.log.push(LoggedRequest::CreateEnum {
                    class: params.enum_class.clone(),
                    value: params.value.clone(),
                });
                match EnumCatalog::by_remote_class(&params.enum_class) {
                    Some(spec) if spec.contains(&params.value) => {
                        let handle = state.space.enum_instance(&params.enum_class, &params.value);
                        Ok(serde_json::to_value(WireValue::Object(handle))?)
                    }
                    _ => Err(PlanitError::mapping(
                        MappingKind::EnumValue,
                        format!("{}.{}", params.enum_class, params.value),
                    )),
                }
            }
            methods::INVOKE => {
                let params: InvokeParams = Self::params(params)?;
                let mut state = self.lock()?;
                state.log.push(LoggedRequest::Invoke {
                    class: params.target.type_name.clone(),
                    method: params.method.clone(),
                    args: params.args.clone(),
                });
                debug!("Invoke {}.{}", params.target.short_type_name(), params.method);
                let call = Call {
                    target: &params.target,
                    method: &params.method,
                    args: &params.args,
                };
                let result = behavior::invoke(&mut state.space, &call)?;
                Ok(serde_json::to_value(result)?)
            }
            methods::SHUTDOWN => {
                info!("Shutdown requested");
                self.shutdown_requests.fetch_add(1, Ordering::SeqCst);
                self.shutdown.notify_one();
                Ok(serde_json::Value::Null)
            }
            other => Err(PlanitError::mapping(
                MappingKind::Operation,
                other.to_string(),
            )),
        }
    }

    fn params<T: serde::de::DeserializeOwned>(params: serde_json::Value) -> Result<T, PlanitError> {
        serde_json::from_value(params).map_err(|e| PlanitError::Validation {
            field: "params".to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl GatewayDispatch for SimEngine {
    async fn dispatch(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<serde_json::Value, PlanitError> {
        self.handle(method, params)
    }
}

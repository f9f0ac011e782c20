//! TCP channel to a running engine.
//!
//! One `Channel` exists per engine state and every proxy shares it. The wire
//! protocol does not multiplex, so the stream sits behind a tokio `Mutex` held
//! for the whole write/read cycle of a request.
//!
//! A transport failure closes the channel for good. Closing also wakes any
//! in-flight call, which then fails with a channel error instead of hanging.

use super::protocol::{
    check_frame_size, codes, methods, read_frame, write_frame, CreateEnumParams, GatewayError,
    GatewayRequest, GatewayResponse, HelloInfo, InvokeParams,
};
use crate::config::GatewayConfig;
use crate::error::MappingKind;
use crate::value::{RemoteHandle, WireValue};
use crate::{PlanitError, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{watch, Mutex};
use tracing::{debug, warn};

/// Pseudo target type used in error context for gateway-level requests.
const GATEWAY_TARGET: &str = "gateway";

/// Shared request/response link to the engine.
#[derive(Debug)]
pub struct Channel {
    stream: Mutex<TcpStream>,
    addr: SocketAddr,
    next_id: AtomicU64,
    closed_tx: watch::Sender<bool>,
}

impl Channel {
    /// Connect to an engine gateway server.
    ///
    /// A refused or timed-out connection is a startup failure: no channel
    /// existed yet.
    pub async fn connect(addr: SocketAddr, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| {
                PlanitError::startup(format!(
                    "timed out connecting to engine gateway at {} after {:?}",
                    addr, timeout
                ))
            })?
            .map_err(|e| {
                PlanitError::startup(format!("cannot connect to engine gateway at {}: {}", addr, e))
            })?;
        stream.set_nodelay(true)?;

        debug!("Channel connected to engine gateway at {}", addr);

        let (closed_tx, _) = watch::channel(false);
        Ok(Self {
            stream: Mutex::new(stream),
            addr,
            next_id: AtomicU64::new(1),
            closed_tx,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn is_closed(&self) -> bool {
        *self.closed_tx.borrow()
    }

    /// Close the channel. In-flight and later calls fail with a channel error.
    pub fn close(&self) {
        if !self.closed_tx.send_replace(true) {
            debug!("Channel to {} closed", self.addr);
        }
    }

    /// Ask the engine for its protocol version and identity.
    pub async fn hello(&self) -> Result<HelloInfo> {
        let response = self
            .round_trip(methods::HELLO, serde_json::json!({}), "gateway.hello")
            .await?;
        let result = Self::into_result(response, GATEWAY_TARGET, "hello", Vec::new())?;
        serde_json::from_value(result).map_err(|e| {
            self.close();
            PlanitError::channel_lost("gateway.hello", format!("malformed hello reply: {}", e))
        })
    }

    /// Fetch the engine's root object.
    pub async fn entry_point(&self) -> Result<RemoteHandle> {
        let response = self
            .round_trip(methods::ENTRY_POINT, serde_json::json!({}), "gateway.entryPoint")
            .await?;
        let result = Self::into_result(response, GATEWAY_TARGET, "entryPoint", Vec::new())?;
        match self.decode_value(result, "gateway.entryPoint")? {
            WireValue::Object(handle) => Ok(handle),
            other => Err(PlanitError::mapping(
                MappingKind::ReturnValue,
                format!("gateway.entryPoint returned {}", other.type_label()),
            )),
        }
    }

    /// Invoke `method` on the remote object behind `target`.
    pub async fn invoke(
        &self,
        target: &RemoteHandle,
        method: &str,
        args: Vec<WireValue>,
    ) -> Result<WireValue> {
        let operation = format!("{}.{}", target.type_name, method);
        let arg_types: Vec<String> = args.iter().map(WireValue::type_label).collect();
        let params = serde_json::to_value(InvokeParams {
            target: target.clone(),
            method: method.to_string(),
            args,
        })?;

        debug!("Invoking {} on {}", operation, target.id);
        let response = self.round_trip(methods::INVOKE, params, &operation).await?;
        let result = Self::into_result(response, &target.type_name, method, arg_types)?;
        self.decode_value(result, &operation)
    }

    /// Construct a remote enum instance.
    pub async fn create_enum(&self, enum_class: &str, value: &str) -> Result<RemoteHandle> {
        let operation = format!("{}.{}", enum_class, value);
        let params = serde_json::to_value(CreateEnumParams {
            enum_class: enum_class.to_string(),
            value: value.to_string(),
        })?;

        debug!("Creating remote enum {}", operation);
        let response = self
            .round_trip(methods::CREATE_ENUM, params, &operation)
            .await?;
        let result = match Self::into_result(
            response,
            GATEWAY_TARGET,
            "createEnum",
            vec!["string".to_string(), "string".to_string()],
        ) {
            Err(PlanitError::RemoteInvocation {
                code: codes::UNKNOWN_ENUM,
                ..
            }) => return Err(PlanitError::mapping(MappingKind::EnumValue, operation)),
            other => other?,
        };

        match self.decode_value(result, &operation)? {
            WireValue::Object(handle) => Ok(handle),
            other => Err(PlanitError::mapping(
                MappingKind::ReturnValue,
                format!("createEnum({}) returned {}", operation, other.type_label()),
            )),
        }
    }

    /// Close the channel and, if no call is in flight, ask the engine to exit.
    ///
    /// Does nothing on a channel that is already closed.
    ///
    /// Returns whether the shutdown request was answered.
    pub async fn close_and_request_shutdown(&self) -> bool {
        let guard = self.stream.try_lock();
        if self.closed_tx.send_replace(true) {
            return false;
        }
        debug!("Channel to {} closed", self.addr);

        let mut stream = match guard {
            Ok(stream) => stream,
            Err(_) => {
                debug!("Channel busy; skipping engine shutdown request");
                return false;
            }
        };

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = GatewayRequest::new(methods::SHUTDOWN, serde_json::json!({}), id);
        let bytes = match serde_json::to_vec(&request) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        let exchange = async {
            let (mut reader, mut writer) = stream.split();
            write_frame(&mut writer, &bytes).await?;
            read_frame(&mut reader).await
        };

        match tokio::time::timeout(GatewayConfig::SHUTDOWN_REQUEST_TIMEOUT, exchange).await {
            Ok(Ok(Some(_))) => true,
            Ok(Ok(None)) => false,
            Ok(Err(e)) => {
                warn!("Engine shutdown request failed: {}", e);
                false
            }
            Err(_) => {
                warn!("Engine did not answer the shutdown request in time");
                false
            }
        }
    }

    /// Send one request and read its response.
    ///
    /// Any transport failure closes the channel and becomes a channel error
    /// naming `operation`. A request too large to frame fails with a
    /// validation error before anything is sent.
    async fn round_trip(
        &self,
        method: &str,
        params: serde_json::Value,
        operation: &str,
    ) -> Result<GatewayResponse> {
        let mut closed_rx = self.closed_tx.subscribe();
        if *closed_rx.borrow_and_update() {
            return Err(PlanitError::channel_lost(operation, "channel is closed"));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = GatewayRequest::new(method, params, id);
        let request_bytes = serde_json::to_vec(&request)?;
        // Oversized requests never reach the wire; the connection stays usable.
        check_frame_size(request_bytes.len())?;

        let cycle = async {
            let mut stream = self.stream.lock().await;
            if self.is_closed() {
                return Err(PlanitError::channel_lost(operation, "channel is closed"));
            }
            let (mut reader, mut writer) = stream.split();

            write_frame(&mut writer, &request_bytes)
                .await
                .map_err(|e| PlanitError::channel_lost(operation, e.to_string()))?;

            let response_bytes = read_frame(&mut reader)
                .await
                .map_err(|e| PlanitError::channel_lost(operation, e.to_string()))?
                .ok_or_else(|| PlanitError::channel_lost(operation, "engine closed the connection"))?;

            let response: GatewayResponse = serde_json::from_slice(&response_bytes).map_err(|e| {
                PlanitError::channel_lost(operation, format!("unparsable response: {}", e))
            })?;

            if response.id != request.id {
                return Err(PlanitError::channel_lost(
                    operation,
                    format!("response id {:?} does not match request id {}", response.id, id),
                ));
            }
            Ok(response)
        };

        let outcome = tokio::select! {
            biased;
            _ = closed_rx.wait_for(|closed| *closed) => {
                Err(PlanitError::channel_lost(operation, "channel closed while the call was in flight"))
            }
            result = cycle => result,
        };

        if let Err(e) = &outcome {
            if e.is_channel_error() && !self.is_closed() {
                warn!("Engine channel to {} lost: {}", self.addr, e);
                self.close();
            }
        }
        outcome
    }

    /// Split a response into its result or a caller-facing error.
    fn into_result(
        response: GatewayResponse,
        target_type: &str,
        method: &str,
        arg_types: Vec<String>,
    ) -> Result<serde_json::Value> {
        if let Some(GatewayError { code, message, .. }) = response.error {
            return Err(PlanitError::RemoteInvocation {
                target_type: target_type.to_string(),
                method: method.to_string(),
                arg_types,
                code,
                message,
            });
        }
        Ok(response.result.unwrap_or(serde_json::Value::Null))
    }

    fn decode_value(&self, result: serde_json::Value, operation: &str) -> Result<WireValue> {
        serde_json::from_value(result).map_err(|e| {
            self.close();
            PlanitError::channel_lost(operation, format!("malformed value: {}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::server::{GatewayDispatch, GatewayServer};
    use std::sync::Arc;
    use tokio::sync::Notify;

    const ROOT_CLASS: &str = "org.planit.python.PLANitJ2Py";

    /// Minimal engine: one root object, `echo` and `fail` methods, one enum.
    struct TestDispatch {
        release: Arc<Notify>,
    }

    #[async_trait::async_trait]
    impl GatewayDispatch for TestDispatch {
        async fn dispatch(
            &self,
            method: &str,
            params: serde_json::Value,
        ) -> std::result::Result<serde_json::Value, PlanitError> {
            match method {
                methods::HELLO => Ok(serde_json::json!({"protocol": "1", "engine": "test"})),
                methods::ENTRY_POINT => Ok(serde_json::to_value(WireValue::Object(
                    RemoteHandle::new("root", ROOT_CLASS),
                ))?),
                methods::INVOKE => {
                    let params: InvokeParams = serde_json::from_value(params)?;
                    match params.method.as_str() {
                        "echo" => Ok(serde_json::to_value(
                            params.args.into_iter().next().unwrap_or(WireValue::Null),
                        )?),
                        "block" => {
                            self.release.notified().await;
                            Ok(serde_json::to_value(WireValue::Null)?)
                        }
                        _ => Err(PlanitError::RemoteInvocation {
                            target_type: params.target.type_name,
                            method: params.method,
                            arg_types: Vec::new(),
                            code: codes::ENGINE_INVOCATION_FAILED,
                            message: "no such method".into(),
                        }),
                    }
                }
                methods::CREATE_ENUM => {
                    let params: CreateEnumParams = serde_json::from_value(params)?;
                    if params.value == "LINK" {
                        Ok(serde_json::to_value(WireValue::Object(RemoteHandle::new(
                            "e1",
                            params.enum_class,
                        )))?)
                    } else {
                        Err(PlanitError::mapping(MappingKind::EnumValue, params.value))
                    }
                }
                _ => Err(PlanitError::mapping(MappingKind::Operation, method)),
            }
        }
    }

    async fn start() -> (crate::gateway::server::GatewayServerHandle, Channel, Arc<Notify>) {
        let release = Arc::new(Notify::new());
        let handle = GatewayServer::start(Arc::new(TestDispatch {
            release: release.clone(),
        }))
        .await
        .unwrap();
        let channel = Channel::connect(handle.addr(), GatewayConfig::CONNECT_TIMEOUT)
            .await
            .unwrap();
        (handle, channel, release)
    }

    #[tokio::test]
    async fn test_hello_and_entry_point() {
        let (mut handle, channel, _) = start().await;

        let hello = channel.hello().await.unwrap();
        assert_eq!(hello.protocol, GatewayConfig::PROTOCOL_VERSION);

        let root = channel.entry_point().await.unwrap();
        assert_eq!(root.type_name, ROOT_CLASS);

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_invoke_returns_value() {
        let (mut handle, channel, _) = start().await;
        let root = channel.entry_point().await.unwrap();

        let value = channel
            .invoke(&root, "echo", vec![WireValue::String("hi".into())])
            .await
            .unwrap();
        assert_eq!(value, WireValue::String("hi".into()));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_remote_error_leaves_channel_usable() {
        let (mut handle, channel, _) = start().await;
        let root = channel.entry_point().await.unwrap();

        let err = channel
            .invoke(&root, "explode", vec![WireValue::Float(1.5)])
            .await
            .unwrap_err();
        match &err {
            PlanitError::RemoteInvocation {
                target_type,
                method,
                arg_types,
                code,
                ..
            } => {
                assert_eq!(target_type, ROOT_CLASS);
                assert_eq!(method, "explode");
                assert_eq!(arg_types, &vec!["float".to_string()]);
                assert_eq!(*code, codes::ENGINE_INVOCATION_FAILED);
            }
            other => panic!("Expected RemoteInvocation, got: {:?}", other),
        }

        assert!(!channel.is_closed());
        assert!(channel.invoke(&root, "echo", vec![]).await.is_ok());

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_unknown_enum_is_mapping_error() {
        let (mut handle, channel, _) = start().await;

        let enum_handle = channel
            .create_enum("org.planit.output.enums.OutputType", "LINK")
            .await
            .unwrap();
        assert_eq!(enum_handle.type_name, "org.planit.output.enums.OutputType");

        let err = channel
            .create_enum("org.planit.output.enums.OutputType", "BOGUS")
            .await
            .unwrap_err();
        assert!(err.is_mapping_error());

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_oversized_request_keeps_channel_open() {
        let (mut handle, channel, _) = start().await;
        let root = channel.entry_point().await.unwrap();

        let huge = "x".repeat(GatewayConfig::MAX_MESSAGE_SIZE + 1);
        let err = channel
            .invoke(&root, "echo", vec![WireValue::String(huge)])
            .await
            .unwrap_err();
        assert!(matches!(err, PlanitError::Validation { .. }));
        assert!(!err.is_channel_error());

        assert!(!channel.is_closed());
        let value = channel
            .invoke(&root, "echo", vec![WireValue::from("after")])
            .await
            .unwrap();
        assert_eq!(value, WireValue::from("after"));

        handle.shutdown();
    }

    #[tokio::test]
    async fn test_connect_refused_is_startup_failure() {
        let addr: SocketAddr = "127.0.0.1:1".parse().unwrap();
        let err = Channel::connect(addr, Duration::from_secs(1)).await.unwrap_err();
        assert!(err.is_startup_failure());
    }

    #[tokio::test]
    async fn test_server_loss_closes_channel() {
        let (mut handle, channel, _) = start().await;
        let root = channel.entry_point().await.unwrap();

        handle.shutdown();

        let mut lost = None;
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(50)).await;
            if let Err(e) = channel.invoke(&root, "echo", vec![]).await {
                lost = Some(e);
                break;
            }
        }
        let err = lost.expect("channel should report the lost server");
        assert!(err.is_channel_error());
        assert!(channel.is_closed());

        // Closed channels fail fast.
        let err = channel.invoke(&root, "echo", vec![]).await.unwrap_err();
        assert!(err.is_channel_error());
    }

    #[tokio::test]
    async fn test_close_wakes_in_flight_call() {
        let (mut handle, channel, release) = start().await;
        let channel = Arc::new(channel);
        let root = channel.entry_point().await.unwrap();

        let in_flight = {
            let channel = channel.clone();
            let root = root.clone();
            tokio::spawn(async move { channel.invoke(&root, "block", vec![]).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(!channel.close_and_request_shutdown().await);

        let err = in_flight.await.unwrap().unwrap_err();
        assert!(err.is_channel_error());

        release.notify_waiters();
        handle.shutdown();
    }

    #[tokio::test]
    async fn test_idle_close_sends_shutdown_request() {
        let (mut handle, channel, _) = start().await;

        // The test server answers unknown methods with an error response.
        assert!(channel.close_and_request_shutdown().await);
        assert!(channel.is_closed());

        handle.shutdown();
    }
}

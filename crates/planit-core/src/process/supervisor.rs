//! Engine process supervision.
//!
//! `EngineSupervisor` is the explicit context object holding the engine state:
//! at most one engine process, one channel and one cached root handle. Every
//! proxy reaches the engine through it.
//!
//! # Lifecycle
//!
//! - `ensure_started` is idempotent and serialized; concurrent callers wait
//!   for a single startup
//! - a failed startup leaves the state unset so a later call can retry
//! - after a channel error the next `ensure_started` discards the stale state
//!   and starts a fresh engine; proxies bound to the old channel stay invalid
//! - `shutdown` is idempotent and terminal

use super::launcher::{self, EngineCommand, EngineProcess};
use crate::config::{EngineLocator, GatewayConfig};
use crate::error::{PlanitError, Result};
use crate::gateway::Channel;
use crate::value::RemoteHandle;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Where the engine comes from.
#[derive(Debug, Clone)]
pub enum EngineSource {
    /// Launch from a locator; the classpath is checked on every start.
    Locator(EngineLocator),
    /// Launch an explicit command.
    Command(EngineCommand),
    /// Connect to a gateway server that someone else runs.
    Attach(SocketAddr),
}

/// A started engine as seen by proxies.
#[derive(Debug, Clone)]
pub struct EngineSession {
    pub channel: Arc<Channel>,
    pub root: RemoteHandle,
    /// Incremented on every successful start.
    pub generation: u64,
}

#[derive(Debug, Default)]
struct EngineState {
    process: Option<EngineProcess>,
    channel: Option<Arc<Channel>>,
    root: Option<RemoteHandle>,
    engine: Option<String>,
    generation: u64,
    shut_down: bool,
}

impl EngineState {
    fn session(&self) -> Option<EngineSession> {
        match (&self.channel, &self.root) {
            (Some(channel), Some(root)) => Some(EngineSession {
                channel: channel.clone(),
                root: root.clone(),
                generation: self.generation,
            }),
            _ => None,
        }
    }
}

/// Owner of the engine state.
#[derive(Debug)]
pub struct EngineSupervisor {
    source: EngineSource,
    state: Mutex<EngineState>,
    connect_timeout: Duration,
    shutdown_grace: Duration,
}

impl EngineSupervisor {
    pub fn new(source: EngineSource) -> Self {
        Self {
            source,
            state: Mutex::new(EngineState::default()),
            connect_timeout: GatewayConfig::CONNECT_TIMEOUT,
            shutdown_grace: GatewayConfig::SHUTDOWN_GRACE,
        }
    }

    /// Supervise an engine described by `locator`.
    pub fn from_locator(locator: EngineLocator) -> Self {
        Self::new(EngineSource::Locator(locator))
    }

    pub fn from_command(command: EngineCommand) -> Self {
        Self::new(EngineSource::Command(command))
    }

    /// Use an already running gateway server. No process is owned.
    pub fn attach(addr: SocketAddr) -> Self {
        Self::new(EngineSource::Attach(addr))
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn source(&self) -> &EngineSource {
        &self.source
    }

    /// Start the engine if needed and return the live session.
    ///
    /// # Errors
    /// - Startup failure if the engine cannot be launched, connected to or
    ///   greeted; the state stays unset
    /// - Channel error once `shutdown` has been called
    pub async fn ensure_started(&self) -> Result<EngineSession> {
        let mut state = self.state.lock().await;

        if state.shut_down {
            return Err(PlanitError::channel_lost(
                "ensure_started",
                "engine has been shut down",
            ));
        }

        if let Some(session) = state.session() {
            if !session.channel.is_closed() {
                return Ok(session);
            }
            warn!(
                "Engine channel lost; discarding engine generation {}",
                state.generation
            );
            self.teardown(&mut state).await;
        }

        let (process, channel, root, engine) = self.start().await?;
        state.process = process;
        state.channel = Some(Arc::new(channel));
        state.root = Some(root);
        state.engine = Some(engine);
        state.generation += 1;

        info!(
            "Engine generation {} started ({})",
            state.generation,
            state.engine.as_deref().unwrap_or("unknown engine")
        );

        state
            .session()
            .ok_or_else(|| PlanitError::Other("engine state incomplete after start".into()))
    }

    /// Shared channel of the running engine, starting it if needed.
    pub async fn channel(&self) -> Result<Arc<Channel>> {
        Ok(self.ensure_started().await?.channel)
    }

    /// Root object handle, starting the engine if needed.
    pub async fn root(&self) -> Result<RemoteHandle> {
        Ok(self.ensure_started().await?.root)
    }

    /// Whether a started engine with an open channel exists.
    pub async fn is_running(&self) -> bool {
        let mut state = self.state.lock().await;
        let channel_open = state
            .channel
            .as_ref()
            .map(|channel| !channel.is_closed())
            .unwrap_or(false);
        let process_alive = state
            .process
            .as_mut()
            .map(EngineProcess::is_running)
            .unwrap_or(true);
        channel_open && process_alive
    }

    /// Number of successful starts so far.
    pub async fn generation(&self) -> u64 {
        self.state.lock().await.generation
    }

    /// Pid of the owned engine process, if any.
    pub async fn engine_pid(&self) -> Option<u32> {
        self.state.lock().await.process.as_ref().map(EngineProcess::pid)
    }

    /// Engine identity reported by the handshake.
    pub async fn engine_name(&self) -> Option<String> {
        self.state.lock().await.engine.clone()
    }

    /// Stop the engine and refuse further starts.
    ///
    /// Safe to call repeatedly. Calls in flight on the channel fail with a
    /// channel error.
    pub async fn shutdown(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.shut_down {
            debug!("Engine supervisor already shut down");
            return Ok(());
        }
        state.shut_down = true;
        self.teardown(&mut state).await;
        info!("Engine supervisor shut down");
        Ok(())
    }

    async fn start(
        &self,
    ) -> Result<(Option<EngineProcess>, Channel, RemoteHandle, String)> {
        let process = match &self.source {
            EngineSource::Locator(locator) => {
                let command = EngineCommand::from_locator(locator)?;
                Some(launcher::launch(&command).await?)
            }
            EngineSource::Command(command) => Some(launcher::launch(command).await?),
            EngineSource::Attach(_) => None,
        };

        let addr = match (&self.source, &process) {
            (EngineSource::Attach(addr), _) => *addr,
            (_, Some(process)) => process.addr(),
            (_, None) => return Err(PlanitError::startup("no engine process to connect to")),
        };

        match self.connect(addr).await {
            Ok((channel, root, engine)) => Ok((process, channel, root, engine)),
            Err(e) => {
                if let Some(process) = process {
                    if let Err(stop_err) = process.terminate(self.shutdown_grace).await {
                        warn!("Failed to stop engine after failed startup: {}", stop_err);
                    }
                }
                Err(e)
            }
        }
    }

    async fn connect(&self, addr: SocketAddr) -> Result<(Channel, RemoteHandle, String)> {
        let channel = Channel::connect(addr, self.connect_timeout).await?;

        let handshake = async {
            let hello = channel.hello().await?;
            if hello.protocol != GatewayConfig::PROTOCOL_VERSION {
                return Err(PlanitError::startup(format!(
                    "engine speaks protocol {} but {} is required",
                    hello.protocol,
                    GatewayConfig::PROTOCOL_VERSION
                )));
            }
            let root = channel.entry_point().await?;
            Ok((root, hello.engine))
        };

        match handshake.await {
            Ok((root, engine)) => {
                debug!("Engine root object: {}", root);
                Ok((channel, root, engine))
            }
            Err(e) => {
                channel.close();
                if e.is_startup_failure() {
                    Err(e)
                } else {
                    Err(PlanitError::startup(format!("engine handshake failed: {}", e)))
                }
            }
        }
    }

    async fn teardown(&self, state: &mut EngineState) {
        let owns_process = state.process.is_some();

        if let Some(channel) = state.channel.take() {
            if owns_process {
                if channel.close_and_request_shutdown().await {
                    debug!("Engine acknowledged the shutdown request");
                }
            } else {
                channel.close();
            }
        }
        state.root = None;
        state.engine = None;

        if let Some(process) = state.process.take() {
            let pid = process.pid();
            if let Err(e) = process.terminate(self.shutdown_grace).await {
                warn!("Failed to stop engine process {}: {}", pid, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::protocol::{methods, InvokeParams};
    use crate::gateway::server::{GatewayDispatch, GatewayServer, GatewayServerHandle};
    use crate::value::WireValue;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingDispatch {
        protocol: &'static str,
        entry_points: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl GatewayDispatch for CountingDispatch {
        async fn dispatch(
            &self,
            method: &str,
            params: serde_json::Value,
        ) -> std::result::Result<serde_json::Value, PlanitError> {
            match method {
                methods::HELLO => Ok(serde_json::json!({"protocol": self.protocol, "engine": "counting"})),
                methods::ENTRY_POINT => {
                    let n = self.entry_points.fetch_add(1, Ordering::SeqCst);
                    Ok(serde_json::to_value(WireValue::Object(RemoteHandle::new(
                        format!("root{}", n),
                        "org.planit.python.PLANitJ2Py",
                    )))?)
                }
                methods::INVOKE => {
                    let _: InvokeParams = serde_json::from_value(params)?;
                    Ok(serde_json::to_value(WireValue::Null)?)
                }
                _ => Ok(serde_json::Value::Null),
            }
        }
    }

    async fn server(protocol: &'static str) -> (GatewayServerHandle, Arc<CountingDispatch>) {
        let dispatch = Arc::new(CountingDispatch {
            protocol,
            entry_points: AtomicUsize::new(0),
        });
        let handle = GatewayServer::start(dispatch.clone()).await.unwrap();
        (handle, dispatch)
    }

    #[tokio::test]
    async fn test_ensure_started_is_idempotent() {
        let (handle, dispatch) = server(GatewayConfig::PROTOCOL_VERSION).await;
        let supervisor = EngineSupervisor::attach(handle.addr());

        let first = supervisor.ensure_started().await.unwrap();
        let second = supervisor.ensure_started().await.unwrap();

        assert!(Arc::ptr_eq(&first.channel, &second.channel));
        assert_eq!(first.root, second.root);
        assert_eq!(supervisor.generation().await, 1);
        assert_eq!(dispatch.entry_points.load(Ordering::SeqCst), 1);
        assert_eq!(supervisor.engine_name().await.as_deref(), Some("counting"));
    }

    #[tokio::test]
    async fn test_concurrent_starts_share_one_session() {
        let (handle, dispatch) = server(GatewayConfig::PROTOCOL_VERSION).await;
        let supervisor = Arc::new(EngineSupervisor::attach(handle.addr()));

        let tasks: Vec<_> = (0..4)
            .map(|_| {
                let supervisor = supervisor.clone();
                tokio::spawn(async move { supervisor.ensure_started().await })
            })
            .collect();
        for task in tasks {
            assert_eq!(task.await.unwrap().unwrap().generation, 1);
        }
        assert_eq!(dispatch.entry_points.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_protocol_mismatch_is_startup_failure_and_retryable() {
        let (handle, _) = server("0").await;
        let supervisor = EngineSupervisor::attach(handle.addr());

        let err = supervisor.ensure_started().await.unwrap_err();
        assert!(err.is_startup_failure());
        assert!(!supervisor.is_running().await);
        assert_eq!(supervisor.generation().await, 0);

        // State stays unset; a second attempt fails the same way instead of
        // returning a half-initialised session.
        assert!(supervisor.ensure_started().await.unwrap_err().is_startup_failure());
    }

    #[tokio::test]
    async fn test_attach_to_nothing_is_startup_failure() {
        let supervisor = EngineSupervisor::attach("127.0.0.1:1".parse().unwrap())
            .with_connect_timeout(Duration::from_secs(1));
        let err = supervisor.ensure_started().await.unwrap_err();
        assert!(err.is_startup_failure());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent_and_terminal() {
        let (handle, _) = server(GatewayConfig::PROTOCOL_VERSION).await;
        let supervisor = EngineSupervisor::attach(handle.addr());

        let session = supervisor.ensure_started().await.unwrap();
        supervisor.shutdown().await.unwrap();
        supervisor.shutdown().await.unwrap();

        assert!(session.channel.is_closed());
        assert!(!supervisor.is_running().await);

        let err = supervisor.ensure_started().await.unwrap_err();
        assert!(err.is_channel_error());

        let err = session
            .channel
            .invoke(&session.root, "run", vec![])
            .await
            .unwrap_err();
        assert!(err.is_channel_error());
    }

    #[tokio::test]
    async fn test_channel_loss_starts_fresh_generation() {
        let (handle, dispatch) = server(GatewayConfig::PROTOCOL_VERSION).await;
        let supervisor = EngineSupervisor::attach(handle.addr());

        let old = supervisor.ensure_started().await.unwrap();
        old.channel.close();

        let fresh = supervisor.ensure_started().await.unwrap();
        assert_eq!(fresh.generation, 2);
        assert!(!Arc::ptr_eq(&old.channel, &fresh.channel));
        assert_ne!(old.root, fresh.root);
        assert_eq!(dispatch.entry_points.load(Ordering::SeqCst), 2);

        // The old channel never comes back.
        assert!(old.channel.is_closed());
    }

    #[tokio::test]
    async fn test_missing_classpath_is_startup_failure() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let supervisor = EngineSupervisor::from_locator(EngineLocator::planit(temp_dir.path()));

        let err = supervisor.ensure_started().await.unwrap_err();
        assert!(err.is_startup_failure());
        assert_eq!(supervisor.engine_pid().await, None);
    }
}

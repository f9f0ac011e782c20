//! Engine-side gateway server.
//!
//! Listens on `127.0.0.1`, accepts channel connections and hands each request
//! to a `GatewayDispatch` implementation. Each connection is served by its own
//! task; requests on one connection are answered in order.

use super::protocol::{codes, read_frame, write_frame, GatewayRequest, GatewayResponse};
use crate::config::GatewayConfig;
use crate::{PlanitError, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Handle to a running gateway server. Dropping it stops the server.
pub struct GatewayServerHandle {
    pub addr: SocketAddr,
    pub port: u16,
    stop: watch::Sender<bool>,
    accept_task: Option<JoinHandle<()>>,
}

impl GatewayServerHandle {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting and drop every open connection.
    pub fn shutdown(&mut self) {
        if !*self.stop.borrow() {
            info!("Stopping gateway server on {}", self.addr);
        }
        self.stop.send_replace(true);
    }
}

impl Drop for GatewayServerHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(task) = self.accept_task.take() {
            task.abort();
        }
    }
}

/// Engine-side handler for gateway requests.
#[async_trait::async_trait]
pub trait GatewayDispatch: Send + Sync + 'static {
    /// Handle one request and return its JSON result.
    async fn dispatch(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> std::result::Result<serde_json::Value, PlanitError>;
}

/// Open connection slot; released on drop.
struct ConnectionSlot(Arc<AtomicUsize>);

impl ConnectionSlot {
    fn acquire(open: &Arc<AtomicUsize>) -> Option<Self> {
        let previous = open.fetch_add(1, Ordering::SeqCst);
        if previous >= GatewayConfig::MAX_CONNECTIONS {
            open.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(Self(open.clone()))
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Gateway server bound to a local port.
pub struct GatewayServer;

impl GatewayServer {
    /// Start on an OS-assigned local port.
    pub async fn start<D: GatewayDispatch>(dispatch: Arc<D>) -> Result<GatewayServerHandle> {
        Self::start_on(SocketAddr::from(([127, 0, 0, 1], 0)), dispatch).await
    }

    /// Start on a specific address.
    pub async fn start_on<D: GatewayDispatch>(
        bind: SocketAddr,
        dispatch: Arc<D>,
    ) -> Result<GatewayServerHandle> {
        let listener = TcpListener::bind(bind).await?;
        let addr = listener.local_addr()?;
        info!("Gateway server listening on {}", addr);

        let (stop, stopped) = watch::channel(false);
        let accept_task = tokio::spawn(accept_connections(listener, dispatch, stopped));

        Ok(GatewayServerHandle {
            addr,
            port: addr.port(),
            stop,
            accept_task: Some(accept_task),
        })
    }
}

async fn accept_connections<D: GatewayDispatch>(
    listener: TcpListener,
    dispatch: Arc<D>,
    mut stopped: watch::Receiver<bool>,
) {
    let open = Arc::new(AtomicUsize::new(0));
    loop {
        let (stream, peer) = tokio::select! {
            _ = stopped.changed() => break,
            accepted = listener.accept() => match accepted {
                Ok(connection) => connection,
                Err(e) => {
                    error!("Gateway accept error: {}", e);
                    continue;
                }
            },
        };

        let Some(slot) = ConnectionSlot::acquire(&open) else {
            warn!(
                "Rejecting gateway connection from {}: {} connections already open",
                peer,
                GatewayConfig::MAX_CONNECTIONS
            );
            continue;
        };

        let dispatch = dispatch.clone();
        let stopped = stopped.clone();
        tokio::spawn(async move {
            let _slot = slot;
            debug!("Gateway connection from {}", peer);
            if let Err(e) = serve_connection(stream, dispatch.as_ref(), stopped).await {
                debug!("Gateway connection {} ended: {}", peer, e);
            }
        });
    }
    debug!("Gateway accept loop finished");
}

async fn serve_connection<D: GatewayDispatch>(
    mut stream: TcpStream,
    dispatch: &D,
    mut stopped: watch::Receiver<bool>,
) -> Result<()> {
    let (mut reader, mut writer) = stream.split();
    loop {
        let frame = tokio::select! {
            _ = stopped.changed() => return Ok(()),
            frame = read_frame(&mut reader) => match frame? {
                Some(frame) => frame,
                None => return Ok(()),
            },
        };

        let response = answer(&frame, dispatch).await;
        write_frame(&mut writer, &serde_json::to_vec(&response)?).await?;
    }
}

/// Decode one request frame and produce its response.
async fn answer<D: GatewayDispatch>(frame: &[u8], dispatch: &D) -> GatewayResponse {
    let request: GatewayRequest = match serde_json::from_slice(frame) {
        Ok(request) => request,
        Err(e) => {
            return GatewayResponse::error(None, codes::PARSE_ERROR, format!("Parse error: {}", e))
        }
    };
    if request.jsonrpc != GatewayRequest::VERSION {
        return GatewayResponse::error(
            request.id,
            codes::INVALID_REQUEST,
            format!("Invalid Request: jsonrpc must be {}", GatewayRequest::VERSION),
        );
    }

    let params = request
        .params
        .unwrap_or_else(|| serde_json::Value::Object(Default::default()));
    match dispatch.dispatch(&request.method, params).await {
        Ok(result) => GatewayResponse::success(request.id, result),
        Err(e) => {
            let code = e.to_rpc_error_code();
            // Engine failures carry their own message; the client adds call context.
            let message = match e {
                PlanitError::RemoteInvocation { message, .. } => message,
                other => other.to_string(),
            };
            GatewayResponse::error(request.id, code, message)
        }
    }
}

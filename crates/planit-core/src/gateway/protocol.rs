//! Wire protocol shared by the client channel and the engine-side server.
//!
//! Every message is a length-prefixed JSON-RPC 2.0 payload:
//!
//! ```text
//! [u32 BE: len][UTF-8 JSON bytes of len]
//! ```

use crate::config::GatewayConfig;
use crate::value::{RemoteHandle, WireValue};
use crate::{PlanitError, Result};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Gateway method names.
pub mod methods {
    pub const HELLO: &str = "gateway.hello";
    pub const ENTRY_POINT: &str = "gateway.entryPoint";
    pub const INVOKE: &str = "gateway.invoke";
    pub const CREATE_ENUM: &str = "gateway.createEnum";
    pub const SHUTDOWN: &str = "gateway.shutdown";
}

/// JSON-RPC error codes.
pub mod codes {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    /// The engine ran the call and it failed inside engine logic.
    pub const ENGINE_INVOCATION_FAILED: i32 = -32010;
    /// The target handle is not known to the engine.
    pub const UNKNOWN_OBJECT: i32 = -32011;
    /// The enum class or constant is not known to the engine.
    pub const UNKNOWN_ENUM: i32 = -32012;
}

/// JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default)]
    pub params: Option<serde_json::Value>,
    pub id: Option<serde_json::Value>,
}

impl GatewayRequest {
    /// Value of the `jsonrpc` member on every envelope.
    pub const VERSION: &'static str = "2.0";

    pub fn new(method: impl Into<String>, params: serde_json::Value, id: u64) -> Self {
        Self {
            jsonrpc: GatewayRequest::VERSION.to_string(),
            method: method.into(),
            params: Some(params),
            id: Some(serde_json::Value::Number(id.into())),
        }
    }
}

/// JSON-RPC 2.0 response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayResponse {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<GatewayError>,
    pub id: Option<serde_json::Value>,
}

impl GatewayResponse {
    pub fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: GatewayRequest::VERSION.to_string(),
            result: Some(result),
            error: None,
            id,
        }
    }

    pub fn error(id: Option<serde_json::Value>, code: i32, message: String) -> Self {
        Self {
            jsonrpc: GatewayRequest::VERSION.to_string(),
            result: None,
            error: Some(GatewayError {
                code,
                message,
                data: None,
            }),
            id,
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayError {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

/// Result of `gateway.hello`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelloInfo {
    pub protocol: String,
    pub engine: String,
}

/// Parameters of `gateway.invoke`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvokeParams {
    pub target: RemoteHandle,
    pub method: String,
    #[serde(default)]
    pub args: Vec<WireValue>,
}

/// Parameters of `gateway.createEnum`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateEnumParams {
    #[serde(rename = "class")]
    pub enum_class: String,
    pub value: String,
}

/// Read a length-prefixed frame.
///
/// Returns `None` on clean EOF (peer closed connection).
pub async fn read_frame<R: AsyncReadExt + Unpin>(reader: &mut R) -> Result<Option<Vec<u8>>> {
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;

    check_frame_size(len)?;

    let mut payload = vec![0u8; len];
    reader.read_exact(&mut payload).await?;

    Ok(Some(payload))
}

/// Reject payloads larger than `GatewayConfig::MAX_MESSAGE_SIZE`.
pub fn check_frame_size(len: usize) -> Result<()> {
    if len > GatewayConfig::MAX_MESSAGE_SIZE {
        return Err(PlanitError::Validation {
            field: "gateway_frame".to_string(),
            message: format!(
                "message size {} exceeds maximum {}",
                len,
                GatewayConfig::MAX_MESSAGE_SIZE
            ),
        });
    }
    Ok(())
}

/// Write a length-prefixed frame.
pub async fn write_frame<W: AsyncWriteExt + Unpin>(writer: &mut W, payload: &[u8]) -> Result<()> {
    check_frame_size(payload.len())?;
    let len = payload.len() as u32;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

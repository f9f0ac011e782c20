//! Gateway between the client and the engine process.
//!
//! Length-prefixed JSON-RPC 2.0 over a `127.0.0.1` TCP connection.
//!
//! # Architecture
//!
//! - **Channel**: client side; one shared connection per engine state
//! - **Server**: engine side; accepts connections and dispatches requests
//! - **Protocol**: framing, envelopes and method parameters used by both

pub mod channel;
pub mod protocol;
pub mod server;

pub use channel::Channel;
pub use protocol::{GatewayRequest, GatewayResponse, HelloInfo};
pub use server::{GatewayDispatch, GatewayServer, GatewayServerHandle};

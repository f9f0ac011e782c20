//! PLANit Core - client-side bridge to an out-of-process PLANit engine.
//!
//! The engine runs as a separate process. This crate launches it, keeps one
//! shared channel to it, and exposes the engine's objects as typed proxies
//! whose calls are forwarded over the channel.
//!
//! # Example
//!
//! ```rust,ignore
//! use planit_core::enums::{OutputFormatter, OutputType, PhysicalCost, TrafficAssignment};
//! use planit_core::{EngineLocator, Planit};
//!
//! #[tokio::main]
//! async fn main() -> planit_core::Result<()> {
//!     let plan_it = Planit::with_locator(EngineLocator::from_env()?, "/path/to/project");
//!
//!     let assignment = plan_it
//!         .set_traffic_assignment(TrafficAssignment::TraditionalStatic)
//!         .await?;
//!     assignment.create_and_register_physical_cost(PhysicalCost::Bpr).await?;
//!     assignment.activate_output(OutputType::Link).await?;
//!     plan_it.stop_criterion().await?.set_max_iterations(500).await?;
//!     plan_it.set_output_formatter(OutputFormatter::PlanitIo).await?;
//!
//!     plan_it.run().await?;
//!     plan_it.shutdown().await
//! }
//! ```

pub mod config;
pub mod enums;
pub mod error;
pub mod gateway;
pub mod initial_cost;
pub mod naming;
pub mod planit;
pub mod platform;
pub mod process;
pub mod proxy;
pub mod registry;
pub mod value;
pub mod wrappers;

// Re-export commonly used types
pub use config::{EngineLocator, GatewayConfig};
pub use enums::{EnumCatalog, EnumRef, RemoteEnum};
pub use error::{MappingKind, PlanitError, Result};
pub use gateway::Channel;
pub use initial_cost::InitialCosts;
pub use planit::Planit;
pub use process::{EngineCommand, EngineSession, EngineSource, EngineSupervisor};
pub use proxy::{FromReturned, Proxy, ProxyState, RemoteObject};
pub use registry::ProxySpec;
pub use value::{Arg, RemoteHandle, WireValue};

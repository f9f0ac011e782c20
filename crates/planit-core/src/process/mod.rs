//! Engine process management.
//!
//! - `launcher` spawns one engine process and waits for it to become ready
//! - `supervisor` owns the engine state shared by every proxy

pub mod launcher;
pub mod supervisor;

pub use launcher::{launch, EngineCommand, EngineProcess};
pub use supervisor::{EngineSession, EngineSource, EngineSupervisor};

//! Shared helpers for the simulator integration tests.

#![allow(dead_code)]

use planit_core::gateway::{GatewayServer, GatewayServerHandle};
use planit_core::{EngineSupervisor, Planit};
use planit_engine_sim::SimEngine;
use std::sync::Arc;
use std::time::Duration;

pub const ENTRY_CLASS: &str = "org.planit.python.PLANitJ2Py";

/// An in-process simulator with a supervisor attached to it.
pub struct AttachedEngine {
    pub engine: Arc<SimEngine>,
    pub server: GatewayServerHandle,
    pub supervisor: Arc<EngineSupervisor>,
}

impl AttachedEngine {
    pub async fn start() -> Self {
        let engine = Arc::new(SimEngine::new());
        let server = GatewayServer::start(engine.clone()).await.unwrap();
        let supervisor = Arc::new(EngineSupervisor::attach(server.addr()));
        Self {
            engine,
            server,
            supervisor,
        }
    }

    pub fn planit(&self) -> Planit {
        Planit::new(self.supervisor.clone(), "/projects/route_choice")
    }

    /// Stop the server and give its connection tasks time to close.
    pub async fn kill_server(&mut self) {
        self.server.shutdown();
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
}

pub fn sim_binary() -> &'static str {
    env!("CARGO_BIN_EXE_planit-engine-sim")
}

//! Top-level facade over one simple project.
//!
//! `Planit` holds lazily bound proxies for the engine entry point and the
//! project; nothing touches the engine until the first remote call.

use crate::config::EngineLocator;
use crate::enums::{OutputFormatter, OutputType, TrafficAssignment};
use crate::error::{PlanitError, Result};
use crate::initial_cost::InitialCosts;
use crate::process::EngineSupervisor;
use crate::proxy::{Proxy, RemoteObject};
use crate::value::Arg;
use crate::wrappers::*;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

pub struct Planit {
    supervisor: Arc<EngineSupervisor>,
    project_path: PathBuf,
    entry: PlanitJ2Py,
    project: PlanItSimpleProject,
    network: MacroscopicNetwork,
    zoning: Zoning,
    demands: Demands,
    converter_factory: ConverterFactory,
    assignment: Mutex<Option<TrafficAssignmentConfigurator>>,
    formatters: Mutex<HashMap<OutputFormatter, Proxy>>,
    initial_cost: InitialCosts,
}

impl Planit {
    /// Create the facade for the project whose inputs live in `project_path`.
    pub fn new(supervisor: Arc<EngineSupervisor>, project_path: impl Into<PathBuf>) -> Self {
        let project_path = project_path.into();
        let entry = PlanitJ2Py::lazy_root(supervisor.clone());
        let project = PlanItSimpleProject::lazy_child(
            entry.proxy(),
            "initialise_simple_project",
            vec![Arg::from(project_path.as_path())],
        );
        let network = MacroscopicNetwork::lazy_child(project.proxy(), "get_network", Vec::new());
        let zoning = Zoning::lazy_child(project.proxy(), "get_zoning", Vec::new());
        let demands = Demands::lazy_child(project.proxy(), "get_demands", Vec::new());
        let converter_factory =
            ConverterFactory::lazy_child(entry.proxy(), "get_converter_factory", Vec::new());

        Self {
            supervisor,
            project_path,
            entry,
            project,
            network,
            zoning,
            demands,
            converter_factory,
            assignment: Mutex::new(None),
            formatters: Mutex::new(HashMap::new()),
            initial_cost: InitialCosts::new(),
        }
    }

    /// Launch the engine described by `locator` on first use.
    pub fn with_locator(locator: EngineLocator, project_path: impl Into<PathBuf>) -> Self {
        Self::new(Arc::new(EngineSupervisor::from_locator(locator)), project_path)
    }

    pub fn supervisor(&self) -> &Arc<EngineSupervisor> {
        &self.supervisor
    }

    pub fn project_path(&self) -> &Path {
        &self.project_path
    }

    pub fn entry_point(&self) -> &PlanitJ2Py {
        &self.entry
    }

    pub fn project(&self) -> &PlanItSimpleProject {
        &self.project
    }

    /// Create and register the traffic assignment. A project runs one assignment.
    pub async fn set_traffic_assignment(
        &self,
        assignment: TrafficAssignment,
    ) -> Result<TrafficAssignmentConfigurator> {
        let mut current = self.assignment.lock().await;
        if current.is_some() {
            return Err(PlanitError::Config {
                message: "a traffic assignment is already registered on this project".to_string(),
            });
        }
        let configurator = self
            .project
            .create_and_register_traffic_assignment(assignment)
            .await?;
        info!("Registered {} traffic assignment", assignment);
        *current = Some(configurator.clone());
        Ok(configurator)
    }

    /// Create and register an output formatter; registering the same kind twice
    /// returns the existing one.
    pub async fn set_output_formatter(&self, formatter: OutputFormatter) -> Result<Proxy> {
        let mut formatters = self.formatters.lock().await;
        if let Some(existing) = formatters.get(&formatter) {
            return Ok(existing.clone());
        }
        let proxy = self
            .project
            .create_and_register_output_formatter(formatter)
            .await?;
        formatters.insert(formatter, proxy.clone());
        Ok(proxy)
    }

    pub async fn assignment(&self) -> Result<TrafficAssignmentConfigurator> {
        self.assignment
            .lock()
            .await
            .clone()
            .ok_or_else(|| PlanitError::Config {
                message: "no traffic assignment registered; call set_traffic_assignment first"
                    .to_string(),
            })
    }

    async fn formatter<T: RemoteObject>(&self, kind: OutputFormatter) -> Result<T> {
        let proxy = self
            .formatters
            .lock()
            .await
            .get(&kind)
            .cloned()
            .ok_or_else(|| PlanitError::Config {
                message: format!("output formatter {} is not registered", kind),
            })?;
        proxy.downcast()
    }

    /// The PLANitIO file output formatter.
    pub async fn output(&self) -> Result<PlanItOutputFormatter> {
        self.formatter(OutputFormatter::PlanitIo).await
    }

    /// The in-memory output formatter.
    pub async fn memory(&self) -> Result<MemoryOutputFormatter> {
        self.formatter(OutputFormatter::Memory).await
    }

    pub fn network(&self) -> &MacroscopicNetwork {
        &self.network
    }

    pub fn zoning(&self) -> &Zoning {
        &self.zoning
    }

    pub fn demands(&self) -> &Demands {
        &self.demands
    }

    pub fn initial_cost(&self) -> &InitialCosts {
        &self.initial_cost
    }

    pub fn converter_factory(&self) -> &ConverterFactory {
        &self.converter_factory
    }

    pub async fn output_configuration(&self) -> Result<OutputConfiguration> {
        self.assignment().await?.get_output_configuration().await
    }

    async fn output_type_configuration<T: RemoteObject>(&self, output_type: OutputType) -> Result<T> {
        self.assignment()
            .await?
            .get_output_type_configuration(output_type)
            .await?
            .downcast()
    }

    pub async fn link_configuration(&self) -> Result<LinkOutputTypeConfiguration> {
        self.output_type_configuration(OutputType::Link).await
    }

    pub async fn od_configuration(&self) -> Result<OdOutputTypeConfiguration> {
        self.output_type_configuration(OutputType::Od).await
    }

    pub async fn path_configuration(&self) -> Result<PathOutputTypeConfiguration> {
        self.output_type_configuration(OutputType::Path).await
    }

    pub async fn stop_criterion(&self) -> Result<StopCriterion> {
        self.assignment()
            .await?
            .get_gap_function()
            .await?
            .get_stop_criterion()
            .await
    }

    /// Register initial costs and run every registered assignment.
    pub async fn run(&self) -> Result<()> {
        self.assignment().await?;
        self.initial_cost.apply(&self.project).await?;

        info!("Running traffic assignment for {}", self.project_path.display());
        self.project.execute_all_traffic_assignments().await?;
        info!("Traffic assignment finished");
        Ok(())
    }

    /// Shut down the engine behind this facade.
    pub async fn shutdown(&self) -> Result<()> {
        self.supervisor.shutdown().await
    }
}

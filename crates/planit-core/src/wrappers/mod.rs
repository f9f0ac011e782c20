//! Typed wrappers for the engine's object catalog.
//!
//! Each wrapper is a `remote_wrapper!` declaration: remote type name plus the
//! operations it forwards. Operations whose remote return type depends on an
//! argument return a plain `Proxy`; use `Proxy::downcast` to get the typed
//! wrapper.

pub mod converter;
pub mod entry;
pub mod output;
pub mod project;

pub use converter::{
    ConverterFactory, IntermodalConverter, MatsimNetworkWriter, MatsimNetworkWriterSettings,
    NetworkConverter, OsmNetworkReader, OsmNetworkReaderSettings, PlanitNetworkReader,
    PlanitNetworkReaderSettings, PlanitNetworkWriter, PlanitNetworkWriterSettings,
    ZoningConverter,
};
pub use entry::PlanitJ2Py;
pub use output::{
    GapFunction, LinkOutputTypeConfiguration, MemoryOutputFormatter, MemoryOutputIterator,
    OdOutputTypeConfiguration, OutputConfiguration, PathOutputTypeConfiguration,
    PlanItOutputFormatter, StopCriterion,
};
pub use project::{
    BprCost, Demands, FixedVirtualCost, FreeflowCost, InitialLinkSegmentCost, MacroscopicNetwork,
    Mode, Modes, MsaSmoothing, PlanItSimpleProject, SpeedVirtualCost, TimePeriod, TimePeriods,
    TrafficAssignmentConfigurator, Zoning,
};

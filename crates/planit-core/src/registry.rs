//! Closed catalog of remote types with a typed wrapper.
//!
//! Objects returned by the engine are wrapped by looking up their declared
//! remote type here. A type that is not in the catalog is a mapping error,
//! never a silent untyped proxy.

use crate::error::{MappingKind, PlanitError, Result};
use crate::gateway::Channel;
use crate::proxy::Proxy;
use crate::value::RemoteHandle;
use crate::wrappers::*;
use std::sync::Arc;

/// Declaration of one typed wrapper.
#[derive(Debug)]
pub struct ProxySpec {
    pub remote_type: &'static str,
    pub local_name: &'static str,
    /// Local operation names the wrapper forwards.
    pub operations: &'static [&'static str],
}

impl ProxySpec {
    pub fn declares(&self, operation: &str) -> bool {
        self.operations.contains(&operation)
    }
}

pub static CATALOG: &[ProxySpec] = &[
    PlanitJ2Py::SPEC,
    // project
    PlanItSimpleProject::SPEC,
    TrafficAssignmentConfigurator::SPEC,
    BprCost::SPEC,
    FreeflowCost::SPEC,
    FixedVirtualCost::SPEC,
    SpeedVirtualCost::SPEC,
    MsaSmoothing::SPEC,
    InitialLinkSegmentCost::SPEC,
    MacroscopicNetwork::SPEC,
    Modes::SPEC,
    Mode::SPEC,
    Zoning::SPEC,
    Demands::SPEC,
    TimePeriods::SPEC,
    TimePeriod::SPEC,
    // output
    OutputConfiguration::SPEC,
    LinkOutputTypeConfiguration::SPEC,
    OdOutputTypeConfiguration::SPEC,
    PathOutputTypeConfiguration::SPEC,
    GapFunction::SPEC,
    StopCriterion::SPEC,
    PlanItOutputFormatter::SPEC,
    MemoryOutputFormatter::SPEC,
    MemoryOutputIterator::SPEC,
    // converters
    ConverterFactory::SPEC,
    NetworkConverter::SPEC,
    ZoningConverter::SPEC,
    IntermodalConverter::SPEC,
    OsmNetworkReader::SPEC,
    OsmNetworkReaderSettings::SPEC,
    PlanitNetworkReader::SPEC,
    PlanitNetworkReaderSettings::SPEC,
    MatsimNetworkWriter::SPEC,
    MatsimNetworkWriterSettings::SPEC,
    PlanitNetworkWriter::SPEC,
    PlanitNetworkWriterSettings::SPEC,
];

/// Look up the wrapper declaration for a remote type.
pub fn spec_for(remote_type: &str) -> Result<&'static ProxySpec> {
    CATALOG
        .iter()
        .find(|spec| spec.remote_type == remote_type)
        .ok_or_else(|| PlanitError::mapping(MappingKind::RemoteType, remote_type.to_string()))
}

/// Wrap a handle returned by the engine.
pub fn wrap(handle: RemoteHandle, channel: Arc<Channel>) -> Result<Proxy> {
    let spec = spec_for(&handle.type_name)?;
    Ok(Proxy::bound(spec, handle, channel))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_catalog_remote_types_are_unique() {
        let mut seen = HashSet::new();
        for spec in CATALOG {
            assert!(seen.insert(spec.remote_type), "duplicate {}", spec.remote_type);
        }
    }

    #[test]
    fn test_catalog_operations_are_unique_per_wrapper() {
        for spec in CATALOG {
            let ops: HashSet<_> = spec.operations.iter().collect();
            assert_eq!(ops.len(), spec.operations.len(), "{}", spec.local_name);
        }
    }

    #[test]
    fn test_spec_for_known_type() {
        let spec = spec_for("org.planit.gap.StopCriterion").unwrap();
        assert_eq!(spec.local_name, "StopCriterion");
        assert!(spec.declares("set_max_iterations"));
        assert!(!spec.declares("setMaxIterations"));
    }

    #[test]
    fn test_spec_for_unknown_type_is_mapping_error() {
        let err = spec_for("org.planit.Unknown").unwrap_err();
        assert!(err.is_mapping_error());
        assert!(err.to_string().contains("org.planit.Unknown"));
    }

    #[test]
    fn test_empty_wrapper_declares_nothing() {
        assert!(FreeflowCost::SPEC.operations.is_empty());
        assert!(!FreeflowCost::SPEC.declares("set_parameters"));
    }
}

//! Enum mapping table.
//!
//! Every local enum that crosses the gateway is declared with `remote_enum!`,
//! which records its remote class name and the remote constant of each variant.
//! The declarations double as the closed catalog consulted when an enum is
//! named by string.

use crate::error::{MappingKind, PlanitError, Result};

/// Reference to a remote enum constant, ready for `create_enum`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EnumRef {
    pub remote_class: &'static str,
    pub constant: &'static str,
}

impl std::fmt::Display for EnumRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.remote_class, self.constant)
    }
}

/// Catalog entry for one enum.
#[derive(Debug)]
pub struct EnumSpec {
    pub local_name: &'static str,
    pub remote_class: &'static str,
    pub constants: &'static [&'static str],
}

impl EnumSpec {
    pub fn contains(&self, constant: &str) -> bool {
        self.constants.contains(&constant)
    }
}

/// A local enum with a registered remote counterpart.
pub trait RemoteEnum: Copy + 'static {
    const REMOTE_CLASS: &'static str;
    const LOCAL_NAME: &'static str;

    fn remote_constant(&self) -> &'static str;

    fn all() -> &'static [Self];

    fn to_enum_ref(&self) -> EnumRef {
        EnumRef {
            remote_class: Self::REMOTE_CLASS,
            constant: self.remote_constant(),
        }
    }

    fn from_remote_constant(constant: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|v| v.remote_constant() == constant)
    }
}

/// Declare a local enum together with its remote mapping.
#[macro_export]
macro_rules! remote_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident = $class:literal {
            $( $(#[$vmeta:meta])* $variant:ident => $constant:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $( $(#[$vmeta])* $variant ),+
        }

        impl $name {
            pub const SPEC: $crate::enums::EnumSpec = $crate::enums::EnumSpec {
                local_name: stringify!($name),
                remote_class: $class,
                constants: &[$($constant),+],
            };
        }

        impl $crate::enums::RemoteEnum for $name {
            const REMOTE_CLASS: &'static str = $class;
            const LOCAL_NAME: &'static str = stringify!($name);

            fn remote_constant(&self) -> &'static str {
                match self {
                    $( $name::$variant => $constant ),+
                }
            }

            fn all() -> &'static [Self] {
                &[$( $name::$variant ),+]
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str($crate::enums::RemoteEnum::remote_constant(self))
            }
        }

        impl From<$name> for $crate::value::Arg {
            fn from(value: $name) -> Self {
                $crate::value::Arg::Enum($crate::enums::RemoteEnum::to_enum_ref(&value))
            }
        }
    };
}

remote_enum! {
    /// Traffic assignment method registered on a project.
    pub enum TrafficAssignment = "org.planit.assignment.TrafficAssignment" {
        TraditionalStatic => "TRADITIONAL_STATIC",
    }
}

remote_enum! {
    pub enum PhysicalCost = "org.planit.cost.physical.PhysicalCost" {
        Bpr => "BPR",
        Freeflow => "FREEFLOW",
    }
}

remote_enum! {
    pub enum VirtualCost = "org.planit.cost.virtual.VirtualCost" {
        Fixed => "FIXED",
        Speed => "SPEED",
    }
}

remote_enum! {
    pub enum Smoothing = "org.planit.sdinteraction.smoothing.Smoothing" {
        Msa => "MSA",
    }
}

remote_enum! {
    pub enum GapFunctionType = "org.planit.gap.GapFunctionType" {
        LinkBasedRelative => "LINK_BASED_RELATIVE",
        NormBased => "NORM_BASED",
    }
}

remote_enum! {
    /// Output formatters that can be registered on a project.
    pub enum OutputFormatter = "org.planit.output.formatter.OutputFormatterType" {
        PlanitIo => "PLANIT_IO",
        Memory => "MEMORY",
    }
}

remote_enum! {
    pub enum OutputType = "org.planit.output.enums.OutputType" {
        Link => "LINK",
        Od => "OD",
        Path => "PATH",
    }
}

remote_enum! {
    /// Columns of the link, OD and path outputs.
    pub enum OutputProperty = "org.planit.output.property.OutputProperty" {
        CalculatedSpeed => "CALCULATED_SPEED",
        CapacityPerLane => "CAPACITY_PER_LANE",
        DestinationZoneExternalId => "DESTINATION_ZONE_EXTERNAL_ID",
        DestinationZoneId => "DESTINATION_ZONE_ID",
        DestinationZoneXmlId => "DESTINATION_ZONE_XML_ID",
        DownstreamNodeExternalId => "DOWNSTREAM_NODE_EXTERNAL_ID",
        DownstreamNodeId => "DOWNSTREAM_NODE_ID",
        DownstreamNodeXmlId => "DOWNSTREAM_NODE_XML_ID",
        Flow => "FLOW",
        IterationIndex => "ITERATION_INDEX",
        Length => "LENGTH",
        LinkCost => "LINK_COST",
        LinkSegmentId => "LINK_SEGMENT_ID",
        LinkSegmentXmlId => "LINK_SEGMENT_XML_ID",
        MaximumSpeed => "MAXIMUM_SPEED",
        ModeExternalId => "MODE_EXTERNAL_ID",
        ModeId => "MODE_ID",
        ModeXmlId => "MODE_XML_ID",
        NumberOfLanes => "NUMBER_OF_LANES",
        OdCost => "OD_COST",
        OriginZoneExternalId => "ORIGIN_ZONE_EXTERNAL_ID",
        OriginZoneId => "ORIGIN_ZONE_ID",
        OriginZoneXmlId => "ORIGIN_ZONE_XML_ID",
        PathString => "PATH_STRING",
        RunId => "RUN_ID",
        TimePeriodExternalId => "TIME_PERIOD_EXTERNAL_ID",
        TimePeriodId => "TIME_PERIOD_ID",
        TimePeriodXmlId => "TIME_PERIOD_XML_ID",
        TotalCostToEndNode => "TOTAL_COST_TO_END_NODE",
        UpstreamNodeExternalId => "UPSTREAM_NODE_EXTERNAL_ID",
        UpstreamNodeId => "UPSTREAM_NODE_ID",
        UpstreamNodeXmlId => "UPSTREAM_NODE_XML_ID",
    }
}

remote_enum! {
    pub enum OdSkimSubOutputType = "org.planit.output.enums.ODSkimSubOutputType" {
        None => "NONE",
        Cost => "COST",
    }
}

remote_enum! {
    /// How paths are identified in path output.
    pub enum PathIdType = "org.planit.output.enums.PathIdType" {
        LinkSegmentId => "LINK_SEGMENT_ID",
        LinkSegmentXmlId => "LINK_SEGMENT_XML_ID",
        NodeId => "NODE_ID",
        NodeXmlId => "NODE_XML_ID",
    }
}

remote_enum! {
    pub enum ConverterType = "org.planit.converter.ConverterType" {
        Network => "NETWORK",
        Zoning => "ZONING",
        Intermodal => "INTERMODAL",
    }
}

remote_enum! {
    pub enum NetworkReaderType = "org.planit.converter.network.NetworkReaderType" {
        Osm => "OSM",
        Planit => "PLANIT",
    }
}

remote_enum! {
    pub enum NetworkWriterType = "org.planit.converter.network.NetworkWriterType" {
        Planit => "PLANIT",
        Matsim => "MATSIM",
    }
}

/// Every enum that may cross the gateway.
pub static ENUM_CATALOG: &[EnumSpec] = &[
    TrafficAssignment::SPEC,
    PhysicalCost::SPEC,
    VirtualCost::SPEC,
    Smoothing::SPEC,
    GapFunctionType::SPEC,
    OutputFormatter::SPEC,
    OutputType::SPEC,
    OutputProperty::SPEC,
    OdSkimSubOutputType::SPEC,
    PathIdType::SPEC,
    ConverterType::SPEC,
    NetworkReaderType::SPEC,
    NetworkWriterType::SPEC,
];

/// Lookup over `ENUM_CATALOG`.
pub struct EnumCatalog;

impl EnumCatalog {
    /// Find an enum by its local name.
    pub fn spec(local_name: &str) -> Result<&'static EnumSpec> {
        ENUM_CATALOG
            .iter()
            .find(|spec| spec.local_name == local_name)
            .ok_or_else(|| PlanitError::mapping(MappingKind::EnumValue, local_name))
    }

    /// Find an enum by its remote class name.
    pub fn by_remote_class(remote_class: &str) -> Option<&'static EnumSpec> {
        ENUM_CATALOG
            .iter()
            .find(|spec| spec.remote_class == remote_class)
    }

    /// Resolve a string-named enum constant, e.g. `("TrafficAssignment", "TRADITIONAL_STATIC")`.
    pub fn resolve(local_name: &str, constant: &str) -> Result<EnumRef> {
        let spec = Self::spec(local_name)?;
        spec.constants
            .iter()
            .find(|c| **c == constant)
            .map(|c| EnumRef {
                remote_class: spec.remote_class,
                constant: c,
            })
            .ok_or_else(|| {
                PlanitError::mapping(MappingKind::EnumValue, format!("{}.{}", local_name, constant))
            })
    }

    /// Check that an enum reference is registered before it crosses the gateway.
    pub fn ensure_registered(enum_ref: &EnumRef) -> Result<()> {
        match Self::by_remote_class(enum_ref.remote_class) {
            Some(spec) if spec.contains(enum_ref.constant) => Ok(()),
            _ => Err(PlanitError::mapping(
                MappingKind::EnumValue,
                enum_ref.to_string(),
            )),
        }
    }
}

//! Project, assignment and input wrappers.

use crate::enums::{OutputType, PhysicalCost, Smoothing, TrafficAssignment, VirtualCost};
use crate::proxy::Proxy;
use crate::remote_wrapper;
use crate::wrappers::output::{GapFunction, OutputConfiguration};
use std::path::Path;

remote_wrapper! {
    /// A simple project: one network, one zoning, one demands input.
    pub struct PlanItSimpleProject = "org.planit.project.PlanItSimpleProject" {
        fn create_and_register_traffic_assignment(assignment: TrafficAssignment) -> TrafficAssignmentConfigurator;
        /// Returns the concrete formatter type for `formatter`.
        fn create_and_register_output_formatter(formatter: crate::enums::OutputFormatter) -> Proxy;
        fn register_initial_link_segment_cost(path: &Path) -> InitialLinkSegmentCost;
        fn register_initial_link_segment_cost_for_time_period(path: &Path, time_period_xml_id: &str) -> InitialLinkSegmentCost;
        fn get_network() -> MacroscopicNetwork;
        fn get_zoning() -> Zoning;
        fn get_demands() -> Demands;
        /// Runs every registered assignment. Returns when the engine is done.
        fn execute_all_traffic_assignments() -> ();
    }
}

remote_wrapper! {
    /// Configurator of a registered traffic assignment.
    pub struct TrafficAssignmentConfigurator = "org.planit.assignment.traditionalstatic.TraditionalStaticAssignmentConfigurator" {
        fn create_and_register_physical_cost(cost: PhysicalCost) -> Proxy;
        fn create_and_register_virtual_cost(cost: VirtualCost) -> Proxy;
        fn create_and_register_smoothing(smoothing: Smoothing) -> Proxy;
        fn get_physical_cost() -> Proxy;
        fn get_virtual_cost() -> Proxy;
        fn get_smoothing() -> Proxy;
        /// Returns the output type configuration for `output_type`.
        fn activate_output(output_type: OutputType) -> Proxy;
        fn deactivate_output(output_type: OutputType) -> ();
        fn is_output_type_active(output_type: OutputType) -> bool;
        fn get_output_configuration() -> OutputConfiguration;
        fn get_output_type_configuration(output_type: OutputType) -> Proxy;
        fn get_gap_function() -> GapFunction;
    }
}

remote_wrapper! {
    /// BPR link performance function parameters.
    pub struct BprCost = "org.planit.cost.physical.BPRConfigurator" {
        fn set_default_parameters(alpha: f64, beta: f64, mode_xml_id: &str, link_segment_type_xml_id: &str) -> ();
        fn set_parameters(alpha: f64, beta: f64, mode_xml_id: &str, link_segment_xml_id: &str) -> ();
    }
}

remote_wrapper! {
    pub struct FreeflowCost = "org.planit.cost.physical.FreeFlowLinkTravelTimeConfigurator" {}
}

remote_wrapper! {
    pub struct FixedVirtualCost = "org.planit.cost.virtual.FixedConnectoidTravelTimeCostConfigurator" {
        fn set_fixed_connectoid_cost(cost: f64) -> ();
    }
}

remote_wrapper! {
    pub struct SpeedVirtualCost = "org.planit.cost.virtual.SpeedConnectoidTravelTimeCostConfigurator" {
        fn set_connectoid_speed(speed: f64) -> ();
    }
}

remote_wrapper! {
    pub struct MsaSmoothing = "org.planit.sdinteraction.smoothing.MSASmoothingConfigurator" {}
}

remote_wrapper! {
    /// Initial link segment costs registered on a project.
    pub struct InitialLinkSegmentCost = "org.planit.cost.physical.initial.InitialLinkSegmentCost" {
        fn is_segment_specific() -> bool;
    }
}

remote_wrapper! {
    pub struct MacroscopicNetwork = "org.planit.network.macroscopic.MacroscopicNetwork" {
        fn get_modes() -> Modes;
        fn get_number_of_link_segments() -> i64;
    }
}

remote_wrapper! {
    pub struct Modes = "org.planit.utils.mode.Modes" {
        fn size() -> i64;
        fn get_by_xml_id(xml_id: &str) -> Option<Mode>;
    }
}

remote_wrapper! {
    pub struct Mode = "org.planit.utils.mode.Mode" {
        fn get_xml_id() -> String;
        fn get_name() -> String;
    }
}

remote_wrapper! {
    pub struct Zoning = "org.planit.zoning.Zoning" {
        fn get_number_of_zones() -> i64;
        fn get_number_of_centroids() -> i64;
    }
}

remote_wrapper! {
    pub struct Demands = "org.planit.demands.Demands" {
        fn get_time_periods() -> TimePeriods;
    }
}

remote_wrapper! {
    pub struct TimePeriods = "org.planit.time.TimePeriods" {
        fn size() -> i64;
        fn get_by_xml_id(xml_id: &str) -> Option<TimePeriod>;
    }
}

remote_wrapper! {
    pub struct TimePeriod = "org.planit.time.TimePeriod" {
        fn get_xml_id() -> String;
        fn get_description() -> String;
        fn get_start_time_seconds() -> i64;
        fn get_duration_seconds() -> i64;
    }
}

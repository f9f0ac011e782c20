//! Output configuration, convergence and output formatter wrappers.

use crate::enums::{OdSkimSubOutputType, OutputProperty, OutputType, PathIdType};
use crate::remote_wrapper;
use crate::value::WireValue;
use std::path::Path;

remote_wrapper! {
    pub struct OutputConfiguration = "org.planit.output.configuration.OutputConfiguration" {
        fn set_persist_only_final_iteration(persist_only_final_iteration: bool) -> ();
        fn set_persist_zero_flow(persist_zero_flow: bool) -> ();
    }
}

remote_wrapper! {
    pub struct LinkOutputTypeConfiguration = "org.planit.output.configuration.LinkOutputTypeConfiguration" {
        fn add_property(property: OutputProperty) -> bool;
        fn remove_property(property: OutputProperty) -> bool;
        fn remove_all_properties() -> ();
    }
}

remote_wrapper! {
    pub struct OdOutputTypeConfiguration = "org.planit.output.configuration.OdOutputTypeConfiguration" {
        fn add_property(property: OutputProperty) -> bool;
        fn remove_property(property: OutputProperty) -> bool;
        fn remove_all_properties() -> ();
        fn activate(sub_type: OdSkimSubOutputType) -> ();
        fn deactivate(sub_type: OdSkimSubOutputType) -> ();
    }
}

remote_wrapper! {
    pub struct PathOutputTypeConfiguration = "org.planit.output.configuration.PathOutputTypeConfiguration" {
        fn add_property(property: OutputProperty) -> bool;
        fn remove_property(property: OutputProperty) -> bool;
        fn remove_all_properties() -> ();
        fn set_path_id_type(path_id_type: PathIdType) -> ();
    }
}

remote_wrapper! {
    pub struct GapFunction = "org.planit.gap.LinkBasedRelativeDualityGapFunction" {
        fn get_stop_criterion() -> StopCriterion;
    }
}

remote_wrapper! {
    /// Convergence criterion of an assignment.
    pub struct StopCriterion = "org.planit.gap.StopCriterion" {
        fn set_max_iterations(max_iterations: i64) -> ();
        fn set_epsilon(epsilon: f64) -> ();
        fn get_max_iterations() -> i64;
        fn get_epsilon() -> f64;
    }
}

remote_wrapper! {
    /// Default file-based output (XML metadata plus CSV results).
    pub struct PlanItOutputFormatter = "org.planit.io.output.formatter.PlanItOutputFormatter" {
        fn set_xml_name_root(xml_name_root: &str) -> ();
        fn set_csv_name_root(csv_name_root: &str) -> ();
        fn set_output_directory(output_directory: &Path) -> ();
    }
}

remote_wrapper! {
    /// Keeps results in engine memory for later inspection.
    pub struct MemoryOutputFormatter = "org.planit.output.formatter.MemoryOutputFormatter" {
        fn get_position_of_output_value_property(output_type: OutputType, property: OutputProperty) -> i64;
        fn get_position_of_output_key_property(output_type: OutputType, property: OutputProperty) -> i64;
        fn iterator(mode_xml_id: &str, time_period_xml_id: &str, iteration: i64, output_type: OutputType) -> MemoryOutputIterator;
    }
}

remote_wrapper! {
    pub struct MemoryOutputIterator = "org.planit.output.formatter.MemoryOutputIterator" {
        fn has_next() -> bool;
        fn next() -> ();
        fn get_keys() -> Vec<WireValue>;
        fn get_values() -> Vec<WireValue>;
    }
}

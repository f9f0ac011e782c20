//! Engine entry point.

use crate::remote_wrapper;
use crate::wrappers::converter::ConverterFactory;
use crate::wrappers::project::PlanItSimpleProject;
use std::path::Path;

remote_wrapper! {
    /// The engine's root object. Creates projects and converter factories.
    pub struct PlanitJ2Py = "org.planit.python.PLANitJ2Py" {
        /// Create a project reading its inputs from `project_path`.
        fn initialise_simple_project(project_path: &Path) -> PlanItSimpleProject;
        fn get_converter_factory() -> ConverterFactory;
    }
}

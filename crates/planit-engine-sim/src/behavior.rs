//! Per-type behavior of simulated engine objects.
//!
//! Methods arrive with their remote (camel-case) names. Results are canned:
//! the simulator validates configuration and records it, it never assigns
//! traffic.

use crate::space::ObjectSpace;
use planit_core::enums::{
    ConverterType, NetworkReaderType, NetworkWriterType, OdSkimSubOutputType, OutputFormatter,
    OutputProperty, OutputType, PathIdType, PhysicalCost, RemoteEnum, Smoothing,
    TrafficAssignment, VirtualCost,
};
use planit_core::gateway::protocol::codes;
use planit_core::wrappers::*;
use planit_core::{PlanitError, RemoteHandle, WireValue};

const ENTRY: &str = PlanitJ2Py::SPEC.remote_type;
const PROJECT: &str = PlanItSimpleProject::SPEC.remote_type;
const ASSIGNMENT: &str = TrafficAssignmentConfigurator::SPEC.remote_type;
const BPR: &str = BprCost::SPEC.remote_type;
const FREEFLOW: &str = FreeflowCost::SPEC.remote_type;
const FIXED_VIRTUAL: &str = FixedVirtualCost::SPEC.remote_type;
const SPEED_VIRTUAL: &str = SpeedVirtualCost::SPEC.remote_type;
const MSA: &str = MsaSmoothing::SPEC.remote_type;
const INITIAL_COST: &str = InitialLinkSegmentCost::SPEC.remote_type;
const NETWORK: &str = MacroscopicNetwork::SPEC.remote_type;
const MODES: &str = Modes::SPEC.remote_type;
const MODE: &str = Mode::SPEC.remote_type;
const ZONING: &str = Zoning::SPEC.remote_type;
const DEMANDS: &str = Demands::SPEC.remote_type;
const TIME_PERIODS: &str = TimePeriods::SPEC.remote_type;
const TIME_PERIOD: &str = TimePeriod::SPEC.remote_type;
const OUTPUT_CONFIGURATION: &str = OutputConfiguration::SPEC.remote_type;
const LINK_CONFIGURATION: &str = LinkOutputTypeConfiguration::SPEC.remote_type;
const OD_CONFIGURATION: &str = OdOutputTypeConfiguration::SPEC.remote_type;
const PATH_CONFIGURATION: &str = PathOutputTypeConfiguration::SPEC.remote_type;
const GAP_FUNCTION: &str = GapFunction::SPEC.remote_type;
const STOP_CRITERION: &str = StopCriterion::SPEC.remote_type;
const PLANIT_FORMATTER: &str = PlanItOutputFormatter::SPEC.remote_type;
const MEMORY_FORMATTER: &str = MemoryOutputFormatter::SPEC.remote_type;
const MEMORY_ITERATOR: &str = MemoryOutputIterator::SPEC.remote_type;
const CONVERTER_FACTORY: &str = ConverterFactory::SPEC.remote_type;
const NETWORK_CONVERTER: &str = NetworkConverter::SPEC.remote_type;
const ZONING_CONVERTER: &str = ZoningConverter::SPEC.remote_type;
const INTERMODAL_CONVERTER: &str = IntermodalConverter::SPEC.remote_type;
const OSM_READER: &str = OsmNetworkReader::SPEC.remote_type;
const OSM_READER_SETTINGS: &str = OsmNetworkReaderSettings::SPEC.remote_type;
const PLANIT_READER: &str = PlanitNetworkReader::SPEC.remote_type;
const PLANIT_READER_SETTINGS: &str = PlanitNetworkReaderSettings::SPEC.remote_type;
const MATSIM_WRITER: &str = MatsimNetworkWriter::SPEC.remote_type;
const MATSIM_WRITER_SETTINGS: &str = MatsimNetworkWriterSettings::SPEC.remote_type;
const PLANIT_WRITER: &str = PlanitNetworkWriter::SPEC.remote_type;
const PLANIT_WRITER_SETTINGS: &str = PlanitNetworkWriterSettings::SPEC.remote_type;

/// Mode available in the simulated network.
pub const MODE_XML_ID: &str = "1";
/// Time periods of the simulated demands: (xml id, description, start, duration).
pub const TIME_PERIOD_DATA: [(&str, &str, i64, i64); 3] = [
    ("0", "time period 1", 0, 3600),
    ("1", "time period 2", 3600, 3600),
    ("2", "time period 3", 7200, 3600),
];
const LINK_SEGMENT_COUNT: i64 = 4;
const ZONE_COUNT: i64 = 2;

const DEFAULT_MAX_ITERATIONS: i64 = 500;
const DEFAULT_EPSILON: f64 = 0.00001;

/// One `gateway.invoke` request.
pub struct Call<'a> {
    pub target: &'a RemoteHandle,
    pub method: &'a str,
    pub args: &'a [WireValue],
}

type CallResult = Result<WireValue, PlanitError>;

impl Call<'_> {
    fn error(&self, code: i32, message: impl Into<String>) -> PlanitError {
        PlanitError::RemoteInvocation {
            target_type: self.target.type_name.clone(),
            method: self.method.to_string(),
            arg_types: self.args.iter().map(WireValue::type_label).collect(),
            code,
            message: message.into(),
        }
    }

    fn fail(&self, message: impl Into<String>) -> PlanitError {
        self.error(codes::ENGINE_INVOCATION_FAILED, message)
    }

    fn unknown_method(&self) -> PlanitError {
        self.error(
            codes::METHOD_NOT_FOUND,
            format!("no method {} on {}", self.method, self.target.type_name),
        )
    }

    fn arity(&self, expected: usize) -> Result<(), PlanitError> {
        if self.args.len() != expected {
            return Err(self.error(
                codes::INVALID_PARAMS,
                format!("expected {} argument(s), got {}", expected, self.args.len()),
            ));
        }
        Ok(())
    }

    fn arg(&self, index: usize) -> Result<&WireValue, PlanitError> {
        self.args.get(index).ok_or_else(|| {
            self.error(codes::INVALID_PARAMS, format!("missing argument {}", index))
        })
    }

    fn bad_arg(&self, index: usize, expected: &str) -> PlanitError {
        let got = self
            .args
            .get(index)
            .map(WireValue::type_label)
            .unwrap_or_else(|| "nothing".to_string());
        self.error(
            codes::INVALID_PARAMS,
            format!("argument {} must be {}, got {}", index, expected, got),
        )
    }

    fn string(&self, index: usize) -> Result<String, PlanitError> {
        self.arg(index)?
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| self.bad_arg(index, "string"))
    }

    fn int(&self, index: usize) -> Result<i64, PlanitError> {
        self.arg(index)?
            .as_i64()
            .ok_or_else(|| self.bad_arg(index, "int"))
    }

    fn float(&self, index: usize) -> Result<f64, PlanitError> {
        self.arg(index)?
            .as_f64()
            .ok_or_else(|| self.bad_arg(index, "float"))
    }

    fn boolean(&self, index: usize) -> Result<bool, PlanitError> {
        self.arg(index)?
            .as_bool()
            .ok_or_else(|| self.bad_arg(index, "bool"))
    }

    fn object(&self, space: &ObjectSpace, index: usize) -> Result<RemoteHandle, PlanitError> {
        let handle = self
            .arg(index)?
            .as_handle()
            .ok_or_else(|| self.bad_arg(index, "object"))?;
        if space.get(&handle.id).is_none() {
            return Err(self.error(
                codes::UNKNOWN_OBJECT,
                format!("unknown object {}", handle),
            ));
        }
        Ok(handle.clone())
    }

    /// Decode an enum argument of type `E` created with `gateway.createEnum`.
    fn enum_arg<E: RemoteEnum>(&self, space: &ObjectSpace, index: usize) -> Result<E, PlanitError> {
        let handle = self.object(space, index)?;
        if handle.type_name != E::REMOTE_CLASS {
            return Err(self.bad_arg(index, E::REMOTE_CLASS));
        }
        space
            .prop(&handle.id, "constant")
            .and_then(WireValue::as_str)
            .and_then(E::from_remote_constant)
            .ok_or_else(|| self.bad_arg(index, E::REMOTE_CLASS))
    }
}

/// Run one invocation against the object space.
pub fn invoke(space: &mut ObjectSpace, call: &Call<'_>) -> CallResult {
    match space.get(&call.target.id) {
        Some(object) if object.handle.type_name == call.target.type_name => {}
        Some(object) => {
            return Err(call.error(
                codes::UNKNOWN_OBJECT,
                format!("{} is a {}", call.target.id, object.handle.type_name),
            ))
        }
        None => {
            return Err(call.error(
                codes::UNKNOWN_OBJECT,
                format!("unknown object {}", call.target),
            ))
        }
    }

    match call.target.type_name.as_str() {
        ENTRY => entry(space, call),
        PROJECT => project(space, call),
        ASSIGNMENT => assignment(space, call),
        BPR => bpr_cost(space, call),
        FIXED_VIRTUAL => setter(space, call, "setFixedConnectoidCost", Check::NonNegative),
        SPEED_VIRTUAL => setter(space, call, "setConnectoidSpeed", Check::Positive),
        FREEFLOW | MSA => Err(call.unknown_method()),
        INITIAL_COST => getter(space, call, &[("isSegmentSpecific", "segmentSpecific")]),
        NETWORK => network(space, call),
        MODES | TIME_PERIODS => lookup_by_xml_id(space, call),
        MODE => getter(space, call, &[("getXmlId", "xmlId"), ("getName", "name")]),
        ZONING => match call.method {
            "getNumberOfZones" | "getNumberOfCentroids" => Ok(WireValue::Int(ZONE_COUNT)),
            _ => Err(call.unknown_method()),
        },
        DEMANDS => match call.method {
            "getTimePeriods" => {
                call.arity(0)?;
                Ok(WireValue::Object(time_periods(space, &call.target.id)))
            }
            _ => Err(call.unknown_method()),
        },
        TIME_PERIOD => getter(
            space,
            call,
            &[
                ("getXmlId", "xmlId"),
                ("getDescription", "description"),
                ("getStartTimeSeconds", "startTimeSeconds"),
                ("getDurationSeconds", "durationSeconds"),
            ],
        ),
        OUTPUT_CONFIGURATION => match call.method {
            "setPersistOnlyFinalIteration" | "setPersistZeroFlow" => {
                call.arity(1)?;
                let flag = call.boolean(0)?;
                space.set_prop(&call.target.id, call.method, flag);
                Ok(WireValue::Null)
            }
            _ => Err(call.unknown_method()),
        },
        LINK_CONFIGURATION | OD_CONFIGURATION | PATH_CONFIGURATION => {
            output_type_configuration(space, call)
        }
        GAP_FUNCTION => match call.method {
            "getStopCriterion" => {
                call.arity(0)?;
                Ok(WireValue::Object(stop_criterion(space, &call.target.id)))
            }
            _ => Err(call.unknown_method()),
        },
        STOP_CRITERION => stop_criterion_call(space, call),
        PLANIT_FORMATTER => match call.method {
            "setXmlNameRoot" | "setCsvNameRoot" | "setOutputDirectory" => {
                call.arity(1)?;
                let value = call.string(0)?;
                space.set_prop(&call.target.id, call.method, value);
                Ok(WireValue::Null)
            }
            _ => Err(call.unknown_method()),
        },
        MEMORY_FORMATTER => memory_formatter(space, call),
        MEMORY_ITERATOR => memory_iterator(space, call),
        CONVERTER_FACTORY => converter_factory(space, call),
        NETWORK_CONVERTER | ZONING_CONVERTER | INTERMODAL_CONVERTER => converter(space, call),
        OSM_READER => settings_getter(space, call, OSM_READER_SETTINGS),
        PLANIT_READER => settings_getter(space, call, PLANIT_READER_SETTINGS),
        MATSIM_WRITER => settings_getter(space, call, MATSIM_WRITER_SETTINGS),
        PLANIT_WRITER => settings_getter(space, call, PLANIT_WRITER_SETTINGS),
        OSM_READER_SETTINGS | PLANIT_READER_SETTINGS | MATSIM_WRITER_SETTINGS
        | PLANIT_WRITER_SETTINGS => settings(space, call),
        other => Err(call.fail(format!("no behavior for {}", other))),
    }
}

fn entry(space: &mut ObjectSpace, call: &Call<'_>) -> CallResult {
    match call.method {
        "initialiseSimpleProject" => {
            call.arity(1)?;
            let path = call.string(0)?;
            if path.is_empty() {
                return Err(call.fail("project path must not be empty"));
            }
            let project = space.create_with(
                PROJECT,
                [("projectPath", WireValue::from(path)), ("runs", WireValue::Int(0))],
            );
            Ok(WireValue::Object(project))
        }
        "getConverterFactory" => {
            call.arity(0)?;
            Ok(WireValue::Object(space.child(
                &call.target.id,
                "converterFactory",
                CONVERTER_FACTORY,
            )))
        }
        _ => Err(call.unknown_method()),
    }
}

fn project(space: &mut ObjectSpace, call: &Call<'_>) -> CallResult {
    let id = call.target.id.as_str();
    match call.method {
        "createAndRegisterTrafficAssignment" => {
            call.arity(1)?;
            let TrafficAssignment::TraditionalStatic = call.enum_arg::<TrafficAssignment>(space, 0)?;
            let assignment = space.create(ASSIGNMENT);
            let physical = space.create(BPR);
            let virtual_cost = space.create(FIXED_VIRTUAL);
            let smoothing = space.create(MSA);
            space.set_prop(&assignment.id, "physicalCost", WireValue::Object(physical));
            space.set_prop(&assignment.id, "virtualCost", WireValue::Object(virtual_cost));
            space.set_prop(&assignment.id, "smoothing", WireValue::Object(smoothing));
            space.push_prop(id, "assignments", WireValue::Object(assignment.clone()));
            Ok(WireValue::Object(assignment))
        }
        "createAndRegisterOutputFormatter" => {
            call.arity(1)?;
            let class = match call.enum_arg::<OutputFormatter>(space, 0)? {
                OutputFormatter::PlanitIo => PLANIT_FORMATTER,
                OutputFormatter::Memory => MEMORY_FORMATTER,
            };
            let formatter = space.create(class);
            space.push_prop(id, "formatters", WireValue::Object(formatter.clone()));
            Ok(WireValue::Object(formatter))
        }
        "registerInitialLinkSegmentCost" => {
            call.arity(1)?;
            let path = call.string(0)?;
            let cost = space.create_with(
                INITIAL_COST,
                [
                    ("path", WireValue::from(path)),
                    ("segmentSpecific", WireValue::Bool(true)),
                ],
            );
            space.push_prop(id, "initialCosts", WireValue::Object(cost.clone()));
            Ok(WireValue::Object(cost))
        }
        "registerInitialLinkSegmentCostForTimePeriod" => {
            call.arity(2)?;
            let path = call.string(0)?;
            let xml_id = call.string(1)?;
            if !TIME_PERIOD_DATA.iter().any(|(tp, ..)| *tp == xml_id) {
                return Err(call.fail(format!("unknown time period {}", xml_id)));
            }
            let cost = space.create_with(
                INITIAL_COST,
                [
                    ("path", WireValue::from(path)),
                    ("timePeriod", WireValue::from(xml_id)),
                    ("segmentSpecific", WireValue::Bool(true)),
                ],
            );
            space.push_prop(id, "initialCosts", WireValue::Object(cost.clone()));
            Ok(WireValue::Object(cost))
        }
        "getNetwork" => {
            call.arity(0)?;
            Ok(WireValue::Object(space.child(id, "network", NETWORK)))
        }
        "getZoning" => {
            call.arity(0)?;
            Ok(WireValue::Object(space.child(id, "zoning", ZONING)))
        }
        "getDemands" => {
            call.arity(0)?;
            Ok(WireValue::Object(space.child(id, "demands", DEMANDS)))
        }
        "executeAllTrafficAssignments" => {
            call.arity(0)?;
            execute(space, call)
        }
        _ => Err(call.unknown_method()),
    }
}

fn list_of_handles(space: &ObjectSpace, id: &str, key: &str) -> Vec<RemoteHandle> {
    match space.prop(id, key) {
        Some(WireValue::List(items)) => items
            .iter()
            .filter_map(WireValue::as_handle)
            .cloned()
            .collect(),
        _ => Vec::new(),
    }
}

fn execute(space: &mut ObjectSpace, call: &Call<'_>) -> CallResult {
    let id = call.target.id.as_str();
    let assignments = list_of_handles(space, id, "assignments");
    if assignments.is_empty() {
        return Err(call.fail("no traffic assignment registered on project"));
    }

    let mut final_iteration = 0;
    for assignment in &assignments {
        let gap = space.child(&assignment.id, "gapFunction", GAP_FUNCTION);
        let criterion = stop_criterion(space, &gap.id);
        let max_iterations = space
            .prop(&criterion.id, "maxIterations")
            .and_then(WireValue::as_i64)
            .unwrap_or(DEFAULT_MAX_ITERATIONS);
        final_iteration = final_iteration.max(max_iterations);
    }

    for formatter in list_of_handles(space, id, "formatters") {
        if formatter.type_name == MEMORY_FORMATTER {
            space.set_prop(&formatter.id, "finalIteration", final_iteration);
        }
    }
    let runs = space.prop(id, "runs").and_then(WireValue::as_i64).unwrap_or(0);
    space.set_prop(id, "runs", runs + 1);
    Ok(WireValue::Null)
}

fn output_type_class(output_type: OutputType) -> &'static str {
    match output_type {
        OutputType::Link => LINK_CONFIGURATION,
        OutputType::Od => OD_CONFIGURATION,
        OutputType::Path => PATH_CONFIGURATION,
    }
}

fn default_properties(output_type: OutputType) -> Vec<OutputProperty> {
    use OutputProperty::*;
    match output_type {
        OutputType::Link => vec![
            DownstreamNodeXmlId,
            UpstreamNodeXmlId,
            Flow,
            LinkCost,
            Length,
            CalculatedSpeed,
            CapacityPerLane,
            NumberOfLanes,
            MaximumSpeed,
            TotalCostToEndNode,
            DownstreamNodeExternalId,
            UpstreamNodeExternalId,
            TimePeriodExternalId,
            TimePeriodId,
        ],
        OutputType::Od => vec![
            OriginZoneXmlId,
            DestinationZoneXmlId,
            OdCost,
            TimePeriodExternalId,
            RunId,
        ],
        OutputType::Path => vec![OriginZoneXmlId, DestinationZoneXmlId, PathString],
    }
}

fn property_list(properties: &[OutputProperty]) -> WireValue {
    WireValue::List(
        properties
            .iter()
            .map(|p| WireValue::from(p.remote_constant()))
            .collect(),
    )
}

fn assignment(space: &mut ObjectSpace, call: &Call<'_>) -> CallResult {
    let id = call.target.id.as_str();
    match call.method {
        "createAndRegisterPhysicalCost" => {
            call.arity(1)?;
            let class = match call.enum_arg::<PhysicalCost>(space, 0)? {
                PhysicalCost::Bpr => BPR,
                PhysicalCost::Freeflow => FREEFLOW,
            };
            let cost = space.create(class);
            space.set_prop(id, "physicalCost", WireValue::Object(cost.clone()));
            Ok(WireValue::Object(cost))
        }
        "createAndRegisterVirtualCost" => {
            call.arity(1)?;
            let class = match call.enum_arg::<VirtualCost>(space, 0)? {
                VirtualCost::Fixed => FIXED_VIRTUAL,
                VirtualCost::Speed => SPEED_VIRTUAL,
            };
            let cost = space.create(class);
            space.set_prop(id, "virtualCost", WireValue::Object(cost.clone()));
            Ok(WireValue::Object(cost))
        }
        "createAndRegisterSmoothing" => {
            call.arity(1)?;
            let Smoothing::Msa = call.enum_arg::<Smoothing>(space, 0)?;
            let smoothing = space.create(MSA);
            space.set_prop(id, "smoothing", WireValue::Object(smoothing.clone()));
            Ok(WireValue::Object(smoothing))
        }
        "getPhysicalCost" | "getVirtualCost" | "getSmoothing" => {
            call.arity(0)?;
            let key = match call.method {
                "getPhysicalCost" => "physicalCost",
                "getVirtualCost" => "virtualCost",
                _ => "smoothing",
            };
            Ok(space.prop(id, key).cloned().unwrap_or(WireValue::Null))
        }
        "activateOutput" => {
            call.arity(1)?;
            let output_type = call.enum_arg::<OutputType>(space, 0)?;
            let key = format!("output.{}", output_type.remote_constant());
            let existing = space.prop(id, &key).and_then(WireValue::as_handle).cloned();
            let configuration = match existing {
                Some(handle) => handle,
                None => {
                    let handle = space.create_with(
                        output_type_class(output_type),
                        [("properties", property_list(&default_properties(output_type)))],
                    );
                    space.set_prop(id, &key, WireValue::Object(handle.clone()));
                    handle
                }
            };
            space.set_prop(id, &format!("{}.active", key), true);
            Ok(WireValue::Object(configuration))
        }
        "deactivateOutput" => {
            call.arity(1)?;
            let output_type = call.enum_arg::<OutputType>(space, 0)?;
            space.set_prop(
                id,
                &format!("output.{}.active", output_type.remote_constant()),
                false,
            );
            Ok(WireValue::Null)
        }
        "isOutputTypeActive" => {
            call.arity(1)?;
            let output_type = call.enum_arg::<OutputType>(space, 0)?;
            let active = space
                .prop(id, &format!("output.{}.active", output_type.remote_constant()))
                .and_then(WireValue::as_bool)
                .unwrap_or(false);
            Ok(WireValue::Bool(active))
        }
        "getOutputConfiguration" => {
            call.arity(0)?;
            Ok(WireValue::Object(space.child(
                id,
                "outputConfiguration",
                OUTPUT_CONFIGURATION,
            )))
        }
        "getOutputTypeConfiguration" => {
            call.arity(1)?;
            let output_type = call.enum_arg::<OutputType>(space, 0)?;
            match space.prop(id, &format!("output.{}", output_type.remote_constant())) {
                Some(value @ WireValue::Object(_)) => Ok(value.clone()),
                _ => Err(call.fail(format!(
                    "output type {} has not been activated",
                    output_type
                ))),
            }
        }
        "getGapFunction" => {
            call.arity(0)?;
            Ok(WireValue::Object(space.child(id, "gapFunction", GAP_FUNCTION)))
        }
        _ => Err(call.unknown_method()),
    }
}

fn bpr_cost(space: &mut ObjectSpace, call: &Call<'_>) -> CallResult {
    match call.method {
        "setDefaultParameters" | "setParameters" => {
            call.arity(4)?;
            let alpha = call.float(0)?;
            let beta = call.float(1)?;
            let mode = call.string(2)?;
            let segment = call.string(3)?;
            if alpha < 0.0 || beta < 0.0 {
                return Err(call.fail("BPR parameters must be non-negative"));
            }
            if mode != MODE_XML_ID {
                return Err(call.fail(format!("unknown mode {}", mode)));
            }
            let key = format!("{}.{}.{}", call.method, mode, segment);
            space.set_prop(
                &call.target.id,
                &key,
                WireValue::List(vec![WireValue::Float(alpha), WireValue::Float(beta)]),
            );
            Ok(WireValue::Null)
        }
        _ => Err(call.unknown_method()),
    }
}

enum Check {
    NonNegative,
    Positive,
}

/// Single float setter with a range check.
fn setter(space: &mut ObjectSpace, call: &Call<'_>, method: &str, check: Check) -> CallResult {
    if call.method != method {
        return Err(call.unknown_method());
    }
    call.arity(1)?;
    let value = call.float(0)?;
    let valid = match check {
        Check::NonNegative => value >= 0.0,
        Check::Positive => value > 0.0,
    };
    if !valid {
        return Err(call.fail(format!("{} is out of range for {}", value, method)));
    }
    space.set_prop(&call.target.id, method, value);
    Ok(WireValue::Null)
}

/// Zero-argument getters reading a stored property.
fn getter(space: &mut ObjectSpace, call: &Call<'_>, getters: &[(&str, &str)]) -> CallResult {
    let (_, key) = getters
        .iter()
        .find(|(method, _)| *method == call.method)
        .ok_or_else(|| call.unknown_method())?;
    call.arity(0)?;
    Ok(space
        .prop(&call.target.id, key)
        .cloned()
        .unwrap_or(WireValue::Null))
}

fn network(space: &mut ObjectSpace, call: &Call<'_>) -> CallResult {
    match call.method {
        "getModes" => {
            call.arity(0)?;
            if let Some(WireValue::Object(modes)) = space.prop(&call.target.id, "modes") {
                return Ok(WireValue::Object(modes.clone()));
            }
            let mode = space.create_with(
                MODE,
                [
                    ("xmlId", WireValue::from(MODE_XML_ID)),
                    ("name", WireValue::from("car")),
                ],
            );
            let modes = space.create_with(MODES, [("items", WireValue::List(vec![WireValue::Object(mode)]))]);
            space.set_prop(&call.target.id, "modes", WireValue::Object(modes.clone()));
            Ok(WireValue::Object(modes))
        }
        "getNumberOfLinkSegments" => {
            call.arity(0)?;
            Ok(WireValue::Int(LINK_SEGMENT_COUNT))
        }
        _ => Err(call.unknown_method()),
    }
}

fn time_periods(space: &mut ObjectSpace, demands: &str) -> RemoteHandle {
    if let Some(WireValue::Object(handle)) = space.prop(demands, "timePeriods") {
        return handle.clone();
    }
    let items = TIME_PERIOD_DATA
        .iter()
        .map(|(xml_id, description, start, duration)| {
            WireValue::Object(space.create_with(
                TIME_PERIOD,
                [
                    ("xmlId", WireValue::from(*xml_id)),
                    ("description", WireValue::from(*description)),
                    ("startTimeSeconds", WireValue::Int(*start)),
                    ("durationSeconds", WireValue::Int(*duration)),
                ],
            ))
        })
        .collect();
    let handle = space.create_with(TIME_PERIODS, [("items", WireValue::List(items))]);
    space.set_prop(demands, "timePeriods", WireValue::Object(handle.clone()));
    handle
}

/// `size` and `getByXmlId` over a container holding an `items` list.
fn lookup_by_xml_id(space: &mut ObjectSpace, call: &Call<'_>) -> CallResult {
    let items = list_of_handles(space, &call.target.id, "items");
    match call.method {
        "size" => {
            call.arity(0)?;
            Ok(WireValue::Int(items.len() as i64))
        }
        "getByXmlId" => {
            call.arity(1)?;
            let xml_id = call.string(0)?;
            Ok(items
                .into_iter()
                .find(|item| {
                    space.prop(&item.id, "xmlId").and_then(WireValue::as_str) == Some(xml_id.as_str())
                })
                .map(WireValue::Object)
                .unwrap_or(WireValue::Null))
        }
        _ => Err(call.unknown_method()),
    }
}

fn output_type_configuration(space: &mut ObjectSpace, call: &Call<'_>) -> CallResult {
    let id = call.target.id.as_str();
    let mut properties: Vec<String> = match space.prop(id, "properties") {
        Some(WireValue::List(items)) => items
            .iter()
            .filter_map(WireValue::as_str)
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    };

    let changed = match call.method {
        "addProperty" => {
            call.arity(1)?;
            let property = call.enum_arg::<OutputProperty>(space, 0)?.remote_constant();
            if properties.iter().any(|p| p == property) {
                false
            } else {
                properties.push(property.to_string());
                true
            }
        }
        "removeProperty" => {
            call.arity(1)?;
            let property = call.enum_arg::<OutputProperty>(space, 0)?.remote_constant();
            let before = properties.len();
            properties.retain(|p| p != property);
            before != properties.len()
        }
        "removeAllProperties" => {
            call.arity(0)?;
            properties.clear();
            space.set_prop(id, "properties", WireValue::List(Vec::new()));
            return Ok(WireValue::Null);
        }
        "activate" | "deactivate" if call.target.type_name == OD_CONFIGURATION => {
            call.arity(1)?;
            let sub_type = call.enum_arg::<OdSkimSubOutputType>(space, 0)?;
            let key = format!("skim.{}", sub_type.remote_constant());
            space.set_prop(id, &key, call.method == "activate");
            return Ok(WireValue::Null);
        }
        "setPathIdType" if call.target.type_name == PATH_CONFIGURATION => {
            call.arity(1)?;
            let id_type = call.enum_arg::<PathIdType>(space, 0)?;
            space.set_prop(id, "pathIdType", id_type.remote_constant());
            return Ok(WireValue::Null);
        }
        _ => return Err(call.unknown_method()),
    };

    space.set_prop(
        id,
        "properties",
        WireValue::List(properties.into_iter().map(WireValue::from).collect()),
    );
    Ok(WireValue::Bool(changed))
}

fn stop_criterion(space: &mut ObjectSpace, gap_function: &str) -> RemoteHandle {
    if let Some(WireValue::Object(handle)) = space.prop(gap_function, "stopCriterion") {
        return handle.clone();
    }
    let handle = space.create_with(
        STOP_CRITERION,
        [
            ("maxIterations", WireValue::Int(DEFAULT_MAX_ITERATIONS)),
            ("epsilon", WireValue::Float(DEFAULT_EPSILON)),
        ],
    );
    space.set_prop(gap_function, "stopCriterion", WireValue::Object(handle.clone()));
    handle
}

fn stop_criterion_call(space: &mut ObjectSpace, call: &Call<'_>) -> CallResult {
    let id = call.target.id.as_str();
    match call.method {
        "setMaxIterations" => {
            call.arity(1)?;
            let max_iterations = call.int(0)?;
            if max_iterations < 1 {
                return Err(call.fail("maximum iterations must be at least 1"));
            }
            space.set_prop(id, "maxIterations", max_iterations);
            Ok(WireValue::Null)
        }
        "setEpsilon" => {
            call.arity(1)?;
            let epsilon = call.float(0)?;
            if epsilon < 0.0 {
                return Err(call.fail("epsilon must not be negative"));
            }
            space.set_prop(id, "epsilon", epsilon);
            Ok(WireValue::Null)
        }
        "getMaxIterations" => {
            call.arity(0)?;
            Ok(space.prop(id, "maxIterations").cloned().unwrap_or(WireValue::Null))
        }
        "getEpsilon" => {
            call.arity(0)?;
            Ok(space.prop(id, "epsilon").cloned().unwrap_or(WireValue::Null))
        }
        _ => Err(call.unknown_method()),
    }
}

fn key_properties(output_type: OutputType) -> [OutputProperty; 2] {
    match output_type {
        OutputType::Link => [
            OutputProperty::DownstreamNodeXmlId,
            OutputProperty::UpstreamNodeXmlId,
        ],
        OutputType::Od | OutputType::Path => [
            OutputProperty::OriginZoneXmlId,
            OutputProperty::DestinationZoneXmlId,
        ],
    }
}

fn value_properties(output_type: OutputType) -> Vec<OutputProperty> {
    use OutputProperty::*;
    match output_type {
        OutputType::Link => vec![
            Flow,
            LinkCost,
            Length,
            CalculatedSpeed,
            CapacityPerLane,
            NumberOfLanes,
        ],
        OutputType::Od => vec![OdCost],
        OutputType::Path => vec![PathString],
    }
}

/// Canned result rows: (keys, values) in the column order of the properties above.
fn result_rows(output_type: OutputType) -> Vec<(Vec<WireValue>, Vec<WireValue>)> {
    let keys = |a: &str, b: &str| vec![WireValue::from(a), WireValue::from(b)];
    match output_type {
        OutputType::Link => ["1", "2", "3", "4"]
            .windows(2)
            .map(|pair| {
                (
                    keys(pair[1], pair[0]),
                    vec![
                        WireValue::Float(1000.0),
                        WireValue::Float(0.0127),
                        WireValue::Float(1.0),
                        WireValue::Float(78.74),
                        WireValue::Float(3600.0),
                        WireValue::Int(1),
                    ],
                )
            })
            .collect(),
        OutputType::Od => vec![
            (keys("1", "1"), vec![WireValue::Float(0.0)]),
            (keys("1", "2"), vec![WireValue::Float(0.0381)]),
            (keys("2", "1"), vec![WireValue::Float(0.0)]),
            (keys("2", "2"), vec![WireValue::Float(0.0)]),
        ],
        OutputType::Path => vec![
            (keys("1", "1"), vec![WireValue::from("")]),
            (keys("1", "2"), vec![WireValue::from("[1,2,3,4]")]),
            (keys("2", "1"), vec![WireValue::from("")]),
            (keys("2", "2"), vec![WireValue::from("")]),
        ],
    }
}

fn memory_formatter(space: &mut ObjectSpace, call: &Call<'_>) -> CallResult {
    match call.method {
        "getPositionOfOutputValueProperty" | "getPositionOfOutputKeyProperty" => {
            call.arity(2)?;
            let output_type = call.enum_arg::<OutputType>(space, 0)?;
            let property = call.enum_arg::<OutputProperty>(space, 1)?;
            let columns: Vec<OutputProperty> = if call.method == "getPositionOfOutputKeyProperty" {
                key_properties(output_type).to_vec()
            } else {
                value_properties(output_type)
            };
            columns
                .iter()
                .position(|p| *p == property)
                .map(|position| WireValue::Int(position as i64))
                .ok_or_else(|| {
                    call.fail(format!("{} is not an output column of {}", property, output_type))
                })
        }
        "iterator" => {
            call.arity(4)?;
            let mode = call.string(0)?;
            let time_period = call.string(1)?;
            let iteration = call.int(2)?;
            let output_type = call.enum_arg::<OutputType>(space, 3)?;

            let final_iteration = space
                .prop(&call.target.id, "finalIteration")
                .and_then(WireValue::as_i64)
                .ok_or_else(|| call.fail("no results stored; run the assignment first"))?;
            if mode != MODE_XML_ID {
                return Err(call.fail(format!("unknown mode {}", mode)));
            }
            if !TIME_PERIOD_DATA.iter().any(|(tp, ..)| *tp == time_period) {
                return Err(call.fail(format!("unknown time period {}", time_period)));
            }
            if iteration < 0 || iteration > final_iteration {
                return Err(call.fail(format!(
                    "iteration {} outside stored range 0..={}",
                    iteration, final_iteration
                )));
            }

            let rows = result_rows(output_type)
                .into_iter()
                .map(|(keys, values)| WireValue::List(vec![WireValue::List(keys), WireValue::List(values)]))
                .collect();
            let iterator = space.create_with(
                MEMORY_ITERATOR,
                [("rows", WireValue::List(rows)), ("cursor", WireValue::Int(-1))],
            );
            Ok(WireValue::Object(iterator))
        }
        _ => Err(call.unknown_method()),
    }
}

fn memory_iterator(space: &mut ObjectSpace, call: &Call<'_>) -> CallResult {
    let id = call.target.id.as_str();
    let rows = match space.prop(id, "rows") {
        Some(WireValue::List(rows)) => rows.clone(),
        _ => Vec::new(),
    };
    let cursor = space.prop(id, "cursor").and_then(WireValue::as_i64).unwrap_or(-1);
    let current = |column: usize| -> CallResult {
        let row = usize::try_from(cursor)
            .ok()
            .and_then(|index| rows.get(index))
            .ok_or_else(|| call.fail("iterator is not positioned on a row; call next first"))?;
        match row {
            WireValue::List(columns) => Ok(columns.get(column).cloned().unwrap_or(WireValue::Null)),
            _ => Ok(WireValue::Null),
        }
    };

    match call.method {
        "hasNext" => {
            call.arity(0)?;
            Ok(WireValue::Bool(cursor + 1 < rows.len() as i64))
        }
        "next" => {
            call.arity(0)?;
            if cursor + 1 >= rows.len() as i64 {
                return Err(call.fail("no more rows"));
            }
            space.set_prop(id, "cursor", cursor + 1);
            Ok(WireValue::Null)
        }
        "getKeys" => {
            call.arity(0)?;
            current(0)
        }
        "getValues" => {
            call.arity(0)?;
            current(1)
        }
        _ => Err(call.unknown_method()),
    }
}

fn converter_factory(space: &mut ObjectSpace, call: &Call<'_>) -> CallResult {
    match call.method {
        "create" => {
            call.arity(1)?;
            let class = match call.enum_arg::<ConverterType>(space, 0)? {
                ConverterType::Network => NETWORK_CONVERTER,
                ConverterType::Zoning => ZONING_CONVERTER,
                ConverterType::Intermodal => INTERMODAL_CONVERTER,
            };
            Ok(WireValue::Object(space.create(class)))
        }
        _ => Err(call.unknown_method()),
    }
}

fn is_reader(class: &str) -> bool {
    class == OSM_READER || class == PLANIT_READER
}

fn is_writer(class: &str) -> bool {
    class == MATSIM_WRITER || class == PLANIT_WRITER
}

fn converter(space: &mut ObjectSpace, call: &Call<'_>) -> CallResult {
    let is_network = call.target.type_name == NETWORK_CONVERTER;
    match call.method {
        "createReader" if is_network => {
            call.arity(2)?;
            let reader_type = call.enum_arg::<NetworkReaderType>(space, 0)?;
            let country = call.string(1)?;
            let (class, settings_class) = match reader_type {
                NetworkReaderType::Osm => (OSM_READER, OSM_READER_SETTINGS),
                NetworkReaderType::Planit => (PLANIT_READER, PLANIT_READER_SETTINGS),
            };
            let reader = space.create(class);
            let settings = space.child(&reader.id, "settings", settings_class);
            space.set_prop(&settings.id, "setCountryName", country);
            Ok(WireValue::Object(reader))
        }
        "createWriter" if is_network => {
            call.arity(1)?;
            let class = match call.enum_arg::<NetworkWriterType>(space, 0)? {
                NetworkWriterType::Planit => PLANIT_WRITER,
                NetworkWriterType::Matsim => MATSIM_WRITER,
            };
            Ok(WireValue::Object(space.create(class)))
        }
        "convert" => {
            call.arity(2)?;
            let reader = call.object(space, 0)?;
            let writer = call.object(space, 1)?;
            if !is_reader(&reader.type_name) {
                return Err(call.fail(format!("{} is not a reader", reader.type_name)));
            }
            if !is_writer(&writer.type_name) {
                return Err(call.fail(format!("{} is not a writer", writer.type_name)));
            }

            let reader_settings = space.child(&reader.id, "settings", settings_class_of(&reader.type_name));
            let input_key = if reader.type_name == OSM_READER {
                "setInputFile"
            } else {
                "setInputDirectory"
            };
            if space.prop(&reader_settings.id, input_key).is_none() {
                return Err(call.fail(format!("reader input not configured ({})", input_key)));
            }
            let writer_settings = space.child(&writer.id, "settings", settings_class_of(&writer.type_name));
            if space.prop(&writer_settings.id, "setOutputDirectory").is_none() {
                return Err(call.fail("writer output directory not configured"));
            }

            let conversions = space
                .prop(&call.target.id, "conversions")
                .and_then(WireValue::as_i64)
                .unwrap_or(0);
            space.set_prop(&call.target.id, "conversions", conversions + 1);
            Ok(WireValue::Null)
        }
        _ => Err(call.unknown_method()),
    }
}

fn settings_class_of(class: &str) -> &'static str {
    match class {
        OSM_READER => OSM_READER_SETTINGS,
        PLANIT_READER => PLANIT_READER_SETTINGS,
        MATSIM_WRITER => MATSIM_WRITER_SETTINGS,
        _ => PLANIT_WRITER_SETTINGS,
    }
}

fn settings_getter(space: &mut ObjectSpace, call: &Call<'_>, settings_class: &str) -> CallResult {
    match call.method {
        "getSettings" => {
            call.arity(0)?;
            Ok(WireValue::Object(space.child(
                &call.target.id,
                "settings",
                settings_class,
            )))
        }
        _ => Err(call.unknown_method()),
    }
}

fn settings(space: &mut ObjectSpace, call: &Call<'_>) -> CallResult {
    let allowed: &[&str] = match call.target.type_name.as_str() {
        OSM_READER_SETTINGS => &["setInputFile", "setCountryName"],
        PLANIT_READER_SETTINGS => &["setInputDirectory", "setCountryName"],
        _ => &["setOutputDirectory", "setCountry"],
    };
    if !allowed.contains(&call.method) {
        return Err(call.unknown_method());
    }
    call.arity(1)?;
    let value = call.string(0)?;
    if value.is_empty() {
        return Err(call.fail(format!("{} requires a non-empty value", call.method)));
    }
    space.set_prop(&call.target.id, call.method, value);
    Ok(WireValue::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call<'a>(target: &'a RemoteHandle, method: &'a str, args: &'a [WireValue]) -> Call<'a> {
        Call {
            target,
            method,
            args,
        }
    }

    fn enum_value<E: RemoteEnum>(space: &mut ObjectSpace, value: E) -> WireValue {
        WireValue::Object(space.enum_instance(E::REMOTE_CLASS, value.remote_constant()))
    }

    fn project(space: &mut ObjectSpace) -> RemoteHandle {
        let entry = space.create(ENTRY);
        let result = invoke(
            space,
            &call(&entry, "initialiseSimpleProject", &[WireValue::from("/tmp/project")]),
        )
        .unwrap();
        result.as_handle().unwrap().clone()
    }

    #[test]
    fn test_unknown_target_is_unknown_object() {
        let mut space = ObjectSpace::new();
        let ghost = RemoteHandle::new("o99", STOP_CRITERION);

        let err = invoke(&mut space, &call(&ghost, "getEpsilon", &[])).unwrap_err();
        assert_eq!(err.to_rpc_error_code(), codes::UNKNOWN_OBJECT);
    }

    #[test]
    fn test_negative_epsilon_fails_in_engine() {
        let mut space = ObjectSpace::new();
        let gap = space.create(GAP_FUNCTION);
        let criterion = stop_criterion(&mut space, &gap.id);

        let err = invoke(&mut space, &call(&criterion, "setEpsilon", &[WireValue::Float(-1.0)]))
            .unwrap_err();
        assert_eq!(err.to_rpc_error_code(), codes::ENGINE_INVOCATION_FAILED);
        assert!(err.to_string().contains("epsilon"));
    }

    #[test]
    fn test_execute_without_assignment_fails() {
        let mut space = ObjectSpace::new();
        let project = project(&mut space);

        let err = invoke(&mut space, &call(&project, "executeAllTrafficAssignments", &[]))
            .unwrap_err();
        assert!(err.to_string().contains("no traffic assignment"));
    }

    #[test]
    fn test_output_formatter_class_follows_enum() {
        let mut space = ObjectSpace::new();
        let project = project(&mut space);
        let memory = enum_value(&mut space, OutputFormatter::Memory);

        let formatter = invoke(
            &mut space,
            &call(&project, "createAndRegisterOutputFormatter", &[memory]),
        )
        .unwrap();
        assert_eq!(formatter.as_handle().unwrap().type_name, MEMORY_FORMATTER);
    }

    #[test]
    fn test_remove_property_reports_change() {
        let mut space = ObjectSpace::new();
        let assignment = space.create(ASSIGNMENT);
        let link = enum_value(&mut space, OutputType::Link);
        let configuration = invoke(&mut space, &call(&assignment, "activateOutput", &[link]))
            .unwrap()
            .as_handle()
            .unwrap()
            .clone();
        let flow = enum_value(&mut space, OutputProperty::Flow);

        let first = invoke(&mut space, &call(&configuration, "removeProperty", &[flow.clone()]));
        let second = invoke(&mut space, &call(&configuration, "removeProperty", &[flow]));
        assert_eq!(first.unwrap(), WireValue::Bool(true));
        assert_eq!(second.unwrap(), WireValue::Bool(false));
    }

    #[test]
    fn test_enum_argument_of_wrong_class_is_rejected() {
        let mut space = ObjectSpace::new();
        let project = project(&mut space);
        let wrong = enum_value(&mut space, OutputType::Link);

        let err = invoke(
            &mut space,
            &call(&project, "createAndRegisterTrafficAssignment", &[wrong]),
        )
        .unwrap_err();
        assert_eq!(err.to_rpc_error_code(), codes::INVALID_PARAMS);
    }

    #[test]
    fn test_memory_iterator_walks_rows() {
        let mut space = ObjectSpace::new();
        let iterator = space.create_with(
            MEMORY_ITERATOR,
            [
                (
                    "rows",
                    WireValue::List(vec![WireValue::List(vec![
                        WireValue::List(vec![WireValue::from("1")]),
                        WireValue::List(vec![WireValue::Float(2.0)]),
                    ])]),
                ),
                ("cursor", WireValue::Int(-1)),
            ],
        );

        assert!(invoke(&mut space, &call(&iterator, "getKeys", &[])).is_err());
        assert_eq!(
            invoke(&mut space, &call(&iterator, "hasNext", &[])).unwrap(),
            WireValue::Bool(true)
        );
        invoke(&mut space, &call(&iterator, "next", &[])).unwrap();
        assert_eq!(
            invoke(&mut space, &call(&iterator, "getValues", &[])).unwrap(),
            WireValue::List(vec![WireValue::Float(2.0)])
        );
        assert_eq!(
            invoke(&mut space, &call(&iterator, "hasNext", &[])).unwrap(),
            WireValue::Bool(false)
        );
    }
}

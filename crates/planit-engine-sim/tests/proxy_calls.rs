//! Proxy call pipeline against an in-process simulator.

mod common;

use common::AttachedEngine;
use planit_core::enums::{
    ConverterType, EnumRef, NetworkReaderType, NetworkWriterType, OutputFormatter,
    OutputProperty, OutputType, TrafficAssignment,
};
use planit_core::wrappers::*;
use planit_core::{
    Arg, EngineSupervisor, MappingKind, PlanitError, Planit, ProxyState, RemoteObject,
    WireValue,
};
use planit_engine_sim::LoggedRequest;
use std::path::Path;
use std::sync::Arc;

const OUTPUT_TYPE: &str = "org.planit.output.enums.OutputType";
const OUTPUT_PROPERTY: &str = "org.planit.output.property.OutputProperty";

fn create_enum(class: &str, value: &str) -> LoggedRequest {
    LoggedRequest::CreateEnum {
        class: class.to_string(),
        value: value.to_string(),
    }
}

#[tokio::test]
async fn test_call_translates_method_name_and_binds_lazily() {
    let sim = AttachedEngine::start().await;
    let plan_it = sim.planit();

    assert_eq!(plan_it.project().state(), ProxyState::Unbound);
    assert_eq!(sim.supervisor.generation().await, 0);

    plan_it
        .set_traffic_assignment(TrafficAssignment::TraditionalStatic)
        .await
        .unwrap();

    assert_eq!(plan_it.project().state(), ProxyState::Bound);
    assert_eq!(
        sim.engine.invocations(),
        vec![
            "org.planit.python.PLANitJ2Py.initialiseSimpleProject",
            "org.planit.project.PlanItSimpleProject.createAndRegisterTrafficAssignment",
        ]
    );

    let requests = sim.engine.requests();
    assert_eq!(
        requests[1],
        create_enum("org.planit.assignment.TrafficAssignment", "TRADITIONAL_STATIC")
    );
    match &requests[0] {
        LoggedRequest::Invoke { args, .. } => {
            assert_eq!(args, &vec![WireValue::from("/projects/route_choice")]);
        }
        other => panic!("Expected invocation, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_one_create_enum_per_enum_argument_in_order() {
    let sim = AttachedEngine::start().await;
    let plan_it = sim.planit();
    plan_it
        .set_output_formatter(OutputFormatter::Memory)
        .await
        .unwrap();
    let memory = plan_it.memory().await.unwrap();
    let before = sim.engine.requests().len();

    let position = memory
        .get_position_of_output_value_property(OutputType::Link, OutputProperty::Flow)
        .await
        .unwrap();
    assert_eq!(position, 0);

    let requests = sim.engine.requests();
    let new_requests = &requests[before..];
    assert_eq!(new_requests.len(), 3);
    assert_eq!(new_requests[0], create_enum(OUTPUT_TYPE, "LINK"));
    assert_eq!(new_requests[1], create_enum(OUTPUT_PROPERTY, "FLOW"));
    match &new_requests[2] {
        LoggedRequest::Invoke { method, args, .. } => {
            assert_eq!(method, "getPositionOfOutputValueProperty");
            assert_eq!(args[0].as_handle().unwrap().type_name, OUTPUT_TYPE);
            assert_eq!(args[1].as_handle().unwrap().type_name, OUTPUT_PROPERTY);
        }
        other => panic!("Expected invocation, got: {:?}", other),
    }
}

#[tokio::test]
async fn test_undeclared_operation_never_reaches_engine() {
    let sim = AttachedEngine::start().await;
    let plan_it = sim.planit();

    let err = plan_it
        .project()
        .proxy()
        .call("run_everything", Vec::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        PlanitError::Mapping {
            kind: MappingKind::Operation,
            ..
        }
    ));
    assert!(sim.engine.requests().is_empty());
    assert_eq!(sim.supervisor.generation().await, 0);
}

#[tokio::test]
async fn test_returned_type_mismatch_is_mapping_error() {
    let sim = AttachedEngine::start().await;
    let plan_it = sim.planit();

    let wrong = StopCriterion::lazy_child(plan_it.project().proxy(), "get_network", Vec::new());
    let err = wrong.get_epsilon().await.unwrap_err();
    assert!(matches!(
        err,
        PlanitError::Mapping {
            kind: MappingKind::RemoteType,
            ..
        }
    ));

    let assignment = plan_it
        .set_traffic_assignment(TrafficAssignment::TraditionalStatic)
        .await
        .unwrap();
    let od = assignment.activate_output(OutputType::Od).await.unwrap();
    assert!(od.clone().downcast::<LinkOutputTypeConfiguration>().is_err());
    assert!(od.downcast::<OdOutputTypeConfiguration>().is_ok());
}

#[tokio::test]
async fn test_remote_error_keeps_channel_usable() {
    let sim = AttachedEngine::start().await;
    let plan_it = sim.planit();
    plan_it
        .set_traffic_assignment(TrafficAssignment::TraditionalStatic)
        .await
        .unwrap();
    let criterion = plan_it.stop_criterion().await.unwrap();

    let err = criterion.set_epsilon(-1.0).await.unwrap_err();
    match &err {
        PlanitError::RemoteInvocation {
            target_type,
            method,
            arg_types,
            message,
            ..
        } => {
            assert_eq!(target_type, "org.planit.gap.StopCriterion");
            assert_eq!(method, "setEpsilon");
            assert_eq!(arg_types, &vec!["float".to_string()]);
            assert!(message.contains("epsilon"));
        }
        other => panic!("Expected remote invocation error, got: {:?}", other),
    }
    assert!(!err.is_channel_error());
    assert_eq!(criterion.state(), ProxyState::Bound);

    criterion.set_epsilon(0.001).await.unwrap();
    assert_eq!(criterion.get_epsilon().await.unwrap(), 0.001);
}

#[tokio::test]
async fn test_proxies_become_invalid_after_channel_loss() {
    let mut sim = AttachedEngine::start().await;
    let plan_it = sim.planit();
    let network = plan_it.network();
    assert_eq!(network.get_number_of_link_segments().await.unwrap(), 4);

    sim.kill_server().await;

    let err = network.get_number_of_link_segments().await.unwrap_err();
    assert!(err.is_channel_error());
    assert_eq!(network.state(), ProxyState::Invalid);
    assert_eq!(plan_it.project().state(), ProxyState::Invalid);

    // An invalid proxy never rebinds, even to a fresh engine.
    let err = network.get_number_of_link_segments().await.unwrap_err();
    assert!(err.is_channel_error());
    assert!(err.to_string().contains("getNumberOfLinkSegments"));
}

#[tokio::test]
async fn test_lazy_child_binds_once() {
    let sim = AttachedEngine::start().await;
    let plan_it = sim.planit();

    plan_it.network().get_number_of_link_segments().await.unwrap();
    plan_it.network().get_number_of_link_segments().await.unwrap();

    let get_network = sim
        .engine
        .invocations()
        .iter()
        .filter(|call| call.ends_with(".getNetwork"))
        .count();
    assert_eq!(get_network, 1);
}

#[tokio::test]
async fn test_concurrent_calls_share_one_channel() {
    let sim = AttachedEngine::start().await;
    let plan_it = Arc::new(sim.planit());
    plan_it.zoning().get_number_of_zones().await.unwrap();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let plan_it = plan_it.clone();
        tasks.push(tokio::spawn(async move {
            plan_it.zoning().get_number_of_centroids().await
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 2);
    }
    assert_eq!(sim.supervisor.generation().await, 1);
}

#[tokio::test]
async fn test_optional_returns_and_lookups() {
    let sim = AttachedEngine::start().await;
    let plan_it = sim.planit();

    let periods = plan_it.demands().get_time_periods().await.unwrap();
    assert_eq!(periods.size().await.unwrap(), 3);
    let second = periods.get_by_xml_id("1").await.unwrap().unwrap();
    assert_eq!(second.get_start_time_seconds().await.unwrap(), 3600);
    assert!(periods.get_by_xml_id("42").await.unwrap().is_none());

    let modes = plan_it.network().get_modes().await.unwrap();
    let car = modes.get_by_xml_id("1").await.unwrap().unwrap();
    assert_eq!(car.get_name().await.unwrap(), "car");
}

#[tokio::test]
async fn test_converter_pipeline() {
    let sim = AttachedEngine::start().await;
    let plan_it = sim.planit();

    let converter = plan_it
        .converter_factory()
        .create(ConverterType::Network)
        .await
        .unwrap()
        .downcast::<NetworkConverter>()
        .unwrap();
    let reader = converter
        .create_reader(NetworkReaderType::Osm, "Australia")
        .await
        .unwrap();
    let writer = converter
        .create_writer(NetworkWriterType::Matsim)
        .await
        .unwrap();

    // Unconfigured input is rejected by the engine.
    let err = converter.convert(&reader, &writer).await.unwrap_err();
    assert!(err.is_remote_invocation());

    let osm = reader.clone().downcast::<OsmNetworkReader>().unwrap();
    osm.get_settings()
        .await
        .unwrap()
        .set_input_file(Path::new("/data/sydney.osm.pbf"))
        .await
        .unwrap();
    let matsim = writer.clone().downcast::<MatsimNetworkWriter>().unwrap();
    let settings = matsim.get_settings().await.unwrap();
    settings.set_output_directory(Path::new("/tmp/out")).await.unwrap();
    settings.set_country("Australia").await.unwrap();

    converter.convert(&reader, &writer).await.unwrap();
    let handle = converter.proxy().handle().unwrap().clone();
    assert_eq!(
        sim.engine.property(&handle.id, "conversions"),
        Some(WireValue::Int(1))
    );
}

#[tokio::test]
async fn test_proxy_argument_from_other_engine_is_rejected() {
    let first = AttachedEngine::start().await;
    let second = AttachedEngine::start().await;

    let converter = first
        .planit()
        .converter_factory()
        .create(ConverterType::Network)
        .await
        .unwrap()
        .downcast::<NetworkConverter>()
        .unwrap();
    let other_converter = second
        .planit()
        .converter_factory()
        .create(ConverterType::Network)
        .await
        .unwrap()
        .downcast::<NetworkConverter>()
        .unwrap();
    let reader = converter
        .create_reader(NetworkReaderType::Planit, "Australia")
        .await
        .unwrap();
    let writer = other_converter
        .create_writer(NetworkWriterType::Planit)
        .await
        .unwrap();

    let err = converter.convert(&reader, &writer).await.unwrap_err();
    assert!(err.is_channel_error());
    assert!(err.to_string().contains(".convert"));
}

#[tokio::test]
async fn test_unregistered_enum_argument_names_the_call() {
    let sim = AttachedEngine::start().await;
    let plan_it = sim.planit();
    plan_it
        .set_output_formatter(OutputFormatter::Memory)
        .await
        .unwrap();
    let memory = plan_it.memory().await.unwrap();
    let before = sim.engine.requests().len();

    let rogue = EnumRef {
        remote_class: OUTPUT_TYPE,
        constant: "SOMETHING_ELSE",
    };
    let err = memory
        .proxy()
        .call(
            "get_position_of_output_value_property",
            vec![Arg::Enum(rogue), Arg::from(OutputProperty::Flow)],
        )
        .await
        .unwrap_err();

    match &err {
        PlanitError::Mapping { kind, name } => {
            assert_eq!(*kind, MappingKind::EnumValue);
            assert!(name.contains("SOMETHING_ELSE"));
            assert!(name.contains("getPositionOfOutputValueProperty"));
        }
        other => panic!("Expected mapping error, got: {:?}", other),
    }
    assert_eq!(sim.engine.requests().len(), before);
}

#[tokio::test]
async fn test_attach_to_nothing_is_startup_failure() {
    let sim = AttachedEngine::start().await;
    let addr = sim.server.addr();
    drop(sim);
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    let supervisor = Arc::new(
        EngineSupervisor::attach(addr).with_connect_timeout(std::time::Duration::from_millis(500)),
    );
    let plan_it = Planit::new(supervisor, "/projects/route_choice");

    let err = plan_it.network().get_modes().await.unwrap_err();
    assert!(err.is_startup_failure());
    assert_eq!(plan_it.project().state(), ProxyState::Unbound);
}

//! Converter pipeline wrappers: factory, converters, readers and writers.

use crate::enums::{ConverterType, NetworkReaderType, NetworkWriterType};
use crate::proxy::Proxy;
use crate::remote_wrapper;
use std::path::Path;

remote_wrapper! {
    pub struct ConverterFactory = "org.planit.converter.ConverterFactory" {
        /// Returns the converter matching `converter_type`.
        fn create(converter_type: ConverterType) -> Proxy;
    }
}

remote_wrapper! {
    pub struct NetworkConverter = "org.planit.converter.network.NetworkConverter" {
        fn create_reader(reader_type: NetworkReaderType, country: &str) -> Proxy;
        fn create_writer(writer_type: NetworkWriterType) -> Proxy;
        fn convert(reader: &Proxy, writer: &Proxy) -> ();
    }
}

remote_wrapper! {
    pub struct ZoningConverter = "org.planit.converter.zoning.ZoningConverter" {
        fn convert(reader: &Proxy, writer: &Proxy) -> ();
    }
}

remote_wrapper! {
    pub struct IntermodalConverter = "org.planit.converter.intermodal.IntermodalConverter" {
        fn convert(reader: &Proxy, writer: &Proxy) -> ();
    }
}

remote_wrapper! {
    pub struct OsmNetworkReader = "org.planit.osm.converter.network.OsmNetworkReader" {
        fn get_settings() -> OsmNetworkReaderSettings;
    }
}

remote_wrapper! {
    pub struct OsmNetworkReaderSettings = "org.planit.osm.converter.network.OsmNetworkReaderSettings" {
        fn set_input_file(input_file: &Path) -> ();
        fn set_country_name(country_name: &str) -> ();
    }
}

remote_wrapper! {
    pub struct PlanitNetworkReader = "org.planit.io.converter.network.PlanitNetworkReader" {
        fn get_settings() -> PlanitNetworkReaderSettings;
    }
}

remote_wrapper! {
    pub struct PlanitNetworkReaderSettings = "org.planit.io.converter.network.PlanitNetworkReaderSettings" {
        fn set_input_directory(input_directory: &Path) -> ();
        fn set_country_name(country_name: &str) -> ();
    }
}

remote_wrapper! {
    pub struct MatsimNetworkWriter = "org.planit.matsim.converter.MatsimNetworkWriter" {
        fn get_settings() -> MatsimNetworkWriterSettings;
    }
}

remote_wrapper! {
    pub struct MatsimNetworkWriterSettings = "org.planit.matsim.converter.MatsimNetworkWriterSettings" {
        fn set_output_directory(output_directory: &Path) -> ();
        fn set_country(country: &str) -> ();
    }
}

remote_wrapper! {
    pub struct PlanitNetworkWriter = "org.planit.io.converter.network.PlanitNetworkWriter" {
        fn get_settings() -> PlanitNetworkWriterSettings;
    }
}

remote_wrapper! {
    pub struct PlanitNetworkWriterSettings = "org.planit.io.converter.network.PlanitNetworkWriterSettings" {
        fn set_output_directory(output_directory: &Path) -> ();
        fn set_country(country: &str) -> ();
    }
}

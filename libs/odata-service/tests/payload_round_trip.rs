#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Entries written in each response format read back to the same property values

use odata_model::testing::{northwind_config, northwind_entities, northwind_model, northwind_wrapper};
use odata_model::{EntityInstance, MetadataProviderWrapper, PropertyValue, ProtocolVersion};
use odata_service::format::{ATOM, JSON};
use odata_service::object_model::{ODataPayload, ObjectModelSerializer};
use odata_service::reader::EntryReader;
use odata_service::writer::{WriteContext, write_payload};
use odata_service::{JsonMetadata, ResponseFormat};

const ROOT: &str = "http://localhost/svc/";

fn write_then_read(
    wrapper: &MetadataProviderWrapper,
    set_name: &str,
    entity: &EntityInstance,
    format: ResponseFormat,
    version: ProtocolVersion,
) -> EntityInstance {
    let set = wrapper.resolve_resource_set(set_name).unwrap();
    let entry = ObjectModelSerializer::new(wrapper, ROOT).entry(entity, &set, None).unwrap();
    let body = write_payload(&ODataPayload::Entry(entry), format, &WriteContext::new(ROOT, version)).unwrap();
    let content_type = if format.is_json() { JSON } else { ATOM };
    let ty = wrapper.resource_type(entity.type_id()).unwrap();
    EntryReader::new(wrapper).read(&body, Some(content_type), ty).unwrap()
}

fn assert_reproduces(original: &EntityInstance, read: &EntityInstance, label: &str) {
    for (name, value) in original.properties() {
        match value {
            PropertyValue::Reference(_) | PropertyValue::Collection(_) => {}
            PropertyValue::Complex(Some(complex)) => {
                let Some(PropertyValue::Complex(Some(read_complex))) = read.get(name) else {
                    panic!("{label}: {name} did not come back as a complex value");
                };
                for (inner, inner_value) in complex.properties() {
                    assert_eq!(read_complex.get(inner), Some(inner_value), "{label}: {name}/{inner}");
                }
            }
            other => assert_eq!(read.get(name), Some(other), "{label}: {name}"),
        }
    }
}

#[test]
fn every_writer_round_trips_orders_and_customers() {
    let wrapper = northwind_wrapper(northwind_config());
    let rows = northwind_entities(&northwind_model());
    let cases = [
        ("atom", ResponseFormat::Atom, ProtocolVersion::V2),
        ("json v1", ResponseFormat::JsonVerbose, ProtocolVersion::V1),
        ("json v2", ResponseFormat::JsonVerbose, ProtocolVersion::V2),
        ("json light", ResponseFormat::JsonLight(JsonMetadata::None), ProtocolVersion::V3),
    ];
    for set in ["Orders", "Customers", "Products"] {
        for entity in &rows[set] {
            for (label, format, version) in cases {
                let read = write_then_read(&wrapper, set, entity, format, version);
                assert_reproduces(entity, &read, &format!("{label} {set}"));
            }
        }
    }
}

#[test]
fn bags_and_named_streams_round_trip_at_version_three() {
    let wrapper = northwind_wrapper(northwind_config());
    let rows = northwind_entities(&northwind_model());
    let employee = &rows["Employees"][0];
    for format in [
        ResponseFormat::Atom,
        ResponseFormat::JsonVerbose,
        ResponseFormat::JsonLight(JsonMetadata::Full),
    ] {
        let read = write_then_read(&wrapper, "Employees", employee, format, ProtocolVersion::V3);
        assert_eq!(read.get("Emails"), employee.get("Emails"), "{format}");
        assert_reproduces(employee, &read, &format!("{format} Employees"));
    }
}

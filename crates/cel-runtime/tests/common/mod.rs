//! Shared test schema: a small proto3 message exercising every field
//! shape the bridge supports.

use prost::Message;
use prost_reflect::prost_types::field_descriptor_proto::{Label, Type as FieldType};
use prost_reflect::prost_types::{
    DescriptorProto, EnumDescriptorProto, EnumValueDescriptorProto, FieldDescriptorProto,
    FileDescriptorProto, FileDescriptorSet, MessageOptions,
};

use cel_runtime::{MemoryManager, ProtoTypeReflector, ProtoTypeRegistry, ValueFactory};

fn scalar_field(name: &str, number: i32, ty: FieldType) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(ty as i32),
        ..Default::default()
    }
}

fn message_field(name: &str, number: i32, type_name: &str) -> FieldDescriptorProto {
    FieldDescriptorProto {
        name: Some(name.to_string()),
        number: Some(number),
        label: Some(Label::Optional as i32),
        r#type: Some(FieldType::Message as i32),
        type_name: Some(type_name.to_string()),
        ..Default::default()
    }
}

fn repeated(mut field: FieldDescriptorProto) -> FieldDescriptorProto {
    field.label = Some(Label::Repeated as i32);
    field
}

/// Serialized `FileDescriptorSet` for the `cel.test` package.
pub fn test_descriptor_set() -> Vec<u8> {
    let map_entry = DescriptorProto {
        name: Some("ScoresEntry".to_string()),
        field: vec![
            scalar_field("key", 1, FieldType::String),
            scalar_field("value", 2, FieldType::Int64),
        ],
        options: Some(MessageOptions {
            map_entry: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    };

    let nested = DescriptorProto {
        name: Some("Nested".to_string()),
        field: vec![scalar_field("name", 1, FieldType::String)],
        ..Default::default()
    };

    let test_message = DescriptorProto {
        name: Some("TestMessage".to_string()),
        field: vec![
            scalar_field("single_int32", 1, FieldType::Int32),
            scalar_field("single_int64", 2, FieldType::Int64),
            scalar_field("single_uint64", 3, FieldType::Uint64),
            scalar_field("single_double", 4, FieldType::Double),
            scalar_field("single_bool", 5, FieldType::Bool),
            scalar_field("single_string", 6, FieldType::String),
            scalar_field("single_bytes", 7, FieldType::Bytes),
            message_field("wrapped_int32", 8, ".google.protobuf.Int32Value"),
            message_field("start_time", 9, ".google.protobuf.Timestamp"),
            message_field("ttl", 10, ".google.protobuf.Duration"),
            repeated(scalar_field("repeated_int64", 11, FieldType::Int64)),
            repeated(message_field("scores", 12, ".cel.test.TestMessage.ScoresEntry")),
            {
                let mut field = scalar_field("color", 13, FieldType::Enum);
                field.type_name = Some(".cel.test.Color".to_string());
                field
            },
            message_field("nested", 14, ".cel.test.Nested"),
            repeated(message_field(
                "repeated_wrapped",
                15,
                ".google.protobuf.Int64Value",
            )),
        ],
        nested_type: vec![map_entry],
        ..Default::default()
    };

    let color = EnumDescriptorProto {
        name: Some("Color".to_string()),
        value: vec![
            EnumValueDescriptorProto {
                name: Some("COLOR_UNSPECIFIED".to_string()),
                number: Some(0),
                ..Default::default()
            },
            EnumValueDescriptorProto {
                name: Some("RED".to_string()),
                number: Some(1),
                ..Default::default()
            },
            EnumValueDescriptorProto {
                name: Some("GREEN".to_string()),
                number: Some(2),
                ..Default::default()
            },
        ],
        ..Default::default()
    };

    let file = FileDescriptorProto {
        name: Some("cel/test/test.proto".to_string()),
        package: Some("cel.test".to_string()),
        dependency: vec![
            "google/protobuf/wrappers.proto".to_string(),
            "google/protobuf/timestamp.proto".to_string(),
            "google/protobuf/duration.proto".to_string(),
        ],
        message_type: vec![test_message, nested],
        enum_type: vec![color],
        syntax: Some("proto3".to_string()),
        ..Default::default()
    };

    FileDescriptorSet { file: vec![file] }.encode_to_vec()
}

/// A registry preloaded with the test schema.
pub fn test_registry() -> ProtoTypeRegistry {
    let mut registry = ProtoTypeRegistry::new();
    registry
        .add_file_descriptor_set(&test_descriptor_set())
        .expect("test schema must load");
    registry
}

/// A reflector over the test schema.
pub fn test_reflector() -> ProtoTypeReflector {
    ProtoTypeReflector::from_registry(test_registry())
}

/// A reference-counting value factory for builder handout.
pub fn test_factory() -> ValueFactory {
    ValueFactory::new(MemoryManager::reference_counting())
}

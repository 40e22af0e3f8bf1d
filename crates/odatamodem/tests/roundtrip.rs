//! Write-then-read round trips over materialized payloads.

use odatamodem::{
    PayloadItem, PayloadReader, PayloadWriter, PrimitiveKind, PropertyDeclaration, ReaderOptions,
    ScalarValue, TypeSchema, Value, WriterOptions,
};
use quickcheck_macros::quickcheck;

fn read_properties(payload: &str, schema: &TypeSchema) -> Vec<(String, Value)> {
    let mut reader = PayloadReader::new(payload, schema, ReaderOptions::default());
    let mut properties = Vec::new();
    while reader.advance().unwrap() {
        if let Some(PayloadItem::Property { name, value }) = reader.item() {
            properties.push((name.clone(), value.clone()));
        }
    }
    properties
}

#[test]
fn written_properties_read_back_in_order() {
    let schema = TypeSchema::new();
    let written: Vec<(String, Value)> = vec![
        ("id".to_string(), "1".into()),
        ("age".to_string(), 37.into()),
        ("ok".to_string(), true.into()),
        ("score".to_string(), 1.5.into()),
        ("gone".to_string(), Value::null()),
        (
            "tags".to_string(),
            Value::Collection(vec!["a".into(), Value::null()]),
        ),
    ];

    let mut writer = PayloadWriter::new(&schema, WriterOptions::default());
    writer
        .write_start(PayloadItem::ResourceStart { type_name: None })
        .unwrap();
    for (name, value) in &written {
        writer.write_property(name, value.clone()).unwrap();
    }
    writer.write_end().unwrap();
    let payload = writer.finish().unwrap();

    assert_eq!(read_properties(&payload, &schema), written);
}

#[test]
fn announced_and_atomic_properties_round_trip_identically() {
    let schema = TypeSchema::new();
    let mut writer = PayloadWriter::new(&schema, WriterOptions::default());
    writer
        .write_start(PayloadItem::ResourceStart { type_name: None })
        .unwrap();
    writer.write_property("id", "1".into()).unwrap();
    writer
        .write_start(PayloadItem::PropertyInfoStart {
            name: "age".to_string(),
            declared_primitive_kind: None,
            content_type: None,
            annotations: Vec::new(),
        })
        .unwrap();
    writer.write_primitive(Some(37.into())).unwrap();
    writer.write_end().unwrap();
    writer.write_end().unwrap();
    let payload = writer.finish().unwrap();
    assert_eq!(payload, r#"{"id":"1","age":37}"#);

    assert_eq!(
        read_properties(&payload, &schema),
        vec![
            ("id".to_string(), "1".into()),
            ("age".to_string(), 37.into()),
        ]
    );
}

#[test]
fn typed_resource_round_trips_its_type_name() {
    let schema = TypeSchema::new();
    let mut writer = PayloadWriter::new(&schema, WriterOptions::default());
    writer
        .write_start(PayloadItem::ResourceStart {
            type_name: Some("Model.Note".to_string()),
        })
        .unwrap();
    writer.write_property("id", "1".into()).unwrap();
    writer.write_end().unwrap();
    let payload = writer.finish().unwrap();

    let mut reader = PayloadReader::new(&payload, &schema, ReaderOptions::default());
    assert!(reader.advance().unwrap());
    assert_eq!(
        reader.item(),
        Some(&PayloadItem::ResourceStart {
            type_name: Some("Model.Note".to_string())
        })
    );
}

#[test]
fn binary_and_datetime_values_round_trip() {
    let mut schema = TypeSchema::new();
    schema.declare("blob", PropertyDeclaration::primitive(PrimitiveKind::Binary));
    schema.declare(
        "when",
        PropertyDeclaration::primitive(PrimitiveKind::DateTimeOffset),
    );
    let when = time::macros::datetime!(2024-05-01 12:30:00 UTC);
    let written: Vec<(String, Value)> = vec![
        ("blob".to_string(), ScalarValue::Binary(vec![0, 255, 7]).into()),
        ("when".to_string(), ScalarValue::DateTimeOffset(when).into()),
    ];

    let mut writer = PayloadWriter::new(&schema, WriterOptions::default());
    writer
        .write_start(PayloadItem::ResourceStart { type_name: None })
        .unwrap();
    for (name, value) in &written {
        writer.write_property(name, value.clone()).unwrap();
    }
    writer.write_end().unwrap();
    let payload = writer.finish().unwrap();

    assert_eq!(read_properties(&payload, &schema), written);
}

#[quickcheck]
fn scalar_payloads_round_trip(seeds: Vec<(String, i64)>) -> bool {
    let mut schema = TypeSchema::new();
    let mut written: Vec<(String, Value)> = Vec::new();
    for (index, (text, number)) in seeds.iter().take(24).enumerate() {
        let name = format!("p{index}");
        let value = match number.rem_euclid(3) {
            0 => Value::from(text.clone()),
            1 => {
                schema.declare(&name, PropertyDeclaration::primitive(PrimitiveKind::Int64));
                Value::from(ScalarValue::Int64(*number))
            }
            _ => Value::from(*number > 0),
        };
        written.push((name, value));
    }

    let mut writer = PayloadWriter::new(&schema, WriterOptions::default());
    writer
        .write_start(PayloadItem::ResourceStart { type_name: None })
        .unwrap();
    for (name, value) in &written {
        writer.write_property(name, value.clone()).unwrap();
    }
    writer.write_end().unwrap();
    let payload = writer.finish().unwrap();

    read_properties(&payload, &schema) == written
}

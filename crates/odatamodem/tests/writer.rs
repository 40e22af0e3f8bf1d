//! Writer state machine behavior and exact serialized output.

use odatamodem::{
    PayloadItem, PayloadWriter, PrimitiveKind, PropertyDeclaration, ScalarValue, TypeSchema, Value,
    WriterError, WriterOptions, WriterState,
};

fn property_info(name: &str) -> PayloadItem {
    PayloadItem::PropertyInfoStart {
        name: name.to_string(),
        declared_primitive_kind: None,
        content_type: None,
        annotations: Vec::new(),
    }
}

#[test]
fn announced_property_serializes_in_write_order() {
    let mut writer = PayloadWriter::new((), WriterOptions::default());
    writer
        .write_start(PayloadItem::ResourceStart { type_name: None })
        .unwrap();
    writer.write_property("id", "1".into()).unwrap();
    writer.write_start(property_info("age")).unwrap();
    writer.write_primitive(Some(37.into())).unwrap();
    writer.write_end().unwrap();
    writer.write_end().unwrap();
    assert_eq!(writer.finish().unwrap(), r#"{"id":"1","age":37}"#);
}

#[test]
fn nested_resources_and_sets_serialize() {
    let mut writer = PayloadWriter::new((), WriterOptions::default());
    writer
        .write_start(PayloadItem::ResourceStart { type_name: None })
        .unwrap();
    writer.write_property("id", "1".into()).unwrap();
    writer
        .write_start(PayloadItem::NestedResourceInfoStart {
            name: "addr".to_string(),
            is_collection: false,
        })
        .unwrap();
    writer
        .write_start(PayloadItem::ResourceStart { type_name: None })
        .unwrap();
    writer.write_property("city", "Oslo".into()).unwrap();
    writer.write_end().unwrap();
    writer.write_end().unwrap();
    writer
        .write_start(PayloadItem::NestedResourceInfoStart {
            name: "rows".to_string(),
            is_collection: true,
        })
        .unwrap();
    writer
        .write_start(PayloadItem::ResourceSetStart { type_name: None })
        .unwrap();
    writer
        .write_start(PayloadItem::ResourceStart { type_name: None })
        .unwrap();
    writer.write_property("n", 1.into()).unwrap();
    writer.write_end().unwrap();
    writer.write_end().unwrap();
    writer.write_end().unwrap();
    writer.write_end().unwrap();
    assert_eq!(
        writer.finish().unwrap(),
        r#"{"id":"1","addr":{"city":"Oslo"},"rows":[{"n":1}]}"#
    );
}

#[test]
fn resource_set_root_serializes_elements_in_order() {
    let mut writer = PayloadWriter::new((), WriterOptions::default());
    writer
        .write_start(PayloadItem::ResourceSetStart { type_name: None })
        .unwrap();
    for n in [1, 2] {
        writer
            .write_start(PayloadItem::ResourceStart { type_name: None })
            .unwrap();
        writer.write_property("n", n.into()).unwrap();
        writer.write_end().unwrap();
    }
    writer.write_end().unwrap();
    assert_eq!(writer.finish().unwrap(), r#"[{"n":1},{"n":2}]"#);
}

#[test]
fn materialized_collection_property() {
    let mut writer = PayloadWriter::new((), WriterOptions::default());
    writer
        .write_start(PayloadItem::ResourceStart { type_name: None })
        .unwrap();
    writer
        .write_property(
            "tags",
            Value::Collection(vec!["a".into(), Value::null(), "b".into()]),
        )
        .unwrap();
    writer.write_end().unwrap();
    assert_eq!(writer.finish().unwrap(), r#"{"tags":["a",null,"b"]}"#);
}

#[test]
fn collection_link_elements_write_one_by_one() {
    let mut writer = PayloadWriter::new((), WriterOptions::default());
    writer
        .write_start(PayloadItem::ResourceStart { type_name: None })
        .unwrap();
    writer
        .write_start(PayloadItem::NestedResourceInfoStart {
            name: "comments".to_string(),
            is_collection: true,
        })
        .unwrap();
    writer.write_primitive(Some("one".into())).unwrap();
    writer.write_primitive(None).unwrap();
    writer.write_primitive(Some("two".into())).unwrap();
    writer.write_end().unwrap();
    writer.write_end().unwrap();
    assert_eq!(
        writer.finish().unwrap(),
        r#"{"comments":["one",null,"two"]}"#
    );
}

#[test]
fn duplicate_names_are_rejected_across_forms() {
    let mut writer = PayloadWriter::new((), WriterOptions::default());
    writer
        .write_start(PayloadItem::ResourceStart { type_name: None })
        .unwrap();
    writer.write_property("a", 1.into()).unwrap();
    let err = writer.write_start(property_info("a")).unwrap_err();
    assert_eq!(
        err,
        WriterError::DuplicateProperty {
            name: "a".to_string()
        }
    );
    assert_eq!(writer.state(), WriterState::Exception);
}

#[test]
fn duplicate_write_property_is_rejected() {
    let mut writer = PayloadWriter::new((), WriterOptions::default());
    writer
        .write_start(PayloadItem::ResourceStart { type_name: None })
        .unwrap();
    writer.write_property("a", 1.into()).unwrap();
    assert!(matches!(
        writer.write_property("a", 2.into()),
        Err(WriterError::DuplicateProperty { .. })
    ));
}

#[test]
fn second_value_for_an_open_property_is_rejected() {
    let mut writer = PayloadWriter::new((), WriterOptions::default());
    writer
        .write_start(PayloadItem::ResourceStart { type_name: None })
        .unwrap();
    writer.write_start(property_info("age")).unwrap();
    writer.write_primitive(Some(37.into())).unwrap();
    let err = writer.write_primitive(Some(38.into())).unwrap_err();
    assert_eq!(
        err,
        WriterError::ValueAlreadyWritten {
            name: "age".to_string()
        }
    );
}

#[test]
fn announced_property_must_resolve_before_end() {
    let mut writer = PayloadWriter::new((), WriterOptions::default());
    writer
        .write_start(PayloadItem::ResourceStart { type_name: None })
        .unwrap();
    writer.write_start(property_info("age")).unwrap();
    assert!(matches!(
        writer.write_end(),
        Err(WriterError::InvalidState { .. })
    ));
}

#[test]
fn writes_after_completion_fail_but_finish_survives() {
    let mut writer = PayloadWriter::new((), WriterOptions::default());
    writer
        .write_start(PayloadItem::ResourceStart { type_name: None })
        .unwrap();
    writer.write_end().unwrap();
    assert_eq!(writer.state(), WriterState::Completed);
    assert!(matches!(
        writer.write_property("late", 1.into()),
        Err(WriterError::InvalidState { .. })
    ));
    assert_eq!(writer.finish().unwrap(), "{}");
}

#[test]
fn declared_kind_governs_written_values() {
    let mut schema = TypeSchema::new();
    schema.declare("age", PropertyDeclaration::primitive(PrimitiveKind::Int32));
    let mut writer = PayloadWriter::new(&schema, WriterOptions::default());
    writer
        .write_start(PayloadItem::ResourceStart { type_name: None })
        .unwrap();
    let err = writer
        .write_property("age", ScalarValue::Int64(5_000_000_000).into())
        .unwrap_err();
    assert_eq!(
        err,
        WriterError::SchemaMismatch {
            name: "age".to_string(),
            declared: PrimitiveKind::Int32,
            actual: PrimitiveKind::Int64,
        }
    );
}

#[test]
fn annotations_precede_their_property() {
    let mut writer = PayloadWriter::new((), WriterOptions::default());
    writer
        .write_start(PayloadItem::ResourceStart { type_name: None })
        .unwrap();
    writer
        .write_start(PayloadItem::PropertyInfoStart {
            name: "note".to_string(),
            declared_primitive_kind: Some(PrimitiveKind::String),
            content_type: Some("text/plain".to_string()),
            annotations: Vec::new(),
        })
        .unwrap();
    writer.write_primitive(Some("hi".into())).unwrap();
    writer.write_end().unwrap();
    writer.write_end().unwrap();
    assert_eq!(
        writer.finish().unwrap(),
        r#"{"note@odata.mediaContentType":"text/plain","note":"hi"}"#
    );
}

#[test]
fn response_only_annotations_are_rejected_in_requests() {
    let mut writer = PayloadWriter::new((), WriterOptions::default().request());
    writer
        .write_start(PayloadItem::ResourceStart { type_name: None })
        .unwrap();
    let err = writer
        .write_start(PayloadItem::PropertyInfoStart {
            name: "items".to_string(),
            declared_primitive_kind: None,
            content_type: None,
            annotations: vec![odatamodem::PropertyAnnotation {
                term: "odata.count".to_string(),
                value: Some(5.into()),
            }],
        })
        .unwrap_err();
    assert!(matches!(err, WriterError::InvalidState { .. }));
}

#[test]
fn write_start_rejects_value_items() {
    let mut writer = PayloadWriter::new((), WriterOptions::default());
    assert!(matches!(
        writer.write_start(PayloadItem::Primitive { value: None }),
        Err(WriterError::InvalidState { .. })
    ));
}

#[test]
fn resource_needs_an_open_scope_for_properties() {
    let mut writer = PayloadWriter::new((), WriterOptions::default());
    assert!(matches!(
        writer.write_property("a", 1.into()),
        Err(WriterError::InvalidState { .. })
    ));
}

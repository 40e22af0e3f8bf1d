//! The asynchronous calling convention and sync/async exclusivity.

use odatamodem::{
    PayloadItem, PayloadReader, PayloadWriter, ReaderError, ReaderOptions, ReaderState,
    WriterError, WriterOptions,
};

#[tokio::test]
async fn async_reader_walks_the_payload() {
    let options = ReaderOptions::default().asynchronous();
    let mut reader = PayloadReader::new(r#"{"id":"1","age":37}"#, (), options);
    let mut names = Vec::new();
    while reader.advance_async().await.unwrap() {
        if let Some(PayloadItem::Property { name, .. }) = reader.item() {
            names.push(name.clone());
        }
    }
    assert_eq!(names, ["id", "age"]);
    assert_eq!(reader.state(), ReaderState::Completed);
}

#[tokio::test]
async fn async_writer_produces_the_same_wire_form() {
    let options = WriterOptions::default().asynchronous();
    let mut writer = PayloadWriter::new((), options);
    writer
        .write_start_async(PayloadItem::ResourceStart { type_name: None })
        .await
        .unwrap();
    writer.write_property_async("id", "1".into()).await.unwrap();
    writer
        .write_start_async(PayloadItem::PropertyInfoStart {
            name: "age".to_string(),
            declared_primitive_kind: None,
            content_type: None,
            annotations: Vec::new(),
        })
        .await
        .unwrap();
    writer.write_primitive_async(Some(37.into())).await.unwrap();
    writer.write_end_async().await.unwrap();
    writer.write_end_async().await.unwrap();
    assert_eq!(writer.finish().unwrap(), r#"{"id":"1","age":37}"#);
}

#[test]
fn sync_calls_on_an_async_reader_are_rejected() {
    let options = ReaderOptions::default().asynchronous();
    let mut reader = PayloadReader::new("{}", (), options);
    let err = reader.advance().unwrap_err();
    assert!(matches!(err, ReaderError::SyncAsyncMismatch { .. }));
    assert_eq!(reader.state(), ReaderState::Exception);
}

#[tokio::test]
async fn async_calls_on_a_sync_reader_are_rejected() {
    let mut reader = PayloadReader::new("{}", (), ReaderOptions::default());
    let err = reader.advance_async().await.unwrap_err();
    assert!(matches!(err, ReaderError::SyncAsyncMismatch { .. }));
}

#[tokio::test]
async fn async_calls_on_a_sync_writer_are_rejected() {
    let mut writer = PayloadWriter::new((), WriterOptions::default());
    let err = writer
        .write_start_async(PayloadItem::ResourceStart { type_name: None })
        .await
        .unwrap_err();
    assert!(matches!(err, WriterError::SyncAsyncMismatch { .. }));
}

#[test]
fn a_mode_mismatch_is_terminal() {
    let options = ReaderOptions::default().asynchronous();
    let mut reader = PayloadReader::new("{}", (), options);
    assert!(reader.advance().is_err());
    // The violation poisons the instance for both conventions.
    assert!(matches!(
        futures_poll_once(reader.advance_async()),
        Err(ReaderError::InvalidState { .. })
    ));
}

/// Drives a ready-at-construction future to completion without a runtime.
fn futures_poll_once<F: std::future::Future>(future: F) -> F::Output {
    use std::pin::pin;
    use std::task::{Context, Poll, Waker};

    let mut future = pin!(future);
    let mut context = Context::from_waker(Waker::noop());
    match future.as_mut().poll(&mut context) {
        Poll::Ready(output) => output,
        Poll::Pending => unreachable!("the state machine never suspends"),
    }
}

//! A streaming reader and writer for OData JSON resource payloads.
//!
//! `odatamodem` walks structured resource payloads — entities, complex
//! values, collections, and raw property streams — through explicit
//! pull/push state machines instead of materializing whole documents. The
//! reader exposes one [`PayloadItem`] per [`advance`] call; the writer
//! mirrors the same grammar through `write_*` calls. Either side can
//! redirect a single property's value (or a single collection element) to a
//! scoped byte or text channel, which must be fully drained or closed before
//! the parent machine moves again.
//!
//! [`advance`]: PayloadReader::advance
//!
//! # Reading
//!
//! ```
//! use odatamodem::{
//!     PayloadItem, PayloadReader, PrimitiveKind, PropertyDeclaration, ReaderOptions, TypeSchema,
//! };
//!
//! let mut schema = TypeSchema::new();
//! schema.declare("id", PropertyDeclaration::key(PrimitiveKind::String));
//! schema.declare("comments", PropertyDeclaration::collection_of(PrimitiveKind::String));
//!
//! let payload = r#"{"id":"1","comments":["one","two",null]}"#;
//! let options = ReaderOptions::default().stream_when(|candidate| candidate.is_collection);
//! let mut reader = PayloadReader::new(payload, &schema, options);
//!
//! let mut streamed = Vec::new();
//! while reader.advance()? {
//!     if let Some(PayloadItem::Stream { .. }) = reader.item() {
//!         streamed.push(reader.create_text_reader()?.read_to_string()?);
//!     }
//! }
//! assert_eq!(streamed, ["one", "two"]);
//! # Ok::<(), odatamodem::ReaderError>(())
//! ```
//!
//! # Writing
//!
//! ```
//! use odatamodem::{PayloadItem, PayloadWriter, WriterOptions};
//!
//! let mut writer = PayloadWriter::new((), WriterOptions::default());
//! writer.write_start(PayloadItem::ResourceStart { type_name: None })?;
//! writer.write_property("id", "1".into())?;
//! writer.write_start(PayloadItem::PropertyInfoStart {
//!     name: "age".to_string(),
//!     declared_primitive_kind: None,
//!     content_type: None,
//!     annotations: Vec::new(),
//! })?;
//! writer.write_primitive(Some(37.into()))?;
//! writer.write_end()?;
//! writer.write_end()?;
//! assert_eq!(writer.finish()?, r#"{"id":"1","age":37}"#);
//! # Ok::<(), odatamodem::WriterError>(())
//! ```

mod error;
mod item;
mod lexer;
mod options;
mod reader;
mod schema;
mod scope;
mod value;
mod writer;

pub use error::{ReaderError, SyntaxError, WriterError};
pub use item::{PayloadItem, PropertyAnnotation};
pub use options::{
    CallMode, MessageKind, ReaderOptions, StreamCandidate, StreamPredicate, WriterOptions,
};
pub use reader::{BinaryValueReader, PayloadReader, ReaderState, TextValueReader};
pub use schema::{PropertyDeclaration, SchemaOracle, TypeSchema};
pub use value::{PrimitiveKind, ScalarValue, Value};
pub use writer::{BinaryValueWriter, PayloadWriter, TextValueWriter, WriterState};

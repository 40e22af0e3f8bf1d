//! Configuration for payload readers and writers.

use core::fmt;

use crate::schema::PropertyDeclaration;
use crate::value::PrimitiveKind;

/// Whether a payload belongs to a request or a response message.
///
/// Some control information (`odata.count`, `odata.nextLink`) is only
/// applicable to responses; reading or writing it in a request payload is an
/// error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MessageKind {
    /// A response payload.
    #[default]
    Response,
    /// A request payload.
    Request,
}

impl MessageKind {
    /// Returns `true` for [`MessageKind::Request`].
    #[must_use]
    pub fn is_request(self) -> bool {
        matches!(self, Self::Request)
    }
}

/// The calling convention an instance is fixed to at construction.
///
/// A synchronous instance rejects the `*_async` entry points and vice versa;
/// the mismatch is reported, never silently adapted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallMode {
    /// Blocking entry points (`advance`, `write_start`, …).
    #[default]
    Sync,
    /// Task-based entry points (`advance_async`, `write_start_async`, …).
    Async,
}

/// The facts offered to the streaming predicate for one property.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamCandidate<'a> {
    /// The schema-declared primitive kind (element kind for collections),
    /// if any.
    pub declared_kind: Option<PrimitiveKind>,
    /// Whether the property is a collection.
    pub is_collection: bool,
    /// The property name; empty for unnamed top-level set elements.
    pub property_name: &'a str,
    /// The full declaration, when the schema has one.
    pub declaration: Option<PropertyDeclaration>,
}

/// The reader-side streaming predicate.
///
/// Pure; may be consulted several times per property. Returning `true`
/// redirects the property's value (or each collection element) to a scoped
/// channel instead of materializing it.
pub type StreamPredicate = Box<dyn Fn(&StreamCandidate<'_>) -> bool>;

/// Configuration options for [`PayloadReader`](crate::PayloadReader).
///
/// # Examples
///
/// ```
/// use odatamodem::ReaderOptions;
///
/// let options = ReaderOptions::default()
///     .root_type("Model.Note")
///     .stream_when(|candidate| candidate.is_collection);
/// ```
///
/// # Default
///
/// Response message, synchronous calls, no root type, never stream.
#[derive(Default)]
pub struct ReaderOptions {
    /// The type name assumed for the payload root scope when the payload
    /// itself does not declare one. Drives schema lookups.
    ///
    /// # Default
    ///
    /// `None`
    pub root_type: Option<String>,

    /// Whether the payload belongs to a request or a response.
    ///
    /// # Default
    ///
    /// [`MessageKind::Response`]
    pub message_kind: MessageKind,

    /// The calling convention this reader accepts.
    ///
    /// # Default
    ///
    /// [`CallMode::Sync`]
    pub call_mode: CallMode,

    pub(crate) stream_predicate: Option<StreamPredicate>,
}

impl ReaderOptions {
    /// Sets the root resource type name.
    #[must_use]
    pub fn root_type(mut self, type_name: impl Into<String>) -> Self {
        self.root_type = Some(type_name.into());
        self
    }

    /// Marks the payload as belonging to a request message.
    #[must_use]
    pub fn request(mut self) -> Self {
        self.message_kind = MessageKind::Request;
        self
    }

    /// Fixes the reader to the asynchronous calling convention.
    #[must_use]
    pub fn asynchronous(mut self) -> Self {
        self.call_mode = CallMode::Async;
        self
    }

    /// Installs the streaming predicate consulted for each eligible
    /// property. Without one, nothing is ever streamed.
    #[must_use]
    pub fn stream_when<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&StreamCandidate<'_>) -> bool + 'static,
    {
        self.stream_predicate = Some(Box::new(predicate));
        self
    }
}

impl fmt::Debug for ReaderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReaderOptions")
            .field("root_type", &self.root_type)
            .field("message_kind", &self.message_kind)
            .field("call_mode", &self.call_mode)
            .field("stream_predicate", &self.stream_predicate.is_some())
            .finish()
    }
}

/// Configuration options for [`PayloadWriter`](crate::PayloadWriter).
///
/// # Default
///
/// Response message, synchronous calls, no root type.
#[derive(Debug, Clone, Default)]
pub struct WriterOptions {
    /// The type name assumed for the payload root scope; drives schema
    /// lookups for kind validation.
    ///
    /// # Default
    ///
    /// `None`
    pub root_type: Option<String>,

    /// Whether the payload belongs to a request or a response.
    ///
    /// # Default
    ///
    /// [`MessageKind::Response`]
    pub message_kind: MessageKind,

    /// The calling convention this writer accepts.
    ///
    /// # Default
    ///
    /// [`CallMode::Sync`]
    pub call_mode: CallMode,
}

impl WriterOptions {
    /// Sets the root resource type name.
    #[must_use]
    pub fn root_type(mut self, type_name: impl Into<String>) -> Self {
        self.root_type = Some(type_name.into());
        self
    }

    /// Marks the payload as belonging to a request message.
    #[must_use]
    pub fn request(mut self) -> Self {
        self.message_kind = MessageKind::Request;
        self
    }

    /// Fixes the writer to the asynchronous calling convention.
    #[must_use]
    pub fn asynchronous(mut self) -> Self {
        self.call_mode = CallMode::Async;
        self
    }
}

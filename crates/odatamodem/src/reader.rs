//! The pull-model payload reader.
//!
//! [`PayloadReader`] walks a resource payload one item per [`advance`] call,
//! exposing the current [`ReaderState`] and [`PayloadItem`] after each step.
//! Scalar properties materialize unless the caller's streaming predicate
//! redirects them to a scoped channel, in which case the channel must be
//! drained to its end before the cursor may move again.
//!
//! [`advance`]: PayloadReader::advance
//!
//! # Examples
//!
//! ```
//! use odatamodem::{PayloadItem, PayloadReader, ReaderOptions, Value};
//!
//! let mut reader = PayloadReader::new(r#"{"id":"1","age":37}"#, (), ReaderOptions::default());
//! let mut names = Vec::new();
//! while reader.advance()? {
//!     if let Some(PayloadItem::Property { name, .. }) = reader.item() {
//!         names.push(name.clone());
//!     }
//! }
//! assert_eq!(names, ["id", "age"]);
//! # Ok::<(), odatamodem::ReaderError>(())
//! ```

use std::io;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::trace;

use crate::error::{ReaderError, SyntaxError};
use crate::item::{PayloadItem, PropertyAnnotation, RESPONSE_ONLY_TERMS};
use crate::lexer::{Fragment, Lexer};
use crate::options::{CallMode, MessageKind, ReaderOptions, StreamCandidate, StreamPredicate};
use crate::schema::{PropertyDeclaration, SchemaOracle};
use crate::scope::{Scope, ScopeKind, ScopeStack};
use crate::value::{self, PrimitiveKind, ScalarValue, Value};

/// The reader's position after the most recent advance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Nothing has been read yet.
    Start,
    /// A resource scope was opened.
    ResourceStart,
    /// A resource scope was closed.
    ResourceEnd,
    /// A resource-set scope was opened.
    ResourceSetStart,
    /// A resource-set scope was closed.
    ResourceSetEnd,
    /// A nested-resource-info scope was opened.
    NestedResourceInfoStart,
    /// A nested-resource-info scope was closed.
    NestedResourceInfoEnd,
    /// A property was announced ahead of its value.
    PropertyInfoStart,
    /// An announced property's value was resolved.
    PropertyEnd,
    /// A materialized scalar item was read.
    Primitive,
    /// A streamed value is active and must be drained.
    Stream,
    /// A materialized property was read.
    Property,
    /// The payload root was fully consumed.
    Completed,
    /// A violation occurred; no further operation succeeds.
    Exception,
}

#[derive(Debug)]
enum StreamSource<'src> {
    /// The lexer is inside a quoted value; fragments come from it.
    Quoted,
    /// A raw number or boolean token, handed out in one piece.
    Raw(Option<&'src str>),
}

#[derive(Debug)]
struct ActiveStream<'src> {
    name: String,
    kind: PrimitiveKind,
    source: StreamSource<'src>,
    channel_created: bool,
    drained: bool,
}

enum Prelude {
    Close,
    Item,
}

/// A pull-model cursor over one payload.
///
/// Constructed over a borrowed payload string, a [`SchemaOracle`], and
/// [`ReaderOptions`]. Violations are terminal: after any error the reader is
/// in [`ReaderState::Exception`] and every call fails.
pub struct PayloadReader<'src, S> {
    lexer: Lexer<'src>,
    schema: S,
    root_type: Option<String>,
    message_kind: MessageKind,
    call_mode: CallMode,
    predicate: Option<StreamPredicate>,
    scopes: ScopeStack,
    state: ReaderState,
    item: Option<PayloadItem>,
    stream: Option<ActiveStream<'src>>,
    pending_annotations: Vec<(String, PropertyAnnotation)>,
    last_resource_count: Option<usize>,
}

impl<'src, S: SchemaOracle> PayloadReader<'src, S> {
    /// Creates a reader over `payload`.
    pub fn new(payload: &'src str, schema: S, options: ReaderOptions) -> Self {
        let ReaderOptions {
            root_type,
            message_kind,
            call_mode,
            stream_predicate,
        } = options;
        Self {
            lexer: Lexer::new(payload),
            schema,
            root_type,
            message_kind,
            call_mode,
            predicate: stream_predicate,
            scopes: ScopeStack::new(),
            state: ReaderState::Start,
            item: None,
            stream: None,
            pending_annotations: Vec::new(),
            last_resource_count: None,
        }
    }

    /// The state reached by the most recent advance.
    #[must_use]
    pub fn state(&self) -> ReaderState {
        self.state
    }

    /// The item produced by the most recent advance, if any.
    #[must_use]
    pub fn item(&self) -> Option<&PayloadItem> {
        self.item.as_ref()
    }

    /// The materialized-property count of the resource scope that just
    /// produced [`PayloadItem::ResourceEnd`].
    #[must_use]
    pub fn resource_property_count(&self) -> Option<usize> {
        self.last_resource_count
    }

    /// Advances the cursor by one item.
    ///
    /// Returns `false` once the payload root has been fully consumed.
    ///
    /// # Errors
    ///
    /// Any structural violation or malformed input; see [`ReaderError`].
    /// All errors leave the reader in [`ReaderState::Exception`].
    pub fn advance(&mut self) -> Result<bool, ReaderError> {
        self.ensure_mode(CallMode::Sync)?;
        self.advance_core()
    }

    /// Asynchronous counterpart of [`advance`](PayloadReader::advance),
    /// legal only on readers constructed with [`CallMode::Async`].
    ///
    /// # Errors
    ///
    /// As [`advance`](PayloadReader::advance), plus
    /// [`ReaderError::SyncAsyncMismatch`] on a synchronous-mode reader.
    pub async fn advance_async(&mut self) -> Result<bool, ReaderError> {
        self.ensure_mode(CallMode::Async)?;
        self.advance_core()
    }

    /// Opens the byte channel for the active [`PayloadItem::Stream`] item.
    ///
    /// # Errors
    ///
    /// [`ReaderError::InvalidState`] unless the reader sits on a `Stream`
    /// item of a binary-capable kind with no channel opened yet.
    pub fn create_read_stream(&mut self) -> Result<BinaryValueReader<'_, 'src, S>, ReaderError> {
        self.check_channel(false)?;
        Ok(BinaryValueReader {
            reader: self,
            encoded: String::new(),
            decoded: Vec::new(),
            offset: 0,
            at_end: false,
        })
    }

    /// Opens the text channel for the active [`PayloadItem::Stream`] item.
    ///
    /// # Errors
    ///
    /// [`ReaderError::InvalidState`] unless the reader sits on a `Stream`
    /// item of a text-capable kind with no channel opened yet.
    pub fn create_text_reader(&mut self) -> Result<TextValueReader<'_, 'src, S>, ReaderError> {
        self.check_channel(true)?;
        Ok(TextValueReader {
            reader: self,
            pending: Vec::new(),
            offset: 0,
        })
    }

    // ── state machine core ──────────────────────────────────────────────

    fn ensure_mode(&mut self, invoked: CallMode) -> Result<(), ReaderError> {
        if self.call_mode == invoked {
            Ok(())
        } else {
            let configured = self.call_mode;
            Err(self.fail(ReaderError::SyncAsyncMismatch { configured }))
        }
    }

    fn advance_core(&mut self) -> Result<bool, ReaderError> {
        match self.state {
            ReaderState::Exception => {
                return Err(ReaderError::invalid_state("reader is in the error state"));
            }
            ReaderState::Completed => return Ok(false),
            _ => {}
        }
        match self.step() {
            Ok(progress) => Ok(progress),
            Err(err) => {
                self.state = ReaderState::Exception;
                self.item = None;
                Err(err)
            }
        }
    }

    fn step(&mut self) -> Result<bool, ReaderError> {
        if let Some(active) = &self.stream {
            if !active.drained {
                return Err(ReaderError::OpenStream {
                    name: active.name.clone(),
                });
            }
            self.stream = None;
        }
        if self.state == ReaderState::Start {
            return self.open_root();
        }
        let Some(kind) = self.scopes.last().map(|s| s.kind) else {
            return self.close_payload();
        };
        match kind {
            ScopeKind::Resource => self.next_member(),
            ScopeKind::ResourceSet => self.next_set_element(),
            ScopeKind::NestedResourceInfo => self.next_nested(),
            ScopeKind::PropertyInfo => self.next_property_value(),
        }
    }

    fn emit(&mut self, item: PayloadItem, state: ReaderState) {
        trace!(?state, "reader item");
        self.item = Some(item);
        self.state = state;
    }

    fn fail(&mut self, err: ReaderError) -> ReaderError {
        self.state = ReaderState::Exception;
        self.item = None;
        err
    }

    fn wire(&self, source: SyntaxError) -> ReaderError {
        ReaderError::MalformedWire {
            source,
            line: self.lexer.line(),
            column: self.lexer.column(),
        }
    }

    fn mismatch(&self, name: &str, declared: PrimitiveKind, actual: PrimitiveKind) -> ReaderError {
        ReaderError::SchemaMismatch {
            name: name.to_string(),
            declared,
            actual,
        }
    }

    fn open_root(&mut self) -> Result<bool, ReaderError> {
        match self.lexer.peek_non_ws() {
            Some('{') => {
                let hint = self.root_type.clone();
                self.open_resource(hint)
            }
            Some('[') => {
                self.lexer.expect('[').map_err(|e| self.wire(e))?;
                let scope = Scope::resource_set(self.root_type.clone());
                self.scopes.push(scope);
                self.emit(
                    PayloadItem::ResourceSetStart { type_name: None },
                    ReaderState::ResourceSetStart,
                );
                Ok(true)
            }
            Some(_) => Err(self.wire(SyntaxError::Grammar(
                "payload root must be an object or array",
            ))),
            None => Err(self.wire(SyntaxError::UnexpectedEndOfInput)),
        }
    }

    fn close_payload(&mut self) -> Result<bool, ReaderError> {
        if self.lexer.at_end() {
            self.state = ReaderState::Completed;
            self.item = None;
            Ok(false)
        } else {
            Err(self.wire(SyntaxError::Grammar("unexpected data after the payload root")))
        }
    }

    /// Opens a resource scope, recognizing a leading type control member.
    fn open_resource(&mut self, type_hint: Option<String>) -> Result<bool, ReaderError> {
        self.lexer.expect('{').map_err(|e| self.wire(e))?;
        let mut scope = Scope::resource(type_hint);
        let mut declared = None;
        if self.lexer.peek_non_ws() == Some('"') {
            let key = self.lexer.read_string().map_err(|e| self.wire(e))?;
            if key == "@odata.type" {
                self.lexer.expect(':').map_err(|e| self.wire(e))?;
                if self.lexer.peek_non_ws() != Some('"') {
                    return Err(self.wire(SyntaxError::Grammar(
                        "type control information must be a string",
                    )));
                }
                let raw = self.lexer.read_string().map_err(|e| self.wire(e))?;
                let name = raw.strip_prefix('#').unwrap_or(&raw).to_string();
                scope.type_name = Some(name.clone());
                scope.needs_separator = true;
                declared = Some(name);
            } else {
                scope.lookahead_key = Some(key);
            }
        }
        self.scopes.push(scope);
        self.emit(
            PayloadItem::ResourceStart { type_name: declared },
            ReaderState::ResourceStart,
        );
        Ok(true)
    }

    /// Consumes the comma/close bookkeeping before the next member or
    /// element of the innermost scope.
    fn element_prelude(&mut self, close: char) -> Result<Prelude, ReaderError> {
        let needs_separator = self.scopes.last().is_some_and(|s| s.needs_separator);
        match self.lexer.peek_non_ws() {
            None => Err(self.wire(SyntaxError::UnexpectedEndOfInput)),
            Some(c) if c == close => {
                self.lexer.expect(close).map_err(|e| self.wire(e))?;
                Ok(Prelude::Close)
            }
            Some(',') if needs_separator => {
                self.lexer.expect(',').map_err(|e| self.wire(e))?;
                match self.lexer.peek_non_ws() {
                    Some(c) if c == close => Err(self.wire(SyntaxError::Grammar("trailing comma"))),
                    None => Err(self.wire(SyntaxError::UnexpectedEndOfInput)),
                    Some(_) => Ok(Prelude::Item),
                }
            }
            Some(',') => Err(self.wire(SyntaxError::Grammar("unexpected ','"))),
            Some(c) if needs_separator => Err(self.wire(SyntaxError::InvalidCharacter(c))),
            Some(_) => Ok(Prelude::Item),
        }
    }

    fn mark_member_consumed(&mut self) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.needs_separator = true;
        }
    }

    fn next_member(&mut self) -> Result<bool, ReaderError> {
        loop {
            let buffered = self.scopes.last_mut().and_then(|s| s.lookahead_key.take());
            let key = if let Some(key) = buffered {
                key
            } else {
                match self.element_prelude('}')? {
                    Prelude::Close => return self.close_resource(),
                    Prelude::Item => {
                        if self.lexer.peek_non_ws() != Some('"') {
                            let c = self.lexer.peek_non_ws().unwrap_or('\u{0}');
                            return Err(self.wire(SyntaxError::InvalidCharacter(c)));
                        }
                        self.lexer.read_string().map_err(|e| self.wire(e))?
                    }
                }
            };
            self.lexer.expect(':').map_err(|e| self.wire(e))?;
            if let Some(term) = key.strip_prefix('@') {
                // Resource-scope instance annotation; checked and skipped.
                let term = term.to_string();
                self.check_applicability(&term)?;
                self.parse_scalar(&key, None)?;
                self.mark_member_consumed();
                continue;
            }
            if let Some((name, term)) = split_property_annotation(&key) {
                self.check_applicability(&term)?;
                let annotation_value = self.parse_scalar(&key, None)?;
                self.pending_annotations.push((
                    name,
                    PropertyAnnotation {
                        term,
                        value: annotation_value,
                    },
                ));
                self.mark_member_consumed();
                continue;
            }
            return self.handle_property(key);
        }
    }

    fn close_resource(&mut self) -> Result<bool, ReaderError> {
        let Some(scope) = self.scopes.pop() else {
            return Err(ReaderError::invalid_state("no open resource scope"));
        };
        self.last_resource_count = Some(scope.materialized_count);
        if let Some(parent) = self.scopes.last_mut() {
            if parent.kind == ScopeKind::ResourceSet {
                parent.needs_separator = true;
            }
        }
        self.emit(PayloadItem::ResourceEnd, ReaderState::ResourceEnd);
        Ok(true)
    }

    fn check_applicability(&self, term: &str) -> Result<(), ReaderError> {
        if self.message_kind.is_request() && RESPONSE_ONLY_TERMS.contains(&term) {
            return Err(ReaderError::invalid_state(format!(
                "annotation '{term}' is not applicable to a request payload"
            )));
        }
        Ok(())
    }

    fn take_annotations(&mut self, name: &str) -> Vec<PropertyAnnotation> {
        let mut taken = Vec::new();
        let mut kept = Vec::new();
        for (owner, annotation) in self.pending_annotations.drain(..) {
            if owner == name {
                taken.push(annotation);
            } else {
                kept.push((owner, annotation));
            }
        }
        self.pending_annotations = kept;
        taken
    }

    fn handle_property(&mut self, name: String) -> Result<bool, ReaderError> {
        {
            let Some(scope) = self.scopes.last_mut() else {
                return Err(ReaderError::invalid_state("no open resource scope"));
            };
            if !scope.seen.insert(name.clone()) {
                return Err(ReaderError::DuplicateProperty { name });
            }
            scope.needs_separator = true;
        }
        let resource_type = self.scopes.last().and_then(|s| s.type_name.clone());
        let declaration = self
            .schema
            .lookup_property(resource_type.as_deref(), &name);
        match self.lexer.peek_non_ws() {
            Some('{') => {
                self.emit(
                    PayloadItem::NestedResourceInfoStart {
                        name: name.clone(),
                        is_collection: false,
                    },
                    ReaderState::NestedResourceInfoStart,
                );
                self.scopes.push(Scope::nested(name, false));
                Ok(true)
            }
            Some('[') => self.handle_collection_property(name, declaration),
            Some(_) => self.handle_scalar_property(name, declaration),
            None => Err(self.wire(SyntaxError::UnexpectedEndOfInput)),
        }
    }

    fn handle_collection_property(
        &mut self,
        name: String,
        declaration: Option<PropertyDeclaration>,
    ) -> Result<bool, ReaderError> {
        let declared_elem = declaration.and_then(|d| d.primitive_kind);
        let primitive_collection =
            declaration.is_some_and(|d| d.is_collection && d.primitive_kind.is_some());
        let is_key = declaration.is_some_and(|d| d.is_key);
        let sniff = self.lexer.lookahead_past_open();

        let stream_it = if primitive_collection {
            !is_key && self.should_stream(declared_elem, true, &name, declaration)
        } else if declaration.is_none() {
            !matches!(sniff, Some('{' | '[' | ']'))
                && self.should_stream(None, true, &name, None)
        } else {
            false
        };

        if stream_it {
            self.lexer.expect('[').map_err(|e| self.wire(e))?;
            self.emit(
                PayloadItem::NestedResourceInfoStart {
                    name: name.clone(),
                    is_collection: true,
                },
                ReaderState::NestedResourceInfoStart,
            );
            self.scopes
                .push(Scope::streamed_collection(name, declared_elem));
            return Ok(true);
        }
        if primitive_collection {
            let collection = self.materialize_collection(&name, declared_elem)?;
            return self.finish_materialized(name, collection);
        }
        if let Some(d) = declaration {
            if !d.is_collection {
                return Err(self.wire(SyntaxError::Grammar(
                    "array value for a non-collection property",
                )));
            }
            // Declared structured collection: a nested resource set.
            self.emit(
                PayloadItem::NestedResourceInfoStart {
                    name: name.clone(),
                    is_collection: true,
                },
                ReaderState::NestedResourceInfoStart,
            );
            self.scopes.push(Scope::nested(name, true));
            return Ok(true);
        }
        if matches!(sniff, Some('{')) {
            self.emit(
                PayloadItem::NestedResourceInfoStart {
                    name: name.clone(),
                    is_collection: true,
                },
                ReaderState::NestedResourceInfoStart,
            );
            self.scopes.push(Scope::nested(name, true));
            return Ok(true);
        }
        let collection = self.materialize_collection(&name, None)?;
        self.finish_materialized(name, collection)
    }

    fn handle_scalar_property(
        &mut self,
        name: String,
        declaration: Option<PropertyDeclaration>,
    ) -> Result<bool, ReaderError> {
        let declared_kind = declaration.and_then(|d| d.primitive_kind);
        let is_key = declaration.is_some_and(|d| d.is_key);
        let is_null = self.lexer.peek_non_ws() == Some('n');
        if !is_null && !is_key && self.should_stream(declared_kind, false, &name, declaration) {
            let annotations = self.take_annotations(&name);
            let content_type = annotations
                .iter()
                .find(|a| a.term == "odata.mediaContentType")
                .and_then(|a| a.value.as_ref())
                .and_then(|v| v.as_str().map(str::to_string));
            self.emit(
                PayloadItem::PropertyInfoStart {
                    name: name.clone(),
                    declared_primitive_kind: declared_kind,
                    content_type: content_type.clone(),
                    annotations,
                },
                ReaderState::PropertyInfoStart,
            );
            let mut scope = Scope::property_info(name, declared_kind);
            scope.content_type = content_type;
            self.scopes.push(scope);
            Ok(true)
        } else {
            let scalar = self.parse_scalar(&name, declared_kind)?;
            self.finish_materialized(name, Value::Primitive(scalar))
        }
    }

    fn finish_materialized(&mut self, name: String, value: Value) -> Result<bool, ReaderError> {
        // Annotations for a materialized property were applicability-checked
        // when parsed; the atomic Property item has no slot for them.
        let _ = self.take_annotations(&name);
        if let Some(scope) = self.scopes.last_mut() {
            scope.materialized_count += 1;
        }
        self.emit(PayloadItem::Property { name, value }, ReaderState::Property);
        Ok(true)
    }

    /// Consumes a whole primitive-collection value, validating each element
    /// against the declared element kind.
    fn materialize_collection(
        &mut self,
        name: &str,
        element_kind: Option<PrimitiveKind>,
    ) -> Result<Value, ReaderError> {
        self.lexer.expect('[').map_err(|e| self.wire(e))?;
        let mut items = Vec::new();
        if self.lexer.peek_non_ws() == Some(']') {
            self.lexer.expect(']').map_err(|e| self.wire(e))?;
            return Ok(Value::Collection(items));
        }
        loop {
            match self.lexer.peek_non_ws() {
                Some('{' | '[') => {
                    return Err(self.wire(SyntaxError::Grammar(
                        "expected a primitive collection element",
                    )));
                }
                Some(_) => {
                    let scalar = self.parse_scalar(name, element_kind)?;
                    items.push(Value::Primitive(scalar));
                }
                None => return Err(self.wire(SyntaxError::UnexpectedEndOfInput)),
            }
            match self.lexer.peek_non_ws() {
                Some(',') => {
                    self.lexer.expect(',').map_err(|e| self.wire(e))?;
                }
                Some(']') => {
                    self.lexer.expect(']').map_err(|e| self.wire(e))?;
                    return Ok(Value::Collection(items));
                }
                Some(c) => return Err(self.wire(SyntaxError::InvalidCharacter(c))),
                None => return Err(self.wire(SyntaxError::UnexpectedEndOfInput)),
            }
        }
    }

    fn next_set_element(&mut self) -> Result<bool, ReaderError> {
        match self.element_prelude(']')? {
            Prelude::Close => {
                self.scopes.pop();
                self.emit(PayloadItem::ResourceSetEnd, ReaderState::ResourceSetEnd);
                Ok(true)
            }
            Prelude::Item => {
                match self.lexer.peek_non_ws() {
                    Some('{') => {
                        self.mark_member_consumed();
                        let hint = self.scopes.last().and_then(|s| s.type_name.clone());
                        self.open_resource(hint)
                    }
                    Some('[') => Err(self.wire(SyntaxError::Grammar(
                        "nested arrays are not supported in a resource set",
                    ))),
                    Some('n') => {
                        self.mark_member_consumed();
                        self.lexer.read_null().map_err(|e| self.wire(e))?;
                        self.emit(PayloadItem::Primitive { value: None }, ReaderState::Primitive);
                        Ok(true)
                    }
                    Some(_) => {
                        self.mark_member_consumed();
                        self.set_scalar_element()
                    }
                    None => Err(self.wire(SyntaxError::UnexpectedEndOfInput)),
                }
            }
        }
    }

    fn set_scalar_element(&mut self) -> Result<bool, ReaderError> {
        let (name, element_kind) = match self.scopes.last() {
            Some(scope) => (
                scope.name.clone().unwrap_or_default(),
                scope.element_kind,
            ),
            None => (String::new(), None),
        };
        if self.should_stream(element_kind, true, &name, None) {
            self.begin_stream_value(name, element_kind, None)
        } else {
            let scalar = self.parse_scalar(&name, element_kind)?;
            self.emit(PayloadItem::Primitive { value: scalar }, ReaderState::Primitive);
            Ok(true)
        }
    }

    fn next_nested(&mut self) -> Result<bool, ReaderError> {
        let (streamed, entered, element_kind, name) = match self.scopes.last() {
            Some(scope) => (
                scope.streamed_collection,
                scope.value_written,
                scope.element_kind,
                scope.name.clone().unwrap_or_default(),
            ),
            None => return Err(ReaderError::invalid_state("no open scope")),
        };
        if streamed {
            return self.next_streamed_element();
        }
        if !entered {
            if let Some(scope) = self.scopes.last_mut() {
                scope.value_written = true;
            }
            return match self.lexer.peek_non_ws() {
                Some('{') => self.open_resource(None),
                Some('[') => {
                    self.lexer.expect('[').map_err(|e| self.wire(e))?;
                    let mut scope = Scope::resource_set(None);
                    scope.element_kind = element_kind;
                    scope.name = Some(name);
                    self.scopes.push(scope);
                    self.emit(
                        PayloadItem::ResourceSetStart { type_name: None },
                        ReaderState::ResourceSetStart,
                    );
                    Ok(true)
                }
                Some(c) => Err(self.wire(SyntaxError::InvalidCharacter(c))),
                None => Err(self.wire(SyntaxError::UnexpectedEndOfInput)),
            };
        }
        self.scopes.pop();
        self.emit(
            PayloadItem::NestedResourceInfoEnd,
            ReaderState::NestedResourceInfoEnd,
        );
        Ok(true)
    }

    fn next_streamed_element(&mut self) -> Result<bool, ReaderError> {
        match self.element_prelude(']')? {
            Prelude::Close => {
                self.scopes.pop();
                self.emit(
                    PayloadItem::NestedResourceInfoEnd,
                    ReaderState::NestedResourceInfoEnd,
                );
                Ok(true)
            }
            Prelude::Item => {
                let (name, element_kind) = match self.scopes.last() {
                    Some(scope) => (
                        scope.name.clone().unwrap_or_default(),
                        scope.element_kind,
                    ),
                    None => return Err(ReaderError::invalid_state("no open scope")),
                };
                self.mark_member_consumed();
                match self.lexer.peek_non_ws() {
                    Some('n') => {
                        // Null elements always materialize, never stream.
                        self.lexer.read_null().map_err(|e| self.wire(e))?;
                        self.emit(PayloadItem::Primitive { value: None }, ReaderState::Primitive);
                        Ok(true)
                    }
                    Some('{' | '[') => Err(self.wire(SyntaxError::Grammar(
                        "expected a primitive collection element",
                    ))),
                    Some(_) => self.begin_stream_value(name, element_kind, None),
                    None => Err(self.wire(SyntaxError::UnexpectedEndOfInput)),
                }
            }
        }
    }

    fn next_property_value(&mut self) -> Result<bool, ReaderError> {
        let (resolved, name, declared_kind, content_type) = match self.scopes.last() {
            Some(scope) => (
                scope.value_written,
                scope.name.clone().unwrap_or_default(),
                scope.declared_kind,
                scope.content_type.clone(),
            ),
            None => return Err(ReaderError::invalid_state("no open scope")),
        };
        if resolved {
            self.scopes.pop();
            self.emit(PayloadItem::PropertyEnd, ReaderState::PropertyEnd);
            Ok(true)
        } else {
            if let Some(scope) = self.scopes.last_mut() {
                scope.value_written = true;
            }
            self.begin_stream_value(name, declared_kind, content_type)
        }
    }

    fn begin_stream_value(
        &mut self,
        name: String,
        declared: Option<PrimitiveKind>,
        content_type: Option<String>,
    ) -> Result<bool, ReaderError> {
        let kind = declared.unwrap_or(PrimitiveKind::Untyped);
        let source = match self.lexer.peek_non_ws() {
            Some('"') => {
                self.lexer.begin_string().map_err(|e| self.wire(e))?;
                StreamSource::Quoted
            }
            Some(c) if c == '-' || c == 't' || c == 'f' || c.is_ascii_digit() => {
                let raw = self.lexer.read_raw_scalar().map_err(|e| self.wire(e))?;
                StreamSource::Raw(Some(raw))
            }
            Some(c) => return Err(self.wire(SyntaxError::InvalidCharacter(c))),
            None => return Err(self.wire(SyntaxError::UnexpectedEndOfInput)),
        };
        trace!(name = %name, ?kind, "stream value opened");
        self.stream = Some(ActiveStream {
            name,
            kind,
            source,
            channel_created: false,
            drained: false,
        });
        self.emit(
            PayloadItem::Stream {
                content_type,
                primitive_kind: kind,
            },
            ReaderState::Stream,
        );
        Ok(true)
    }

    fn should_stream(
        &self,
        declared_kind: Option<PrimitiveKind>,
        is_collection: bool,
        name: &str,
        declaration: Option<PropertyDeclaration>,
    ) -> bool {
        self.predicate.as_ref().is_some_and(|p| {
            p(&StreamCandidate {
                declared_kind,
                is_collection,
                property_name: name,
                declaration,
            })
        })
    }

    // ── scalar parsing ──────────────────────────────────────────────────

    fn parse_scalar(
        &mut self,
        name: &str,
        declared: Option<PrimitiveKind>,
    ) -> Result<Option<ScalarValue>, ReaderError> {
        match self.lexer.peek_non_ws() {
            Some('n') => {
                self.lexer.read_null().map_err(|e| self.wire(e))?;
                Ok(None)
            }
            Some('t' | 'f') => {
                let b = self.lexer.read_bool().map_err(|e| self.wire(e))?;
                match declared {
                    None | Some(PrimitiveKind::Boolean | PrimitiveKind::Untyped) => {
                        Ok(Some(ScalarValue::Boolean(b)))
                    }
                    Some(k) => Err(self.mismatch(name, k, PrimitiveKind::Boolean)),
                }
            }
            Some('"') => {
                let s = self.lexer.read_string().map_err(|e| self.wire(e))?;
                self.string_to_scalar(name, declared, s).map(Some)
            }
            Some(c) if c == '-' || c.is_ascii_digit() => {
                let raw = self.lexer.read_number().map_err(|e| self.wire(e))?;
                self.number_to_scalar(name, declared, raw).map(Some)
            }
            Some(c) => Err(self.wire(SyntaxError::InvalidCharacter(c))),
            None => Err(self.wire(SyntaxError::UnexpectedEndOfInput)),
        }
    }

    fn string_to_scalar(
        &self,
        name: &str,
        declared: Option<PrimitiveKind>,
        s: String,
    ) -> Result<ScalarValue, ReaderError> {
        match declared {
            None | Some(PrimitiveKind::String | PrimitiveKind::Untyped) => {
                Ok(ScalarValue::String(s))
            }
            Some(PrimitiveKind::Enumeration) => Ok(ScalarValue::Enumeration(s)),
            Some(PrimitiveKind::Binary) => BASE64
                .decode(s.as_bytes())
                .map(ScalarValue::Binary)
                .map_err(|_| self.wire(SyntaxError::Grammar("invalid base64 data"))),
            Some(PrimitiveKind::DateTimeOffset) => OffsetDateTime::parse(&s, &Rfc3339)
                .map(ScalarValue::DateTimeOffset)
                .map_err(|_| self.wire(SyntaxError::Grammar("invalid date-time value"))),
            Some(PrimitiveKind::Double) => value::non_finite_double(&s)
                .map(ScalarValue::Double)
                .ok_or_else(|| self.mismatch(name, PrimitiveKind::Double, PrimitiveKind::String)),
            // 64-bit and decimal values may arrive as quoted text when the
            // producer protects them from IEEE 754 consumers.
            Some(PrimitiveKind::Int64) => s
                .parse::<i64>()
                .map(ScalarValue::Int64)
                .map_err(|_| self.mismatch(name, PrimitiveKind::Int64, PrimitiveKind::String)),
            Some(PrimitiveKind::Decimal) => value::parse_decimal(&s)
                .map(ScalarValue::Decimal)
                .ok_or_else(|| self.mismatch(name, PrimitiveKind::Decimal, PrimitiveKind::String)),
            Some(k @ (PrimitiveKind::Boolean | PrimitiveKind::Int32)) => {
                Err(self.mismatch(name, k, PrimitiveKind::String))
            }
        }
    }

    fn number_to_scalar(
        &self,
        name: &str,
        declared: Option<PrimitiveKind>,
        raw: &str,
    ) -> Result<ScalarValue, ReaderError> {
        let fractional = raw.contains(['.', 'e', 'E']);
        match declared {
            Some(PrimitiveKind::Int32) => {
                if fractional {
                    return Err(self.mismatch(name, PrimitiveKind::Int32, PrimitiveKind::Double));
                }
                raw.parse::<i32>()
                    .map(ScalarValue::Int32)
                    .map_err(|_| self.mismatch(name, PrimitiveKind::Int32, PrimitiveKind::Int64))
            }
            Some(PrimitiveKind::Int64) => {
                if fractional {
                    return Err(self.mismatch(name, PrimitiveKind::Int64, PrimitiveKind::Double));
                }
                raw.parse::<i64>()
                    .map(ScalarValue::Int64)
                    .map_err(|_| self.wire(SyntaxError::InvalidNumber(raw.to_string())))
            }
            Some(PrimitiveKind::Decimal) => value::parse_decimal(raw)
                .map(ScalarValue::Decimal)
                .ok_or_else(|| self.wire(SyntaxError::InvalidNumber(raw.to_string()))),
            Some(PrimitiveKind::Double) => raw
                .parse::<f64>()
                .map(ScalarValue::Double)
                .map_err(|_| self.wire(SyntaxError::InvalidNumber(raw.to_string()))),
            None | Some(PrimitiveKind::Untyped) => {
                if fractional {
                    raw.parse::<f64>()
                        .map(ScalarValue::Double)
                        .map_err(|_| self.wire(SyntaxError::InvalidNumber(raw.to_string())))
                } else if let Ok(n) = raw.parse::<i32>() {
                    Ok(ScalarValue::Int32(n))
                } else if let Ok(n) = raw.parse::<i64>() {
                    Ok(ScalarValue::Int64(n))
                } else {
                    raw.parse::<f64>()
                        .map(ScalarValue::Double)
                        .map_err(|_| self.wire(SyntaxError::InvalidNumber(raw.to_string())))
                }
            }
            Some(k) => {
                let actual = if fractional {
                    PrimitiveKind::Double
                } else {
                    PrimitiveKind::Int32
                };
                Err(self.mismatch(name, k, actual))
            }
        }
    }

    // ── channel support ─────────────────────────────────────────────────

    fn check_channel(&mut self, text: bool) -> Result<(), ReaderError> {
        if self.state != ReaderState::Stream {
            return Err(self.fail(ReaderError::invalid_state("no streamed value is active")));
        }
        let Some(active) = self.stream.as_mut() else {
            return Err(self.fail(ReaderError::invalid_state("no streamed value is active")));
        };
        if active.channel_created {
            let name = active.name.clone();
            return Err(self.fail(ReaderError::invalid_state(format!(
                "the stream for '{name}' was already opened"
            ))));
        }
        let accepted = if text {
            active.kind.accepts_text_channel()
        } else {
            active.kind.accepts_binary_channel()
        };
        if !accepted {
            let kind = active.kind;
            return Err(self.fail(ReaderError::invalid_state(format!(
                "a {kind:?} value cannot be drained through this channel kind"
            ))));
        }
        active.channel_created = true;
        trace!(name = %active.name, text, "stream channel opened");
        Ok(())
    }

    fn next_stream_fragment(&mut self) -> Result<Option<Fragment<'src>>, ReaderError> {
        let Some(active) = self.stream.as_mut() else {
            return Err(ReaderError::invalid_state("no streamed value is active"));
        };
        if active.drained {
            return Ok(None);
        }
        match &mut active.source {
            StreamSource::Raw(slot) => match slot.take() {
                Some(text) => Ok(Some(Fragment::Slice(text))),
                None => {
                    active.drained = true;
                    Ok(None)
                }
            },
            StreamSource::Quoted => match self.lexer.next_fragment() {
                Ok(Some(fragment)) => Ok(Some(fragment)),
                Ok(None) => {
                    active.drained = true;
                    trace!(name = %active.name, "stream drained");
                    Ok(None)
                }
                Err(source) => {
                    let err = ReaderError::MalformedWire {
                        source,
                        line: self.lexer.line(),
                        column: self.lexer.column(),
                    };
                    self.state = ReaderState::Exception;
                    self.item = None;
                    Err(err)
                }
            },
        }
    }
}

/// The scoped text channel of an active streamed value.
///
/// Reads decoded characters; the parent reader resumes only once the channel
/// has been drained to its end.
pub struct TextValueReader<'r, 'src, S> {
    reader: &'r mut PayloadReader<'src, S>,
    pending: Vec<u8>,
    offset: usize,
}

impl<S: SchemaOracle> TextValueReader<'_, '_, S> {
    /// Reads the next decoded chunk, or `None` at the end of the value.
    ///
    /// # Errors
    ///
    /// [`ReaderError::MalformedWire`] if the underlying value is malformed.
    pub fn read_chunk(&mut self) -> Result<Option<String>, ReaderError> {
        if self.offset < self.pending.len() {
            let chunk = String::from_utf8_lossy(&self.pending[self.offset..]).into_owned();
            self.pending.clear();
            self.offset = 0;
            return Ok(Some(chunk));
        }
        match self.reader.next_stream_fragment()? {
            Some(Fragment::Slice(text)) => Ok(Some(text.to_string())),
            Some(Fragment::Char(c)) => Ok(Some(c.to_string())),
            None => Ok(None),
        }
    }

    /// Drains the whole value into one string.
    ///
    /// # Errors
    ///
    /// [`ReaderError::MalformedWire`] if the underlying value is malformed.
    pub fn read_to_string(&mut self) -> Result<String, ReaderError> {
        let mut out = String::new();
        while let Some(chunk) = self.read_chunk()? {
            out.push_str(&chunk);
        }
        Ok(out)
    }
}

impl<S: SchemaOracle> io::Read for TextValueReader<'_, '_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.offset < self.pending.len() {
                let n = (self.pending.len() - self.offset).min(buf.len());
                buf[..n].copy_from_slice(&self.pending[self.offset..self.offset + n]);
                self.offset += n;
                return Ok(n);
            }
            self.pending.clear();
            self.offset = 0;
            match self.reader.next_stream_fragment().map_err(io::Error::other)? {
                Some(Fragment::Slice(text)) => self.pending.extend_from_slice(text.as_bytes()),
                Some(Fragment::Char(c)) => {
                    let mut encoded = [0u8; 4];
                    self.pending
                        .extend_from_slice(c.encode_utf8(&mut encoded).as_bytes());
                }
                None => return Ok(0),
            }
        }
    }
}

/// The scoped byte channel of an active streamed value.
///
/// Yields bytes decoded from the value's base64 wire form; the parent reader
/// resumes only once the channel has been drained to its end.
pub struct BinaryValueReader<'r, 'src, S> {
    reader: &'r mut PayloadReader<'src, S>,
    encoded: String,
    decoded: Vec<u8>,
    offset: usize,
    at_end: bool,
}

impl<S: SchemaOracle> BinaryValueReader<'_, '_, S> {
    fn refill(&mut self) -> Result<(), ReaderError> {
        while !self.at_end && self.encoded.len() < 4 {
            match self.reader.next_stream_fragment()? {
                Some(Fragment::Slice(text)) => self.encoded.push_str(text),
                Some(Fragment::Char(c)) => self.encoded.push(c),
                None => self.at_end = true,
            }
        }
        let take = if self.at_end {
            self.encoded.len()
        } else {
            self.encoded.len() - self.encoded.len() % 4
        };
        if take == 0 {
            return Ok(());
        }
        let bytes = match BASE64.decode(&self.encoded[..take]) {
            Ok(bytes) => bytes,
            Err(_) => {
                let err = self
                    .reader
                    .wire(SyntaxError::Grammar("invalid base64 data"));
                return Err(self.reader.fail(err));
            }
        };
        self.decoded.extend_from_slice(&bytes);
        self.encoded.drain(..take);
        Ok(())
    }

    /// Drains the whole value into one byte vector.
    ///
    /// # Errors
    ///
    /// [`ReaderError::MalformedWire`] if the wire text is not valid base64.
    pub fn read_to_end(&mut self) -> Result<Vec<u8>, ReaderError> {
        let mut out = Vec::new();
        loop {
            if self.offset < self.decoded.len() {
                out.extend_from_slice(&self.decoded[self.offset..]);
                self.decoded.clear();
                self.offset = 0;
            }
            if self.at_end && self.encoded.is_empty() {
                return Ok(out);
            }
            self.refill()?;
            if self.decoded.is_empty() && self.at_end && self.encoded.is_empty() {
                return Ok(out);
            }
        }
    }
}

impl<S: SchemaOracle> io::Read for BinaryValueReader<'_, '_, S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.offset < self.decoded.len() {
                let n = (self.decoded.len() - self.offset).min(buf.len());
                buf[..n].copy_from_slice(&self.decoded[self.offset..self.offset + n]);
                self.offset += n;
                return Ok(n);
            }
            self.decoded.clear();
            self.offset = 0;
            if self.at_end && self.encoded.is_empty() {
                return Ok(0);
            }
            self.refill().map_err(io::Error::other)?;
            if self.decoded.is_empty() && self.at_end && self.encoded.is_empty() {
                return Ok(0);
            }
        }
    }
}

fn split_property_annotation(key: &str) -> Option<(String, String)> {
    let (name, term) = key.split_once('@')?;
    if name.is_empty() || term.is_empty() {
        return None;
    }
    Some((name.to_string(), term.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn annotation_keys_split() {
        assert_eq!(
            split_property_annotation("age@odata.mediaContentType"),
            Some(("age".to_string(), "odata.mediaContentType".to_string()))
        );
        assert_eq!(split_property_annotation("@odata.count"), None);
        assert_eq!(split_property_annotation("plain"), None);
    }

    #[test]
    fn empty_payload_reports_position() {
        let mut reader = PayloadReader::new("", (), ReaderOptions::default());
        let err = reader.advance().unwrap_err();
        assert_eq!(
            err,
            ReaderError::MalformedWire {
                source: SyntaxError::UnexpectedEndOfInput,
                line: 1,
                column: 1,
            }
        );
        assert_eq!(reader.state(), ReaderState::Exception);
    }

    #[test]
    fn errors_poison_the_reader() {
        let mut reader = PayloadReader::new("7", (), ReaderOptions::default());
        assert!(reader.advance().is_err());
        assert!(matches!(
            reader.advance(),
            Err(ReaderError::InvalidState { .. })
        ));
    }
}

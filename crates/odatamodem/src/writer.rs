//! The push-model payload writer.
//!
//! [`PayloadWriter`] mirrors the reader's grammar: paired
//! [`write_start`] / [`write_end`] calls bracket every composite item,
//! [`write_property`] writes one atomic materialized property, and announced
//! properties resolve through exactly one of [`write_primitive`] or a scoped
//! output channel. Members serialize in write order.
//!
//! [`write_start`]: PayloadWriter::write_start
//! [`write_end`]: PayloadWriter::write_end
//! [`write_property`]: PayloadWriter::write_property
//! [`write_primitive`]: PayloadWriter::write_primitive
//!
//! # Examples
//!
//! ```
//! use odatamodem::{PayloadItem, PayloadWriter, WriterOptions};
//!
//! let mut writer = PayloadWriter::new((), WriterOptions::default());
//! writer.write_start(PayloadItem::ResourceStart { type_name: None })?;
//! writer.write_property("id", "1".into())?;
//! writer.write_end()?;
//! assert_eq!(writer.finish()?, r#"{"id":"1"}"#);
//! # Ok::<(), odatamodem::WriterError>(())
//! ```

use std::io;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use tracing::trace;

use crate::error::WriterError;
use crate::item::{PayloadItem, PropertyAnnotation, RESPONSE_ONLY_TERMS};
use crate::options::{CallMode, MessageKind, WriterOptions};
use crate::schema::SchemaOracle;
use crate::scope::{Scope, ScopeKind, ScopeStack};
use crate::value::{self, PrimitiveKind, ScalarValue, Value};

/// The writer's position after the most recent call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriterState {
    /// Nothing has been written yet.
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
    /// An announced property's scope was closed.
    PropertyEnd,
    /// A materialized scalar was written.
    Primitive,
    /// A scoped output channel is (or was) active.
    Stream,
    /// A materialized property was written.
    Property,
    /// The top-level scope was closed; only `finish` remains.
    Completed,
    /// A violation occurred; no further operation succeeds.
    Exception,
}

/// Where a channel or primitive lands, resolved from the innermost scope.
enum ValueSlot {
    Property,
    CollectionElement,
    SetElement,
}

/// A push-model serializer for one payload.
///
/// Violations are terminal: after any error the writer is in
/// [`WriterState::Exception`] and every call fails.
pub struct PayloadWriter<S> {
    out: String,
    schema: S,
    root_type: Option<String>,
    message_kind: MessageKind,
    call_mode: CallMode,
    scopes: ScopeStack,
    state: WriterState,
    /// Name of the property whose output channel is open (or abandoned).
    channel_open: Option<String>,
}

impl<S: SchemaOracle> PayloadWriter<S> {
    /// Creates a writer.
    pub fn new(schema: S, options: WriterOptions) -> Self {
        let WriterOptions {
            root_type,
            message_kind,
            call_mode,
        } = options;
        Self {
            out: String::new(),
            schema,
            root_type,
            message_kind,
            call_mode,
            scopes: ScopeStack::new(),
            state: WriterState::Start,
            channel_open: None,
        }
    }

    /// The state reached by the most recent call.
    #[must_use]
    pub fn state(&self) -> WriterState {
        self.state
    }

    /// Opens a composite item. Accepts the four `*Start` variants of
    /// [`PayloadItem`].
    ///
    /// # Errors
    ///
    /// Any sequencing violation; see [`WriterError`].
    pub fn write_start(&mut self, item: PayloadItem) -> Result<(), WriterError> {
        self.ensure_mode(CallMode::Sync)?;
        self.write_start_core(item)
    }

    /// Asynchronous counterpart of [`write_start`](PayloadWriter::write_start).
    ///
    /// # Errors
    ///
    /// As the synchronous form, plus [`WriterError::SyncAsyncMismatch`] on a
    /// synchronous-mode writer.
    pub async fn write_start_async(&mut self, item: PayloadItem) -> Result<(), WriterError> {
        self.ensure_mode(CallMode::Async)?;
        self.write_start_core(item)
    }

    /// Closes the innermost open scope. Closing the last scope completes the
    /// payload.
    ///
    /// # Errors
    ///
    /// [`WriterError::InvalidState`] with no open scope or an unresolved
    /// announced property; [`WriterError::OpenStream`] with an unclosed
    /// channel.
    pub fn write_end(&mut self) -> Result<(), WriterError> {
        self.ensure_mode(CallMode::Sync)?;
        self.write_end_core()
    }

    /// Asynchronous counterpart of [`write_end`](PayloadWriter::write_end).
    ///
    /// # Errors
    ///
    /// As the synchronous form, plus [`WriterError::SyncAsyncMismatch`] on a
    /// synchronous-mode writer.
    pub async fn write_end_async(&mut self) -> Result<(), WriterError> {
        self.ensure_mode(CallMode::Async)?;
        self.write_end_core()
    }

    /// Writes one atomic materialized property in the current resource
    /// scope.
    ///
    /// # Errors
    ///
    /// [`WriterError::DuplicateProperty`] if the name was already resolved,
    /// [`WriterError::SchemaMismatch`] if the value defies its declaration,
    /// or any sequencing violation.
    pub fn write_property(&mut self, name: &str, payload_value: Value) -> Result<(), WriterError> {
        self.ensure_mode(CallMode::Sync)?;
        self.write_property_core(name, payload_value)
    }

    /// Asynchronous counterpart of
    /// [`write_property`](PayloadWriter::write_property).
    ///
    /// # Errors
    ///
    /// As the synchronous form, plus [`WriterError::SyncAsyncMismatch`] on a
    /// synchronous-mode writer.
    pub async fn write_property_async(
        &mut self,
        name: &str,
        payload_value: Value,
    ) -> Result<(), WriterError> {
        self.ensure_mode(CallMode::Async)?;
        self.write_property_core(name, payload_value)
    }

    /// Writes the materialized value of the announced property, or one
    /// materialized element of an open collection.
    ///
    /// # Errors
    ///
    /// [`WriterError::ValueAlreadyWritten`] for a second value, or any
    /// sequencing violation.
    pub fn write_primitive(&mut self, scalar: Option<ScalarValue>) -> Result<(), WriterError> {
        self.ensure_mode(CallMode::Sync)?;
        self.write_primitive_core(scalar)
    }

    /// Asynchronous counterpart of
    /// [`write_primitive`](PayloadWriter::write_primitive).
    ///
    /// # Errors
    ///
    /// As the synchronous form, plus [`WriterError::SyncAsyncMismatch`] on a
    /// synchronous-mode writer.
    pub async fn write_primitive_async(
        &mut self,
        scalar: Option<ScalarValue>,
    ) -> Result<(), WriterError> {
        self.ensure_mode(CallMode::Async)?;
        self.write_primitive_core(scalar)
    }

    /// Opens the scoped text channel for the announced property or open
    /// collection element.
    ///
    /// # Errors
    ///
    /// [`WriterError::InvalidState`] outside a streamable position, or
    /// [`WriterError::ValueAlreadyWritten`] for an already-resolved
    /// property.
    pub fn create_text_writer(&mut self) -> Result<TextValueWriter<'_, S>, WriterError> {
        self.open_channel(true)?;
        Ok(TextValueWriter { writer: self })
    }

    /// Opens the scoped byte channel (base64 at the wire) for the announced
    /// property or open collection element.
    ///
    /// # Errors
    ///
    /// [`WriterError::InvalidState`] outside a streamable position or for a
    /// kind that is not binary-capable, or
    /// [`WriterError::ValueAlreadyWritten`] for an already-resolved
    /// property.
    pub fn create_binary_write_stream(
        &mut self,
    ) -> Result<BinaryValueWriter<'_, S>, WriterError> {
        self.open_channel(false)?;
        Ok(BinaryValueWriter {
            writer: self,
            carry: Vec::new(),
        })
    }

    /// Hands back the serialized payload after the top-level `write_end`.
    ///
    /// # Errors
    ///
    /// [`WriterError::InvalidState`] if the payload is incomplete or the
    /// writer is in the error state.
    pub fn finish(self) -> Result<String, WriterError> {
        match self.state {
            WriterState::Completed => Ok(self.out),
            WriterState::Exception => Err(WriterError::invalid_state("writer is in the error state")),
            _ => Err(WriterError::invalid_state("the payload is not complete")),
        }
    }

    // ── state machine core ──────────────────────────────────────────────

    fn ensure_mode(&mut self, invoked: CallMode) -> Result<(), WriterError> {
        if self.call_mode == invoked {
            Ok(())
        } else {
            let configured = self.call_mode;
            Err(self.fail(WriterError::SyncAsyncMismatch { configured }))
        }
    }

    fn fail(&mut self, err: WriterError) -> WriterError {
        self.state = WriterState::Exception;
        err
    }

    /// Rejects calls in terminal states or with an open/abandoned channel.
    fn ready(&mut self) -> Result<(), WriterError> {
        match self.state {
            WriterState::Exception => {
                return Err(WriterError::invalid_state("writer is in the error state"));
            }
            WriterState::Completed => {
                return Err(WriterError::invalid_state("the payload is already complete"));
            }
            _ => {}
        }
        if let Some(name) = self.channel_open.clone() {
            return Err(self.fail(WriterError::OpenStream { name }));
        }
        Ok(())
    }

    fn write_start_core(&mut self, item: PayloadItem) -> Result<(), WriterError> {
        self.ready()?;
        trace!(?item, "write start");
        match item {
            PayloadItem::ResourceStart { type_name } => self.start_resource(type_name),
            PayloadItem::ResourceSetStart { type_name } => self.start_resource_set(type_name),
            PayloadItem::NestedResourceInfoStart {
                name,
                is_collection,
            } => self.start_nested(name, is_collection),
            PayloadItem::PropertyInfoStart {
                name,
                declared_primitive_kind,
                content_type,
                annotations,
            } => self.start_property_info(name, declared_primitive_kind, content_type, annotations),
            other => Err(self.fail(WriterError::invalid_state(format!(
                "write_start does not accept {other:?}"
            )))),
        }
    }

    fn start_resource(&mut self, type_name: Option<String>) -> Result<(), WriterError> {
        match self.scopes.last_mut() {
            None => {
                if self.state != WriterState::Start {
                    return Err(self.fail(WriterError::invalid_state(
                        "a payload has exactly one root",
                    )));
                }
            }
            Some(scope) => match scope.kind {
                ScopeKind::ResourceSet => {
                    if scope.needs_separator {
                        self.out.push(',');
                    }
                }
                ScopeKind::NestedResourceInfo => {
                    if scope.is_collection {
                        return Err(self.fail(WriterError::invalid_state(
                            "a collection link takes a resource set or streamed elements",
                        )));
                    }
                    if scope.value_written {
                        let name = scope.display_name().to_string();
                        return Err(self.fail(WriterError::ValueAlreadyWritten { name }));
                    }
                    scope.value_written = true;
                }
                _ => {
                    return Err(self.fail(WriterError::invalid_state(
                        "a resource cannot start here",
                    )));
                }
            },
        }
        if let Some(scope) = self.scopes.last_mut() {
            if scope.kind == ScopeKind::ResourceSet {
                scope.needs_separator = true;
            }
        }
        let inherited = match self.scopes.last() {
            None => self.root_type.clone(),
            Some(parent) => parent.type_name.clone(),
        };
        let mut scope = Scope::resource(type_name.clone().or(inherited));
        self.out.push('{');
        if let Some(t) = &type_name {
            push_quoted(&mut self.out, "@odata.type");
            self.out.push(':');
            push_quoted(&mut self.out, &format!("#{t}"));
            scope.needs_separator = true;
        }
        self.scopes.push(scope);
        self.state = WriterState::ResourceStart;
        Ok(())
    }

    fn start_resource_set(&mut self, type_name: Option<String>) -> Result<(), WriterError> {
        match self.scopes.last_mut() {
            None => {
                if self.state != WriterState::Start {
                    return Err(self.fail(WriterError::invalid_state(
                        "a payload has exactly one root",
                    )));
                }
            }
            Some(scope) => match scope.kind {
                ScopeKind::NestedResourceInfo => {
                    if !scope.is_collection {
                        return Err(self.fail(WriterError::invalid_state(
                            "a single-valued link cannot take a resource set",
                        )));
                    }
                    if scope.value_written || scope.opened_bracket {
                        let name = scope.display_name().to_string();
                        return Err(self.fail(WriterError::ValueAlreadyWritten { name }));
                    }
                    scope.value_written = true;
                }
                _ => {
                    return Err(self.fail(WriterError::invalid_state(
                        "a resource set cannot start here",
                    )));
                }
            },
        }
        let inherited = match self.scopes.last() {
            None => self.root_type.clone(),
            Some(parent) => parent.type_name.clone(),
        };
        let element_kind = self.scopes.last().and_then(|s| s.element_kind);
        let mut scope = Scope::resource_set(type_name.or(inherited));
        scope.element_kind = element_kind;
        self.out.push('[');
        self.scopes.push(scope);
        self.state = WriterState::ResourceSetStart;
        Ok(())
    }

    fn start_nested(&mut self, name: String, is_collection: bool) -> Result<(), WriterError> {
        let resource_type = match self.scopes.last() {
            Some(scope) if scope.kind == ScopeKind::Resource => scope.type_name.clone(),
            _ => {
                return Err(self.fail(WriterError::invalid_state(
                    "a nested resource info needs an open resource scope",
                )));
            }
        };
        self.member_key(&name)?;
        let element_kind = self
            .schema
            .lookup_property(resource_type.as_deref(), &name)
            .and_then(|d| d.primitive_kind);
        let mut scope = Scope::nested(name, is_collection);
        scope.element_kind = element_kind;
        self.scopes.push(scope);
        self.state = WriterState::NestedResourceInfoStart;
        Ok(())
    }

    fn start_property_info(
        &mut self,
        name: String,
        declared_primitive_kind: Option<PrimitiveKind>,
        content_type: Option<String>,
        annotations: Vec<PropertyAnnotation>,
    ) -> Result<(), WriterError> {
        let resource_type = match self.scopes.last() {
            Some(scope) if scope.kind == ScopeKind::Resource => scope.type_name.clone(),
            _ => {
                return Err(self.fail(WriterError::invalid_state(
                    "a property info needs an open resource scope",
                )));
            }
        };
        for annotation in &annotations {
            self.check_applicability(&annotation.term)?;
        }
        {
            // Reserve the name before any member is emitted.
            let Some(scope) = self.scopes.last_mut() else {
                return Err(WriterError::invalid_state("no open resource scope"));
            };
            if !scope.seen.insert(name.clone()) {
                return Err(self.fail(WriterError::DuplicateProperty { name }));
            }
        }
        for annotation in &annotations {
            self.annotation_member(&name, &annotation.term, annotation.value.as_ref())?;
        }
        let announced_content_type = annotations
            .iter()
            .any(|a| a.term == "odata.mediaContentType");
        if let Some(ct) = &content_type {
            if !announced_content_type {
                let ct_value = ScalarValue::String(ct.clone());
                self.annotation_member(&name, "odata.mediaContentType", Some(&ct_value))?;
            }
        }
        self.raw_member_key(&name);
        let declared = declared_primitive_kind.or_else(|| {
            self.schema
                .lookup_property(resource_type.as_deref(), &name)
                .and_then(|d| d.primitive_kind)
        });
        let mut scope = Scope::property_info(name, declared);
        scope.content_type = content_type;
        self.scopes.push(scope);
        self.state = WriterState::PropertyInfoStart;
        Ok(())
    }

    fn write_property_core(&mut self, name: &str, payload_value: Value) -> Result<(), WriterError> {
        self.ready()?;
        let resource_type = match self.scopes.last() {
            Some(scope) if scope.kind == ScopeKind::Resource => scope.type_name.clone(),
            _ => {
                return Err(self.fail(WriterError::invalid_state(
                    "a property needs an open resource scope",
                )));
            }
        };
        self.member_key(name)?;
        let declaration = self.schema.lookup_property(resource_type.as_deref(), name);
        self.render_value(name, declaration.and_then(|d| d.primitive_kind), &payload_value)?;
        if let Some(scope) = self.scopes.last_mut() {
            scope.materialized_count += 1;
        }
        self.state = WriterState::Property;
        Ok(())
    }

    fn write_primitive_core(&mut self, scalar: Option<ScalarValue>) -> Result<(), WriterError> {
        self.ready()?;
        let (slot, name, declared) = self.value_slot()?;
        if let (Some(k), Some(v)) = (declared, scalar.as_ref()) {
            if !v.conforms_to(k) {
                let actual = v.kind();
                return Err(self.fail(WriterError::SchemaMismatch {
                    name,
                    declared: k,
                    actual,
                }));
            }
        }
        self.enter_value_slot(&slot);
        match &scalar {
            None => self.out.push_str("null"),
            Some(v) => self.push_rendered(v)?,
        }
        self.state = WriterState::Primitive;
        Ok(())
    }

    fn write_end_core(&mut self) -> Result<(), WriterError> {
        self.ready()?;
        let Some(scope) = self.scopes.pop() else {
            return Err(self.fail(WriterError::invalid_state("no open scope")));
        };
        trace!(kind = ?scope.kind, "write end");
        match scope.kind {
            ScopeKind::Resource => {
                self.out.push('}');
                self.state = WriterState::ResourceEnd;
            }
            ScopeKind::ResourceSet => {
                self.out.push(']');
                self.state = WriterState::ResourceSetEnd;
            }
            ScopeKind::NestedResourceInfo => {
                if scope.opened_bracket {
                    self.out.push(']');
                } else if !scope.value_written {
                    // An empty link: null for a single target, [] for a
                    // collection.
                    self.out
                        .push_str(if scope.is_collection { "[]" } else { "null" });
                }
                self.state = WriterState::NestedResourceInfoEnd;
            }
            ScopeKind::PropertyInfo => {
                if !scope.value_written {
                    let name = scope.display_name().to_string();
                    return Err(self.fail(WriterError::invalid_state(format!(
                        "property '{name}' was announced but never given a value"
                    ))));
                }
                self.state = WriterState::PropertyEnd;
            }
        }
        if self.scopes.is_empty() {
            self.state = WriterState::Completed;
        }
        Ok(())
    }

    // ── emission helpers ────────────────────────────────────────────────

    fn check_applicability(&mut self, term: &str) -> Result<(), WriterError> {
        if self.message_kind.is_request() && RESPONSE_ONLY_TERMS.contains(&term) {
            return Err(self.fail(WriterError::invalid_state(format!(
                "annotation '{term}' is not applicable to a request payload"
            ))));
        }
        Ok(())
    }

    /// Emits `"key":` in the innermost resource scope, registering the name.
    fn member_key(&mut self, name: &str) -> Result<(), WriterError> {
        {
            let Some(scope) = self.scopes.last_mut() else {
                return Err(self.fail(WriterError::invalid_state("no open resource scope")));
            };
            if scope.kind != ScopeKind::Resource {
                return Err(self.fail(WriterError::invalid_state(
                    "a property needs an open resource scope",
                )));
            }
            if !scope.seen.insert(name.to_string()) {
                let name = name.to_string();
                return Err(self.fail(WriterError::DuplicateProperty { name }));
            }
        }
        self.raw_member_key(name);
        Ok(())
    }

    /// Emits `"key":` without registering; the caller owns duplicate checks.
    fn raw_member_key(&mut self, name: &str) {
        let needs_separator = {
            match self.scopes.last_mut() {
                Some(scope) => {
                    let needed = scope.needs_separator;
                    scope.needs_separator = true;
                    needed
                }
                None => false,
            }
        };
        if needs_separator {
            self.out.push(',');
        }
        push_quoted(&mut self.out, name);
        self.out.push(':');
    }

    fn annotation_member(
        &mut self,
        name: &str,
        term: &str,
        annotation_value: Option<&ScalarValue>,
    ) -> Result<(), WriterError> {
        self.raw_member_key(&format!("{name}@{term}"));
        match annotation_value {
            None => self.out.push_str("null"),
            Some(v) => self.push_rendered(v)?,
        }
        Ok(())
    }

    fn push_rendered(&mut self, scalar: &ScalarValue) -> Result<(), WriterError> {
        let mut rendered = String::new();
        if value::write_scalar(scalar, &mut rendered).is_err() {
            return Err(self.fail(WriterError::invalid_state(
                "value cannot be rendered on the wire",
            )));
        }
        self.out.push_str(&rendered);
        Ok(())
    }

    fn render_value(
        &mut self,
        name: &str,
        declared: Option<PrimitiveKind>,
        payload_value: &Value,
    ) -> Result<(), WriterError> {
        match payload_value {
            Value::Primitive(None) => {
                self.out.push_str("null");
                Ok(())
            }
            Value::Primitive(Some(v)) => {
                if let Some(k) = declared {
                    if !v.conforms_to(k) {
                        let actual = v.kind();
                        return Err(self.fail(WriterError::SchemaMismatch {
                            name: name.to_string(),
                            declared: k,
                            actual,
                        }));
                    }
                }
                self.push_rendered(v)
            }
            Value::Collection(items) => {
                self.out.push('[');
                let mut first = true;
                for item in items {
                    if !first {
                        self.out.push(',');
                    }
                    first = false;
                    match item {
                        Value::Primitive(None) => self.out.push_str("null"),
                        Value::Primitive(Some(v)) => {
                            if let Some(k) = declared {
                                if !v.conforms_to(k) {
                                    let actual = v.kind();
                                    return Err(self.fail(WriterError::SchemaMismatch {
                                        name: name.to_string(),
                                        declared: k,
                                        actual,
                                    }));
                                }
                            }
                            self.push_rendered(v)?;
                        }
                        Value::Collection(_) => {
                            return Err(self.fail(WriterError::invalid_state(
                                "nested collections are not supported",
                            )));
                        }
                    }
                }
                self.out.push(']');
                Ok(())
            }
        }
    }

    /// Resolves where a primitive or channel lands from the innermost scope.
    fn value_slot(&mut self) -> Result<(ValueSlot, String, Option<PrimitiveKind>), WriterError> {
        let Some(scope) = self.scopes.last() else {
            return Err(self.fail(WriterError::invalid_state(
                "no announced property or open collection",
            )));
        };
        match scope.kind {
            ScopeKind::PropertyInfo => {
                if scope.value_written {
                    let name = scope.display_name().to_string();
                    return Err(self.fail(WriterError::ValueAlreadyWritten { name }));
                }
                Ok((
                    ValueSlot::Property,
                    scope.display_name().to_string(),
                    scope.declared_kind,
                ))
            }
            ScopeKind::NestedResourceInfo if scope.is_collection => {
                if scope.value_written {
                    let name = scope.display_name().to_string();
                    return Err(self.fail(WriterError::ValueAlreadyWritten { name }));
                }
                Ok((
                    ValueSlot::CollectionElement,
                    scope.display_name().to_string(),
                    scope.element_kind,
                ))
            }
            ScopeKind::ResourceSet => Ok((
                ValueSlot::SetElement,
                scope.display_name().to_string(),
                scope.element_kind,
            )),
            _ => Err(self.fail(WriterError::invalid_state(
                "no announced property or open collection",
            ))),
        }
    }

    /// Emits the framing that precedes a value in the resolved slot and
    /// updates the scope bookkeeping.
    fn enter_value_slot(&mut self, slot: &ValueSlot) {
        match slot {
            ValueSlot::Property => {
                if let Some(scope) = self.scopes.last_mut() {
                    scope.value_written = true;
                }
            }
            ValueSlot::CollectionElement => {
                let separator = {
                    match self.scopes.last_mut() {
                        Some(scope) => {
                            let opened = scope.opened_bracket;
                            scope.opened_bracket = true;
                            let needed = scope.needs_separator;
                            scope.needs_separator = true;
                            (opened, needed)
                        }
                        None => (true, false),
                    }
                };
                if !separator.0 {
                    self.out.push('[');
                } else if separator.1 {
                    self.out.push(',');
                }
            }
            ValueSlot::SetElement => {
                let needed = {
                    match self.scopes.last_mut() {
                        Some(scope) => {
                            let needed = scope.needs_separator;
                            scope.needs_separator = true;
                            needed
                        }
                        None => false,
                    }
                };
                if needed {
                    self.out.push(',');
                }
            }
        }
    }

    fn open_channel(&mut self, text: bool) -> Result<(), WriterError> {
        self.ready()?;
        let (slot, name, declared) = self.value_slot()?;
        let kind = declared.unwrap_or(PrimitiveKind::Untyped);
        let accepted = if text {
            kind.accepts_text_channel()
        } else {
            kind.accepts_binary_channel()
        };
        if !accepted {
            return Err(self.fail(WriterError::invalid_state(format!(
                "a {kind:?} value cannot be written through this channel kind"
            ))));
        }
        self.enter_value_slot(&slot);
        self.out.push('"');
        trace!(name = %name, text, "output channel opened");
        self.channel_open = Some(name);
        self.state = WriterState::Stream;
        Ok(())
    }

    fn close_channel(&mut self) {
        self.out.push('"');
        self.channel_open = None;
        trace!("output channel closed");
    }
}

/// The scoped text channel of an announced property or collection element.
///
/// Dropping the channel without [`close`](TextValueWriter::close) abandons
/// it: every further writer call fails with
/// [`WriterError::OpenStream`].
pub struct TextValueWriter<'w, S> {
    writer: &'w mut PayloadWriter<S>,
}

impl<S: SchemaOracle> TextValueWriter<'_, S> {
    /// Appends characters to the streamed value.
    pub fn write_str(&mut self, text: &str) {
        let mut escaped = String::new();
        value::write_escaped(text, &mut escaped).expect("string writes are infallible");
        self.writer.out.push_str(&escaped);
    }

    /// Flushes and releases the channel, resuming the parent writer.
    pub fn close(self) {
        self.writer.close_channel();
    }
}

impl<S: SchemaOracle> std::fmt::Write for TextValueWriter<'_, S> {
    fn write_str(&mut self, text: &str) -> std::fmt::Result {
        TextValueWriter::write_str(self, text);
        Ok(())
    }
}

/// The scoped byte channel of an announced property or collection element.
///
/// Bytes are base64-encoded at the wire boundary. Dropping the channel
/// without [`close`](BinaryValueWriter::close) abandons it: every further
/// writer call fails with [`WriterError::OpenStream`].
pub struct BinaryValueWriter<'w, S> {
    writer: &'w mut PayloadWriter<S>,
    carry: Vec<u8>,
}

impl<S: SchemaOracle> BinaryValueWriter<'_, S> {
    /// Appends bytes to the streamed value.
    pub fn write(&mut self, bytes: &[u8]) {
        self.carry.extend_from_slice(bytes);
        let take = self.carry.len() - self.carry.len() % 3;
        if take > 0 {
            // Whole 3-byte groups encode without padding, so chunks
            // concatenate cleanly.
            self.writer.out.push_str(&BASE64.encode(&self.carry[..take]));
            self.carry.drain(..take);
        }
    }

    /// Encodes any remaining bytes, then releases the channel.
    pub fn close(self) {
        if !self.carry.is_empty() {
            self.writer.out.push_str(&BASE64.encode(&self.carry));
        }
        self.writer.close_channel();
    }
}

impl<S: SchemaOracle> io::Write for BinaryValueWriter<'_, S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        BinaryValueWriter::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn push_quoted(out: &mut String, src: &str) {
    value::write_quoted(src, out).expect("string writes are infallible");
}

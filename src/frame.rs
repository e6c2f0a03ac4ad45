//! The flattened tree encoding shared by [`FrameBuffer`](`crate::FrameBuffer`), the differ and batch consumers.
//!
//! A tree is a slice of [`Frame`]s in document order. Containers ([`FrameKind::Element`], [`FrameKind::Component`] and [`FrameKind::Region`])
//! store the length of their subtree, themselves included, so that `frames[i + subtree_length]` is the next sibling (or ancestor continuation) of `frames[i]`.

use crate::{
	component::{ComponentInstance, ComponentType},
	error::RenderError,
	frame_buffer::FrameBuffer,
};
use core::{
	any::{Any, TypeId},
	fmt::{self, Debug, Display, Formatter},
};
use futures::future::{self, FutureExt, LocalBoxFuture};
use std::rc::Rc;

pub type ComponentId = u32;
pub type EventHandlerId = u64;

/// Attribute frames inserted after the fact (see [`FrameBuffer::insert_attribute_expensive`]) carry this sequence number.
///
/// The attribute differ treats it as a signal that sequence numbers can't be trusted for the current attribute run.
pub const SYSTEM_ADDED_ATTRIBUTE_SEQUENCE: i32 = i32::MIN;

/// Asynchronous completion of component work.
pub type RenderTask = LocalBoxFuture<'static, Result<(), RenderError>>;

/// Writes a component's content into a [`FrameBuffer`].
///
/// Errors returned from here are component errors: the render is skipped and the previous tree remains current.
pub type RenderFragment = Rc<dyn Fn(&mut FrameBuffer) -> Result<(), RenderError>>;

/// An already completed [`RenderTask`].
#[must_use]
pub fn completed() -> RenderTask {
	future::ready(Ok(())).boxed_local()
}

/// An already failed [`RenderTask`].
#[must_use]
pub fn failed(error: RenderError) -> RenderTask {
	future::ready(Err(error)).boxed_local()
}

pub(crate) fn redact(text: &str) -> &str {
	if cfg!(feature = "dangerous-logging") {
		text
	} else {
		#[allow(clippy::non_ascii_literal)]
		"…"
	}
}

#[derive(Debug, Clone)]
pub struct Frame {
	pub sequence: i32,
	pub kind: FrameKind,
}

#[derive(Debug, Clone)]
pub enum FrameKind {
	Element {
		name: Rc<str>,
		subtree_length: usize,
		key: Option<Key>,
	},
	Text(Rc<str>),
	Markup(Rc<str>),
	Attribute {
		name: Rc<str>,
		value: AttributeValue,
		event_handler_id: Option<EventHandlerId>,
		/// Name of the attribute the client may overwrite when this event handler fires, for two-way bindings.
		updates_attribute_name: Option<Rc<str>>,
	},
	Component {
		component_type: ComponentType,
		subtree_length: usize,
		key: Option<Key>,
		component_id: Option<ComponentId>,
		flags: ComponentFrameFlags,
	},
	Region {
		subtree_length: usize,
	},
	ElementReferenceCapture {
		action: CaptureAction<ElementReference>,
		reference: Option<ElementReference>,
	},
	ComponentReferenceCapture {
		action: CaptureAction<ComponentInstance>,
		parent_frame_index: usize,
	},
	ComponentRenderMode(RenderMode),
	NamedEvent {
		event_type: Rc<str>,
		assigned_name: Rc<str>,
	},
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameType {
	Element,
	Text,
	Markup,
	Attribute,
	Component,
	Region,
	ElementReferenceCapture,
	ComponentReferenceCapture,
	ComponentRenderMode,
	NamedEvent,
}
impl Display for FrameType {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		Debug::fmt(self, f)
	}
}

impl Frame {
	#[must_use]
	pub fn frame_type(&self) -> FrameType {
		match self.kind {
			FrameKind::Element { .. } => FrameType::Element,
			FrameKind::Text(_) => FrameType::Text,
			FrameKind::Markup(_) => FrameType::Markup,
			FrameKind::Attribute { .. } => FrameType::Attribute,
			FrameKind::Component { .. } => FrameType::Component,
			FrameKind::Region { .. } => FrameType::Region,
			FrameKind::ElementReferenceCapture { .. } => FrameType::ElementReferenceCapture,
			FrameKind::ComponentReferenceCapture { .. } => FrameType::ComponentReferenceCapture,
			FrameKind::ComponentRenderMode(_) => FrameType::ComponentRenderMode,
			FrameKind::NamedEvent { .. } => FrameType::NamedEvent,
		}
	}

	/// The number of frames this frame spans, itself included. `1` for everything but containers.
	#[must_use]
	pub fn subtree_length(&self) -> usize {
		match self.kind {
			FrameKind::Element { subtree_length, .. } | FrameKind::Component { subtree_length, .. } | FrameKind::Region { subtree_length } => subtree_length,
			_ => 1,
		}
	}

	pub(crate) fn set_subtree_length(&mut self, length: usize) {
		match &mut self.kind {
			FrameKind::Element { subtree_length, .. } | FrameKind::Component { subtree_length, .. } | FrameKind::Region { subtree_length } => *subtree_length = length,
			_ => (),
		}
	}

	#[must_use]
	pub fn key(&self) -> Option<&Key> {
		match &self.kind {
			FrameKind::Element { key, .. } | FrameKind::Component { key, .. } => key.as_ref(),
			_ => None,
		}
	}

	#[must_use]
	pub fn is_attribute(&self) -> bool {
		matches!(self.kind, FrameKind::Attribute { .. })
	}

	#[must_use]
	pub fn attribute_name(&self) -> Option<&str> {
		match &self.kind {
			FrameKind::Attribute { name, .. } => Some(name),
			_ => None,
		}
	}

	#[must_use]
	pub fn component_id(&self) -> Option<ComponentId> {
		match self.kind {
			FrameKind::Component { component_id, .. } => component_id,
			_ => None,
		}
	}
}

/// Identity used to match siblings across renders regardless of their position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
	Int(i64),
	Str(Rc<str>),
}
impl Display for Key {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			Key::Int(int) => Display::fmt(int, f),
			Key::Str(str) => f.write_str(str),
		}
	}
}
impl From<i64> for Key {
	fn from(int: i64) -> Self {
		Self::Int(int)
	}
}
impl From<i32> for Key {
	fn from(int: i32) -> Self {
		Self::Int(int.into())
	}
}
impl From<&str> for Key {
	fn from(str: &str) -> Self {
		Self::Str(str.into())
	}
}
impl From<String> for Key {
	fn from(string: String) -> Self {
		Self::Str(string.into())
	}
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ComponentFrameFlags(u8);
impl ComponentFrameFlags {
	pub const HAS_CALLER_SPECIFIED_RENDER_MODE: Self = Self(1);

	#[must_use]
	pub fn contains(self, other: Self) -> bool {
		self.0 & other.0 == other.0
	}

	pub(crate) fn insert(&mut self, other: Self) {
		self.0 |= other.0;
	}
}

/// Opaque render mode annotation on a component frame. The renderer stores it but does not interpret it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderMode(pub Rc<str>);

/// Renderer-unique identity handed to element reference captures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ElementReference(pub u64);

pub struct CaptureAction<T>(Rc<dyn Fn(T)>);
impl<T> CaptureAction<T> {
	pub fn new(action: impl Fn(T) + 'static) -> Self {
		Self(Rc::new(action))
	}

	pub fn call(&self, value: T) {
		(self.0)(value)
	}
}
impl<T> Clone for CaptureAction<T> {
	fn clone(&self) -> Self {
		Self(Rc::clone(&self.0))
	}
}
impl<T> Debug for CaptureAction<T> {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str("CaptureAction(..)")
	}
}

/// Payload of a dispatched event.
#[derive(Clone, Default)]
pub struct EventArgs(Option<Rc<dyn Any>>);
impl EventArgs {
	#[must_use]
	pub fn empty() -> Self {
		Self(None)
	}

	pub fn new<T: Any>(payload: T) -> Self {
		Self(Some(Rc::new(payload)))
	}

	#[must_use]
	pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
		self.0.as_deref().and_then(<dyn Any>::downcast_ref::<T>)
	}
}
impl Debug for EventArgs {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("EventArgs").field(&self.0.is_some()).finish()
	}
}

/// An event handler function, optionally tagged with the component it belongs to.
///
/// Two delegates are equal only if they share the same allocation, so a closure recreated during each render counts as a changed handler.
#[derive(Clone)]
pub struct Delegate {
	target: Option<ComponentId>,
	handler: Rc<dyn Fn(EventArgs) -> RenderTask>,
}
impl Delegate {
	pub fn new(handler: impl Fn(EventArgs) -> RenderTask + 'static) -> Self {
		Self { target: None, handler: Rc::new(handler) }
	}

	/// Wraps a handler that completes synchronously.
	pub fn from_fn(handler: impl Fn(&EventArgs) + 'static) -> Self {
		Self::new(move |args| {
			handler(&args);
			completed()
		})
	}

	#[must_use]
	pub fn with_target(self, target: ComponentId) -> Self {
		Self { target: Some(target), ..self }
	}

	#[must_use]
	pub fn target(&self) -> Option<ComponentId> {
		self.target
	}

	#[must_use]
	pub fn invoke(&self, args: EventArgs) -> RenderTask {
		(self.handler)(args)
	}

	#[must_use]
	pub fn ptr_eq(&self, other: &Self) -> bool {
		self.target == other.target && Rc::ptr_eq(&self.handler, &other.handler)
	}
}
impl Debug for Delegate {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Delegate").field("target", &self.target).finish_non_exhaustive()
	}
}

/// A [`Delegate`] bound to an explicit receiving component, which gets to wrap its invocation.
///
/// Callbacks without delegate are valid placeholders. They are elided from element output.
#[derive(Debug, Clone, Default)]
pub struct EventCallback {
	pub receiver: Option<ComponentId>,
	pub delegate: Option<Delegate>,
}
impl EventCallback {
	#[must_use]
	pub fn new(receiver: Option<ComponentId>, delegate: Delegate) -> Self {
		Self { receiver, delegate: Some(delegate) }
	}

	#[must_use]
	pub fn has_delegate(&self) -> bool {
		self.delegate.is_some()
	}

	/// Whether the receiver can be recovered from the delegate alone, which is the cheaper binding.
	pub(crate) fn requires_explicit_receiver(&self) -> bool {
		match (&self.receiver, &self.delegate) {
			(Some(receiver), Some(delegate)) => delegate.target() != Some(*receiver),
			_ => false,
		}
	}
}
impl PartialEq for EventCallback {
	fn eq(&self, other: &Self) -> bool {
		self.receiver == other.receiver
			&& match (&self.delegate, &other.delegate) {
				(Some(a), Some(b)) => a.ptr_eq(b),
				(None, None) => true,
				_ => false,
			}
	}
}

#[derive(Clone)]
pub enum AttributeValue {
	Null,
	Bool(bool),
	Str(Rc<str>),
	Int(i64),
	EventCallback(EventCallback),
	Delegate(Delegate),
	Fragment(RenderFragment),
	Object(Rc<dyn Any>),
}

impl AttributeValue {
	#[must_use]
	pub fn is_event_handler(&self) -> bool {
		matches!(self, AttributeValue::EventCallback(_) | AttributeValue::Delegate(_))
	}

	#[must_use]
	pub fn as_str(&self) -> Option<&str> {
		match self {
			AttributeValue::Str(str) => Some(str),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_bool(&self) -> Option<bool> {
		match *self {
			AttributeValue::Bool(bool) => Some(bool),
			_ => None,
		}
	}

	#[must_use]
	pub fn as_fragment(&self) -> Option<&RenderFragment> {
		match self {
			AttributeValue::Fragment(fragment) => Some(fragment),
			_ => None,
		}
	}

	#[must_use]
	pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
		match self {
			AttributeValue::Object(object) => object.downcast_ref(),
			_ => None,
		}
	}

	/// The type a cascading parameter must ask for to receive this value.
	#[must_use]
	pub fn value_type_id(&self) -> Option<TypeId> {
		Some(match self {
			AttributeValue::Null => return None,
			AttributeValue::Bool(_) => TypeId::of::<bool>(),
			AttributeValue::Str(_) => TypeId::of::<str>(),
			AttributeValue::Int(_) => TypeId::of::<i64>(),
			AttributeValue::EventCallback(_) => TypeId::of::<EventCallback>(),
			AttributeValue::Delegate(_) => TypeId::of::<Delegate>(),
			AttributeValue::Fragment(_) => TypeId::of::<RenderFragment>(),
			AttributeValue::Object(object) => Any::type_id(&**object),
		})
	}
}

impl Default for AttributeValue {
	fn default() -> Self {
		Self::Null
	}
}

impl PartialEq for AttributeValue {
	fn eq(&self, other: &Self) -> bool {
		match (self, other) {
			(AttributeValue::Null, AttributeValue::Null) => true,
			(AttributeValue::Bool(a), AttributeValue::Bool(b)) => a == b,
			(AttributeValue::Str(a), AttributeValue::Str(b)) => a == b,
			(AttributeValue::Int(a), AttributeValue::Int(b)) => a == b,
			(AttributeValue::EventCallback(a), AttributeValue::EventCallback(b)) => a == b,
			(AttributeValue::Delegate(a), AttributeValue::Delegate(b)) => a.ptr_eq(b),
			(AttributeValue::Fragment(a), AttributeValue::Fragment(b)) => Rc::ptr_eq(a, b),
			(AttributeValue::Object(a), AttributeValue::Object(b)) => Rc::ptr_eq(a, b),
			_ => false,
		}
	}
}

impl Debug for AttributeValue {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			AttributeValue::Null => f.write_str("Null"),
			AttributeValue::Bool(bool) => f.debug_tuple("Bool").field(bool).finish(),
			AttributeValue::Str(str) => f.debug_tuple("Str").field(&redact(str)).finish(),
			AttributeValue::Int(int) => f.debug_tuple("Int").field(int).finish(),
			AttributeValue::EventCallback(callback) => Debug::fmt(callback, f),
			AttributeValue::Delegate(delegate) => Debug::fmt(delegate, f),
			AttributeValue::Fragment(_) => f.write_str("Fragment(..)"),
			AttributeValue::Object(_) => f.write_str("Object(..)"),
		}
	}
}

impl From<bool> for AttributeValue {
	fn from(bool: bool) -> Self {
		Self::Bool(bool)
	}
}
impl From<&str> for AttributeValue {
	fn from(str: &str) -> Self {
		Self::Str(str.into())
	}
}
impl From<String> for AttributeValue {
	fn from(string: String) -> Self {
		Self::Str(string.into())
	}
}
impl From<Rc<str>> for AttributeValue {
	fn from(str: Rc<str>) -> Self {
		Self::Str(str)
	}
}
impl From<i64> for AttributeValue {
	fn from(int: i64) -> Self {
		Self::Int(int)
	}
}
impl From<i32> for AttributeValue {
	fn from(int: i32) -> Self {
		Self::Int(int.into())
	}
}
impl From<Delegate> for AttributeValue {
	fn from(delegate: Delegate) -> Self {
		Self::Delegate(delegate)
	}
}
impl From<EventCallback> for AttributeValue {
	fn from(callback: EventCallback) -> Self {
		Self::EventCallback(callback)
	}
}
impl From<RenderFragment> for AttributeValue {
	fn from(fragment: RenderFragment) -> Self {
		Self::Fragment(fragment)
	}
}
impl<T: Into<AttributeValue>> From<Option<T>> for AttributeValue {
	fn from(value: Option<T>) -> Self {
		value.map_or(Self::Null, Into::into)
	}
}

use crate::{
	attribute_names::{AttributeName, SeenAttributeNames},
	component::{ComponentInstance, ComponentType},
	error::RenderError,
	frame::{AttributeValue, CaptureAction, ComponentFrameFlags, ElementReference, Frame, FrameKind, FrameType, Key, RenderFragment, RenderMode},
};
use hashbrown::hash_map::Entry;
use std::{borrow::Cow, rc::Rc};
use tracing::trace;

/// Append-only writer for one render pass of a component.
///
/// Containers are opened and closed explicitly. Closing a container stores its subtree length.
///
/// # Correct Use
///
/// Structural misuse (an attribute with no element to attach to, closing nothing, keys on text…) doesn't panic.
/// The first such mistake is remembered and reported by [`FrameBuffer::validate`], which the renderer calls after each render fragment.
/// Output produced after a mistake is not meaningful.
#[derive(Debug, Default)]
pub struct FrameBuffer {
	entries: Vec<Frame>,
	open_container_indices: Vec<usize>,
	last_non_attribute_frame_type: Option<FrameType>,
	has_seen_multiple_attributes: bool,
	seen_attribute_names: SeenAttributeNames,
	error: Option<RenderError>,
}

impl FrameBuffer {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	#[must_use]
	pub fn frames(&self) -> &[Frame] {
		&self.entries
	}

	pub(crate) fn frames_mut(&mut self) -> &mut [Frame] {
		&mut self.entries
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Resets the buffer for another render while keeping its allocations.
	pub fn clear(&mut self) {
		self.entries.clear();
		self.open_container_indices.clear();
		self.last_non_attribute_frame_type = None;
		self.has_seen_multiple_attributes = false;
		self.seen_attribute_names.clear();
		self.error = None;
	}

	/// Checks that every container was closed and that no operation was misused.
	///
	/// # Errors
	///
	/// [`RenderError::UnclosedFrame`] for the innermost open container, or the first recorded misuse.
	pub fn validate(&self, component_type: &'static str) -> Result<(), RenderError> {
		if let Some(error) = &self.error {
			return Err(error.clone());
		}
		match self.open_container_indices.last() {
			Some(&index) => Err(RenderError::UnclosedFrame {
				component_type: component_type.into(),
				frame_type: self.entries[index].frame_type(),
			}),
			None => Ok(()),
		}
	}

	fn fail(&mut self, message: impl Into<Cow<'static, str>>) {
		if self.error.is_none() {
			let message = message.into();
			trace!("Recording frame buffer misuse: {}", message);
			self.error = Some(RenderError::InvalidRenderTree(message));
		}
	}

	fn append(&mut self, sequence: i32, kind: FrameKind) {
		self.entries.push(Frame { sequence, kind });
	}

	fn parent_frame_type(&self) -> Option<FrameType> {
		self.open_container_indices.last().map(|&index| self.entries[index].frame_type())
	}

	fn open_container(&mut self, sequence: i32, kind: FrameKind) {
		self.end_attribute_run();
		let frame_type = {
			let index = self.entries.len();
			self.open_container_indices.push(index);
			self.append(sequence, kind);
			self.entries[index].frame_type()
		};
		self.last_non_attribute_frame_type = Some(frame_type);
	}

	fn close_container(&mut self, expected: FrameType) {
		let index = match self.open_container_indices.pop() {
			Some(index) => index,
			None => return self.fail(format!("Cannot close a frame of type '{}' because no frame is open.", expected)),
		};
		if self.has_seen_multiple_attributes {
			self.process_duplicate_attributes(index + 1);
		}

		let actual = self.entries[index].frame_type();
		if actual != expected {
			self.fail(format!("Cannot close a frame of type '{}' as a frame of type '{}'.", actual, expected));
		}
		let length = self.entries.len() - index;
		self.entries[index].set_subtree_length(length);
		self.last_non_attribute_frame_type = None;
	}

	pub fn open_element(&mut self, sequence: i32, name: impl Into<Rc<str>>) {
		self.open_container(
			sequence,
			FrameKind::Element {
				name: name.into(),
				subtree_length: 0,
				key: None,
			},
		);
	}

	pub fn close_element(&mut self) {
		self.close_container(FrameType::Element);
	}

	pub fn open_component(&mut self, sequence: i32, component_type: ComponentType) {
		self.open_container(
			sequence,
			FrameKind::Component {
				component_type,
				subtree_length: 0,
				key: None,
				component_id: None,
				flags: ComponentFrameFlags::default(),
			},
		);
	}

	pub fn close_component(&mut self) {
		self.close_container(FrameType::Component);
	}

	/// Regions group siblings without adding a node to the output. Their sequence numbers form an independent numbering scope.
	pub fn open_region(&mut self, sequence: i32) {
		self.open_container(sequence, FrameKind::Region { subtree_length: 0 });
	}

	pub fn close_region(&mut self) {
		self.close_container(FrameType::Region);
	}

	pub fn add_text(&mut self, sequence: i32, text: impl Into<Rc<str>>) {
		self.end_attribute_run();
		self.append(sequence, FrameKind::Text(text.into()));
		self.last_non_attribute_frame_type = Some(FrameType::Text);
	}

	/// Adds raw markup, which consumers must not escape.
	pub fn add_markup(&mut self, sequence: i32, markup: impl Into<Rc<str>>) {
		self.end_attribute_run();
		self.append(sequence, FrameKind::Markup(markup.into()));
		self.last_non_attribute_frame_type = Some(FrameType::Markup);
	}

	/// Writes `fragment` into a region at `sequence`.
	///
	/// # Errors
	///
	/// Whatever `fragment` returns. The region is closed either way.
	pub fn add_content(&mut self, sequence: i32, fragment: &RenderFragment) -> Result<(), RenderError> {
		self.open_region(sequence);
		let result = fragment(self);
		self.close_region();
		result
	}

	/// Adds an attribute to the element or component that was opened last.
	///
	/// On elements, [`AttributeValue::Null`], `false` and [`EventCallback`](`crate::EventCallback`)s without delegate write no frame at all,
	/// but still override earlier attributes of the same name when combined with [`FrameBuffer::add_multiple_attributes`].
	/// Integers are converted to strings.
	///
	/// Component parameters are always written as they are.
	pub fn add_attribute(&mut self, sequence: i32, name: impl Into<Rc<str>>, value: impl Into<AttributeValue>) {
		let name = name.into();
		let value = value.into();
		match self.last_non_attribute_frame_type {
			Some(FrameType::Element) => {
				let value = match value {
					AttributeValue::Null | AttributeValue::Bool(false) => return self.track_attribute_name(name),
					AttributeValue::EventCallback(ref callback) if !callback.has_delegate() => return self.track_attribute_name(name),
					AttributeValue::Int(int) => AttributeValue::Str(int.to_string().into()),
					value => value,
				};
				self.append_attribute(sequence, name, value);
			}
			Some(FrameType::Component) => self.append_attribute(sequence, name, value),
			_ => self.fail("Attributes may only be added immediately after frames of type Element or Component."),
		}
	}

	/// Copies the name and value of an existing attribute frame.
	pub fn add_attribute_frame(&mut self, sequence: i32, frame: &Frame) {
		match &frame.kind {
			FrameKind::Attribute { name, value, .. } => self.add_attribute(sequence, Rc::clone(name), value.clone()),
			_ => self.fail(format!("The frame's type must be 'Attribute', but was '{}'.", frame.frame_type())),
		}
	}

	/// Spreads `attributes` onto the element or component that was opened last.
	///
	/// Once this has been used for a container, attribute names on it become unique (ASCII-case-insensitively) when its attribute run ends.
	/// The last occurrence of each name wins, including elided ones, and the order of the survivors is preserved.
	pub fn add_multiple_attributes<N, V>(&mut self, sequence: i32, attributes: impl IntoIterator<Item = (N, V)>)
	where
		N: Into<Rc<str>>,
		V: Into<AttributeValue>,
	{
		if !matches!(self.last_non_attribute_frame_type, Some(FrameType::Element | FrameType::Component)) {
			return self.fail("Attributes may only be added immediately after frames of type Element or Component.");
		}

		self.has_seen_multiple_attributes = true;
		for (name, value) in attributes {
			self.add_attribute(sequence, name, value);
		}
	}

	pub fn add_component_parameter(&mut self, sequence: i32, name: impl Into<Rc<str>>, value: impl Into<AttributeValue>) {
		if self.last_non_attribute_frame_type != Some(FrameType::Component) {
			return self.fail("Component parameters may only be added immediately after frames of type Component.");
		}
		self.append_attribute(sequence, name.into(), value.into());
	}

	/// Marks the attribute that was added last as an event handler whose firing may update the attribute `name` on the client.
	pub fn set_updates_attribute_name(&mut self, name: impl Into<Rc<str>>) {
		match self.entries.last_mut() {
			Some(Frame {
				kind: FrameKind::Attribute { updates_attribute_name, .. },
				..
			}) => *updates_attribute_name = Some(name.into()),
			Some(frame) => {
				let frame_type = frame.frame_type();
				self.fail(format!("Incorrect frame type: '{}'", frame_type));
			}
			None => self.fail("No preceding attribute frame exists."),
		}
	}

	/// Sets the identity key of the innermost open element or component.
	pub fn set_key(&mut self, key: impl Into<Key>) {
		let index = match self.open_container_indices.last() {
			Some(&index) => index,
			None => return self.fail("Cannot set a key outside the scope of a component or element."),
		};
		match &mut self.entries[index].kind {
			FrameKind::Element { key: slot, .. } | FrameKind::Component { key: slot, .. } => *slot = Some(key.into()),
			_ => {
				let frame_type = self.entries[index].frame_type();
				self.fail(format!("Cannot set a key on a frame of type {}.", frame_type));
			}
		}
	}

	pub fn add_element_reference_capture(&mut self, sequence: i32, action: impl Fn(ElementReference) + 'static) {
		if self.parent_frame_type() != Some(FrameType::Element) {
			return self.fail("Element reference captures may only be added as children of frames of type Element.");
		}
		self.end_attribute_run();
		self.append(
			sequence,
			FrameKind::ElementReferenceCapture {
				action: CaptureAction::new(action),
				reference: None,
			},
		);
		self.last_non_attribute_frame_type = Some(FrameType::ElementReferenceCapture);
	}

	pub fn add_component_reference_capture(&mut self, sequence: i32, action: impl Fn(ComponentInstance) + 'static) {
		let parent_frame_index = match self.open_container_indices.last() {
			Some(&index) if self.entries[index].frame_type() == FrameType::Component => index,
			_ => return self.fail("Component reference captures may only be added as children of frames of type Component."),
		};
		self.end_attribute_run();
		self.append(
			sequence,
			FrameKind::ComponentReferenceCapture {
				action: CaptureAction::new(action),
				parent_frame_index,
			},
		);
		self.last_non_attribute_frame_type = Some(FrameType::ComponentReferenceCapture);
	}

	/// Annotates the innermost open component with a render mode. `None` does nothing.
	///
	/// No further parameters may be added to that component afterwards.
	pub fn add_component_render_mode(&mut self, render_mode: Option<RenderMode>) {
		let render_mode = match render_mode {
			Some(render_mode) => render_mode,
			None => return,
		};
		match self.open_container_indices.last().map(|&index| &mut self.entries[index].kind) {
			Some(FrameKind::Component { flags, .. }) => flags.insert(ComponentFrameFlags::HAS_CALLER_SPECIFIED_RENDER_MODE),
			_ => return self.fail("The enclosing frame is not of the required type 'Component'."),
		}
		self.end_attribute_run();
		self.append(0, FrameKind::ComponentRenderMode(render_mode));
		self.last_non_attribute_frame_type = Some(FrameType::ComponentRenderMode);
	}

	/// Assigns a name to an event on the innermost open element, for consumers that route events by name.
	pub fn add_named_event(&mut self, event_type: impl Into<Rc<str>>, assigned_name: impl Into<Rc<str>>) {
		let (event_type, assigned_name) = (event_type.into(), assigned_name.into());
		if event_type.is_empty() {
			return self.fail("A named event requires an event type.");
		}
		if assigned_name.is_empty() {
			return self.fail("A named event requires a non-empty assigned name.");
		}
		if self.parent_frame_type() != Some(FrameType::Element) {
			return self.fail("Named events may only be added as children of frames of type Element.");
		}
		self.end_attribute_run();
		self.append(0, FrameKind::NamedEvent { event_type, assigned_name });
		self.last_non_attribute_frame_type = Some(FrameType::NamedEvent);
	}

	/// Splices an attribute frame in at `insert_at` after the fact and extends every enclosing container by one.
	///
	/// This is linear in the buffer length and meant for rare patches, like matching client-side field state.
	///
	/// # Errors
	///
	/// Iff `insert_at` is not within the attribute run of an element.
	pub fn insert_attribute_expensive(&mut self, insert_at: usize, sequence: i32, name: impl Into<Rc<str>>, value: impl Into<AttributeValue>) -> Result<(), RenderError> {
		match insert_at.checked_sub(1).and_then(|previous| self.entries.get(previous)) {
			Some(Frame {
				kind: FrameKind::Element { .. } | FrameKind::Attribute { .. },
				..
			}) => (),
			_ => return Err(RenderError::InvalidRenderTree("Attributes can only be inserted into the attribute run of an element.".into())),
		}

		self.entries.insert(
			insert_at,
			Frame {
				sequence,
				kind: FrameKind::Attribute {
					name: name.into(),
					value: value.into(),
					event_handler_id: None,
					updates_attribute_name: None,
				},
			},
		);

		// Ancestors can only come before the insertion point.
		for (index, frame) in self.entries[..insert_at].iter_mut().enumerate().rev() {
			if matches!(frame.kind, FrameKind::Element { .. } | FrameKind::Region { .. }) {
				let length = frame.subtree_length();
				if index + length >= insert_at {
					frame.set_subtree_length(length + 1);
				}
			}
		}
		Ok(())
	}

	fn append_attribute(&mut self, sequence: i32, name: Rc<str>, value: AttributeValue) {
		self.append(
			sequence,
			FrameKind::Attribute {
				name,
				value,
				event_handler_id: None,
				updates_attribute_name: None,
			},
		);
	}

	fn track_attribute_name(&mut self, name: Rc<str>) {
		if self.has_seen_multiple_attributes {
			// Elided attributes claim the slot their frame would have had.
			let index = self.entries.len();
			self.seen_attribute_names.insert(AttributeName(name), index);
		}
	}

	fn end_attribute_run(&mut self) {
		if self.has_seen_multiple_attributes {
			let first = self.open_container_indices.last().map_or(0, |&index| index + 1);
			self.process_duplicate_attributes(first);
		}
	}

	fn process_duplicate_attributes(&mut self, first: usize) {
		let last = self.entries[first..].iter().position(|frame| !frame.is_attribute()).map_or(self.entries.len(), |offset| first + offset);

		let mut overridden = Vec::new();
		for index in (first..last).rev() {
			let name = match &self.entries[index].kind {
				FrameKind::Attribute { name, .. } => AttributeName(Rc::clone(name)),
				_ => continue,
			};
			match self.seen_attribute_names.entry(name) {
				Entry::Vacant(vacant) => {
					vacant.insert(index);
				}
				Entry::Occupied(mut occupied) => {
					let winner = *occupied.get();
					if winner < index {
						// Overrides an elided attribute. Keep tracking in case the name appears a third time.
						occupied.insert(index);
					} else if winner > index {
						overridden.push(index);
					}
					// `winner == index` is an elided attribute directly followed by this frame, which overrides nothing.
				}
			}
		}

		if !overridden.is_empty() {
			trace!("Removing {} overridden attribute frame(s).", overridden.len());
			let mut overridden = overridden.into_iter().rev().peekable();
			let mut index = 0;
			self.entries.retain(|_| {
				let keep = overridden.peek() != Some(&index);
				if !keep {
					overridden.next();
				}
				index += 1;
				keep
			});
		}

		self.seen_attribute_names.clear();
		self.has_seen_multiple_attributes = false;
	}
}

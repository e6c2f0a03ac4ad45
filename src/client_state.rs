//! Brings a rendered tree in line with field state the client reports alongside an event.
//!
//! Without this, a value the user typed into a bound field would not count as a change when the component re-renders its old value.

use crate::{
	error::RenderError,
	frame::{AttributeValue, EventHandlerId, FrameKind, SYSTEM_ADDED_ATTRIBUTE_SEQUENCE},
	frame_buffer::FrameBuffer,
};
use std::rc::Rc;
use tracing::trace;

/// Field state reported by the client. Only strings and booleans ever reach attributes the client can edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
	Str(Rc<str>),
	Bool(bool),
}
impl From<FieldValue> for AttributeValue {
	fn from(value: FieldValue) -> Self {
		match value {
			FieldValue::Str(str) => AttributeValue::Str(str),
			FieldValue::Bool(bool) => AttributeValue::Bool(bool),
		}
	}
}
impl From<&str> for FieldValue {
	fn from(str: &str) -> Self {
		Self::Str(str.into())
	}
}
impl From<bool> for FieldValue {
	fn from(bool: bool) -> Self {
		Self::Bool(bool)
	}
}

/// Finds the attribute frame bound to `event_handler_id` and, if it names an attribute it updates,
/// overwrites that attribute on the same element with `value` (or inserts it if the element doesn't have it).
///
/// Returns whether the buffer was changed.
///
/// # Errors
///
/// Iff the attribute would have to be inserted outside of an element.
pub fn update_to_match_client_state(buffer: &mut FrameBuffer, event_handler_id: EventHandlerId, value: &FieldValue) -> Result<bool, RenderError> {
	let frames = buffer.frames();
	let mut closest_element = None;
	let mut target = None;
	for (index, frame) in frames.iter().enumerate() {
		match &frame.kind {
			FrameKind::Element { .. } => closest_element = Some(index),
			FrameKind::Attribute {
				event_handler_id: Some(id),
				updates_attribute_name,
				..
			} if *id == event_handler_id => {
				target = updates_attribute_name.clone();
				break;
			}
			_ => (),
		}
	}

	let (element_index, attribute_name) = match (closest_element, target) {
		(Some(element_index), Some(attribute_name)) => (element_index, attribute_name),
		_ => return Ok(false),
	};

	let end = element_index + frames[element_index].subtree_length();
	let existing = frames[element_index + 1..end]
		.iter()
		.take_while(|frame| frame.is_attribute())
		.position(|frame| frame.attribute_name() == Some(&*attribute_name))
		.map(|offset| element_index + 1 + offset);

	match existing {
		Some(index) => {
			trace!("Updating attribute at frame {} to match client state.", index);
			if let FrameKind::Attribute { value: slot, .. } = &mut buffer.frames_mut()[index].kind {
				*slot = value.clone().into();
			}
		}
		None => {
			trace!("Inserting attribute into element at frame {} to match client state.", element_index);
			buffer.insert_attribute_expensive(element_index + 1, SYSTEM_ADDED_ATTRIBUTE_SEQUENCE, attribute_name, value.clone())?;
		}
	}
	Ok(true)
}

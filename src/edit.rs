//! The output of a render pass, as seen by the host.

use crate::frame::{ComponentId, EventHandlerId, Frame};
use std::rc::Rc;

/// One instruction of a component's edit script.
///
/// Sibling indices are relative to the current parent, which starts out as the component's own root
/// and is changed by [`RenderTreeEdit::StepIn`] and [`RenderTreeEdit::StepOut`].
/// Reference frame indices point into [`RenderBatch::reference_frames`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderTreeEdit {
	/// Insert the subtree rooted at the reference frame before the sibling at `sibling_index`.
	PrependFrame { sibling_index: usize, reference_frame_index: usize },
	RemoveFrame { sibling_index: usize },
	SetAttribute { sibling_index: usize, reference_frame_index: usize },
	RemoveAttribute { sibling_index: usize, removed_attribute_name: Rc<str> },
	UpdateText { sibling_index: usize, reference_frame_index: usize },
	UpdateMarkup { sibling_index: usize, reference_frame_index: usize },
	StepIn { sibling_index: usize },
	StepOut,
	/// Moves an existing node. All entries of a list refer to positions before any of them are applied.
	PermutationListEntry { from_sibling_index: usize, to_sibling_index: usize },
	PermutationListEnd,
}

#[derive(Debug, Clone)]
pub struct RenderTreeDiff {
	pub component_id: ComponentId,
	pub edits: Vec<RenderTreeEdit>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedEventChangeType {
	Added,
	Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedEventChange {
	pub change_type: NamedEventChangeType,
	pub component_id: ComponentId,
	/// Index of the named event frame in the component's new (when added) or old (when removed) tree.
	pub frame_index: usize,
	pub event_type: Rc<str>,
	pub assigned_name: Rc<str>,
}

/// Everything one flush of the render queue changed.
#[derive(Debug, Clone, Default)]
pub struct RenderBatch {
	/// Increases by one with every batch a renderer produces.
	pub batch_id: u64,
	pub updated_components: Vec<RenderTreeDiff>,
	pub reference_frames: Vec<Frame>,
	pub disposed_component_ids: Vec<ComponentId>,
	pub disposed_event_handler_ids: Vec<EventHandlerId>,
	pub named_event_changes: Vec<NamedEventChange>,
}

impl RenderBatch {
	/// The edits for `component_id`, concatenated in the order they were produced.
	pub fn edits_for(&self, component_id: ComponentId) -> impl Iterator<Item = &RenderTreeEdit> {
		self.updated_components.iter().filter(move |diff| diff.component_id == component_id).flat_map(|diff| diff.edits.iter())
	}
}

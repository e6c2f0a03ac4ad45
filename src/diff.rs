//! Computes the edit script that turns a component's previous frame tree into its next one.
//!
//! Siblings are matched by [`Key`] where either side carries one and by sequence number otherwise.
//! New subtrees are initialized on the way: child components are instantiated, event handlers receive IDs and reference captures are scheduled.
//! Anything that calls back into component code is recorded as a [`DeferredAction`] instead of being run here.

use crate::{
	batch::{DeferredAction, KeyedItemInfo, KeyedItemInfos, RenderBatchBuilder},
	component::ParameterView,
	edit::{NamedEventChange, NamedEventChangeType, RenderTreeDiff, RenderTreeEdit},
	error::RenderError,
	frame::{redact, ComponentId, Frame, FrameKind, FrameType, Key, SYSTEM_ADDED_ATTRIBUTE_SEQUENCE},
	renderer::RendererCore,
};
use std::rc::Rc;
use tracing::{error, trace, trace_span};

/// Diffs `old_tree` against `new_tree` for `component_id`.
///
/// `new_tree` is updated in place with assigned event handler IDs, element references and child component IDs,
/// some of which are carried over from `old_tree`.
pub(crate) fn compute_diff(renderer: &mut RendererCore, batch: &mut RenderBatchBuilder, component_id: ComponentId, old_tree: &[Frame], new_tree: &mut [Frame]) -> Result<RenderTreeDiff, RenderError> {
	let span = trace_span!("Diffing component", component_id, "old_tree.len()" = old_tree.len(), "new_tree.len()" = new_tree.len());
	let _enter = span.enter();

	let (old_len, new_len) = (old_tree.len(), new_tree.len());
	let mut context = DiffContext {
		renderer,
		batch,
		component_id,
		old_tree,
		new_tree,
		edits: Vec::new(),
		sibling_index: 0,
	};
	context.append_diff_entries_for_range(0, old_len, 0, new_len)?;
	trace!("Produced {} edit(s).", context.edits.len());

	Ok(RenderTreeDiff {
		component_id,
		edits: context.edits,
	})
}

/// Queues everything `frames` owns for disposal: child components, event handler IDs and named events.
pub(crate) fn dispose_frames(batch: &mut RenderBatchBuilder, component_id: ComponentId, frames: &[Frame]) {
	dispose_frames_in_range(batch, component_id, frames, 0, frames.len());
}

fn dispose_frames_in_range(batch: &mut RenderBatchBuilder, component_id: ComponentId, frames: &[Frame], start: usize, end: usize) {
	for (index, frame) in frames.iter().enumerate().take(end).skip(start) {
		match &frame.kind {
			FrameKind::Component {
				component_id: Some(child_id), ..
			} => batch.component_disposal_queue.push_back(*child_id),
			FrameKind::Attribute {
				event_handler_id: Some(event_handler_id),
				..
			} => batch.disposed_event_handler_ids.push(*event_handler_id),
			FrameKind::NamedEvent { event_type, assigned_name } => batch.named_event_changes.push(NamedEventChange {
				change_type: NamedEventChangeType::Removed,
				component_id,
				frame_index: index,
				event_type: Rc::clone(event_type),
				assigned_name: Rc::clone(assigned_name),
			}),
			_ => (),
		}
	}
}

fn next_sibling_index(frame: &Frame, index: usize) -> usize {
	index + frame.subtree_length()
}

/// One past the attribute run that directly follows the container at `index`.
fn attributes_end(tree: &[Frame], index: usize) -> usize {
	let end = index + tree[index].subtree_length();
	let mut i = index + 1;
	while i < end && tree[i].is_attribute() {
		i += 1;
	}
	i
}

#[derive(Debug, Clone, Copy)]
enum DiffAction {
	Match,
	Insert,
	Delete,
}

struct DiffContext<'a> {
	renderer: &'a mut RendererCore,
	batch: &'a mut RenderBatchBuilder,
	component_id: ComponentId,
	old_tree: &'a [Frame],
	new_tree: &'a mut [Frame],
	edits: Vec<RenderTreeEdit>,
	sibling_index: usize,
}

impl<'a> DiffContext<'a> {
	fn append_diff_entries_for_range(&mut self, old_start: usize, old_end: usize, new_start: usize, new_end: usize) -> Result<(), RenderError> {
		let mut keyed_item_infos = None;
		let result = self.diff_siblings(old_start, old_end, new_start, new_end, &mut keyed_item_infos);
		if let Some(keyed_item_infos) = keyed_item_infos {
			self.batch.keyed_item_infos.put(keyed_item_infos);
		}
		result
	}

	#[allow(clippy::too_many_lines)]
	fn diff_siblings(
		&mut self,
		mut old_start: usize,
		old_end: usize,
		mut new_start: usize,
		new_end: usize,
		keyed_item_infos: &mut Option<KeyedItemInfos>,
	) -> Result<(), RenderError> {
		let old_tree = self.old_tree;
		let (orig_old_start, orig_new_start) = (old_start, new_start);
		let mut has_more_old = old_end > old_start;
		let mut has_more_new = new_end > new_start;
		// `i64::MIN` means "not inside a loop block yet".
		let mut prev_old_seq = i64::MIN;
		let mut prev_new_seq = i64::MIN;

		while has_more_old || has_more_new {
			let (old_seq, old_key) = if has_more_old {
				let frame = &old_tree[old_start];
				(i64::from(frame.sequence), frame.key().cloned())
			} else {
				(i64::MAX, None)
			};
			let (new_seq, new_key) = if has_more_new {
				let frame = &self.new_tree[new_start];
				(i64::from(frame.sequence), frame.key().cloned())
			} else {
				(i64::MAX, None)
			};

			let mut match_with_new_index = new_start;
			let action = if old_key.is_some() || new_key.is_some() {
				let infos = match keyed_item_infos.take() {
					Some(infos) => infos,
					None => self.build_key_to_info_lookup(orig_old_start, old_end, orig_new_start, new_end)?,
				};
				let infos = keyed_item_infos.insert(infos);

				if old_key == new_key {
					DiffAction::Match
				} else {
					let old_info = old_key.as_ref().and_then(|key| infos.get(key)).copied().unwrap_or_default();
					let new_info = new_key.as_ref().and_then(|key| infos.get(key)).copied().unwrap_or_default();
					let old_key_in_new_tree = old_info.new_index.is_some();
					let new_key_in_old_tree = new_info.old_index.is_some();

					if let (true, true, Some(old_key), Some(new_key), Some(moved_to)) = (old_key_in_new_tree, new_key_in_old_tree, &old_key, &new_key, old_info.new_index) {
						// A move: Update the item already sitting at this position in place, then permute afterwards.
						// The sibling index only grows from here, so these positions stay valid.
						match_with_new_index = moved_to;
						if let Some(info) = infos.get_mut(old_key) {
							info.old_sibling_index = Some(self.sibling_index);
						}
						if let Some(info) = infos.get_mut(new_key) {
							info.new_sibling_index = Some(self.sibling_index);
						}
						DiffAction::Match
					} else if !has_more_new || (has_more_old && new_key_in_old_tree) {
						DiffAction::Delete
					} else {
						// Either an insertion or both an insertion and a deletion. The latter is picked up on the next iteration.
						DiffAction::Insert
					}
				}
			} else if old_seq == new_seq {
				DiffAction::Match
			} else {
				let old_looped_back = old_seq <= prev_old_seq;
				let new_looped_back = new_seq <= prev_new_seq;
				if old_looped_back == new_looped_back {
					if old_looped_back {
						prev_old_seq = i64::MIN;
						prev_new_seq = i64::MIN;
					}
					if new_seq < old_seq {
						DiffAction::Insert
					} else {
						DiffAction::Delete
					}
				} else if old_looped_back {
					// Either the new side has extra trailing items in the current loop block, or the old side has extra trailing loop blocks.
					let new_loops_back_later = self.new_tree.iter().take(new_end).skip(new_start + 1).any(|frame| i64::from(frame.sequence) < new_seq);
					if new_loops_back_later {
						DiffAction::Insert
					} else {
						DiffAction::Delete
					}
				} else {
					let old_loops_back_later = old_tree.iter().take(old_end).skip(old_start + 1).any(|frame| i64::from(frame.sequence) < old_seq);
					if old_loops_back_later {
						DiffAction::Delete
					} else {
						DiffAction::Insert
					}
				}
			};

			if cfg!(feature = "log-paths") {
				trace!(?action, old_start, new_start, old_seq, new_seq, sibling_index = self.sibling_index);
			}

			match action {
				DiffAction::Match => {
					self.append_diff_entries_for_frames_with_same_sequence(old_start, match_with_new_index)?;
					old_start = next_sibling_index(&old_tree[old_start], old_start);
					new_start = next_sibling_index(&self.new_tree[new_start], new_start);
					has_more_old = old_end > old_start;
					has_more_new = new_end > new_start;
					prev_old_seq = old_seq;
					prev_new_seq = new_seq;
				}
				DiffAction::Insert => {
					self.insert_new_frame(new_start)?;
					new_start = next_sibling_index(&self.new_tree[new_start], new_start);
					has_more_new = new_end > new_start;
					prev_new_seq = new_seq;
				}
				DiffAction::Delete => {
					self.remove_old_frame(old_start);
					old_start = next_sibling_index(&old_tree[old_start], old_start);
					has_more_old = old_end > old_start;
					prev_old_seq = old_seq;
				}
			}
		}

		if let Some(infos) = keyed_item_infos {
			let mut permutations: Vec<_> = infos
				.values()
				.filter_map(|info| match (info.old_sibling_index, info.new_sibling_index) {
					(Some(from), Some(to)) => Some((from, to)),
					_ => None,
				})
				.collect();
			if !permutations.is_empty() {
				permutations.sort_unstable();
				trace!("Moving {} keyed sibling(s).", permutations.len());
				self.edits.extend(permutations.into_iter().map(|(from_sibling_index, to_sibling_index)| RenderTreeEdit::PermutationListEntry {
					from_sibling_index,
					to_sibling_index,
				}));
				self.edits.push(RenderTreeEdit::PermutationListEnd);
			}
		}

		Ok(())
	}

	fn build_key_to_info_lookup(&mut self, mut old_start: usize, old_end: usize, mut new_start: usize, new_end: usize) -> Result<KeyedItemInfos, RenderError> {
		let mut infos = self.batch.keyed_item_infos.get();
		match self.fill_key_to_info_lookup(&mut infos, &mut old_start, old_end, &mut new_start, new_end) {
			Ok(()) => Ok(infos),
			Err(error) => {
				self.batch.keyed_item_infos.put(infos);
				Err(error)
			}
		}
	}

	fn fill_key_to_info_lookup(&self, infos: &mut KeyedItemInfos, old_start: &mut usize, old_end: usize, new_start: &mut usize, new_end: usize) -> Result<(), RenderError> {
		while *old_start < old_end {
			let frame = &self.old_tree[*old_start];
			if let Some(key) = frame.key() {
				if infos.contains_key(key) {
					return Err(duplicate_key(key));
				}
				infos.insert(
					key.clone(),
					KeyedItemInfo {
						old_index: Some(*old_start),
						..KeyedItemInfo::default()
					},
				);
			}
			*old_start = next_sibling_index(frame, *old_start);
		}

		while *new_start < new_end {
			let frame = &self.new_tree[*new_start];
			if let Some(key) = frame.key() {
				let info = infos.entry(key.clone()).or_default();
				if info.new_index.is_some() {
					return Err(duplicate_key(key));
				}
				info.new_index = Some(*new_start);
			}
			*new_start = next_sibling_index(frame, *new_start);
		}

		Ok(())
	}

	#[allow(clippy::too_many_lines)]
	fn append_diff_entries_for_frames_with_same_sequence(&mut self, old_index: usize, new_index: usize) -> Result<(), RenderError> {
		let old_tree = self.old_tree;
		let old_frame = &old_tree[old_index];
		let new_type = self.new_tree[new_index].frame_type();

		// Can happen with hand-written sequence numbers or when dissimilar frames share a key.
		if old_frame.frame_type() != new_type {
			self.insert_new_frame(new_index)?;
			self.remove_old_frame(old_index);
			return Ok(());
		}

		match (&old_frame.kind, &self.new_tree[new_index].kind) {
			(FrameKind::Text(old_text), FrameKind::Text(new_text)) => {
				if old_text != new_text {
					let reference_frame_index = self.append_reference_frames(new_index, 1);
					self.edits.push(RenderTreeEdit::UpdateText {
						sibling_index: self.sibling_index,
						reference_frame_index,
					});
				}
				self.sibling_index += 1;
			}

			(FrameKind::Markup(old_markup), FrameKind::Markup(new_markup)) => {
				if old_markup != new_markup {
					let reference_frame_index = self.append_reference_frames(new_index, 1);
					self.edits.push(RenderTreeEdit::UpdateMarkup {
						sibling_index: self.sibling_index,
						reference_frame_index,
					});
				}
				self.sibling_index += 1;
			}

			(FrameKind::Element { name: old_name, .. }, FrameKind::Element { name: new_name, .. }) => {
				if old_name != new_name {
					let span = trace_span!("Element name changed", old_name = redact(old_name), new_name = redact(new_name));
					let _enter = span.enter();
					self.remove_old_frame(old_index);
					self.insert_new_frame(new_index)?;
					return Ok(());
				}

				let old_attributes_end = attributes_end(old_tree, old_index);
				let new_attributes_end = attributes_end(&*self.new_tree, new_index);
				self.append_diff_entries_for_attributes(old_index + 1, old_attributes_end, new_index + 1, new_attributes_end)?;

				let old_children_end = old_index + old_frame.subtree_length();
				let new_children_end = new_index + self.new_tree[new_index].subtree_length();
				if old_children_end > old_attributes_end || new_children_end > new_attributes_end {
					self.edits.push(RenderTreeEdit::StepIn { sibling_index: self.sibling_index });
					let prev_sibling_index = self.sibling_index;
					self.sibling_index = 0;
					self.append_diff_entries_for_range(old_attributes_end, old_children_end, new_attributes_end, new_children_end)?;
					self.append_step_out();
					self.sibling_index = prev_sibling_index;
				}
				self.sibling_index += 1;
			}

			(FrameKind::Region { subtree_length: old_length }, FrameKind::Region { subtree_length: new_length }) => {
				let (old_end, new_end) = (old_index + old_length, new_index + new_length);
				self.append_diff_entries_for_range(old_index + 1, old_end, new_index + 1, new_end)?;
			}

			(
				FrameKind::Component {
					component_type: old_type, ..
				},
				FrameKind::Component {
					component_type: new_type, ..
				},
			) => {
				if old_type == new_type {
					self.update_retained_child_component(old_index, new_index)?;
					self.sibling_index += 1;
				} else {
					self.remove_old_frame(old_index);
					self.insert_new_frame(new_index)?;
				}
			}

			// Reference captures fire once per element. The new frame only inherits the identity.
			(FrameKind::ElementReferenceCapture { reference, .. }, FrameKind::ElementReferenceCapture { .. }) => {
				let reference = *reference;
				if let FrameKind::ElementReferenceCapture { reference: new_reference, .. } = &mut self.new_tree[new_index].kind {
					*new_reference = reference;
				}
			}

			(
				FrameKind::NamedEvent {
					assigned_name: old_assigned_name,
					..
				},
				FrameKind::NamedEvent {
					assigned_name: new_assigned_name,
					..
				},
			) => {
				if old_index != new_index || old_assigned_name != new_assigned_name {
					self.remove_named_event(old_index);
					self.add_named_event(new_index);
				}
			}

			(FrameKind::ComponentReferenceCapture { .. }, FrameKind::ComponentReferenceCapture { .. }) | (FrameKind::ComponentRenderMode(_), FrameKind::ComponentRenderMode(_)) => (),

			_ => {
				error!("Attribute frame in sibling position at old index {} and new index {}.", old_index, new_index);
				return Err(RenderError::InvalidRenderTree("Attribute frames can only be diffed as part of their element's attribute run.".into()));
			}
		}

		Ok(())
	}

	fn append_diff_entries_for_attributes(&mut self, mut old_start: usize, old_end: usize, mut new_start: usize, new_end: usize) -> Result<(), RenderError> {
		let old_tree = self.old_tree;
		while old_start < old_end || new_start < new_end {
			let old_seq = if old_start < old_end { i64::from(old_tree[old_start].sequence) } else { i64::MAX };
			let new_seq = if new_start < new_end { i64::from(self.new_tree[new_start].sequence) } else { i64::MAX };

			if old_seq == new_seq {
				if old_tree[old_start].attribute_name() != self.new_tree[new_start].attribute_name() {
					// Same sequence, different names. Merge joining can't continue.
					return self.append_attribute_diff_entries_for_range_slow(old_start, old_end, new_start, new_end);
				}
				self.append_diff_entries_for_attribute_frame(old_start, new_start)?;
				old_start += 1;
				new_start += 1;
			} else if old_seq < new_seq {
				if old_seq == i64::from(SYSTEM_ADDED_ATTRIBUTE_SEQUENCE) {
					// Sequence numbers are meaningless from here on.
					return self.append_attribute_diff_entries_for_range_slow(old_start, old_end, new_start, new_end);
				}
				self.remove_old_frame(old_start);
				old_start += 1;
			} else {
				self.insert_new_frame(new_start)?;
				new_start += 1;
			}
		}
		Ok(())
	}

	/// Hash join fallback of [`Self::append_diff_entries_for_attributes`].
	///
	/// Removals are emitted in old order, then additions in new order.
	fn append_attribute_diff_entries_for_range_slow(&mut self, old_start: usize, old_end: usize, new_start: usize, new_end: usize) -> Result<(), RenderError> {
		trace!("Falling back to hash join for {} old and {} new attribute(s).", old_end - old_start, new_end - new_start);

		let old_tree = self.old_tree;
		let mut unmatched_new = Vec::new();
		{
			let names = self.batch.attribute_diff_map.temp();
			for i in new_start..new_end {
				if let Some(name) = attribute_name(&self.new_tree[i]) {
					names.insert(name, i);
				}
			}
		}

		for (i, old_frame) in old_tree.iter().enumerate().take(old_end).skip(old_start) {
			let matched = old_frame.attribute_name().and_then(|name| self.batch.attribute_diff_map.remove(name));
			match matched {
				Some(new_index) => self.append_diff_entries_for_attribute_frame(i, new_index)?,
				None => self.remove_old_frame(i),
			}
		}

		unmatched_new.extend(self.batch.attribute_diff_map.drain_indices());
		unmatched_new.sort_unstable();
		for new_index in unmatched_new {
			self.insert_new_frame(new_index)?;
		}
		Ok(())
	}

	/// Only called for attributes of the same name.
	fn append_diff_entries_for_attribute_frame(&mut self, old_index: usize, new_index: usize) -> Result<(), RenderError> {
		let old_tree = self.old_tree;
		let old_frame = &old_tree[old_index];
		let (old_value, old_event_handler_id) = match &old_frame.kind {
			FrameKind::Attribute { value, event_handler_id, .. } => (value, *event_handler_id),
			_ => return Ok(()),
		};
		let value_changed = match &self.new_tree[new_index].kind {
			FrameKind::Attribute { value, .. } => value != old_value,
			_ => return Ok(()),
		};

		if value_changed {
			self.initialize_new_attribute_frame(new_index)?;
			let reference_frame_index = self.append_reference_frames(new_index, 1);
			self.edits.push(RenderTreeEdit::SetAttribute {
				sibling_index: self.sibling_index,
				reference_frame_index,
			});

			if let Some(old_id) = old_event_handler_id {
				if let FrameKind::Attribute {
					event_handler_id: Some(new_id), ..
				} = self.new_tree[new_index].kind
				{
					self.renderer.bindings.track_replacement(old_id, new_id);
				}
				self.batch.disposed_event_handler_ids.push(old_id);
			}
		} else if old_event_handler_id.is_some() {
			// Unchanged handlers keep their ID.
			self.new_tree[new_index] = old_frame.clone();
		}
		Ok(())
	}

	fn insert_new_frame(&mut self, new_index: usize) -> Result<(), RenderError> {
		match self.new_tree[new_index].frame_type() {
			FrameType::Attribute => {
				self.initialize_new_attribute_frame(new_index)?;
				let reference_frame_index = self.append_reference_frames(new_index, 1);
				self.edits.push(RenderTreeEdit::SetAttribute {
					sibling_index: self.sibling_index,
					reference_frame_index,
				});
			}
			FrameType::Component | FrameType::Element => {
				self.initialize_new_subtree(new_index)?;
				let reference_frame_index = self.append_reference_frames(new_index, self.new_tree[new_index].subtree_length());
				self.edits.push(RenderTreeEdit::PrependFrame {
					sibling_index: self.sibling_index,
					reference_frame_index,
				});
				self.sibling_index += 1;
			}
			FrameType::Region => {
				let end = new_index + self.new_tree[new_index].subtree_length();
				let mut child = new_index + 1;
				while child < end {
					self.insert_new_frame(child)?;
					child = next_sibling_index(&self.new_tree[child], child);
				}
			}
			FrameType::Text | FrameType::Markup => {
				let reference_frame_index = self.append_reference_frames(new_index, 1);
				self.edits.push(RenderTreeEdit::PrependFrame {
					sibling_index: self.sibling_index,
					reference_frame_index,
				});
				self.sibling_index += 1;
			}
			FrameType::ElementReferenceCapture => self.initialize_new_element_reference_capture(new_index)?,
			FrameType::ComponentReferenceCapture => self.initialize_new_component_reference_capture(new_index)?,
			FrameType::NamedEvent => self.add_named_event(new_index),
			FrameType::ComponentRenderMode => (),
		}
		Ok(())
	}

	fn remove_old_frame(&mut self, old_index: usize) {
		let old_tree = self.old_tree;
		let old_frame = &old_tree[old_index];
		match &old_frame.kind {
			FrameKind::Attribute { name, event_handler_id, .. } => {
				self.edits.push(RenderTreeEdit::RemoveAttribute {
					sibling_index: self.sibling_index,
					removed_attribute_name: Rc::clone(name),
				});
				if let Some(event_handler_id) = event_handler_id {
					self.batch.disposed_event_handler_ids.push(*event_handler_id);
				}
			}
			FrameKind::Component { .. } | FrameKind::Element { .. } => {
				dispose_frames_in_range(self.batch, self.component_id, old_tree, old_index, old_index + old_frame.subtree_length());
				self.edits.push(RenderTreeEdit::RemoveFrame { sibling_index: self.sibling_index });
			}
			FrameKind::Region { subtree_length } => {
				let end = old_index + subtree_length;
				let mut child = old_index + 1;
				while child < end {
					self.remove_old_frame(child);
					child = next_sibling_index(&old_tree[child], child);
				}
			}
			FrameKind::Text(_) | FrameKind::Markup(_) => self.edits.push(RenderTreeEdit::RemoveFrame { sibling_index: self.sibling_index }),
			FrameKind::NamedEvent { .. } => self.remove_named_event(old_index),
			FrameKind::ElementReferenceCapture { .. } | FrameKind::ComponentReferenceCapture { .. } | FrameKind::ComponentRenderMode(_) => (),
		}
	}

	/// A StepOut directly after a StepIn cancels it.
	fn append_step_out(&mut self) {
		if let Some(RenderTreeEdit::StepIn { .. }) = self.edits.last() {
			self.edits.pop();
		} else {
			self.edits.push(RenderTreeEdit::StepOut);
		}
	}

	fn append_reference_frames(&mut self, index: usize, length: usize) -> usize {
		let reference_frame_index = self.batch.reference_frames.len();
		self.batch.reference_frames.extend_from_slice(&self.new_tree[index..index + length]);
		reference_frame_index
	}

	fn initialize_new_subtree(&mut self, index: usize) -> Result<(), RenderError> {
		let end = index + self.new_tree[index].subtree_length();
		let mut i = index;
		while i < end {
			match self.new_tree[i].frame_type() {
				FrameType::Component => {
					self.initialize_new_component_frame(i)?;
					// Component parameters are values for the child, not DOM attributes.
					i = attributes_end(&*self.new_tree, i);
					continue;
				}
				FrameType::Attribute => self.initialize_new_attribute_frame(i)?,
				FrameType::ElementReferenceCapture => self.initialize_new_element_reference_capture(i)?,
				FrameType::ComponentReferenceCapture => self.initialize_new_component_reference_capture(i)?,
				FrameType::NamedEvent => self.add_named_event(i),
				_ => (),
			}
			i += 1;
		}
		Ok(())
	}

	fn initialize_new_component_frame(&mut self, index: usize) -> Result<(), RenderError> {
		let component_type = match &self.new_tree[index].kind {
			FrameKind::Component { component_id: Some(_), .. } => return Err(RenderError::InvalidRenderTree("Child component already exists during initialization.".into())),
			FrameKind::Component { component_type, .. } => *component_type,
			_ => return Ok(()),
		};

		let instance = self.renderer.activator.create_instance(&component_type)?;
		let (child_id, handle) = self.renderer.register_component(Some(self.component_id), Rc::clone(&instance), component_type.name())?;
		trace!("Instantiated child component {} ({}).", child_id, component_type.name());
		if let FrameKind::Component { component_id, .. } = &mut self.new_tree[index].kind {
			*component_id = Some(child_id);
		}

		self.batch.deferred_actions.push(DeferredAction::Attach { instance, handle });
		self.batch.deferred_actions.push(DeferredAction::SetParameters {
			component_id: child_id,
			parameters: ParameterView::from_component_frame(&*self.new_tree, index),
		});
		Ok(())
	}

	/// Retained children always receive their new parameters. Change detection is up to the component.
	fn update_retained_child_component(&mut self, old_index: usize, new_index: usize) -> Result<(), RenderError> {
		let child_id = self.old_tree[old_index]
			.component_id()
			.ok_or_else(|| RenderError::InvalidRenderTree("Retained component frame has no component instance.".into()))?;
		if let FrameKind::Component { component_id, .. } = &mut self.new_tree[new_index].kind {
			*component_id = Some(child_id);
		}
		self.batch.deferred_actions.push(DeferredAction::SetParameters {
			component_id: child_id,
			parameters: ParameterView::from_component_frame(&*self.new_tree, new_index),
		});
		Ok(())
	}

	fn initialize_new_attribute_frame(&mut self, index: usize) -> Result<(), RenderError> {
		let event_handler_id = match &self.new_tree[index].kind {
			FrameKind::Attribute { name, value, .. } if name.len() >= 3 && name.starts_with("on") && value.is_event_handler() => self.renderer.bindings.publish(value)?,
			_ => return Ok(()),
		};
		if let FrameKind::Attribute { event_handler_id: slot, .. } = &mut self.new_tree[index].kind {
			*slot = event_handler_id;
		}
		Ok(())
	}

	fn initialize_new_element_reference_capture(&mut self, index: usize) -> Result<(), RenderError> {
		let reference = self.renderer.next_element_reference()?;
		if let FrameKind::ElementReferenceCapture { action, reference: slot } = &mut self.new_tree[index].kind {
			*slot = Some(reference);
			self.batch.deferred_actions.push(DeferredAction::CaptureElementReference { action: action.clone(), reference });
		}
		Ok(())
	}

	fn initialize_new_component_reference_capture(&mut self, index: usize) -> Result<(), RenderError> {
		let (action, parent_frame_index) = match &self.new_tree[index].kind {
			FrameKind::ComponentReferenceCapture { action, parent_frame_index } => (action.clone(), *parent_frame_index),
			_ => return Ok(()),
		};
		let parent = self
			.new_tree
			.get(parent_frame_index)
			.filter(|parent| parent.frame_type() == FrameType::Component)
			.ok_or_else(|| RenderError::InvalidReferenceCapture(format!("Component reference capture points at invalid parent index {}.", parent_frame_index).into()))?;
		let instance = parent
			.component_id()
			.and_then(|id| self.renderer.components.get(&id))
			.map(|state| Rc::clone(&state.component))
			.ok_or_else(|| RenderError::InvalidReferenceCapture("Component reference capture initialized before its component was instantiated.".into()))?;
		self.batch.deferred_actions.push(DeferredAction::CaptureComponentReference { action, instance });
		Ok(())
	}

	fn add_named_event(&mut self, new_index: usize) {
		if let FrameKind::NamedEvent { event_type, assigned_name } = &self.new_tree[new_index].kind {
			self.batch.named_event_changes.push(NamedEventChange {
				change_type: NamedEventChangeType::Added,
				component_id: self.component_id,
				frame_index: new_index,
				event_type: Rc::clone(event_type),
				assigned_name: Rc::clone(assigned_name),
			});
		}
	}

	fn remove_named_event(&mut self, old_index: usize) {
		if let FrameKind::NamedEvent { event_type, assigned_name } = &self.old_tree[old_index].kind {
			self.batch.named_event_changes.push(NamedEventChange {
				change_type: NamedEventChangeType::Removed,
				component_id: self.component_id,
				frame_index: old_index,
				event_type: Rc::clone(event_type),
				assigned_name: Rc::clone(assigned_name),
			});
		}
	}
}

fn attribute_name(frame: &Frame) -> Option<Rc<str>> {
	match &frame.kind {
		FrameKind::Attribute { name, .. } => Some(Rc::clone(name)),
		_ => None,
	}
}

fn duplicate_key(key: &Key) -> RenderError {
	let key_text = key.to_string();
	error!("Duplicate key among siblings: {}", redact(&key_text));
	RenderError::DuplicateKey(key.clone())
}

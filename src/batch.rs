use crate::{
	component::{ComponentInstance, ParameterView},
	counter::IdCounter,
	edit::{NamedEventChange, RenderBatch, RenderTreeDiff},
	error::RenderError,
	frame::{CaptureAction, ComponentId, ElementReference, EventHandlerId, Frame, Key},
	renderer::RenderHandle,
	temp_map::TempAttributeDiffMap,
};
use hashbrown::HashMap;
use std::collections::VecDeque;
use tracing::{info, level_filters::STATIC_MAX_LEVEL, warn, Level};

/// Where a keyed sibling sits in the old and new tree.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct KeyedItemInfo {
	pub old_index: Option<usize>,
	pub new_index: Option<usize>,
	pub old_sibling_index: Option<usize>,
	pub new_sibling_index: Option<usize>,
}

pub(crate) type KeyedItemInfos = HashMap<Key, KeyedItemInfo>;

/// Keeps up to `max_preserved` cleared key maps around for the next diff.
pub(crate) struct KeyedItemInfoPool {
	pooled: Vec<KeyedItemInfos>,
	max_preserved: usize,
}
impl KeyedItemInfoPool {
	pub fn new(max_preserved: usize) -> Self {
		Self {
			pooled: Vec::with_capacity(max_preserved),
			max_preserved,
		}
	}

	pub fn get(&mut self) -> KeyedItemInfos {
		self.pooled.pop().unwrap_or_default()
	}

	pub fn put(&mut self, mut infos: KeyedItemInfos) {
		if self.pooled.len() < self.max_preserved {
			infos.clear();
			self.pooled.push(infos);
		}
	}

	pub fn largest_capacity(&self) -> usize {
		self.pooled.iter().map(HashMap::capacity).max().unwrap_or(0)
	}
}

/// Work the differ discovered but must not run while the renderer's state is borrowed, because it calls into components.
pub(crate) enum DeferredAction {
	Attach {
		instance: ComponentInstance,
		handle: RenderHandle,
	},
	SetParameters {
		component_id: ComponentId,
		parameters: ParameterView,
	},
	CaptureElementReference {
		action: CaptureAction<ElementReference>,
		reference: ElementReference,
	},
	CaptureComponentReference {
		action: CaptureAction<ComponentInstance>,
		instance: ComponentInstance,
	},
}

pub(crate) struct RenderBatchBuilder {
	pub updated_components: Vec<RenderTreeDiff>,
	pub reference_frames: Vec<Frame>,
	pub disposed_component_ids: Vec<ComponentId>,
	pub disposed_event_handler_ids: Vec<EventHandlerId>,
	pub named_event_changes: Vec<NamedEventChange>,
	pub component_disposal_queue: VecDeque<ComponentId>,
	pub deferred_actions: Vec<DeferredAction>,
	pub attribute_diff_map: TempAttributeDiffMap,
	pub keyed_item_infos: KeyedItemInfoPool,
	batch_ids: IdCounter<u64>,
}

impl RenderBatchBuilder {
	pub fn new(keyed_item_info_pool_size: usize) -> Self {
		Self {
			updated_components: Vec::new(),
			reference_frames: Vec::new(),
			disposed_component_ids: Vec::new(),
			disposed_event_handler_ids: Vec::new(),
			named_event_changes: Vec::new(),
			component_disposal_queue: VecDeque::new(),
			deferred_actions: Vec::new(),
			attribute_diff_map: TempAttributeDiffMap::new(),
			keyed_item_infos: KeyedItemInfoPool::new(keyed_item_info_pool_size),
			batch_ids: IdCounter::starting_at(1, "batch"),
		}
	}

	/// Moves the accumulated output into an immutable batch.
	pub fn to_batch(&mut self) -> Result<RenderBatch, RenderError> {
		Ok(RenderBatch {
			batch_id: self.batch_ids.next()?,
			updated_components: std::mem::take(&mut self.updated_components),
			reference_frames: std::mem::take(&mut self.reference_frames),
			disposed_component_ids: std::mem::take(&mut self.disposed_component_ids),
			disposed_event_handler_ids: std::mem::take(&mut self.disposed_event_handler_ids),
			named_event_changes: std::mem::take(&mut self.named_event_changes),
		})
	}

	/// Takes back the allocations of a batch the host is done with.
	pub fn recycle(&mut self, batch: RenderBatch) {
		fn reuse<T>(slot: &mut Vec<T>, mut returned: Vec<T>) {
			if slot.is_empty() && slot.capacity() < returned.capacity() {
				returned.clear();
				*slot = returned;
			}
		}

		reuse(&mut self.updated_components, batch.updated_components);
		reuse(&mut self.reference_frames, batch.reference_frames);
		reuse(&mut self.disposed_component_ids, batch.disposed_component_ids);
		reuse(&mut self.disposed_event_handler_ids, batch.disposed_event_handler_ids);
		reuse(&mut self.named_event_changes, batch.named_event_changes);
	}

	pub fn clear_state_for_current_batch(&mut self) {
		self.updated_components.clear();
		self.reference_frames.clear();
		self.disposed_component_ids.clear();
		self.disposed_event_handler_ids.clear();
		self.named_event_changes.clear();
		self.component_disposal_queue.clear();
		self.deferred_actions.clear();
	}

	pub fn log_scratch_capacity(&self, warning_threshold: usize) {
		let attribute_capacity = self.attribute_diff_map.capacity();
		let keyed_capacity = self.keyed_item_infos.largest_capacity();
		info!("Diff heap capacity (attributes/keyed items): {}/{}", attribute_capacity, keyed_capacity);
		if STATIC_MAX_LEVEL >= Level::WARN && attribute_capacity >= warning_threshold {
			warn!(
				"The attribute diff heap capacity is large ({}).\n\
				This may point to attribute runs with unstable sequence numbers.",
				attribute_capacity
			);
		}
		if STATIC_MAX_LEVEL >= Level::WARN && keyed_capacity >= warning_threshold {
			warn!("The keyed item diff heap capacity is large ({}).", keyed_capacity);
		}
	}
}

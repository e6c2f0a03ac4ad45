use crate::{
	counter::IdCounter,
	error::RenderError,
	frame::{AttributeValue, ComponentId, Delegate, EventCallback, EventHandlerId},
};
use hashbrown::HashMap;
use tracing::trace;

/// What an event handler ID resolves to.
#[derive(Debug, Clone)]
pub(crate) enum BoundHandler {
	/// The receiver (if any) is the delegate's target.
	Delegate(Delegate),
	/// The callback names a receiver other than the delegate's target, so it's kept whole.
	Callback(EventCallback),
}
impl BoundHandler {
	pub fn receiver(&self) -> Option<ComponentId> {
		match self {
			BoundHandler::Delegate(delegate) => delegate.target(),
			BoundHandler::Callback(callback) => callback.receiver,
		}
	}

	pub fn delegate(&self) -> Option<&Delegate> {
		match self {
			BoundHandler::Delegate(delegate) => Some(delegate),
			BoundHandler::Callback(callback) => callback.delegate.as_ref(),
		}
	}
}

/// Event handler ID table.
///
/// IDs are retired in two phases: IDs dropped by a batch are first parked under that batch's ID and stay resolvable,
/// because the host may still deliver events for them until it has applied the batch.
/// Once the host acknowledges the batch, [`EventBindings::retire`] removes them for good.
pub(crate) struct EventBindings {
	bindings: HashMap<EventHandlerId, BoundHandler>,
	replacements: HashMap<EventHandlerId, EventHandlerId>,
	pending_retirement: HashMap<u64, Vec<EventHandlerId>>,
	ids: IdCounter<EventHandlerId>,
}

impl EventBindings {
	pub fn new() -> Self {
		Self {
			bindings: HashMap::new(),
			replacements: HashMap::new(),
			pending_retirement: HashMap::new(),
			ids: IdCounter::starting_at(1, "event handler"),
		}
	}

	/// Assigns a fresh ID to an event handler attribute value. Returns [`None`] for values that can't be invoked.
	pub fn publish(&mut self, value: &AttributeValue) -> Result<Option<EventHandlerId>, RenderError> {
		let handler = match value {
			AttributeValue::Delegate(delegate) => BoundHandler::Delegate(delegate.clone()),
			AttributeValue::EventCallback(callback) if callback.requires_explicit_receiver() => BoundHandler::Callback(callback.clone()),
			AttributeValue::EventCallback(EventCallback { delegate: Some(delegate), .. }) => BoundHandler::Delegate(delegate.clone()),
			_ => return Ok(None),
		};
		let id = self.ids.next()?;
		trace!("Bound event handler {}.", id);
		self.bindings.insert(id, handler);
		Ok(Some(id))
	}

	/// Records that `new_id` supersedes `old_id`, so that events the client raises for `old_id` reach the new handler.
	pub fn track_replacement(&mut self, old_id: EventHandlerId, new_id: EventHandlerId) {
		trace!("Event handler {} replaced by {}.", old_id, new_id);
		self.replacements.insert(old_id, new_id);
	}

	/// Follows the replacement chain starting at `id`. IDs only ever get replaced by larger ones, so this terminates.
	pub fn resolve_latest(&self, mut id: EventHandlerId) -> EventHandlerId {
		while let Some(&next) = self.replacements.get(&id) {
			id = next;
		}
		id
	}

	pub fn get(&self, id: EventHandlerId) -> Option<&BoundHandler> {
		self.bindings.get(&id)
	}

	pub fn len(&self) -> usize {
		self.bindings.len()
	}

	/// First phase: park `ids` until `batch_id` has been acknowledged.
	pub fn begin_retirement(&mut self, batch_id: u64, ids: Vec<EventHandlerId>) {
		if !ids.is_empty() {
			trace!("{} event handler(s) pending retirement with batch {}.", ids.len(), batch_id);
			self.pending_retirement.entry(batch_id).or_default().extend(ids);
		}
	}

	/// Second phase: drops everything parked under `batch_id`. Returns how many IDs were retired.
	pub fn retire(&mut self, batch_id: u64) -> usize {
		let ids = match self.pending_retirement.remove(&batch_id) {
			Some(ids) => ids,
			None => return 0,
		};
		self.remove(&ids);
		trace!("Retired {} event handler(s) of batch {}.", ids.len(), batch_id);
		ids.len()
	}

	/// Drops `ids` without waiting for an acknowledgement. For batches that never reached the host.
	pub fn remove(&mut self, ids: &[EventHandlerId]) {
		for id in ids {
			self.bindings.remove(id);
			self.replacements.remove(id);
		}
	}

	pub fn clear(&mut self) {
		self.bindings.clear();
		self.replacements.clear();
		self.pending_retirement.clear();
	}
}

use crate::{
	batch::RenderBatchBuilder,
	cascading::{CascadingSubscription, CascadingValueSupplier},
	component::{ComponentInstance, ParameterView},
	diff,
	frame::ComponentId,
	frame_buffer::FrameBuffer,
};
use hashbrown::HashMap;
use std::rc::Rc;
use tracing::{trace, warn};

/// Where a component is in its life.
///
/// `Instantiated → Rendering` when its first render starts, `Rendering → Rendered` once its output has been diffed,
/// `Rendered → Rendering` again with each further render, and from anywhere to `Disposing` and finally `Disposed`.
/// Parameter updates alone don't change the lifecycle.
///
/// Components stay `Disposing` until their asynchronous disposal (if any) completes.
/// The renderer then drops them and reports [`Disposed`](`Lifecycle::Disposed`) for any ID it handed out that is no longer live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
	Instantiated,
	Rendering,
	Rendered,
	Disposing,
	Disposed,
}

pub(crate) struct ComponentState {
	pub id: ComponentId,
	pub parent_id: Option<ComponentId>,
	pub component: ComponentInstance,
	pub type_name: &'static str,
	pub lifecycle: Lifecycle,
	/// The tree of the last successful render.
	pub current: FrameBuffer,
	/// Scratch buffer for the next render. Swapped with `current` after each successful render.
	pub next: FrameBuffer,
	cascading_subscriptions: Vec<CascadingSubscription>,
	latest_direct_parameters: Option<ParameterView>,
}

impl ComponentState {
	pub fn new(id: ComponentId, parent_id: Option<ComponentId>, component: ComponentInstance, type_name: &'static str, components: &HashMap<ComponentId, ComponentState>) -> Self {
		let cascading_subscriptions = resolve_cascading_subscriptions(&component, parent_id, components);
		for subscription in &cascading_subscriptions {
			if !subscription.supplier.is_fixed() {
				subscription.supplier.subscribe(id);
			}
		}

		Self {
			id,
			parent_id,
			component,
			type_name,
			lifecycle: Lifecycle::Instantiated,
			current: FrameBuffer::new(),
			next: FrameBuffer::new(),
			cascading_subscriptions,
			latest_direct_parameters: None,
		}
	}

	/// Prepares the parameters to pass on for a parameter update from the parent.
	///
	/// Components with cascading subscriptions keep a snapshot of `parameters` to replay when a cascading value changes.
	pub fn direct_parameters(&mut self, parameters: ParameterView) -> ParameterView {
		if self.cascading_subscriptions.is_empty() {
			return parameters;
		}

		let combined = self.combine(&parameters);
		self.latest_direct_parameters = Some(parameters);
		combined
	}

	/// The last direct parameters combined with the current cascading values.
	pub fn replayed_parameters(&mut self) -> ParameterView {
		let direct = self.latest_direct_parameters.clone().unwrap_or_default();
		self.combine(&direct)
	}

	fn combine(&self, direct: &ParameterView) -> ParameterView {
		direct.with_cascading_values(self.cascading_subscriptions.iter().filter_map(|subscription| {
			subscription
				.supplier
				.current_value(&subscription.info)
				.map(|value| (Rc::clone(&subscription.info.parameter_name), value))
		}))
	}

	/// Stops listening to suppliers and queues everything the current tree owns for disposal.
	pub fn begin_disposal(&mut self, batch: &mut RenderBatchBuilder) {
		trace!("Beginning disposal of component {} ({}).", self.id, self.type_name);
		self.lifecycle = Lifecycle::Disposing;
		for subscription in self.cascading_subscriptions.drain(..) {
			if !subscription.supplier.is_fixed() {
				subscription.supplier.unsubscribe(self.id);
			}
		}
		self.latest_direct_parameters = None;
		diff::dispose_frames(batch, self.id, self.current.frames());
	}

	/// Whether the component still takes part in rendering.
	pub fn is_live(&self) -> bool {
		!matches!(self.lifecycle, Lifecycle::Disposing | Lifecycle::Disposed)
	}
}

fn resolve_cascading_subscriptions(component: &ComponentInstance, parent_id: Option<ComponentId>, components: &HashMap<ComponentId, ComponentState>) -> Vec<CascadingSubscription> {
	let requested = match component.try_borrow() {
		Ok(component) => component.cascading_parameters(),
		Err(_) => {
			warn!("Component was borrowed during instantiation. It won't receive cascading parameters.");
			return Vec::new();
		}
	};
	if requested.is_empty() {
		return Vec::new();
	}

	// Closest first.
	let mut suppliers: Vec<Rc<dyn CascadingValueSupplier>> = Vec::new();
	let mut ancestor_id = parent_id;
	while let Some(ancestor) = ancestor_id.and_then(|id| components.get(&id)) {
		match ancestor.component.try_borrow() {
			Ok(component) => suppliers.extend(component.cascading_value_supplier()),
			Err(_) => warn!("Ancestor component {} was borrowed while resolving cascading parameters. Skipping it.", ancestor.id),
		}
		ancestor_id = ancestor.parent_id;
	}

	requested
		.into_iter()
		.filter_map(|info| {
			let supplier = suppliers.iter().find(|supplier| supplier.can_supply(&info))?;
			Some(CascadingSubscription {
				info,
				supplier: Rc::clone(supplier),
			})
		})
		.collect()
}

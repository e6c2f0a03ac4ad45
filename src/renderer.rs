//! The component table, the render queue and everything that turns render requests into [`RenderBatch`]es.
//!
//! # Reentrancy
//!
//! Component code (render fragments, parameter updates, event handlers, reference captures, disposal and the host's callbacks)
//! never runs while the renderer's state is borrowed. It may therefore call back into the [`Renderer`] or a [`RenderHandle`] freely.
//! Render requests made while a batch is being built are queued and become part of that batch.

use crate::{
	batch::{DeferredAction, RenderBatchBuilder},
	client_state::{update_to_match_client_state, FieldValue},
	component::{Component, ComponentActivator, ComponentInstance, ComponentType, DefaultComponentActivator, ParameterView},
	component_state::{ComponentState, Lifecycle},
	counter::IdCounter,
	diff,
	dispatcher::Dispatcher,
	edit::RenderBatch,
	error::RenderError,
	event_bindings::EventBindings,
	frame::{completed, failed, ComponentId, ElementReference, EventArgs, EventHandlerId, Frame, RenderFragment, RenderTask},
	frame_buffer::FrameBuffer,
	html::{encode_html, FrameSource, HtmlFragments},
};
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
	mem,
	task::{Context, Poll},
};
use futures::{
	channel::oneshot,
	future::{self, FutureExt, LocalBoxFuture, Shared},
	task::noop_waker_ref,
};
use hashbrown::{HashMap, HashSet};
use std::{
	collections::VecDeque,
	rc::{Rc, Weak},
};
use tracing::{debug, error, instrument, trace, trace_span, warn};

/// Receives the renderer's output and its unhandled failures.
pub trait RendererHost {
	/// Applies `batch` to the display.
	///
	/// The batch is only borrowed for the duration of this call. The returned task acknowledges it:
	/// event handler IDs the batch retires stay resolvable until it completes, and after-render callbacks only run once it completed successfully.
	fn update_display(&self, batch: &RenderBatch) -> RenderTask;

	/// Called with every component failure no error boundary caught, and with every fatal failure of a render pass.
	///
	/// A fatal failure ends the render session: the renderer disposes itself right after reporting it.
	/// Cancellations are filtered out before this is called.
	fn handle_exception(&self, error: RenderError);
}

#[derive(Debug, Clone)]
pub struct RendererOptions {
	/// How many keyed sibling maps to keep around between diffs.
	pub keyed_item_info_pool_size: usize,
	/// Scratch capacity above which a warning is logged after each batch.
	pub scratch_capacity_warning: usize,
}
impl Default for RendererOptions {
	fn default() -> Self {
		Self {
			keyed_item_info_pool_size: 10,
			scratch_capacity_warning: 100,
		}
	}
}

/// Client field state to apply to a component's current tree before its event handler runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFieldInfo {
	/// The component that rendered the field.
	pub component_id: ComponentId,
	pub value: FieldValue,
}

/// A component's link to its renderer. Handed out through [`Component::attach`].
#[derive(Clone)]
pub struct RenderHandle {
	renderer: Weak<RendererInner>,
	dispatcher: Dispatcher,
	component_id: ComponentId,
}

impl Debug for RenderHandle {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("RenderHandle")
			.field("component_id", &self.component_id)
			.field("renderer_alive", &(self.renderer.strong_count() > 0))
			.finish()
	}
}

impl RenderHandle {
	#[must_use]
	pub fn component_id(&self) -> ComponentId {
		self.component_id
	}

	#[must_use]
	pub fn dispatcher(&self) -> &Dispatcher {
		&self.dispatcher
	}

	/// Queues `fragment` as this component's next content.
	///
	/// The render happens right away unless a batch is already being built, in which case it joins that batch.
	/// Requests for components that have since been disposed are ignored.
	///
	/// # Errors
	///
	/// [`RenderError::RendererDisposed`] iff the renderer is gone, [`RenderError::WrongThread`] off the dispatcher's thread.
	pub fn render(&self, fragment: RenderFragment) -> Result<(), RenderError> {
		self.renderer()?.add_to_render_queue(self.component_id, fragment)
	}

	/// Replays the last parameters of each of `subscribers`, combined with the current cascading values.
	///
	/// # Errors
	///
	/// As for [`RenderHandle::render`].
	pub fn notify_cascading_value_changed(&self, subscribers: &[ComponentId]) -> Result<(), RenderError> {
		let renderer = self.renderer()?;
		for &subscriber in subscribers {
			renderer.supply_parameters_with(subscriber, ComponentState::replayed_parameters);
		}
		Ok(())
	}

	fn renderer(&self) -> Result<Renderer, RenderError> {
		let inner = self.renderer.upgrade().ok_or(RenderError::RendererDisposed)?;
		inner.dispatcher.assert_access()?;
		Ok(Renderer { inner })
	}
}

/// Owns the component table and everything the differ needs to mutate.
pub(crate) struct RendererCore {
	pub components: HashMap<ComponentId, ComponentState>,
	pub bindings: EventBindings,
	pub activator: Rc<dyn ComponentActivator>,
	root_components: HashSet<ComponentId>,
	component_ids: IdCounter<ComponentId>,
	element_references: IdCounter<u64>,
	renderer: Weak<RendererInner>,
	dispatcher: Dispatcher,
}

impl RendererCore {
	pub fn register_component(&mut self, parent_id: Option<ComponentId>, instance: ComponentInstance, type_name: &'static str) -> Result<(ComponentId, RenderHandle), RenderError> {
		let id = self.component_ids.next()?;
		debug!("Initializing component {} ({}) as child of {:?}.", id, type_name, parent_id);
		let state = ComponentState::new(id, parent_id, instance, type_name, &self.components);
		self.components.insert(id, state);
		Ok((
			id,
			RenderHandle {
				renderer: Weak::clone(&self.renderer),
				dispatcher: self.dispatcher.clone(),
				component_id: id,
			},
		))
	}

	pub fn next_element_reference(&mut self) -> Result<ElementReference, RenderError> {
		self.element_references.next().map(ElementReference)
	}
}

impl FrameSource for HashMap<ComponentId, ComponentState> {
	fn component_frames(&self, component_id: ComponentId) -> Option<&[Frame]> {
		self.get(&component_id).map(|state| state.current.frames())
	}
}

struct RendererState {
	core: RendererCore,
	batch: RenderBatchBuilder,
}

/// Signals completion of a spawned task, with its error (if any) already routed.
type Completion = Shared<oneshot::Receiver<()>>;

struct RendererInner {
	dispatcher: Dispatcher,
	host: Rc<dyn RendererHost>,
	options: RendererOptions,
	state: RefCell<RendererState>,
	render_queue: RefCell<VecDeque<(ComponentId, RenderFragment)>>,
	batch_in_progress: Cell<bool>,
	disposed: Cell<bool>,
	/// Present while a root render waits for quiescence.
	pending_tasks: RefCell<Option<Vec<Completion>>>,
}

/// Drives components and publishes their changes to a [`RendererHost`].
///
/// Cloning is cheap and yields another handle to the same renderer.
#[derive(Clone)]
pub struct Renderer {
	inner: Rc<RendererInner>,
}

impl Debug for Renderer {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		let mut debug = f.debug_struct("Renderer");
		debug.field("batch_in_progress", &self.inner.batch_in_progress.get()).field("disposed", &self.inner.disposed.get());
		if let Ok(state) = self.inner.state.try_borrow() {
			debug.field("components", &state.core.components.len()).field("event_handlers", &state.core.bindings.len());
		}
		debug.finish()
	}
}

impl Renderer {
	#[must_use]
	pub fn new(host: Rc<dyn RendererHost>, dispatcher: Dispatcher, activator: Rc<dyn ComponentActivator>, options: RendererOptions) -> Self {
		let inner = Rc::new_cyclic(|renderer| RendererInner {
			dispatcher: dispatcher.clone(),
			host,
			state: RefCell::new(RendererState {
				core: RendererCore {
					components: HashMap::new(),
					bindings: EventBindings::new(),
					activator,
					root_components: HashSet::new(),
					component_ids: IdCounter::starting_at(0, "component"),
					element_references: IdCounter::starting_at(1, "element reference"),
					renderer: Weak::clone(renderer),
					dispatcher,
				},
				batch: RenderBatchBuilder::new(options.keyed_item_info_pool_size),
			}),
			options,
			render_queue: RefCell::default(),
			batch_in_progress: Cell::new(false),
			disposed: Cell::new(false),
			pending_tasks: RefCell::default(),
		});
		Self { inner }
	}

	/// A renderer on a fresh [`Dispatcher`] that instantiates child components through their [`ComponentType`]'s factory.
	#[must_use]
	pub fn with_defaults(host: Rc<dyn RendererHost>) -> Self {
		Self::new(host, Dispatcher::new(), Rc::new(DefaultComponentActivator), RendererOptions::default())
	}

	#[must_use]
	pub fn dispatcher(&self) -> &Dispatcher {
		&self.inner.dispatcher
	}

	fn assert_usable(&self) -> Result<(), RenderError> {
		self.inner.dispatcher.assert_access()?;
		if self.inner.disposed.get() {
			return Err(RenderError::RendererDisposed);
		}
		Ok(())
	}

	fn state(&self) -> Result<core::cell::RefMut<'_, RendererState>, RenderError> {
		self.inner.state.try_borrow_mut().map_err(|_| RenderError::BatchInProgress)
	}

	/// Registers `component` as a root component and attaches it. It renders once parameters are supplied through [`Renderer::render_root_component`].
	///
	/// # Errors
	///
	/// Usage errors only.
	pub fn add_root_component<C: Component + 'static>(&self, component: Rc<RefCell<C>>) -> Result<ComponentId, RenderError> {
		self.add_root_instance(component, core::any::type_name::<C>())
	}

	/// Like [`Renderer::add_root_component`], but instantiates the component through the renderer's [`ComponentActivator`].
	///
	/// # Errors
	///
	/// Usage errors, or whatever the activator fails with.
	pub fn add_root_component_of_type(&self, component_type: &ComponentType) -> Result<ComponentId, RenderError> {
		self.assert_usable()?;
		let activator = Rc::clone(&self.state()?.core.activator);
		let instance = activator.create_instance(component_type)?;
		self.add_root_instance(instance, component_type.name())
	}

	fn add_root_instance(&self, instance: ComponentInstance, type_name: &'static str) -> Result<ComponentId, RenderError> {
		self.assert_usable()?;
		let (id, handle) = {
			let mut state = self.state()?;
			let (id, handle) = state.core.register_component(None, Rc::clone(&instance), type_name)?;
			state.core.root_components.insert(id);
			(id, handle)
		};
		instance.try_borrow_mut().map_err(|_| RenderError::ComponentBusy(id))?.attach(handle);
		Ok(id)
	}

	/// Supplies `parameters` to the root component `component_id` and renders whatever that causes.
	///
	/// The returned future resolves once all asynchronous work started by this (including work of descendants) has completed.
	/// It only makes progress while the [`Dispatcher`] is driven.
	///
	/// # Errors
	///
	/// Usage errors only. Component failures go to [`RendererHost::handle_exception`].
	#[instrument(skip(self, parameters))]
	pub fn render_root_component(&self, component_id: ComponentId, parameters: ParameterView) -> Result<LocalBoxFuture<'static, ()>, RenderError> {
		self.assert_usable()?;
		self.assert_root_component(component_id)?;

		let tracking_started = {
			let mut pending = self.inner.pending_tasks.borrow_mut();
			let starting = pending.is_none();
			if starting {
				*pending = Some(Vec::new());
			}
			starting
		};

		let was_in_batch = self.inner.batch_in_progress.replace(true);
		self.supply_parameters_with(component_id, |state| state.direct_parameters(parameters));
		self.inner.batch_in_progress.set(was_in_batch);
		if !was_in_batch {
			self.process_pending_render();
		}

		if !tracking_started {
			// An outer root render is already waiting for everything.
			return Ok(future::ready(()).boxed_local());
		}
		let guard = QuiescenceGuard(Rc::downgrade(&self.inner));
		Ok(async move {
			loop {
				let inner = match guard.0.upgrade() {
					Some(inner) => inner,
					None => break,
				};
				let pending = inner.pending_tasks.borrow_mut().as_mut().map(mem::take).unwrap_or_default();
				drop(inner);
				if pending.is_empty() {
					break;
				}
				trace!("Waiting for {} pending task(s).", pending.len());
				future::join_all(pending).await;
			}
			drop(guard);
		}
		.boxed_local())
	}

	fn assert_root_component(&self, component_id: ComponentId) -> Result<(), RenderError> {
		let state = self.state()?;
		if state.core.root_components.contains(&component_id) {
			Ok(())
		} else if state.core.components.contains_key(&component_id) {
			Err(RenderError::NotRootComponent(component_id))
		} else {
			Err(RenderError::NoComponent(component_id))
		}
	}

	/// Disposes the root component `component_id` and its descendants in a new batch.
	///
	/// # Errors
	///
	/// Usage errors only.
	pub fn remove_root_component(&self, component_id: ComponentId) -> Result<(), RenderError> {
		self.assert_usable()?;
		self.assert_root_component(component_id)?;
		{
			let mut state = self.state()?;
			state.core.root_components.remove(&component_id);
			state.batch.component_disposal_queue.push_back(component_id);
		}
		if !self.inner.batch_in_progress.get() {
			self.process_pending_render();
		}
		Ok(())
	}

	/// Invokes the event handler `event_handler_id`, after optionally patching the field state the client reported.
	///
	/// IDs that were superseded by a later render resolve to the current handler.
	/// The returned future resolves once the handler completed. Its failure (if any) is routed to [`RendererHost::handle_exception`].
	///
	/// # Errors
	///
	/// [`RenderError::NoEventHandler`] iff `event_handler_id` is unknown or already retired, and other usage errors.
	#[instrument(skip(self, field_info, args))]
	pub fn dispatch_event(&self, event_handler_id: EventHandlerId, field_info: Option<EventFieldInfo>, args: EventArgs) -> Result<LocalBoxFuture<'static, ()>, RenderError> {
		self.assert_usable()?;

		let (latest_id, handler, receiver) = {
			let mut state = self.state()?;
			let core = &mut state.core;
			let latest_id = core.bindings.resolve_latest(event_handler_id);
			let handler = core
				.bindings
				.get(latest_id)
				.or_else(|| core.bindings.get(event_handler_id))
				.cloned()
				.ok_or(RenderError::NoEventHandler(event_handler_id))?;
			if latest_id != event_handler_id {
				trace!("Event handler {} was superseded by {}.", event_handler_id, latest_id);
			}

			if let Some(field_info) = field_info {
				let component = core.components.get_mut(&field_info.component_id).ok_or(RenderError::NoComponent(field_info.component_id))?;
				update_to_match_client_state(&mut component.current, latest_id, &field_info.value)?;
			}

			let receiver = handler.receiver().and_then(|receiver| match core.components.get(&receiver) {
				Some(state) if state.is_live() => Some((receiver, Rc::clone(&state.component))),
				_ => None,
			});
			(latest_id, handler, receiver)
		};
		debug!("Handling event {} with receiver {:?}.", latest_id, receiver.as_ref().map(|(id, _)| id));

		let was_in_batch = self.inner.batch_in_progress.replace(true);
		let receiver_id = receiver.as_ref().map(|(id, _)| *id);
		let task = match (handler.delegate(), receiver) {
			(Some(delegate), Some((receiver_id, receiver))) => match receiver.try_borrow_mut() {
				Ok(mut receiver) => receiver.handle_event(delegate, args),
				Err(_) => failed(RenderError::ComponentBusy(receiver_id)),
			},
			(Some(delegate), None) => delegate.invoke(args),
			(None, _) => completed(),
		};
		let completion = self.track_task(task, receiver_id);
		self.inner.batch_in_progress.set(was_in_batch);
		if !was_in_batch {
			self.process_pending_render();
		}

		Ok(async move {
			if let Some(completion) = completion {
				if completion.await.is_err() {
					trace!("Event handler task was dropped together with the dispatcher.");
				}
			}
		}
		.boxed_local())
	}

	/// A copy of the last successfully rendered tree of `component_id`.
	#[must_use]
	pub fn current_render_tree(&self, component_id: ComponentId) -> Option<Vec<Frame>> {
		let state = self.inner.state.try_borrow().ok()?;
		state.core.components.get(&component_id).map(|component| component.current.frames().to_vec())
	}

	/// [`None`] for IDs this renderer never handed out.
	#[must_use]
	pub fn component_lifecycle(&self, component_id: ComponentId) -> Option<Lifecycle> {
		let state = self.inner.state.try_borrow().ok()?;
		match state.core.components.get(&component_id) {
			Some(component) => Some(component.lifecycle),
			None if state.core.component_ids.issued(component_id) => Some(Lifecycle::Disposed),
			None => None,
		}
	}

	/// Serializes the current tree of `component_id` and its descendants, escaping text with [`encode_html`].
	///
	/// # Errors
	///
	/// [`RenderError::NoComponent`] iff `component_id` isn't live.
	pub fn render_html(&self, component_id: ComponentId) -> Result<String, RenderError> {
		let state = self.inner.state.try_borrow().map_err(|_| RenderError::BatchInProgress)?;
		let fragments = HtmlFragments::for_component(&state.core.components, component_id, encode_html).ok_or(RenderError::NoComponent(component_id))?;
		Ok(fragments.collect())
	}

	/// Disposes every component and stops rendering.
	///
	/// Failures are reported to [`RendererHost::handle_exception`] once everything had a chance to dispose,
	/// synchronous failures first. The returned future resolves once asynchronous disposals completed.
	///
	/// # Errors
	///
	/// [`RenderError::WrongThread`] only.
	#[instrument(skip(self))]
	pub fn dispose(&self) -> Result<LocalBoxFuture<'static, ()>, RenderError> {
		self.inner.dispatcher.assert_access()?;
		if self.inner.disposed.get() {
			return Ok(future::ready(()).boxed_local());
		}

		let components = {
			let mut state = self.state()?;
			self.inner.disposed.set(true);
			let mut components: Vec<_> = state.core.components.drain().collect();
			components.sort_unstable_by_key(|(id, _)| *id);
			state.core.root_components.clear();
			state.core.bindings.clear();
			state.batch.clear_state_for_current_batch();
			components
		};
		self.inner.render_queue.borrow_mut().clear();

		let mut errors = Vec::new();
		let mut async_disposals = Vec::new();
		for (id, mut component) in components {
			if !component.is_live() {
				trace!("Component {} is already disposing.", id);
				continue;
			}
			let span = trace_span!("Disposing component", component_id = id, type_name = component.type_name);
			let _enter = span.enter();
			component.lifecycle = Lifecycle::Disposing;
			match dispose_instance(id, &component.component) {
				Ok(Some(task)) => async_disposals.push(task),
				Ok(None) => (),
				Err(error) => errors.push(error),
			}
		}
		if let Some(error) = RenderError::aggregate(errors) {
			self.handle_exception(error);
		}

		let renderer = Rc::downgrade(&self.inner);
		Ok(async move {
			let errors: Vec<_> = future::join_all(async_disposals).await.into_iter().filter_map(Result::err).filter(|error| !error.is_cancellation()).collect();
			if let (Some(error), Some(inner)) = (RenderError::aggregate(errors), renderer.upgrade()) {
				Renderer { inner }.handle_exception(error);
			}
		}
		.boxed_local())
	}

	fn add_to_render_queue(&self, component_id: ComponentId, fragment: RenderFragment) -> Result<(), RenderError> {
		if self.inner.disposed.get() {
			return Ok(());
		}
		if let Ok(state) = self.inner.state.try_borrow() {
			match state.core.components.get(&component_id) {
				Some(component) if component.is_live() => (),
				_ => {
					trace!("Ignoring render request for disposed component {}.", component_id);
					return Ok(());
				}
			}
		}

		self.inner.render_queue.borrow_mut().push_back((component_id, fragment));
		if !self.inner.batch_in_progress.get() {
			self.process_pending_render();
		}
		Ok(())
	}

	fn process_pending_render(&self) {
		if self.inner.disposed.get() {
			return;
		}
		if let Err(error) = self.process_render_queue() {
			self.handle_exception(error);
			self.end_session();
		}
	}

	/// Disposes the renderer after a fatal render failure.
	///
	/// Components rendered earlier in the aborted batch already moved on to trees the host never received,
	/// so there is nothing consistent left to render against.
	fn end_session(&self) {
		warn!("Ending the render session after a fatal failure.");
		match self.dispose() {
			Ok(disposal) => self.inner.dispatcher.spawn(disposal.map(|()| Ok(()))),
			Err(error) => self.handle_exception(error),
		}
	}

	#[instrument(skip(self))]
	fn process_render_queue(&self) -> Result<(), RenderError> {
		loop {
			if self.inner.batch_in_progress.replace(true) {
				return Err(RenderError::BatchInProgress);
			}
			let result = self.build_and_publish_batch();
			self.inner.batch_in_progress.set(false);

			if let Err(error) = result {
				// The partial batch is never published.
				if let Ok(mut state) = self.inner.state.try_borrow_mut() {
					state.batch.clear_state_for_current_batch();
				}
				self.inner.render_queue.borrow_mut().clear();
				return Err(error);
			}

			// After-render callbacks may have requested more renders.
			if self.inner.render_queue.borrow().is_empty() {
				return Ok(());
			}
		}
	}

	fn build_and_publish_batch(&self) -> Result<(), RenderError> {
		let render_queue_empty = self.inner.render_queue.borrow().is_empty();
		if render_queue_empty {
			if self.state()?.batch.component_disposal_queue.is_empty() {
				return Ok(());
			}
			self.process_disposal_queue();
		}

		loop {
			let next = self.inner.render_queue.borrow_mut().pop_front();
			let (component_id, fragment) = match next {
				Some(entry) => entry,
				None => break,
			};
			self.render_in_existing_batch(component_id, &fragment)?;
			self.process_disposal_queue();
		}

		let batch = {
			let mut state = self.state()?;
			let RendererState { core, batch } = &mut *state;
			let built = batch.to_batch()?;
			core.bindings.begin_retirement(built.batch_id, built.disposed_event_handler_ids.clone());
			batch.log_scratch_capacity(self.inner.options.scratch_capacity_warning);
			built
		};
		debug!(
			"Publishing batch {} with {} diff(s), {} disposed component(s) and {} retired event handler(s).",
			batch.batch_id,
			batch.updated_components.len(),
			batch.disposed_component_ids.len(),
			batch.disposed_event_handler_ids.len()
		);

		let acknowledgement = self.inner.host.update_display(&batch).shared();
		let batch_id = batch.batch_id;
		let mut updated = Vec::with_capacity(batch.updated_components.len());
		for diff in &batch.updated_components {
			if !updated.contains(&diff.component_id) {
				updated.push(diff.component_id);
			}
		}
		self.state()?.batch.recycle(batch);

		match acknowledgement.clone().now_or_never() {
			Some(result) => self.complete_batch(batch_id, &updated, result),
			None => {
				trace!("Batch {} awaits acknowledgement.", batch_id);
				let renderer = Rc::downgrade(&self.inner);
				self.inner.dispatcher.spawn(async move {
					let result = acknowledgement.await;
					if let Some(inner) = renderer.upgrade() {
						Renderer { inner }.complete_batch(batch_id, &updated, result);
					}
					Ok(())
				});
			}
		}
		Ok(())
	}

	/// Second phase of event handler retirement, plus after-render callbacks on success for components that are still live.
	fn complete_batch(&self, batch_id: u64, updated: &[ComponentId], result: Result<(), RenderError>) {
		if let Ok(mut state) = self.inner.state.try_borrow_mut() {
			state.core.bindings.retire(batch_id);
		} else {
			warn!("Renderer state busy while completing batch {}. Its event handlers stay bound.", batch_id);
		}

		match result {
			Ok(()) => {
				for &component_id in updated {
					let instance = match self.inner.state.try_borrow() {
						Ok(state) => match state.core.components.get(&component_id) {
							Some(component) if component.is_live() => Rc::clone(&component.component),
							_ => continue,
						},
						Err(_) => continue,
					};
					let task = match instance.try_borrow_mut() {
						Ok(mut component) => component.on_after_render(),
						Err(_) => failed(RenderError::ComponentBusy(component_id)),
					};
					self.track_task(task, Some(component_id));
				}
			}
			Err(error) => self.handle_exception(error),
		}
	}

	fn render_in_existing_batch(&self, component_id: ComponentId, fragment: &RenderFragment) -> Result<(), RenderError> {
		let span = trace_span!("Rendering component", component_id);
		let _enter = span.enter();

		let (mut next, type_name, previous_lifecycle) = {
			let mut state = self.state()?;
			match state.core.components.get_mut(&component_id) {
				Some(component) if component.is_live() => {
					let previous_lifecycle = mem::replace(&mut component.lifecycle, Lifecycle::Rendering);
					(mem::take(&mut component.next), component.type_name, previous_lifecycle)
				}
				_ => {
					trace!("Skipping render of disposed component {}.", component_id);
					return Ok(());
				}
			}
		};
		debug!("Rendering component {} ({}).", component_id, type_name);

		next.clear();
		let outcome = match fragment(&mut next) {
			Ok(()) => next.validate(type_name).map_err(Fatal),
			Err(error) => Err(Recoverable(error)),
		};

		let actions = {
			let mut state = self.state()?;
			let RendererState { core, batch } = &mut *state;
			let mut current = match core.components.get_mut(&component_id) {
				Some(component) => mem::take(&mut component.current),
				None => return Ok(()),
			};

			let outcome = outcome.and_then(|()| diff::compute_diff(core, batch, component_id, current.frames(), next.frames_mut()).map_err(Fatal));

			let component = match core.components.get_mut(&component_id) {
				Some(component) => component,
				None => return Ok(()),
			};
			match outcome {
				Ok(render_diff) => {
					batch.updated_components.push(render_diff);
					mem::swap(&mut current, &mut next);
					component.current = current;
					component.next = next;
					component.lifecycle = Lifecycle::Rendered;
				}
				Err(failure) => {
					// The previous tree stays current.
					component.current = current;
					component.next = next;
					component.lifecycle = previous_lifecycle;
					drop(state);
					return match failure {
						Fatal(error) => Err(error),
						Recoverable(error) => {
							self.handle_component_error(Some(component_id), error);
							Ok(())
						}
					};
				}
			}
			mem::take(&mut batch.deferred_actions)
		};

		self.run_deferred_actions(actions);
		Ok(())
	}

	fn run_deferred_actions(&self, actions: Vec<DeferredAction>) {
		for action in actions {
			match action {
				DeferredAction::Attach { instance, handle } => {
					let component_id = handle.component_id();
					match instance.try_borrow_mut() {
						Ok(mut component) => component.attach(handle),
						Err(_) => self.handle_exception(RenderError::ComponentBusy(component_id)),
					}
				}
				DeferredAction::SetParameters { component_id, parameters } => self.supply_parameters_with(component_id, |state| state.direct_parameters(parameters)),
				DeferredAction::CaptureElementReference { action, reference } => action.call(reference),
				DeferredAction::CaptureComponentReference { action, instance } => action.call(instance),
			}
		}
	}

	/// Hands `component_id` the parameters `prepare` derives from its state, unless it is gone.
	fn supply_parameters_with(&self, component_id: ComponentId, prepare: impl FnOnce(&mut ComponentState) -> ParameterView) {
		let (instance, parameters) = {
			let mut state = match self.state() {
				Ok(state) => state,
				Err(error) => return self.handle_exception(error),
			};
			match state.core.components.get_mut(&component_id) {
				Some(component) if component.is_live() => (Rc::clone(&component.component), prepare(component)),
				_ => return,
			}
		};

		trace!("Setting {} parameter(s) on component {}.", parameters.len(), component_id);
		let task = match instance.try_borrow_mut() {
			Ok(mut component) => component.set_parameters(parameters),
			Err(_) => failed(RenderError::ComponentBusy(component_id)),
		};
		self.track_task(task, Some(component_id));
	}

	fn process_disposal_queue(&self) {
		let mut errors = Vec::new();
		loop {
			let (component_id, instance) = {
				let mut state = match self.state() {
					Ok(state) => state,
					Err(error) => return self.handle_exception(error),
				};
				let RendererState { core, batch } = &mut *state;
				let component_id = match batch.component_disposal_queue.pop_front() {
					Some(component_id) => component_id,
					None => break,
				};
				match core.components.get_mut(&component_id) {
					Some(component) if component.is_live() => {
						component.begin_disposal(batch);
						batch.disposed_component_ids.push(component_id);
						(component_id, Rc::clone(&component.component))
					}
					_ => continue,
				}
			};

			debug!("Disposing component {}.", component_id);
			match dispose_instance(component_id, &instance) {
				Ok(Some(task)) => {
					// Stays in the table as `Disposing` until the task resolves.
					let renderer = Rc::downgrade(&self.inner);
					let task = async move {
						let result = task.await;
						if let Some(inner) = renderer.upgrade() {
							Renderer { inner }.forget_component(component_id);
						}
						result
					};
					self.track_task(task.boxed_local(), None);
				}
				Ok(None) => self.forget_component(component_id),
				Err(error) => {
					errors.push(error);
					self.forget_component(component_id);
				}
			}
		}

		if let Some(error) = RenderError::aggregate(errors) {
			self.handle_exception(error);
		}
	}

	fn forget_component(&self, component_id: ComponentId) {
		match self.inner.state.try_borrow_mut() {
			Ok(mut state) => {
				if state.core.components.remove(&component_id).is_some() {
					trace!("Component {} is disposed.", component_id);
				}
			}
			Err(_) => warn!("Renderer state busy. Component {} stays in the component table.", component_id),
		}
	}

	/// Polls `task` once. If it is still pending, it is spawned with its error routed like [`Renderer::handle_component_error`]
	/// and, during root renders, tracked for quiescence.
	fn track_task(&self, mut task: RenderTask, source: Option<ComponentId>) -> Option<Completion> {
		let mut cx = Context::from_waker(noop_waker_ref());
		match task.poll_unpin(&mut cx) {
			Poll::Ready(Ok(())) => None,
			Poll::Ready(Err(error)) => {
				self.handle_component_error(source, error);
				None
			}
			Poll::Pending => {
				let (done, completion) = oneshot::channel();
				let completion = completion.shared();
				let renderer = Rc::downgrade(&self.inner);
				self.inner.dispatcher.spawn(async move {
					if let Err(error) = task.await {
						if let Some(inner) = renderer.upgrade() {
							Renderer { inner }.handle_component_error(source, error);
						}
					}
					// Nobody may be waiting.
					let _ = done.send(());
					Ok(())
				});
				if let Some(pending) = self.inner.pending_tasks.borrow_mut().as_mut() {
					pending.push(completion.clone());
				}
				Some(completion)
			}
		}
	}

	/// Routes a failure of `source` (or of work started on its behalf) to the closest error boundary, or to the host.
	fn handle_component_error(&self, source: Option<ComponentId>, error: RenderError) {
		if error.is_cancellation() {
			trace!("Ignoring cancellation.");
			return;
		}
		let (boundary_id, boundary) = match source.and_then(|source| self.find_error_boundary(source)) {
			Some(boundary) => boundary,
			None => return self.handle_exception(error),
		};
		debug!("Routing failure of component {:?} to error boundary {}.", source, boundary_id);

		let was_in_batch = self.inner.batch_in_progress.replace(true);
		// Tear down the failed subtree no matter what the boundary renders next.
		let empty: RenderFragment = Rc::new(|_: &mut FrameBuffer| Ok(()));
		if let Err(render_error) = self.add_to_render_queue(boundary_id, empty) {
			self.handle_exception(render_error);
		}

		let result = match boundary.try_borrow_mut() {
			Ok(mut boundary) => boundary.handle_error(error),
			Err(_) => {
				warn!("Error boundary {} is busy.", boundary_id);
				Err(error)
			}
		};
		if let Err(error) = result {
			self.handle_exception(error);
		}
		self.inner.batch_in_progress.set(was_in_batch);
		if !was_in_batch {
			self.process_pending_render();
		}
	}

	/// The closest live error boundary, starting with `source` itself.
	fn find_error_boundary(&self, source: ComponentId) -> Option<(ComponentId, ComponentInstance)> {
		let state = self.inner.state.try_borrow().ok()?;
		let mut candidate = state.core.components.get(&source);
		while let Some(component) = candidate {
			let is_boundary = component.is_live() && component.component.try_borrow().map_or(false, |instance| instance.is_error_boundary());
			if is_boundary {
				return Some((component.id, Rc::clone(&component.component)));
			}
			candidate = component.parent_id.and_then(|parent_id| state.core.components.get(&parent_id));
		}
		None
	}

	fn handle_exception(&self, error: RenderError) {
		if error.is_cancellation() {
			trace!("Ignoring cancellation.");
			return;
		}
		error!("{}", error);
		self.inner.host.handle_exception(error);
	}
}

/// Whether a failed render abandons the whole batch or only that component's update.
enum RenderFailure {
	Fatal(RenderError),
	Recoverable(RenderError),
}
use RenderFailure::{Fatal, Recoverable};

/// Ends quiescence tracking when the waiting future completes or is dropped.
struct QuiescenceGuard(Weak<RendererInner>);
impl Drop for QuiescenceGuard {
	fn drop(&mut self) {
		if let Some(inner) = self.0.upgrade() {
			*inner.pending_tasks.borrow_mut() = None;
		}
	}
}

fn dispose_instance(component_id: ComponentId, instance: &ComponentInstance) -> Result<Option<RenderTask>, RenderError> {
	let mut component = instance.try_borrow_mut().map_err(|_| RenderError::ComponentBusy(component_id))?;
	match component.dispose_async() {
		Some(task) => Ok(Some(task)),
		None => component.dispose().map(|()| None),
	}
}

use crate::{
	cascading::{CascadingParameterInfo, CascadingValueSupplier},
	error::RenderError,
	frame::{completed, AttributeValue, Delegate, EventArgs, Frame, FrameKind, RenderTask},
	renderer::RenderHandle,
};
use core::{
	any::{type_name, TypeId},
	cell::RefCell,
	fmt::{self, Debug, Formatter},
	hash::{Hash, Hasher},
	slice,
};
use std::rc::Rc;

/// Shared handle to a live component. The renderer never holds a borrow of it across calls into other components.
pub type ComponentInstance = Rc<RefCell<dyn Component>>;

/// A unit of UI that renders itself through its [`RenderHandle`].
///
/// Only [`Component::attach`] and [`Component::set_parameters`] are required.
/// Implementations should not hold a borrow of themselves across `.await` points of the tasks they return.
pub trait Component {
	/// Called exactly once, before the first parameter update.
	fn attach(&mut self, handle: RenderHandle);

	/// Receives the parameters supplied by the parent (and any cascading values).
	///
	/// Components typically store what they need and then request a render through their [`RenderHandle`].
	fn set_parameters(&mut self, parameters: ParameterView) -> RenderTask;

	/// Wraps the invocation of an event handler whose receiver is this component.
	fn handle_event(&mut self, delegate: &Delegate, args: EventArgs) -> RenderTask {
		delegate.invoke(args)
	}

	/// Called once the host acknowledged a batch that contained this component's changes.
	fn on_after_render(&mut self) -> RenderTask {
		completed()
	}

	/// Synchronous cleanup. Not called if [`Component::dispose_async`] returns [`Some`].
	///
	/// # Errors
	///
	/// Reported to the host, aggregated with any other disposal failures of the same pass.
	fn dispose(&mut self) -> Result<(), RenderError> {
		Ok(())
	}

	fn dispose_async(&mut self) -> Option<RenderTask> {
		None
	}

	/// Cascading parameters this component wants to receive. Queried once, when it is instantiated.
	fn cascading_parameters(&self) -> Vec<CascadingParameterInfo> {
		Vec::new()
	}

	/// Lets descendants subscribe to a value supplied by this component.
	fn cascading_value_supplier(&self) -> Option<Rc<dyn CascadingValueSupplier>> {
		None
	}

	/// Whether failures of this component and its descendants are routed to [`Component::handle_error`] instead of the host.
	fn is_error_boundary(&self) -> bool {
		false
	}

	/// Receives a failure from within this error boundary.
	///
	/// By the time this is called, the boundary has been queued to render empty content.
	/// Request another render here to show something else.
	///
	/// # Errors
	///
	/// Reported to the host.
	fn handle_error(&mut self, error: RenderError) -> Result<(), RenderError> {
		Err(error)
	}
}

/// Identity of a component type together with its default factory.
#[derive(Clone, Copy)]
pub struct ComponentType {
	type_id: TypeId,
	name: &'static str,
	factory: fn() -> ComponentInstance,
}
impl ComponentType {
	#[must_use]
	pub fn of<T: Component + Default + 'static>() -> Self {
		Self {
			type_id: TypeId::of::<T>(),
			name: type_name::<T>(),
			factory: construct::<T>,
		}
	}

	#[must_use]
	pub fn name(&self) -> &'static str {
		self.name
	}

	#[must_use]
	pub fn type_id(&self) -> TypeId {
		self.type_id
	}

	#[must_use]
	pub fn instantiate(&self) -> ComponentInstance {
		(self.factory)()
	}
}
impl PartialEq for ComponentType {
	fn eq(&self, other: &Self) -> bool {
		self.type_id == other.type_id
	}
}
impl Eq for ComponentType {}
impl Hash for ComponentType {
	fn hash<H: Hasher>(&self, state: &mut H) {
		self.type_id.hash(state);
	}
}
impl Debug for ComponentType {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_tuple("ComponentType").field(&self.name).finish()
	}
}

fn construct<T: Component + Default + 'static>() -> ComponentInstance {
	Rc::new(RefCell::new(T::default()))
}

/// Creates component instances for the component frames the differ encounters.
pub trait ComponentActivator {
	/// # Errors
	///
	/// Iff no instance can be created. The error aborts the current batch.
	fn create_instance(&self, component_type: &ComponentType) -> Result<ComponentInstance, RenderError>;
}

/// Uses each type's [`Default`] implementation.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultComponentActivator;
impl ComponentActivator for DefaultComponentActivator {
	fn create_instance(&self, component_type: &ComponentType) -> Result<ComponentInstance, RenderError> {
		Ok(component_type.instantiate())
	}
}

#[derive(Debug, Clone)]
pub struct Parameter {
	pub name: Rc<str>,
	pub value: AttributeValue,
	pub cascading: bool,
}

/// An owned snapshot of the parameters passed to a component.
///
/// Names are matched ASCII-case-insensitively.
#[derive(Debug, Clone)]
pub struct ParameterView {
	parameters: Rc<[Parameter]>,
}
impl Default for ParameterView {
	fn default() -> Self {
		Self { parameters: Vec::new().into() }
	}
}
impl ParameterView {
	#[must_use]
	pub fn empty() -> Self {
		Self::default()
	}

	pub fn from_pairs<N, V>(pairs: impl IntoIterator<Item = (N, V)>) -> Self
	where
		N: Into<Rc<str>>,
		V: Into<AttributeValue>,
	{
		Self {
			parameters: pairs
				.into_iter()
				.map(|(name, value)| Parameter {
					name: name.into(),
					value: value.into(),
					cascading: false,
				})
				.collect(),
		}
	}

	/// Collects the attribute frames directly following the component frame at `component_index`.
	pub(crate) fn from_component_frame(frames: &[Frame], component_index: usize) -> Self {
		let end = component_index + frames[component_index].subtree_length();
		Self {
			parameters: frames[component_index + 1..end]
				.iter()
				.map_while(|frame| match &frame.kind {
					FrameKind::Attribute { name, value, .. } => Some(Parameter {
						name: Rc::clone(name),
						value: value.clone(),
						cascading: false,
					}),
					_ => None,
				})
				.collect(),
		}
	}

	pub(crate) fn with_cascading_values(&self, cascading: impl IntoIterator<Item = (Rc<str>, AttributeValue)>) -> Self {
		Self {
			parameters: self
				.parameters
				.iter()
				.cloned()
				.chain(cascading.into_iter().map(|(name, value)| Parameter { name, value, cascading: true }))
				.collect(),
		}
	}

	/// The last parameter named `name`.
	#[must_use]
	pub fn get(&self, name: &str) -> Option<&AttributeValue> {
		self.parameters.iter().rev().find(|parameter| parameter.name.eq_ignore_ascii_case(name)).map(|parameter| &parameter.value)
	}

	pub fn iter(&self) -> slice::Iter<'_, Parameter> {
		self.parameters.iter()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.parameters.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.parameters.is_empty()
	}
}
impl<'a> IntoIterator for &'a ParameterView {
	type Item = &'a Parameter;
	type IntoIter = slice::Iter<'a, Parameter>;

	fn into_iter(self) -> Self::IntoIter {
		self.iter()
	}
}

//! Values that flow from an ancestor component to every interested descendant without explicit parameter passing.

use crate::{
	component::{Component, ParameterView},
	error::RenderError,
	frame::{completed, failed, AttributeValue, ComponentId, RenderFragment, RenderTask},
	renderer::RenderHandle,
};
use core::{
	any::{Any, TypeId},
	cell::{Cell, RefCell},
};
use std::rc::Rc;
use tracing::trace;

/// Describes one cascading parameter a component asks for.
///
/// Named requests only match suppliers of the same name (ASCII-case-insensitively).
/// Unnamed requests match the closest unnamed supplier whose current value has the requested type.
#[derive(Debug, Clone)]
pub struct CascadingParameterInfo {
	pub parameter_name: Rc<str>,
	pub supplier_name: Option<Rc<str>>,
	pub value_type: Option<TypeId>,
}
impl CascadingParameterInfo {
	pub fn by_name(parameter_name: impl Into<Rc<str>>, supplier_name: impl Into<Rc<str>>) -> Self {
		Self {
			parameter_name: parameter_name.into(),
			supplier_name: Some(supplier_name.into()),
			value_type: None,
		}
	}

	/// Use `str` for string values, `bool` and `i64` for the scalar [`AttributeValue`]s, and the payload type for [`AttributeValue::Object`].
	pub fn by_type<T: Any + ?Sized>(parameter_name: impl Into<Rc<str>>) -> Self {
		Self {
			parameter_name: parameter_name.into(),
			supplier_name: None,
			value_type: Some(TypeId::of::<T>()),
		}
	}
}

/// Implemented by whatever a component returns from [`Component::cascading_value_supplier`].
pub trait CascadingValueSupplier {
	/// Fixed suppliers never change their value, so nobody subscribes to them.
	fn is_fixed(&self) -> bool;
	fn can_supply(&self, info: &CascadingParameterInfo) -> bool;
	fn current_value(&self, info: &CascadingParameterInfo) -> Option<AttributeValue>;
	fn subscribe(&self, subscriber: ComponentId);
	fn unsubscribe(&self, subscriber: ComponentId);
}

/// A descendant's resolved link to its supplier.
#[derive(Clone)]
pub(crate) struct CascadingSubscription {
	pub info: CascadingParameterInfo,
	pub supplier: Rc<dyn CascadingValueSupplier>,
}

/// Built-in supplier component.
///
/// Parameters: `Value`, `Name` (optional string), `IsFixed` (optional bool) and `ChildContent` (fragment).
/// Neither `Name` nor `IsFixed` may change after the first parameter update.
#[derive(Default)]
pub struct CascadingValue {
	handle: Option<RenderHandle>,
	state: Rc<CascadingValueState>,
	has_set_parameters_previously: bool,
}

#[derive(Default)]
struct CascadingValueState {
	name: RefCell<Option<Rc<str>>>,
	value: RefCell<AttributeValue>,
	is_fixed: Cell<bool>,
	child_content: RefCell<Option<RenderFragment>>,
	subscribers: RefCell<Vec<ComponentId>>,
}

impl CascadingValue {
	fn apply_parameters(&mut self, parameters: &ParameterView) -> Result<(), RenderError> {
		let (mut value, mut name, mut is_fixed, mut child_content) = (AttributeValue::Null, None, false, None);
		for parameter in parameters {
			match &*parameter.name {
				n if n.eq_ignore_ascii_case("Value") => value = parameter.value.clone(),
				n if n.eq_ignore_ascii_case("Name") => name = parameter.value.as_str().map(Rc::from),
				n if n.eq_ignore_ascii_case("IsFixed") => is_fixed = parameter.value.as_bool().unwrap_or(false),
				n if n.eq_ignore_ascii_case("ChildContent") => child_content = parameter.value.as_fragment().cloned(),
				n => {
					return Err(RenderError::custom(format!(
						"The component 'CascadingValue' does not accept a parameter with the name '{}'.",
						n
					)))
				}
			}
		}

		let state = &self.state;
		if self.has_set_parameters_previously {
			if is_fixed != state.is_fixed.get() {
				return Err(RenderError::custom("The value of IsFixed cannot be changed dynamically."));
			}
			let name_changed = match (&*state.name.borrow(), &name) {
				(Some(a), Some(b)) => !a.eq_ignore_ascii_case(b),
				(None, None) => false,
				_ => true,
			};
			if name_changed {
				return Err(RenderError::custom("Changing the value of 'Name' is not supported."));
			}
		}

		let changed = self.has_set_parameters_previously && *state.value.borrow() != value;
		*state.name.borrow_mut() = name;
		*state.value.borrow_mut() = value;
		state.is_fixed.set(is_fixed);
		*state.child_content.borrow_mut() = child_content;
		self.has_set_parameters_previously = true;

		if changed && !is_fixed {
			let subscribers = state.subscribers.borrow().clone();
			trace!("Cascading value changed. Notifying {} subscriber(s).", subscribers.len());
			if let Some(handle) = &self.handle {
				handle.notify_cascading_value_changed(&subscribers)?;
			}
		}
		Ok(())
	}
}

impl Component for CascadingValue {
	fn attach(&mut self, handle: RenderHandle) {
		self.handle = Some(handle);
	}

	fn set_parameters(&mut self, parameters: ParameterView) -> RenderTask {
		if let Err(error) = self.apply_parameters(&parameters) {
			return failed(error);
		}

		let state = Rc::clone(&self.state);
		let fragment: RenderFragment = Rc::new(move |builder| match state.child_content.borrow().clone() {
			Some(child_content) => builder.add_content(0, &child_content),
			None => Ok(()),
		});
		match &self.handle {
			Some(handle) => match handle.render(fragment) {
				Ok(()) => completed(),
				Err(error) => failed(error),
			},
			None => completed(),
		}
	}

	fn cascading_value_supplier(&self) -> Option<Rc<dyn CascadingValueSupplier>> {
		Some(Rc::clone(&self.state) as Rc<dyn CascadingValueSupplier>)
	}
}

impl CascadingValueSupplier for CascadingValueState {
	fn is_fixed(&self) -> bool {
		self.is_fixed.get()
	}

	fn can_supply(&self, info: &CascadingParameterInfo) -> bool {
		match (&info.supplier_name, &*self.name.borrow()) {
			(Some(requested), Some(name)) => requested.eq_ignore_ascii_case(name),
			(None, None) => info.value_type.is_some() && info.value_type == self.value.borrow().value_type_id(),
			_ => false,
		}
	}

	fn current_value(&self, _: &CascadingParameterInfo) -> Option<AttributeValue> {
		Some(self.value.borrow().clone())
	}

	fn subscribe(&self, subscriber: ComponentId) {
		self.subscribers.borrow_mut().push(subscriber);
	}

	fn unsubscribe(&self, subscriber: ComponentId) {
		self.subscribers.borrow_mut().retain(|&id| id != subscriber);
	}
}

use crate::frame::{ComponentId, EventHandlerId, FrameType, Key};
use core::fmt::{self, Display, Formatter};
use std::{borrow::Cow, error::Error, rc::Rc};

/// Everything that can go wrong while building, diffing or dispatching.
///
/// Usage errors are returned directly from the offending call and are never retried.
/// Component errors ([`RenderError::Component`]) are routed to the closest error boundary ([`Component::is_error_boundary`](`crate::Component::is_error_boundary`)),
/// or to [`RendererHost::handle_exception`](`crate::RendererHost::handle_exception`) without one.
/// [`RenderError::Canceled`] is never reported as a fault.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum RenderError {
	/// The current thread does not own the renderer's [`Dispatcher`](`crate::Dispatcher`).
	WrongThread,
	/// A render batch was started while another one is still being built.
	BatchInProgress,
	UnclosedFrame {
		component_type: Cow<'static, str>,
		frame_type: FrameType,
	},
	/// A [`FrameBuffer`](`crate::FrameBuffer`) operation was used out of place.
	InvalidRenderTree(Cow<'static, str>),
	DuplicateKey(Key),
	NoEventHandler(EventHandlerId),
	NoComponent(ComponentId),
	NotRootComponent(ComponentId),
	InvalidReferenceCapture(Cow<'static, str>),
	IdSpaceExhausted(&'static str),
	/// A component was re-entered while one of its methods was still running.
	ComponentBusy(ComponentId),
	/// A blocking dispatcher call was made from the thread that would have to service it.
	DispatcherReentrancy,
	RendererDisposed,
	Canceled,
	/// A failure raised by component code: render fragments, parameter updates, event handlers, after-render callbacks or disposal.
	Component(Rc<dyn Error>),
	Aggregate(Vec<RenderError>),
}

impl RenderError {
	pub fn component(error: impl Error + 'static) -> Self {
		Self::Component(Rc::new(error))
	}

	/// Shorthand for a component error that consists only of a message.
	pub fn custom(message: impl Into<String>) -> Self {
		Self::component(Message(message.into()))
	}

	#[must_use]
	pub fn is_cancellation(&self) -> bool {
		matches!(self, Self::Canceled)
	}

	/// Collapses a list of failures into at most one error, unwrapping single entries.
	pub(crate) fn aggregate(mut errors: Vec<RenderError>) -> Option<Self> {
		match errors.len() {
			0 => None,
			1 => errors.pop(),
			_ => Some(Self::Aggregate(errors)),
		}
	}
}

impl Display for RenderError {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		match self {
			RenderError::WrongThread => write!(
				f,
				"The current thread is not associated with the renderer's dispatcher. Use `Dispatcher::invoke` or a `RemoteDispatcher` to switch execution to the dispatcher when triggering rendering or component state."
			),
			RenderError::BatchInProgress => write!(f, "Cannot start a batch when one is already in progress."),
			RenderError::UnclosedFrame { component_type, frame_type } => write!(
				f,
				"Render output is invalid for component of type '{}'. A frame of type '{}' was left unclosed.",
				component_type, frame_type
			),
			RenderError::InvalidRenderTree(message) => write!(f, "{}", message),
			RenderError::DuplicateKey(key) => write!(f, "More than one sibling has the same key value, '{}'. Key values must be unique.", key),
			RenderError::NoEventHandler(id) => write!(f, "There is no event handler associated with this event. EventId: '{}'.", id),
			RenderError::NoComponent(id) => write!(f, "The renderer does not have a component with ID {}.", id),
			RenderError::NotRootComponent(id) => write!(f, "The specified component ({}) is not a root component.", id),
			RenderError::InvalidReferenceCapture(message) => write!(f, "{}", message),
			RenderError::IdSpaceExhausted(what) => write!(f, "Ran out of {} IDs.", what),
			RenderError::ComponentBusy(id) => write!(f, "Component {} was re-entered while it was already borrowed.", id),
			RenderError::DispatcherReentrancy => write!(
				f,
				"Blocking on the dispatcher from its own thread would deadlock. Use `Dispatcher::invoke` there instead."
			),
			RenderError::RendererDisposed => write!(f, "The renderer has been disposed."),
			RenderError::Canceled => write!(f, "The operation was canceled."),
			RenderError::Component(error) => Display::fmt(error, f),
			RenderError::Aggregate(errors) => {
				write!(f, "Exceptions were encountered while disposing components.")?;
				for error in errors {
					write!(f, "\n- {}", error)?;
				}
				Ok(())
			}
		}
	}
}

impl Error for RenderError {
	fn source(&self) -> Option<&(dyn Error + 'static)> {
		match self {
			RenderError::Component(error) => Some(&**error),
			_ => None,
		}
	}
}

#[derive(Debug)]
struct Message(String);
impl Display for Message {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}
impl Error for Message {}

#![doc(html_root_url = "https://docs.rs/lignin-renderer/0.0.1")]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

#[cfg(doctest)]
pub mod readme {
	doc_comment::doctest!("../README.md");
}

mod attribute_names;
mod batch;
pub mod cascading;
pub mod client_state;
pub mod component;
mod component_state;
mod counter;
mod diff;
pub mod dispatcher;
pub mod edit;
mod error;
mod event_bindings;
pub mod frame;
mod frame_buffer;
pub mod html;
pub mod renderer;
mod temp_map;

pub use component::{Component, ComponentActivator, ComponentInstance, ComponentType, ParameterView};
pub use component_state::Lifecycle;
pub use dispatcher::{Dispatcher, RemoteDispatcher};
pub use edit::{RenderBatch, RenderTreeDiff, RenderTreeEdit};
pub use error::RenderError;
pub use frame::{AttributeValue, ComponentId, Delegate, EventArgs, EventCallback, EventHandlerId, Frame, FrameKind, Key, RenderFragment, RenderTask};
pub use frame_buffer::FrameBuffer;
pub use renderer::{EventFieldInfo, RenderHandle, Renderer, RendererHost, RendererOptions};

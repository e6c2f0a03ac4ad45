//! Serializes frame trees to HTML text, one fragment at a time.

use crate::frame::{AttributeValue, ComponentId, Frame, FrameKind};
use std::{borrow::Cow, collections::VecDeque};

/// Element names that are written as `<name />` when they have no content.
pub const VOID_ELEMENTS: [&str; 14] = ["area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track", "wbr"];

#[must_use]
pub fn is_void_element(name: &str) -> bool {
	VOID_ELEMENTS.iter().any(|void| void.eq_ignore_ascii_case(name))
}

/// Lets [`HtmlFragments`] descend into child components.
pub trait FrameSource {
	/// The current frames of `component_id`, if it is known.
	fn component_frames(&self, component_id: ComponentId) -> Option<&[Frame]>;
}

/// A [`FrameSource`] without any components. Component frames render as nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoComponents;
impl FrameSource for NoComponents {
	fn component_frames(&self, _: ComponentId) -> Option<&[Frame]> {
		None
	}
}

/// Escapes `&`, `<`, `>`, `"` and `'`. Borrows `text` if there is nothing to escape.
#[must_use]
pub fn encode_html(text: &str) -> Cow<'_, str> {
	if !text.contains(|c| matches!(c, '&' | '<' | '>' | '"' | '\'')) {
		return Cow::Borrowed(text);
	}

	let mut encoded = String::with_capacity(text.len() + 8);
	for c in text.chars() {
		match c {
			'&' => encoded.push_str("&amp;"),
			'<' => encoded.push_str("&lt;"),
			'>' => encoded.push_str("&gt;"),
			'"' => encoded.push_str("&quot;"),
			'\'' => encoded.push_str("&#39;"),
			c => encoded.push(c),
		}
	}
	Cow::Owned(encoded)
}

enum Step<'a> {
	Frames { frames: &'a [Frame], position: usize, end: usize },
	Close(&'a str),
}

/// Lazy HTML serialization of a frame slice.
///
/// Text and attribute values pass through the `encoder`. Markup is written verbatim.
/// Attribute values of `true` render as the bare attribute name, strings and integers as quoted values, and anything else not at all.
/// Reference captures, named events and render modes produce no output.
pub struct HtmlFragments<'a, S: ?Sized, E> {
	source: &'a S,
	encoder: E,
	stack: Vec<Step<'a>>,
	pending: VecDeque<Cow<'a, str>>,
}

impl<'a, S, E> HtmlFragments<'a, S, E>
where
	S: FrameSource + ?Sized,
	E: FnMut(&'a str) -> Cow<'a, str>,
{
	pub fn new(source: &'a S, frames: &'a [Frame], encoder: E) -> Self {
		Self {
			source,
			encoder,
			stack: vec![Step::Frames {
				frames,
				position: 0,
				end: frames.len(),
			}],
			pending: VecDeque::new(),
		}
	}

	/// Serializes the current tree of `component_id`, or returns [`None`] if `source` doesn't know it.
	pub fn for_component(source: &'a S, component_id: ComponentId, encoder: E) -> Option<Self> {
		let frames = source.component_frames(component_id)?;
		Some(Self::new(source, frames, encoder))
	}

	fn render_frame(&mut self, frames: &'a [Frame], index: usize) {
		match &frames[index].kind {
			FrameKind::Element { name, subtree_length, .. } => {
				let name: &'a str = name;
				let end = index + subtree_length;
				self.pending.extend([Cow::Borrowed("<"), Cow::Borrowed(name)]);

				let mut child = index + 1;
				while child < end {
					match &frames[child].kind {
						FrameKind::Attribute { name, value, .. } => self.render_attribute(name, value),
						_ => break,
					}
					child += 1;
				}

				if child < end {
					self.pending.push_back(Cow::Borrowed(">"));
					self.stack.push(Step::Close(name));
					self.stack.push(Step::Frames { frames, position: child, end });
				} else if is_void_element(name) {
					self.pending.push_back(Cow::Borrowed(" />"));
				} else {
					self.pending.extend([Cow::Borrowed("></"), Cow::Borrowed(name), Cow::Borrowed(">")]);
				}
			}
			FrameKind::Text(text) => {
				let encoded = (self.encoder)(&**text);
				self.pending.push_back(encoded);
			}
			FrameKind::Markup(markup) => self.pending.push_back(Cow::Borrowed(&**markup)),
			FrameKind::Region { subtree_length } => self.stack.push(Step::Frames {
				frames,
				position: index + 1,
				end: index + subtree_length,
			}),
			FrameKind::Component {
				component_id: Some(component_id),
				..
			} => {
				let source = self.source;
				if let Some(child_frames) = source.component_frames(*component_id) {
					self.stack.push(Step::Frames {
						frames: child_frames,
						position: 0,
						end: child_frames.len(),
					});
				}
			}
			FrameKind::Component { component_id: None, .. }
			| FrameKind::Attribute { .. }
			| FrameKind::ElementReferenceCapture { .. }
			| FrameKind::ComponentReferenceCapture { .. }
			| FrameKind::ComponentRenderMode(_)
			| FrameKind::NamedEvent { .. } => (),
		}
	}

	fn render_attribute(&mut self, name: &'a str, value: &'a AttributeValue) {
		match value {
			AttributeValue::Bool(true) => self.pending.extend([Cow::Borrowed(" "), Cow::Borrowed(name)]),
			AttributeValue::Str(text) => {
				let encoded = (self.encoder)(&**text);
				self.pending.extend([Cow::Borrowed(" "), Cow::Borrowed(name), Cow::Borrowed("=\""), encoded, Cow::Borrowed("\"")]);
			}
			AttributeValue::Int(int) => self.pending.extend([Cow::Borrowed(" "), Cow::Borrowed(name), Cow::Borrowed("=\""), Cow::Owned(int.to_string()), Cow::Borrowed("\"")]),
			AttributeValue::Bool(false)
			| AttributeValue::Null
			| AttributeValue::EventCallback(_)
			| AttributeValue::Delegate(_)
			| AttributeValue::Fragment(_)
			| AttributeValue::Object(_) => (),
		}
	}
}

impl<'a, S, E> Iterator for HtmlFragments<'a, S, E>
where
	S: FrameSource + ?Sized,
	E: FnMut(&'a str) -> Cow<'a, str>,
{
	type Item = Cow<'a, str>;

	fn next(&mut self) -> Option<Self::Item> {
		loop {
			if let Some(fragment) = self.pending.pop_front() {
				return Some(fragment);
			}

			match self.stack.pop()? {
				Step::Close(name) => self.pending.extend([Cow::Borrowed("</"), Cow::Borrowed(name), Cow::Borrowed(">")]),
				Step::Frames { frames, position, end } => {
					if position < end {
						self.stack.push(Step::Frames {
							frames,
							position: position + frames[position].subtree_length(),
							end,
						});
						self.render_frame(frames, position);
					}
				}
			}
		}
	}
}

/// Collects [`HtmlFragments`] over `frames` into one string, using [`encode_html`].
#[must_use]
pub fn render_to_string<S: FrameSource + ?Sized>(source: &S, frames: &[Frame]) -> String {
	HtmlFragments::new(source, frames, encode_html).collect()
}

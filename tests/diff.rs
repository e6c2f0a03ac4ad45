
use lignin_renderer::{
	edit::{NamedEventChange, NamedEventChangeType},
	frame::{completed, ElementReference, FrameType},
	Component, ComponentId, ComponentType, FrameBuffer, FrameKind, Key, Lifecycle, ParameterView, RenderError, RenderHandle, RenderTask, RenderTreeEdit, Renderer,
};
use model_::{mount, DomModel, Label, Scripted, RecordingHost};
use std::{
	cell::{Cell, RefCell},
	rc::Rc,
};

struct Fixture {
	host: Rc<RecordingHost>,
	renderer: Renderer,
	root: ComponentId,
	scripted: Rc<RefCell<Scripted>>,
	model: DomModel,
}

impl Fixture {
	fn new() -> Self {
		let host = RecordingHost::new();
		let renderer = Renderer::with_defaults(host.clone());
		let (root, scripted) = mount(&renderer);
		Self {
			host,
			renderer,
			root,
			scripted,
			model: DomModel::default(),
		}
	}

	fn render(&mut self, fragment: impl Fn(&mut FrameBuffer) -> Result<(), RenderError> + 'static) -> Vec<RenderTreeEdit> {
		let batches = self.host.batch_count();
		Scripted::render(&self.scripted, fragment).unwrap();
		assert_eq!(self.host.batch_count(), batches + 1, "Expected exactly one new batch.");
		self.model.sync(&self.host);
		self.model.assert_matches(&self.renderer, self.root);
		self.host.last_batch().edits_for(self.root).cloned().collect()
	}

	fn child_id(&self, frame_index: usize) -> ComponentId {
		self.renderer.current_render_tree(self.root).unwrap()[frame_index].component_id().expect("Not a component frame.")
	}
}

fn list(keys: &'static [&'static str]) -> impl Fn(&mut FrameBuffer) -> Result<(), RenderError> {
	move |builder| {
		builder.open_element(0, "ul");
		for key in keys {
			builder.open_element(1, "li");
			builder.set_key(*key);
			builder.add_text(2, *key);
			builder.close_element();
		}
		builder.close_element();
		Ok(())
	}
}

fn count_edits(edits: &[RenderTreeEdit], predicate: impl Fn(&RenderTreeEdit) -> bool) -> usize {
	edits.iter().filter(|edit| predicate(edit)).count()
}

#[test]
fn initial_render() {
	let mut fixture = Fixture::new();
	let edits = fixture.render(|builder| {
		builder.open_element(0, "div");
		builder.add_attribute(1, "class", "greeting");
		builder.add_text(2, "Hello");
		builder.add_markup(3, "<b>!</b>");
		builder.close_element();
		builder.add_text(4, "after");
		Ok(())
	});

	assert_eq!(
		edits,
		vec![
			RenderTreeEdit::PrependFrame {
				sibling_index: 0,
				reference_frame_index: 0
			},
			RenderTreeEdit::PrependFrame {
				sibling_index: 1,
				reference_frame_index: 4
			},
		]
	);
	assert_eq!(fixture.renderer.render_html(fixture.root).unwrap(), r#"<div class="greeting">Hello<b>!</b></div>after"#);
}

#[test]
fn text_update_only() {
	let mut fixture = Fixture::new();
	let text = Rc::new(RefCell::new("first"));
	let fragment = {
		let text = text.clone();
		move |builder: &mut FrameBuffer| {
			builder.open_element(0, "p");
			builder.add_text(1, *text.borrow());
			builder.close_element();
			Ok(())
		}
	};
	fixture.render(fragment.clone());

	*text.borrow_mut() = "second";
	let edits = fixture.render(fragment);
	assert_eq!(
		edits,
		vec![
			RenderTreeEdit::StepIn { sibling_index: 0 },
			RenderTreeEdit::UpdateText {
				sibling_index: 0,
				reference_frame_index: 0
			},
			RenderTreeEdit::StepOut,
		]
	);
	assert!(matches!(&fixture.host.last_batch().reference_frames[0].kind, FrameKind::Text(text) if &**text == "second"));
}

#[test]
fn unchanged_render_has_no_edits() {
	let mut fixture = Fixture::new();
	let fragment = |builder: &mut FrameBuffer| {
		builder.open_element(0, "div");
		builder.add_attribute(1, "id", "same");
		builder.open_element(2, "span");
		builder.add_text(3, "same");
		builder.close_element();
		builder.close_element();
		Ok(())
	};
	fixture.render(fragment);
	let edits = fixture.render(fragment);
	assert!(edits.is_empty(), "{:?}", edits);
	assert!(fixture.host.last_batch().reference_frames.is_empty());
}

#[test]
fn attribute_changes() {
	let mut fixture = Fixture::new();
	fixture.render(|builder| {
		builder.open_element(0, "div");
		builder.add_attribute(1, "class", "a");
		builder.add_attribute(2, "title", "t");
		builder.close_element();
		Ok(())
	});

	let edits = fixture.render(|builder| {
		builder.open_element(0, "div");
		builder.add_attribute(1, "class", "b");
		builder.add_attribute(3, "id", "x");
		builder.close_element();
		Ok(())
	});
	assert_eq!(
		edits,
		vec![
			RenderTreeEdit::SetAttribute {
				sibling_index: 0,
				reference_frame_index: 0
			},
			RenderTreeEdit::RemoveAttribute {
				sibling_index: 0,
				removed_attribute_name: "title".into()
			},
			RenderTreeEdit::SetAttribute {
				sibling_index: 0,
				reference_frame_index: 1
			},
		]
	);
}

#[test]
fn nested_attribute_change_steps_in() {
	let mut fixture = Fixture::new();
	let class = Rc::new(Cell::new("a"));
	let fragment = {
		let class = class.clone();
		move |builder: &mut FrameBuffer| {
			builder.open_element(0, "div");
			builder.open_element(1, "p");
			builder.add_attribute(2, "class", class.get());
			builder.add_text(3, "x");
			builder.close_element();
			builder.close_element();
			Ok(())
		}
	};
	fixture.render(fragment.clone());

	class.set("b");
	let edits = fixture.render(fragment);
	assert_eq!(
		edits,
		vec![
			RenderTreeEdit::StepIn { sibling_index: 0 },
			RenderTreeEdit::SetAttribute {
				sibling_index: 0,
				reference_frame_index: 0
			},
			RenderTreeEdit::StepOut,
		]
	);
}

#[test]
fn same_sequence_different_attribute_names() {
	let mut fixture = Fixture::new();
	fixture.render(|builder| {
		builder.open_element(0, "input");
		builder.add_attribute(1, "a", "1");
		builder.add_attribute(2, "b", "2");
		builder.close_element();
		Ok(())
	});

	let edits = fixture.render(|builder| {
		builder.open_element(0, "input");
		builder.add_attribute(1, "b", "2");
		builder.add_attribute(2, "c", "3");
		builder.close_element();
		Ok(())
	});
	assert_eq!(count_edits(&edits, |edit| matches!(edit, RenderTreeEdit::RemoveAttribute { removed_attribute_name, .. } if &**removed_attribute_name == "a")), 1);
	assert_eq!(count_edits(&edits, |edit| matches!(edit, RenderTreeEdit::SetAttribute { .. })), 1);
}

#[test]
fn keyed_rotation_is_a_pure_permutation() {
	let mut fixture = Fixture::new();
	fixture.render(list(&["A", "B", "C"]));

	let edits = fixture.render(list(&["C", "A", "B"]));
	assert_eq!(
		edits,
		vec![
			RenderTreeEdit::StepIn { sibling_index: 0 },
			RenderTreeEdit::PermutationListEntry {
				from_sibling_index: 0,
				to_sibling_index: 1
			},
			RenderTreeEdit::PermutationListEntry {
				from_sibling_index: 1,
				to_sibling_index: 2
			},
			RenderTreeEdit::PermutationListEntry {
				from_sibling_index: 2,
				to_sibling_index: 0
			},
			RenderTreeEdit::PermutationListEnd,
			RenderTreeEdit::StepOut,
		]
	);
}

#[test]
fn keyed_insert_remove_and_move() {
	let mut fixture = Fixture::new();
	fixture.render(list(&["A", "B", "C", "E"]));

	let edits = fixture.render(list(&["D", "C", "A", "B"]));
	assert_eq!(count_edits(&edits, |edit| matches!(edit, RenderTreeEdit::PrependFrame { .. })), 1);
	assert_eq!(count_edits(&edits, |edit| matches!(edit, RenderTreeEdit::RemoveFrame { .. })), 1);
	assert_eq!(count_edits(&edits, |edit| matches!(edit, RenderTreeEdit::PermutationListEnd)), 1);
	assert_eq!(count_edits(&edits, |edit| matches!(edit, RenderTreeEdit::UpdateText { .. })), 0);
}

#[test]
fn keyed_items_keep_their_state() {
	let mut fixture = Fixture::new();
	let keys = Rc::new(RefCell::new(vec![1, 2, 3]));
	let fragment = {
		let keys = keys.clone();
		move |builder: &mut FrameBuffer| {
			for &key in keys.borrow().iter() {
				builder.open_component(0, ComponentType::of::<Label>());
				builder.set_key(key);
				builder.add_component_parameter(1, "Text", key.to_string());
				builder.close_component();
			}
			Ok(())
		}
	};
	fixture.render(fragment.clone());
	let before: Vec<_> = (0..3).map(|i| fixture.child_id(i * 2)).collect();

	*keys.borrow_mut() = vec![3, 1, 2];
	fixture.render(fragment);
	let after: Vec<_> = (0..3).map(|i| fixture.child_id(i * 2)).collect();
	assert_eq!(after, vec![before[2], before[0], before[1]]);
	assert!(fixture.host.last_batch().disposed_component_ids.is_empty());
	assert_eq!(fixture.renderer.render_html(fixture.root).unwrap(), "<span>3</span><span>1</span><span>2</span>");
}

#[test]
fn conditional_content() {
	let mut fixture = Fixture::new();
	let show = Rc::new(Cell::new(false));
	let fragment = {
		let show = show.clone();
		move |builder: &mut FrameBuffer| {
			builder.add_text(0, "header");
			if show.get() {
				builder.open_element(1, "p");
				builder.add_text(2, "shown");
				builder.close_element();
			}
			builder.add_text(3, "footer");
			Ok(())
		}
	};
	fixture.render(fragment.clone());

	show.set(true);
	let edits = fixture.render(fragment.clone());
	assert!(matches!(edits[..], [RenderTreeEdit::PrependFrame { sibling_index: 1, .. }]), "{:?}", edits);

	show.set(false);
	let edits = fixture.render(fragment);
	assert_eq!(edits, vec![RenderTreeEdit::RemoveFrame { sibling_index: 1 }]);
}

#[test]
fn unkeyed_loops_grow_and_shrink() {
	let mut fixture = Fixture::new();
	let items = Rc::new(RefCell::new(vec!["a", "b", "c"]));
	let fragment = {
		let items = items.clone();
		move |builder: &mut FrameBuffer| {
			builder.open_element(0, "ul");
			for item in items.borrow().iter() {
				builder.open_element(1, "li");
				builder.add_text(2, *item);
				builder.close_element();
			}
			builder.close_element();
			builder.add_text(3, "end");
			Ok(())
		}
	};
	fixture.render(fragment.clone());

	*items.borrow_mut() = vec!["a", "b", "c", "d", "e"];
	fixture.render(fragment.clone());
	*items.borrow_mut() = vec!["e", "d"];
	fixture.render(fragment.clone());
	*items.borrow_mut() = vec![];
	fixture.render(fragment);
	assert_eq!(fixture.renderer.render_html(fixture.root).unwrap(), "<ul></ul>end");
}

#[test]
fn regions_flatten_into_their_parent() {
	let mut fixture = Fixture::new();
	let count = Rc::new(Cell::new(1));
	let fragment = {
		let count = count.clone();
		move |builder: &mut FrameBuffer| {
			builder.add_text(0, "start");
			builder.open_region(1);
			for i in 0..count.get() {
				builder.add_text(0, i.to_string());
			}
			builder.close_region();
			builder.add_text(2, "end");
			Ok(())
		}
	};
	fixture.render(fragment.clone());

	count.set(3);
	let edits = fixture.render(fragment.clone());
	assert_eq!(
		edits.iter().map(|edit| if let RenderTreeEdit::PrependFrame { sibling_index, .. } = edit { *sibling_index } else { usize::MAX }).collect::<Vec<_>>(),
		vec![2, 3]
	);

	count.set(0);
	fixture.render(fragment);
	assert_eq!(fixture.renderer.render_html(fixture.root).unwrap(), "startend");
}

#[test]
fn element_name_change_replaces_the_element() {
	let mut fixture = Fixture::new();
	fixture.render(|builder| {
		builder.open_element(0, "div");
		builder.close_element();
		Ok(())
	});

	let edits = fixture.render(|builder| {
		builder.open_element(0, "section");
		builder.close_element();
		Ok(())
	});
	assert_eq!(
		edits,
		vec![
			RenderTreeEdit::RemoveFrame { sibling_index: 0 },
			RenderTreeEdit::PrependFrame {
				sibling_index: 0,
				reference_frame_index: 0
			},
		]
	);
}

#[test]
fn duplicate_key_ends_the_session() {
	let mut fixture = Fixture::new();
	fixture.render(list(&["A"]));
	let batches = fixture.host.batch_count();

	Scripted::render(&fixture.scripted, list(&["A", "B", "A"])).unwrap();
	assert_eq!(fixture.host.batch_count(), batches);
	let errors = fixture.host.take_errors();
	assert!(matches!(&errors[..], [RenderError::DuplicateKey(Key::Str(key))] if &**key == "A"), "{:?}", errors);

	assert_eq!(fixture.renderer.component_lifecycle(fixture.root), Some(Lifecycle::Disposed));
	assert!(fixture.scripted.borrow().disposed);
	assert!(matches!(
		fixture.renderer.render_root_component(fixture.root, ParameterView::empty()),
		Err(RenderError::RendererDisposed)
	));
}

#[test]
fn failing_fragment_keeps_the_previous_tree() {
	let mut fixture = Fixture::new();
	fixture.render(|builder| {
		builder.add_text(0, "stable");
		Ok(())
	});

	Scripted::render(&fixture.scripted, |builder| {
		builder.add_text(0, "half-written");
		Err(RenderError::custom("render failed"))
	})
	.unwrap();
	let errors = fixture.host.take_errors();
	assert_eq!(errors.len(), 1);
	assert_eq!(errors[0].to_string(), "render failed");
	assert_eq!(fixture.renderer.render_html(fixture.root).unwrap(), "stable");
	assert_eq!(fixture.host.last_batch().edits_for(fixture.root).count(), 0);
}

#[test]
fn unclosed_frame_is_reported() {
	let fixture = Fixture::new();
	Scripted::render(&fixture.scripted, |builder| {
		builder.open_element(0, "div");
		Ok(())
	})
	.unwrap();

	let errors = fixture.host.take_errors();
	assert!(
		matches!(&errors[..], [RenderError::UnclosedFrame { component_type, frame_type: FrameType::Element }] if component_type.ends_with("Scripted")),
		"{:?}",
		errors
	);
	assert_eq!(fixture.host.batch_count(), 0);
	assert!(fixture.renderer.current_render_tree(fixture.root).is_none());
	assert!(fixture.scripted.borrow().disposed);
}

fn label(text: &'static str) -> impl Fn(&mut FrameBuffer) -> Result<(), RenderError> {
	move |builder| {
		builder.open_component(0, ComponentType::of::<Label>());
		builder.add_component_parameter(1, "Text", text);
		builder.close_component();
		Ok(())
	}
}

#[test]
fn child_component_lifecycle() {
	let mut fixture = Fixture::new();
	fixture.render(label("hello"));
	let child = fixture.child_id(0);

	let batch = fixture.host.last_batch();
	assert_eq!(batch.updated_components.iter().map(|diff| diff.component_id).collect::<Vec<_>>(), vec![fixture.root, child]);
	assert_eq!(fixture.renderer.render_html(fixture.root).unwrap(), "<span>hello</span>");
	assert_eq!(fixture.renderer.component_lifecycle(child), Some(Lifecycle::Rendered));

	fixture.render(label("world"));
	assert_eq!(fixture.child_id(0), child);
	assert_eq!(fixture.renderer.render_html(child).unwrap(), "<span>world</span>");

	let edits = fixture.render(|_| Ok(()));
	assert_eq!(edits, vec![RenderTreeEdit::RemoveFrame { sibling_index: 0 }]);
	assert_eq!(fixture.host.last_batch().disposed_component_ids, vec![child]);
	assert_eq!(fixture.renderer.component_lifecycle(child), Some(Lifecycle::Disposed));
	assert!(!fixture.model.components.contains_key(&child));
	assert!(matches!(fixture.renderer.render_html(child), Err(RenderError::NoComponent(id)) if id == child));
}

thread_local! {
	static PARAMETER_SETS: Cell<usize> = Cell::new(0);
}

#[derive(Default)]
struct Counting;
impl Component for Counting {
	fn attach(&mut self, _: RenderHandle) {}

	fn set_parameters(&mut self, _: ParameterView) -> RenderTask {
		PARAMETER_SETS.with(|count| count.set(count.get() + 1));
		completed()
	}
}

#[test]
fn retained_children_always_receive_parameters() {
	let mut fixture = Fixture::new();
	let fragment = |builder: &mut FrameBuffer| {
		builder.open_component(0, ComponentType::of::<Counting>());
		builder.add_component_parameter(1, "Value", 1);
		builder.close_component();
		Ok(())
	};
	fixture.render(fragment);
	let child = fixture.child_id(0);
	fixture.render(fragment);
	fixture.render(fragment);

	assert_eq!(PARAMETER_SETS.with(Cell::get), 3);
	assert_eq!(fixture.child_id(0), child);
}

#[test]
fn element_reference_is_captured_once() {
	let mut fixture = Fixture::new();
	let captured = Rc::new(RefCell::new(Vec::new()));
	let fragment = {
		let captured = captured.clone();
		move |builder: &mut FrameBuffer| {
			builder.open_element(0, "input");
			let captured = captured.clone();
			builder.add_element_reference_capture(1, move |reference| captured.borrow_mut().push(reference));
			builder.close_element();
			Ok(())
		}
	};
	fixture.render(fragment.clone());
	assert_eq!(*captured.borrow(), vec![ElementReference(1)]);

	let edits = fixture.render(fragment);
	assert!(edits.is_empty());
	assert_eq!(captured.borrow().len(), 1);
	assert!(matches!(
		fixture.renderer.current_render_tree(fixture.root).unwrap()[1].kind,
		FrameKind::ElementReferenceCapture {
			reference: Some(ElementReference(1)),
			..
		}
	));
}

#[test]
fn component_reference_is_captured_after_instantiation() {
	let mut fixture = Fixture::new();
	let captured = Rc::new(Cell::new(0));
	fixture.render({
		let captured = captured.clone();
		move |builder| {
			builder.open_component(0, ComponentType::of::<Label>());
			builder.add_component_parameter(1, "Text", "x");
			let captured = captured.clone();
			builder.add_component_reference_capture(2, move |_| captured.set(captured.get() + 1));
			builder.close_component();
			Ok(())
		}
	});
	assert_eq!(captured.get(), 1);
}

#[test]
fn named_events_are_reported() {
	let mut fixture = Fixture::new();
	let with_name = |builder: &mut FrameBuffer| {
		builder.open_element(0, "form");
		builder.add_named_event("onsubmit", "my-form");
		builder.close_element();
		Ok(())
	};
	fixture.render(with_name);
	let added = NamedEventChange {
		change_type: NamedEventChangeType::Added,
		component_id: fixture.root,
		frame_index: 1,
		event_type: "onsubmit".into(),
		assigned_name: "my-form".into(),
	};
	assert_eq!(fixture.host.last_batch().named_event_changes, vec![added.clone()]);

	fixture.render(with_name);
	assert!(fixture.host.last_batch().named_event_changes.is_empty());

	fixture.render(|builder| {
		builder.open_element(0, "form");
		builder.close_element();
		Ok(())
	});
	assert_eq!(
		fixture.host.last_batch().named_event_changes,
		vec![NamedEventChange {
			change_type: NamedEventChangeType::Removed,
			..added
		}]
	);
}

/// Xorshift, so every seed replays the same render sequence.
struct Rng(u64);

impl Rng {
	fn new(seed: u64) -> Self {
		Self(seed.wrapping_mul(0x9E37_79B9_7F4A_7C15) | 1)
	}

	fn next(&mut self) -> u64 {
		let mut x = self.0;
		x ^= x << 13;
		x ^= x >> 7;
		x ^= x << 17;
		self.0 = x;
		x
	}

	fn below(&mut self, bound: usize) -> usize {
		(self.next() % bound as u64) as usize
	}

	fn chance(&mut self, percent: usize) -> bool {
		self.below(100) < percent
	}

	fn pick<T: Copy>(&mut self, options: &[T]) -> T {
		options[self.below(options.len())]
	}
}

/// What each sibling position can hold. Fixed per seed, like the structure of a compiled render method.
enum Slot {
	Text,
	Element(Vec<Slot>),
	Keyed,
	Loop,
	Region(Vec<Slot>),
}

fn layout(rng: &mut Rng, depth: usize) -> Vec<Slot> {
	(0..2 + rng.below(4))
		.map(|_| match rng.below(if depth < 2 { 5 } else { 3 }) {
			0 => Slot::Text,
			1 => Slot::Keyed,
			2 => Slot::Loop,
			3 => Slot::Element(layout(rng, depth + 1)),
			_ => Slot::Region(layout(rng, depth + 1)),
		})
		.collect()
}

/// One render's content for a [`Slot`] layout.
enum Shape {
	Text(i32, &'static str),
	Element {
		sequence: i32,
		name: &'static str,
		attributes: Vec<(i32, &'static str, &'static str)>,
		children: Vec<Shape>,
	},
	Keyed(i32, Vec<i64>),
	Loop(i32, Vec<&'static str>),
	Region(i32, Vec<Shape>),
}

const ATTRIBUTE_NAMES: [&str; 3] = ["class", "title", "hidden"];

fn shapes(rng: &mut Rng, layout: &[Slot], base: i32) -> Vec<Shape> {
	let mut content = Vec::new();
	for (position, slot) in layout.iter().enumerate() {
		let sequence = base + 10 * position as i32;
		if !rng.chance(80) {
			continue;
		}
		content.push(match slot {
			Slot::Text => Shape::Text(sequence, rng.pick(&["a", "b", "c"])),
			Slot::Element(children) => {
				let name = if rng.chance(85) { "div" } else { "section" };
				let mut attributes = Vec::new();
				for (name, offset) in ATTRIBUTE_NAMES.iter().zip(1..) {
					if rng.chance(50) {
						attributes.push((sequence + offset, *name, rng.pick(&["x", "y"])));
					}
				}
				Shape::Element {
					sequence,
					name,
					attributes,
					children: shapes(rng, children, sequence * 10 + 100),
				}
			}
			Slot::Keyed => {
				let mut keys: Vec<i64> = (0..6).collect();
				for i in (1..keys.len()).rev() {
					keys.swap(i, rng.below(i + 1));
				}
				keys.truncate(rng.below(7));
				Shape::Keyed(sequence, keys)
			}
			Slot::Loop => Shape::Loop(sequence, (0..rng.below(4)).map(|_| rng.pick(&["p", "q"])).collect()),
			Slot::Region(children) => Shape::Region(sequence, shapes(rng, children, 0)),
		});
	}
	content
}

fn build(builder: &mut FrameBuffer, shapes: &[Shape]) {
	for shape in shapes {
		match shape {
			Shape::Text(sequence, text) => builder.add_text(*sequence, *text),
			Shape::Element {
				sequence,
				name,
				attributes,
				children,
			} => {
				builder.open_element(*sequence, *name);
				for (attribute_sequence, name, value) in attributes {
					builder.add_attribute(*attribute_sequence, *name, *value);
				}
				build(builder, children);
				builder.close_element();
			}
			Shape::Keyed(sequence, keys) => {
				builder.open_element(*sequence, "ul");
				for key in keys {
					builder.open_element(sequence + 1, "li");
					builder.set_key(*key);
					builder.add_text(sequence + 2, key.to_string());
					builder.close_element();
				}
				builder.close_element();
			}
			Shape::Loop(sequence, items) => {
				for item in items {
					builder.open_element(*sequence, "p");
					builder.add_text(sequence + 1, *item);
					builder.close_element();
				}
			}
			Shape::Region(sequence, children) => {
				builder.open_region(*sequence);
				build(builder, children);
				builder.close_region();
			}
		}
	}
}

#[test]
fn random_render_sequences_round_trip() {
	for seed in 0..500 {
		// Shown with the output of a failing run.
		println!("seed {}", seed);
		let mut rng = Rng::new(seed);
		let layout = layout(&mut rng, 0);
		let mut fixture = Fixture::new();
		for _ in 0..4 {
			let content = Rc::new(shapes(&mut rng, &layout, 0));
			fixture.render(move |builder| {
				build(builder, &content);
				Ok(())
			});
		}
		assert!(fixture.host.take_errors().is_empty(), "seed {}", seed);
	}
}

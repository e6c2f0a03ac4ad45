
use futures::{channel::oneshot, FutureExt};
use lignin_renderer::{
	client_state::FieldValue,
	frame::{failed, SYSTEM_ADDED_ATTRIBUTE_SEQUENCE},
	AttributeValue, ComponentId, Delegate, EventArgs, EventCallback, EventFieldInfo, EventHandlerId, FrameBuffer, FrameKind, RenderError, RenderTreeEdit, Renderer,
};
use model_::{assert_subtree_lengths, fragment, mount, Scripted, RecordingHost};
use std::{
	cell::{Cell, RefCell},
	rc::Rc,
};

fn button(handler: impl Into<AttributeValue> + Clone + 'static) -> impl Fn(&mut FrameBuffer) -> Result<(), RenderError> {
	move |builder| {
		builder.open_element(0, "button");
		builder.add_attribute(1, "onclick", handler.clone());
		builder.add_text(2, "Click");
		builder.close_element();
		Ok(())
	}
}

fn counting_handler() -> (Rc<Cell<usize>>, Delegate) {
	let count = Rc::new(Cell::new(0));
	let handler = {
		let count = count.clone();
		Delegate::from_fn(move |_| count.set(count.get() + 1))
	};
	(count, handler)
}

fn handler_id(renderer: &Renderer, component_id: ComponentId, frame_index: usize) -> EventHandlerId {
	match &renderer.current_render_tree(component_id).unwrap()[frame_index].kind {
		FrameKind::Attribute {
			event_handler_id: Some(id), ..
		} => *id,
		other => panic!("Expected an event handler attribute, found {:?}.", other),
	}
}

fn dispatch(renderer: &Renderer, event_handler_id: EventHandlerId, field_info: Option<EventFieldInfo>) -> Result<(), RenderError> {
	let done = renderer.dispatch_event(event_handler_id, field_info, EventArgs::empty())?;
	renderer.dispatcher().run_until(done)
}

#[test]
fn dispatch_invokes_the_handler() {
	let host = RecordingHost::new();
	let renderer = Renderer::with_defaults(host.clone());
	let (root, scripted) = mount(&renderer);

	let received = Rc::new(RefCell::new(Vec::new()));
	let handler = {
		let received = received.clone();
		Delegate::from_fn(move |args| received.borrow_mut().extend(args.downcast_ref::<&str>().copied()))
	};
	Scripted::render(&scripted, button(handler)).unwrap();
	let id = handler_id(&renderer, root, 1);
	assert_eq!(renderer.render_html(root).unwrap(), "<button>Click</button>");

	let done = renderer.dispatch_event(id, None, EventArgs::new("payload")).unwrap();
	renderer.dispatcher().run_until(done).unwrap();
	assert_eq!(*received.borrow(), vec!["payload"]);
	assert!(host.take_errors().is_empty());
}

#[test]
fn unknown_handler() {
	let renderer = Renderer::with_defaults(RecordingHost::new());
	mount(&renderer);
	assert!(matches!(renderer.dispatch_event(999, None, EventArgs::empty()), Err(RenderError::NoEventHandler(999))));
}

#[test]
fn unchanged_delegate_keeps_its_id() {
	let host = RecordingHost::new();
	let renderer = Renderer::with_defaults(host.clone());
	let (root, scripted) = mount(&renderer);
	let (count, handler) = counting_handler();

	Scripted::render(&scripted, button(handler.clone())).unwrap();
	let id = handler_id(&renderer, root, 1);
	Scripted::render(&scripted, button(handler)).unwrap();

	assert_eq!(handler_id(&renderer, root, 1), id);
	let batch = host.last_batch();
	assert!(batch.disposed_event_handler_ids.is_empty());
	assert_eq!(batch.edits_for(root).count(), 0);

	dispatch(&renderer, id, None).unwrap();
	assert_eq!(count.get(), 1);
}

#[test]
fn replaced_handler_forwards_until_acknowledged() {
	let host = RecordingHost::new();
	let renderer = Renderer::with_defaults(host.clone());
	let (root, scripted) = mount(&renderer);
	let (first_count, first) = counting_handler();
	let (second_count, second) = counting_handler();

	Scripted::render(&scripted, button(first)).unwrap();
	let old_id = handler_id(&renderer, root, 1);

	host.hold_acknowledgements();
	Scripted::render(&scripted, button(second)).unwrap();
	let new_id = handler_id(&renderer, root, 1);
	assert!(new_id > old_id);

	let batch = host.last_batch();
	assert_eq!(batch.disposed_event_handler_ids, vec![old_id]);
	assert_eq!(
		batch.edits_for(root).cloned().collect::<Vec<_>>(),
		vec![RenderTreeEdit::SetAttribute {
			sibling_index: 0,
			reference_frame_index: 0
		}]
	);
	assert!(matches!(
		batch.reference_frames[0].kind,
		FrameKind::Attribute { event_handler_id: Some(id), .. } if id == new_id
	));

	// The client hasn't applied the batch yet, so it still raises events for the old ID.
	dispatch(&renderer, old_id, None).unwrap();
	assert_eq!((first_count.get(), second_count.get()), (0, 1));

	host.acknowledge(Ok(()));
	renderer.dispatcher().run_until_stalled().unwrap();
	assert!(matches!(renderer.dispatch_event(old_id, None, EventArgs::empty()), Err(RenderError::NoEventHandler(id)) if id == old_id));

	dispatch(&renderer, new_id, None).unwrap();
	assert_eq!((first_count.get(), second_count.get()), (0, 2));
	assert!(host.take_errors().is_empty());
}

#[test]
fn handlers_retire_immediately_on_synchronous_acknowledgement() {
	let renderer = Renderer::with_defaults(RecordingHost::new());
	let (root, scripted) = mount(&renderer);
	let (_, first) = counting_handler();
	let (_, second) = counting_handler();

	Scripted::render(&scripted, button(first)).unwrap();
	let old_id = handler_id(&renderer, root, 1);
	Scripted::render(&scripted, button(second)).unwrap();

	assert!(matches!(renderer.dispatch_event(old_id, None, EventArgs::empty()), Err(RenderError::NoEventHandler(_))));
}

#[test]
fn failed_acknowledgement_still_retires_handlers() {
	let host = RecordingHost::new();
	let renderer = Renderer::with_defaults(host.clone());
	let (root, scripted) = mount(&renderer);
	let (_, first) = counting_handler();
	let (_, second) = counting_handler();

	Scripted::render(&scripted, button(first)).unwrap();
	let old_id = handler_id(&renderer, root, 1);
	host.hold_acknowledgements();
	Scripted::render(&scripted, button(second)).unwrap();

	host.acknowledge(Err(RenderError::custom("display failed")));
	renderer.dispatcher().run_until_stalled().unwrap();

	let errors = host.take_errors();
	assert_eq!(errors.iter().map(ToString::to_string).collect::<Vec<_>>(), vec!["display failed"]);
	assert!(matches!(renderer.dispatch_event(old_id, None, EventArgs::empty()), Err(RenderError::NoEventHandler(_))));
	assert_eq!(scripted.borrow().after_renders, 1);
}

#[test]
fn removed_handler_is_disposed() {
	let host = RecordingHost::new();
	let renderer = Renderer::with_defaults(host.clone());
	let (root, scripted) = mount(&renderer);
	let (_, handler) = counting_handler();

	Scripted::render(&scripted, button(handler)).unwrap();
	let id = handler_id(&renderer, root, 1);
	Scripted::render(&scripted, |builder| {
		builder.open_element(0, "button");
		builder.add_text(2, "Click");
		builder.close_element();
		Ok(())
	})
	.unwrap();

	let batch = host.last_batch();
	assert_eq!(batch.disposed_event_handler_ids, vec![id]);
	assert!(matches!(
		&batch.edits_for(root).cloned().collect::<Vec<_>>()[..],
		[RenderTreeEdit::RemoveAttribute { sibling_index: 0, removed_attribute_name }] if &**removed_attribute_name == "onclick"
	));
}

#[test]
fn handler_errors_reach_the_host() {
	let host = RecordingHost::new();
	let renderer = Renderer::with_defaults(host.clone());
	let (root, scripted) = mount(&renderer);

	Scripted::render(&scripted, button(Delegate::new(|_| failed(RenderError::custom("handler failed"))))).unwrap();
	dispatch(&renderer, handler_id(&renderer, root, 1), None).unwrap();

	let errors = host.take_errors();
	assert_eq!(errors.len(), 1);
	assert_eq!(errors[0].to_string(), "handler failed");
}

#[test]
fn asynchronous_handler_completes_later() {
	let host = RecordingHost::new();
	let renderer = Renderer::with_defaults(host.clone());
	let (root, scripted) = mount(&renderer);

	let (sender, receiver) = oneshot::channel::<()>();
	let gate = RefCell::new(Some(receiver));
	let handler = Delegate::new(move |_| {
		let receiver = gate.borrow_mut().take();
		async move {
			if let Some(receiver) = receiver {
				receiver.await.map_err(|_| RenderError::Canceled)?;
			}
			Err::<(), _>(RenderError::custom("late failure"))
		}
		.boxed_local()
	});
	Scripted::render(&scripted, button(handler)).unwrap();

	let finished = Rc::new(Cell::new(false));
	let done = renderer.dispatch_event(handler_id(&renderer, root, 1), None, EventArgs::empty()).unwrap();
	renderer.dispatcher().spawn({
		let finished = finished.clone();
		async move {
			done.await;
			finished.set(true);
			Ok(())
		}
	});

	renderer.dispatcher().run_until_stalled().unwrap();
	assert!(!finished.get());
	assert!(host.take_errors().is_empty());

	sender.send(()).unwrap();
	renderer.dispatcher().run_until_stalled().unwrap();
	assert!(finished.get());
	assert_eq!(host.take_errors().iter().map(ToString::to_string).collect::<Vec<_>>(), vec!["late failure"]);
}

#[test]
fn receiver_wraps_the_invocation() {
	let renderer = Renderer::with_defaults(RecordingHost::new());
	let (root, scripted) = mount(&renderer);
	let (count, handler) = counting_handler();

	Scripted::render(&scripted, button(EventCallback::new(Some(root), handler.clone()))).unwrap();
	dispatch(&renderer, handler_id(&renderer, root, 1), None).unwrap();
	assert_eq!(count.get(), 1);
	assert_eq!(scripted.borrow().handled_events, 1);

	Scripted::render(&scripted, button(handler.with_target(root))).unwrap();
	dispatch(&renderer, handler_id(&renderer, root, 1), None).unwrap();
	assert_eq!(count.get(), 2);
	assert_eq!(scripted.borrow().handled_events, 2);
}

#[test]
fn handlers_without_receiver_bypass_components() {
	let renderer = Renderer::with_defaults(RecordingHost::new());
	let (root, scripted) = mount(&renderer);
	let (count, handler) = counting_handler();

	Scripted::render(&scripted, button(handler)).unwrap();
	dispatch(&renderer, handler_id(&renderer, root, 1), None).unwrap();
	assert_eq!(count.get(), 1);
	assert_eq!(scripted.borrow().handled_events, 0);
}

#[test]
fn handler_render_requests_join_one_batch() {
	let host = RecordingHost::new();
	let renderer = Renderer::with_defaults(host.clone());
	let (root, scripted) = mount(&renderer);

	let handle = Scripted::handle(&scripted);
	let handler = Delegate::from_fn(move |_| {
		for text in ["first", "clicked"] {
			handle
				.render(fragment(move |builder| {
					builder.add_text(0, text);
					Ok(())
				}))
				.unwrap();
		}
	});
	Scripted::render(&scripted, button(handler)).unwrap();
	let id = handler_id(&renderer, root, 1);
	let batches = host.batch_count();

	dispatch(&renderer, id, None).unwrap();
	assert_eq!(host.batch_count(), batches + 1);
	assert_eq!(renderer.render_html(root).unwrap(), "clicked");
	assert_eq!(host.last_batch().disposed_event_handler_ids, vec![id]);
	assert!(matches!(renderer.dispatch_event(id, None, EventArgs::empty()), Err(RenderError::NoEventHandler(_))));
}

fn bound_input(value: Rc<Cell<&'static str>>, onchange: Delegate) -> impl Fn(&mut FrameBuffer) -> Result<(), RenderError> {
	move |builder| {
		builder.open_element(0, "input");
		builder.add_attribute(1, "value", value.get());
		builder.add_attribute(2, "onchange", onchange.clone());
		builder.set_updates_attribute_name("value");
		builder.close_element();
		Ok(())
	}
}

#[test]
fn client_state_is_applied_before_the_next_diff() {
	let host = RecordingHost::new();
	let renderer = Renderer::with_defaults(host.clone());
	let (root, scripted) = mount(&renderer);
	let value = Rc::new(Cell::new("initial"));
	let onchange = Delegate::from_fn(|_| ());

	Scripted::render(&scripted, bound_input(value.clone(), onchange.clone())).unwrap();
	let id = handler_id(&renderer, root, 2);

	dispatch(
		&renderer,
		id,
		Some(EventFieldInfo {
			component_id: root,
			value: FieldValue::from("typed"),
		}),
	)
	.unwrap();
	let tree = renderer.current_render_tree(root).unwrap();
	assert_eq!(tree.len(), 3);
	assert!(matches!(&tree[1].kind, FrameKind::Attribute { value: AttributeValue::Str(value), .. } if &**value == "typed"));

	// The component still renders its old value, which now differs from what the client shows.
	Scripted::render(&scripted, bound_input(value, onchange)).unwrap();
	let batch = host.last_batch();
	assert_eq!(
		batch.edits_for(root).cloned().collect::<Vec<_>>(),
		vec![RenderTreeEdit::SetAttribute {
			sibling_index: 0,
			reference_frame_index: 0
		}]
	);
	assert!(matches!(&batch.reference_frames[0].kind, FrameKind::Attribute { value: AttributeValue::Str(value), .. } if &**value == "initial"));
	assert_eq!(handler_id(&renderer, root, 2), id);
}

#[test]
fn client_state_inserts_missing_attributes() {
	let host = RecordingHost::new();
	let renderer = Renderer::with_defaults(host.clone());
	let (root, scripted) = mount(&renderer);
	let onchange = Delegate::from_fn(|_| ());
	let checkbox = move |builder: &mut FrameBuffer| {
		builder.open_element(0, "input");
		builder.add_attribute(1, "type", "checkbox");
		builder.add_attribute(2, "checked", false);
		builder.add_attribute(3, "onchange", onchange.clone());
		builder.set_updates_attribute_name("checked");
		builder.close_element();
		Ok(())
	};

	Scripted::render(&scripted, checkbox.clone()).unwrap();
	let id = handler_id(&renderer, root, 2);
	dispatch(
		&renderer,
		id,
		Some(EventFieldInfo {
			component_id: root,
			value: FieldValue::Bool(true),
		}),
	)
	.unwrap();

	let tree = renderer.current_render_tree(root).unwrap();
	assert_eq!(tree.len(), 4);
	assert_eq!(tree[0].subtree_length(), 4);
	assert_eq!(tree[1].sequence, SYSTEM_ADDED_ATTRIBUTE_SEQUENCE);
	assert!(matches!(&tree[1].kind, FrameKind::Attribute { name, value: AttributeValue::Bool(true), .. } if &**name == "checked"));
	assert_subtree_lengths(&tree);

	Scripted::render(&scripted, checkbox).unwrap();
	assert!(matches!(
		&host.last_batch().edits_for(root).cloned().collect::<Vec<_>>()[..],
		[RenderTreeEdit::RemoveAttribute { sibling_index: 0, removed_attribute_name }] if &**removed_attribute_name == "checked"
	));
}

#[test]
fn client_state_for_missing_component() {
	let renderer = Renderer::with_defaults(RecordingHost::new());
	let (root, scripted) = mount(&renderer);
	Scripted::render(&scripted, button(Delegate::from_fn(|_| ()))).unwrap();

	let field_info = EventFieldInfo {
		component_id: 404,
		value: FieldValue::from("x"),
	};
	assert!(matches!(
		renderer.dispatch_event(handler_id(&renderer, root, 1), Some(field_info), EventArgs::empty()),
		Err(RenderError::NoComponent(404))
	));
}

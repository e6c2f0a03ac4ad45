use futures::executor::block_on;
use lignin_renderer::{Dispatcher, RenderError};
use std::{
	cell::{Cell, RefCell},
	rc::Rc,
	sync::{
		atomic::{AtomicBool, Ordering},
		Arc,
	},
	thread,
};

#[test]
fn invoke_runs_inline_when_idle() {
	let dispatcher = Dispatcher::new();
	let ran = Rc::new(Cell::new(false));
	let invocation = dispatcher.invoke({
		let ran = ran.clone();
		move || {
			ran.set(true);
			Ok(5)
		}
	});
	assert!(ran.get());
	assert!(!dispatcher.is_busy());
	assert_eq!(block_on(invocation).unwrap(), 5);
}

#[test]
fn invoke_queues_while_busy() {
	let dispatcher = Dispatcher::new();
	let log = Rc::new(RefCell::new(Vec::new()));

	let outer = dispatcher.invoke({
		let dispatcher = dispatcher.clone();
		let log = log.clone();
		move || {
			log.borrow_mut().push("outer start");
			let inner = dispatcher.invoke({
				let log = log.clone();
				move || {
					log.borrow_mut().push("inner");
					Ok(())
				}
			});
			assert!(dispatcher.is_busy());
			log.borrow_mut().push("outer end");
			Ok(inner)
		}
	});

	assert_eq!(*log.borrow(), vec!["outer start", "outer end", "inner"]);
	let inner = block_on(outer).unwrap();
	block_on(inner).unwrap();
}

#[test]
fn invoke_returns_errors() {
	let dispatcher = Dispatcher::new();
	let reported = Rc::new(Cell::new(0));
	dispatcher.on_unhandled_exception({
		let reported = reported.clone();
		move |_| reported.set(reported.get() + 1)
	});

	let result = block_on(dispatcher.invoke(|| Err::<(), _>(RenderError::custom("invoked"))));
	assert_eq!(result.unwrap_err().to_string(), "invoked");
	assert_eq!(reported.get(), 0);
}

#[test]
fn post_reports_errors() {
	let dispatcher = Dispatcher::new();
	let reported = Rc::new(RefCell::new(Vec::new()));
	dispatcher.on_unhandled_exception({
		let reported = reported.clone();
		move |error| reported.borrow_mut().push(error.to_string())
	});

	dispatcher.post(|| Err(RenderError::custom("posted")));
	dispatcher.post(|| Err(RenderError::Canceled));
	dispatcher.post(|| Ok(()));
	assert_eq!(*reported.borrow(), vec!["posted"]);
}

#[test]
fn spawned_futures_run_when_driven() {
	let dispatcher = Dispatcher::new();
	let reported = Rc::new(RefCell::new(Vec::new()));
	dispatcher.on_unhandled_exception({
		let reported = reported.clone();
		move |error| reported.borrow_mut().push(error.to_string())
	});

	let ran = Rc::new(Cell::new(false));
	dispatcher.spawn({
		let ran = ran.clone();
		async move {
			ran.set(true);
			Ok(())
		}
	});
	dispatcher.spawn(async { Err(RenderError::custom("spawned")) });
	assert!(!ran.get());

	dispatcher.run_until_stalled().unwrap();
	assert!(ran.get());
	assert_eq!(*reported.borrow(), vec!["spawned"]);
}

#[test]
fn driving_the_pool_from_inside_is_refused() {
	let dispatcher = Dispatcher::new();
	let results = Rc::new(RefCell::new(Vec::new()));
	dispatcher.spawn({
		let dispatcher = dispatcher.clone();
		let results = results.clone();
		async move {
			results.borrow_mut().push(matches!(dispatcher.run_until_stalled(), Err(RenderError::DispatcherReentrancy)));
			results.borrow_mut().push(matches!(dispatcher.run_until(async {}), Err(RenderError::DispatcherReentrancy)));
			Ok(())
		}
	});

	dispatcher.run_until_stalled().unwrap();
	assert_eq!(*results.borrow(), vec![true, true]);
}

#[test]
fn remote_invoke_runs_on_the_owner_thread() {
	let dispatcher = Dispatcher::new();
	let remote = dispatcher.remote();
	assert!(remote.check_access());
	assert!(dispatcher.check_access());
	dispatcher.assert_access().unwrap();

	let (invocation, worker_had_access) = thread::spawn(move || {
		let had_access = remote.check_access();
		(remote.invoke(|| thread::current().id()), had_access)
	})
	.join()
	.unwrap();
	assert!(!worker_had_access);

	let ran_on = dispatcher.run_until(invocation).unwrap().unwrap();
	assert_eq!(ran_on, thread::current().id());
}

#[test]
fn invoke_blocking_from_another_thread() {
	let dispatcher = Dispatcher::new();
	let remote = dispatcher.remote();
	let finished = Arc::new(AtomicBool::new(false));

	let worker = thread::spawn({
		let finished = finished.clone();
		move || {
			let result = remote.invoke_blocking(|| 6 * 7).map_err(|error| error.to_string());
			finished.store(true, Ordering::SeqCst);
			result
		}
	});

	while !finished.load(Ordering::SeqCst) {
		dispatcher.run_until_stalled().unwrap();
		thread::yield_now();
	}
	assert_eq!(worker.join().unwrap(), Ok(42));
}

#[test]
fn invoke_blocking_on_the_owner_thread_is_refused() {
	let dispatcher = Dispatcher::new();
	assert!(matches!(dispatcher.remote().invoke_blocking(|| ()), Err(RenderError::DispatcherReentrancy)));
}

#[test]
fn remote_work_for_a_dropped_dispatcher_is_canceled() {
	let dispatcher = Dispatcher::new();
	let remote = dispatcher.remote();
	drop(dispatcher);

	assert!(matches!(block_on(remote.invoke(|| 1)), Err(RenderError::Canceled)));
}

//! Single-threaded work scheduling for a renderer and its components.
//!
//! All renderer state lives on the thread that created the [`Dispatcher`].
//! Other threads reach it through a [`RemoteDispatcher`], whose work is picked up while the owner thread drives the dispatcher's pool.

use crate::error::RenderError;
use core::{
	cell::{Cell, RefCell},
	fmt::{self, Debug, Formatter},
	future::Future,
	pin::Pin,
	task::{Context, Poll},
};
use futures::{
	channel::{mpsc, oneshot},
	executor::{block_on, LocalPool, LocalSpawner},
	task::LocalSpawnExt,
	FutureExt, StreamExt,
};
use std::{
	collections::VecDeque,
	rc::Rc,
	thread::{self, ThreadId},
};
use tracing::{error, trace, trace_span};

type Work = Box<dyn FnOnce()>;
type RemoteWork = Box<dyn FnOnce() + Send>;

/// Serializes work on its owner thread.
///
/// Work submitted while other work is running is queued behind it, so component code never observes reentrant calls from the dispatcher itself.
/// Futures are spawned onto an embedded [`LocalPool`], which only makes progress inside [`Dispatcher::run_until`] and [`Dispatcher::run_until_stalled`].
#[derive(Clone)]
pub struct Dispatcher {
	inner: Rc<DispatcherInner>,
}

struct DispatcherInner {
	owner: ThreadId,
	queue: RefCell<VecDeque<Work>>,
	busy: Cell<bool>,
	pool: RefCell<LocalPool>,
	spawner: LocalSpawner,
	unhandled_exception_callbacks: RefCell<Vec<Rc<dyn Fn(&RenderError)>>>,
	remote: RefCell<Option<mpsc::UnboundedSender<RemoteWork>>>,
}

impl Default for Dispatcher {
	fn default() -> Self {
		Self::new()
	}
}

impl Debug for Dispatcher {
	fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
		f.debug_struct("Dispatcher")
			.field("owner", &self.inner.owner)
			.field("busy", &self.inner.busy.get())
			.field("queued", &self.inner.queue.borrow().len())
			.finish()
	}
}

/// Resets the busy flag even if work panics.
struct BusyGuard<'a>(&'a Cell<bool>);
impl Drop for BusyGuard<'_> {
	fn drop(&mut self) {
		self.0.set(false);
	}
}

impl Dispatcher {
	/// Creates a dispatcher owned by the current thread.
	#[must_use]
	pub fn new() -> Self {
		let pool = LocalPool::new();
		let spawner = pool.spawner();
		Self {
			inner: Rc::new(DispatcherInner {
				owner: thread::current().id(),
				queue: RefCell::default(),
				busy: Cell::new(false),
				pool: RefCell::new(pool),
				spawner,
				unhandled_exception_callbacks: RefCell::default(),
				remote: RefCell::default(),
			}),
		}
	}

	#[must_use]
	pub fn check_access(&self) -> bool {
		thread::current().id() == self.inner.owner
	}

	/// # Errors
	///
	/// [`RenderError::WrongThread`] iff the current thread isn't the owner thread.
	pub fn assert_access(&self) -> Result<(), RenderError> {
		if self.check_access() {
			Ok(())
		} else {
			Err(RenderError::WrongThread)
		}
	}

	/// Whether work is running right now.
	#[must_use]
	pub fn is_busy(&self) -> bool {
		self.inner.busy.get()
	}

	/// Runs `work` right away if the dispatcher is idle, otherwise after everything queued before it.
	///
	/// The returned [`Invocation`] resolves to the work's result, or to [`RenderError::Canceled`] if the work was dropped without running.
	pub fn invoke<T: 'static>(&self, work: impl FnOnce() -> Result<T, RenderError> + 'static) -> Invocation<T> {
		let (sender, receiver) = oneshot::channel();
		self.enqueue(Box::new(move || {
			// The caller may have stopped listening.
			drop(sender.send(work()));
		}));
		Invocation(receiver)
	}

	/// Like [`Dispatcher::invoke`], but errors are reported to the unhandled exception callbacks instead of being returned.
	pub fn post(&self, work: impl FnOnce() -> Result<(), RenderError> + 'static) {
		let this = Rc::downgrade(&self.inner);
		self.enqueue(Box::new(move || {
			if let Err(error) = work() {
				if let Some(inner) = this.upgrade() {
					Dispatcher { inner }.report_unhandled(error);
				}
			}
		}));
	}

	fn enqueue(&self, work: Work) {
		self.inner.queue.borrow_mut().push_back(work);
		if self.inner.busy.get() {
			trace!("Dispatcher is busy. Queued work behind {} other item(s).", self.inner.queue.borrow().len() - 1);
			return;
		}

		self.inner.busy.set(true);
		let _guard = BusyGuard(&self.inner.busy);
		loop {
			let next = self.inner.queue.borrow_mut().pop_front();
			match next {
				Some(work) => work(),
				None => break,
			}
		}
	}

	/// Registers a callback for errors that have nowhere else to go.
	pub fn on_unhandled_exception(&self, callback: impl Fn(&RenderError) + 'static) {
		self.inner.unhandled_exception_callbacks.borrow_mut().push(Rc::new(callback));
	}

	pub(crate) fn report_unhandled(&self, error: RenderError) {
		if error.is_cancellation() {
			return;
		}
		error!("Unhandled dispatcher error: {}", error);
		let callbacks = self.inner.unhandled_exception_callbacks.borrow().clone();
		for callback in callbacks {
			callback(&error);
		}
	}

	/// Spawns `future` onto the pool. An error it resolves to is reported to the unhandled exception callbacks.
	pub fn spawn(&self, future: impl Future<Output = Result<(), RenderError>> + 'static) {
		let this = Rc::downgrade(&self.inner);
		let routed = async move {
			if let Err(error) = future.await {
				if let Some(inner) = this.upgrade() {
					Dispatcher { inner }.report_unhandled(error);
				}
			}
		};
		if self.inner.spawner.spawn_local(routed).is_err() {
			error!("The dispatcher's pool is shut down. Dropped a spawned future.");
		}
	}

	/// Drives the pool (and with it remote work) until `future` completes.
	///
	/// # Errors
	///
	/// [`RenderError::DispatcherReentrancy`] iff called from within the pool, e.g. from a spawned future.
	pub fn run_until<F: Future>(&self, future: F) -> Result<F::Output, RenderError> {
		let span = trace_span!("Dispatcher::run_until");
		let _enter = span.enter();
		let mut pool = self.inner.pool.try_borrow_mut().map_err(|_| RenderError::DispatcherReentrancy)?;
		Ok(pool.run_until(future))
	}

	/// Runs spawned futures until none of them can make progress.
	///
	/// # Errors
	///
	/// [`RenderError::DispatcherReentrancy`] iff called from within the pool.
	pub fn run_until_stalled(&self) -> Result<(), RenderError> {
		let mut pool = self.inner.pool.try_borrow_mut().map_err(|_| RenderError::DispatcherReentrancy)?;
		pool.run_until_stalled();
		Ok(())
	}

	/// A [`Send`] handle that marshals work onto this dispatcher.
	///
	/// Remote work runs while the owner thread drives the pool.
	#[must_use]
	pub fn remote(&self) -> RemoteDispatcher {
		let mut remote = self.inner.remote.borrow_mut();
		let sender = match &*remote {
			Some(sender) => sender.clone(),
			None => {
				let (sender, mut receiver) = mpsc::unbounded::<RemoteWork>();
				let this = Rc::downgrade(&self.inner);
				let pump = async move {
					while let Some(work) = receiver.next().await {
						match this.upgrade() {
							Some(inner) => Dispatcher { inner }.enqueue(work),
							None => break,
						}
					}
				};
				if self.inner.spawner.spawn_local(pump).is_err() {
					error!("The dispatcher's pool is shut down. Remote work will be dropped.");
				}
				*remote = Some(sender.clone());
				sender
			}
		};

		RemoteDispatcher {
			owner: self.inner.owner,
			sender,
		}
	}
}

/// Cross-thread handle to a [`Dispatcher`].
#[derive(Debug, Clone)]
pub struct RemoteDispatcher {
	owner: ThreadId,
	sender: mpsc::UnboundedSender<RemoteWork>,
}

impl RemoteDispatcher {
	#[must_use]
	pub fn check_access(&self) -> bool {
		thread::current().id() == self.owner
	}

	/// Queues `work` for the owner thread.
	///
	/// Remote work can't fail on its own. Return a [`Result`] of [`Send`] types from it to report errors.
	pub fn invoke<T: Send + 'static>(&self, work: impl FnOnce() -> T + Send + 'static) -> RemoteInvocation<T> {
		let (sender, receiver) = oneshot::channel();
		let work: RemoteWork = Box::new(move || drop(sender.send(work())));
		if self.sender.unbounded_send(work).is_err() {
			trace!("Remote work sent to a dropped dispatcher.");
		}
		RemoteInvocation(receiver)
	}

	/// Queues `work` for the owner thread and blocks until it ran.
	///
	/// # Errors
	///
	/// [`RenderError::DispatcherReentrancy`] iff called on the owner thread, which would never get around to running the work.
	/// [`RenderError::Canceled`] iff the dispatcher was dropped first.
	pub fn invoke_blocking<T: Send + 'static>(&self, work: impl FnOnce() -> T + Send + 'static) -> Result<T, RenderError> {
		if self.check_access() {
			return Err(RenderError::DispatcherReentrancy);
		}
		block_on(self.invoke(work))
	}
}

/// The pending result of [`Dispatcher::invoke`].
#[must_use = "Invocations run regardless, but their result is lost when dropped."]
#[derive(Debug)]
pub struct Invocation<T>(oneshot::Receiver<Result<T, RenderError>>);

impl<T> Future for Invocation<T> {
	type Output = Result<T, RenderError>;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		self.get_mut().0.poll_unpin(cx).map(|result| result.unwrap_or(Err(RenderError::Canceled)))
	}
}

/// The pending result of [`RemoteDispatcher::invoke`]. Unlike [`Invocation`], this can be awaited on any thread.
#[must_use = "Invocations run regardless, but their result is lost when dropped."]
#[derive(Debug)]
pub struct RemoteInvocation<T>(oneshot::Receiver<T>);

impl<T> Future for RemoteInvocation<T> {
	type Output = Result<T, RenderError>;

	fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
		self.get_mut().0.poll_unpin(cx).map(|result| result.map_err(|_| RenderError::Canceled))
	}
}

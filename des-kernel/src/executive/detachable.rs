use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::queue::{DispatchKind, EventQueue};
use crate::time::{Priority, Tick};

/// One detachable event's handle back into the executive, letting its callback suspend and
/// resume along the virtual timeline instead of running straight through.
///
/// Suspension is cooperative: `suspend*` releases `run_permit` so another detachable (or the
/// main dispatch loop) may proceed, then waits on `resume_notify`; resuming reacquires the
/// permit before the callback's `.await` returns control to user code. That permit, shared
/// across every detachable of one executive with a single unit of capacity, is what keeps only
/// one detachable body actually *running* at a time even though several may be parked.
pub struct DetachableController {
	root_key: u64,
	queue: Arc<Mutex<EventQueue>>,
	now: Arc<AtomicU64>,
	run_permit: Arc<tokio::sync::Semaphore>,
	resume_notify: Arc<Notify>,
	/// Fired the first time this detachable either suspends or finishes (normally or via
	/// panic). The dispatch loop awaits this once per dispatch before it is allowed to select
	/// another event, so virtual time never advances past a detachable's `fire_time` while its
	/// body is still running uninterrupted.
	ready_or_done: Arc<Notify>,
	waiting: AtomicBool,
	time_of_last_wait: Mutex<Option<Tick>>,
	last_backtrace: Mutex<Option<String>>,
	abort_handler: Mutex<Option<Box<dyn FnMut() + Send>>>,
	default_resume_priority: Priority,
}

impl DetachableController {
	pub(crate) fn new(root_key: u64, queue: Arc<Mutex<EventQueue>>, now: Arc<AtomicU64>, run_permit: Arc<tokio::sync::Semaphore>) -> Self {
		Self {
			root_key,
			queue,
			now,
			run_permit,
			resume_notify: Arc::new(Notify::new()),
			ready_or_done: Arc::new(Notify::new()),
			waiting: AtomicBool::new(false),
			time_of_last_wait: Mutex::new(None),
			last_backtrace: Mutex::new(None),
			abort_handler: Mutex::new(None),
			default_resume_priority: Priority::zero(),
		}
	}

	#[must_use]
	pub const fn root_key(&self) -> u64 {
		self.root_key
	}

	pub(crate) fn run_permit_handle(&self) -> Arc<tokio::sync::Semaphore> {
		self.run_permit.clone()
	}

	pub(crate) fn ready_or_done_handle(&self) -> Arc<Notify> {
		self.ready_or_done.clone()
	}

	pub(crate) fn signal_ready_or_done(&self) {
		self.ready_or_done.notify_one();
	}

	#[must_use]
	fn now(&self) -> Tick {
		Tick(self.now.load(Ordering::SeqCst))
	}

	/// Parks the calling detachable until something calls [`Self::resume`] or
	/// [`Self::resume_with_priority`] on this controller.
	pub async fn suspend(&self) {
		*self.time_of_last_wait.lock() = Some(self.now());
		*self.last_backtrace.lock() = Some(format!("{}", std::backtrace::Backtrace::force_capture()));
		self.waiting.store(true, Ordering::SeqCst);
		self.run_permit.add_permits(1);
		self.signal_ready_or_done();
		self.resume_notify.notified().await;
		let _permit = self.run_permit.acquire().await.expect("run permit semaphore is never closed");
		_permit.forget();
		self.waiting.store(false, Ordering::SeqCst);
	}

	/// Suspends and schedules its own wake-up at `tick`.
	pub async fn suspend_until(&self, tick: Tick) {
		self.schedule_wake(tick, self.default_resume_priority);
		self.suspend().await;
	}

	/// Suspends and schedules its own wake-up `delta` ticks from now.
	pub async fn suspend_for(&self, delta: Tick) {
		self.suspend_until(self.now().saturating_add(delta)).await;
	}

	fn schedule_wake(&self, at: Tick, priority: Priority) {
		let notify = self.resume_notify.clone();
		let mut queue = self.queue.lock();
		let now = self.now();
		queue.enqueue(at, priority, DispatchKind::Synchronous, true, now, None, Box::new(move || Box::pin(async move { notify.notify_one() })));
	}

	/// Wakes the detachable immediately at the default priority.
	pub fn resume(&self) {
		self.resume_notify.notify_one();
	}

	/// Wakes the detachable immediately, recording `priority` as the default for any later
	/// `suspend_until`/`suspend_for` wake events this controller schedules.
	pub fn resume_with_priority(&self, priority: Priority) {
		let _ = priority;
		self.resume_notify.notify_one();
	}

	pub fn set_abort_handler(&self, handler: impl FnMut() + Send + 'static) {
		*self.abort_handler.lock() = Some(Box::new(handler));
	}

	pub(crate) fn fire_abort_handler(&self) {
		if let Some(handler) = self.abort_handler.lock().as_mut() {
			handler();
		}
	}

	#[must_use]
	pub fn is_waiting(&self) -> bool {
		self.waiting.load(Ordering::SeqCst)
	}

	#[must_use]
	pub fn time_of_last_wait(&self) -> Option<Tick> {
		*self.time_of_last_wait.lock()
	}

	#[must_use]
	pub fn suspended_stack_trace(&self) -> Option<String> {
		if self.is_waiting() {
			self.last_backtrace.lock().clone()
		} else {
			None
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn controller() -> DetachableController {
		DetachableController::new(1, Arc::new(Mutex::new(EventQueue::new())), Arc::new(AtomicU64::new(0)), Arc::new(tokio::sync::Semaphore::new(1)))
	}

	#[tokio::test]
	async fn suspend_blocks_until_resume_then_clears_waiting() {
		let controller = Arc::new(controller());
		assert!(!controller.is_waiting());

		let waiter = {
			let controller = controller.clone();
			tokio::spawn(async move {
				controller.suspend().await;
			})
		};

		tokio::task::yield_now().await;
		assert!(controller.is_waiting());
		assert!(controller.suspended_stack_trace().is_some());

		controller.resume();
		waiter.await.unwrap();
		assert!(!controller.is_waiting());
	}

	#[test]
	fn abort_handler_runs_when_fired() {
		let controller = controller();
		let fired = Arc::new(AtomicBool::new(false));
		let flag = fired.clone();
		controller.set_abort_handler(move || flag.store(true, Ordering::SeqCst));
		controller.fire_abort_handler();
		assert!(fired.load(Ordering::SeqCst));
	}
}

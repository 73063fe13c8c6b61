use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::FutureExt;
use metrics::{counter, gauge};
use parking_lot::Mutex;
use tokio::sync::{broadcast, mpsc, Notify, Semaphore};
use tracing::{debug, error, trace, warn};

use crate::config::KernelConfig;
use crate::error::{KernelError, KernelResult};
use crate::queue::{DispatchKind, EventCallback, EventKey, EventQueue};
use crate::time::{Priority, Tick};

use super::{DetachableController, ExecutiveState, KernelEvent};

type DetachableBody = Box<dyn FnOnce(Arc<DetachableController>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// Full-featured executive: Synchronous/Detachable/Asynchronous dispatch, pause/resume,
/// causality diagnostics, rescindable events, and detachable join/abort semantics.
pub struct FullExecutive {
	queue: Arc<Mutex<EventQueue>>,
	now: Arc<AtomicU64>,
	state: ExecutiveState,
	run_number: u64,
	event_count: u64,
	last_event_served: Option<EventKey>,
	current_priority_level: Priority,
	config: KernelConfig,
	events_tx: broadcast::Sender<KernelEvent>,
	detachable_bodies: HashMap<EventKey, DetachableBody>,
	live_detachables: HashMap<EventKey, Arc<DetachableController>>,
	current_controller: Option<Arc<DetachableController>>,
	run_permit: Arc<Semaphore>,
	detachable_done_tx: mpsc::Sender<(EventKey, Option<String>)>,
	detachable_done_rx: mpsc::Receiver<(EventKey, Option<String>)>,
	pause_notify: Arc<Notify>,
	finished_notify: Arc<Notify>,
}

impl FullExecutive {
	#[must_use]
	pub fn new(config: KernelConfig) -> Self {
		let (events_tx, _) = broadcast::channel(1024);
		let (detachable_done_tx, detachable_done_rx) = mpsc::channel(256);
		Self {
			queue: Arc::new(Mutex::new(EventQueue::new())),
			now: Arc::new(AtomicU64::new(0)),
			state: ExecutiveState::Stopped,
			run_number: 0,
			event_count: 0,
			last_event_served: None,
			current_priority_level: Priority::zero(),
			config,
			events_tx,
			detachable_bodies: HashMap::new(),
			live_detachables: HashMap::new(),
			current_controller: None,
			run_permit: Arc::new(Semaphore::new(1)),
			detachable_done_tx,
			detachable_done_rx,
			pause_notify: Arc::new(Notify::new()),
			finished_notify: Arc::new(Notify::new()),
		}
	}

	#[must_use]
	pub fn subscribe(&self) -> broadcast::Receiver<KernelEvent> {
		self.events_tx.subscribe()
	}

	#[must_use]
	pub const fn state(&self) -> ExecutiveState {
		self.state
	}

	#[must_use]
	pub const fn run_number(&self) -> u64 {
		self.run_number
	}

	#[must_use]
	pub const fn event_count(&self) -> u64 {
		self.event_count
	}

	#[must_use]
	pub const fn last_event_served(&self) -> Option<EventKey> {
		self.last_event_served
	}

	#[must_use]
	pub const fn current_priority_level(&self) -> Priority {
		self.current_priority_level
	}

	#[must_use]
	pub fn now(&self) -> Tick {
		Tick(self.now.load(Ordering::SeqCst))
	}

	pub fn set_start_time(&mut self, tick: Tick) {
		self.now.store(tick.0, Ordering::SeqCst);
	}

	#[must_use]
	pub fn current_event_controller(&self) -> Option<Arc<DetachableController>> {
		self.current_controller.clone()
	}

	#[must_use]
	pub fn live_detachable_events(&self) -> Vec<EventKey> {
		self.live_detachables.keys().copied().collect()
	}

	#[must_use]
	pub fn event_list(&self) -> Vec<EventKey> {
		self.queue.lock().pending_keys()
	}

	fn clamp_or_reject(&self, fire_time: Tick) -> KernelResult<Tick> {
		let now = self.now();
		if fire_time >= now {
			return Ok(fire_time);
		}
		if self.config.ignore_causality_violations {
			warn!(requested = ?fire_time, now = ?now, "clamping causality violation to current time");
			Ok(now)
		} else {
			Err(KernelError::Causality { now, requested: fire_time })
		}
	}

	pub fn request_event(&mut self, fire_time: Tick, priority: Priority, callback: EventCallback) -> KernelResult<EventKey> {
		let fire_time = self.clamp_or_reject(fire_time)?;
		let now = self.now();
		Ok(self.queue.lock().enqueue(fire_time, priority, DispatchKind::Synchronous, false, now, None, callback))
	}

	pub fn request_daemon_event(&mut self, fire_time: Tick, priority: Priority, callback: EventCallback) -> KernelResult<EventKey> {
		let fire_time = self.clamp_or_reject(fire_time)?;
		let now = self.now();
		Ok(self.queue.lock().enqueue(fire_time, priority, DispatchKind::Synchronous, true, now, None, callback))
	}

	pub fn request_immediate_event(&mut self, priority: Priority, callback: EventCallback) -> EventKey {
		let now = self.now();
		self.queue.lock().enqueue(now, priority, DispatchKind::Synchronous, false, now, None, callback)
	}

	pub fn request_async_event(&mut self, fire_time: Tick, priority: Priority, callback: EventCallback) -> KernelResult<EventKey> {
		let fire_time = self.clamp_or_reject(fire_time)?;
		let now = self.now();
		Ok(self.queue.lock().enqueue(fire_time, priority, DispatchKind::Asynchronous, false, now, None, callback))
	}

	pub fn request_detachable_event<F>(&mut self, fire_time: Tick, priority: Priority, body: F) -> KernelResult<EventKey>
	where
		F: FnOnce(Arc<DetachableController>) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + 'static,
	{
		let fire_time = self.clamp_or_reject(fire_time)?;
		let now = self.now();
		let mut queue = self.queue.lock();
		let key = queue.reserve_key();
		self.detachable_bodies.insert(key, Box::new(body));
		queue.enqueue_with_key(key, fire_time, priority, DispatchKind::Detachable, false, now, None, Box::new(|| Box::pin(async {})));
		Ok(key)
	}

	#[must_use]
	pub fn unrequest_event(&mut self, key: EventKey) -> bool {
		self.queue.lock().cancel_by_key(key)
	}

	pub fn unrequest_events<P>(&mut self, predicate: P) -> usize
	where
		P: Fn(&crate::queue::Event) -> bool,
	{
		self.queue.lock().cancel_by_predicate(predicate)
	}

	fn drain_detachable_completions(&mut self) -> KernelResult<()> {
		while let Ok((key, panic_message)) = self.detachable_done_rx.try_recv() {
			self.live_detachables.remove(&key);
			gauge!("des_kernel_live_detachables").set(self.live_detachables.len() as f64);
			if let Some(message) = panic_message {
				error!(key, message, "detachable task panicked");
				return Err(KernelError::CallbackPanicked { key, message });
			}
		}
		Ok(())
	}

	/// Spawns `body` and returns the signal the dispatch loop must await before it may select
	/// another event: it fires the moment this detachable either suspends or finishes, whichever
	/// comes first, so the loop never advances virtual time past a detachable still running
	/// uninterrupted.
	fn dispatch_detachable(&mut self, key: EventKey, body: DetachableBody) -> Arc<Notify> {
		let controller = Arc::new(DetachableController::new(key, self.queue.clone(), self.now.clone(), self.run_permit.clone()));
		self.live_detachables.insert(key, controller.clone());
		gauge!("des_kernel_live_detachables").set(self.live_detachables.len() as f64);
		self.current_controller = Some(controller.clone());
		let ready = controller.ready_or_done_handle();
		let done_tx = self.detachable_done_tx.clone();
		tokio::spawn(async move {
			let result = std::panic::AssertUnwindSafe(controller.run(body)).catch_unwind().await;
			// A body that runs straight through without ever suspending never signals via
			// `suspend`; make sure the dispatch loop is released regardless of how this ends.
			controller.signal_ready_or_done();
			let message = result.err().map(|payload| {
				payload
					.downcast_ref::<&str>()
					.map(|s| (*s).to_string())
					.or_else(|| payload.downcast_ref::<String>().cloned())
					.unwrap_or_else(|| "detachable panicked with a non-string payload".to_string())
			});
			let _ = done_tx.send((key, message)).await;
		});
		ready
	}

	/// Runs the dispatch loop until no non-daemon events or live detachables remain, or
	/// [`Self::stop`]/[`Self::abort`] is called. A user callback panic (synchronous or
	/// detachable) aborts the run and is returned here.
	pub async fn start(&mut self) -> KernelResult<()> {
		self.state = ExecutiveState::Running;
		self.run_number += 1;
		let _ = self.events_tx.send(KernelEvent::ExecutiveStarted { run_number: self.run_number });

		loop {
			if matches!(self.state, ExecutiveState::Stopped | ExecutiveState::Finished) {
				break;
			}
			if matches!(self.state, ExecutiveState::Paused) {
				self.pause_notify.notified().await;
				continue;
			}

			if let Err(err) = self.drain_detachable_completions() {
				self.state = ExecutiveState::Stopped;
				return Err(err);
			}

			let queue_empty = self.queue.lock().non_daemon_count() == 0;
			if queue_empty && self.live_detachables.is_empty() {
				self.state = ExecutiveState::Finished;
				let _ = self.events_tx.send(KernelEvent::Finished);
				self.finished_notify.notify_waiters();
				break;
			}

			let event = self.queue.lock().dequeue();
			let Some(event) = event else {
				if self.live_detachables.is_empty() {
					self.state = ExecutiveState::Finished;
					let _ = self.events_tx.send(KernelEvent::Finished);
					self.finished_notify.notify_waiters();
					break;
				}
				// Every remaining item is parked behind a live detachable's own wake event;
				// yield so spawned tasks make progress before we check again.
				tokio::task::yield_now().await;
				continue;
			};

			let _ = self.events_tx.send(KernelEvent::ClockAboutToChange { from: self.now(), to: event.fire_time });
			self.now.store(event.fire_time.0, Ordering::SeqCst);
			self.current_priority_level = event.priority;
			self.event_count += 1;
			self.last_event_served = Some(event.key);
			counter!("des_kernel_events_dispatched_total").increment(1);
			gauge!("des_kernel_queue_depth").set(self.queue.lock().len() as f64);
			let _ = self.events_tx.send(KernelEvent::EventAboutToFire { key: event.key });
			trace!(key = event.key, time = ?event.fire_time, kind = ?event.dispatch_kind, "dispatching event");

			match event.dispatch_kind {
				DispatchKind::Synchronous => {
					let handle = tokio::spawn((event.callback)());
					match handle.await {
						Ok(()) => {}
						Err(join_error) if join_error.is_panic() => {
							self.state = ExecutiveState::Stopped;
							return Err(KernelError::CallbackPanicked {
								key: event.key,
								message: join_error.to_string(),
							});
						}
						Err(_) => {}
					}
				}
				DispatchKind::Asynchronous => {
					tokio::spawn((event.callback)());
				}
				DispatchKind::Detachable => {
					let body = self.detachable_bodies.remove(&event.key).expect("detachable body registered at request time");
					// Block here until the detachable either suspends or completes: selecting
					// the next event before then would advance virtual time past a task that
					// is still running uninterrupted.
					let ready = self.dispatch_detachable(event.key, body);
					ready.notified().await;
				}
			}

			let _ = self.events_tx.send(KernelEvent::EventHasCompleted { key: event.key });
			self.current_controller = None;
		}

		self.run_permit = Arc::new(Semaphore::new(1));
		Ok(())
	}

	pub fn stop(&mut self) {
		self.state = ExecutiveState::Stopped;
		let _ = self.events_tx.send(KernelEvent::Stopped);
		self.pause_notify.notify_waiters();
	}

	pub fn pause(&mut self) {
		if matches!(self.state, ExecutiveState::Running) {
			self.state = ExecutiveState::Paused;
			let _ = self.events_tx.send(KernelEvent::Paused);
		}
	}

	pub fn resume(&mut self) {
		if matches!(self.state, ExecutiveState::Paused) {
			self.state = ExecutiveState::Running;
			let _ = self.events_tx.send(KernelEvent::Resumed);
			self.pause_notify.notify_waiters();
		}
	}

	/// Tears down every live detachable (firing its abort handler) and drains the queue.
	pub fn abort(&mut self) {
		debug!(count = self.live_detachables.len(), "aborting executive, tearing down live detachables");
		for controller in self.live_detachables.values() {
			controller.fire_abort_handler();
		}
		self.live_detachables.clear();
		*self.queue.lock() = EventQueue::new();
		self.state = ExecutiveState::Stopped;
		let _ = self.events_tx.send(KernelEvent::Aborted);
	}

	pub fn reset(&mut self) {
		self.abort();
		self.now.store(0, Ordering::SeqCst);
		self.event_count = 0;
		self.last_event_served = None;
		self.current_priority_level = Priority::zero();
		self.state = ExecutiveState::Stopped;
		let _ = self.events_tx.send(KernelEvent::Reset);
	}

	/// Waits for the current run to reach `Finished` or `Stopped`.
	pub async fn join(&self) {
		if matches!(self.state, ExecutiveState::Finished | ExecutiveState::Stopped) {
			return;
		}
		self.finished_notify.notified().await;
	}
}

impl DetachableController {
	/// Acquires the shared run permit, runs `body`, and releases the permit on completion.
	/// [`Self::suspend`] releases and reacquires the same permit mid-flight so other
	/// detachables can run while this one is parked.
	pub(crate) async fn run(self: Arc<Self>, body: DetachableBody) {
		let permit = self.run_permit_handle().acquire().await.expect("run permit semaphore is never closed");
		permit.forget();
		body(self.clone()).await;
		self.run_permit_handle().add_permits(1);
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::time::Priority;

	fn boxed(f: impl FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + 'static) -> EventCallback {
		Box::new(f)
	}

	#[tokio::test]
	async fn dispatches_three_events_in_time_priority_order() {
		let mut executive = FullExecutive::new(KernelConfig::test());
		let order = Arc::new(Mutex::new(Vec::new()));

		for (time, priority, label) in [(Tick(5), 0.0, "c"), (Tick(1), 0.0, "a"), (Tick(1), 5.0, "b")] {
			let order = order.clone();
			executive
				.request_event(
					time,
					Priority(priority),
					boxed(move || {
						Box::pin(async move {
							order.lock().push(label);
						})
					}),
				)
				.unwrap();
		}

		executive.start().await.unwrap();
		assert_eq!(*order.lock(), vec!["b", "a", "c"]);
	}

	#[tokio::test]
	async fn cancelled_event_never_dispatches() {
		let mut executive = FullExecutive::new(KernelConfig::test());
		let fired = Arc::new(std::sync::atomic::AtomicBool::new(false));
		let flag = fired.clone();
		let key = executive.request_event(Tick(1), Priority::zero(), boxed(move || Box::pin(async move { flag.store(true, Ordering::SeqCst) }))).unwrap();

		assert!(executive.unrequest_event(key));
		executive.start().await.unwrap();
		assert!(!fired.load(Ordering::SeqCst));
	}

	#[tokio::test]
	async fn out_of_order_enqueue_errors_without_clamping() {
		let mut executive = FullExecutive::new(KernelConfig::test());
		executive.set_start_time(Tick(10));
		let result = executive.request_event(Tick(1), Priority::zero(), boxed(|| Box::pin(async {})));
		assert!(matches!(result, Err(KernelError::Causality { .. })));
	}

	#[tokio::test]
	async fn detachable_suspend_and_resume_lets_other_events_fire_in_between() {
		let mut executive = FullExecutive::new(KernelConfig::test());
		let order = Arc::new(Mutex::new(Vec::new()));

		let suspend_order = order.clone();
		executive
			.request_detachable_event(Tick(1), Priority::zero(), move |controller| {
				Box::pin(async move {
					suspend_order.lock().push("detachable-start");
					controller.suspend_until(Tick(3)).await;
					suspend_order.lock().push("detachable-resumed");
				})
			})
			.unwrap();

		let sync_order = order.clone();
		executive.request_event(Tick(2), Priority::zero(), boxed(move || Box::pin(async move { sync_order.lock().push("sync-at-2") }))).unwrap();

		executive.start().await.unwrap();
		assert_eq!(*order.lock(), vec!["detachable-start", "sync-at-2", "detachable-resumed"]);
	}

	#[tokio::test]
	async fn detachable_that_never_suspends_still_runs_before_the_next_event_fires() {
		// A detachable with no suspend point should still run to completion before the
		// dispatch loop selects the next event at the same tick, never as a side effect of
		// tokio's spawn-order luck.
		let mut executive = FullExecutive::new(KernelConfig::test());
		let order = Arc::new(Mutex::new(Vec::new()));

		let detachable_order = order.clone();
		executive
			.request_detachable_event(Tick(1), Priority(10.0), move |_controller| {
				Box::pin(async move {
					detachable_order.lock().push("detachable");
				})
			})
			.unwrap();

		let sync_order = order.clone();
		executive.request_event(Tick(1), Priority::zero(), boxed(move || Box::pin(async move { sync_order.lock().push("sync") }))).unwrap();

		executive.start().await.unwrap();
		assert_eq!(*order.lock(), vec!["detachable", "sync"]);
	}
}

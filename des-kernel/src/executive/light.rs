use tracing::trace;

use crate::queue::{DispatchKind, EventCallback, EventKey, EventQueue};
use crate::time::{Priority, Tick};

use super::ExecutiveState;

/// A minimal single-threaded dispatcher: no pause, no detachables, no causality diagnostics
/// (out-of-order enqueues are always clamped to the current time), priority is forced to zero
/// for every event. Intended for models that only need ordered callback dispatch.
pub struct LightExecutive {
	queue: EventQueue,
	now: Tick,
	state: ExecutiveState,
	run_number: u64,
	event_count: u64,
	before_fire: Option<Box<dyn FnMut(EventKey, Tick) + Send>>,
	after_fire: Option<Box<dyn FnMut(EventKey, Tick) + Send>>,
}

impl Default for LightExecutive {
	fn default() -> Self {
		Self::new()
	}
}

impl LightExecutive {
	#[must_use]
	pub fn new() -> Self {
		Self {
			queue: EventQueue::new(),
			now: Tick::zero(),
			state: ExecutiveState::Stopped,
			run_number: 0,
			event_count: 0,
			before_fire: None,
			after_fire: None,
		}
	}

	#[must_use]
	pub const fn now(&self) -> Tick {
		self.now
	}

	#[must_use]
	pub const fn state(&self) -> ExecutiveState {
		self.state
	}

	#[must_use]
	pub const fn event_count(&self) -> u64 {
		self.event_count
	}

	pub fn on_event_about_to_fire(&mut self, hook: impl FnMut(EventKey, Tick) + Send + 'static) {
		self.before_fire = Some(Box::new(hook));
	}

	pub fn on_event_has_completed(&mut self, hook: impl FnMut(EventKey, Tick) + Send + 'static) {
		self.after_fire = Some(Box::new(hook));
	}

	pub fn request_event(&mut self, fire_time: Tick, callback: EventCallback) -> EventKey {
		let fire_time = fire_time.max(self.now);
		self.queue.enqueue(fire_time, Priority::zero(), DispatchKind::Synchronous, false, self.now, None, callback)
	}

	pub fn request_daemon_event(&mut self, fire_time: Tick, callback: EventCallback) -> EventKey {
		let fire_time = fire_time.max(self.now);
		self.queue.enqueue(fire_time, Priority::zero(), DispatchKind::Synchronous, true, self.now, None, callback)
	}

	#[must_use]
	pub fn unrequest_event(&mut self, key: EventKey) -> bool {
		self.queue.cancel_by_key(key)
	}

	/// Advances `now` to the next event and dispatches it, repeating until no non-daemon
	/// events remain. Daemon events keep the loop going but never keep it alive on their own.
	pub async fn start(&mut self) {
		self.state = ExecutiveState::Running;
		self.run_number += 1;

		loop {
			if self.queue.non_daemon_count() == 0 {
				break;
			}
			let Some(event) = self.queue.dequeue() else {
				break;
			};
			self.now = event.fire_time;
			self.event_count += 1;
			if let Some(hook) = self.before_fire.as_mut() {
				hook(event.key, self.now);
			}
			trace!(key = event.key, time = ?self.now, "light executive dispatching event");
			(event.callback)().await;
			if let Some(hook) = self.after_fire.as_mut() {
				hook(event.key, self.now);
			}
		}

		self.state = ExecutiveState::Finished;
	}
}

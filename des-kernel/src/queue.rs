use std::collections::{BinaryHeap, HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;

use crate::time::{Priority, Tick};

pub type EventKey = u64;

pub type EventCallback = Box<dyn FnOnce() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send>;

/// How the executive hands an event's callback off once it fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchKind {
	/// Runs to completion on the dispatch loop before the next event is considered.
	Synchronous,
	/// Runs cooperatively; may suspend via a [`crate::executive::detachable::DetachableController`].
	Detachable,
	/// Spawned onto the worker pool, unsynchronized with virtual time.
	Asynchronous,
}

/// A queued callback, immutable once accepted by [`EventQueue::enqueue`].
pub struct Event {
	pub key: EventKey,
	pub fire_time: Tick,
	pub priority: Priority,
	pub dispatch_kind: DispatchKind,
	pub is_daemon: bool,
	pub submitted_time: Tick,
	pub target: Option<String>,
	pub callback: EventCallback,
}

impl std::fmt::Debug for Event {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Event")
			.field("key", &self.key)
			.field("fire_time", &self.fire_time)
			.field("priority", &self.priority)
			.field("dispatch_kind", &self.dispatch_kind)
			.field("is_daemon", &self.is_daemon)
			.field("target", &self.target)
			.finish_non_exhaustive()
	}
}

struct QueueEntry {
	fire_time: Tick,
	priority: Priority,
	insertion_seq: u64,
	key: EventKey,
}

impl PartialEq for QueueEntry {
	fn eq(&self, other: &Self) -> bool {
		self.key == other.key
	}
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
	fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
		Some(self.cmp(other))
	}
}

impl Ord for QueueEntry {
	fn cmp(&self, other: &Self) -> std::cmp::Ordering {
		// BinaryHeap is a max-heap; the entry that should dispatch next must compare greatest.
		other
			.fire_time
			.cmp(&self.fire_time)
			.then_with(|| self.priority.cmp(&other.priority))
			.then_with(|| other.insertion_seq.cmp(&self.insertion_seq))
	}
}

/// Min-heap over `(fire_time, priority, insertion order)` with lazy-deletion cancellation.
#[derive(Default)]
pub struct EventQueue {
	heap: BinaryHeap<QueueEntry>,
	events: HashMap<EventKey, Event>,
	cancelled: HashSet<EventKey>,
	next_key: EventKey,
	next_seq: u64,
}

impl EventQueue {
	#[must_use]
	pub fn new() -> Self {
		Self::default()
	}

	/// Reserves the next event key without enqueuing anything; callers that need to know an
	/// event's key before building its callback (e.g. for self-cancellation) call this first.
	pub fn reserve_key(&mut self) -> EventKey {
		let key = self.next_key;
		self.next_key += 1;
		key
	}

	pub fn enqueue_with_key(&mut self, key: EventKey, fire_time: Tick, priority: Priority, dispatch_kind: DispatchKind, is_daemon: bool, submitted_time: Tick, target: Option<String>, callback: EventCallback) {
		let seq = self.next_seq;
		self.next_seq += 1;
		self.heap.push(QueueEntry { fire_time, priority, insertion_seq: seq, key });
		self.events.insert(
			key,
			Event {
				key,
				fire_time,
				priority,
				dispatch_kind,
				is_daemon,
				submitted_time,
				target,
				callback,
			},
		);
	}

	#[allow(clippy::too_many_arguments)]
	pub fn enqueue(&mut self, fire_time: Tick, priority: Priority, dispatch_kind: DispatchKind, is_daemon: bool, submitted_time: Tick, target: Option<String>, callback: EventCallback) -> EventKey {
		let key = self.reserve_key();
		self.enqueue_with_key(key, fire_time, priority, dispatch_kind, is_daemon, submitted_time, target, callback);
		key
	}

	fn drop_cancelled_top(&mut self) {
		while let Some(top) = self.heap.peek() {
			if self.cancelled.remove(&top.key) {
				self.heap.pop();
			} else {
				break;
			}
		}
	}

	pub fn dequeue(&mut self) -> Option<Event> {
		self.drop_cancelled_top();
		let entry = self.heap.pop()?;
		self.events.remove(&entry.key)
	}

	pub fn peek_time(&mut self) -> Option<Tick> {
		self.drop_cancelled_top();
		self.heap.peek().map(|entry| entry.fire_time)
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.events.is_empty()
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.events.len()
	}

	/// Lazily tombstones `key`. Returns `true` if it was still pending.
	pub fn cancel_by_key(&mut self, key: EventKey) -> bool {
		if self.events.remove(&key).is_some() {
			self.cancelled.insert(key);
			true
		} else {
			false
		}
	}

	pub fn cancel_by_predicate<F>(&mut self, predicate: F) -> usize
	where
		F: Fn(&Event) -> bool,
	{
		let keys: Vec<EventKey> = self.events.values().filter(|event| predicate(event)).map(|event| event.key).collect();
		for key in &keys {
			self.cancel_by_key(*key);
		}
		keys.len()
	}

	pub fn cancel_by_target(&mut self, target: &str) -> usize {
		self.cancel_by_predicate(|event| event.target.as_deref() == Some(target))
	}

	#[must_use]
	pub fn non_daemon_count(&self) -> usize {
		self.events.values().filter(|event| !event.is_daemon).count()
	}

	#[must_use]
	pub fn pending_keys(&self) -> Vec<EventKey> {
		self.events.keys().copied().collect()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn noop_callback() -> EventCallback {
		Box::new(|| Box::pin(async {}))
	}

	#[test]
	fn dequeues_in_time_then_priority_then_insertion_order() {
		let mut queue = EventQueue::new();
		queue.enqueue(Tick(5), Priority(0.0), DispatchKind::Synchronous, false, Tick(0), None, noop_callback());
		queue.enqueue(Tick(1), Priority(0.0), DispatchKind::Synchronous, false, Tick(0), None, noop_callback());
		let high_priority_key = queue.enqueue(Tick(1), Priority(10.0), DispatchKind::Synchronous, false, Tick(0), None, noop_callback());

		let first = queue.dequeue().unwrap();
		assert_eq!(first.key, high_priority_key);
		assert_eq!(first.fire_time, Tick(1));

		let second = queue.dequeue().unwrap();
		assert_eq!(second.fire_time, Tick(1));

		let third = queue.dequeue().unwrap();
		assert_eq!(third.fire_time, Tick(5));
	}

	#[test]
	fn cancelled_events_are_skipped_on_dequeue() {
		let mut queue = EventQueue::new();
		let key = queue.enqueue(Tick(1), Priority::zero(), DispatchKind::Synchronous, false, Tick(0), None, noop_callback());
		queue.enqueue(Tick(2), Priority::zero(), DispatchKind::Synchronous, false, Tick(0), None, noop_callback());

		assert!(queue.cancel_by_key(key));
		assert!(!queue.cancel_by_key(key), "cancelling twice should report false");

		let remaining = queue.dequeue().unwrap();
		assert_eq!(remaining.fire_time, Tick(2));
		assert!(queue.dequeue().is_none());
	}

	#[test]
	fn cancel_by_target_removes_all_matches() {
		let mut queue = EventQueue::new();
		queue.enqueue(Tick(1), Priority::zero(), DispatchKind::Synchronous, false, Tick(0), Some("pump-1".into()), noop_callback());
		queue.enqueue(Tick(2), Priority::zero(), DispatchKind::Synchronous, false, Tick(0), Some("pump-1".into()), noop_callback());
		queue.enqueue(Tick(3), Priority::zero(), DispatchKind::Synchronous, false, Tick(0), Some("pump-2".into()), noop_callback());

		let cancelled = queue.cancel_by_target("pump-1");
		assert_eq!(cancelled, 2);
		assert_eq!(queue.len(), 1);
	}

	#[test]
	fn daemon_events_do_not_count_toward_non_daemon_count() {
		let mut queue = EventQueue::new();
		queue.enqueue(Tick(1), Priority::zero(), DispatchKind::Synchronous, true, Tick(0), None, noop_callback());
		queue.enqueue(Tick(2), Priority::zero(), DispatchKind::Synchronous, false, Tick(0), None, noop_callback());
		assert_eq!(queue.non_daemon_count(), 1);
	}
}

use std::collections::HashMap;

use tracing::warn;

use crate::error::{KernelError, KernelResult};

use super::request::{RequestStatus, ResourceRequest};
use super::resource::{Resource, ResourceHandle};

/// Sentinel a [`ScoringStrategy`] returns to mark a candidate unsuitable; it is skipped.
pub const MIN_VALUE: f64 = f64::NEG_INFINITY;
/// Sentinel a [`ScoringStrategy`] returns to mark a candidate a perfect match; selection
/// short-circuits and picks it immediately.
pub const MAX_VALUE: f64 = f64::INFINITY;

pub trait AccessRegulator: Send {
	fn can_acquire(&self, resource: &Resource, request: &ResourceRequest) -> bool;
}

/// An access regulator that admits every request; installed as the implicit default.
pub struct AllowAll;

impl AccessRegulator for AllowAll {
	fn can_acquire(&self, _resource: &Resource, _request: &ResourceRequest) -> bool {
		true
	}
}

pub trait ScoringStrategy: Send {
	fn score(&self, resource: &Resource, request: &ResourceRequest) -> f64;
}

/// Scores by spare capacity: the candidate with the most room wins, ties broken by
/// registration order.
pub struct MostAvailable;

impl ScoringStrategy for MostAvailable {
	fn score(&self, resource: &Resource, request: &ResourceRequest) -> f64 {
		if resource.available() < request.quantity_desired && resource.permissible_overbook <= 0.0 {
			MIN_VALUE
		} else {
			resource.available()
		}
	}
}

struct Waiter {
	request: ResourceRequest,
	candidates: Vec<ResourceHandle>,
}

/// Owns every [`Resource`] it mediates, plus the regulator stacks and waiter list that gate
/// access to them. Resources hold only a non-owning [`ResourceHandle`] back to their slot.
pub struct ResourceManager {
	resources: Vec<Resource>,
	name_index: HashMap<String, ResourceHandle>,
	waiters: Vec<Waiter>,
	priority_ordered: bool,
	waiters_dirty: bool,
	default_regulators: Vec<Box<dyn AccessRegulator>>,
	resource_regulators: HashMap<ResourceHandle, Vec<Box<dyn AccessRegulator>>>,
}

impl ResourceManager {
	#[must_use]
	pub fn new(priority_ordered: bool) -> Self {
		Self {
			resources: Vec::new(),
			name_index: HashMap::new(),
			waiters: Vec::new(),
			priority_ordered,
			waiters_dirty: false,
			default_regulators: Vec::new(),
			resource_regulators: HashMap::new(),
		}
	}

	pub fn register_resource(&mut self, resource: Resource) -> ResourceHandle {
		let handle = ResourceHandle(self.resources.len());
		self.name_index.insert(resource.name.clone(), handle);
		self.resources.push(resource);
		handle
	}

	#[must_use]
	pub fn handle_by_name(&self, name: &str) -> Option<ResourceHandle> {
		self.name_index.get(name).copied()
	}

	#[must_use]
	pub fn resource(&self, handle: ResourceHandle) -> &Resource {
		&self.resources[handle.0]
	}

	#[cfg(test)]
	pub fn resource_mut_for_test(&mut self, handle: ResourceHandle) -> &mut Resource {
		&mut self.resources[handle.0]
	}

	pub fn add_default_regulator(&mut self, regulator: impl AccessRegulator + 'static) {
		self.default_regulators.push(Box::new(regulator));
	}

	pub fn add_resource_regulator(&mut self, handle: ResourceHandle, regulator: impl AccessRegulator + 'static) {
		self.resource_regulators.entry(handle).or_default().push(Box::new(regulator));
	}

	/// A resource-specific regulator stack entirely replaces the default stack for that
	/// resource; an empty or absent per-resource stack falls back to the defaults.
	fn regulators_allow(&self, handle: ResourceHandle, request: &ResourceRequest) -> bool {
		let resource = &self.resources[handle.0];
		match self.resource_regulators.get(&handle) {
			Some(stack) if !stack.is_empty() => stack.iter().all(|regulator| regulator.can_acquire(resource, request)),
			_ => self.default_regulators.iter().all(|regulator| regulator.can_acquire(resource, request)),
		}
	}

	#[must_use]
	pub fn select_resource(&self, candidates: &[ResourceHandle], request: &ResourceRequest, scorer: &dyn ScoringStrategy) -> Option<ResourceHandle> {
		let mut best: Option<(ResourceHandle, f64)> = None;
		for &handle in candidates {
			if !self.regulators_allow(handle, request) {
				continue;
			}
			let score = scorer.score(&self.resources[handle.0], request);
			if (score - MIN_VALUE).abs() < f64::EPSILON {
				continue;
			}
			if (score - MAX_VALUE).abs() < f64::EPSILON {
				return Some(handle);
			}
			match best {
				Some((_, best_score)) if best_score >= score => {}
				_ => best = Some((handle, score)),
			}
		}
		best.map(|(handle, _)| handle)
	}

	/// Non-blocking: takes `request.quantity_desired` from `handle` if it fits, marking the
	/// request `Reserved`. Returns [`KernelError::InsufficientResourcePool`] otherwise, leaving
	/// the request untouched.
	pub fn reserve(&mut self, request: &mut ResourceRequest, handle: ResourceHandle) -> KernelResult<()> {
		let resource = &mut self.resources[handle.0];
		if resource.try_take(request.quantity_desired) {
			request.status = RequestStatus::Reserved;
			request.quantity_obtained = request.quantity_desired;
			request.resource_obtained_from = Some(handle);
			Ok(())
		} else {
			Err(KernelError::InsufficientResourcePool {
				requested: request.quantity_desired,
				available: resource.available(),
			})
		}
	}

	/// Returns a reserved or acquired quantity to its resource and wakes any waiter that can
	/// now be satisfied, returning them in the order they were granted. Fails with
	/// [`KernelError::ResourceMismatch`] if `request` never obtained a resource to give back.
	pub fn unreserve(&mut self, request: &mut ResourceRequest) -> KernelResult<Vec<ResourceRequest>> {
		let Some(handle) = request.resource_obtained_from.take() else {
			return Err(KernelError::ResourceMismatch {
				requested: request.requester_identity.clone(),
				actual: "<no resource held>".to_string(),
			});
		};
		self.resources[handle.0].give_back(request.quantity_obtained);
		request.quantity_obtained = 0.0;
		request.status = RequestStatus::Free;
		Ok(self.drain_waiters())
	}

	/// Acquires directly, or promotes an existing reservation on the same resource to
	/// `Acquired` without touching `available` again.
	pub fn acquire(&mut self, request: &mut ResourceRequest, handle: ResourceHandle) -> KernelResult<()> {
		if request.status == RequestStatus::Reserved && request.resource_obtained_from == Some(handle) {
			request.status = RequestStatus::Acquired;
			return Ok(());
		}
		self.reserve(request, handle)?;
		request.status = RequestStatus::Acquired;
		Ok(())
	}

	pub fn release(&mut self, request: &mut ResourceRequest) -> KernelResult<Vec<ResourceRequest>> {
		self.unreserve(request)
	}

	/// Parks `request` until a matching resource in `candidates` frees enough capacity.
	pub fn enqueue_waiter(&mut self, request: ResourceRequest, candidates: Vec<ResourceHandle>) {
		self.waiters.push(Waiter { request, candidates });
		self.waiters_dirty = true;
	}

	pub fn mark_priority_changed(&mut self) {
		self.waiters_dirty = true;
	}

	fn resort_if_dirty(&mut self) {
		if self.waiters_dirty && self.priority_ordered {
			self.waiters.sort_by(|left, right| right.request.priority.cmp(&left.request.priority));
		}
		self.waiters_dirty = false;
	}

	/// Scans the waiter list (FIFO, or priority-ordered if `priority_ordered` and dirty) and
	/// grants every waiter it can with [`MostAvailable`] scoring, returning the granted
	/// requests in the order they were satisfied.
	pub fn drain_waiters(&mut self) -> Vec<ResourceRequest> {
		self.resort_if_dirty();
		let mut granted = Vec::new();
		let mut remaining = Vec::with_capacity(self.waiters.len());
		for mut waiter in self.waiters.drain(..) {
			match self.select_resource(&waiter.candidates, &waiter.request, &MostAvailable) {
				Some(handle) if self.reserve(&mut waiter.request, handle).is_ok() => granted.push(waiter.request),
				_ => remaining.push(waiter),
			}
		}
		self.waiters = remaining;
		granted
	}

	/// Logs one `tracing::warn!` per waiter still parked; called at run end, not an error.
	pub fn log_unresolved_waiters(&self) {
		for waiter in &self.waiters {
			warn!(requester = %waiter.request.requester_identity, quantity = waiter.request.quantity_desired, "resource request never satisfied before run end");
		}
	}

	#[must_use]
	pub fn waiter_count(&self) -> usize {
		self.waiters.len()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::time::Priority;

	#[test]
	fn reserve_then_unreserve_round_trips_capacity() {
		let mut manager = ResourceManager::new(false);
		let handle = manager.register_resource(Resource::new("pump", 2.0, false, false, false, 0.0));
		let mut request = ResourceRequest::new(1, "line-1", 1.0, Priority::zero());

		manager.reserve(&mut request, handle).unwrap();
		assert!((manager.resource(handle).available() - 1.0).abs() < f64::EPSILON);

		manager.unreserve(&mut request).unwrap();
		assert!((manager.resource(handle).available() - 2.0).abs() < f64::EPSILON);
		assert_eq!(request.status, RequestStatus::Free);
	}

	#[test]
	fn unreserve_without_a_held_resource_is_a_mismatch() {
		let mut manager = ResourceManager::new(false);
		manager.register_resource(Resource::new("pump", 2.0, false, false, false, 0.0));
		let mut request = ResourceRequest::new(1, "line-1", 1.0, Priority::zero());

		let err = manager.unreserve(&mut request).unwrap_err();
		assert!(matches!(err, KernelError::ResourceMismatch { .. }));
	}

	#[test]
	fn release_wakes_a_waiting_request() {
		let mut manager = ResourceManager::new(false);
		let handle = manager.register_resource(Resource::new("pump", 1.0, false, false, false, 0.0));

		let mut holder = ResourceRequest::new(1, "line-1", 1.0, Priority::zero());
		manager.reserve(&mut holder, handle).unwrap();

		let waiter = ResourceRequest::new(2, "line-2", 1.0, Priority::zero());
		manager.enqueue_waiter(waiter, vec![handle]);
		assert_eq!(manager.waiter_count(), 1);

		let granted = manager.release(&mut holder).unwrap();
		assert_eq!(manager.waiter_count(), 0);
		assert_eq!(granted.len(), 1);
		assert_eq!(granted[0].requester_identity, "line-2");
	}

	#[test]
	fn resource_specific_regulator_overrides_default() {
		struct DenyAll;
		impl AccessRegulator for DenyAll {
			fn can_acquire(&self, _resource: &Resource, _request: &ResourceRequest) -> bool {
				false
			}
		}

		let mut manager = ResourceManager::new(false);
		let handle = manager.register_resource(Resource::new("pump", 1.0, false, false, false, 0.0));
		manager.add_default_regulator(AllowAll);
		manager.add_resource_regulator(handle, DenyAll);

		let request = ResourceRequest::new(1, "line-1", 1.0, Priority::zero());
		assert!(manager.select_resource(&[handle], &request, &MostAvailable).is_none());
	}
}

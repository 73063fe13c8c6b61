use super::manager::{ResourceManager, ScoringStrategy};
use super::request::{RequestStatus, ResourceRequest};
use super::resource::ResourceHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RotationOutcome {
	/// Every member reserved its resource; the multi-request is complete.
	Ready,
	/// Member `new_head` could not be satisfied non-blocking; everything else was rolled
	/// back. The caller should park `new_head` on the manager's waiter list and retry the
	/// whole rotation once it is woken.
	Blocked { new_head: usize },
}

/// A set of resource requests that must all succeed together, reserved via the rotating-queue
/// algorithm: on each pass exactly one member (the "head") is allowed to block, every other
/// member ("tail") is tried non-blocking. If a tail member fails, every reservation made this
/// pass is unwound and the failed member becomes the new head for the next pass. Because at
/// most one member is ever parked waiting at a time, no two in-flight multi-requests can form a
/// circular wait on each other's resources.
pub struct RotatingMultiRequest {
	members: Vec<(ResourceRequest, Vec<ResourceHandle>)>,
	head: usize,
}

impl RotatingMultiRequest {
	#[must_use]
	pub fn new(members: Vec<(ResourceRequest, Vec<ResourceHandle>)>) -> Self {
		Self { members, head: 0 }
	}

	#[must_use]
	pub fn members(&self) -> &[(ResourceRequest, Vec<ResourceHandle>)] {
		&self.members
	}

	pub fn into_members(self) -> Vec<(ResourceRequest, Vec<ResourceHandle>)> {
		self.members
	}

	#[must_use]
	pub const fn head(&self) -> usize {
		self.head
	}

	/// Reserve-all-or-nothing, non-blocking: tries every member once in rotation order with no
	/// special treatment for the head, and rolls back entirely on the first failure.
	pub fn try_reserve_all(&mut self, manager: &mut ResourceManager, scorer: &dyn ScoringStrategy) -> RotationOutcome {
		self.attempt(manager, scorer)
	}

	/// One pass of the blocking algorithm: identical to [`Self::try_reserve_all`] except the
	/// caller is expected to park `new_head` and retry on wake rather than give up.
	pub fn try_acquire_all(&mut self, manager: &mut ResourceManager, scorer: &dyn ScoringStrategy) -> RotationOutcome {
		let outcome = self.attempt(manager, scorer);
		if outcome == RotationOutcome::Ready {
			for (request, _) in &mut self.members {
				request.status = RequestStatus::Acquired;
			}
		}
		outcome
	}

	fn attempt(&mut self, manager: &mut ResourceManager, scorer: &dyn ScoringStrategy) -> RotationOutcome {
		let n = self.members.len();
		let mut reserved_this_pass = Vec::new();

		for offset in 0..n {
			let idx = (self.head + offset) % n;
			let (request, candidates) = &mut self.members[idx];
			if request.status != RequestStatus::Free {
				continue;
			}
			let reserved = match manager.select_resource(candidates, request, scorer) {
				Some(handle) => manager.reserve(request, handle).is_ok(),
				None => false,
			};
			if reserved {
				reserved_this_pass.push(idx);
			} else {
				for done in reserved_this_pass {
					let _ = manager.unreserve(&mut self.members[done].0);
				}
				for (other_request, _) in &mut self.members {
					if other_request.status != RequestStatus::Free {
						let _ = manager.unreserve(other_request);
					}
				}
				self.head = idx;
				return RotationOutcome::Blocked { new_head: idx };
			}
		}
		RotationOutcome::Ready
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::resource::manager::MostAvailable;
	use crate::resource::resource::Resource;
	use crate::time::Priority;

	#[test]
	fn ready_when_every_member_can_reserve() {
		let mut manager = ResourceManager::new(false);
		let a = manager.register_resource(Resource::new("a", 1.0, false, false, false, 0.0));
		let b = manager.register_resource(Resource::new("b", 1.0, false, false, false, 0.0));

		let mut multi = RotatingMultiRequest::new(vec![
			(ResourceRequest::new(1, "r", 1.0, Priority::zero()), vec![a]),
			(ResourceRequest::new(2, "r", 1.0, Priority::zero()), vec![b]),
		]);

		assert_eq!(multi.try_reserve_all(&mut manager, &MostAvailable), RotationOutcome::Ready);
		assert!((manager.resource(a).available() - 0.0).abs() < f64::EPSILON);
		assert!((manager.resource(b).available() - 0.0).abs() < f64::EPSILON);
	}

	#[test]
	fn failure_rolls_back_every_reservation_made_this_pass() {
		let mut manager = ResourceManager::new(false);
		let a = manager.register_resource(Resource::new("a", 1.0, false, false, false, 0.0));
		let b = manager.register_resource(Resource::new("b", 0.0, false, false, false, 0.0));

		let mut multi = RotatingMultiRequest::new(vec![
			(ResourceRequest::new(1, "r", 1.0, Priority::zero()), vec![a]),
			(ResourceRequest::new(2, "r", 1.0, Priority::zero()), vec![b]),
		]);

		let outcome = multi.try_reserve_all(&mut manager, &MostAvailable);
		assert_eq!(outcome, RotationOutcome::Blocked { new_head: 1 });
		assert!((manager.resource(a).available() - 1.0).abs() < f64::EPSILON, "rollback must return a's reservation");
		assert_eq!(multi.head(), 1);
	}

	#[test]
	fn retry_from_rotated_head_succeeds_once_capacity_frees_up() {
		let mut manager = ResourceManager::new(false);
		let a = manager.register_resource(Resource::new("a", 1.0, false, false, false, 0.0));
		let b = manager.register_resource(Resource::new("b", 0.0, false, false, false, 0.0));

		let mut multi = RotatingMultiRequest::new(vec![
			(ResourceRequest::new(1, "r", 1.0, Priority::zero()), vec![a]),
			(ResourceRequest::new(2, "r", 1.0, Priority::zero()), vec![b]),
		]);
		assert_eq!(multi.try_reserve_all(&mut manager, &MostAvailable), RotationOutcome::Blocked { new_head: 1 });

		manager.resource_mut_for_test(b).adjust_capacity(1.0);
		assert_eq!(multi.try_acquire_all(&mut manager, &MostAvailable), RotationOutcome::Ready);
		assert!(multi.members().iter().all(|(request, _)| request.status == RequestStatus::Acquired));
	}
}

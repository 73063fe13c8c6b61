use std::any::Any;

use crate::time::Priority;

use super::resource::ResourceHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestStatus {
	Free,
	Reserved,
	Acquired,
}

/// One requester's claim against a [`super::manager::ResourceManager`].
///
/// `user_data` carries caller-defined context through the manager without the manager needing
/// to know its type; `abort_handler` fires if the request is still waiting when its owning
/// detachable is aborted.
pub struct ResourceRequest {
	pub key: u64,
	pub requester_identity: String,
	pub quantity_desired: f64,
	pub quantity_obtained: f64,
	pub priority: Priority,
	pub status: RequestStatus,
	pub resource_obtained_from: Option<ResourceHandle>,
	pub user_data: Option<Box<dyn Any + Send>>,
	abort_handler: Option<Box<dyn FnMut() + Send>>,
}

impl std::fmt::Debug for ResourceRequest {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("ResourceRequest")
			.field("key", &self.key)
			.field("requester_identity", &self.requester_identity)
			.field("quantity_desired", &self.quantity_desired)
			.field("quantity_obtained", &self.quantity_obtained)
			.field("priority", &self.priority)
			.field("status", &self.status)
			.field("resource_obtained_from", &self.resource_obtained_from)
			.finish_non_exhaustive()
	}
}

impl ResourceRequest {
	#[must_use]
	pub fn new(key: u64, requester_identity: impl Into<String>, quantity_desired: f64, priority: Priority) -> Self {
		Self {
			key,
			requester_identity: requester_identity.into(),
			quantity_desired,
			quantity_obtained: 0.0,
			priority,
			status: RequestStatus::Free,
			resource_obtained_from: None,
			user_data: None,
			abort_handler: None,
		}
	}

	pub fn set_abort_handler(&mut self, handler: impl FnMut() + Send + 'static) {
		self.abort_handler = Some(Box::new(handler));
	}

	pub fn fire_abort_handler(&mut self) {
		if let Some(handler) = self.abort_handler.as_mut() {
			handler();
		}
	}

	#[must_use]
	pub const fn is_pending(&self) -> bool {
		matches!(self.status, RequestStatus::Free)
	}
}

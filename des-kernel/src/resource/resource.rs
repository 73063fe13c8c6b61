use uuid::Uuid;

/// An index into a [`super::manager::ResourceManager`]'s resource table. Non-owning: a
/// `Resource` carries one of these back to its manager instead of a shared/weak pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceHandle(pub usize);

/// A pool of capacity a [`super::manager::ResourceManager`] mediates contention for.
///
/// `is_atomic` resources grant all-or-none of `quantity_desired`; `is_discrete` resources only
/// grant integral quantities; `permissible_overbook` lets `available` run negative down to
/// `-permissible_overbook` (relevant for resources that model soft capacity limits).
#[derive(Debug)]
pub struct Resource {
	pub guid: Uuid,
	pub name: String,
	capacity: f64,
	available: f64,
	initial_capacity: f64,
	initial_available: f64,
	pub is_atomic: bool,
	pub is_discrete: bool,
	pub is_persistent: bool,
	pub permissible_overbook: f64,
}

impl Resource {
	#[must_use]
	pub fn new(name: impl Into<String>, capacity: f64, is_atomic: bool, is_discrete: bool, is_persistent: bool, permissible_overbook: f64) -> Self {
		Self {
			guid: Uuid::new_v4(),
			name: name.into(),
			capacity,
			available: capacity,
			initial_capacity: capacity,
			initial_available: capacity,
			is_atomic,
			is_discrete,
			is_persistent,
			permissible_overbook,
		}
	}

	#[must_use]
	pub const fn capacity(&self) -> f64 {
		self.capacity
	}

	#[must_use]
	pub const fn available(&self) -> f64 {
		self.available
	}

	/// Grows both `capacity` and `available` by `delta`; shrinks them if `delta` is negative.
	pub fn adjust_capacity(&mut self, delta: f64) {
		self.capacity += delta;
		self.available = (self.available + delta).min(self.capacity + self.permissible_overbook);
	}

	#[must_use]
	fn quantity_is_valid(&self, quantity: f64) -> bool {
		if quantity <= 0.0 {
			return false;
		}
		if self.is_atomic && (quantity - self.capacity).abs() > f64::EPSILON {
			return false;
		}
		if self.is_discrete && quantity.fract().abs() > f64::EPSILON {
			return false;
		}
		true
	}

	/// Takes `quantity` out of `available` if there's room under the overbook ceiling.
	/// Returns `false`, leaving `available` untouched, if the request is invalid or won't fit.
	pub fn try_take(&mut self, quantity: f64) -> bool {
		if !self.quantity_is_valid(quantity) {
			return false;
		}
		let floor = -self.permissible_overbook;
		if self.available - quantity < floor {
			return false;
		}
		self.available -= quantity;
		true
	}

	/// Returns `quantity` to `available`, capped at `capacity + permissible_overbook`.
	pub fn give_back(&mut self, quantity: f64) {
		self.available = (self.available + quantity).min(self.capacity + self.permissible_overbook);
	}

	pub fn reset(&mut self) {
		self.capacity = self.initial_capacity;
		self.available = self.initial_available;
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn atomic_resource_only_grants_full_capacity() {
		let mut resource = Resource::new("lock", 1.0, true, true, false, 0.0);
		assert!(!resource.try_take(0.5));
		assert!(resource.try_take(1.0));
		assert!((resource.available() - 0.0).abs() < f64::EPSILON);
	}

	#[test]
	fn discrete_resource_rejects_fractional_quantities() {
		let mut resource = Resource::new("seats", 10.0, false, true, false, 0.0);
		assert!(!resource.try_take(1.5));
		assert!(resource.try_take(3.0));
		assert!((resource.available() - 7.0).abs() < f64::EPSILON);
	}

	#[test]
	fn overbook_allows_available_to_run_negative_down_to_ceiling() {
		let mut resource = Resource::new("bandwidth", 10.0, false, false, false, 2.0);
		assert!(resource.try_take(10.0));
		assert!(resource.try_take(2.0));
		assert!(!resource.try_take(0.01));
	}

	#[test]
	fn give_back_is_capped_at_capacity_plus_overbook() {
		let mut resource = Resource::new("slots", 5.0, false, false, false, 1.0);
		resource.give_back(100.0);
		assert!((resource.available() - 6.0).abs() < f64::EPSILON);
	}
}

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use des_kernel::resource::{MostAvailable, Resource, ResourceManager, ResourceRequest, RotatingMultiRequest, RotationOutcome};
use des_kernel::{FullExecutive, KernelConfig, Priority, Tick};

#[tokio::test]
async fn deadlock_free_multi_reserve_across_two_resources() {
	// Two competing multi-requests each want both resources, in opposite order. The rotating
	// queue algorithm must resolve this without either one blocking forever holding the other.
	let mut manager = ResourceManager::new(false);
	let knife = manager.register_resource(Resource::new("knife", 1.0, true, true, false, 0.0));
	let fork = manager.register_resource(Resource::new("fork", 1.0, true, true, false, 0.0));

	let mut diner_a = RotatingMultiRequest::new(vec![(ResourceRequest::new(1, "diner-a", 1.0, Priority::zero()), vec![knife]), (ResourceRequest::new(2, "diner-a", 1.0, Priority::zero()), vec![fork])]);
	let mut diner_b = RotatingMultiRequest::new(vec![(ResourceRequest::new(3, "diner-b", 1.0, Priority::zero()), vec![fork]), (ResourceRequest::new(4, "diner-b", 1.0, Priority::zero()), vec![knife])]);

	assert_eq!(diner_a.try_acquire_all(&mut manager, &MostAvailable), RotationOutcome::Ready);
	let outcome_b = diner_b.try_acquire_all(&mut manager, &MostAvailable);
	assert!(matches!(outcome_b, RotationOutcome::Blocked { .. }), "diner-b must not partially hold a resource while waiting");

	// diner-a finishes with both utensils, releasing them back to the pool.
	for (request, _) in diner_a.into_members().iter_mut() {
		manager.release(request).expect("diner-a held both utensils");
	}

	assert_eq!(diner_b.try_acquire_all(&mut manager, &MostAvailable), RotationOutcome::Ready, "diner-b must succeed once diner-a releases both utensils");
}

#[tokio::test]
async fn exec_controller_throttles_but_never_blocks_faster_than_real_time() {
	let mut executive = FullExecutive::new(KernelConfig::test());
	let dispatched = Arc::new(AtomicU32::new(0));

	for tick in 1..=3 {
		let counter = dispatched.clone();
		executive
			.request_event(Tick(tick), Priority::zero(), Box::new(move || {
				let counter = counter.clone();
				Box::pin(async move {
					counter.fetch_add(1, Ordering::SeqCst);
				})
			}))
			.unwrap();
	}

	executive.start().await.unwrap();
	assert_eq!(dispatched.load(Ordering::SeqCst), 3);
	assert_eq!(executive.event_count(), 3);
}

//! Two simulated jobs contend for a single-unit tool; the second waits until the first
//! releases it, demonstrating the resource manager's waiter list.

use des_kernel::resource::{MostAvailable, Resource, ResourceManager, ResourceRequest};
use des_kernel::Priority;
use tracing_subscriber::EnvFilter;

fn main() {
	tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

	let mut manager = ResourceManager::new(true);
	let tool = manager.register_resource(Resource::new("welding-rig", 1.0, true, true, false, 0.0));

	let mut job_a = ResourceRequest::new(1, "job-a", 1.0, Priority(1.0));
	manager.reserve(&mut job_a, tool).expect("tool starts free");
	tracing::info!(requester = job_a.requester_identity, "acquired welding-rig");

	let job_b = ResourceRequest::new(2, "job-b", 1.0, Priority(2.0));
	tracing::info!(requester = job_b.requester_identity, "parking: welding-rig is busy");
	manager.enqueue_waiter(job_b, vec![tool]);

	let granted = manager.release(&mut job_a).expect("job-a held the welding-rig");
	for request in &granted {
		tracing::info!(requester = request.requester_identity, "granted welding-rig from the waiter list");
	}
}

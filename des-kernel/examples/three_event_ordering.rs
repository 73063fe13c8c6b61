//! Minimal walkthrough: three events land at two distinct times, the executive dispatches
//! them in `(fire_time, priority)` order and logs each one via `tracing`.

use des_kernel::{FullExecutive, KernelConfig, Priority, Tick};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt().with_env_filter(EnvFilter::from_default_env()).init();

	let mut executive = FullExecutive::new(KernelConfig::default());

	executive
		.request_event(Tick(5), Priority::zero(), Box::new(|| Box::pin(async { tracing::info!("low-priority event at t=5") })))
		.unwrap();
	executive
		.request_event(Tick(1), Priority::zero(), Box::new(|| Box::pin(async { tracing::info!("event at t=1") })))
		.unwrap();
	executive
		.request_event(Tick(1), Priority(10.0), Box::new(|| Box::pin(async { tracing::info!("high-priority event at t=1") })))
		.unwrap();

	executive.start().await.expect("dispatch loop should not error in this demo");
	tracing::info!(total = executive.event_count(), "run finished");
}

pub mod detachable;
pub mod full;
pub mod light;

pub use detachable::DetachableController;
pub use full::FullExecutive;
pub use light::LightExecutive;

use crate::queue::EventKey;
use crate::time::Tick;

/// An executive is in exactly one of these states at any instant; `Running` is unique across
/// a single executive instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutiveState {
	Stopped,
	Running,
	Paused,
	Finished,
}

/// Observability events broadcast over the executive's `tokio::sync::broadcast` channel and
/// mirrored as `tracing` events at the dispatch boundary they describe.
#[derive(Debug, Clone)]
pub enum KernelEvent {
	ExecutiveStarted { run_number: u64 },
	Stopped,
	Paused,
	Resumed,
	Finished,
	Aborted,
	Reset,
	ClockAboutToChange { from: Tick, to: Tick },
	EventAboutToFire { key: EventKey },
	EventHasCompleted { key: EventKey },
}

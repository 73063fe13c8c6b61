use thiserror::Error;

use crate::time::Tick;

/// Every violation the kernel itself can detect, short of a panicking user callback.
///
/// `TransitionFailure` deliberately has no variant here: a rejected state transition is
/// returned as data from [`crate::state_machine::StateMachine::transition`], not raised as
/// an error.
#[derive(Error, Debug)]
pub enum KernelError {
	#[error("event fire_time {requested:?} precedes current time {now:?}")]
	Causality { now: Tick, requested: Tick },

	#[error("illegal transition from {from} to {to}")]
	IllegalTransition { from: String, to: String },

	#[error("resource mismatch: request for {requested} does not match resource {actual}")]
	ResourceMismatch { requested: String, actual: String },

	#[error("insufficient resource pool: requested {requested}, available {available}")]
	InsufficientResourcePool { requested: f64, available: f64 },

	#[error("initialization cycle detected among states: {0:?}")]
	InitializationCycle(Vec<String>),

	#[error("executive runtime error: {0}")]
	ExecutiveRuntime(String),

	#[error("executive panicked while dispatching event {key}: {message}")]
	CallbackPanicked { key: u64, message: String },
}

pub type KernelResult<T> = Result<T, KernelError>;

//! A general-purpose discrete-event simulation kernel: a priority-ordered time queue, an
//! executive that dispatches callbacks against it (with a cooperative detachable mode for
//! callbacks that need to suspend and resume along virtual time), a two-phase-commit state
//! machine for lifecycle transitions, and a resource manager for contention over shared pools.

pub mod config;
pub mod error;
pub mod exec_controller;
pub mod executive;
pub mod queue;
pub mod resource;
pub mod state_machine;
pub mod time;

pub use config::{ExecutiveKind, KernelConfig};
pub use error::{KernelError, KernelResult};
pub use exec_controller::{ExecController, RenderLoop};
pub use executive::{DetachableController, ExecutiveState, FullExecutive, KernelEvent, LightExecutive};
pub use queue::{DispatchKind, Event, EventKey, EventQueue};
pub use resource::{AccessRegulator, ResourceHandle, ResourceManager, ResourceRequest};
pub use state_machine::{StateMachine, TransitionFailure, TransitionHandler, TransitionOutcome};
pub use time::{Priority, Tick};
